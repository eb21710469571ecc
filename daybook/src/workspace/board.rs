//! Monthly board rows summarized from each item's first block.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use uuid::Uuid;

use chrono::NaiveDate;

use crate::model::{DayNote, ItemStatus, TemplateType, WorkspaceItem};

const SUMMARY_CHARS: usize = 120;

static LI: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").expect("static selector"));
static TEXT_BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li").expect("static selector"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub title: String,
    pub status: ItemStatus,
    pub template_type: TemplateType,
    pub today_work: String,
    pub issue: String,
    pub memo: String,
    pub checklist_total: u32,
    pub checklist_done: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub today_work: String,
    pub issue: String,
    pub memo: String,
    pub checklist_total: u32,
    pub checklist_done: u32,
}

/// Collapse whitespace and cut to the summary length.
pub fn short_text(raw: &str) -> String {
    let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() > SUMMARY_CHARS {
        let cut: String = compact.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", cut)
    } else {
        compact
    }
}

fn count_token(source: &str, token: &str) -> u32 {
    source.matches(token).count() as u32
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Summary of a block's JSON content. Unparsable content yields an empty summary.
pub fn summarize_block(content: &str) -> Summary {
    let Ok(root) = serde_json::from_str::<Value>(content) else {
        return Summary::default();
    };

    if let Some(worklog) = root.get("worklog").filter(|w| w.is_object()) {
        let today_work = short_text(str_field(worklog, "requestContent"));
        let issue = short_text(str_field(worklog, "requestChannel"));
        let memo = short_text(str_field(worklog, "processContent1"));
        return Summary {
            checklist_total: count_token(&today_work, "[ ]") + count_token(&memo, "[ ]"),
            checklist_done: count_token(&today_work, "[x]") + count_token(&memo, "[x]"),
            today_work,
            issue,
            memo,
        };
    }

    let mut summary = summarize_html(str_field(&root, "html"));
    let issue = short_text(str_field(&root, "issue"));
    let memo = short_text(str_field(&root, "memo"));
    if !issue.is_empty() {
        summary.issue = issue;
    }
    if !memo.is_empty() {
        summary.memo = memo;
    }
    summary
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Today,
    Issue,
    Memo,
}

pub fn summarize_html(html: &str) -> Summary {
    if html.trim().is_empty() {
        return Summary::default();
    }
    let doc = Html::parse_fragment(html);

    let mut total = 0;
    let mut done = 0;
    for li in doc.select(&LI) {
        let text = element_text(&li);
        let checked = text.contains("[x]") || text.contains('☑');
        if checked || text.contains("[ ]") || text.contains('☐') {
            total += 1;
            if checked {
                done += 1;
            }
        }
    }

    let mut section = None;
    let mut today = Vec::new();
    let mut issue = Vec::new();
    let mut memo = Vec::new();
    for el in doc.root_element().children().filter_map(ElementRef::wrap) {
        let text = element_text(&el);
        if text.is_empty() {
            continue;
        }
        if matches!(el.value().name(), "h1" | "h2" | "h3" | "h4") {
            section = if text.contains("요청내용") || text.contains("오늘의 업무") {
                Some(Section::Today)
            } else if text.contains("이슈") {
                Some(Section::Issue)
            } else if text.contains("메모") {
                Some(Section::Memo)
            } else {
                None
            };
            continue;
        }
        match section {
            Some(Section::Today) => today.push(text),
            Some(Section::Issue) => issue.push(text),
            Some(Section::Memo) => memo.push(text),
            None => {}
        }
    }

    let mut today_work = short_text(&today.join(" / "));
    if today_work.is_empty() {
        today_work = doc
            .select(&TEXT_BLOCKS)
            .next()
            .map(|el| short_text(&element_text(&el)))
            .unwrap_or_default();
    }

    Summary {
        today_work,
        issue: short_text(&issue.join(" / ")),
        memo: short_text(&memo.join(" / ")),
        checklist_total: total,
        checklist_done: done.min(total),
    }
}

/// Combine an item, its first block and the day note into a row.
pub fn board_row(item: &WorkspaceItem, first_block: Option<&str>, note: Option<&DayNote>) -> BoardRow {
    let mut summary = first_block.map(summarize_block).unwrap_or_default();
    if let Some(note) = note {
        if !note.issue.trim().is_empty() {
            summary.issue = short_text(&note.issue);
        }
        if !note.memo.trim().is_empty() {
            summary.memo = short_text(&note.memo);
        }
    }
    BoardRow {
        id: item.id,
        parent_id: item.parent_id,
        due_date: item.due_date,
        title: item.title.clone(),
        status: item.status,
        template_type: item.template_type,
        today_work: summary.today_work,
        issue: summary.issue,
        memo: summary.memo,
        checklist_total: summary.checklist_total,
        checklist_done: summary.checklist_done,
    }
}
