//! Daily worklog spreadsheets exported as CSV.

use chrono::NaiveDate;
use serde_json::json;

use super::markdown::inline_code;
use super::text::{clip_title, find_date, normalize_title, FALLBACK_TITLE};

const DATE_HEADERS: &[&str] = &["날짜", "date", "캘린더"];
const WORK_HEADERS: &[&str] = &["오늘의 업무", "업무", "title", "task"];
const ISSUE_HEADERS: &[&str] = &["이슈", "issue"];
const MEMO_HEADERS: &[&str] = &["메모", "memo", "note"];
const TITLE_HEADERS: &[&str] = &["오늘의 업무 제목", "제목"];

/// One spreadsheet row turned into a worklog item.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub title: String,
    pub due_date: Option<NaiveDate>,
    /// Block content, absent when the row had nothing to render.
    pub content: Option<String>,
    pub issue: String,
    pub memo: String,
}

#[derive(Debug, Default)]
pub struct Sheet {
    pub rows: Vec<SheetRow>,
    pub failures: Vec<String>,
}

/// First header matching a candidate, candidates tried in order.
fn find_header(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(candidate) || h.contains(candidate))
    })
}

fn exact_header(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn cell(record: &csv::StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn section(html: &mut String, heading: &str, body: &str) {
    if body.trim().is_empty() {
        return;
    }
    html.push_str(&format!("<h3>{}</h3>", heading));
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        html.push_str(&format!("<p>{}</p>", inline_code(line)));
    }
}

fn row_html(work: &str, issue: &str, memo: &str) -> String {
    let mut html = String::new();
    section(&mut html, "요청내용", work);
    section(&mut html, "이슈", issue);
    section(&mut html, "메모", memo);
    html
}

/// Parse one CSV member. A bad header fails the whole file; a bad record
/// fails only that row.
pub fn parse(path: &str, data: &[u8]) -> Sheet {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let mut sheet = Sheet::default();
    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(e) => {
            sheet.failures.push(format!("CSV parse failed ({}): {}", path, e));
            return sheet;
        }
    };

    let date_col = find_header(&headers, DATE_HEADERS);
    let work_col = find_header(&headers, WORK_HEADERS);
    let issue_col = find_header(&headers, ISSUE_HEADERS);
    let memo_col = find_header(&headers, MEMO_HEADERS);
    let title_cols: Vec<usize> = TITLE_HEADERS
        .iter()
        .filter_map(|name| exact_header(&headers, name))
        .collect();

    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                sheet
                    .failures
                    .push(format!("CSV record parse failed ({}, row {}): {}", path, index + 2, e));
                continue;
            }
        };

        let raw_date = cell(&record, date_col);
        let due_date = find_date(&raw_date);
        let work = cell(&record, work_col);
        let issue = cell(&record, issue_col);
        let memo = cell(&record, memo_col);

        let raw_title = match due_date {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => title_cols
                .iter()
                .map(|&i| cell(&record, Some(i)))
                .find(|v| !v.is_empty())
                .unwrap_or_else(|| format!("{} {}", FALLBACK_TITLE, index + 1)),
        };

        let html = row_html(&work, &issue, &memo);
        let content = (!html.trim().is_empty())
            .then(|| json!({ "html": html, "issue": issue, "memo": memo }).to_string());

        sheet.rows.push(SheetRow {
            title: normalize_title(&clip_title(&raw_title)),
            due_date,
            content,
            issue,
            memo,
        });
    }
    sheet
}

/// Append `addition` unless the text already contains it.
pub fn merge_text(current: &mut String, addition: &str) {
    let addition = addition.trim();
    if addition.is_empty() || current.contains(addition) {
        return;
    }
    if !current.is_empty() {
        current.push('\n');
    }
    current.push_str(addition);
}
