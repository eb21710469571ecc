//! Pure planning phase: turn extracted members into the rows to persist.
//!
//! Nothing here touches the database or blob storage. Items that already
//! exist are only known through the snapshot of dated anchors.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::archive::{Extractor, Member};
use super::markdown;
use super::sheet;
use super::text::{depth, dir_path, file_name, find_date, level_from_date, normalize_title, strip_extension};
use crate::config::MigrationConfig;
use crate::files::{extension_of, guess_mime, IMAGE_EXTENSIONS};
use crate::model::{ItemStatus, TemplateType, WorkspaceItem};

const ATTACHMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "doc", "docx", "xls", "xlsx", "ppt", "pptx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    AggregateCsv,
    Csv,
    Markdown,
    Html,
    Image,
    Attachment,
    Ignored,
}

impl MemberKind {
    /// Kinds stored as file attachments of the page that owns them.
    /// Spreadsheets are parsed and also kept as files.
    pub fn is_asset(self) -> bool {
        matches!(
            self,
            MemberKind::Image | MemberKind::Attachment | MemberKind::Csv | MemberKind::AggregateCsv
        )
    }
}

pub fn classify(path: &str) -> MemberKind {
    let lower = path.to_ascii_lowercase();
    match extension_of(&lower).as_deref() {
        Some("csv") if lower.ends_with("_all.csv") => MemberKind::AggregateCsv,
        Some("csv") => MemberKind::Csv,
        Some("md") => MemberKind::Markdown,
        Some("html" | "htm") => MemberKind::Html,
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => MemberKind::Image,
        Some(ext) if ATTACHMENT_EXTENSIONS.contains(&ext) => MemberKind::Attachment,
        _ => MemberKind::Ignored,
    }
}

#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub item: WorkspaceItem,
    /// JSON content of the single block, if any.
    pub content: Option<String>,
}

/// A section appended to the first block of an item that already exists.
#[derive(Debug, Clone)]
pub struct Append {
    pub item_id: Uuid,
    pub source: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct PlannedAsset {
    pub item_id: Uuid,
    pub path: String,
    pub original_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub detected: Vec<String>,
    pub failures: Vec<String>,
    pub hints: Vec<String>,
    pub items: Vec<PlannedItem>,
    pub appends: Vec<Append>,
    /// Issue and memo text per date, merged across spreadsheets.
    pub day_notes: BTreeMap<NaiveDate, (String, String)>,
    pub assets: Vec<PlannedAsset>,
}

struct Planner {
    user_id: Uuid,
    plan: Plan,
    /// Index into `plan.items` for items created by this import.
    planned: HashMap<Uuid, usize>,
    due_dates: HashMap<Uuid, Option<NaiveDate>>,
    anchors: HashMap<NaiveDate, Uuid>,
    page_folders: HashMap<String, Uuid>,
}

/// Plan an import of `data` (an archive named `source`).
///
/// `anchors` maps each due date to the caller's most recently updated item
/// with that date.
pub fn build(
    user_id: Uuid,
    source: &str,
    data: &[u8],
    limits: &MigrationConfig,
    anchors: HashMap<NaiveDate, Uuid>,
) -> Plan {
    let (members, failures) = Extractor::new(limits).run(source, data);

    let due_dates = anchors.iter().map(|(date, id)| (*id, Some(*date))).collect();
    let mut planner = Planner {
        user_id,
        plan: Plan {
            failures,
            ..Default::default()
        },
        planned: HashMap::new(),
        due_dates,
        anchors,
        page_folders: HashMap::new(),
    };

    let classified: Vec<(MemberKind, &Member)> = members.iter().map(|m| (classify(&m.path), m)).collect();

    for (kind, member) in &classified {
        match kind {
            MemberKind::AggregateCsv => planner.plan.detected.push(format!("csv-skip-all:{}", member.path)),
            MemberKind::Csv => planner.sheet(member),
            _ => {}
        }
    }

    let mut documents: Vec<(MemberKind, &Member)> = classified
        .iter()
        .filter(|(kind, _)| matches!(kind, MemberKind::Markdown | MemberKind::Html))
        .copied()
        .collect();
    documents.sort_by_key(|(_, m)| depth(&m.path));
    for (kind, member) in documents {
        planner.document(kind, member);
    }

    for (kind, member) in &classified {
        if kind.is_asset() {
            planner.asset(*kind, member);
        }
    }

    planner.plan
}

impl Planner {
    fn create(&mut self, item: WorkspaceItem, content: Option<String>) -> Uuid {
        let id = item.id;
        if let Some(date) = item.due_date {
            // Newest item wins as the anchor for its date.
            self.anchors.insert(date, id);
        }
        self.due_dates.insert(id, item.due_date);
        self.planned.insert(id, self.plan.items.len());
        self.plan.items.push(PlannedItem { item, content });
        id
    }

    fn sheet(&mut self, member: &Member) {
        self.plan.detected.push(format!("csv:{}", member.path));
        let parsed = sheet::parse(&member.path, &member.data);
        self.plan.failures.extend(parsed.failures);

        for row in parsed.rows {
            let mut item = WorkspaceItem::new(self.user_id, row.title);
            item.template_type = TemplateType::Worklog;
            item.status = ItemStatus::Todo;
            item.due_date = row.due_date;
            self.create(item, row.content);

            if let Some(date) = row.due_date {
                let (issue, memo) = self.plan.day_notes.entry(date).or_default();
                sheet::merge_text(issue, &row.issue);
                sheet::merge_text(memo, &row.memo);
            }
        }
    }

    fn document(&mut self, kind: MemberKind, member: &Member) {
        let path = member.path.as_str();
        let label = if kind == MemberKind::Markdown { "markdown" } else { "html" };
        self.plan.detected.push(format!("{}:{}", label, path));

        let Ok(text) = std::str::from_utf8(&member.data) else {
            self.plan
                .failures
                .push(format!("{} is not valid UTF-8 ({})", label, path));
            return;
        };
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let stem = normalize_title(strip_extension(file_name(path)));
        let (title, html, template) = match kind {
            MemberKind::Markdown => (
                markdown::first_heading(text).map(normalize_title).unwrap_or_else(|| stem.clone()),
                markdown::to_html(text),
                markdown::infer_template(text),
            ),
            _ => (
                stem.clone(),
                crate::html::sanitize(&crate::html::body_inner_html(text)),
                TemplateType::Free,
            ),
        };

        let parent = self.parent_for(path);
        if let Some(parent_id) = parent {
            if level_from_date(path) >= 2 {
                if html.trim().is_empty() {
                    return;
                }
                let section = format!("<hr /><h3>{}</h3>{}", crate::html::escape(&stem), html);
                self.append(parent_id, path, section);
                return;
            }
        }

        let due_date = find_date(&format!("{} {}", title, path));
        if parent.is_none() {
            if let Some(anchor) = due_date.and_then(|d| self.anchors.get(&d).copied()) {
                if !html.trim().is_empty() {
                    let section = format!("<hr /><h3>{}</h3>{}", crate::html::escape(&stem), html);
                    self.append(anchor, path, section);
                }
                self.register(path, anchor);
                return;
            }
        }

        let mut item = WorkspaceItem::new(self.user_id, title);
        item.template_type = template;
        item.parent_id = parent;
        item.due_date = due_date.or_else(|| parent.and_then(|p| self.due_dates.get(&p).copied().flatten()));

        let content = match kind {
            MemberKind::Markdown if html.trim().is_empty() => None,
            _ => Some(serde_json::json!({ "html": html }).to_string()),
        };
        let id = self.create(item, content);
        self.register(path, id);
    }

    /// Append to a planned item directly, or queue an append for an existing one.
    fn append(&mut self, item_id: Uuid, source: &str, section: String) {
        let Some(&index) = self.planned.get(&item_id) else {
            self.plan.appends.push(Append {
                item_id,
                source: source.to_string(),
                html: section,
            });
            return;
        };
        let planned = &mut self.plan.items[index];
        planned.content = Some(append_html(planned.content.as_deref(), &section));
    }

    fn register(&mut self, path: &str, item_id: Uuid) {
        let dir = dir_path(path);
        let stem = strip_extension(file_name(path));
        let join = |name: &str| if dir.is_empty() { name.to_string() } else { format!("{}/{}", dir, name) };
        self.page_folders.insert(join(stem), item_id);
        self.page_folders.insert(join(&normalize_title(stem)), item_id);
    }

    /// Item registered for the nearest ancestor directory.
    fn parent_for(&self, path: &str) -> Option<Uuid> {
        let mut dir = dir_path(path);
        while !dir.is_empty() {
            if let Some(id) = self.page_folders.get(dir) {
                return Some(*id);
            }
            dir = dir_path(dir);
        }
        None
    }

    /// Item whose page folder is the longest prefix of `path`.
    fn owner_of_asset(&self, path: &str) -> Option<Uuid> {
        self.page_folders
            .iter()
            .filter(|(folder, _)| path.starts_with(&format!("{}/", folder)))
            .max_by_key(|(folder, _)| folder.len())
            .map(|(_, id)| *id)
    }

    fn asset(&mut self, kind: MemberKind, member: &Member) {
        let Some(item_id) = self.owner_of_asset(&member.path) else {
            // Loose spreadsheets were already imported as rows.
            if matches!(kind, MemberKind::Image | MemberKind::Attachment) {
                self.plan
                    .hints
                    .push(format!("{} has no matching page and was not attached", member.path));
            }
            return;
        };
        let original_name = file_name(&member.path).to_string();
        self.plan.assets.push(PlannedAsset {
            item_id,
            path: member.path.clone(),
            mime_type: guess_mime(&original_name),
            original_name,
            data: member.data.clone(),
        });
    }
}

/// Add `section` to the `html` field of planned block content.
pub fn append_html(content: Option<&str>, section: &str) -> String {
    let mut object = content
        .and_then(|c| serde_json::from_str::<Map<String, Value>>(c).ok())
        .unwrap_or_default();
    let current = object.get("html").and_then(Value::as_str).unwrap_or_default();
    let merged = format!("{}{}", current, section);
    object.insert("html".to_string(), Value::String(merged));
    Value::Object(object).to_string()
}
