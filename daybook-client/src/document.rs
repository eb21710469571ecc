//! Item content as edited: one HTML document stored in block 0.

use daybook::model::{Block, BlockPayload, TemplateType};
use serde_json::Value;

use crate::links::FileLinks;

const EMPTY_DOCUMENT: &str = "<p></p>";

/// The editor's view of an item body. `html` is in display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDocument {
    pub html: String,
}

impl Default for ItemDocument {
    fn default() -> Self {
        Self {
            html: EMPTY_DOCUMENT.to_string(),
        }
    }
}

impl ItemDocument {
    /// Read the first block's `{html}`; anything else opens as an empty document.
    pub fn from_blocks(blocks: &[Block], links: &FileLinks) -> Self {
        let html = blocks
            .iter()
            .min_by_key(|b| b.sort_order)
            .and_then(|b| serde_json::from_str::<Value>(&b.content).ok())
            .and_then(|v| v.get("html").and_then(Value::as_str).map(str::to_string))
            .filter(|html| !html.is_empty());
        match html {
            Some(html) => Self {
                html: links.to_display(&html),
            },
            None => Self::default(),
        }
    }

    /// Starting content for a new item of the given template.
    pub fn template(template: TemplateType, date_text: &str) -> Self {
        let html = match template {
            TemplateType::Meeting => [
                format!("<h1>{} 회의록</h1>", date_text),
                "<p><strong>회의명</strong> :</p>".to_string(),
                "<p><strong>참석자</strong> :</p>".to_string(),
                "<p><strong>일시</strong> :</p>".to_string(),
                "<h2>안건</h2>".to_string(),
                "<ul><li>[ ] 안건 1</li><li>[ ] 안건 2</li></ul>".to_string(),
                "<h2>결정사항</h2>".to_string(),
                "<hr />".to_string(),
                "<h2>후속 작업</h2>".to_string(),
                "<ul><li>[ ] 담당자 / 마감일</li></ul>".to_string(),
            ]
            .concat(),
            TemplateType::Worklog => [
                format!("<h1>{} 업무일지</h1>", date_text),
                "<p>- 요청자 : </p>".to_string(),
                "<h2>요청내용</h2>".to_string(),
                "<pre><code>[내선] / [불편신고]\n요청 내용</code></pre>".to_string(),
                "<hr />".to_string(),
                "<h2>처리내용</h2>".to_string(),
                "<pre><code>처리내용 1</code></pre>".to_string(),
            ]
            .concat(),
            TemplateType::Free => "<p>자유롭게 작성하세요.</p>".to_string(),
        };
        Self { html }
    }

    /// Append an uploaded image. `url` is the `/files/...` path from the upload response.
    pub fn insert_image(&mut self, url: &str, links: &FileLinks) {
        if self.html == EMPTY_DOCUMENT {
            self.html.clear();
        }
        self.html.push_str(&format!(
            r#"<p><img src="{}" alt="image" /></p>"#,
            links.absolute(url)
        ));
    }

    /// The single block sent on save, links back in relative form.
    pub fn to_blocks(&self, links: &FileLinks) -> Vec<BlockPayload> {
        vec![BlockPayload::html(0, &links.to_storage(&self.html))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn block(sort_order: i32, content: &str) -> Block {
        Block {
            id: Uuid::new_v4(),
            item_id: Uuid::nil(),
            sort_order,
            block_type: "paragraph".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_from_blocks_uses_first_block() {
        let links = FileLinks::new("http://api.test");
        let blocks = vec![
            block(1, r#"{"html":"<p>second</p>"}"#),
            block(0, r#"{"html":"<img src=\"/files/a.png\">","worklog":{}}"#),
        ];
        let doc = ItemDocument::from_blocks(&blocks, &links);
        assert_eq!(doc.html, r#"<img src="http://api.test/files/a.png">"#);
    }

    #[test]
    fn test_unreadable_content_opens_empty() {
        let links = FileLinks::new("http://api.test");
        assert_eq!(ItemDocument::from_blocks(&[], &links), ItemDocument::default());
        let doc = ItemDocument::from_blocks(&[block(0, "not json")], &links);
        assert_eq!(doc.html, "<p></p>");
        let doc = ItemDocument::from_blocks(&[block(0, r#"{"html":5}"#)], &links);
        assert_eq!(doc.html, "<p></p>");
    }

    #[test]
    fn test_image_is_displayed_absolute_and_stored_relative() {
        let links = FileLinks::new("http://api.test/");
        let mut doc = ItemDocument::default();
        doc.insert_image("/files/abc.png", &links);
        assert_eq!(doc.html, r#"<p><img src="http://api.test/files/abc.png" alt="image" /></p>"#);

        let blocks = doc.to_blocks(&links);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sort_order, 0);
        let content: Value = serde_json::from_str(&blocks[0].content).unwrap();
        assert_eq!(content["html"], r#"<p><img src="/files/abc.png" alt="image" /></p>"#);
    }

    #[test]
    fn test_templates_match_import_heuristics() {
        let worklog = ItemDocument::template(TemplateType::Worklog, "2024-03-05");
        assert!(worklog.html.starts_with("<h1>2024-03-05 업무일지</h1>"));
        assert!(worklog.html.contains("요청자"));
        let meeting = ItemDocument::template(TemplateType::Meeting, "3/5");
        assert!(meeting.html.contains("회의록"));
    }
}
