//! Minimal line-based Markdown rendering for exported pages.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::TemplateType;

static WON_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"₩([^₩]{1,200})₩").expect("static regex"));
static BACKTICK_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]{1,300})`").expect("static regex"));
static IMAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!\[[^\]]*\]\(([^)]+)\)$").expect("static regex"));

/// Escape `&`, `<` and `>`, then turn `₩code₩` and `` `code` `` into `<code>`.
pub fn inline_code(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let won = WON_CODE.replace_all(&escaped, "<code>$1</code>");
    BACKTICK_CODE
        .replace_all(&won, "<code>$1</code>")
        .into_owned()
}

fn close_list(html: &mut String, open: &mut bool) {
    if *open {
        html.push_str("</ul>");
        *open = false;
    }
}

fn list_item(html: &mut String, open: &mut bool, body: &str) {
    if !*open {
        html.push_str("<ul>");
        *open = true;
    }
    html.push_str("<li>");
    html.push_str(&inline_code(body));
    html.push_str("</li>");
}

pub fn to_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut in_list = false;
    let mut in_code = false;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            close_list(&mut html, &mut in_list);
            html.push_str(if in_code { "</code></pre>" } else { "<pre><code>" });
            in_code = !in_code;
            continue;
        }
        if in_code {
            html.push_str(&crate::html::escape(line));
            html.push('\n');
            continue;
        }
        if trimmed.is_empty() {
            close_list(&mut html, &mut in_list);
            continue;
        }
        if trimmed == "---" || trimmed == "----------" {
            close_list(&mut html, &mut in_list);
            html.push_str("<hr />");
            continue;
        }

        let heading = [("### ", "h3"), ("## ", "h2"), ("# ", "h1")]
            .into_iter()
            .find_map(|(marker, tag)| trimmed.strip_prefix(marker).map(|rest| (tag, rest)));
        if let Some((tag, rest)) = heading {
            close_list(&mut html, &mut in_list);
            html.push_str(&format!("<{tag}>{}</{tag}>", inline_code(rest)));
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("- [ ] ") {
            list_item(&mut html, &mut in_list, &format!("☐ {}", rest));
            continue;
        }
        if let Some(rest) = trimmed
            .strip_prefix("- [x] ")
            .or_else(|| trimmed.strip_prefix("- [X] "))
        {
            list_item(&mut html, &mut in_list, &format!("☑ {}", rest));
            continue;
        }
        let bullet = ["- ", "▪️", "🔸"]
            .into_iter()
            .find_map(|marker| trimmed.strip_prefix(marker));
        if let Some(rest) = bullet {
            list_item(&mut html, &mut in_list, rest.trim());
            continue;
        }

        close_list(&mut html, &mut in_list);
        if let Some(caps) = IMAGE_LINE.captures(trimmed) {
            html.push_str(&format!(
                r#"<p><img src="{}" alt="image" /></p>"#,
                crate::html::escape(&caps[1])
            ));
        } else {
            html.push_str(&format!("<p>{}</p>", inline_code(trimmed)));
        }
    }

    close_list(&mut html, &mut in_list);
    if in_code {
        html.push_str("</code></pre>");
    }
    html
}

/// Text of the first `# ` heading.
pub fn first_heading(markdown: &str) -> Option<&str> {
    markdown
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Worklog exports mention the requester, meeting notes say so.
pub fn infer_template(content: &str) -> TemplateType {
    if ["요청자", "요청내용", "[내선]"].iter().any(|k| content.contains(k)) {
        TemplateType::Worklog
    } else if content.contains("회의") || content.contains("회의록") {
        TemplateType::Meeting
    } else {
        TemplateType::Free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_and_paragraphs() {
        let html = to_html("# Title\n\nplain & <b>\n## Sub\n### Third");
        assert_eq!(
            html,
            "<h1>Title</h1><p>plain &amp; &lt;b&gt;</p><h2>Sub</h2><h3>Third</h3>"
        );
    }

    #[test]
    fn test_lists_and_checklists() {
        let html = to_html("- [ ] open\n- [x] done\n- plain\n▪️ dotted\n🔸 diamond\n\nafter");
        assert_eq!(
            html,
            "<ul><li>☐ open</li><li>☑ done</li><li>plain</li><li>dotted</li><li>diamond</li></ul><p>after</p>"
        );
    }

    #[test]
    fn test_code_fence_keeps_lines() {
        let html = to_html("```\nlet a = 1 < 2;\n  indented\n```\ntext");
        assert_eq!(
            html,
            "<pre><code>let a = 1 &lt; 2;\n  indented\n</code></pre><p>text</p>"
        );
    }

    #[test]
    fn test_unterminated_fence_is_closed() {
        assert_eq!(to_html("```\ncode"), "<pre><code>code\n</code></pre>");
    }

    #[test]
    fn test_rules_and_images() {
        let html = to_html("---\n![shot](Page/img%201.png)\n----------");
        assert_eq!(
            html,
            r#"<hr /><p><img src="Page/img%201.png" alt="image" /></p><hr />"#
        );
    }

    #[test]
    fn test_inline_code() {
        assert_eq!(inline_code("run `ls -l` now"), "run <code>ls -l</code> now");
        assert_eq!(inline_code("₩SELECT 1₩"), "<code>SELECT 1</code>");
        assert_eq!(inline_code("a < b"), "a &lt; b");
        assert_eq!(inline_code("``"), "``");
    }

    #[test]
    fn test_first_heading() {
        assert_eq!(first_heading("intro\n# Real title\n# Second"), Some("Real title"));
        assert_eq!(first_heading("## only sub"), None);
    }

    #[test]
    fn test_infer_template() {
        assert_eq!(infer_template("요청자: 김"), TemplateType::Worklog);
        assert_eq!(infer_template("주간 회의록"), TemplateType::Meeting);
        assert_eq!(infer_template("nothing"), TemplateType::Free);
    }
}
