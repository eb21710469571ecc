//! HTML helpers shared by the board summary, migration, and backup restore.

use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::sync::LazyLock;

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("static selector"));

static LINK_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<(?:img|a)\b[^>]*?\s(?:src|href)\s*=\s*)(["'])([^"']*)(["'])"#)
        .expect("static regex")
});

/// Escape text for use inside element content or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relaxed allow-list: structure, tables, links, images, code and `hr`.
/// Scripts, styles and event handler attributes are removed.
pub fn sanitize(html: &str) -> String {
    ammonia::Builder::default()
        .add_tags(["hr", "figure", "figcaption", "mark"])
        .clean(html)
        .to_string()
}

/// Inner HTML of `<body>`; fragments come back unchanged in structure.
pub fn body_inner_html(document: &str) -> String {
    let parsed = Html::parse_document(document);
    parsed
        .select(&BODY)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// Undo the entity escapes that `escape` and exporters put into attribute values.
pub fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Rewrite `img[src]` / `a[href]` values for which `lookup` returns a replacement.
/// `lookup` sees the decoded attribute value.
pub fn rewrite_links<F>(html: &str, lookup: F) -> (String, usize)
where
    F: Fn(&str) -> Option<String>,
{
    let mut rewritten = 0;
    let out = LINK_ATTR.replace_all(html, |caps: &Captures<'_>| {
        let value = decode_entities(&caps[3]);
        match lookup(&value) {
            Some(new_value) => {
                rewritten += 1;
                format!("{}{}{}{}", &caps[1], &caps[2], escape(&new_value), &caps[4])
            }
            None => caps[0].to_string(),
        }
    });
    (out.into_owned(), rewritten)
}

/// Decode `%XX` escapes; invalid sequences are kept verbatim.
pub fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}
