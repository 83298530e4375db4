//! Plain text content (`text`).

use async_trait::async_trait;
use serde_json::json;

use super::{optional_str, require_str, ContentHandler, ProcessContext};
use crate::domain::{ContentFragment, ContentNode, LibraryIdentifier};
use crate::error::{FieldError, Result};

pub fn advanced_text_library() -> LibraryIdentifier {
    LibraryIdentifier::new("H5P.AdvancedText", 1, 1)
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape and wrap text in `<p>` elements, one per blank-line block
pub fn paragraphs(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            let lines: Vec<String> = block.lines().map(|l| escape_html(l.trim())).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect()
}

/// AdvancedText fragment holding already-rendered HTML
pub fn text_fragment(ctx: &mut ProcessContext, title: &str, html: String) -> ContentFragment {
    ContentFragment {
        library: advanced_text_library(),
        params: json!({ "text": html }),
        title: title.to_string(),
        content_type: "Text".to_string(),
        sub_content_id: ctx.next_sub_content_id(),
    }
}

/// Static text block
pub struct TextHandler;

#[async_trait]
impl ContentHandler for TextHandler {
    fn type_tag(&self) -> &str {
        "text"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_str(node, "text")?;
        optional_str(node, "title")?;
        Ok(())
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let text = node.str_field("text").unwrap_or_default();
        let title = node.str_field("title").unwrap_or("Text");

        let fragment = text_fragment(ctx, title, paragraphs(text));
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        advanced_text_library()
    }
}
