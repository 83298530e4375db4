//! Media content: `image` and `audio`.
//!
//! Both load their `source` (local path relative to the document, or an
//! http(s) URL) into the package and reference it by its content-relative
//! path.

use async_trait::async_trait;
use serde_json::json;

use super::context::extension_of;
use super::{optional_str, require_str, ContentHandler, ProcessContext};
use crate::domain::{ContentFragment, ContentNode, LibraryIdentifier, MediaKind, DEFAULT_LICENSE};
use crate::error::{FieldError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "ogg", "wav"];

fn require_source(node: &ContentNode, allowed: &[&str]) -> std::result::Result<(), FieldError> {
    let source = require_str(node, "source")?;
    match extension_of(source) {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(()),
        _ => Err(FieldError::new(
            "source",
            format!("must end in one of: {}", allowed.join(", ")),
        )),
    }
}

/// Image with alt text
pub struct ImageHandler;

#[async_trait]
impl ContentHandler for ImageHandler {
    fn type_tag(&self) -> &str {
        "image"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_source(node, IMAGE_EXTENSIONS)?;
        require_str(node, "alt")?;
        optional_str(node, "title")?;
        Ok(())
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let source = node.str_field("source").unwrap_or_default();
        let alt = node.str_field("alt").unwrap_or_default();
        let title = node.str_field("title").unwrap_or(alt);

        let asset = ctx.load_media(MediaKind::Image, source).await?;

        let fragment = ContentFragment {
            library: self.main_library(),
            params: json!({
                "contentName": "Image",
                "file": {
                    "path": asset.destination,
                    "mime": asset.mime,
                    "copyright": { "license": DEFAULT_LICENSE },
                },
                "alt": alt,
                "title": title,
                "decorative": false,
            }),
            title: title.to_string(),
            content_type: "Image".to_string(),
            sub_content_id: ctx.next_sub_content_id(),
        };
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        LibraryIdentifier::new("H5P.Image", 1, 1)
    }
}

/// Audio clip
pub struct AudioHandler;

#[async_trait]
impl ContentHandler for AudioHandler {
    fn type_tag(&self) -> &str {
        "audio"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_source(node, AUDIO_EXTENSIONS)?;
        optional_str(node, "title")?;
        Ok(())
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let source = node.str_field("source").unwrap_or_default();
        let title = node.str_field("title").unwrap_or("Audio");

        let asset = ctx.load_media(MediaKind::Audio, source).await?;

        let fragment = ContentFragment {
            library: self.main_library(),
            params: json!({
                "files": [{
                    "path": asset.destination,
                    "mime": asset.mime,
                    "copyright": { "license": DEFAULT_LICENSE },
                }],
                "playerMode": "minimalistic",
                "fitToWrapper": false,
                "controls": true,
                "autoplay": false,
            }),
            title: title.to_string(),
            content_type: "Audio".to_string(),
            sub_content_id: ctx.next_sub_content_id(),
        };
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        LibraryIdentifier::new("H5P.Audio", 1, 5)
    }
}
