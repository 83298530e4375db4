//! Compiled content: fragments, media assets and the content tree.
//!
//! Fragments are the handler outputs that end up in `content/content.json`.
//! Media assets are the files handlers pulled in along the way.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::document::PackageKind;
use super::library::LibraryIdentifier;

/// Default license code for generated metadata ("undisclosed")
pub const DEFAULT_LICENSE: &str = "U";

/// One compiled content item, as embedded in the content tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFragment {
    /// Library that renders this fragment
    pub library: LibraryIdentifier,

    /// Library-specific parameters
    pub params: Value,

    /// Human-readable title (metadata)
    pub title: String,

    /// Content type label shown by editors (metadata)
    pub content_type: String,

    /// Stable identifier of this sub-content
    pub sub_content_id: String,
}

impl ContentFragment {
    /// Serialize as an embedded sub-content object
    pub fn to_json(&self) -> Value {
        json!({
            "library": self.library.library_string(),
            "params": self.params,
            "subContentId": self.sub_content_id,
            "metadata": {
                "contentType": self.content_type,
                "license": DEFAULT_LICENSE,
                "title": self.title,
            },
        })
    }
}

/// Media categories with their package subdirectory and file prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// Content-relative directory (`images`, `audios`)
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Audio => "audios",
        }
    }

    /// File name prefix (`image-1.png`)
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

/// A media file collected while processing a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    /// Original path or URL as written in the document
    pub source: String,

    /// Loaded file contents
    pub bytes: Vec<u8>,

    /// Path relative to the `content/` directory, e.g. `images/image-1.png`
    pub destination: String,

    /// MIME type derived from the file extension
    pub mime: String,
}

impl MediaAsset {
    /// Archive path of this asset
    pub fn archive_path(&self) -> String {
        format!("content/{}", self.destination)
    }
}

/// The compiled form of one document node
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNode {
    /// Node path, e.g. `content[0]`
    pub path: String,

    /// Content-type tag of the source node
    pub type_tag: String,

    /// Fragment emitted by the handler
    pub fragment: ContentFragment,

    /// Content-relative paths of media this node references
    pub media_refs: Vec<String>,
}

/// Ordered compiled nodes plus the package shape that wraps them
#[derive(Debug, Clone, PartialEq)]
pub struct ContentTree {
    pub kind: PackageKind,
    pub nodes: Vec<CompiledNode>,
}

impl ContentTree {
    pub fn new(kind: PackageKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
        }
    }

    pub fn push(&mut self, node: CompiledNode) {
        self.nodes.push(node);
    }

    /// Build the `content/content.json` document
    pub fn to_content_json(&self) -> Value {
        match self.kind {
            PackageKind::Column => {
                let items: Vec<Value> = self
                    .nodes
                    .iter()
                    .map(|node| {
                        json!({
                            "content": node.fragment.to_json(),
                            "useSeparator": "auto",
                        })
                    })
                    .collect();
                json!({ "content": items })
            }
            PackageKind::Single => self
                .nodes
                .first()
                .map(|node| node.fragment.params.clone())
                .unwrap_or_else(|| json!({})),
        }
    }
}

/// MIME type for a media file name, by extension
pub fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str) -> ContentFragment {
        ContentFragment {
            library: LibraryIdentifier::new("H5P.AdvancedText", 1, 1),
            params: json!({ "text": text }),
            title: "Intro".to_string(),
            content_type: "Text".to_string(),
            sub_content_id: "abc".to_string(),
        }
    }

    fn node(text: &str) -> CompiledNode {
        CompiledNode {
            path: "content[0]".to_string(),
            type_tag: "text".to_string(),
            fragment: fragment(text),
            media_refs: Vec::new(),
        }
    }

    #[test]
    fn test_fragment_json_shape() {
        let value = fragment("<p>Hello</p>").to_json();
        assert_eq!(value["library"], "H5P.AdvancedText 1.1");
        assert_eq!(value["params"]["text"], "<p>Hello</p>");
        assert_eq!(value["subContentId"], "abc");
        assert_eq!(value["metadata"]["title"], "Intro");
        assert_eq!(value["metadata"]["license"], "U");
    }

    #[test]
    fn test_column_tree_wraps_fragments() {
        let mut tree = ContentTree::new(PackageKind::Column);
        tree.push(node("one"));
        tree.push(node("two"));

        let value = tree.to_content_json();
        let items = value["content"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["content"]["params"]["text"], "two");
        assert_eq!(items[0]["useSeparator"], "auto");
    }

    #[test]
    fn test_single_tree_is_bare_params() {
        let mut tree = ContentTree::new(PackageKind::Single);
        tree.push(node("only"));
        assert_eq!(tree.to_content_json(), json!({ "text": "only" }));
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("photo.JPG"), "image/jpeg");
        assert_eq!(mime_for("clip.mp3"), "audio/mpeg");
        assert_eq!(mime_for("noext"), "application/octet-stream");
        assert_eq!(mime_for("clip.mp4"), "application/octet-stream");
    }

    #[test]
    fn test_media_kind_layout() {
        assert_eq!(MediaKind::Image.directory(), "images");
        assert_eq!(MediaKind::Audio.prefix(), "audio");
        assert!(serde_json::from_value::<MediaKind>(json!("video")).is_err());
    }
}
