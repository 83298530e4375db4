//! Per-compile state shared by handlers.
//!
//! One context lives for a whole compile run. Nodes are processed in order,
//! so media counters and sub-content ids are sequential and deterministic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::adapters::Generator;
use crate::domain::{mime_for, ContentFragment, Document, GenerationConfig, MediaAsset, MediaKind};
use crate::error::{CompileError, Result};

/// System prompt used when neither document nor node sets one
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You write clear, accurate learning content. Answer with the requested content only.";

/// Mutable state threaded through handler `process` calls
pub struct ProcessContext {
    document_title: String,
    base_dir: Option<PathBuf>,
    scope_generation: GenerationConfig,
    generator: Arc<dyn Generator>,
    http: reqwest::Client,

    path: String,
    generation: GenerationConfig,
    fragment: Option<ContentFragment>,
    node_media: Vec<String>,

    media_counters: HashMap<MediaKind, usize>,
    sub_content_counter: u64,
    media: Vec<MediaAsset>,
}

impl ProcessContext {
    pub fn new(document: &Document, generator: Arc<dyn Generator>, http: reqwest::Client) -> Self {
        Self {
            document_title: document.title.clone(),
            base_dir: document.base_dir.clone(),
            scope_generation: document.generation.clone().unwrap_or_default(),
            generator,
            http,
            path: String::new(),
            generation: GenerationConfig::default(),
            fragment: None,
            node_media: Vec::new(),
            media_counters: HashMap::new(),
            sub_content_counter: 0,
            media: Vec::new(),
        }
    }

    /// Reset per-node state before a handler runs
    pub(crate) fn begin_node(&mut self, path: &str, generation: Option<&GenerationConfig>) {
        self.path = path.to_string();
        self.generation = self.scope_generation.overlay(generation);
        self.fragment = None;
        self.node_media.clear();
    }

    /// Take what the handler emitted for the current node
    pub(crate) fn finish_node(&mut self) -> (Option<ContentFragment>, Vec<String>) {
        (self.fragment.take(), std::mem::take(&mut self.node_media))
    }

    /// All media collected during the run
    pub(crate) fn into_media(self) -> Vec<MediaAsset> {
        self.media
    }

    /// Path of the node being processed, e.g. `content[2]`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Generation settings in effect for the current node
    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Emit the fragment for the current node
    pub fn emit(&mut self, fragment: ContentFragment) {
        if self.fragment.is_some() {
            debug!(path = %self.path, "Handler emitted more than one fragment, keeping the last");
        }
        self.fragment = Some(fragment);
    }

    /// Next deterministic sub-content id for this document
    pub fn next_sub_content_id(&mut self) -> String {
        self.sub_content_counter += 1;
        let name = format!("h5pack:{}:{}", self.document_title, self.sub_content_counter);
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
    }

    /// Send one generation request using the node's prompt settings
    pub async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let system_prompt = self
            .generation
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let user_prompt = match self.generation.instructions.as_deref() {
            Some(instructions) if !instructions.trim().is_empty() => {
                format!("{}\n\n{}", prompt, instructions.trim())
            }
            _ => prompt.to_string(),
        };

        debug!(path = %self.path, generator = self.generator.name(), "Requesting generated content");
        self.generator.generate(system_prompt, &user_prompt).await
    }

    /// Register already-loaded media bytes; returns the content-relative path
    pub fn add_media(&mut self, kind: MediaKind, source: &str, bytes: Vec<u8>) -> MediaAsset {
        let counter = self.media_counters.entry(kind).or_insert(0);
        *counter += 1;

        let extension = extension_of(source).unwrap_or_else(|| "bin".to_string());
        let destination = format!(
            "{}/{}-{}.{}",
            kind.directory(),
            kind.prefix(),
            counter,
            extension
        );

        let asset = MediaAsset {
            source: source.to_string(),
            bytes,
            mime: mime_for(&destination).to_string(),
            destination: destination.clone(),
        };

        self.node_media.push(destination);
        self.media.push(asset.clone());
        asset
    }

    /// Load a local path or http(s) URL and register it as media
    pub async fn load_media(&mut self, kind: MediaKind, source: &str) -> Result<MediaAsset> {
        let bytes = if is_remote(source) {
            self.fetch_remote(source).await
        } else {
            let path = self.resolve_local(source);
            tokio::fs::read(&path)
                .await
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))
        }
        .map_err(|reason| CompileError::Media {
            path: self.path.clone(),
            source_ref: source.to_string(),
            reason,
        })?;

        Ok(self.add_media(kind, source, bytes))
    }

    fn resolve_local(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    async fn fetch_remote(&self, url: &str) -> std::result::Result<Vec<u8>, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed ({}); check network connectivity", e))?;

        if !response.status().is_success() {
            return Err(format!("server responded with {}", response.status()));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("failed to read response body: {}", e))
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Lower-cased extension of the last path segment, ignoring query strings
pub fn extension_of(source: &str) -> Option<String> {
    let without_query = source.split(['?', '#']).next().unwrap_or(source);
    let file_name = without_query.rsplit(['/', '\\']).next().unwrap_or(without_query);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}
