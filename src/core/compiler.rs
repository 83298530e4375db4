//! Document compilation.
//!
//! Checks every node up front, runs the handlers in document order, then
//! resolves the libraries the invoked handlers declared. Any error aborts
//! the whole compile; nothing is written until a complete package exists.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::assembler::{write_package, PackageAssembler};
use crate::adapters::Generator;
use crate::domain::{
    CompiledNode, CompiledPackage, ContentTree, Document, LibraryIdentifier, PackageKind,
    PackageManifest,
};
use crate::error::{CompileError, Result};
use crate::handlers::{ContentHandler, HandlerRegistry, ProcessContext};
use crate::library::LibraryResolver;

/// Compile-wide settings
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Root library of `column` packages
    pub column_library: LibraryIdentifier,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            column_library: LibraryIdentifier::new("H5P.Column", 1, 18),
        }
    }
}

/// Turns documents into compiled packages
pub struct Compiler {
    registry: Arc<HandlerRegistry>,
    resolver: LibraryResolver,
    generator: Arc<dyn Generator>,
    http: reqwest::Client,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        resolver: LibraryResolver,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            registry,
            resolver,
            generator,
            http: reqwest::Client::new(),
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Client used to download remote media
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn resolver(&self) -> &LibraryResolver {
        &self.resolver
    }

    /// Compile a document into an in-memory package
    #[instrument(skip(self, document), fields(title = %document.title, nodes = document.content.len()))]
    pub async fn compile(&self, document: &Document) -> Result<CompiledPackage> {
        info!("Compiling document");

        let handlers = self.check_document(document)?;
        let root = match document.kind {
            PackageKind::Column => self.options.column_library.clone(),
            PackageKind::Single => handlers
                .first()
                .map(|h| h.main_library())
                .ok_or_else(|| CompileError::InvalidDocument("document has no content".into()))?,
        };

        let mut ctx = ProcessContext::new(document, Arc::clone(&self.generator), self.http.clone());
        let mut tree = ContentTree::new(document.kind);
        let mut required: Vec<LibraryIdentifier> = Vec::new();

        for (index, (node, handler)) in document.content.iter().zip(&handlers).enumerate() {
            let path = Document::node_path(index);
            debug!(%path, tag = %node.type_tag, "Processing node");

            ctx.begin_node(&path, node.generation.as_ref());
            handler.process(&mut ctx, node).await?;
            let (fragment, media_refs) = ctx.finish_node();
            let fragment = fragment.ok_or_else(|| {
                CompileError::InvalidDocument(format!(
                    "handler for '{}' produced no content at {}",
                    node.type_tag, path
                ))
            })?;
            if document.kind == PackageKind::Single && !fragment.library.same_version(&root) {
                return Err(CompileError::InvalidDocument(format!(
                    "handler for '{}' produced {} content at {}, but the package root is {}",
                    node.type_tag, fragment.library, path, root
                )));
            }

            for library in handler.required_libraries() {
                if !required.iter().any(|r| r.same_version(&library)) {
                    required.push(library);
                }
            }

            tree.push(CompiledNode {
                path,
                type_tag: node.type_tag.clone(),
                fragment,
                media_refs,
            });
        }

        let dependencies = self.resolver.resolve_for_document(&root, &required).await?;
        let manifest = PackageManifest::new(&document.title, &document.language, &root, &dependencies);
        let media = ctx.into_media();

        info!(
            root = %root,
            libraries = dependencies.len(),
            media = media.len(),
            "Compiled document"
        );

        Ok(CompiledPackage {
            manifest,
            root,
            tree,
            dependencies,
            media,
        })
    }

    /// Compile, assemble and atomically write the package to `output`
    #[instrument(skip(self, document), fields(output = %output.display()))]
    pub async fn package(&self, document: &Document, output: &Path) -> Result<CompiledPackage> {
        let package = self.compile(document).await?;
        let bytes = PackageAssembler::assemble(&package)?;
        write_package(output, &bytes)?;
        info!(bytes = bytes.len(), "Package written");
        Ok(package)
    }

    /// Look up and validate every node before any is processed
    fn check_document(&self, document: &Document) -> Result<Vec<&dyn ContentHandler>> {
        if document.title.trim().is_empty() {
            return Err(CompileError::InvalidDocument("title must not be empty".into()));
        }
        if document.content.is_empty() {
            return Err(CompileError::InvalidDocument("document has no content".into()));
        }
        if document.kind == PackageKind::Single && document.content.len() != 1 {
            return Err(CompileError::InvalidDocument(format!(
                "a single package needs exactly one content node, found {}",
                document.content.len()
            )));
        }

        let mut handlers = Vec::with_capacity(document.content.len());
        for (index, node) in document.content.iter().enumerate() {
            let path = Document::node_path(index);
            let handler = self.registry.lookup(&node.type_tag).ok_or_else(|| {
                CompileError::UnknownContentType {
                    tag: node.type_tag.clone(),
                    path: path.clone(),
                }
            })?;

            if document.kind == PackageKind::Column && !handler.embeddable() {
                return Err(CompileError::InvalidDocument(format!(
                    "content type '{}' at {} cannot be embedded in a column; use kind: single",
                    node.type_tag, path
                )));
            }

            handler.validate(node).map_err(|e| e.at(&path))?;
            handlers.push(handler);
        }

        Ok(handlers)
    }
}
