//! Domain types for the h5pack compiler.
//!
//! This module contains the core data structures:
//! - Document: typed input (title, language, content nodes)
//! - Library: identifiers, manifests, bundles, dependency sets
//! - Content: fragments, media assets, the compiled content tree
//! - Package: the `h5p.json` manifest and the compiled package

pub mod content;
pub mod document;
pub mod library;
pub mod package;

// Re-export commonly used types
pub use content::{
    mime_for, CompiledNode, ContentFragment, ContentTree, MediaAsset, MediaKind, DEFAULT_LICENSE,
};
pub use document::{ContentNode, Document, GenerationConfig, PackageKind};
pub use library::{
    DependencyRef, DependencySet, LibraryBundle, LibraryIdentifier, LibraryManifest,
    MergeOutcome, LIBRARY_MANIFEST,
};
pub use package::{CompiledPackage, PackageManifest};
