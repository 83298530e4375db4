//! h5pack - compile declarative content documents into H5P packages
//!
//! A document lists content items (text, images, questions, AI-generated
//! material). h5pack turns each item into H5P content, fetches and caches
//! the libraries that content needs, and writes a single `.h5p` archive.
//!
//! # Pipeline
//!
//! - Every node is looked up in the handler registry and validated first
//! - Handlers run in document order and emit content fragments and media
//! - Required libraries are resolved transitively, first version wins
//! - The assembler writes the archive to a temp file and renames it
//!
//! # Modules
//!
//! - `domain`: Data structures (Document, LibraryIdentifier, ContentTree)
//! - `library`: Library source, on-disk store, dependency resolver
//! - `handlers`: Content handlers and their registry
//! - `core`: Compiler and package assembler
//! - `adapters`: AI text generators (OpenAI-compatible, Fabric)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Compile a document
//! h5pack compile course.yaml course.h5p
//!
//! # Inspect the library cache
//! h5pack cache list
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod library;

// Re-export main types at crate root for convenience
pub use crate::core::{CompileOptions, Compiler, PackageAssembler};
pub use adapters::Generator;
pub use domain::{CompiledPackage, ContentNode, Document, LibraryIdentifier, PackageKind};
pub use error::{CompileError, FieldError};
pub use handlers::{ContentHandler, HandlerRegistry, ProcessContext};
pub use library::{LibraryResolver, LibrarySource, LibraryStore};
