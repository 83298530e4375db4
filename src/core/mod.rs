//! Compilation core.
//!
//! - Compiler: validates a document, runs handlers, resolves libraries
//! - Assembler: builds the package archive and writes it atomically

pub mod assembler;
pub mod compiler;

pub use assembler::{write_package, PackageAssembler};
pub use compiler::{CompileOptions, Compiler};
