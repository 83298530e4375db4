//! Library fetching, caching and dependency resolution.
//!
//! - `source`: where library archives come from (HTTP by default)
//! - `archive`: extracting one library from fetched archive bytes
//! - `store`: the on-disk cache keyed by `name-major.minor`
//! - `resolver`: transitive, first-seen-wins dependency resolution

pub mod archive;
pub mod resolver;
pub mod source;
pub mod store;

pub use resolver::{merge_first_seen, LibraryResolver};
pub use source::{HttpLibrarySource, LibrarySource, DEFAULT_URL_TEMPLATE};
pub use store::{CacheEntry, LibraryStore};
