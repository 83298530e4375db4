//! Package archive construction.
//!
//! The archive is built fully in memory, then written next to the
//! destination and renamed over it, so a failed compile or write never
//! leaves a partial package behind.

use std::io::{Cursor, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{CompiledPackage, LibraryBundle, LIBRARY_MANIFEST};
use crate::error::{CompileError, Result};

/// Name of the package manifest entry
pub const PACKAGE_MANIFEST: &str = "h5p.json";

/// Name of the content tree entry
pub const CONTENT_JSON: &str = "content/content.json";

/// Writes compiled packages as zip archives
pub struct PackageAssembler;

impl PackageAssembler {
    /// Build the complete archive in memory
    #[instrument(skip(package), fields(title = %package.manifest.title))]
    pub fn assemble(package: &CompiledPackage) -> Result<Vec<u8>> {
        for bundle in package.dependencies.iter() {
            check_assets(bundle)?;
        }

        let mut archive = ArchiveWriter::new();
        archive.write_json(PACKAGE_MANIFEST, &package.manifest)?;
        archive.write_json(CONTENT_JSON, &package.tree.to_content_json())?;

        for asset in &package.media {
            archive.write(&asset.archive_path(), &asset.bytes)?;
        }

        for bundle in package.dependencies.iter() {
            let dir = bundle.identifier.dir_name();
            for (path, bytes) in &bundle.assets {
                archive.write(&format!("{}/{}", dir, path), bytes)?;
            }
        }

        let bytes = archive.finish()?;
        debug!(bytes = bytes.len(), "Assembled package archive");
        Ok(bytes)
    }
}

/// Every library must still carry its manifest and preloaded assets
fn check_assets(bundle: &LibraryBundle) -> Result<()> {
    let required = std::iter::once(LIBRARY_MANIFEST).chain(bundle.manifest.required_assets());
    for asset in required {
        if !bundle.has_asset(asset) {
            return Err(CompileError::MissingAsset {
                library: bundle.identifier.clone(),
                asset: asset.to_string(),
            });
        }
    }
    Ok(())
}

/// Thin wrapper fixing entry options for reproducible archives
struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl ArchiveWriter {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(zip::DateTime::default()),
        }
    }

    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.zip.start_file(name, self.options)?;
        self.zip
            .write_all(bytes)
            .map_err(|e| CompileError::Archive(format!("failed to write '{}': {}", name, e)))
    }

    fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| CompileError::Archive(format!("failed to encode '{}': {}", name, e)))?;
        self.write(name, &bytes)
    }

    fn finish(self) -> Result<Vec<u8>> {
        Ok(self.zip.finish()?.into_inner())
    }
}

/// Write archive bytes to `path` atomically
///
/// Bytes go to a temp file in the destination directory which is then
/// renamed over `path`. On failure the temp file is removed and any
/// existing file at `path` is left as it was.
pub fn write_package(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_error = |source: std::io::Error| CompileError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut file = NamedTempFile::new_in(parent).map_err(write_error)?;
    file.write_all(bytes).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|e| write_error(e.error))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote package");
    Ok(())
}
