//! Extraction of library bundles from fetched archives.
//!
//! A fetched archive either holds a single library at its root
//! (`library.json`, `scripts/…`) or a whole package in which each library
//! lives under `<name>-<major>.<minor>/`. Only the requested library is
//! extracted; its embedded manifest must match the requested identity.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use tracing::debug;

use crate::domain::{LibraryBundle, LibraryIdentifier, LibraryManifest, LIBRARY_MANIFEST};
use crate::error::{CompileError, Result};

/// Read every file entry of a zip archive into memory
pub fn read_entries(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = BTreeMap::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        // Entries escaping the archive root are dropped
        let Some(path) = file.enclosed_name() else {
            continue;
        };
        let name = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| CompileError::Archive(format!("failed to read '{}': {}", name, e)))?;
        entries.insert(name, buf);
    }

    Ok(entries)
}

/// Locate the directory prefix holding the requested library's manifest
fn find_prefix(
    requested: &LibraryIdentifier,
    entries: &BTreeMap<String, Vec<u8>>,
) -> Option<String> {
    if entries.contains_key(LIBRARY_MANIFEST) {
        return Some(String::new());
    }

    let exact = format!("{}/", requested.dir_name());
    if entries.contains_key(&format!("{}{}", exact, LIBRARY_MANIFEST)) {
        return Some(exact);
    }

    // Another version of the same library; identity check reports it
    entries.iter().find_map(|(path, raw)| {
        let dir = path.strip_suffix(LIBRARY_MANIFEST)?;
        if dir.matches('/').count() != 1 {
            return None;
        }
        let manifest = LibraryManifest::from_slice(raw).ok()?;
        (manifest.machine_name == requested.name).then(|| dir.to_string())
    })
}

/// Library files under `prefix`, with the prefix stripped
fn assets_under(prefix: &str, entries: &BTreeMap<String, Vec<u8>>) -> BTreeMap<String, Vec<u8>> {
    entries
        .iter()
        .filter_map(|(path, data)| {
            path.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest.to_string(), data.clone()))
        })
        .collect()
}

fn requested_bundle(
    requested: &LibraryIdentifier,
    entries: &BTreeMap<String, Vec<u8>>,
) -> Result<(String, LibraryBundle)> {
    let prefix = find_prefix(requested, entries).ok_or_else(|| CompileError::Integrity {
        requested: requested.clone(),
        found: format!("no {} for {} in archive", LIBRARY_MANIFEST, requested.name),
    })?;

    let bundle = LibraryBundle::from_assets(assets_under(&prefix, entries)).map_err(|found| {
        CompileError::Integrity {
            requested: requested.clone(),
            found,
        }
    })?;

    if !bundle.identifier.same_version(requested) {
        return Err(CompileError::Integrity {
            requested: requested.clone(),
            found: format!("archive contains {}", bundle.identifier),
        });
    }

    Ok((prefix, bundle))
}

/// Extract and verify the requested library from archive bytes
pub fn extract_bundle(requested: &LibraryIdentifier, bytes: &[u8]) -> Result<LibraryBundle> {
    let entries = read_entries(bytes)?;
    requested_bundle(requested, &entries).map(|(_, bundle)| bundle)
}

/// Libraries of a package-layout archive other than the requested one.
///
/// Each comes with the identifier its directory name claims; callers check
/// it against the bundle's manifest before storing. Directories that do not
/// name a library or hold an unreadable manifest are skipped.
fn sibling_bundles(
    skip_prefix: &str,
    entries: &BTreeMap<String, Vec<u8>>,
) -> Vec<(LibraryIdentifier, LibraryBundle)> {
    entries
        .keys()
        .filter_map(|path| {
            let dir = path.strip_suffix(LIBRARY_MANIFEST)?.strip_suffix('/')?;
            if dir.contains('/') || format!("{}/", dir) == skip_prefix {
                return None;
            }
            let claimed: LibraryIdentifier = dir.parse().ok()?;
            match LibraryBundle::from_assets(assets_under(&format!("{}/", dir), entries)) {
                Ok(bundle) => Some((claimed, bundle)),
                Err(reason) => {
                    debug!(directory = dir, %reason, "Skipping unreadable library in archive");
                    None
                }
            }
        })
        .collect()
}

/// Extract the requested library plus every other library the archive ships
pub fn extract_libraries(
    requested: &LibraryIdentifier,
    bytes: &[u8],
) -> Result<(LibraryBundle, Vec<(LibraryIdentifier, LibraryBundle)>)> {
    let entries = read_entries(bytes)?;
    let (prefix, bundle) = requested_bundle(requested, &entries)?;
    let siblings = if prefix.is_empty() {
        Vec::new()
    } else {
        sibling_bundles(&prefix, &entries)
    };
    Ok((bundle, siblings))
}
