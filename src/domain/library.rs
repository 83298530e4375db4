//! Library identifiers, manifests and bundles.
//!
//! A library is a versioned bundle of scripts, styles and a `library.json`
//! manifest that a viewer needs to render one content type.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of the manifest file inside every library directory
pub const LIBRARY_MANIFEST: &str = "library.json";

/// Whether `name` is a usable library machine name (`H5P.MultiChoice`).
///
/// Names become cache directories and archive paths, so only ASCII
/// letters, digits, `.`, `_` and `-` are allowed, with no leading dot and
/// no `..`.
pub fn is_machine_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Library identity: machine name plus semantic version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryIdentifier {
    pub name: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl LibraryIdentifier {
    pub fn new(name: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
            patch: 0,
        }
    }

    pub fn with_patch(mut self, patch: u32) -> Self {
        self.patch = patch;
        self
    }

    /// Normalized cache key and archive directory name (`H5P.Column-1.18`)
    pub fn cache_key(&self) -> String {
        format!("{}-{}.{}", self.name, self.major, self.minor)
    }

    /// Directory name used inside packages; identical to the cache key
    pub fn dir_name(&self) -> String {
        self.cache_key()
    }

    /// Form used by content trees to reference a library (`H5P.Column 1.18`)
    pub fn library_string(&self) -> String {
        format!("{} {}.{}", self.name, self.major, self.minor)
    }

    pub fn has_valid_name(&self) -> bool {
        is_machine_name(&self.name)
    }

    /// Same name, major and minor; patch is ignored
    pub fn same_version(&self, other: &Self) -> bool {
        self.name == other.name && self.major == other.major && self.minor == other.minor
    }
}

impl fmt::Display for LibraryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.name, self.major, self.minor, self.patch)
    }
}

/// Parse error for library identifier strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid library identifier '{0}' (expected e.g. 'H5P.Column 1.18')")]
pub struct ParseIdentifierError(String);

impl FromStr for LibraryIdentifier {
    type Err = ParseIdentifierError;

    /// Accepts `Name 1.2`, `Name-1.2` and `Name 1.2.3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdentifierError(s.to_string());
        let s = s.trim();

        let (name, version) = s
            .rsplit_once(' ')
            .or_else(|| s.rsplit_once('-'))
            .ok_or_else(err)?;

        let name = name.trim();
        if !is_machine_name(name) {
            return Err(err());
        }

        let mut parts = version.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| err())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self {
            name: name.to_string(),
            major,
            minor,
            patch,
        })
    }
}

impl Serialize for LibraryIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LibraryIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Dependency reference as it appears in manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

impl DependencyRef {
    pub fn identifier(&self) -> LibraryIdentifier {
        LibraryIdentifier::new(&self.machine_name, self.major_version, self.minor_version)
    }
}

impl From<&LibraryIdentifier> for DependencyRef {
    fn from(id: &LibraryIdentifier) -> Self {
        Self {
            machine_name: id.name.clone(),
            major_version: id.major,
            minor_version: id.minor,
        }
    }
}

/// Script or stylesheet entry in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub path: String,
}

/// The `library.json` manifest of a library
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryManifest {
    #[serde(default)]
    pub title: String,
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    #[serde(default)]
    pub patch_version: u32,
    #[serde(default)]
    pub runnable: u8,
    #[serde(default)]
    pub preloaded_dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub dynamic_dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub editor_dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub preloaded_js: Vec<AssetRef>,
    #[serde(default)]
    pub preloaded_css: Vec<AssetRef>,
    #[serde(default)]
    pub embed_types: Vec<String>,
}

impl LibraryManifest {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn identifier(&self) -> LibraryIdentifier {
        LibraryIdentifier::new(&self.machine_name, self.major_version, self.minor_version)
            .with_patch(self.patch_version)
    }

    pub fn is_runnable(&self) -> bool {
        self.runnable == 1
    }

    /// Dependencies a viewer needs; editor dependencies are excluded
    pub fn declared_dependencies(&self) -> impl Iterator<Item = LibraryIdentifier> + '_ {
        self.preloaded_dependencies
            .iter()
            .chain(self.dynamic_dependencies.iter())
            .map(DependencyRef::identifier)
    }

    /// First machine name, own or referenced, that is not usable as a path
    pub fn invalid_name(&self) -> Option<&str> {
        std::iter::once(&self.machine_name)
            .chain(
                self.preloaded_dependencies
                    .iter()
                    .chain(&self.dynamic_dependencies)
                    .chain(&self.editor_dependencies)
                    .map(|d| &d.machine_name),
            )
            .map(String::as_str)
            .find(|name| !is_machine_name(name))
    }

    /// Asset paths the manifest says must ship with the library
    pub fn required_assets(&self) -> impl Iterator<Item = &str> {
        self.preloaded_js
            .iter()
            .chain(self.preloaded_css.iter())
            .map(|a| a.path.as_str())
    }
}

/// A fetched library: identity, parsed manifest and all files verbatim
#[derive(Debug, Clone)]
pub struct LibraryBundle {
    pub identifier: LibraryIdentifier,
    pub manifest: LibraryManifest,
    /// Library-relative path -> bytes, including `library.json`
    pub assets: BTreeMap<String, Vec<u8>>,
}

impl LibraryBundle {
    /// Build a bundle from its files, parsing `library.json`
    pub fn from_assets(assets: BTreeMap<String, Vec<u8>>) -> Result<Self, String> {
        let raw = assets
            .get(LIBRARY_MANIFEST)
            .ok_or_else(|| format!("missing {}", LIBRARY_MANIFEST))?;
        let manifest = LibraryManifest::from_slice(raw)
            .map_err(|e| format!("unreadable {}: {}", LIBRARY_MANIFEST, e))?;
        if let Some(name) = manifest.invalid_name() {
            return Err(format!("invalid machine name '{}' in {}", name, LIBRARY_MANIFEST));
        }

        Ok(Self {
            identifier: manifest.identifier(),
            manifest,
            assets,
        })
    }

    pub fn has_asset(&self, path: &str) -> bool {
        self.assets.contains_key(path)
    }
}

/// How a library identifier merges into a [`DependencySet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No library with this name yet; fetch it and insert it
    Added,
    /// Same name and version already present
    AlreadyPresent,
    /// A different version of the same name is already present; it is kept
    Conflict { kept: LibraryIdentifier },
}

/// Ordered, name-unique set of libraries a package needs
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    entries: Vec<Arc<LibraryBundle>>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LibraryBundle>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry registered under `name`, whatever its version
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<LibraryBundle>> {
        self.entries.iter().find(|b| b.identifier.name == name)
    }

    pub fn contains(&self, id: &LibraryIdentifier) -> bool {
        self.get_by_name(&id.name)
            .is_some_and(|b| b.identifier.same_version(id))
    }

    /// Add a bundle unless its name is already present; returns whether it was added
    pub fn insert(&mut self, bundle: Arc<LibraryBundle>) -> bool {
        if self.get_by_name(&bundle.identifier.name).is_some() {
            return false;
        }
        self.entries.push(bundle);
        true
    }

    /// Identifiers in resolution order
    pub fn identifiers(&self) -> Vec<LibraryIdentifier> {
        self.entries.iter().map(|b| b.identifier.clone()).collect()
    }
}
