//! The compiled package and its `h5p.json` manifest.

use serde::{Deserialize, Serialize};

use super::content::{ContentTree, MediaAsset, DEFAULT_LICENSE};
use super::library::{DependencyRef, DependencySet, LibraryIdentifier};

/// Top-level package manifest (`h5p.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub title: String,
    pub language: String,
    /// Machine name of the root library
    pub main_library: String,
    pub embed_types: Vec<String>,
    pub license: String,
    pub default_language: String,
    /// Flattened dependency list, root library included
    pub preloaded_dependencies: Vec<DependencyRef>,
}

impl PackageManifest {
    pub fn new(
        title: &str,
        language: &str,
        root: &LibraryIdentifier,
        dependencies: &DependencySet,
    ) -> Self {
        Self {
            title: title.to_string(),
            language: language.to_string(),
            main_library: root.name.clone(),
            embed_types: vec!["div".to_string()],
            license: DEFAULT_LICENSE.to_string(),
            default_language: language.to_string(),
            preloaded_dependencies: dependencies
                .iter()
                .map(|bundle| DependencyRef::from(&bundle.identifier))
                .collect(),
        }
    }

    /// Root library reference, looked up in the dependency list
    pub fn root(&self) -> Option<&DependencyRef> {
        self.preloaded_dependencies
            .iter()
            .find(|dep| dep.machine_name == self.main_library)
    }
}

/// Everything the assembler needs to write one package
#[derive(Debug, Clone)]
pub struct CompiledPackage {
    pub manifest: PackageManifest,
    pub root: LibraryIdentifier,
    pub tree: ContentTree,
    pub dependencies: DependencySet,
    pub media: Vec<MediaAsset>,
}
