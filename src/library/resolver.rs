//! Transitive library resolution.
//!
//! Walks the dependency graph declared in library manifests, depth first,
//! fetching through the [`LibraryStore`]. The result keeps at most one
//! version per library name: whichever version is reached first wins, and
//! later edges asking for a different version are logged and skipped.
//! That policy lives entirely in [`merge_first_seen`], which is consulted
//! before anything is fetched.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::store::LibraryStore;
use crate::domain::{DependencySet, LibraryBundle, LibraryIdentifier, MergeOutcome};
use crate::error::{CompileError, Result};

/// Decide how `id` merges into the set: the first version seen per name wins.
///
/// An `Err` aborts resolution, so a stricter policy can reject conflicts here.
pub fn merge_first_seen(set: &DependencySet, id: &LibraryIdentifier) -> Result<MergeOutcome> {
    Ok(match set.get_by_name(&id.name) {
        None => MergeOutcome::Added,
        Some(existing) if existing.identifier.same_version(id) => MergeOutcome::AlreadyPresent,
        Some(existing) => MergeOutcome::Conflict {
            kept: existing.identifier.clone(),
        },
    })
}

/// Resolves full dependency sets through a library store
pub struct LibraryResolver {
    store: Arc<LibraryStore>,
}

/// A library whose dependencies are being walked
struct Frame {
    bundle: Arc<LibraryBundle>,
    next: usize,
    dependencies: Vec<LibraryIdentifier>,
}

impl LibraryResolver {
    pub fn new(store: Arc<LibraryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LibraryStore> {
        &self.store
    }

    /// Resolve `root` and everything it transitively depends on
    #[instrument(skip(self), fields(root = %root))]
    pub async fn resolve(&self, root: &LibraryIdentifier) -> Result<DependencySet> {
        let mut set = DependencySet::new();
        self.resolve_into(root, &mut set).await?;
        Ok(set)
    }

    /// Resolve the package root plus every required library into one set
    ///
    /// The root goes first so it always wins a version conflict.
    #[instrument(skip(self, required), fields(root = %root, required = required.len()))]
    pub async fn resolve_for_document(
        &self,
        root: &LibraryIdentifier,
        required: &[LibraryIdentifier],
    ) -> Result<DependencySet> {
        let mut set = DependencySet::new();
        self.resolve_into(root, &mut set).await?;
        for id in required {
            self.resolve_into(id, &mut set).await?;
        }
        debug!(libraries = set.len(), "Resolved document dependencies");
        Ok(set)
    }

    /// Depth-first walk from `root`, merging into `set`
    async fn resolve_into(&self, root: &LibraryIdentifier, set: &mut DependencySet) -> Result<()> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut in_progress: HashSet<String> = HashSet::new();

        if let Some(frame) = self.enter(root, None, set, &stack, &in_progress).await? {
            in_progress.insert(frame.bundle.identifier.cache_key());
            stack.push(frame);
        }

        while let Some(top) = stack.last_mut() {
            if top.next >= top.dependencies.len() {
                if let Some(done) = stack.pop() {
                    in_progress.remove(&done.bundle.identifier.cache_key());
                }
                continue;
            }

            let dependency = top.dependencies[top.next].clone();
            top.next += 1;
            let parent = top.bundle.identifier.clone();

            if let Some(frame) = self
                .enter(&dependency, Some(&parent), set, &stack, &in_progress)
                .await?
            {
                in_progress.insert(frame.bundle.identifier.cache_key());
                stack.push(frame);
            }
        }

        Ok(())
    }

    /// Handle one edge; returns a frame when the target still needs walking
    async fn enter(
        &self,
        id: &LibraryIdentifier,
        parent: Option<&LibraryIdentifier>,
        set: &mut DependencySet,
        stack: &[Frame],
        in_progress: &HashSet<String>,
    ) -> Result<Option<Frame>> {
        if in_progress.contains(&id.cache_key()) {
            let mut chain: Vec<String> = stack
                .iter()
                .map(|f| f.bundle.identifier.cache_key())
                .collect();
            chain.push(id.cache_key());
            return Err(CompileError::Cycle { chain });
        }

        match merge_first_seen(set, id)? {
            MergeOutcome::AlreadyPresent => Ok(None),
            MergeOutcome::Conflict { kept } => {
                warn!(
                    library = %id.name,
                    kept = %kept.library_string(),
                    requested = %id.library_string(),
                    required_by = %parent.map(LibraryIdentifier::library_string).unwrap_or_default(),
                    "Library version conflict, keeping first resolved version"
                );
                Ok(None)
            }
            MergeOutcome::Added => {
                let bundle = self.store.get(id).await?;
                set.insert(Arc::clone(&bundle));
                debug!(library = %bundle.identifier, "Added dependency");
                let dependencies = bundle.manifest.declared_dependencies().collect();
                Ok(Some(Frame {
                    bundle,
                    next: 0,
                    dependencies,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LibraryManifest;
    use std::collections::BTreeMap;

    fn bundle(name: &str, minor: u32) -> Arc<LibraryBundle> {
        let manifest = LibraryManifest {
            title: name.to_string(),
            machine_name: name.to_string(),
            major_version: 1,
            minor_version: minor,
            patch_version: 0,
            runnable: 0,
            preloaded_dependencies: Vec::new(),
            dynamic_dependencies: Vec::new(),
            editor_dependencies: Vec::new(),
            preloaded_js: Vec::new(),
            preloaded_css: Vec::new(),
            embed_types: Vec::new(),
        };
        Arc::new(LibraryBundle {
            identifier: manifest.identifier(),
            manifest,
            assets: BTreeMap::new(),
        })
    }

    #[test]
    fn test_merge_first_seen_keeps_first_version() {
        let mut set = DependencySet::new();
        let a = LibraryIdentifier::new("A", 1, 2);

        assert_eq!(merge_first_seen(&set, &a).unwrap(), MergeOutcome::Added);
        set.insert(bundle("A", 2));

        assert_eq!(
            merge_first_seen(&set, &a.clone().with_patch(9)).unwrap(),
            MergeOutcome::AlreadyPresent
        );
        assert_eq!(
            merge_first_seen(&set, &LibraryIdentifier::new("A", 1, 3)).unwrap(),
            MergeOutcome::Conflict { kept: a }
        );
        assert_eq!(
            merge_first_seen(&set, &LibraryIdentifier::new("B", 1, 0)).unwrap(),
            MergeOutcome::Added
        );
        // Deciding never inserts
        assert_eq!(set.len(), 1);
    }
}
