//! Named-file-set registry and output-group resolver.
//!
//! The tool announces build outputs as a DAG of "named file sets" referenced
//! by opaque ids, and `TargetCompleted` events attach root ids to named
//! output groups. Nothing here does I/O; the index is a single-writer,
//! per-invocation structure owned by the interpreter.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use buildbridge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One node of the tool's output DAG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFileSet {
    pub files: BTreeSet<PathBuf>,
    pub children: HashSet<String>,
}

/// Immutable view of the index handed back in the invocation result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputIndexSnapshot {
    file_sets: HashMap<String, NamedFileSet>,
    group_roots: HashMap<String, HashSet<String>>,
    root_targets: BTreeSet<String>,
}

impl OutputIndexSnapshot {
    /// Labels of the targets whose completion was observed directly
    #[must_use]
    pub fn root_targets(&self) -> &BTreeSet<String> {
        &self.root_targets
    }

    /// Names of all output groups that accumulated roots
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        self.group_roots.keys().map(String::as_str).collect()
    }

    /// All files reachable from `group`'s roots, deduplicated
    #[must_use]
    pub fn resolve_group_files_transitive(&self, group: &str) -> BTreeSet<PathBuf> {
        let Some(roots) = self.group_roots.get(group) else {
            return BTreeSet::new();
        };

        let mut resolved = BTreeSet::new();
        let mut visited: HashSet<String> = roots.iter().cloned().collect();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();

        while let Some(id) = queue.pop_front() {
            // A referenced set that never arrived is skipped, not an error:
            // upstream ordering does not promise children before parents.
            let Some(set) = self.file_sets.get(&id) else {
                trace!(id, "referenced file set was never registered");
                continue;
            };
            resolved.extend(set.files.iter().cloned());
            for child in &set.children {
                if visited.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
        resolved
    }
}

/// Mutable per-invocation registry. Not thread-safe by design: exactly one
/// interpreter drives it.
#[derive(Debug, Default)]
pub struct OutputIndex {
    inner: OutputIndexSnapshot,
}

impl OutputIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the file set registered under `id`
    pub fn register_file_set(
        &mut self,
        id: &str,
        files: impl IntoIterator<Item = PathBuf>,
        children: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid_input("named file set with an empty id"));
        }
        self.inner.file_sets.insert(
            id.to_string(),
            NamedFileSet {
                files: files.into_iter().collect(),
                children: children.into_iter().collect(),
            },
        );
        Ok(())
    }

    /// Add `root_ids` to the accumulated roots of `group`. Additive across
    /// calls: a build may complete several targets into the same group.
    pub fn register_group_roots(
        &mut self,
        group: &str,
        root_ids: impl IntoIterator<Item = String>,
    ) {
        self.inner
            .group_roots
            .entry(group.to_string())
            .or_default()
            .extend(root_ids);
    }

    /// Remember a target whose completion event was observed directly
    pub fn record_root_target(&mut self, label: &str) {
        self.inner.root_targets.insert(label.to_string());
    }

    /// All files reachable from `group`'s roots; empty when the group was
    /// never registered
    #[must_use]
    pub fn resolve_group_files_transitive(&self, group: &str) -> BTreeSet<PathBuf> {
        self.inner.resolve_group_files_transitive(group)
    }

    /// Reset everything; called when a new invocation starts
    pub fn clear(&mut self) {
        self.inner = OutputIndexSnapshot::default();
    }

    #[must_use]
    pub fn snapshot(&self) -> OutputIndexSnapshot {
        self.inner.clone()
    }
}
