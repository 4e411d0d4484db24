use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;

use crate::commit::{Commit, Outcome};
use crate::error::{Result, StoreError};
use crate::model::{Branch, BranchPath, Timepoint};

/// A monotonic source of commit timepoints shared by every branch in the
/// registry. Per the design notes, ordering within a branch must never
/// depend on wall-clock time — a single counter behind a lock suffices,
/// and since every branch `head`/`base` value is itself a tick of this
/// same counter, a fresh tick is always greater than any existing head.
#[derive(Default)]
pub struct LogicalClock(AtomicI64);

impl LogicalClock {
    pub fn new() -> Self {
        LogicalClock(AtomicI64::new(0))
    }

    pub fn tick(&self) -> Timepoint {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn peek(&self) -> Timepoint {
        self.0.load(Ordering::SeqCst)
    }
}

/// The branch registry contract: names a tree of branches and tracks each
/// one's head/base timepoints and lock state (spec §4.1). Defined as a
/// trait so a real deployment can back it with the same KV index used for
/// components, without changing callers.
pub trait BranchRegistry: Send + Sync {
    fn create(&self, path: BranchPath) -> Result<Branch>;
    fn find(&self, path: &BranchPath) -> Result<Option<Branch>>;
    fn exists(&self, path: &BranchPath) -> bool {
        matches!(self.find(path), Ok(Some(_)))
    }
    fn children(&self, path: &BranchPath) -> Result<Vec<Branch>>;

    /// The branch's ancestor chain, nearest first, each resolved to its
    /// current `Branch` record. Used to build a `BranchCriteria` for
    /// anything beyond the branch itself (reads, promote replay).
    fn ancestor_branches(&self, path: &BranchPath) -> Result<Vec<Branch>> {
        path.ancestors()
            .iter()
            .map(|p| {
                self.find(p)?
                    .ok_or_else(|| StoreError::BranchNotFound(p.clone()))
            })
            .collect()
    }

    /// Acquires the branch's exclusive commit lock and returns a `Commit`
    /// timestamped strictly after the branch's current head. Fails with
    /// `Locked` if another commit is already open on this branch.
    fn open_commit(&self, path: &BranchPath) -> Result<Commit>;

    /// Closes a commit opened via `open_commit`, advancing `head` on
    /// success and always releasing the branch lock.
    fn close_commit(&self, commit: Commit, outcome: Outcome) -> Result<()>;

    /// Updates `base` to the parent's current head. Conflict detection and
    /// resolution is the caller's responsibility (see `pipeline` and
    /// `Commit::conflicts_since_base`); this call only performs the base
    /// pointer advance once conflicts are resolved.
    fn rebase(&self, path: &BranchPath) -> Result<()>;

    /// Advances the parent's head to a new timepoint and resets the
    /// child's base/head to that same timepoint, emptying its outstanding
    /// changes. Returns `(child_before, parent_before, new_timepoint)` —
    /// snapshots of both branches as they stood immediately before the
    /// pointer flip, and the timepoint assigned to the parent's new head —
    /// so the caller can replay the child's authored component versions
    /// onto the parent via `store::promote` before (or after) this call
    /// takes effect. This method only moves branch pointers; it does not
    /// touch component rows (see `store::promote` for the data replay).
    fn promote(&self, path: &BranchPath) -> Result<(Branch, Branch, Timepoint)>;
}

struct Entry {
    branch: Branch,
}

/// Reference implementation of [`BranchRegistry`] over an in-process map.
/// Production deployments persist the same fields through the component
/// store's KV index instead.
pub struct InMemoryBranchRegistry {
    branches: RwLock<HashMap<BranchPath, Entry>>,
    clock: LogicalClock,
}

impl Default for InMemoryBranchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBranchRegistry {
    pub fn new() -> Self {
        let registry = InMemoryBranchRegistry {
            branches: RwLock::new(HashMap::new()),
            clock: LogicalClock::new(),
        };
        let head = registry.clock.tick();
        registry.branches.write().insert(
            BranchPath::main(),
            Entry {
                branch: Branch {
                    path: BranchPath::main(),
                    base: head,
                    head,
                    locked: false,
                    metadata: Default::default(),
                },
            },
        );
        registry
    }
}

impl BranchRegistry for InMemoryBranchRegistry {
    #[tracing::instrument(skip(self))]
    fn create(&self, path: BranchPath) -> Result<Branch> {
        let mut guard = self.branches.write();
        if guard.contains_key(&path) {
            return Err(StoreError::AlreadyExists(path));
        }
        let parent_head = if path.is_main() {
            None
        } else {
            let parent_path = path
                .parent()
                .ok_or_else(|| StoreError::ParentMissing(path.clone()))?;
            let parent = guard
                .get(&parent_path)
                .ok_or_else(|| StoreError::ParentMissing(path.clone()))?;
            Some(parent.branch.head)
        };

        let now = self.clock.tick();
        let base = parent_head.unwrap_or(now);
        let branch = Branch {
            path: path.clone(),
            base,
            head: now,
            locked: false,
            metadata: Default::default(),
        };
        guard.insert(path, Entry { branch: branch.clone() });
        debug!(branch = %branch.path, base, head = now, "created branch");
        Ok(branch)
    }

    fn find(&self, path: &BranchPath) -> Result<Option<Branch>> {
        Ok(self.branches.read().get(path).map(|e| e.branch.clone()))
    }

    fn children(&self, path: &BranchPath) -> Result<Vec<Branch>> {
        Ok(self
            .branches
            .read()
            .values()
            .filter(|e| e.branch.parent().as_ref() == Some(path))
            .map(|e| e.branch.clone())
            .collect())
    }

    #[tracing::instrument(skip(self))]
    fn open_commit(&self, path: &BranchPath) -> Result<Commit> {
        let mut guard = self.branches.write();
        let entry = guard
            .get_mut(path)
            .ok_or_else(|| StoreError::BranchNotFound(path.clone()))?;
        if entry.branch.locked {
            return Err(StoreError::Locked(path.clone()));
        }
        entry.branch.locked = true;
        let timepoint = self.clock.tick();
        debug_assert!(timepoint > entry.branch.head);
        Ok(Commit::new(path.clone(), timepoint))
    }

    #[tracing::instrument(skip(self, commit))]
    fn close_commit(&self, commit: Commit, outcome: Outcome) -> Result<()> {
        let mut guard = self.branches.write();
        let entry = guard
            .get_mut(&commit.path)
            .ok_or_else(|| StoreError::BranchNotFound(commit.path.clone()))?;
        match outcome {
            Outcome::Success | Outcome::RebaseSuccess => {
                entry.branch.head = commit.timepoint;
                info!(branch = %commit.path, head = commit.timepoint, "commit closed");
            }
            Outcome::Rollback => {
                warn!(branch = %commit.path, timepoint = commit.timepoint, "commit rolled back");
            }
        }
        entry.branch.locked = false;
        Ok(())
    }

    fn rebase(&self, path: &BranchPath) -> Result<()> {
        let mut guard = self.branches.write();
        let parent_head = {
            let entry = guard
                .get(path)
                .ok_or_else(|| StoreError::BranchNotFound(path.clone()))?;
            let parent_path = entry
                .branch
                .parent()
                .ok_or_else(|| StoreError::ParentMissing(path.clone()))?;
            guard
                .get(&parent_path)
                .ok_or_else(|| StoreError::ParentMissing(path.clone()))?
                .branch
                .head
        };
        let entry = guard.get_mut(path).unwrap();
        entry.branch.base = parent_head;
        Ok(())
    }

    fn promote(&self, path: &BranchPath) -> Result<(Branch, Branch, Timepoint)> {
        let mut guard = self.branches.write();
        let (parent_path, child_before) = {
            let entry = guard
                .get(path)
                .ok_or_else(|| StoreError::BranchNotFound(path.clone()))?;
            (
                entry
                    .branch
                    .parent()
                    .ok_or_else(|| StoreError::ParentMissing(path.clone()))?,
                entry.branch.clone(),
            )
        };
        let parent_before = guard
            .get(&parent_path)
            .ok_or_else(|| StoreError::ParentMissing(path.clone()))?
            .branch
            .clone();
        let new_parent_head = self.clock.tick();
        {
            let parent = guard.get_mut(&parent_path).unwrap();
            parent.branch.head = new_parent_head;
        }
        let child = guard.get_mut(path).unwrap();
        child.branch.base = new_parent_head;
        child.branch.head = new_parent_head;
        debug!(branch = %path, promoted_from_head = child_before.head, into = %parent_path, new_head = new_parent_head, "promoted branch");
        Ok((child_before, parent_before, new_parent_head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_existing_parent() {
        let reg = InMemoryBranchRegistry::new();
        let err = reg.create(BranchPath::new("MAIN/A/B")).unwrap_err();
        assert!(matches!(err, StoreError::ParentMissing(_)));
    }

    #[test]
    fn create_twice_fails() {
        let reg = InMemoryBranchRegistry::new();
        reg.create(BranchPath::new("MAIN/A")).unwrap();
        let err = reg.create(BranchPath::new("MAIN/A")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn open_commit_locks_branch() {
        let reg = InMemoryBranchRegistry::new();
        let main = BranchPath::main();
        let commit = reg.open_commit(&main).unwrap();
        let err = reg.open_commit(&main).unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)));
        reg.close_commit(commit, Outcome::Success).unwrap();
        assert!(reg.open_commit(&main).is_ok());
    }

    #[test]
    fn child_inherits_parent_head_as_base() {
        let reg = InMemoryBranchRegistry::new();
        let main_before = reg.find(&BranchPath::main()).unwrap().unwrap();
        let child = reg.create(BranchPath::new("MAIN/A")).unwrap();
        assert_eq!(child.base, main_before.head);
    }
}
