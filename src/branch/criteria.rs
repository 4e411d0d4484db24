use crate::commit::Commit;
use crate::kv::{FieldValue, Query};
use crate::model::{Branch, BranchPath, Timepoint};

/// The visible-set predicate for a branch at a timepoint (spec §4.2).
/// One clause per ancestor, each pinned at the base timepoint that branch
/// was last synced at, plus the branch's own clause pinned at `head` (or
/// the in-flight commit's timepoint, for the "including open commit"
/// variant).
#[derive(Debug, Clone)]
pub struct BranchCriteria {
    /// `(path, as_of)` pairs, nearest branch first.
    clauses: Vec<(BranchPath, Timepoint)>,
}

impl BranchCriteria {
    /// Walks from `branch` up to `MAIN`, collecting the base timepoint each
    /// ancestor was last synced at, per spec §4.2's "walk from branch to
    /// MAIN" construction.
    pub fn for_branch(branch: &Branch, ancestors: &[Branch]) -> Self {
        let mut clauses = vec![(branch.path.clone(), branch.head)];
        let mut current_base = branch.base;
        for ancestor in ancestors {
            clauses.push((ancestor.path.clone(), current_base));
            current_base = ancestor.base;
        }
        BranchCriteria { clauses }
    }

    /// Same as `for_branch`, but the branch's own clause is pinned at the
    /// open commit's timepoint instead of the (not-yet-advanced) head, so
    /// a read inside the commit observes its own writes.
    pub fn including_open_commit(branch: &Branch, ancestors: &[Branch], commit: &Commit) -> Self {
        let mut criteria = Self::for_branch(branch, ancestors);
        criteria.clauses[0].1 = commit.timepoint;
        criteria
    }

    /// Lowers the criteria to a `Query` over rows carrying the standard
    /// `path`/`start`/`end` fields, suitable for passing straight to a
    /// `KvIndex::search`/`scan` call.
    pub fn to_query(&self) -> Query {
        Query::or(self.clauses.iter().map(|(path, as_of)| {
            Query::and([
                Query::Term("path", FieldValue::Str(path.as_str().to_string())),
                Query::Range {
                    field: "start",
                    from: std::ops::Bound::Unbounded,
                    to: std::ops::Bound::Included(*as_of),
                },
                Query::Or(vec![
                    Query::Term("end_absent", FieldValue::Bool(true)),
                    Query::Range {
                        field: "end",
                        from: std::ops::Bound::Excluded(*as_of),
                        to: std::ops::Bound::Unbounded,
                    },
                ]),
            ])
        }))
    }

    /// Which paths this criteria considers visible, nearest first — used by
    /// the store layer to implement shadowing (an entry on a nearer path
    /// hides same-component entries from farther ones).
    pub fn paths_by_priority(&self) -> Vec<&BranchPath> {
        self.clauses.iter().map(|(p, _)| p).collect()
    }

    pub fn as_of(&self, path: &BranchPath) -> Option<Timepoint> {
        self.clauses
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, t)| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(path: &str, base: Timepoint, head: Timepoint) -> Branch {
        Branch {
            path: BranchPath::new(path),
            base,
            head,
            locked: false,
            metadata: Default::default(),
        }
    }

    #[test]
    fn single_branch_criteria_pins_own_head() {
        let main = branch("MAIN", 0, 10);
        let criteria = BranchCriteria::for_branch(&main, &[]);
        assert_eq!(criteria.as_of(&BranchPath::main()), Some(10));
    }

    #[test]
    fn child_criteria_pins_ancestor_at_base() {
        let main = branch("MAIN", 0, 10);
        let child = branch("MAIN/A", 5, 8);
        let criteria = BranchCriteria::for_branch(&child, &[main]);
        assert_eq!(criteria.as_of(&BranchPath::new("MAIN/A")), Some(8));
        assert_eq!(criteria.as_of(&BranchPath::main()), Some(5));
    }
}
