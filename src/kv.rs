//! The "Persistent KV index" external collaborator (§6): a generic,
//! term-queryable, paginated store over component versions. Production
//! deployments back this with a real inverted index; this module defines
//! the trait contract plus an in-memory reference implementation used by
//! the rest of the crate's tests.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A scalar value the index can match on. Every indexable row projects its
/// filterable fields into this small set rather than exposing arbitrary
/// Rust types to the query layer. `Serialize`/`Deserialize` let a KV backend
/// wire-encode query clauses and document fields the same way the teacher's
/// `backends/serde.rs` leans on `serde_json` for its own table codecs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}
impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Anything the index can store and filter on projects its queryable
/// surface through this trait.
pub trait Indexable: Clone + Send + Sync + 'static {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// Boolean query composition over indexed fields: term, terms-in, range,
/// and/or/not. Mirrors the "term query, terms-in query, boolean
/// composition, range" clause set required by §6.
#[derive(Debug, Clone)]
pub enum Query {
    All,
    Term(&'static str, FieldValue),
    TermsIn(&'static str, Vec<FieldValue>),
    Range {
        field: &'static str,
        from: Bound<i64>,
        to: Bound<i64>,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn and(clauses: impl IntoIterator<Item = Query>) -> Query {
        Query::And(clauses.into_iter().collect())
    }

    pub fn or(clauses: impl IntoIterator<Item = Query>) -> Query {
        Query::Or(clauses.into_iter().collect())
    }

    fn matches<T: Indexable>(&self, row: &T) -> bool {
        match self {
            Query::All => true,
            Query::Term(field, value) => row.field(field).as_ref() == Some(value),
            Query::TermsIn(field, values) => {
                row.field(field).map(|v| values.contains(&v)).unwrap_or(false)
            }
            Query::Range { field, from, to } => match row.field(field) {
                Some(FieldValue::Int(v)) => in_range(v, from, to),
                _ => false,
            },
            Query::And(clauses) => clauses.iter().all(|c| c.matches(row)),
            Query::Or(clauses) => clauses.iter().any(|c| c.matches(row)),
            Query::Not(inner) => !inner.matches(row),
        }
    }
}

fn in_range(v: i64, from: &Bound<i64>, to: &Bound<i64>) -> bool {
    let lower_ok = match from {
        Bound::Included(l) => v >= *l,
        Bound::Excluded(l) => v > *l,
        Bound::Unbounded => true,
    };
    let upper_ok = match to {
        Bound::Included(u) => v <= *u,
        Bound::Excluded(u) => v < *u,
        Bound::Unbounded => true,
    };
    lower_ok && upper_ok
}

/// Zero-based page request; `offsets produce disjoint pages` per the
/// boundary-behavior invariant in spec.md §8.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        PageRequest { offset: 0, limit }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// The index contract required by the component store. `K` is the
/// document key (a string encoding of componentId/path/start, chosen by
/// the repository layer); `T` is the row payload.
pub trait KvIndex<K: Ord + Clone + Send + Sync + 'static, T: Indexable>: Send + Sync {
    fn bulk_upsert(&self, rows: Vec<(K, T)>) -> Result<()>;
    fn bulk_delete(&self, keys: &[K]) -> Result<()>;
    fn search(&self, query: &Query, page: PageRequest) -> Result<Page<T>>;
    /// Unbounded streaming scan, for index rebuilds and compaction.
    fn scan(&self, query: &Query) -> Result<Vec<T>>;
    fn get(&self, key: &K) -> Result<Option<T>>;
}

/// Reference in-memory implementation: a sorted map guarded by a lock,
/// evaluating queries by linear scan. Adequate for tests and small
/// deployments; a production deployment swaps this for a real inverted
/// index without touching callers.
pub struct InMemoryKvIndex<K: Ord + Clone, T> {
    rows: RwLock<BTreeMap<K, T>>,
}

impl<K: Ord + Clone, T> Default for InMemoryKvIndex<K, T> {
    fn default() -> Self {
        InMemoryKvIndex {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone, T> InMemoryKvIndex<K, T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, T> KvIndex<K, T> for InMemoryKvIndex<K, T>
where
    K: Ord + Clone + Send + Sync + 'static,
    T: Indexable,
{
    fn bulk_upsert(&self, rows: Vec<(K, T)>) -> Result<()> {
        let mut guard = self.rows.write();
        for (k, v) in rows {
            guard.insert(k, v);
        }
        Ok(())
    }

    fn bulk_delete(&self, keys: &[K]) -> Result<()> {
        let mut guard = self.rows.write();
        for k in keys {
            guard.remove(k);
        }
        Ok(())
    }

    fn search(&self, query: &Query, page: PageRequest) -> Result<Page<T>> {
        let guard = self.rows.read();
        let matching: Vec<&T> = guard.values().filter(|row| query.matches(row)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }

    fn scan(&self, query: &Query) -> Result<Vec<T>> {
        let guard = self.rows.read();
        Ok(guard.values().filter(|row| query.matches(row)).cloned().collect())
    }

    fn get(&self, key: &K) -> Result<Option<T>> {
        Ok(self.rows.read().get(key).cloned())
    }
}
