//! Compiles the post-parse ECL AST into store + semantic-index lookups and
//! pages the result (spec §4.6).

use std::collections::HashSet;

use crate::cancel::CancellationToken;
use crate::error::{Result, StoreError};
use crate::ids::ComponentId;
use crate::kv::{Page, PageRequest};
use crate::model::{BranchPath, Relationship};
use crate::semantic_index::SemanticIndex;

use super::ast::{Expr, Focus, SubExpr, SubOp};

/// Everything the planner needs to resolve focuses and refinements,
/// already narrowed to one branch and one form by the caller.
pub struct EclContext<'a> {
    pub semantic_index: &'a SemanticIndex,
    pub path: BranchPath,
    pub stated: bool,
    /// Active relationships visible on `path`, used for both the ISA
    /// ancestor walk's backing data (already reflected in the semantic
    /// index) and attribute-refinement existence checks.
    pub relationships: &'a [Relationship],
    /// Every concept id known on the branch, for the `*` wildcard.
    pub all_concepts: &'a [ComponentId],
}

impl<'a> EclContext<'a> {
    fn descendants_or_self(&self, id: ComponentId) -> Result<HashSet<ComponentId>> {
        let mut out = self.descendants(id)?;
        out.insert(id);
        Ok(out)
    }

    fn descendants(&self, id: ComponentId) -> Result<HashSet<ComponentId>> {
        let rows = self.semantic_index.all(&self.path, self.stated)?;
        Ok(rows
            .into_iter()
            .filter(|row| row.ancestors.contains(&id))
            .map(|row| row.concept_id)
            .collect())
    }

    fn ancestors(&self, id: ComponentId) -> Result<HashSet<ComponentId>> {
        Ok(self
            .semantic_index
            .get(&self.path, id, self.stated)?
            .map(|row| row.ancestors)
            .unwrap_or_default())
    }

    fn ancestors_or_self(&self, id: ComponentId) -> Result<HashSet<ComponentId>> {
        let mut out = self.ancestors(id)?;
        out.insert(id);
        Ok(out)
    }
}

fn resolve_sub(sub: &SubExpr, ctx: &EclContext, cancel: &CancellationToken) -> Result<HashSet<ComponentId>> {
    if cancel.is_cancelled() {
        return Err(StoreError::internal("ECL execution cancelled"));
    }
    match &sub.focus {
        Focus::Wildcard => Ok(ctx.all_concepts.iter().copied().collect()),
        Focus::Nested(_) => Err(StoreError::unsupported("nested expression as focus/value")),
        Focus::Id(id) => match sub.op {
            SubOp::SelfOp => Ok(std::iter::once(*id).collect()),
            SubOp::DescendantOrSelf => ctx.descendants_or_self(*id),
            SubOp::Descendant => ctx.descendants(*id),
            SubOp::Ancestor => ctx.ancestors(*id),
            SubOp::AncestorOrSelf => ctx.ancestors_or_self(*id),
        },
    }
}

fn exists_attribute_match(
    concept: ComponentId,
    type_ids: &HashSet<ComponentId>,
    value_ids: &HashSet<ComponentId>,
    relationships: &[Relationship],
) -> bool {
    relationships.iter().any(|r| {
        r.version.active
            && r.source_id == concept
            && type_ids.contains(&r.type_id)
            && value_ids.contains(&r.destination_id)
    })
}

fn paginate(mut ids: Vec<ComponentId>, page: PageRequest) -> Page<ComponentId> {
    ids.sort();
    let total = ids.len();
    let items = ids.into_iter().skip(page.offset).take(page.limit).collect();
    Page { items, total }
}

/// Compiles and executes an ECL expression against `ctx`, returning a page
/// of matching concept ids. Rejects any construct outside the grammar
/// subset with `Unsupported` (spec §4.6/§6) and respects `cancel` for long
/// scans (spec §5).
pub fn execute(
    expr: &Expr,
    ctx: &EclContext,
    page: PageRequest,
    cancel: &CancellationToken,
) -> Result<Page<ComponentId>> {
    match expr {
        Expr::Unsupported(tag) => Err(StoreError::unsupported(format!(
            "ECL construct not in the supported subset: {tag}"
        ))),
        Expr::Sub(sub) => {
            let candidates = resolve_sub(sub, ctx, cancel)?;
            Ok(paginate(candidates.into_iter().collect(), page))
        }
        Expr::Refined { focus, attribute } => {
            let candidates = resolve_sub(focus, ctx, cancel)?;
            let type_ids = resolve_sub(&attribute.name, ctx, cancel)?;
            let value_ids = resolve_sub(&attribute.value, ctx, cancel)?;

            let mut matched = Vec::new();
            for c in candidates {
                if cancel.is_cancelled() {
                    return Err(StoreError::internal("ECL execution cancelled"));
                }
                if exists_attribute_match(c, &type_ids, &value_ids, ctx.relationships) {
                    matched.push(c);
                }
            }
            Ok(paginate(matched, page))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CharacteristicType, ComponentVersion};
    use std::collections::HashSet as Set;

    fn rel(id: u64, source: u64, type_id: u64, dest: u64) -> Relationship {
        Relationship {
            relationship_id: ComponentId(id),
            source_id: ComponentId(source),
            destination_id: ComponentId(dest),
            type_id: ComponentId(type_id),
            group: 0,
            characteristic_type: CharacteristicType::Inferred,
            modifier_id: ComponentId(900000000000451002),
            version: ComponentVersion {
                path: BranchPath::main(),
                start: 1,
                end: None,
                active: true,
                module_id: ComponentId(900000000000207008),
                effective_time: None,
                release_hash: None,
                released_effective_time: None,
                deleted: false,
            },
        }
    }

    fn build_index() -> (SemanticIndex, Vec<ComponentId>) {
        // B->A, C->B, D->A
        let rels = vec![
            rel(1, 2, 116680003, 1),
            rel(2, 3, 116680003, 2),
            rel(3, 4, 116680003, 1),
        ];
        let index = SemanticIndex::new();
        let path = BranchPath::main();
        let all: Vec<_> = [1, 2, 3, 4].into_iter().map(ComponentId).collect();
        index.full_rebuild(&path, false, &all, &rels).unwrap();
        (index, all)
    }

    #[test]
    fn descendant_operators_match_s3() {
        let (index, all) = build_index();
        let path = BranchPath::main();
        let rels = vec![]; // not needed for pure hierarchy ops
        let ctx = EclContext {
            semantic_index: &index,
            path: path.clone(),
            stated: false,
            relationships: &rels,
            all_concepts: &all,
        };
        let cancel = CancellationToken::new();

        let desc_or_self = resolve_sub(&SubExpr::id(SubOp::DescendantOrSelf, ComponentId(1)), &ctx, &cancel).unwrap();
        assert_eq!(desc_or_self, [1, 2, 3, 4].into_iter().map(ComponentId).collect::<Set<_>>());

        let desc = resolve_sub(&SubExpr::id(SubOp::Descendant, ComponentId(1)), &ctx, &cancel).unwrap();
        assert_eq!(desc, [2, 3, 4].into_iter().map(ComponentId).collect::<Set<_>>());

        let anc = resolve_sub(&SubExpr::id(SubOp::Ancestor, ComponentId(3)), &ctx, &cancel).unwrap();
        assert_eq!(anc, [1, 2].into_iter().map(ComponentId).collect::<Set<_>>());

        let wildcard = resolve_sub(&SubExpr::wildcard(), &ctx, &cancel).unwrap();
        assert_eq!(wildcard, all.iter().copied().collect::<Set<_>>());
    }

    #[test]
    fn refinement_requires_relationship_match() {
        let (index, all) = build_index();
        let path = BranchPath::main();
        let rels = vec![rel(10, 100, 200, 300)];
        let ctx = EclContext {
            semantic_index: &index,
            path,
            stated: false,
            relationships: &rels,
            all_concepts: &all,
        };
        let expr = Expr::Refined {
            focus: SubExpr::id(SubOp::SelfOp, ComponentId(100)),
            attribute: crate::ecl::ast::Attribute {
                name: SubExpr::id(SubOp::SelfOp, ComponentId(200)),
                value: SubExpr::id(SubOp::SelfOp, ComponentId(300)),
            },
        };
        let cancel = CancellationToken::new();
        let result = execute(&expr, &ctx, PageRequest::first(10), &cancel).unwrap();
        assert_eq!(result.items, vec![ComponentId(100)]);
    }

    #[test]
    fn unsupported_construct_rejected() {
        let (index, all) = build_index();
        let ctx = EclContext {
            semantic_index: &index,
            path: BranchPath::main(),
            stated: false,
            relationships: &[],
            all_concepts: &all,
        };
        let cancel = CancellationToken::new();
        let err = execute(&Expr::Unsupported("member-of"), &ctx, PageRequest::first(10), &cancel).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
