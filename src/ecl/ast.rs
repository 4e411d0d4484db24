//! Post-parse ECL AST contract (spec §6). The grammar production the
//! generated parser is expected to reduce everything else to:
//!
//! ```text
//! expressionconstraint := refined | sub
//! refined := sub ':' attributeset
//! sub := [op] focus
//! op := '<' | '<<' | '>' | '>>'
//! focus := sctid | '*'
//! attributeset := attribute
//! attribute := attrname '=' sub
//! attrname := sub
//! ```
//!
//! Everything outside this shape (conjunction/disjunction/exclusion,
//! dotted expressions, member-of, cardinality, reverse flag, numeric/string
//! comparisons, nested expressions as refinement values, attribute groups,
//! refinement-set conjunction/disjunction) is represented by the
//! `Unsupported` markers below rather than given full structure — the
//! planner's only obligation toward them is to reject with `Unsupported`.

use crate::ids::ComponentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubOp {
    SelfOp,
    DescendantOrSelf,
    Descendant,
    Ancestor,
    AncestorOrSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    Id(ComponentId),
    Wildcard,
    /// A nested expression in focus position. The grammar subset never
    /// produces this; present only so the planner has something concrete
    /// to reject when the parser adapter hands one through.
    Nested(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubExpr {
    pub op: SubOp,
    pub focus: Focus,
}

impl SubExpr {
    pub fn id(op: SubOp, id: ComponentId) -> Self {
        SubExpr { op, focus: Focus::Id(id) }
    }

    pub fn wildcard() -> Self {
        SubExpr { op: SubOp::SelfOp, focus: Focus::Wildcard }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: SubExpr,
    pub value: SubExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Sub(SubExpr),
    Refined { focus: SubExpr, attribute: Attribute },
    /// Any construct outside the supported grammar subset. The `&str` is a
    /// human-readable tag used only for the resulting error message (e.g.
    /// `"conjunction"`, `"member-of"`, `"cardinality"`).
    Unsupported(&'static str),
}
