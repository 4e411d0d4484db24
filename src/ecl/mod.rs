mod ast;
mod planner;

pub use ast::{Attribute, Expr, Focus, SubExpr, SubOp};
pub use planner::{execute, EclContext};
