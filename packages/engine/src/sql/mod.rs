mod catalog;
mod classify;
mod eval;
mod execute;
mod lower;
mod params;
mod plan;
mod preprocess;
mod scan;

pub use catalog::{EntityView, ViewCatalog, ViewDefinition, ViewKind, ViewWrites};
pub use classify::{classify_statements, ClassifiedStatement, StatementKind};
pub use plan::{
    Assignment, CompareOp, DeletePlan, InsertPlan, OrderKey, Predicate, Projection, ScalarExpr,
    SelectPlan, StatementPlan, UpdatePlan,
};
pub use preprocess::{preprocess, PreprocessOutput};
