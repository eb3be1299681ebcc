//! Statement IR. Parameters are bound during lowering, so a plan carries
//! plain values only.

use crate::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum StatementPlan {
    Select(SelectPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    /// `None` for a SELECT without FROM.
    pub view: Option<String>,
    pub projection: Vec<Projection>,
    pub filter: Option<Predicate>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard,
    Expr { expr: ScalarExpr, name: String },
    CountStar { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Column(String),
    Literal(Value),
    /// `json_extract(expr, '$.a.b')`
    JsonExtract {
        expr: Box<ScalarExpr>,
        path: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: ScalarExpr,
        op: CompareOp,
        right: ScalarExpr,
    },
    IsNull {
        expr: ScalarExpr,
        negated: bool,
    },
    InList {
        expr: ScalarExpr,
        list: Vec<ScalarExpr>,
        negated: bool,
    },
    Like {
        expr: ScalarExpr,
        pattern: ScalarExpr,
        negated: bool,
    },
    /// A bare expression used as a condition, e.g. `WHERE done`.
    Truthy(ScalarExpr),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: ScalarExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub view: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub view: String,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: ScalarExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletePlan {
    pub view: String,
    pub filter: Option<Predicate>,
}
