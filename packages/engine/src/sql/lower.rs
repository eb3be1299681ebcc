//! Lowers parsed statements into the IR in [`super::plan`].

use sqlparser::ast::{
    AssignmentTarget, BinaryOperator, Delete, Expr, FromTable, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Insert, LimitClause, ObjectName, ObjectNamePart, OrderByKind,
    Query, SelectItem, SetExpr, Statement, TableFactor, TableObject, TableWithJoins,
    UnaryOperator, Update, Value as SqlValue,
};

use super::params::{bind_placeholder, PlaceholderState};
use super::plan::{
    Assignment, CompareOp, DeletePlan, InsertPlan, OrderKey, Predicate, Projection, ScalarExpr,
    SelectPlan, StatementPlan, UpdatePlan,
};
use crate::errors;
use crate::{LixError, Value};

pub(crate) fn lower_statement(
    statement: &Statement,
    params: &[Value],
    state: &mut PlaceholderState,
) -> Result<StatementPlan, LixError> {
    let mut lowering = Lowering { params, state };
    match statement {
        Statement::Query(query) => lowering.select(query).map(StatementPlan::Select),
        Statement::Insert(insert) => lowering.insert(insert).map(StatementPlan::Insert),
        Statement::Update(update) => lowering.update(update).map(StatementPlan::Update),
        Statement::Delete(delete) => lowering.delete(delete).map(StatementPlan::Delete),
        other => Err(unsupported(&format!(
            "`{}` is not supported; only SELECT, INSERT, UPDATE and DELETE on views are",
            first_words(&other.to_string())
        ))),
    }
}

struct Lowering<'a> {
    params: &'a [Value],
    state: &'a mut PlaceholderState,
}

impl Lowering<'_> {
    fn select(&mut self, query: &Query) -> Result<SelectPlan, LixError> {
        if query.with.is_some() {
            return Err(unsupported("WITH clauses are not supported"));
        }
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported("only plain SELECT bodies are supported"));
        };
        if select.distinct.is_some() {
            return Err(unsupported("DISTINCT is not supported"));
        }
        if select.having.is_some() {
            return Err(unsupported("HAVING is not supported"));
        }
        match &select.group_by {
            GroupByExpr::Expressions(expressions, _) if expressions.is_empty() => {}
            _ => return Err(unsupported("GROUP BY is not supported")),
        }

        let view = match select.from.as_slice() {
            [] => None,
            [table] => Some(table_name(table)?),
            _ => return Err(unsupported("joins are not supported")),
        };

        let mut projection = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            projection.push(self.projection(item)?);
        }
        let filter = select
            .selection
            .as_ref()
            .map(|selection| self.predicate(selection))
            .transpose()?;

        let mut order_by = Vec::new();
        if let Some(order) = &query.order_by {
            let OrderByKind::Expressions(expressions) = &order.kind else {
                return Err(unsupported("ORDER BY ALL is not supported"));
            };
            for expression in expressions {
                order_by.push(OrderKey {
                    expr: self.scalar(&expression.expr)?,
                    descending: expression.options.asc == Some(false),
                });
            }
        }

        let (limit, offset) = match &query.limit_clause {
            None => (None, 0),
            Some(LimitClause::LimitOffset { limit, offset, .. }) => (
                limit.as_ref().map(|limit| self.count(limit)).transpose()?,
                offset
                    .as_ref()
                    .map(|offset| self.count(&offset.value))
                    .transpose()?
                    .unwrap_or(0),
            ),
            Some(LimitClause::OffsetCommaLimit { offset, limit }) => {
                (Some(self.count(limit)?), self.count(offset)?)
            }
        };

        Ok(SelectPlan {
            view,
            projection,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn projection(&mut self, item: &SelectItem) -> Result<Projection, LixError> {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => Ok(Projection::Wildcard),
            SelectItem::UnnamedExpr(expr) => self.projected_expr(expr, default_name(expr)),
            SelectItem::ExprWithAlias { expr, alias } => {
                self.projected_expr(expr, alias.value.clone())
            }
        }
    }

    fn projected_expr(&mut self, expr: &Expr, name: String) -> Result<Projection, LixError> {
        if is_count_star(expr) {
            return Ok(Projection::CountStar { name });
        }
        Ok(Projection::Expr {
            expr: self.scalar(expr)?,
            name,
        })
    }

    fn insert(&mut self, insert: &Insert) -> Result<InsertPlan, LixError> {
        let TableObject::TableName(name) = &insert.table else {
            return Err(unsupported("INSERT into table functions is not supported"));
        };
        if insert.on.is_some() {
            return Err(unsupported("ON CONFLICT is not supported"));
        }
        if insert.columns.is_empty() {
            return Err(unsupported("INSERT requires an explicit column list"));
        }
        let source = insert
            .source
            .as_ref()
            .ok_or_else(|| unsupported("INSERT requires VALUES rows"))?;
        let SetExpr::Values(values) = source.body.as_ref() else {
            return Err(unsupported("INSERT requires VALUES rows"));
        };

        let columns: Vec<String> = insert
            .columns
            .iter()
            .map(|column| column.value.clone())
            .collect();
        let mut rows = Vec::with_capacity(values.rows.len());
        for row in &values.rows {
            if row.len() != columns.len() {
                return Err(errors::invalid_parameter_error(
                    "INSERT row length does not match column count",
                ));
            }
            let mut lowered = Vec::with_capacity(row.len());
            for expr in row {
                lowered.push(self.literal(expr)?);
            }
            rows.push(lowered);
        }

        Ok(InsertPlan {
            view: object_name(name)?,
            columns,
            rows,
        })
    }

    fn update(&mut self, update: &Update) -> Result<UpdatePlan, LixError> {
        if update.from.is_some() {
            return Err(unsupported("UPDATE ... FROM is not supported"));
        }
        let view = table_name(&update.table)?;
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for assignment in &update.assignments {
            let AssignmentTarget::ColumnName(column) = &assignment.target else {
                return Err(unsupported("tuple assignments are not supported"));
            };
            assignments.push(Assignment {
                column: object_name(column)?,
                value: self.scalar(&assignment.value)?,
            });
        }
        let filter = update
            .selection
            .as_ref()
            .map(|selection| self.predicate(selection))
            .transpose()?;
        Ok(UpdatePlan {
            view,
            assignments,
            filter,
        })
    }

    fn delete(&mut self, delete: &Delete) -> Result<DeletePlan, LixError> {
        if !delete.tables.is_empty() || delete.using.is_some() {
            return Err(unsupported("multi-table DELETE is not supported"));
        }
        let tables = match &delete.from {
            FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
        };
        let [table] = tables.as_slice() else {
            return Err(unsupported("DELETE must target exactly one view"));
        };
        let filter = delete
            .selection
            .as_ref()
            .map(|selection| self.predicate(selection))
            .transpose()?;
        Ok(DeletePlan {
            view: table_name(table)?,
            filter,
        })
    }

    fn predicate(&mut self, expr: &Expr) -> Result<Predicate, LixError> {
        match expr {
            Expr::Nested(inner) => self.predicate(inner),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => Ok(Predicate::And(
                    Box::new(self.predicate(left)?),
                    Box::new(self.predicate(right)?),
                )),
                BinaryOperator::Or => Ok(Predicate::Or(
                    Box::new(self.predicate(left)?),
                    Box::new(self.predicate(right)?),
                )),
                _ => {
                    let op = compare_op(op)?;
                    Ok(Predicate::Compare {
                        left: self.scalar(left)?,
                        op,
                        right: self.scalar(right)?,
                    })
                }
            },
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Predicate::Not(Box::new(self.predicate(expr)?))),
            Expr::IsNull(inner) => Ok(Predicate::IsNull {
                expr: self.scalar(inner)?,
                negated: false,
            }),
            Expr::IsNotNull(inner) => Ok(Predicate::IsNull {
                expr: self.scalar(inner)?,
                negated: true,
            }),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = self.scalar(expr)?;
                let mut lowered = Vec::with_capacity(list.len());
                for item in list {
                    lowered.push(self.scalar(item)?);
                }
                Ok(Predicate::InList {
                    expr,
                    list: lowered,
                    negated: *negated,
                })
            }
            Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(unsupported("LIKE ... ESCAPE is not supported"));
                }
                Ok(Predicate::Like {
                    expr: self.scalar(expr)?,
                    pattern: self.scalar(pattern)?,
                    negated: *negated,
                })
            }
            other => Ok(Predicate::Truthy(self.scalar(other)?)),
        }
    }

    fn scalar(&mut self, expr: &Expr) -> Result<ScalarExpr, LixError> {
        match expr {
            Expr::Nested(inner) => self.scalar(inner),
            Expr::Identifier(ident) => Ok(ScalarExpr::Column(ident.value.clone())),
            Expr::CompoundIdentifier(parts) => parts
                .last()
                .map(|ident| ScalarExpr::Column(ident.value.clone()))
                .ok_or_else(|| unsupported("empty identifier")),
            Expr::Function(function) if function_name_is(&function.name, "json_extract") => {
                let FunctionArguments::List(list) = &function.args else {
                    return Err(unsupported("json_extract expects two arguments"));
                };
                let [FunctionArg::Unnamed(FunctionArgExpr::Expr(target)), FunctionArg::Unnamed(FunctionArgExpr::Expr(path))] =
                    list.args.as_slice()
                else {
                    return Err(unsupported("json_extract expects two arguments"));
                };
                let path = match self.literal(path)? {
                    Value::Text(path) => parse_json_path(&path)?,
                    _ => return Err(unsupported("json_extract path must be a string")),
                };
                Ok(ScalarExpr::JsonExtract {
                    expr: Box::new(self.scalar(target)?),
                    path,
                })
            }
            other => self.literal(other).map(ScalarExpr::Literal),
        }
    }

    fn literal(&mut self, expr: &Expr) -> Result<Value, LixError> {
        match expr {
            Expr::Nested(inner) => self.literal(inner),
            Expr::Value(value) => match &value.value {
                SqlValue::Null => Ok(Value::Null),
                SqlValue::Boolean(flag) => Ok(Value::boolean(*flag)),
                SqlValue::Number(number, _) => parse_number(number),
                SqlValue::SingleQuotedString(text) => Ok(Value::Text(text.clone())),
                SqlValue::Placeholder(token) => bind_placeholder(token, self.params, self.state),
                other => Err(unsupported(&format!("literal `{other}` is not supported"))),
            },
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match self.literal(expr)? {
                Value::Integer(value) => Ok(Value::Integer(-value)),
                Value::Real(value) => Ok(Value::Real(-value)),
                _ => Err(unsupported("unary minus needs a number")),
            },
            other => Err(unsupported(&format!("expression `{other}` is not supported"))),
        }
    }

    fn count(&mut self, expr: &Expr) -> Result<usize, LixError> {
        match self.literal(expr)? {
            Value::Integer(value) if value >= 0 => Ok(value as usize),
            _ => Err(errors::invalid_parameter_error(
                "LIMIT and OFFSET must be non-negative integers",
            )),
        }
    }
}

fn compare_op(op: &BinaryOperator) -> Result<CompareOp, LixError> {
    match op {
        BinaryOperator::Eq => Ok(CompareOp::Eq),
        BinaryOperator::NotEq => Ok(CompareOp::NotEq),
        BinaryOperator::Lt => Ok(CompareOp::Lt),
        BinaryOperator::LtEq => Ok(CompareOp::LtEq),
        BinaryOperator::Gt => Ok(CompareOp::Gt),
        BinaryOperator::GtEq => Ok(CompareOp::GtEq),
        other => Err(unsupported(&format!("operator `{other}` is not supported"))),
    }
}

fn table_name(table: &TableWithJoins) -> Result<String, LixError> {
    if !table.joins.is_empty() {
        return Err(unsupported("joins are not supported"));
    }
    match &table.relation {
        TableFactor::Table { name, .. } => object_name(name),
        _ => Err(unsupported("only views can be queried")),
    }
}

fn object_name(name: &ObjectName) -> Result<String, LixError> {
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .map(|ident| ident.value.clone())
        .ok_or_else(|| unsupported(&format!("unsupported name `{name}`")))
}

fn function_name_is(name: &ObjectName, expected: &str) -> bool {
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .is_some_and(|ident| ident.value.eq_ignore_ascii_case(expected))
}

fn is_count_star(expr: &Expr) -> bool {
    let Expr::Function(function) = expr else {
        return false;
    };
    if !function_name_is(&function.name, "count") {
        return false;
    }
    matches!(
        &function.args,
        FunctionArguments::List(list)
            if matches!(list.args.as_slice(), [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)])
    )
}

fn default_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn parse_number(number: &str) -> Result<Value, LixError> {
    if let Ok(integer) = number.parse::<i64>() {
        return Ok(Value::Integer(integer));
    }
    number
        .parse::<f64>()
        .map(Value::Real)
        .map_err(|_| errors::invalid_parameter_error(&format!("invalid number `{number}`")))
}

/// Parses `$`, `$.a.b` and `$.items[0]` into path segments.
pub(crate) fn parse_json_path(path: &str) -> Result<Vec<String>, LixError> {
    let Some(rest) = path.trim().strip_prefix('$') else {
        return Err(errors::invalid_parameter_error(&format!(
            "JSON path `{path}` must start with `$`"
        )));
    };
    let mut segments = Vec::new();
    for part in rest.split('.').filter(|part| !part.is_empty()) {
        let mut pieces = part.split('[');
        if let Some(key) = pieces.next().filter(|key| !key.is_empty()) {
            segments.push(key.trim_matches('"').to_string());
        }
        for index in pieces {
            segments.push(index.trim_end_matches(']').to_string());
        }
    }
    Ok(segments)
}

fn first_words(sql: &str) -> String {
    sql.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

fn unsupported(details: &str) -> LixError {
    errors::unsupported_statement_error(details)
}

#[cfg(test)]
mod tests {
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    use super::{lower_statement, parse_json_path};
    use crate::sql::params::PlaceholderState;
    use crate::sql::plan::{CompareOp, Predicate, Projection, ScalarExpr, StatementPlan};
    use crate::Value;

    fn lower(sql: &str, params: &[Value]) -> Result<StatementPlan, crate::LixError> {
        let statements = Parser::parse_sql(&GenericDialect {}, sql).expect("parse");
        lower_statement(&statements[0], params, &mut PlaceholderState::new())
    }

    #[test]
    fn lowers_select_with_filter_order_and_limit() {
        let plan = lower(
            "SELECT entity_id AS id, json_extract(snapshot_content, '$.title') FROM state \
             WHERE schema_key = ? AND entity_id NOT IN ('x', 'y') ORDER BY entity_id DESC LIMIT 2 OFFSET 1",
            &[Value::text("todo")],
        )
        .expect("lower");
        let StatementPlan::Select(select) = plan else {
            panic!("expected select");
        };
        assert_eq!(select.view.as_deref(), Some("state"));
        assert_eq!(select.limit, Some(2));
        assert_eq!(select.offset, 1);
        assert!(select.order_by[0].descending);
        assert!(matches!(&select.projection[0], Projection::Expr { name, .. } if name == "id"));
        assert!(matches!(
            &select.projection[1],
            Projection::Expr { expr: ScalarExpr::JsonExtract { path, .. }, .. } if path == &vec!["title".to_string()]
        ));
        let Some(Predicate::And(left, _)) = select.filter else {
            panic!("expected conjunction");
        };
        assert_eq!(
            *left,
            Predicate::Compare {
                left: ScalarExpr::Column("schema_key".to_string()),
                op: CompareOp::Eq,
                right: ScalarExpr::Literal(Value::text("todo")),
            }
        );
    }

    #[test]
    fn lowers_count_star() {
        let StatementPlan::Select(select) =
            lower("SELECT COUNT(*) AS n FROM change", &[]).expect("lower")
        else {
            panic!("expected select");
        };
        assert_eq!(select.projection, vec![Projection::CountStar { name: "n".to_string() }]);
    }

    #[test]
    fn lowers_insert_rows_with_parameters() {
        let StatementPlan::Insert(insert) = lower(
            "INSERT INTO todo (id, title) VALUES (?1, 'a'), ($2, NULL)",
            &[Value::text("1"), Value::text("2")],
        )
        .expect("lower") else {
            panic!("expected insert");
        };
        assert_eq!(insert.columns, vec!["id", "title"]);
        assert_eq!(
            insert.rows,
            vec![
                vec![Value::text("1"), Value::text("a")],
                vec![Value::text("2"), Value::Null]
            ]
        );
    }

    #[test]
    fn rejects_joins_and_ddl() {
        let join = lower("SELECT * FROM state JOIN change ON 1 = 1", &[]).expect_err("join");
        assert_eq!(join.code, "LIX_ERROR_UNSUPPORTED_STATEMENT");
        let ddl = lower("CREATE TABLE t (a TEXT)", &[]).expect_err("ddl");
        assert_eq!(ddl.code, "LIX_ERROR_UNSUPPORTED_STATEMENT");
    }

    #[test]
    fn parses_json_paths() {
        assert_eq!(parse_json_path("$").expect("root"), Vec::<String>::new());
        assert_eq!(
            parse_json_path("$.items[0].name").expect("path"),
            vec!["items", "0", "name"]
        );
        assert!(parse_json_path("items").is_err());
    }
}
