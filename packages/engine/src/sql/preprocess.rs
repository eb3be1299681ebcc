use std::ops::ControlFlow;

use sqlparser::ast::{
    Ident, ObjectNamePart, Statement, TableAlias, TableFactor, VisitMut, VisitorMut,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::catalog::ViewCatalog;
use super::classify::{classify_statements, StatementKind};
use super::params::ScriptBinder;
use crate::errors;
use crate::{LixError, Value};

/// Views nest a few levels deep; anything beyond this is a reference cycle.
const MAX_VIEW_EXPANSIONS: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOutput {
    /// The script with view references replaced by their definitions.
    pub sql: String,
    /// Parameters in the order of the renumbered placeholders.
    pub parameters: Vec<Value>,
    pub kinds: Vec<StatementKind>,
}

/// Expands view references into SELECTs over physical tables.
///
/// DML targets stay in place since writes are executed through the IR; only
/// their sources and predicates are expanded. Statements classified as
/// `other` pass through as written.
pub fn preprocess(
    catalog: &ViewCatalog,
    sql: &str,
    params: &[Value],
) -> Result<PreprocessOutput, LixError> {
    let mut binder = ScriptBinder::new(params);
    let mut rendered = Vec::new();
    let mut kinds = Vec::new();

    for classified in classify_statements(sql)? {
        kinds.push(classified.kind);
        if classified.kind == StatementKind::Other {
            rendered.push(classified.sql);
            continue;
        }
        let statements = Parser::parse_sql(&GenericDialect {}, &classified.sql)
            .map_err(|error| errors::sql_parse_error(&error.to_string()))?;
        for mut statement in statements {
            binder.bind(&mut statement)?;
            expand_statement(&mut statement, catalog)?;
            rendered.push(statement.to_string());
        }
    }

    Ok(PreprocessOutput {
        sql: rendered.join("; "),
        parameters: binder.into_params(),
        kinds,
    })
}

pub(crate) fn expand_statement(
    statement: &mut Statement,
    catalog: &ViewCatalog,
) -> Result<(), LixError> {
    let mut expander = ViewExpander {
        catalog,
        expansions: 0,
    };
    let flow = match statement {
        Statement::Insert(insert) => match insert.source.as_mut() {
            Some(source) => VisitMut::visit(source.as_mut(), &mut expander),
            None => ControlFlow::Continue(()),
        },
        Statement::Update(update) => {
            for assignment in &mut update.assignments {
                if let ControlFlow::Break(error) =
                    VisitMut::visit(&mut assignment.value, &mut expander)
                {
                    return Err(error);
                }
            }
            match update.selection.as_mut() {
                Some(selection) => VisitMut::visit(selection, &mut expander),
                None => ControlFlow::Continue(()),
            }
        }
        Statement::Delete(delete) => match delete.selection.as_mut() {
            Some(selection) => VisitMut::visit(selection, &mut expander),
            None => ControlFlow::Continue(()),
        },
        Statement::Query(query) => VisitMut::visit(query.as_mut(), &mut expander),
        _ => ControlFlow::Continue(()),
    };
    match flow {
        ControlFlow::Break(error) => Err(error),
        ControlFlow::Continue(()) => Ok(()),
    }
}

struct ViewExpander<'a> {
    catalog: &'a ViewCatalog,
    expansions: usize,
}

impl VisitorMut for ViewExpander<'_> {
    type Break = LixError;

    // The replaced factor's children are visited afterwards, so views
    // defined over other views expand transitively.
    fn pre_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        let TableFactor::Table { name, alias, .. } = factor else {
            return ControlFlow::Continue(());
        };
        if name.0.len() != 1 {
            return ControlFlow::Continue(());
        }
        let Some(view) = name
            .0
            .last()
            .and_then(ObjectNamePart::as_ident)
            .and_then(|ident| self.catalog.get(&ident.value))
        else {
            return ControlFlow::Continue(());
        };

        self.expansions += 1;
        if self.expansions > MAX_VIEW_EXPANSIONS {
            return ControlFlow::Break(errors::unsupported_statement_error(&format!(
                "view `{}` expands recursively",
                view.name
            )));
        }
        let alias = alias.clone().unwrap_or_else(|| TableAlias {
            explicit: false,
            name: Ident::new(&view.name),
            columns: Vec::new(),
        });
        *factor = TableFactor::Derived {
            lateral: false,
            subquery: Box::new(view.query.clone()),
            alias: Some(alias),
        };
        ControlFlow::Continue(())
    }
}
