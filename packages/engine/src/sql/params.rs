use std::collections::HashMap;
use std::ops::ControlFlow;

use sqlparser::ast::{Statement, Value as SqlValue};
use sqlparser::ast::{VisitMut, VisitorMut};

use crate::errors;
use crate::{LixError, Value};

/// Tracks the next implicit ordinal across the statements of one script, so
/// `?` continues counting after `?3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PlaceholderState {
    next_ordinal: usize,
}

impl PlaceholderState {
    pub(crate) fn new() -> Self {
        Self { next_ordinal: 0 }
    }
}

/// Value bound to a `?`, `?N` or `$N` token.
pub(crate) fn bind_placeholder(
    token: &str,
    params: &[Value],
    state: &mut PlaceholderState,
) -> Result<Value, LixError> {
    let index = resolve_placeholder_index(token, params.len(), state)?;
    Ok(params[index].clone())
}

pub(crate) fn resolve_placeholder_index(
    token: &str,
    params_len: usize,
    state: &mut PlaceholderState,
) -> Result<usize, LixError> {
    let trimmed = token.trim();

    let source_index = if trimmed.is_empty() || trimmed == "?" {
        let source_index = state.next_ordinal;
        state.next_ordinal += 1;
        source_index
    } else if let Some(numeric) = trimmed
        .strip_prefix('?')
        .or_else(|| trimmed.strip_prefix('$'))
    {
        let parsed = parse_1_based_index(trimmed, numeric)?;
        state.next_ordinal = state.next_ordinal.max(parsed);
        parsed - 1
    } else {
        return Err(errors::invalid_parameter_error(&format!(
            "unsupported SQL placeholder format '{trimmed}'"
        )));
    };

    if source_index >= params_len {
        return Err(errors::invalid_parameter_error(&format!(
            "placeholder '{trimmed}' references parameter {} but only {} parameters were provided",
            source_index + 1,
            params_len
        )));
    }

    Ok(source_index)
}

fn parse_1_based_index(token: &str, numeric: &str) -> Result<usize, LixError> {
    match numeric.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(errors::invalid_parameter_error(&format!(
            "invalid SQL placeholder '{token}'"
        ))),
    }
}

/// Renumbers placeholders densely as `?1..?n`, in order of first use across
/// every statement it binds, and collects the parameters in that order.
pub(crate) struct ScriptBinder<'p> {
    params: &'p [Value],
    state: PlaceholderState,
    source_to_dense: HashMap<usize, usize>,
    used_source_indices: Vec<usize>,
}

impl<'p> ScriptBinder<'p> {
    pub(crate) fn new(params: &'p [Value]) -> Self {
        Self {
            params,
            state: PlaceholderState::new(),
            source_to_dense: HashMap::new(),
            used_source_indices: Vec::new(),
        }
    }

    pub(crate) fn bind(&mut self, statement: &mut Statement) -> Result<(), LixError> {
        if let ControlFlow::Break(error) = statement.visit(self) {
            return Err(error);
        }
        Ok(())
    }

    pub(crate) fn into_params(self) -> Vec<Value> {
        self.used_source_indices
            .into_iter()
            .map(|source_index| self.params[source_index].clone())
            .collect()
    }
}

impl VisitorMut for ScriptBinder<'_> {
    type Break = LixError;

    fn pre_visit_value(&mut self, value: &mut SqlValue) -> ControlFlow<Self::Break> {
        let SqlValue::Placeholder(token) = value else {
            return ControlFlow::Continue(());
        };
        let source_index =
            match resolve_placeholder_index(token, self.params.len(), &mut self.state) {
                Ok(index) => index,
                Err(error) => return ControlFlow::Break(error),
            };
        let dense_index = match self.source_to_dense.get(&source_index) {
            Some(existing) => *existing,
            None => {
                let dense_index = self.used_source_indices.len();
                self.used_source_indices.push(source_index);
                self.source_to_dense.insert(source_index, dense_index);
                dense_index
            }
        };
        *value = SqlValue::Placeholder(format!("?{}", dense_index + 1));
        ControlFlow::Continue(())
    }
}
