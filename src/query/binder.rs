//! Request parameter binding
//!
//! Walks a compiled query's variable order and produces the positional
//! parameter list. The first failing variable aborts binding.

use std::collections::HashMap;

use super::compiler::CompiledQuery;
use super::errors::{BindError, BindResult};
use crate::schema::SqlValue;

/// Bind request parameters to a compiled query.
///
/// For each variable, in order:
/// 1. absent or empty value: `MissingField`
/// 2. a validator that refuses the raw value: `InvalidField`
/// 3. a preprocessor transforms the value; otherwise the raw text is bound
pub fn bind(query: &CompiledQuery, params: &HashMap<String, String>) -> BindResult<Vec<SqlValue>> {
    query
        .variable_order
        .iter()
        .map(|name| bind_one(query, name, params))
        .collect()
}

fn bind_one(query: &CompiledQuery, name: &str, params: &HashMap<String, String>) -> BindResult<SqlValue> {
    let raw = params
        .get(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BindError::MissingField(name.to_string()))?;

    if let Some(validator) = query.validators.get(name) {
        if !validator(raw) {
            return Err(BindError::InvalidField(name.to_string()));
        }
    }

    match query.preprocessor.get(name) {
        Some(preprocessor) => preprocessor(raw).map_err(|message| BindError::Preprocess {
            field: name.to_string(),
            message,
        }),
        None => Ok(SqlValue::Text(raw.clone())),
    }
}

impl CompiledQuery {
    /// Shorthand for [`bind`]
    pub fn bind(&self, params: &HashMap<String, String>) -> BindResult<Vec<SqlValue>> {
        bind(self, params)
    }
}
