//! Query template compiler
//!
//! Templates reference values with brace tokens. Three tokens are resolved
//! to literal text at compile time:
//!
//! - `{table}`: the managed table name
//! - `{date}`: the timestamp column name
//! - `{fields[i]}`: the name of the i-th configured field (0-indexed)
//!
//! Every other token is a bind variable. Each occurrence becomes its own
//! positional placeholder (`?1`, `?2`, ...) and is recorded in
//! `variable_order`, so a variable used twice is bound twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::definition::{Preprocessor, QueryDefinition, Serializer, Validator};
use super::errors::{TemplateError, TemplateResult};
use crate::storage::Row;

/// Names the compiler substitutes for special tokens
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub table: &'a str,
    pub timestamp_column: &'a str,
    pub fields: &'a [String],
}

impl<'a> TemplateContext<'a> {
    pub fn new(table: &'a str, timestamp_column: &'a str, fields: &'a [String]) -> Self {
        Self {
            table,
            timestamp_column,
            fields,
        }
    }
}

/// A template resolved into positional form, ready to bind
#[derive(Clone)]
pub struct CompiledQuery {
    pub(crate) name: String,
    pub(crate) sql: String,
    pub(crate) variable_order: Vec<String>,
    pub(crate) validators: HashMap<String, Validator>,
    pub(crate) preprocessor: HashMap<String, Preprocessor>,
    pub(crate) serializer: Option<Serializer>,
}

impl CompiledQuery {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Request fields in placeholder order
    pub fn variable_order(&self) -> &[String] {
        &self.variable_order
    }

    /// Shape result rows with the configured serializer, or return them as
    /// an array unchanged
    pub fn serialize(&self, rows: Vec<Row>) -> Value {
        match &self.serializer {
            Some(serializer) => serializer(rows),
            None => Value::Array(rows.into_iter().map(Value::Object).collect()),
        }
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("name", &self.name)
            .field("sql", &self.sql)
            .field("variable_order", &self.variable_order)
            .finish()
    }
}

fn token_pattern() -> Result<&'static Regex, &'static regex::Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}]*)\}")).as_ref()
}

/// Positional placeholder for the `index`-th (1-based) parameter
pub fn positional_placeholder(index: usize) -> String {
    format!("?{}", index)
}

/// Resolve a raw template into SQL text and its bind variable order
pub fn compile_template(
    name: &str,
    raw: &str,
    ctx: &TemplateContext<'_>,
) -> TemplateResult<(String, Vec<String>)> {
    let mut sql = String::with_capacity(raw.len());
    let mut variable_order = Vec::new();
    let mut last = 0;

    let pattern = token_pattern().map_err(|e| TemplateError::Pattern {
        query: name.to_string(),
        message: e.to_string(),
    })?;
    for captures in pattern.captures_iter(raw) {
        let (Some(whole), Some(token)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        sql.push_str(&raw[last..whole.start()]);
        last = whole.end();

        match token.as_str() {
            "" => {
                return Err(TemplateError::EmptyPlaceholder {
                    query: name.to_string(),
                })
            }
            "table" => sql.push_str(ctx.table),
            "date" => sql.push_str(ctx.timestamp_column),
            token if token.starts_with("fields[") && token.ends_with(']') => {
                sql.push_str(resolve_field_reference(name, token, ctx.fields)?);
            }
            variable => {
                variable_order.push(variable.to_string());
                sql.push_str(&positional_placeholder(variable_order.len()));
            }
        }
    }
    sql.push_str(&raw[last..]);

    if sql.contains('{') || sql.contains('}') {
        return Err(TemplateError::UnbalancedBrace {
            query: name.to_string(),
        });
    }

    Ok((sql, variable_order))
}

fn resolve_field_reference<'f>(name: &str, token: &str, fields: &'f [String]) -> TemplateResult<&'f str> {
    let inner = &token["fields[".len()..token.len() - 1];
    let index = inner
        .trim()
        .parse::<usize>()
        .map_err(|_| TemplateError::MalformedFieldReference {
            query: name.to_string(),
            token: token.to_string(),
        })?;
    fields
        .get(index)
        .map(String::as_str)
        .ok_or(TemplateError::FieldIndexOutOfRange {
            query: name.to_string(),
            index,
            count: fields.len(),
        })
}

/// Compile a named query definition
pub fn compile(
    name: &str,
    definition: &QueryDefinition,
    ctx: &TemplateContext<'_>,
) -> TemplateResult<CompiledQuery> {
    let (sql, variable_order) = compile_template(name, &definition.template, ctx)?;
    Ok(CompiledQuery {
        name: name.to_string(),
        sql,
        variable_order,
        validators: definition.validators.clone(),
        preprocessor: definition.preprocessor.clone(),
        serializer: definition.serializer.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_pattern_compiles() {
        let pattern = token_pattern().unwrap();
        let tokens: Vec<&str> = pattern
            .captures_iter("SELECT {fields[0]} FROM {table} WHERE a = {a}")
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        assert_eq!(tokens, vec!["fields[0]", "table", "a"]);
    }

    fn fields() -> Vec<String> {
        vec!["temperature".to_string(), "humidity".to_string()]
    }

    fn compile_raw(raw: &str) -> TemplateResult<(String, Vec<String>)> {
        let fields = fields();
        let ctx = TemplateContext::new("t", "date", &fields);
        compile_template("q", raw, &ctx)
    }

    #[test]
    fn test_repeated_variable_gets_independent_slots() {
        let (sql, order) = compile_raw("SELECT {a} FROM {table} WHERE {b} = {a}").unwrap();
        assert_eq!(sql, "SELECT ?1 FROM t WHERE ?2 = ?3");
        assert_eq!(order, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_special_tokens_are_not_parameters() {
        let (sql, order) = compile_raw(
            "SELECT {fields[0]}, {fields[1]} FROM {table} ORDER BY {date} DESC LIMIT {limit}",
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT temperature, humidity FROM t ORDER BY date DESC LIMIT ?1"
        );
        assert_eq!(order, vec!["limit"]);
    }

    #[test]
    fn test_field_index_out_of_range() {
        assert_eq!(
            compile_raw("SELECT {fields[2]} FROM {table}").unwrap_err(),
            TemplateError::FieldIndexOutOfRange {
                query: "q".into(),
                index: 2,
                count: 2
            }
        );
    }

    #[test]
    fn test_malformed_field_reference() {
        assert!(matches!(
            compile_raw("SELECT {fields[x]} FROM {table}"),
            Err(TemplateError::MalformedFieldReference { .. })
        ));
    }

    #[test]
    fn test_empty_and_unbalanced_braces() {
        assert!(matches!(
            compile_raw("SELECT {} FROM {table}"),
            Err(TemplateError::EmptyPlaceholder { .. })
        ));
        assert!(matches!(
            compile_raw("SELECT {a FROM {table}"),
            Err(TemplateError::UnbalancedBrace { .. })
        ));
    }

    #[test]
    fn test_template_without_tokens() {
        let (sql, order) = compile_raw("SELECT 1").unwrap();
        assert_eq!(sql, "SELECT 1");
        assert!(order.is_empty());
    }

    #[test]
    fn test_compiled_query_serializes_rows() {
        let fields = fields();
        let ctx = TemplateContext::new("t", "date", &fields);
        let plain = compile("plain", &QueryDefinition::new("SELECT * FROM {table}"), &ctx).unwrap();
        let row = json!({"temperature": 1}).as_object().unwrap().clone();
        assert_eq!(plain.serialize(vec![row.clone()]), json!([{"temperature": 1}]));

        let counted = compile(
            "counted",
            &QueryDefinition::new("SELECT * FROM {table}").with_serializer(|rows| json!(rows.len())),
            &ctx,
        )
        .unwrap();
        assert_eq!(counted.name(), "counted");
        assert_eq!(counted.serialize(vec![row]), json!(1));
    }
}
