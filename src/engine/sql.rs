//! Structured statement builder.
//!
//! Identifiers go through `Ident`, which only admits `[A-Za-z_][A-Za-z0-9_]*`
//! and renders double-quoted. Values never enter the SQL text: `push_param`
//! writes a `?` placeholder and records the value for binding.

use std::fmt;

use duckdb::types::Value;

use crate::error::{BidsError, BidsResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> BidsResult<Self> {
        let name = name.into();
        if is_safe_ident(&name) { Ok(Self(name)) } else { Err(BidsError::InvalidIdentifier(name)) }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "\"{}\"", self.0) }
}

pub fn is_safe_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQL text plus the values bound to its `?` placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: &str) -> Self { Self { sql: sql.to_string(), params: Vec::new() } }

    pub fn sql(&self) -> &str { &self.sql }

    pub fn params(&self) -> &[Value] { &self.params }

    pub fn is_empty(&self) -> bool { self.sql.trim().is_empty() }

    /// Append fixed SQL text. Never pass caller-provided values here.
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        self.sql.push_str(&ident.to_string());
        self
    }

    /// `COLUMNS(c -> c NOT IN ('a', ...))`: every input column except `names`.
    /// Allow-listed identifiers are safe inside single quotes.
    pub fn push_columns_except(&mut self, names: &[Ident]) -> &mut Self {
        let list: Vec<String> = names.iter().map(|n| format!("'{}'", n.as_str())).collect();
        self.sql.push_str(&format!("COLUMNS(c -> c NOT IN ({}))", list.join(", ")));
        self
    }

    pub fn push_param(&mut self, value: Value) -> &mut Self {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    pub fn push_text(&mut self, value: &str) -> &mut Self { self.push_param(Value::Text(value.to_string())) }

    /// `CAST(? AS VARCHAR)` bound to `value`, or to NULL when absent.
    pub fn push_varchar(&mut self, value: Option<&str>) -> &mut Self {
        self.sql.push_str("CAST(");
        match value {
            Some(v) => self.push_text(v),
            None => self.push_param(Value::Null),
        };
        self.sql.push_str(" AS VARCHAR)");
        self
    }

    /// `expr AS "alias"` for a fragment that is itself a statement.
    pub fn push_aliased(&mut self, expr: Statement, alias: &Ident) -> &mut Self {
        self.push_statement(expr);
        self.sql.push_str(" AS ");
        self.push_ident(alias)
    }

    pub fn push_statement(&mut self, other: Statement) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
        self
    }

    /// Join fragments with `sep`, keeping parameter order.
    pub fn join(parts: Vec<Statement>, sep: &str) -> Statement {
        let mut out = Statement::default();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 { out.push_sql(sep); }
            out.push_statement(part);
        }
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.sql) }
}
