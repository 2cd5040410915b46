// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Query document parsing.
//!
//! Only what the catalog resolvers need: one query operation, field
//! aliases, nested selections, inline fragments and the `@include`/`@skip`
//! directives. Arguments are kept as raw text and read with [`argument`]
//! and [`filter_eq`]. Named fragments are rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

static SCALAR_ARGUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)\s*:\s*(\$\w+|"(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|true|false|null)"#)
        .expect("scalar argument pattern is valid")
});

static FILTER_EQ: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)\s*:\s*\{\s*(?:eq|match)\s*:\s*(\$\w+|"(?:[^"\\]|\\.)*"|-?\d+)\s*\}"#)
        .expect("filter pattern is valid")
});

/// Body of a GraphQL POST request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlRequest {
    /// Query document.
    pub query: String,
    /// Variable values.
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    /// Operation name sent by the client.
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

/// Query parsing failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The document is not valid for this parser.
    #[error("Syntax Error: {0}")]
    Syntax(String),

    /// The operation is not a query.
    #[error("{0} operations are not supported")]
    UnsupportedOperation(String),
}

/// A directive attached to a field or fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    /// Directive name without `@`.
    pub name: String,
    /// Raw argument text.
    pub arguments: String,
}

/// One selected field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Alias used as the response key.
    pub alias: Option<String>,
    /// Raw argument text between the parentheses.
    pub arguments: String,
    /// Directives of the field and of any enclosing inline fragment.
    pub directives: Vec<Directive>,
    /// Type condition of the enclosing inline fragment.
    pub type_condition: Option<String>,
    /// Sub-selection, empty for leaves.
    pub selection: Vec<Field>,
}

impl Field {
    /// Key of this field in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether `@include`/`@skip` keep this field.
    pub fn is_included(&self, variables: &Map<String, Value>) -> bool {
        self.directives.iter().all(|directive| {
            let condition = argument(&directive.arguments, "if", variables);
            match directive.name.as_str() {
                "include" => condition == Some(Value::Bool(true)),
                "skip" => condition != Some(Value::Bool(true)),
                _ => true,
            }
        })
    }

    /// Whether the field is selected on an object of `type_name`.
    ///
    /// Conditions naming an interface apply to every type.
    pub fn applies_to(&self, type_name: &str) -> bool {
        match &self.type_condition {
            Some(condition) => condition == type_name || condition.ends_with("Interface"),
            None => true,
        }
    }
}

/// Parsed query operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operation {
    /// Declared operation name.
    pub name: Option<String>,
    /// Root selection.
    pub selection: Vec<Field>,
}

/// Deepest selection set nesting a query may use.
pub const MAX_DEPTH: usize = 32;

/// Parse a document holding a single query operation.
pub fn parse(query: &str) -> Result<Operation, QueryError> {
    let mut parser = Parser {
        chars: query.chars().collect(),
        pos: 0,
        depth: 0,
    };
    parser.document()
}

/// Value of the scalar argument `name`, resolving `$variables`.
pub fn argument(arguments: &str, name: &str, variables: &Map<String, Value>) -> Option<Value> {
    SCALAR_ARGUMENT
        .captures_iter(arguments)
        .find(|captures| &captures[1] == name)
        .and_then(|captures| literal(&captures[2], variables))
}

/// Value compared by an `{ eq: .. }` or `{ match: .. }` filter on `name`.
pub fn filter_eq(arguments: &str, name: &str, variables: &Map<String, Value>) -> Option<Value> {
    FILTER_EQ
        .captures_iter(arguments)
        .find(|captures| &captures[1] == name)
        .and_then(|captures| literal(&captures[2], variables))
}

fn literal(raw: &str, variables: &Map<String, Value>) -> Option<Value> {
    match raw.strip_prefix('$') {
        Some(variable) => variables.get(variable).cloned(),
        None => serde_json::from_str(raw).ok(),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn document(&mut self) -> Result<Operation, QueryError> {
        self.skip_ignored();
        let mut operation = Operation::default();
        if self.peek() != Some('{') {
            let keyword = self.name()?;
            if keyword != "query" {
                return Err(QueryError::UnsupportedOperation(keyword));
            }
            self.skip_ignored();
            if self.peek().is_some_and(is_name_start) {
                operation.name = Some(self.name()?);
                self.skip_ignored();
            }
            if self.peek() == Some('(') {
                self.balanced('(', ')')?;
            }
            self.directives()?;
        }
        operation.selection = self.selection_set()?;
        self.skip_ignored();
        if let Some(c) = self.peek() {
            return Err(QueryError::Syntax(format!(
                "Unexpected '{}' after the operation at offset {}",
                c, self.pos
            )));
        }
        Ok(operation)
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, QueryError> {
        if self.depth == MAX_DEPTH {
            return Err(QueryError::Syntax(format!(
                "Selections nested deeper than {} levels at offset {}",
                MAX_DEPTH, self.pos
            )));
        }
        self.depth += 1;
        let fields = self.selections();
        self.depth -= 1;
        fields
    }

    fn selections(&mut self) -> Result<Vec<Field>, QueryError> {
        self.expect('{')?;
        let mut fields = Vec::new();
        loop {
            self.skip_ignored();
            match self.peek() {
                None => return Err(QueryError::Syntax("Expected '}', found end of query".into())),
                Some('}') => {
                    self.pos += 1;
                    return Ok(fields);
                }
                Some('.') => fields.extend(self.inline_fragment()?),
                Some(_) => fields.push(self.field()?),
            }
        }
    }

    fn inline_fragment(&mut self) -> Result<Vec<Field>, QueryError> {
        for _ in 0..3 {
            self.expect('.')?;
        }
        self.skip_ignored();
        let mut type_condition = None;
        if self.peek().is_some_and(is_name_start) {
            let keyword = self.name()?;
            if keyword != "on" {
                return Err(QueryError::Syntax(format!(
                    "Fragment spread '{}' is not supported",
                    keyword
                )));
            }
            self.skip_ignored();
            type_condition = Some(self.name()?);
        }
        let directives = self.directives()?;
        let mut fields = self.selection_set()?;
        for field in &mut fields {
            if field.type_condition.is_none() {
                field.type_condition = type_condition.clone();
            }
            field.directives.extend(directives.iter().cloned());
        }
        Ok(fields)
    }

    fn field(&mut self) -> Result<Field, QueryError> {
        let mut field = Field {
            name: self.name()?,
            ..Field::default()
        };
        self.skip_ignored();
        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_ignored();
            field.alias = Some(std::mem::replace(&mut field.name, self.name()?));
            self.skip_ignored();
        }
        if self.peek() == Some('(') {
            field.arguments = self.balanced('(', ')')?;
        }
        field.directives = self.directives()?;
        if self.peek() == Some('{') {
            field.selection = self.selection_set()?;
        }
        Ok(field)
    }

    fn directives(&mut self) -> Result<Vec<Directive>, QueryError> {
        let mut directives = Vec::new();
        self.skip_ignored();
        while self.peek() == Some('@') {
            self.pos += 1;
            let mut directive = Directive {
                name: self.name()?,
                ..Directive::default()
            };
            self.skip_ignored();
            if self.peek() == Some('(') {
                directive.arguments = self.balanced('(', ')')?;
            }
            self.skip_ignored();
            directives.push(directive);
        }
        Ok(directives)
    }

    /// Consume a bracketed group and return its inner text.
    fn balanced(&mut self, open: char, close: char) -> Result<String, QueryError> {
        self.expect(open)?;
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '"' => self.skip_string()?,
                c if c == open => depth += 1,
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        let inner: String = self.chars[start..self.pos - 1].iter().collect();
                        self.skip_ignored();
                        return Ok(inner);
                    }
                }
                _ => {}
            }
        }
        Err(QueryError::Syntax(format!("Expected '{}', found end of query", close)))
    }

    fn skip_string(&mut self) -> Result<(), QueryError> {
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => self.pos += 1,
                '"' => return Ok(()),
                _ => {}
            }
        }
        Err(QueryError::Syntax("Unterminated string".into()))
    }

    fn name(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_name_start(c) => self.pos += 1,
            Some(c) => {
                return Err(QueryError::Syntax(format!(
                    "Expected name, found '{}' at offset {}",
                    c, self.pos
                )));
            }
            None => return Err(QueryError::Syntax("Expected name, found end of query".into())),
        }
        while self
            .peek()
            .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
        {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(QueryError::Syntax(format!(
                "Expected '{}', found '{}' at offset {}",
                expected, c, self.pos
            ))),
            None => Err(QueryError::Syntax(format!(
                "Expected '{}', found end of query",
                expected
            ))),
        }
    }

    fn skip_ignored(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                c if c == ',' || c.is_whitespace() || c == '\u{feff}' => self.pos += 1,
                _ => return,
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}
