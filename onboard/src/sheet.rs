//! Editable row sets shared by the template, SQL and catalog layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A non-null cell value. Numbers stay numbers so generated SQL keeps them bare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

pub type Cell = Option<Value>;

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Int(_) => None,
        }
    }

    /// Convert a JSON scalar read back from the database.
    pub fn from_json(v: &serde_json::Value) -> Cell {
        match v {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::text(if *b { "Y" } else { "N" })),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => Some(Value::text(n.to_string())),
            },
            serde_json::Value::String(s) => Some(Value::text(s.clone())),
            other => Some(Value::text(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// Rows destined for one configuration table, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new<S: Into<String>>(table: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    /// Append a row built by looking each column up by name.
    pub fn push_with(&mut self, mut cell_for: impl FnMut(&str) -> Cell) {
        let row = self.columns.iter().map(|c| cell_for(c)).collect();
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Returns false when the row or column does not exist.
    pub fn set(&mut self, row: usize, column: &str, cell: Cell) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        match self.rows.get_mut(row).and_then(|r| r.get_mut(idx)) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Append `other`'s rows, matching columns by name. An empty-column sheet
    /// adopts `other`'s layout.
    pub fn append(&mut self, other: Sheet) {
        if self.columns.is_empty() {
            self.columns = other.columns;
            self.rows = other.rows;
            return;
        }
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();
        for row in other.rows {
            let aligned = mapping
                .iter()
                .map(|idx| idx.and_then(|i| row.get(i).cloned().flatten()))
                .collect();
            self.rows.push(aligned);
        }
    }

    /// Build a sheet from JSON objects keyed by column name.
    pub fn from_json_rows(
        table: impl Into<String>,
        columns: &[String],
        rows: &[serde_json::Value],
    ) -> Self {
        let mut sheet = Sheet::new(table, columns.iter().cloned());
        for row in rows {
            sheet.push_with(|col| row.get(col).and_then(Value::from_json));
        }
        sheet
    }
}
