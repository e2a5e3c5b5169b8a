/// Typed row parameters for the secondary store
///
/// All writes carry column values as structured `RowValue`s; the engine
/// never builds query text from field data. A store implementation binds
/// these as parameters of whatever statement it prepares.

use serde::{Deserialize, Serialize};

/// One typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Flat text representation of a structured payload (see `pack_json`)
    Json(String),
    Null,
}

impl RowValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RowValue::Text(s) | RowValue::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RowValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }
}

/// An ordered set of named column values bound to one insert or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, RowValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, RowValue::Text(value.into()));
        self
    }

    pub fn integer(mut self, column: impl Into<String>, value: i64) -> Self {
        self.set(column, RowValue::Integer(value));
        self
    }

    pub fn float(mut self, column: impl Into<String>, value: f64) -> Self {
        self.set(column, RowValue::Float(value));
        self
    }

    pub fn boolean(mut self, column: impl Into<String>, value: bool) -> Self {
        self.set(column, RowValue::Bool(value));
        self
    }

    pub fn json(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, RowValue::Json(value.into()));
        self
    }

    pub fn null(mut self, column: impl Into<String>) -> Self {
        self.set(column, RowValue::Null);
        self
    }

    /// Set a column, replacing any existing value for the same name.
    pub fn set(&mut self, column: impl Into<String>, value: RowValue) {
        let column = column.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, v)) => *v = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Merge another row's columns into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &Row) {
        for (column, value) in &other.columns {
            self.set(column.clone(), value.clone());
        }
    }

    pub fn get(&self, column: &str) -> Option<&RowValue> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> &[(String, RowValue)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_and_reads_columns() {
        let row = Row::new()
            .text("title", "My QR")
            .integer("scan_count", 3)
            .boolean("is_active", true)
            .null("data");

        assert_eq!(row.len(), 4);
        assert_eq!(row.get("title").unwrap().as_text(), Some("My QR"));
        assert_eq!(row.get("scan_count").unwrap().as_integer(), Some(3));
        assert_eq!(row.get("is_active").unwrap().as_bool(), Some(true));
        assert!(row.get("data").unwrap().is_null());
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn set_replaces_existing_column() {
        let mut row = Row::new().boolean("is_active", true);
        row.set("is_active", RowValue::Bool(false));

        assert_eq!(row.len(), 1);
        assert_eq!(row.get("is_active").unwrap().as_bool(), Some(false));
    }

    #[test]
    fn merge_overwrites_and_extends() {
        let mut base = Row::new().text("title", "old").integer("scan_count", 1);
        let incoming = Row::new().text("title", "new").boolean("is_active", false);

        base.merge(&incoming);

        assert_eq!(base.get("title").unwrap().as_text(), Some("new"));
        assert_eq!(base.get("scan_count").unwrap().as_integer(), Some(1));
        assert_eq!(base.get("is_active").unwrap().as_bool(), Some(false));
    }
}
