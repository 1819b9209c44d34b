//! In-memory column frame.
//!
//! Parsers emit data in chunks of [`Frame`]: an ordered list of named columns,
//! each either fully numeric (`Float64`) or textual (`Utf8`). The artifact
//! writer, the tile materializer, the sampler and the derived-column evaluator
//! all operate on frames; nothing in the pipelines touches row-major storage.

use serde_json::{Map, Number, Value as Json};

use crate::error::{CoreError, CoreResult};

/// Physical type of a frame column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Float64,
    Utf8,
}

/// A single named-by-position column of nullable values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float64(v) => v.len(),
            Column::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Float64(_) => ColumnKind::Float64,
            Column::Utf8(_) => ColumnKind::Utf8,
        }
    }

    /// Numeric view of the column: `Float64` values pass through, `Utf8`
    /// cells are parsed (failures and empty strings become null).
    pub fn numeric(&self) -> Vec<Option<f64>> {
        match self {
            Column::Float64(v) => v.clone(),
            Column::Utf8(v) => v
                .iter()
                .map(|cell| cell.as_deref().and_then(parse_numeric))
                .collect(),
        }
    }

    /// True when every non-null cell coerces to a finite-or-NaN number.
    pub fn all_numeric(&self) -> bool {
        match self {
            Column::Float64(_) => true,
            Column::Utf8(v) => v
                .iter()
                .all(|cell| cell.as_deref().is_none_or(|s| parse_numeric(s).is_some())),
        }
    }

    fn json_cell(&self, row: usize) -> Json {
        match self {
            Column::Float64(v) => match v.get(row).copied().flatten() {
                Some(x) => Number::from_f64(x).map(Json::Number).unwrap_or(Json::Null),
                None => Json::Null,
            },
            Column::Utf8(v) => match v.get(row).and_then(|c| c.as_deref()) {
                Some(s) => Json::String(s.to_string()),
                None => Json::Null,
            },
        }
    }
}

/// Parse one text cell to a number. Empty / whitespace cells are null.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// An ordered set of equally-long named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    /// Build a frame from columns; all columns must share one length.
    pub fn new(names: Vec<String>, columns: Vec<Column>) -> Self {
        debug_assert_eq!(names.len(), columns.len());
        debug_assert!(
            columns.windows(2).all(|w| w[0].len() == w[1].len()),
            "frame columns must have equal length"
        );
        Self { names, columns }
    }

    /// Build a frame from text cells, inferring each column's kind: a column
    /// becomes `Float64` when every non-null cell parses as a number.
    ///
    /// `rows` are row-major; short rows are padded with null.
    pub fn from_text_rows(names: Vec<String>, rows: &[Vec<Option<String>>]) -> Self {
        let width = names.len();
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); width];
        for row in rows {
            for (i, slot) in cells.iter_mut().enumerate() {
                slot.push(row.get(i).cloned().flatten());
            }
        }

        let columns = cells
            .into_iter()
            .map(|col| {
                let numeric = col
                    .iter()
                    .all(|cell| cell.as_deref().is_none_or(|s| parse_numeric(s).is_some()));
                if numeric {
                    Column::Float64(
                        col.iter()
                            .map(|cell| cell.as_deref().and_then(parse_numeric))
                            .collect(),
                    )
                } else {
                    Column::Utf8(col)
                }
            })
            .collect();

        Self { names, columns }
    }

    /// Build a frame from text cells against an already-decided schema.
    ///
    /// Used for every chunk after the first: `Float64` columns coerce each
    /// cell (failures become null) instead of re-inferring the kind.
    pub fn from_text_rows_with_kinds(
        names: Vec<String>,
        rows: &[Vec<Option<String>>],
        kinds: &[ColumnKind],
    ) -> Self {
        let width = names.len();
        let mut columns: Vec<Column> = kinds
            .iter()
            .map(|k| match k {
                ColumnKind::Float64 => Column::Float64(Vec::with_capacity(rows.len())),
                ColumnKind::Utf8 => Column::Utf8(Vec::with_capacity(rows.len())),
            })
            .collect();

        for row in rows {
            for (i, col) in columns.iter_mut().enumerate().take(width) {
                let cell = row.get(i).cloned().flatten();
                match col {
                    Column::Float64(v) => v.push(cell.as_deref().and_then(parse_numeric)),
                    Column::Utf8(v) => v.push(cell),
                }
            }
        }

        Self { names, columns }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(Column::kind).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.index_of(name).and_then(|i| self.column(i))
    }

    /// Numeric view of a column, or `ColumnNotFound`.
    pub fn numeric_by_name(&self, name: &str, context: &str) -> CoreResult<Vec<Option<f64>>> {
        self.column_by_name(name)
            .map(Column::numeric)
            .ok_or_else(|| CoreError::ColumnNotFound {
                column: name.to_string(),
                context: context.to_string(),
            })
    }

    /// Append a column; it must match the frame's row count (or the frame
    /// must be empty of columns).
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) {
        debug_assert!(self.columns.is_empty() || column.len() == self.len());
        self.names.push(name.into());
        self.columns.push(column);
    }

    /// Replace or append a column by name.
    pub fn set_column(&mut self, name: &str, column: Column) {
        match self.index_of(name) {
            Some(i) => self.columns[i] = column,
            None => self.push_column(name, column),
        }
    }

    /// Rename a column in place; returns false when `from` does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.index_of(from) {
            Some(i) => {
                self.names[i] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// All rows as JSON objects keyed by column name.
    pub fn rows_json(&self) -> Vec<Json> {
        self.sample_rows(self.len())
    }

    /// First `n` rows as JSON objects keyed by column name.
    pub fn sample_rows(&self, n: usize) -> Vec<Json> {
        let take = n.min(self.len());
        (0..take)
            .map(|row| {
                let mut obj = Map::with_capacity(self.width());
                for (name, col) in self.names.iter().zip(self.columns.iter()) {
                    obj.insert(name.clone(), col.json_cell(row));
                }
                Json::Object(obj)
            })
            .collect()
    }
}
