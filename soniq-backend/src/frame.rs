//! Typed tabular abstraction
//!
//! A `Frame` is a partitioned collection of rows with named, typed columns.
//! It is the interface FLWOR pipelines use in distributed mode: the engine
//! stores serialized tuples in a binary column, appends derived columns
//! through row callbacks with a declared return schema, projects, sorts, and
//! de-duplicates.
//!
//! The reference implementation sorts with a **stable** sort; backends
//! without that guarantee require the engine to append an input-index
//! tie-break column.

use crate::error::{BackendError, Result, UdfError};
use crate::rdd::Rdd;
use bigdecimal::BigDecimal;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Column data types
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnType {
    Binary,
    Boolean,
    Integer,
    Long,
    Double,
    Decimal,
    String,
    /// Nested record; sort keys may address its fields by name
    Struct(Vec<Field>),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Binary => write!(f, "binary"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Long => write!(f, "long"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Decimal => write!(f, "decimal"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Struct(_) => write!(f, "struct"),
        }
    }
}

/// A named, typed column
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: false,
        }
    }

    pub fn nullable(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: true,
        }
    }
}

/// Ordered list of fields
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(BackendError::DuplicateColumn(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single cell value
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Null,
    Binary(Arc<[u8]>),
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    String(Arc<str>),
    Struct(Vec<Cell>),
}

impl Cell {
    fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Binary(_) => "binary",
            Cell::Boolean(_) => "boolean",
            Cell::Integer(_) => "integer",
            Cell::Long(_) => "long",
            Cell::Double(_) => "double",
            Cell::Decimal(_) => "decimal",
            Cell::String(_) => "string",
            Cell::Struct(_) => "struct",
        }
    }

    fn matches(&self, field: &Field) -> bool {
        match (self, &field.dtype) {
            (Cell::Null, _) => field.nullable,
            (Cell::Binary(_), ColumnType::Binary) => true,
            (Cell::Boolean(_), ColumnType::Boolean) => true,
            (Cell::Integer(_), ColumnType::Integer) => true,
            (Cell::Long(_), ColumnType::Long) => true,
            (Cell::Double(_), ColumnType::Double) => true,
            (Cell::Decimal(_), ColumnType::Decimal) => true,
            (Cell::String(_), ColumnType::String) => true,
            (Cell::Struct(cells), ColumnType::Struct(fields)) => {
                cells.len() == fields.len()
                    && cells.iter().zip(fields).all(|(c, f)| c.matches(f))
            }
            _ => false,
        }
    }
}

/// A row of cells in schema order
pub type Row = Vec<Cell>;

/// Total order over cells.
///
/// Within one column every cell has the column's type, so only same-type
/// comparisons are meaningful; cross-type falls back to a fixed type rank so
/// the order stays total. Null sorts first, NaN sorts last among doubles.
pub fn compare_cells(a: &Cell, b: &Cell) -> Ordering {
    fn rank(c: &Cell) -> u8 {
        match c {
            Cell::Null => 0,
            Cell::Boolean(_) => 1,
            Cell::Integer(_) => 2,
            Cell::Long(_) => 3,
            Cell::Double(_) => 4,
            Cell::Decimal(_) => 5,
            Cell::String(_) => 6,
            Cell::Binary(_) => 7,
            Cell::Struct(_) => 8,
        }
    }
    match (a, b) {
        (Cell::Null, Cell::Null) => Ordering::Equal,
        (Cell::Boolean(x), Cell::Boolean(y)) => x.cmp(y),
        (Cell::Integer(x), Cell::Integer(y)) => x.cmp(y),
        (Cell::Long(x), Cell::Long(y)) => x.cmp(y),
        (Cell::Double(x), Cell::Double(y)) => x.total_cmp(y),
        (Cell::Decimal(x), Cell::Decimal(y)) => x.cmp(y),
        (Cell::String(x), Cell::String(y)) => x.cmp(y),
        (Cell::Binary(x), Cell::Binary(y)) => x.cmp(y),
        (Cell::Struct(x), Cell::Struct(y)) => {
            for (cx, cy) in x.iter().zip(y.iter()) {
                let ord = compare_cells(cx, cy);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A sort key: a column, optionally a struct field within it, and a direction
#[derive(Clone, Debug)]
pub struct SortKey {
    pub column: String,
    pub field: Option<String>,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            field: None,
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            field: None,
            descending: true,
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Partitioned rows with a named, typed schema
#[derive(Clone, Debug)]
pub struct Frame {
    schema: Arc<Schema>,
    rows: Rdd<Row>,
}

impl Frame {
    /// Build a frame, validating every row against the schema
    pub fn new(schema: Schema, rows: Rdd<Row>) -> Result<Self> {
        let schema = Arc::new(schema);
        for row in rows.collect() {
            validate_row(&schema, &row)?;
        }
        Ok(Self { schema, rows })
    }

    /// Build a frame from already-validated rows.
    ///
    /// Used by internal transformations whose output types are guaranteed by
    /// construction.
    fn from_validated(schema: Arc<Schema>, rows: Rdd<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Underlying partitioned row collection
    pub fn rows(&self) -> &Rdd<Row> {
        &self.rows
    }

    pub fn count(&self) -> u64 {
        self.rows.count()
    }

    pub fn collect(&self) -> Vec<Row> {
        self.rows.collect()
    }

    pub fn take(&self, k: usize) -> Vec<Row> {
        self.rows.take(k)
    }

    /// Pin for reuse (see [`Rdd::cache`])
    pub fn cache(&self) -> Frame {
        Frame::from_validated(self.schema.clone(), self.rows.cache())
    }

    /// Project to the named columns, in the given order
    pub fn select(&self, columns: &[&str]) -> Result<Frame> {
        let mut indices = Vec::with_capacity(columns.len());
        let mut fields = Vec::with_capacity(columns.len());
        for name in columns {
            let idx = self
                .schema
                .index_of(name)
                .ok_or_else(|| BackendError::ColumnNotFound((*name).to_string()))?;
            indices.push(idx);
            fields.push(self.schema.fields()[idx].clone());
        }
        let schema = Arc::new(Schema::new(fields)?);
        let rows = self
            .rows
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect());
        Ok(Frame::from_validated(schema, rows))
    }

    /// Distinct rows.
    ///
    /// Implemented as a sort-and-dedup over the whole frame; the result is a
    /// single partition.
    pub fn distinct(&self) -> Frame {
        let mut rows = self.rows.collect();
        rows.sort_by(compare_rows_all);
        rows.dedup_by(|a, b| compare_rows_all(a, b) == Ordering::Equal);
        Frame::from_validated(self.schema.clone(), Rdd::single_partition(rows))
    }

    /// Append a column computed per row by a registered callback.
    ///
    /// The callback's return value is validated against the declared field
    /// type; a mismatch is a schema error, a callback failure is carried
    /// through as [`BackendError::Udf`].
    pub fn with_column(
        &self,
        field: Field,
        udf: &dyn Fn(&Row) -> std::result::Result<Cell, UdfError>,
    ) -> Result<Frame> {
        if self.schema.index_of(&field.name).is_some() {
            return Err(BackendError::DuplicateColumn(field.name));
        }
        let mut fields = self.schema.fields().to_vec();
        fields.push(field.clone());
        let schema = Arc::new(Schema::new(fields)?);

        let rows = self.rows.try_map(|row| {
            let cell = udf(row).map_err(BackendError::Udf)?;
            if !cell.matches(&field) {
                return Err(BackendError::TypeMismatch {
                    column: field.name.clone(),
                    expected: field.dtype.to_string(),
                    found: cell.type_name().to_string(),
                });
            }
            let mut out = row.clone();
            out.push(cell);
            Ok(out)
        })?;
        Ok(Frame::from_validated(schema, rows))
    }

    /// Replace the frame's rows via a callback producing zero or more rows
    /// under a new schema.
    pub fn flat_map_rows(
        &self,
        schema: Schema,
        udf: &dyn Fn(&Row) -> std::result::Result<Vec<Row>, UdfError>,
    ) -> Result<Frame> {
        let schema = Arc::new(schema);
        let check = schema.clone();
        let rows = self.rows.try_flat_map(|row| {
            let out = udf(row).map_err(BackendError::Udf)?;
            for r in &out {
                validate_row(&check, r)?;
            }
            Ok(out)
        })?;
        Ok(Frame::from_validated(schema, rows))
    }

    /// Keep rows matching a registered predicate callback
    pub fn filter_rows(
        &self,
        udf: &dyn Fn(&Row) -> std::result::Result<bool, UdfError>,
    ) -> Result<Frame> {
        let rows = self
            .rows
            .try_filter(|row| udf(row).map_err(BackendError::Udf))?;
        Ok(Frame::from_validated(self.schema.clone(), rows))
    }

    /// Sort by the given keys. The sort is stable and global; the result is
    /// a single partition.
    pub fn order_by(&self, keys: &[SortKey]) -> Result<Frame> {
        // Resolve (column index, struct field index) pairs up front
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            let col = self
                .schema
                .index_of(&key.column)
                .ok_or_else(|| BackendError::ColumnNotFound(key.column.clone()))?;
            let field_idx = match &key.field {
                None => None,
                Some(name) => match &self.schema.fields()[col].dtype {
                    ColumnType::Struct(fields) => Some(
                        fields
                            .iter()
                            .position(|f| &f.name == name)
                            .ok_or_else(|| BackendError::FieldNotFound {
                                column: key.column.clone(),
                                field: name.clone(),
                            })?,
                    ),
                    _ => {
                        return Err(BackendError::FieldNotFound {
                            column: key.column.clone(),
                            field: name.clone(),
                        })
                    }
                },
            };
            resolved.push((col, field_idx, key.descending));
        }

        let mut rows = self.rows.collect();
        tracing::debug!(rows = rows.len(), keys = keys.len(), "frame order_by");
        rows.sort_by(|a, b| {
            for &(col, field_idx, descending) in &resolved {
                let (ca, cb) = match field_idx {
                    None => (&a[col], &b[col]),
                    Some(fi) => match (&a[col], &b[col]) {
                        (Cell::Struct(fa), Cell::Struct(fb)) => (&fa[fi], &fb[fi]),
                        other => (other.0, other.1),
                    },
                };
                let ord = compare_cells(ca, cb);
                if ord != Ordering::Equal {
                    return if descending { ord.reverse() } else { ord };
                }
            }
            Ordering::Equal
        });
        Ok(Frame::from_validated(
            self.schema.clone(),
            Rdd::single_partition(rows),
        ))
    }
}

fn validate_row(schema: &Schema, row: &Row) -> Result<()> {
    if row.len() != schema.len() {
        return Err(BackendError::RowWidth {
            expected: schema.len(),
            found: row.len(),
        });
    }
    for (cell, field) in row.iter().zip(schema.fields()) {
        if !cell.matches(field) {
            return Err(BackendError::TypeMismatch {
                column: field.name.clone(),
                expected: field.dtype.to_string(),
                found: cell.type_name().to_string(),
            });
        }
    }
    Ok(())
}

fn compare_rows_all(a: &Row, b: &Row) -> Ordering {
    for (ca, cb) in a.iter().zip(b.iter()) {
        let ord = compare_cells(ca, cb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        let schema = Schema::new(vec![
            Field::new("name", ColumnType::String),
            Field::nullable("score", ColumnType::Long),
        ])
        .unwrap();
        let rows = Rdd::from_vec(
            vec![
                vec![Cell::String("b".into()), Cell::Long(2)],
                vec![Cell::String("a".into()), Cell::Long(3)],
                vec![Cell::String("c".into()), Cell::Null],
                vec![Cell::String("a".into()), Cell::Long(3)],
            ],
            2,
        );
        Frame::new(schema, rows).unwrap()
    }

    #[test]
    fn test_schema_validation() {
        let schema = Schema::new(vec![Field::new("x", ColumnType::Long)]).unwrap();
        let bad = Rdd::single_partition(vec![vec![Cell::String("oops".into())]]);
        assert!(matches!(
            Frame::new(schema, bad),
            Err(BackendError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        assert!(matches!(
            Schema::new(vec![
                Field::new("x", ColumnType::Long),
                Field::new("x", ColumnType::String),
            ]),
            Err(BackendError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn test_select_reorders() {
        let frame = test_frame();
        let projected = frame.select(&["score", "name"]).unwrap();
        assert_eq!(projected.schema().names(), vec!["score", "name"]);
        assert_eq!(projected.collect()[0][1], Cell::String("b".into()));
    }

    #[test]
    fn test_order_by_with_nulls_first() {
        let frame = test_frame();
        let sorted = frame.order_by(&[SortKey::asc("score")]).unwrap();
        let rows = sorted.collect();
        assert_eq!(rows[0][1], Cell::Null);
        assert_eq!(rows[1][1], Cell::Long(2));
    }

    #[test]
    fn test_order_by_descending() {
        let frame = test_frame();
        let sorted = frame.order_by(&[SortKey::desc("name")]).unwrap();
        let names: Vec<Cell> = sorted.collect().into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            names,
            vec![
                Cell::String("c".into()),
                Cell::String("b".into()),
                Cell::String("a".into()),
                Cell::String("a".into()),
            ]
        );
    }

    #[test]
    fn test_distinct() {
        let frame = test_frame();
        assert_eq!(frame.distinct().count(), 3);
    }

    #[test]
    fn test_with_column_validates_type() {
        let frame = test_frame();
        let ok = frame.with_column(Field::new("flag", ColumnType::Boolean), &|row| {
            Ok(Cell::Boolean(matches!(row[1], Cell::Long(_))))
        });
        assert!(ok.is_ok());

        let bad = frame.with_column(Field::new("flag2", ColumnType::Boolean), &|_| {
            Ok(Cell::Long(1))
        });
        assert!(matches!(bad, Err(BackendError::TypeMismatch { .. })));
    }

    #[test]
    fn test_struct_sort_key() {
        let schema = Schema::new(vec![Field::new(
            "key",
            ColumnType::Struct(vec![
                Field::new("check", ColumnType::Integer),
                Field::nullable("value", ColumnType::Long),
            ]),
        )])
        .unwrap();
        let rows = Rdd::single_partition(vec![
            vec![Cell::Struct(vec![Cell::Integer(3), Cell::Long(5)])],
            vec![Cell::Struct(vec![Cell::Integer(1), Cell::Null])],
            vec![Cell::Struct(vec![Cell::Integer(3), Cell::Long(2)])],
        ]);
        let frame = Frame::new(schema, rows).unwrap();
        let sorted = frame
            .order_by(&[
                SortKey::asc("key").field("check"),
                SortKey::asc("key").field("value"),
            ])
            .unwrap();
        let checks: Vec<Cell> = sorted
            .collect()
            .into_iter()
            .map(|r| match &r[0] {
                Cell::Struct(cells) => cells[0].clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            checks,
            vec![Cell::Integer(1), Cell::Integer(3), Cell::Integer(3)]
        );
    }
}
