//! Conversion of object items into typed frames
//!
//! Embedders hand the engine a collection of object items plus a schema
//! object (`{"column": "type-name", ...}`); the conversion validates that
//! the schema and the data agree in both directions — no missing and no
//! redundant type information — and that each declared type accepts the
//! column's values, then builds a frame. Violations raise `SchemaMismatch`
//! naming the offending column.

use crate::error::{Result, RuntimeError, SourceLocation};
use crate::item::{Item, ObjectItem};
use soniq_backend::{Cell, ColumnType, Field, Frame, Rdd, Schema, Session};
use std::sync::Arc;

/// Convert a local collection of object items into a frame
pub fn items_to_frame(
    items: &[Item],
    schema_item: &ObjectItem,
    session: &Session,
    location: &SourceLocation,
) -> Result<Frame> {
    let first = first_object(items.first(), location)?;
    validate_schema_against_item(schema_item, first, location)?;
    let schema = schema_from_item(schema_item, location)?;

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        rows.push(row_from_item(item, &schema, location)?);
    }
    Frame::new(schema, session.parallelize(rows))
        .map_err(|e| RuntimeError::from_backend(e, location.clone()))
}

/// Convert a partitioned collection of object items into a frame
pub fn rdd_to_frame(
    rdd: &Rdd<Item>,
    schema_item: &ObjectItem,
    location: &SourceLocation,
) -> Result<Frame> {
    let head = rdd.take(1);
    let first = first_object(head.first(), location)?;
    validate_schema_against_item(schema_item, first, location)?;
    let schema = schema_from_item(schema_item, location)?;

    let check = schema.clone();
    let rows = rdd.try_map(|item| row_from_item(item, &check, location))?;
    Frame::new(schema, rows).map_err(|e| RuntimeError::from_backend(e, location.clone()))
}

fn first_object<'a>(
    item: Option<&'a Item>,
    location: &SourceLocation,
) -> Result<&'a ObjectItem> {
    match item {
        Some(Item::Object(object)) => Ok(object),
        Some(other) => Err(RuntimeError::schema_mismatch(
            format!("tabular input must be objects, found {}", other.type_name()),
            location.clone(),
        )),
        None => Err(RuntimeError::schema_mismatch(
            "tabular input must not be empty",
            location.clone(),
        )),
    }
}

/// The schema's keys must match the data's keys exactly, both ways.
fn validate_schema_against_item(
    schema_item: &ObjectItem,
    data_item: &ObjectItem,
    location: &SourceLocation,
) -> Result<()> {
    for column in schema_item.keys() {
        if data_item.get(column).is_none() {
            return Err(RuntimeError::schema_mismatch(
                format!(
                    "schema columns must fully match the input data: missing data for column '{}'",
                    column
                ),
                location.clone(),
            ));
        }
    }
    for column in data_item.keys() {
        if schema_item.get(column).is_none() {
            return Err(RuntimeError::schema_mismatch(
                format!(
                    "schema columns must fully match the input data: \
                     redundant type information for non-existent column '{}'",
                    column
                ),
                location.clone(),
            ));
        }
    }
    Ok(())
}

fn schema_from_item(schema_item: &ObjectItem, location: &SourceLocation) -> Result<Schema> {
    let mut fields = Vec::with_capacity(schema_item.len());
    for (column, declared) in schema_item.iter() {
        let Some(type_name) = declared.as_str() else {
            return Err(RuntimeError::schema_mismatch(
                format!("type of column '{}' must be a string", column),
                location.clone(),
            ));
        };
        let dtype = match type_name {
            "boolean" => ColumnType::Boolean,
            "string" => ColumnType::String,
            "integer" => ColumnType::Long,
            "double" => ColumnType::Double,
            "decimal" => ColumnType::Decimal,
            other => {
                return Err(RuntimeError::schema_mismatch(
                    format!("unknown type '{}' for column '{}'", other, column),
                    location.clone(),
                ))
            }
        };
        fields.push(Field::nullable(column.as_ref(), dtype));
    }
    Schema::new(fields).map_err(|e| RuntimeError::from_backend(e, location.clone()))
}

fn row_from_item(item: &Item, schema: &Schema, location: &SourceLocation) -> Result<Vec<Cell>> {
    let Some(object) = item.as_object() else {
        return Err(RuntimeError::schema_mismatch(
            format!("tabular input must be objects, found {}", item.type_name()),
            location.clone(),
        ));
    };
    let mut row = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let value = object.get(&field.name);
        row.push(cell_for(value, field, location)?);
    }
    Ok(row)
}

/// Convert one member to its declared column type.
///
/// Wider numeric columns accept narrower values (a double column accepts
/// integers, a decimal column accepts exact numerics); anything else must
/// match exactly. Missing members and nulls become null cells.
fn cell_for(
    value: Option<&Item>,
    field: &Field,
    location: &SourceLocation,
) -> Result<Cell> {
    let mismatch = |found: &Item| {
        RuntimeError::schema_mismatch(
            format!(
                "expected '{}' type for column '{}', but found '{}'",
                field.dtype, field.name, found.type_name()
            ),
            location.clone(),
        )
    };
    let Some(value) = value else {
        return Ok(Cell::Null);
    };
    Ok(match (&field.dtype, value) {
        (_, Item::Null) => Cell::Null,
        (ColumnType::Boolean, Item::Boolean(b)) => Cell::Boolean(*b),
        (ColumnType::String, Item::String(s)) => Cell::String(Arc::from(s.as_ref())),
        (ColumnType::Long, Item::Integer(v)) => Cell::Long(*v),
        (ColumnType::Double, other) => match other.numeric_as_f64() {
            Some(v) => Cell::Double(v),
            None => return Err(mismatch(other)),
        },
        (ColumnType::Decimal, other) => match other.numeric_as_decimal() {
            Some(v) => Cell::Decimal(v),
            None => return Err(mismatch(other)),
        },
        (_, other) => return Err(mismatch(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(pairs: Vec<(&str, Item)>) -> Item {
        Item::object(
            pairs
                .into_iter()
                .map(|(k, v)| (Arc::from(k), v))
                .collect(),
            &SourceLocation::unknown(),
        )
        .unwrap()
    }

    fn schema_object(pairs: Vec<(&str, &str)>) -> Item {
        object(
            pairs
                .into_iter()
                .map(|(k, t)| (k, Item::string(t)))
                .collect(),
        )
    }

    #[test]
    fn test_conversion() {
        let session = Session::new();
        let schema = schema_object(vec![("name", "string"), ("score", "double")]);
        let items = vec![
            object(vec![("name", Item::string("a")), ("score", Item::Integer(3))]),
            object(vec![("name", Item::string("b")), ("score", Item::Double(1.5))]),
        ];
        let frame = items_to_frame(
            &items,
            schema.as_object().unwrap(),
            &session,
            &SourceLocation::unknown(),
        )
        .unwrap();
        assert_eq!(frame.count(), 2);
        // the integer was widened into the double column
        assert_eq!(frame.collect()[0][1], Cell::Double(3.0));
    }

    #[test]
    fn test_missing_column_in_schema() {
        let session = Session::new();
        let schema = schema_object(vec![("name", "string")]);
        let items = vec![object(vec![
            ("name", Item::string("a")),
            ("extra", Item::Integer(1)),
        ])];
        let err = items_to_frame(
            &items,
            schema.as_object().unwrap(),
            &session,
            &SourceLocation::unknown(),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::SchemaMismatch { .. }));
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_missing_column_in_data() {
        let session = Session::new();
        let schema = schema_object(vec![("name", "string"), ("age", "integer")]);
        let items = vec![object(vec![("name", Item::string("a"))])];
        let err = items_to_frame(
            &items,
            schema.as_object().unwrap(),
            &session,
            &SourceLocation::unknown(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn test_type_mismatch_names_column() {
        let session = Session::new();
        let schema = schema_object(vec![("flag", "boolean")]);
        let items = vec![object(vec![("flag", Item::string("yes"))])];
        let err = items_to_frame(
            &items,
            schema.as_object().unwrap(),
            &session,
            &SourceLocation::unknown(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("flag"));
    }
}
