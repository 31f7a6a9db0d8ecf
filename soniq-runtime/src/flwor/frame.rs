//! Tuple ⇄ frame plumbing for distributed FLWOR execution
//!
//! A pipeline frame carries one opaque binary column holding the
//! serialized tuple, plus one long column per count-projected variable
//! (named `<var>.count`). Projection decides the layout: variables with a
//! `Full` dependency ride inside the binary column, `Count` dependencies
//! become dedicated columns and never materialize their sequences.

use crate::ast::{VariableDependency, VariableDependencyMap};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::flwor::tuple::{FlworTuple, TupleField};
use crate::functions::registry::FunctionRegistry;
use soniq_backend::{Cell, ColumnType, Field, Frame, Row, Schema};
use std::sync::Arc;

/// The serialized-tuple column
pub(crate) const TUPLE_COLUMN: &str = "tuple";

/// Column name carrying a variable's pre-computed count
pub(crate) fn count_column(var: &str) -> String {
    format!("{}.count", var)
}

/// Inverse of [`count_column`]
pub(crate) fn count_column_var(column: &str) -> Option<&str> {
    column.strip_suffix(".count")
}

/// The frame schema implied by a projection
pub(crate) fn schema_for(
    projection: &VariableDependencyMap,
    metadata: &SourceLocation,
) -> Result<Schema> {
    let mut fields = vec![Field::new(TUPLE_COLUMN, ColumnType::Binary)];
    for (var, dep) in projection {
        if *dep == VariableDependency::Count {
            fields.push(Field::new(count_column(var), ColumnType::Long));
        }
    }
    Schema::new(fields).map_err(|e| RuntimeError::from_backend(e, metadata.clone()))
}

/// Encode a tuple as a row of `schema`.
///
/// The tuple must already be projected: its `Count` fields match the count
/// columns, everything else lands in the binary column.
pub(crate) fn encode_row(
    tuple: &FlworTuple,
    schema: &Schema,
    metadata: &SourceLocation,
) -> Result<Row> {
    let mut row = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        if field.name == TUPLE_COLUMN {
            let bytes = tuple.to_bytes(metadata)?;
            row.push(Cell::Binary(Arc::from(bytes.into_boxed_slice())));
        } else if let Some(var) = count_column_var(&field.name) {
            let count = match tuple.get(var) {
                Some(TupleField::Count(n)) => *n,
                Some(TupleField::Sequence(items)) => items.len() as i64,
                None => 0,
            };
            row.push(Cell::Long(count));
        } else {
            return Err(RuntimeError::schema_mismatch(
                format!("unexpected pipeline column {}", field.name),
                metadata.clone(),
            ));
        }
    }
    Ok(row)
}

/// Decode one frame row back into a tuple
pub(crate) fn decode_row(
    row: &Row,
    schema: &Schema,
    registry: &FunctionRegistry,
    metadata: &SourceLocation,
) -> Result<FlworTuple> {
    let mut tuple = FlworTuple::new();
    for (cell, field) in row.iter().zip(schema.fields()) {
        if field.name == TUPLE_COLUMN {
            let Cell::Binary(bytes) = cell else {
                return Err(RuntimeError::schema_mismatch(
                    "tuple column is not binary",
                    metadata.clone(),
                ));
            };
            let decoded = FlworTuple::from_bytes(bytes, registry, metadata)?;
            for (name, value) in decoded.iter() {
                tuple.bind(name.clone(), value.clone());
            }
        } else if let Some(var) = count_column_var(&field.name) {
            let Cell::Long(count) = cell else {
                return Err(RuntimeError::schema_mismatch(
                    format!("count column {} is not long", field.name),
                    metadata.clone(),
                ));
            };
            tuple.bind(Arc::from(var), TupleField::Count(*count));
        }
    }
    Ok(tuple)
}

/// Drain a whole frame into local tuples, in partition order
pub(crate) fn decode_frame(
    frame: &Frame,
    registry: &FunctionRegistry,
    metadata: &SourceLocation,
) -> Result<Vec<FlworTuple>> {
    let schema = frame.schema().clone();
    frame
        .collect()
        .iter()
        .map(|row| decode_row(row, &schema, registry, metadata))
        .collect()
}

/// Narrow a frame to the layout a projection implies, re-encoding the
/// binary tuple column when variables were dropped or downgraded.
pub(crate) fn reproject(
    df: Frame,
    projection: &VariableDependencyMap,
    env: &Arc<crate::expr::BuildEnv>,
    metadata: &SourceLocation,
) -> Result<Frame> {
    let schema = schema_for(projection, metadata)?;
    if *df.schema() == schema {
        return Ok(df);
    }
    let child_schema = df.schema().clone();
    let env = env.clone();
    let meta = metadata.clone();
    let projection = projection.clone();
    let out_schema = schema.clone();
    df.flat_map_rows(schema, &move |row| {
        let tuple = decode_row(row, &child_schema, &env.registry, &meta)
            .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
        let row = encode_row(&tuple.project(&projection), &out_schema, &meta)
            .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
        Ok(vec![row])
    })
    .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))
}

/// A dynamic frame for evaluating clause expressions against a decoded row
pub(crate) fn row_context(
    ctx: &Arc<DynamicContext>,
    row: &Row,
    schema: &Schema,
    registry: &FunctionRegistry,
    metadata: &SourceLocation,
) -> Result<(Arc<DynamicContext>, FlworTuple)> {
    let tuple = decode_row(row, schema, registry, metadata)?;
    let mut frame = DynamicContext::child(ctx);
    frame.bind_tuple(&tuple);
    Ok((frame.into_arc(), tuple))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use soniq_backend::Rdd;

    #[test]
    fn test_schema_layout() {
        let mut projection = VariableDependencyMap::new();
        projection.insert(Arc::from("x"), VariableDependency::Full);
        projection.insert(Arc::from("y"), VariableDependency::Count);

        let schema = schema_for(&projection, &SourceLocation::unknown()).unwrap();
        assert_eq!(schema.names(), vec![TUPLE_COLUMN, "y.count"]);
    }

    #[test]
    fn test_row_round_trip() {
        let registry = FunctionRegistry::new();
        let loc = SourceLocation::unknown();

        let mut projection = VariableDependencyMap::new();
        projection.insert(Arc::from("x"), VariableDependency::Full);
        projection.insert(Arc::from("n"), VariableDependency::Count);
        let schema = schema_for(&projection, &loc).unwrap();

        let mut tuple = FlworTuple::new();
        tuple.bind_sequence(Arc::from("x"), vec![Item::Integer(5), Item::string("s")]);
        tuple.bind(Arc::from("n"), TupleField::Count(42));

        let row = encode_row(&tuple.project(&projection), &schema, &loc).unwrap();
        // frame construction validates the row shape
        let frame = Frame::new(schema.clone(), Rdd::single_partition(vec![row.clone()])).unwrap();
        assert_eq!(frame.count(), 1);

        let back = decode_row(&row, &schema, &registry, &loc).unwrap();
        match back.get("x").unwrap() {
            TupleField::Sequence(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected field {:?}", other),
        }
        assert!(matches!(back.get("n"), Some(TupleField::Count(42))));
    }
}
