//! OrderBy clause
//!
//! Each ordering specifier is `(expression, direction, empty-order)`; a
//! `stable` flag on the whole clause makes ties preserve input order.
//!
//! **Local algorithm:** drain the child into `(key vector, tuple)` pairs —
//! each key is at most one atomic item, with empty sequences and nulls as
//! placeholders — validate that every column stays within one type family
//! (numerics join over the promotion lattice, the three duration types
//! join to one family), then sort and emit.
//!
//! **Distributed algorithm:** the child's frame carries opaque serialized
//! tuples, so sorting must not deserialize per comparison. Two passes over
//! the cached input: a type-inference pass (a per-row callback reports
//! each key's dynamic type name; a distinct-projection reduces the
//! profiles to one concrete type per column), then a key-materialization
//! pass that decodes each tuple once and appends a struct column with two
//! fields per key — a small check integer placing empty/null per the
//! empty-order setting, and a typed value field (temporal values normalize
//! to a signed long). The backend then sorts on the materialized columns
//! and the original columns are projected back out. The reference
//! backend's sort is stable; a backend without that guarantee needs an
//! input-index tie-break column appended here.

use crate::ast::{OrderSpec, VariableDependencyMap};
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::BuildEnv;
use crate::flwor::frame;
use crate::flwor::tuple::FlworTuple;
use crate::flwor::{BoxedTupleIterator, ClauseInfo, TupleCore, TupleIterator, TupleSource, TupleStep};
use crate::item::coerce::at_most_one;
use crate::item::ordering::{compare_sort_keys, sort_family, SortFamily};
use crate::item::Item;
use soniq_backend::{Cell, ColumnType, Field, Frame, SortKey};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Temp view name for the cached order-by input
const ORDER_INPUT_VIEW: &str = "soniq_order_input";

/// One evaluated ordering key
#[derive(Clone, Debug)]
enum KeySlot {
    Empty,
    Null,
    Value(Item),
}

impl KeySlot {
    /// Check-field code: chosen so an ascending sort places empties per
    /// the column's empty-order setting, nulls between empties and values.
    fn check_code(&self, empty_greatest: bool) -> i32 {
        match self {
            KeySlot::Empty => {
                if empty_greatest {
                    4
                } else {
                    1
                }
            }
            KeySlot::Null => 2,
            KeySlot::Value(_) => 3,
        }
    }
}

pub struct OrderByClauseIterator {
    core: TupleCore,
    child: BoxedTupleIterator,
    specs: Vec<OrderSpec>,
    stable: bool,
    env: Arc<BuildEnv>,
    output: std::vec::IntoIter<FlworTuple>,
}

impl OrderByClauseIterator {
    pub fn new(
        child: BoxedTupleIterator,
        specs: Vec<OrderSpec>,
        stable: bool,
        info: ClauseInfo,
        env: Arc<BuildEnv>,
    ) -> Self {
        Self {
            core: TupleCore::new(info),
            child,
            specs,
            stable,
            env,
            output: Vec::new().into_iter(),
        }
    }
}

/// Evaluate the key vector for one tuple
fn compute_keys(
    specs: &[OrderSpec],
    env: &Arc<BuildEnv>,
    frame_ctx: &Arc<DynamicContext>,
    metadata: &SourceLocation,
) -> Result<Vec<KeySlot>> {
    let mut keys = Vec::with_capacity(specs.len());
    for spec in specs {
        let items = crate::flwor::eval_expr(&spec.expr, env, frame_ctx)?;
        let item = at_most_one(items, "order by key", metadata).map_err(|_| {
            RuntimeError::non_atomic_key(
                "order by keys must evaluate to at most one item",
                metadata.clone(),
            )
        })?;
        let slot = match item {
            None => KeySlot::Empty,
            Some(Item::Null) => KeySlot::Null,
            Some(item) => {
                if !item.is_atomic() {
                    return Err(RuntimeError::non_atomic_key(
                        format!("order by keys must be atomics, found {}", item.type_name()),
                        metadata.clone(),
                    ));
                }
                if item.is_binary() {
                    return Err(RuntimeError::unexpected_type(
                        "binary values cannot be used as ordering keys",
                        metadata.clone(),
                    ));
                }
                KeySlot::Value(item)
            }
        };
        keys.push(slot);
    }
    Ok(keys)
}

/// Check that every column's value keys share one family
fn validate_families(
    rows: &[(Vec<KeySlot>, FlworTuple)],
    column_count: usize,
    metadata: &SourceLocation,
) -> Result<()> {
    for column in 0..column_count {
        let mut seen: Option<SortFamily> = None;
        for (keys, _) in rows {
            let KeySlot::Value(item) = &keys[column] else {
                continue;
            };
            let family = sort_family(item);
            match seen {
                None => seen = Some(family),
                Some(existing) if existing == family => {}
                Some(_) => {
                    return Err(RuntimeError::unexpected_type(
                        "order by keys must contain values of a single type",
                        metadata.clone(),
                    ))
                }
            }
        }
    }
    Ok(())
}

/// Compare two validated key vectors per the specifiers
fn compare_key_vectors(
    a: &[KeySlot],
    b: &[KeySlot],
    specs: &[OrderSpec],
    metadata: &SourceLocation,
) -> Ordering {
    for (column, spec) in specs.iter().enumerate() {
        let ca = a[column].check_code(spec.empty_greatest);
        let cb = b[column].check_code(spec.empty_greatest);
        let mut ord = ca.cmp(&cb);
        if ord == Ordering::Equal {
            if let (KeySlot::Value(va), KeySlot::Value(vb)) = (&a[column], &b[column]) {
                // families were validated before sorting
                ord = compare_sort_keys(va, vb, metadata).unwrap_or(Ordering::Equal);
            }
        }
        if ord != Ordering::Equal {
            return if spec.descending { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

impl TupleStep for OrderByClauseIterator {
    fn core(&self) -> &TupleCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let metadata = self.core.info.metadata.clone();
        let span = tracing::debug_span!(
            "order_by_blocking",
            key_count = self.specs.len(),
            stable = self.stable,
            input_tuples = tracing::field::Empty,
            drain_ms = tracing::field::Empty,
            sort_ms = tracing::field::Empty,
        );
        let _guard = span.enter();

        let mut source = TupleSource::start(
            Some(&mut self.child),
            ctx,
            &self.core.info.child_projection,
            &self.env,
            &metadata,
        )?;

        let specs = self.specs.clone();
        let env = self.env.clone();
        let drain_start = Instant::now();
        let mut rows: Vec<(Vec<KeySlot>, FlworTuple)> = Vec::new();
        let mut failure: Option<RuntimeError> = None;
        loop {
            let tuple = match source.next(Some(&mut self.child)) {
                Ok(Some(tuple)) => tuple,
                Ok(None) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            if let Err(e) = ctx.check_cancelled(&metadata) {
                failure = Some(e);
                break;
            }
            let frame_ctx = crate::flwor::tuple_frame(ctx, &tuple);
            match compute_keys(&specs, &env, &frame_ctx, &metadata) {
                Ok(keys) => rows.push((keys, tuple)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        // close the child as soon as draining ends
        source.finish(Some(&mut self.child));
        if let Some(e) = failure {
            return Err(e);
        }
        span.record("input_tuples", rows.len() as u64);
        span.record(
            "drain_ms",
            (drain_start.elapsed().as_secs_f64() * 1000.0) as u64,
        );

        validate_families(&rows, specs.len(), &metadata)?;

        let sort_start = Instant::now();
        if self.stable {
            rows.sort_by(|(a, _), (b, _)| compare_key_vectors(a, b, &specs, &metadata));
        } else {
            rows.sort_unstable_by(|(a, _), (b, _)| compare_key_vectors(a, b, &specs, &metadata));
        }
        span.record(
            "sort_ms",
            (sort_start.elapsed().as_secs_f64() * 1000.0) as u64,
        );

        let downstream = self.core.info.downstream.clone();
        self.output = rows
            .into_iter()
            .map(|(_, tuple)| tuple.project(&downstream))
            .collect::<Vec<_>>()
            .into_iter();
        Ok(())
    }

    fn step(&mut self) -> Result<Option<FlworTuple>> {
        Ok(self.output.next())
    }

    fn release(&mut self) {
        self.output = Vec::new().into_iter();
        self.child.close();
    }

    fn is_dataframe_capable(&self) -> bool {
        self.child.is_dataframe()
    }

    fn to_dataframe(
        &mut self,
        ctx: &Arc<DynamicContext>,
        projection: &VariableDependencyMap,
    ) -> Result<Frame> {
        let metadata = self.core.info.metadata.clone();
        let child_projection = self.core.info.project_through(projection);
        let df = self.child.dataframe(ctx, &child_projection)?;
        if df.count() == 0 {
            return frame::reproject(df, projection, &self.env, &metadata);
        }

        // cache once: the key pass must not re-read the child
        let df = df.cache();
        let session = ctx.session().clone();
        session.create_or_replace_temp_view(ORDER_INPUT_VIEW, df.clone());
        let child_schema = df.schema().clone();

        // --- type inference pass -------------------------------------------
        let type_fields: Vec<Field> = (0..self.specs.len())
            .map(|i| Field::new(i.to_string(), ColumnType::String))
            .collect();
        let specs = self.specs.clone();
        let env = self.env.clone();
        let udf_ctx = ctx.clone();
        let udf_schema = child_schema.clone();
        let meta = metadata.clone();
        let types_frame = df
            .with_column(
                Field::new("distinct-types", ColumnType::Struct(type_fields)),
                &move |row| {
                    let (frame_ctx, _) = frame::row_context(
                        &udf_ctx,
                        row,
                        &udf_schema,
                        &env.registry,
                        &meta,
                    )
                    .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    let keys = compute_keys(&specs, &env, &frame_ctx, &meta)
                        .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    let cells = keys
                        .iter()
                        .map(|slot| {
                            Cell::String(Arc::from(match slot {
                                KeySlot::Empty => "empty-sequence",
                                KeySlot::Null => "null",
                                KeySlot::Value(item) => item.type_name(),
                            }))
                        })
                        .collect();
                    Ok(Cell::Struct(cells))
                },
            )
            .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))?;

        let profiles = types_frame
            .select(&["distinct-types"])
            .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))?
            .distinct()
            .collect();

        let mut column_types: Vec<Option<OrderColumnType>> = vec![None; self.specs.len()];
        for profile in &profiles {
            let Some(Cell::Struct(cells)) = profile.first() else {
                continue;
            };
            for (column, cell) in cells.iter().enumerate() {
                let Cell::String(name) = cell else { continue };
                column_types[column] =
                    join_column_type(column_types[column], name, &metadata)?;
            }
        }

        // --- key materialization pass --------------------------------------
        let mut key_fields = Vec::with_capacity(self.specs.len() * 2);
        for (column, column_type) in column_types.iter().enumerate() {
            key_fields.push(Field::new(
                format!("{}-nullEmptyCheckField", column),
                ColumnType::Integer,
            ));
            key_fields.push(Field::nullable(
                format!("{}-valueField", column),
                value_column_type(*column_type),
            ));
        }

        let input = session
            .table(ORDER_INPUT_VIEW)
            .unwrap_or_else(|| df.clone());
        let specs = self.specs.clone();
        let env = self.env.clone();
        let udf_ctx = ctx.clone();
        let udf_schema = child_schema.clone();
        let meta = metadata.clone();
        let types_for_udf = column_types.clone();
        let keyed = input
            .with_column(
                Field::new("ordering_columns", ColumnType::Struct(key_fields)),
                &move |row| {
                    let (frame_ctx, _) = frame::row_context(
                        &udf_ctx,
                        row,
                        &udf_schema,
                        &env.registry,
                        &meta,
                    )
                    .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    let keys = compute_keys(&specs, &env, &frame_ctx, &meta)
                        .map_err(|e| Box::new(e) as soniq_backend::UdfError)?;
                    let mut cells = Vec::with_capacity(keys.len() * 2);
                    for (column, slot) in keys.iter().enumerate() {
                        cells.push(Cell::Integer(slot.check_code(specs[column].empty_greatest)));
                        cells.push(match slot {
                            KeySlot::Empty | KeySlot::Null => Cell::Null,
                            KeySlot::Value(item) => {
                                typed_value_cell(item, types_for_udf[column], &meta)
                                    .map_err(|e| Box::new(e) as soniq_backend::UdfError)?
                            }
                        });
                    }
                    Ok(Cell::Struct(cells))
                },
            )
            .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))?;

        // --- sort and projection -------------------------------------------
        let mut sort_keys = Vec::with_capacity(self.specs.len() * 2);
        for (column, spec) in self.specs.iter().enumerate() {
            let direction = |key: SortKey| {
                if spec.descending {
                    SortKey { descending: true, ..key }
                } else {
                    key
                }
            };
            sort_keys.push(direction(
                SortKey::asc("ordering_columns").field(format!("{}-nullEmptyCheckField", column)),
            ));
            sort_keys.push(direction(
                SortKey::asc("ordering_columns").field(format!("{}-valueField", column)),
            ));
        }
        let sorted = keyed
            .order_by(&sort_keys)
            .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))?;

        let original: Vec<&str> = child_schema.names();
        let result = sorted
            .select(&original)
            .map_err(|e| RuntimeError::from_backend(e, metadata.clone()))?;
        session.drop_temp_view(ORDER_INPUT_VIEW);

        frame::reproject(result, projection, &self.env, &metadata)
    }
}

/// Concrete type of an ordering column after the lattice joins
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OrderColumnType {
    Boolean,
    String,
    Integer,
    Decimal,
    Double,
    DateTime,
    Date,
    Time,
    YearMonthDuration,
    DayTimeDuration,
    Duration,
}

impl OrderColumnType {
    fn from_type_name(name: &str) -> Option<OrderColumnType> {
        Some(match name {
            "boolean" => OrderColumnType::Boolean,
            "string" => OrderColumnType::String,
            "integer" => OrderColumnType::Integer,
            "decimal" => OrderColumnType::Decimal,
            "double" => OrderColumnType::Double,
            "dateTime" => OrderColumnType::DateTime,
            "date" => OrderColumnType::Date,
            "time" => OrderColumnType::Time,
            "yearMonthDuration" => OrderColumnType::YearMonthDuration,
            "dayTimeDuration" => OrderColumnType::DayTimeDuration,
            "duration" => OrderColumnType::Duration,
            _ => return None,
        })
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            OrderColumnType::Integer | OrderColumnType::Decimal | OrderColumnType::Double
        )
    }

    fn is_duration(self) -> bool {
        matches!(
            self,
            OrderColumnType::YearMonthDuration
                | OrderColumnType::DayTimeDuration
                | OrderColumnType::Duration
        )
    }
}

/// Fold one observed type name into a column's running type.
///
/// The placeholders `empty-sequence` and `null` do not contribute;
/// numerics join over the promotion lattice; the three duration types join
/// to `duration`; any other mix is an error.
fn join_column_type(
    current: Option<OrderColumnType>,
    name: &str,
    metadata: &SourceLocation,
) -> Result<Option<OrderColumnType>> {
    if name == "empty-sequence" || name == "null" {
        return Ok(current);
    }
    let observed = OrderColumnType::from_type_name(name).ok_or_else(|| {
        RuntimeError::unexpected_type(
            format!("values of type {} cannot be ordering keys", name),
            metadata.clone(),
        )
    })?;
    let Some(current) = current else {
        return Ok(Some(observed));
    };
    if current == observed {
        return Ok(Some(current));
    }
    if current.is_numeric() && observed.is_numeric() {
        // join over integer ≤ decimal ≤ double
        let joined = if current == OrderColumnType::Double || observed == OrderColumnType::Double {
            OrderColumnType::Double
        } else {
            OrderColumnType::Decimal
        };
        return Ok(Some(joined));
    }
    if current.is_duration() && observed.is_duration() {
        return Ok(Some(OrderColumnType::Duration));
    }
    Err(RuntimeError::unexpected_type(
        "order by keys must contain values of a single type",
        metadata.clone(),
    ))
}

/// Backend column type of the value field for a joined column type.
///
/// Temporal and duration values normalize to signed longs; a column that
/// only ever saw placeholders gets a long field that stays null.
fn value_column_type(column_type: Option<OrderColumnType>) -> ColumnType {
    match column_type {
        Some(OrderColumnType::Boolean) => ColumnType::Boolean,
        Some(OrderColumnType::String) => ColumnType::String,
        Some(OrderColumnType::Integer) => ColumnType::Long,
        Some(OrderColumnType::Decimal) => ColumnType::Decimal,
        Some(OrderColumnType::Double) => ColumnType::Double,
        Some(
            OrderColumnType::DateTime
            | OrderColumnType::Date
            | OrderColumnType::Time
            | OrderColumnType::YearMonthDuration
            | OrderColumnType::DayTimeDuration
            | OrderColumnType::Duration,
        )
        | None => ColumnType::Long,
    }
}

/// The typed value cell for one key item
fn typed_value_cell(
    item: &Item,
    column_type: Option<OrderColumnType>,
    metadata: &SourceLocation,
) -> Result<Cell> {
    let Some(column_type) = column_type else {
        return Err(RuntimeError::iterator_flow(
            "ordering value appeared in a column the type pass saw as empty",
            metadata.clone(),
        ));
    };
    let mismatch = || {
        RuntimeError::unexpected_type(
            format!(
                "ordering key of type {} does not fit the inferred column type",
                item.type_name()
            ),
            metadata.clone(),
        )
    };
    Ok(match column_type {
        OrderColumnType::Boolean => Cell::Boolean(item.as_bool().ok_or_else(mismatch)?),
        OrderColumnType::String => match item {
            Item::String(s) => Cell::String(Arc::from(s.as_ref())),
            _ => return Err(mismatch()),
        },
        OrderColumnType::Integer => Cell::Long(item.as_integer().ok_or_else(mismatch)?),
        OrderColumnType::Decimal => Cell::Decimal(item.numeric_as_decimal().ok_or_else(mismatch)?),
        OrderColumnType::Double => Cell::Double(item.numeric_as_f64().ok_or_else(mismatch)?),
        OrderColumnType::DateTime => match item {
            Item::DateTime(v) => Cell::Long(v.epoch_millis()),
            _ => return Err(mismatch()),
        },
        OrderColumnType::Date => match item {
            Item::Date(v) => Cell::Long(v.epoch_millis()),
            _ => return Err(mismatch()),
        },
        OrderColumnType::Time => match item {
            Item::Time(v) => Cell::Long(v.millis_of_day()),
            _ => return Err(mismatch()),
        },
        OrderColumnType::YearMonthDuration => match item {
            Item::YearMonthDuration(v) => Cell::Long(v.months()),
            _ => return Err(mismatch()),
        },
        OrderColumnType::DayTimeDuration => match item {
            Item::DayTimeDuration(v) => Cell::Long(v.millis()),
            _ => return Err(mismatch()),
        },
        OrderColumnType::Duration => match item {
            Item::YearMonthDuration(v) => Cell::Long(v.normalized_millis()),
            Item::DayTimeDuration(v) => Cell::Long(v.normalized_millis()),
            Item::Duration(v) => Cell::Long(v.normalized_millis()),
            _ => return Err(mismatch()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_codes_place_empties() {
        assert_eq!(KeySlot::Empty.check_code(false), 1);
        assert_eq!(KeySlot::Null.check_code(false), 2);
        assert_eq!(KeySlot::Value(Item::Integer(1)).check_code(false), 3);
        assert_eq!(KeySlot::Empty.check_code(true), 4);
    }

    #[test]
    fn test_type_lattice_joins() {
        let loc = SourceLocation::unknown();
        let t = join_column_type(None, "integer", &loc).unwrap();
        let t = join_column_type(t, "double", &loc).unwrap();
        assert_eq!(t, Some(OrderColumnType::Double));

        let d = join_column_type(None, "yearMonthDuration", &loc).unwrap();
        let d = join_column_type(d, "dayTimeDuration", &loc).unwrap();
        assert_eq!(d, Some(OrderColumnType::Duration));

        // placeholders do not contribute
        let p = join_column_type(None, "empty-sequence", &loc).unwrap();
        assert_eq!(p, None);
        let p = join_column_type(Some(OrderColumnType::String), "null", &loc).unwrap();
        assert_eq!(p, Some(OrderColumnType::String));

        assert!(join_column_type(Some(OrderColumnType::String), "integer", &loc).is_err());
    }

    #[test]
    fn test_integer_decimal_join() {
        let loc = SourceLocation::unknown();
        let t = join_column_type(None, "integer", &loc).unwrap();
        let t = join_column_type(t, "decimal", &loc).unwrap();
        assert_eq!(t, Some(OrderColumnType::Decimal));
    }
}
