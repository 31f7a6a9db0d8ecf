//! GroupBy clause
//!
//! Partitions the tuple stream by the tuple of group-key values. Keys are
//! single atomic items (or empty); equality follows the item rules with
//! numeric promotion, null groups with null, and mixing key types across
//! tuples is an error. Each group emits one tuple: key variables bound to
//! their key item, every other variable bound to the concatenation of its
//! per-tuple sequences in input order.
//!
//! A blocking clause: it drains its child before emitting, and runs
//! locally (a distributed child is drained through its frame).
//!
//! ```text
//! Input:                      group by $g := $x mod 2:
//!   $x=1  $g would be 1         $g=1  $x=(1,3)
//!   $x=2  $g would be 0         $g=0  $x=(2)
//!   $x=3  $g would be 1
//! ```

use crate::ast::GroupKey;
use crate::context::DynamicContext;
use crate::error::{Result, RuntimeError, SourceLocation};
use crate::expr::BuildEnv;
use crate::flwor::tuple::{FlworTuple, TupleField};
use crate::flwor::{BoxedTupleIterator, ClauseInfo, TupleCore, TupleIterator, TupleSource, TupleStep};
use crate::item::coerce::at_most_one;
use crate::item::ordering::{equals, hash_item, sort_family, SortFamily};
use crate::item::Item;
use rustc_hash::FxHashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

pub struct GroupByClauseIterator {
    core: TupleCore,
    child: BoxedTupleIterator,
    keys: Vec<GroupKey>,
    env: Arc<BuildEnv>,
    output: std::vec::IntoIter<FlworTuple>,
}

impl GroupByClauseIterator {
    pub fn new(
        child: BoxedTupleIterator,
        keys: Vec<GroupKey>,
        info: ClauseInfo,
        env: Arc<BuildEnv>,
    ) -> Self {
        Self {
            core: TupleCore::new(info),
            child,
            keys,
            env,
            output: Vec::new().into_iter(),
        }
    }

}

/// Evaluate the key vector for one input tuple
fn compute_key_vector(
    keys: &[GroupKey],
    env: &Arc<BuildEnv>,
    tuple: &FlworTuple,
    frame_ctx: &Arc<DynamicContext>,
    metadata: &SourceLocation,
) -> Result<Vec<Option<Item>>> {
    let mut vector = Vec::with_capacity(keys.len());
    for key in keys {
        let items = match &key.expr {
            Some(expr) => crate::flwor::eval_expr(expr, env, frame_ctx)?,
            None => match tuple.get(&key.var) {
                Some(TupleField::Sequence(items)) => items.as_ref().clone(),
                Some(TupleField::Count(_)) => {
                    return Err(RuntimeError::iterator_flow(
                        format!("grouping variable ${} was count-projected", key.var),
                        metadata.clone(),
                    ))
                }
                None => Vec::new(),
            },
        };
        let item = at_most_one(items, "group by key", metadata)?;
        if let Some(item) = &item {
            if !item.is_atomic() {
                return Err(RuntimeError::non_atomic_key(
                    format!("group by keys must be atomics, found {}", item.type_name()),
                    metadata.clone(),
                ));
            }
            if item.is_binary() {
                return Err(RuntimeError::unexpected_type(
                    "binary values cannot be used as grouping keys",
                    metadata.clone(),
                ));
            }
        }
        vector.push(item);
    }
    Ok(vector)
}

/// Grouping-key family; distinct duration types stay distinct here
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum KeyFamily {
    Boolean,
    Numeric,
    String,
    DateTime,
    Date,
    Time,
    YearMonthDuration,
    DayTimeDuration,
    Duration,
}

fn key_family(item: &Item) -> Option<KeyFamily> {
    Some(match sort_family(item) {
        SortFamily::Null => return None, // null groups with anything
        SortFamily::Boolean => KeyFamily::Boolean,
        SortFamily::Numeric => KeyFamily::Numeric,
        SortFamily::String => KeyFamily::String,
        SortFamily::DateTime => KeyFamily::DateTime,
        SortFamily::Date => KeyFamily::Date,
        SortFamily::Time => KeyFamily::Time,
        SortFamily::Duration => match item {
            Item::YearMonthDuration(_) => KeyFamily::YearMonthDuration,
            Item::DayTimeDuration(_) => KeyFamily::DayTimeDuration,
            _ => KeyFamily::Duration,
        },
        SortFamily::Binary | SortFamily::NonAtomic => return None, // rejected earlier
    })
}

/// Hashable wrapper over a key vector, consistent with item equality
#[derive(Clone, Debug)]
struct GroupingKey(Vec<Option<Item>>);

impl PartialEq for GroupingKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| match (a, b) {
                (None, None) => true,
                (Some(x), Some(y)) => equals(x, y) == Some(true),
                _ => false,
            })
    }
}

impl Eq for GroupingKey {}

impl Hash for GroupingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for slot in &self.0 {
            match slot {
                None => state.write_u8(0xff),
                Some(item) => hash_item(item, state),
            }
        }
    }
}

impl TupleStep for GroupByClauseIterator {
    fn core(&self) -> &TupleCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    fn init(&mut self, ctx: &Arc<DynamicContext>) -> Result<()> {
        let metadata = self.core.info.metadata.clone();
        let span = tracing::debug_span!(
            "group_by_blocking",
            key_count = self.keys.len(),
            input_tuples = tracing::field::Empty,
            groups = tracing::field::Empty,
            drain_ms = tracing::field::Empty,
        );
        let _guard = span.enter();
        let drain_start = Instant::now();

        let mut source = TupleSource::start(
            Some(&mut self.child),
            ctx,
            &self.core.info.child_projection,
            &self.env,
            &metadata,
        )?;

        // first-seen group order keeps emission deterministic
        let mut order: Vec<GroupingKey> = Vec::new();
        let mut groups: FxHashMap<GroupingKey, Vec<FlworTuple>> = FxHashMap::default();
        let mut families: Vec<Option<KeyFamily>> = vec![None; self.keys.len()];
        let mut input_tuples: u64 = 0;

        let keys = self.keys.clone();
        let env = self.env.clone();
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
            input_tuples += 1;
            let frame_ctx = crate::flwor::tuple_frame(ctx, &tuple);
            let vector = match compute_key_vector(&keys, &env, &tuple, &frame_ctx, &metadata) {
                Ok(vector) => vector,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            for (column, slot) in vector.iter().enumerate() {
                let Some(item) = slot else { continue };
                let Some(family) = key_family(item) else { continue };
                match families[column] {
                    None => families[column] = Some(family),
                    Some(existing) if existing == family => {}
                    Some(_) => {
                        failure = Some(RuntimeError::unexpected_type(
                            "group by keys must contain values of a single type",
                            metadata.clone(),
                        ));
                    }
                }
            }
            if failure.is_some() {
                break;
            }

            let key = GroupingKey(vector);
            match groups.get_mut(&key) {
                Some(members) => members.push(tuple),
                None => {
                    order.push(key.clone());
                    groups.insert(key, vec![tuple]);
                }
            }
        }
        source.finish(Some(&mut self.child));
        if let Some(e) = failure {
            return Err(e);
        }

        span.record("input_tuples", input_tuples);
        span.record("groups", order.len() as u64);
        span.record(
            "drain_ms",
            (drain_start.elapsed().as_secs_f64() * 1000.0) as u64,
        );

        let mut output = Vec::with_capacity(order.len());
        for key in order {
            let members = groups.remove(&key).unwrap_or_default();
            output.push(self.emit_group(&key.0, members)?);
        }
        self.output = output.into_iter();
        Ok(())
    }

    fn step(&mut self) -> Result<Option<FlworTuple>> {
        Ok(self.output.next())
    }

    fn release(&mut self) {
        self.output = Vec::new().into_iter();
        self.child.close();
    }
}

impl GroupByClauseIterator {
    /// Build the single output tuple for one group
    fn emit_group(&self, key: &[Option<Item>], members: Vec<FlworTuple>) -> Result<FlworTuple> {
        let mut out = FlworTuple::new();

        // key variables bind to their (single) key item
        for (group_key, slot) in self.keys.iter().zip(key.iter()) {
            let items = match slot {
                Some(item) => vec![item.clone()],
                None => Vec::new(),
            };
            out.bind_sequence(group_key.var.clone(), items);
        }

        // every other variable binds to the concatenation of its per-tuple
        // sequences, in input order
        let key_vars: Vec<&Arc<str>> = self.keys.iter().map(|k| &k.var).collect();
        let mut names: Vec<Arc<str>> = Vec::new();
        for member in &members {
            for name in member.names() {
                if !key_vars.iter().any(|k| *k == name) && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        // a variable's fields are uniform across tuples (projection is
        // static): either sequences, which concatenate, or counts, which sum
        for name in names {
            let mut concatenated: Vec<Item> = Vec::new();
            let mut count_total: i64 = 0;
            let mut counts_only = true;
            for member in &members {
                match member.get(&name) {
                    Some(TupleField::Sequence(items)) => {
                        counts_only = false;
                        concatenated.extend(items.iter().cloned());
                    }
                    Some(TupleField::Count(n)) => count_total += n,
                    None => {}
                }
            }
            if counts_only {
                out.bind(name, TupleField::Count(count_total));
            } else {
                out.bind_sequence(name, concatenated);
            }
        }

        Ok(out.project(&self.core.info.downstream))
    }
}
