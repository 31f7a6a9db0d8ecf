//! FLWOR tuples and their wire encoding
//!
//! A tuple maps variable names to materialized sequences (or pre-computed
//! counts, when projection reduced a binding to its cardinality). Tuples
//! flow through the clause pipeline in emission order except where
//! GroupBy/OrderBy reorders them.
//!
//! In distributed mode a tuple rides in a frame row as one opaque binary
//! field: a JSON encoding of its sequence fields. Function items inside a
//! tuple serialize as identifier plus closure snapshot; the receiver
//! reconstitutes them through the function registry, so anonymous function
//! items cannot cross a partition boundary.

use crate::error::{Result, RuntimeError, SourceLocation};
use crate::functions::registry::FunctionRegistry;
use crate::functions::FunctionItem;
use crate::item::{json, Item};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ast::{VariableDependency, VariableDependencyMap};

/// One tuple field
#[derive(Clone, Debug)]
pub enum TupleField {
    /// Materialized sequence
    Sequence(Arc<Vec<Item>>),
    /// Cardinality only, from count projection
    Count(i64),
}

/// A FLWOR tuple: ordered variable-to-sequence mapping
#[derive(Clone, Debug, Default)]
pub struct FlworTuple {
    fields: Vec<(Arc<str>, TupleField)>,
}

impl FlworTuple {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable, replacing any existing binding of the same name
    pub fn bind(&mut self, name: Arc<str>, field: TupleField) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = field;
        } else {
            self.fields.push((name, field));
        }
    }

    pub fn bind_sequence(&mut self, name: Arc<str>, items: Vec<Item>) {
        self.bind(name, TupleField::Sequence(Arc::new(items)));
    }

    /// A copy of this tuple with one more binding
    pub fn extended(&self, name: Arc<str>, field: TupleField) -> FlworTuple {
        let mut next = self.clone();
        next.bind(name, field);
        next
    }

    pub fn get(&self, name: &str) -> Option<&TupleField> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, f)| f)
    }

    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.fields.iter().map(|(n, _)| n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &TupleField)> {
        self.fields.iter().map(|(n, f)| (n, f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Restrict to the projected variables, downgrading `Count`-projected
    /// sequences to their cardinality.
    pub fn project(&self, projection: &VariableDependencyMap) -> FlworTuple {
        let mut out = FlworTuple::new();
        for (name, field) in &self.fields {
            match projection.get(name) {
                Some(VariableDependency::Full) => out.bind(name.clone(), field.clone()),
                Some(VariableDependency::Count) => {
                    let count = match field {
                        TupleField::Sequence(items) => items.len() as i64,
                        TupleField::Count(n) => *n,
                    };
                    out.bind(name.clone(), TupleField::Count(count));
                }
                None => {}
            }
        }
        out
    }

    // === wire encoding ===

    /// Serialize the sequence fields to bytes.
    ///
    /// Count fields are excluded: they travel as dedicated long columns
    /// alongside the binary tuple column.
    pub fn to_bytes(&self, location: &SourceLocation) -> Result<Vec<u8>> {
        let mut map = Map::with_capacity(self.fields.len());
        for (name, field) in &self.fields {
            if let TupleField::Sequence(items) = field {
                let mut encoded = Vec::with_capacity(items.len());
                for item in items.iter() {
                    encoded.push(wire_encode(item, location)?);
                }
                map.insert(name.to_string(), Value::Array(encoded));
            }
        }
        serde_json::to_vec(&Value::Object(map)).map_err(|e| {
            RuntimeError::dynamic(format!("tuple encoding failed: {}", e), location.clone())
        })
    }

    /// Deserialize a tuple's sequence fields from bytes
    pub fn from_bytes(
        bytes: &[u8],
        registry: &FunctionRegistry,
        location: &SourceLocation,
    ) -> Result<FlworTuple> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| {
            RuntimeError::dynamic(format!("malformed tuple encoding: {}", e), location.clone())
        })?;
        let Value::Object(map) = value else {
            return Err(RuntimeError::dynamic(
                "malformed tuple encoding: expected an object",
                location.clone(),
            ));
        };
        let mut tuple = FlworTuple::new();
        for (name, field) in map {
            let Value::Array(members) = field else {
                return Err(RuntimeError::dynamic(
                    format!("malformed tuple field {}", name),
                    location.clone(),
                ));
            };
            let mut items = Vec::with_capacity(members.len());
            for member in &members {
                items.push(wire_decode(member, registry, location)?);
            }
            tuple.bind_sequence(Arc::from(name.as_str()), items);
        }
        Ok(tuple)
    }
}

const TAG_FUNCTION: &str = "$function";

/// Encode one item for the tuple wire, including function items
fn wire_encode(item: &Item, location: &SourceLocation) -> Result<Value> {
    match item {
        Item::Function(func) => {
            let Some(identifier) = &func.identifier else {
                return Err(RuntimeError::invalid_argument(
                    "anonymous function items cannot cross a partition boundary",
                    location.clone(),
                ));
            };
            let mut closure = Map::with_capacity(func.closure.len());
            for (name, items) in &func.closure {
                let mut encoded = Vec::with_capacity(items.len());
                for i in items.iter() {
                    encoded.push(wire_encode(i, location)?);
                }
                closure.insert(name.to_string(), Value::Array(encoded));
            }
            let mut body = Map::with_capacity(3);
            body.insert("name".to_string(), Value::String(identifier.name.to_string()));
            body.insert("arity".to_string(), Value::from(identifier.arity as u64));
            body.insert("closure".to_string(), Value::Object(closure));
            let mut out = Map::with_capacity(1);
            out.insert(TAG_FUNCTION.to_string(), Value::Object(body));
            Ok(Value::Object(out))
        }
        Item::Array(members) => {
            let mut out = Vec::with_capacity(members.len());
            for m in members.iter() {
                out.push(wire_encode(m, location)?);
            }
            Ok(Value::Array(out))
        }
        Item::Object(object) => {
            let mut map = Map::with_capacity(object.len());
            for (key, value) in object.iter() {
                map.insert(json::escape_key(key), wire_encode(value, location)?);
            }
            Ok(Value::Object(map))
        }
        atomic => json::item_to_json(atomic),
    }
}

/// Decode one item from the tuple wire
fn wire_decode(
    value: &Value,
    registry: &FunctionRegistry,
    location: &SourceLocation,
) -> Result<Item> {
    match value {
        Value::Array(members) => {
            let mut out = Vec::with_capacity(members.len());
            for m in members {
                out.push(wire_decode(m, registry, location)?);
            }
            Ok(Item::array(out))
        }
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::Object(body)) = map.get(TAG_FUNCTION) {
                    return decode_function(body, registry, location);
                }
                if let Some(item) = json::decode_tag(map)? {
                    return Ok(item);
                }
            }
            let mut pairs = Vec::with_capacity(map.len());
            for (key, v) in map {
                pairs.push((json::unescape_key(key), wire_decode(v, registry, location)?));
            }
            Item::object(pairs, location)
        }
        other => json::item_from_json(other),
    }
}

fn decode_function(
    body: &Map<String, Value>,
    registry: &FunctionRegistry,
    location: &SourceLocation,
) -> Result<Item> {
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed_function(location))?;
    let arity = body
        .get("arity")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed_function(location))? as usize;

    let identifier = crate::functions::FunctionIdentifier::new(name, arity);
    let declaration = registry.resolve_user(&identifier).ok_or_else(|| {
        RuntimeError::FunctionNotFound {
            name: name.to_string(),
            arity,
            location: location.clone(),
        }
    })?;

    let mut closure = Vec::new();
    if let Some(Value::Object(vars)) = body.get("closure") {
        for (var, field) in vars {
            let Value::Array(members) = field else {
                return Err(malformed_function(location));
            };
            let mut items = Vec::with_capacity(members.len());
            for m in members {
                items.push(wire_decode(m, registry, location)?);
            }
            closure.push((Arc::from(var.as_str()), Arc::new(items)));
        }
    }

    Ok(Item::Function(Arc::new(FunctionItem {
        identifier: Some(identifier),
        params: declaration.params.clone(),
        body: declaration.body.clone(),
        closure,
    })))
}

fn malformed_function(location: &SourceLocation) -> RuntimeError {
    RuntimeError::dynamic("malformed function item encoding", location.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, ExprNode};
    use crate::functions::UserFunction;

    #[test]
    fn test_bind_replaces() {
        let mut tuple = FlworTuple::new();
        tuple.bind_sequence(Arc::from("x"), vec![Item::Integer(1)]);
        tuple.bind_sequence(Arc::from("x"), vec![Item::Integer(2)]);
        assert_eq!(tuple.len(), 1);
        match tuple.get("x").unwrap() {
            TupleField::Sequence(items) => assert_eq!(items[0], Item::Integer(2)),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_project_downgrades_to_count() {
        let mut tuple = FlworTuple::new();
        tuple.bind_sequence(Arc::from("x"), vec![Item::Integer(1), Item::Integer(2)]);
        tuple.bind_sequence(Arc::from("y"), vec![Item::Integer(3)]);

        let mut projection = VariableDependencyMap::new();
        projection.insert(Arc::from("x"), VariableDependency::Count);

        let projected = tuple.project(&projection);
        assert_eq!(projected.len(), 1);
        assert!(matches!(projected.get("x"), Some(TupleField::Count(2))));
        assert!(projected.get("y").is_none());
    }

    #[test]
    fn test_wire_round_trip() {
        let registry = FunctionRegistry::new();
        let loc = SourceLocation::unknown();

        let mut tuple = FlworTuple::new();
        tuple.bind_sequence(
            Arc::from("x"),
            vec![Item::Integer(1), Item::string("a"), Item::Null],
        );
        tuple.bind_sequence(Arc::from("y"), vec![Item::Double(0.5)]);

        let bytes = tuple.to_bytes(&loc).unwrap();
        let back = FlworTuple::from_bytes(&bytes, &registry, &loc).unwrap();

        match back.get("x").unwrap() {
            TupleField::Sequence(items) => {
                assert_eq!(items.as_ref(), &vec![Item::Integer(1), Item::string("a"), Item::Null])
            }
            other => panic!("unexpected field {:?}", other),
        }
        match back.get("y").unwrap() {
            TupleField::Sequence(items) => assert_eq!(items[0], Item::Double(0.5)),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_function_items_round_trip_by_identifier() {
        let mut registry = FunctionRegistry::new();
        let body = ExprNode::arc(ExprKind::NullLiteral, SourceLocation::unknown());
        let declared = UserFunction {
            identifier: crate::functions::FunctionIdentifier::new("local:f", 1),
            params: vec![Arc::from("p")],
            body: body.clone(),
        };
        registry.declare(declared.clone()).unwrap();

        let item = Item::Function(Arc::new(FunctionItem {
            identifier: Some(declared.identifier.clone()),
            params: declared.params.clone(),
            body,
            closure: vec![(Arc::from("c"), Arc::new(vec![Item::Integer(9)]))],
        }));

        let mut tuple = FlworTuple::new();
        tuple.bind_sequence(Arc::from("f"), vec![item]);

        let loc = SourceLocation::unknown();
        let bytes = tuple.to_bytes(&loc).unwrap();
        let back = FlworTuple::from_bytes(&bytes, &registry, &loc).unwrap();

        match back.get("f").unwrap() {
            TupleField::Sequence(items) => {
                let func = items[0].as_function().unwrap();
                assert_eq!(func.identifier.as_ref().unwrap().arity, 1);
                assert_eq!(func.closure[0].1[0], Item::Integer(9));
            }
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_anonymous_function_rejected_on_wire() {
        let item = Item::Function(Arc::new(FunctionItem {
            identifier: None,
            params: vec![],
            body: ExprNode::arc(ExprKind::NullLiteral, SourceLocation::unknown()),
            closure: vec![],
        }));
        let mut tuple = FlworTuple::new();
        tuple.bind_sequence(Arc::from("f"), vec![item]);
        assert!(matches!(
            tuple.to_bytes(&SourceLocation::unknown()),
            Err(RuntimeError::InvalidArgument { .. })
        ));
    }
}
