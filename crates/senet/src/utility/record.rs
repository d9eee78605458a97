//! # Burn Record Utilities
//!
//! Inspect the tensor layout of a module record, without the tensor bytes.
//! Useful for checking a converted checkpoint against a model structure.

use anyhow::bail;
use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::{Backend, Tensor};
use burn::record::{HalfPrecisionSettings, Record};
use serde_json::{Map, Value};

/// Summarize a record as a JSON tree.
///
/// Numeric arrays are replaced by ``{"_shape": [..]}``, `bytes` payloads
/// and null fields are dropped; every other field is kept.
pub fn describe_record<B: Backend, R: Record<B>>(record: R) -> anyhow::Result<Value> {
    let item = record.into_item::<HalfPrecisionSettings>();
    let value = serde_json::to_value(&item)?;
    Ok(rewrite_value(value))
}

/// Collect the ``(path, shape)`` of every tensor in a record.
///
/// Paths are dotted field names, in record order.
pub fn record_tensor_shapes<B: Backend, R: Record<B>>(
    record: R
) -> anyhow::Result<Vec<(String, Vec<usize>)>> {
    let mut shapes = Vec::new();
    collect_shapes(&describe_record(record)?, "", &mut shapes);
    Ok(shapes)
}

struct TensorShapeVisitor {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for TensorShapeVisitor {
    fn visit_float<const D: usize>(
        &mut self,
        _id: ParamId,
        tensor: &Tensor<B, D>,
    ) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

/// Collect the shape of every float tensor in a module, in visit order.
///
/// Unlike [`record_tensor_shapes`], this does not serialize the tensors.
pub fn module_tensor_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut visitor = TensorShapeVisitor { shapes: Vec::new() };
    module.visit(&mut visitor);
    visitor.shapes
}

/// Check loaded tensor shapes against the shapes a module was built with.
///
/// Record loading does not check tensor shapes.
///
/// # Errors
///
/// On a tensor count mismatch, or the first tensor shape mismatch.
pub fn check_tensor_shapes(
    expected: &[Vec<usize>],
    loaded: &[Vec<usize>],
) -> anyhow::Result<()> {
    if expected.len() != loaded.len() {
        bail!(
            "Checkpoint has {} tensors, model expects {}",
            loaded.len(),
            expected.len()
        );
    }
    for (idx, (e, l)) in expected.iter().zip(loaded).enumerate() {
        if e != l {
            bail!("Checkpoint tensor #{idx} has shape {l:?}, model expects {e:?}");
        }
    }
    Ok(())
}

fn shape_of_numeric_array(arr: &[Value]) -> Option<Vec<usize>> {
    match arr.first() {
        None => Some(vec![0]),
        Some(first) if first.is_number() => Some(vec![arr.len()]),
        Some(Value::Array(inner)) => {
            let inner_shape = shape_of_numeric_array(inner)?;
            Some(std::iter::once(arr.len()).chain(inner_shape).collect())
        }
        _ => None,
    }
}

fn rewrite_value(value: Value) -> Value {
    match value {
        Value::Array(a) => match shape_of_numeric_array(&a) {
            Some(shape) => {
                let mut obj: Map<String, Value> = Map::new();
                obj.insert(
                    "_shape".to_string(),
                    Value::Array(shape.into_iter().map(Value::from).collect()),
                );
                Value::Object(obj)
            }
            None => Value::Array(a.into_iter().map(rewrite_value).collect()),
        },
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .filter(|(k, v)| k != "bytes" && !v.is_null())
                .map(|(k, v)| {
                    if k == "shape" {
                        (k, v)
                    } else {
                        (k, rewrite_value(v))
                    }
                })
                .collect(),
        ),
        v => v,
    }
}

fn collect_shapes(
    value: &Value,
    path: &str,
    shapes: &mut Vec<(String, Vec<usize>)>,
) {
    let join = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };

    match value {
        Value::Object(obj) => {
            if let Some(Value::Array(shape)) = obj.get("shape").or_else(|| obj.get("_shape")) {
                let shape = shape
                    .iter()
                    .filter_map(|d| d.as_u64().map(|d| d as usize))
                    .collect();
                shapes.push((path.to_string(), shape));
                return;
            }
            for (k, v) in obj {
                // Wrapper levels of the record item encoding.
                if k == "param" || k == "id" {
                    collect_shapes(v, path, shapes);
                } else {
                    collect_shapes(v, &join(k), shapes);
                }
            }
        }
        Value::Array(items) => {
            for (idx, v) in items.iter().enumerate() {
                collect_shapes(v, &join(&idx.to_string()), shapes);
            }
        }
        _ => (),
    }
}
