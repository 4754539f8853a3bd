//! Conversion and numeric builtins: `number`, `string`, `integer`, `float`,
//! `object`, `abs`, `ord`, `chr`, `pow`.

use crate::{
    bytecode::vm::Vm,
    errors::{RunResult, RuntimeError},
    heap::{HeapData, Object},
    host::HostContext,
    value::{Value, as_str, display_string},
};

pub(super) fn number<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    match &value {
        Value::Int(_) | Value::Float(_) => Ok(value),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        _ => match as_str(&value, vm.heap) {
            Some(s) => {
                let s = s.trim();
                if let Ok(v) = s.parse::<i64>() {
                    Ok(Value::Int(v))
                } else if let Ok(v) = s.parse::<f64>() {
                    Ok(Value::Float(v))
                } else {
                    Err(RuntimeError::type_mismatch("numeric string", format!("{s:?}")))
                }
            }
            None => Err(RuntimeError::type_mismatch("number-like value", value.kind_name(vm.heap))),
        },
    }
}

pub(super) fn string<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    let rendered = display_string(&value, vm.heap);
    Ok(vm.heap.alloc_str(rendered))
}

pub(super) fn integer<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    match &value {
        Value::Int(_) => Ok(value),
        Value::Float(v) => Ok(Value::Int(*v as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        _ => match as_str(&value, vm.heap) {
            Some(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| RuntimeError::type_mismatch("integer string", format!("{:?}", s.trim()))),
            None => Err(RuntimeError::type_mismatch("integer-like value", value.kind_name(vm.heap))),
        },
    }
}

pub(super) fn float<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    match &value {
        Value::Float(_) => Ok(value),
        Value::Int(v) => Ok(Value::Float(*v as f64)),
        Value::Bool(b) => Ok(Value::Float(f64::from(i8::from(*b)))),
        _ => match as_str(&value, vm.heap) {
            Some(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RuntimeError::type_mismatch("float string", format!("{:?}", s.trim()))),
            None => Err(RuntimeError::type_mismatch("float-like value", value.kind_name(vm.heap))),
        },
    }
}

/// `object()` makes an empty object; `object(pairs)` builds one from a list
/// of `[key, value]` pairs.
pub(super) fn object<H: HostContext>(vm: &mut Vm<'_, H>, args: Vec<Value>) -> RunResult<Value> {
    let mut out = Object::new();
    if let Some(pairs) = args.first() {
        let Value::Ref(id) = pairs else {
            return Err(RuntimeError::type_mismatch("list of pairs", pairs.kind_name(vm.heap)));
        };
        let HeapData::List(items) = vm.heap.get(*id) else {
            return Err(RuntimeError::type_mismatch("list of pairs", vm.heap.get(*id).kind_name()));
        };
        let items = items.clone();
        for pair in items {
            let Value::Ref(pid) = &pair else {
                return Err(RuntimeError::type_mismatch("[key, value] pair", pair.kind_name(vm.heap)));
            };
            let HeapData::List(kv) = vm.heap.get(*pid) else {
                return Err(RuntimeError::type_mismatch("[key, value] pair", vm.heap.get(*pid).kind_name()));
            };
            let (key_value, value) = match kv.as_slice() {
                [key, value] => (key.clone(), value.clone()),
                _ => {
                    return Err(RuntimeError::type_mismatch(
                        "[key, value] pair",
                        format!("list of length {}", kv.len()),
                    ));
                }
            };
            let key = display_string(&key_value, vm.heap);
            out.insert(key, value);
        }
    }
    Ok(vm.heap.alloc_object(out))
}

pub(super) fn abs<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    match value {
        Value::Int(v) => Ok(Value::Int(v.wrapping_abs())),
        Value::Float(v) => Ok(Value::Float(v.abs())),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        other => Err(RuntimeError::type_mismatch("number", other.kind_name(vm.heap))),
    }
}

pub(super) fn ord<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    match as_str(&value, vm.heap).and_then(|s| s.chars().next()) {
        Some(c) => Ok(Value::Int(i64::from(u32::from(c)))),
        None => Err(RuntimeError::type_mismatch(
            "non-empty string",
            value.kind_name(vm.heap),
        )),
    }
}

pub(super) fn chr<H: HostContext>(vm: &mut Vm<'_, H>, value: Value) -> RunResult<Value> {
    let code = match value {
        Value::Int(v) => u32::try_from(v).ok(),
        _ => None,
    };
    match code.and_then(char::from_u32) {
        Some(c) => Ok(vm.heap.alloc_str(c.to_string())),
        None => Err(RuntimeError::type_mismatch(
            "valid character code",
            value.kind_name(vm.heap),
        )),
    }
}

pub(super) fn pow<H: HostContext>(vm: &mut Vm<'_, H>, base: Value, exp: Value) -> RunResult<Value> {
    match (&base, &exp) {
        (Value::Int(b), Value::Int(e)) if *e >= 0 => {
            let e = u32::try_from(*e).unwrap_or(u32::MAX);
            Ok(Value::Int(b.wrapping_pow(e)))
        }
        _ => {
            let b = to_f64(&base).ok_or_else(|| RuntimeError::type_mismatch("number", base.kind_name(vm.heap)))?;
            let e = to_f64(&exp).ok_or_else(|| RuntimeError::type_mismatch("number", exp.kind_name(vm.heap)))?;
            Ok(Value::Float(b.powf(e)))
        }
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::Bool(b) => Some(f64::from(i8::from(*b))),
        _ => None,
    }
}
