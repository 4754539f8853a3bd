//! Host- and environment-facing builtins: `range`, `rangeInclusive`,
//! `time`, `sleep`, `random`, `getNickname`.

use chrono::Utc;
use rand::Rng;

use super::{Builtin, exactly};
use crate::{
    bytecode::vm::Vm,
    errors::{RunResult, RuntimeError},
    host::HostContext,
    value::{Range, Value, as_int, as_str},
};

/// `range(a)` counts from zero; `range(a, b)` from `a` to `b`. Endpoints may
/// also be one-character strings, producing a character range.
pub(super) fn range<H: HostContext>(
    vm: &mut Vm<'_, H>,
    builtin: Builtin,
    args: Vec<Value>,
    inclusive: bool,
) -> RunResult<Value> {
    let (begin, end) = match args.len() {
        1 => {
            let [end] = exactly::<1>(builtin, args)?;
            (None, end)
        }
        _ => {
            let [begin, end] = exactly::<2>(builtin, args)?;
            (Some(begin), end)
        }
    };

    // character endpoints: both must be one-char strings
    if let Some(end_char) = one_char(vm, &end) {
        let begin_char = match &begin {
            Some(b) => one_char(vm, b)
                .ok_or_else(|| RuntimeError::type_mismatch("character endpoint", b.kind_name(vm.heap)))?,
            None => {
                return Err(RuntimeError::arity(builtin.name(), "character ranges need both endpoints"));
            }
        };
        return Ok(Value::Range(Range {
            begin: i64::from(u32::from(begin_char)),
            end: i64::from(u32::from(end_char)),
            inclusive,
            chars: true,
        }));
    }

    let end = as_int(&end).ok_or_else(|| RuntimeError::type_mismatch("integer endpoint", end.kind_name(vm.heap)))?;
    let begin = match begin {
        None => 0,
        Some(b) => {
            as_int(&b).ok_or_else(|| RuntimeError::type_mismatch("integer endpoint", b.kind_name(vm.heap)))?
        }
    };
    Ok(Value::Range(Range {
        begin,
        end,
        inclusive,
        chars: false,
    }))
}

fn one_char<H: HostContext>(vm: &Vm<'_, H>, value: &Value) -> Option<char> {
    let s = as_str(value, vm.heap)?;
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Milliseconds since the Unix epoch.
pub(super) fn time() -> Value {
    Value::Int(Utc::now().timestamp_millis())
}

/// Blocks the worker; the slept time extends the allowance instead of
/// consuming it.
pub(super) fn sleep<H: HostContext>(vm: &mut Vm<'_, H>, ms: Value) -> RunResult<Value> {
    let ms = as_int(&ms).ok_or_else(|| RuntimeError::type_mismatch("integer milliseconds", ms.kind_name(vm.heap)))?;
    vm.budget.sleep(ms)?;
    Ok(Value::Null)
}

/// `random()` is a float in `[0, 1)`; `random(a, b)` a uniform integer with
/// both ends inclusive.
pub(super) fn random<H: HostContext>(vm: &mut Vm<'_, H>, builtin: Builtin, args: Vec<Value>) -> RunResult<Value> {
    if args.is_empty() {
        return Ok(Value::Float(vm.rng.r#gen::<f64>()));
    }
    let [a, b] = exactly::<2>(builtin, args)?;
    let a = as_int(&a).ok_or_else(|| RuntimeError::type_mismatch("integer bound", a.kind_name(vm.heap)))?;
    let b = as_int(&b).ok_or_else(|| RuntimeError::type_mismatch("integer bound", b.kind_name(vm.heap)))?;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::Int(vm.rng.gen_range(lo..=hi)))
}

/// Resolves a user id to a nickname through the host; unknown ids fall back
/// to the stringified id.
pub(super) fn get_nickname<H: HostContext>(vm: &mut Vm<'_, H>, id: Value) -> RunResult<Value> {
    let id = as_int(&id).ok_or_else(|| RuntimeError::type_mismatch("integer id", id.kind_name(vm.heap)))?;
    let name = vm.host.nickname(id).unwrap_or_else(|| id.to_string());
    Ok(vm.heap.alloc_str(name))
}
