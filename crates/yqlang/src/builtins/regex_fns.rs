//! Regular-expression builtins: `re`, `match`, `matchAll`, `matchEntire`,
//! `replace`.
//!
//! Patterns are either a regex value produced by `re(pattern, flags?)` or a
//! plain string treated literally. Accepted flags: `i` (case-insensitive),
//! `m` (multi-line), `s` (dot matches newline), `x` (ignore whitespace).

use regex::{Regex, RegexBuilder};

use super::{Builtin, exactly};
use crate::{
    bytecode::vm::Vm,
    errors::{RunResult, RuntimeError},
    heap::{HeapData, RegexValue},
    host::HostContext,
    value::{Value, as_str},
};

fn build_regex(pattern: &str, flags: &str) -> RunResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(RuntimeError::type_mismatch(
                    "regex flags from 'imsx'",
                    format!("{other:?}"),
                ));
            }
        };
    }
    builder
        .build()
        .map_err(|err| RuntimeError::type_mismatch("valid regular expression", err.to_string()))
}

pub(super) fn re<H: HostContext>(vm: &mut Vm<'_, H>, builtin: Builtin, args: Vec<Value>) -> RunResult<Value> {
    let (pattern_value, flags_value) = match args.len() {
        1 => {
            let [p] = exactly::<1>(builtin, args)?;
            (p, None)
        }
        _ => {
            let [p, f] = exactly::<2>(builtin, args)?;
            (p, Some(f))
        }
    };
    let Some(pattern) = as_str(&pattern_value, vm.heap).map(str::to_owned) else {
        return Err(RuntimeError::type_mismatch("pattern string", pattern_value.kind_name(vm.heap)));
    };
    let flags = match &flags_value {
        None => String::new(),
        Some(f) => match as_str(f, vm.heap) {
            Some(s) => s.to_owned(),
            None => return Err(RuntimeError::type_mismatch("flags string", f.kind_name(vm.heap))),
        },
    };
    let compiled = build_regex(&pattern, &flags)?;
    let id = vm.heap.allocate(HeapData::Regex(RegexValue {
        pattern,
        flags,
        re: compiled,
    }));
    Ok(Value::Ref(id))
}

/// Resolves a pattern argument: a regex value as-is, a string literally.
/// Returns the compiled regex plus the source pattern and flags (for
/// re-anchoring in `matchEntire`).
fn pattern_of<H: HostContext>(vm: &Vm<'_, H>, pattern: &Value) -> RunResult<(Regex, String, String)> {
    match pattern {
        Value::Ref(id) => match vm.heap.get(*id) {
            HeapData::Regex(rv) => Ok((rv.re.clone(), rv.pattern.clone(), rv.flags.clone())),
            HeapData::Str(s) => {
                let escaped = regex::escape(s);
                let compiled = build_regex(&escaped, "")?;
                Ok((compiled, escaped, String::new()))
            }
            other => Err(RuntimeError::type_mismatch("regex or string", other.kind_name())),
        },
        other => Err(RuntimeError::type_mismatch("regex or string", other.kind_name(vm.heap))),
    }
}

fn subject_of<H: HostContext>(vm: &Vm<'_, H>, recv: &Value) -> RunResult<String> {
    as_str(recv, vm.heap)
        .map(str::to_owned)
        .ok_or_else(|| RuntimeError::type_mismatch("string", recv.kind_name(vm.heap)))
}

pub(super) fn match_first<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, pattern: Value) -> RunResult<Value> {
    let subject = subject_of(vm, &recv)?;
    let (re, _, _) = pattern_of(vm, &pattern)?;
    match re.find(&subject) {
        Some(found) => {
            let text = found.as_str().to_owned();
            Ok(vm.heap.alloc_str(text))
        }
        None => Ok(Value::Null),
    }
}

pub(super) fn match_all<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, pattern: Value) -> RunResult<Value> {
    let subject = subject_of(vm, &recv)?;
    let (re, _, _) = pattern_of(vm, &pattern)?;
    let texts: Vec<String> = re.find_iter(&subject).map(|m| m.as_str().to_owned()).collect();
    let values: Vec<Value> = texts.into_iter().map(|t| vm.heap.alloc_str(t)).collect();
    Ok(vm.heap.alloc_list(values))
}

pub(super) fn match_entire<H: HostContext>(vm: &mut Vm<'_, H>, recv: Value, pattern: Value) -> RunResult<Value> {
    let subject = subject_of(vm, &recv)?;
    let (_, source, flags) = pattern_of(vm, &pattern)?;
    // re-anchor the original pattern so the match must span the whole input
    let anchored = build_regex(&format!("\\A(?:{source})\\z"), &flags)?;
    match anchored.find(&subject) {
        Some(found) => {
            let text = found.as_str().to_owned();
            Ok(vm.heap.alloc_str(text))
        }
        None => Ok(Value::Null),
    }
}

pub(super) fn replace<H: HostContext>(
    vm: &mut Vm<'_, H>,
    recv: Value,
    pattern: Value,
    replacement: Value,
) -> RunResult<Value> {
    let subject = subject_of(vm, &recv)?;
    let (re, _, _) = pattern_of(vm, &pattern)?;
    let Some(replacement) = as_str(&replacement, vm.heap).map(str::to_owned) else {
        return Err(RuntimeError::type_mismatch(
            "replacement string",
            replacement.kind_name(vm.heap),
        ));
    };
    let out = re.replace_all(&subject, replacement.as_str()).into_owned();
    Ok(vm.heap.alloc_str(out))
}
