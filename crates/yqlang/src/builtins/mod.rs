//! The builtin procedure library.
//!
//! Every builtin is callable free (`length(x)`) or bound
//! (`x.length()` — the receiver arrives as `this`). Builtins that operate on
//! a receiver accept it either way: a free call takes the receiver as its
//! first positional argument. Callback-taking builtins (`filter`, `map`,
//! `reduce`, `sorted`) re-enter the VM to run user closures.

mod convert;
mod functional;
mod misc;
mod regex_fns;
mod seq;

use strum::{EnumString, FromRepr};

use crate::{
    bytecode::vm::{Vm, binary},
    errors::{RunResult, RuntimeError},
    host::HostContext,
    value::Value,
};

/// Identifies one builtin procedure. The `u8` discriminant is the bytecode
/// operand of `InvokeBuiltin` and `LoadBuiltin`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, FromRepr)]
pub enum Builtin {
    #[strum(serialize = "split")]
    Split,
    #[strum(serialize = "join")]
    Join,
    #[strum(serialize = "find")]
    Find,
    #[strum(serialize = "findAll")]
    FindAll,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "length")]
    Length,
    #[strum(serialize = "reversed")]
    Reversed,
    #[strum(serialize = "sorted")]
    Sorted,
    #[strum(serialize = "enumerated")]
    Enumerated,
    #[strum(serialize = "sum")]
    Sum,
    #[strum(serialize = "filter")]
    Filter,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "reduce")]
    Reduce,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "range")]
    Range,
    #[strum(serialize = "rangeInclusive")]
    RangeInclusive,
    #[strum(serialize = "number", serialize = "num")]
    Number,
    #[strum(serialize = "string", serialize = "str")]
    Str,
    #[strum(serialize = "integer")]
    Integer,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "boolean", serialize = "bool")]
    Boolean,
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "ord")]
    Ord,
    #[strum(serialize = "chr", serialize = "char")]
    Chr,
    #[strum(serialize = "pow")]
    Pow,
    #[strum(serialize = "re")]
    Re,
    #[strum(serialize = "match")]
    Match,
    #[strum(serialize = "matchAll")]
    MatchAll,
    #[strum(serialize = "matchEntire")]
    MatchEntire,
    #[strum(serialize = "replace")]
    Replace,
    #[strum(serialize = "time")]
    Time,
    #[strum(serialize = "sleep")]
    Sleep,
    #[strum(serialize = "random")]
    Random,
    #[strum(serialize = "getNickname")]
    GetNickname,
}

impl Builtin {
    /// Looks a builtin up by its source-level name (including the short
    /// aliases `num`, `str`, `bool`, `char`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    /// Canonical name for error messages and display.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Join => "join",
            Self::Find => "find",
            Self::FindAll => "findAll",
            Self::Contains => "contains",
            Self::Length => "length",
            Self::Reversed => "reversed",
            Self::Sorted => "sorted",
            Self::Enumerated => "enumerated",
            Self::Sum => "sum",
            Self::Filter => "filter",
            Self::Map => "map",
            Self::Reduce => "reduce",
            Self::Max => "max",
            Self::Min => "min",
            Self::Range => "range",
            Self::RangeInclusive => "rangeInclusive",
            Self::Number => "number",
            Self::Str => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Abs => "abs",
            Self::Ord => "ord",
            Self::Chr => "chr",
            Self::Pow => "pow",
            Self::Re => "re",
            Self::Match => "match",
            Self::MatchAll => "matchAll",
            Self::MatchEntire => "matchEntire",
            Self::Replace => "replace",
            Self::Time => "time",
            Self::Sleep => "sleep",
            Self::Random => "random",
            Self::GetNickname => "getNickname",
        }
    }
}

/// Dispatches a builtin invocation.
///
/// `this` is the bound receiver, when the call came through an attribute
/// access; receiver-style builtins shift their first positional argument
/// into the receiver position for free calls.
pub(crate) fn invoke<H: HostContext>(
    vm: &mut Vm<'_, H>,
    builtin: Builtin,
    this: Option<Value>,
    args: Vec<Value>,
) -> RunResult<Value> {
    match builtin {
        Builtin::Split => {
            let (recv, args) = receiver(builtin, this, args)?;
            seq::split(vm, recv, args)
        }
        Builtin::Join => {
            let (recv, args) = receiver(builtin, this, args)?;
            seq::join(vm, recv, args)
        }
        Builtin::Find => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [needle] = exactly(builtin, args)?;
            seq::find(vm, recv, needle)
        }
        Builtin::FindAll => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [needle] = exactly(builtin, args)?;
            seq::find_all(vm, recv, needle)
        }
        Builtin::Contains => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [candidate] = exactly(builtin, args)?;
            let found = binary::contains(vm.heap, &candidate, &recv)?;
            Ok(Value::Bool(found))
        }
        Builtin::Length => {
            let (recv, args) = receiver(builtin, this, args)?;
            exactly::<0>(builtin, args)?;
            seq::length(vm, recv)
        }
        Builtin::Reversed => {
            let (recv, args) = receiver(builtin, this, args)?;
            exactly::<0>(builtin, args)?;
            seq::reversed(vm, recv)
        }
        Builtin::Sorted => {
            let (recv, args) = receiver(builtin, this, args)?;
            functional::sorted(vm, recv, args)
        }
        Builtin::Enumerated => {
            let (recv, args) = receiver(builtin, this, args)?;
            exactly::<0>(builtin, args)?;
            seq::enumerated(vm, recv)
        }
        Builtin::Sum => {
            let (recv, args) = receiver(builtin, this, args)?;
            exactly::<0>(builtin, args)?;
            seq::sum(vm, recv)
        }
        Builtin::Filter => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [pred] = exactly(builtin, args)?;
            functional::filter(vm, recv, pred)
        }
        Builtin::Map => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [func] = exactly(builtin, args)?;
            functional::map(vm, recv, func)
        }
        Builtin::Reduce => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [init, func] = exactly(builtin, args)?;
            functional::reduce(vm, recv, init, func)
        }
        Builtin::Max => seq::max_min(vm, builtin, this, args, true),
        Builtin::Min => seq::max_min(vm, builtin, this, args, false),
        Builtin::Range => misc::range(vm, builtin, args, false),
        Builtin::RangeInclusive => misc::range(vm, builtin, args, true),
        Builtin::Number => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::number(vm, value)
        }
        Builtin::Str => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::string(vm, value)
        }
        Builtin::Integer => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::integer(vm, value)
        }
        Builtin::Float => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::float(vm, value)
        }
        Builtin::Boolean => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            Ok(Value::Bool(value.truthy(vm.heap)))
        }
        Builtin::Object => convert::object(vm, merge_this(this, args)),
        Builtin::Abs => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::abs(vm, value)
        }
        Builtin::Ord => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::ord(vm, value)
        }
        Builtin::Chr => {
            let [value] = exactly(builtin, merge_this(this, args))?;
            convert::chr(vm, value)
        }
        Builtin::Pow => {
            let [base, exp] = exactly(builtin, merge_this(this, args))?;
            convert::pow(vm, base, exp)
        }
        Builtin::Re => regex_fns::re(vm, builtin, args),
        Builtin::Match => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [pattern] = exactly(builtin, args)?;
            regex_fns::match_first(vm, recv, pattern)
        }
        Builtin::MatchAll => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [pattern] = exactly(builtin, args)?;
            regex_fns::match_all(vm, recv, pattern)
        }
        Builtin::MatchEntire => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [pattern] = exactly(builtin, args)?;
            regex_fns::match_entire(vm, recv, pattern)
        }
        Builtin::Replace => {
            let (recv, args) = receiver(builtin, this, args)?;
            let [pattern, replacement] = exactly(builtin, args)?;
            regex_fns::replace(vm, recv, pattern, replacement)
        }
        Builtin::Time => {
            exactly::<0>(builtin, args)?;
            Ok(misc::time())
        }
        Builtin::Sleep => {
            let [ms] = exactly(builtin, args)?;
            misc::sleep(vm, ms)
        }
        Builtin::Random => misc::random(vm, builtin, args),
        Builtin::GetNickname => {
            let [id] = exactly(builtin, args)?;
            misc::get_nickname(vm, id)
        }
    }
}

/// Extracts the receiver: `this` for bound calls, the first positional
/// argument for free calls.
fn receiver(builtin: Builtin, this: Option<Value>, mut args: Vec<Value>) -> RunResult<(Value, Vec<Value>)> {
    match this {
        Some(receiver) => Ok((receiver, args)),
        None => {
            if args.is_empty() {
                return Err(RuntimeError::arity(builtin.name(), "missing receiver argument"));
            }
            let receiver = args.remove(0);
            Ok((receiver, args))
        }
    }
}

/// For value builtins (`string`, `abs`, ...) a bound call treats the
/// receiver as the argument: `x.string()` equals `string(x)`.
fn merge_this(this: Option<Value>, args: Vec<Value>) -> Vec<Value> {
    match this {
        Some(receiver) => {
            let mut merged = Vec::with_capacity(args.len() + 1);
            merged.push(receiver);
            merged.extend(args);
            merged
        }
        None => args,
    }
}

/// Checks the exact argument count, returning the arguments as an array.
fn exactly<const N: usize>(builtin: Builtin, args: Vec<Value>) -> RunResult<[Value; N]> {
    let got = args.len();
    <[Value; N]>::try_from(args)
        .map_err(|_| RuntimeError::arity(builtin.name(), format!("expected {N} arguments, got {got}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_with_aliases() {
        assert_eq!(Builtin::from_name("findAll"), Some(Builtin::FindAll));
        assert_eq!(Builtin::from_name("num"), Some(Builtin::Number));
        assert_eq!(Builtin::from_name("number"), Some(Builtin::Number));
        assert_eq!(Builtin::from_name("char"), Some(Builtin::Chr));
        assert_eq!(Builtin::from_name("rangeInclusive"), Some(Builtin::RangeInclusive));
        assert_eq!(Builtin::from_name("frobnicate"), None);
    }

    #[test]
    fn repr_round_trips() {
        assert_eq!(Builtin::from_repr(Builtin::GetNickname as u8), Some(Builtin::GetNickname));
    }
}
