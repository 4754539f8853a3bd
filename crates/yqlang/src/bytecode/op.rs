//! Opcode definitions.
//!
//! Opcodes are one byte, followed by zero or more little-endian operands.
//! Jump operands are absolute bytecode offsets (`u32`), fixed up from labels
//! after emission.

use strum::{Display, FromRepr};

/// One VM instruction.
///
/// Operand layout per opcode is documented on the variant; `stack_effect`
/// returns the fixed operand-stack delta where one exists (variable-effect
/// opcodes are tracked by the emit helpers in the builder).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
pub enum Opcode {
    Nop,

    // --- pushes ---
    /// u16 constant-pool index. String constants allocate a fresh heap cell.
    LoadConst,
    LoadNull,
    LoadTrue,
    LoadFalse,
    /// i8 immediate integer.
    LoadSmallInt,
    /// u8 builtin id.
    LoadBuiltin,

    // --- stack shuffling ---
    Pop,
    Dup,

    // --- bindings ---
    /// u16 local slot.
    LoadLocal,
    /// u16 local slot.
    StoreLocal,
    /// u16 local slot holding a promoted capture cell.
    LoadCell,
    /// u16 local slot holding a promoted capture cell.
    StoreCell,
    /// u16 capture slot.
    LoadCapture,
    /// u16 capture slot.
    StoreCapture,
    /// u16 global slot.
    LoadGlobal,
    /// u16 global slot.
    StoreGlobal,
    /// The reserved `this` receiver.
    LoadThis,
    /// The reserved `$` arguments list.
    LoadArgs,
    /// u16 argument index; pushes null when absent.
    LoadArg,

    // --- arithmetic, logic, comparison ---
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Not,
    ToBool,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    /// `x in c`: pops the container then the candidate, pushes a boolean.
    Contains,

    // --- control flow (u32 absolute target) ---
    Jump,
    /// Pops the condition; jumps when falsy.
    JumpZero,
    /// Jumps when this is not the script's first run (`init` gate).
    JumpNotFirstRun,

    // --- access views ---
    /// Pops the base value, pushes a fresh view onto the view stack.
    PushView,
    /// u16 interned attribute name; extends the top view.
    ExtendViewAttr,
    /// Pops a step value (integer index, string key, or slice subscript) and
    /// extends the top view.
    ExtendView,
    /// u8 flags (bit 0: begin present, bit 1: end present). Pops the present
    /// endpoints (end first) and pushes a transient slice subscript.
    MakeSlice,
    /// Pops the top view, pushes its selected value.
    ViewGet,
    /// Pops the top view, pushes its value for a call: object-stored values
    /// and builtin fallbacks are bound to the receiver.
    ViewGetRef,
    /// Pushes the top view's value without popping the view (compound
    /// assignment reads).
    ViewRead,
    /// Pops the assigned value, pops the top view, writes in place.
    ViewSet,

    // --- calls ---
    /// u8 argument count; the callee sits beneath the arguments.
    Call,
    /// u8 builtin id, u8 argument count. Free builtin call with no receiver.
    InvokeBuiltin,
    /// Pops the return value and the current frame.
    Return,

    // --- iteration ---
    /// Pops an iterable, pushes an iterator onto the iterator stack.
    PushIter,
    /// u32 target; jumps (to the loop epilogue) when the top iterator is
    /// exhausted.
    IterJumpDone,
    /// Pushes the top iterator's next element.
    IterNext,
    PopIter,

    // --- construction ---
    /// u16 element count.
    MakeList,
    /// u16 entry count, then that many u16 interned key names. Pops the
    /// values (pushed in entry order).
    MakeObject,
    /// u16 function id, u8 capture count, then per capture a u8 source kind
    /// (0 = enclosing local cell, 1 = enclosing capture slot) and a u16 slot.
    MakeClosure,

    // --- statements ---
    /// u8 action code (say/nudge/picsave/picsend); pops the operand.
    Action,
    /// Pops into the frame's statement register.
    PopSaveReg,
    /// Resets the statement register to null.
    ClearReg,
    /// Pushes the statement register.
    LoadReg,
    /// u16 element index, u32 skip target. Peeks the list on top of the
    /// stack: pushes its n-th element, or jumps without pushing when the
    /// list is too short (shorter-wins destructuring).
    ElemOrJump,
    /// Ends module execution with the popped value.
    Exit,
}

impl Opcode {
    /// Fixed operand-stack effect, if this opcode has one.
    ///
    /// `Call`, `InvokeBuiltin`, `MakeList`, `MakeObject`, and `MakeSlice`
    /// have operand-dependent effects and return `None`; the builder's emit
    /// helpers account for those. `ElemOrJump` reports its fallthrough
    /// effect.
    #[must_use]
    pub fn stack_effect(self) -> Option<i16> {
        Some(match self {
            Self::Nop
            | Self::Neg
            | Self::Not
            | Self::ToBool
            | Self::Jump
            | Self::JumpNotFirstRun
            | Self::ExtendViewAttr
            | Self::IterJumpDone
            | Self::PopIter
            | Self::ClearReg => 0,

            Self::LoadConst
            | Self::LoadNull
            | Self::LoadTrue
            | Self::LoadFalse
            | Self::LoadSmallInt
            | Self::LoadBuiltin
            | Self::Dup
            | Self::LoadLocal
            | Self::LoadCell
            | Self::LoadCapture
            | Self::LoadGlobal
            | Self::LoadThis
            | Self::LoadArgs
            | Self::LoadArg
            | Self::ViewGet
            | Self::ViewGetRef
            | Self::ViewRead
            | Self::IterNext
            | Self::MakeClosure
            | Self::LoadReg
            | Self::ElemOrJump => 1,

            Self::Pop
            | Self::StoreLocal
            | Self::StoreCell
            | Self::StoreCapture
            | Self::StoreGlobal
            | Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Rem
            | Self::CmpEq
            | Self::CmpNe
            | Self::CmpLt
            | Self::CmpLe
            | Self::CmpGt
            | Self::CmpGe
            | Self::Contains
            | Self::JumpZero
            | Self::PushView
            | Self::ExtendView
            | Self::ViewSet
            | Self::Return
            | Self::PushIter
            | Self::Action
            | Self::PopSaveReg
            | Self::Exit => -1,

            Self::MakeSlice
            | Self::Call
            | Self::InvokeBuiltin
            | Self::MakeList
            | Self::MakeObject => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_repr() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_repr(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Opcode::from_repr(Opcode::Exit as u8), Some(Opcode::Exit));
    }
}
