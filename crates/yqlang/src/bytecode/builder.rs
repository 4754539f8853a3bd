//! Builder for emitting bytecode during compilation.
//!
//! `CodeBuilder` encodes opcodes and operands into raw bytes, manages forward
//! jumps through patchable labels, tracks the operand-stack depth to size the
//! VM stack, and records source locations for diagnostics.
//!
//! Jump operands are absolute bytecode offsets: forward jumps emit a `u32`
//! placeholder and are patched once the target is known; backward jumps are
//! emitted directly.

use super::{
    code::{Code, Const, LocationEntry},
    op::Opcode,
};

/// Label for a forward jump that needs patching.
///
/// Stores the bytecode offset of the jump's `u32` operand.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

/// Builder for one function's bytecode.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    constants: Vec<Const>,
    locations: Vec<LocationEntry>,
    current_source_pos: Option<u32>,
    current_stack_depth: u16,
    max_stack_depth: u16,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source position recorded for subsequently emitted
    /// instructions.
    pub fn set_location(&mut self, source_pos: usize) {
        self.current_source_pos = Some(u32::try_from(source_pos).unwrap_or(u32::MAX));
    }

    fn start_instruction(&mut self) {
        if let Some(source_pos) = self.current_source_pos.take() {
            self.locations.push(LocationEntry {
                offset: u32::try_from(self.bytecode.len()).expect("bytecode exceeds u32"),
                source_pos,
            });
        }
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with a u8 operand.
    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.push(operand);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with an i8 operand.
    pub fn emit_i8(&mut self, op: Opcode, operand: i8) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.push(operand.to_ne_bytes()[0]);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with a u16 operand (little-endian).
    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits `MakeSlice` with its flags byte, accounting for the popped
    /// endpoints.
    pub fn emit_make_slice(&mut self, has_begin: bool, has_end: bool) {
        self.start_instruction();
        self.bytecode.push(Opcode::MakeSlice as u8);
        self.bytecode
            .push(u8::from(has_begin) | (u8::from(has_end) << 1));
        // pops the present endpoints, pushes the subscript
        let popped = i16::from(has_begin) + i16::from(has_end);
        self.adjust_stack(1 - popped);
    }

    /// Emits `Call` with its argument count: pops callee + args, pushes the
    /// result.
    pub fn emit_call(&mut self, argc: u8) {
        self.start_instruction();
        self.bytecode.push(Opcode::Call as u8);
        self.bytecode.push(argc);
        self.adjust_stack(-i16::from(argc));
    }

    /// Emits `InvokeBuiltin`: pops args, pushes the result.
    pub fn emit_invoke_builtin(&mut self, builtin_id: u8, argc: u8) {
        self.start_instruction();
        self.bytecode.push(Opcode::InvokeBuiltin as u8);
        self.bytecode.push(builtin_id);
        self.bytecode.push(argc);
        self.adjust_stack(1 - i16::from(argc));
    }

    /// Emits `MakeList n`: pops n elements, pushes the list.
    pub fn emit_make_list(&mut self, count: u16) {
        self.start_instruction();
        self.bytecode.push(Opcode::MakeList as u8);
        self.bytecode.extend_from_slice(&count.to_le_bytes());
        self.adjust_stack(1 - count.cast_signed());
    }

    /// Emits `MakeObject` with inline key name ids: pops the values, pushes
    /// the object.
    pub fn emit_make_object(&mut self, key_ids: &[u16]) {
        self.start_instruction();
        self.bytecode.push(Opcode::MakeObject as u8);
        let count = u16::try_from(key_ids.len()).expect("object literal exceeds u16 entries");
        self.bytecode.extend_from_slice(&count.to_le_bytes());
        for &key in key_ids {
            self.bytecode.extend_from_slice(&key.to_le_bytes());
        }
        self.adjust_stack(1 - count.cast_signed());
    }

    /// Emits `MakeClosure` with inline capture sources.
    ///
    /// Each capture is `(kind, slot)` where kind 0 reads the cell out of an
    /// enclosing local slot and kind 1 forwards an enclosing capture slot.
    pub fn emit_make_closure(&mut self, function_id: u16, captures: &[(u8, u16)]) {
        self.start_instruction();
        self.bytecode.push(Opcode::MakeClosure as u8);
        self.bytecode.extend_from_slice(&function_id.to_le_bytes());
        self.bytecode
            .push(u8::try_from(captures.len()).expect("closure exceeds u8 captures"));
        for &(kind, slot) in captures {
            self.bytecode.push(kind);
            self.bytecode.extend_from_slice(&slot.to_le_bytes());
        }
        self.adjust_stack(1);
    }

    /// Emits a forward jump, returning a label to patch later.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        self.start_instruction();
        self.bytecode.push(op as u8);
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.extend_from_slice(&0u32.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
        label
    }

    /// Emits `ElemOrJump index`, returning the skip label.
    #[must_use]
    pub fn emit_elem_or_jump(&mut self, index: u16) -> JumpLabel {
        self.start_instruction();
        self.bytecode.push(Opcode::ElemOrJump as u8);
        self.bytecode.extend_from_slice(&index.to_le_bytes());
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.extend_from_slice(&0u32.to_le_bytes());
        // fallthrough pushes the element
        self.adjust_stack(1);
        label
    }

    /// Patches a forward jump to land on the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = u32::try_from(self.bytecode.len()).expect("bytecode exceeds u32");
        self.bytecode[label.0..label.0 + 4].copy_from_slice(&target.to_le_bytes());
    }

    /// Emits a jump to an already-known (backward) target.
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        let target = u32::try_from(target).expect("bytecode exceeds u32");
        self.bytecode.extend_from_slice(&target.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Current bytecode offset; used to record loop heads.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    /// Adds a constant to the pool, returning its index. Existing entries
    /// with the same content are reused.
    ///
    /// # Panics
    /// Panics if the pool exceeds 65 536 entries.
    #[must_use]
    pub fn add_const(&mut self, value: Const) -> u16 {
        if let Some(found) = self.constants.iter().position(|c| c == &value) {
            return u16::try_from(found).expect("constant pool exceeds u16");
        }
        let idx = u16::try_from(self.constants.len()).expect("constant pool exceeds u16");
        self.constants.push(value);
        idx
    }

    fn adjust_stack(&mut self, delta: i16) {
        let new_depth = i32::from(self.current_stack_depth) + i32::from(delta);
        debug_assert!(new_depth >= 0, "stack depth went negative: {new_depth}");
        self.current_stack_depth = u16::try_from(new_depth.max(0)).unwrap_or(u16::MAX);
        self.max_stack_depth = self.max_stack_depth.max(self.current_stack_depth);
    }

    /// Builds the final [`Code`] object.
    #[must_use]
    pub fn build(self) -> Code {
        Code::new(
            self.bytecode,
            self.constants,
            self.locations,
            self.max_stack_depth,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_basic() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::LoadNull);
        builder.emit(Opcode::Pop);
        let code = builder.build();
        assert_eq!(code.bytecode(), &[Opcode::LoadNull as u8, Opcode::Pop as u8]);
    }

    #[test]
    fn forward_jump_patches_absolute() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::LoadTrue);
        let jump = builder.emit_jump(Opcode::JumpZero);
        builder.emit(Opcode::LoadNull);
        builder.patch_jump(jump);
        builder.emit(Opcode::Nop);
        let code = builder.build();
        // JumpZero at offset 1, operand at 2..6, target = 7 (the Nop)
        assert_eq!(
            code.bytecode(),
            &[
                Opcode::LoadTrue as u8,
                Opcode::JumpZero as u8,
                7,
                0,
                0,
                0,
                Opcode::LoadNull as u8,
                Opcode::Nop as u8,
            ]
        );
    }

    #[test]
    fn backward_jump_is_direct() {
        let mut builder = CodeBuilder::new();
        let head = builder.current_offset();
        builder.emit(Opcode::Nop);
        builder.emit_jump_to(Opcode::Jump, head);
        let code = builder.build();
        assert_eq!(
            code.bytecode(),
            &[Opcode::Nop as u8, Opcode::Jump as u8, 0, 0, 0, 0]
        );
    }

    #[test]
    fn consts_deduplicate() {
        let mut builder = CodeBuilder::new();
        let a = builder.add_const(Const::Int(42));
        let b = builder.add_const(Const::Str("x".into()));
        let c = builder.add_const(Const::Int(42));
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn stack_depth_tracks_maximum() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::LoadNull);
        builder.emit(Opcode::LoadNull);
        builder.emit(Opcode::Add);
        builder.emit(Opcode::Pop);
        let code = builder.build();
        assert_eq!(code.stack_size(), 2);
    }
}
