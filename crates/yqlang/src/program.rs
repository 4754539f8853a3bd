//! Compiled programs: the output of the parse → resolve → compile pipeline.
//!
//! A [`Program`] is immutable and self-contained: module code, the function
//! table, the interned names, and the global symbol table. It can be
//! serialized with [`Program::dump`] and restored with [`Program::load`] so
//! hosts can cache compiled scripts instead of re-parsing on every event.

use crate::{
    ast::FrameLayout,
    bytecode::{Code, compile_module},
    errors::CompileResult,
    globals::SymbolTable,
    intern::Interns,
    parse::parse,
    resolver::resolve,
};

/// Runtime slot layout of one frame (see the resolver for how it is
/// computed). Capture *sources* are encoded in `MakeClosure` instructions;
/// frames only need the slot counts and the promoted cell slots.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameInfo {
    pub num_locals: u16,
    /// Parameter slots in declaration order.
    pub param_slots: Vec<u16>,
    /// Local slots that hold promoted capture cells. Sorted ascending.
    pub cell_slots: Vec<u16>,
}

impl FrameInfo {
    pub(crate) fn from_layout(layout: &FrameLayout) -> Self {
        Self {
            num_locals: layout.num_locals,
            param_slots: layout.param_slots.clone(),
            cell_slots: layout.cell_slots.clone(),
        }
    }
}

/// One compiled function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Function {
    /// Declared name for `func` statements, `None` for lambdas.
    pub name: Option<String>,
    pub code: Code,
    pub param_count: u16,
    pub frame: FrameInfo,
}

/// A compiled script, ready to run any number of times.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Program {
    source_name: String,
    pub(crate) module: Code,
    pub(crate) module_frame: FrameInfo,
    pub(crate) functions: Vec<Function>,
    pub(crate) interns: Interns,
    symbols: SymbolTable,
}

impl Program {
    /// Compiles source text into a program.
    ///
    /// # Errors
    /// Returns a [`crate::CompileError`] from the lexer, parser, resolver, or
    /// code generator.
    pub fn compile(source: &str, source_name: &str) -> CompileResult<Self> {
        let mut module = parse(source)?;
        resolve(&mut module)?;
        let mut interns = Interns::new();
        let (code, functions, module_frame) = compile_module(&module, &mut interns)?;
        Ok(Self {
            source_name: source_name.to_owned(),
            module: code,
            module_frame,
            functions,
            interns,
            symbols: SymbolTable::new(module.globals),
        })
    }

    /// The script name given at compile time, for diagnostics.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// The global symbol table: names the host can bind or persist.
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Serializes the compiled program to a compact binary form.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores a program serialized with [`Program::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        let mut program: Self = postcard::from_bytes(bytes)?;
        program.interns.rebuild_index();
        Ok(program)
    }

    /// Renders a disassembly of the module and every function.
    #[must_use]
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "module ({}):", self.source_name);
        out.push_str(&self.module.disassemble());
        for (i, function) in self.functions.iter().enumerate() {
            let name = function.name.as_deref().unwrap_or("<lambda>");
            let _ = writeln!(out, "\nfunction #{i} {name} ({} params):", function.param_count);
            out.push_str(&function.code.disassemble());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_snapshot_round_trip() {
        let program = Program::compile("init counter = 0\ncounter += 1\nsay counter", "test.yq").unwrap();
        assert_eq!(program.symbols().names(), ["counter"]);

        let bytes = program.dump().unwrap();
        let restored = Program::load(&bytes).unwrap();
        assert_eq!(restored.module, program.module);
        assert_eq!(restored.functions, program.functions);
    }

    #[test]
    fn disassemble_names_functions() {
        let program = Program::compile("func greet(name) say name", "test.yq").unwrap();
        let dis = program.disassemble();
        assert!(dis.contains("function #0 greet"));
    }
}
