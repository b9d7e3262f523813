//! A BASIC compiler and bytecode interpreter for memory-constrained
//! hosts (spec §1): a single-pass compiler (`compiler`) emits bytecode
//! directly into a handle-based managed heap (`heap`), which a small
//! stack interpreter (`vm`) then runs against a caller-supplied [`Host`]
//! for line I/O.
//!
//! The module layout mirrors the teacher's split of `ast.rs`/`vm.rs`/
//! `typechecker.rs`/`config.rs` into focused files rather than one
//! monolithic interpreter module.

pub mod compiler;
pub mod config;
pub mod error;
pub mod heap;
pub mod host;
pub mod intrinsics;
pub mod opcode;
pub mod repl;
pub mod scanner;
pub mod symtab;
pub mod types;
pub mod vm;

use error::{ParseError, RuntimeAbort};
use host::Host;

/// Either half of the pipeline can fail: compiling is a [`ParseError`],
/// running the compiled code is a [`RuntimeAbort`]. Combined so callers
/// of [`Session::compile_and_run`] have one error type to match on.
#[derive(thiserror::Error, Debug)]
pub enum ProgramError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeAbort),
}

impl ProgramError {
    /// Renders the way the REPL prints a failed line (spec §7:
    /// `error: <message>`), without distinguishing compile vs. run-time
    /// origin to the user.
    pub fn display_for_repl(&self) -> String {
        match self {
            ProgramError::Parse(e) => e.display_for_repl(),
            ProgramError::Runtime(e) => e.display_for_repl(),
        }
    }
}

/// A compiler bound to one heap, plus the interpreter that will run
/// whatever it compiles. Holding both together is what lets the REPL
/// (spec §5) compile and execute one line at a time against state left
/// over from the previous line — globals, function definitions, and
/// heap contents all persist across calls to [`compile_and_run`].
///
/// [`compile_and_run`]: Session::compile_and_run
pub struct Session {
    compiler: compiler::Compiler,
    vm: vm::Interpreter,
}

impl Session {
    pub fn new(config: config::Config) -> Result<Self, ParseError> {
        let heap = heap::ObjectHeap::new(config.heap_limits());
        Ok(Session { compiler: compiler::Compiler::new(heap)?, vm: vm::Interpreter::new(config.stack_capacity) })
    }

    /// Compiles `source` as a complete program and runs it to
    /// completion against `host`. Intended for one-shot script
    /// execution (`src/bin/basic.rs` run against a file); the REPL
    /// instead compiles and runs one line at a time through the same
    /// [`Compiler`](compiler::Compiler)/[`Interpreter`](vm::Interpreter)
    /// pair, which is why compiling and running are kept as separate
    /// steps here rather than fused into a single call.
    pub fn compile_and_run(&mut self, source: &str, host: &mut dyn Host) -> Result<vm::Outcome, ProgramError> {
        let entry = self.compiler.compile_program(source)?;
        Ok(self.vm.execute(&mut self.compiler.heap, host, entry)?)
    }

    /// Feeds one line to the underlying [`compiler::Compiler::compile_line`],
    /// for the REPL's line-at-a-time input model (spec §5/§6). Returns
    /// the finished `Code` object once a complete statement/block has
    /// been seen, or `None` while a block is still open.
    pub fn compile_line(&mut self, line: &str) -> Result<Option<heap::Handle>, ParseError> {
        self.compiler.compile_line(line)
    }

    /// See [`compiler::Compiler::discard_pending`].
    pub fn discard_pending(&mut self) {
        self.compiler.discard_pending()
    }

    /// Runs a `Code` object previously returned by [`compile_line`](Self::compile_line).
    pub fn execute(&mut self, entry: heap::Handle, host: &mut dyn Host) -> Result<vm::Outcome, RuntimeAbort> {
        self.vm.execute(&mut self.compiler.heap, host, entry)
    }
}

/// Compiles and runs `source` in a fresh [`Session`] built from
/// `config`, against `host`. The convenience entry point
/// `tests/scenarios.rs` and `src/bin/basic.rs`'s script mode use when
/// no REPL state needs to persist across calls.
pub fn compile_and_run(config: config::Config, source: &str, host: &mut dyn Host) -> Result<vm::Outcome, ProgramError> {
    Session::new(config)?.compile_and_run(source, host)
}
