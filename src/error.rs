//! Error kinds for the compiler and interpreter (spec §7).
//!
//! Four non-overlapping categories: `ParseError` (compile time),
//! `HeapError` (the object heap), `RuntimeAbort` (the interpreter) and
//! `HostError` (callbacks injected by the embedder). Each implements
//! `std::error::Error` via `thiserror`, matching the idiom carried by
//! `thiserror` across the retrieval pack (`raya-parser`, `raya-engine`,
//! `raya-core`, ...) rather than hand-rolled `Display` impls.

use thiserror::Error;

/// Compile-time errors: syntax, unterminated blocks, undefined labels,
/// type mismatches, unknown identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("expecting END IF")]
    ExpectingEndIf,
    #[error("expecting NEXT")]
    ExpectingNext,
    #[error("expecting LOOP")]
    ExpectingLoop,
    #[error("undefined label '{0}'")]
    UndefinedLabel(String),
    #[error("type mismatch")]
    TypeMismatch,
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("redefined symbol '{0}'")]
    Redefined(String),
    #[error("functions must precede or follow the main code")]
    FunctionPlacement,
    #[error("nested functions are not supported")]
    NestedFunction,
    #[error("expected {0}")]
    Expected(String),
    #[error("too many arguments")]
    TooManyArguments,
    #[error("wrong number of arguments")]
    ArgumentCount,
    #[error("expecting ENDFN")]
    ExpectingEndFn,
    #[error("return type does not match function's declared type")]
    ReturnTypeMismatch,
    #[error("insufficient memory")]
    OutOfMemory,
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// Errors from the managed object heap (spec §4.1).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    #[error("out of heap space")]
    HeapFull,
    #[error("out of heap handles")]
    HandleExhausted,
    #[error("wrong object kind")]
    WrongKind,
}

/// Errors that unwind the interpreter to its error target (spec §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeAbort {
    #[error("array subscript error: {0}")]
    ArraySubscript(i32),
    #[error("string index range error: {0}")]
    StringIndexRange(i32),
    #[error("opcode error: {0}")]
    Opcode(u8),
    #[error("stack overflow")]
    StackOverflow,
    #[error("not a code object: {0:?}")]
    NotCodeObject(crate::heap::Handle),
    #[error("wrong number of arguments")]
    ArgumentCount,
    #[error("wrong type")]
    WrongType,
    #[error("host error: {0}")]
    Host(String),
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl From<HostError> for RuntimeAbort {
    fn from(e: HostError) -> Self {
        RuntimeAbort::Host(e.to_string())
    }
}

/// I/O failures surfaced from host callbacks (spec §6); never seen by
/// the BASIC program itself.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl RuntimeAbort {
    /// Render the way the original VM's `Abort` prefixes messages
    /// (spec §7: `error: <message>`).
    pub fn display_for_repl(&self) -> String {
        format!("error: {self}")
    }
}

impl ParseError {
    pub fn display_for_repl(&self) -> String {
        format!("error: {self}")
    }
}
