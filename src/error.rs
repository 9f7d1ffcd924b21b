// src/error.rs
//! Errors surfaced while constructing a calling convention.
//!
//! Only malformed inputs end up here. Misuse of a convention that was built
//! successfully (asking for the register of a stack argument, walking past the
//! last parameter, ...) is a bug in the code generator and panics instead.

use crate::arch::InstructionSet;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no calling convention is modelled for instruction set {0}")]
    UnsupportedInstructionSet(InstructionSet),
    #[error("empty shorty")]
    EmptyShorty,
    #[error("invalid character {ch:?} at position {position} of shorty {shorty:?}")]
    InvalidShortyChar {
        shorty: String,
        position: usize,
        ch: char,
    },
    #[error("void parameter at position {position} of shorty {shorty:?}")]
    VoidParameter { shorty: String, position: usize },
    #[error("displacement {given} would move stack arguments out of the outgoing area (expected {min}..={max})")]
    Displacement { given: usize, min: usize, max: usize },
    #[error("unknown instruction set {0:?}")]
    UnknownInstructionSet(String),
    #[error("cannot load method batch {path}: {message}")]
    Batch { path: String, message: String },
    #[error("cannot write report: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, Error>;
