//! # tcforth
//!
//! A small threaded-code forth VM.
//!
//! Everything the VM knows lives in one linear [`Heap`](heap::Heap): the
//! dictionary is a linked list of headers stored there, and a colon
//! definition's body is just a run of heap cells, each holding the address of
//! another word's codeword. The inner interpreter fetches those addresses one
//! at a time and either calls a native function or *enters* the composite
//! word, saving its resume point on the return stack.
//!
//! Only the natives and the `quit` loop are set up from Rust. `:` and `;` are
//! defined by interpreting ordinary forth source at startup, and the control
//! words (`if`, `begin`, ...) are then written with `:` itself.
//!
//! ```rust
//! # use tcforth::testutil::blocking_runtest;
//! #
//! # blocking_runtest(r#"
//! > : double dup + ;
//! > 5 double .
//! < 10 ok.
//! > : five 5 ;
//! > five five + .
//! < 10 ok.
//! # "#)
//! ```

#![cfg_attr(not(any(test, feature = "use-std")), no_std)]

extern crate alloc;

pub mod dictionary;
pub mod heap;
pub mod input;
pub mod output;
pub mod params;
pub mod stack;
pub mod vm;
pub mod word;

#[cfg(any(test, feature = "use-std"))]
pub mod testutil;

use alloc::string::String;

pub use crate::{
    params::ForthParams,
    vm::{Forth, Halt, WordFunc},
    word::Word,
};
use crate::{
    heap::HeapError, input::InputError, output::OutputError, stack::StackError, word::Addr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Compile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    HeapOverflow { requested: usize, free: usize },
    HeapOutOfBounds { addr: Addr, len: usize },
    DataStackUnderflow,
    DataStackOverflow,
    ReturnStackUnderflow,
    ReturnStackOverflow,
    UnknownWordOrLiteral(String),
    InterpretingCompileOnlyWord(String),
    BadCodeword(i64),
    WordNotInDict(String),
    WordTooLong { len: usize, max: usize },
    EmptyName,
    NameTooLong(usize),
    NoLatestWord,
    DivideByZero,
    WordToUsizeInvalid(i64),
    UsizeToWordInvalid(usize),
    Output(OutputError),
    Input(InputError),
    Halted,
}

impl Error {
    /// Recoverable errors are reported and interpretation carries on with
    /// the next token. Everything else faults the VM.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownWordOrLiteral(_) | Error::InterpretingCompileOnlyWord(_)
        )
    }

    pub(crate) fn data_stack(se: StackError) -> Self {
        match se {
            StackError::StackEmpty => Error::DataStackUnderflow,
            StackError::StackFull => Error::DataStackOverflow,
        }
    }

    pub(crate) fn return_stack(se: StackError) -> Self {
        match se {
            StackError::StackEmpty => Error::ReturnStackUnderflow,
            StackError::StackFull => Error::ReturnStackOverflow,
        }
    }
}

impl From<HeapError> for Error {
    fn from(he: HeapError) -> Self {
        match he {
            HeapError::Overflow { requested, free } => Error::HeapOverflow { requested, free },
            HeapError::OutOfBounds { addr, len } => Error::HeapOutOfBounds { addr, len },
        }
    }
}

impl From<OutputError> for Error {
    fn from(oe: OutputError) -> Self {
        Error::Output(oe)
    }
}

impl From<InputError> for Error {
    fn from(ie: InputError) -> Self {
        Error::Input(ie)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::HeapOverflow { requested, free } => write!(
                f,
                "heap overflow: {requested} bytes requested, {free} bytes free"
            ),
            Error::HeapOutOfBounds { addr, len } => {
                write!(f, "heap access out of bounds: {len} bytes at {addr}")
            }
            Error::DataStackUnderflow => f.write_str("data stack underflow"),
            Error::DataStackOverflow => f.write_str("data stack overflow"),
            Error::ReturnStackUnderflow => f.write_str("return stack underflow"),
            Error::ReturnStackOverflow => f.write_str("return stack overflow"),
            Error::UnknownWordOrLiteral(w) => write!(f, "not a word or literal: {w:?}"),
            Error::InterpretingCompileOnlyWord(w) => {
                write!(f, "{w:?} can only be used inside a definition")
            }
            Error::BadCodeword(c) => write!(f, "not a codeword: {c:#x}"),
            Error::WordNotInDict(w) => write!(f, "{w:?} is not in the dictionary"),
            Error::WordTooLong { len, max } => {
                write!(f, "word of {len} bytes does not fit the {max} byte word buffer")
            }
            Error::EmptyName => f.write_str("dictionary names can't be empty"),
            Error::NameTooLong(len) => write!(f, "name of {len} bytes is too long"),
            Error::NoLatestWord => f.write_str("the dictionary is empty"),
            Error::DivideByZero => f.write_str("division by zero"),
            Error::WordToUsizeInvalid(w) => write!(f, "{w} is not a valid address"),
            Error::UsizeToWordInvalid(u) => write!(f, "{u} does not fit in a cell"),
            Error::Output(OutputError::OutputFull) => f.write_str("output buffer full"),
            Error::Input(InputError::InputTooLong { len, capacity }) => write!(
                f,
                "input of {len} bytes does not fit the {capacity} byte input buffer"
            ),
            Error::Halted => f.write_str("the VM has halted"),
        }
    }
}

#[cfg(feature = "use-std")]
impl std::error::Error for Error {}

trait ReplaceErr {
    type OK;
    fn replace_err<NE>(self, t: NE) -> Result<Self::OK, NE>;
}

impl<T, OE> ReplaceErr for Result<T, OE> {
    type OK = T;
    #[inline]
    fn replace_err<NE>(self, e: NE) -> Result<Self::OK, NE> {
        match self {
            Ok(t) => Ok(t),
            Err(_e) => Err(e),
        }
    }
}
