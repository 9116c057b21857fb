//! Restricted pickle decoder.
//!
//! Ren'Py stores compiled scripts and archive indexes as pickle streams. This
//! module re-implements the subset of the wire protocol Ren'Py emits as a plain
//! stack machine and never runs host code: every class reference is checked
//! against an [`AllowList`] when it is resolved, and allowed classes only become
//! inert [`Object`] skeletons.
//!
//! - [`op`]     : opcode constants
//! - [`value`]  : the decoded value graph (`Value`, `Object`, `ClassTag`)
//! - [`allow`]  : allow-lists for scripts and archive indexes
//! - [`decode`] : the `Unpickler` stack machine
//! - [`asm`]    : `PickleWriter`, a protocol-2 assembler for fixtures and tests

pub mod allow;
pub mod asm;
pub mod decode;
pub mod op;
pub mod value;

pub use allow::{AllowList, Builtin};
pub use asm::PickleWriter;
pub use decode::{loads, Unpickler};
pub use value::{ClassTag, Object, Shared, Value};

use thiserror::Error;

use crate::CoreError;

/// Result alias for decoding.
pub type PickleResult<T> = std::result::Result<T, PickleError>;

/// Structural decode failures. All of them are fatal for the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode outside the supported subset (or a byte that is no opcode at all).
    #[error("unexpected opcode 0x{opcode:02x} at offset {offset}")]
    UnexpectedOpcode {
        /// Raw opcode byte.
        opcode: u8,
        /// Offset of the opcode.
        offset: usize,
    },
    /// GET of a memo id that was never PUT.
    #[error("memo miss: id {id} at offset {offset}")]
    MemoMiss {
        /// Requested memo id.
        id: u32,
        /// Offset of the GET opcode.
        offset: usize,
    },
    /// Pop from an empty operand stack.
    #[error("stack underflow at offset {offset}")]
    StackUnderflow {
        /// Offset of the opcode that popped.
        offset: usize,
    },
    /// An aggregate opcode ran without a pending MARK.
    #[error("no MARK pending at offset {offset}")]
    MarkNotFound {
        /// Offset of the opcode.
        offset: usize,
    },
    /// The stream ended before STOP.
    #[error("unexpected end of stream at offset {at}")]
    UnexpectedEof {
        /// Offset where more bytes were needed.
        at: u64,
    },
    /// Integer literal wider than 64 bits.
    #[error("integer literal too wide ({bytes} bytes) at offset {offset}")]
    IntegerOverflow {
        /// Encoded width.
        bytes: usize,
        /// Offset of the opcode.
        offset: usize,
    },
    /// Text payload is not valid UTF-8.
    #[error("invalid utf-8 at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the opcode.
        offset: usize,
    },
    /// Well-formed opcodes applied to the wrong operands.
    #[error("malformed stream at offset {offset}: {reason}")]
    Malformed {
        /// Offset of the opcode.
        offset: usize,
        /// Short description.
        reason: String,
    },
}

impl From<CoreError> for DecodeError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnexpectedEof { at, .. } | CoreError::LengthOverflow { at, .. } => DecodeError::UnexpectedEof { at },
        }
    }
}

/// Raised when the stream references a class outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// `module.name` is not allow-listed; nothing from it was instantiated.
    #[error("disallowed class {module}.{name}")]
    DisallowedClass {
        /// Requested module.
        module: String,
        /// Requested attribute.
        name: String,
    },
}

/// Either failure family of the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickleError {
    /// Structural failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Allow-list violation.
    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl From<CoreError> for PickleError {
    fn from(e: CoreError) -> Self { PickleError::Decode(e.into()) }
}
