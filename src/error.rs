//! Simulation error categories.

use std::fmt;

use crate::bitvalue::{ParseBitValueError, WidthMismatch, WidthRequired};

/// Everything that can go fatally wrong while building or running a circuit.
///
/// Errors surface up the call stack without recovery; the attached logger
/// receives a FATAL record before a run-loop failure propagates.
/// Out-of-range memory access is deliberately absent from the run path: it
/// is a logged warning (reads return null, writes are dropped) and only
/// appears here for the direct memory-access API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A loader or the netlist builder could not interpret its input.
    ParseError(String),
    /// A loader or the netlist builder met an element kind it does not know.
    UnsupportedElement(String),
    /// An operation was attempted across mismatched bus or value widths.
    WidthMismatch {
        /// Width of the left operand or the expected width.
        left: u32,
        /// Width of the right operand or the observed width.
        right: u32,
        /// Where the mismatch was observed.
        context: String,
    },
    /// `run` was given labels or indices that are not in the circuit.
    BadInput(String),
    /// A splitter's wide and narrow sides disagree at equal timestamps.
    SplitterContention {
        /// Label or id of the offending splitter.
        element: String,
    },
    /// The scheduler exceeded its step limit without stabilizing.
    StepLimitExceeded {
        /// The limit that was hit.
        limit: u64,
    },
    /// A direct memory access fell outside the element's capacity.
    MemoryOutOfRange {
        /// Label of the memory element.
        element: String,
        /// The offending address.
        address: u64,
        /// The element's capacity in words.
        capacity: u64,
    },
    /// A circuit was constructed with two elements sharing a label.
    DuplicateLabel(String),
}

impl SimError {
    /// Convenience constructor tagging a width mismatch with its context.
    pub fn width_mismatch(err: WidthMismatch, context: impl Into<String>) -> Self {
        SimError::WidthMismatch { left: err.left, right: err.right, context: context.into() }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::ParseError(msg) => write!(f, "parse error: {msg}"),
            SimError::UnsupportedElement(kind) => write!(f, "unsupported element kind: {kind}"),
            SimError::WidthMismatch { left, right, context } => {
                write!(f, "width mismatch in {context}: {left} != {right}")
            }
            SimError::BadInput(msg) => write!(f, "bad input: {msg}"),
            SimError::SplitterContention { element } => {
                write!(f, "splitter contention: both sides of {element} driven to conflicting values at the same timestamp")
            }
            SimError::StepLimitExceeded { limit } => {
                write!(f, "circuit did not stabilize within {limit} scheduler steps")
            }
            SimError::MemoryOutOfRange { element, address, capacity } => {
                write!(f, "address {address} out of range for memory {element} (capacity {capacity})")
            }
            SimError::DuplicateLabel(label) => write!(f, "duplicate element label: {label}"),
        }
    }
}
impl std::error::Error for SimError {}

impl From<ParseBitValueError> for SimError {
    fn from(err: ParseBitValueError) -> Self {
        SimError::ParseError(err.to_string())
    }
}
impl From<WidthRequired> for SimError {
    fn from(err: WidthRequired) -> Self {
        SimError::ParseError(err.to_string())
    }
}
impl From<WidthMismatch> for SimError {
    fn from(err: WidthMismatch) -> Self {
        SimError::WidthMismatch { left: err.left, right: err.right, context: "value operation".into() }
    }
}
