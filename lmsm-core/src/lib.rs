// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Core types used throughout the LMSM workspace
#![warn(missing_docs)]

use std::error::Error;
use std::fmt::{self, Display};

/// A single LMSM machine word
///
/// Every memory cell, the accumulator, and every register holds one of these. Values are kept
/// within [`WORD_MIN`]`..=`[`WORD_MAX`] by [`clamp`].
pub type Word = i32;

/// The smallest value a [`Word`] may hold
pub const WORD_MIN: Word = -999;
/// The largest value a [`Word`] may hold
pub const WORD_MAX: Word = 999;

/// Number of cells in the machine's memory image
pub const MEMORY_SIZE: usize = 200;
/// Number of cells available to assembled code and data (addresses `0..100`)
pub const CODE_CAPACITY: usize = 100;
/// Initial value of the stack pointer; one past the top of memory, meaning "empty"
pub const STACK_EMPTY: Word = 200;
/// Lowest address the value stack may grow down into
pub const STACK_LIMIT: Word = 100;
/// Initial value of the return stack pointer, which grows upward from here
pub const RETURN_STACK_EMPTY: Word = 99;
/// Maximum size in bytes of the machine's output buffer
pub const OUTPUT_CAPACITY: usize = 4000;

/// Saturate `n` into the range of a [`Word`]
///
/// ```
/// use lmsm_core::clamp;
/// assert_eq!(clamp(1000), 999);
/// assert_eq!(clamp(-12_345), -999);
/// assert_eq!(clamp(42), 42);
/// ```
#[must_use]
pub fn clamp(n: i64) -> Word {
    // the clamped value always fits
    #[allow(clippy::cast_possible_truncation)]
    let clamped = n.clamp(i64::from(WORD_MIN), i64::from(WORD_MAX)) as Word;
    clamped
}

/// The run state of a machine
///
/// A machine starts out [Ready](Status::Ready), becomes [Running](Status::Running) once it's
/// told to run, and ends up [Halted](Status::Halted) after a halt instruction or a fatal error.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub enum Status {
    /// Freshly initialized, nothing has run yet
    #[default]
    Ready,
    /// Executing instructions
    Running,
    /// Stopped; steps are no-ops from here on
    Halted,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => write!(f, "ready"),
            Status::Running => write!(f, "running"),
            Status::Halted => write!(f, "halted"),
        }
    }
}

/// A fatal runtime error that halted a machine
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum MachineError {
    /// A value stack or return stack operation violated its bounds, or a stack division divided
    /// by zero
    BadStack,
    /// The output buffer had no room left for an `OUT`
    OutputExhausted,
    /// The fetched word does not decode to any instruction
    UnknownInstruction,
}

impl Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineError::BadStack => write!(f, "bad stack"),
            MachineError::OutputExhausted => write!(f, "output exhausted"),
            MachineError::UnknownInstruction => write!(f, "unknown instruction"),
        }
    }
}

impl Error for MachineError {}

/// The category of an [`AsmError`]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum AsmErrorKind {
    /// The assembled program does not fit in the output
    TooLarge,
    /// A label reference has no matching definition
    BadLabel,
    /// An operand is missing or out of range
    BadArg,
    /// The mnemonic is not recognized
    BadInsr,
}

impl Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmErrorKind::TooLarge => write!(f, "too large"),
            AsmErrorKind::BadLabel => write!(f, "bad label"),
            AsmErrorKind::BadArg => write!(f, "bad argument"),
            AsmErrorKind::BadInsr => write!(f, "bad instruction"),
        }
    }
}

/// An error that occured while assembling LMSM assembly
///
/// Parse errors ([`BadInsr`], [`BadArg`]) are attached to the instruction they came from, while
/// emit errors ([`BadLabel`], [`TooLarge`]) are returned on their own.
///
/// [`BadInsr`]: AsmErrorKind::BadInsr
/// [`BadArg`]: AsmErrorKind::BadArg
/// [`BadLabel`]: AsmErrorKind::BadLabel
/// [`TooLarge`]: AsmErrorKind::TooLarge
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct AsmError {
    /// What went wrong
    pub kind: AsmErrorKind,
    /// A human-readable description of the problem
    pub message: String,
}

impl AsmError {
    /// Create a new [`AsmError`]
    pub fn new(kind: AsmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for AsmError {}
