// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Recording of executed instructions
//!
//! Start a trace with [`Machine::start_trace`], and collect it with [`Machine::end_trace`]:
//!
//! ```
//! use lmsm::prelude::*;
//! let mut machine = Machine::new();
//! machine.load(&[405, 920, 0]).unwrap();
//! machine.start_trace();
//! machine.run().unwrap();
//! let trace = machine.end_trace().unwrap();
//!
//! assert_eq!(trace.len(), 3);
//! assert_eq!(
//!     trace.to_string(),
//!     "  0:  405  LDI 5    acc=5 sp=200\n  1:  920  SPUSH    acc=5 sp=199\n  2:    0  HLT      acc=5 sp=199\n"
//! );
//! ```
//!
//! [`Machine::start_trace`]: crate::Machine::start_trace
//! [`Machine::end_trace`]: crate::Machine::end_trace

use super::{Instruction, MachineError, Word};
use std::fmt::{self, Display};

/// A single executed step
#[derive(Debug, PartialEq, Clone)]
pub struct TraceEvent {
    /// The address the word was fetched from
    pub address: Word,
    /// The fetched word, or [`None`] if the address was outside of memory
    pub word: Option<Word>,
    /// The decoded instruction, if the word was valid
    pub instruction: Option<Instruction>,
    /// The accumulator after the step
    pub accumulator: Word,
    /// The stack pointer after the step
    pub stack_pointer: Word,
    /// The error the step halted with, if any
    pub fault: Option<MachineError>,
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.word.map_or_else(|| String::from("-"), |w| w.to_string());
        let instruction = self
            .instruction
            .map_or_else(|| String::from("???"), |i| i.to_string());
        write!(
            f,
            "{:>3}: {word:>4}  {instruction:<8} acc={} sp={}",
            self.address, self.accumulator, self.stack_pointer
        )?;
        if let Some(fault) = self.fault {
            write!(f, " ({fault})")?;
        }
        Ok(())
    }
}

/// The steps executed while tracing was active, in order
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Trace(Vec<TraceEvent>);

impl Trace {
    pub(crate) fn push(&mut self, event: TraceEvent) {
        self.0.push(event);
    }

    /// The recorded events
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.0
    }

    /// The number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no events were recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.0 {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn faults_are_recorded() {
        let mut machine = Machine::new();
        machine.load(&[921]).unwrap();
        machine.start_trace();
        assert_eq!(machine.run(), Err(MachineError::BadStack));
        let trace = machine.end_trace().unwrap();
        assert_eq!(trace.events()[0].fault, Some(MachineError::BadStack));
        assert_eq!(
            trace.to_string(),
            "  0:  921  SPOP     acc=0 sp=200 (bad stack)\n"
        );
    }

    #[test]
    fn tracing_is_not_state() {
        let mut traced = Machine::new();
        traced.start_trace();
        assert_eq!(traced, Machine::new());
        assert!(format!("{traced:?}").contains("tracing: true"));
        assert!(traced.end_trace().unwrap().is_empty());
        assert!(traced.end_trace().is_none());
    }
}
