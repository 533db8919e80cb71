// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! The instruction IR shared by the LMSM assembler and optimizer
//!
//! Assembly source is parsed line-by-line into an [`InsrList`] of [`Insr`] nodes. Each node keeps
//! its label definition, its [`Mnemonic`], and its operand, which is either a literal value or an
//! unresolved label reference. Labels aren't resolved until the list is emitted as machine code.
#![warn(missing_docs)]

use std::error::Error;
use std::fmt::{self, Display};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Range;
use std::str::FromStr;

pub use lmsm_core::{AsmError, AsmErrorKind, Word};

mod display_impls;
pub mod parsers;
pub mod util;

/// A small module that re-exports items useful when building or inspecting IR
pub mod prelude {
    pub use crate::{Insr, InsrList, Mnemonic};
    pub use lmsm_core::{AsmError, AsmErrorKind, Word};
}

macro_rules! mnemonics {
    {$($(#[$meta: meta])* $variant: ident = $name: literal),+ $(,)?} => {
        /// A recognized LMSM assembly mnemonic
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        #[allow(missing_docs, reason = "trivial")]
        pub enum Mnemonic {
            $($(#[$meta])* $variant,)+
        }

        impl Mnemonic {
            /// Every recognized mnemonic, in table order
            pub const ALL: &[Mnemonic] = &[$(Mnemonic::$variant,)+];

            /// The mnemonic as written in assembly source
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $name,)+
                }
            }
        }

        impl FromStr for Mnemonic {
            type Err = UnknownMnemonic;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Mnemonic::$variant),)+
                    _ => Err(UnknownMnemonic(s.to_owned())),
                }
            }
        }
    }
}

mnemonics! {
    /// Stack-relative store
    Ssta = "SSTA",
    /// Stack-relative load
    Slda = "SLDA",
    /// Grow the stack pointer upward, discarding slots
    Spadd = "SPADD",
    /// Move the stack pointer downward, reserving slots
    Spsub = "SPSUB",
    /// Halt
    Hlt = "HLT",
    /// Coffee break; another name for [`Hlt`](Mnemonic::Hlt)
    Cob = "COB",
    Add = "ADD",
    Sub = "SUB",
    /// Store the accumulator
    Sta = "STA",
    /// Load immediate
    Ldi = "LDI",
    /// Load from memory
    Lda = "LDA",
    /// Branch always
    Bra = "BRA",
    /// Branch if zero
    Brz = "BRZ",
    /// Branch if positive or zero
    Brp = "BRP",
    Inp = "INP",
    Out = "OUT",
    /// Jump and link
    Jal = "JAL",
    Ret = "RET",
    Spush = "SPUSH",
    Spop = "SPOP",
    Sdup = "SDUP",
    Sdrop = "SDROP",
    Sswap = "SSWAP",
    Sadd = "SADD",
    Ssub = "SSUB",
    Smul = "SMUL",
    Sdiv = "SDIV",
    Smax = "SMAX",
    Smin = "SMIN",
    Scmpgt = "SCMPGT",
    Scmplt = "SCMPLT",
    Snot = "SNOT",
    /// Push the return address onto the return stack
    Rpush = "RPUSH",
    /// Pop the return address off of the return stack
    Rpop = "RPOP",
    /// Raw data, emitted verbatim
    Dat = "DAT",
    /// `LDI v` followed by `JAL`
    Call = "CALL",
    /// `LDI v` followed by `SPUSH`
    Spushi = "SPUSHI",
    /// Does nothing; used as a placeholder by the optimizer
    Nop = "NOP",
}

impl Mnemonic {
    /// Whether the mnemonic requires an operand
    #[must_use]
    pub const fn takes_arg(self) -> bool {
        matches!(
            self,
            Mnemonic::Ssta
                | Mnemonic::Slda
                | Mnemonic::Spadd
                | Mnemonic::Spsub
                | Mnemonic::Add
                | Mnemonic::Sub
                | Mnemonic::Sta
                | Mnemonic::Ldi
                | Mnemonic::Lda
                | Mnemonic::Bra
                | Mnemonic::Brz
                | Mnemonic::Brp
                | Mnemonic::Call
                | Mnemonic::Spushi
                | Mnemonic::Dat
        )
    }

    /// The number of machine words the mnemonic assembles into
    ///
    /// ```
    /// use lmsm_ir::Mnemonic;
    /// assert_eq!(Mnemonic::Spushi.width(), 2);
    /// assert_eq!(Mnemonic::Call.width(), 2);
    /// assert_eq!(Mnemonic::Add.width(), 1);
    /// ```
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Mnemonic::Call | Mnemonic::Spushi => 2,
            _ => 1,
        }
    }
}

/// A string that isn't in the mnemonic table
#[derive(Debug, PartialEq, Clone)]
pub struct UnknownMnemonic(pub String);

impl Display for UnknownMnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown instruction {:?}", self.0)
    }
}

impl Error for UnknownMnemonic {}

/// A single parsed, unresolved instruction
///
/// Exactly one of [`value`](Insr::value) and [`label_reference`](Insr::label_reference) is
/// meaningful for mnemonics that [take an argument](Mnemonic::takes_arg). The mnemonic is
/// [`None`] only on lines where it was missing or not recognized, in which case
/// [`error`](Insr::error) says why.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct Insr {
    /// The label defined on this line, if any
    pub label: Option<String>,
    /// The instruction's mnemonic
    pub mnemonic: Option<Mnemonic>,
    /// The literal operand
    pub value: Word,
    /// The operand, if it names a label rather than a number
    pub label_reference: Option<String>,
    /// The parse error for this line, if any
    pub error: Option<AsmError>,
    /// The byte range within the source that this instruction was parsed from
    pub span: Option<Range<usize>>,
}

impl Insr {
    /// Create an instruction with no operand
    #[must_use]
    pub fn new(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic: Some(mnemonic),
            ..Self::default()
        }
    }

    /// Create an instruction with a literal operand
    #[must_use]
    pub fn with_value(mnemonic: Mnemonic, value: Word) -> Self {
        Self {
            value,
            ..Self::new(mnemonic)
        }
    }

    /// Create an instruction whose operand is a label reference
    #[must_use]
    pub fn with_reference(mnemonic: Mnemonic, label: impl Into<String>) -> Self {
        Self {
            label_reference: Some(label.into()),
            ..Self::new(mnemonic)
        }
    }

    /// Set the label defined by this instruction
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether the instruction's mnemonic is `mnemonic`
    #[must_use]
    pub fn is(&self, mnemonic: Mnemonic) -> bool {
        self.mnemonic == Some(mnemonic)
    }

    /// The number of machine words this instruction will be emitted as
    #[must_use]
    pub fn width(&self) -> usize {
        self.mnemonic.map_or(1, Mnemonic::width)
    }
}

/// An ordered list of [`Insr`]s, in program order
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct InsrList(Vec<Insr>);

impl InsrList {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction
    pub fn push(&mut self, insr: Insr) {
        self.0.push(insr);
    }

    /// The number of instructions in the list
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the instructions
    pub fn iter(&self) -> std::slice::Iter<'_, Insr> {
        self.0.iter()
    }

    /// View the instructions as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[Insr] {
        &self.0
    }

    /// Take the underlying [`Vec`] of [`Insr`]s
    #[must_use]
    pub fn into_inner(self) -> Vec<Insr> {
        self.0
    }

    /// Whether any instruction carries a parse error
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|insr| insr.error.is_some())
    }

    /// Iterate over the per-instruction errors, in program order
    pub fn errors(&self) -> impl Iterator<Item = &AsmError> {
        self.0.iter().filter_map(|insr| insr.error.as_ref())
    }

    /// The total number of machine words the list occupies once emitted
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.0.iter().map(Insr::width).sum()
    }

    /// Hash every field of every instruction
    ///
    /// Two lists with the same structural hash are treated as identical by the optimizer.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<Vec<Insr>> for InsrList {
    fn from(v: Vec<Insr>) -> Self {
        Self(v)
    }
}

impl FromIterator<Insr> for InsrList {
    fn from_iter<T: IntoIterator<Item = Insr>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for InsrList {
    type Item = Insr;
    type IntoIter = std::vec::IntoIter<Insr>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a InsrList {
    type Item = &'a Insr;
    type IntoIter = std::slice::Iter<'a, Insr>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for InsrList {
    type Output = Insr;
    fn index(&self, i: usize) -> &Self::Output {
        &self.0[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_table_round_trips() {
        for &m in Mnemonic::ALL {
            assert_eq!(m.name().parse::<Mnemonic>(), Ok(m));
        }
        assert_eq!(
            "FOO".parse::<Mnemonic>(),
            Err(UnknownMnemonic(String::from("FOO")))
        );
        // the table is case-sensitive
        assert!("add".parse::<Mnemonic>().is_err());
    }

    #[test]
    fn arg_mnemonics() {
        let with_args: Vec<&str> = Mnemonic::ALL
            .iter()
            .filter(|m| m.takes_arg())
            .map(|m| m.name())
            .collect();
        assert_eq!(
            with_args,
            [
                "SSTA", "SLDA", "SPADD", "SPSUB", "ADD", "SUB", "STA", "LDI", "LDA", "BRA", "BRZ",
                "BRP", "DAT", "CALL", "SPUSHI"
            ]
        );
    }

    #[test]
    fn hash_sees_every_field() {
        let base = InsrList::from(vec![Insr::with_value(Mnemonic::Ldi, 5)]);
        let relabeled = InsrList::from(vec![Insr::with_value(Mnemonic::Ldi, 5).labeled("x")]);
        let revalued = InsrList::from(vec![Insr::with_value(Mnemonic::Ldi, 6)]);
        let mut errored = base.clone();
        errored.0[0].error = Some(AsmError::new(AsmErrorKind::BadArg, "nope"));

        assert_eq!(base.structural_hash(), base.clone().structural_hash());
        assert_ne!(base.structural_hash(), relabeled.structural_hash());
        assert_ne!(base.structural_hash(), revalued.structural_hash());
        assert_ne!(base.structural_hash(), errored.structural_hash());
    }
}
