// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

use itertools::Itertools;

use super::{Insr, InsrList, Mnemonic};

use std::fmt::{self, Display};

impl Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Writes the instruction back out as a line of assembly.
///
/// Instructions without a recognized mnemonic can't be written back out faithfully, so they are
/// written as `???`.
impl Display for Insr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label} ")?;
        }
        let Some(mnemonic) = self.mnemonic else {
            return write!(f, "???");
        };
        write!(f, "{mnemonic}")?;
        if mnemonic.takes_arg() {
            match &self.label_reference {
                Some(reference) => write!(f, " {reference}"),
                None => write!(f, " {}", self.value),
            }
        } else {
            Ok(())
        }
    }
}

impl Display for InsrList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.iter().format("\n"))
    }
}

#[cfg(test)]
mod tests {
    use crate::insr;

    #[test]
    fn insr_display() {
        assert_eq!(insr!(Hlt).to_string(), "HLT");
        assert_eq!(insr!(Dat -5).to_string(), "DAT -5");
        assert_eq!(insr!(start: Lda @ counter).to_string(), "start LDA counter");
        // an operand on an argument-less mnemonic is not meaningful
        assert_eq!(insr!(Out 12).to_string(), "OUT");
    }

    #[test]
    fn list_display() {
        let list = crate::InsrList::from(vec![insr!(Spushi 1), insr!(Out), insr!(Hlt)]);
        assert_eq!(list.to_string(), "SPUSHI 1\nOUT\nHLT\n");
    }
}
