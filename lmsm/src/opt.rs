// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Peephole optimization of [`InsrList`]s
//!
//! Each pass is a function from one [`InsrList`] to a new one. [`optimize`] runs every pass in
//! turn, over and over, until a whole round leaves the list unchanged.
//!
//! When a pass removes an instruction, its label (and parse error, if any) move onto the next
//! instruction that survives. If that instruction already has a label, references to the removed
//! label are rewritten to point at the existing one instead. If nothing survives after it, a `NOP`
//! is appended to hold it.
//!
//! Only the first definition of a label is ever referenced, so later duplicates of it are not
//! carried anywhere.
//!
//! An [`Insr`] holds at most one error, so an instruction that survives keeps its own error, and
//! of several errors carried onto it, only the first is kept. A list with errors therefore always
//! still has at least one after optimizing, which is enough to stop [`emit`](crate::asm::emit).
//!
//! ```
//! use lmsm::asm::parse;
//! use lmsm::opt::optimize;
//!
//! let list = parse("top SPUSH\nSPOP\nSPUSHI 5\nSPOP\nBRA top");
//! assert_eq!(optimize(&list).to_string(), "top LDI 5\nBRA top\n");
//! ```

use std::collections::{HashMap, HashSet};

use super::{AsmError, Insr, InsrList, Mnemonic};

/// Builds the output of a pass, tracking labels and errors of removed instructions
#[derive(Debug, Default)]
struct Rewriter {
    output: Vec<Insr>,
    carried_label: Option<String>,
    carried_error: Option<AsmError>,
    substitutions: HashMap<String, String>,
    defined: HashSet<String>,
}

impl Rewriter {
    /// `insr`'s label, if this is its first definition
    fn first_definition(&mut self, insr: &Insr) -> Option<String> {
        insr.label
            .as_ref()
            .filter(|label| self.defined.insert((*label).clone()))
            .cloned()
    }

    /// Remove `insr`, carrying its label and error forward
    fn remove(&mut self, insr: &Insr) {
        if let Some(label) = self.first_definition(insr) {
            match &self.carried_label {
                Some(carried) => {
                    self.substitutions.insert(label, carried.clone());
                }
                None => self.carried_label = Some(label),
            }
        }
        if self.carried_error.is_none() {
            self.carried_error.clone_from(&insr.error);
        }
    }

    /// Keep `insr`, attaching anything carried from removed instructions
    fn keep(&mut self, mut insr: Insr) {
        let own_label = self.first_definition(&insr);
        if let Some(carried) = self.carried_label.take() {
            match own_label {
                Some(existing) => {
                    self.substitutions.insert(carried, existing);
                }
                // a duplicate label is never referenced, so the carried one replaces it
                None => insr.label = Some(carried),
            }
        }
        // an instruction keeps its own error over a carried one
        let carried_error = self.carried_error.take();
        if insr.error.is_none() {
            insr.error = carried_error;
        }
        self.output.push(insr);
    }

    /// Follow substitutions from `label` until reaching one that stayed put
    fn resolve<'a>(&'a self, mut label: &'a str) -> &'a str {
        // each label is substituted at most once per pass, so this can't loop more than this
        for _ in 0..=self.substitutions.len() {
            match self.substitutions.get(label) {
                Some(next) => label = next,
                None => break,
            }
        }
        label
    }

    fn finish(mut self) -> InsrList {
        if self.carried_label.is_some() || self.carried_error.is_some() {
            let placeholder = Insr {
                label: self.carried_label.take(),
                error: self.carried_error.take(),
                ..Insr::new(Mnemonic::Nop)
            };
            self.output.push(placeholder);
        }

        if self.substitutions.is_empty() {
            return InsrList::from(self.output);
        }

        let resolved: Vec<Option<String>> = self
            .output
            .iter()
            .map(|insr| {
                insr.label_reference
                    .as_deref()
                    .map(|label| self.resolve(label).to_owned())
            })
            .collect();
        self.output
            .into_iter()
            .zip(resolved)
            .map(|(insr, label_reference)| Insr {
                label_reference,
                ..insr
            })
            .collect()
    }
}

/// Remove each adjacent `SPUSH`, `SPOP` or `SPOP`, `SPUSH` pair
///
/// ```
/// use lmsm::asm::parse;
/// use lmsm::opt::push_pop_elimination;
/// let list = parse("INP\nSPUSH\nSPOP\nSPOP\nSPUSH\nOUT");
/// assert_eq!(push_pop_elimination(&list).to_string(), "INP\nOUT\n");
/// ```
#[must_use]
pub fn push_pop_elimination(list: &InsrList) -> InsrList {
    let mut rewriter = Rewriter::default();
    let mut rest = list.as_slice();
    while !rest.is_empty() {
        rest = match rest {
            [a, b, tail @ ..]
                if (a.is(Mnemonic::Spush) && b.is(Mnemonic::Spop))
                    || (a.is(Mnemonic::Spop) && b.is(Mnemonic::Spush)) =>
            {
                rewriter.remove(a);
                rewriter.remove(b);
                tail
            }
            [a, tail @ ..] => {
                rewriter.keep(a.clone());
                tail
            }
            [] => rest,
        };
    }
    rewriter.finish()
}

/// Replace each `SPUSHI v` immediately followed by `SPOP` with `LDI v`
///
/// ```
/// use lmsm::asm::parse;
/// use lmsm::opt::pushi_pop_fusion;
/// let list = parse("SPUSHI 12\nSPOP\nSPUSHI counter\nSPOP\nOUT");
/// assert_eq!(pushi_pop_fusion(&list).to_string(), "LDI 12\nLDI counter\nOUT\n");
/// ```
#[must_use]
pub fn pushi_pop_fusion(list: &InsrList) -> InsrList {
    let mut rewriter = Rewriter::default();
    let mut rest = list.as_slice();
    while !rest.is_empty() {
        rest = match rest {
            [a, b, tail @ ..] if a.is(Mnemonic::Spushi) && b.is(Mnemonic::Spop) => {
                rewriter.keep(Insr {
                    mnemonic: Some(Mnemonic::Ldi),
                    span: a.span.clone().zip(b.span.clone()).map(|(a, b)| a.start..b.end),
                    ..a.clone()
                });
                rewriter.remove(b);
                tail
            }
            [a, tail @ ..] => {
                rewriter.keep(a.clone());
                tail
            }
            [] => rest,
        };
    }
    rewriter.finish()
}

/// The passes run by [`optimize`], in order
pub const PASSES: [fn(&InsrList) -> InsrList; 2] = [push_pop_elimination, pushi_pop_fusion];

/// Run every pass in [`PASSES`] repeatedly, until the list stops changing
///
/// Changes are detected by comparing the [structural hash](InsrList::structural_hash) of the
/// list before and after each round.
#[must_use]
pub fn optimize(list: &InsrList) -> InsrList {
    let mut current = list.clone();
    loop {
        let before = current.structural_hash();
        for pass in PASSES {
            current = pass(&current);
        }
        if current.structural_hash() == before {
            return current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{emit, parse};
    use crate::prelude::*;
    use crate::{AsmErrorKind, CODE_CAPACITY};
    use lmsm_ir::insr;

    fn list(insrs: Vec<Insr>) -> InsrList {
        InsrList::from(insrs)
    }

    #[test]
    fn pair_removal_shrinks_by_two() {
        let before = parse("LDI 7\nSPUSH\nSPOP\nSTA 99\nOUT\nHLT");
        let after = optimize(&before);
        assert_eq!(after.len(), before.len() - 2);

        let run = |list: &InsrList| {
            let code = emit(list, CODE_CAPACITY).unwrap();
            Machine::exec(&code).unwrap()
        };
        let (slow, fast) = (run(&before), run(&after));
        assert_eq!(slow.accumulator, fast.accumulator);
        assert_eq!(slow.output(), fast.output());
        assert_eq!(slow.stack_pointer, fast.stack_pointer);
        assert_eq!(slow[99], 7);
        assert_eq!(slow[99], fast[99]);
    }

    #[test]
    fn idempotent() {
        let src = "SPUSHI 1\nSPUSH\nSPOP\nSPOP\nx SPUSH\nSPOP\nOUT\nBRA x";
        let once = optimize(&parse(src));
        assert_eq!(optimize(&once), once);
    }

    #[test]
    fn reaches_fixed_point_across_passes() {
        // fusion leaves the surrounding push and pop alone
        let before = list(vec![
            insr!(Spush),
            insr!(Spushi 3),
            insr!(Spop),
            insr!(Spop),
            insr!(Out),
        ]);
        let after = optimize(&before);
        assert_eq!(after, list(vec![insr!(Spush), insr!(Ldi 3), insr!(Spop), insr!(Out)]));

        // removing the inner pair exposes the outer one on the next round
        let nested = list(vec![insr!(Spush), insr!(Spush), insr!(Spop), insr!(Spop), insr!(Hlt)]);
        assert_eq!(optimize(&nested), list(vec![insr!(Hlt)]));
    }

    #[test]
    fn label_moves_to_next_survivor() {
        let before = list(vec![insr!(a: Spush), insr!(Spop), insr!(Out), insr!(Bra @a)]);
        let after = push_pop_elimination(&before);
        assert_eq!(after, list(vec![insr!(a: Out), insr!(Bra @a)]));
    }

    #[test]
    fn references_follow_substituted_labels() {
        let before = list(vec![
            insr!(Bra @a),
            insr!(a: Spush),
            insr!(b: Spop),
            insr!(c: Out),
            insr!(Brz @b),
        ]);
        let after = push_pop_elimination(&before);
        assert_eq!(
            after,
            list(vec![insr!(Bra @c), insr!(c: Out), insr!(Brz @c)])
        );
        let code = emit(&after, 4).unwrap();
        assert_eq!(code, [601, 902, 701, 0]);
    }

    #[test]
    fn fused_pop_label_moves_on() {
        let before = list(vec![insr!(Spushi @x), insr!(y: Spop), insr!(Out), insr!(x: Dat 4)]);
        let after = pushi_pop_fusion(&before);
        assert_eq!(
            after,
            list(vec![insr!(Ldi @x), insr!(y: Out), insr!(x: Dat 4)])
        );
    }

    #[test]
    fn trailing_label_gets_placeholder() {
        let before = parse("BRA end\nOUT\nend SPOP\nSPUSH");
        let after = optimize(&before);
        assert_eq!(after.to_string(), "BRA end\nOUT\nend NOP\n");

        let code = emit(&after, 3).unwrap();
        // the placeholder branches to the word right after it
        assert_eq!(code, [602, 902, 603]);
    }

    #[test]
    fn errors_are_carried() {
        let error = AsmError::new(AsmErrorKind::BadArg, "test");
        let before = list(vec![
            Insr {
                error: Some(error.clone()),
                ..insr!(Spush)
            },
            insr!(Spop),
            insr!(Out),
        ]);
        let after = optimize(&before);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].error, Some(error.clone()));

        let trailing = list(vec![
            insr!(Out),
            Insr {
                error: Some(error.clone()),
                ..insr!(Spop)
            },
            insr!(Spush),
        ]);
        let after = optimize(&trailing);
        assert_eq!(after.len(), 2);
        assert!(after[1].is(Mnemonic::Nop));
        assert_eq!(after[1].error, Some(error));
    }

    #[test]
    fn duplicate_labels_stay_shadowed() {
        let before = parse("a LDI 5\nBRA a\na SPUSH\nSPOP\nc OUT\nHLT");
        let after = optimize(&before);
        assert_eq!(after.to_string(), "a LDI 5\nBRA a\nc OUT\nHLT\n");
        assert_eq!(&emit(&after, CODE_CAPACITY).unwrap()[..2], [405, 600]);

        // the first definition still moves, even onto a node holding a duplicate
        let before = parse("BRA b\nb SPUSH\nSPOP\nb OUT\nHLT");
        let after = optimize(&before);
        assert_eq!(after.to_string(), "BRA b\nb OUT\nHLT\n");
        assert_eq!(&emit(&after, CODE_CAPACITY).unwrap()[..2], [601, 902]);
    }

    #[test]
    fn first_carried_error_is_kept() {
        let first = AsmError::new(AsmErrorKind::BadArg, "first");
        let second = AsmError::new(AsmErrorKind::BadInsr, "second");
        let own = AsmError::new(AsmErrorKind::BadArg, "own");
        let with_error = |insr: Insr, error: &AsmError| Insr {
            error: Some(error.clone()),
            ..insr
        };

        let after = optimize(&list(vec![
            with_error(insr!(Spush), &first),
            with_error(insr!(Spop), &second),
            insr!(Out),
        ]));
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].error, Some(first.clone()));

        let after = optimize(&list(vec![
            with_error(insr!(Spush), &first),
            insr!(Spop),
            with_error(insr!(Out), &own),
        ]));
        assert_eq!(after[0].error, Some(own));
        assert!(emit(&after, CODE_CAPACITY).is_err());
    }

    #[test]
    fn untouched_lists_are_unchanged() {
        let before = parse("INP\nSPUSH\nSDUP\nSMUL\nSPOP\nOUT\nHLT");
        assert_eq!(optimize(&before), before);
        assert_eq!(optimize(&InsrList::new()), InsrList::new());
    }
}
