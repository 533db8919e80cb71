// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Module for assembling LMSM assembly
//!
//! Assembly is done in two passes: [`parse`] turns the source into an [`InsrList`] without
//! resolving any labels, and [`emit`] resolves labels and encodes each instruction into machine
//! words. The list can be run through the [optimizer](crate::opt) in between.
//!
//! Each line of source is `[label] MNEMONIC [operand]`, split on whitespace. If the first token
//! isn't a mnemonic, it's the label being defined. An operand is a number from `-999` to `999`,
//! or otherwise the name of a label. Instructions that pack their operand into the last two
//! digits of the word only accept operands that fit there, so `LDA 150` is an error rather than
//! `LDI 50`.
//!
//! ```
//! use lmsm::prelude::*;
//! use lmsm::asm::assemble;
//! const COUNTDOWN: &str = r#"
//!       LDA start
//! loop  OUT
//!       SUB one
//!       BRP loop
//!       HLT
//! start DAT 3
//! one   DAT 1
//! "#;
//!
//! let code = assemble(COUNTDOWN).unwrap();
//! let machine = Machine::exec(&code).unwrap();
//!
//! assert_eq!(machine.output(), "3 2 1 0 ");
//! assert_eq!(machine.error_code, None);
//! ```
//!
//! Every line is checked before anything is emitted, so all parse errors are reported together:
//!
//! ```
//! use lmsm::asm::{assemble, AssemblyFailure};
//! use lmsm::AsmErrorKind;
//! let Err(AssemblyFailure::Parse(errors)) = assemble("FOO FOO\nBRZ\nDAT 1000\nHLT") else {
//!     panic!("assembly should have failed");
//! };
//! let kinds: Vec<AsmErrorKind> = errors.iter().map(|e| e.error.kind).collect();
//! assert_eq!(kinds, [AsmErrorKind::BadInsr, AsmErrorKind::BadArg, AsmErrorKind::BadArg]);
//! ```

use chumsky::Parser;
use itertools::Itertools;
use lmsm_ir::parsers::{self, Token};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display};
use std::ops::{Range, RangeInclusive};

use super::{
    AsmError, AsmErrorKind, CODE_CAPACITY, Insr, InsrList, Instruction, Mnemonic, StackOp,
    WORD_MAX, WORD_MIN, Word,
};

/// An [`AsmError`], along with where in the source it came from, if known
#[derive(Debug, PartialEq, Clone)]
pub struct SpannedError {
    /// The error
    pub error: AsmError,
    /// The byte range within the source of the instruction the error belongs to
    pub span: Option<Range<usize>>,
}

impl Display for SpannedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.error, f)
    }
}

/// An error that indicates which pass of the assembly process failed
#[derive(Debug, PartialEq, Clone)]
pub enum AssemblyFailure {
    /// One or more lines failed to parse; nothing was emitted
    Parse(Vec<SpannedError>),
    /// Emission failed on an unresolved label or a program too large for its output
    Emit(SpannedError),
}

impl Display for AssemblyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyFailure::Parse(errors) => write!(f, "{}", errors.iter().format("\n")),
            AssemblyFailure::Emit(error) => Display::fmt(error, f),
        }
    }
}

impl Error for AssemblyFailure {}

/// Parse a single non-blank line's tokens into an [`Insr`]
///
/// `offset` is the position of the line within the whole source, used to fix up token spans.
fn parse_line(tokens: &[Token<'_>], offset: usize) -> Insr {
    let span = |token: &Token<'_>| token.span.start + offset..token.span.end + offset;
    let mut insr = Insr {
        span: tokens
            .first()
            .zip(tokens.last())
            .map(|(first, last)| span(first).start..span(last).end),
        ..Insr::default()
    };

    // tokens past the third are ignored
    let mut tokens = tokens.iter().take(3).peekable();

    if let Some(first) = tokens.next_if(|t| t.text.parse::<Mnemonic>().is_err()) {
        insr.label = Some(first.text.to_owned());
    }

    let Some(mnemonic_token) = tokens.next() else {
        let label = insr.label.as_deref().unwrap_or_default();
        insr.error = Some(AsmError::new(
            AsmErrorKind::BadInsr,
            format!("expected an instruction after label {label:?}"),
        ));
        return insr;
    };

    let mnemonic = match mnemonic_token.text.parse::<Mnemonic>() {
        Ok(mnemonic) => mnemonic,
        Err(e) => {
            insr.error = Some(AsmError::new(AsmErrorKind::BadInsr, e.to_string()));
            return insr;
        }
    };
    insr.mnemonic = Some(mnemonic);

    if !mnemonic.takes_arg() {
        return insr;
    }

    match tokens.next() {
        None => {
            insr.error = Some(AsmError::new(
                AsmErrorKind::BadArg,
                format!("{mnemonic} requires an argument"),
            ));
        }
        Some(arg) if parsers::is_numeric(arg.text) => {
            match arg.text.parse::<i64>().ok().and_then(|v| Word::try_from(v).ok()) {
                Some(value) if (WORD_MIN..=WORD_MAX).contains(&value) => {
                    match operand_range(mnemonic) {
                        Some(range) if !range.contains(&value) => {
                            insr.error = Some(AsmError::new(
                                AsmErrorKind::BadArg,
                                format!(
                                    "argument {value} doesn't fit in {mnemonic}, which takes {} to {}",
                                    range.start(),
                                    range.end()
                                ),
                            ));
                        }
                        _ => insr.value = value,
                    }
                }
                _ => {
                    insr.error = Some(AsmError::new(
                        AsmErrorKind::BadArg,
                        format!(
                            "argument {} is outside of the range {WORD_MIN} to {WORD_MAX}",
                            arg.text
                        ),
                    ));
                }
            }
        }
        Some(arg) => insr.label_reference = Some(arg.text.to_owned()),
    }
    insr
}

/// Parse assembly source into an [`InsrList`], one [`Insr`] per non-blank line
///
/// Parsing never fails as a whole; lines with problems get an [`AsmError`] attached to their
/// [`Insr`], and parsing continues with the next line.
///
/// # Example
///
/// ```
/// use lmsm::asm::parse;
/// use lmsm::{AsmErrorKind, Mnemonic};
///
/// let list = parse("FOO INP\n\n   \nSUB $42\nBAR BAZ");
/// assert_eq!(list.len(), 3);
///
/// assert_eq!(list[0].label.as_deref(), Some("FOO"));
/// assert_eq!(list[0].mnemonic, Some(Mnemonic::Inp));
///
/// assert_eq!(list[1].label_reference.as_deref(), Some("$42"));
///
/// assert_eq!(list[2].error.as_ref().map(|e| e.kind), Some(AsmErrorKind::BadInsr));
/// ```
#[must_use]
pub fn parse(source: &str) -> InsrList {
    let parser = parsers::line();
    let mut list = InsrList::new();
    let mut offset = 0;
    for line in source.split('\n') {
        let line_offset = offset;
        offset += line.len() + 1;

        if line.trim().is_empty() {
            continue;
        }

        let insr = match parser.parse(line).into_result() {
            Ok(tokens) => parse_line(&tokens, line_offset),
            Err(errors) => Insr {
                error: Some(AsmError::new(
                    AsmErrorKind::BadInsr,
                    errors.iter().format("; ").to_string(),
                )),
                span: Some(line_offset..line_offset + line.len()),
                ..Insr::default()
            },
        };
        list.push(insr);
    }
    list
}

/// The operands that fit in `mnemonic`'s encoding, or [`None`] if it takes any [`Word`]
///
/// For `NOP`, the operand is the address it branches to.
fn operand_range(mnemonic: Mnemonic) -> Option<RangeInclusive<Word>> {
    match mnemonic {
        Mnemonic::Add
        | Mnemonic::Sub
        | Mnemonic::Sta
        | Mnemonic::Ldi
        | Mnemonic::Lda
        | Mnemonic::Bra
        | Mnemonic::Brz
        | Mnemonic::Brp
        | Mnemonic::Call
        | Mnemonic::Spushi
        | Mnemonic::Nop
        | Mnemonic::Ssta => Some(0..=99),
        Mnemonic::Spadd | Mnemonic::Spsub | Mnemonic::Slda => Some(0..=98),
        _ => None,
    }
}

/// Encode a single instruction as up to two machine words
///
/// `value` is the already-resolved operand, and `address` is where the instruction will be placed.
fn encode(mnemonic: Mnemonic, value: Word, address: Word) -> [Word; 2] {
    let one = |instruction: Instruction| [instruction.encode(), 0];
    match mnemonic {
        Mnemonic::Hlt | Mnemonic::Cob => one(Instruction::Halt),
        Mnemonic::Add => one(Instruction::Add(value)),
        Mnemonic::Sub => one(Instruction::Sub(value)),
        Mnemonic::Sta => one(Instruction::Store(value)),
        Mnemonic::Ldi => one(Instruction::LoadImmediate(value)),
        Mnemonic::Lda => one(Instruction::Load(value)),
        Mnemonic::Bra => one(Instruction::Branch(value)),
        Mnemonic::Brz => one(Instruction::BranchZero(value)),
        Mnemonic::Brp => one(Instruction::BranchPositive(value)),
        Mnemonic::Inp => one(Instruction::Input),
        Mnemonic::Out => one(Instruction::Output),
        Mnemonic::Jal => one(Instruction::JumpAndLink),
        Mnemonic::Ret => one(Instruction::Return),
        Mnemonic::Spush => one(Instruction::Push),
        Mnemonic::Spop => one(Instruction::Pop),
        Mnemonic::Sdup => one(Instruction::Dup),
        Mnemonic::Sdrop => one(Instruction::Drop),
        Mnemonic::Sswap => one(Instruction::Swap),
        Mnemonic::Sadd => one(Instruction::Binary(StackOp::Add)),
        Mnemonic::Ssub => one(Instruction::Binary(StackOp::Sub)),
        Mnemonic::Smul => one(Instruction::Binary(StackOp::Mul)),
        Mnemonic::Sdiv => one(Instruction::Binary(StackOp::Div)),
        Mnemonic::Smax => one(Instruction::Binary(StackOp::Max)),
        Mnemonic::Smin => one(Instruction::Binary(StackOp::Min)),
        Mnemonic::Scmpgt => one(Instruction::Binary(StackOp::Greater)),
        Mnemonic::Scmplt => one(Instruction::Binary(StackOp::Less)),
        Mnemonic::Snot => one(Instruction::Not),
        Mnemonic::Rpush => one(Instruction::ReturnPush),
        Mnemonic::Rpop => one(Instruction::ReturnPop),
        Mnemonic::Ssta => one(Instruction::StackStore(value)),
        Mnemonic::Slda => one(Instruction::StackLoad(value)),
        Mnemonic::Spadd => one(Instruction::StackPointerAdd(value)),
        Mnemonic::Spsub => one(Instruction::StackPointerSub(value)),
        Mnemonic::Dat => [value, 0],
        Mnemonic::Call => [
            Instruction::LoadImmediate(value).encode(),
            Instruction::JumpAndLink.encode(),
        ],
        Mnemonic::Spushi => [
            Instruction::LoadImmediate(value).encode(),
            Instruction::Push.encode(),
        ],
        // branch to the next address, which is where execution would go anyway
        Mnemonic::Nop => one(Instruction::Branch(address + 1)),
    }
}

/// Find the address of every label, keeping the first definition of any duplicates
fn label_addresses(list: &InsrList) -> HashMap<&str, usize> {
    let mut labels = HashMap::new();
    let mut address = 0;
    for insr in list {
        if let Some(label) = insr.label.as_deref() {
            labels.entry(label).or_insert(address);
        }
        address += insr.width();
    }
    labels
}

/// Emit `list` as machine code, into an array of `capacity` words
///
/// Words after the end of the program are left as `0`.
///
/// # Errors
///
/// * If any [`Insr`] in `list` has a parse error, nothing is emitted, and every one of them is
///   returned, in order, within an [`AssemblyFailure::Parse`].
/// * If a label reference doesn't match any label, returns an [`AssemblyFailure::Emit`] with an
///   [`AsmErrorKind::BadLabel`] error.
/// * If the program doesn't fit within `capacity` words, returns an [`AssemblyFailure::Emit`]
///   with an [`AsmErrorKind::TooLarge`] error.
///
/// # Example
///
/// ```
/// use lmsm::asm::{emit, parse};
/// let list = parse("LDA FOO\nFOO DAT 1\n");
/// assert_eq!(emit(&list, 3).unwrap(), [501, 1, 0]);
/// assert!(emit(&list, 1).is_err());
/// ```
pub fn emit(list: &InsrList, capacity: usize) -> Result<Vec<Word>, AssemblyFailure> {
    if list.has_errors() {
        return Err(AssemblyFailure::Parse(
            list.iter()
                .filter_map(|insr| {
                    insr.error.clone().map(|error| SpannedError {
                        error,
                        span: insr.span.clone(),
                    })
                })
                .collect(),
        ));
    }

    let labels = label_addresses(list);
    let mut code = vec![0; capacity];
    let mut offset = 0;

    for insr in list {
        let fail = |kind: AsmErrorKind, message: String| {
            AssemblyFailure::Emit(SpannedError {
                error: AsmError::new(kind, message),
                span: insr.span.clone(),
            })
        };

        let width = insr.width();
        if offset + width > capacity {
            return Err(fail(
                AsmErrorKind::TooLarge,
                format!("program does not fit within {capacity} words"),
            ));
        }

        let value = match insr.label_reference.as_deref() {
            Some(label) => {
                let address = labels
                    .get(label)
                    .ok_or_else(|| fail(AsmErrorKind::BadLabel, format!("unknown label {label:?}")))?;
                Word::try_from(*address).map_err(|_| {
                    fail(
                        AsmErrorKind::TooLarge,
                        format!("label {label:?} is at an unaddressable offset"),
                    )
                })?
            }
            None => insr.value,
        };

        let Some(mnemonic) = insr.mnemonic else {
            return Err(fail(
                AsmErrorKind::BadInsr,
                String::from("missing instruction"),
            ));
        };
        let address = Word::try_from(offset).map_err(|_| {
            fail(
                AsmErrorKind::TooLarge,
                format!("offset {offset} is not addressable"),
            )
        })?;

        let operand = if mnemonic == Mnemonic::Nop {
            address + 1
        } else {
            value
        };
        if let Some(range) = operand_range(mnemonic).filter(|r| !r.contains(&operand)) {
            let subject = match (mnemonic, insr.label_reference.as_deref()) {
                (Mnemonic::Nop, _) => format!("NOP at address {address}"),
                (_, Some(label)) => format!("label {label:?} at address {value}"),
                (_, None) => format!("argument {value}"),
            };
            let kind = if insr.label_reference.is_some() || mnemonic == Mnemonic::Nop {
                AsmErrorKind::TooLarge
            } else {
                AsmErrorKind::BadArg
            };
            return Err(fail(
                kind,
                format!(
                    "{subject} doesn't fit in {mnemonic}, which takes {} to {}",
                    range.start(),
                    range.end()
                ),
            ));
        }

        let words = encode(mnemonic, value, address);
        code[offset..offset + width].copy_from_slice(&words[..width]);
        offset += width;
    }

    Ok(code)
}

/// Parse and emit `source` into [`CODE_CAPACITY`] words, ready to load into a
/// [`Machine`](crate::Machine)
///
/// # Errors
///
/// Returns whatever [`emit`] returns for the parsed source.
#[inline]
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblyFailure> {
    emit(&parse(source), CODE_CAPACITY)
}

/// Parse, [optimize](crate::opt::optimize), and emit `source` into [`CODE_CAPACITY`] words
///
/// # Errors
///
/// Returns whatever [`emit`] returns for the optimized source.
///
/// # Example
///
/// ```
/// use lmsm::asm::{assemble, assemble_optimized};
/// let source = "SPUSHI 5\nSPOP\nOUT\nHLT";
/// assert_eq!(&assemble(source).unwrap()[..5], [405, 920, 921, 902, 0]);
/// assert_eq!(&assemble_optimized(source).unwrap()[..4], [405, 902, 0, 0]);
/// ```
#[inline]
pub fn assemble_optimized(source: &str) -> Result<Vec<Word>, AssemblyFailure> {
    emit(&crate::opt::optimize(&parse(source)), CODE_CAPACITY)
}

/// Format the parse errors in `list` as a plain-text report, or return [`None`] if there are none
///
/// ```
/// use lmsm::asm::{parse, report_errors};
/// assert_eq!(report_errors(&parse("HLT")), None);
///
/// let report = report_errors(&parse("ADD\nHLT")).unwrap();
/// assert!(report.contains("# Assembler Errors:"));
/// assert!(report.contains("  ADD - ADD requires an argument\n"));
/// ```
#[must_use]
pub fn report_errors(list: &InsrList) -> Option<String> {
    if !list.has_errors() {
        return None;
    }
    let lines = list
        .iter()
        .filter_map(|insr| {
            let error = insr.error.as_ref()?;
            let name = insr.mnemonic.map_or("???", Mnemonic::name);
            Some(format!("  {name} - {}", error.message))
        })
        .join("\n");
    Some(format!(
        "######################################\n\
         # Assembler Errors:\n\
         ######################################\n\n\
         {lines}\n"
    ))
}
