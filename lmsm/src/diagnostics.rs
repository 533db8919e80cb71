// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Rich reporting of assembly errors, using [ariadne]
//!
//! ```
//! use lmsm::asm::assemble;
//! use lmsm::diagnostics::write_report;
//!
//! const SOURCE: &str = "LDA missing\nHLT\n";
//! let failure = assemble(SOURCE).unwrap_err();
//!
//! let mut report = Vec::new();
//! write_report(&failure, "prog.lmsm", SOURCE, false, &mut report).unwrap();
//! let report = String::from_utf8(report).unwrap();
//!
//! assert!(report.contains("Unresolved label"));
//! assert!(report.contains("unknown label \"missing\""));
//! assert!(report.contains("prog.lmsm"));
//! ```

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use std::io::{self, Write};
use std::ops::Range;

use super::AsmErrorKind;
use super::asm::{AssemblyFailure, SpannedError};

fn build_report<'a>(
    error: &SpannedError,
    file: &'a str,
    color: bool,
) -> Report<'a, (&'a str, Range<usize>)> {
    let span = error.span.clone().unwrap_or(0..0);
    let (headline, label_color) = match error.error.kind {
        AsmErrorKind::BadInsr => ("Invalid instruction", Color::Red),
        AsmErrorKind::BadArg => ("Invalid argument", Color::Yellow),
        AsmErrorKind::BadLabel => ("Unresolved label", Color::Yellow),
        AsmErrorKind::TooLarge => ("Program too large", Color::Red),
    };
    Report::build(ReportKind::Error, (file, span.clone()))
        .with_config(
            Config::default()
                .with_color(color)
                .with_index_type(IndexType::Byte),
        )
        .with_message(headline)
        .with_label(
            Label::new((file, span))
                .with_message(&error.error.message)
                .with_color(label_color),
        )
        .finish()
}

/// Write a report of every error in `failure` to `writer`
///
/// `file` is the name to show for the source, and `source` is the text that was assembled. If
/// `color` is false, no ANSI escape codes are written.
///
/// # Errors
///
/// Returns any error encountered while writing to `writer`.
pub fn write_report<W: Write>(
    failure: &AssemblyFailure,
    file: &str,
    source: &str,
    color: bool,
    mut writer: W,
) -> io::Result<()> {
    let errors = match failure {
        AssemblyFailure::Parse(errors) => errors.as_slice(),
        AssemblyFailure::Emit(error) => std::slice::from_ref(error),
    };
    for error in errors {
        build_report(error, file, color).write((file, Source::from(source)), &mut writer)?;
    }
    Ok(())
}

/// Print a report of every error in `failure` to stderr, with color
///
/// # Errors
///
/// Returns any error encountered while writing to stderr.
pub fn eprint_report(failure: &AssemblyFailure, file: &str, source: &str) -> io::Result<()> {
    write_report(failure, file, source, true, io::stderr().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn report(source: &str) -> String {
        let failure = assemble(source).unwrap_err();
        let mut out = Vec::new();
        write_report(&failure, "test.lmsm", source, false, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn every_parse_error_reported() {
        let text = report("FOO FOO\nBRZ\nDAT 1000\n");
        assert!(text.contains("Invalid instruction"));
        assert!(text.contains("unknown instruction \"FOO\""));
        assert!(text.contains("BRZ requires an argument"));
        assert!(text.contains("argument 1000 is outside of the range -999 to 999"));
        assert!(text.matches("test.lmsm").count() >= 3);
    }

    #[test]
    fn no_color_means_no_escapes() {
        assert!(!report("BRA nowhere").contains('\x1b'));
    }

    #[test]
    fn too_large() {
        let text = report(&"OUT\n".repeat(101));
        assert!(text.contains("Program too large"));
        assert!(text.contains("program does not fit within 100 words"));
    }
}
