// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! [chumsky] parsers for LMSM assembly source lines

use chumsky::prelude::*;

/// A whitespace-delimited token, along with its span within the line it came from
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Token<'a> {
    /// The token text
    pub text: &'a str,
    /// Where the token was found
    pub span: SimpleSpan,
}

/// Parser that splits a single line into its whitespace-separated [`Token`]s
///
/// Never fails on a single line of input; any run of non-whitespace characters is a token.
///
/// ```
/// use chumsky::Parser;
/// use lmsm_ir::parsers::line;
/// let tokens = line().parse("  loop  BRA loop ").into_result().unwrap();
/// let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
/// assert_eq!(texts, ["loop", "BRA", "loop"]);
/// assert_eq!(tokens[1].span.into_range(), 8..11);
/// ```
pub fn line<'src>() -> impl Parser<'src, &'src str, Vec<Token<'src>>, extra::Err<Rich<'src, char>>>
{
    let token = any()
        .filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
        .map_with(|text: &'src str, e| Token {
            text,
            span: e.span(),
        });

    text::whitespace().ignore_then(
        token
            .then_ignore(text::whitespace())
            .repeated()
            .collect::<Vec<_>>(),
    )
}

/// Whether `operand` should be read as a literal number rather than as a label reference
///
/// An operand is numeric if it is an optional sign followed by one or more ASCII digits.
///
/// ```
/// use lmsm_ir::parsers::is_numeric;
/// assert!(is_numeric("42"));
/// assert!(is_numeric("-7"));
/// assert!(!is_numeric("$42"));
/// assert!(!is_numeric("loop_start"));
/// assert!(!is_numeric("-"));
/// ```
#[must_use]
pub fn is_numeric(operand: &str) -> bool {
    let digits = operand
        .strip_prefix('-')
        .or_else(|| operand.strip_prefix('+'))
        .unwrap_or(operand);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
