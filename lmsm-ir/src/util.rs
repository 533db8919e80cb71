// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD
//! Small utility macros for making it less painful to build IR by hand

pub use crate::insr;

/// A macro to make constructing an [`Insr`](crate::Insr) simpler.
///
/// The mnemonic is given as the name of a [`Mnemonic`](crate::Mnemonic) variant. It may be
/// followed by a literal operand, or by `@` and an identifier for a label reference:
///
/// ```
/// use lmsm_ir::{prelude::*, util::*};
/// assert_eq!(insr!(Hlt), Insr::new(Mnemonic::Hlt));
/// assert_eq!(insr!(Ldi 5), Insr::with_value(Mnemonic::Ldi, 5));
/// assert_eq!(insr!(Ldi -5), Insr::with_value(Mnemonic::Ldi, -5));
/// assert_eq!(insr!(Bra @top), Insr::with_reference(Mnemonic::Bra, "top"));
/// ```
///
/// A label definition can be given before the mnemonic, followed by a colon:
///
/// ```
///# use lmsm_ir::{prelude::*, util::*};
/// assert_eq!(
///     insr!(top: Out),
///     Insr::new(Mnemonic::Out).labeled("top"),
/// );
/// ```
#[macro_export]
macro_rules! insr {
    ($label: ident : $($rest: tt)+) => {{
        $crate::insr!($($rest)+).labeled(stringify!($label))
    }};
    ($m: ident @ $reference: ident) => {{
        $crate::Insr::with_reference($crate::Mnemonic::$m, stringify!($reference))
    }};
    ($m: ident $value: literal) => {{
        $crate::Insr::with_value($crate::Mnemonic::$m, $value)
    }};
    ($m: ident) => {{
        $crate::Insr::new($crate::Mnemonic::$m)
    }};
}
