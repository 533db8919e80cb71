// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD
#![warn(missing_docs)]

//! Library for working with the LMSM machine and its assembly language
//!
//! This library provides a few different parts to it:
//!
//! # LMSM Machine
//!
//! [`Machine`] is an interpreter for the LMSM, a small accumulator machine with a value stack and
//! a return-address stack living in the upper half of its 200-cell memory. Every value is a
//! [`Word`], saturated to `-999..=999`.
//!
//! ## Machine Example
//!
//! ```rust
//! use lmsm::prelude::*;
//! // LDI 7, STA 99, ADD 99, OUT, HLT
//! let machine = Machine::exec(&[407, 399, 199, 902, 0]).unwrap();
//! assert_eq!(machine.output(), "14 ");
//! assert_eq!(machine.status, Status::Halted);
//! assert_eq!(machine.error_code, None);
//! ```
//!
//! # Assembler
//!
//! The [`asm`] module parses LMSM assembly into an [`InsrList`] and emits machine code from it.
//!
//! ```rust
//! use lmsm::asm::assemble;
//! let code = assemble("SPUSHI 1\nOUT\nHLT").unwrap();
//! assert_eq!(&code[..4], [401, 920, 902, 0]);
//! ```
//!
//! # Optimizer
//!
//! The [`opt`] module rewrites an [`InsrList`] until no more redundant stack traffic is left.
//!
//! # Disassembler
//!
//! The [`disasm`] module turns machine words back into assembly, and can explain what a word does.
//!
//! ```rust
//! use lmsm::disasm::disassemble;
//! assert_eq!(disassemble([401, 920, 902, 0]), "LDI 1\nSPUSH\nOUT\nHLT\n");
//! ```

use itertools::Itertools;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::io::{self, BufRead, Write};
use std::ops::Index;
use std::str::FromStr;

pub use lmsm_core::{
    AsmError, AsmErrorKind, CODE_CAPACITY, MEMORY_SIZE, MachineError, OUTPUT_CAPACITY,
    RETURN_STACK_EMPTY, STACK_EMPTY, STACK_LIMIT, Status, WORD_MAX, WORD_MIN, Word, clamp,
};
pub use lmsm_ir::{Insr, InsrList, Mnemonic};

pub mod asm;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod disasm;
pub mod opt;
pub mod trace;

/// A small module that re-exports items useful when working with the LMSM machine
pub mod prelude {
    pub use crate::{Input, Instruction, Machine, MachineError, Register, Status, Word};
}

/// Highest valid memory address
const TOP_OF_MEMORY: Word = 199;

/// A stack operation that pops one value and combines it with the value beneath it
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[allow(missing_docs, reason = "trivial")]
pub enum StackOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    /// `1` if the lower value is greater than the popped one, otherwise `0`
    Greater,
    /// `1` if the lower value is less than the popped one, otherwise `0`
    Less,
}

impl StackOp {
    const fn opcode(self) -> Word {
        match self {
            StackOp::Add => 930,
            StackOp::Sub => 931,
            StackOp::Mul => 932,
            StackOp::Div => 933,
            StackOp::Max => 934,
            StackOp::Min => 935,
            StackOp::Greater => 937,
            StackOp::Less => 938,
        }
    }

    /// Combine the popped value `a` with the value `b` beneath it
    ///
    /// Returns [`None`] on division by zero.
    fn apply(self, b: Word, a: Word) -> Option<Word> {
        let (b, a) = (i64::from(b), i64::from(a));
        let result = match self {
            StackOp::Add => b + a,
            StackOp::Sub => b - a,
            StackOp::Mul => b * a,
            StackOp::Div => b.checked_div(a)?,
            StackOp::Max => b.max(a),
            StackOp::Min => b.min(a),
            StackOp::Greater => i64::from(b > a),
            StackOp::Less => i64::from(b < a),
        };
        Some(clamp(result))
    }

    const fn mnemonic(self) -> Mnemonic {
        match self {
            StackOp::Add => Mnemonic::Sadd,
            StackOp::Sub => Mnemonic::Ssub,
            StackOp::Mul => Mnemonic::Smul,
            StackOp::Div => Mnemonic::Sdiv,
            StackOp::Max => Mnemonic::Smax,
            StackOp::Min => Mnemonic::Smin,
            StackOp::Greater => Mnemonic::Scmpgt,
            StackOp::Less => Mnemonic::Scmplt,
        }
    }
}

/// A decoded LMSM instruction
///
/// Words from `0` to `999` are "traditional" instructions, with the hundreds digit selecting the
/// operation and the rest being the operand, while words from `-1` to `-500` are stack-frame
/// instructions used for local variable access.
///
/// ```
/// use lmsm::{Instruction, StackOp};
/// assert_eq!(Instruction::try_from(105), Ok(Instruction::Add(5)));
/// assert_eq!(Instruction::try_from(933), Ok(Instruction::Binary(StackOp::Div)));
/// assert_eq!(Instruction::try_from(-203), Ok(Instruction::StackLoad(2)));
/// assert_eq!(Instruction::try_from(-350), Err(-350));
/// assert_eq!(Instruction::StackStore(3).encode(), -404);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Instruction {
    /// `HLT`/`COB`: stop the machine
    Halt,
    /// `ADD d`: `acc += mem[d]`
    Add(Word),
    /// `SUB d`: `acc -= mem[d]`
    Sub(Word),
    /// `STA d`: `mem[d] = acc`
    Store(Word),
    /// `LDI d`: `acc = d`
    LoadImmediate(Word),
    /// `LDA d`: `acc = mem[d]`
    Load(Word),
    /// `BRA d`: `pc = d`
    Branch(Word),
    /// `BRZ d`: `pc = d` if `acc == 0`
    BranchZero(Word),
    /// `BRP d`: `pc = d` if `acc >= 0`
    BranchPositive(Word),
    /// `INP`: read the next input into the accumulator
    Input,
    /// `OUT`: write the accumulator to the output buffer
    Output,
    /// `JAL`: `ra = pc; pc = acc`
    JumpAndLink,
    /// `RET`: `pc = ra`
    Return,
    /// `SPUSH`: push the accumulator
    Push,
    /// `SPOP`: pop into the accumulator
    Pop,
    /// `SDUP`: duplicate the top of the stack
    Dup,
    /// `SDROP`: discard the top of the stack
    Drop,
    /// `SSWAP`: swap the top two stack values
    Swap,
    /// `RPUSH`: push the return address onto the return stack
    ReturnPush,
    /// `RPOP`: pop the return stack into the return address
    ReturnPop,
    /// `SADD`, `SSUB`, `SMUL`, `SDIV`, `SMAX`, `SMIN`, `SCMPGT`, `SCMPLT`
    Binary(StackOp),
    /// `SNOT`: replace the top of the stack with `1` if it's `0`, otherwise with `0`
    Not,
    /// `SPADD d`: `sp += d + 1`
    StackPointerAdd(Word),
    /// `SPSUB d`: `sp -= d + 1`
    StackPointerSub(Word),
    /// `SLDA d`: push `mem[sp + d]`
    StackLoad(Word),
    /// `SSTA d`: pop, then store into `mem[sp + d]`
    StackStore(Word),
}

impl TryFrom<Word> for Instruction {
    type Error = Word;
    fn try_from(word: Word) -> Result<Self, Self::Error> {
        Ok(match word {
            0 => Self::Halt,
            100..=199 => Self::Add(word - 100),
            200..=299 => Self::Sub(word - 200),
            300..=399 => Self::Store(word - 300),
            400..=499 => Self::LoadImmediate(word - 400),
            500..=599 => Self::Load(word - 500),
            600..=699 => Self::Branch(word - 600),
            700..=799 => Self::BranchZero(word - 700),
            800..=899 => Self::BranchPositive(word - 800),
            901 => Self::Input,
            902 => Self::Output,
            910 => Self::JumpAndLink,
            911 => Self::Return,
            920 => Self::Push,
            921 => Self::Pop,
            922 => Self::Dup,
            923 => Self::Drop,
            924 => Self::Swap,
            925 => Self::ReturnPush,
            926 => Self::ReturnPop,
            930 => Self::Binary(StackOp::Add),
            931 => Self::Binary(StackOp::Sub),
            932 => Self::Binary(StackOp::Mul),
            933 => Self::Binary(StackOp::Div),
            934 => Self::Binary(StackOp::Max),
            935 => Self::Binary(StackOp::Min),
            937 => Self::Binary(StackOp::Greater),
            938 => Self::Binary(StackOp::Less),
            939 => Self::Not,
            -99..=-1 => Self::StackPointerAdd(-(word + 1)),
            -199..=-100 => Self::StackPointerSub(-(word + 101)),
            -299..=-200 => Self::StackLoad(-(word + 201)),
            -500..=-401 => Self::StackStore(-(word + 401)),
            _ => return Err(word),
        })
    }
}

impl Instruction {
    /// Encode the instruction as a machine word
    ///
    /// Operands are not range-checked, so an out-of-range operand encodes to a word that decodes
    /// as something else.
    #[must_use]
    pub const fn encode(self) -> Word {
        match self {
            Self::Halt => 0,
            Self::Add(d) => 100 + d,
            Self::Sub(d) => 200 + d,
            Self::Store(d) => 300 + d,
            Self::LoadImmediate(d) => 400 + d,
            Self::Load(d) => 500 + d,
            Self::Branch(d) => 600 + d,
            Self::BranchZero(d) => 700 + d,
            Self::BranchPositive(d) => 800 + d,
            Self::Input => 901,
            Self::Output => 902,
            Self::JumpAndLink => 910,
            Self::Return => 911,
            Self::Push => 920,
            Self::Pop => 921,
            Self::Dup => 922,
            Self::Drop => 923,
            Self::Swap => 924,
            Self::ReturnPush => 925,
            Self::ReturnPop => 926,
            Self::Binary(op) => op.opcode(),
            Self::Not => 939,
            Self::StackPointerAdd(d) => -1 - d,
            Self::StackPointerSub(d) => -101 - d,
            Self::StackLoad(d) => -201 - d,
            Self::StackStore(d) => -401 - d,
        }
    }

    /// The assembly mnemonic for the instruction
    #[must_use]
    pub const fn mnemonic(self) -> Mnemonic {
        match self {
            Self::Halt => Mnemonic::Hlt,
            Self::Add(_) => Mnemonic::Add,
            Self::Sub(_) => Mnemonic::Sub,
            Self::Store(_) => Mnemonic::Sta,
            Self::LoadImmediate(_) => Mnemonic::Ldi,
            Self::Load(_) => Mnemonic::Lda,
            Self::Branch(_) => Mnemonic::Bra,
            Self::BranchZero(_) => Mnemonic::Brz,
            Self::BranchPositive(_) => Mnemonic::Brp,
            Self::Input => Mnemonic::Inp,
            Self::Output => Mnemonic::Out,
            Self::JumpAndLink => Mnemonic::Jal,
            Self::Return => Mnemonic::Ret,
            Self::Push => Mnemonic::Spush,
            Self::Pop => Mnemonic::Spop,
            Self::Dup => Mnemonic::Sdup,
            Self::Drop => Mnemonic::Sdrop,
            Self::Swap => Mnemonic::Sswap,
            Self::ReturnPush => Mnemonic::Rpush,
            Self::ReturnPop => Mnemonic::Rpop,
            Self::Binary(op) => op.mnemonic(),
            Self::Not => Mnemonic::Snot,
            Self::StackPointerAdd(_) => Mnemonic::Spadd,
            Self::StackPointerSub(_) => Mnemonic::Spsub,
            Self::StackLoad(_) => Mnemonic::Slda,
            Self::StackStore(_) => Mnemonic::Ssta,
        }
    }

    /// The instruction's operand, if it has one
    #[must_use]
    pub const fn operand(self) -> Option<Word> {
        match self {
            Self::Add(d)
            | Self::Sub(d)
            | Self::Store(d)
            | Self::LoadImmediate(d)
            | Self::Load(d)
            | Self::Branch(d)
            | Self::BranchZero(d)
            | Self::BranchPositive(d)
            | Self::StackPointerAdd(d)
            | Self::StackPointerSub(d)
            | Self::StackLoad(d)
            | Self::StackStore(d) => Some(d),
            _ => None,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand() {
            Some(d) => write!(f, "{} {d}", self.mnemonic()),
            None => write!(f, "{}", self.mnemonic()),
        }
    }
}

/// Where `INP` instructions get their values from
#[derive(Debug, PartialEq, Clone, Default)]
pub enum Input {
    /// Prompt on stdout and read a line from stdin for each `INP`
    #[default]
    Interactive,
    /// Take values from a pre-supplied sequence, in order
    Tokens(VecDeque<Word>),
}

impl Input {
    /// Split `tokens` on whitespace into a pre-supplied [`Input::Tokens`]
    ///
    /// Tokens that aren't valid integers are read as `0`, and values are saturated to the range
    /// of a [`Word`].
    ///
    /// ```
    /// use lmsm::Input;
    /// assert_eq!(Input::from_tokens("1 -2\n5000 x"), Input::Tokens([1, -2, 999, 0].into()));
    /// ```
    #[must_use]
    pub fn from_tokens(tokens: &str) -> Self {
        Self::Tokens(
            tokens
                .split_whitespace()
                .map(|token| token.parse::<i64>().map_or(0, clamp))
                .collect(),
        )
    }

    fn next_value(&mut self) -> Word {
        match self {
            // an exhausted stream reads as 0
            Input::Tokens(tokens) => tokens.pop_front().unwrap_or_default(),
            Input::Interactive => Self::prompt(),
        }
    }

    fn prompt() -> Word {
        let mut stdout = io::stdout().lock();
        // if stdout is gone there's nobody to prompt, but stdin may still have input
        let _ = write!(stdout, "Enter a number: ").and_then(|()| stdout.flush());
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => line.trim().parse::<i64>().map_or(0, clamp),
            Err(_) => 0,
        }
    }
}

/// A register that can be read or written directly
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Register {
    /// The program counter, `PC`
    ProgramCounter,
    /// The accumulator, `ACC`
    Accumulator,
    /// The value stack pointer, `SP`
    StackPointer,
    /// The return address, `RA`
    ReturnAddress,
    /// The return stack pointer, `RP`
    ReturnStackPointer,
}

impl Register {
    /// The values that may be written to the register directly
    #[must_use]
    pub const fn range(self) -> std::ops::RangeInclusive<Word> {
        match self {
            Register::ProgramCounter | Register::ReturnStackPointer => 0..=TOP_OF_MEMORY,
            Register::Accumulator => WORD_MIN..=WORD_MAX,
            Register::StackPointer => STACK_LIMIT..=STACK_EMPTY,
            Register::ReturnAddress => 0..=STACK_LIMIT,
        }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::ProgramCounter => write!(f, "PC"),
            Register::Accumulator => write!(f, "ACC"),
            Register::StackPointer => write!(f, "SP"),
            Register::ReturnAddress => write!(f, "RA"),
            Register::ReturnStackPointer => write!(f, "RP"),
        }
    }
}

impl FromStr for Register {
    type Err = AccessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PC" => Ok(Register::ProgramCounter),
            "ACC" => Ok(Register::Accumulator),
            "SP" => Ok(Register::StackPointer),
            "RA" => Ok(Register::ReturnAddress),
            "RP" => Ok(Register::ReturnStackPointer),
            _ => Err(AccessError::UnknownRegister(s.to_owned())),
        }
    }
}

/// A direct memory or register access was rejected
#[derive(Debug, PartialEq, Clone)]
pub enum AccessError {
    /// The address is not within `0..200`
    AddressOutOfRange(i64),
    /// The program has more words than fit in memory
    ProgramTooLarge(usize),
    /// The value is not allowed in the register
    RegisterOutOfRange {
        /// The register that was written to
        register: Register,
        /// The rejected value
        value: i64,
    },
    /// No register has this name
    UnknownRegister(String),
}

impl Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::AddressOutOfRange(addr) => {
                write!(f, "address {addr} is outside of memory")
            }
            AccessError::ProgramTooLarge(len) => {
                write!(f, "program of {len} words does not fit in {MEMORY_SIZE} cells")
            }
            AccessError::RegisterOutOfRange { register, value } => {
                let range = register.range();
                write!(
                    f,
                    "{value} is not a valid {register} value (must be within {}..={})",
                    range.start(),
                    range.end()
                )
            }
            AccessError::UnknownRegister(name) => write!(f, "unknown register {name:?}"),
        }
    }
}

impl Error for AccessError {}

/// An LMSM machine, which provides optional tracing of executed instructions.
///
/// Registers are public so that a driving layer can inspect and poke at them; memory is reached
/// through [`Index`], [`mem_get`](Machine::mem_get) and [`mem_override`](Machine::mem_override),
/// which keep every cell within the range of a [`Word`].
#[derive(Clone)]
pub struct Machine {
    memory: [Word; MEMORY_SIZE],
    /// Address of the next instruction to execute
    pub program_counter: Word,
    /// The accumulator
    pub accumulator: Word,
    /// Address of the top of the value stack, or `200` if it's empty
    pub stack_pointer: Word,
    /// The address most recently linked by `JAL`
    pub return_address: Word,
    /// Address of the top of the return stack, or `99` if it's empty
    pub return_stack_pointer: Word,
    /// Whether the machine is ready, running, or halted
    pub status: Status,
    /// The error that halted the machine, if any
    pub error_code: Option<MachineError>,
    output: String,
    input: Input,
    trace: Option<trace::Trace>,
}

// ignore the trace field
impl PartialEq for Machine {
    fn eq(&self, other: &Self) -> bool {
        self.memory == other.memory
            && self.program_counter == other.program_counter
            && self.accumulator == other.accumulator
            && self.stack_pointer == other.stack_pointer
            && self.return_address == other.return_address
            && self.return_stack_pointer == other.return_stack_pointer
            && self.status == other.status
            && self.error_code == other.error_code
            && self.output == other.output
            && self.input == other.input
    }
}

impl Debug for Machine {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Machine")
            .field("memory", &self.memory)
            .field("pc", &self.program_counter)
            .field("acc", &self.accumulator)
            .field("sp", &self.stack_pointer)
            .field("ra", &self.return_address)
            .field("rsp", &self.return_stack_pointer)
            .field("status", &self.status)
            .field("error_code", &self.error_code)
            .field("output", &self.output)
            .field("input", &self.input)
            .field("tracing", &self.trace.is_some())
            .finish()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for Machine {
    type Output = Word;

    fn index(&self, i: usize) -> &Self::Output {
        &self.memory[i]
    }
}

/// Convert an address that's already been bounds-checked into an index
fn cell(addr: Word) -> usize {
    debug_assert!(
        (0..=TOP_OF_MEMORY).contains(&addr),
        "uncaught out-of-range address {addr}"
    );
    usize::try_from(addr).unwrap_or(usize::MAX)
}

impl Machine {
    /// Create a fresh machine with zeroed memory, reading input interactively
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: [0; MEMORY_SIZE],
            program_counter: 0,
            accumulator: 0,
            stack_pointer: STACK_EMPTY,
            return_address: 0,
            return_stack_pointer: RETURN_STACK_EMPTY,
            status: Status::Ready,
            error_code: None,
            output: String::new(),
            input: Input::Interactive,
            trace: None,
        }
    }

    /// Use `input` as the source for `INP` instructions
    #[must_use]
    pub fn with_input(mut self, input: Input) -> Self {
        self.input = input;
        self
    }

    /// Replace the source for `INP` instructions
    pub fn set_input(&mut self, input: Input) {
        self.input = input;
    }

    /// Create a fresh machine, load `program` into it, and run it until it halts
    ///
    /// Runtime errors don't cause this to fail; check [`error_code`](Machine::error_code) on the
    /// returned machine.
    ///
    /// # Errors
    ///
    /// If `program` is larger than memory, returns [`AccessError::ProgramTooLarge`].
    pub fn exec(program: &[Word]) -> Result<Self, AccessError> {
        let mut machine = Self::new();
        machine.load(program)?;
        // errors are recorded in the machine itself
        let _ = machine.run();
        Ok(machine)
    }

    /// Copy `program` into the low end of memory, leaving the rest of memory untouched
    ///
    /// Words outside the range of a [`Word`] are saturated as they're loaded.
    ///
    /// # Errors
    ///
    /// If `program` has more than [`MEMORY_SIZE`] words, returns
    /// [`AccessError::ProgramTooLarge`] without loading anything.
    pub fn load(&mut self, program: &[Word]) -> Result<(), AccessError> {
        if program.len() > MEMORY_SIZE {
            return Err(AccessError::ProgramTooLarge(program.len()));
        }
        for (cell, &word) in self.memory.iter_mut().zip(program) {
            *cell = clamp(word.into());
        }
        Ok(())
    }

    /// Return the machine to its freshly-created state, zeroing memory
    ///
    /// Tracing, if active, continues.
    pub fn reset(&mut self) {
        let trace = self.trace.take();
        *self = Self {
            trace,
            ..Self::new()
        };
    }

    /// Reset registers, output and status so the loaded program can run again from the start
    ///
    /// Unlike [`reset`](Machine::reset), memory and the input source are kept.
    pub fn restart(&mut self) {
        self.program_counter = 0;
        self.accumulator = 0;
        self.stack_pointer = STACK_EMPTY;
        self.return_address = 0;
        self.return_stack_pointer = RETURN_STACK_EMPTY;
        self.status = Status::Ready;
        self.error_code = None;
        self.output.clear();
    }

    /// The text written by `OUT` instructions so far
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// The full memory image
    #[must_use]
    pub fn memory(&self) -> &[Word; MEMORY_SIZE] {
        &self.memory
    }

    /// Whether the next instruction to execute is `INP`
    #[must_use]
    pub fn awaiting_input(&self) -> bool {
        self.status != Status::Halted
            && self
                .mem_get(self.program_counter.into())
                .is_ok_and(|word| word == Instruction::Input.encode())
    }

    /// Get the memory at `address`.
    ///
    /// # Errors
    ///
    /// if `address` is not within `0..200`, returns [`AccessError::AddressOutOfRange`]
    #[doc(alias = "peek")]
    pub fn mem_get(&self, address: i64) -> Result<Word, AccessError> {
        usize::try_from(address)
            .ok()
            .and_then(|i| self.memory.get(i))
            .copied()
            .ok_or(AccessError::AddressOutOfRange(address))
    }

    /// Manually set a memory location to a provided value, saturating it to the range of a
    /// [`Word`]
    ///
    /// # Errors
    ///
    /// if `address` is not within `0..200`, returns [`AccessError::AddressOutOfRange`]
    #[doc(alias("poke", "write"))]
    pub fn mem_override(&mut self, address: i64, value: i64) -> Result<(), AccessError> {
        let cell = usize::try_from(address)
            .ok()
            .and_then(|i| self.memory.get_mut(i))
            .ok_or(AccessError::AddressOutOfRange(address))?;
        *cell = clamp(value);
        Ok(())
    }

    /// Read a register
    #[must_use]
    pub fn register(&self, register: Register) -> Word {
        match register {
            Register::ProgramCounter => self.program_counter,
            Register::Accumulator => self.accumulator,
            Register::StackPointer => self.stack_pointer,
            Register::ReturnAddress => self.return_address,
            Register::ReturnStackPointer => self.return_stack_pointer,
        }
    }

    /// Write a register, rejecting values outside of [`Register::range`]
    ///
    /// # Errors
    ///
    /// If `value` is not within `register.range()`, returns
    /// [`AccessError::RegisterOutOfRange`] and leaves the register unchanged.
    pub fn set_register(&mut self, register: Register, value: i64) -> Result<(), AccessError> {
        let checked = Word::try_from(value)
            .ok()
            .filter(|v| register.range().contains(v))
            .ok_or(AccessError::RegisterOutOfRange { register, value })?;
        let slot = match register {
            Register::ProgramCounter => &mut self.program_counter,
            Register::Accumulator => &mut self.accumulator,
            Register::StackPointer => &mut self.stack_pointer,
            Register::ReturnAddress => &mut self.return_address,
            Register::ReturnStackPointer => &mut self.return_stack_pointer,
        };
        *slot = checked;
        Ok(())
    }

    /// Set the machine running and step it until it halts
    ///
    /// There is no limit on the number of steps; a program that loops forever will never return.
    ///
    /// # Errors
    ///
    /// If the machine halted because of a [`MachineError`], returns that error. It is also
    /// recorded in [`error_code`](Machine::error_code).
    pub fn run(&mut self) -> Result<(), MachineError> {
        if self.status != Status::Halted {
            self.status = Status::Running;
        }
        while self.status != Status::Halted {
            self.step()?;
        }
        self.error_code.map_or(Ok(()), Err)
    }

    /// Execute a single instruction
    ///
    /// Stepping a halted machine does nothing and returns `Ok(Status::Halted)`.
    ///
    /// # Example
    ///
    /// ```
    /// use lmsm::prelude::*;
    /// let mut machine = Machine::new();
    /// // LDI 3, SPUSH, SPOP, SPOP
    /// machine.load(&[403, 920, 921, 921]).unwrap();
    ///
    /// assert_eq!(machine.step(), Ok(Status::Ready));
    /// assert_eq!(machine.step(), Ok(Status::Ready));
    /// assert_eq!(machine.stack_pointer, 199);
    /// assert_eq!(machine.step(), Ok(Status::Ready));
    /// assert_eq!(machine.accumulator, 3);
    ///
    /// // the stack is empty now, so the last pop is fatal
    /// assert_eq!(machine.step(), Err(MachineError::BadStack));
    /// assert_eq!(machine.status, Status::Halted);
    /// assert_eq!(machine.error_code, Some(MachineError::BadStack));
    ///
    /// // further steps are no-ops
    /// assert_eq!(machine.step(), Ok(Status::Halted));
    /// assert_eq!(machine.program_counter, 4);
    /// ```
    ///
    /// # Errors
    ///
    /// If executing the instruction causes a fatal error, the machine is halted, the error is
    /// recorded in [`error_code`](Machine::error_code), and it is returned:
    ///
    /// | Condition                                             | Error                  |
    /// |-------------------------------------------------------|------------------------|
    /// | Fetched word is not an instruction                    | [`UnknownInstruction`] |
    /// | Program counter is outside of memory                  | [`UnknownInstruction`] |
    /// | Stack operation over- or underflows either stack      | [`BadStack`]           |
    /// | Stack-relative access leaves the stack region         | [`BadStack`]           |
    /// | `SDIV` with a zero divisor                            | [`BadStack`]           |
    /// | `OUT` would overflow the output buffer                | [`OutputExhausted`]    |
    ///
    /// [`UnknownInstruction`]: MachineError::UnknownInstruction
    /// [`BadStack`]: MachineError::BadStack
    /// [`OutputExhausted`]: MachineError::OutputExhausted
    #[doc(alias("exec", "tick"))]
    pub fn step(&mut self) -> Result<Status, MachineError> {
        if self.status == Status::Halted {
            return Ok(Status::Halted);
        }

        // registers are public, so they may have been set to anything since the last step
        self.accumulator = clamp(self.accumulator.into());

        let address = self.program_counter;
        let word = self.mem_get(address.into()).ok();
        self.program_counter = self.program_counter.saturating_add(1);

        let decoded = word.and_then(|w| Instruction::try_from(w).ok());
        let outcome = match decoded {
            Some(instruction) => self.execute(instruction),
            None => Err(MachineError::UnknownInstruction),
        };
        if let Err(e) = outcome {
            self.status = Status::Halted;
            self.error_code = Some(e);
        }
        self.accumulator = clamp(self.accumulator.into());

        if self.trace.is_some() {
            let event = trace::TraceEvent {
                address,
                word,
                instruction: decoded,
                accumulator: self.accumulator,
                stack_pointer: self.stack_pointer,
                fault: outcome.err(),
            };
            self.trace(event);
        }

        outcome.map(|()| self.status)
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), MachineError> {
        match instruction {
            Instruction::Halt => self.status = Status::Halted,
            Instruction::Add(d) => self.accumulator += self.memory[cell(d)],
            Instruction::Sub(d) => self.accumulator -= self.memory[cell(d)],
            Instruction::Store(d) => self.memory[cell(d)] = self.accumulator,
            Instruction::LoadImmediate(d) => self.accumulator = d,
            Instruction::Load(d) => self.accumulator = self.memory[cell(d)],
            Instruction::Branch(d) => self.program_counter = d,
            Instruction::BranchZero(d) => {
                if self.accumulator == 0 {
                    self.program_counter = d;
                }
            }
            Instruction::BranchPositive(d) => {
                if self.accumulator >= 0 {
                    self.program_counter = d;
                }
            }
            Instruction::Input => self.accumulator = self.input.next_value(),
            Instruction::Output => {
                let text = format!("{} ", self.accumulator);
                if self.output.len() + text.len() > OUTPUT_CAPACITY {
                    return Err(MachineError::OutputExhausted);
                }
                self.output.push_str(&text);
            }
            Instruction::JumpAndLink => {
                self.return_address = self.program_counter;
                self.program_counter = self.accumulator;
            }
            Instruction::Return => self.program_counter = self.return_address,
            Instruction::Push => self.push(self.accumulator)?,
            Instruction::Pop => self.accumulator = self.pop()?,
            Instruction::Dup => {
                let top = self.top()?;
                self.push(top)?;
            }
            Instruction::Drop => {
                self.pop()?;
            }
            Instruction::Swap => {
                self.require_two()?;
                let sp = cell(self.stack_pointer);
                self.memory.swap(sp, sp + 1);
            }
            Instruction::ReturnPush => {
                let target = Word::try_from(i64::from(self.return_stack_pointer) + 1)
                    .ok()
                    .filter(|t| (0..=TOP_OF_MEMORY).contains(t))
                    .ok_or(MachineError::BadStack)?;
                self.return_stack_pointer = target;
                self.memory[cell(target)] = clamp(self.return_address.into());
            }
            Instruction::ReturnPop => {
                if !(STACK_LIMIT..=TOP_OF_MEMORY).contains(&self.return_stack_pointer) {
                    return Err(MachineError::BadStack);
                }
                self.return_address = self.memory[cell(self.return_stack_pointer)];
                self.return_stack_pointer -= 1;
            }
            Instruction::Binary(op) => {
                self.require_two()?;
                let a = self.memory[cell(self.stack_pointer)];
                let b = self.memory[cell(self.stack_pointer + 1)];
                let result = op.apply(b, a).ok_or(MachineError::BadStack)?;
                self.stack_pointer += 1;
                self.memory[cell(self.stack_pointer)] = result;
            }
            Instruction::Not => {
                let top = self.top()?;
                self.memory[cell(self.stack_pointer)] = Word::from(top == 0);
            }
            Instruction::StackPointerAdd(d) => {
                self.move_stack_pointer(i64::from(self.stack_pointer) + 1 + i64::from(d))?;
            }
            Instruction::StackPointerSub(d) => {
                self.move_stack_pointer(i64::from(self.stack_pointer) - 1 - i64::from(d))?;
            }
            Instruction::StackLoad(d) => {
                let source = Self::stack_cell(i64::from(self.stack_pointer) + i64::from(d))?;
                self.push(self.memory[source])?;
            }
            Instruction::StackStore(d) => {
                let target = Self::stack_cell(i64::from(self.stack_pointer) + 1 + i64::from(d))?;
                let value = self.pop()?;
                self.memory[target] = value;
            }
        }
        Ok(())
    }

    fn push(&mut self, value: Word) -> Result<(), MachineError> {
        if !(STACK_LIMIT + 1..=STACK_EMPTY).contains(&self.stack_pointer) {
            return Err(MachineError::BadStack);
        }
        self.stack_pointer -= 1;
        self.memory[cell(self.stack_pointer)] = value;
        Ok(())
    }

    fn top(&self) -> Result<Word, MachineError> {
        if self.stack_pointer >= STACK_EMPTY || self.stack_pointer < STACK_LIMIT {
            return Err(MachineError::BadStack);
        }
        Ok(self.memory[cell(self.stack_pointer)])
    }

    fn pop(&mut self) -> Result<Word, MachineError> {
        let value = self.top()?;
        self.stack_pointer += 1;
        Ok(value)
    }

    fn require_two(&self) -> Result<(), MachineError> {
        if self.stack_pointer < STACK_LIMIT || self.stack_pointer > STACK_EMPTY - 2 {
            Err(MachineError::BadStack)
        } else {
            Ok(())
        }
    }

    fn move_stack_pointer(&mut self, target: i64) -> Result<(), MachineError> {
        self.stack_pointer = Word::try_from(target)
            .ok()
            .filter(|t| (STACK_LIMIT..=STACK_EMPTY).contains(t))
            .ok_or(MachineError::BadStack)?;
        Ok(())
    }

    /// Index of a cell within the stack region
    fn stack_cell(addr: i64) -> Result<usize, MachineError> {
        match Word::try_from(addr) {
            Ok(addr) if (STACK_LIMIT..=TOP_OF_MEMORY).contains(&addr) => Ok(cell(addr)),
            _ => Err(MachineError::BadStack),
        }
    }

    /// Write human-readable diagnostic information about the machine's state to `writer`
    ///
    /// # Errors
    ///
    /// If writing to `writer` fails, returns the resulting [`io::Error`].
    pub fn write_diagnostic<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let error = self
            .error_code
            .map_or_else(|| String::from("(nil)"), |e| e.to_string());
        writeln!(writer, "MACHINE STATE")?;
        writeln!(writer, "    status: {} | error: {error}", self.status)?;
        writeln!(
            writer,
            "    {}",
            [
                Register::ProgramCounter,
                Register::Accumulator,
                Register::StackPointer,
                Register::ReturnAddress,
                Register::ReturnStackPointer,
            ]
            .into_iter()
            .map(|r| format!("{r}: {}", self.register(r)))
            .join(" | ")
        )?;
        if let Ok(word) = self.mem_get(self.program_counter.into()) {
            writeln!(writer, "    next: {}", disasm::explain(word))?;
        }
        if self.stack_pointer < STACK_EMPTY {
            writeln!(
                writer,
                "    stack: {}",
                self.memory[cell(self.stack_pointer.max(STACK_LIMIT))..]
                    .iter()
                    .format(", ")
            )?;
        }
        if !self.output.is_empty() {
            writeln!(writer, "    output: {}", self.output.trim_end())?;
        }

        let code = &self.memory[..CODE_CAPACITY];
        let used = code.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        writeln!(
            writer,
            "\n\nDISASSEMBLY\n{}",
            disasm::disassemble(code[..used].iter().copied())
        )
    }

    /// Start recording executed instructions
    ///
    /// If a trace is already in progress, it's kept and added to.
    pub fn start_trace(&mut self) {
        self.trace.get_or_insert_with(trace::Trace::default);
    }

    /// Stop recording executed instructions, returning the recorded [`Trace`](trace::Trace), if
    /// one was in progress
    pub fn end_trace(&mut self) -> Option<trace::Trace> {
        self.trace.take()
    }

    fn trace(&mut self, event: trace::TraceEvent) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(program: &[Word]) -> Machine {
        Machine::exec(program).unwrap()
    }

    #[test]
    fn decode_encode_agree() {
        for word in WORD_MIN..=WORD_MAX {
            if let Ok(instruction) = Instruction::try_from(word) {
                assert_eq!(instruction.encode(), word, "{instruction:?}");
            }
        }
    }

    #[test]
    fn unassigned_words_are_unknown() {
        for word in [-999, -400, -301, -300, 900, 903, 912, 927, 936, 940, 999] {
            assert_eq!(Instruction::try_from(word), Err(word));
        }
        // just past the end of the stack-load range
        let machine = run(&[-300, 0]);
        assert_eq!(machine.error_code, Some(MachineError::UnknownInstruction));
    }

    #[test]
    fn poked_registers_cannot_overflow() {
        let mut machine = Machine::new();
        // ADD 10, STA 11, SPUSH, HLT
        machine.load(&[110, 311, 920, 0]).unwrap();
        machine.accumulator = Word::MAX;
        assert_eq!(machine.run(), Ok(()));
        assert_eq!(machine.accumulator, 999);
        assert_eq!(machine[11], 999);
        assert_eq!(machine[199], 999);

        for (pc, sp, rsp, word) in [
            (Word::MAX, STACK_EMPTY, RETURN_STACK_EMPTY, 0),
            (0, Word::MAX, RETURN_STACK_EMPTY, 920),
            (0, Word::MIN, RETURN_STACK_EMPTY, 921),
            (0, Word::MAX, RETURN_STACK_EMPTY, -3),
            (0, Word::MAX, RETURN_STACK_EMPTY, -210),
            (0, Word::MIN, RETURN_STACK_EMPTY, -410),
            (0, STACK_EMPTY, Word::MIN, 925),
            (0, STACK_EMPTY, Word::MAX, 926),
        ] {
            let mut machine = Machine::new();
            machine.load(&[word]).unwrap();
            machine.program_counter = pc;
            machine.stack_pointer = sp;
            machine.return_stack_pointer = rsp;
            assert!(machine.run().is_err(), "word {word} with pc={pc} sp={sp} rsp={rsp}");
            assert_eq!(machine.status, Status::Halted);
        }
    }

    #[test]
    fn accumulator_saturates() {
        // LDA 10, ADD 10, ADD 10, HLT ... 10: DAT 600
        let mut program = vec![510, 110, 110, 0];
        program.resize(10, 0);
        program.push(600);
        let machine = run(&program);
        assert_eq!(machine.accumulator, 999);

        // LDI 0, SUB 10, SUB 10, HLT
        program[..4].copy_from_slice(&[400, 210, 210, 0]);
        let machine = run(&program);
        assert_eq!(machine.accumulator, -999);
    }

    #[test]
    fn branches() {
        // LDI 0, BRZ 3, OUT, LDI 5, BRP 6, OUT, HLT
        let machine = run(&[400, 703, 902, 405, 806, 902, 0]);
        assert_eq!(machine.output(), "");
        assert_eq!(machine.error_code, None);
    }

    #[test]
    fn call_and_return() {
        // 0: LDI 4, JAL, OUT, HLT, 4: LDI 9, RET
        let machine = run(&[404, 910, 902, 0, 409, 911]);
        assert_eq!(machine.output(), "9 ");
        assert_eq!(machine.return_address, 2);
    }

    #[test]
    fn push_and_dup() {
        let mut machine = Machine::new();
        machine.accumulator = 10;
        machine.load(&[920, 922, 0]).unwrap();
        machine.run().unwrap();
        assert_eq!(machine[199], 10);
        assert_eq!(machine[198], 10);
        assert_eq!(machine.stack_pointer, 198);
    }

    #[test]
    fn binary_operand_order() {
        // LDI 10, SPUSH, LDI 20, SPUSH, SSUB, HLT
        let machine = run(&[410, 920, 420, 920, 931, 0]);
        assert_eq!(machine[199], -10);
        assert_eq!(machine.stack_pointer, 199);
        // the accumulator is untouched by stack arithmetic
        assert_eq!(machine.accumulator, 20);

        // LDI 20, SPUSH, LDI 10, SPUSH, SDIV, HLT
        let machine = run(&[420, 920, 410, 920, 933, 0]);
        assert_eq!(machine[199], 2);
    }

    #[test]
    fn stack_results_saturate() {
        // LDI 99, SPUSH, SPUSH, SMUL, SPUSH, SMUL, HLT
        let machine = run(&[499, 920, 920, 932, 920, 932, 0]);
        assert_eq!(machine[199], 999);
    }

    #[test]
    fn comparisons() {
        // LDI 5, SPUSH, LDI 3, SPUSH, SCMPGT, HLT
        let machine = run(&[405, 920, 403, 920, 937, 0]);
        assert_eq!(machine[199], 1);
        let machine = run(&[405, 920, 403, 920, 938, 0]);
        assert_eq!(machine[199], 0);
        // LDI 0, SPUSH, SNOT, SPOP, HLT
        let machine = run(&[400, 920, 939, 921, 0]);
        assert_eq!(machine.accumulator, 1);
    }

    #[test]
    fn division_by_zero_is_bad_stack() {
        // LDI 1, SPUSH, LDI 0, SPUSH, SDIV
        let machine = run(&[401, 920, 400, 920, 933, 0]);
        assert_eq!(machine.error_code, Some(MachineError::BadStack));
        assert_eq!(machine.status, Status::Halted);
    }

    #[test]
    fn return_stack() {
        // LDI 7, JAL -> ra = 2 ... 7: RPUSH, RPOP, HLT
        let machine = run(&[407, 910, 0, 0, 0, 0, 0, 925, 926, 0]);
        assert_eq!(machine.return_address, 2);
        assert_eq!(machine[100], 2);
        assert_eq!(machine.return_stack_pointer, RETURN_STACK_EMPTY);

        let machine = run(&[926]);
        assert_eq!(machine.error_code, Some(MachineError::BadStack));
    }

    #[test]
    fn stack_frames() {
        // LDI 1, SPUSH, LDI 2, SPUSH, SLDA 1, SPOP, HLT
        let machine = run(&[401, 920, 402, 920, -202, 921, 0]);
        assert_eq!(machine.accumulator, 1);
        assert_eq!(machine.stack_pointer, 198);

        // SPSUB 2 (reserve 3 slots), LDI 42, SPUSH, SSTA 2, SPADD 2, HLT
        let machine = run(&[-103, 442, 920, -403, -3, 0]);
        assert_eq!(machine.error_code, None);
        assert_eq!(machine[199], 42);
        assert_eq!(machine.stack_pointer, STACK_EMPTY);

        // SPADD 0 on an empty stack moves sp past the end of memory
        let machine = run(&[-1]);
        assert_eq!(machine.error_code, Some(MachineError::BadStack));
    }

    #[test]
    fn unknown_instruction_halts() {
        let machine = run(&[936]);
        assert_eq!(machine.status, Status::Halted);
        assert_eq!(machine.error_code, Some(MachineError::UnknownInstruction));
        assert_eq!(machine.program_counter, 1);
    }

    #[test]
    fn jumping_out_of_memory_halts() {
        let mut machine = Machine::new();
        machine.load(&[910]).unwrap();
        machine.accumulator = -5;
        assert_eq!(machine.run(), Err(MachineError::UnknownInstruction));
    }

    #[test]
    fn input_tokens() {
        let mut machine = Machine::new().with_input(Input::from_tokens("4 5"));
        // INP, OUT, INP, OUT, INP, OUT, HLT
        machine.load(&[901, 902, 901, 902, 901, 902, 0]).unwrap();
        machine.run().unwrap();
        assert_eq!(machine.output(), "4 5 0 ");
    }

    #[test]
    fn output_exhaustion() {
        // LDI 5, OUT, BRA 1; each OUT writes 2 bytes
        let machine = run(&[405, 902, 601]);
        assert_eq!(machine.error_code, Some(MachineError::OutputExhausted));
        assert_eq!(machine.output().len(), OUTPUT_CAPACITY);
    }

    #[test]
    fn restart_keeps_memory() {
        let mut machine = run(&[405, 902, 0]);
        machine.restart();
        assert_eq!(machine.status, Status::Ready);
        assert_eq!(machine.output(), "");
        assert_eq!(machine[0], 405);
        machine.run().unwrap();
        assert_eq!(machine.output(), "5 ");

        machine.reset();
        assert_eq!(machine, Machine::new());
    }

    #[test]
    fn register_access() {
        let mut machine = Machine::new();
        let sp: Register = "SP".parse().unwrap();
        assert_eq!(machine.register(sp), STACK_EMPTY);
        machine.set_register(sp, 150).unwrap();
        assert_eq!(machine.stack_pointer, 150);
        assert_eq!(
            machine.set_register(sp, 99),
            Err(AccessError::RegisterOutOfRange {
                register: sp,
                value: 99
            })
        );
        assert_eq!(machine.stack_pointer, 150);
        assert!("XYZ".parse::<Register>().is_err());
    }

    #[test]
    fn memory_access() {
        let mut machine = Machine::new();
        machine.mem_override(150, 5000).unwrap();
        assert_eq!(machine.mem_get(150), Ok(999));
        assert_eq!(machine.mem_get(200), Err(AccessError::AddressOutOfRange(200)));
        assert_eq!(
            machine.mem_override(-1, 0),
            Err(AccessError::AddressOutOfRange(-1))
        );
        assert_eq!(
            machine.load(&[0; MEMORY_SIZE + 1]),
            Err(AccessError::ProgramTooLarge(MEMORY_SIZE + 1))
        );
    }

    #[test]
    fn awaiting_input() {
        let mut machine = Machine::new().with_input(Input::from_tokens("1"));
        machine.load(&[901, 0]).unwrap();
        assert!(machine.awaiting_input());
        machine.step().unwrap();
        assert!(!machine.awaiting_input());
    }

    #[test]
    fn diagnostic_output() {
        let machine = run(&[405, 920, 902, 0]);
        let mut out = Vec::new();
        machine.write_diagnostic(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("status: halted | error: (nil)"));
        assert!(text.contains("PC: 4 | ACC: 5 | SP: 199 | RA: 0 | RP: 99"));
        assert!(text.contains("stack: 5"));
        assert!(text.contains("next: HLT - halt the machine"));
        // trailing zeroed memory is left out of the disassembly
        assert!(text.ends_with("LDI 5\nSPUSH\nOUT\n\n"));
    }
}
