// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Disassembler-related functionality
//!
//! See [disassemble] for documentation

use super::{Instruction, StackOp, Word};

/// Create disassembly from LMSM memory
///
/// Each word becomes one line of assembly. Words that decode as an instruction are written as that
/// instruction, and anything else is written as a `DAT` directive.
///
/// # Example
///
/// ```
/// use lmsm::{asm::assemble, disasm::disassemble};
/// const COUNT: &str = r#"
/// loop LDA n
///      OUT
///      SUB one
///      STA n
///      BRP loop
///      HLT
/// one  DAT 1
/// n    DAT 2
/// "#;
/// let code = assemble(COUNT).unwrap();
///
/// const EXPECTED_DISASM: &str = r#"
/// LDA 7
/// OUT
/// SUB 6
/// STA 7
/// BRP 0
/// HLT
/// DAT 1
/// DAT 2
/// "#.trim_ascii_start();
/// assert_eq!(disassemble(code[..8].iter().copied()), EXPECTED_DISASM);
/// ```
///
/// # Caveats
///
/// ## Data Looks Like Code
///
/// There's no way to tell whether an instruction or a `DAT` directive produced a given word, so
/// data that happens to be a valid instruction is written as that instruction. Only words that
/// aren't valid instructions are written as `DAT`:
///
/// ```
/// use lmsm::disasm::disassemble;
/// assert_eq!(disassemble([936, -350, 1000, 105]), "DAT 936\nDAT -350\nDAT 1000\nADD 5\n");
/// ```
///
/// ## Synthetic Instructions
///
/// `CALL`, `SPUSHI`, `COB` and `NOP` don't have their own encodings, so they come back out as the
/// instructions they were assembled into:
///
/// ```
/// use lmsm::{asm::assemble, disasm::disassemble};
/// let code = assemble("CALL 3\nSPUSHI 7\nNOP\nCOB").unwrap();
/// assert_eq!(
///     disassemble(code[..6].iter().copied()),
///     "LDI 3\nJAL\nLDI 7\nSPUSH\nBRA 5\nHLT\n"
/// );
/// ```
///
/// ## Self-modifying Code
///
/// Because programs can store over their own code, disassembly only shows memory as it is at a
/// specific point in time, not what will be there when it's executed.
#[must_use]
pub fn disassemble(mem_iter: impl IntoIterator<Item = Word>) -> String {
    let mut disassembly = String::new();
    for word in mem_iter {
        match Instruction::try_from(word) {
            Ok(instruction) => disassembly.push_str(&instruction.to_string()),
            Err(word) => disassembly.push_str(&format!("DAT {word}")),
        }
        disassembly.push('\n');
    }
    disassembly
}

fn describe(instruction: Instruction) -> String {
    match instruction {
        Instruction::Halt => String::from("halt the machine"),
        Instruction::Add(d) => format!("add the value at address {d} to the accumulator"),
        Instruction::Sub(d) => format!("subtract the value at address {d} from the accumulator"),
        Instruction::Store(d) => format!("store the accumulator at address {d}"),
        Instruction::LoadImmediate(d) => format!("load {d} into the accumulator"),
        Instruction::Load(d) => format!("load the value at address {d} into the accumulator"),
        Instruction::Branch(d) => format!("jump to address {d}"),
        Instruction::BranchZero(d) => format!("jump to address {d} if the accumulator is zero"),
        Instruction::BranchPositive(d) => {
            format!("jump to address {d} if the accumulator is zero or positive")
        }
        Instruction::Input => String::from("read a number into the accumulator"),
        Instruction::Output => String::from("output the accumulator"),
        Instruction::JumpAndLink => {
            String::from("save the next address as the return address, then jump to the accumulator")
        }
        Instruction::Return => String::from("jump to the return address"),
        Instruction::Push => String::from("push the accumulator onto the stack"),
        Instruction::Pop => String::from("pop the top of the stack into the accumulator"),
        Instruction::Dup => String::from("duplicate the top of the stack"),
        Instruction::Drop => String::from("discard the top of the stack"),
        Instruction::Swap => String::from("swap the top two values on the stack"),
        Instruction::ReturnPush => String::from("push the return address onto the return stack"),
        Instruction::ReturnPop => String::from("pop the return stack into the return address"),
        Instruction::Binary(op) => {
            let action = match op {
                StackOp::Add => "add them",
                StackOp::Sub => "subtract the top from the second",
                StackOp::Mul => "multiply them",
                StackOp::Div => "divide the second by the top",
                StackOp::Max => "keep the larger",
                StackOp::Min => "keep the smaller",
                StackOp::Greater => "check if the second is greater than the top",
                StackOp::Less => "check if the second is less than the top",
            };
            format!("pop the top two values on the stack, {action}, and push the result")
        }
        Instruction::Not => String::from("logically negate the top of the stack"),
        Instruction::StackPointerAdd(d) => {
            format!("drop {} values from the stack", i64::from(d) + 1)
        }
        Instruction::StackPointerSub(d) => {
            format!("reserve {} values on the stack", i64::from(d) + 1)
        }
        Instruction::StackLoad(d) => {
            format!("push the value {d} below the top of the stack")
        }
        Instruction::StackStore(d) => {
            format!("pop the top of the stack, and store it {d} below the new top")
        }
    }
}

/// Explain what a single word does when executed
///
/// ```
/// use lmsm::disasm::explain;
/// assert_eq!(explain(0), "HLT - halt the machine");
/// assert_eq!(explain(512), "LDA 12 - load the value at address 12 into the accumulator");
/// assert_eq!(explain(-2), "SPADD 1 - drop 2 values from the stack");
/// assert_eq!(explain(950), "DAT 950 - not a valid instruction");
/// ```
#[must_use]
pub fn explain(word: Word) -> String {
    match Instruction::try_from(word) {
        Ok(instruction) => format!("{instruction} - {}", describe(instruction)),
        Err(word) => format!("DAT {word} - not a valid instruction"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    #[test]
    fn disassembly_reassembles() {
        let src = "INP\nSPUSH\nSDUP\nSMUL\nSPOP\nOUT\nSLDA 3\nSSTA 2\nSPSUB 1\nSPADD 0\nSCMPGT\nSNOT\nHLT\n";
        let code = assemble(src).unwrap();
        let disasm = disassemble(code[..13].iter().copied());
        assert_eq!(disasm, src);
        assert_eq!(assemble(&disasm).unwrap(), code);
    }

    #[test]
    fn every_decodable_word_is_explained() {
        for word in -999..=999 {
            let explanation = explain(word);
            let name = explanation.split(' ').next().unwrap();
            match Instruction::try_from(word) {
                Ok(instruction) => assert_eq!(name, instruction.mnemonic().name()),
                Err(_) => assert_eq!(name, "DAT"),
            }
        }
    }

    #[test]
    fn empty() {
        assert_eq!(disassemble(std::iter::empty()), "");
    }
}
