//! Minimal textual ladder grammar: one mnemonic plus operands per line,
//! e.g. `LD X0`, `OUT_T 0 20`, `END`. Covers exactly the instruction set
//! understood by [`crate::ladder`].

use mc_proto::DeviceType;
use thiserror::Error;

use crate::ladder::{DeviceRef, Instruction, Operand};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unknown mnemonic {mnemonic:?}")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: expected {expected} operand(s)")]
    WrongArity { line: usize, expected: usize },
    #[error("line {line}: bad device reference {token:?}")]
    BadDevice { line: usize, token: String },
    #[error("line {line}: bad number {token:?}")]
    BadNumber { line: usize, token: String },
}

fn parse_device(line: usize, token: &str) -> Result<DeviceRef, ParseError> {
    let split_at = token.find(|c: char| c.is_ascii_digit()).ok_or_else(|| ParseError::BadDevice {
        line,
        token: token.to_string(),
    })?;
    let (code, addr) = token.split_at(split_at);
    let device = DeviceType::from_code(code).ok_or_else(|| ParseError::BadDevice { line, token: token.to_string() })?;
    let address = device
        .parse_address(addr)
        .ok_or_else(|| ParseError::BadDevice { line, token: token.to_string() })?;
    Ok(DeviceRef::new(device, address))
}

fn parse_u16(line: usize, token: &str) -> Result<u16, ParseError> {
    token.parse().map_err(|_| ParseError::BadNumber { line, token: token.to_string() })
}

fn parse_operand(line: usize, token: &str) -> Result<Operand, ParseError> {
    if let Ok(n) = token.parse::<i32>() {
        Ok(Operand::Immediate(n))
    } else {
        parse_device(line, token).map(Operand::Device)
    }
}

/// Parse a full ladder program from its textual representation.
pub fn parse_program(text: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut program = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let mnemonic = tokens.next().unwrap().to_ascii_uppercase();
        let rest: Vec<&str> = tokens.collect();

        macro_rules! dev {
            ($i:expr) => {
                parse_device(line, *rest.get($i).ok_or(ParseError::WrongArity { line, expected: $i + 1 })?)?
            };
        }
        macro_rules! num {
            ($i:expr) => {
                parse_u16(line, *rest.get($i).ok_or(ParseError::WrongArity { line, expected: $i + 1 })?)?
            };
        }
        macro_rules! op {
            ($i:expr) => {
                parse_operand(line, *rest.get($i).ok_or(ParseError::WrongArity { line, expected: $i + 1 })?)?
            };
        }

        let instruction = match mnemonic.as_str() {
            "LD" => Instruction::Ld(dev!(0)),
            "LDI" => Instruction::Ldi(dev!(0)),
            "AND" => Instruction::And(dev!(0)),
            "ANI" => Instruction::Ani(dev!(0)),
            "OR" => Instruction::Or(dev!(0)),
            "ORI" => Instruction::Ori(dev!(0)),
            "ANB" => Instruction::Anb,
            "ORB" => Instruction::Orb,
            "MPS" => Instruction::Mps,
            "MRD" => Instruction::Mrd,
            "MPP" => Instruction::Mpp,
            "OUT" => Instruction::Out(dev!(0)),
            "SET" => Instruction::Set(dev!(0)),
            "RST" => Instruction::Rst(dev!(0)),
            "PLS" => Instruction::Pls(dev!(0)),
            "PLF" => Instruction::Plf(dev!(0)),
            "OUT_T" => Instruction::OutT { timer: num!(0), setpoint: num!(1) },
            "OUT_C" => Instruction::OutC { counter: num!(0), setpoint: num!(1) },
            "RST_T" => Instruction::RstT(num!(0)),
            "RST_C" => Instruction::RstC(num!(0)),
            "MOV" => Instruction::Mov(op!(0), dev!(1)),
            "ADD" => Instruction::Add(op!(0), op!(1), dev!(2)),
            "SUB" => Instruction::Sub(op!(0), op!(1), dev!(2)),
            "MUL" => Instruction::Mul(op!(0), op!(1), dev!(2)),
            "DIV" => Instruction::Div(op!(0), op!(1), dev!(2)),
            "END" => Instruction::End,
            "NOP" => Instruction::Nop,
            other => return Err(ParseError::UnknownMnemonic { line, mnemonic: other.to_string() }),
        };
        program.push(instruction);
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_self_hold_program() {
        let program = parse_program("LD X0\nOR Y0\nANI X1\nOUT Y0\nEND\n").unwrap();
        assert_eq!(program.len(), 5);
        assert!(matches!(program[4], Instruction::End));
    }

    #[test]
    fn parses_timer_program_with_comments() {
        let text = "; a comment\nLD X0\nOUT_T 0 20\nEND";
        let program = parse_program(text).unwrap();
        assert_eq!(program.len(), 3);
        assert!(matches!(program[1], Instruction::OutT { timer: 0, setpoint: 20 }));
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let result = parse_program("FOO X0");
        assert!(result.is_err());
    }
}
