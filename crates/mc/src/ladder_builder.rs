//! Chained, readable construction of instruction lists — kept deliberately
//! separate from the interpreter in [`crate::ladder`].

use mc_proto::DeviceType;

use crate::ladder::{DeviceRef, Instruction, Operand};

fn device_ref(code: &str, address: u32) -> DeviceRef {
    let device = DeviceType::from_code(code).unwrap_or_else(|| panic!("unknown device code {code}"));
    DeviceRef::new(device, address)
}

fn parse_ref(token: &str) -> DeviceRef {
    let split_at = token.find(|c: char| c.is_ascii_digit()).unwrap_or(token.len());
    let (code, addr) = token.split_at(split_at);
    let device = DeviceType::from_code(code).unwrap_or_else(|| panic!("unknown device code {code}"));
    let address = device.parse_address(addr).unwrap_or_else(|| panic!("bad address {addr}"));
    DeviceRef::new(device, address)
}

/// Builds an instruction list with `.ld("X0").or_("Y0").ani("X1").out("Y0")`
/// style chained calls.
#[derive(Default)]
pub struct LadderProgramBuilder {
    instructions: Vec<Instruction>,
}

impl LadderProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ld(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Ld(parse_ref(device)));
        self
    }

    pub fn ldi(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Ldi(parse_ref(device)));
        self
    }

    pub fn and(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::And(parse_ref(device)));
        self
    }

    pub fn ani(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Ani(parse_ref(device)));
        self
    }

    pub fn or_(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Or(parse_ref(device)));
        self
    }

    pub fn ori(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Ori(parse_ref(device)));
        self
    }

    pub fn anb(mut self) -> Self {
        self.instructions.push(Instruction::Anb);
        self
    }

    pub fn orb(mut self) -> Self {
        self.instructions.push(Instruction::Orb);
        self
    }

    pub fn mps(mut self) -> Self {
        self.instructions.push(Instruction::Mps);
        self
    }

    pub fn mrd(mut self) -> Self {
        self.instructions.push(Instruction::Mrd);
        self
    }

    pub fn mpp(mut self) -> Self {
        self.instructions.push(Instruction::Mpp);
        self
    }

    pub fn out(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Out(parse_ref(device)));
        self
    }

    pub fn set(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Set(parse_ref(device)));
        self
    }

    pub fn rst(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Rst(parse_ref(device)));
        self
    }

    pub fn pls(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Pls(parse_ref(device)));
        self
    }

    pub fn plf(mut self, device: &str) -> Self {
        self.instructions.push(Instruction::Plf(parse_ref(device)));
        self
    }

    pub fn out_t(mut self, timer: u16, setpoint: u16) -> Self {
        self.instructions.push(Instruction::OutT { timer, setpoint });
        self
    }

    pub fn out_c(mut self, counter: u16, setpoint: u16) -> Self {
        self.instructions.push(Instruction::OutC { counter, setpoint });
        self
    }

    pub fn rst_t(mut self, timer: u16) -> Self {
        self.instructions.push(Instruction::RstT(timer));
        self
    }

    pub fn rst_c(mut self, counter: u16) -> Self {
        self.instructions.push(Instruction::RstC(counter));
        self
    }

    pub fn mov(mut self, src: Operand, dst_code: &str, dst_addr: u32) -> Self {
        self.instructions.push(Instruction::Mov(src, device_ref(dst_code, dst_addr)));
        self
    }

    pub fn end(mut self) -> Self {
        self.instructions.push(Instruction::End);
        self
    }

    pub fn nop(mut self) -> Self {
        self.instructions.push(Instruction::Nop);
        self
    }

    pub fn build(self) -> Vec<Instruction> {
        self.instructions
    }
}

/// Entry point mirroring `LadderProgramBuilder::new()` for call-site brevity.
pub fn build() -> LadderProgramBuilder {
    LadderProgramBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_hold_program_builds_expected_instructions() {
        let program = build().ld("X0").or_("Y0").ani("X1").out("Y0").build();
        assert_eq!(program.len(), 4);
        assert!(matches!(program[3], Instruction::Out(_)));
    }
}
