//! Two-stack ladder instruction set and a cooperative fixed-interval scanner.

use std::collections::HashMap;
use std::time::Instant;

use mc_proto::DeviceType;

use crate::device_store::DeviceStore;

/// A device operand: type plus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    pub device: DeviceType,
    pub address: u32,
}

impl DeviceRef {
    pub const fn new(device: DeviceType, address: u32) -> Self {
        DeviceRef { device, address }
    }
}

/// A scalar operand to `MOV`/arithmetic instructions: a device reference or
/// an immediate constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Device(DeviceRef),
    Immediate(i32),
}

/// One ladder instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ld(DeviceRef),
    Ldi(DeviceRef),
    And(DeviceRef),
    Ani(DeviceRef),
    Or(DeviceRef),
    Ori(DeviceRef),
    Anb,
    Orb,
    Mps,
    Mrd,
    Mpp,
    Out(DeviceRef),
    Set(DeviceRef),
    Rst(DeviceRef),
    Pls(DeviceRef),
    Plf(DeviceRef),
    OutT { timer: u16, setpoint: u16 },
    OutC { counter: u16, setpoint: u16 },
    RstT(u16),
    RstC(u16),
    Mov(Operand, DeviceRef),
    Add(Operand, Operand, DeviceRef),
    Sub(Operand, Operand, DeviceRef),
    Mul(Operand, Operand, DeviceRef),
    Div(Operand, Operand, DeviceRef),
    End,
    Nop,
}

#[derive(Default)]
struct TimerState {
    start: Option<Instant>,
    current: u16,
    setpoint: u16,
}

#[derive(Default)]
struct CounterState {
    count: u16,
    prev_input: bool,
}

/// Owns timer/counter state and the edge-detection memory for `PLS`/`PLF`,
/// independent of any one program.
pub struct EngineState {
    timers: HashMap<u16, TimerState>,
    counters: HashMap<u16, CounterState>,
    edge_memory: HashMap<DeviceRef, bool>,
}

impl EngineState {
    pub fn new() -> Self {
        EngineState {
            timers: HashMap::new(),
            counters: HashMap::new(),
            edge_memory: HashMap::new(),
        }
    }

    /// Advance all running timers; mirrors the elapsed time into `TN<n>`
    /// and the reached-setpoint contact into `TC<n>` in the device store.
    /// The accumulated value never exceeds the timer's setpoint.
    pub fn tick_timers(&mut self, store: &DeviceStore, now: Instant) {
        for (&n, state) in self.timers.iter_mut() {
            if let Some(start) = state.start {
                let elapsed_100ms = (now.duration_since(start).as_millis() / 100) as u16;
                state.current = elapsed_100ms.min(state.setpoint);
                let _ = store.set_word(DeviceType::TN, n as u32, state.current);
            }
        }
    }

    /// Clear a timer's running state and mirror zero into its device cells.
    pub fn reset_timer(&mut self, store: &DeviceStore, n: u16) {
        self.timers.remove(&n);
        let _ = store.set_word(DeviceType::TN, n as u32, 0);
        let _ = store.set_bit(DeviceType::TC, n as u32, false);
        let _ = store.set_bit(DeviceType::TS, n as u32, false);
    }

    /// Clear a counter's running state and mirror zero into its device cells.
    pub fn reset_counter(&mut self, store: &DeviceStore, n: u16) {
        self.counters.remove(&n);
        let _ = store.set_word(DeviceType::CN, n as u32, 0);
        let _ = store.set_bit(DeviceType::CC, n as u32, false);
        let _ = store.set_bit(DeviceType::CS, n as u32, false);
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

fn read_word(store: &DeviceStore, r: DeviceRef) -> u16 {
    store.get_word(r.device, r.address)
}

fn operand_value(store: &DeviceStore, op: Operand) -> i32 {
    match op {
        Operand::Immediate(v) => v,
        Operand::Device(r) => read_word(store, r) as i32,
    }
}

/// Run one program's instruction list once through.
pub fn run_program(program: &[Instruction], store: &DeviceStore, state: &mut EngineState, now: Instant) {
    let mut current = false;
    let mut aux_stack: Vec<bool> = Vec::new();
    let mut memory_stack: Vec<bool> = Vec::new();

    for instr in program {
        match *instr {
            Instruction::Ld(r) => {
                current = store.get_bit(r.device, r.address);
                aux_stack.push(current);
            }
            Instruction::Ldi(r) => {
                current = !store.get_bit(r.device, r.address);
                aux_stack.push(current);
            }
            Instruction::And(r) => current = current && store.get_bit(r.device, r.address),
            Instruction::Ani(r) => current = current && !store.get_bit(r.device, r.address),
            Instruction::Or(r) => current = current || store.get_bit(r.device, r.address),
            Instruction::Ori(r) => current = current || !store.get_bit(r.device, r.address),
            Instruction::Anb => {
                let rhs = aux_stack.pop().unwrap_or(current);
                let lhs = aux_stack.pop().unwrap_or(current);
                current = lhs && rhs;
                aux_stack.push(current);
            }
            Instruction::Orb => {
                let rhs = aux_stack.pop().unwrap_or(current);
                let lhs = aux_stack.pop().unwrap_or(current);
                current = lhs || rhs;
                aux_stack.push(current);
            }
            Instruction::Mps => memory_stack.push(current),
            Instruction::Mrd => current = *memory_stack.last().unwrap_or(&current),
            Instruction::Mpp => current = memory_stack.pop().unwrap_or(current),
            Instruction::Out(r) => {
                let _ = store.set_bit(r.device, r.address, current);
            }
            Instruction::Set(r) => {
                if current {
                    let _ = store.set_bit(r.device, r.address, true);
                }
            }
            Instruction::Rst(r) => {
                if current {
                    let _ = store.set_bit(r.device, r.address, false);
                }
            }
            Instruction::Pls(r) => {
                let prev = state.edge_memory.get(&r).copied().unwrap_or(false);
                let _ = store.set_bit(r.device, r.address, current && !prev);
                state.edge_memory.insert(r, current);
            }
            Instruction::Plf(r) => {
                let prev = state.edge_memory.get(&r).copied().unwrap_or(false);
                let _ = store.set_bit(r.device, r.address, !current && prev);
                state.edge_memory.insert(r, current);
            }
            Instruction::OutT { timer, setpoint } => {
                let entry = state.timers.entry(timer).or_default();
                entry.setpoint = setpoint;
                if current {
                    if entry.start.is_none() {
                        entry.start = Some(now);
                    }
                    let _ = store.set_bit(DeviceType::TS, timer as u32, true);
                    let reached = entry.current >= setpoint;
                    let _ = store.set_bit(DeviceType::TC, timer as u32, reached);
                } else {
                    entry.start = None;
                    entry.current = 0;
                    let _ = store.set_word(DeviceType::TN, timer as u32, 0);
                    let _ = store.set_bit(DeviceType::TC, timer as u32, false);
                    let _ = store.set_bit(DeviceType::TS, timer as u32, false);
                }
            }
            Instruction::OutC { counter, setpoint } => {
                let entry = state.counters.entry(counter).or_default();
                if current && !entry.prev_input && entry.count < setpoint {
                    entry.count += 1;
                }
                entry.prev_input = current;
                let _ = store.set_word(DeviceType::CN, counter as u32, entry.count);
                let _ = store.set_bit(DeviceType::CC, counter as u32, entry.count >= setpoint);
            }
            Instruction::RstT(n) => state.reset_timer(store, n),
            Instruction::RstC(n) => state.reset_counter(store, n),
            Instruction::Mov(src, dst) => {
                if current {
                    let value = operand_value(store, src) as u16;
                    let _ = store.set_word(dst.device, dst.address, value);
                }
            }
            Instruction::Add(a, b, dst) => {
                if current {
                    let value = (operand_value(store, a).wrapping_add(operand_value(store, b))) as u16;
                    let _ = store.set_word(dst.device, dst.address, value);
                }
            }
            Instruction::Sub(a, b, dst) => {
                if current {
                    let value = (operand_value(store, a).wrapping_sub(operand_value(store, b))) as u16;
                    let _ = store.set_word(dst.device, dst.address, value);
                }
            }
            Instruction::Mul(a, b, dst) => {
                if current {
                    let value = (operand_value(store, a).wrapping_mul(operand_value(store, b))) as u16;
                    let _ = store.set_word(dst.device, dst.address, value);
                }
            }
            Instruction::Div(a, b, dst) => {
                if current {
                    let divisor = operand_value(store, b);
                    if divisor != 0 {
                        let value = (operand_value(store, a) / divisor) as u16;
                        let _ = store.set_word(dst.device, dst.address, value);
                    }
                }
            }
            Instruction::End => break,
            Instruction::Nop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_store::Series;
    use mc_proto::DeviceType::*;

    fn store() -> DeviceStore {
        DeviceStore::new(Series::Q)
    }

    #[test]
    fn self_hold_latches_until_reset_input() {
        let store = store();
        let mut state = EngineState::new();
        let program = [
            Instruction::Ld(DeviceRef::new(X, 0)),
            Instruction::Or(DeviceRef::new(Y, 0)),
            Instruction::Ani(DeviceRef::new(X, 1)),
            Instruction::Out(DeviceRef::new(Y, 0)),
        ];

        store.set_bit(X, 0, true).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert!(store.get_bit(Y, 0));

        store.set_bit(X, 0, false).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert!(store.get_bit(Y, 0));

        store.set_bit(X, 1, true).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert!(!store.get_bit(Y, 0));
    }

    #[test]
    fn pls_fires_once_on_rising_edge() {
        let store = store();
        let mut state = EngineState::new();
        let program = [Instruction::Ld(DeviceRef::new(X, 0)), Instruction::Pls(DeviceRef::new(M, 0))];

        store.set_bit(X, 0, false).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert!(!store.get_bit(M, 0));

        store.set_bit(X, 0, true).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert!(store.get_bit(M, 0));

        run_program(&program, &store, &mut state, Instant::now());
        assert!(!store.get_bit(M, 0));
    }

    #[test]
    fn counter_increments_on_rising_edge_and_reaches_setpoint() {
        let store = store();
        let mut state = EngineState::new();
        let program = [Instruction::Ld(DeviceRef::new(X, 0)), Instruction::OutC { counter: 0, setpoint: 2 }];

        for _ in 0..2 {
            store.set_bit(X, 0, false).unwrap();
            run_program(&program, &store, &mut state, Instant::now());
            store.set_bit(X, 0, true).unwrap();
            run_program(&program, &store, &mut state, Instant::now());
        }
        assert_eq!(store.get_word(CN, 0), 2);
        assert!(store.get_bit(CC, 0));
    }

    #[test]
    fn mov_is_conditional_on_current_and_wraps() {
        let store = store();
        let mut state = EngineState::new();
        let program = [
            Instruction::Ld(DeviceRef::new(X, 0)),
            Instruction::Mov(Operand::Immediate(70000), DeviceRef::new(D, 0)),
        ];
        store.set_bit(X, 0, true).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert_eq!(store.get_word(D, 0), (70000i32 as u16));
    }

    #[test]
    fn div_by_zero_is_skipped() {
        let store = store();
        let mut state = EngineState::new();
        store.set_word(D, 0, 10).unwrap();
        let program = [
            Instruction::Ld(DeviceRef::new(X, 0)),
            Instruction::Div(Operand::Device(DeviceRef::new(D, 0)), Operand::Immediate(0), DeviceRef::new(D, 1)),
        ];
        store.set_bit(X, 0, true).unwrap();
        store.set_word(D, 1, 99).unwrap();
        run_program(&program, &store, &mut state, Instant::now());
        assert_eq!(store.get_word(D, 1), 99);
    }

    #[test]
    fn rst_t_clears_mirrored_device_cells() {
        let store = store();
        let mut state = EngineState::new();
        store.set_word(TN, 0, 42).unwrap();
        store.set_bit(TC, 0, true).unwrap();
        state.reset_timer(&store, 0);
        assert_eq!(store.get_word(TN, 0), 0);
        assert!(!store.get_bit(TC, 0));
    }

    #[test]
    fn timer_current_never_exceeds_setpoint() {
        let store = store();
        let mut state = EngineState::new();
        let program = [Instruction::Ld(DeviceRef::new(X, 0)), Instruction::OutT { timer: 0, setpoint: 1 }];

        let start = Instant::now();
        store.set_bit(X, 0, true).unwrap();
        run_program(&program, &store, &mut state, start);

        let well_past_setpoint = start + std::time::Duration::from_millis(500);
        state.tick_timers(&store, well_past_setpoint);
        run_program(&program, &store, &mut state, well_past_setpoint);

        assert_eq!(store.get_word(TN, 0), 1);
        assert!(store.get_bit(TC, 0));
    }
}
