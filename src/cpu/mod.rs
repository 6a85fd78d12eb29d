//! Cycle-accurate MOS 6502 core.
//!
//! One call to [`Cpu::tick`] (invoked by the clock's rising half-phase, see
//! `clock::Chip`) advances exactly one clock cycle: it consumes the result of
//! whatever bus request was issued on the previous cycle and issues the next
//! one, following the per-addressing-mode micro-sequences and the 7-cycle
//! reset/NMI/IRQ/BRK service sequence. Exact per-cycle semantics (address
//! sequencing, ALU flag formulas, the BRK operand-skip behavior) are grounded
//! on `examples/original_source/m6502.c`.

pub mod alu;
pub mod opcodes;

use crate::bus::Bus;
use crate::clock::Chip;
use opcodes::{decode, Kind, Mode, Op};
use serde::{Deserialize, Serialize};

const STACK_PAGE: u16 = 0x0100;
const VEC_NMI: u16 = 0xFFFA;
const VEC_RESET: u16 = 0xFFFC;
const VEC_IRQ: u16 = 0xFFFE;

const BRK_RST: u8 = 0x04;
const BRK_NMI: u8 = 0x02;
const BRK_IRQ: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum InterruptKind {
    None,
    Rst,
    Nmi,
    Irq,
    Brk,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub pc: u16,
    pub p: u8,

    step: u8,
    opcode: u8,
    mode: Mode,
    op: Op,

    lo: u8,
    hi: u8,
    zp_ptr: u8,
    eff_addr: u16,
    operand: u8,
    new_value: u8,
    page_crossed: bool,

    sync: bool,
    break_status: u8,
    interrupt_kind: InterruptKind,
    is_interrupt_hijack: bool,

    reset_pin: bool,
    nmi_pin: bool,
    nmi_prev: bool,
    irq_pin: bool,
    ready: bool,
    so_pin: bool,

    last_rw: bool,
    tick_count: u64,
    crashed: Option<(u8, u16)>,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFF,
            pc: 0,
            p: alu::FLAG_U | alu::FLAG_I,
            step: 0,
            opcode: 0,
            mode: Mode::Imp,
            op: Op::Nop,
            lo: 0,
            hi: 0,
            zp_ptr: 0,
            eff_addr: 0,
            operand: 0,
            new_value: 0,
            page_crossed: false,
            sync: true,
            break_status: BRK_RST,
            interrupt_kind: InterruptKind::None,
            is_interrupt_hijack: false,
            reset_pin: false,
            nmi_pin: false,
            nmi_prev: false,
            irq_pin: false,
            ready: true,
            so_pin: false,
            last_rw: true,
            tick_count: 0,
            crashed: None,
        }
    }

    pub fn set_reset(&mut self, asserted: bool) {
        self.reset_pin = asserted;
    }

    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_pin = asserted;
    }

    pub fn set_nmi(&mut self, asserted: bool) {
        self.nmi_pin = asserted;
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_overflow(&mut self, asserted: bool) {
        self.so_pin = asserted;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn crashed(&self) -> Option<(u8, u16)> {
        self.crashed
    }

    fn set_bus(&mut self, bus: &mut Bus, addr: u16, rw: bool, data: u8) {
        bus.addr = addr;
        bus.rw = rw;
        if !rw {
            bus.data = data;
        }
        self.last_rw = rw;
    }

    fn advance(&mut self, bus: &mut Bus) {
        if self.crashed.is_some() {
            return;
        }
        self.tick_count += 1;

        if self.nmi_pin && !self.nmi_prev {
            self.break_status |= BRK_NMI;
        }
        self.nmi_prev = self.nmi_pin;
        if self.irq_pin {
            self.break_status |= BRK_IRQ;
        }
        if self.reset_pin {
            self.break_status |= BRK_RST;
        }
        if self.so_pin {
            self.p |= alu::FLAG_V;
        }

        if !self.ready && self.last_rw {
            return;
        }

        let fetched = if self.last_rw { Some(bus.data) } else { None };

        if self.sync {
            self.begin_instruction(bus, fetched);
        } else {
            self.continue_instruction(bus, fetched);
        }
    }

    fn begin_instruction(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        self.sync = false;
        let irq_masked = self.p & alu::FLAG_I != 0;
        let pending_rst = self.break_status & BRK_RST != 0;
        let pending_nmi = self.break_status & BRK_NMI != 0;
        let pending_irq = self.break_status & BRK_IRQ != 0 && !irq_masked;

        if pending_rst || pending_nmi || pending_irq {
            self.interrupt_kind = if pending_rst {
                InterruptKind::Rst
            } else if pending_nmi {
                InterruptKind::Nmi
            } else {
                InterruptKind::Irq
            };
            self.is_interrupt_hijack = true;
            self.opcode = 0x00;
            self.op = Op::Brk;
            self.mode = Mode::Imp;
        } else {
            let opcode = fetched.expect("opcode fetch is always a read");
            self.opcode = opcode;
            self.pc = self.pc.wrapping_add(1);
            match decode(opcode) {
                Some((op, mode)) => {
                    self.op = op;
                    self.mode = mode;
                    self.is_interrupt_hijack = false;
                    if op == Op::Brk {
                        self.interrupt_kind = InterruptKind::Brk;
                    }
                }
                None => {
                    self.crash(bus);
                    return;
                }
            }
        }
        self.step = 0;
        self.page_crossed = false;
        self.continue_instruction(bus, None);
    }

    fn crash(&mut self, _bus: &mut Bus) {
        log::error!(
            "CPU halted: illegal opcode ${:02X} at ${:04X} (A={:02X} X={:02X} Y={:02X} S={:02X} P={:02X})",
            self.opcode, self.pc, self.a, self.x, self.y, self.s, self.p
        );
        self.crashed = Some((self.opcode, self.pc));
    }

    fn finish(&mut self, bus: &mut Bus) {
        self.set_bus(bus, self.pc, true, 0);
        self.sync = true;
    }

    fn continue_instruction(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        if self.mode == Mode::Acc {
            self.step_accumulator(bus, fetched);
            return;
        }
        if self.mode == Mode::Imm {
            self.step_immediate(bus, fetched);
            return;
        }
        match self.op.kind() {
            Kind::Implied => self.step_implied(bus, fetched),
            Kind::Branch => self.step_branch(bus, fetched),
            Kind::Jmp => self.step_jmp(bus, fetched),
            Kind::Jsr => self.step_jsr(bus, fetched),
            Kind::Rts => self.step_rts(bus, fetched),
            Kind::Rti => self.step_rti(bus, fetched),
            Kind::Brk => self.step_brk(bus, fetched),
            Kind::Push => self.step_push(bus, fetched),
            Kind::Pull => self.step_pull(bus, fetched),
            Kind::Read | Kind::Write | Kind::ReadModifyWrite => self.step_memory_op(bus, fetched),
        }
    }

    fn step_memory_op(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.mode {
            Mode::Zp => self.step_zp(bus, fetched),
            Mode::Zpx => self.step_zp_indexed(bus, fetched, self.x),
            Mode::Zpy => self.step_zp_indexed(bus, fetched, self.y),
            Mode::Abs => self.step_abs(bus, fetched),
            Mode::Abx => self.step_abs_indexed(bus, fetched, self.x),
            Mode::Aby => self.step_abs_indexed(bus, fetched, self.y),
            Mode::Izx => self.step_izx(bus, fetched),
            Mode::Izy => self.step_izy(bus, fetched),
            _ => unreachable!("memory-operand op with a non-memory mode"),
        }
    }

    fn register_value_for_store(&self) -> u8 {
        match self.op {
            Op::Sta => self.a,
            Op::Stx => self.x,
            Op::Sty => self.y,
            _ => unreachable!(),
        }
    }

    fn operate_read(&mut self, v: u8) {
        match self.op {
            Op::Adc => self.a = alu::adc(&mut self.p, self.a, v),
            Op::Sbc => self.a = alu::sbc(&mut self.p, self.a, v),
            Op::And => self.a = alu::and(&mut self.p, self.a, v),
            Op::Ora => self.a = alu::ora(&mut self.p, self.a, v),
            Op::Eor => self.a = alu::eor(&mut self.p, self.a, v),
            Op::Cmp => alu::compare(&mut self.p, self.a, v),
            Op::Cpx => alu::compare(&mut self.p, self.x, v),
            Op::Cpy => alu::compare(&mut self.p, self.y, v),
            Op::Bit => alu::bit(&mut self.p, self.a, v),
            Op::Lda => {
                self.a = v;
                alu::set_nz(&mut self.p, v);
            }
            Op::Ldx => {
                self.x = v;
                alu::set_nz(&mut self.p, v);
            }
            Op::Ldy => {
                self.y = v;
                alu::set_nz(&mut self.p, v);
            }
            _ => unreachable!(),
        }
    }

    fn operate_rmw(&mut self, v: u8) -> u8 {
        match self.op {
            Op::Asl => alu::asl(&mut self.p, v),
            Op::Lsr => alu::lsr(&mut self.p, v),
            Op::Rol => alu::rol(&mut self.p, v),
            Op::Ror => alu::ror(&mut self.p, v),
            Op::Inc => alu::inc(&mut self.p, v),
            Op::Dec => alu::dec(&mut self.p, v),
            _ => unreachable!(),
        }
    }

    fn operate_implied(&mut self) {
        match self.op {
            Op::Clc => self.p &= !alu::FLAG_C,
            Op::Sec => self.p |= alu::FLAG_C,
            Op::Cli => self.p &= !alu::FLAG_I,
            Op::Sei => self.p |= alu::FLAG_I,
            Op::Clv => self.p &= !alu::FLAG_V,
            Op::Cld => self.p &= !alu::FLAG_D,
            Op::Sed => self.p |= alu::FLAG_D,
            Op::Nop => {}
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                alu::set_nz(&mut self.p, self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                alu::set_nz(&mut self.p, self.y);
            }
            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                alu::set_nz(&mut self.p, self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                alu::set_nz(&mut self.p, self.y);
            }
            Op::Tax => {
                self.x = self.a;
                alu::set_nz(&mut self.p, self.x);
            }
            Op::Tay => {
                self.y = self.a;
                alu::set_nz(&mut self.p, self.y);
            }
            Op::Txa => {
                self.a = self.x;
                alu::set_nz(&mut self.p, self.a);
            }
            Op::Tya => {
                self.a = self.y;
                alu::set_nz(&mut self.p, self.a);
            }
            Op::Tsx => {
                self.x = self.s;
                alu::set_nz(&mut self.p, self.x);
            }
            Op::Txs => self.s = self.x,
            _ => unreachable!(),
        }
    }

    fn branch_taken(&self) -> bool {
        match self.op {
            Op::Bcc => self.p & alu::FLAG_C == 0,
            Op::Bcs => self.p & alu::FLAG_C != 0,
            Op::Bne => self.p & alu::FLAG_Z == 0,
            Op::Beq => self.p & alu::FLAG_Z != 0,
            Op::Bpl => self.p & alu::FLAG_N == 0,
            Op::Bmi => self.p & alu::FLAG_N != 0,
            Op::Bvc => self.p & alu::FLAG_V == 0,
            Op::Bvs => self.p & alu::FLAG_V != 0,
            _ => unreachable!(),
        }
    }

    // --- Implied / accumulator: a single dummy cycle then operate. ---

    fn step_implied(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                let _ = fetched;
                self.operate_implied();
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    fn step_accumulator(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                let _ = fetched;
                self.a = self.operate_rmw(self.a);
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    fn step_immediate(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.operate_read(fetched.unwrap());
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    // --- Stack-relative: push / pull. ---

    fn step_push(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                let _ = fetched;
                let value = if self.op == Op::Pha {
                    self.a
                } else {
                    self.p | alu::FLAG_B | alu::FLAG_U
                };
                self.set_bus(bus, STACK_PAGE | self.s as u16, false, value);
                self.s = self.s.wrapping_sub(1);
                self.step = 2;
            }
            2 => self.finish(bus),
            _ => unreachable!(),
        }
    }

    fn step_pull(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                let _ = fetched;
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.s = self.s.wrapping_add(1);
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 3;
            }
            3 => {
                let value = fetched.unwrap();
                if self.op == Op::Pla {
                    self.a = value;
                    alu::set_nz(&mut self.p, value);
                } else {
                    self.p = (value & !alu::FLAG_B) | alu::FLAG_U;
                }
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    // --- Control flow: branches, jumps, subroutine call/return. ---

    fn step_branch(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                let offset = fetched.unwrap() as i8;
                let target = self.pc.wrapping_add(offset as i16 as u16);
                self.eff_addr = target;
                if !self.branch_taken() {
                    self.finish(bus);
                    return;
                }
                let partial = (self.pc & 0xFF00) | (target & 0x00FF);
                self.set_bus(bus, partial, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                let target = self.eff_addr;
                if (target & 0xFF00) == (self.pc & 0xFF00) {
                    self.pc = target;
                    self.finish(bus);
                } else {
                    let partial = (self.pc & 0xFF00) | (target & 0x00FF);
                    self.set_bus(bus, partial, true, 0);
                    self.step = 3;
                }
            }
            3 => {
                let _ = fetched;
                self.pc = self.eff_addr;
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    fn step_jmp(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.mode {
            Mode::Abs => match self.step {
                0 => {
                    let addr = self.pc;
                    self.pc = self.pc.wrapping_add(1);
                    self.set_bus(bus, addr, true, 0);
                    self.step = 1;
                }
                1 => {
                    self.lo = fetched.unwrap();
                    let addr = self.pc;
                    self.pc = self.pc.wrapping_add(1);
                    self.set_bus(bus, addr, true, 0);
                    self.step = 2;
                }
                2 => {
                    self.hi = fetched.unwrap();
                    self.pc = ((self.hi as u16) << 8) | self.lo as u16;
                    self.finish(bus);
                }
                _ => unreachable!(),
            },
            Mode::Ind => match self.step {
                0 => {
                    let addr = self.pc;
                    self.pc = self.pc.wrapping_add(1);
                    self.set_bus(bus, addr, true, 0);
                    self.step = 1;
                }
                1 => {
                    self.lo = fetched.unwrap();
                    let addr = self.pc;
                    self.pc = self.pc.wrapping_add(1);
                    self.set_bus(bus, addr, true, 0);
                    self.step = 2;
                }
                2 => {
                    self.hi = fetched.unwrap();
                    self.eff_addr = ((self.hi as u16) << 8) | self.lo as u16;
                    self.set_bus(bus, self.eff_addr, true, 0);
                    self.step = 3;
                }
                3 => {
                    // Target low byte; latch it in `operand` since `lo`/`hi` still
                    // hold the pointer itself until the buggy high-byte fetch.
                    self.operand = fetched.unwrap();
                    let bugged_hi_addr =
                        (self.eff_addr & 0xFF00) | (self.eff_addr.wrapping_add(1) & 0x00FF);
                    self.set_bus(bus, bugged_hi_addr, true, 0);
                    self.step = 4;
                }
                4 => {
                    let target_hi = fetched.unwrap();
                    self.pc = ((target_hi as u16) << 8) | self.operand as u16;
                    self.finish(bus);
                }
                _ => unreachable!(),
            },
            _ => unreachable!(),
        }
    }

    fn step_jsr(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.lo = fetched.unwrap();
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.set_bus(bus, STACK_PAGE | self.s as u16, false, (self.pc >> 8) as u8);
                self.s = self.s.wrapping_sub(1);
                self.step = 3;
            }
            3 => {
                self.set_bus(bus, STACK_PAGE | self.s as u16, false, (self.pc & 0xFF) as u8);
                self.s = self.s.wrapping_sub(1);
                self.step = 4;
            }
            4 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 5;
            }
            5 => {
                self.hi = fetched.unwrap();
                self.pc = ((self.hi as u16) << 8) | self.lo as u16;
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    fn step_rts(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                let _ = fetched;
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.s = self.s.wrapping_add(1);
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 3;
            }
            3 => {
                self.lo = fetched.unwrap();
                self.s = self.s.wrapping_add(1);
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 4;
            }
            4 => {
                self.hi = fetched.unwrap();
                let ret = ((self.hi as u16) << 8) | self.lo as u16;
                self.set_bus(bus, ret, true, 0);
                self.pc = ret.wrapping_add(1);
                self.step = 5;
            }
            5 => {
                let _ = fetched;
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    fn step_rti(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                let _ = fetched;
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.s = self.s.wrapping_add(1);
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 3;
            }
            3 => {
                self.p = (fetched.unwrap() & !alu::FLAG_B) | alu::FLAG_U;
                self.s = self.s.wrapping_add(1);
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 4;
            }
            4 => {
                self.lo = fetched.unwrap();
                self.s = self.s.wrapping_add(1);
                self.set_bus(bus, STACK_PAGE | self.s as u16, true, 0);
                self.step = 5;
            }
            5 => {
                self.hi = fetched.unwrap();
                self.pc = ((self.hi as u16) << 8) | self.lo as u16;
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    /// Shared by software BRK and the RST/NMI/IRQ hijack — they differ only
    /// in whether the operand byte is skipped, whether pushes are forced to
    /// reads (RST), and which vector is read.
    fn step_brk(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        let is_rst = self.interrupt_kind == InterruptKind::Rst;
        match self.step {
            0 => {
                self.set_bus(bus, self.pc, true, 0);
                self.step = 1;
            }
            1 => {
                if !self.is_interrupt_hijack {
                    let break_mark = fetched.unwrap_or(0);
                    log::debug!("BRK at ${:04X}, mark ${:02X}", self.pc, break_mark);
                    self.pc = self.pc.wrapping_add(1);
                }
                self.set_bus(
                    bus,
                    STACK_PAGE | self.s as u16,
                    is_rst,
                    (self.pc >> 8) as u8,
                );
                self.s = self.s.wrapping_sub(1);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.set_bus(
                    bus,
                    STACK_PAGE | self.s as u16,
                    is_rst,
                    (self.pc & 0xFF) as u8,
                );
                self.s = self.s.wrapping_sub(1);
                self.step = 3;
            }
            3 => {
                let _ = fetched;
                let pushed_p = if self.is_interrupt_hijack {
                    self.p | alu::FLAG_U
                } else {
                    self.p | alu::FLAG_U | alu::FLAG_B
                };
                self.set_bus(bus, STACK_PAGE | self.s as u16, is_rst, pushed_p);
                self.s = self.s.wrapping_sub(1);
                self.eff_addr = match self.interrupt_kind {
                    InterruptKind::Rst => VEC_RESET,
                    InterruptKind::Nmi => VEC_NMI,
                    _ => VEC_IRQ,
                };
                self.break_status = 0;
                self.reset_pin = false;
                self.step = 4;
            }
            4 => {
                let _ = fetched;
                self.set_bus(bus, self.eff_addr, true, 0);
                self.step = 5;
            }
            5 => {
                self.lo = fetched.unwrap();
                self.p |= alu::FLAG_I;
                self.set_bus(bus, self.eff_addr.wrapping_add(1), true, 0);
                self.step = 6;
            }
            6 => {
                self.hi = fetched.unwrap();
                self.pc = ((self.hi as u16) << 8) | self.lo as u16;
                self.finish(bus);
            }
            _ => unreachable!(),
        }
    }

    // --- Memory-operand addressing modes, generic over Read/Write/RMW. ---

    fn step_zp(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.lo = fetched.unwrap();
                match self.op.kind() {
                    Kind::Write => {
                        let v = self.register_value_for_store();
                        self.set_bus(bus, self.lo as u16, false, v);
                    }
                    _ => self.set_bus(bus, self.lo as u16, true, 0),
                }
                self.step = 2;
            }
            2 => match self.op.kind() {
                Kind::Write => self.finish(bus),
                Kind::Read => {
                    self.operate_read(fetched.unwrap());
                    self.finish(bus);
                }
                Kind::ReadModifyWrite => {
                    self.operand = fetched.unwrap();
                    self.new_value = self.operate_rmw(self.operand);
                    self.set_bus(bus, self.lo as u16, false, self.operand);
                    self.step = 3;
                }
                _ => unreachable!(),
            },
            3 => {
                self.set_bus(bus, self.lo as u16, false, self.new_value);
                self.step = 4;
            }
            4 => self.finish(bus),
            _ => unreachable!(),
        }
    }

    fn step_zp_indexed(&mut self, bus: &mut Bus, fetched: Option<u8>, index: u8) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.lo = fetched.unwrap();
                self.set_bus(bus, self.lo as u16, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.lo = self.lo.wrapping_add(index);
                match self.op.kind() {
                    Kind::Write => {
                        let v = self.register_value_for_store();
                        self.set_bus(bus, self.lo as u16, false, v);
                    }
                    _ => self.set_bus(bus, self.lo as u16, true, 0),
                }
                self.step = 3;
            }
            3 => match self.op.kind() {
                Kind::Write => self.finish(bus),
                Kind::Read => {
                    self.operate_read(fetched.unwrap());
                    self.finish(bus);
                }
                Kind::ReadModifyWrite => {
                    self.operand = fetched.unwrap();
                    self.new_value = self.operate_rmw(self.operand);
                    self.set_bus(bus, self.lo as u16, false, self.operand);
                    self.step = 4;
                }
                _ => unreachable!(),
            },
            4 => {
                self.set_bus(bus, self.lo as u16, false, self.new_value);
                self.step = 5;
            }
            5 => self.finish(bus),
            _ => unreachable!(),
        }
    }

    fn step_abs(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.lo = fetched.unwrap();
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 2;
            }
            2 => {
                self.hi = fetched.unwrap();
                self.eff_addr = ((self.hi as u16) << 8) | self.lo as u16;
                match self.op.kind() {
                    Kind::Write => {
                        let v = self.register_value_for_store();
                        self.set_bus(bus, self.eff_addr, false, v);
                    }
                    _ => self.set_bus(bus, self.eff_addr, true, 0),
                }
                self.step = 3;
            }
            3 => match self.op.kind() {
                Kind::Write => self.finish(bus),
                Kind::Read => {
                    self.operate_read(fetched.unwrap());
                    self.finish(bus);
                }
                Kind::ReadModifyWrite => {
                    self.operand = fetched.unwrap();
                    self.new_value = self.operate_rmw(self.operand);
                    self.set_bus(bus, self.eff_addr, false, self.operand);
                    self.step = 4;
                }
                _ => unreachable!(),
            },
            4 => {
                self.set_bus(bus, self.eff_addr, false, self.new_value);
                self.step = 5;
            }
            5 => self.finish(bus),
            _ => unreachable!(),
        }
    }

    fn step_abs_indexed(&mut self, bus: &mut Bus, fetched: Option<u8>, index: u8) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.lo = fetched.unwrap();
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 2;
            }
            2 => {
                self.hi = fetched.unwrap();
                let base = ((self.hi as u16) << 8) | self.lo as u16;
                let (low_idx, carry) = self.lo.overflowing_add(index);
                self.page_crossed = carry;
                self.eff_addr = base.wrapping_add(index as u16);
                let partial = ((self.hi as u16) << 8) | low_idx as u16;
                match self.op.kind() {
                    Kind::Read => {
                        if self.page_crossed {
                            self.set_bus(bus, partial, true, 0);
                            self.step = 3;
                        } else {
                            self.set_bus(bus, self.eff_addr, true, 0);
                            self.step = 4;
                        }
                    }
                    _ => {
                        self.set_bus(bus, partial, true, 0);
                        self.step = 3;
                    }
                }
            }
            3 => {
                let _ = fetched;
                match self.op.kind() {
                    Kind::Write => {
                        let v = self.register_value_for_store();
                        self.set_bus(bus, self.eff_addr, false, v);
                        self.step = 5;
                    }
                    _ => {
                        self.set_bus(bus, self.eff_addr, true, 0);
                        self.step = 4;
                    }
                }
            }
            4 => match self.op.kind() {
                Kind::Read => {
                    self.operate_read(fetched.unwrap());
                    self.finish(bus);
                }
                Kind::ReadModifyWrite => {
                    self.operand = fetched.unwrap();
                    self.new_value = self.operate_rmw(self.operand);
                    self.set_bus(bus, self.eff_addr, false, self.operand);
                    self.step = 5;
                }
                _ => unreachable!(),
            },
            5 => match self.op.kind() {
                Kind::Write => self.finish(bus),
                Kind::ReadModifyWrite => {
                    self.set_bus(bus, self.eff_addr, false, self.new_value);
                    self.step = 6;
                }
                _ => unreachable!(),
            },
            6 => self.finish(bus),
            _ => unreachable!(),
        }
    }

    fn step_izx(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.zp_ptr = fetched.unwrap();
                self.set_bus(bus, self.zp_ptr as u16, true, 0);
                self.step = 2;
            }
            2 => {
                let _ = fetched;
                self.zp_ptr = self.zp_ptr.wrapping_add(self.x);
                self.set_bus(bus, self.zp_ptr as u16, true, 0);
                self.step = 3;
            }
            3 => {
                self.lo = fetched.unwrap();
                self.set_bus(bus, self.zp_ptr.wrapping_add(1) as u16, true, 0);
                self.step = 4;
            }
            4 => {
                self.hi = fetched.unwrap();
                self.eff_addr = ((self.hi as u16) << 8) | self.lo as u16;
                match self.op.kind() {
                    Kind::Write => {
                        let v = self.register_value_for_store();
                        self.set_bus(bus, self.eff_addr, false, v);
                    }
                    _ => self.set_bus(bus, self.eff_addr, true, 0),
                }
                self.step = 5;
            }
            5 => match self.op.kind() {
                Kind::Write => self.finish(bus),
                Kind::Read => {
                    self.operate_read(fetched.unwrap());
                    self.finish(bus);
                }
                Kind::ReadModifyWrite => {
                    self.operand = fetched.unwrap();
                    self.new_value = self.operate_rmw(self.operand);
                    self.set_bus(bus, self.eff_addr, false, self.operand);
                    self.step = 6;
                }
                _ => unreachable!(),
            },
            6 => {
                self.set_bus(bus, self.eff_addr, false, self.new_value);
                self.step = 7;
            }
            7 => self.finish(bus),
            _ => unreachable!(),
        }
    }

    fn step_izy(&mut self, bus: &mut Bus, fetched: Option<u8>) {
        match self.step {
            0 => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                self.set_bus(bus, addr, true, 0);
                self.step = 1;
            }
            1 => {
                self.zp_ptr = fetched.unwrap();
                self.set_bus(bus, self.zp_ptr as u16, true, 0);
                self.step = 2;
            }
            2 => {
                self.lo = fetched.unwrap();
                self.set_bus(bus, self.zp_ptr.wrapping_add(1) as u16, true, 0);
                self.step = 3;
            }
            3 => {
                self.hi = fetched.unwrap();
                let base = ((self.hi as u16) << 8) | self.lo as u16;
                let (low_idx, carry) = self.lo.overflowing_add(self.y);
                self.page_crossed = carry;
                self.eff_addr = base.wrapping_add(self.y as u16);
                let partial = ((self.hi as u16) << 8) | low_idx as u16;
                if matches!(self.op.kind(), Kind::Read) && !self.page_crossed {
                    self.set_bus(bus, self.eff_addr, true, 0);
                    self.step = 5;
                } else {
                    self.set_bus(bus, partial, true, 0);
                    self.step = 4;
                }
            }
            4 => {
                let _ = fetched;
                match self.op.kind() {
                    Kind::Write => {
                        let v = self.register_value_for_store();
                        self.set_bus(bus, self.eff_addr, false, v);
                    }
                    _ => self.set_bus(bus, self.eff_addr, true, 0),
                }
                self.step = 5;
            }
            5 => match self.op.kind() {
                Kind::Write => self.finish(bus),
                Kind::Read => {
                    self.operate_read(fetched.unwrap());
                    self.finish(bus);
                }
                _ => unreachable!(),
            },
            _ => unreachable!(),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip for Cpu {
    fn tick(&mut self, bus: &mut Bus) {
        self.advance(bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDevice;

    fn run(cpu: &mut Cpu, rom: &mut MemoryDevice, bus: &mut Bus, cycles: usize) {
        for _ in 0..cycles {
            cpu.tick(bus);
            rom.tick(bus);
        }
    }

    fn boot_rom(program: &[(u16, u8)], reset_vector: u16) -> MemoryDevice {
        let mut rom = MemoryDevice::new(0x0000, 0xFFFF, true).unwrap();
        for (addr, value) in program {
            rom.poke(*addr, *value);
        }
        rom.poke(0xFFFC, (reset_vector & 0xFF) as u8);
        rom.poke(0xFFFD, (reset_vector >> 8) as u8);
        rom
    }

    #[test]
    fn reset_then_lda_immediate_sta_zp() {
        let program = [
            (0x8000u16, 0xA9u8), (0x8001, 0x42), // LDA #$42
            (0x8002, 0x85), (0x8003, 0x10),      // STA $10
        ];
        let mut rom = boot_rom(&program, 0x8000);
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();

        // 7 reset cycles + 2 (LDA#) + 3 (STA zp) = 12
        run(&mut cpu, &mut rom, &mut bus, 12);

        assert_eq!(cpu.a, 0x42);
        assert_eq!(rom.peek(0x10), 0x42);
        assert_eq!(cpu.pc, 0x8004);
    }

    #[test]
    fn branch_page_cross_costs_extra_cycle() {
        // BNE at $80FE with Z clear, offset $02 -> target $8102 (page cross).
        let mut rom = boot_rom(
            &[(0x80FEu16, 0xD0u8), (0x80FF, 0x02)],
            0x80FE,
        );
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        run(&mut cpu, &mut rom, &mut bus, 7); // 7 reset cycles, lands SYNC at $80FE
        cpu.p &= !alu::FLAG_Z;
        run(&mut cpu, &mut rom, &mut bus, 4);
        assert_eq!(cpu.pc, 0x8102);
    }

    #[test]
    fn jmp_indirect_page_wrap_bug() {
        let mut rom = MemoryDevice::new(0x0000, 0xFFFF, true).unwrap();
        rom.poke(0x8000, 0x6C); // JMP ($30FF)
        rom.poke(0x8001, 0xFF);
        rom.poke(0x8002, 0x30);
        rom.poke(0x30FF, 0x80); // target low
        rom.poke(0x3000, 0x12); // target high, read from $3000 not $3100 (the bug)
        rom.poke(0x3100, 0x99);
        rom.poke(0xFFFC, 0x00);
        rom.poke(0xFFFD, 0x80);

        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        run(&mut cpu, &mut rom, &mut bus, 7 + 5);
        assert_eq!(cpu.pc, 0x1280);
    }

    #[test]
    fn illegal_opcode_halts_cpu() {
        let mut rom = boot_rom(&[(0x8000u16, 0x02u8)], 0x8000);
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        run(&mut cpu, &mut rom, &mut bus, 8);
        assert_eq!(cpu.crashed(), Some((0x02, 0x8001)));
    }
}
