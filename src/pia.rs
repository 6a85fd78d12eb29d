//! Motorola 6821 PIA, wired the way the Apple I wires it: port A carries
//! keyboard data, port B carries display data, and both control registers
//! are pinned so the DDR flag always selects the peripheral register.
//!
//! Structurally generalized from the teacher's `cia::Mos652x` (register
//! array + offset constants + `read`/`write`/`tick` side effects), reduced
//! from 16 timer/TOD registers to the 4 PIA registers. Translation-table
//! semantics and handshake bit meanings follow the original `pia6821.c`.

use crate::bus::Bus;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

pub const KBD: u16 = 0xD010;
pub const KBDCR: u16 = 0xD011;
pub const DSP: u16 = 0xD012;
pub const DSPCR: u16 = 0xD013;

const CR_DATA_READY: u8 = 0x80;
const PB_DISPLAY_BUSY: u8 = 0x80;
const MAX_COLUMNS: usize = 40;

/// Single-slot keyboard mailbox shared with the input thread (§5 discipline
/// table: producer writes only when the slot is empty, consumer clears it).
#[derive(Clone)]
pub struct KeyboardMailbox {
    pending: Arc<AtomicBool>,
    byte: Arc<AtomicU8>,
}

impl KeyboardMailbox {
    pub fn new() -> Self {
        Self { pending: Arc::new(AtomicBool::new(false)), byte: Arc::new(AtomicU8::new(0)) }
    }

    /// Whether the slot is still occupied by a byte the PIA hasn't consumed yet.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Called by the input thread. Returns `false` if the slot was already full.
    pub fn try_post(&self, byte: u8) -> bool {
        if self.pending.load(Ordering::Acquire) {
            return false;
        }
        self.byte.store(byte, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
        true
    }

    fn try_take(&self) -> Option<u8> {
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        let b = self.byte.load(Ordering::Relaxed);
        self.pending.store(false, Ordering::Release);
        Some(b)
    }
}

impl Default for KeyboardMailbox {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Pia<W: Write> {
    pa: u8,
    ddra: u8,
    cra: u8,
    pb: u8,
    ddrb: u8,
    crb: u8,
    mailbox: KeyboardMailbox,
    out: W,
    column: usize,
}

impl<W: Write> Pia<W> {
    pub fn new(mailbox: KeyboardMailbox, out: W) -> Self {
        Self { pa: 0, ddra: 0, cra: 0, pb: 0, ddrb: 0, crb: 0, mailbox, out, column: 0 }
    }

    fn ddr_selected(cr: u8) -> bool {
        cr & 0x04 == 0
    }

    /// The underlying display sink, for callers that want to inspect what
    /// has been written (tests, or a host embedding this as a library).
    pub fn sink(&self) -> &W {
        &self.out
    }

    /// Rising-phase advance: drain a pending keystroke, flush a pending
    /// display byte, then service the bus if addressed.
    pub fn tick(&mut self, bus: &mut Bus) {
        if self.cra & CR_DATA_READY == 0 {
            if let Some(host_byte) = self.mailbox.try_take() {
                let apple = ascii_to_apple(host_byte);
                if apple != 0 {
                    self.pa = apple | 0x80;
                    self.cra |= CR_DATA_READY;
                }
            }
        }

        if self.pb & PB_DISPLAY_BUSY != 0 {
            let pending = self.pb;
            self.pb &= !PB_DISPLAY_BUSY;
            let host = apple_to_ascii(pending);
            if host != 0 {
                self.emit(host);
            }
        }

        self.service_bus(bus);
    }

    fn emit(&mut self, byte: u8) {
        if byte == b'\n' || self.column >= MAX_COLUMNS {
            let _ = self.out.write_all(b"\n");
            self.column = 0;
            if byte == b'\n' {
                return;
            }
        }
        let _ = self.out.write_all(&[byte]);
        let _ = self.out.flush();
        self.column += 1;
    }

    fn service_bus(&mut self, bus: &mut Bus) {
        match bus.addr {
            KBD => {
                if bus.rw {
                    bus.data = self.pa;
                    self.cra &= !CR_DATA_READY;
                } else if Self::ddr_selected(self.cra) {
                    self.ddra = bus.data;
                } else {
                    self.pa = bus.data;
                }
            }
            KBDCR => {
                if bus.rw {
                    bus.data = self.cra;
                } else {
                    self.cra = bus.data & 0x3F;
                }
            }
            DSP => {
                if bus.rw {
                    bus.data = self.pb;
                } else if Self::ddr_selected(self.crb) {
                    self.ddrb = bus.data;
                } else {
                    self.pb = bus.data | PB_DISPLAY_BUSY;
                }
            }
            DSPCR => {
                if bus.rw {
                    bus.data = self.crb;
                } else {
                    self.crb = bus.data;
                }
            }
            _ => {}
        }
    }
}

/// Host ASCII → Apple-ASCII, the full 256-entry table from
/// `examples/original_source/pia6821.c`'s `ascii_to_apple`: everything in
/// $00-$7F passes through unchanged except Tab (dropped), LF (folds to CR),
/// backtick and $7B-$7E (dropped), lowercase (folds to uppercase), and DEL
/// (maps to underscore); $80-$FF is unrepresentable and drops to 0.
pub fn ascii_to_apple(byte: u8) -> u8 {
    match byte {
        0x09 => 0,
        0x0A => 0x0D,
        0x60 => 0,
        b'a'..=b'z' => byte - b'a' + b'A',
        0x7B..=0x7E => 0,
        0x7F => 0x5F,
        0x00..=0x7F => byte,
        _ => 0,
    }
}

/// Apple-ASCII → host ASCII, the full table from `pia6821.c`'s
/// `apple_to_ascii`: CR folds to LF, $20-$5F pass through unchanged, $60-$7F
/// pass through as their $40-$5F counterpart (the Apple I's display has no
/// lowercase glyphs), everything else is unrepresentable and drops to 0. The
/// high bit is expected to already be stripped by the caller.
pub fn apple_to_ascii(byte: u8) -> u8 {
    let byte = byte & 0x7F;
    match byte {
        0x0D => b'\n',
        0x20..=0x5F => byte,
        0x60..=0x7F => byte - 0x20,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_is_single_slot() {
        let mb = KeyboardMailbox::new();
        assert!(mb.try_post(b'A'));
        assert!(!mb.try_post(b'B'));
        assert_eq!(mb.try_take(), Some(b'A'));
        assert_eq!(mb.try_take(), None);
    }

    #[test]
    fn keystroke_sets_data_ready_and_high_bit() {
        let mb = KeyboardMailbox::new();
        mb.try_post(b'a');
        let mut pia = Pia::new(mb, Vec::new());
        let mut bus = Bus { addr: 0, data: 0, rw: true };
        pia.tick(&mut bus);
        bus.addr = KBD;
        bus.rw = true;
        pia.tick(&mut bus);
        assert_eq!(bus.data, b'A' | 0x80);
    }

    #[test]
    fn display_write_clears_busy_and_emits() {
        let mb = KeyboardMailbox::new();
        let mut pia = Pia::new(mb, Vec::new());
        let mut bus = Bus { addr: DSP, data: b'H' | 0x80, rw: false };
        pia.tick(&mut bus);
        assert_eq!(pia.pb & PB_DISPLAY_BUSY, PB_DISPLAY_BUSY);
        pia.tick(&mut bus);
        assert_eq!(pia.pb & PB_DISPLAY_BUSY, 0);
        assert_eq!(pia.out, vec![b'H']);
    }

    #[test]
    fn translation_round_trips_printables() {
        // $20-$5F: digits, uppercase letters, and printable punctuation -
        // the "documented character subset" the round-trip identity is
        // specified over. Lowercase folds to uppercase and backtick/DEL
        // drop to 0, so neither round-trips, by design.
        for byte in 0x20u8..=0x5F {
            assert_eq!(apple_to_ascii(ascii_to_apple(byte)), byte);
        }
    }

    #[test]
    fn control_codes_pass_through_except_documented_exceptions() {
        assert_eq!(ascii_to_apple(0x01), 0x01);
        assert_eq!(ascii_to_apple(0x07), 0x07);
        assert_eq!(ascii_to_apple(0x0B), 0x0B);
        assert_eq!(ascii_to_apple(0x1F), 0x1F);
        assert_eq!(ascii_to_apple(0x09), 0); // Tab
        assert_eq!(ascii_to_apple(b'\n'), 0x0D); // LF -> CR
        assert_eq!(ascii_to_apple(b'`'), 0); // backtick
        assert_eq!(ascii_to_apple(0x7F), 0x5F); // DEL -> underscore
    }
}
