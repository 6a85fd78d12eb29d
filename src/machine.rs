//! Top-level assembly: wires Bus/CPU/memory windows/PIA together, drives the
//! clock thread and the input thread, and dispatches the emulator command
//! surface (reset/break/step/save/load/turbo/print-cycles).
//!
//! Grounded on `src/c64_emu/c64.rs`'s `C64` struct (one struct owns every
//! chip and drives them each cycle) for the general wiring shape, and on
//! `examples/original_source/apple1.c`'s `init_apple1`/`init_apple1_binary`/
//! `boot_apple1`/`main_loop`/`halt_apple1` for the thread-spawn/1-second-
//! sampling/join sequence and the ROM-vs-binary address-map split.
//!
//! Unlike `clock::Clock`'s generic boxed-chip list (exercised on its own in
//! `clock.rs`'s tests), this module drives the concrete CPU/memory/PIA
//! fields directly from a single thread so that the command surface (save
//! state, reset, single-step) can reach into CPU/memory state without a
//! second thread racing it — see DESIGN.md for why this is a deliberate
//! divergence from routing the top-level loop through `Clock::attach`.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::cli::Cli;
use crate::clock::Chip;
use crate::control::{EmulatorCommand, StopFlag};
use crate::cpu::Cpu;
use crate::error::{EmulatorError, Result};
use crate::input;
use crate::memory::MemoryDevice;
use crate::pia::{KeyboardMailbox, Pia};
use crate::snapshot::{Snapshot, DEFAULT_PATH};

const CLOCK_SPEED_HZ: u32 = 1_000_000;
const TICKS_FOR_SYNC: u64 = 1000;
const CLOCK_ADJUST_GRANULARITY_NS: i64 = 100_000;

const START_USER_RAM: u16 = 0x0000;
const MAX_USER_RAM: usize = 0xD010;
const START_EXTRA_RAM: u16 = 0xE000;
const END_EXTRA_RAM: u16 = 0xEFFF;
const START_ROM: u16 = 0xFF00;
const END_ROM: u16 = 0xFFFF;

/// The wired-together system: bus, CPU, and the memory/PIA devices that
/// respond to it. `rom`/`pia` are absent in binary mode, where user RAM
/// spans the whole address space instead.
struct System {
    bus: Bus,
    cpu: Cpu,
    user_ram: MemoryDevice,
    extra_ram: Option<MemoryDevice>,
    rom: Option<MemoryDevice>,
    pia: Option<Pia<io::Stdout>>,
}

impl System {
    fn new_rom_mode(user_ram_size: usize, rom: &[u8], extra: Option<&[u8]>, mailbox: KeyboardMailbox) -> Result<Self> {
        if user_ram_size > MAX_USER_RAM {
            return Err(EmulatorError::Config(format!(
                "requested too much user memory; maximum is ${MAX_USER_RAM:04X}"
            )));
        }
        let user_ram = MemoryDevice::new(START_USER_RAM, START_USER_RAM + user_ram_size as u16 - 1, true)?;

        let mut extra_ram = MemoryDevice::new(START_EXTRA_RAM, END_EXTRA_RAM, true)?;
        if let Some(data) = extra {
            extra_ram.load_data(data, START_EXTRA_RAM)?;
        }

        let mut rom_dev = MemoryDevice::new(START_ROM, END_ROM, false)?;
        rom_dev.load_data(rom, START_ROM)?;

        Ok(Self {
            bus: Bus::new(),
            cpu: Cpu::new(),
            user_ram,
            extra_ram: Some(extra_ram),
            rom: Some(rom_dev),
            pia: Some(Pia::new(mailbox, io::stdout())),
        })
    }

    fn new_binary_mode(data: &[u8], start_addr: u16, load_addr: u16) -> Result<Self> {
        let mut user_ram = MemoryDevice::new(0x0000, 0xFFFF, true)?;
        user_ram.load_data(data, load_addr)?;
        user_ram.poke(0xFFFC, (start_addr & 0xFF) as u8);
        user_ram.poke(0xFFFD, (start_addr >> 8) as u8);

        Ok(Self {
            bus: Bus::new(),
            cpu: Cpu::new(),
            user_ram,
            extra_ram: None,
            rom: None,
            pia: None,
        })
    }

    /// One full rising-phase pass: the CPU asserts/consumes the bus first,
    /// then every device responds to whatever it just asserted, matching
    /// the ordering guarantee in SPEC_FULL.md §4.1.
    fn step_cycle(&mut self) {
        self.cpu.tick(&mut self.bus);
        self.drive_devices();
    }

    fn drive_devices(&mut self) {
        self.user_ram.tick(&mut self.bus);
        if let Some(extra) = self.extra_ram.as_mut() {
            extra.tick(&mut self.bus);
        }
        if let Some(rom) = self.rom.as_mut() {
            rom.tick(&mut self.bus);
        }
        if let Some(pia) = self.pia.as_mut() {
            pia.tick(&mut self.bus);
        }
    }

}

/// Owns the shared atomics/channels the input thread and the clock thread
/// coordinate through, plus the assembled [`System`].
pub struct Machine {
    system: System,
    stop: Arc<StopFlag>,
    mailbox: KeyboardMailbox,
    tick_count: Arc<AtomicU64>,
    cmd_tx: Sender<EmulatorCommand>,
    cmd_rx: Receiver<EmulatorCommand>,
    turbo: bool,
    debug_mode: bool,
}

impl Machine {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mailbox = KeyboardMailbox::new();
        let system = if let Some(binary_path) = &cli.binary {
            let data = std::fs::read(binary_path)?;
            System::new_binary_mode(&data, cli.start_addr, cli.load_addr)?
        } else {
            let rom_path = cli
                .rom
                .as_ref()
                .ok_or_else(|| EmulatorError::Config("missing required argument: --rom".into()))?;
            let rom_data = std::fs::read(rom_path)?;
            let extra_data = cli.extra.as_ref().map(std::fs::read).transpose()?;
            System::new_rom_mode(cli.memory, &rom_data, extra_data.as_deref(), mailbox.clone())?
        };

        let (cmd_tx, cmd_rx) = mpsc::channel();
        Ok(Self {
            system,
            stop: Arc::new(StopFlag::new()),
            mailbox,
            tick_count: Arc::new(AtomicU64::new(0)),
            cmd_tx,
            cmd_rx,
            turbo: false,
            debug_mode: false,
        })
    }

    pub fn stop_handle(&self) -> Arc<StopFlag> {
        Arc::clone(&self.stop)
    }

    /// Spawn the input thread and run the clock loop on the current thread
    /// (the "clock thread" in SPEC_FULL.md §5 terms; the caller — `main` —
    /// plays the role of the main thread by joining this call).
    pub fn run(mut self) -> Result<()> {
        let cmd_tx = self.cmd_tx.clone();
        let input_stop = Arc::clone(&self.stop);
        let input_handle = input::spawn(self.mailbox.clone(), input_stop, move |cmd| {
            let _ = cmd_tx.send(cmd);
        })
        .map_err(EmulatorError::ThreadSpawn)?;

        self.clock_loop();

        self.stop.request();
        // Dropping the thread handle without joining would leak the thread;
        // the input thread observes `stop` at its next iteration and exits.
        let _ = input_handle.join();
        Ok(())
    }

    fn clock_loop(&mut self) {
        let period_ns = 1_000_000_000f64 / CLOCK_SPEED_HZ as f64;
        let mut adjust_ns: i64 = 0;
        let mut batch_start = Instant::now();
        let mut rate_sample_start = Instant::now();
        let mut rate_sample_ticks = 0u64;

        loop {
            if self.stop.is_set() {
                return;
            }
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                self.handle_command(cmd);
            }
            if self.stop.is_set() {
                return;
            }

            // Break-to-debugger pauses free-running stepping without tearing
            // down the loop: commands (Resume/StepInstruction/StepClock/...)
            // keep draining above so F10/F11/F5 remain live while paused.
            if self.debug_mode {
                std::thread::yield_now();
                continue;
            }

            self.system.step_cycle();
            let ticks = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

            if let Some((opcode, pc)) = self.system.cpu.crashed() {
                log::error!("halting: illegal opcode ${opcode:02X} at ${pc:04X}");
                let _ = self.save_snapshot_to(DEFAULT_PATH);
                self.stop.request();
                return;
            }

            if ticks % TICKS_FOR_SYNC == 0 && !self.turbo {
                let elapsed = batch_start.elapsed();
                let target = Duration::from_nanos((period_ns * TICKS_FOR_SYNC as f64) as u64);
                let target = if adjust_ns >= 0 {
                    target.saturating_add(Duration::from_nanos(adjust_ns as u64))
                } else {
                    target.saturating_sub(Duration::from_nanos((-adjust_ns) as u64))
                };
                if target > elapsed {
                    std::thread::sleep(target - elapsed);
                }
                batch_start = Instant::now();
            }

            rate_sample_ticks += 1;
            if rate_sample_start.elapsed() >= Duration::from_secs(1) {
                let hz = rate_sample_ticks as f64 / rate_sample_start.elapsed().as_secs_f64();
                if !self.turbo {
                    if hz > CLOCK_SPEED_HZ as f64 {
                        adjust_ns -= CLOCK_ADJUST_GRANULARITY_NS;
                    } else if hz < CLOCK_SPEED_HZ as f64 {
                        adjust_ns += CLOCK_ADJUST_GRANULARITY_NS;
                    }
                }
                rate_sample_ticks = 0;
                rate_sample_start = Instant::now();
            }
        }
    }

    fn handle_command(&mut self, cmd: EmulatorCommand) {
        match cmd {
            EmulatorCommand::Resume => self.debug_mode = false,
            EmulatorCommand::Reset => {
                self.system.cpu.set_reset(true);
                // The reset pin stays latched in `break_status` until the
                // interrupt sequence's micro-cycle 3 clears it; one extra
                // cycle here guarantees it has been sampled at least once.
                self.system.step_cycle();
                self.system.cpu.set_reset(false);
            }
            EmulatorCommand::Break => {
                self.debug_mode = true;
            }
            EmulatorCommand::StepInstruction => {
                if self.debug_mode {
                    loop {
                        self.system.step_cycle();
                        if self.system.cpu.sync() {
                            break;
                        }
                    }
                }
            }
            EmulatorCommand::StepClock => {
                if self.debug_mode {
                    self.system.step_cycle();
                }
            }
            EmulatorCommand::PrintCyclesPerSecond => {
                log::info!("cycles per second: {}", self.tick_count.load(Ordering::Relaxed));
            }
            EmulatorCommand::SaveState => {
                if let Err(e) = self.save_snapshot_to(DEFAULT_PATH) {
                    log::error!("failed to save state: {e}");
                }
            }
            EmulatorCommand::LoadState => {
                if let Err(e) = self.load_snapshot_from(DEFAULT_PATH) {
                    log::error!("failed to load state: {e}");
                }
            }
            EmulatorCommand::ToggleTurbo => {
                self.turbo = !self.turbo;
                log::info!("turbo mode: {}", if self.turbo { "ON" } else { "OFF" });
            }
        }
    }

    fn save_snapshot_to(&mut self, path: &str) -> Result<()> {
        let cpu_copy = self.system.cpu.clone();
        let mut bus = Bus::new();
        let system = &mut self.system;
        let snapshot = Snapshot::capture(&cpu_copy, &mut bus, |b| {
            system.bus = *b;
            system.drive_devices();
            *b = system.bus;
        });
        snapshot.save(path)
    }

    fn load_snapshot_from(&mut self, path: &str) -> Result<()> {
        let snapshot = Snapshot::load(path)?;
        let mut bus = Bus::new();
        let system = &mut self.system;
        let cpu = snapshot.restore(&mut bus, |b| {
            system.bus = *b;
            system.drive_devices();
            *b = system.bus;
        });
        self.system.cpu = cpu;
        Ok(())
    }
}
