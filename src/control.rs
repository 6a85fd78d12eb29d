//! Shared control-surface state: the process-wide stop flag and the
//! emulator command enum the input thread dispatches into.
//!
//! Grounded on `examples/original_source/apple1.c`'s `process_emulator_input`
//! (the command set: continue/reset/break/step-instruction/step-clock/
//! print-cycles/save-state/load-state/turbo) and its `poweroff`/`debug_mode`
//! globals, translated to atomics per §5's discipline table. The snapshot
//! and command paths run on the single clock-loop thread (see `machine.rs`),
//! so the quiesce enabled/active handshake the original's debugger would
//! need never has a second thread to coordinate with.

use std::sync::atomic::{AtomicBool, Ordering};

/// One of the commands the input thread's escape-sequence parser (or the
/// `` ` ``/Tab single-key handlers) can dispatch. Named by what each key does,
/// not by its F-key binding — `input.rs` owns the F5-F12 mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorCommand {
    Resume,
    SaveState,
    LoadState,
    Reset,
    Break,
    StepInstruction,
    StepClock,
    PrintCyclesPerSecond,
    ToggleTurbo,
}

/// Process-wide shutdown flag. Set by the SIGINT handler, the debugger break
/// command, or a CPU crash; polled by the clock loop and the input loop.
#[derive(Default)]
pub struct StopFlag(AtomicBool);

impl StopFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flag_starts_clear() {
        let stop = StopFlag::new();
        assert!(!stop.is_set());
        stop.request();
        assert!(stop.is_set());
    }
}
