//! Raw-mode stdin reader thread: owns terminal attribute save/restore,
//! recognises the backtick/Tab/Esc special keys, and otherwise stages a
//! single keyboard byte into the PIA's mailbox.
//!
//! Grounded on `examples/original_source/pia6821.c`'s `init_pia`/
//! `restore_term`/`input_run`/`read_escape_sequence`/`clear_screen` — the
//! exact escape sequences (`\x1b[15~`..`\x1b[24~`) and the "block until the
//! PIA clears data_ready" discipline are translated verbatim. `libc` is the
//! teacher's own declared-but-dormant `cfg(unix)` dependency (see
//! DESIGN.md); this module is its first real user.

use crate::control::{EmulatorCommand, StopFlag};
use crate::pia::KeyboardMailbox;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

const TILDE_KEY: u8 = b'`';
const TAB_KEY: u8 = 0x09;
const ESC_KEY: u8 = 0x1B;

/// RAII guard around the saved terminal attributes. Restoring is idempotent
/// and happens on every exit path: normal drop, panic unwind, or explicit
/// `restore()` from the signal-driven shutdown path.
pub struct RawModeGuard {
    #[cfg(unix)]
    saved: libc::termios,
    active: bool,
}

impl RawModeGuard {
    #[cfg(unix)]
    pub fn enable() -> io::Result<Self> {
        use std::mem::MaybeUninit;
        unsafe {
            let mut saved = MaybeUninit::<libc::termios>::uninit();
            if libc::tcgetattr(libc::STDIN_FILENO, saved.as_mut_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            let saved = saved.assume_init();
            let mut raw = saved;
            raw.c_lflag &= !(libc::ECHO | libc::ICANON);
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &raw) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { saved, active: true })
        }
    }

    #[cfg(not(unix))]
    pub fn enable() -> io::Result<Self> {
        Ok(Self { active: true })
    }

    #[cfg(unix)]
    pub fn restore(&mut self) {
        if self.active {
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &self.saved);
            }
            self.active = false;
        }
    }

    #[cfg(not(unix))]
    pub fn restore(&mut self) {
        self.active = false;
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

fn clear_screen() {
    let mut out = io::stdout();
    let _ = out.write_all(b"\x1b[2J\x1b[1;1H");
    let _ = out.flush();
}

/// Nonblocking drain of whatever stdin bytes are already queued, mirroring
/// `read_escape_sequence`'s `ioctl(FIONREAD)` polling loop. Returns `None`
/// for a bare ESC with nothing following (just the ESC key was pressed).
#[cfg(unix)]
fn read_escape_sequence() -> Option<Vec<u8>> {
    use std::os::unix::io::AsRawFd;
    let stdin = io::stdin();
    let fd = stdin.as_raw_fd();
    let mut buf = Vec::new();
    loop {
        let mut pending: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending) };
        if rc != 0 || pending <= 0 {
            break;
        }
        let mut byte = [0u8; 1];
        match stdin.lock().read(&mut byte) {
            Ok(1) => buf.push(byte[0]),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    if buf.is_empty() {
        None
    } else {
        Some(buf)
    }
}

#[cfg(not(unix))]
fn read_escape_sequence() -> Option<Vec<u8>> {
    None
}

fn decode_escape_sequence(seq: &[u8]) -> Option<EmulatorCommand> {
    use EmulatorCommand::*;
    match seq {
        b"[15~" => Some(Resume),
        b"[17~" => Some(SaveState),
        b"[18~" => Some(LoadState),
        b"[19~" => Some(Reset),
        b"[20~" => Some(Break),
        b"[21~" => Some(StepInstruction),
        b"[23~" => Some(StepClock),
        b"[24~" => Some(PrintCyclesPerSecond),
        _ => None,
    }
}

/// Spawn the input thread. `on_command` is called for recognised special
/// keys; ordinary bytes are posted to `mailbox` and the thread blocks (polling
/// `stop`) until the PIA consumes the previous byte, matching the original's
/// "don't read until data_ready clears" discipline.
pub fn spawn(
    mailbox: KeyboardMailbox,
    stop: Arc<StopFlag>,
    on_command: impl Fn(EmulatorCommand) + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("input".into())
        .spawn(move || input_run(mailbox, stop, on_command))
}

fn input_run(
    mailbox: KeyboardMailbox,
    stop: Arc<StopFlag>,
    on_command: impl Fn(EmulatorCommand),
) {
    let _raw = RawModeGuard::enable();
    let stdin = io::stdin();
    let mut byte = [0u8; 1];

    while !stop.is_set() {
        // Single-slot handshake: never read a new key while the PIA hasn't
        // consumed the previous one.
        if mailbox.is_pending() {
            std::thread::yield_now();
            continue;
        }
        let read_result = stdin.lock().read(&mut byte);
        match read_result {
            Ok(0) => break,
            Ok(_) => match byte[0] {
                TILDE_KEY => clear_screen(),
                TAB_KEY => on_command(EmulatorCommand::ToggleTurbo),
                ESC_KEY => {
                    if let Some(seq) = read_escape_sequence() {
                        if let Some(cmd) = decode_escape_sequence(&seq) {
                            on_command(cmd);
                        }
                    }
                }
                other => {
                    mailbox.try_post(other);
                }
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("error reading from stdin: {e}");
                break;
            }
        }
    }
    log::debug!("stopping input thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_function_key_sequences() {
        assert_eq!(decode_escape_sequence(b"[15~"), Some(EmulatorCommand::Resume));
        assert_eq!(decode_escape_sequence(b"[24~"), Some(EmulatorCommand::PrintCyclesPerSecond));
        assert_eq!(decode_escape_sequence(b"[99~"), None);
    }
}
