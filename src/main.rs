use std::sync::Arc;
use std::sync::OnceLock;

use clap::Parser;

use apple1::cli::Cli;
use apple1::control::StopFlag;
use apple1::error::Result;
use apple1::machine::Machine;

/// The running machine's stop flag, reachable from the SIGINT handler.
/// A signal handler cannot capture state, so this is the one static the
/// process needs; everything else is owned by `Machine`.
static STOP: OnceLock<Arc<StopFlag>> = OnceLock::new();

/// Mirrors `examples/original_source/main.c`'s `termination_handler`: SIGINT
/// requests a clean stop instead of calling `halt_apple1` directly, since the
/// clock loop (not the signal handler) owns the snapshot/thread-join sequence.
#[cfg(unix)]
extern "C" fn termination_handler(_signum: libc::c_int) {
    if let Some(stop) = STOP.get() {
        stop.request();
    }
}

#[cfg(unix)]
fn install_sigint_handler() -> Result<()> {
    unsafe {
        let mut act: libc::sigaction = std::mem::zeroed();
        act.sa_sigaction = termination_handler as usize;
        libc::sigemptyset(&mut act.sa_mask);
        if libc::sigaction(libc::SIGINT, &act, std::ptr::null_mut()) == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_sigint_handler() -> Result<()> {
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let machine = Machine::from_cli(&cli)?;

    let _ = STOP.set(machine.stop_handle());
    install_sigint_handler()?;

    machine.run()
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("apple1: {e}");
        std::process::exit(e.exit_code());
    }
}
