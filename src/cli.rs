//! Command-line surface, translated from `examples/original_source/main.c`'s
//! `getopt_long` table into a `clap` derive struct (adopted from the wider
//! corpus — see DESIGN.md/SPEC_FULL.md §10.1; not in the teacher's own
//! manifest).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "apple1", version, about = "A cycle-accurate Apple I emulator")]
pub struct Cli {
    /// Load a ROM image. Required unless --binary is given.
    #[arg(short = 'r', long = "rom")]
    pub rom: Option<PathBuf>,

    /// Populate the extra RAM region ($E000-$EFFF).
    #[arg(short = 'e', long = "extra")]
    pub extra: Option<PathBuf>,

    /// User RAM size in bytes (upper bound $D010).
    #[arg(short = 'm', long = "memory", default_value_t = 0xD010)]
    pub memory: usize,

    /// Load a raw binary image; bypasses ROM/PIA, maps RAM across the whole
    /// address space.
    #[arg(short = 'b', long = "binary")]
    pub binary: Option<PathBuf>,

    /// Reset vector target when using --binary.
    #[arg(short = 'a', long = "start-addr", default_value_t = 0)]
    pub start_addr: u16,

    /// Where to deposit the binary image when using --binary.
    #[arg(short = 'l', long = "load-addr", default_value_t = 0)]
    pub load_addr: u16,
}
