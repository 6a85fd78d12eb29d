//! The shared address/data bus. Purely a passive carrier: the CPU asserts
//! `addr` and `rw` each cycle, and exactly one device drives `data` in
//! response — the bus itself never inspects or computes anything.

#[derive(Debug, Clone, Copy, Default)]
pub struct Bus {
    pub addr: u16,
    pub data: u8,
    /// `true` = CPU reads, a device drives `data`. `false` = CPU writes, a
    /// device latches `data`.
    pub rw: bool,
}

impl Bus {
    pub fn new() -> Self {
        Self { addr: 0, data: 0, rw: true }
    }
}
