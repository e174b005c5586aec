//! Direct register access for running on the device.

use crate::Hardware;

/// Special function registers reached through the data-memory base address.
///
/// Every access is volatile, so the compiler keeps each read, write and
/// no-op in program order.
#[derive(Debug)]
pub struct Registers {
    base: *mut u8,
}

impl Registers {
    /// # Safety
    ///
    /// `base` must point at data memory covering every register address the
    /// selected target touches, and nothing else may alias that memory while
    /// the returned value is alive.
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }
}

impl Hardware for Registers {
    fn read(&mut self, addr: u16) -> u8 {
        // SAFETY: `new` requires `base` to cover `addr`.
        unsafe { core::ptr::read_volatile(self.base.add(addr as usize)) }
    }

    fn write(&mut self, addr: u16, value: u8) {
        // SAFETY: `new` requires `base` to cover `addr`.
        unsafe { core::ptr::write_volatile(self.base.add(addr as usize), value) }
    }

    fn nop(&mut self) {
        core::hint::spin_loop();
    }
}
