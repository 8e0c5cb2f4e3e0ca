//! Memory-mapped chip ports
//!
//! The index port, data port and queue control register sit at consecutive
//! bus addresses. All three are write-only.

use super::bus::ChipPorts;
use volatile_register::WO;

/// Control register value that discards pending queue entries
pub const QUEUE_FLUSH: u8 = 0x01;

/// Register block as laid out on the bus
#[repr(C)]
pub struct OplPortBlock {
    /// Address / index port
    pub index: WO<u8>,
    /// Data port
    pub data: WO<u8>,
    /// Write-queue control register
    pub control: WO<u8>,
}

/// [`ChipPorts`] backed by a memory-mapped [`OplPortBlock`]
pub struct MmioPorts<'a> {
    block: &'a OplPortBlock,
}

impl MmioPorts<'static> {
    /// Map the port block at a fixed bus address
    ///
    /// # Safety
    ///
    /// `base` must be the address of the chip's port block, and no other
    /// `MmioPorts` may be alive for the same block.
    pub unsafe fn at(base: usize) -> Self {
        MmioPorts {
            block: unsafe { &*(base as *const OplPortBlock) },
        }
    }
}

impl<'a> MmioPorts<'a> {
    /// Wrap an already mapped block
    pub fn new(block: &'a OplPortBlock) -> Self {
        MmioPorts { block }
    }
}

impl ChipPorts for MmioPorts<'_> {
    #[inline(always)]
    fn write_index(&mut self, index: u8) {
        unsafe { self.block.index.write(index) }
    }

    #[inline(always)]
    fn write_data(&mut self, value: u8) {
        unsafe { self.block.data.write(value) }
    }

    #[inline(always)]
    fn flush_queue(&mut self) {
        unsafe { self.block.control.write(QUEUE_FLUSH) }
    }
}
