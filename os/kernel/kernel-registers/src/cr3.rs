#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PAGE_SHIFT, PhysicalAddress};

/// CR3: Page-Directory Base Register (32-bit paging).
///
/// Holds the physical frame of the active page directory and the cache-control
/// flags used when the CPU walks it.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    /// Bits 0–2: Reserved (must be 0).
    #[bits(3)]
    _reserved_0_2: u8,

    /// Bit 3: PWT: Page-level Write-Through for the directory.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for the directory.
    pub pcd: bool,

    /// Bits 5–11: Reserved (must be 0 when written).
    #[bits(7)]
    _reserved_5_11: u8,

    /// Bits 12–31: Page-directory physical base >> 12.
    #[bits(20)]
    directory_frame: u32,
}

impl Cr3 {
    /// CR3 value pointing at the directory stored in `directory`.
    ///
    /// Writing this value reloads the whole translation cache.
    #[must_use]
    pub const fn from_directory(directory: FrameNumber) -> Self {
        Self::new().with_directory_frame(directory.as_u32())
    }

    /// Frame holding the active page directory.
    #[must_use]
    pub const fn directory(&self) -> FrameNumber {
        FrameNumber::new(self.directory_frame())
    }

    /// Physical address of the active page directory.
    #[must_use]
    pub const fn directory_base(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.directory_frame() << PAGE_SHIFT)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
