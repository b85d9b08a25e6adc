//! # Page-Fault Decoding
//!
//! On a page fault the CPU pushes an error code and leaves the faulting
//! address in CR2. [`PageFault`] bundles both so the resolver never has to
//! touch the registers itself.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// Page-fault error code layout.
///
/// Each bit describes the condition that caused the page fault.
/// Reference: Intel SDM Vol. 3A, §4.7 "Page-Fault Exceptions".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch (execute access).
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation.
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access.
    pub shadow_stack: bool, // bit 6

    #[bits(25)]
    __: u32, // reserved / ignored bits
}

impl PageFaultError {
    /// Error code of an access that hit a missing entry.
    #[must_use]
    pub const fn not_present(write: bool) -> Self {
        Self::new().with_write(write)
    }

    /// Error code of an access the permission bits rejected.
    #[must_use]
    pub const fn protection(write: bool) -> Self {
        Self::new().with_present(true).with_write(write)
    }

    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (page not mapped yet)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// A page fault as delivered to the resolver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageFault {
    /// The faulting linear address (CR2).
    pub address: VirtualAddress,
    /// The error code pushed by the CPU.
    pub error: PageFaultError,
}

impl PageFault {
    #[must_use]
    pub const fn new(address: VirtualAddress, error: PageFaultError) -> Self {
        Self { address, error }
    }

    /// Decode the raw values an interrupt stub hands over.
    #[must_use]
    pub const fn from_raw(cr2: u32, error_code: u32) -> Self {
        Self::new(VirtualAddress::new(cr2), PageFaultError::from_bits(error_code))
    }

    /// Whether the page was missing, as opposed to present but protected.
    #[must_use]
    pub const fn is_not_present(&self) -> bool {
        !self.error.present()
    }
}

impl fmt::Display for PageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page fault at {} (err={:#x}): {}",
            self.address,
            self.error.into_bits(),
            self.error.explain()
        )
    }
}
