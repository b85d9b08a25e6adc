use crate::{PAGE_SHIFT, VirtualAddress};
use core::fmt;
use core::ops::Add;

/// Virtual page number.
///
/// The virtual counterpart of [`FrameNumber`](crate::FrameNumber): a
/// [`VirtualAddress`] shifted right by [`PAGE_SHIFT`](crate::PAGE_SHIFT).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let p = VirtualAddress::new(0x0040_2345).page();
/// assert_eq!(p.as_u32(), 0x402);
/// assert_eq!(p.base(), VirtualAddress::new(0x0040_2000));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageNumber(u32);

impl PageNumber {
    #[inline]
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Page that contains `va` (aligns down to the page boundary).
    #[inline]
    #[must_use]
    pub const fn containing(va: VirtualAddress) -> Self {
        Self(va.as_u32() >> PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// First byte of the page.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << PAGE_SHIFT)
    }
}

impl fmt::Debug for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:#07X})", self.0)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#07X}", self.0)
    }
}

impl From<u32> for PageNumber {
    #[inline]
    fn from(n: u32) -> Self {
        Self::new(n)
    }
}

impl Add<u32> for PageNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
