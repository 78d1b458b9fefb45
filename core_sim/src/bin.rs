/// width of a simulated address in bits.
pub const ADDRESS_BITS: u32 = u64::BITS;

/// mask with the lower `width` bits set. `width` may be the full address width.
#[inline]
pub const fn bit_mask_lower(width: u32) -> u64 {
    if width >= ADDRESS_BITS {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// logical right shift which yields 0 instead of overflowing.
#[inline]
pub const fn shr(bin: u64, amount: u32) -> u64 {
    if amount >= ADDRESS_BITS {
        0
    } else {
        bin >> amount
    }
}

/// logical left shift which yields 0 instead of overflowing.
#[inline]
pub const fn shl(bin: u64, amount: u32) -> u64 {
    if amount >= ADDRESS_BITS {
        0
    } else {
        bin << amount
    }
}

/// extracts `width` bits of `bin` starting at bit `start`.
#[inline]
pub const fn extract(bin: u64, start: u32, width: u32) -> u64 {
    shr(bin, start) & bit_mask_lower(width)
}
