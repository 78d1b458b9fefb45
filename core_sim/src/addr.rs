use std::fmt;

use thiserror::Error;

use crate::{
    bin::{self, ADDRESS_BITS},
    cache,
};

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Addr(u64);

impl Addr {
    pub fn new(v: u64) -> Self {
        Self(v)
    }
    pub fn inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for Addr {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{param} must not be negative (got {value})")]
    Negative { param: &'static str, value: i64 },
    #[error("associativity must be at least 1")]
    ZeroAssociativity,
    #[error("{set_bits} set bits and {block_bits} block bits do not fit in a 64-bit address")]
    AddressTooWide { set_bits: i64, block_bits: i64 },
    #[error("2^{set_bits} sets of {associativity} lines do not fit in memory")]
    TooManyLines { set_bits: i64, associativity: i64 },
}

/// shape of a set-associative cache: `2^s` sets of `E` lines holding `2^b`-byte blocks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Geometry {
    set_bits: u32,
    associativity: usize,
    block_bits: u32,
}

/// an address split into its cache fields.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Decomposed {
    pub tag: u64,
    pub set_index: usize,
    pub block_offset: u64,
}

impl Geometry {
    pub fn new(s: i64, e: i64, b: i64) -> Result<Self, ConfigurationError> {
        for (param, value) in [("s", s), ("E", e), ("b", b)] {
            if value < 0 {
                return Err(ConfigurationError::Negative { param, value });
            }
        }
        if e == 0 {
            return Err(ConfigurationError::ZeroAssociativity);
        }
        if s.saturating_add(b) > ADDRESS_BITS as i64 {
            return Err(ConfigurationError::AddressTooWide {
                set_bits: s,
                block_bits: b,
            });
        }
        let too_many = ConfigurationError::TooManyLines {
            set_bits: s,
            associativity: e,
        };
        // s and b are now within 0..=64
        let (set_bits, block_bits) = (s as u32, b as u32);
        let associativity = usize::try_from(e).map_err(|_| too_many.clone())?;
        match cache::footprint(set_bits, associativity) {
            Some(_) => Ok(Self {
                set_bits,
                associativity,
                block_bits,
            }),
            None => Err(too_many),
        }
    }
    pub(crate) fn too_many_lines(&self) -> ConfigurationError {
        ConfigurationError::TooManyLines {
            set_bits: self.set_bits.into(),
            associativity: self.associativity as i64,
        }
    }
    pub fn set_bits(&self) -> u32 {
        self.set_bits
    }
    pub fn associativity(&self) -> usize {
        self.associativity
    }
    pub fn block_bits(&self) -> u32 {
        self.block_bits
    }
    pub fn num_sets(&self) -> usize {
        1 << self.set_bits
    }
    /// bytes per block, `None` when `2^b` does not fit in a `u64` (b = 64).
    pub fn block_size(&self) -> Option<u64> {
        1u64.checked_shl(self.block_bits)
    }
    pub fn tag(&self, addr: Addr) -> u64 {
        bin::shr(addr.inner(), self.block_bits + self.set_bits)
    }
    pub fn set_index(&self, addr: Addr) -> usize {
        // fits: the line count check bounds set_bits below usize::BITS
        bin::extract(addr.inner(), self.block_bits, self.set_bits) as usize
    }
    pub fn block_offset(&self, addr: Addr) -> u64 {
        bin::extract(addr.inner(), 0, self.block_bits)
    }
    pub fn decompose(&self, addr: Addr) -> Decomposed {
        Decomposed {
            tag: self.tag(addr),
            set_index: self.set_index(addr),
            block_offset: self.block_offset(addr),
        }
    }
    /// first address of the block identified by `tag` in set `set_index`.
    pub fn block_base(&self, tag: u64, set_index: usize) -> Addr {
        let tag = bin::shl(tag, self.block_bits + self.set_bits);
        let set = bin::shl(set_index as u64, self.block_bits);
        Addr::new(tag | set)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={} E={} b={} ({} sets, {}-way, {}-bit block offset)",
            self.set_bits,
            self.associativity,
            self.block_bits,
            self.num_sets(),
            self.associativity,
            self.block_bits
        )
    }
}
