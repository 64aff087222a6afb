//! Object Transmission Information codec (RFC 6330 §3.3.2 / §3.3.3) and the
//! source-block partitioning derived from it.
//!
//! The two OTI words are the only parameters a sender and receiver must agree
//! on. On the wire both are big-endian; in process they are host integers.
//!
//! ```rust
//! use rqlink_fec::oti::{CommonOti, SchemeSpecificOti};
//! let common = CommonOti::pack(1_000_000, 1024);
//! assert_eq!(common.transfer_length(), 1_000_000);
//! assert_eq!(common.symbol_size(), 1024);
//! let scheme = SchemeSpecificOti::pack(4, 1, 4);
//! assert_eq!(SchemeSpecificOti::from_be_bytes(scheme.to_be_bytes()), scheme);
//! ```

use crate::{Error, Result};
use core::fmt;

/// Largest transfer length F RaptorQ can describe (RFC 6330 §4.3).
pub const MAX_TRANSFER_LENGTH: u64 = 942_574_504_275;
/// K'max: the largest number of source symbols in one source block.
pub const MAX_SOURCE_SYMBOLS_PER_BLOCK: u32 = 56_403;
/// Size of the 24-bit encoding symbol id space.
pub const SYMBOL_ID_SPACE: u32 = 1 << 24;

const TRANSFER_LENGTH_MASK: u64 = (1 << 40) - 1;

/// Common FEC OTI: F in bits 63..24, reserved bits 23..16, T in bits 15..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommonOti(u64);

impl CommonOti {
    /// Pack transfer length `F` and symbol size `T`. `F` is truncated to 40 bits.
    #[must_use]
    pub const fn pack(transfer_length: u64, symbol_size: u16) -> Self {
        Self(((transfer_length & TRANSFER_LENGTH_MASK) << 24) | symbol_size as u64)
    }

    /// Wrap a word as received, reserved bits included.
    #[must_use]
    pub const fn from_raw(word: u64) -> Self {
        Self(word)
    }

    /// The raw word.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Transfer length F, in octets.
    #[must_use]
    pub const fn transfer_length(self) -> u64 {
        self.0 >> 24
    }

    /// Symbol size T, in octets.
    #[must_use]
    pub const fn symbol_size(self) -> u16 {
        self.0 as u16
    }

    /// Network byte order.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parse 8 bytes in network byte order.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl From<u64> for CommonOti {
    fn from(word: u64) -> Self {
        Self(word)
    }
}

impl From<CommonOti> for u64 {
    fn from(oti: CommonOti) -> Self {
        oti.0
    }
}

impl fmt::Display for CommonOti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Scheme-Specific FEC OTI: Z in bits 31..24, N in bits 23..8, Al in bits 7..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemeSpecificOti(u32);

impl SchemeSpecificOti {
    /// Pack Z, N and Al.
    #[must_use]
    pub const fn pack(num_source_blocks: u8, num_sub_blocks: u16, symbol_alignment: u8) -> Self {
        Self(
            (num_source_blocks as u32) << 24
                | (num_sub_blocks as u32) << 8
                | symbol_alignment as u32,
        )
    }

    /// Wrap a word as received.
    #[must_use]
    pub const fn from_raw(word: u32) -> Self {
        Self(word)
    }

    /// The raw word.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Number of source blocks Z.
    #[must_use]
    pub const fn num_source_blocks(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Number of sub-blocks N.
    #[must_use]
    pub const fn num_sub_blocks(self) -> u16 {
        (self.0 >> 8) as u16
    }

    /// Symbol alignment parameter Al, in octets.
    #[must_use]
    pub const fn symbol_alignment(self) -> u8 {
        self.0 as u8
    }

    /// Network byte order.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parse 4 bytes in network byte order.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl From<u32> for SchemeSpecificOti {
    fn from(word: u32) -> Self {
        Self(word)
    }
}

impl From<SchemeSpecificOti> for u32 {
    fn from(oti: SchemeSpecificOti) -> Self {
        oti.0
    }
}

impl fmt::Display for SchemeSpecificOti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Unpacked (F, T, Z, N, Al) quintuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionInfo {
    /// F, in bytes.
    pub transfer_length: u64,
    /// T, in bytes.
    pub symbol_size: u16,
    /// Z.
    pub num_source_blocks: u8,
    /// N.
    pub num_sub_blocks: u16,
    /// Al, in bytes.
    pub symbol_alignment: u8,
}

impl TransmissionInfo {
    /// Unpack both OTI words. No validation.
    #[must_use]
    pub const fn from_oti(common: CommonOti, scheme: SchemeSpecificOti) -> Self {
        Self {
            transfer_length: common.transfer_length(),
            symbol_size: common.symbol_size(),
            num_source_blocks: scheme.num_source_blocks(),
            num_sub_blocks: scheme.num_sub_blocks(),
            symbol_alignment: scheme.symbol_alignment(),
        }
    }

    /// Pack F and T.
    #[must_use]
    pub const fn common_oti(&self) -> CommonOti {
        CommonOti::pack(self.transfer_length, self.symbol_size)
    }

    /// Pack Z, N and Al.
    #[must_use]
    pub const fn scheme_specific_oti(&self) -> SchemeSpecificOti {
        SchemeSpecificOti::pack(self.num_source_blocks, self.num_sub_blocks, self.symbol_alignment)
    }

    /// Kt: total number of source symbols in the object. Zero when T is zero.
    #[must_use]
    pub fn total_source_symbols(&self) -> u64 {
        match self.symbol_size {
            0 => 0,
            t => self.transfer_length.div_ceil(u64::from(t)),
        }
    }

    /// Check the ranges the codec engine can represent.
    pub fn validate(&self) -> Result<()> {
        let f = self.transfer_length;
        let t = self.symbol_size;
        let z = self.num_source_blocks;
        let n = self.num_sub_blocks;
        let al = self.symbol_alignment;
        if f == 0 || f > MAX_TRANSFER_LENGTH {
            return Err(Error::construction(format!(
                "transfer length {f} outside 1..={MAX_TRANSFER_LENGTH}"
            )));
        }
        if al == 0 {
            return Err(Error::construction("symbol alignment must be non-zero"));
        }
        if t == 0 || t % u16::from(al) != 0 {
            return Err(Error::construction(format!(
                "symbol size {t} must be a non-zero multiple of alignment {al}"
            )));
        }
        let kt = self.total_source_symbols();
        if z == 0 || u64::from(z) > kt {
            return Err(Error::construction(format!(
                "{z} source blocks cannot partition {kt} source symbols"
            )));
        }
        let per_block = kt.div_ceil(u64::from(z));
        if per_block > u64::from(MAX_SOURCE_SYMBOLS_PER_BLOCK) {
            return Err(Error::construction(format!(
                "{per_block} source symbols per block exceeds {MAX_SOURCE_SYMBOLS_PER_BLOCK}"
            )));
        }
        let max_sub_blocks = t / u16::from(al);
        if n == 0 || n > max_sub_blocks {
            return Err(Error::construction(format!(
                "sub-block count {n} outside 1..={max_sub_blocks}"
            )));
        }
        Ok(())
    }

    /// Engine-native parameter object. Callers must [`validate`](Self::validate) first:
    /// the `raptorq` constructor asserts on out-of-range values.
    pub(crate) fn to_raptorq(self) -> raptorq::ObjectTransmissionInformation {
        raptorq::ObjectTransmissionInformation::new(
            self.transfer_length,
            self.symbol_size,
            self.num_source_blocks,
            self.num_sub_blocks,
            self.symbol_alignment,
        )
    }
}

/// RFC 6330 §4.4.1.2 partition: split `i` items into `j` near-equal parts.
///
/// Returns `(il, is, jl, js)`: `jl` parts of size `il` followed by `js` parts of size `is`.
#[must_use]
pub fn partition(i: u64, j: u64) -> (u64, u64, u64, u64) {
    if j == 0 {
        return (0, 0, 0, 0);
    }
    let il = i.div_ceil(j);
    let is = i / j;
    let jl = i - is * j;
    let js = j - jl;
    (il, is, jl, js)
}

/// K': the extended source block size the engine actually solves for.
#[must_use]
pub fn extended_source_symbols(source_symbols: u16) -> u32 {
    match u32::from(source_symbols) {
        0 => 0,
        k => raptorq::extended_source_block_symbols(k.min(MAX_SOURCE_SYMBOLS_PER_BLOCK)),
    }
}

/// Placement of one source block inside the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExtent {
    /// Byte offset of the block within the object.
    pub offset: u64,
    /// Bytes of object data in the block (the last block ends at F).
    pub size: u32,
    /// Number of source symbols K.
    pub source_symbols: u16,
}

/// Per-block sizes derived from [`TransmissionInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    symbol_size: u16,
    blocks: Vec<BlockExtent>,
}

impl BlockLayout {
    /// Lay out the object. An info with T = 0 or Z = 0 yields an empty layout.
    #[must_use]
    pub fn new(info: &TransmissionInfo) -> Self {
        let t = u64::from(info.symbol_size);
        let z = u64::from(info.num_source_blocks);
        let mut blocks = Vec::with_capacity(z as usize);
        if t != 0 {
            let (kl, ks, zl, _) = partition(info.total_source_symbols(), z);
            let mut offset = 0u64;
            for sbn in 0..z {
                let k = if sbn < zl { kl } else { ks };
                let size = (k * t).min(info.transfer_length.saturating_sub(offset));
                blocks.push(BlockExtent {
                    offset,
                    size: u32::try_from(size).unwrap_or(u32::MAX),
                    source_symbols: u16::try_from(k).unwrap_or(u16::MAX),
                });
                offset += k * t;
            }
        }
        Self { symbol_size: info.symbol_size, blocks }
    }

    /// Z, or 0 for an empty layout.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Extent of block `sbn`.
    #[must_use]
    pub fn block(&self, sbn: u8) -> Option<&BlockExtent> {
        self.blocks.get(usize::from(sbn))
    }

    /// Extents in SBN order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockExtent> {
        self.blocks.iter()
    }

    /// Block size in octets, or 0 if `sbn` is out of range.
    #[must_use]
    pub fn block_size(&self, sbn: u8) -> u32 {
        self.block(sbn).map_or(0, |b| b.size)
    }

    /// Source symbol count K, or 0 if `sbn` is out of range.
    #[must_use]
    pub fn source_symbols(&self, sbn: u8) -> u16 {
        self.block(sbn).map_or(0, |b| b.source_symbols)
    }

    /// K * T: the block length including zero padding of the final symbol.
    #[must_use]
    pub fn padded_size(&self, sbn: u8) -> usize {
        usize::from(self.source_symbols(sbn)) * usize::from(self.symbol_size)
    }

    /// K' for block `sbn`: the fewest symbols that can possibly decode it.
    #[must_use]
    pub fn min_symbols(&self, sbn: u8) -> u32 {
        extended_source_symbols(self.source_symbols(sbn))
    }

    /// Number of usable ESIs for block `sbn`: those whose internal symbol id
    /// still fits in 24 bits once the K' - K padding symbols are skipped.
    #[must_use]
    pub fn max_symbols(&self, sbn: u8) -> u32 {
        match self.source_symbols(sbn) {
            0 => 0,
            k => SYMBOL_ID_SPACE - (extended_source_symbols(k) - u32::from(k)),
        }
    }

    pub(crate) fn check(&self, sbn: u8) -> Result<&BlockExtent> {
        self.block(sbn).ok_or(Error::BlockOutOfRange {
            sbn,
            num_blocks: self.blocks.len() as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn common_oti_scenario_round_trip() {
        let oti = CommonOti::pack(1_000_000, 1024);
        assert_eq!(oti.transfer_length(), 1_000_000);
        assert_eq!(oti.symbol_size(), 1024);
        assert_eq!(oti.get(), (1_000_000u64 << 24) | 1024);
    }

    #[test]
    fn reserved_bits_are_zero_and_ignored() {
        let oti = CommonOti::pack(7, 0xFFFF);
        assert_eq!(oti.get() & 0x00FF_0000, 0);
        let dirty = CommonOti::from_raw(oti.get() | 0x00AB_0000);
        assert_eq!(dirty.transfer_length(), 7);
        assert_eq!(dirty.symbol_size(), 0xFFFF);
    }

    #[test]
    fn wire_form_is_big_endian() {
        let common = CommonOti::pack(0x01_0203_0405, 0x0607);
        assert_eq!(common.to_be_bytes(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x00, 0x06, 0x07]);
        let scheme = SchemeSpecificOti::pack(0x11, 0x2233, 0x44);
        assert_eq!(scheme.to_be_bytes(), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(CommonOti::from_be_bytes(common.to_be_bytes()), common);
    }

    #[test]
    fn oversized_transfer_length_is_masked() {
        let oti = CommonOti::pack(1 << 40, 8);
        assert_eq!(oti.transfer_length(), 0);
    }

    #[test]
    fn partition_matches_rfc_example() {
        // 10 symbols over 3 blocks: one block of 4, two blocks of 3.
        assert_eq!(partition(10, 3), (4, 3, 1, 2));
        assert_eq!(partition(9, 3), (3, 3, 0, 3));
        assert_eq!(partition(5, 0), (0, 0, 0, 0));
    }

    #[test]
    fn layout_last_block_ends_at_transfer_length() {
        let info = TransmissionInfo {
            transfer_length: 10_000,
            symbol_size: 1024,
            num_source_blocks: 3,
            num_sub_blocks: 1,
            symbol_alignment: 4,
        };
        let layout = BlockLayout::new(&info);
        // Kt = 10 -> blocks of 4, 3, 3 symbols
        assert_eq!(layout.source_symbols(0), 4);
        assert_eq!(layout.source_symbols(2), 3);
        assert_eq!(layout.block_size(0), 4096);
        assert_eq!(layout.block_size(1), 3072);
        assert_eq!(layout.block_size(2), 10_000 - 7168);
        assert_eq!(layout.padded_size(2), 3072);
        assert_eq!(layout.block_size(3), 0);
        let total: u64 = layout.iter().map(|b| u64::from(b.size)).sum();
        assert_eq!(total, 10_000);
    }

    #[test]
    fn validate_rejects_zero_source_blocks() {
        let info = TransmissionInfo::from_oti(CommonOti::pack(4096, 1024), SchemeSpecificOti::pack(0, 1, 4));
        assert!(matches!(info.validate(), Err(Error::Construction(_))));
    }

    #[test]
    fn validate_rejects_misaligned_and_oversplit() {
        let mut info = TransmissionInfo {
            transfer_length: 4096,
            symbol_size: 1024,
            num_source_blocks: 1,
            num_sub_blocks: 1,
            symbol_alignment: 3,
        };
        assert!(info.validate().is_err());
        info.symbol_alignment = 4;
        assert!(info.validate().is_ok());
        info.num_sub_blocks = 257;
        assert!(info.validate().is_err());
        info.num_sub_blocks = 1;
        info.num_source_blocks = 5; // only 4 symbols
        assert!(info.validate().is_err());
    }

    #[test]
    fn validate_rejects_too_many_symbols_per_block() {
        let info = TransmissionInfo {
            transfer_length: 56_404,
            symbol_size: 1,
            num_source_blocks: 1,
            num_sub_blocks: 1,
            symbol_alignment: 1,
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn extended_symbols_not_below_source_symbols() {
        for k in [1u16, 10, 11, 100, 1000] {
            assert!(extended_source_symbols(k) >= u32::from(k));
        }
        assert_eq!(extended_source_symbols(0), 0);
    }

    proptest! {
        #[test]
        fn common_oti_round_trip(f in 0u64..(1 << 40), t in any::<u16>()) {
            let oti = CommonOti::pack(f, t);
            prop_assert_eq!(oti.transfer_length(), f);
            prop_assert_eq!(oti.symbol_size(), t);
            prop_assert_eq!(CommonOti::from_be_bytes(oti.to_be_bytes()), oti);
        }

        #[test]
        fn scheme_oti_round_trip(z in any::<u8>(), n in any::<u16>(), al in any::<u8>()) {
            let oti = SchemeSpecificOti::pack(z, n, al);
            prop_assert_eq!(oti.num_source_blocks(), z);
            prop_assert_eq!(oti.num_sub_blocks(), n);
            prop_assert_eq!(oti.symbol_alignment(), al);
        }

        #[test]
        fn layout_covers_object(f in 1u64..5_000_000, t in 1u16..4096, z in 1u8..=255) {
            let info = TransmissionInfo {
                transfer_length: f,
                symbol_size: t,
                num_source_blocks: z,
                num_sub_blocks: 1,
                symbol_alignment: 1,
            };
            prop_assume!(info.validate().is_ok());
            let layout = BlockLayout::new(&info);
            let total: u64 = layout.iter().map(|b| u64::from(b.size)).sum();
            prop_assert_eq!(total, f);
            prop_assert!(layout.iter().all(|b| b.size > 0));
        }
    }
}
