//! Encoder-side derivation of the source block and sub-block counts
//! (RFC 6330 §4.4.1.2).

use crate::oti::{extended_source_symbols, TransmissionInfo, MAX_SOURCE_SYMBOLS_PER_BLOCK, MAX_TRANSFER_LENGTH};
use crate::{Error, Result};
use rqlink_core::CodecConfig;

/// Inputs an encoder needs besides the object itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    /// T, in octets.
    pub symbol_size: u16,
    /// SS * Al: the smallest sub-symbol, in octets.
    pub min_sub_symbol_size: u16,
    /// WS: the largest sub-block decodable in working memory, in octets.
    pub max_sub_block_size: u32,
    /// Al, in octets.
    pub alignment: u8,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self::from(&CodecConfig::default())
    }
}

impl From<&CodecConfig> for EncoderParams {
    fn from(cfg: &CodecConfig) -> Self {
        Self {
            symbol_size: cfg.symbol_size,
            min_sub_symbol_size: cfg.min_sub_symbol_size,
            max_sub_block_size: cfg.max_sub_block_size,
            alignment: cfg.alignment,
        }
    }
}

impl EncoderParams {
    /// Same parameters with T replaced.
    #[must_use]
    pub fn with_symbol_size(mut self, symbol_size: u16) -> Self {
        self.symbol_size = symbol_size;
        self
    }

    fn check(&self) -> Result<()> {
        let al = u16::from(self.alignment);
        if al == 0 {
            return Err(Error::construction("alignment must be non-zero"));
        }
        if self.symbol_size == 0 || self.symbol_size % al != 0 {
            return Err(Error::construction(format!(
                "symbol size {} is not a non-zero multiple of alignment {al}",
                self.symbol_size
            )));
        }
        if self.min_sub_symbol_size == 0 || self.min_sub_symbol_size % al != 0 {
            return Err(Error::construction(format!(
                "minimum sub-symbol size {} is not a non-zero multiple of alignment {al}",
                self.min_sub_symbol_size
            )));
        }
        if self.min_sub_symbol_size > self.symbol_size {
            return Err(Error::construction(format!(
                "minimum sub-symbol size {} exceeds symbol size {}",
                self.min_sub_symbol_size, self.symbol_size
            )));
        }
        Ok(())
    }

    /// KL(n): the largest K' whose sub-blocks of `n` sub-symbols fit in WS.
    fn max_block_symbols(&self, n: u16) -> Option<u32> {
        let al = u64::from(self.alignment);
        let sub_symbol = u64::from(self.symbol_size).div_ceil(al * u64::from(n));
        largest_extended_at_most(u64::from(self.max_sub_block_size) / (al * sub_symbol))
    }

    /// Choose (Z, N) for an object of `transfer_length` octets.
    pub fn transmission_info(&self, transfer_length: u64) -> Result<TransmissionInfo> {
        self.check()?;
        if transfer_length == 0 || transfer_length > MAX_TRANSFER_LENGTH {
            return Err(Error::construction(format!(
                "transfer length {transfer_length} outside 1..={MAX_TRANSFER_LENGTH}"
            )));
        }
        let kt = transfer_length.div_ceil(u64::from(self.symbol_size));
        let n_max = self.symbol_size / self.min_sub_symbol_size;
        let kl_max = self.max_block_symbols(n_max).ok_or_else(|| {
            Error::construction(format!(
                "max sub-block size {} cannot hold a single source block",
                self.max_sub_block_size
            ))
        })?;
        let z = kt.div_ceil(u64::from(kl_max));
        let z = u8::try_from(z)
            .map_err(|_| Error::construction(format!("object needs {z} source blocks, at most 255 allowed")))?;
        let per_block = kt.div_ceil(u64::from(z));
        let n = (1..=n_max)
            .find(|&n| self.max_block_symbols(n).is_some_and(|kl| per_block <= u64::from(kl)))
            .unwrap_or(n_max);

        let info = TransmissionInfo {
            transfer_length,
            symbol_size: self.symbol_size,
            num_source_blocks: z,
            num_sub_blocks: n,
            symbol_alignment: self.alignment,
        };
        info.validate()?;
        Ok(info)
    }
}

/// Largest K' from the systematic index table not exceeding `x`.
fn largest_extended_at_most(x: u64) -> Option<u32> {
    if u64::from(extended_source_symbols(1)) > x {
        return None;
    }
    let (mut lo, mut hi) = (1u32, MAX_SOURCE_SYMBOLS_PER_BLOCK);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if u64::from(extended_source_symbols(mid as u16)) <= x {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Some(extended_source_symbols(lo as u16))
}
