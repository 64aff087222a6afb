//! Encoder handle.

use crate::engine::raptorq::RaptorqEncodeEngine;
use crate::engine::EncodeEngine;
use crate::lifecycle::{HandleState, Lifecycle};
use crate::oti::{BlockLayout, CommonOti, SchemeSpecificOti, TransmissionInfo};
use crate::{Error, Result};
use tracing::{debug, warn};

/// Produces encoding symbols for one object.
///
/// ESIs `0..K` of a block are its source symbols; `K..max_symbols(sbn)` are
/// repair symbols.
pub struct Encoder<E: EncodeEngine = RaptorqEncodeEngine> {
    info: TransmissionInfo,
    layout: BlockLayout,
    max_sub_block_size: u32,
    inner: Lifecycle<E>,
}

impl<E: EncodeEngine> Encoder<E> {
    /// Wrap an initialised engine. `max_sub_block_size` is reported back by
    /// [`max_sub_block_size`](Self::max_sub_block_size).
    pub fn new(info: TransmissionInfo, max_sub_block_size: u32, engine: E) -> Self {
        debug!(
            transfer_length = info.transfer_length,
            blocks = info.num_source_blocks,
            sub_blocks = info.num_sub_blocks,
            "encoder opened"
        );
        Self {
            layout: BlockLayout::new(&info),
            info,
            max_sub_block_size,
            inner: Lifecycle::new(engine),
        }
    }

    /// Write symbol (`sbn`, `esi`) into the first T bytes of `buf`.
    pub fn encode(&self, sbn: u8, esi: u32, buf: &mut [u8]) -> Result<usize> {
        self.inner.with(|engine| {
            self.layout.check(sbn)?;
            let t = usize::from(self.info.symbol_size);
            if buf.len() < t {
                return Err(Error::BufferTooSmall { needed: t, actual: buf.len() });
            }
            if esi >= self.layout.max_symbols(sbn) {
                return Err(Error::SymbolIdOutOfRange(esi));
            }
            match engine.encode(sbn, esi, buf) {
                0 => Err(Error::Encode { sbn, esi }),
                n => Ok(n),
            }
        })
    }

    /// Allocating variant of [`encode`](Self::encode).
    pub fn encode_symbol(&self, sbn: u8, esi: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; usize::from(self.info.symbol_size)];
        let n = self.encode(sbn, esi, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Release the working memory of block `sbn`. Later `encode` calls for
    /// it fail.
    pub fn free_source_block(&self, sbn: u8) -> Result<()> {
        self.inner.with(|engine| {
            self.layout.check(sbn)?;
            engine.free_block(sbn);
            Ok(())
        })
    }

    /// The unpacked OTI.
    pub fn transmission_info(&self) -> TransmissionInfo {
        self.info
    }

    /// Common FEC OTI word.
    pub fn common_oti(&self) -> CommonOti {
        self.info.common_oti()
    }

    /// Scheme-Specific FEC OTI word.
    pub fn scheme_specific_oti(&self) -> SchemeSpecificOti {
        self.info.scheme_specific_oti()
    }

    /// F, in bytes.
    pub fn transfer_length(&self) -> u64 {
        self.info.transfer_length
    }

    /// T, in bytes.
    pub fn symbol_size(&self) -> u16 {
        self.info.symbol_size
    }

    /// Z.
    pub fn num_source_blocks(&self) -> u8 {
        self.info.num_source_blocks
    }

    /// N.
    pub fn num_sub_blocks(&self) -> u16 {
        self.info.num_sub_blocks
    }

    /// Al.
    pub fn symbol_alignment(&self) -> u8 {
        self.info.symbol_alignment
    }

    /// WS the sub-block partitioning was derived from.
    pub fn max_sub_block_size(&self) -> u32 {
        self.max_sub_block_size
    }

    /// Bytes of object data in block `sbn`; 0 when out of range.
    pub fn source_block_size(&self, sbn: u8) -> u32 {
        self.layout.block_size(sbn)
    }

    /// K for block `sbn`; 0 when out of range.
    pub fn num_source_symbols(&self, sbn: u8) -> u16 {
        self.layout.source_symbols(sbn)
    }

    /// K': symbols a decoder should collect before it can expect success.
    pub fn min_symbols(&self, sbn: u8) -> u32 {
        self.layout.min_symbols(sbn)
    }

    /// Number of usable ESIs for block `sbn`.
    pub fn max_symbols(&self, sbn: u8) -> u32 {
        self.layout.max_symbols(sbn)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.inner.state()
    }

    /// Release the engine. A second call returns [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        let engine = self.inner.begin_close()?;
        engine.release();
        drop(engine);
        self.inner.finish_close();
        debug!("encoder closed");
        Ok(())
    }
}

impl<E: EncodeEngine> Drop for Encoder<E> {
    fn drop(&mut self) {
        if self.inner.state() == HandleState::Open {
            warn!("encoder dropped while open, closing");
            let _ = self.close();
        }
    }
}

impl<E: EncodeEngine> std::fmt::Debug for Encoder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("info", &self.info)
            .field("state", &self.inner.state())
            .finish()
    }
}
