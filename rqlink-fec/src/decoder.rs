//! Decoder handle.
//!
//! Symbols are fed with [`Decoder::decode`]; reconstruction happens in the
//! engine and readiness is published through ready-block queues. Closing the
//! handle closes every queue, drains the engine and joins the bridge thread.

use crate::bridge::Bridge;
use crate::engine::raptorq::RaptorqDecodeEngine;
use crate::engine::DecodeEngine;
use crate::lifecycle::{HandleState, Lifecycle};
use crate::oti::{BlockLayout, CommonOti, SchemeSpecificOti, TransmissionInfo};
use crate::ready::{ready_block_channel, ReadyBlockReceiver, ReadyBlockSender, ReadyBlocks};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Debug)]
struct Running<E> {
    engine: Arc<E>,
    bridge: Bridge,
}

/// Receives encoding symbols for one object and reconstructs its source blocks.
///
/// Every operation except the OTI and layout getters fails with
/// [`Error::AlreadyClosed`] once [`close`](Self::close) has started.
pub struct Decoder<E: DecodeEngine = RaptorqDecodeEngine> {
    info: TransmissionInfo,
    layout: BlockLayout,
    ready: Arc<ReadyBlocks>,
    inner: Lifecycle<Running<E>>,
}

impl<E: DecodeEngine> Decoder<E> {
    /// Wrap an initialised engine. Starts the bridge thread; on failure the
    /// engine is released and no handle is returned.
    pub fn new(info: TransmissionInfo, engine: E, runtime: Handle) -> Result<Self> {
        let layout = BlockLayout::new(&info);
        let ready = Arc::new(ReadyBlocks::new(info.num_source_blocks, runtime));
        let engine = Arc::new(engine);
        let bridge = match Bridge::spawn(engine.clone(), ready.clone()) {
            Ok(bridge) => bridge,
            Err(e) => {
                engine.release();
                return Err(Error::construction(format!("failed to start ready-block bridge: {e}")));
            }
        };
        debug!(
            transfer_length = info.transfer_length,
            blocks = info.num_source_blocks,
            "decoder opened"
        );
        Ok(Self { info, layout, ready, inner: Lifecycle::new(Running { engine, bridge }) })
    }

    /// Submit one encoding symbol. Returns before the symbol is processed.
    pub fn decode(&self, sbn: u8, esi: u32, symbol: &[u8]) -> Result<()> {
        self.inner.with(|r| {
            self.layout.check(sbn)?;
            if esi >= self.layout.max_symbols(sbn) {
                return Err(Error::SymbolIdOutOfRange(esi));
            }
            r.engine.add_symbol(sbn, esi, symbol)
        })
    }

    /// Whether block `sbn` has been reconstructed and not freed.
    pub fn is_source_block_ready(&self, sbn: u8) -> Result<bool> {
        self.inner.with(|r| Ok(r.engine.is_block_ready(sbn)))
    }

    /// Whether every block has been reconstructed and none freed.
    pub fn is_source_object_ready(&self) -> Result<bool> {
        self.inner.with(|r| Ok(r.engine.is_ready()))
    }

    /// Copy reconstructed block `sbn` into `buf`.
    pub fn source_block(&self, sbn: u8, buf: &mut [u8]) -> Result<usize> {
        self.inner.with(|r| {
            let expected = self.layout.check(sbn)?.size as usize;
            if buf.len() < expected {
                return Err(Error::BufferTooSmall { needed: expected, actual: buf.len() });
            }
            let actual = r.engine.read_block(sbn, buf);
            if actual != expected {
                return Err(Error::ShortRead { expected, actual });
            }
            Ok(actual)
        })
    }

    /// Copy the whole reconstructed object into `buf`.
    pub fn source_object(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.with(|r| {
            let expected = self.info.transfer_length as usize;
            if buf.len() < expected {
                return Err(Error::BufferTooSmall { needed: expected, actual: buf.len() });
            }
            let actual = r.engine.read_object(buf);
            if actual != expected {
                return Err(Error::ShortRead { expected, actual });
            }
            Ok(actual)
        })
    }

    /// Drop the engine's working state for block `sbn`, decoded or not.
    pub fn free_source_block(&self, sbn: u8) -> Result<()> {
        self.inner.with(|r| {
            self.layout.check(sbn)?;
            r.engine.free_block(sbn);
            Ok(())
        })
    }

    /// Register `queue`; blocks already ready are replayed to it.
    pub fn add_ready_block_queue(&self, queue: &ReadyBlockSender) -> Result<()> {
        self.inner.with(|_| self.ready.add_subscriber(queue))
    }

    /// Unregister `queue`. The queue itself stays open.
    pub fn remove_ready_block_queue(&self, queue: &ReadyBlockSender) -> Result<()> {
        self.inner.with(|_| self.ready.remove_subscriber(queue))
    }

    /// Create a queue of `capacity`, register it and return its receiving half.
    pub fn subscribe(&self, capacity: usize) -> Result<ReadyBlockReceiver> {
        let (tx, rx) = ready_block_channel(capacity);
        self.add_ready_block_queue(&tx)?;
        Ok(rx)
    }

    /// Blocks the notifier has seen complete, in ascending order.
    pub fn ready_blocks(&self) -> Result<Vec<u8>> {
        self.inner.with(|_| Ok(self.ready.ready_blocks()))
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

    /// Bytes of object data in block `sbn`; 0 when out of range.
    pub fn source_block_size(&self, sbn: u8) -> u32 {
        self.layout.block_size(sbn)
    }

    /// K for block `sbn`; 0 when out of range.
    pub fn num_source_symbols(&self, sbn: u8) -> u16 {
        self.layout.source_symbols(sbn)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.inner.state()
    }

    /// Close every ready-block queue, release the engine and join the bridge.
    pub fn close(&self) -> Result<()> {
        let Running { engine, bridge } = self.inner.begin_close()?;
        self.ready.reset(self.info.num_source_blocks);
        engine.release();
        let exit = bridge.join();
        self.inner.finish_close();
        debug!(?exit, "decoder closed");
        Ok(())
    }
}

impl<E: DecodeEngine> Drop for Decoder<E> {
    fn drop(&mut self) {
        if self.inner.state() == HandleState::Open {
            warn!("decoder dropped while open, closing");
            let _ = self.close();
        }
    }
}

impl<E: DecodeEngine> std::fmt::Debug for Decoder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("info", &self.info)
            .field("state", &self.inner.state())
            .finish()
    }
}
