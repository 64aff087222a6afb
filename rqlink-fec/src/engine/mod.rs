//! Codec engine seam.
//!
//! Handles talk to the FEC mathematics only through these traits. The
//! production engine is [`raptorq`]; tests substitute scripted engines to
//! exercise the lifecycle without real decoding.

/// Engines backed by the `raptorq` crate.
pub mod raptorq;

use crate::Result;

/// Outcome of a blocking [`DecodeEngine::wait_ready_block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyEvent {
    /// Source block `sbn` has been reconstructed.
    Block(u8),
    /// The engine is shutting down; no further events will follow.
    Exiting,
}

/// Decoding half of the engine.
///
/// `add_symbol` may return before the symbol is processed; completion is
/// reported through `wait_ready_block`.
pub trait DecodeEngine: Send + Sync + 'static {
    /// Queue one encoding symbol for block `sbn`.
    fn add_symbol(&self, sbn: u8, esi: u32, symbol: &[u8]) -> Result<()>;
    /// Whether block `sbn` is decoded and still held.
    fn is_block_ready(&self, sbn: u8) -> bool;
    /// Whether every block is decoded and still held.
    fn is_ready(&self) -> bool;
    /// Copy block `sbn` into `buf`, returning the number of bytes written
    /// (0 when the block is not available).
    fn read_block(&self, sbn: u8, buf: &mut [u8]) -> usize;
    /// Copy the whole object into `buf`, returning the number of bytes written.
    fn read_object(&self, buf: &mut [u8]) -> usize;
    /// Drop all state for block `sbn`.
    fn free_block(&self, sbn: u8);
    /// Block until a block completes or the engine starts exiting.
    fn wait_ready_block(&self) -> ReadyEvent;
    /// Drain outstanding work and make every pending and future
    /// `wait_ready_block` return [`ReadyEvent::Exiting`]. Idempotent.
    fn release(&self);
}

/// Encoding half of the engine.
pub trait EncodeEngine: Send + Sync + 'static {
    /// Write symbol (`sbn`, `esi`) into `buf`. Returns bytes written, 0 when
    /// the engine cannot produce the symbol.
    fn encode(&self, sbn: u8, esi: u32, buf: &mut [u8]) -> usize;
    /// Drop the working memory of block `sbn`.
    fn free_block(&self, sbn: u8);
    /// Drop all working memory. Idempotent.
    fn release(&self);
}
