#![forbid(unsafe_code)]

//! RaptorQ (RFC 6330) transport binding.
//!
//! * [`oti`] packs and unpacks the Common and Scheme-Specific OTI words and
//!   lays an object out into source blocks.
//! * [`ready`] tells any number of subscribers, once each, when a source
//!   block has been reconstructed.
//! * [`Decoder`] and [`Encoder`] own an engine resource and guarantee a
//!   clean, race-free shutdown on [`Decoder::close`] or drop.
//!
//! ```rust,no_run
//! # async fn demo() -> rqlink_fec::Result<()> {
//! use rqlink_fec::{new_decoder, new_encoder, EncoderParams};
//! let data = vec![7u8; 100_000];
//! let encoder = new_encoder(&data, &EncoderParams::default())?;
//! let decoder = new_decoder(encoder.common_oti(), encoder.scheme_specific_oti())?;
//! let mut ready = decoder.subscribe(16)?;
//! for sbn in 0..encoder.num_source_blocks() {
//!     for esi in 0..encoder.min_symbols(sbn) + 2 {
//!         decoder.decode(sbn, esi, &encoder.encode_symbol(sbn, esi)?)?;
//!     }
//! }
//! for _ in 0..decoder.num_source_blocks() {
//!     ready.recv().await;
//! }
//! let mut object = vec![0u8; data.len()];
//! decoder.source_object(&mut object)?;
//! decoder.close()?;
//! # Ok(()) }
//! ```

pub mod bridge;
pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod oti;
pub mod params;
pub mod ready;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use factory::{DecoderFactory, EncoderFactory, RaptorqDecoderFactory, RaptorqEncoderFactory};
pub use lifecycle::HandleState;
pub use oti::{BlockLayout, CommonOti, SchemeSpecificOti, TransmissionInfo};
pub use params::EncoderParams;
pub use ready::{ready_block_channel, ReadyBlockReceiver, ReadyBlockSender, ReadyBlocks};

/// Encoder for `input` using the `raptorq` engine.
pub fn new_encoder(input: &[u8], params: &EncoderParams) -> Result<Encoder> {
    RaptorqEncoderFactory.new_encoder(input, params)
}

/// Decoder using the `raptorq` engine. Must be called within a tokio runtime.
pub fn new_decoder(common: CommonOti, scheme: SchemeSpecificOti) -> Result<Decoder> {
    RaptorqDecoderFactory::default().new_decoder(common, scheme)
}
