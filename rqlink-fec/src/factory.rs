//! Handle factories.

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::engine::raptorq::{RaptorqDecodeEngine, RaptorqEncodeEngine};
use crate::engine::{DecodeEngine, EncodeEngine};
use crate::oti::{CommonOti, SchemeSpecificOti, TransmissionInfo};
use crate::params::EncoderParams;
use crate::{Error, Result};
use tokio::runtime::Handle;

/// Builds encoders over some [`EncodeEngine`].
pub trait EncoderFactory {
    /// Engine behind the built encoders.
    type Engine: EncodeEngine;

    /// Build an encoder for `input`, deriving Z and N from `params`.
    fn new_encoder(&self, input: &[u8], params: &EncoderParams) -> Result<Encoder<Self::Engine>>;
}

/// Builds decoders over some [`DecodeEngine`].
pub trait DecoderFactory {
    /// Engine behind the built decoders.
    type Engine: DecodeEngine;

    /// Build a decoder for the object described by the two OTI words.
    fn new_decoder(&self, common: CommonOti, scheme: SchemeSpecificOti) -> Result<Decoder<Self::Engine>>;
}

/// Encoder factory backed by the `raptorq` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaptorqEncoderFactory;

impl EncoderFactory for RaptorqEncoderFactory {
    type Engine = RaptorqEncodeEngine;

    fn new_encoder(&self, input: &[u8], params: &EncoderParams) -> Result<Encoder<RaptorqEncodeEngine>> {
        let info = params.transmission_info(input.len() as u64)?;
        let engine = RaptorqEncodeEngine::new(info, input)?;
        Ok(Encoder::new(info, params.max_sub_block_size, engine))
    }
}

/// Decoder factory delivering ready-block notifications on a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct RaptorqDecoderFactory {
    runtime: Option<Handle>,
}

impl RaptorqDecoderFactory {
    /// Deliver notifications on `runtime` instead of the caller's runtime.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime: Some(runtime) }
    }

    fn runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| Error::NoRuntime),
        }
    }
}

impl DecoderFactory for RaptorqDecoderFactory {
    type Engine = RaptorqDecodeEngine;

    fn new_decoder(&self, common: CommonOti, scheme: SchemeSpecificOti) -> Result<Decoder<RaptorqDecodeEngine>> {
        let info = TransmissionInfo::from_oti(common, scheme);
        info.validate()?;
        let runtime = self.runtime()?;
        let engine = RaptorqDecodeEngine::new(info)?;
        Decoder::new(info, engine, runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_outside_runtime_needs_explicit_handle() {
        let common = CommonOti::pack(4096, 1024);
        let scheme = SchemeSpecificOti::pack(1, 1, 4);
        let err = RaptorqDecoderFactory::default().new_decoder(common, scheme).unwrap_err();
        assert!(matches!(err, Error::NoRuntime));

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let dec = RaptorqDecoderFactory::with_runtime(rt.handle().clone())
            .new_decoder(common, scheme)
            .unwrap();
        assert_eq!(dec.transfer_length(), 4096);
        dec.close().unwrap();
    }

    #[test]
    fn encoder_rejects_empty_input() {
        let err = RaptorqEncoderFactory.new_encoder(&[], &EncoderParams::default()).unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
    }
}
