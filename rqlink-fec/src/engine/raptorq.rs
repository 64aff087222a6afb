#![forbid(unsafe_code)]

//! Engine backed by the `raptorq` crate.
//!
//! Decoding is asynchronous: submitted symbols are queued to one worker
//! thread which feeds the per-block `SourceBlockDecoder`s and publishes every
//! completed block on an event channel drained by [`DecodeEngine::wait_ready_block`].
//! Encoding is synchronous and lazily builds one `SourceBlockEncoder` per block.
//!
//! The `raptorq` crate identifies repair symbols by internal symbol id (ISI)
//! rather than RFC 6330 encoding symbol id (ESI); the two differ by the K' - K
//! padding symbols, so both engines translate at the boundary.

use super::{DecodeEngine, EncodeEngine, ReadyEvent};
use crate::oti::{extended_source_symbols, BlockLayout, TransmissionInfo};
use crate::{Error, Result};
use parking_lot::Mutex;
use raptorq::{
    EncodingPacket, ObjectTransmissionInformation, PayloadId, SourceBlockDecoder, SourceBlockEncoder,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Internal symbol id for an RFC encoding symbol id in a block of `k` source symbols.
fn esi_to_isi(esi: u32, k: u16) -> u32 {
    let k32 = u32::from(k);
    if esi < k32 {
        esi
    } else {
        esi + (extended_source_symbols(k) - k32)
    }
}

struct Job {
    sbn: u8,
    packet: EncodingPacket,
}

/// Per-block decode state. The worker moves a block to `Solving` while it
/// runs elimination with the slot unlocked.
enum BlockState {
    Collecting(SourceBlockDecoder),
    Solving,
    Ready(Vec<u8>),
    Freed,
}

struct BlockSlot {
    state: BlockState,
    size: usize,
}

impl BlockSlot {
    fn accepts_symbols(&self) -> bool {
        matches!(self.state, BlockState::Collecting(_) | BlockState::Solving)
    }

    fn data(&self) -> Option<&[u8]> {
        match &self.state {
            BlockState::Ready(data) => Some(data),
            _ => None,
        }
    }
}

type Slots = Arc<Vec<Mutex<BlockSlot>>>;

/// Decode engine running `raptorq` elimination on a dedicated worker thread.
pub struct RaptorqDecodeEngine {
    symbol_size: usize,
    layout: BlockLayout,
    blocks: Slots,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    events: Mutex<mpsc::UnboundedReceiver<u8>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RaptorqDecodeEngine {
    /// Allocate per-block decoders and start the decode worker.
    pub fn new(info: TransmissionInfo) -> Result<Self> {
        info.validate()?;
        let config = info.to_raptorq();
        let layout = BlockLayout::new(&info);
        let blocks: Slots = Arc::new(
            (0..layout.num_blocks())
                .map(|i| {
                    let sbn = i as u8;
                    let decoder = SourceBlockDecoder::new2(sbn, &config, layout.padded_size(sbn) as u64);
                    Mutex::new(BlockSlot {
                        state: BlockState::Collecting(decoder),
                        size: layout.block_size(sbn) as usize,
                    })
                })
                .collect(),
        );

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = {
            let blocks = blocks.clone();
            std::thread::Builder::new()
                .name("rqlink-decode".into())
                .spawn(move || decode_worker(blocks, job_rx, event_tx))
                .map_err(|e| Error::construction(format!("failed to start decode worker: {e}")))?
        };
        debug!(blocks = layout.num_blocks(), "raptorq decode engine started");

        Ok(Self {
            symbol_size: usize::from(info.symbol_size),
            layout,
            blocks,
            jobs: Mutex::new(Some(job_tx)),
            events: Mutex::new(event_rx),
            worker: Mutex::new(Some(worker)),
        })
    }
}

/// Everything queued so far, grouped by block in arrival order.
fn drain_batch(first: Job, jobs: &mut mpsc::UnboundedReceiver<Job>) -> BTreeMap<u8, Vec<EncodingPacket>> {
    let mut batch: BTreeMap<u8, Vec<EncodingPacket>> = BTreeMap::new();
    batch.entry(first.sbn).or_default().push(first.packet);
    while let Ok(Job { sbn, packet }) = jobs.try_recv() {
        batch.entry(sbn).or_default().push(packet);
    }
    batch
}

fn decode_worker(blocks: Slots, mut jobs: mpsc::UnboundedReceiver<Job>, events: mpsc::UnboundedSender<u8>) {
    while let Some(first) = jobs.blocking_recv() {
        for (sbn, packets) in drain_batch(first, &mut jobs) {
            let Some(slot) = blocks.get(usize::from(sbn)) else { continue };
            let mut decoder = {
                let mut slot = slot.lock();
                match std::mem::replace(&mut slot.state, BlockState::Solving) {
                    BlockState::Collecting(decoder) => decoder,
                    other => {
                        slot.state = other;
                        continue;
                    }
                }
            };

            let decoded = decoder.decode(packets);

            let mut slot = slot.lock();
            if !matches!(slot.state, BlockState::Solving) {
                // freed while solving
                continue;
            }
            match decoded {
                Some(mut data) => {
                    data.truncate(slot.size);
                    slot.state = BlockState::Ready(data);
                    drop(slot);
                    trace!(sbn, "source block decoded");
                    // receiver only goes away when the engine itself is dropped
                    let _ = events.send(sbn);
                }
                None => slot.state = BlockState::Collecting(decoder),
            }
        }
    }
    debug!("decode worker drained");
}

impl DecodeEngine for RaptorqDecodeEngine {
    fn add_symbol(&self, sbn: u8, esi: u32, symbol: &[u8]) -> Result<()> {
        let block = self.layout.check(sbn)?;
        if symbol.len() != self.symbol_size {
            return Err(Error::SymbolLength { expected: self.symbol_size, actual: symbol.len() });
        }
        if !self.blocks[usize::from(sbn)].lock().accepts_symbols() {
            // already decoded or freed
            return Ok(());
        }
        let packet = EncodingPacket::new(PayloadId::new(sbn, esi_to_isi(esi, block.source_symbols)), symbol.to_vec());
        let jobs = self.jobs.lock();
        let tx = jobs.as_ref().ok_or(Error::AlreadyClosed)?;
        tx.send(Job { sbn, packet }).map_err(|_| Error::AlreadyClosed)
    }

    fn is_block_ready(&self, sbn: u8) -> bool {
        self.blocks.get(usize::from(sbn)).is_some_and(|slot| slot.lock().data().is_some())
    }

    fn is_ready(&self) -> bool {
        self.blocks.iter().all(|slot| slot.lock().data().is_some())
    }

    fn read_block(&self, sbn: u8, buf: &mut [u8]) -> usize {
        let Some(slot) = self.blocks.get(usize::from(sbn)) else { return 0 };
        let slot = slot.lock();
        match slot.data() {
            Some(data) if buf.len() >= data.len() => {
                buf[..data.len()].copy_from_slice(data);
                data.len()
            }
            _ => 0,
        }
    }

    fn read_object(&self, buf: &mut [u8]) -> usize {
        let mut written = 0;
        for slot in self.blocks.iter() {
            let slot = slot.lock();
            let Some(data) = slot.data() else { break };
            let Some(dst) = buf.get_mut(written..written + data.len()) else { break };
            dst.copy_from_slice(data);
            written += data.len();
        }
        written
    }

    fn free_block(&self, sbn: u8) {
        if let Some(slot) = self.blocks.get(usize::from(sbn)) {
            slot.lock().state = BlockState::Freed;
        }
    }

    fn wait_ready_block(&self) -> ReadyEvent {
        match self.events.lock().blocking_recv() {
            Some(sbn) => ReadyEvent::Block(sbn),
            None => ReadyEvent::Exiting,
        }
    }

    fn release(&self) {
        // closing the job queue lets the worker drain and drop the event sender
        drop(self.jobs.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("decode worker panicked");
            }
        }
    }
}

impl Drop for RaptorqDecodeEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Default)]
struct EncodeSlot {
    /// Block bytes zero-padded to K * T.
    source: Option<Vec<u8>>,
    encoder: Option<SourceBlockEncoder>,
    /// Source symbols as the engine emits them (sub-block interleaved when N > 1).
    source_symbols: Option<Vec<EncodingPacket>>,
}

/// Encode engine building one `raptorq` block encoder per source block on first use.
pub struct RaptorqEncodeEngine {
    config: ObjectTransmissionInformation,
    symbol_size: usize,
    interleaved: bool,
    layout: BlockLayout,
    blocks: Vec<Mutex<EncodeSlot>>,
}

impl RaptorqEncodeEngine {
    /// Copy `data` into per-block buffers. `data.len()` must equal the transfer length.
    pub fn new(info: TransmissionInfo, data: &[u8]) -> Result<Self> {
        info.validate()?;
        if data.len() as u64 != info.transfer_length {
            return Err(Error::construction(format!(
                "input is {} bytes but transfer length is {}",
                data.len(),
                info.transfer_length
            )));
        }
        let layout = BlockLayout::new(&info);
        let blocks = layout
            .iter()
            .enumerate()
            .map(|(i, extent)| {
                let start = extent.offset as usize;
                let mut source = data[start..start + extent.size as usize].to_vec();
                source.resize(layout.padded_size(i as u8), 0);
                Mutex::new(EncodeSlot { source: Some(source), ..EncodeSlot::default() })
            })
            .collect();
        Ok(Self {
            config: info.to_raptorq(),
            symbol_size: usize::from(info.symbol_size),
            interleaved: info.num_sub_blocks > 1,
            layout,
            blocks,
        })
    }
}

impl EncodeEngine for RaptorqEncodeEngine {
    fn encode(&self, sbn: u8, esi: u32, buf: &mut [u8]) -> usize {
        let t = self.symbol_size;
        let Some(block) = self.layout.block(sbn) else { return 0 };
        if buf.len() < t {
            return 0;
        }
        let k = u32::from(block.source_symbols);
        let mut guard = self.blocks[usize::from(sbn)].lock();
        let slot = &mut *guard;
        let Some(source) = slot.source.as_deref() else { return 0 };

        if esi < k && !self.interleaved {
            let start = esi as usize * t;
            buf[..t].copy_from_slice(&source[start..start + t]);
            return t;
        }

        let encoder = slot
            .encoder
            .get_or_insert_with(|| SourceBlockEncoder::new2(sbn, &self.config, source));
        let packet = if esi < k {
            let symbols = slot.source_symbols.get_or_insert_with(|| encoder.source_packets());
            symbols.get(esi as usize).cloned()
        } else {
            encoder.repair_packets(esi - k, 1).into_iter().next()
        };
        match packet {
            Some(packet) if packet.data().len() == t => {
                buf[..t].copy_from_slice(packet.data());
                t
            }
            _ => 0,
        }
    }

    fn free_block(&self, sbn: u8) {
        if let Some(slot) = self.blocks.get(usize::from(sbn)) {
            *slot.lock() = EncodeSlot::default();
        }
    }

    fn release(&self) {
        for slot in &self.blocks {
            *slot.lock() = EncodeSlot::default();
        }
    }
}
