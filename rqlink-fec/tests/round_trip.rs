#![forbid(unsafe_code)]
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rand::{rngs::StdRng, Rng, SeedableRng};
use rqlink_fec::{new_decoder, new_encoder, Decoder, Encoder, EncoderParams, Error, ReadyBlockReceiver};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::timeout;

fn object(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Send every block with one source symbol in five lost, topping up with
/// repair symbols until K + 4 symbols have been delivered.
fn feed_lossy(enc: &Encoder, dec: &Decoder) {
    for sbn in 0..enc.num_source_blocks() {
        let wanted = u32::from(enc.num_source_symbols(sbn)) + 4;
        let mut delivered = 0;
        let mut esi = 0;
        while delivered < wanted {
            if esi % 5 != 0 {
                let symbol = enc.encode_symbol(sbn, esi).unwrap();
                dec.decode(sbn, esi, &symbol).unwrap();
                delivered += 1;
            }
            esi += 1;
        }
    }
}

async fn await_all(rx: &mut ReadyBlockReceiver, num_blocks: u8) -> BTreeSet<u8> {
    let mut seen = BTreeSet::new();
    while seen.len() < usize::from(num_blocks) {
        let sbn = timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("ready-block timeout")
            .expect("queue closed early");
        assert!(seen.insert(sbn), "block {sbn} delivered twice");
    }
    seen
}

async fn transfer(data: &[u8], params: EncoderParams) -> (Vec<u8>, u8, u16) {
    let enc = new_encoder(data, &params).unwrap();
    let dec = new_decoder(enc.common_oti(), enc.scheme_specific_oti()).unwrap();
    let mut rx = dec.subscribe(256).unwrap();
    feed_lossy(&enc, &dec);

    let seen = await_all(&mut rx, enc.num_source_blocks()).await;
    assert_eq!(seen, (0..enc.num_source_blocks()).collect());
    assert!(dec.is_source_object_ready().unwrap());

    let mut out = vec![0u8; data.len()];
    assert_eq!(dec.source_object(&mut out).unwrap(), data.len());
    let shape = (out, enc.num_source_blocks(), enc.num_sub_blocks());
    dec.close().unwrap();
    enc.close().unwrap();
    shape
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn megabyte_object_round_trips() {
    rqlink_core::logging::init_for_tests();
    let data = object(1_000_000, 1);
    let params = EncoderParams {
        symbol_size: 1024,
        min_sub_symbol_size: 1024,
        max_sub_block_size: 8 * 1024 * 1024,
        alignment: 4,
    };
    let enc = new_encoder(&data, &params).unwrap();
    assert_eq!(enc.common_oti().transfer_length(), 1_000_000);
    assert_eq!(enc.common_oti().symbol_size(), 1024);
    drop(enc);

    let (out, blocks, _) = transfer(&data, params).await;
    assert_eq!(blocks, 1);
    assert_eq!(out, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_block_object_round_trips() {
    let data = object(50_000, 2);
    let params = EncoderParams {
        symbol_size: 256,
        min_sub_symbol_size: 256,
        max_sub_block_size: 16 * 1024,
        alignment: 4,
    };
    let (out, blocks, _) = transfer(&data, params).await;
    assert!(blocks > 1);
    assert_eq!(out, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sub_block_interleaving_round_trips() {
    let data = object(300_000, 3);
    let params = EncoderParams {
        symbol_size: 1024,
        min_sub_symbol_size: 256,
        max_sub_block_size: 64 * 1024,
        alignment: 4,
    };
    let (out, _, sub_blocks) = transfer(&data, params).await;
    assert!(sub_blocks > 1);
    assert_eq!(out, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn freed_block_reads_short() {
    let data = object(10_000, 4);
    let params = EncoderParams::default().with_symbol_size(512);
    let params = EncoderParams { min_sub_symbol_size: 512, ..params };
    let enc = new_encoder(&data, &params).unwrap();
    let dec = new_decoder(enc.common_oti(), enc.scheme_specific_oti()).unwrap();
    let mut rx = dec.subscribe(4).unwrap();
    feed_lossy(&enc, &dec);
    await_all(&mut rx, 1).await;

    let mut block = vec![0u8; dec.source_block_size(0) as usize];
    assert_eq!(dec.source_block(0, &mut block).unwrap(), 10_000);
    assert_eq!(block, data);
    assert!(matches!(
        dec.source_block(0, &mut block[..100]),
        Err(Error::BufferTooSmall { needed: 10_000, actual: 100 })
    ));

    dec.free_source_block(0).unwrap();
    assert!(!dec.is_source_block_ready(0).unwrap());
    assert!(matches!(dec.source_block(0, &mut block), Err(Error::ShortRead { expected: 10_000, actual: 0 })));
    assert!(matches!(dec.source_object(&mut block), Err(Error::ShortRead { .. })));
    dec.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decoder_rejects_bad_symbols() {
    let data = object(4096, 5);
    let params = EncoderParams { symbol_size: 256, min_sub_symbol_size: 256, ..EncoderParams::default() };
    let enc = new_encoder(&data, &params).unwrap();
    let dec = new_decoder(enc.common_oti(), enc.scheme_specific_oti()).unwrap();

    assert!(matches!(dec.decode(0, 0, &[0u8; 255]), Err(Error::SymbolLength { expected: 256, actual: 255 })));
    assert!(matches!(dec.decode(1, 0, &[0u8; 256]), Err(Error::BlockOutOfRange { sbn: 1, .. })));
    let max = enc.max_symbols(0);
    assert!(matches!(dec.decode(0, max, &[0u8; 256]), Err(Error::SymbolIdOutOfRange(e)) if e == max));
    dec.close().unwrap();
}

#[test]
fn encoder_contracts() {
    let data = object(4000, 6);
    let params = EncoderParams { symbol_size: 256, min_sub_symbol_size: 256, ..EncoderParams::default() };
    let enc = new_encoder(&data, &params).unwrap();

    let k = u32::from(enc.num_source_symbols(0));
    assert_eq!(k, 16);
    assert_eq!(enc.source_block_size(0), 4000);
    assert_eq!(enc.source_block_size(1), 0);
    assert!(enc.min_symbols(0) >= k);
    assert_eq!(enc.max_symbols(0), (1 << 24) - (enc.min_symbols(0) - k));
    assert_eq!(enc.max_sub_block_size(), params.max_sub_block_size);

    let mut small = [0u8; 8];
    assert!(matches!(enc.encode(0, 0, &mut small), Err(Error::BufferTooSmall { needed: 256, actual: 8 })));
    assert!(matches!(enc.encode(1, 0, &mut [0u8; 256]), Err(Error::BlockOutOfRange { .. })));
    assert!(matches!(
        enc.encode(0, enc.max_symbols(0), &mut [0u8; 256]),
        Err(Error::SymbolIdOutOfRange(_))
    ));

    assert_eq!(enc.encode_symbol(0, 0).unwrap(), data[..256].to_vec());
    assert_eq!(enc.encode_symbol(0, k + 3).unwrap().len(), 256);

    enc.free_source_block(0).unwrap();
    assert!(matches!(enc.encode_symbol(0, 0), Err(Error::Encode { sbn: 0, esi: 0 })));

    enc.close().unwrap();
    assert!(matches!(enc.encode_symbol(0, 0), Err(Error::AlreadyClosed)));
    assert!(matches!(enc.close(), Err(Error::AlreadyClosed)));
    assert_eq!(enc.transfer_length(), 4000);
}
