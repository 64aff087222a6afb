#![no_main]

use libfuzzer_sys::fuzz_target;
use rqlink_fec::EncoderParams;

fuzz_target!(|data: &[u8]| {
    if data.len() < 17 {
        return;
    }
    let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
    let params = EncoderParams {
        symbol_size: word(0),
        min_sub_symbol_size: word(2),
        max_sub_block_size: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        alignment: data[8],
    };
    let mut f = [0u8; 8];
    f.copy_from_slice(&data[9..17]);
    let transfer_length = u64::from_be_bytes(f) >> 24;

    // derived parameters must always pass the decoder-side checks
    if let Ok(info) = params.transmission_info(transfer_length) {
        assert!(info.validate().is_ok());
        assert_eq!(info.symbol_size, params.symbol_size);
    }
});
