#![no_main]

use libfuzzer_sys::fuzz_target;
use rqlink_fec::oti::{BlockLayout, CommonOti, SchemeSpecificOti, TransmissionInfo};

fuzz_target!(|data: &[u8]| {
    let Some((common, scheme)) = data.get(..12).map(|b| b.split_at(8)) else { return };
    let common = CommonOti::from_be_bytes(common.try_into().unwrap_or_default());
    let scheme = SchemeSpecificOti::from_be_bytes(scheme.try_into().unwrap_or_default());
    let info = TransmissionInfo::from_oti(common, scheme);

    // repacking drops only the reserved bits
    assert_eq!(info.common_oti().get(), common.get() & !0x00FF_0000);
    assert_eq!(info.scheme_specific_oti(), scheme);

    if info.validate().is_ok() {
        let layout = BlockLayout::new(&info);
        assert_eq!(layout.num_blocks(), usize::from(info.num_source_blocks));
        let total: u64 = layout.iter().map(|b| u64::from(b.size)).sum();
        assert_eq!(total, info.transfer_length);
    }
});
