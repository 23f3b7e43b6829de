#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut dst = vec![0_u8; 1 << 16];

    let _ = zune_inflate::inflate(data, &mut dst);

    // the byte-drip streaming path must agree with one-shot and never panic
    let mut drip_dst = vec![0_u8; 1 << 16];
    let mut stream = zune_inflate::InflateStream::new(&mut drip_dst);

    for byte in data {
        if stream.feed(std::slice::from_ref(byte)).is_err() {
            break;
        }
    }
});
