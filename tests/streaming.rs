use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use zune_inflate::errors::DecodeErrors;
use zune_inflate::{inflate, InflateStatus, InflateStream};

fn deflate_ref(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());

    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn sample_payload() -> Vec<u8> {
    b"streaming decoders must suspend and resume without losing a single bit. "
        .iter()
        .copied()
        .cycle()
        .take(30_000)
        .collect()
}

#[test]
fn byte_drip_matches_one_shot() {
    let data = sample_payload();
    let compressed = deflate_ref(&data);

    assert!(compressed.len() >= 64);

    let mut expected = vec![0_u8; data.len()];
    let expected_len = inflate(&compressed, &mut expected).unwrap();

    let mut dst = vec![0_u8; data.len()];
    let mut stream = InflateStream::new(&mut dst);

    // every feed but the last must report unfinished, the last one done
    for (i, byte) in compressed.iter().enumerate() {
        let status = stream.feed(std::slice::from_ref(byte)).unwrap();

        if i + 1 < compressed.len() {
            assert_eq!(status, InflateStatus::Unfinished, "byte {i}");
        } else {
            assert_eq!(status, InflateStatus::Done);
        }
    }

    assert_eq!(stream.position(), expected_len);
    assert_eq!(stream.total_in(), compressed.len());
    drop(stream);
    assert_eq!(dst, expected);
}

#[test]
fn chunk_splits_match_one_shot() {
    let data = sample_payload();
    let compressed = deflate_ref(&data);

    let mut expected = vec![0_u8; data.len()];
    let expected_len = inflate(&compressed, &mut expected).unwrap();

    for chunk_size in [1_usize, 2, 3, 7, 13, 64, 1000, 8192, 20000] {
        let mut dst = vec![0_u8; data.len()];
        let mut stream = InflateStream::new(&mut dst);
        let mut last = InflateStatus::Noop;

        for chunk in compressed.chunks(chunk_size) {
            last = stream.feed(chunk).unwrap();
        }

        assert_eq!(last, InflateStatus::Done, "chunk size {chunk_size}");
        assert_eq!(stream.position(), expected_len);
        drop(stream);
        assert_eq!(dst, expected, "chunk size {chunk_size}");
    }
}

#[test]
fn truncated_zlib_header_stays_unfinished() {
    let mut dst = [0_u8; 16];
    let mut stream = InflateStream::new_zlib(&mut dst);

    assert_eq!(stream.feed(&[0x78, 0x9C]).unwrap(), InflateStatus::Unfinished);

    // empty feeds keep reporting unfinished, never an error
    for _ in 0..4 {
        assert_eq!(stream.feed(&[]).unwrap(), InflateStatus::Unfinished);
    }
}

#[test]
fn truncated_one_shot_errors() {
    let src = [0xF3, 0x48, 0xCD, 0xC9];
    let mut dst = [0_u8; 16];

    assert!(inflate(&src, &mut dst).is_err());
}

#[test]
fn stored_block_resumes_mid_payload() {
    // BFINAL=1, BTYPE=00, LEN=4, payload "abcd" split inside the payload
    let src = [0x01, 0x04, 0x00, 0xFB, 0xFF, b'a', b'b', b'c', b'd'];
    let mut dst = [0_u8; 8];
    let mut stream = InflateStream::new(&mut dst);

    assert_eq!(stream.feed(&src[..7]).unwrap(), InflateStatus::Unfinished);
    assert_eq!(stream.position(), 2);
    assert_eq!(stream.feed(&src[7..]).unwrap(), InflateStatus::Done);
    assert_eq!(stream.position(), 4);

    drop(stream);
    assert_eq!(&dst[..4], b"abcd");
}

#[test]
fn backref_resumes_mid_length_code() {
    // literal 'A' then a length-258/distance-1 back-reference; the split
    // starves the decoder inside the length symbol, which is re-decoded
    // whole on the next feed
    let src = [0x73, 0x1C, 0x05, 0x00];
    let mut dst = [0_u8; 512];
    let mut stream = InflateStream::new(&mut dst);

    assert_eq!(stream.feed(&src[..2]).unwrap(), InflateStatus::Unfinished);
    assert_eq!(stream.feed(&src[2..]).unwrap(), InflateStatus::Done);
    assert_eq!(stream.position(), 259);

    drop(stream);
    assert!(dst[..259].iter().all(|&b| b == b'A'));
}

#[test]
fn backref_distance_arrives_in_later_feed() {
    // fixed block: literals "abcd", then a length-19/distance-4
    // back-reference whose distance code starts in the last byte; the
    // first feed ends with the length decoded and the distance owed
    let src = [0x4B, 0x4C, 0x4A, 0x4E, 0xC1, 0x82, 0x01];
    let mut dst = [0_u8; 32];
    let mut stream = InflateStream::new(&mut dst);

    assert_eq!(stream.feed(&src[..6]).unwrap(), InflateStatus::Unfinished);
    assert_eq!(stream.position(), 4);
    assert_eq!(stream.feed(&src[6..]).unwrap(), InflateStatus::Done);
    assert_eq!(stream.position(), 23);

    drop(stream);
    assert_eq!(&dst[..23], b"abcdabcdabcdabcdabcdabc");
}

#[test]
fn feed_after_done_is_idempotent() {
    let mut dst = [0_u8; 8];
    let mut stream = InflateStream::new(&mut dst);

    assert_eq!(
        stream.feed(&[0x01, 0x01, 0x00, 0xFE, 0xFF, 0x41]).unwrap(),
        InflateStatus::Done
    );
    assert_eq!(stream.feed(&[]).unwrap(), InflateStatus::Done);
    assert_eq!(stream.feed(&[]).unwrap(), InflateStatus::Done);
    assert!(stream.is_done());
}

#[test]
fn feed_nothing_is_a_noop() {
    let mut dst = [0_u8; 8];
    let mut stream = InflateStream::new(&mut dst);

    assert_eq!(stream.feed(&[]).unwrap(), InflateStatus::Noop);
}

#[test]
fn include_then_run_one_shot() {
    let data = sample_payload();
    let compressed = deflate_ref(&data);

    let mut dst = vec![0_u8; data.len()];
    let mut stream = InflateStream::new(&mut dst);

    // chunks included up front decode as one contiguous stream
    let mid = compressed.len() / 2;

    stream.include(&compressed[..mid]).unwrap();
    stream.include(&compressed[mid..]).unwrap();

    assert_eq!(stream.run().unwrap(), InflateStatus::Done);
    assert_eq!(stream.position(), data.len());

    drop(stream);
    assert_eq!(dst, data);
}

#[test]
fn never_fed_stream_is_safe() {
    let mut dst = [0_u8; 8];
    let mut stream = InflateStream::new(&mut dst);

    assert_eq!(stream.run().unwrap(), InflateStatus::Noop);
    assert_eq!(stream.position(), 0);
}

#[test]
fn errored_stream_keeps_failing_without_panicking() {
    let mut dst = [0_u8; 8];
    let mut stream = InflateStream::new(&mut dst);

    // reserved block type
    assert!(stream.feed(&[0x07]).is_err());
    assert!(stream.feed(&[0x00]).is_err());
    assert!(stream.feed(&[]).is_err());
}

#[test]
fn streaming_output_overflow_reports_full() {
    let src = [0x73, 0x1C, 0x05, 0x00];
    let mut dst = [0_u8; 16];
    let mut stream = InflateStream::new(&mut dst);

    let mut result = Ok(InflateStatus::Noop);

    for i in 0..src.len() {
        result = stream.feed(&src[i..=i]);

        if result.is_err() {
            break;
        }
    }

    assert!(matches!(result, Err(DecodeErrors::OutputFull)));
}
