//! Unit tests for the NDJSON line codec.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use session_annotator::jobs::codec::{LineCodec, MAX_LINE_BYTES};
use session_annotator::AppError;

#[test]
fn decodes_complete_lines_only() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"kind\":\"done\"}\n{\"kind\"");

    assert_eq!(
        codec.decode(&mut buf).expect("decode").as_deref(),
        Some("{\"kind\":\"done\"}")
    );
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
}

#[test]
fn over_long_line_is_a_protocol_error_and_decoding_recovers() {
    let mut codec = LineCodec::new();
    let mut raw = "x".repeat(MAX_LINE_BYTES + 1);
    raw.push_str("\nok\n");
    let mut buf = BytesMut::from(raw.as_str());

    let err = codec.decode(&mut buf).expect_err("must fail");
    assert!(matches!(err, AppError::Protocol(_)));
    assert_eq!(codec.decode(&mut buf).expect("decode").as_deref(), Some("ok"));
}

#[test]
fn blank_lines_and_carriage_returns_are_dropped() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("\n  \r\n{\"kind\":\"done\"}\r\n");

    assert_eq!(
        codec.decode(&mut buf).expect("decode").as_deref(),
        Some("{\"kind\":\"done\"}")
    );
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
}

#[test]
fn unterminated_last_line_is_yielded_at_eof() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"kind\":\"cancelled\"}");

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    assert_eq!(
        codec.decode_eof(&mut buf).expect("decode").as_deref(),
        Some("{\"kind\":\"cancelled\"}")
    );
}
