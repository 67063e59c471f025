use base64::Engine;

use truelens::media::transcribe::parse_data_uri;
use truelens::AppError;

#[test]
fn parses_a_base64_audio_uri() {
    let payload = base64::engine::general_purpose::STANDARD.encode(b"fake-webm-bytes");
    let uri = format!("data:audio/webm;codecs=opus;base64,{payload}");

    let decoded = parse_data_uri(&uri).expect("uri parses");
    assert_eq!(decoded.mime, "audio/webm;codecs=opus");
    assert_eq!(decoded.bytes, b"fake-webm-bytes");
}

#[test]
fn preserves_simple_mime_types() {
    let payload = base64::engine::general_purpose::STANDARD.encode(b"x");
    let uri = format!("data:audio/wav;base64,{payload}");

    let decoded = parse_data_uri(&uri).expect("uri parses");
    assert_eq!(decoded.mime, "audio/wav");
}

#[test]
fn rejects_non_data_uris() {
    let err = parse_data_uri("https://example.com/audio.webm").expect_err("scheme rejected");
    assert!(matches!(err, AppError::Transcribe(_)));
}

#[test]
fn rejects_uris_without_base64_marker() {
    let err = parse_data_uri("data:text/plain,hello").expect_err("plain data rejected");
    assert!(err.to_string().contains("base64"));
}

#[test]
fn rejects_invalid_base64_payloads() {
    let err = parse_data_uri("data:audio/wav;base64,!!!not-base64!!!")
        .expect_err("bad payload rejected");
    assert!(matches!(err, AppError::Transcribe(_)));
}

#[test]
fn empty_payload_decodes_to_empty_bytes() {
    let decoded = parse_data_uri("data:audio/wav;base64,").expect("empty payload ok");
    assert!(decoded.bytes.is_empty());
}
