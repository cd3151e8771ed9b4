//! Cross-module integration tests. Unlike the per-file unit tests, these
//! exercise a full request-response shaped flow across layer boundaries:
//! QPACK encoder/decoder instruction streams driving a real dynamic table,
//! and HTTP/3 framing wrapping the resulting header blocks the way a real
//! endpoint would put them on a request stream. Run under `tokio::test` so
//! this suite can grow into exercising timer-driven behavior (idle
//! timeouts, PTO) without a separate harness later.

use quiche_core::h3::{self, H3Frame};
use quiche_core::qpack::{DecodeOutcome, EncoderInstruction, QpackDecoder, QpackEncoder};

#[tokio::test]
async fn header_block_travels_through_h3_framing_and_qpack_decoding() {
    let mut encoder = QpackEncoder::new(4096);
    let mut decoder = QpackDecoder::new(4096);

    let headers = vec![
        (":method".to_string(), "GET".to_string()),
        (":path".to_string(), "/".to_string()),
        ("x-request-id".to_string(), "abc123".to_string()),
    ];
    let section = encoder.encode_field_section(0, &headers).unwrap();

    // the encoder-stream instructions arrive on their own unidirectional
    // stream and must be applied before the decoder can resolve the block.
    let mut instr_buf = section.instructions.as_slice();
    while !instr_buf.is_empty() {
        let instr = EncoderInstruction::decode(&mut instr_buf).unwrap();
        decoder.apply_encoder_instruction(instr).unwrap();
    }

    // the header block itself rides inside a HEADERS frame on the request
    // stream.
    let mut wire = Vec::new();
    h3::encode_headers(&section.header_block, &mut wire);
    let decoded_frame = h3::decode_one(&wire).unwrap();
    assert_eq!(decoded_frame.consumed, wire.len());
    let H3Frame::Headers(field_section) = decoded_frame.frame else {
        panic!("expected a HEADERS frame");
    };

    let outcome = decoder.decode_field_section(0, &field_section).unwrap();
    let DecodeOutcome::Done { headers: decoded, .. } = outcome else {
        panic!("table was primed before decoding, must not block");
    };
    assert_eq!(
        decoded,
        vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (b":path".to_vec(), b"/".to_vec()),
            (b"x-request-id".to_vec(), b"abc123".to_vec()),
        ]
    );
}

#[tokio::test]
async fn control_stream_rejects_traffic_before_settings_arrives() {
    use h3::ControlStreamPolicy;

    let mut policy = ControlStreamPolicy::new();
    let mut wire = Vec::new();
    h3::encode_settings(&h3::Settings::default(), &mut wire).unwrap();
    let first = h3::decode_one(&wire).unwrap();

    let mut goaway_wire = Vec::new();
    // GOAWAY frame type 0x07 with a single varint id payload.
    quiche_core::codec::VarInt::from_u32(0x07).encode(&mut goaway_wire).unwrap();
    quiche_core::codec::VarInt::from_u32(1).encode(&mut goaway_wire).unwrap();
    quiche_core::codec::VarInt::from_u32(0).encode(&mut goaway_wire).unwrap();
    let goaway = h3::decode_one(&goaway_wire).unwrap();

    assert!(policy.on_frame(&goaway.frame).is_err());
    policy.on_frame(&first.frame).unwrap();
    assert!(policy.on_frame(&goaway.frame).is_ok());
}

#[tokio::test]
async fn settings_frame_reassembles_across_a_split_buffer() {
    let settings = h3::Settings {
        qpack_max_table_capacity: 4096,
        max_field_section_size: Some(16_384),
        qpack_blocked_streams: 16,
        ..Default::default()
    };
    let mut wire = Vec::new();
    h3::encode_settings(&settings, &mut wire).unwrap();

    // simulate a reader that only has the first half of the datagram so far.
    let split = wire.len() - 1;
    assert_eq!(h3::decode_one(&wire[..split]), Err(h3::H3Error::NeedMoreData));
    let decoded = h3::decode_one(&wire).unwrap();
    assert_eq!(decoded.frame, H3Frame::Settings(settings));
}
