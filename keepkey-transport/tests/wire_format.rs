//! Integration tests for the wire format.
//!
//! These check exact bytes on the wire for a few representative messages,
//! going through the public pipeline: typed message → family type id →
//! frame segments → reassembly → typed message.

use keepkey_transport::frame::{self, FrameAssembler, HEADER_LEN, SEGMENT_SIZE};
use keepkey_transport::messages::{Initialize, Success, WipeDevice};
use keepkey_transport::{DeviceFamily, Message, MessageType};

fn to_segments(family: DeviceFamily, message: &Message) -> Vec<frame::Segment> {
    let (type_id, payload) = family.encode(message).unwrap();
    frame::encode(type_id, &payload).unwrap()
}

fn from_segments(family: DeviceFamily, segments: &[frame::Segment]) -> Message {
    let mut asm = FrameAssembler::start(&segments[0]).unwrap();
    for segment in &segments[1..] {
        asm.push(segment);
    }
    assert!(asm.is_complete());
    let (type_id, payload) = asm.finish();
    family.decode(type_id, &payload).unwrap()
}

// ── Empty messages: header only ──

#[test]
fn initialize_is_bare_header() {
    let segments = to_segments(DeviceFamily::KeepKey, &Initialize {}.into());
    assert_eq!(segments.len(), 1);
    assert_eq!(&segments[0][..HEADER_LEN], &[0x23, 0x23, 0, 0, 0, 0, 0, 0]);
    assert!(segments[0][HEADER_LEN..].iter().all(|&b| b == 0));
}

#[test]
fn wipe_device_type_id() {
    let segments = to_segments(DeviceFamily::Trezor, &WipeDevice {}.into());
    // type 5, length 0
    assert_eq!(&segments[0][..HEADER_LEN], &[0x23, 0x23, 0, 5, 0, 0, 0, 0]);
}

// ── Success { "Device wiped" } ──

#[test]
fn device_wiped_bytes() {
    let msg: Message = Success {
        message: Some("Device wiped".into()),
    }
    .into();
    let segments = to_segments(DeviceFamily::KeepKey, &msg);
    assert_eq!(segments.len(), 1);

    let seg = &segments[0];
    // type 2, payload = tag 0x0A, len 12, "Device wiped"
    assert_eq!(&seg[..HEADER_LEN], &[0x23, 0x23, 0, 2, 0, 0, 0, 14]);
    assert_eq!(&seg[HEADER_LEN..HEADER_LEN + 2], &[0x0A, 12]);
    assert_eq!(&seg[HEADER_LEN + 2..HEADER_LEN + 14], b"Device wiped");

    let decoded = from_segments(DeviceFamily::KeepKey, &segments);
    assert_eq!(decoded.message_type(), MessageType::Success);
    assert_eq!(decoded, msg);
}

// ── Multi-segment ──

#[test]
fn long_message_spans_segments() {
    let text = "w".repeat(200);
    let msg: Message = Success {
        message: Some(text.clone()),
    }
    .into();
    let segments = to_segments(DeviceFamily::KeepKey, &msg);

    // payload = 1 tag + 2 varint length + 200
    let payload_len = 203;
    assert_eq!(segments.len(), (HEADER_LEN + payload_len).div_ceil(SEGMENT_SIZE));
    assert_eq!(from_segments(DeviceFamily::KeepKey, &segments), msg);
}

#[test]
fn same_message_decodes_under_both_families() {
    let msg: Message = Success {
        message: Some("ok".into()),
    }
    .into();
    let segments = to_segments(DeviceFamily::KeepKey, &msg);
    assert_eq!(from_segments(DeviceFamily::Trezor, &segments), msg);
}
