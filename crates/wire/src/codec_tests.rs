//! Wire format tests: length-prefix framing and JSON encoding.

use super::*;
use crate::{Envelope, Message, WireFrame};
use vib_core::{ServiceDescriptor, ServiceType, SystemCommandKind};

fn sender() -> ServiceDescriptor {
    ServiceDescriptor::new("P1", "SystemController", "default", ServiceType::InternalController, 1)
}

#[test]
fn encode_returns_json_without_length_prefix() {
    let frame = WireFrame::Hello { participant_name: "P1".into(), version: 1 };
    let encoded = encode(&frame).expect("encode failed");

    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(json_str.starts_with('{'), "should be JSON object: {}", json_str);
    assert!(json_str.contains("ctl:hello"));
}

#[tokio::test]
async fn read_write_frame_roundtrip() {
    let original = WireFrame::Msg(Envelope::broadcast(
        sender(),
        Message::SystemCommand { kind: SystemCommandKind::Run },
    ));

    let mut buffer = Vec::new();
    write_frame(&mut buffer, &original).await.expect("write failed");

    // 4-byte length prefix followed by exactly the body
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, buffer.len() - 4);

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back: WireFrame = read_frame(&mut cursor).await.expect("read failed");
    assert_eq!(read_back, original);
}

#[tokio::test]
async fn two_frames_back_to_back() {
    let first = WireFrame::Hello { participant_name: "A".into(), version: 1 };
    let second = WireFrame::PeerGone { participant_name: "B".into() };

    let mut buffer = Vec::new();
    write_frame(&mut buffer, &first).await.unwrap();
    write_frame(&mut buffer, &second).await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let a: WireFrame = read_frame(&mut cursor).await.unwrap();
    let b: WireFrame = read_frame(&mut cursor).await.unwrap();
    assert_eq!(a, first);
    assert_eq!(b, second);
}

#[tokio::test]
async fn eof_at_frame_boundary_is_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let result: Result<WireFrame, _> = read_frame(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::Closed)));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let bytes = (MAX_FRAME_LEN as u32 + 1).to_be_bytes().to_vec();
    let mut cursor = std::io::Cursor::new(bytes);
    let result: Result<WireFrame, _> = read_frame(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
}
