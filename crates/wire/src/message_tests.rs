use super::*;
use vib_core::lin::LinChecksumModel;
use vib_core::{CanFrame, ServiceType};

fn descriptor(participant: &str, service: &str, network: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(participant, service, network, ServiceType::Controller, 3)
}

#[test]
fn message_tag_format() {
    let msg = Message::NextSimTask(NextSimTask::new(0, 1_000_000));
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "sync:next-sim-task");
    assert_eq!(json["time_point"], 0);
    assert_eq!(msg.name(), "sync:next-sim-task");
}

#[test]
fn envelope_roundtrip_with_target() {
    let env = Envelope::targeted(
        descriptor("CanReader", "CanCtrl", "CAN1"),
        "CanWriter",
        Message::CanFrameTransmitEvent {
            timestamp: 42,
            transmit_id: 1,
            status: CanTransmitStatus::Transmitted,
        },
    );
    let json = serde_json::to_string(&env).unwrap();
    let parsed: Envelope = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, env);
    assert_eq!(parsed.to.as_deref(), Some("CanWriter"));
}

#[test]
fn broadcast_envelope_omits_target() {
    let env = Envelope::broadcast(
        descriptor("CanWriter", "CanCtrl", "CAN1"),
        Message::CanFrameEvent {
            timestamp: 7,
            transmit_id: 1,
            frame: CanFrame::new(0x10, vec![1, 2, 3]),
        },
    );
    let json = serde_json::to_value(&env).unwrap();
    assert!(json.get("to").is_none());
}

#[test]
fn lin_messages_roundtrip() {
    let frame = LinFrame::new(0x3C, LinChecksumModel::Classic, 8, [0, 255, 255, 255, 255, 255, 255, 255]);
    let msg = Message::LinTransmission {
        timestamp: 100,
        frame: frame.clone(),
        status: LinFrameStatus::LinRxOk,
    };
    let json = serde_json::to_string(&msg).unwrap();
    let parsed: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, msg);
}

#[test]
fn wire_frame_tags() {
    let hello = WireFrame::Hello { participant_name: "P".into(), version: PROTOCOL_VERSION };
    let json = serde_json::to_value(&hello).unwrap();
    assert_eq!(json["type"], "ctl:hello");

    let msg = WireFrame::Msg(Envelope::broadcast(
        descriptor("P", "S", "N"),
        Message::ParticipantCommand { participant: "Q".into() },
    ));
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "msg");
    assert_eq!(json["msg"]["type"], "sync:participant-command");
}
