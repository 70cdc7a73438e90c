//! Two CAN nodes on one network, no time synchronization: every frame is
//! delivered in order and acknowledged back to the writer.

use super::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use vib_core::{CanFrame, CanTransmitStatus};

const FRAME_COUNT: usize = 10;

#[tokio::test]
async fn can_writer_reader_loopback() {
    let registry = registry().await;
    let writer = participant(&registry, "CanWriter").await;
    let reader = participant(&registry, "CanReader").await;

    let writer_can = writer.create_can_controller("CanCtrl", Some("CAN1")).expect("controller");
    let reader_can = reader.create_can_controller("CanCtrl", Some("CAN1")).expect("controller");
    writer_can.start();
    reader_can.start();

    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        reader_can.add_frame_handler(move |ev| {
            received.lock().push(ev.frame.clone());
        });
    }

    let acks = Arc::new(Mutex::new(Vec::new()));
    {
        let acks = Arc::clone(&acks);
        writer_can.add_frame_transmit_handler(move |ev| {
            acks.lock().push((ev.transmit_id, ev.status));
        });
    }

    for i in 0..FRAME_COUNT {
        let payload = format!("Test Message {i}");
        let transmit_id = writer_can
            .send_frame(CanFrame::new(i as u32, payload.into_bytes()))
            .expect("send");
        assert_eq!(transmit_id as usize, i + 1);
    }

    wait_until("all frames received", || received.lock().len() == FRAME_COUNT).await;
    wait_until("all acks received", || acks.lock().len() == FRAME_COUNT).await;

    let received = received.lock();
    for (i, frame) in received.iter().enumerate() {
        assert_eq!(frame.can_id, i as u32, "frames arrive in send order");
        assert_eq!(frame.payload, format!("Test Message {i}").into_bytes());
    }

    let acks = acks.lock();
    for (i, (transmit_id, status)) in acks.iter().enumerate() {
        assert_eq!(*transmit_id as usize, i + 1);
        assert_eq!(*status, CanTransmitStatus::Transmitted);
    }
}
