//! LIN go-to-sleep: the well-known frame puts slaves to sleep; a frame
//! with the sleep id but different payload is an ordinary transmission.

use super::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use vib_core::{
    LinChecksumModel, LinControllerMode, LinControllerStatus, LinFrame, LinFrameResponseType,
};

#[tokio::test]
async fn master_puts_the_slave_to_sleep() {
    let registry = registry().await;
    let master_side = participant(&registry, "LinMaster").await;
    let slave_side = participant(&registry, "LinSlave").await;

    let master = master_side.create_lin_controller("LinCtrl", Some("LIN1")).expect("master");
    let slave = slave_side.create_lin_controller("LinCtrl", Some("LIN1")).expect("slave");
    master.init(LinControllerMode::Master, 20_000, vec![]).expect("init master");
    slave.init(LinControllerMode::Slave, 20_000, vec![]).expect("init slave");

    let sleep_events = Arc::new(Mutex::new(0usize));
    {
        let sleep_events = Arc::clone(&sleep_events);
        slave.add_go_to_sleep_handler(move |_| {
            *sleep_events.lock() += 1;
        });
    }

    // A frame with id 0x3C but non-matching data must not trigger sleep.
    let almost_sleep = LinFrame::new(
        0x3C,
        LinChecksumModel::Classic,
        8,
        [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    );
    master.send_frame(almost_sleep, LinFrameResponseType::MasterResponse).expect("send");

    master.go_to_sleep().expect("go to sleep");
    assert_eq!(master.status(), LinControllerStatus::Sleep, "master sleeps immediately");

    // The slave processed the mismatching frame first (same sender, same
    // order), so exactly one sleep event proves it was suppressed.
    wait_until("slave sleep handler", || *sleep_events.lock() == 1).await;
    wait_until("slave status sleep", || slave.status() == LinControllerStatus::Sleep).await;
    assert_eq!(*sleep_events.lock(), 1);
}

#[tokio::test]
async fn wakeup_returns_the_bus_to_operational() {
    let registry = registry().await;
    let master_side = participant(&registry, "LinMaster").await;
    let slave_side = participant(&registry, "LinSlave").await;

    let master = master_side.create_lin_controller("LinCtrl", Some("LIN1")).expect("master");
    let slave = slave_side.create_lin_controller("LinCtrl", Some("LIN1")).expect("slave");
    master.init(LinControllerMode::Master, 20_000, vec![]).expect("init master");
    slave.init(LinControllerMode::Slave, 20_000, vec![]).expect("init slave");

    master.go_to_sleep().expect("go to sleep");
    wait_until("slave asleep", || slave.status() == LinControllerStatus::Sleep).await;

    let wakeups = Arc::new(Mutex::new(Vec::new()));
    {
        let wakeups = Arc::clone(&wakeups);
        master.add_wakeup_handler(move |ev| {
            wakeups.lock().push(ev.direction);
        });
    }

    slave.wakeup().expect("wakeup");
    wait_until("master operational", || master.status() == LinControllerStatus::Operational)
        .await;
    assert_eq!(slave.status(), LinControllerStatus::Operational);
    wait_until("master observed the pulse", || !wakeups.lock().is_empty()).await;
    assert_eq!(wakeups.lock()[0], vib_core::LinTransmitDirection::Rx);
}
