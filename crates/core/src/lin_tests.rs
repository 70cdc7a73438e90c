use super::*;
use yare::parameterized;

#[test]
fn go_to_sleep_frame_is_the_wire_constant() {
    let frame = go_to_sleep_frame();
    assert_eq!(frame.id, 0x3C);
    assert_eq!(frame.data, [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    assert!(is_go_to_sleep_frame(&frame));
}

#[test]
fn go_to_sleep_recognition_is_by_content() {
    // Same id with different data is an ordinary frame.
    let mut frame = go_to_sleep_frame();
    frame.data[1] = 0x01;
    assert!(!is_go_to_sleep_frame(&frame));

    // Same data with a different id is an ordinary frame as well.
    let mut frame = go_to_sleep_frame();
    frame.id = 0x3B;
    assert!(!is_go_to_sleep_frame(&frame));
}

#[parameterized(
    rx_ok = { LinFrameStatus::LinRxOk, LinFrameStatus::LinTxOk },
    rx_busy = { LinFrameStatus::LinRxBusy, LinFrameStatus::LinTxBusy },
    rx_error = { LinFrameStatus::LinRxError, LinFrameStatus::LinTxError },
    no_response_unchanged = { LinFrameStatus::LinRxNoResponse, LinFrameStatus::LinRxNoResponse },
    tx_ok_unchanged = { LinFrameStatus::LinTxOk, LinFrameStatus::LinTxOk },
)]
fn tx_conversion(rx: LinFrameStatus, expected: LinFrameStatus) {
    assert_eq!(rx.to_tx(), expected);
}

#[parameterized(
    master_response = { LinFrameResponseType::MasterResponse, LinFrameResponseMode::TxUnconditional },
    slave_response = { LinFrameResponseType::SlaveResponse, LinFrameResponseMode::Rx },
    slave_to_slave = { LinFrameResponseType::SlaveToSlave, LinFrameResponseMode::Unused },
)]
fn response_type_expansion(rt: LinFrameResponseType, expected: LinFrameResponseMode) {
    assert_eq!(rt.master_response_mode(), expected);
}

#[test]
fn frame_validation() {
    let frame = LinFrame::new(63, LinChecksumModel::Enhanced, 8, [0; 8]);
    assert!(frame.validate().is_ok());

    let frame = LinFrame::new(64, LinChecksumModel::Enhanced, 8, [0; 8]);
    assert!(frame.validate().is_err());

    let frame = LinFrame::new(1, LinChecksumModel::Classic, 9, [0; 8]);
    assert!(frame.validate().is_err());
}
