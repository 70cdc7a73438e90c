use super::*;
use crate::test_support::{controller_descriptor, test_bus};
use parking_lot::Mutex as PlMutex;
use vib_core::flexray::FlexrayTransmissionMode;

fn cluster_params() -> vib_core::FlexrayClusterParameters {
    vib_core::FlexrayClusterParameters {
        g_coldstart_attempts: 8,
        g_cycle_count_max: 63,
        gd_action_point_offset: 2,
        gd_dynamic_slot_idle_phase: 1,
        gd_mini_slot: 5,
        gd_mini_slot_action_point_offset: 2,
        gd_static_slot: 31,
        gd_symbol_window: 0,
        gd_symbol_window_action_point_offset: 1,
        gd_tss_transmitter: 9,
        gd_wakeup_tx_active: 60,
        gd_wakeup_tx_idle: 180,
        g_listen_noise: 2,
        g_macro_per_cycle: 3636,
        g_max_without_clock_correction_fatal: 2,
        g_max_without_clock_correction_passive: 2,
        g_number_of_mini_slots: 291,
        g_number_of_static_slots: 70,
        g_payload_length_static: 13,
        g_sync_frame_id_count_max: 15,
    }
}

fn node_params() -> vib_core::FlexrayNodeParameters {
    vib_core::FlexrayNodeParameters {
        p_allow_halt_due_to_clock: 1,
        p_allow_passive_to_active: 0,
        p_channels: FlexrayChannel::AB,
        p_cluster_drift_damping: 2,
        pd_accepted_startup_range: 212,
        pd_listen_timeout: 400_162,
        p_key_slot_id: 10,
        p_key_slot_only_enabled: 0,
        p_key_slot_used_for_startup: 1,
        p_key_slot_used_for_sync: 0,
        p_latest_tx: 249,
        p_macro_initial_offset_a: 3,
        p_macro_initial_offset_b: 3,
        p_micro_initial_offset_a: 6,
        p_micro_initial_offset_b: 6,
        p_micro_per_cycle: 200_000,
        p_offset_correction_out: 127,
        p_offset_correction_start: 3632,
        p_rate_correction_out: 81,
        p_wakeup_channel: FlexrayChannel::B,
        p_wakeup_pattern: 33,
        p_samples_per_microtick: 2,
    }
}

fn buffer(channels: FlexrayChannel, slot_id: u16) -> FlexrayTxBufferConfig {
    FlexrayTxBufferConfig {
        channels,
        slot_id,
        offset: 0,
        repetition: 1,
        has_payload_preamble_indicator: false,
        header_crc: 17,
        transmission_mode: FlexrayTransmissionMode::SingleShot,
    }
}

fn config(buffers: Vec<FlexrayTxBufferConfig>) -> FlexrayControllerConfig {
    FlexrayControllerConfig {
        cluster_params: cluster_params(),
        node_params: node_params(),
        buffer_configs: buffers,
    }
}

fn controller() -> (Arc<FlexrayCore>, crate::test_support::TestWires) {
    let (bus, wires) = test_bus("FrNode");
    let core = FlexrayCore::new(bus, controller_descriptor("FrNode", "FrCtrl", "FR1", 1));
    (core, wires)
}

#[test]
fn configure_validates_and_reaches_ready() {
    let (core, _wires) = controller();
    assert_eq!(core.poc_state(), FlexrayPocState::DefaultConfig);

    core.configure(config(vec![buffer(FlexrayChannel::A, 10)])).expect("configure");
    assert_eq!(core.poc_state(), FlexrayPocState::Ready);
}

#[test]
fn invalid_parameters_keep_default_config() {
    let (core, _wires) = controller();
    let mut bad = config(vec![]);
    bad.cluster_params.g_coldstart_attempts = 1;
    assert!(core.configure(bad).is_err());
    assert_eq!(core.poc_state(), FlexrayPocState::DefaultConfig);
}

#[test]
fn run_requires_configuration() {
    let (core, _wires) = controller();
    assert!(core.run().is_err());
}

#[test]
fn run_emits_cas_mts_on_both_channels_and_goes_normal_active() {
    let (core, mut wires) = controller();
    core.configure(config(vec![])).expect("configure");

    let poc_states = Arc::new(PlMutex::new(Vec::new()));
    {
        let poc_states = Arc::clone(&poc_states);
        FlexrayController::new(Arc::clone(&core)).add_poc_status_handler(move |ev| {
            poc_states.lock().push(ev.state);
        });
    }

    core.run().expect("run");
    assert_eq!(core.poc_state(), FlexrayPocState::NormalActive);
    assert_eq!(*poc_states.lock(), vec![FlexrayPocState::NormalActive]);

    let symbols: Vec<_> = wires
        .sent()
        .into_iter()
        .filter_map(|e| match e.msg {
            Message::FlexraySymbolEvent { channel, pattern, .. } => Some((channel, pattern)),
            _ => None,
        })
        .collect();
    assert_eq!(
        symbols,
        vec![
            (FlexrayChannel::A, FlexraySymbolPattern::CasMts),
            (FlexrayChannel::B, FlexraySymbolPattern::CasMts),
        ]
    );
}

#[test]
fn wakeup_uses_the_configured_channel_and_cycles_back_to_ready() {
    let (core, mut wires) = controller();
    core.configure(config(vec![])).expect("configure");

    let poc_states = Arc::new(PlMutex::new(Vec::new()));
    {
        let poc_states = Arc::clone(&poc_states);
        FlexrayController::new(Arc::clone(&core)).add_poc_status_handler(move |ev| {
            poc_states.lock().push(ev.state);
        });
    }

    core.wakeup().expect("wakeup");
    assert_eq!(
        *poc_states.lock(),
        vec![FlexrayPocState::Wakeup, FlexrayPocState::Ready]
    );

    let wus = wires
        .sent()
        .into_iter()
        .find_map(|e| match e.msg {
            Message::FlexraySymbolEvent { channel, pattern: FlexraySymbolPattern::Wus, .. } => {
                Some(channel)
            }
            _ => None,
        })
        .expect("wus sent");
    assert_eq!(wus, FlexrayChannel::B, "node parameters name the wakeup channel");
}

#[test]
fn reconfigure_requires_an_existing_buffer() {
    let (core, _wires) = controller();
    core.configure(config(vec![buffer(FlexrayChannel::A, 10)])).expect("configure");

    assert!(core.reconfigure_tx_buffer(0, buffer(FlexrayChannel::B, 11)).is_ok());
    let err = core.reconfigure_tx_buffer(1, buffer(FlexrayChannel::B, 12)).unwrap_err();
    assert!(err.to_string().contains("unconfigured"));
}

#[test]
fn update_tx_buffer_derives_the_header() {
    let (core, mut wires) = controller();
    core.configure(config(vec![buffer(FlexrayChannel::A, 10)])).expect("configure");

    core.update_tx_buffer(0, true, vec![1, 2, 3]).expect("update");

    let (channel, frame) = wires
        .sent()
        .into_iter()
        .find_map(|e| match e.msg {
            Message::FlexrayFrameEvent { channel, frame, .. } => Some((channel, frame)),
            _ => None,
        })
        .expect("frame sent");
    assert_eq!(channel, FlexrayChannel::A);
    assert_eq!(frame.header.frame_id, 10);
    assert!(frame.header.nf_indicator);
    assert!(!frame.header.pp_indicator);
    assert_eq!(frame.header.payload_length, 2, "16-bit words, rounded up");
    assert_eq!(frame.header.header_crc, 17);
}

#[test]
fn channel_ab_transmits_twice() {
    let (core, mut wires) = controller();
    core.configure(config(vec![buffer(FlexrayChannel::AB, 10)])).expect("configure");

    core.update_tx_buffer(0, true, vec![1, 2]).expect("update");

    let channels: Vec<_> = wires
        .sent()
        .into_iter()
        .filter_map(|e| match e.msg {
            Message::FlexrayFrameEvent { channel, .. } => Some(channel),
            _ => None,
        })
        .collect();
    assert_eq!(channels, vec![FlexrayChannel::A, FlexrayChannel::B]);
}

#[test]
fn reception_mirrors_an_ack_to_the_sender() {
    let (core, mut wires) = controller();
    core.configure(config(vec![])).expect("configure");

    let received = Arc::new(PlMutex::new(0usize));
    {
        let received = Arc::clone(&received);
        FlexrayController::new(Arc::clone(&core)).add_frame_handler(move |_| {
            *received.lock() += 1;
        });
    }

    let peer = controller_descriptor("OtherNode", "FrCtrl", "FR1", 2);
    let frame = FlexrayFrame {
        header: FlexrayHeader { frame_id: 10, payload_length: 1, ..Default::default() },
        payload: vec![5, 6],
    };
    core.on_frame_event(&peer, 77, FlexrayChannel::A, &frame);

    assert_eq!(*received.lock(), 1);
    let ack = wires
        .sent()
        .into_iter()
        .find(|e| matches!(e.msg, Message::FlexrayFrameTransmitEvent { .. }))
        .expect("ack sent");
    assert_eq!(ack.to.as_deref(), Some("OtherNode"));
    assert!(matches!(
        ack.msg,
        Message::FlexrayFrameTransmitEvent { timestamp: 77, channel: FlexrayChannel::A, .. }
    ));
}
