//! Publishers with different periods interleave correctly: each received
//! message is attributable to its sender's tick grid, and no sender runs
//! more than one subscriber period ahead.

use super::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vib_participant::PubSubSpec;

const PERIODS_NS: [i64; 3] = [3, 7, 17];
const SUBSCRIBER_PERIOD_NS: i64 = 7;
const MESSAGE_COUNT: usize = 70;

#[tokio::test(flavor = "multi_thread")]
async fn mixed_periods_interleave_deterministically() {
    let registry = registry().await;

    let publisher_names: Vec<String> =
        (0..PERIODS_NS.len()).map(|k| format!("Publisher{k}")).collect();
    let mut required: Vec<&str> = publisher_names.iter().map(String::as_str).collect();
    required.push("Subscriber");

    let subscriber = participant(&registry, "Subscriber").await;
    drive_system(&subscriber, &required);
    let controller = subscriber.system_controller();

    let seen: Arc<Vec<Mutex<Vec<(i64, u64, i64)>>>> =
        Arc::new(PERIODS_NS.iter().map(|_| Mutex::new(Vec::new())).collect());

    let sub_lifecycle = subscriber.lifecycle_service();
    sub_lifecycle.set_period(Duration::from_nanos(SUBSCRIBER_PERIOD_NS as u64));
    sub_lifecycle.set_simulation_task(|_, _| {});

    let provider = subscriber.time_provider();
    for k in 0..PERIODS_NS.len() {
        let data_subscriber = subscriber
            .create_data_subscriber(&format!("Sub{k}"), PubSubSpec::new(format!("Topic{k}")))
            .expect("subscriber");
        let seen = Arc::clone(&seen);
        let provider = Arc::clone(&provider);
        let controller = controller.clone();
        data_subscriber.add_data_message_handler(move |ev| {
            let text = String::from_utf8(ev.data.clone()).expect("utf8 payload");
            let mut fields = text.split_whitespace();
            let sent: i64 = fields.next().expect("now").parse().expect("now");
            let index: u64 = fields.next().expect("index").parse().expect("index");

            seen[k].lock().push((sent, index, provider.now()));

            if seen.iter().all(|s| s.lock().len() >= MESSAGE_COUNT) {
                controller.stop();
            }
        });
    }

    let mut runs = Vec::new();
    runs.push({
        let lifecycle = sub_lifecycle.clone();
        tokio::spawn(async move { lifecycle.start().await })
    });

    let mut publishers = Vec::new();
    for (k, name) in publisher_names.iter().enumerate() {
        let publisher_participant = participant(&registry, name).await;
        let data_publisher = publisher_participant
            .create_data_publisher("Pub", PubSubSpec::new(format!("Topic{k}")))
            .expect("publisher");

        let lifecycle = publisher_participant.lifecycle_service();
        lifecycle.set_period(Duration::from_nanos(PERIODS_NS[k] as u64));
        let mut index: u64 = 0;
        lifecycle.set_simulation_task(move |now, _| {
            // Skip the zero tick so sent_time / index equals the period.
            if now == 0 {
                return;
            }
            index += 1;
            data_publisher.publish(format!("{now} {index}").into_bytes());
        });

        runs.push({
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.start().await })
        });
        publishers.push(publisher_participant);
    }

    for run in runs {
        let state = tokio::time::timeout(Duration::from_secs(60), run)
            .await
            .expect("scenario timed out")
            .expect("join")
            .expect("lifecycle");
        assert_eq!(state, vib_core::ParticipantState::Shutdown);
    }

    for (k, period) in PERIODS_NS.iter().enumerate() {
        let messages = seen[k].lock();
        assert!(messages.len() >= MESSAGE_COUNT);
        for (sent, index, sub_now) in messages.iter() {
            assert_eq!(
                sent / *index as i64,
                *period,
                "publisher {k}: message {index} sent at {sent}"
            );
            let lag = sent - sub_now;
            assert!(
                lag.abs() <= SUBSCRIBER_PERIOD_NS,
                "publisher {k}: sent {sent} while subscriber was at {sub_now}"
            );
        }
    }
}
