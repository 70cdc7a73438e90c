//! Deterministic simulation: three publishers and one subscriber advance in
//! 1 ms lockstep. Every received message is attributable to the tick it
//! was sent in, and per-publisher indices count up without gaps.

use super::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vib_participant::PubSubSpec;

const PUBLISHER_COUNT: usize = 3;
const MESSAGE_COUNT: usize = 200;
const PERIOD_NS: i64 = 1_000_000;

#[tokio::test(flavor = "multi_thread")]
async fn publishers_and_subscriber_in_lockstep() {
    let registry = registry().await;

    let publisher_names: Vec<String> =
        (0..PUBLISHER_COUNT).map(|k| format!("Publisher{k}")).collect();
    let mut required: Vec<&str> = publisher_names.iter().map(String::as_str).collect();
    required.push("Subscriber");

    let subscriber = participant(&registry, "Subscriber").await;
    drive_system(&subscriber, &required);
    let controller = subscriber.system_controller();

    // Per publisher: (sent_time, index, subscriber_now) triples.
    let seen: Arc<Vec<Mutex<Vec<(i64, u64, i64)>>>> =
        Arc::new((0..PUBLISHER_COUNT).map(|_| Mutex::new(Vec::new())).collect());

    let sub_lifecycle = subscriber.lifecycle_service();
    sub_lifecycle.set_period(Duration::from_nanos(PERIOD_NS as u64));
    sub_lifecycle.set_simulation_task(|_, _| {});

    let provider = subscriber.time_provider();
    for k in 0..PUBLISHER_COUNT {
        let data_subscriber = subscriber
            .create_data_subscriber(&format!("Sub{k}"), PubSubSpec::new(format!("Topic{k}")))
            .expect("subscriber");
        let seen = Arc::clone(&seen);
        let provider = Arc::clone(&provider);
        let controller = controller.clone();
        data_subscriber.add_data_message_handler(move |ev| {
            let text = String::from_utf8(ev.data.clone()).expect("utf8 payload");
            let mut fields = text.split_whitespace();
            assert_eq!(fields.next(), Some("TestMessage"));
            let sent: i64 = fields.next().expect("now field").parse().expect("now");
            let index: u64 = fields.next().expect("index field").parse().expect("index");

            seen[k].lock().push((sent, index, provider.now()));

            if seen.iter().all(|s| s.lock().len() >= MESSAGE_COUNT) {
                controller.stop();
            }
        });
    }

    let mut lifecycles = Vec::new();
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
        lifecycle.set_period(Duration::from_nanos(PERIOD_NS as u64));
        let mut index: u64 = 0;
        lifecycle.set_simulation_task(move |now, _| {
            index += 1;
            data_publisher.publish(format!("TestMessage {now} {index}").into_bytes());
        });

        runs.push({
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.start().await })
        });
        lifecycles.push(lifecycle);
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

    for k in 0..PUBLISHER_COUNT {
        let messages = seen[k].lock();
        assert!(messages.len() >= MESSAGE_COUNT);
        for (i, (sent, index, sub_now)) in messages.iter().enumerate() {
            assert_eq!(*index, i as u64 + 1, "publisher {k}: indices count up without gaps");
            assert_eq!(*sent, i as i64 * PERIOD_NS, "publisher {k}: one message per tick");
            let lag = sent - sub_now;
            assert!(
                lag == 0 || lag == PERIOD_NS,
                "publisher {k}: sent {sent} vs subscriber tick {sub_now}"
            );
        }
    }
}

/// Async simulation tasks hold the grant until completion is signalled from
/// outside the task.
#[tokio::test(flavor = "multi_thread")]
async fn async_task_holds_the_grant_until_completed() {
    let registry = registry().await;

    let driver = participant(&registry, "Driver").await;
    drive_system(&driver, &["Driver", "AsyncNode"]);

    let driver_lifecycle = driver.lifecycle_service();
    driver_lifecycle.set_period(Duration::from_millis(1));
    driver_lifecycle.set_simulation_task(|_, _| {});

    let async_node = participant(&registry, "AsyncNode").await;
    let lifecycle = async_node.lifecycle_service();
    lifecycle.set_period(Duration::from_millis(1));

    let ticks = Arc::new(Mutex::new(Vec::new()));
    {
        let ticks = Arc::clone(&ticks);
        let completer = lifecycle.clone();
        let controller = driver.system_controller();
        lifecycle.set_simulation_task_async(move |now, _| {
            ticks.lock().push(now);
            let done = ticks.lock().len() >= 20;
            let completer = completer.clone();
            let controller = controller.clone();
            // Completion comes from outside the task, as a detached job.
            tokio::spawn(async move {
                if done {
                    controller.stop();
                }
                completer.complete_simulation_task().expect("complete");
            });
        });
    }

    let driver_run = {
        let lifecycle = driver_lifecycle.clone();
        tokio::spawn(async move { lifecycle.start().await })
    };
    let node_run = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.start().await })
    };

    for run in [node_run, driver_run] {
        let state = tokio::time::timeout(Duration::from_secs(60), run)
            .await
            .expect("scenario timed out")
            .expect("join")
            .expect("lifecycle");
        assert_eq!(state, vib_core::ParticipantState::Shutdown);
    }

    let ticks = ticks.lock();
    assert!(ticks.len() >= 20);
    for (i, now) in ticks.iter().enumerate() {
        assert_eq!(*now, i as i64 * 1_000_000, "ticks advance by exactly one period");
    }
}
