//! Service discovery observes every created service exactly once, and the
//! same set again as removed when the owning participant leaves.

use super::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use vib_core::ServiceType;
use vib_participant::PubSubSpec;
use vib_wire::DiscoveryEventKind;

const SERVICE_COUNT: usize = 5;

#[tokio::test]
async fn removal_mirrors_creation_on_disconnect() {
    let registry = registry().await;
    let publisher = participant(&registry, "Publisher").await;
    let subscriber = participant(&registry, "Subscriber").await;

    let mut publishers = Vec::new();
    for i in 0..SERVICE_COUNT {
        publishers.push(
            publisher
                .create_data_publisher(
                    &format!("PubCtrl{i}"),
                    PubSubSpec::new(format!("TopicName-{i}")),
                )
                .expect("publisher"),
        );
    }

    let created = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));
    {
        let created = Arc::clone(&created);
        let removed = Arc::clone(&removed);
        // Registered after the services exist: the handler still observes
        // all of them via replay.
        subscriber.service_discovery().add_handler(move |kind, service| {
            if service.participant_name != "Publisher"
                || service.service_type != ServiceType::Controller
            {
                return;
            }
            match kind {
                DiscoveryEventKind::ServiceCreated => {
                    created.lock().push(service.service_name.clone());
                }
                DiscoveryEventKind::ServiceRemoved => {
                    removed.lock().push(service.service_name.clone());
                }
            }
        });
    }

    wait_until("all services discovered", || created.lock().len() == SERVICE_COUNT).await;

    publisher.disconnect().await;
    drop(publisher);

    wait_until("all services removed", || removed.lock().len() >= SERVICE_COUNT).await;

    let mut created = created.lock().clone();
    let mut removed = removed.lock().clone();
    created.sort();
    removed.sort();
    assert_eq!(created.len(), SERVICE_COUNT);
    assert_eq!(created, removed, "every created service is removed exactly once");
}
