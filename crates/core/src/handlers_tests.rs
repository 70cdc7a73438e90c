use super::*;
use std::sync::atomic::AtomicUsize;

fn registry() -> HandlerRegistry<u32> {
    HandlerRegistry::new(HandlerIdSource::new())
}

#[test]
fn dispatch_invokes_every_handler() {
    let reg = registry();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let count = Arc::clone(&count);
        reg.add(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }

    reg.dispatch(&7);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn ids_are_monotone_across_registries_of_one_source() {
    let ids = HandlerIdSource::new();
    let a: HandlerRegistry<u32> = HandlerRegistry::new(Arc::clone(&ids));
    let b: HandlerRegistry<String> = HandlerRegistry::new(ids);

    let id0 = a.add(|_| {});
    let id1 = b.add(|_| {});
    let id2 = a.add(|_| {});
    assert!(id0.0 < id1.0 && id1.0 < id2.0);
}

#[test]
fn remove_unknown_id_reports_false() {
    let reg = registry();
    let id = reg.add(|_| {});
    assert!(reg.remove(id));
    assert!(!reg.remove(id));
    assert!(!reg.remove(HandlerId(999)));
}

#[test]
fn add_n_remove_all_round_trip() {
    let reg = registry();
    let count = Arc::new(AtomicUsize::new(0));

    let ids: Vec<_> = (0..10)
        .map(|_| {
            let count = Arc::clone(&count);
            reg.add(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    reg.dispatch(&1);
    assert_eq!(count.load(Ordering::SeqCst), 10);

    for id in ids {
        assert!(reg.remove(id));
    }
    reg.dispatch(&2);
    assert_eq!(count.load(Ordering::SeqCst), 10);
    assert!(reg.is_empty());
}

#[test]
fn removal_during_dispatch_skips_the_removed_handler() {
    // A handler that removes a later-registered handler mid-dispatch; the
    // removed handler must not fire even though the snapshot holds it.
    let reg = Arc::new(registry());
    let fired = Arc::new(AtomicUsize::new(0));

    let victim_id = Arc::new(Mutex::new(None::<HandlerId>));
    {
        let reg = Arc::clone(&reg);
        let victim_id = Arc::clone(&victim_id);
        reg.clone().add(move |_| {
            if let Some(id) = *victim_id.lock() {
                reg.remove(id);
            }
        });
    }
    {
        let fired = Arc::clone(&fired);
        let id = reg.add(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        *victim_id.lock() = Some(id);
    }

    reg.dispatch(&1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    reg.dispatch(&2);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn registration_during_dispatch_sees_the_next_event() {
    let reg = Arc::new(registry());
    let late_fired = Arc::new(AtomicUsize::new(0));

    {
        let reg = Arc::clone(&reg);
        let late_fired = Arc::clone(&late_fired);
        let registered = AtomicBool::new(false);
        reg.clone().add(move |_| {
            if !registered.swap(true, Ordering::SeqCst) {
                let late_fired = Arc::clone(&late_fired);
                reg.add(move |_| {
                    late_fired.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
    }

    reg.dispatch(&1);
    assert_eq!(late_fired.load(Ordering::SeqCst), 0, "snapshot excludes late handler");

    reg.dispatch(&2);
    assert_eq!(late_fired.load(Ordering::SeqCst), 1);
}
