use super::*;

#[test]
fn unpublished_sentinel() {
    assert_eq!(NextSimTask::UNPUBLISHED.time_point, -1);
    assert_eq!(NextSimTask::UNPUBLISHED.duration, 0);
}

#[test]
fn duration_conversion() {
    assert_eq!(duration_to_nanos(Duration::from_millis(1)), 1_000_000);
    assert_eq!(duration_to_nanos(Duration::from_nanos(17)), 17);
}

#[test]
fn oversized_duration_saturates() {
    assert_eq!(duration_to_nanos(Duration::from_secs(u64::MAX)), i64::MAX);
}
