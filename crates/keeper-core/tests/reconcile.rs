use keeper_core::{
    discovery_labels, management_labels, reconcile, Action, CoreError, LABEL_FINGERPRINT,
};
use keeper_runtime::{ContainerStatus, MockCall, MockConfig, MockDriver};
use keeper_schema::{fingerprint, ContainerSpec};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

fn ops(driver: &MockDriver) -> Vec<&'static str> {
    driver.mutating_calls().iter().map(MockCall::op).collect()
}

#[tokio::test]
async fn create_attach_replace_scenario() {
    let driver = MockDriver::new();
    let cancel = CancellationToken::new();
    let spec = ContainerSpec::new("web", "nginx:1.25");

    // Empty backend: exactly one create + start.
    let first = reconcile(&driver, &spec, &cancel).await.unwrap();
    assert_eq!(first.action, Action::Created);
    assert_eq!(ops(&driver), vec!["create", "start"]);
    let record = driver.record_of(&first.id).unwrap();
    assert_eq!(record.status, ContainerStatus::Running);
    assert_eq!(
        record.labels.get(LABEL_FINGERPRINT).map(String::as_str),
        Some(fingerprint(&spec).as_str())
    );

    // Unchanged spec: pure attach.
    driver.clear_calls();
    let second = reconcile(&driver, &spec, &cancel).await.unwrap();
    assert_eq!(second.action, Action::Attached);
    assert_eq!(second.id, first.id);
    assert!(driver.mutating_calls().is_empty());

    // Changed image: stop, remove, create, start in that order.
    driver.clear_calls();
    let updated = ContainerSpec::new("web", "nginx:1.26");
    let third = reconcile(&driver, &updated, &cancel).await.unwrap();
    assert_eq!(third.action, Action::Replaced);
    assert_eq!(ops(&driver), vec!["stop", "remove", "create", "start"]);
    assert_ne!(third.id, first.id);
    assert!(driver.record_of(&first.id).is_none());
    let record = driver.record_of(&third.id).unwrap();
    assert_eq!(
        record.labels.get(LABEL_FINGERPRINT).map(String::as_str),
        Some(fingerprint(&updated).as_str())
    );
    assert_eq!(driver.records().len(), 1);
}

#[tokio::test]
async fn env_reordering_still_attaches() {
    let driver = MockDriver::new();
    let cancel = CancellationToken::new();
    let spec = ContainerSpec::new("api", "app:1").with_env("A", "1").with_env("B", "2");
    reconcile(&driver, &spec, &cancel).await.unwrap();

    driver.clear_calls();
    let reordered = ContainerSpec::new("api", "app:1").with_env("B", "2").with_env("A", "1");
    let result = reconcile(&driver, &reordered, &cancel).await.unwrap();
    assert_eq!(result.action, Action::Attached);
    assert!(driver.mutating_calls().is_empty());
}

#[tokio::test]
async fn stale_records_are_recreated_even_when_fingerprint_matches() {
    let spec = ContainerSpec::new("web", "nginx:1.25");
    let labels = management_labels("web", &fingerprint(&spec));

    for status in [ContainerStatus::Created, ContainerStatus::Stopped] {
        let driver = MockDriver::new();
        let cancel = CancellationToken::new();
        let stale = driver.insert_container("web", labels.clone(), status);

        let result = reconcile(&driver, &spec, &cancel).await.unwrap();
        assert_eq!(result.action, Action::Recreated);
        assert_eq!(ops(&driver), vec!["remove", "create", "start"]);
        assert!(driver.record_of(&stale).is_none());
        assert_ne!(result.id, stale);
    }
}

#[tokio::test]
async fn running_record_without_fingerprint_is_replaced() {
    let driver = MockDriver::new();
    let cancel = CancellationToken::new();
    driver.insert_container("web", discovery_labels("web"), ContainerStatus::Running);

    let result = reconcile(&driver, &ContainerSpec::new("web", "nginx:1.25"), &cancel)
        .await
        .unwrap();
    assert_eq!(result.action, Action::Replaced);
    assert_eq!(ops(&driver), vec!["stop", "remove", "create", "start"]);
}

#[tokio::test]
async fn ambiguous_records_are_fatal() {
    let driver = MockDriver::new();
    let cancel = CancellationToken::new();
    driver.insert_container("web", discovery_labels("web"), ContainerStatus::Running);
    driver.insert_container("web", discovery_labels("web"), ContainerStatus::Stopped);

    let err = reconcile(&driver, &ContainerSpec::new("web", "nginx:1.25"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Ambiguous { ref name, count: 2 } if name == "web"));
    assert!(driver.mutating_calls().is_empty());
    assert_eq!(driver.records().len(), 2);
}

#[tokio::test]
async fn unmanaged_container_is_never_adopted() {
    let driver = MockDriver::new();
    let cancel = CancellationToken::new();
    driver.insert_container("web", BTreeMap::new(), ContainerStatus::Running);

    let err = reconcile(&driver, &ContainerSpec::new("web", "nginx:1.25"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Driver { op: "create container", .. }));
    assert_eq!(ops(&driver), vec!["create"]);
}

#[tokio::test]
async fn driver_failure_stops_reconciliation() {
    let driver = MockDriver::with_config(MockConfig {
        fail_on: vec!["start".to_owned()],
        ..MockConfig::default()
    });
    let cancel = CancellationToken::new();

    let err = reconcile(&driver, &ContainerSpec::new("web", "nginx:1.25"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Driver { op: "start container", .. }));
    assert_eq!(ops(&driver), vec!["create", "start"]);
}

#[tokio::test]
async fn failed_removal_is_not_followed_by_create() {
    let driver = MockDriver::with_config(MockConfig {
        fail_on: vec!["remove".to_owned()],
        ..MockConfig::default()
    });
    let cancel = CancellationToken::new();
    driver.insert_container("web", discovery_labels("web"), ContainerStatus::Stopped);

    let err = reconcile(&driver, &ContainerSpec::new("web", "nginx:1.25"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Driver { op: "remove container", .. }));
    assert_eq!(ops(&driver), vec!["remove"]);
}
