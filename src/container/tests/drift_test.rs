//! Tests for drift detection between desired sites and inspected containers

use container::bootstrap::drift::{detect, parse_env, DesiredSite, DriftField};
use container::common::{labels, ContainerRecord, ContainerState, MountRecord};
use std::collections::{BTreeMap, HashMap};

fn desired() -> DesiredSite {
    DesiredSite {
        image: "docker.io/devstack/nginx:8.2-dev".to_string(),
        mount_source: "/home/dev/sites/example".to_string(),
        mount_target: "/app".to_string(),
        env: BTreeMap::from([
            ("APP_ENV".to_string(), "dev".to_string()),
            (
                "XDEBUG_CONFIG".to_string(),
                "client_host=host.docker.internal".to_string(),
            ),
        ]),
        extra_hosts: BTreeMap::from([("example.test".to_string(), "127.0.0.1".to_string())]),
    }
}

/// Record of a container created from `desired`, as the runtime reports it
fn observed(desired: &DesiredSite) -> ContainerRecord {
    let mut env = vec![
        "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin".to_string(),
        "PHP_VERSION=8.2.10".to_string(),
    ];
    env.extend(desired.env_list());

    ContainerRecord {
        id: "c1".to_string(),
        name: "example.test".to_string(),
        image: desired.image.clone(),
        env,
        mounts: vec![MountRecord {
            source: desired.mount_source.clone(),
            destination: desired.mount_target.clone(),
        }],
        extra_hosts: desired.extra_hosts_list(),
        networks: vec!["dev".to_string()],
        labels: HashMap::from([(labels::ENV_KEYS.to_string(), desired.env_keys_label())]),
        state: ContainerState::Running,
        exit_code: None,
    }
}

#[test]
fn test_matching_container_has_no_drift() {
    let desired = desired();
    let drift = detect(&desired, &observed(&desired));
    assert!(!drift.is_drifted(), "{:?}", drift.fields);
}

#[test]
fn test_image_drift() {
    let desired = desired();
    let mut record = observed(&desired);
    record.image = "docker.io/devstack/nginx:8.1-dev".to_string();

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::Image]);
}

#[test]
fn test_mount_drift() {
    let desired = desired();
    let mut record = observed(&desired);
    record.mounts[0].source = "/home/dev/sites/other".to_string();

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::Mount]);
}

#[test]
fn test_missing_mount_is_drift() {
    let desired = desired();
    let mut record = observed(&desired);
    record.mounts.clear();

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::Mount]);
}

#[test]
fn test_changed_env_value_is_drift() {
    let mut desired = desired();
    let record = observed(&desired);
    desired.env.insert("APP_ENV".to_string(), "staging".to_string());

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::Env]);
}

#[test]
fn test_added_env_key_is_drift() {
    let mut desired = desired();
    let record = observed(&desired);
    desired.env.insert("APP_DEBUG".to_string(), "1".to_string());

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::Env]);
}

#[test]
fn test_removed_env_key_is_drift() {
    let mut desired = desired();
    let record = observed(&desired);
    desired.env.remove("APP_ENV");

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::Env]);
}

#[test]
fn test_env_order_is_irrelevant() {
    let desired = desired();
    let mut record = observed(&desired);
    record.env.reverse();

    assert!(!detect(&desired, &record).is_drifted());
}

#[test]
fn test_extra_hosts_drift() {
    let mut desired = desired();
    let record = observed(&desired);
    desired
        .extra_hosts
        .insert("www.example.test".to_string(), "127.0.0.1".to_string());

    assert_eq!(detect(&desired, &record).fields, vec![DriftField::ExtraHosts]);
}

#[test]
fn test_every_drifted_field_is_listed() {
    let desired = desired();
    let mut record = observed(&desired);
    record.image = "other:latest".to_string();
    record.extra_hosts.clear();

    assert_eq!(
        detect(&desired, &record).fields,
        vec![DriftField::Image, DriftField::ExtraHosts]
    );
}

#[test]
fn test_parse_env_handles_values_with_equals() {
    let env = parse_env(&[
        "XDEBUG_CONFIG=client_host=host.docker.internal".to_string(),
        "EMPTY=".to_string(),
        "BARE".to_string(),
    ]);

    assert_eq!(
        env.get("XDEBUG_CONFIG").map(String::as_str),
        Some("client_host=host.docker.internal")
    );
    assert_eq!(env.get("EMPTY").map(String::as_str), Some(""));
    assert_eq!(env.get("BARE").map(String::as_str), Some(""));
}
