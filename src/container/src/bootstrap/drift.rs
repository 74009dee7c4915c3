//! Drift detection: desired site attributes against an inspected container.
//!
//! Only attributes fixed at container creation are compared. Drift is
//! binary; the field list exists for logging, never for partial updates.

use crate::common::labels;
use crate::common::ContainerRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Creation-time attributes a site container must have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredSite {
    pub image: String,

    /// Host path bind-mounted at `mount_target`
    pub mount_source: String,
    pub mount_target: String,

    pub env: BTreeMap<String, String>,

    /// Hostname -> address
    pub extra_hosts: BTreeMap<String, String>,
}

impl DesiredSite {
    /// Env as `KEY=VALUE` entries
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Extra hosts as `host:address` entries
    pub fn extra_hosts_list(&self) -> Vec<String> {
        self.extra_hosts
            .iter()
            .map(|(h, a)| format!("{}:{}", h, a))
            .collect()
    }

    /// Value of the managed-env-keys label
    pub fn env_keys_label(&self) -> String {
        self.env.keys().cloned().collect::<Vec<_>>().join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftField {
    Image,
    Mount,
    Env,
    ExtraHosts,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Drift {
    pub fields: Vec<DriftField>,
}

impl Drift {
    pub fn is_drifted(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Compare `desired` against `observed`
pub fn detect(desired: &DesiredSite, observed: &ContainerRecord) -> Drift {
    let mut fields = Vec::new();

    if observed.image != desired.image {
        fields.push(DriftField::Image);
    }

    let mount = observed
        .mounts
        .iter()
        .find(|m| m.destination == desired.mount_target);
    if mount.map(|m| m.source.as_str()) != Some(desired.mount_source.as_str()) {
        fields.push(DriftField::Mount);
    }

    if !env_matches(desired, observed) {
        fields.push(DriftField::Env);
    }

    if parse_extra_hosts(&observed.extra_hosts) != desired.extra_hosts {
        fields.push(DriftField::ExtraHosts);
    }

    Drift { fields }
}

/// Env equality as a mapping, over the desired keys plus the keys the
/// container was created with. Variables baked into the image are ignored.
fn env_matches(desired: &DesiredSite, observed: &ContainerRecord) -> bool {
    let observed_env = parse_env(&observed.env);

    let mut keys: BTreeSet<&str> = desired.env.keys().map(String::as_str).collect();
    if let Some(managed) = observed.labels.get(labels::ENV_KEYS) {
        keys.extend(managed.split(',').map(str::trim).filter(|k| !k.is_empty()));
    }

    keys.into_iter()
        .all(|key| desired.env.get(key) == observed_env.get(key))
}

/// Parse `KEY=VALUE` entries; later entries win
pub fn parse_env(entries: &[String]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

/// Parse `host:address` entries
pub fn parse_extra_hosts(entries: &[String]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .split_once(':')
                .map(|(h, a)| (h.to_string(), a.to_string()))
        })
        .collect()
}
