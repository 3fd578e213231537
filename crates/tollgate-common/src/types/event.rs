//! Usage event model
//!
//! A [`UsageEvent`] is one usage observation: identity/grouping attributes
//! plus an open set of numeric metrics and string metadata. Events sharing a
//! [`GroupKey`] can be folded together with [`UsageEvent::merge`].

use crate::error::{Result, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Usage event submitted by request-serving code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Target identity (e.g. `sf.firehose.v1/Blocks`)
    #[serde(default)]
    pub service: String,
    /// Method/operation within the service
    #[serde(default)]
    pub method: String,
    /// Network or tenant identifier
    #[serde(default)]
    pub network: String,
    /// Requesting user
    #[serde(default)]
    pub user_id: String,
    /// API key used for the request
    #[serde(default)]
    pub api_key_id: String,
    /// Usage class of the API key
    #[serde(default)]
    pub api_key_usage: String,
    /// Requester IP address
    #[serde(default)]
    pub ip_address: String,
    /// Metric name to value
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Free-form metadata, last write wins on merge
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// When the event was recorded, or last merged
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Attributes that decide whether two events are merged.
///
/// Changing this set changes billing granularity.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub user_id: String,
    pub service: String,
    pub network: String,
    pub api_key_usage: String,
    pub api_key_id: String,
    pub ip_address: String,
    pub method: String,
}

impl UsageEvent {
    /// Create a new usage event for a service method
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    /// Set network
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Set requesting user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set API key identity and usage class
    pub fn with_api_key(mut self, api_key_id: impl Into<String>, usage: impl Into<String>) -> Self {
        self.api_key_id = api_key_id.into();
        self.api_key_usage = usage.into();
        self
    }

    /// Set requester IP address
    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }

    /// Set a metric, replacing any previous value
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Set a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Add to a metric, creating it at zero first if absent
    pub fn add_metric(&mut self, name: &str, value: f64) {
        *self.metrics.entry(name.to_string()).or_insert(0.0) += value;
    }

    /// Value of a metric, if present
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Grouping key used by the accumulator
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            user_id: self.user_id.clone(),
            service: self.service.clone(),
            network: self.network.clone(),
            api_key_usage: self.api_key_usage.clone(),
            api_key_id: self.api_key_id.clone(),
            ip_address: self.ip_address.clone(),
            method: self.method.clone(),
        }
    }

    /// Fold `other` into this event.
    ///
    /// Metrics are summed (zero values included, so presence survives),
    /// metadata is overwritten key by key, and the timestamp becomes `now`.
    /// Group attributes are left untouched; callers merge only events with
    /// equal keys.
    pub fn merge(&mut self, other: &UsageEvent, now: DateTime<Utc>) {
        for (name, value) in &other.metrics {
            self.add_metric(name, *value);
        }
        for (key, value) in &other.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        self.timestamp = Some(now);
    }

    /// Validate the event is deliverable.
    ///
    /// An event needs a service and a network. Identity attributes may be
    /// empty.
    pub fn validate(&self) -> Result<()> {
        if self.service.is_empty() {
            return Err(ValidationError::MissingField("service").into());
        }
        if self.network.is_empty() {
            return Err(ValidationError::MissingField("network").into());
        }
        Ok(())
    }
}
