//! Capability filter
//!
//! A capability is the API service a kind lives behind
//! (`compute.googleapis.com`). When the enabled services of a project are
//! known, kinds behind disabled services are neither collected nor compiled;
//! when they are not known, everything is allowed.

use super::collector::{fetch_list, ListRequest, ResourceApi};
use crate::resource::{KindDef, Scope};
use serde_json::Value;
use std::collections::BTreeSet;

const SERVICE_USAGE_URL: &str = "https://serviceusage.googleapis.com/v1";

/// Set of enabled services, or "unknown"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityFilter {
    enabled: Option<BTreeSet<String>>,
}

impl CapabilityFilter {
    /// Nothing is known: every capability is allowed
    pub fn unknown() -> Self {
        Self { enabled: None }
    }

    pub fn enabled<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: Some(services.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_known(&self) -> bool {
        self.enabled.is_some()
    }

    /// Kinds without a capability are always allowed
    pub fn allows(&self, capability: Option<&str>) -> bool {
        match (&self.enabled, capability) {
            (Some(enabled), Some(capability)) => enabled.contains(capability),
            _ => true,
        }
    }

    /// Organization-scope kinds are always allowed: the enabled services
    /// of a project say nothing about the organization above it
    pub fn allows_kind(&self, def: &KindDef) -> bool {
        def.scope == Scope::Organization || self.allows(def.capability.as_deref())
    }

    pub fn services(&self) -> Option<&BTreeSet<String>> {
        self.enabled.as_ref()
    }
}

/// List the enabled services of a project; any failure yields "unknown"
pub async fn detect<A: ResourceApi + ?Sized>(api: &A, project_id: &str) -> CapabilityFilter {
    detect_at(api, SERVICE_USAGE_URL, project_id).await
}

pub(crate) async fn detect_at<A: ResourceApi + ?Sized>(
    api: &A,
    base_url: &str,
    project_id: &str,
) -> CapabilityFilter {
    let url = format!(
        "{}/projects/{}/services?filter=state:ENABLED&pageSize=200",
        base_url.trim_end_matches('/'),
        project_id
    );

    match fetch_list(api, &ListRequest::get(url, "services")).await {
        Ok(services) => {
            let names: BTreeSet<String> = services.iter().filter_map(service_name).collect();
            tracing::info!("{} enabled service(s) in {}", names.len(), project_id);
            CapabilityFilter { enabled: Some(names) }
        }
        Err(e) => {
            tracing::warn!("Could not list enabled services, collecting everything: {:#}", e);
            CapabilityFilter::unknown()
        }
    }
}

fn service_name(service: &Value) -> Option<String> {
    service
        .pointer("/config/name")
        .and_then(Value::as_str)
        .or_else(|| {
            service
                .get("name")
                .and_then(Value::as_str)
                .and_then(|name| name.rsplit('/').next())
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
