//! REST collection
//!
//! Lists every collectable kind of the registry through a [`ResourceApi`],
//! following `nextPageToken`, flattening aggregated (per zone/region)
//! responses and expanding child listings. Collection completes fully before
//! anything is compiled: the result is an [`Inventory`] snapshot.

use super::capability::CapabilityFilter;
use super::Inventory;
use crate::resource::{CollectDef, KindDef, Method, Registry, Scope};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Safety net against APIs that keep returning the same page token
const MAX_PAGES: usize = 1000;

/// Transport used by the collector
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

/// One paginated list call
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub url: String,
    pub method: Method,
    pub body: Value,
    /// Dot path of the item array; empty means the response is one record
    pub response_path: String,
    pub aggregated: bool,
}

impl ListRequest {
    pub fn get(url: impl Into<String>, response_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            body: Value::Null,
            response_path: response_path.into(),
            aggregated: false,
        }
    }

    fn from_collect(url: String, body: Value, collect: &CollectDef) -> Self {
        Self {
            url,
            method: collect.method,
            body,
            response_path: collect.response_path.clone(),
            aggregated: collect.aggregated,
        }
    }

    fn page_url(&self, token: Option<&str>) -> Result<String> {
        match (self.method, token) {
            (Method::Get, Some(token)) => {
                let mut url = url::Url::parse(&self.url)
                    .with_context(|| format!("Invalid collection URL: {}", self.url))?;
                url.query_pairs_mut().append_pair("pageToken", token);
                Ok(url.to_string())
            }
            _ => Ok(self.url.clone()),
        }
    }

    fn page_body(&self, token: Option<&str>) -> Value {
        let mut body = match &self.body {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        if let (Some(token), Some(obj)) = (token, body.as_object_mut()) {
            obj.insert("pageToken".to_string(), Value::String(token.to_string()));
        }
        body
    }
}

/// Fetch every page of a list call and return the items in response order
pub async fn fetch_list<A: ResourceApi + ?Sized>(api: &A, request: &ListRequest) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    let mut seen_tokens = HashSet::new();

    for _ in 0..MAX_PAGES {
        let response = match request.method {
            Method::Get => api.get_json(&request.page_url(token.as_deref())?).await?,
            Method::Post => {
                api.post_json(&request.url, &request.page_body(token.as_deref()))
                    .await?
            }
        };

        items.extend(extract_items(&response, request));

        match response.get("nextPageToken").and_then(Value::as_str) {
            Some(next) if !next.is_empty() && seen_tokens.insert(next.to_string()) => {
                token = Some(next.to_string());
            }
            _ => return Ok(items),
        }
    }

    tracing::warn!("Stopped paginating {} after {} pages", request.url, MAX_PAGES);
    Ok(items)
}

fn extract_items(response: &Value, request: &ListRequest) -> Vec<Value> {
    if request.aggregated {
        return flatten_aggregated_response(response);
    }
    if request.response_path.is_empty() {
        return match response {
            Value::Object(obj) if !obj.is_empty() => vec![response.clone()],
            _ => Vec::new(),
        };
    }

    let mut current = response;
    for segment in request.response_path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    current.as_array().cloned().unwrap_or_default()
}

/// Flatten an aggregated response (`items` keyed by zone or region) into one list
fn flatten_aggregated_response(response: &Value) -> Vec<Value> {
    let Some(items) = response.get("items").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut all_items = Vec::new();
    for scope_data in items.values() {
        let Some(obj) = scope_data.as_object() else {
            continue;
        };
        for (key, value) in obj {
            // "warning" marks scopes with no resources
            if key == "warning" {
                continue;
            }
            if let Some(arr) = value.as_array() {
                all_items.extend(arr.iter().cloned());
            }
        }
    }
    all_items
}

/// Outcome of a collection run
#[derive(Debug, Default)]
pub struct CollectReport {
    pub inventory: Inventory,
    /// kind -> error message for kinds that could not be listed
    pub failures: BTreeMap<String, String>,
}

/// Collects an inventory snapshot from the REST APIs
pub struct Collector<'a, A: ResourceApi + ?Sized> {
    api: &'a A,
    registry: &'a Registry,
    project_id: Option<String>,
    organization_id: Option<String>,
    kinds: Option<BTreeSet<String>>,
    capabilities: CapabilityFilter,
}

impl<'a, A: ResourceApi + ?Sized> Collector<'a, A> {
    pub fn new(api: &'a A, registry: &'a Registry) -> Self {
        Self {
            api,
            registry,
            project_id: None,
            organization_id: None,
            kinds: None,
            capabilities: CapabilityFilter::unknown(),
        }
    }

    pub fn project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn organization(mut self, organization_id: Option<String>) -> Self {
        self.organization_id = organization_id;
        self
    }

    /// Restrict collection to these kinds (plus what they derive or expand from)
    pub fn kinds(mut self, kinds: BTreeSet<String>) -> Self {
        self.kinds = Some(self.registry.with_dependencies(&kinds));
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilityFilter) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Substitute `{project}` and `{org}`; `None` when the template needs an
    /// identifier this run does not have
    fn expand_template(&self, template: &str) -> Option<String> {
        let mut url = template.to_string();
        if url.contains("{project}") {
            url = url.replace("{project}", self.project_id.as_deref()?);
        }
        if url.contains("{org}") {
            url = url.replace("{org}", self.organization_id.as_deref()?);
        }
        Some(url)
    }

    /// Substitute identifiers in every string of a request body
    fn expand_body(&self, body: &Value) -> Value {
        match body {
            Value::String(s) => Value::String(self.expand_template(s).unwrap_or_else(|| s.clone())),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.expand_body(v)).collect()),
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), self.expand_body(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn list_request(&self, url: String, collect: &CollectDef) -> ListRequest {
        ListRequest::from_collect(url, self.expand_body(&collect.body), collect)
    }

    fn selected(&self) -> Vec<(&'a str, &'a KindDef, &'a CollectDef)> {
        self.registry
            .ordered_kinds()
            .into_iter()
            .filter_map(|(kind, def)| def.collect.as_ref().map(|c| (kind, def, c)))
            .filter(|(kind, _, _)| {
                self.kinds
                    .as_ref()
                    .map_or(true, |kinds| kinds.contains(*kind))
            })
            .filter(|(_, def, _)| match def.scope {
                Scope::Project => self.project_id.is_some(),
                Scope::Organization => self.organization_id.is_some(),
            })
            .filter(|(kind, def, _)| {
                let allowed = self.capabilities.allows_kind(def);
                if !allowed {
                    tracing::info!("Skipping {}: {} is not enabled", kind, def.capability.as_deref().unwrap_or_default());
                }
                allowed
            })
            .collect()
    }

    /// List a kind's top-level endpoint, then recurse into same-kind children
    async fn collect_direct(&self, collect: &CollectDef) -> Result<Vec<Value>> {
        let Some(template) = &collect.url else {
            return Ok(Vec::new());
        };
        let Some(url) = self.expand_template(template) else {
            return Ok(Vec::new());
        };

        let mut records = fetch_list(self.api, &self.list_request(url, collect)).await?;

        if let Some(expand) = collect.expand.as_ref().filter(|e| e.from.is_none()) {
            let mut seen: HashSet<String> = HashSet::new();
            let mut queue: VecDeque<String> = records
                .iter()
                .filter_map(|r| r.get(&expand.parent_field).and_then(Value::as_str))
                .map(str::to_string)
                .collect();

            while let Some(parent) = queue.pop_front() {
                if !seen.insert(parent.clone()) {
                    continue;
                }
                let url = expand.url.replace("{parent}", &urlencoding::encode(&parent));
                let Some(url) = self.expand_template(&url) else {
                    continue;
                };
                let children = fetch_list(self.api, &self.list_request(url, collect)).await?;
                for child in children {
                    if let Some(name) = child.get(&expand.parent_field).and_then(Value::as_str) {
                        if !seen.contains(name) {
                            queue.push_back(name.to_string());
                        }
                    }
                    records.push(child);
                }
            }
        }

        Ok(records)
    }

    /// One listing per record of the parent kind
    async fn collect_children(
        &self,
        collect: &CollectDef,
        parents: &[Value],
    ) -> Result<Vec<Value>> {
        let Some(expand) = &collect.expand else {
            return Ok(Vec::new());
        };

        let requests: Vec<ListRequest> = parents
            .iter()
            .filter_map(|p| p.get(&expand.parent_field).and_then(Value::as_str))
            .filter_map(|parent| {
                let url = expand.url.replace("{parent}", &urlencoding::encode(parent));
                self.expand_template(&url)
            })
            .map(|url| self.list_request(url, collect))
            .collect();

        let pages = join_all(requests.iter().map(|r| fetch_list(self.api, r))).await;
        let mut records = Vec::new();
        for page in pages {
            records.extend(page?);
        }
        Ok(records)
    }

    /// Collect every selected kind
    ///
    /// Independent kinds are fetched concurrently; kinds expanded from another
    /// kind's records run once their parents are in. A failing kind is logged,
    /// reported and recorded as an empty list.
    pub async fn collect(&self) -> CollectReport {
        let selected = self.selected();
        let mut report = CollectReport {
            inventory: Inventory::new(self.project_id.clone(), self.organization_id.clone()),
            failures: BTreeMap::new(),
        };

        let (dependent, independent): (Vec<_>, Vec<_>) = selected
            .into_iter()
            .partition(|(_, _, c)| c.expand.as_ref().is_some_and(|e| e.from.is_some()));

        tracing::info!(
            "Collecting {} kinds ({} dependent)",
            independent.len() + dependent.len(),
            dependent.len()
        );

        let results = join_all(independent.iter().map(|(kind, _, collect)| async move {
            (*kind, self.collect_direct(collect).await)
        }))
        .await;
        for (kind, result) in results {
            self.record(&mut report, kind, result);
        }

        let results = join_all(dependent.iter().map(|(kind, _, collect)| {
            let parents = collect
                .expand
                .as_ref()
                .and_then(|e| e.from.as_deref())
                .and_then(|from| report.inventory.resources.get(from))
                .cloned()
                .unwrap_or_default();
            async move { (*kind, self.collect_children(collect, &parents).await) }
        }))
        .await;
        for (kind, result) in results {
            self.record(&mut report, kind, result);
        }

        report
    }

    fn record(&self, report: &mut CollectReport, kind: &str, result: Result<Vec<Value>>) {
        match result {
            Ok(records) => {
                tracing::debug!("Collected {} {} record(s)", records.len(), kind);
                report.inventory.resources.insert(kind.to_string(), records);
            }
            Err(e) => {
                tracing::warn!("Failed to collect {}: {:#}", kind, e);
                report.failures.insert(kind.to_string(), format!("{:#}", e));
                report.inventory.resources.insert(kind.to_string(), Vec::new());
            }
        }
    }
}
