//! Resource abstraction layer
//!
//! This module provides a data-driven approach to describing GCP resources.
//! Kind definitions are loaded from JSON files at compile time, allowing new
//! resource kinds to be added without code changes.
//!
//! # Architecture
//!
//! - [`value`] - Tagged-union attribute values normalized from provider JSON
//! - [`plan`] - Field plan rules, predicates and formats
//! - [`registry`] - Loads and caches kind definitions from embedded JSON
//! - [`graph`] - Collect-then-freeze resource graph with reference indexes
//!
//! # Kind Definitions
//!
//! Kinds are defined in JSON files under `src/resources/`:
//! - `organization.json` - Folders, tags, organization policies and IAM
//! - `network.json` - VPC networks, subnets, firewall, routing, NAT and VPN
//! - `services.json` - Service accounts, certificates, storage, Pub/Sub,
//!   functions, GKE and Cloud SQL
//!
//! # Example
//!
//! ```ignore
//! use gcp2tf::resource::{get_registry, ResourceGraph};
//!
//! let graph = ResourceGraph::from_inventory(get_registry(), &inventory.resources);
//! let network = graph.get("network", "prod-vpc");
//! ```

pub mod graph;
pub mod plan;
mod registry;
pub mod value;

pub use graph::{GraphBuilder, KindLookup, RecordId, ResourceGraph, ResourceRecord};
pub use registry::*;
pub use value::{AttrValue, Attributes, Scalar};
