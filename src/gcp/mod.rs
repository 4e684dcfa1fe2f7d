//! GCP API interaction module
//!
//! Authentication, the HTTP wrapper and the client the collector lists
//! resources through.
//!
//! # Module Structure
//!
//! - [`auth`] - Application Default Credentials, static tokens, gcloud defaults
//! - [`client`] - Client implementing the collector's `ResourceApi`
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use gcp2tf::gcp::client::GcpClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new().await?;
//!     let networks = client
//!         .get("https://compute.googleapis.com/compute/v1/projects/demo/global/networks")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
