//! gcp2tf - compile GCP inventories into Terraform configuration
//!
//! Collection ([`inventory::collector`]) produces a raw [`inventory::Inventory`]
//! snapshot, which is frozen into a [`resource::ResourceGraph`] and compiled
//! ([`compiler::Compiler`]) into one Terraform unit per resource kind.

pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod gcp;
pub mod inventory;
pub mod output;
pub mod resource;
