//! End-to-end compilation scenarios
//!
//! Inventories are compiled through the public API and the emitted units are
//! parsed back with `hcl-rs` to prove they are well-formed.

use gcp2tf::compiler::{CompileContext, CompileOutput, Compiler, OutputUnit};
use gcp2tf::diagnostics::{Diagnostic, Severity};
use gcp2tf::inventory::Inventory;
use gcp2tf::resource::{get_registry, ResourceGraph};
use serde_json::{json, Value};
use std::path::Path;

fn fixture(name: &str) -> Inventory {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    Inventory::load(&path).expect("fixture should load")
}

fn inventory(resources: Value) -> Inventory {
    Inventory::from_value(json!({ "project_id": "acme-prod", "resources": resources })).unwrap()
}

fn context(inventory: &Inventory) -> CompileContext {
    CompileContext {
        project_id: inventory.project_id.clone(),
        organization_id: inventory.organization_id.clone(),
        ..CompileContext::default()
    }
}

fn compile(inventory: &Inventory) -> (ResourceGraph, CompileOutput) {
    let graph = inventory.build_graph(get_registry());
    let output = Compiler::new(context(inventory)).compile(&graph);
    (graph, output)
}

fn parse(unit: &OutputUnit) -> hcl::Body {
    hcl::parse(&unit.text)
        .unwrap_or_else(|e| panic!("{} does not parse: {}\n{}", unit.name, e, unit.text))
}

fn resource<'a>(body: &'a hcl::Body, resource_type: &str, name: &str) -> &'a hcl::Block {
    body.blocks()
        .find(|b| {
            let labels: Vec<&str> = b.labels().iter().map(|l| l.as_str()).collect();
            b.identifier() == "resource" && labels == [resource_type, name]
        })
        .unwrap_or_else(|| panic!("no resource {}.{}", resource_type, name))
}

fn attr<'a>(block: &'a hcl::Block, key: &str) -> Option<&'a hcl::Expression> {
    block
        .body()
        .attributes()
        .find(|a| a.key() == key)
        .map(|a| a.expr())
}

#[test]
fn every_unit_of_a_project_inventory_parses() {
    let inventory = fixture("project_inventory.json");
    let (_, output) = compile(&inventory);

    for unit in &output.units {
        parse(unit);
    }
    assert!(output.unit("provider.tf").is_some());
    assert!(output.unit("variables.tf").is_some());
    assert_eq!(output.skipped(), 0, "{:?}", output.diagnostics);
}

#[test]
fn every_unit_of_a_legacy_organization_inventory_parses() {
    let inventory = fixture("legacy_org_resources.json");
    let graph = inventory.build_graph(get_registry());
    let ctx = CompileContext {
        organization_id: Some("42".into()),
        ..CompileContext::default()
    };
    let output = Compiler::new(ctx).compile(&graph);

    for unit in &output.units {
        parse(unit);
    }

    let folders = output.unit("folders.tf").unwrap();
    assert_eq!(folders.blocks, 3);
    let body = parse(folders);
    let platform = resource(&body, "google_folder", "Platform");
    assert!(!matches!(attr(platform, "parent"), Some(hcl::Expression::String(_))));
    let engineering = resource(&body, "google_folder", "Engineering");
    assert_eq!(
        attr(engineering, "parent"),
        Some(&hcl::Expression::String("organizations/42".into()))
    );

    assert_eq!(output.unit("org_iam.tf").unwrap().blocks, 2);
    assert_eq!(output.unit("org_policies.tf").unwrap().blocks, 4);
    assert_eq!(output.unit("tag_values.tf").unwrap().blocks, 2);
    assert!(output.unit("organization.tf").is_some());

    // "projects" has no field plan; summary keys are never counted
    assert!(output.diagnostics.contains(&Diagnostic::UnknownKind {
        kind: "projects".into(),
        count: 1
    }));
    assert!(!output
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UnknownKind { kind, .. } if kind == "folders")));
}

#[test]
fn compiling_twice_is_byte_identical() {
    let inventory = fixture("project_inventory.json");
    let (graph, first) = compile(&inventory);
    let second = Compiler::new(context(&inventory)).compile(&graph);

    assert_eq!(first.units, second.units);
}

#[test]
fn record_order_does_not_change_output() {
    let inventory = fixture("project_inventory.json");
    let mut reversed = inventory.clone();
    for records in reversed.resources.values_mut() {
        records.reverse();
    }

    let (_, a) = compile(&inventory);
    let (_, b) = compile(&reversed);
    assert_eq!(a.units, b.units);
}

#[test]
fn subnet_refers_to_prod_vpc_symbolically() {
    let inventory = inventory(json!({
        "network": [{"name": "prod-vpc"}],
        "subnet": [{
            "name": "app",
            "region": "us-east1",
            "ipCidrRange": "10.0.0.0/24",
            "network": "https://www.googleapis.com/compute/v1/projects/acme-prod/global/networks/prod-vpc"
        }]
    }));
    let (_, output) = compile(&inventory);

    let networks = output.unit("networks.tf").unwrap();
    assert!(networks
        .text
        .contains("resource \"google_compute_network\" \"prod_vpc\" {"));

    let subnets = output.unit("subnets.tf").unwrap();
    assert!(subnets
        .text
        .contains("network       = google_compute_network.prod_vpc.id\n"));
    assert!(!subnets.text.contains("networks/prod-vpc"));

    let body = parse(subnets);
    let subnet = resource(&body, "google_compute_subnetwork", "app");
    assert!(matches!(
        attr(subnet, "network"),
        Some(hcl::Expression::Traversal(_))
    ));
}

#[test]
fn unknown_network_stays_a_quoted_literal() {
    let inventory = inventory(json!({
        "subnet": [{
            "name": "app",
            "region": "us-east1",
            "ipCidrRange": "10.0.0.0/24",
            "network": "projects/host-project/global/networks/shared"
        }]
    }));
    let (_, output) = compile(&inventory);

    let subnets = output.unit("subnets.tf").unwrap();
    let body = parse(subnets);
    let subnet = resource(&body, "google_compute_subnetwork", "app");
    assert_eq!(
        attr(subnet, "network"),
        Some(&hcl::Expression::String(
            "projects/host-project/global/networks/shared".into()
        ))
    );

    let unresolved: Vec<&Diagnostic> = output
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::ReferenceUnresolved { .. }))
        .collect();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].severity(), Severity::Info);
    assert_eq!(output.skipped(), 0);
}

#[test]
fn firewall_allow_blocks_keep_input_order() {
    let inventory = inventory(json!({
        "network": [{"name": "prod-vpc"}],
        "firewall-rule": [{
            "name": "allow-web",
            "network": "prod-vpc",
            "allowed": [
                {"IPProtocol": "tcp", "ports": [80, 443]},
                {"IPProtocol": "icmp"}
            ]
        }]
    }));
    let (_, output) = compile(&inventory);

    let firewall = output.unit("firewall.tf").unwrap();
    let body = parse(firewall);
    let rule = resource(&body, "google_compute_firewall", "allow_web");

    let allows: Vec<&hcl::Block> = rule
        .body()
        .blocks()
        .filter(|b| b.identifier() == "allow")
        .collect();
    assert_eq!(allows.len(), 2);
    assert_eq!(attr(allows[0], "protocol"), Some(&hcl::Expression::String("tcp".into())));
    match attr(allows[0], "ports") {
        Some(hcl::Expression::Array(ports)) => assert_eq!(ports.len(), 2),
        other => panic!("unexpected ports: {:?}", other),
    }
    assert_eq!(attr(allows[1], "protocol"), Some(&hcl::Expression::String("icmp".into())));
    assert!(attr(allows[1], "ports").is_none());

    assert!(firewall.text.contains("ports    = [80, 443]"));
}

#[test]
fn quotes_backslashes_and_newlines_survive() {
    let description = "He said \"ship it\"\nC:\\deploy\\prod\ttabbed";
    let inventory = inventory(json!({
        "network": [{"name": "prod-vpc", "description": description}]
    }));
    let (_, output) = compile(&inventory);

    let networks = output.unit("networks.tf").unwrap();
    let body = parse(networks);
    let network = resource(&body, "google_compute_network", "prod_vpc");
    assert_eq!(
        attr(network, "description"),
        Some(&hcl::Expression::String(description.into()))
    );
}

#[test]
fn interpolation_markers_are_escaped() {
    let inventory = inventory(json!({
        "network": [{"name": "prod-vpc", "description": "costs ${var.money} and %{ if x }"}]
    }));
    let (_, output) = compile(&inventory);

    let networks = output.unit("networks.tf").unwrap();
    assert!(networks.text.contains("costs $${var.money} and %%{ if x }"));
    parse(networks);
}

#[test]
fn keyword_label_keys_still_parse() {
    let inventory = inventory(json!({
        "buckets": [{
            "name": "b",
            "location": "US",
            "labels": {"for": "x", "in": "y", "if": "z", "null": "n", "team": "data"}
        }]
    }));
    let (_, output) = compile(&inventory);

    let buckets = output.unit("buckets.tf").unwrap();
    let body = parse(buckets);
    let bucket = resource(&body, "google_storage_bucket", "b");
    assert!(attr(bucket, "labels").is_some());
    assert!(buckets.text.contains("\"for\" = \"x\""));
    assert!(buckets.text.contains("team = \"data\""));
}

#[test]
fn colliding_names_get_distinct_stable_symbols() {
    let inventory = inventory(json!({
        "network": [{"name": "prod.vpc"}, {"name": "prod-vpc"}],
        "subnet": [{
            "name": "app",
            "region": "us-east1",
            "ipCidrRange": "10.0.0.0/24",
            "network": "projects/acme-prod/global/networks/prod.vpc"
        }]
    }));
    let (_, output) = compile(&inventory);

    let networks = output.unit("networks.tf").unwrap();
    assert_eq!(networks.blocks, 2);
    let body = parse(networks);
    assert_eq!(
        attr(resource(&body, "google_compute_network", "prod_vpc"), "name"),
        Some(&hcl::Expression::String("prod-vpc".into()))
    );
    assert_eq!(
        attr(resource(&body, "google_compute_network", "prod_vpc_2"), "name"),
        Some(&hcl::Expression::String("prod.vpc".into()))
    );

    let subnets = output.unit("subnets.tf").unwrap();
    assert!(subnets.text.contains("google_compute_network.prod_vpc_2.id"));

    assert!(output.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::IdentifierCollision { renamed, .. } if renamed == "prod_vpc_2"
    )));

    let (_, again) = compile(&inventory);
    assert_eq!(output.units, again.units);
}

#[test]
fn missing_required_attribute_emits_empty_string() {
    let inventory = inventory(json!({
        "network": [{"name": "prod-vpc"}],
        "subnet": [{"name": "app", "region": "us-east1", "network": "prod-vpc"}]
    }));
    let (_, output) = compile(&inventory);

    let subnets = output.unit("subnets.tf").unwrap();
    assert!(subnets.text.contains("ip_cidr_range = \"\""));
    assert!(output.diagnostics.contains(&Diagnostic::MissingRequired {
        kind: "subnet".into(),
        key: "us-east1/app".into(),
        attr: "ipCidrRange".into(),
    }));
    assert_eq!(output.skipped(), 0);
}

#[test]
fn malformed_record_degrades_only_itself() {
    let inventory = inventory(json!({
        "network": [
            {"name": "good"},
            {"name": "bad", "mtu": {"value": 1460}},
            "not-an-object"
        ],
        "bucket": [{"name": "assets", "location": "US"}]
    }));
    let (_, output) = compile(&inventory);

    assert_eq!(output.unit("networks.tf").unwrap().blocks, 1);
    assert_eq!(output.unit("buckets.tf").unwrap().blocks, 1);
    assert_eq!(output.skipped(), 2);
    assert!(output
        .warnings()
        .any(|d| matches!(d, Diagnostic::MalformedRecord { key, .. } if key == "bad")));
}

#[test]
fn derived_records_and_secrets() {
    let inventory = fixture("project_inventory.json");
    let (graph, output) = compile(&inventory);

    // NAT and peering records are materialized from their parents
    assert_eq!(graph.records_of_kind("router-nat").len(), 1);
    assert_eq!(graph.records_of_kind("network-peering").len(), 1);

    let vpn = output.unit("vpn_tunnels.tf").unwrap();
    assert!(!vpn.text.contains("*************"));
    assert!(vpn.text.contains("\"REDACTED\" # "));

    let certificates = output.unit("certificates.tf").unwrap();
    let body = parse(certificates);
    let managed = resource(&body, "google_certificate_manager_certificate", "storefront");
    assert!(managed.body().blocks().any(|b| b.identifier() == "managed"));
    assert!(!managed.body().blocks().any(|b| b.identifier() == "self_managed"));

    // provider-managed records are left out
    let routes = output.unit("routes.tf").unwrap();
    assert_eq!(routes.blocks, 1);
    assert!(!routes.text.contains("default-route-"));
    let accounts = output.unit("service_accounts.tf").unwrap();
    assert_eq!(accounts.blocks, 1);
}
