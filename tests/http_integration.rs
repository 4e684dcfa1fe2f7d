//! Integration tests for the GCP HTTP client and the collector using wiremock
//!
//! These tests run the real client against mocked endpoints: status handling,
//! retries, pagination and aggregated list flattening.

use gcp2tf::gcp::client::GcpClient;
use gcp2tf::gcp::http::GcpHttpClient;
use gcp2tf::inventory::collector::{fetch_list, Collector, ListRequest, ResourceApi};
use gcp2tf::resource::Registry;
use serde_json::json;
use std::collections::BTreeSet;
use wiremock::matchers::{
    bearer_token, body_partial_json, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test module for the raw HTTP wrapper
mod http_client_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/demo/global/networks"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "prod-vpc"}, {"name": "dev-vpc"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let url = format!("{}/compute/v1/projects/demo/global/networks", server.uri());
        let response = client.get(&url, "test-token").await.unwrap();

        assert_eq!(response["items"].as_array().unwrap().len(), 2);
        assert_eq!(response["items"][0]["name"], "prod-vpc");
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/tagKeys:search"))
            .and(body_partial_json(json!({"parent": "organizations/42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tagKeys": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let url = format!("{}/v3/tagKeys:search", server.uri());
        let response = client
            .post(&url, "test-token", &json!({"parent": "organizations/42"}))
            .await
            .unwrap();

        assert_eq!(response, json!({"tagKeys": []}));
    }

    #[tokio::test]
    async fn test_not_found_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "The resource was not found"}
            })))
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let err = client
            .get(&format!("{}/missing", server.uri()), "t")
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("404"));
        assert_eq!(
            gcp2tf::gcp::http::format_gcp_error(&err),
            "Resource not found."
        );
    }

    #[tokio::test]
    async fn test_unavailable_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let response = client
            .get(&format!("{}/flaky", server.uri()), "t")
            .await
            .unwrap();

        assert_eq!(response["ok"], true);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/denied"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let err = client
            .get(&format!("{}/denied", server.uri()), "t")
            .await
            .unwrap_err();

        assert!(gcp2tf::gcp::http::format_gcp_error(&err).starts_with("Permission denied"));
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let response = client
            .get(&format!("{}/empty", server.uri()), "t")
            .await
            .unwrap();

        assert!(response.is_null());
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = GcpHttpClient::new().unwrap();
        let err = client
            .get(&format!("{}/garbage", server.uri()), "t")
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("parse"));
    }
}

/// Test module for pagination through the production client
mod pagination_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_pages_follow_next_page_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/networks"))
            .and(query_param_is_missing("pageToken"))
            .and(bearer_token("static-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "a"}],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/networks"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "b"}, {"name": "c"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GcpClient::with_token("static-token").unwrap();
        let request = ListRequest::get(format!("{}/networks", server.uri()), "items");
        let items = fetch_list(&client, &request).await.unwrap();

        let names: Vec<&str> = items.iter().filter_map(|i| i["name"].as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_client_is_a_resource_api() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(bearer_token("static-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"found": 1})))
            .mount(&server)
            .await;

        let client = GcpClient::with_token("static-token").unwrap();
        let api: &dyn ResourceApi = &client;
        let response = api
            .post_json(&format!("{}/search", server.uri()), &json!({}))
            .await
            .unwrap();

        assert_eq!(response["found"], 1);
    }
}

/// Test module for a full collection run against a small registry
mod collector_tests {
    use super::*;

    fn registry(base: &str) -> Registry {
        let document = json!({
            "kinds": {
                "network": {
                    "display_name": "VPC Networks",
                    "resource_type": "google_compute_network",
                    "unit": "networks.tf",
                    "order": 100,
                    "key": [{"attr": "name"}],
                    "collect": {
                        "url": format!("{}/projects/{{project}}/global/networks", base),
                        "response_path": "items"
                    }
                },
                "subnet": {
                    "display_name": "Subnets",
                    "resource_type": "google_compute_subnetwork",
                    "unit": "subnets.tf",
                    "order": 110,
                    "key": [{"attr": "name"}],
                    "collect": {
                        "url": format!("{}/projects/{{project}}/aggregated/subnetworks", base),
                        "response_path": "items",
                        "aggregated": true
                    }
                },
                "tag_key": {
                    "display_name": "Tag Keys",
                    "resource_type": "google_tags_tag_key",
                    "unit": "tags.tf",
                    "order": 20,
                    "scope": "organization",
                    "key": [{"attr": "name"}],
                    "collect": {
                        "url": format!("{}/tagKeys:search", base),
                        "method": "post",
                        "body": {"parent": "organizations/{org}"},
                        "response_path": "tagKeys"
                    }
                }
            }
        })
        .to_string();

        Registry::from_documents(&[document.as_str()]).unwrap()
    }

    #[tokio::test]
    async fn test_collects_paginated_and_aggregated_kinds() {
        let server = MockServer::start().await;
        let registry = registry(&server.uri());

        Mock::given(method("GET"))
            .and(path("/projects/demo/global/networks"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "prod-vpc"}],
                "nextPageToken": "n2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/demo/global/networks"))
            .and(query_param("pageToken", "n2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "dev-vpc"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/demo/aggregated/subnetworks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": {
                    "regions/us-east1": {"subnetworks": [{"name": "app"}]},
                    "regions/europe-west1": {
                        "warning": {"code": "NO_RESULTS_ON_PAGE", "message": "none"}
                    },
                    "regions/us-west1": {"subnetworks": [{"name": "db"}, {"name": "web"}]}
                }
            })))
            .mount(&server)
            .await;

        let client = GcpClient::with_token("t").unwrap();
        let report = Collector::new(&client, &registry)
            .project(Some("demo".to_string()))
            .collect()
            .await;

        assert!(report.failures.is_empty());
        assert_eq!(report.inventory.project_id.as_deref(), Some("demo"));
        assert_eq!(report.inventory.resources["network"].len(), 2);
        assert_eq!(report.inventory.resources["subnet"].len(), 3);
        // organization-scoped kinds need an organization
        assert!(!report.inventory.resources.contains_key("tag_key"));
    }

    #[tokio::test]
    async fn test_post_pagination_and_failures() {
        let server = MockServer::start().await;
        let registry = registry(&server.uri());

        Mock::given(method("POST"))
            .and(path("/tagKeys:search"))
            .and(body_partial_json(json!({"pageToken": "k2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tagKeys": [{"name": "tagKeys/2", "shortName": "team"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tagKeys:search"))
            .and(body_partial_json(json!({"parent": "organizations/42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tagKeys": [{"name": "tagKeys/1", "shortName": "env"}],
                "nextPageToken": "k2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/demo/global/networks"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = GcpClient::with_token("t").unwrap();
        let report = Collector::new(&client, &registry)
            .project(Some("demo".to_string()))
            .organization(Some("42".to_string()))
            .kinds(BTreeSet::from(["tag_key".to_string(), "network".to_string()]))
            .collect()
            .await;

        let keys: Vec<&str> = report.inventory.resources["tag_key"]
            .iter()
            .filter_map(|k| k["shortName"].as_str())
            .collect();
        assert_eq!(keys, vec!["env", "team"]);

        assert!(report.failures.contains_key("network"));
        assert!(report.inventory.resources["network"].is_empty());
        assert!(!report.inventory.resources.contains_key("subnet"));
    }
}
