#![allow(dead_code)]

use hulud_scan::github::{ClientOptions, RateLimitHandle, RateLimitedClient, RetryPolicy};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::MockServer;

/// Default limits with millisecond delays.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        secondary_delay: Duration::from_millis(2),
        ..RetryPolicy::default()
    }
}

pub fn client_with(server: &MockServer, handle: RateLimitHandle) -> RateLimitedClient {
    let options = ClientOptions {
        base_url: server.uri(),
        token: Some("test-token".to_string()),
        timeout: Duration::from_secs(5),
        retry: fast_policy(),
    };
    RateLimitedClient::new(options, handle).unwrap()
}

pub fn client(server: &MockServer) -> RateLimitedClient {
    client_with(server, RateLimitHandle::new())
}

pub fn repo_json(owner: &str, name: &str) -> Value {
    json!({
        "name": name,
        "owner": { "login": owner },
        "default_branch": "main",
        "private": false,
        "description": null,
        "html_url": format!("https://github.com/{owner}/{name}"),
        "pushed_at": "2024-01-01T00:00:00Z"
    })
}

pub fn tree_json(paths: &[&str]) -> Value {
    let entries: Vec<Value> = paths
        .iter()
        .map(|p| json!({ "path": p, "type": "blob", "size": 100 }))
        .collect();
    json!({ "sha": "abc", "tree": entries, "truncated": false })
}
