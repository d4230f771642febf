//! Echo plugin: the reference quay plugin.
//!
//! Serves three methods over the plugin wire protocol:
//! - `Ping`: returns the `msg` parameter (or `pong`)
//! - `Echo`: returns all parameters re-encoded as a JSON object
//! - `Reverse`: returns the `msg` parameter reversed
//!
//! Unknown methods and missing parameters are domain errors, reported via
//! `success = false`; the process keeps serving.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tonic::{Request, Response, Status};

use quay_wire::handshake::PROTOCOL_VERSION;
use quay_wire::proto::plugin_server::Plugin;
use quay_wire::proto::{ExecuteRequest, ExecuteResponse, MetadataRequest, MetadataResponse};

const METHODS: [&str; 3] = ["Ping", "Echo", "Reverse"];

/// The protocol version this plugin advertises. Overridable through the
/// environment so host-side compatibility tests can simulate newer plugins.
fn advertised_protocol_version() -> i32 {
    std::env::var("ECHO_PROTOCOL_VERSION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(PROTOCOL_VERSION)
}

#[derive(Default)]
struct EchoPlugin;

#[tonic::async_trait]
impl Plugin for EchoPlugin {
    async fn get_metadata(
        &self,
        _request: Request<MetadataRequest>,
    ) -> Result<Response<MetadataResponse>, Status> {
        Ok(Response::new(MetadataResponse {
            name: "echo".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Echoes request parameters back to the caller".to_string(),
            methods: METHODS.iter().map(|m| m.to_string()).collect(),
            capabilities: HashMap::new(),
            protocol_version: advertised_protocol_version(),
        }))
    }

    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> Result<Response<ExecuteResponse>, Status> {
        let req = request.into_inner();
        Ok(Response::new(handle(&req.method, &req.params)))
    }
}

fn handle(method: &str, params: &HashMap<String, String>) -> ExecuteResponse {
    match method {
        "Ping" => ok(params
            .get("msg")
            .cloned()
            .unwrap_or_else(|| "pong".to_string())),
        "Echo" => {
            // BTreeMap gives a stable key order in the JSON output.
            let sorted: BTreeMap<&String, &String> = params.iter().collect();
            match serde_json::to_string(&sorted) {
                Ok(json) => ok(json),
                Err(e) => fail(format!("failed to encode params: {e}")),
            }
        }
        "Reverse" => match params.get("msg") {
            Some(msg) => ok(msg.chars().rev().collect()),
            None => fail("Reverse requires a 'msg' parameter".to_string()),
        },
        other => fail(format!("unknown method: {other}")),
    }
}

fn ok(result: String) -> ExecuteResponse {
    ExecuteResponse {
        result: Some(result),
        success: true,
        error: None,
    }
}

fn fail(error: String) -> ExecuteResponse {
    ExecuteResponse {
        result: None,
        success: false,
        error: Some(error),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = quay_wire::serve(EchoPlugin).await {
        eprintln!("echo plugin failed to start: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ping_echoes_msg() {
        let response = handle("Ping", &params(&[("msg", "hi")]));
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("hi"));
    }

    #[test]
    fn ping_defaults_to_pong() {
        let response = handle("Ping", &HashMap::new());
        assert_eq!(response.result.as_deref(), Some("pong"));
    }

    #[test]
    fn echo_returns_sorted_json() {
        let response = handle("Echo", &params(&[("b", "2"), ("a", "1")]));
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some(r#"{"a":"1","b":"2"}"#));
    }

    #[test]
    fn reverse_reverses_msg() {
        let response = handle("Reverse", &params(&[("msg", "quay")]));
        assert_eq!(response.result.as_deref(), Some("yauq"));
    }

    #[test]
    fn reverse_without_msg_is_a_domain_error() {
        let response = handle("Reverse", &HashMap::new());
        assert!(!response.success);
        assert!(response.error.unwrap().contains("msg"));
    }

    #[test]
    fn unknown_method_is_a_domain_error() {
        let response = handle("Transmogrify", &HashMap::new());
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("unknown method: Transmogrify")
        );
    }

    #[test]
    fn default_protocol_version_matches_wire() {
        std::env::remove_var("ECHO_PROTOCOL_VERSION");
        assert_eq!(advertised_protocol_version(), PROTOCOL_VERSION);
    }
}
