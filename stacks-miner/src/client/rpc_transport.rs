// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2024 Stacks Open Internet Foundation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use base64::encode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

const RPC_CLIENT_ID: &str = "stacks-miner";
const RPC_VERSION: &str = "2.0";

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: String,
    method: String,
    params: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<Value>,
}

/// A failed JSON-RPC call
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),
    /// The response body was not the expected JSON
    #[error("Parsing error: {0}")]
    Parsing(String),
    /// bitcoind answered with an error object
    #[error("Service error: {0}")]
    Service(String),
}

/// Result of a JSON-RPC call
pub type RpcResult<T> = Result<T, RpcError>;

/// A JSON-RPC 2.0 client for a basic-auth protected endpoint
#[derive(Debug)]
pub struct RpcTransport {
    url: String,
    auth_header: String,
    client: Client,
}

impl RpcTransport {
    /// Build a transport whose every request times out after `timeout`
    pub fn new(
        url: String,
        username: String,
        password: String,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Network(format!("Failed to build RPC client: {e}")))?;
        let credentials = format!("{username}:{password}");
        Ok(RpcTransport {
            url,
            auth_header: format!("Basic {}", encode(credentials)),
            client,
        })
    }

    /// Call `method`, requiring a non-null result
    pub fn send<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> RpcResult<T> {
        self.send_optional(method, params)?
            .ok_or_else(|| RpcError::Parsing("Missing both result and error".into()))
    }

    /// Call `method`, treating a null result without an error as `None`
    pub fn send_optional<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> RpcResult<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: RPC_VERSION.to_string(),
            id: RPC_CLIENT_ID.to_string(),
            method: method.to_string(),
            params: Value::Array(params),
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.auth_header)
            .json(&request)
            .send()
            .map_err(|err| RpcError::Network(err.to_string()))?;

        let parsed: JsonRpcResponse<T> = response
            .json()
            .map_err(|e| RpcError::Parsing(format!("Failed to parse RPC response: {}", e)))?;

        match (parsed.result, parsed.error) {
            (_, Some(err)) if !err.is_null() => Err(RpcError::Service(format!("{:#}", err))),
            (result, _) => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup_transport(server: &mockito::ServerGuard) -> RpcTransport {
        RpcTransport::new(
            server.url(),
            "user".into(),
            "pass".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn send_with_string_result_ok() {
        let expected_request = json!({
            "jsonrpc": "2.0",
            "id": "stacks-miner",
            "method": "some_method",
            "params": ["param1"]
        });

        let response_body = json!({
            "result": "some_result",
            "error": null
        });

        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_body(mockito::Matcher::PartialJson(expected_request))
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(response_body.to_string())
            .create();

        let transport = setup_transport(&server);

        let result: RpcResult<String> = transport.send("some_method", vec!["param1".into()]);
        assert_eq!(result.unwrap(), "some_result");
    }

    #[test]
    fn send_fails_with_network_error() {
        let transport = RpcTransport::new(
            "http://127.0.0.1:65535".to_string(),
            "user".to_string(),
            "pass".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let result: RpcResult<Value> = transport.send("dummy_method", vec![]);
        assert!(matches!(result.unwrap_err(), RpcError::Network(_)));
    }

    #[test]
    fn send_fails_with_invalid_json() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body("not a valid json")
            .create();

        let transport = setup_transport(&server);
        let result: RpcResult<Value> = transport.send("dummy", vec![]);

        match result {
            Err(RpcError::Parsing(msg)) => {
                assert!(msg.starts_with("Failed to parse RPC response:"))
            }
            _ => panic!("Expected parse error"),
        }
    }

    #[test]
    fn null_result_is_none_or_missing() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"result": null, "error": null}"#)
            .expect(2)
            .create();

        let transport = setup_transport(&server);
        let optional: RpcResult<Option<Value>> = transport.send_optional("scantxoutset", vec![]);
        assert_eq!(optional.unwrap(), None);

        let required: RpcResult<Value> = transport.send("scantxoutset", vec![]);
        match required {
            Err(RpcError::Parsing(msg)) => assert_eq!("Missing both result and error", msg),
            _ => panic!("Expected missing result/error error"),
        }
    }

    #[test]
    fn send_fails_with_service_error() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/")
            .with_status(500)
            .with_header("Content-Type", "application/json")
            .with_body(
                r#"{
                "result": null,
                "error": {
                    "code": -26,
                    "message": "bad-txns-inputs-missingorspent"
                }
            }"#,
            )
            .create();

        let transport = setup_transport(&server);
        let result: RpcResult<Value> = transport.send("sendrawtransaction", vec![]);

        match result {
            Err(RpcError::Service(msg)) => assert_eq!(
                "{\n  \"code\": -26,\n  \"message\": \"bad-txns-inputs-missingorspent\"\n}",
                msg
            ),
            _ => panic!("Expected service error"),
        }
    }
}
