//! JSON-RPC mocking scaffold shared by the async tests.

use serde_json::{Value, json};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

enum Outcome {
    Result(Value),
    Error(i64, &'static str),
}

/// A JSON-RPC endpoint mock that routes by method name and echoes the
/// request id, which the alloy client checks on every response.
///
/// `eth_call` additionally routes on the 4-byte function selector in the
/// call's input, so one mock can serve several contract reads.
pub(crate) struct JsonRpc {
    routes: Vec<(&'static str, Outcome)>,
    call_routes: Vec<([u8; 4], Value)>,
}

impl JsonRpc {
    pub(crate) fn new() -> Self {
        Self {
            routes: Vec::new(),
            call_routes: Vec::new(),
        }
    }

    pub(crate) fn result(mut self, rpc_method: &'static str, value: Value) -> Self {
        self.routes.push((rpc_method, Outcome::Result(value)));
        self
    }

    pub(crate) fn call(mut self, selector: [u8; 4], value: Value) -> Self {
        self.call_routes.push((selector, value));
        self
    }

    pub(crate) fn error(
        mut self,
        rpc_method: &'static str,
        code: i64,
        message: &'static str,
    ) -> Self {
        self.routes.push((rpc_method, Outcome::Error(code, message)));
        self
    }

    pub(crate) async fn mount(self) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(self)
            .mount(&server)
            .await;
        server
    }
}

impl JsonRpc {
    fn route_call(&self, body: &Value) -> Option<Value> {
        let call = body.get("params")?.get(0)?;
        let input = call
            .get("input")
            .or_else(|| call.get("data"))?
            .as_str()?
            .strip_prefix("0x")?;
        let mut selector = [0_u8; 4];
        for (index, byte) in selector.iter_mut().enumerate() {
            *byte = u8::from_str_radix(input.get(index * 2..index * 2 + 2)?, 16).ok()?;
        }
        self.call_routes
            .iter()
            .find(|(routed, _)| *routed == selector)
            .map(|(_, value)| value.clone())
    }
}

impl Respond for JsonRpc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body.get("id").cloned().unwrap_or(json!(0));
        let rpc_method = body.get("method").and_then(Value::as_str).unwrap_or_default();

        if rpc_method == "eth_call" {
            if let Some(result) = self.route_call(&body) {
                let payload = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                return ResponseTemplate::new(200).set_body_json(payload);
            }
        }

        let outcome = self
            .routes
            .iter()
            .find(|(name, _)| *name == rpc_method)
            .map(|(_, outcome)| outcome);

        let payload = match outcome {
            Some(Outcome::Result(value)) => {
                json!({ "jsonrpc": "2.0", "id": id, "result": value })
            }
            Some(Outcome::Error(code, message)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message },
            }),
            None => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method {rpc_method} not mocked") },
            }),
        };
        ResponseTemplate::new(200).set_body_json(payload)
    }
}
