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
pub(crate) struct JsonRpc {
    routes: Vec<(&'static str, Outcome)>,
}

impl JsonRpc {
    pub(crate) fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub(crate) fn result(mut self, rpc_method: &'static str, value: Value) -> Self {
        self.routes.push((rpc_method, Outcome::Result(value)));
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

impl Respond for JsonRpc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body.get("id").cloned().unwrap_or(json!(0));
        let rpc_method = body.get("method").and_then(Value::as_str).unwrap_or_default();

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

const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";
const ZERO_ADDR: &str = "0x0000000000000000000000000000000000000000";

/// A minimal but deserializable `eth_getBlockByNumber` result.
pub(crate) fn block_json(base_fee: u64) -> Value {
    json!({
        "hash": ZERO_HASH,
        "parentHash": ZERO_HASH,
        "sha3Uncles": ZERO_HASH,
        "miner": ZERO_ADDR,
        "stateRoot": ZERO_HASH,
        "transactionsRoot": ZERO_HASH,
        "receiptsRoot": ZERO_HASH,
        "logsBloom": zero_bloom(),
        "difficulty": "0x0",
        "number": "0x1",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": "0x0",
        "extraData": "0x",
        "mixHash": ZERO_HASH,
        "nonce": "0x0000000000000000",
        "baseFeePerGas": format!("{base_fee:#x}"),
        "transactions": [],
        "uncles": [],
    })
}

/// A deserializable `eth_getTransactionReceipt` result carrying the given
/// status and logs.
pub(crate) fn receipt_json(tx_hash: &str, success: bool, logs: Value) -> Value {
    json!({
        "transactionHash": tx_hash,
        "transactionIndex": "0x0",
        "blockHash": ZERO_HASH,
        "blockNumber": "0x1",
        "from": ZERO_ADDR,
        "to": ZERO_ADDR,
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "contractAddress": null,
        "logsBloom": zero_bloom(),
        "status": if success { "0x1" } else { "0x0" },
        "type": "0x2",
        "logs": logs,
    })
}

/// One receipt log entry with the given emitter, topics, and data.
pub(crate) fn log_json(address: &str, topics: Value, data: String) -> Value {
    json!({
        "address": address,
        "topics": topics,
        "data": data,
        "blockNumber": "0x1",
        "blockHash": ZERO_HASH,
        "transactionHash": ZERO_HASH,
        "transactionIndex": "0x0",
        "logIndex": "0x0",
        "removed": false,
    })
}

fn zero_bloom() -> String {
    format!("0x{}", "00".repeat(256))
}
