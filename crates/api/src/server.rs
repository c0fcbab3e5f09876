#![forbid(unsafe_code)]

use crate::jsonrpc::{JsonRpcRequest, json_rpc_error, json_rpc_response};
use crate::ops::dispatch;
use fv_storage::SqliteStore;
use serde_json::{Value, json};
use std::path::Path;

/// Stateful request handler. Owns the store; one instance serves a whole
/// stdio session.
pub struct ApiServer {
    store: SqliteStore,
}

impl ApiServer {
    pub fn new(storage_dir: &Path) -> std::io::Result<Self> {
        let store = SqliteStore::open(storage_dir)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        Ok(Self { store })
    }

    /// Handle one request. Returns `None` for notifications, which get no
    /// response line on the wire.
    pub fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        let is_notification = matches!(request.id, None | Some(Value::Null));

        let reply = match request.method.as_str() {
            "ping" => json_rpc_response(request.id.clone(), json!({})),
            method => {
                let params = request.params.clone().unwrap_or_else(|| json!({}));
                match dispatch(&mut self.store, method, &params) {
                    Some(response) => {
                        json_rpc_response(request.id.clone(), response.into_value())
                    }
                    None => json_rpc_error(
                        request.id.clone(),
                        -32601,
                        &format!("unknown method: {method}"),
                    ),
                }
            }
        };

        if is_notification { None } else { Some(reply) }
    }
}
