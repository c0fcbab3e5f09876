#![forbid(unsafe_code)]

mod entry;
mod jsonrpc;
mod ops;
mod server;
mod support;

pub use entry::run_stdio;
pub use jsonrpc::{JsonRpcRequest, json_rpc_error, json_rpc_response};
pub use server::ApiServer;
