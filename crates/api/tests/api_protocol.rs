#![forbid(unsafe_code)]

use fv_api::{ApiServer, JsonRpcRequest};
use serde_json::{Value, json};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("fv_api_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn server(test_name: &str) -> ApiServer {
    ApiServer::new(&temp_dir(test_name)).expect("open server")
}

fn request(method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        _jsonrpc: Some("2.0".to_string()),
        method: method.to_string(),
        id: Some(json!(1)),
        params: Some(params),
    }
}

/// Calls a method and unwraps the domain envelope, asserting success.
fn call(server: &mut ApiServer, method: &str, params: Value) -> Value {
    let reply = server
        .handle(request(method, params))
        .expect("response for request");
    let envelope = reply.get("result").expect("jsonrpc result").clone();
    assert_eq!(
        envelope.get("success"),
        Some(&json!(true)),
        "expected success from {method}: {envelope}"
    );
    envelope.get("result").expect("envelope result").clone()
}

/// Calls a method expecting a domain error; returns its code.
fn call_err(server: &mut ApiServer, method: &str, params: Value) -> String {
    let reply = server
        .handle(request(method, params))
        .expect("response for request");
    let envelope = reply.get("result").expect("jsonrpc result");
    assert_eq!(
        envelope.get("success"),
        Some(&json!(false)),
        "expected failure from {method}: {envelope}"
    );
    envelope["error"]["code"]
        .as_str()
        .expect("error code")
        .to_string()
}

fn create_collection(server: &mut ApiServer, user: &str, name: &str) -> String {
    let result = call(
        server,
        "collections.create",
        json!({ "user": user, "name": name }),
    );
    result["collection"]["id"].as_str().expect("id").to_string()
}

fn create_plant(server: &mut ApiServer, user: &str, collection: &str, name: &str) -> String {
    let result = call(
        server,
        "plants.create",
        json!({ "user": user, "collection": collection, "name": name }),
    );
    result["plant"]["id"].as_str().expect("id").to_string()
}

#[test]
fn removal_chain_ends_in_last_album_error() {
    let mut srv = server("removal_chain");

    let succulents = create_collection(&mut srv, "alice", "Succulents");
    let windowsill = create_collection(&mut srv, "alice", "Windowsill");
    let plant = create_plant(&mut srv, "alice", &succulents, "Echeveria");
    call(
        &mut srv,
        "collections.add_plant",
        json!({ "user": "alice", "collection": windowsill, "plant": plant }),
    );

    // Two memberships: the first removal is a plain detach.
    let result = call(
        &mut srv,
        "collections.remove_plant",
        json!({ "user": "alice", "collection": succulents, "plant": plant }),
    );
    assert_eq!(result["moved_to_uncategorized"], json!(false));

    // Last named collection: the plant falls back to Uncategorized.
    let result = call(
        &mut srv,
        "collections.remove_plant",
        json!({ "user": "alice", "collection": windowsill, "plant": plant }),
    );
    assert_eq!(result["moved_to_uncategorized"], json!(true));

    let collections = call(
        &mut srv,
        "collections.list",
        json!({ "user": "alice" }),
    );
    let uncategorized = collections["collections"]
        .as_array()
        .expect("collections array")
        .iter()
        .find(|c| c["is_uncategorized"] == json!(true))
        .expect("uncategorized collection")
        .clone();
    assert_eq!(uncategorized["plant_count"], json!(1));

    // Removing from Uncategorized itself is refused.
    let code = call_err(
        &mut srv,
        "collections.remove_plant",
        json!({
            "user": "alice",
            "collection": uncategorized["id"].as_str().expect("id"),
            "plant": plant,
        }),
    );
    assert_eq!(code, "LAST_ALBUM");

    // The refused removal left the membership in place.
    let plants = call(
        &mut srv,
        "plants.list",
        json!({ "user": "alice", "collection": uncategorized["id"].as_str().expect("id") }),
    );
    assert_eq!(plants["plants"].as_array().expect("plants").len(), 1);
}

#[test]
fn thumbnail_follows_images_over_the_wire() {
    let mut srv = server("thumbnails");

    let shelf = create_collection(&mut srv, "alice", "Shelf");
    let plant = create_plant(&mut srv, "alice", &shelf, "Monstera");

    // First image becomes main without asking.
    let first = call(
        &mut srv,
        "plants.add_image",
        json!({ "user": "alice", "plant": plant, "url": "https://img.test/1.jpg" }),
    );
    assert_eq!(first["image"]["is_main"], json!(true));
    let first_id = first["image"]["id"].as_str().expect("id").to_string();

    let second = call(
        &mut srv,
        "plants.add_image",
        json!({
            "user": "alice",
            "plant": plant,
            "url": "https://img.test/2.jpg",
            "is_main": true,
        }),
    );
    assert_eq!(second["image"]["is_main"], json!(true));

    let images = call(&mut srv, "plants.images", json!({ "user": "alice", "plant": plant }));
    let mains: Vec<&Value> = images["images"]
        .as_array()
        .expect("images")
        .iter()
        .filter(|img| img["is_main"] == json!(true))
        .collect();
    assert_eq!(mains.len(), 1, "exactly one main image");

    let result = call(
        &mut srv,
        "collections.set_thumbnail",
        json!({ "user": "alice", "collection": shelf, "image": first_id }),
    );
    assert_eq!(
        result["collection"]["thumbnail_image"],
        json!(first_id.clone())
    );

    // Null clears the thumbnail.
    let result = call(
        &mut srv,
        "collections.set_thumbnail",
        json!({ "user": "alice", "collection": shelf, "image": null }),
    );
    assert_eq!(result["collection"]["thumbnail_image"], json!(null));
}

#[test]
fn error_codes_map_to_domain_failures() {
    let mut srv = server("error_codes");

    let shelf = create_collection(&mut srv, "alice", "Shelf");
    let plant = create_plant(&mut srv, "alice", &shelf, "Monstera");

    // Another user cannot touch alice's collection.
    let code = call_err(
        &mut srv,
        "collections.get",
        json!({ "user": "bob", "collection": shelf }),
    );
    assert_eq!(code, "ACCESS_DENIED");

    let code = call_err(
        &mut srv,
        "plants.get",
        json!({ "user": "alice", "plant": "plt-9999" }),
    );
    assert_eq!(code, "NOT_FOUND");

    // Removing a plant that is not in the collection is a state conflict.
    let other = create_collection(&mut srv, "alice", "Other");
    let code = call_err(
        &mut srv,
        "collections.remove_plant",
        json!({ "user": "alice", "collection": other, "plant": plant }),
    );
    assert_eq!(code, "INVALID_STATE");

    let code = call_err(
        &mut srv,
        "collections.create",
        json!({ "user": "!!bad!!", "name": "Shelf" }),
    );
    assert_eq!(code, "INVALID_INPUT");

    let code = call_err(
        &mut srv,
        "collections.create",
        json!({ "user": "alice", "name": "???" }),
    );
    assert_eq!(code, "INVALID_INPUT");
}

#[test]
fn events_are_ordered_and_resumable() {
    let mut srv = server("events");

    let shelf = create_collection(&mut srv, "alice", "Shelf");
    create_plant(&mut srv, "alice", &shelf, "Monstera");

    let result = call(&mut srv, "events.list", json!({ "user": "alice" }));
    let events = result["events"].as_array().expect("events").clone();
    assert!(events.len() >= 2);
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["type"].as_str().expect("type"))
        .collect();
    assert_eq!(kinds[0], "collection_created");
    assert!(kinds.contains(&"plant_created"));

    // Resume after the first event.
    let since = events[0]["id"].as_str().expect("event id");
    let result = call(
        &mut srv,
        "events.list",
        json!({ "user": "alice", "since": since }),
    );
    let resumed = result["events"].as_array().expect("events");
    assert_eq!(resumed.len(), events.len() - 1);
}

#[test]
fn protocol_edges() {
    let mut srv = server("protocol_edges");

    // ping answers an empty result without the domain envelope.
    let reply = srv.handle(request("ping", json!({}))).expect("pong");
    assert_eq!(reply["result"], json!({}));

    // Unknown methods produce a JSON-RPC error.
    let reply = srv
        .handle(request("collections.explode", json!({ "user": "alice" })))
        .expect("error reply");
    assert_eq!(reply["error"]["code"], json!(-32601));

    // Notifications (no id) are handled silently.
    let notification = JsonRpcRequest {
        _jsonrpc: Some("2.0".to_string()),
        method: "collections.create".to_string(),
        id: None,
        params: Some(json!({ "user": "alice", "name": "Quiet" })),
    };
    assert!(srv.handle(notification).is_none());

    // The notification still mutated state.
    let result = call(&mut srv, "collections.list", json!({ "user": "alice" }));
    assert_eq!(result["collections"].as_array().expect("array").len(), 1);
}
