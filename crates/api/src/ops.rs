#![forbid(unsafe_code)]

use crate::support::{now_rfc3339, ts_ms_to_rfc3339};
use fv_core::ids::UserId;
use fv_core::model::{Collection, Image, Plant};
use fv_storage::{
    AddImageRequest, AddPlantOutcome, AddPlantRequest, CollectionSummary, CreateCollectionRequest,
    CreatePlantRequest, DeleteCollectionRequest, EditCollectionRequest, EventRow,
    ListCollectionsRequest, ListPlantsRequest, RemovePlantOutcome, RemovePlantRequest,
    SetMainImageRequest, SetThumbnailRequest, SqliteStore, StoreError,
};
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub(crate) struct OpError {
    pub(crate) code: &'static str,
    /// The status the out-of-scope HTTP layer would answer with.
    pub(crate) http_status: u16,
    pub(crate) message: String,
}

impl OpError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: "INVALID_INPUT",
            http_status: 400,
            message: message.into(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        json!({
            "code": self.code,
            "http_status": self.http_status,
            "message": self.message,
        })
    }
}

#[derive(Clone, Debug)]
pub(crate) struct OpResponse {
    result: Value,
    error: Option<OpError>,
}

impl OpResponse {
    pub(crate) fn success(result: Value) -> Self {
        Self { result, error: None }
    }

    pub(crate) fn error(error: OpError) -> Self {
        Self { result: json!({}), error: Some(error) }
    }

    pub(crate) fn into_value(self) -> Value {
        json!({
            "success": self.error.is_none(),
            "result": self.result,
            "error": self.error.as_ref().map(|e| e.to_value()).unwrap_or(Value::Null),
            "timestamp": now_rfc3339(),
        })
    }
}

fn map_store_error(err: StoreError) -> OpError {
    match err {
        StoreError::AccessDenied => OpError {
            code: "ACCESS_DENIED",
            http_status: 403,
            message: err.to_string(),
        },
        StoreError::PlantNotFound | StoreError::ImageNotFound => OpError {
            code: "NOT_FOUND",
            http_status: 404,
            message: err.to_string(),
        },
        StoreError::PlantNotInCollection => OpError {
            code: "INVALID_STATE",
            http_status: 409,
            message: err.to_string(),
        },
        StoreError::LastAlbum => OpError {
            code: "LAST_ALBUM",
            http_status: 409,
            message: "Cannot remove the plant from its only remaining album".to_string(),
        },
        StoreError::InvalidInput(message) => OpError::invalid_input(message),
        StoreError::Io(_) | StoreError::Sql(_) => OpError {
            code: "INTERNAL_ERROR",
            http_status: 500,
            message: err.to_string(),
        },
    }
}

/// Dispatch a domain method. `None` means the method name is unknown to
/// this surface.
pub(crate) fn dispatch(store: &mut SqliteStore, method: &str, params: &Value) -> Option<OpResponse> {
    let handler: Handler = match method {
        "collections.create" => collections_create,
        "collections.edit" => collections_edit,
        "collections.delete" => collections_delete,
        "collections.get" => collections_get,
        "collections.list" => collections_list,
        "collections.add_plant" => collections_add_plant,
        "collections.remove_plant" => collections_remove_plant,
        "collections.set_thumbnail" => collections_set_thumbnail,
        "plants.create" => plants_create,
        "plants.get" => plants_get,
        "plants.list" => plants_list,
        "plants.add_image" => plants_add_image,
        "plants.set_main_image" => plants_set_main_image,
        "plants.images" => plants_images,
        "events.list" => events_list,
        _ => return None,
    };

    let response = match parse_user(params) {
        Ok(user) => match handler(store, &user, params) {
            Ok(result) => OpResponse::success(result),
            Err(err) => OpResponse::error(err),
        },
        Err(err) => OpResponse::error(err),
    };
    Some(response)
}

type Handler = fn(&mut SqliteStore, &UserId, &Value) -> Result<Value, OpError>;

fn parse_user(params: &Value) -> Result<UserId, OpError> {
    let Some(raw) = params.get("user").and_then(|v| v.as_str()) else {
        return Err(OpError::invalid_input("params.user is required"));
    };
    UserId::try_new(raw).map_err(|err| OpError::invalid_input(format!("invalid user id: {err:?}")))
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, OpError> {
    serde_json::from_value(params.clone())
        .map_err(|err| OpError::invalid_input(format!("invalid params: {err}")))
}

fn clamp_page(limit: Option<usize>, offset: Option<usize>) -> (usize, usize) {
    (
        limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT),
        offset.unwrap_or(0),
    )
}

// --- collections ---

#[derive(Deserialize)]
struct CollectionsCreateParams {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

fn collections_create(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: CollectionsCreateParams = parse_params(params)?;
    let collection = store
        .create_collection(
            user,
            CreateCollectionRequest { name: p.name, description: p.description },
        )
        .map_err(map_store_error)?;
    Ok(json!({ "collection": collection_value(&collection) }))
}

fn collections_edit(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let Some(collection_id) = params.get("collection").and_then(|v| v.as_str()) else {
        return Err(OpError::invalid_input("params.collection is required"));
    };
    let name = match params.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(v)) => Some(v.clone()),
        Some(_) => return Err(OpError::invalid_input("params.name must be a string")),
    };
    // Tri-state: absent keeps the description, null clears it.
    let description = match params.get("description") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(v)) => Some(Some(v.clone())),
        Some(_) => return Err(OpError::invalid_input("params.description must be a string or null")),
    };

    let collection = store
        .edit_collection(
            user,
            EditCollectionRequest {
                collection_id: collection_id.to_string(),
                name,
                description,
            },
        )
        .map_err(map_store_error)?;
    Ok(json!({ "collection": collection_value(&collection) }))
}

#[derive(Deserialize)]
struct CollectionParams {
    collection: String,
}

fn collections_delete(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: CollectionParams = parse_params(params)?;
    let moved = store
        .delete_collection(user, DeleteCollectionRequest { collection_id: p.collection })
        .map_err(map_store_error)?;
    Ok(json!({ "deleted": true, "plants_moved_to_uncategorized": moved }))
}

fn collections_get(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: CollectionParams = parse_params(params)?;
    let summary = store
        .get_collection(user, &p.collection)
        .map_err(map_store_error)?;
    Ok(json!({ "collection": collection_summary_value(&summary) }))
}

#[derive(Deserialize)]
struct PageParams {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

fn collections_list(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: PageParams = parse_params(params)?;
    let (limit, offset) = clamp_page(p.limit, p.offset);
    let collections = store
        .list_collections(user, ListCollectionsRequest { limit, offset })
        .map_err(map_store_error)?;
    Ok(json!({
        "collections": collections.iter().map(collection_summary_value).collect::<Vec<_>>(),
    }))
}

#[derive(Deserialize)]
struct MembershipParams {
    collection: String,
    plant: String,
}

fn collections_add_plant(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: MembershipParams = parse_params(params)?;
    let outcome = store
        .add_plant_to_collection(
            user,
            AddPlantRequest { collection_id: p.collection, plant_id: p.plant },
        )
        .map_err(map_store_error)?;
    Ok(add_outcome_value(&outcome))
}

fn collections_remove_plant(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: MembershipParams = parse_params(params)?;
    let outcome = store
        .remove_plant_from_collection(
            user,
            RemovePlantRequest { collection_id: p.collection, plant_id: p.plant },
        )
        .map_err(map_store_error)?;
    Ok(remove_outcome_value(&outcome))
}

fn collections_set_thumbnail(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let Some(collection_id) = params.get("collection").and_then(|v| v.as_str()) else {
        return Err(OpError::invalid_input("params.collection is required"));
    };
    let image_id = match params.get("image") {
        None | Some(Value::Null) => None,
        Some(Value::String(v)) => Some(v.clone()),
        Some(_) => return Err(OpError::invalid_input("params.image must be a string or null")),
    };

    let collection = store
        .set_collection_thumbnail(
            user,
            SetThumbnailRequest { collection_id: collection_id.to_string(), image_id },
        )
        .map_err(map_store_error)?;
    Ok(json!({ "collection": collection_value(&collection) }))
}

// --- plants ---

#[derive(Deserialize)]
struct PlantsCreateParams {
    collection: String,
    name: String,
    #[serde(default)]
    species: Option<String>,
}

fn plants_create(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: PlantsCreateParams = parse_params(params)?;
    let plant = store
        .create_plant(
            user,
            CreatePlantRequest { collection_id: p.collection, name: p.name, species: p.species },
        )
        .map_err(map_store_error)?;
    Ok(json!({ "plant": plant_value(&plant) }))
}

#[derive(Deserialize)]
struct PlantParams {
    plant: String,
}

fn plants_get(store: &mut SqliteStore, user: &UserId, params: &Value) -> Result<Value, OpError> {
    let p: PlantParams = parse_params(params)?;
    let plant = store.get_plant(user, &p.plant).map_err(map_store_error)?;
    Ok(json!({ "plant": plant_value(&plant) }))
}

#[derive(Deserialize)]
struct PlantsListParams {
    collection: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

fn plants_list(store: &mut SqliteStore, user: &UserId, params: &Value) -> Result<Value, OpError> {
    let p: PlantsListParams = parse_params(params)?;
    let (limit, offset) = clamp_page(p.limit, p.offset);
    let plants = store
        .list_plants(user, ListPlantsRequest { collection_id: p.collection, limit, offset })
        .map_err(map_store_error)?;
    Ok(json!({ "plants": plants.iter().map(plant_value).collect::<Vec<_>>() }))
}

#[derive(Deserialize)]
struct AddImageParams {
    plant: String,
    url: String,
    #[serde(default)]
    is_main: bool,
}

fn plants_add_image(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: AddImageParams = parse_params(params)?;
    let image = store
        .add_image(
            user,
            AddImageRequest { plant_id: p.plant, url: p.url, is_main: p.is_main },
        )
        .map_err(map_store_error)?;
    Ok(json!({ "image": image_value(&image) }))
}

#[derive(Deserialize)]
struct SetMainImageParams {
    plant: String,
    image: String,
}

fn plants_set_main_image(
    store: &mut SqliteStore,
    user: &UserId,
    params: &Value,
) -> Result<Value, OpError> {
    let p: SetMainImageParams = parse_params(params)?;
    let image = store
        .set_main_image(
            user,
            SetMainImageRequest { plant_id: p.plant, image_id: p.image },
        )
        .map_err(map_store_error)?;
    Ok(json!({ "image": image_value(&image) }))
}

fn plants_images(store: &mut SqliteStore, user: &UserId, params: &Value) -> Result<Value, OpError> {
    let p: PlantParams = parse_params(params)?;
    let images = store.list_images(user, &p.plant).map_err(map_store_error)?;
    Ok(json!({ "images": images.iter().map(image_value).collect::<Vec<_>>() }))
}

// --- events ---

#[derive(Deserialize)]
struct EventsListParams {
    #[serde(default)]
    since: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

fn events_list(store: &mut SqliteStore, user: &UserId, params: &Value) -> Result<Value, OpError> {
    let p: EventsListParams = parse_params(params)?;
    let limit = p.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
    let events = store
        .list_events(user, p.since.as_deref(), limit)
        .map_err(map_store_error)?;
    Ok(json!({ "events": events.iter().map(event_value).collect::<Vec<_>>() }))
}

// --- rendering ---

fn collection_value(collection: &Collection) -> Value {
    json!({
        "id": collection.id(),
        "owner": collection.owner(),
        "name": collection.name(),
        "slug": collection.slug(),
        "description": collection.description(),
        "thumbnail_image": collection.thumbnail_image_id(),
        "is_uncategorized": collection.is_uncategorized(),
        "created_at": ts_ms_to_rfc3339(collection.created_at_ms()),
        "updated_at": ts_ms_to_rfc3339(collection.updated_at_ms()),
    })
}

fn collection_summary_value(summary: &CollectionSummary) -> Value {
    let mut value = collection_value(&summary.collection);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("plant_count".to_string(), json!(summary.plant_count));
    }
    value
}

fn plant_value(plant: &Plant) -> Value {
    json!({
        "id": plant.id(),
        "owner": plant.owner(),
        "name": plant.name(),
        "species": plant.species(),
        "original_collection": plant.original_collection_id(),
        "created_at": ts_ms_to_rfc3339(plant.created_at_ms()),
        "updated_at": ts_ms_to_rfc3339(plant.updated_at_ms()),
    })
}

fn image_value(image: &Image) -> Value {
    json!({
        "id": image.id(),
        "plant": image.plant_id(),
        "url": image.url(),
        "is_main": image.is_main(),
        "created_at": ts_ms_to_rfc3339(image.created_at_ms()),
    })
}

fn event_value(event: &EventRow) -> Value {
    let payload: Value = serde_json::from_str(&event.payload_json).unwrap_or(Value::Null);
    json!({
        "id": event.event_id(),
        "type": event.event_type,
        "entity": event.entity_id,
        "payload": payload,
        "at": ts_ms_to_rfc3339(event.ts_ms),
    })
}

fn add_outcome_value(outcome: &AddPlantOutcome) -> Value {
    json!({
        "collection": collection_value(&outcome.collection),
        "attached": outcome.attached,
        "thumbnail_set": outcome.thumbnail_set,
    })
}

fn remove_outcome_value(outcome: &RemovePlantOutcome) -> Value {
    json!({
        "collection": collection_value(&outcome.collection),
        "moved_to_uncategorized": outcome.moved_to_uncategorized,
    })
}
