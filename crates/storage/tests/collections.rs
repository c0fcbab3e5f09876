#![forbid(unsafe_code)]

use fv_core::ids::UserId;
use fv_storage::{
    AddPlantRequest, CreateCollectionRequest, CreatePlantRequest, DeleteCollectionRequest,
    EditCollectionRequest, ListCollectionsRequest, ListPlantsRequest, SqliteStore, StoreError,
};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("fv_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn user(name: &str) -> UserId {
    UserId::try_new(name).expect("user id")
}

#[test]
fn slugs_deduplicate_per_user() {
    let mut store = SqliteStore::open(temp_dir("slug_dedupe")).expect("open store");
    let alice = user("alice");
    let bob = user("bob");

    let first = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "My Garden".to_string(), description: None },
        )
        .expect("first");
    let second = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "My Garden".to_string(), description: None },
        )
        .expect("second");
    assert_eq!(first.slug(), "my-garden");
    assert_eq!(second.slug(), "my-garden-2");

    // Uniqueness is scoped to the owner: bob gets the plain slug too.
    let bobs = store
        .create_collection(
            &bob,
            CreateCollectionRequest { name: "My Garden".to_string(), description: None },
        )
        .expect("bob's");
    assert_eq!(bobs.slug(), "my-garden");
}

#[test]
fn uncategorized_slug_is_reserved() {
    let mut store = SqliteStore::open(temp_dir("slug_reserved")).expect("open store");
    let alice = user("alice");

    let named = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "Uncategorized".to_string(), description: None },
        )
        .expect("create");
    assert_eq!(named.slug(), "uncategorized-2");
    assert!(!named.is_uncategorized());
}

#[test]
fn create_rejects_unsluggable_names() {
    let mut store = SqliteStore::open(temp_dir("bad_name")).expect("open store");
    let alice = user("alice");

    let err = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "!!!".to_string(), description: None },
        )
        .expect_err("expected InvalidInput");
    assert!(matches!(err, StoreError::InvalidInput(_)), "unexpected error: {err:?}");
}

#[test]
fn edit_renames_without_changing_slug() {
    let mut store = SqliteStore::open(temp_dir("edit_rename")).expect("open store");
    let alice = user("alice");

    let collection = store
        .create_collection(
            &alice,
            CreateCollectionRequest {
                name: "Herbs".to_string(),
                description: Some("kitchen window".to_string()),
            },
        )
        .expect("create");

    let updated = store
        .edit_collection(
            &alice,
            EditCollectionRequest {
                collection_id: collection.id().to_string(),
                name: Some("Kitchen Herbs".to_string()),
                description: Some(None),
            },
        )
        .expect("edit");
    assert_eq!(updated.name(), "Kitchen Herbs");
    assert_eq!(updated.slug(), "herbs");
    assert_eq!(updated.description(), None);

    let err = store
        .edit_collection(
            &alice,
            EditCollectionRequest {
                collection_id: collection.id().to_string(),
                name: None,
                description: None,
            },
        )
        .expect_err("expected InvalidInput for empty edit");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn delete_moves_orphaned_plants_to_uncategorized() {
    let mut store = SqliteStore::open(temp_dir("delete_orphans")).expect("open store");
    let alice = user("alice");

    let doomed = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "Doomed".to_string(), description: None },
        )
        .expect("create doomed");
    let plant = store
        .create_plant(
            &alice,
            CreatePlantRequest {
                collection_id: doomed.id().to_string(),
                name: "Fern".to_string(),
                species: None,
            },
        )
        .expect("create plant");

    let moved = store
        .delete_collection(
            &alice,
            DeleteCollectionRequest { collection_id: doomed.id().to_string() },
        )
        .expect("delete");
    assert_eq!(moved, 1);

    let collections = store
        .list_collections(&alice, ListCollectionsRequest { limit: 10, offset: 0 })
        .expect("list");
    assert_eq!(collections.len(), 1);
    let uncategorized = &collections[0];
    assert!(uncategorized.collection.is_uncategorized());
    assert_eq!(uncategorized.plant_count, 1);

    let plant = store.get_plant(&alice, plant.id()).expect("get plant");
    assert_eq!(plant.original_collection_id(), Some(uncategorized.collection.id()));

    let members = store
        .list_plants(
            &alice,
            ListPlantsRequest {
                collection_id: uncategorized.collection.id().to_string(),
                limit: 10,
                offset: 0,
            },
        )
        .expect("list plants");
    assert_eq!(members.len(), 1);
}

#[test]
fn delete_repoints_fallback_within_owner_collections() {
    let mut store = SqliteStore::open(temp_dir("delete_foreign_fallback")).expect("open store");
    let alice = user("alice");
    let bob = user("bob");

    let doomed = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "Doomed".to_string(), description: None },
        )
        .expect("create doomed");
    let plant = store
        .create_plant(
            &alice,
            CreatePlantRequest {
                collection_id: doomed.id().to_string(),
                name: "Fern".to_string(),
                species: None,
            },
        )
        .expect("create plant");

    // The plant is also shared into bob's collection before the delete.
    let bobs = store
        .create_collection(
            &bob,
            CreateCollectionRequest { name: "Clippings".to_string(), description: None },
        )
        .expect("create bob collection");
    store
        .add_plant_to_collection(
            &bob,
            AddPlantRequest {
                collection_id: bobs.id().to_string(),
                plant_id: plant.id().to_string(),
            },
        )
        .expect("share plant");

    let moved = store
        .delete_collection(
            &alice,
            DeleteCollectionRequest { collection_id: doomed.id().to_string() },
        )
        .expect("delete");
    assert_eq!(moved, 1);

    let collections = store
        .list_collections(&alice, ListCollectionsRequest { limit: 10, offset: 0 })
        .expect("list");
    let uncategorized = collections
        .iter()
        .find(|c| c.collection.is_uncategorized())
        .expect("uncategorized exists");

    // The fallback pointer follows the plant to alice's Uncategorized,
    // never to bob's collection.
    let plant = store.get_plant(&alice, plant.id()).expect("get plant");
    assert_eq!(
        plant.original_collection_id(),
        Some(uncategorized.collection.id())
    );
}

#[test]
fn uncategorized_cannot_be_deleted() {
    let mut store = SqliteStore::open(temp_dir("delete_uncategorized")).expect("open store");
    let alice = user("alice");

    let a = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "Only".to_string(), description: None },
        )
        .expect("create");
    let plant = store
        .create_plant(
            &alice,
            CreatePlantRequest {
                collection_id: a.id().to_string(),
                name: "Ivy".to_string(),
                species: None,
            },
        )
        .expect("create plant");
    store
        .remove_plant_from_collection(
            &alice,
            fv_storage::RemovePlantRequest {
                collection_id: a.id().to_string(),
                plant_id: plant.id().to_string(),
            },
        )
        .expect("remove to spawn uncategorized");

    let collections = store
        .list_collections(&alice, ListCollectionsRequest { limit: 10, offset: 0 })
        .expect("list");
    let uncategorized = collections
        .iter()
        .find(|c| c.collection.is_uncategorized())
        .expect("uncategorized exists");

    let err = store
        .delete_collection(
            &alice,
            DeleteCollectionRequest {
                collection_id: uncategorized.collection.id().to_string(),
            },
        )
        .expect_err("expected InvalidInput");
    assert!(matches!(err, StoreError::InvalidInput(_)), "unexpected error: {err:?}");
}

#[test]
fn get_collection_guards_ownership() {
    let mut store = SqliteStore::open(temp_dir("get_guard")).expect("open store");
    let alice = user("alice");
    let bob = user("bob");

    let a = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "Private".to_string(), description: None },
        )
        .expect("create");

    let summary = store.get_collection(&alice, a.id()).expect("owner can read");
    assert_eq!(summary.plant_count, 0);

    let err = store
        .get_collection(&bob, a.id())
        .expect_err("expected AccessDenied");
    assert!(matches!(err, StoreError::AccessDenied));

    let err = store
        .get_collection(&alice, "col-9999")
        .expect_err("expected AccessDenied for missing id");
    assert!(matches!(err, StoreError::AccessDenied));
}

#[test]
fn events_record_collection_lifecycle() {
    let mut store = SqliteStore::open(temp_dir("events_tail")).expect("open store");
    let alice = user("alice");

    let a = store
        .create_collection(
            &alice,
            CreateCollectionRequest { name: "Log Me".to_string(), description: None },
        )
        .expect("create");
    store
        .create_plant(
            &alice,
            CreatePlantRequest {
                collection_id: a.id().to_string(),
                name: "Cactus".to_string(),
                species: None,
            },
        )
        .expect("create plant");

    let events = store.list_events(&alice, None, 10).expect("list events");
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["collection_created", "plant_created"]);

    // Tail resumes after the given event id.
    let since = events[0].event_id();
    let rest = store
        .list_events(&alice, Some(&since), 10)
        .expect("list since");
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].event_type, "plant_created");
}
