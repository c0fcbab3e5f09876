#![forbid(unsafe_code)]

use super::events::insert_event_tx;
use super::{
    AddPlantOutcome, AddPlantRequest, RemovePlantOutcome, RemovePlantRequest, SetThumbnailRequest,
    SqliteStore, StoreError, get_or_create_uncategorized_tx, load_collection_tx, load_image_tx,
    load_plant_tx, membership_exists_tx, now_ms, owned_collection_tx, owner_membership_count_tx,
    touch_collection_tx,
};
use fv_core::ids::UserId;
use fv_core::model::{Collection, Plant};
use rusqlite::{OptionalExtension, Transaction, params};
use serde_json::json;

impl SqliteStore {
    /// Attach a plant to a collection owned by `user`. Repeat calls are
    /// no-ops. A collection without a thumbnail adopts the plant's main
    /// image (or its first image) on attach.
    ///
    /// The plant need not be owned by `user`: a collection owner may
    /// share another user's plant into their own collection without
    /// moving ownership.
    pub fn add_plant_to_collection(
        &mut self,
        user: &UserId,
        request: AddPlantRequest,
    ) -> Result<AddPlantOutcome, StoreError> {
        let now_ms = now_ms();
        let tx = self.transaction()?;

        let collection = owned_collection_tx(&tx, user, &request.collection_id)?;
        let Some(plant) = load_plant_tx(&tx, &request.plant_id)? else {
            return Err(StoreError::PlantNotFound);
        };

        let attached = tx.execute(
            r#"
            INSERT OR IGNORE INTO collection_plants(collection_id, plant_id, added_at_ms)
            VALUES (?1, ?2, ?3)
            "#,
            params![collection.id(), plant.id(), now_ms],
        )? > 0;

        if attached && plant.owner() == user.as_str() && plant.original_collection_id().is_none() {
            tx.execute(
                "UPDATE plants SET original_collection_id = ?2, updated_at_ms = ?3 WHERE id = ?1",
                params![plant.id(), collection.id(), now_ms],
            )?;
        }

        let mut thumbnail_set = false;
        if collection.thumbnail_image_id().is_none() {
            if let Some(image_id) = display_image_tx(&tx, plant.id())? {
                tx.execute(
                    "UPDATE collections SET thumbnail_image_id = ?2, updated_at_ms = ?3 WHERE id = ?1",
                    params![collection.id(), image_id, now_ms],
                )?;
                thumbnail_set = true;
            }
        }
        if attached && !thumbnail_set {
            touch_collection_tx(&tx, collection.id(), now_ms)?;
        }

        if attached {
            insert_event_tx(
                &tx,
                user,
                now_ms,
                Some(collection.id()),
                "plant_added_to_collection",
                json!({ "plant": plant.id(), "thumbnail_set": thumbnail_set }),
            )?;
        }

        let updated = load_collection_tx(&tx, collection.id())?
            .ok_or(StoreError::InvalidInput("collection vanished mid-transaction"))?;

        tx.commit()?;
        Ok(AddPlantOutcome {
            collection: updated,
            attached,
            thumbnail_set,
        })
    }

    /// Detach a plant from a collection owned by `user`.
    ///
    /// An owned plant is never left without a collection: when the
    /// detached collection was its last membership among the owner's
    /// collections, the plant moves to the lazily created Uncategorized
    /// collection. When the detached collection is Uncategorized itself
    /// the call fails with [`StoreError::LastAlbum`] and nothing
    /// changes.
    pub fn remove_plant_from_collection(
        &mut self,
        user: &UserId,
        request: RemovePlantRequest,
    ) -> Result<RemovePlantOutcome, StoreError> {
        let now_ms = now_ms();
        let tx = self.transaction()?;

        let collection = owned_collection_tx(&tx, user, &request.collection_id)?;
        let Some(plant) = load_plant_tx(&tx, &request.plant_id)? else {
            return Err(StoreError::PlantNotFound);
        };
        if !membership_exists_tx(&tx, collection.id(), plant.id())? {
            return Err(StoreError::PlantNotInCollection);
        }

        let caller_owns_plant = plant.owner() == user.as_str();
        let mut moved_to_uncategorized = false;

        if caller_owns_plant
            && owner_membership_count_tx(&tx, plant.owner(), plant.id())? == 1
        {
            // Last membership: the plant must land somewhere.
            if collection.is_uncategorized() {
                return Err(StoreError::LastAlbum);
            }
            let uncategorized = get_or_create_uncategorized_tx(&tx, user, now_ms)?;
            tx.execute(
                "DELETE FROM collection_plants WHERE collection_id = ?1 AND plant_id = ?2",
                params![collection.id(), plant.id()],
            )?;
            tx.execute(
                r#"
                INSERT OR IGNORE INTO collection_plants(collection_id, plant_id, added_at_ms)
                VALUES (?1, ?2, ?3)
                "#,
                params![uncategorized.id(), plant.id(), now_ms],
            )?;
            moved_to_uncategorized = true;
        } else {
            tx.execute(
                "DELETE FROM collection_plants WHERE collection_id = ?1 AND plant_id = ?2",
                params![collection.id(), plant.id()],
            )?;
        }

        repoint_original_collection_tx(&tx, &plant, collection.id(), now_ms)?;
        clear_stale_thumbnail_tx(&tx, &collection, plant.id(), now_ms)?;
        touch_collection_tx(&tx, collection.id(), now_ms)?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(collection.id()),
            "plant_removed_from_collection",
            json!({ "plant": plant.id(), "moved_to_uncategorized": moved_to_uncategorized }),
        )?;

        let updated = load_collection_tx(&tx, collection.id())?
            .ok_or(StoreError::InvalidInput("collection vanished mid-transaction"))?;

        tx.commit()?;
        Ok(RemovePlantOutcome {
            collection: updated,
            moved_to_uncategorized,
        })
    }

    /// Set or clear the listing thumbnail. The image must belong to a
    /// plant currently in the collection; anything else reads as
    /// someone else's data.
    pub fn set_collection_thumbnail(
        &mut self,
        user: &UserId,
        request: SetThumbnailRequest,
    ) -> Result<Collection, StoreError> {
        let now_ms = now_ms();
        let tx = self.transaction()?;

        let collection = owned_collection_tx(&tx, user, &request.collection_id)?;

        if let Some(image_id) = &request.image_id {
            let Some(image) = load_image_tx(&tx, image_id)? else {
                return Err(StoreError::ImageNotFound);
            };
            if !membership_exists_tx(&tx, collection.id(), image.plant_id())? {
                return Err(StoreError::AccessDenied);
            }
        }

        tx.execute(
            "UPDATE collections SET thumbnail_image_id = ?2, updated_at_ms = ?3 WHERE id = ?1",
            params![collection.id(), request.image_id, now_ms],
        )?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(collection.id()),
            "collection_thumbnail_set",
            json!({ "image": request.image_id }),
        )?;

        let updated = load_collection_tx(&tx, collection.id())?
            .ok_or(StoreError::InvalidInput("collection vanished mid-transaction"))?;

        tx.commit()?;
        Ok(updated)
    }
}

/// The image a plant shows in listing views: its main image, falling
/// back to the oldest upload.
fn display_image_tx(tx: &Transaction<'_>, plant_id: &str) -> Result<Option<String>, StoreError> {
    Ok(tx
        .query_row(
            r#"
            SELECT id FROM images
            WHERE plant_id = ?1
            ORDER BY is_main DESC, created_at_ms ASC, id ASC
            LIMIT 1
            "#,
            params![plant_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

/// When the plant leaves the collection it was first added to, the
/// fallback pointer follows it to whichever of its owner's collections
/// still holds it. Collections the plant was merely shared into never
/// become the fallback.
fn repoint_original_collection_tx(
    tx: &Transaction<'_>,
    plant: &Plant,
    removed_collection_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    if plant.original_collection_id() != Some(removed_collection_id) {
        return Ok(());
    }
    tx.execute(
        r#"
        UPDATE plants
        SET original_collection_id = (
          SELECT cp.collection_id
          FROM collection_plants cp
          JOIN collections c ON c.id = cp.collection_id
          WHERE cp.plant_id = ?1 AND c.owner = plants.owner
          ORDER BY cp.added_at_ms ASC, cp.collection_id ASC
          LIMIT 1
        ),
        updated_at_ms = ?2
        WHERE id = ?1
        "#,
        params![plant.id(), now_ms],
    )?;
    Ok(())
}

/// A thumbnail must keep referencing one of the collection's plants'
/// images; clear it if it pointed at the plant that just left.
fn clear_stale_thumbnail_tx(
    tx: &Transaction<'_>,
    collection: &Collection,
    removed_plant_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    let Some(thumbnail_id) = collection.thumbnail_image_id() else {
        return Ok(());
    };
    let belongs: bool = tx
        .query_row(
            "SELECT 1 FROM images WHERE id = ?1 AND plant_id = ?2",
            params![thumbnail_id, removed_plant_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !belongs {
        return Ok(());
    }
    tx.execute(
        "UPDATE collections SET thumbnail_image_id = NULL, updated_at_ms = ?2 WHERE id = ?1",
        params![collection.id(), now_ms],
    )?;
    Ok(())
}
