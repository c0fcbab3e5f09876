#![forbid(unsafe_code)]

use super::events::insert_event_tx;
use super::{
    CollectionSummary, CreateCollectionRequest, DeleteCollectionRequest, EditCollectionRequest,
    ListCollectionsRequest, SqliteStore, StoreError, collection_from_tuple, collection_row_tuple,
    ensure_user_tx, get_or_create_uncategorized_tx, mint_id_tx, now_ms, owned_collection_tx,
    owner_membership_count_tx, to_sqlite_i64,
};
use fv_core::ids::UserId;
use fv_core::model::{Collection, EntityKind};
use fv_core::slug::{MAX_SLUG_LEN, UNCATEGORIZED_SLUG, slugify};
use rusqlite::{OptionalExtension, Transaction, params};
use serde_json::json;

impl SqliteStore {
    pub fn create_collection(
        &mut self,
        user: &UserId,
        request: CreateCollectionRequest,
    ) -> Result<Collection, StoreError> {
        let base = slugify(&request.name)
            .ok_or(StoreError::InvalidInput("collection name must contain letters or digits"))?;

        let now_ms = now_ms();
        let tx = self.transaction()?;
        ensure_user_tx(&tx, user, now_ms)?;

        let slug = allocate_slug_tx(&tx, user, &base)?;
        let id = mint_id_tx(&tx, EntityKind::Collection)?;

        let collection = Collection::try_new(
            user.as_str().to_string(),
            id,
            request.name,
            slug,
            request.description,
            None,
            now_ms,
            now_ms,
        )
        .map_err(|_| StoreError::InvalidInput("invalid collection payload"))?;

        tx.execute(
            r#"
            INSERT INTO collections(id, owner, name, slug, description, thumbnail_image_id, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)
            "#,
            params![
                collection.id(),
                collection.owner(),
                collection.name(),
                collection.slug(),
                collection.description(),
                now_ms,
            ],
        )?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(collection.id()),
            "collection_created",
            json!({ "name": collection.name(), "slug": collection.slug() }),
        )?;

        tx.commit()?;
        Ok(collection)
    }

    pub fn edit_collection(
        &mut self,
        user: &UserId,
        request: EditCollectionRequest,
    ) -> Result<Collection, StoreError> {
        if request.name.is_none() && request.description.is_none() {
            return Err(StoreError::InvalidInput("no fields to edit"));
        }

        let now_ms = now_ms();
        let tx = self.transaction()?;
        let current = owned_collection_tx(&tx, user, &request.collection_id)?;

        // Renames keep the slug stable so saved links stay valid.
        let new_name = request.name.unwrap_or_else(|| current.name().to_string());
        let new_description = match request.description {
            Some(value) => value,
            None => current.description().map(str::to_string),
        };

        let updated = Collection::try_new(
            current.owner().to_string(),
            current.id().to_string(),
            new_name,
            current.slug().to_string(),
            new_description,
            current.thumbnail_image_id().map(str::to_string),
            current.created_at_ms(),
            now_ms,
        )
        .map_err(|_| StoreError::InvalidInput("invalid collection payload"))?;

        tx.execute(
            r#"
            UPDATE collections
            SET name = ?2, description = ?3, updated_at_ms = ?4
            WHERE id = ?1
            "#,
            params![updated.id(), updated.name(), updated.description(), now_ms],
        )?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(updated.id()),
            "collection_edited",
            json!({ "name": updated.name() }),
        )?;

        tx.commit()?;
        Ok(updated)
    }

    /// Deletes a collection. Owned plants that would be left without a
    /// collection are moved to the user's Uncategorized collection;
    /// shared plants are only detached. The Uncategorized collection
    /// itself cannot be deleted.
    pub fn delete_collection(
        &mut self,
        user: &UserId,
        request: DeleteCollectionRequest,
    ) -> Result<usize, StoreError> {
        let now_ms = now_ms();
        let tx = self.transaction()?;
        let collection = owned_collection_tx(&tx, user, &request.collection_id)?;
        if collection.is_uncategorized() {
            return Err(StoreError::InvalidInput("the uncategorized collection cannot be deleted"));
        }

        let members: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT p.id, p.owner
                FROM collection_plants cp
                JOIN plants p ON p.id = cp.plant_id
                WHERE cp.collection_id = ?1
                ORDER BY cp.added_at_ms ASC, p.id ASC
                "#,
            )?;
            let rows = stmt.query_map(params![collection.id()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut moved = 0usize;
        for (plant_id, owner) in &members {
            tx.execute(
                "DELETE FROM collection_plants WHERE collection_id = ?1 AND plant_id = ?2",
                params![collection.id(), plant_id],
            )?;
            if owner != user.as_str() {
                continue;
            }
            if owner_membership_count_tx(&tx, owner, plant_id)? == 0 {
                let uncategorized = get_or_create_uncategorized_tx(&tx, user, now_ms)?;
                tx.execute(
                    r#"
                    INSERT OR IGNORE INTO collection_plants(collection_id, plant_id, added_at_ms)
                    VALUES (?1, ?2, ?3)
                    "#,
                    params![uncategorized.id(), plant_id, now_ms],
                )?;
                moved += 1;
            }
        }

        // Plants that were first added here fall back to one of their
        // owner's collections that still holds them; shared-into
        // collections of other users do not qualify.
        tx.execute(
            r#"
            UPDATE plants
            SET original_collection_id = (
              SELECT cp.collection_id
              FROM collection_plants cp
              JOIN collections c ON c.id = cp.collection_id
              WHERE cp.plant_id = plants.id AND c.owner = plants.owner
              ORDER BY cp.added_at_ms ASC, cp.collection_id ASC
              LIMIT 1
            )
            WHERE original_collection_id = ?1
            "#,
            params![collection.id()],
        )?;

        tx.execute("DELETE FROM collections WHERE id = ?1", params![collection.id()])?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(collection.id()),
            "collection_deleted",
            json!({ "slug": collection.slug(), "plants_moved": moved }),
        )?;

        tx.commit()?;
        Ok(moved)
    }

    pub fn get_collection(
        &self,
        user: &UserId,
        collection_id: &str,
    ) -> Result<CollectionSummary, StoreError> {
        let row = self
            .conn()
            .query_row(
                r#"
                SELECT owner, id, name, slug, description, thumbnail_image_id, created_at_ms, updated_at_ms,
                       (SELECT COUNT(*) FROM collection_plants cp WHERE cp.collection_id = collections.id)
                FROM collections
                WHERE id = ?1
                "#,
                params![collection_id],
                |row| {
                    Ok((
                        collection_row_tuple(row)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()?;
        let Some((tuple, plant_count)) = row else {
            return Err(StoreError::AccessDenied);
        };
        let collection = collection_from_tuple(tuple)?;
        if collection.owner() != user.as_str() {
            return Err(StoreError::AccessDenied);
        }
        Ok(CollectionSummary { collection, plant_count })
    }

    pub fn list_collections(
        &self,
        user: &UserId,
        request: ListCollectionsRequest,
    ) -> Result<Vec<CollectionSummary>, StoreError> {
        let limit = to_sqlite_i64(request.limit)?;
        let offset = to_sqlite_i64(request.offset)?;

        let mut stmt = self.conn().prepare(
            r#"
            SELECT owner, id, name, slug, description, thumbnail_image_id, created_at_ms, updated_at_ms,
                   (SELECT COUNT(*) FROM collection_plants cp WHERE cp.collection_id = collections.id)
            FROM collections
            WHERE owner = ?1
            ORDER BY created_at_ms ASC, id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(params![user.as_str(), limit, offset], |row| {
            Ok((collection_row_tuple(row)?, row.get::<_, i64>(8)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (tuple, plant_count) = row?;
            out.push(CollectionSummary {
                collection: collection_from_tuple(tuple)?,
                plant_count,
            });
        }
        Ok(out)
    }
}

/// Picks the first free slug for this owner: the slugified name, then
/// `-2`, `-3`, … suffixes. The uncategorized slug is reserved for the
/// auto-created fallback collection.
fn allocate_slug_tx(
    tx: &Transaction<'_>,
    user: &UserId,
    base: &str,
) -> Result<String, StoreError> {
    let mut n = 1usize;
    loop {
        let candidate = slug_candidate(base, n);
        let reserved = candidate == UNCATEGORIZED_SLUG;
        if !reserved && !slug_taken_tx(tx, user, &candidate)? {
            return Ok(candidate);
        }
        n += 1;
        if n > 10_000 {
            return Err(StoreError::InvalidInput("could not allocate a unique slug"));
        }
    }
}

fn slug_taken_tx(tx: &Transaction<'_>, user: &UserId, slug: &str) -> Result<bool, StoreError> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM collections WHERE owner = ?1 AND slug = ?2",
            params![user.as_str(), slug],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn slug_candidate(base: &str, n: usize) -> String {
    if n <= 1 {
        return base.to_string();
    }
    // Slugify output is ASCII, so byte truncation is safe here.
    let suffix = format!("-{n}");
    let keep = MAX_SLUG_LEN.saturating_sub(suffix.len());
    let mut trimmed = base[..base.len().min(keep)].to_string();
    while trimmed.ends_with('-') {
        trimmed.pop();
    }
    format!("{trimmed}{suffix}")
}
