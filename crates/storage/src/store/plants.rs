#![forbid(unsafe_code)]

use super::events::insert_event_tx;
use super::{
    AddImageRequest, CreatePlantRequest, ListPlantsRequest, SetMainImageRequest, SqliteStore,
    StoreError, ensure_user_tx, load_image_tx, load_plant_tx, mint_id_tx, now_ms,
    owned_collection_tx, to_sqlite_i64,
};
use fv_core::ids::UserId;
use fv_core::model::{EntityKind, Image, Plant};
use rusqlite::{OptionalExtension, params};
use serde_json::json;

impl SqliteStore {
    /// A plant is born into a collection owned by its owner, so it is
    /// never without a collection. The birth collection becomes its
    /// `original_collection_id`.
    pub fn create_plant(
        &mut self,
        user: &UserId,
        request: CreatePlantRequest,
    ) -> Result<Plant, StoreError> {
        let now_ms = now_ms();
        let tx = self.transaction()?;
        ensure_user_tx(&tx, user, now_ms)?;

        let collection = owned_collection_tx(&tx, user, &request.collection_id)?;
        let id = mint_id_tx(&tx, EntityKind::Plant)?;

        let plant = Plant::try_new(
            user.as_str().to_string(),
            id,
            request.name,
            request.species,
            Some(collection.id().to_string()),
            now_ms,
            now_ms,
        )
        .map_err(|_| StoreError::InvalidInput("invalid plant payload"))?;

        tx.execute(
            r#"
            INSERT INTO plants(id, owner, name, species, original_collection_id, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                plant.id(),
                plant.owner(),
                plant.name(),
                plant.species(),
                plant.original_collection_id(),
                now_ms,
            ],
        )?;
        tx.execute(
            r#"
            INSERT INTO collection_plants(collection_id, plant_id, added_at_ms)
            VALUES (?1, ?2, ?3)
            "#,
            params![collection.id(), plant.id(), now_ms],
        )?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(plant.id()),
            "plant_created",
            json!({ "name": plant.name(), "collection": collection.id() }),
        )?;

        tx.commit()?;
        Ok(plant)
    }

    /// The first image of a plant becomes its main image; a later
    /// `is_main` upload demotes the previous main in the same
    /// transaction.
    pub fn add_image(
        &mut self,
        user: &UserId,
        request: AddImageRequest,
    ) -> Result<Image, StoreError> {
        if request.url.trim().is_empty() {
            return Err(StoreError::InvalidInput("image url must not be empty"));
        }

        let now_ms = now_ms();
        let tx = self.transaction()?;

        let Some(plant) = load_plant_tx(&tx, &request.plant_id)? else {
            return Err(StoreError::PlantNotFound);
        };
        if plant.owner() != user.as_str() {
            return Err(StoreError::AccessDenied);
        }

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM images WHERE plant_id = ?1",
            params![plant.id()],
            |row| row.get(0),
        )?;
        let is_main = request.is_main || existing == 0;
        if is_main {
            tx.execute(
                "UPDATE images SET is_main = 0 WHERE plant_id = ?1",
                params![plant.id()],
            )?;
        }

        let id = mint_id_tx(&tx, EntityKind::Image)?;
        let image = Image::try_new(id, plant.id().to_string(), request.url, is_main, now_ms)
            .map_err(|_| StoreError::InvalidInput("invalid image payload"))?;

        tx.execute(
            r#"
            INSERT INTO images(id, plant_id, url, is_main, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                image.id(),
                image.plant_id(),
                image.url(),
                image.is_main() as i64,
                now_ms,
            ],
        )?;
        tx.execute(
            "UPDATE plants SET updated_at_ms = ?2 WHERE id = ?1",
            params![plant.id(), now_ms],
        )?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(plant.id()),
            "image_added",
            json!({ "image": image.id(), "is_main": image.is_main() }),
        )?;

        tx.commit()?;
        Ok(image)
    }

    /// Atomic flip: exactly one image per plant carries the main flag
    /// afterwards.
    pub fn set_main_image(
        &mut self,
        user: &UserId,
        request: SetMainImageRequest,
    ) -> Result<Image, StoreError> {
        let now_ms = now_ms();
        let tx = self.transaction()?;

        let Some(plant) = load_plant_tx(&tx, &request.plant_id)? else {
            return Err(StoreError::PlantNotFound);
        };
        if plant.owner() != user.as_str() {
            return Err(StoreError::AccessDenied);
        }
        let Some(image) = load_image_tx(&tx, &request.image_id)? else {
            return Err(StoreError::ImageNotFound);
        };
        if image.plant_id() != plant.id() {
            return Err(StoreError::ImageNotFound);
        }

        tx.execute(
            "UPDATE images SET is_main = (id = ?2) WHERE plant_id = ?1",
            params![plant.id(), image.id()],
        )?;
        tx.execute(
            "UPDATE plants SET updated_at_ms = ?2 WHERE id = ?1",
            params![plant.id(), now_ms],
        )?;

        insert_event_tx(
            &tx,
            user,
            now_ms,
            Some(plant.id()),
            "main_image_set",
            json!({ "image": image.id() }),
        )?;

        tx.commit()?;

        Image::try_new(
            image.id().to_string(),
            image.plant_id().to_string(),
            image.url().to_string(),
            true,
            image.created_at_ms(),
        )
        .map_err(|_| StoreError::InvalidInput("invalid image row"))
    }

    pub fn get_plant(&self, user: &UserId, plant_id: &str) -> Result<Plant, StoreError> {
        let row = self
            .conn()
            .query_row(
                r#"
                SELECT owner, id, name, species, original_collection_id, created_at_ms, updated_at_ms
                FROM plants
                WHERE id = ?1
                "#,
                params![plant_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((owner, id, name, species, original, created, updated)) = row else {
            return Err(StoreError::PlantNotFound);
        };
        let plant = Plant::try_new(owner, id, name, species, original, created, updated)
            .map_err(|_| StoreError::InvalidInput("invalid plant row"))?;
        if !self.plant_visible_to(user, plant.id(), plant.owner())? {
            return Err(StoreError::AccessDenied);
        }
        Ok(plant)
    }

    pub fn list_plants(
        &self,
        user: &UserId,
        request: ListPlantsRequest,
    ) -> Result<Vec<Plant>, StoreError> {
        let owner: Option<String> = self
            .conn()
            .query_row(
                "SELECT owner FROM collections WHERE id = ?1",
                params![request.collection_id],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            Some(owner) if owner == user.as_str() => {}
            _ => return Err(StoreError::AccessDenied),
        }

        let limit = to_sqlite_i64(request.limit)?;
        let offset = to_sqlite_i64(request.offset)?;

        let mut stmt = self.conn().prepare(
            r#"
            SELECT p.owner, p.id, p.name, p.species, p.original_collection_id, p.created_at_ms, p.updated_at_ms
            FROM collection_plants cp
            JOIN plants p ON p.id = cp.plant_id
            WHERE cp.collection_id = ?1
            ORDER BY cp.added_at_ms ASC, p.id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(params![request.collection_id, limit, offset], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (owner, id, name, species, original, created, updated) = row?;
            out.push(
                Plant::try_new(owner, id, name, species, original, created, updated)
                    .map_err(|_| StoreError::InvalidInput("invalid plant row"))?,
            );
        }
        Ok(out)
    }

    pub fn list_images(&self, user: &UserId, plant_id: &str) -> Result<Vec<Image>, StoreError> {
        let owner: Option<String> = self
            .conn()
            .query_row(
                "SELECT owner FROM plants WHERE id = ?1",
                params![plant_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(owner) = owner else {
            return Err(StoreError::PlantNotFound);
        };
        if !self.plant_visible_to(user, plant_id, &owner)? {
            return Err(StoreError::AccessDenied);
        }

        let mut stmt = self.conn().prepare(
            r#"
            SELECT id, plant_id, url, is_main, created_at_ms
            FROM images
            WHERE plant_id = ?1
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![plant_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, plant, url, is_main, created) = row?;
            out.push(
                Image::try_new(id, plant, url, is_main != 0, created)
                    .map_err(|_| StoreError::InvalidInput("invalid image row"))?,
            );
        }
        Ok(out)
    }

    /// A plant is visible to its owner and to anyone whose collection it
    /// has been shared into.
    fn plant_visible_to(
        &self,
        user: &UserId,
        plant_id: &str,
        owner: &str,
    ) -> Result<bool, StoreError> {
        if owner == user.as_str() {
            return Ok(true);
        }
        Ok(self
            .conn()
            .query_row(
                r#"
                SELECT 1
                FROM collection_plants cp
                JOIN collections c ON c.id = cp.collection_id
                WHERE cp.plant_id = ?1 AND c.owner = ?2
                LIMIT 1
                "#,
                params![plant_id, user.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }
}
