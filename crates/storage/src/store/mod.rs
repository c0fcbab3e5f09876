#![forbid(unsafe_code)]

mod collections;
mod error;
mod events;
mod membership;
mod plants;
mod requests;

pub use error::StoreError;
pub use events::EventRow;
pub use requests::*;

use fv_core::ids::UserId;
use fv_core::model::{Collection, EntityKind, Image, Plant};
use fv_core::slug::{UNCATEGORIZED_NAME, UNCATEGORIZED_SLUG};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_VERSION: &str = "v1";

/// A collection plus the number of plants currently in it, for listing
/// views.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionSummary {
    pub collection: Collection,
    pub plant_count: i64,
}

/// Outcome of [`SqliteStore::add_plant_to_collection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddPlantOutcome {
    pub collection: Collection,
    /// True when the call was the first to attach this plant (repeat
    /// calls are no-ops).
    pub attached: bool,
    /// True when the collection had no thumbnail and one of the plant's
    /// images was promoted.
    pub thumbnail_set: bool,
}

/// Outcome of [`SqliteStore::remove_plant_from_collection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovePlantOutcome {
    pub collection: Collection,
    pub moved_to_uncategorized: bool,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join("floralvault.db");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;

        install_schema(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn transaction(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self.conn.transaction()?)
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
          id TEXT PRIMARY KEY,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          name TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collections (
          id TEXT PRIMARY KEY,
          owner TEXT NOT NULL REFERENCES users(id),
          name TEXT NOT NULL,
          slug TEXT NOT NULL,
          description TEXT,
          thumbnail_image_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          UNIQUE(owner, slug)
        );

        CREATE TABLE IF NOT EXISTS plants (
          id TEXT PRIMARY KEY,
          owner TEXT NOT NULL REFERENCES users(id),
          name TEXT NOT NULL,
          species TEXT,
          original_collection_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS images (
          id TEXT PRIMARY KEY,
          plant_id TEXT NOT NULL REFERENCES plants(id),
          url TEXT NOT NULL,
          is_main INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collection_plants (
          collection_id TEXT NOT NULL REFERENCES collections(id),
          plant_id TEXT NOT NULL REFERENCES plants(id),
          added_at_ms INTEGER NOT NULL,
          PRIMARY KEY (collection_id, plant_id)
        );

        CREATE TABLE IF NOT EXISTS events (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          user TEXT NOT NULL,
          ts_ms INTEGER NOT NULL,
          entity_id TEXT,
          type TEXT NOT NULL,
          payload_json TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner, created_at_ms);
        CREATE INDEX IF NOT EXISTS idx_collection_plants_plant ON collection_plants(plant_id);
        CREATE INDEX IF NOT EXISTS idx_images_plant ON images(plant_id, created_at_ms);
        CREATE INDEX IF NOT EXISTS idx_events_user_seq ON events(user, seq);
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;
    Ok(())
}

pub(crate) fn now_ms() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_millis() as i64
}

pub(crate) fn ensure_user_tx(
    tx: &Transaction<'_>,
    user: &UserId,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO users(id, created_at_ms) VALUES (?1, ?2)",
        params![user.as_str(), now_ms],
    )?;
    Ok(())
}

fn next_counter_tx(tx: &Transaction<'_>, name: &str) -> Result<i64, StoreError> {
    let current: i64 = tx
        .query_row(
            "SELECT value FROM counters WHERE name=?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    tx.execute(
        r#"
        INSERT INTO counters(name, value) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET value=excluded.value
        "#,
        params![name, next],
    )?;
    Ok(next)
}

pub(crate) fn mint_id_tx(tx: &Transaction<'_>, kind: EntityKind) -> Result<String, StoreError> {
    let seq = next_counter_tx(tx, kind.as_str())?;
    Ok(format!("{}-{:04}", kind.id_prefix(), seq))
}

pub(crate) fn load_collection_tx(
    tx: &Transaction<'_>,
    collection_id: &str,
) -> Result<Option<Collection>, StoreError> {
    collection_from_row_query(
        tx.query_row(
            r#"
            SELECT owner, id, name, slug, description, thumbnail_image_id, created_at_ms, updated_at_ms
            FROM collections
            WHERE id = ?1
            "#,
            params![collection_id],
            collection_row_tuple,
        )
        .optional()?,
    )
}

/// Loads a collection and enforces the ownership guard: a missing
/// collection and a foreign collection are indistinguishable to the
/// caller (both `AccessDenied`).
pub(crate) fn owned_collection_tx(
    tx: &Transaction<'_>,
    user: &UserId,
    collection_id: &str,
) -> Result<Collection, StoreError> {
    let Some(collection) = load_collection_tx(tx, collection_id)? else {
        return Err(StoreError::AccessDenied);
    };
    if collection.owner() != user.as_str() {
        return Err(StoreError::AccessDenied);
    }
    Ok(collection)
}

pub(crate) type CollectionTuple = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

pub(crate) fn collection_row_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<CollectionTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn collection_from_row_query(
    row: Option<CollectionTuple>,
) -> Result<Option<Collection>, StoreError> {
    let Some((owner, id, name, slug, description, thumbnail, created, updated)) = row else {
        return Ok(None);
    };
    Ok(Some(
        Collection::try_new(owner, id, name, slug, description, thumbnail, created, updated)
            .map_err(|_| StoreError::InvalidInput("invalid collection row"))?,
    ))
}

pub(crate) fn collection_from_tuple(row: CollectionTuple) -> Result<Collection, StoreError> {
    let (owner, id, name, slug, description, thumbnail, created, updated) = row;
    Collection::try_new(owner, id, name, slug, description, thumbnail, created, updated)
        .map_err(|_| StoreError::InvalidInput("invalid collection row"))
}

pub(crate) fn load_plant_tx(
    tx: &Transaction<'_>,
    plant_id: &str,
) -> Result<Option<Plant>, StoreError> {
    let row = tx
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
        return Ok(None);
    };
    Ok(Some(
        Plant::try_new(owner, id, name, species, original, created, updated)
            .map_err(|_| StoreError::InvalidInput("invalid plant row"))?,
    ))
}

pub(crate) fn load_image_tx(
    tx: &Transaction<'_>,
    image_id: &str,
) -> Result<Option<Image>, StoreError> {
    let row = tx
        .query_row(
            "SELECT id, plant_id, url, is_main, created_at_ms FROM images WHERE id = ?1",
            params![image_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((id, plant_id, url, is_main, created)) = row else {
        return Ok(None);
    };
    Ok(Some(
        Image::try_new(id, plant_id, url, is_main != 0, created)
            .map_err(|_| StoreError::InvalidInput("invalid image row"))?,
    ))
}

pub(crate) fn membership_exists_tx(
    tx: &Transaction<'_>,
    collection_id: &str,
    plant_id: &str,
) -> Result<bool, StoreError> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM collection_plants WHERE collection_id=?1 AND plant_id=?2",
            params![collection_id, plant_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// How many collections owned by `owner` currently contain the plant.
pub(crate) fn owner_membership_count_tx(
    tx: &Transaction<'_>,
    owner: &str,
    plant_id: &str,
) -> Result<i64, StoreError> {
    Ok(tx.query_row(
        r#"
        SELECT COUNT(*)
        FROM collection_plants cp
        JOIN collections c ON c.id = cp.collection_id
        WHERE cp.plant_id = ?1 AND c.owner = ?2
        "#,
        params![plant_id, owner],
        |row| row.get(0),
    )?)
}

/// Lazily creates the per-user fallback collection. It is never deleted.
pub(crate) fn get_or_create_uncategorized_tx(
    tx: &Transaction<'_>,
    user: &UserId,
    now_ms: i64,
) -> Result<Collection, StoreError> {
    let existing = collection_from_row_query(
        tx.query_row(
            r#"
            SELECT owner, id, name, slug, description, thumbnail_image_id, created_at_ms, updated_at_ms
            FROM collections
            WHERE owner = ?1 AND slug = ?2
            "#,
            params![user.as_str(), UNCATEGORIZED_SLUG],
            collection_row_tuple,
        )
        .optional()?,
    )?;
    if let Some(collection) = existing {
        return Ok(collection);
    }

    ensure_user_tx(tx, user, now_ms)?;
    let id = mint_id_tx(tx, EntityKind::Collection)?;
    tx.execute(
        r#"
        INSERT INTO collections(id, owner, name, slug, description, thumbnail_image_id, created_at_ms, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5)
        "#,
        params![id, user.as_str(), UNCATEGORIZED_NAME, UNCATEGORIZED_SLUG, now_ms],
    )?;

    Collection::try_new(
        user.as_str().to_string(),
        id,
        UNCATEGORIZED_NAME.to_string(),
        UNCATEGORIZED_SLUG.to_string(),
        None,
        None,
        now_ms,
        now_ms,
    )
    .map_err(|_| StoreError::InvalidInput("invalid uncategorized collection"))
}

pub(crate) fn touch_collection_tx(
    tx: &Transaction<'_>,
    collection_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE collections SET updated_at_ms = ?2 WHERE id = ?1",
        params![collection_id, now_ms],
    )?;
    Ok(())
}

pub(crate) fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("limit/offset out of range"))
}
