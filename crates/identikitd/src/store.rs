//! SQLite gallery of person records and their enrolled embeddings.

use identikit_core::{Embedding, EnrolledFace, PersonRecord};
use rusqlite::OptionalExtension;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS persons (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    age             INTEGER,
    nickname        TEXT,
    police_station  TEXT,
    crime           TEXT,
    sections        TEXT,
    arrest_datetime TEXT,
    photo           TEXT,
    embedding       BLOB NOT NULL,
    model_version   TEXT,
    created_at      TEXT NOT NULL
);
";

const PERSON_COLUMNS: &str =
    "id, name, age, nickname, police_station, crime, sections, arrest_datetime, photo, created_at";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the gallery database. Cheap to clone.
#[derive(Clone)]
pub struct PersonStore {
    connection: Connection,
}

impl PersonStore {
    /// Open (or create) the gallery at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path).await?;
        Self::init(connection).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().await?;
        Self::init(connection).await
    }

    async fn init(connection: Connection) -> Result<Self, StoreError> {
        connection
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(Self { connection })
    }

    fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<PersonRecord> {
        Ok(PersonRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            age: row.get(2)?,
            nickname: row.get(3)?,
            police_station: row.get(4)?,
            crime: row.get(5)?,
            sections: row.get(6)?,
            arrest_datetime: row.get(7)?,
            photo: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    /// Store a person record together with its embedding.
    pub async fn insert(&self, person: PersonRecord, embedding: Embedding) -> Result<(), StoreError> {
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO persons (id, name, age, nickname, police_station, crime, sections,
                        arrest_datetime, photo, embedding, model_version, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    rusqlite::params![
                        person.id,
                        person.name,
                        person.age,
                        person.nickname,
                        person.police_station,
                        person.crime,
                        person.sections,
                        person.arrest_datetime,
                        person.photo,
                        embedding.to_le_bytes(),
                        embedding.model_version,
                        person.created_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<PersonRecord>, StoreError> {
        let id = id.to_string();
        let row = self
            .connection
            .call(move |conn| {
                let mut query =
                    conn.prepare(&format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?"))?;
                let row = query.query_row([id], Self::row_to_person).optional()?;
                Ok(row)
            })
            .await?;
        Ok(row)
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Result<Vec<PersonRecord>, StoreError> {
        let rows = self
            .connection
            .call(|conn| {
                let mut query = conn.prepare(&format!(
                    "SELECT {PERSON_COLUMNS} FROM persons ORDER BY created_at, id"
                ))?;
                let rows = query
                    .query_map([], Self::row_to_person)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Remove a record. Returns false if it did not exist.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let removed = self
            .connection
            .call(move |conn| Ok(conn.execute("DELETE FROM persons WHERE id = ?", [id])?))
            .await?;
        Ok(removed > 0)
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let count = self
            .connection
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(count.max(0) as usize)
    }

    /// Every record with its embedding, for matching.
    pub async fn gallery(&self) -> Result<Vec<EnrolledFace>, StoreError> {
        let entries = self
            .connection
            .call(|conn| {
                let mut query = conn.prepare(&format!(
                    "SELECT {PERSON_COLUMNS}, embedding, model_version FROM persons ORDER BY created_at, id"
                ))?;
                let entries = query
                    .query_map([], |row| {
                        let person = Self::row_to_person(row)?;
                        let blob: Vec<u8> = row.get(10)?;
                        let model_version: Option<String> = row.get(11)?;
                        Ok(EnrolledFace {
                            person,
                            embedding: Embedding::from_le_bytes(&blob, model_version),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }
}
