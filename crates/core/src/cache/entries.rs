//! SQLite implementation of [`ResponseStore`].
//!
//! Response snapshots are keyed by (generation, request key); deleting a
//! generation cascades to its entries through the foreign key.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheDb;
use super::store::{CacheEntry, GenerationInfo, ResponseStore};
use crate::Error;
use crate::http::{Headers, Response, ResponseType};

/// Raw column values of a `cache_entries` row.
struct EntryRow {
    generation: String,
    request_key: String,
    method: String,
    url: String,
    response_url: String,
    status: i64,
    response_type: String,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry, Error> {
        let url = Url::parse(&self.response_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let response_type = ResponseType::parse(&self.response_type)
            .ok_or_else(|| Error::Serialization(format!("unknown response type: {}", self.response_type)))?;
        let headers: Headers = serde_json::from_str(&self.headers_json)?;
        let status = u16::try_from(self.status)
            .map_err(|_| Error::Serialization(format!("status out of range: {}", self.status)))?;

        Ok(CacheEntry {
            generation: self.generation,
            request_key: self.request_key,
            method: self.method,
            url: self.url,
            response: Response { url, status, response_type, headers, body: Bytes::from(self.body) },
            stored_at: self.stored_at,
        })
    }
}

#[async_trait]
impl ResponseStore for CacheDb {
    async fn create_generation(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO generations (name, created_at) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<GenerationInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.name, g.created_at, COUNT(e.request_key)
                     FROM generations g
                     LEFT JOIN cache_entries e ON e.generation = g.name
                     GROUP BY g.name, g.created_at
                     ORDER BY g.created_at ASC, g.name ASC",
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok(GenerationInfo {
                        name: row.get(0)?,
                        created_at: row.get(1)?,
                        entries: row.get::<_, i64>(2)? as u64,
                    })
                })?;

                rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn get_entry(&self, generation: &str, request_key: &str) -> Result<Option<CacheEntry>, Error> {
        let generation = generation.to_string();
        let request_key = request_key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT generation, request_key, method, url, response_url, status,
                        response_type, headers_json, body, stored_at
                     FROM cache_entries WHERE generation = ?1 AND request_key = ?2",
                )?;

                let result = stmt.query_row(params![generation, request_key], |row| {
                    Ok(EntryRow {
                        generation: row.get(0)?,
                        request_key: row.get(1)?,
                        method: row.get(2)?,
                        url: row.get(3)?,
                        response_url: row.get(4)?,
                        status: row.get(5)?,
                        response_type: row.get(6)?,
                        headers_json: row.get(7)?,
                        body: row.get(8)?,
                        stored_at: row.get(9)?,
                    })
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(EntryRow::into_entry).transpose()
    }

    async fn put_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let headers_json = serde_json::to_string(&entry.response.headers)?;
        let row = EntryRow {
            generation: entry.generation.clone(),
            request_key: entry.request_key.clone(),
            method: entry.method.clone(),
            url: entry.url.clone(),
            response_url: entry.response.url.to_string(),
            status: i64::from(entry.response.status),
            response_type: entry.response.response_type.as_str().to_string(),
            headers_json,
            body: entry.response.body.to_vec(),
            stored_at: entry.stored_at.clone(),
        };

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (
                        generation, request_key, method, url, response_url, status,
                        response_type, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(generation, request_key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        response_url = excluded.response_url,
                        status = excluded.status,
                        response_type = excluded.response_type,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &row.generation,
                        &row.request_key,
                        &row.method,
                        &row.url,
                        &row.response_url,
                        row.status,
                        &row.response_type,
                        &row.headers_json,
                        &row.body,
                        &row.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::compute_request_key;

    fn make_entry(generation: &str, path: &str, body: &str) -> CacheEntry {
        let url = Url::parse(&format!("https://app.example{path}")).unwrap();
        CacheEntry {
            generation: generation.to_string(),
            request_key: compute_request_key("GET", &url),
            method: "GET".to_string(),
            url: url.to_string(),
            response: Response::new(url, 200, body.to_string()).with_header("Content-Type", "text/css"),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("v1").await.unwrap();

        let entry = make_entry("v1", "/styles.css", "body{}");
        db.put_entry(&entry).await.unwrap();

        let loaded = db.get_entry("v1", &entry.request_key).await.unwrap().unwrap();
        assert_eq!(loaded, entry);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("v1").await.unwrap();
        assert!(db.get_entry("v1", "nonexistent").await.unwrap().is_none());
        assert!(db.get_entry("v0", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("v1").await.unwrap();

        let first = make_entry("v1", "/app.js", "one");
        let second = make_entry("v1", "/app.js", "two");
        db.put_entry(&first).await.unwrap();
        db.put_entry(&second).await.unwrap();

        let loaded = db.get_entry("v1", &first.request_key).await.unwrap().unwrap();
        assert_eq!(loaded.response.body, Bytes::from("two"));
        assert_eq!(db.generations().await.unwrap()[0].entries, 1);
    }

    #[tokio::test]
    async fn test_put_requires_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("missing", "/app.js", "x");
        assert!(db.put_entry(&entry).await.is_err());
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("v1").await.unwrap();
        db.create_generation("v2").await.unwrap();

        let entry = make_entry("v1", "/index.html", "<html>");
        db.put_entry(&entry).await.unwrap();

        assert!(db.get_entry("v2", &entry.request_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_generation_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("v1").await.unwrap();
        db.create_generation("v1").await.unwrap();

        let generations = db.generations().await.unwrap();
        assert_eq!(generations.len(), 1);
        assert_eq!(generations[0].name, "v1");
    }

    #[tokio::test]
    async fn test_delete_generation_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("old").await.unwrap();
        let entry = make_entry("old", "/index.html", "<html>");
        db.put_entry(&entry).await.unwrap();

        assert!(db.delete_generation("old").await.unwrap());
        assert!(!db.delete_generation("old").await.unwrap());

        db.create_generation("old").await.unwrap();
        assert!(db.get_entry("old", &entry.request_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_opaque_entry_reads_back() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.create_generation("v1").await.unwrap();

        let mut entry = make_entry("v1", "/pixel.gif", "GIF89a");
        entry.response = entry.response.with_type(ResponseType::Opaque);
        db.put_entry(&entry).await.unwrap();

        let loaded = db.get_entry("v1", &entry.request_key).await.unwrap().unwrap();
        assert_eq!(loaded.response.response_type, ResponseType::Opaque);
    }
}
