//! Disk-backed cache storage.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <sha256(store name)>/
//!     meta.json              store name and creation time
//!     <sha256(method url)>.json   one response per file
//! ```
//!
//! Hashed names map arbitrary tags and URLs to safe file names. A `put`
//! touches only its own entry file and a lookup reads only one, so the cost
//! of a request does not grow with the size of the store. Every file is
//! replaced atomically (write to a temporary file, then rename).
//!
//! A store whose `meta.json` cannot be read is unusable: `open` rewrites it,
//! and `keys` removes the whole directory so activation never leaves it
//! behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::storage::{ensure_cacheable, CacheStorage};
use crate::error::{Error, Result};
use crate::models::{Request, RequestKey, Response};

const META_FILE: &str = "meta.json";
const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMeta {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64-encoded body.
    body: String,
    stored_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(key: RequestKey, response: &Response) -> Self {
        Self {
            key,
            status: response.status(),
            headers: response.headers().to_vec(),
            body: STANDARD.encode(response.body()),
            stored_at: Utc::now(),
        }
    }

    fn to_response(&self) -> Result<Response> {
        let body = STANDARD.decode(&self.body)?;
        Ok(Response::new(self.status, self.headers.clone(), body))
    }
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp = path.with_extension(TEMP_EXTENSION);
    tokio::fs::write(&temp, contents).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}

pub struct DiskCacheStorage {
    cache_dir: PathBuf,
    /// Serializes creation, writes and removal of store directories.
    write_lock: Mutex<()>,
}

impl DiskCacheStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// When the named store was created, if it exists.
    pub async fn created_at(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let meta: Option<StoreMeta> = read_json(&self.store_dir(name).join(META_FILE)).await?;
        Ok(meta.map(|m| m.created_at))
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.cache_dir.join(digest(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.store_dir(name)
            .join(format!("{}.{}", digest(&key.to_string()), ENTRY_EXTENSION))
    }

    async fn create(&self, name: &str) -> Result<()> {
        let dir = self.store_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        let meta = StoreMeta {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?).await
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        let meta = self.store_dir(name).join(META_FILE);
        if tokio::fs::try_exists(&meta).await? {
            Ok(())
        } else {
            Err(Error::CacheNotFound(name.to_string()))
        }
    }

    /// Remove store directories whose metadata is still unreadable once the
    /// write lock is held.
    async fn remove_unreadable(&self, dirs: Vec<PathBuf>) {
        let _guard = self.write_lock.lock().await;
        for dir in dirs {
            match read_json::<StoreMeta>(&dir.join(META_FILE)).await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(Error::Corrupt(_)) => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable cache store");
                    continue;
                }
            }
            warn!(path = %dir.display(), "Removing unreadable cache store");
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                warn!(path = %dir.display(), error = %e, "Failed to remove cache store");
            }
        }
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match read_json::<StoreMeta>(&self.store_dir(name).join(META_FILE)).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                debug!(cache = name, "Creating cache store");
                self.create(name).await
            }
            Err(Error::Corrupt(reason)) => {
                warn!(cache = name, error = %reason, "Replacing unreadable cache store metadata");
                self.create(name).await
            }
            Err(e) => Err(e),
        }
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<()> {
        ensure_cacheable(request, &response)?;
        let entry = StoredEntry::new(request.key(), &response);
        let contents = serde_json::to_vec(&entry)?;

        let _guard = self.write_lock.lock().await;
        self.ensure_exists(name).await?;
        write_atomic(&self.entry_path(name, &entry.key), &contents).await
    }

    /// Entries are staged as temporary files first. A failure while staging
    /// writes nothing; the final renames replace files one by one.
    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        let mut staged = BTreeMap::new();
        for (request, response) in &entries {
            ensure_cacheable(request, response)?;
            let entry = StoredEntry::new(request.key(), response);
            staged.insert(self.entry_path(name, &entry.key), serde_json::to_vec(&entry)?);
        }

        let _guard = self.write_lock.lock().await;
        self.ensure_exists(name).await?;

        let mut written = Vec::with_capacity(staged.len());
        for (path, contents) in &staged {
            let temp = path.with_extension(TEMP_EXTENSION);
            if let Err(e) = tokio::fs::write(&temp, contents).await {
                for temp in written {
                    let _ = tokio::fs::remove_file(temp).await;
                }
                return Err(e.into());
            }
            written.push(temp);
        }
        for (path, _) in staged {
            tokio::fs::rename(path.with_extension(TEMP_EXTENSION), &path).await?;
        }
        Ok(())
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        let key = request.key();
        let entry: Option<StoredEntry> = read_json(&self.entry_path(name, &key)).await?;
        match entry {
            Some(entry) if entry.key == key => entry.to_response().map(Some),
            _ => Ok(None),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut stores = Vec::new();
        let mut unreadable = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            match read_json::<StoreMeta>(&path.join(META_FILE)).await {
                Ok(Some(meta)) => stores.push((meta.created_at, meta.name)),
                Ok(None) | Err(Error::Corrupt(_)) => unreadable.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache store");
                }
            }
        }
        if !unreadable.is_empty() {
            self.remove_unreadable(unreadable).await;
        }
        stores.sort();
        Ok(stores.into_iter().map(|(_, name)| name).collect())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        self.ensure_exists(name).await?;
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(self.store_dir(name)).await?;
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            let is_entry = path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
                && path.file_name().and_then(|n| n.to_str()) != Some(META_FILE);
            if !is_entry {
                continue;
            }
            match read_json::<StoredEntry>(&path).await {
                Ok(Some(entry)) => keys.push(entry.key),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;
    use tempfile::TempDir;

    fn request(path: &str) -> Request {
        Request::get(Url::parse("https://app.example.com").unwrap().join(path).unwrap())
    }

    fn storage(dir: &TempDir) -> DiskCacheStorage {
        DiskCacheStorage::new(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = storage(&dir);
            storage.open("color-reactor-v1").await.unwrap();
            let response = Response::new(
                200,
                vec![("content-type".to_string(), "image/png".to_string())],
                vec![0x89, b'P', b'N', b'G', 0x00, 0xff],
            );
            storage
                .put("color-reactor-v1", &request("/icons/icon-72.png"), response)
                .await
                .unwrap();
        }

        let storage = storage(&dir);
        let hit = storage
            .match_in("color-reactor-v1", &request("/icons/icon-72.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body().as_ref(), &[0x89, b'P', b'N', b'G', 0x00, 0xff]);
        assert_eq!(hit.header("Content-Type"), Some("image/png"));
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("zeta").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.open("alpha").await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn test_open_keeps_existing_entries() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("v1").await.unwrap();
        storage.put("v1", &request("/a"), Response::ok("a")).await.unwrap();
        storage.open("v1").await.unwrap();

        assert_eq!(storage.entries("v1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_each_put_writes_its_own_file() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("v1").await.unwrap();
        storage.put("v1", &request("/a"), Response::ok("a")).await.unwrap();
        storage.put("v1", &request("/b"), Response::ok("b")).await.unwrap();
        storage.put("v1", &request("/a"), Response::ok("a2")).await.unwrap();

        let files = std::fs::read_dir(storage.store_dir("v1")).unwrap().count();
        assert_eq!(files, 3, "meta.json plus one file per entry");
        let a = storage.match_in("v1", &request("/a")).await.unwrap().unwrap();
        assert_eq!(a.body().as_ref(), b"a2");
    }

    #[tokio::test]
    async fn test_delete_removes_store() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("v1").await.unwrap();
        storage.put("v1", &request("/a"), Response::ok("a")).await.unwrap();

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(storage.created_at("v1").await.unwrap().is_none());
        assert!(storage.match_in("v1", &request("/a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_into_missing_store_fails() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let err = storage
            .put("v1", &request("/a"), Response::ok("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheNotFound(_)));
    }

    #[tokio::test]
    async fn test_open_repairs_unreadable_store() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("color-reactor-v1").await.unwrap();
        storage
            .put("color-reactor-v1", &request("/"), Response::ok("root"))
            .await
            .unwrap();
        let meta = storage.store_dir("color-reactor-v1").join(META_FILE);
        std::fs::write(&meta, b"{trunc").unwrap();

        storage.open("color-reactor-v1").await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["color-reactor-v1"]);
        storage
            .put("color-reactor-v1", &request("/game.js"), Response::ok("js"))
            .await
            .unwrap();
        assert!(storage
            .match_in("color-reactor-v1", &request("/"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_keys_removes_unreadable_stores() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("color-reactor-v0").await.unwrap();
        storage.open("color-reactor-v1").await.unwrap();
        let broken = storage.store_dir("color-reactor-v0");
        std::fs::write(broken.join(META_FILE), b"{trunc").unwrap();
        let half_made = dir.path().join("not-a-store");
        std::fs::create_dir(&half_made).unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["color-reactor-v1"]);
        assert!(!broken.exists());
        assert!(!half_made.exists());
    }

    #[tokio::test]
    async fn test_stray_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("v1").await.unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"hello").unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["v1"]);
        assert!(notes.exists());
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_overwritten_by_put() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("v1").await.unwrap();
        storage.put("v1", &request("/a"), Response::ok("a")).await.unwrap();
        let path = storage.entry_path("v1", &request("/a").key());
        std::fs::write(&path, b"{trunc").unwrap();

        assert!(matches!(
            storage.match_in("v1", &request("/a")).await,
            Err(Error::Corrupt(_))
        ));
        assert!(storage.entries("v1").await.unwrap().is_empty());

        storage.put("v1", &request("/a"), Response::ok("fresh")).await.unwrap();
        let hit = storage.match_in("v1", &request("/a")).await.unwrap().unwrap();
        assert_eq!(hit.body().as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn test_put_all_writes_batch() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.open("v1").await.unwrap();
        storage
            .put_all(
                "v1",
                vec![
                    (request("/"), Response::ok("root")),
                    (request("/style.css"), Response::ok("body{}")),
                ],
            )
            .await
            .unwrap();

        let keys = storage.entries("v1").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].url, "https://app.example.com/");
        let leftovers = std::fs::read_dir(storage.store_dir("v1"))
            .unwrap()
            .filter(|f| {
                f.as_ref().unwrap().path().extension().and_then(|e| e.to_str())
                    == Some(TEMP_EXTENSION)
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
