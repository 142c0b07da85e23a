use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::storage::{ensure_cacheable, CacheStorage};
use crate::error::{Error, Result};
use crate::models::{Request, RequestKey, Response};

type Store = HashMap<RequestKey, Response>;

/// In-process cache storage. Stores are kept in creation order.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    stores: Mutex<Vec<(String, Store)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_stores<R>(&self, f: impl FnOnce(&mut Vec<(String, Store)>) -> R) -> R {
        // Mutations are single inserts or removes, so a poisoned map is still consistent.
        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut stores)
    }
}

fn find<'a>(stores: &'a mut [(String, Store)], name: &str) -> Option<&'a mut Store> {
    stores
        .iter_mut()
        .find(|(n, _)| n == name)
        .map(|(_, store)| store)
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.with_stores(|stores| {
            if find(stores, name).is_none() {
                stores.push((name.to_string(), Store::new()));
            }
        });
        Ok(())
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<()> {
        ensure_cacheable(request, &response)?;
        self.with_stores(|stores| {
            let store = find(stores, name).ok_or_else(|| Error::CacheNotFound(name.to_string()))?;
            store.insert(request.key(), response);
            Ok(())
        })
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        for (request, response) in &entries {
            ensure_cacheable(request, response)?;
        }
        self.with_stores(|stores| {
            let store = find(stores, name).ok_or_else(|| Error::CacheNotFound(name.to_string()))?;
            store.extend(entries.into_iter().map(|(req, resp)| (req.key(), resp)));
            Ok(())
        })
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        let key = request.key();
        Ok(self.with_stores(|stores| find(stores, name).and_then(|s| s.get(&key).cloned())))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.with_stores(|stores| {
            let before = stores.len();
            stores.retain(|(n, _)| n != name);
            stores.len() != before
        }))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.with_stores(|stores| stores.iter().map(|(n, _)| n.clone()).collect()))
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        self.with_stores(|stores| {
            let store = find(stores, name).ok_or_else(|| Error::CacheNotFound(name.to_string()))?;
            let mut keys: Vec<RequestKey> = store.keys().cloned().collect();
            keys.sort();
            Ok(keys)
        })
    }
}
