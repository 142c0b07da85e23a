//! End-to-end lifecycle: install, activate, serve, then upgrade to a new
//! cache generation and go offline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use precache_core::worker::{activate, handle_fetch, install};
use precache_core::{
    CacheStorage, DiskCacheStorage, FetchError, FetchOutcome, Host, Network, Request, Response,
    WorkerConfig, WorkerContext,
};
use reqwest::Url;
use tempfile::TempDir;

const ORIGIN: &str = "https://color-reactor.example";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

#[derive(Default)]
struct Site {
    pages: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl Site {
    fn publish(&self, version: &str) {
        let mut pages = self.pages.lock().unwrap();
        for path in precache_core::config::ASSET_MANIFEST {
            pages.insert(url(path).to_string(), format!("{} {}", version, path));
        }
    }
}

#[async_trait]
impl Network for Site {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable("airplane mode".to_string()));
        }
        let pages = self.pages.lock().unwrap();
        Ok(match pages.get(request.url.as_str()) {
            Some(body) => Response::ok(body.clone()),
            None => Response::new(404, vec![], "not found"),
        })
    }
}

#[derive(Default)]
struct Browser {
    claimed: AtomicUsize,
}

#[async_trait]
impl Host for Browser {
    async fn skip_waiting(&self) -> precache_core::Result<()> {
        Ok(())
    }

    async fn claim_clients(&self) -> precache_core::Result<()> {
        self.claimed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn context(
    cache_name: &str,
    storage: Arc<DiskCacheStorage>,
    site: Arc<Site>,
    browser: Arc<Browser>,
) -> WorkerContext {
    let config = WorkerConfig {
        cache_name: cache_name.to_string(),
        ..WorkerConfig::with_origin(ORIGIN)
    };
    WorkerContext::new(config, storage, site, browser)
}

#[tokio::test]
async fn upgrade_replaces_old_generation_and_serves_offline() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let site = Arc::new(Site::default());
    let browser = Arc::new(Browser::default());

    site.publish("v1");
    let v1 = context("color-reactor-v1", storage.clone(), site.clone(), browser.clone());
    assert_eq!(install(&v1).await.unwrap(), 8);
    activate(&v1).await.unwrap();

    let calls_before = site.calls.load(Ordering::SeqCst);
    let outcome = handle_fetch(&v1, Request::get(url("/game.js"))).await.unwrap();
    assert_eq!(outcome, FetchOutcome::Cache(Response::ok("v1 /game.js")));
    assert_eq!(site.calls.load(Ordering::SeqCst), calls_before);

    site.publish("v2");
    let v2 = context("color-reactor-v2", storage.clone(), site.clone(), browser.clone());
    install(&v2).await.unwrap();
    let report = activate(&v2).await.unwrap();
    assert_eq!(report.deleted, vec!["color-reactor-v1"]);
    assert_eq!(storage.keys().await.unwrap(), vec!["color-reactor-v2"]);
    assert_eq!(browser.claimed.load(Ordering::SeqCst), 2);

    site.offline.store(true, Ordering::SeqCst);
    let page = handle_fetch(&v2, Request::navigate(url("/play?level=2")))
        .await
        .unwrap();
    assert_eq!(page, FetchOutcome::Fallback(Response::ok("v2 /index.html")));

    let missing = handle_fetch(&v2, Request::get(url("/music.ogg"))).await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn failed_install_leaves_previous_generation_serving() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let site = Arc::new(Site::default());
    let browser = Arc::new(Browser::default());

    site.publish("v1");
    let v1 = context("color-reactor-v1", storage.clone(), site.clone(), browser.clone());
    install(&v1).await.unwrap();
    activate(&v1).await.unwrap();

    site.pages.lock().unwrap().remove(url("/style.css").as_str());
    let v2 = context("color-reactor-v2", storage.clone(), site.clone(), browser.clone());
    assert!(install(&v2).await.is_err());
    assert!(storage.entries("color-reactor-v2").await.unwrap().is_empty());

    let outcome = handle_fetch(&v1, Request::get(url("/style.css"))).await.unwrap();
    assert_eq!(outcome, FetchOutcome::Cache(Response::ok("v1 /style.css")));
}
