//! Shared helpers for integration tests: a tiny HTTP responder on a local
//! port, catalogue fixtures and a recording host.

#![allow(dead_code)]

use async_trait::async_trait;
use geo_catalogue::provision::RemoteLayerDescriptor;
use geo_catalogue::{CatalogueError, CatalogueSource, Dataset, HostCapabilities, Resource, Result, Snapshot};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub chunks: Vec<Vec<u8>>,
    pub chunk_delay: Duration,
}

impl Reply {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            chunks: vec![body.into()],
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn json(value: &Value) -> Self {
        Self::ok("application/vnd.api+json", value.to_string())
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::ok("text/plain", body)
        }
    }

    /// Body sent in `chunks` pieces with `delay` before each one
    pub fn trickle(content_type: &str, body: &[u8], chunks: usize, delay: Duration) -> Self {
        let size = body.len().div_ceil(chunks.max(1)).max(1);
        Self {
            status: 200,
            content_type: content_type.to_string(),
            chunks: body.chunks(size).map(<[u8]>::to_vec).collect(),
            chunk_delay: delay,
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Reply>>>,
    requests: Arc<Mutex<Vec<String>>>,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Serve `routes` keyed by request path (without query)
    pub async fn start(routes: HashMap<String, Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(routes));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));

        let (table, log, counter) = (routes.clone(), requests.clone(), hits.clone());
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = table.clone();
                let log = log.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 4096];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let path = target.split('?').next().unwrap_or("/").to_string();
                    log.lock().unwrap().push(head);
                    counter.fetch_add(1, Ordering::SeqCst);

                    let reply = routes
                        .lock()
                        .unwrap()
                        .get(&path)
                        .cloned()
                        .unwrap_or_else(|| Reply::status(404, "not found"));
                    let length: usize = reply.chunks.iter().map(Vec::len).sum();
                    let header = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        reply.status,
                        if reply.status < 400 { "OK" } else { "Error" },
                        reply.content_type,
                        length
                    );
                    if socket.write_all(header.as_bytes()).await.is_err() {
                        return;
                    }
                    for chunk in &reply.chunks {
                        if !reply.chunk_delay.is_zero() {
                            tokio::time::sleep(reply.chunk_delay).await;
                        }
                        if socket.write_all(chunk).await.is_err() {
                            return;
                        }
                        let _ = socket.flush().await;
                    }
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            addr,
            routes,
            requests,
            hits,
        }
    }

    /// Add or replace a route after startup
    pub fn serve(&self, path: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(path.to_string(), reply);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Raw request heads received so far, lowercased
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.to_lowercase())
            .collect()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn routes(entries: Vec<(&str, Reply)>) -> HashMap<String, Reply> {
    entries.into_iter().map(|(path, reply)| (path.to_string(), reply)).collect()
}

/// Dataset document with an OWS-only, a file-only and a mixed dataset
pub fn datasets_document(file_base: &str) -> Value {
    json!({
        "meta": {"total": 3},
        "data": [
            {
                "type": "datasets", "id": "forest",
                "attributes": {"title": "Forest Cover 2020", "description": "Forest polygons"},
                "relationships": {
                    "wmsSource": {"data": {"type": "wmsSources", "id": "w1"}},
                    "fileSources": {"data": [{"type": "fileSources", "id": "f1"}]},
                    "owners": {"data": [{"type": "owners", "id": "o1"}]},
                    "tags": {"data": [{"type": "tags", "id": "t1"}]},
                    "category": {"data": {"type": "categories", "id": "c1"}}
                }
            },
            {
                "type": "datasets", "id": "coast",
                "attributes": {"title": "Coastline Survey", "description": "Coastline"},
                "relationships": {
                    "wfsSource": {"data": {"type": "wfsSources", "id": "s1"}},
                    "owners": {"data": [{"type": "owners", "id": "o2"}]},
                    "category": {"data": {"type": "categories", "id": "c2"}}
                }
            },
            {
                "type": "datasets", "id": "empty",
                "attributes": {"title": "Placeholder", "description": ""},
                "relationships": {}
            }
        ],
        "included": [
            {"type": "wmsSources", "id": "w1", "attributes": {
                "url": "https://ows.example.org/wms", "layer": "forest", "style": "", "format": "image/png"}},
            {"type": "wfsSources", "id": "s1", "attributes": {
                "url": "https%3A%2F%2Fapi.dataforsyningen.dk%2Fwfs%3Ftoken%3D", "typeName": "coast"}},
            {"type": "fileSources", "id": "f1", "attributes": {"url": format!("{}/files/forest.zip", file_base)},
                "relationships": {"fileSourceType": {"data": {"type": "fileSourceTypes", "id": "ft"}}}},
            {"type": "fileSourceTypes", "id": "ft", "attributes": {"name": "SHP"}},
            {"type": "owners", "id": "o1", "attributes": {"title": "Agency A"}},
            {"type": "owners", "id": "o2", "attributes": {"title": "Agency B"}},
            {"type": "tags", "id": "t1", "attributes": {"name": "trees"}},
            {"type": "categories", "id": "c1", "attributes": {"name": "Nature"}},
            {"type": "categories", "id": "c2", "attributes": {"name": "Water"}}
        ]
    })
}

pub fn collections_document() -> Value {
    json!({
        "data": [{
            "type": "datasetCollections", "id": "nature",
            "attributes": {"title": "Nature", "description": "Nature themes"},
            "relationships": {"datasetCollectionItems": {"data": [
                {"type": "datasetCollectionItems", "id": "i1"}
            ]}}
        }],
        "included": [
            {"type": "datasetCollectionItems", "id": "i1", "attributes": {},
                "relationships": {"dataset": {"data": {"type": "datasets", "id": "forest"}}}}
        ]
    })
}

pub fn availability_document() -> Value {
    json!({
        "data": [{"type": "datasetAvailabilities", "id": "forest", "attributes": {"status": "online"}}]
    })
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Hands out scripted snapshots, counting fetches
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Snapshot>>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Snapshot>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogueSource for ScriptedSource {
    async fn fetch_catalogue(&self) -> Result<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CatalogueError::network("no more scripted snapshots")))
    }
}

/// Host that records what the engine hands it
#[derive(Default)]
pub struct RecordingHost {
    pub destination: Mutex<Option<PathBuf>>,
    pub layers: Mutex<Vec<RemoteLayerDescriptor>>,
    pub files: Mutex<Vec<Vec<PathBuf>>>,
    pub destination_requests: AtomicUsize,
}

impl RecordingHost {
    pub fn with_destination(path: Option<PathBuf>) -> Arc<Self> {
        let host = Self::default();
        *host.destination.lock().unwrap() = path;
        Arc::new(host)
    }
}

#[async_trait]
impl HostCapabilities for RecordingHost {
    async fn create_remote_layer(&self, descriptor: &RemoteLayerDescriptor) -> Result<()> {
        self.layers.lock().unwrap().push(descriptor.clone());
        Ok(())
    }

    async fn load_files_as_layers(&self, paths: &[PathBuf]) -> Result<()> {
        self.files.lock().unwrap().push(paths.to_vec());
        Ok(())
    }

    async fn choose_destination_path(&self, _dataset: &Dataset, _resource: &Resource) -> Option<PathBuf> {
        self.destination_requests.fetch_add(1, Ordering::SeqCst);
        self.destination.lock().unwrap().clone()
    }
}

/// Every entry in `dir`, for leftover checks
pub fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
