#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use cfw_updater::error::{TransferError, UpdateError};
use cfw_updater::io::{Progress, Transfer};
use cfw_updater::power::{PowerControl, SleepGuard, SleepInhibitor};
use cfw_updater::zip::{Extract, ExtractReport, extract_staged};

/// One zip entry: a directory when `data` is `None`.
pub type Entry<'a> = (&'a str, Option<&'a [u8]>);

pub fn zip_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        match data {
            None => writer.add_directory(*name, options).unwrap(),
            Some(data) => {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Relative paths of everything under `root`, sorted, directories with a
/// trailing slash.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            if path.is_dir() {
                out.push(format!("{}/", rel));
                walk(root, &path, out);
            } else {
                out.push(rel);
            }
        }
    }
    let mut out = Vec::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out.sort();
    out
}

#[derive(Clone)]
pub enum Route {
    Body(u16, Vec<u8>),
    Redirect(String),
}

/// Minimal HTTP/1.1 server answering GETs from a fixed route table.
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<(String, String)>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let routes: HashMap<String, Route> = routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect();
        let routes = Arc::new(routes);
        let hits = Arc::new(Mutex::new(Vec::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                let hits = server_hits.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let text = String::from_utf8_lossy(&request).into_owned();
                    let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let agent = text
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("user-agent")
                                .then(|| value.trim().to_string())
                        })
                        .unwrap_or_default();
                    hits.lock().unwrap().push((path.clone(), agent));

                    let (head, body) = match routes.get(&path) {
                        Some(Route::Body(status, body)) => (
                            format!(
                                "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                status,
                                body.len()
                            ),
                            body.clone(),
                        ),
                        Some(Route::Redirect(location)) => (
                            format!(
                                "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                                location
                            ),
                            Vec::new(),
                        ),
                        None => (
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                .to_string(),
                            Vec::new(),
                        ),
                    };
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `(path, user agent)` of every request served so far.
    pub fn hits(&self) -> Vec<(String, String)> {
        self.hits.lock().unwrap().clone()
    }
}

/// URL on a port nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/archive.zip", addr)
}

/// Counts inhibit and release calls.
#[derive(Default)]
pub struct CountingInhibitor {
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl SleepInhibitor for CountingInhibitor {
    fn inhibit(&self) -> SleepGuard {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        SleepGuard::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Serves canned bodies by URL; unknown URLs fail like a dead network.
#[derive(Default)]
pub struct FakeTransfer {
    bodies: HashMap<String, Vec<u8>>,
    pub calls: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeTransfer {
    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transfer for FakeTransfer {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<Progress<'_>>,
    ) -> Result<u64, TransferError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        let Some(body) = self.bodies.get(url) else {
            return Err(TransferError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        };
        tokio::fs::write(dest, body)
            .await
            .map_err(TransferError::Write)?;
        if let Some(report) = progress {
            report(body.len() as u64, body.len() as u64);
        }
        Ok(body.len() as u64)
    }
}

/// Real extraction, counting invocations.
#[derive(Default)]
pub struct CountingExtractor {
    pub calls: AtomicUsize,
}

impl CountingExtractor {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extract for CountingExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractReport, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        extract_staged(archive, dest).await
    }
}

/// Records power-cycle requests instead of rebooting.
#[derive(Default)]
pub struct RecordingPower {
    pub requests: AtomicUsize,
}

impl RecordingPower {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PowerControl for RecordingPower {
    fn power_cycle(&self) -> anyhow::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
