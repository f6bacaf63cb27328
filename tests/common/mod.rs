//! Shared test utilities: a local HTTP stand-in for the API and content
//! servers, plus helpers to build encrypted fixtures.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use ctr::cipher::{KeyIvInit, StreamCipher};
use megadl::api::ApiClient;
use megadl::base64::base64url_encode;
use megadl::{Config, Range, Session};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path plus query string
    pub target: String,
    /// Lowercased names
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        let (_, query) = self.target.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// First command of an API body.
    pub fn command(&self) -> Value {
        serde_json::from_slice::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get(0).cloned())
            .unwrap_or(Value::Null)
    }

    pub fn action(&self) -> String {
        self.command()
            .get("a")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// Canned answer.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: value.to_string().into_bytes(),
        }
    }

    pub fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), "application/octet-stream".into())],
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn hashcash(challenge: &str) -> Self {
        Self::status(402).with_header("X-Hashcash", challenge)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

type Handler = dyn Fn(&Recorded, usize) -> Reply + Send + Sync;

/// HTTP/1.1 server on a loopback port; one request per connection.
///
/// The handler gets each request and its zero-based arrival number.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, handler)
    }

    pub fn serve<F>(listener: TcpListener, handler: F) -> Self
    where
        F: Fn(&Recorded, usize) -> Reply + Send + Sync + 'static,
    {
        let addr = listener.local_addr().unwrap();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = requests.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let log = log.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = handle(socket, log, handler).await;
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn api_url(&self) -> String {
        self.url("/cs")
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method == "POST")
            .map(Recorded::action)
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    mut socket: TcpStream,
    log: Arc<Mutex<Vec<Recorded>>>,
    handler: Arc<Handler>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }

    let request = Recorded {
        method,
        target,
        headers,
        body,
    };
    let seq = {
        let mut log = log.lock().unwrap();
        log.push(request.clone());
        log.len() - 1
    };
    let reply = handler(&request, seq);

    let mut out = format!(
        "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    socket.write_all(out.as_bytes()).await?;
    socket.write_all(&reply.body).await?;
    socket.shutdown().await
}

/// Test configuration: no pacing, instant backoff, small budget.
pub fn config(dest: &Path) -> Config {
    Config {
        dest_base: dest.to_path_buf(),
        retries: 2,
        connect_timeout_secs: 2,
        read_timeout_secs: 5,
        retry_delay: Range::new(0.0, 0.0),
        nodelay: true,
        ..Config::default()
    }
}

pub fn api(server: &MockServer, config: &Config) -> ApiClient {
    ApiClient::new(config, Arc::new(AtomicBool::new(false)))
        .unwrap()
        .with_api_url(server.api_url())
}

/// Fake account registration: `us` echoes the wrapped master key and the
/// self-challenge sent with `up`, which is exactly what a valid reply holds.
#[derive(Debug, Default)]
pub struct FakeAccount {
    registered: Mutex<Option<(String, String)>>,
    /// Flip one byte of the returned session id
    pub corrupt_tsid: bool,
}

pub const USER_HANDLE: &str = "anonUser01";

impl FakeAccount {
    pub fn corrupted() -> Self {
        Self {
            corrupt_tsid: true,
            ..Self::default()
        }
    }

    /// Answer `up`/`us`; `None` for any other command.
    pub fn reply(&self, request: &Recorded) -> Option<Reply> {
        let command = request.command();
        match request.action().as_str() {
            "up" => {
                let k = command.get("k")?.as_str()?.to_string();
                let ts = command.get("ts")?.as_str()?.to_string();
                *self.registered.lock().unwrap() = Some((k, ts));
                Some(Reply::json(serde_json::json!([USER_HANDLE])))
            }
            "us" => {
                let (k, ts) = self.registered.lock().unwrap().clone()?;
                let mut raw = megadl::base64::base64url_decode(&ts).ok()?;
                if self.corrupt_tsid {
                    let last = raw.len() - 1;
                    raw[last] ^= 0xff;
                }
                Some(Reply::json(serde_json::json!([{
                    "k": k,
                    "tsid": base64url_encode(&raw),
                    "u": USER_HANDLE,
                }])))
            }
            _ => None,
        }
    }
}

/// Log in against the mock server.
pub async fn login(server: &MockServer, config: &Config) -> Session {
    Session::login_anonymous(api(server, config)).await.unwrap()
}

pub fn key_bytes(key: &[u32; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, w) in key.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
    }
    out
}

/// `MEGA{"n":name}` encrypted with AES-CBC under a zero IV, base64url.
pub fn encrypt_attributes(name: &str, key: &[u32; 4]) -> String {
    let cipher = Aes128::new_from_slice(&key_bytes(key)).unwrap();
    let mut plain = format!("MEGA{}", serde_json::json!({ "n": name })).into_bytes();
    plain.resize(plain.len().div_ceil(16) * 16, 0);

    let mut prev = [0u8; 16];
    let mut out = Vec::new();
    for block in plain.chunks(16) {
        let mut b = Block::clone_from_slice(block);
        for (x, y) in b.iter_mut().zip(prev) {
            *x ^= y;
        }
        cipher.encrypt_block(&mut b);
        prev.copy_from_slice(&b);
        out.extend_from_slice(&b);
    }
    base64url_encode(&out)
}

/// AES-128-CTR with the content counter block `iv0 || iv1 || 0^64`.
pub fn encrypt_content(plain: &[u8], key: &[u32; 4], iv: &[u32; 4]) -> Vec<u8> {
    let mut counter = [0u8; 16];
    counter[..4].copy_from_slice(&iv[0].to_be_bytes());
    counter[4..8].copy_from_slice(&iv[1].to_be_bytes());
    let mut cipher = ctr::Ctr128BE::<Aes128>::new_from_slices(&key_bytes(key), &counter).unwrap();
    let mut out = plain.to_vec();
    cipher.apply_keystream(&mut out);
    out
}
