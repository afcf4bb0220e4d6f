#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Memory backend seeded from the shared fixtures; no database needed
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_buildtrack-api"));
        cmd.env("BUILDTRACK_PORT", port.to_string())
            .env("APP_ENV", "development")
            .env("STORAGE_BACKEND", "memory")
            .env("SEED_FILE", concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/seed.json"))
            .env("QUERY_POLICY_FILE", "")
            .env("API_ENABLE_REQUEST_LOGGING", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    // Use stable get_or_init and convert init errors into a panic with context.
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// GET `path` with query pairs (brackets and `$` are percent-encoded) and return status plus JSON body.
pub async fn get(path: &str, query: &[(&str, &str)]) -> Result<(StatusCode, Value)> {
    let server = ensure_server().await?;
    let res = reqwest::Client::new()
        .get(format!("{}{}", server.base_url, path))
        .query(query)
        .send()
        .await?;
    let status = res.status();
    let body = res.json::<Value>().await?;
    Ok((status, body))
}

pub fn field<'a>(body: &'a Value, name: &str) -> Vec<&'a str> {
    body["data"]
        .as_array()
        .map(|records| records.iter().filter_map(|r| r[name].as_str()).collect())
        .unwrap_or_default()
}
