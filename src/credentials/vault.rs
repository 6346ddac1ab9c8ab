// src/credentials/vault.rs

//! Vault HTTP API client.

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::VaultSection;
use crate::credentials::CredentialStore;
use crate::errors::{LauncherError, Result};

const TOKEN_HEADER: &str = "X-Vault-Token";
const MOUNT_DESCRIPTION: &str = "A cubbyhole for the iRODS configs used in jobs";

#[derive(Debug, Clone)]
pub struct VaultClient {
    http: Client,
    base_url: String,
    root_token: String,
    mount: String,
}

#[derive(Debug, Deserialize)]
struct TokenCreateResponse {
    auth: Option<TokenAuth>,
}

#[derive(Debug, Deserialize)]
struct TokenAuth {
    #[serde(default)]
    client_token: String,
}

impl VaultClient {
    pub fn new(cfg: &VaultSection) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            root_token: cfg.token.clone(),
            mount: cfg.mount_path.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LauncherError::Credentials(format!(
                "{what} failed with {status}: {body}"
            )));
        }
        Ok(resp)
    }

    /// Mount a cubbyhole backend at the configured mount path unless one is
    /// already there.
    pub async fn ensure_mount(&self) -> Result<()> {
        let resp = self
            .send(
                self.http
                    .get(self.endpoint("sys/mounts"))
                    .header(TOKEN_HEADER, &self.root_token),
                "listing mounts",
            )
            .await?;
        let mounts: Value = resp.json().await?;

        if has_mount(&mounts, &self.mount) {
            debug!(mount = %self.mount, "vault mount already present");
            return Ok(());
        }

        self.send(
            self.http
                .post(self.endpoint(&format!("sys/mounts/{}", self.mount)))
                .header(TOKEN_HEADER, &self.root_token)
                .json(&json!({ "type": "cubbyhole", "description": MOUNT_DESCRIPTION })),
            "mounting cubbyhole",
        )
        .await?;

        info!(mount = %self.mount, "mounted vault cubbyhole");
        Ok(())
    }
}

/// `sys/mounts` lists mounts as `"<path>/"` keys, either at the top level or
/// under `data` depending on the server version.
pub fn has_mount(mounts: &Value, mount: &str) -> bool {
    let key = format!("{}/", mount.trim_end_matches('/'));
    mounts.get(&key).is_some()
        || mounts
            .get("data")
            .and_then(|d| d.get(&key))
            .is_some()
}

impl CredentialStore for VaultClient {
    fn child_token(&self, num_uses: u32) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let resp = self
                .send(
                    self.http
                        .post(self.endpoint("auth/token/create"))
                        .header(TOKEN_HEADER, &self.root_token)
                        .json(&json!({ "num_uses": num_uses })),
                    "creating child token",
                )
                .await?;
            let body: TokenCreateResponse = resp.json().await?;

            let auth = body
                .auth
                .ok_or_else(|| LauncherError::Credentials("auth field was missing".to_string()))?;
            if auth.client_token.is_empty() {
                return Err(LauncherError::Credentials(
                    "client token was empty".to_string(),
                ));
            }

            debug!(num_uses, "issued vault child token");
            Ok(auth.client_token)
        })
    }

    fn store_config<'a>(
        &'a self,
        token: &'a str,
        invocation_id: &'a str,
        config: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = format!("{}/{}", self.mount, invocation_id);
            self.send(
                self.http
                    .post(self.endpoint(&path))
                    .header(TOKEN_HEADER, token)
                    .json(&json!({ "config": config })),
                "storing job config",
            )
            .await?;

            debug!(%invocation_id, mount = %self.mount, "stored irods config in vault");
            Ok(())
        })
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}
