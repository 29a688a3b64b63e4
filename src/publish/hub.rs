// src/publish/hub.rs

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::env;
use std::fmt;
use tracing::{debug, info, instrument};
use url::Url;

use super::auth;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const ENDPOINT_ENV: &str = "HF_ENDPOINT";
pub const DEFAULT_REVISION: &str = "main";

const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";
const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const SAMPLE_BYTES: usize = 512;

/// `namespace/name` of a Hub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub namespace: String,
    pub name: String,
}

impl RepoId {
    pub fn parse(raw: &str) -> Result<Self> {
        match Self::split(raw)? {
            (Some(ns), name) => Ok(Self {
                namespace: ns.to_string(),
                name: name.to_string(),
            }),
            (None, _) => bail!("repository id {:?} is not of the form namespace/name", raw),
        }
    }

    /// Like [`RepoId::parse`], but a bare `name` lands under `owner`.
    pub fn parse_owned_by(raw: &str, owner: &str) -> Result<Self> {
        let (ns, name) = Self::split(raw)?;
        Ok(Self {
            namespace: ns.unwrap_or(owner).to_string(),
            name: name.to_string(),
        })
    }

    /// Check the shape of `raw` and split off the namespace if it has one.
    pub fn split(raw: &str) -> Result<(Option<&str>, &str)> {
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Ok((None, name)),
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => Ok((Some(ns), name)),
            _ => bail!("repository id {:?} is not of the form [namespace/]name", raw),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Lfs,
    Regular,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    #[serde(default)]
    upload: Option<LfsAction>,
    #[serde(default)]
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub commit_url: String,
    #[serde(default)]
    pub commit_oid: Option<String>,
}

/// Authenticated access to the dataset side of the Hugging Face Hub API.
pub struct HubClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl HubClient {
    pub fn new(client: Client, endpoint: &str, token: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Url::parse(&endpoint).with_context(|| format!("parsing Hub endpoint {}", endpoint))?;
        Ok(Self {
            client,
            endpoint,
            token: token.into(),
        })
    }

    /// Endpoint from `HF_ENDPOINT` (default huggingface.co) and the token a
    /// previous login stored.
    pub fn from_env(client: Client) -> Result<Self> {
        let endpoint = env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let token = auth::resolve_token()?;
        Self::new(client, &endpoint, token)
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/{}", self.endpoint, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
    }

    /// Check the token against the Hub and return the account name.
    pub fn whoami(&self) -> Result<String> {
        let url = self.api("whoami-v2");
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .with_context(|| format!("GET {}", url))?;
        let who: WhoAmI = check(resp, "verifying Hugging Face token")?
            .json()
            .context("decoding whoami response")?;
        Ok(who.name)
    }

    /// Create the dataset repo as public; an existing repo is left as is.
    #[instrument(level = "debug", skip(self, repo), fields(repo = %repo))]
    pub fn ensure_dataset_repo(&self, repo: &RepoId) -> Result<()> {
        let url = self.api("repos/create");
        let body = json!({
            "name": repo.name,
            "organization": repo.namespace,
            "type": "dataset",
            "private": false,
        });
        let resp = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .with_context(|| format!("POST {}", url))?;
        if resp.status() == StatusCode::CONFLICT {
            debug!("dataset repo already exists");
            return Ok(());
        }
        check(resp, &format!("creating dataset {}", repo))?;
        info!("created dataset repo");
        Ok(())
    }

    /// Force public visibility, whatever the repo was before.
    pub fn make_public(&self, repo: &RepoId) -> Result<()> {
        let url = self.api(&format!("datasets/{}/settings", repo));
        let resp = self
            .authed(self.client.put(&url))
            .json(&json!({ "private": false }))
            .send()
            .with_context(|| format!("PUT {}", url))?;
        check(resp, &format!("making {} public", repo))?;
        Ok(())
    }

    /// Put `content` at `path_in_repo` on the main branch in a single commit.
    #[instrument(level = "info", skip(self, repo, content, summary), fields(repo = %repo, bytes = content.len()))]
    pub fn upload_file(
        &self,
        repo: &RepoId,
        path_in_repo: &str,
        content: &[u8],
        summary: &str,
    ) -> Result<CommitInfo> {
        let oid = sha256_hex(content);
        let mode = self.preupload(repo, path_in_repo, content, &oid)?;
        debug!(?mode, %oid, "preupload");

        let operation = match mode {
            UploadMode::Lfs => {
                self.upload_lfs(repo, &oid, content)?;
                json!({
                    "key": "lfsFile",
                    "value": { "path": path_in_repo, "algo": "sha256", "oid": oid },
                })
            }
            UploadMode::Regular => json!({
                "key": "file",
                "value": {
                    "content": STANDARD.encode(content),
                    "path": path_in_repo,
                    "encoding": "base64",
                },
            }),
        };
        self.commit(repo, summary, &[operation])
    }

    fn preupload(&self, repo: &RepoId, path: &str, content: &[u8], oid: &str) -> Result<UploadMode> {
        let url = self.api(&format!("datasets/{}/preupload/{}", repo, DEFAULT_REVISION));
        let sample = &content[..content.len().min(SAMPLE_BYTES)];
        let body = json!({
            "files": [{
                "path": path,
                "sample": STANDARD.encode(sample),
                "size": content.len(),
                "sha": oid,
            }]
        });
        let resp = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .with_context(|| format!("POST {}", url))?;
        let parsed: PreuploadResponse = check(resp, "preupload")?
            .json()
            .context("decoding preupload response")?;
        parsed
            .files
            .into_iter()
            .find(|f| f.path == path)
            .map(|f| f.upload_mode)
            .ok_or_else(|| anyhow!("preupload response does not mention {}", path))
    }

    fn upload_lfs(&self, repo: &RepoId, oid: &str, content: &[u8]) -> Result<()> {
        let url = format!("{}/datasets/{}.git/info/lfs/objects/batch", self.endpoint, repo);
        let body = json!({
            "operation": "upload",
            "transfers": ["basic", "multipart"],
            "objects": [{ "oid": oid, "size": content.len() }],
            "hash_algo": "sha256",
        });
        let resp = self
            .authed(self.client.post(&url))
            .header(ACCEPT, LFS_CONTENT_TYPE)
            .header(CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(serde_json::to_vec(&body)?)
            .send()
            .with_context(|| format!("POST {}", url))?;
        let batch: LfsBatchResponse = check(resp, "LFS batch")?
            .json()
            .context("decoding LFS batch response")?;

        let object = batch
            .objects
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("LFS batch response has no objects"))?;
        if let Some(err) = object.error {
            bail!("LFS rejected {}: {} ({})", oid, err.message, err.code);
        }
        let Some(actions) = object.actions else {
            debug!(%oid, "LFS object already stored");
            return Ok(());
        };
        let Some(upload) = actions.upload else {
            debug!(%oid, "LFS object already stored");
            return Ok(());
        };

        if upload.header.contains_key("chunk_size") {
            self.upload_multipart(&upload, oid, content)?;
        } else {
            let mut req = self.client.put(&upload.href).body(content.to_vec());
            for (k, v) in &upload.header {
                req = req.header(k.as_str(), v.as_str());
            }
            let resp = req.send().context("PUT LFS object")?;
            check(resp, "uploading LFS object")?;
        }

        if let Some(verify) = actions.verify {
            let mut req = self
                .authed(self.client.post(&verify.href))
                .json(&json!({ "oid": oid, "size": content.len() }));
            for (k, v) in &verify.header {
                req = req.header(k.as_str(), v.as_str());
            }
            let resp = req.send().context("POST LFS verify")?;
            check(resp, "verifying LFS object")?;
        }
        info!(%oid, bytes = content.len(), "uploaded LFS object");
        Ok(())
    }

    /// Part URLs come as numbered header entries next to `chunk_size`; the
    /// upload href itself takes the completion payload.
    fn upload_multipart(&self, upload: &LfsAction, oid: &str, content: &[u8]) -> Result<()> {
        let chunk_size: usize = upload.header["chunk_size"]
            .parse()
            .context("parsing LFS chunk_size")?;
        if chunk_size == 0 {
            bail!("LFS server asked for zero-sized chunks");
        }

        let mut parts: Vec<(usize, &str)> = upload
            .header
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|n| (n, v.as_str())))
            .filter(|(n, _)| *n > 0)
            .collect();
        parts.sort_by_key(|(n, _)| *n);
        if parts.len() != content.len().div_ceil(chunk_size) {
            bail!(
                "LFS server sent {} part URLs for {} bytes in {}-byte chunks",
                parts.len(),
                content.len(),
                chunk_size
            );
        }

        let mut etags = Vec::with_capacity(parts.len());
        for (n, part_url) in parts {
            let start = (n - 1) * chunk_size;
            let end = (start + chunk_size).min(content.len());
            let chunk = content
                .get(start..end)
                .ok_or_else(|| anyhow!("LFS part {} is out of range", n))?;
            let resp = self
                .client
                .put(part_url)
                .body(chunk.to_vec())
                .send()
                .with_context(|| format!("PUT LFS part {}", n))?;
            let resp = check(resp, &format!("uploading LFS part {}", n))?;
            let etag = resp
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| anyhow!("LFS part {} response has no ETag", n))?
                .to_string();
            debug!(part = n, bytes = chunk.len(), "uploaded LFS part");
            etags.push(json!({ "partNumber": n, "etag": etag }));
        }

        let resp = self
            .client
            .post(&upload.href)
            .header(ACCEPT, LFS_CONTENT_TYPE)
            .header(CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(serde_json::to_vec(&json!({ "oid": oid, "parts": etags }))?)
            .send()
            .context("completing LFS multipart upload")?;
        check(resp, "completing LFS multipart upload")?;
        Ok(())
    }

    fn commit(&self, repo: &RepoId, summary: &str, operations: &[serde_json::Value]) -> Result<CommitInfo> {
        let url = self.api(&format!("datasets/{}/commit/{}", repo, DEFAULT_REVISION));
        let mut body = serde_json::to_string(&json!({
            "key": "header",
            "value": { "summary": summary, "description": "" },
        }))?;
        for op in operations {
            body.push('\n');
            body.push_str(&serde_json::to_string(op)?);
        }

        let resp = self
            .authed(self.client.post(&url))
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .with_context(|| format!("POST {}", url))?;
        check(resp, &format!("committing to {}", repo))?
            .json()
            .context("decoding commit response")
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Pass a success response through; turn anything else into an error that
/// carries the status and whatever the server said.
fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    bail!("{} failed: HTTP {}: {}", what, status, body.trim())
}
