//! Tracker catalog access over the Gazelle JSON API (`ajax.php`).

use crate::error::ReseedError;
use crate::reseed::config::TargetConfig;
use crate::reseed::query::SearchQuery;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("reseed/", env!("CARGO_PKG_VERSION"));

pub type CandidateId = u64;

/// One catalog release as needed for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub id: CandidateId,
    /// Folder name the torrent expects, entity-decoded.
    pub file_path: String,
    /// Raw `name{{{size}}}|||...` list.
    pub file_list_raw: String,
}

pub trait CatalogClient {
    /// Candidate ids for a query, in the order the catalog returned them.
    fn search(&self, query: &SearchQuery) -> Result<Vec<CandidateId>>;
    fn fetch_manifest(&self, id: CandidateId) -> Result<RemoteDescriptor>;
    /// The `.torrent` file contents.
    fn download_descriptor(&self, id: CandidateId) -> Result<Vec<u8>>;
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Session {
    ApiKey,
    Login { authkey: String, passkey: String },
}

pub struct GazelleClient {
    base_url: String,
    http: Client,
    session: Session,
}

fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Unwrap `{"status": "success", "response": ...}`.
pub fn parse_envelope(json: Value) -> Result<Value, ReseedError> {
    let status = json.get("status").and_then(Value::as_str).unwrap_or("");
    if status == "success" {
        return Ok(json.get("response").cloned().unwrap_or(Value::Null));
    }
    let reason = json
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(ReseedError::Catalog(format!(
        "api returned status `{status}`: {reason}"
    )))
}

fn as_id(value: &Value) -> Option<CandidateId> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub fn candidate_ids_from_browse(response: &Value) -> Vec<CandidateId> {
    let Some(results) = response.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };
    results
        .iter()
        .filter_map(|group| group.get("torrents").and_then(Value::as_array))
        .flatten()
        .filter_map(|torrent| torrent.get("torrentId").and_then(as_id))
        .collect()
}

pub fn descriptor_from_torrent(response: &Value) -> Result<RemoteDescriptor, ReseedError> {
    let torrent = response
        .get("torrent")
        .ok_or_else(|| ReseedError::Catalog("torrent response missing `torrent`".to_string()))?;
    let id = torrent
        .get("id")
        .and_then(as_id)
        .ok_or_else(|| ReseedError::Catalog("torrent response missing `id`".to_string()))?;
    let file_path = torrent
        .get("filePath")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let file_list_raw = torrent
        .get("fileList")
        .and_then(Value::as_str)
        .ok_or_else(|| ReseedError::Catalog(format!("torrent {id} missing `fileList`")))?;
    Ok(RemoteDescriptor {
        id,
        file_path: html_escape::decode_html_entities(file_path).into_owned(),
        file_list_raw: file_list_raw.to_string(),
    })
}

fn read_json(response: Response, what: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(ReseedError::Catalog(format!("{what} failed with status {status}")).into());
    }
    let json: Value = response
        .json()
        .with_context(|| format!("invalid JSON from {what}"))?;
    Ok(parse_envelope(json)?)
}

impl GazelleClient {
    pub fn connect(cfg: &TargetConfig) -> Result<Self> {
        let base_url = normalize_base_url(&cfg.url);
        let api_key = cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| ReseedError::InvalidConfig("api_key is not a valid header".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("failed to build HTTP client")?;

        if api_key.is_some() {
            return Ok(Self {
                base_url,
                http,
                session: Session::ApiKey,
            });
        }

        tracing::info!(url = %base_url, user = %cfg.username, "logging in");
        let login = http
            .post(format!("{base_url}login.php"))
            .form(&[
                ("username", cfg.username.as_str()),
                ("password", cfg.password.as_str()),
                ("keeplogged", "1"),
            ])
            .send()
            .context("login request failed")?;
        if !login.status().is_success() {
            anyhow::bail!(ReseedError::Catalog(format!(
                "login failed with status {}",
                login.status()
            )));
        }

        let mut client = Self {
            base_url,
            http,
            session: Session::ApiKey,
        };
        let index = client.ajax(&[("action", "index".to_string())])?;
        let authkey = index.get("authkey").and_then(Value::as_str);
        let passkey = index.get("passkey").and_then(Value::as_str);
        let (Some(authkey), Some(passkey)) = (authkey, passkey) else {
            anyhow::bail!(ReseedError::Catalog(
                "login did not yield an authkey; check username and password".to_string()
            ));
        };
        client.session = Session::Login {
            authkey: authkey.to_string(),
            passkey: passkey.to_string(),
        };
        Ok(client)
    }

    fn ajax(&self, params: &[(&str, String)]) -> Result<Value> {
        let action = params
            .iter()
            .find(|(k, _)| *k == "action")
            .map(|(_, v)| v.as_str())
            .unwrap_or("ajax");
        let response = self
            .http
            .get(format!("{}ajax.php", self.base_url))
            .query(params)
            .send()
            .with_context(|| format!("ajax.php?action={action} request failed"))?;
        read_json(response, &format!("ajax.php?action={action}"))
    }
}

impl CatalogClient for GazelleClient {
    fn search(&self, query: &SearchQuery) -> Result<Vec<CandidateId>> {
        let response = self.ajax(&[
            ("action", "browse".to_string()),
            ("searchstr", query.search_term.clone()),
            ("artistname", query.artist_term.clone()),
        ])?;
        Ok(candidate_ids_from_browse(&response))
    }

    fn fetch_manifest(&self, id: CandidateId) -> Result<RemoteDescriptor> {
        let response = self.ajax(&[("action", "torrent".to_string()), ("id", id.to_string())])?;
        Ok(descriptor_from_torrent(&response)?)
    }

    fn download_descriptor(&self, id: CandidateId) -> Result<Vec<u8>> {
        let request = match &self.session {
            Session::ApiKey => self
                .http
                .get(format!("{}ajax.php", self.base_url))
                .query(&[("action", "download".to_string()), ("id", id.to_string())]),
            Session::Login { authkey, passkey } => self
                .http
                .get(format!("{}torrents.php", self.base_url))
                .query(&[
                    ("action", "download".to_string()),
                    ("id", id.to_string()),
                    ("authkey", authkey.clone()),
                    ("torrent_pass", passkey.clone()),
                ]),
        };
        let response = request
            .send()
            .with_context(|| format!("download of torrent {id} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!(ReseedError::Catalog(format!(
                "download of torrent {id} failed with status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read torrent {id}"))?;
        if bytes.first() == Some(&b'{') {
            let json: Value = serde_json::from_slice(&bytes)
                .with_context(|| format!("torrent {id} download returned neither torrent nor JSON"))?;
            parse_envelope(json)?;
            anyhow::bail!(ReseedError::Catalog(format!(
                "torrent {id} download returned JSON instead of a torrent"
            )));
        }
        Ok(bytes.to_vec())
    }

    fn close(&self) -> Result<()> {
        let Session::Login { authkey, .. } = &self.session else {
            return Ok(());
        };
        self.http
            .get(format!("{}logout.php", self.base_url))
            .query(&[("auth", authkey.as_str())])
            .send()
            .context("logout request failed")?;
        Ok(())
    }
}
