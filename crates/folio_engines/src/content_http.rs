#![forbid(unsafe_code)]

use std::env;
use std::io::Read;
use std::time::Duration;

use folio_kernel_contracts::content::{ChildBatch, CreatedLibrary, FetchError};
use folio_kernel_contracts::hierarchy::{Credential, Entity, EntityId, LibraryName, Rank};
use serde_json::Value;
use url::Url;

pub const CONTENT_BASE_URL_DEFAULT: &str = "http://localhost:5000/api/";
pub const CONTENT_TIMEOUT_MS_DEFAULT: u32 = 10_000;
pub const CONTENT_USER_AGENT_DEFAULT: &str = "folio-explorer/0.1";
pub const CONTENT_BODY_MAX_BYTES_DEFAULT: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHttpConfig {
    pub base_url: Url,
    pub timeout_ms: u32,
    pub user_agent: String,
    pub max_body_bytes: u64,
}

impl ContentHttpConfig {
    pub fn mvp_v1() -> Self {
        Self {
            base_url: parse_base_url(CONTENT_BASE_URL_DEFAULT)
                .expect("default content base url must parse"),
            timeout_ms: CONTENT_TIMEOUT_MS_DEFAULT,
            user_agent: CONTENT_USER_AGENT_DEFAULT.to_string(),
            max_body_bytes: CONTENT_BODY_MAX_BYTES_DEFAULT,
        }
    }

    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::mvp_v1();
        if let Some(raw) = lookup("FOLIO_CONTENT_BASE_URL").and_then(trim_non_empty) {
            config.base_url = parse_base_url(&raw)?;
        }
        if let Some(timeout_ms) = lookup("FOLIO_HTTP_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| (100..=60_000).contains(v))
        {
            config.timeout_ms = timeout_ms;
        }
        if let Some(user_agent) = lookup("FOLIO_HTTP_USER_AGENT").and_then(trim_non_empty) {
            config.user_agent = user_agent;
        }
        if let Some(max_body_bytes) = lookup("FOLIO_HTTP_MAX_BODY_BYTES")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (1024..=64 * 1024 * 1024).contains(v))
        {
            config.max_body_bytes = max_body_bytes;
        }
        Ok(config)
    }
}

fn trim_non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_base_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| format!("invalid content base url: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "content base url must be http or https, got {}",
            url.scheme()
        ));
    }
    if url.cannot_be_a_base() {
        return Err("content base url cannot carry a path".to_string());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Blocking client for the content service. One attempt per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpContentClient {
    config: ContentHttpConfig,
    agent: ureq::Agent,
}

impl HttpContentClient {
    pub fn new(config: ContentHttpConfig) -> Result<Self, String> {
        let agent = build_http_agent(config.timeout_ms, &config.user_agent)?;
        Ok(Self { config, agent })
    }

    pub fn config(&self) -> &ContentHttpConfig {
        &self.config
    }

    pub fn endpoint_for(&self, rank: Rank, parent_id: Option<&EntityId>) -> Result<Url, FetchError> {
        let segments = collection_segments(rank, parent_id)?;
        let mut url = self.config.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| FetchError::network("content base url cannot be a base"))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    pub fn fetch_children(
        &self,
        rank: Rank,
        parent_id: Option<&EntityId>,
        credential: &Credential,
    ) -> Result<ChildBatch, FetchError> {
        let url = self.endpoint_for(rank, parent_id)?;
        tracing::debug!(
            rank = %rank,
            parent_id = parent_id.map(EntityId::as_str),
            credential = credential.kind_label(),
            "fetching children"
        );
        let response = self
            .agent
            .get(url.as_str())
            .set("Accept", "application/json")
            .set(
                "Authorization",
                &format!("Bearer {}", credential.bearer_token()),
            )
            .call()
            .map_err(fetch_error_from_ureq)?;
        let raw = self.read_body(response)?;
        let body: Value = serde_json::from_slice(&raw)
            .map_err(|e| FetchError::malformed(format!("json_parse: {e}")))?;
        decode_entities(rank, &body)
    }

    pub fn create_library(
        &self,
        name: &LibraryName,
        credential: &Credential,
    ) -> Result<CreatedLibrary, FetchError> {
        let url = self.endpoint_for(Rank::Library, None)?;
        tracing::debug!(
            library_name = name.as_str(),
            credential = credential.kind_label(),
            "creating library"
        );
        let response = self
            .agent
            .post(url.as_str())
            .set("Accept", "application/json")
            .set(
                "Authorization",
                &format!("Bearer {}", credential.bearer_token()),
            )
            .send_json(serde_json::json!({ "name": name.as_str() }))
            .map_err(fetch_error_from_ureq)?;
        let raw = self.read_body(response)?;
        let entity = decode_created_library(&String::from_utf8_lossy(&raw));
        CreatedLibrary::v1(name.clone(), entity)
            .map_err(|e| FetchError::malformed(format!("created library: {e}")))
    }

    /// Reads at most `max_body_bytes`; a longer body is rejected rather than truncated.
    fn read_body(&self, response: ureq::Response) -> Result<Vec<u8>, FetchError> {
        let limit = self.config.max_body_bytes;
        let mut raw = Vec::new();
        response
            .into_reader()
            .take(limit.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|e| FetchError::network(format!("read_body: {e}")))?;
        if raw.len() as u64 > limit {
            return Err(FetchError::malformed(format!(
                "body_too_large: limit={limit} bytes"
            )));
        }
        Ok(raw)
    }
}

fn build_http_agent(timeout_ms: u32, user_agent: &str) -> Result<ureq::Agent, String> {
    if timeout_ms == 0 {
        return Err("timeout must be > 0".to_string());
    }
    let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
    Ok(ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .try_proxy_from_env(false)
        .build())
}

fn collection_segments<'a>(
    rank: Rank,
    parent_id: Option<&'a EntityId>,
) -> Result<Vec<&'a str>, FetchError> {
    let (parent_collection, collection) = match rank {
        Rank::Library => {
            if parent_id.is_some() {
                return Err(FetchError::malformed("root rank takes no parent id"));
            }
            return Ok(vec!["libraries"]);
        }
        Rank::Book => ("libraries", "books"),
        Rank::Section => ("books", "sections"),
        Rank::Chapter => ("sections", "chapters"),
        Rank::Act => ("chapters", "acts"),
        Rank::ParentAction => ("acts", "parent-actions"),
        Rank::Action => ("parent-actions", "actions"),
    };
    let parent_id = parent_id.ok_or_else(|| FetchError::malformed("child rank requires a parent id"))?;
    Ok(vec![parent_collection, parent_id.as_str(), collection])
}

fn fetch_error_from_ureq(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(status, _) => match status {
            401 | 403 => FetchError::AuthRejected { status },
            404 => FetchError::NotFound,
            _ => FetchError::network(format!("http_status={status}")),
        },
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            FetchError::network(classify_transport_error_kind(&combined))
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

/// Only a non-array body is malformed. Rows that do not decode are skipped and counted.
pub fn decode_entities(rank: Rank, body: &Value) -> Result<ChildBatch, FetchError> {
    let rows = body
        .as_array()
        .ok_or_else(|| FetchError::malformed(format!("{rank} payload is not an array")))?;
    let mut batch = ChildBatch {
        entities: Vec::with_capacity(rows.len()),
        skipped_rows: 0,
    };
    for (index, row) in rows.iter().enumerate() {
        match decode_entity(rank, row) {
            Some(entity) => batch.entities.push(entity),
            None => {
                tracing::warn!(rank = %rank, row = index, "skipping row missing required fields");
                batch.skipped_rows += 1;
            }
        }
    }
    Ok(batch)
}

pub fn decode_entity(rank: Rank, row: &Value) -> Option<Entity> {
    let id = row.get("id").and_then(id_text)?;
    let label = row.get(rank.label_field())?.as_str()?.to_string();
    let parent_id = match rank.parent_field() {
        Some(field) => Some(row.get(field).and_then(id_text)?),
        None => None,
    };
    Entity::v1(
        EntityId::new(id).ok()?,
        label,
        match parent_id {
            Some(raw) => Some(EntityId::new(raw).ok()?),
            None => None,
        },
    )
    .ok()
}

fn decode_created_library(raw: &str) -> Option<Entity> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let body: Value = serde_json::from_str(trimmed).ok()?;
    // Some services wrap the stored row, e.g. {"library": {...}}.
    let row = body.get("library").unwrap_or(&body);
    decode_entity(Rank::Library, row)
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => trim_non_empty(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
