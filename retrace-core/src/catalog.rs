// Captured request/response pairs, as handed over by the capture side

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl CapturedResponse {
    /// Content type, looked up case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Whether `value` occurs verbatim in the body or in any header value.
    pub fn contains(&self, value: &str) -> bool {
        if let Some(ref text) = self.text
            && text.contains(value)
        {
            return true;
        }

        if let Some(ref json) = self.json {
            // Raw text is usually present too, but some captures only keep the parsed form
            if json_contains(json, value) {
                return true;
            }
        }

        self.headers.values().any(|header| header.contains(value))
    }
}

fn json_contains(json: &Value, value: &str) -> bool {
    match json {
        Value::String(s) => s.contains(value),
        Value::Array(items) => items.iter().any(|item| json_contains(item, value)),
        Value::Object(map) => map
            .iter()
            .any(|(key, item)| key.contains(value) || json_contains(item, value)),
        other => other.to_string().contains(value),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CapturedResponse>,
}

impl CapturedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            query_params: None,
            body: None,
            response: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_response(mut self, response: CapturedResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn identity_key(&self) -> String {
        identity_key(&self.method, &self.url, self.body.as_ref())
    }

    /// Strip the response off, keeping what a replay of this call needs.
    pub fn describe(&self, catalog_index: usize) -> RequestDescription {
        RequestDescription {
            catalog_index,
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            query_params: self.query_params.clone(),
            body: self.body.clone(),
        }
    }
}

/// A request without its response: node content and oracle input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescription {
    pub catalog_index: usize,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestDescription {
    pub fn identity_key(&self) -> String {
        identity_key(&self.method, &self.url, self.body.as_ref())
    }
}

/// `METHOD url`, followed by the body text when there is one.
pub fn identity_key(method: &str, url: &str, body: Option<&Value>) -> String {
    match body.and_then(body_text) {
        Some(body) => format!("{} {} {}", method.to_uppercase(), url, body),
        None => format!("{} {}", method.to_uppercase(), url),
    }
}

/// Body as it went over the wire: strings verbatim, everything else as JSON.
pub fn body_text(body: &Value) -> Option<String> {
    match body {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Immutable, capture-ordered list of request/response pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestCatalog {
    entries: Vec<CapturedRequest>,
}

impl RequestCatalog {
    pub fn new(entries: Vec<CapturedRequest>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CapturedRequest] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CapturedRequest> {
        self.entries.get(index)
    }

    /// Entries captured strictly before `index`.
    pub fn preceding(&self, index: usize) -> &[CapturedRequest] {
        &self.entries[..index.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locate the captured call for an action URL.
    ///
    /// An exact URL match wins over a match that ignores the query string.
    /// Among equal matches the most recent capture is used.
    pub fn find_action(&self, action_url: &str) -> Option<usize> {
        let exact = self
            .entries
            .iter()
            .rposition(|entry| entry.url == action_url);
        if exact.is_some() {
            return exact;
        }

        let wanted = strip_query(action_url);
        self.entries
            .iter()
            .rposition(|entry| strip_query(&entry.url) == wanted)
    }

    /// Parse the native entry-array format.
    pub fn from_json(content: &str) -> Result<Self> {
        let entries: Vec<CapturedRequest> = serde_json::from_str(content)?;
        Ok(Self::new(entries))
    }

    /// Parse a HAR 1.2 document.
    pub fn from_har(content: &str) -> Result<Self> {
        let har: HarFile = serde_json::from_str(content)?;
        let entries: Vec<CapturedRequest> =
            har.log.entries.into_iter().map(HarEntry::into_captured).collect();
        debug!("Parsed {} HAR entries", entries.len());
        Ok(Self::new(entries))
    }

    /// Load a capture file, detecting HAR vs the native format.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;

        match value {
            Value::Object(ref map) if map.contains_key("log") => Self::from_har(&content),
            Value::Array(_) => Self::from_json(&content),
            _ => Err(Error::InvalidCapture(format!(
                "{} is neither a HAR document nor an array of requests",
                path.display()
            ))),
        }
    }
}

fn strip_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}

// HAR wire format. Only the fields the analysis reads are modelled.

#[derive(Debug, Deserialize)]
struct HarFile {
    log: HarLog,
}

#[derive(Debug, Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
struct HarEntry {
    request: HarRequest,
    #[serde(default)]
    response: Option<HarResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<HarNameValue>,
    #[serde(default)]
    query_string: Vec<HarNameValue>,
    #[serde(default)]
    post_data: Option<HarPostData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarPostData {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarResponse {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    headers: Vec<HarNameValue>,
    #[serde(default)]
    content: Option<HarContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarContent {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarNameValue {
    name: String,
    value: String,
}

fn collect_headers(pairs: Vec<HarNameValue>) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for pair in pairs {
        // HTTP/2 pseudo-headers are not replayable
        if pair.name.starts_with(':') {
            continue;
        }
        headers
            .entry(pair.name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&pair.value);
            })
            .or_insert(pair.value);
    }
    headers
}

fn is_json_mime(mime: Option<&str>) -> bool {
    mime.map(|m| m.to_lowercase().contains("json")).unwrap_or(false)
}

impl HarEntry {
    fn into_captured(self) -> CapturedRequest {
        let HarRequest {
            method,
            url,
            headers,
            query_string,
            post_data,
        } = self.request;

        let query_params = if query_string.is_empty() {
            None
        } else {
            Some(
                query_string
                    .into_iter()
                    .map(|pair| (pair.name, pair.value))
                    .collect(),
            )
        };

        let body = post_data.and_then(|data| {
            let text = data.text?;
            if is_json_mime(data.mime_type.as_deref())
                && let Ok(parsed) = serde_json::from_str::<Value>(&text)
            {
                return Some(parsed);
            }
            Some(Value::String(text))
        });

        let response = self.response.map(|response| {
            let (mime_type, text) = match response.content {
                // Binary bodies are base64 in HAR and never hold a textual token
                Some(content) if content.encoding.as_deref() == Some("base64") => {
                    (content.mime_type, None)
                }
                Some(content) => (content.mime_type, content.text),
                None => (None, None),
            };

            let json = text
                .as_deref()
                .filter(|_| is_json_mime(mime_type.as_deref()))
                .and_then(|t| serde_json::from_str::<Value>(t).ok());

            let mut headers = collect_headers(response.headers);
            if let Some(mime) = mime_type
                && !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                headers.insert("content-type".to_string(), mime);
            }

            CapturedResponse {
                status: response.status,
                headers,
                text,
                json,
            }
        });

        CapturedRequest {
            method,
            url,
            headers: collect_headers(headers),
            query_params,
            body,
            response,
        }
    }
}
