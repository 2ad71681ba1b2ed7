//! Source resolution for dynamic values.
//!
//! Every value is classified into exactly one bucket: a cookie, an earlier
//! response, or not found. Cookies are searched first and win over any
//! response that happens to contain the same text.

use crate::catalog::CapturedRequest;
use crate::cookies::CookieJar;
use crate::graph::dedup_ordered;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieDependency {
    pub cookie_key: String,
    pub dynamic_part: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDependency {
    /// Catalog index of the entry whose response supplies the value.
    pub source_request: usize,
    pub dynamic_part: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDependency {
    pub dynamic_part: String,
}

/// A resolved dependency, serialized as `{"cookie": {..}}` or `{"request": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Cookie(CookieDependency),
    Request(RequestDependency),
}

impl Dependency {
    pub fn dynamic_part(&self) -> &str {
        match self {
            Dependency::Cookie(dep) => &dep.dynamic_part,
            Dependency::Request(dep) => &dep.dynamic_part,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub cookie_deps: Vec<CookieDependency>,
    pub request_deps: Vec<RequestDependency>,
    pub not_found: Vec<NotFoundDependency>,
}

impl Resolution {
    /// Resolved dependencies, cookies first.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.cookie_deps
            .iter()
            .cloned()
            .map(Dependency::Cookie)
            .chain(self.request_deps.iter().cloned().map(Dependency::Request))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.cookie_deps.len() + self.request_deps.len() + self.not_found.len()
    }
}

/// Matches values against a cookie jar and a capture-ordered list of entries.
///
/// Holds borrowed inputs only; resolving never mutates them.
pub struct DependencyResolver<'a> {
    entries: &'a [CapturedRequest],
    cookies: &'a CookieJar,
    excluded: Option<String>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(entries: &'a [CapturedRequest], cookies: &'a CookieJar) -> Self {
        Self {
            entries,
            cookies,
            excluded: None,
        }
    }

    /// Never pick a source whose identity key is `identity_key`, typically
    /// the consumer's own call replayed earlier in the capture.
    pub fn excluding(mut self, identity_key: impl Into<String>) -> Self {
        self.excluded = Some(identity_key.into());
        self
    }

    pub fn resolve(&self, values: &[String]) -> Resolution {
        let mut resolution = Resolution::default();

        for value in dedup_ordered(values.to_vec()) {
            if value.is_empty() {
                resolution.not_found.push(NotFoundDependency {
                    dynamic_part: value,
                });
                continue;
            }

            if let Some(cookie) = self.cookies.find_by_value(&value) {
                debug!("'{}' resolved to cookie {}", value, cookie.name);
                resolution.cookie_deps.push(CookieDependency {
                    cookie_key: cookie.name.clone(),
                    dynamic_part: value,
                });
                continue;
            }

            match self.find_source_request(&value) {
                Some(index) => {
                    debug!("'{}' resolved to request #{}", value, index);
                    resolution.request_deps.push(RequestDependency {
                        source_request: index,
                        dynamic_part: value,
                    });
                }
                None => {
                    debug!("'{}' has no source", value);
                    resolution.not_found.push(NotFoundDependency {
                        dynamic_part: value,
                    });
                }
            }
        }

        resolution
    }

    /// The simplest eligible entry whose response contains `value`.
    fn find_source_request(&self, value: &str) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| is_eligible_source(entry))
            .filter(|(_, entry)| {
                self.excluded
                    .as_deref()
                    .is_none_or(|excluded| entry.identity_key() != excluded)
            })
            .filter(|(_, entry)| {
                entry
                    .response
                    .as_ref()
                    .is_some_and(|response| response.contains(value))
            })
            .min_by_key(|(index, entry)| simplicity_key(*index, entry))
            .map(|(index, _)| index)
    }
}

/// Static assets often embed token-like strings; never treat them as sources.
pub fn is_eligible_source(entry: &CapturedRequest) -> bool {
    let Some(ref response) = entry.response else {
        return false;
    };

    if let Some(content_type) = response.content_type() {
        let content_type = content_type.to_lowercase();
        if content_type.contains("javascript") || content_type.contains("html") {
            return false;
        }
    }

    let path = url_path(&entry.url).to_lowercase();
    !(path.ends_with(".js") || path.ends_with(".html"))
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}

/// Total order used to break ties between matching entries: GET first, then
/// fewer headers, then a shorter URL, then capture order.
fn simplicity_key(index: usize, entry: &CapturedRequest) -> (u8, usize, usize, usize) {
    let verb_rank = if entry.method.eq_ignore_ascii_case("GET") {
        0
    } else {
        1
    };
    (verb_rank, entry.headers.len(), url_complexity(entry), index)
}

fn url_complexity(entry: &CapturedRequest) -> usize {
    let Ok(parsed) = Url::parse(&entry.url) else {
        return entry.url.matches('/').count()
            + entry.query_params.as_ref().map_or(0, |q| q.len());
    };

    let segments = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0);
    let params = match entry.query_params {
        Some(ref params) => params.len(),
        None => parsed.query_pairs().count(),
    };
    segments + params
}
