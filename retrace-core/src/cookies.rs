// Cookie jar captured alongside the session

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
}

impl CookieEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            secure: None,
            http_only: None,
        }
    }
}

/// Cookies keyed by name, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<CookieEntry>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie, replacing any existing one with the same name in place.
    pub fn insert(&mut self, entry: CookieEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CookieEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// First cookie whose value is exactly `value`.
    pub fn find_by_value(&self, value: &str) -> Option<&CookieEntry> {
        self.entries.iter().find(|e| e.value == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CookieEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accepts a browser export (array of cookie objects) or an object keyed
    /// by cookie name whose values are either plain strings or cookie objects.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CookieFile = serde_json::from_str(content)?;
        let mut jar = CookieJar::new();

        match file {
            CookieFile::List(entries) => {
                for entry in entries {
                    jar.insert(entry);
                }
            }
            CookieFile::Keyed(map) => {
                for (name, cookie) in map {
                    let entry = match cookie {
                        KeyedCookie::Plain(value) => CookieEntry::new(name, value),
                        KeyedCookie::Full(attrs) => CookieEntry {
                            name,
                            value: attrs.value,
                            domain: attrs.domain,
                            path: attrs.path,
                            secure: attrs.secure,
                            http_only: attrs.http_only,
                        },
                    };
                    jar.insert(entry);
                }
            }
        }

        Ok(jar)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl FromIterator<CookieEntry> for CookieJar {
    fn from_iter<I: IntoIterator<Item = CookieEntry>>(iter: I) -> Self {
        let mut jar = CookieJar::new();
        for entry in iter {
            jar.insert(entry);
        }
        jar
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<CookieEntry>),
    Keyed(BTreeMap<String, KeyedCookie>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyedCookie {
    Plain(String),
    Full(KeyedAttributes),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyedAttributes {
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: Option<bool>,
    #[serde(default)]
    http_only: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut jar = CookieJar::new();
        jar.insert(CookieEntry::new("a", "1"));
        jar.insert(CookieEntry::new("b", "2"));
        jar.insert(CookieEntry::new("a", "3"));

        let names: Vec<&str> = jar.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(jar.get("a").unwrap().value, "3");
    }

    #[test]
    fn test_from_json_browser_export() {
        let jar = CookieJar::from_json(
            r#"[
                {"name": "session_cookie", "value": "sess456", "domain": ".example.com", "httpOnly": true},
                {"name": "theme", "value": "dark"}
            ]"#,
        )
        .unwrap();

        assert_eq!(jar.len(), 2);
        let session = jar.find_by_value("sess456").unwrap();
        assert_eq!(session.name, "session_cookie");
        assert_eq!(session.http_only, Some(true));
    }

    #[test]
    fn test_from_json_keyed_object() {
        let jar = CookieJar::from_json(
            r#"{"csrftoken": "abc", "sid": {"value": "xyz", "secure": true}}"#,
        )
        .unwrap();

        assert_eq!(jar.get("csrftoken").unwrap().value, "abc");
        assert_eq!(jar.get("sid").unwrap().secure, Some(true));
    }

    #[test]
    fn test_find_by_value_is_exact() {
        let jar: CookieJar = vec![CookieEntry::new("sid", "abc123")].into_iter().collect();
        assert!(jar.find_by_value("abc").is_none());
        assert!(jar.find_by_value("abc123").is_some());
    }
}
