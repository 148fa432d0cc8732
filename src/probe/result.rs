use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One completed HTTP exchange. Header names are stored lowercase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub request: String,
    pub final_url: String,
    pub status: u16,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    /// Build a result from already-captured data. Used when replaying stored
    /// responses and in tests.
    pub fn captured(request: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            map.entry(name.to_ascii_lowercase()).or_default().push(value.to_string());
        }
        Self {
            request: request.to_string(),
            final_url: String::new(),
            status,
            headers: map,
            body: body.to_string(),
            elapsed_ms: 0,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cookie names from every Set-Cookie header.
    pub fn set_cookie_names(&self) -> Vec<String> {
        self.header_values("set-cookie")
            .iter()
            .filter_map(|c| c.split(';').next())
            .filter_map(|pair| pair.split('=').next())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
