use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::models::{format_author, PackageMetadata};

/// Client for the npm registry.
#[derive(Debug, Clone)]
pub struct NpmClient {
    client: Client,
    base_url: String,
}

/// A search hit with the registry's popularity estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub name: String,
    pub popularity: u64,
}

impl NpmClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("User-Agent", concat!("unipm/", env!("CARGO_PKG_VERSION")))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => bail!("GET {}: received status {}", url, status),
            _ => Ok(Some(
                response
                    .json()
                    .await
                    .with_context(|| format!("npm response from {}", url))?,
            )),
        }
    }

    /// Fetch metadata of the `latest` dist-tag of `name`.
    pub async fn info(&self, name: &str) -> Result<Option<PackageMetadata>> {
        let url = package_url(&self.base_url, name);

        let Some(data) = self.get_json(&url, &[]).await? else {
            return Ok(None);
        };

        let latest = data
            .get("dist-tags")
            .and_then(|d| d.get("latest"))
            .and_then(Value::as_str);
        let Some(release) = latest.and_then(|v| data.get("versions").and_then(|vs| vs.get(v)))
        else {
            return Ok(None);
        };

        Ok(Some(to_metadata(name, release)))
    }

    /// Query the registry search endpoint.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = format!("{}/-/v1/search", self.base_url);

        let Some(data) = self.get_json(&url, &[("text", query), ("size", "250")]).await? else {
            return Ok(Vec::new());
        };

        let hits = data
            .get("objects")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|obj| {
                let name = obj.get("package")?.get("name")?.as_str()?.to_string();
                let popularity = obj
                    .get("score")
                    .and_then(|s| s.get("detail"))
                    .and_then(|d| d.get("popularity"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                Some(SearchHit {
                    name,
                    // The registry reports popularity in [0, 1]
                    popularity: (popularity * 1_000_000.0).round() as u64,
                })
            })
            .collect();

        Ok(hits)
    }
}

fn package_url(base_url: &str, name: &str) -> String {
    // Scoped packages need URL encoding: @scope/pkg → %40scope%2Fpkg
    let encoded_name = name.replace('@', "%40").replace('/', "%2F");
    format!("{}/{}", base_url, encoded_name)
}

fn to_metadata(name: &str, release: &Value) -> PackageMetadata {
    let text = |key: &str| {
        release
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    // `license` is either "MIT" or the legacy { "type": "MIT" }
    let license = match release.get("license") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(obj)) => obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    // `author` is either "Name <email>" or { "name": ..., "email": ... }
    let author = match release.get("author") {
        Some(Value::String(s)) => s.clone(),
        Some(obj @ Value::Object(_)) => format_author(
            obj.get("name").and_then(Value::as_str).unwrap_or_default(),
            obj.get("email").and_then(Value::as_str).unwrap_or_default(),
        ),
        _ => String::new(),
    };

    let repository = match release.get("repository") {
        Some(Value::String(s)) => s.clone(),
        Some(obj @ Value::Object(_)) => obj
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    let bug_tracker_url = release
        .get("bugs")
        .and_then(|b| b.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let dependencies = release
        .get("dependencies")
        .and_then(Value::as_object)
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default();

    PackageMetadata {
        name: name.to_string(),
        description: text("description"),
        version: text("version"),
        homepage_url: text("homepage"),
        source_code_url: repository,
        bug_tracker_url,
        author,
        license,
        dependencies,
        ..PackageMetadata::default()
    }
}
