use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::models::{format_author, PackageMetadata};

#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PypiInfo {
    name: String,
    summary: Option<String>,
    version: Option<String>,
    home_page: Option<String>,
    docs_url: Option<String>,
    bugtrack_url: Option<String>,
    project_urls: Option<std::collections::HashMap<String, String>>,
    author: Option<String>,
    author_email: Option<String>,
    license: Option<String>,
    requires_dist: Option<Vec<String>>,
}

/// Client for the PyPI JSON API.
#[derive(Debug, Clone)]
pub struct PypiClient {
    client: Client,
    base_url: String,
}

impl PypiClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch the latest release metadata for `name`.
    ///
    /// Returns `Ok(None)` when PyPI does not know the package and `Err` for
    /// any other unexpected status.
    pub async fn info(&self, name: &str) -> Result<Option<PackageMetadata>> {
        let url = format!("{}/pypi/{}/json", self.base_url, name);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", concat!("unipm/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => bail!("GET {}: received status {}", url, status),
            _ => {}
        }

        let data: PypiResponse = response
            .json()
            .await
            .with_context(|| format!("PyPI response for {}", name))?;

        Ok(Some(to_metadata(data.info)))
    }
}

fn to_metadata(info: PypiInfo) -> PackageMetadata {
    let project_url = |keys: &[&str]| -> String {
        info.project_urls
            .as_ref()
            .and_then(|urls| {
                urls.iter()
                    .find(|(k, _)| keys.iter().any(|key| k.eq_ignore_ascii_case(key)))
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or_default()
    };

    let homepage_url = info
        .home_page
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| project_url(&["Homepage", "Home"]));

    let documentation_url = info
        .docs_url
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| project_url(&["Documentation", "Docs"]));

    let bug_tracker_url = info
        .bugtrack_url
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| project_url(&["Bug Tracker", "Issues", "Tracker"]));

    let dependencies = info
        .requires_dist
        .as_deref()
        .unwrap_or_default()
        .iter()
        // Optional extras are not dependencies of the base package
        .filter(|line| !line.contains("extra =="))
        .filter_map(|line| requirement_name(line))
        .collect();

    PackageMetadata {
        description: info.summary.clone().unwrap_or_default(),
        version: info.version.clone().unwrap_or_default(),
        homepage_url,
        documentation_url,
        source_code_url: project_url(&["Source", "Source Code", "Repository", "Code"]),
        bug_tracker_url,
        author: format_author(
            info.author.as_deref().unwrap_or_default(),
            info.author_email.as_deref().unwrap_or_default(),
        ),
        license: info.license.clone().unwrap_or_default(),
        dependencies,
        name: info.name,
    }
}

/// `"requests (>=2.0) ; python_version < '3'"` → `"requests"`.
fn requirement_name(line: &str) -> Option<String> {
    let end = line
        .find(|c: char| c.is_whitespace() || "<>=!~;[(".contains(c))
        .unwrap_or(line.len());
    let name = line[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_requirement_name() {
        assert_eq!(requirement_name("idna (<4,>=2.5)"), Some("idna".to_string()));
        assert_eq!(requirement_name("urllib3>=1.21.1"), Some("urllib3".to_string()));
        assert_eq!(requirement_name("PySocks[socks]"), Some("PySocks".to_string()));
        assert_eq!(requirement_name(""), None);
    }

    #[tokio::test]
    async fn test_info_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"info": {
                    "name": "requests",
                    "summary": "Python HTTP for Humans.",
                    "version": "2.31.0",
                    "home_page": "",
                    "project_urls": {"Homepage": "https://requests.readthedocs.io", "Source": "https://github.com/psf/requests"},
                    "author": "Kenneth Reitz",
                    "author_email": "me@kennethreitz.org",
                    "license": "Apache 2.0",
                    "docs_url": null,
                    "requires_dist": ["charset-normalizer (<4,>=2)", "PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'"]
                }}"#,
            )
            .create_async()
            .await;

        let pypi = PypiClient::new(Client::new(), server.url());
        let info = pypi.info("requests").await.unwrap().unwrap();
        assert_eq!(info.name, "requests");
        assert_eq!(info.version, "2.31.0");
        assert_eq!(info.homepage_url, "https://requests.readthedocs.io");
        assert_eq!(info.source_code_url, "https://github.com/psf/requests");
        assert_eq!(info.author, "Kenneth Reitz <me@kennethreitz.org>");
        assert_eq!(info.dependencies, ["charset-normalizer"]);
    }

    #[tokio::test]
    async fn test_info_not_found_is_empty() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/no-such-package/json")
            .with_status(404)
            .create_async()
            .await;

        let pypi = PypiClient::new(Client::new(), server.url());
        assert!(pypi.info("no-such-package").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_info_unexpected_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/flask/json")
            .with_status(503)
            .create_async()
            .await;

        let pypi = PypiClient::new(Client::new(), server.url());
        let err = pypi.info("flask").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
