//! Blocking HTTP/JSON provider.
//!
//! The provider speaks a small JSON API:
//!
//! - `POST {base}/session` with `{"identity", "secret"}` answers `{"token"}`
//! - `GET {base}/folders/{id}/children` answers `[{"id", "name", "kind"}]`
//! - `GET {base}/items/{id}/content` answers the raw file body
//!
//! Every request after authentication carries the session token as a bearer
//! token. Redirects are followed by the client.

use crate::error::{Error, Result};
use crate::item::{ItemId, RemoteListing};
use crate::provider::{FetchedContent, RemoteProvider, Session};
use log::{debug, trace, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classification marker for folders.
const KIND_FOLDER: &str = "folder";
/// Classification marker for files.
const KIND_FILE: &str = "file";

/// Configuration for `HttpProvider`.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Base URL of the provider API.
    pub base_url: String,
    /// Identifier of the root folder.
    pub root_id: String,
    /// Deadline applied to every request.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            root_id: "-1".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("cloud-remote/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// `RemoteProvider` backed by a JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base: Url,
    config: HttpProviderConfig,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    identity: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct ListingEntry {
    id: String,
    name: String,
    kind: String,
}

impl HttpProvider {
    /// Create a provider from its configuration.
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let base = parse_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// The configuration this provider was built with.
    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.base, segments)
    }
}

impl RemoteProvider for HttpProvider {
    fn root_id(&self) -> ItemId {
        ItemId::new(self.config.root_id.clone())
    }

    fn authenticate(&self, identity: &str, secret: &SecretString) -> Result<Session> {
        let url = self.endpoint(&["session"])?;
        debug!("Authenticating '{}' against {}", identity, url);

        let response = self
            .client
            .post(url)
            .json(&LoginRequest {
                identity,
                secret: secret.expose_secret(),
            })
            .send()?;
        let body = check_status(response)?.bytes()?;
        let login: LoginResponse = serde_json::from_slice(&body)?;

        Ok(Session::new(identity, SecretString::new(login.token)))
    }

    fn list_children(&self, session: &Session, folder: &ItemId) -> Result<Vec<RemoteListing>> {
        let url = self.endpoint(&["folders", folder.as_str(), "children"])?;
        trace!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(session.token.expose_secret())
            .send()?;
        let body = check_status(response)?.bytes()?;
        parse_listing(&body)
    }

    fn fetch_content(&self, session: &Session, identifier: &ItemId) -> Result<FetchedContent> {
        let url = self.endpoint(&["items", identifier.as_str(), "content"])?;
        trace!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(session.token.expose_secret())
            .send()?;
        let response = check_status(response)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response.bytes()?.to_vec();

        debug!(
            "Fetched {} bytes for {} ({})",
            data.len(),
            identifier,
            content_type.as_deref().unwrap_or("unknown type")
        );
        Ok(FetchedContent::new(data, content_type))
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut base = Url::parse(base_url)
        .map_err(|e| Error::Transport(format!("invalid base url '{}': {}", base_url, e)))?;
    if base.cannot_be_a_base() {
        return Err(Error::Transport(format!(
            "base url '{}' cannot carry a path",
            base_url
        )));
    }
    // Url::path_segments_mut would otherwise keep an empty trailing segment.
    let trimmed = base.path().trim_end_matches('/').to_string();
    base.set_path(&trimmed);
    Ok(base)
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Transport(format!("base url '{}' cannot carry a path", base)))?
        .extend(segments);
    Ok(url)
}

fn check_status(response: Response) -> Result<Response> {
    match status_error(response.status()) {
        Some(e) => Err(e),
        None => Ok(response),
    }
}

/// Error for a response status, `None` on success.
fn status_error(status: StatusCode) -> Option<Error> {
    match status {
        s if s.is_success() => None,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(Error::Authentication(format!(
            "provider rejected the session ({})",
            status
        ))),
        _ => Some(Error::Transport(format!(
            "server returned status code {}",
            status.as_u16()
        ))),
    }
}

/// Parse a folder listing body, keeping only folders and files.
pub fn parse_listing(body: &[u8]) -> Result<Vec<RemoteListing>> {
    let entries: Vec<ListingEntry> = serde_json::from_slice(body)?;
    let mut listings = Vec::with_capacity(entries.len());

    for entry in entries {
        let is_folder = match entry.kind.as_str() {
            KIND_FOLDER => true,
            KIND_FILE => false,
            other => {
                warn!("Skipping '{}' with unknown kind '{}'", entry.name, other);
                continue;
            }
        };
        listings.push(RemoteListing {
            identifier: ItemId::new(entry.id),
            name: entry.name,
            is_folder,
        });
    }

    Ok(listings)
}
