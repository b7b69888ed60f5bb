//! Keystone v3 password authentication and service catalog lookup.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{CloudError, CloudResult};

/// Credentials and transport options for an OpenStack session.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
    /// PEM bundle used to verify the API certificates.
    pub cacert: Option<PathBuf>,
    /// Skip certificate verification.
    pub insecure: bool,
}

/// Service catalog returned with the token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    services: Vec<CatalogService>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    region: Option<String>,
    region_id: Option<String>,
    url: String,
}

impl Catalog {
    /// Public endpoint URL for `service_type` in `region`, without a
    /// trailing slash.
    pub fn endpoint(&self, service_type: &str, region: &str) -> CloudResult<String> {
        self.services
            .iter()
            .filter(|s| s.service_type == service_type)
            .flat_map(|s| s.endpoints.iter())
            .find(|e| {
                e.interface == "public"
                    && (e.region_id.as_deref() == Some(region) || e.region.as_deref() == Some(region))
            })
            .map(|e| e.url.trim_end_matches('/').to_string())
            .ok_or_else(|| CloudError::EndpointNotFound {
                service: service_type.to_string(),
                region: region.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Catalog,
}

/// Normalize an auth URL to the Keystone v3 root.
pub(crate) fn identity_v3_url(auth_url: &str) -> String {
    let trimmed = auth_url.trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        trimmed.to_string()
    } else if let Some(root) = trimmed.strip_suffix("/v2.0") {
        format!("{root}/v3")
    } else {
        format!("{trimmed}/v3")
    }
}

/// Request a project-scoped token. Returns the token and its catalog.
pub(crate) async fn authenticate(
    http: &reqwest::Client,
    options: &AuthOptions,
) -> CloudResult<(String, Catalog)> {
    let url = format!("{}/auth/tokens", identity_v3_url(&options.auth_url));
    let body = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": options.username,
                        "domain": { "name": options.user_domain_name },
                        "password": options.password,
                    }
                }
            },
            "scope": {
                "project": {
                    "name": options.project_name,
                    "domain": { "name": options.project_domain_name },
                }
            }
        }
    });

    debug!(%url, user = %options.username, "requesting token");
    let resp = http.post(&url).json(&body).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(CloudError::Auth(format!(
            "{status}: {}",
            super::client::extract_message(&text)
        )));
    }

    let token = resp
        .headers()
        .get("x-subject-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| CloudError::Auth("response carried no X-Subject-Token".into()))?;

    let envelope: TokenEnvelope = resp
        .json()
        .await
        .map_err(|e| CloudError::Decode(format!("token body: {e}")))?;

    info!(project = %options.project_name, "authenticated");
    Ok((token, envelope.token.catalog))
}
