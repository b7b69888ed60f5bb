//! OpenStack implementation of [`CloudApi`].
//!
//! One Keystone token serves every region; per-region calls pick the
//! matching public endpoint from the service catalog.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    CloudApi, CloudFuture, FloatingIp, NamedResource, Server, ServerCreate, ServerGroup,
};
use crate::error::{CloudError, CloudResult};

use super::auth::{AuthOptions, Catalog, authenticate};
use super::wire::*;

/// Authenticated OpenStack session.
pub struct OpenStackCloud {
    http: reqwest::Client,
    token: String,
    catalog: Catalog,
}

impl OpenStackCloud {
    /// Authenticate and keep the token for the rest of the run.
    pub async fn connect(options: &AuthOptions) -> CloudResult<Self> {
        let http = build_http(options)?;
        let (token, catalog) = authenticate(&http, options).await?;
        Ok(Self {
            http,
            token,
            catalog,
        })
    }

    fn compute_url(&self, region: &str) -> CloudResult<String> {
        self.catalog.endpoint("compute", region)
    }

    fn network_url(&self, region: &str) -> CloudResult<String> {
        let url = self.catalog.endpoint("network", region)?;
        Ok(format!("{}/v2.0", url.trim_end_matches("/v2.0")))
    }

    /// Glance root without the version suffix; `next` links are absolute
    /// paths that include it.
    fn image_root(&self, region: &str) -> CloudResult<String> {
        let url = self.catalog.endpoint("image", region)?;
        Ok(url.trim_end_matches("/v2").to_string())
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("X-Auth-Token", &self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> CloudResult<T> {
        debug!(%url, "GET");
        let resp = check(self.authed(self.http.get(url)).send().await?).await?;
        decode(resp).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> CloudResult<T> {
        debug!(%url, "POST");
        let resp = check(self.authed(self.http.post(url)).json(body).send().await?).await?;
        decode(resp).await
    }

    async fn post_accepted<B: Serialize>(&self, url: &str, body: &B) -> CloudResult<()> {
        debug!(%url, "POST");
        check(self.authed(self.http.post(url)).json(body).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> CloudResult<()> {
        debug!(%url, "DELETE");
        check(self.authed(self.http.delete(url)).send().await?).await?;
        Ok(())
    }
}

fn build_http(options: &AuthOptions) -> CloudResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(options.insecure);

    if let Some(path) = &options.cacert {
        let pem = std::fs::read(path)
            .map_err(|e| CloudError::Config(format!("read CA bundle {}: {e}", path.display())))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| CloudError::Config(format!("parse CA bundle {}: {e}", path.display())))?;
        builder = builder.add_root_certificate(cert);
    }

    Ok(builder.build()?)
}

/// Turn a non-2xx response into [`CloudError::Api`].
async fn check(resp: Response) -> CloudResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(CloudError::Api {
        status: status.as_u16(),
        message: extract_message(&text),
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> CloudResult<T> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| CloudError::Decode(e.to_string()))
}

/// Pull the human-readable message out of an OpenStack error body.
///
/// Services wrap it differently (`{"itemNotFound": {"message": ..}}`,
/// `{"NeutronError": {"message": ..}}`, `{"error": {"message": ..}}`).
pub(crate) fn extract_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = map.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        for value in map.values() {
            if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}

impl CloudApi for OpenStackCloud {
    fn list_images<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>> {
        Box::pin(async move {
            let root = self.image_root(region)?;
            let mut url = format!("{root}/v2/images?limit=200");
            let mut images = Vec::new();
            loop {
                let page: ImageList = self.get_json(&url).await?;
                images.extend(
                    page.images
                        .into_iter()
                        .filter_map(|i| i.name.map(|name| NamedResource::new(i.id, name))),
                );
                match page.next {
                    Some(next) => url = format!("{root}{next}"),
                    None => break,
                }
            }
            Ok(images)
        })
    }

    fn list_flavors<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>> {
        Box::pin(async move {
            let url = format!("{}/flavors", self.compute_url(region)?);
            let list: FlavorList = self.get_json(&url).await?;
            Ok(list.flavors)
        })
    }

    fn list_networks<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<NamedResource>> {
        Box::pin(async move {
            let url = format!("{}/networks", self.network_url(region)?);
            let list: NetworkList = self.get_json(&url).await?;
            Ok(list.networks)
        })
    }

    fn list_server_groups<'a>(&'a self, region: &'a str) -> CloudFuture<'a, Vec<ServerGroup>> {
        Box::pin(async move {
            let url = format!("{}/os-server-groups", self.compute_url(region)?);
            let list: ServerGroupList = self.get_json(&url).await?;
            Ok(list.server_groups)
        })
    }

    fn create_server_group<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        policy: &'a str,
    ) -> CloudFuture<'a, ServerGroup> {
        Box::pin(async move {
            let url = format!("{}/os-server-groups", self.compute_url(region)?);
            let body = CreateServerGroup {
                server_group: NewServerGroup {
                    name,
                    policies: [policy],
                },
            };
            let env: ServerGroupEnvelope = self.post_json(&url, &body).await?;
            Ok(env.server_group)
        })
    }

    fn delete_server_group<'a>(&'a self, region: &'a str, group_id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}/os-server-groups/{group_id}", self.compute_url(region)?);
            self.delete(&url).await
        })
    }

    fn create_server<'a>(
        &'a self,
        region: &'a str,
        request: &'a ServerCreate,
    ) -> CloudFuture<'a, Server> {
        Box::pin(async move {
            let url = format!("{}/servers", self.compute_url(region)?);
            let body = CreateServer {
                server: NewServer {
                    name: &request.name,
                    image_ref: &request.image_id,
                    flavor_ref: &request.flavor_id,
                    key_name: &request.key_name,
                    networks: [NetworkRef {
                        uuid: &request.network_id,
                    }],
                    block_device_mapping_v2: [BlockDeviceMapping {
                        boot_index: 0,
                        uuid: &request.boot_volume.image_id,
                        source_type: "image",
                        destination_type: "volume",
                        volume_size: request.boot_volume.size_gb,
                        delete_on_termination: request.boot_volume.delete_on_termination,
                    }],
                    user_data: request.user_data.as_deref().map(|d| STANDARD.encode(d)),
                },
                scheduler_hints: SchedulerHints {
                    group: &request.group_id,
                },
            };
            let env: ServerEnvelope = self.post_json(&url, &body).await?;
            Ok(env.server.into_server(&request.name))
        })
    }

    fn get_server<'a>(&'a self, region: &'a str, server_id: &'a str) -> CloudFuture<'a, Server> {
        Box::pin(async move {
            let url = format!("{}/servers/{server_id}", self.compute_url(region)?);
            let env: ServerEnvelope = self.get_json(&url).await?;
            Ok(env.server.into_server(server_id))
        })
    }

    fn delete_server<'a>(&'a self, region: &'a str, server_id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}/servers/{server_id}", self.compute_url(region)?);
            self.delete(&url).await
        })
    }

    fn create_floating_ip<'a>(
        &'a self,
        region: &'a str,
        public_network_id: &'a str,
    ) -> CloudFuture<'a, FloatingIp> {
        Box::pin(async move {
            let url = format!("{}/floatingips", self.network_url(region)?);
            let body = CreateFloatingIp {
                floatingip: NewFloatingIp {
                    floating_network_id: public_network_id,
                },
            };
            let env: FloatingIpEnvelope = self.post_json(&url, &body).await?;
            Ok(FloatingIp {
                id: env.floatingip.id,
                address: env.floatingip.floating_ip_address,
            })
        })
    }

    fn add_floating_ip<'a>(
        &'a self,
        region: &'a str,
        server_id: &'a str,
        address: &'a str,
    ) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}/servers/{server_id}/action", self.compute_url(region)?);
            let body = AddFloatingIpAction {
                add_floating_ip: AddressRef { address },
            };
            self.post_accepted(&url, &body).await
        })
    }

    fn delete_floating_ip<'a>(&'a self, region: &'a str, floating_ip_id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}/floatingips/{floating_ip_id}", self.network_url(region)?);
            self.delete(&url).await
        })
    }
}
