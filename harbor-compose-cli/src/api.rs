//! HTTP clients for the platform services.

use crate::CliResult;
use crate::auth::Session;
use crate::config::Endpoints;
use harbor_compose_core::{EnvVarPayload, FargateOptions, ShipmentEnvironment};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

const USER_AGENT: &str = concat!("harbor-compose/", env!("CARGO_PKG_VERSION"));

/// Token issued by the auth service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenCheck<'a> {
    username: &'a str,
    token: &'a str,
}

/// Messages returned by the trigger and deploy services.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TriggerResponse {
    /// Human readable outcome.
    #[serde(default)]
    pub message: String,
}

/// Container image to roll out.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContainerImage {
    /// Container name.
    pub name: String,
    /// Full image reference.
    pub image: String,
}

#[derive(Debug, Serialize)]
struct BuildTokenDeploy<'a> {
    containers: &'a [ContainerImage],
}

/// Catalog entry for a built image.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Image tag.
    pub version: String,
}

/// Runtime status of a shipment environment.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShipmentStatus {
    /// Deployed version.
    pub version: String,
    /// Per-replica details.
    pub status: StatusDetail,
}

/// Replica and container state.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatusDetail {
    /// Overall phase such as `Running`.
    pub phase: String,
    /// Containers across replicas.
    pub containers: Vec<ContainerStatus>,
}

/// State of one running container.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerStatus {
    /// Container name.
    pub name: String,
    /// Replica id.
    pub id: String,
    /// Image reference.
    pub image: String,
    /// Current state, e.g. `running`.
    pub state: String,
    /// Restart count.
    pub restart_count: u32,
    /// Whether the container passes its health check.
    pub ready: bool,
}

/// Barge details used to seed AWS settings.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Barge {
    /// Barge name.
    pub name: String,
    /// AWS account id.
    pub aws_account_id: String,
    /// AWS region.
    pub region: String,
    /// VPC id.
    pub vpc: String,
    /// Private subnet ids.
    pub private_subnets: Vec<String>,
    /// Public subnet ids.
    pub public_subnets: Vec<String>,
}

impl Barge {
    /// AWS settings derived from the barge.
    pub fn fargate_options(&self) -> FargateOptions {
        FargateOptions {
            account_id: self.aws_account_id.clone(),
            region: self.region.clone(),
            vpc: self.vpc.clone(),
            private_subnets: self.private_subnets.join(","),
            public_subnets: self.public_subnets.join(","),
            ..FargateOptions::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GroupBarges {
    #[serde(default)]
    barges: Vec<Barge>,
}

#[derive(Debug, Serialize)]
struct ImageUpdate<'a> {
    image: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplicaUpdate {
    replicas: u32,
}

/// Client for every service the CLI talks to.
#[derive(Debug, Clone)]
pub struct HarborApi {
    client: Client,
    endpoints: Endpoints,
}

impl HarborApi {
    /// Build a client for the given endpoints.
    pub fn new(endpoints: Endpoints) -> CliResult<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, endpoints })
    }

    /// Exchange a username and password for a token.
    pub async fn get_token(&self, username: &str, password: &str) -> CliResult<String> {
        let url = format!("{}/v1/auth/gettoken", base(&self.endpoints.authn));
        let request = self.client.post(url).json(&Credentials { username, password });
        let response: TokenResponse = read_json("auth", request).await?;
        Ok(response.token)
    }

    /// Whether a stored token is still valid.
    pub async fn check_token(&self, session: &Session) -> CliResult<bool> {
        let url = format!("{}/v1/auth/checktoken", base(&self.endpoints.authn));
        let response = self
            .client
            .post(url)
            .json(&TokenCheck {
                username: &session.username,
                token: &session.token,
            })
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            _ => Err(api_error("auth", response).await),
        }
    }

    /// Revoke a token.
    pub async fn destroy_token(&self, session: &Session) -> CliResult<()> {
        let url = format!("{}/v1/auth/destroy", base(&self.endpoints.authn));
        let request = self.client.post(url).json(&TokenCheck {
            username: &session.username,
            token: &session.token,
        });
        send("auth", request).await?;
        Ok(())
    }

    /// Fetch a shipment environment; `None` when it does not exist.
    pub async fn get_shipment_environment(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
    ) -> CliResult<Option<ShipmentEnvironment>> {
        let url = self.environment_url(shipment, env, "");
        let response = authorized(self.client.get(url), session).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("shipit", response).await?;
        Ok(Some(response.json().await?))
    }

    /// Delete a shipment environment.
    pub async fn delete_shipment_environment(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
    ) -> CliResult<()> {
        let url = self.environment_url(shipment, env, "");
        send("shipit", authorized(self.client.delete(url), session)).await?;
        Ok(())
    }

    /// Create a shipment with a single environment.
    pub async fn create_shipment(
        &self,
        session: &Session,
        environment: &ShipmentEnvironment,
    ) -> CliResult<()> {
        let url = format!("{}/v1/bulk/shipments", base(&self.endpoints.shipit));
        send(
            "shipit",
            authorized(self.client.post(url), session).json(environment),
        )
        .await?;
        Ok(())
    }

    /// Point a container at a new image.
    pub async fn update_container_image(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
        container: &str,
        image: &str,
    ) -> CliResult<()> {
        let url = self.environment_url(shipment, env, &format!("container/{}", encode(container)));
        send(
            "shipit",
            authorized(self.client.put(url), session).json(&ImageUpdate { image }),
        )
        .await?;
        Ok(())
    }

    /// Change the replica count of a provider.
    pub async fn update_replicas(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
        provider: &str,
        replicas: u32,
    ) -> CliResult<()> {
        let url = self.environment_url(shipment, env, &format!("provider/{}", encode(provider)));
        send(
            "shipit",
            authorized(self.client.put(url), session).json(&ReplicaUpdate { replicas }),
        )
        .await?;
        Ok(())
    }

    /// Create or replace an environment-level variable.
    pub async fn put_env_var(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
        var: &EnvVarPayload,
    ) -> CliResult<()> {
        let url = self.environment_url(shipment, env, &format!("envVar/{}", encode(&var.name)));
        send("shipit", authorized(self.client.put(url), session).json(var)).await?;
        Ok(())
    }

    /// Create or replace a container-level variable.
    pub async fn put_container_env_var(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
        container: &str,
        var: &EnvVarPayload,
    ) -> CliResult<()> {
        let url = self.environment_url(
            shipment,
            env,
            &format!("container/{}/envVar/{}", encode(container), encode(&var.name)),
        );
        send("shipit", authorized(self.client.put(url), session).json(var)).await?;
        Ok(())
    }

    /// Ask the platform to roll out the current configuration.
    pub async fn trigger(
        &self,
        session: &Session,
        shipment: &str,
        env: &str,
        provider: &str,
    ) -> CliResult<TriggerResponse> {
        let url = format!(
            "{}/v1/shipment/{}/{}/{}",
            base(&self.endpoints.trigger),
            encode(shipment),
            encode(env),
            encode(provider)
        );
        read_json("trigger", authorized(self.client.post(url), session)).await
    }

    /// Deploy images using a build token instead of user credentials.
    pub async fn deploy_with_build_token(
        &self,
        build_token: &str,
        shipment: &str,
        env: &str,
        provider: &str,
        containers: &[ContainerImage],
    ) -> CliResult<TriggerResponse> {
        let url = format!(
            "{}/deploy/v2/shipment/{}/environment/{}/provider/{}",
            base(&self.endpoints.customs),
            encode(shipment),
            encode(env),
            encode(provider)
        );
        let request = self
            .client
            .post(url)
            .header("x-build-token", build_token)
            .json(&BuildTokenDeploy { containers });
        read_json("customs", request).await
    }

    /// Record an image in the container catalog.
    pub async fn catalog(&self, session: &Session, entry: &CatalogEntry) -> CliResult<()> {
        let url = format!("{}/v1/containers", base(&self.endpoints.catalogit));
        send("catalogit", authorized(self.client.post(url), session).json(entry)).await?;
        Ok(())
    }

    /// Runtime status of a shipment environment.
    pub async fn status(&self, barge: &str, shipment: &str, env: &str) -> CliResult<ShipmentStatus> {
        let url = format!(
            "{}/shipment/status/{}/{}/{}",
            base(&self.endpoints.helmit),
            encode(barge),
            encode(shipment),
            encode(env)
        );
        read_json("helmit", self.client.get(url)).await
    }

    /// Recent container logs.
    pub async fn logs(&self, barge: &str, shipment: &str, env: &str) -> CliResult<String> {
        let url = format!(
            "{}/harbor/{}/{}/{}",
            base(&self.endpoints.helmit),
            encode(barge),
            encode(shipment),
            encode(env)
        );
        let response = send("helmit", self.client.get(url)).await?;
        Ok(response.text().await?)
    }

    /// Barge details.
    pub async fn barge(&self, barge: &str) -> CliResult<Barge> {
        let url = format!("{}/api/v1/barges/{}", base(&self.endpoints.harbor), encode(barge));
        read_json("harbor", self.client.get(url)).await
    }

    /// Barges available to a group.
    pub async fn group_barges(&self, group: &str) -> CliResult<Vec<Barge>> {
        let url = format!(
            "{}/api/v1/groups/{}/barges",
            base(&self.endpoints.harbor),
            encode(group)
        );
        let response: GroupBarges = read_json("harbor", self.client.get(url)).await?;
        Ok(response.barges)
    }

    /// Post a usage event.
    pub async fn send_telemetry<T: Serialize + ?Sized>(&self, event: &T) -> CliResult<()> {
        let url = self.endpoints.telemetry.clone();
        send("telemetry", self.client.post(url).json(event)).await?;
        Ok(())
    }

    /// `suffix` is appended as given; its segments are encoded by the caller.
    fn environment_url(&self, shipment: &str, env: &str, suffix: &str) -> String {
        format!(
            "{}/v1/shipment/{}/environment/{}/{suffix}",
            base(&self.endpoints.shipit),
            encode(shipment),
            encode(env)
        )
    }
}

fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn authorized(request: RequestBuilder, session: &Session) -> RequestBuilder {
    request
        .header("x-username", &session.username)
        .header("x-token", &session.token)
}

async fn send(service: &str, request: RequestBuilder) -> CliResult<Response> {
    let response = request.send().await?;
    ensure_success(service, response).await
}

async fn read_json<T: DeserializeOwned>(service: &str, request: RequestBuilder) -> CliResult<T> {
    let response = send(service, request).await?;
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(serde_json::from_str("{}")?);
    }
    serde_json::from_str(&body)
        .map_err(|err| format!("{service} response decode failed: {err}").into())
}

async fn ensure_success(service: &str, response: Response) -> CliResult<Response> {
    if response.status().is_success() {
        log::debug!("{service} {} {}", response.status(), response.url());
        return Ok(response);
    }
    Err(api_error(service, response).await)
}

async fn api_error(service: &str, response: Response) -> Box<dyn std::error::Error + Send + Sync> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{service} api error ({status}): {body}").into()
}
