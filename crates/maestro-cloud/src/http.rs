//! HTTP-backed collaborator implementations
//!
//! Thin reqwest adapters over the collaborator traits. Transport faults map
//! to the `upstream-fault(http)` kind; definite 404s map to `Ok(None)` (or
//! `false`) so callers can distinguish "gone" from "unreachable".

use crate::asgard::{
    AsgInstance, AsgSummary, AsgardClient, FormParams, Image, InstanceState, LaunchConfiguration,
    LoadBalancer, SecurityGroup, Subnet,
};
use crate::error::{CloudError, CloudResult};
use crate::healthcheck::InstanceHealthClient;
use crate::onix::{OnixApplication, OnixClient};
use crate::remote::RemoteTask;
use crate::shuppet::ShuppetClient;
use crate::tyranitar::TyranitarClient;
use async_trait::async_trait;
use maestro_types::OnixMetadata;
use reqwest::{redirect, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A client that never follows redirects; state-changing Asgard calls need
/// the raw 302 Location.
fn build_client() -> CloudResult<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|e| CloudError::http("client", e))
}

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    service: &str,
    url: &str,
) -> CloudResult<Option<T>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CloudError::http(service, e))?;
    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if status.is_success() => {
            let parsed = response
                .json::<T>()
                .await
                .map_err(|e| CloudError::UnexpectedResponse {
                    service: service.to_string(),
                    message: e.to_string(),
                })?;
            Ok(Some(parsed))
        }
        status => Err(CloudError::UnexpectedStatus {
            operation: format!("fetching {url}"),
            status: status.as_u16(),
        }),
    }
}

/// HTTP implementation of the Asgard facade, keyed per region.
pub struct HttpAsgardClient {
    client: Client,
    /// region name -> base url of that region's Asgard
    regions: HashMap<String, String>,
}

impl HttpAsgardClient {
    pub fn new(regions: HashMap<String, String>) -> CloudResult<Self> {
        Ok(Self {
            client: build_client()?,
            regions,
        })
    }

    fn base(&self, region: &str) -> CloudResult<&str> {
        self.regions
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| CloudError::NotFound(format!("Asgard for region {region}")))
    }

    async fn post_expecting_redirect(
        &self,
        operation: &str,
        url: &str,
        params: &FormParams,
    ) -> CloudResult<String> {
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| CloudError::http("asgard", e))?;
        let status = response.status();
        if status != StatusCode::FOUND {
            return Err(CloudError::UnexpectedStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CloudError::UnexpectedResponse {
                service: "asgard".to_string(),
                message: format!("redirect without Location while {operation}"),
            })
    }
}

#[async_trait]
impl AsgardClient for HttpAsgardClient {
    async fn last_auto_scaling_group(
        &self,
        region: &str,
        application: &str,
        environment: &str,
    ) -> CloudResult<Option<AsgSummary>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/cluster/show/{application}-{environment}.json");
        let groups: Option<Vec<AsgSummary>> = get_json(&self.client, "asgard", &url).await?;
        Ok(groups.and_then(|mut groups| groups.pop()))
    }

    async fn launch_configuration(
        &self,
        region: &str,
        name: &str,
    ) -> CloudResult<Option<LaunchConfiguration>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/launchConfiguration/show/{name}.json");
        get_json(&self.client, "asgard", &url).await
    }

    async fn security_groups(&self, region: &str) -> CloudResult<Vec<SecurityGroup>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/security/list.json");
        Ok(get_json(&self.client, "asgard", &url).await?.unwrap_or_default())
    }

    async fn subnets(&self, region: &str) -> CloudResult<Vec<Subnet>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/subnet/list.json");
        Ok(get_json(&self.client, "asgard", &url).await?.unwrap_or_default())
    }

    async fn image(&self, region: &str, image_id: &str) -> CloudResult<Option<Image>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/image/show/{image_id}.json");
        get_json(&self.client, "asgard", &url).await
    }

    async fn load_balancer(&self, region: &str, name: &str) -> CloudResult<Option<LoadBalancer>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/loadBalancer/show/{name}.json");
        get_json(&self.client, "asgard", &url).await
    }

    async fn load_balancer_instance_states(
        &self,
        region: &str,
        name: &str,
    ) -> CloudResult<Vec<InstanceState>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/loadBalancer/instanceStates/{name}.json");
        Ok(get_json(&self.client, "asgard", &url).await?.unwrap_or_default())
    }

    async fn asg_instances(&self, region: &str, asg_name: &str) -> CloudResult<Vec<AsgInstance>> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/autoScaling/instances/{asg_name}.json");
        Ok(get_json(&self.client, "asgard", &url).await?.unwrap_or_default())
    }

    async fn asg_exists(&self, region: &str, asg_name: &str) -> CloudResult<bool> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/autoScaling/show/{asg_name}.json");
        let found: Option<serde_json::Value> = get_json(&self.client, "asgard", &url).await?;
        Ok(found.is_some())
    }

    async fn create_auto_scaling_group(
        &self,
        region: &str,
        params: &FormParams,
    ) -> CloudResult<String> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/autoScaling/save");
        self.post_expecting_redirect("creating auto scaling group", &url, params)
            .await
    }

    async fn create_next_auto_scaling_group(
        &self,
        region: &str,
        params: &FormParams,
    ) -> CloudResult<String> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/cluster/createNextGroup");
        self.post_expecting_redirect("creating next auto scaling group", &url, params)
            .await
    }

    async fn enable_asg(&self, region: &str, asg_name: &str) -> CloudResult<String> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/cluster/activate");
        let params = vec![("name".to_string(), asg_name.to_string())];
        self.post_expecting_redirect("enabling auto scaling group", &url, &params)
            .await
    }

    async fn disable_asg(&self, region: &str, asg_name: &str) -> CloudResult<String> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/cluster/deactivate");
        let params = vec![("name".to_string(), asg_name.to_string())];
        self.post_expecting_redirect("disabling auto scaling group", &url, &params)
            .await
    }

    async fn delete_asg(&self, region: &str, asg_name: &str) -> CloudResult<String> {
        let base = self.base(region)?;
        let url = format!("{base}/{region}/cluster/delete");
        let params = vec![("name".to_string(), asg_name.to_string())];
        self.post_expecting_redirect("deleting auto scaling group", &url, &params)
            .await
    }

    async fn task(&self, url: &str) -> CloudResult<RemoteTask> {
        get_json(&self.client, "asgard", url)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("task {url}")))
    }
}

/// HTTP implementation of the application metadata registry.
pub struct HttpOnixClient {
    client: Client,
    base_url: String,
}

impl HttpOnixClient {
    pub fn new(base_url: impl Into<String>) -> CloudResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl OnixClient for HttpOnixClient {
    async fn application(&self, name: &str) -> CloudResult<Option<OnixApplication>> {
        let url = format!("{}/applications/{name}", self.base_url);
        get_json(&self.client, "onix", &url).await
    }

    async fn applications(&self) -> CloudResult<Vec<String>> {
        let url = format!("{}/applications", self.base_url);
        Ok(get_json(&self.client, "onix", &url).await?.unwrap_or_default())
    }

    async fn upsert_application(
        &self,
        name: &str,
        metadata: OnixMetadata,
    ) -> CloudResult<OnixApplication> {
        let url = format!("{}/applications/{name}", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| CloudError::http("onix", e))?;
        if !response.status().is_success() {
            return Err(CloudError::UnexpectedStatus {
                operation: format!("upserting application {name}"),
                status: response.status().as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| CloudError::UnexpectedResponse {
                service: "onix".to_string(),
                message: e.to_string(),
            })
    }

    async fn environments(&self) -> CloudResult<Vec<String>> {
        let url = format!("{}/environments", self.base_url);
        Ok(get_json(&self.client, "onix", &url).await?.unwrap_or_default())
    }
}

/// HTTP implementation of the per-hash configuration service.
pub struct HttpTyranitarClient {
    client: Client,
    base_url: String,
}

impl HttpTyranitarClient {
    pub fn new(base_url: impl Into<String>) -> CloudResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl TyranitarClient for HttpTyranitarClient {
    async fn latest_hash(
        &self,
        environment: &str,
        application: &str,
    ) -> CloudResult<Option<String>> {
        #[derive(serde::Deserialize)]
        struct Latest {
            hash: String,
        }
        let url = format!(
            "{}/applications/{environment}/{application}/latest-hash",
            self.base_url
        );
        let latest: Option<Latest> = get_json(&self.client, "tyranitar", &url).await?;
        Ok(latest.map(|l| l.hash))
    }

    async fn hash_exists(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<bool> {
        let url = format!(
            "{}/applications/{environment}/{application}/{hash}",
            self.base_url
        );
        let found: Option<serde_json::Value> = get_json(&self.client, "tyranitar", &url).await?;
        Ok(found.is_some())
    }

    async fn application_properties(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<serde_json::Value>> {
        let url = format!(
            "{}/applications/{environment}/{application}/{hash}/application-properties",
            self.base_url
        );
        get_json(&self.client, "tyranitar", &url).await
    }

    async fn deployment_params(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<serde_json::Value>> {
        let url = format!(
            "{}/applications/{environment}/{application}/{hash}/deployment-params",
            self.base_url
        );
        get_json(&self.client, "tyranitar", &url).await
    }

    async fn launch_data(
        &self,
        environment: &str,
        application: &str,
        hash: &str,
    ) -> CloudResult<Option<Vec<String>>> {
        let url = format!(
            "{}/applications/{environment}/{application}/{hash}/launch-data",
            self.base_url
        );
        get_json(&self.client, "tyranitar", &url).await
    }
}

/// HTTP implementation of the policy-configuration service.
pub struct HttpShuppetClient {
    client: Client,
    base_url: String,
}

impl HttpShuppetClient {
    pub fn new(base_url: impl Into<String>) -> CloudResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ShuppetClient for HttpShuppetClient {
    async fn configuration(
        &self,
        environment: &str,
        application: &str,
    ) -> CloudResult<Option<serde_json::Value>> {
        let url = format!("{}/envs/{environment}/apps/{application}", self.base_url);
        get_json(&self.client, "shuppet", &url).await
    }
}

/// HTTP probe of instance healthchecks. Transport failures count as
/// unhealthy rather than erroring, so a flap consumes an attempt.
pub struct HttpInstanceHealthClient {
    client: Client,
}

impl HttpInstanceHealthClient {
    pub fn new() -> CloudResult<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait]
impl InstanceHealthClient for HttpInstanceHealthClient {
    async fn healthy(&self, host: &str, port: u16, path: &str) -> CloudResult<bool> {
        let url = format!("http://{host}:{port}{path}");
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status() == StatusCode::OK),
            Err(_) => Ok(false),
        }
    }
}
