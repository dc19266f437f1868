//! SSDP device discovery
//!
//! Searches for MediaRenderer devices, fetches each description
//! document, and derives a capability set from the RenderingControl
//! SCPD action list. Discovery failure is non-fatal: the registry
//! carries persisted devices forward through an empty pass.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use quick_xml::de::from_str as xml_from_str;
use reqwest::Client;
use serde::Deserialize;
use ssdp_client::{SearchTarget, URN};
use tracing::{debug, warn};

use crate::device::DiscoveredDevice;

const MEDIA_RENDERER_URN: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(3);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Network scan yielding raw device descriptors for one pass.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>>;
}

pub struct SsdpDiscovery {
    http: Client,
}

impl SsdpDiscovery {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for SsdpDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Discovery for SsdpDiscovery {
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>> {
        let urn: URN = MEDIA_RENDERER_URN.parse()?;
        let responses =
            ssdp_client::search(&SearchTarget::URN(urn), SEARCH_TIMEOUT, 2, None).await?;
        futures::pin_mut!(responses);

        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        while let Some(response) = responses.next().await {
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    debug!("SSDP response error: {}", e);
                    continue;
                }
            };

            let location = response.location().to_string();
            let usn = response.usn().to_string();
            if devices.iter().any(|d| d.usn == usn) {
                continue;
            }

            let ip = url::Url::parse(&location)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_string()));

            let mut device = DiscoveredDevice {
                usn,
                name: String::new(),
                model_name: None,
                location: location.clone(),
                ip,
                mac: None,
                capabilities: None,
            };

            match self.describe(&location).await {
                Ok(description) => {
                    device.name = description.name;
                    device.model_name = description.model_name;
                    device.capabilities = description.capabilities;
                }
                Err(e) => {
                    warn!("Failed to describe {} at {}: {:#}", device.usn, location, e);
                }
            }

            debug!("Discovered {} ({}) at {}", device.name, device.usn, location);
            devices.push(device);
        }

        Ok(devices)
    }
}

struct Description {
    name: String,
    model_name: Option<String>,
    capabilities: Option<BTreeSet<String>>,
}

impl SsdpDiscovery {
    /// Fetch and parse the device description, then the RenderingControl
    /// SCPD for the advertised action names.
    async fn describe(&self, location: &str) -> Result<Description> {
        #[derive(Deserialize)]
        struct Root {
            device: DeviceDesc,
        }

        #[derive(Deserialize)]
        struct DeviceDesc {
            #[serde(rename = "friendlyName")]
            friendly_name: Option<String>,
            #[serde(rename = "modelName")]
            model_name: Option<String>,
            #[serde(rename = "serviceList")]
            service_list: Option<ServiceList>,
        }

        #[derive(Deserialize)]
        struct ServiceList {
            service: Vec<ServiceDesc>,
        }

        #[derive(Deserialize)]
        struct ServiceDesc {
            #[serde(rename = "serviceType")]
            service_type: String,
            #[serde(rename = "SCPDURL")]
            scpd_url: Option<String>,
        }

        let xml = self.http.get(location).send().await?.text().await?;
        let root: Root = xml_from_str(&xml)?;

        let base = base_url(location)?;
        let scpd_url = root
            .device
            .service_list
            .into_iter()
            .flat_map(|l| l.service)
            .find(|s| s.service_type.contains("RenderingControl"))
            .and_then(|s| s.scpd_url)
            .map(|u| join_url(&base, &u));

        let capabilities = match scpd_url {
            Some(url) => match self.fetch_actions(&url).await {
                Ok(actions) => Some(actions),
                Err(e) => {
                    debug!("SCPD fetch failed for {}: {:#}", url, e);
                    None
                }
            },
            None => None,
        };

        Ok(Description {
            name: root.device.friendly_name.unwrap_or_default(),
            model_name: root.device.model_name,
            capabilities,
        })
    }

    async fn fetch_actions(&self, scpd_url: &str) -> Result<BTreeSet<String>> {
        #[derive(Deserialize)]
        struct Scpd {
            #[serde(rename = "actionList")]
            action_list: Option<ActionList>,
        }

        #[derive(Deserialize)]
        struct ActionList {
            action: Vec<Action>,
        }

        #[derive(Deserialize)]
        struct Action {
            name: String,
        }

        let xml = self.http.get(scpd_url).send().await?.text().await?;
        let scpd: Scpd = xml_from_str(&xml)?;
        Ok(scpd
            .action_list
            .into_iter()
            .flat_map(|l| l.action)
            .map(|a| a.name)
            .collect())
    }
}

fn base_url(location: &str) -> Result<String> {
    let url = url::Url::parse(location)?;
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Ok(format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or("localhost"),
        port
    ))
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
