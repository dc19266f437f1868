//! UPnP RenderingControl SOAP client
//!
//! Level-style controls (volume, mute, brightness) go through the TV's
//! RenderingControl service. The control URL is located once from the
//! device description and cached by the caller.

use std::time::Duration;

use quick_xml::de::from_str as xml_from_str;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use super::RemoteError;

pub const RENDERING_CONTROL_URN: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
pub const SOAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve the RenderingControl control URL from a device description.
pub async fn locate_rendering_control(
    http: &Client,
    location: &str,
) -> Result<Option<String>, RemoteError> {
    let xml = http.get(location).send().await?.text().await?;

    #[derive(Deserialize)]
    struct Root {
        device: DeviceDesc,
    }

    #[derive(Deserialize)]
    struct DeviceDesc {
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
        #[serde(rename = "controlURL")]
        control_url: Option<String>,
    }

    let root: Root = xml_from_str(&xml).map_err(|e| RemoteError::Protocol(e.to_string()))?;
    let base = base_url(location)?;

    let control = root
        .device
        .service_list
        .into_iter()
        .flat_map(|l| l.service)
        .find(|s| s.service_type.contains("RenderingControl"))
        .and_then(|s| s.control_url)
        .map(|u| join_url(&base, &u));

    Ok(control)
}

fn base_url(location: &str) -> Result<String, RemoteError> {
    let url = url::Url::parse(location).map_err(|e| RemoteError::Protocol(e.to_string()))?;
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

pub async fn soap_call(
    http: &Client,
    url: &str,
    action: &str,
    body_content: &str,
) -> Result<String, RemoteError> {
    let soap_body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:{action} xmlns:u="{service_type}">{body}</u:{action}>
  </s:Body>
</s:Envelope>"#,
        action = action,
        service_type = RENDERING_CONTROL_URN,
        body = body_content
    );

    let response = http
        .post(url)
        .header("Content-Type", "text/xml; charset=utf-8")
        .header("SOAPAction", format!("\"{}#{}\"", RENDERING_CONTROL_URN, action))
        .body(soap_body)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(RemoteError::Protocol(format!(
            "SOAP {} returned {}",
            action,
            response.status()
        )));
    }

    Ok(response.text().await?)
}

/// Extract an XML value, handling optional namespace prefixes
/// (e.g., `<u:CurrentVolume>` or `<CurrentVolume>`).
pub fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(
        r"<(?:[^:>]+:)?{}\b[^>]*>([^<]*)</(?:[^:>]+:)?{}>",
        regex::escape(tag),
        regex::escape(tag)
    );

    let re = Regex::new(&pattern).ok()?;
    re.captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn master_channel_args() -> &'static str {
    "<InstanceID>0</InstanceID><Channel>Master</Channel>"
}
