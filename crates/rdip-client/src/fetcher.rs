use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use rdip_core::error::AppError;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use url::{Host, Url};

use crate::llm::send_error;

/// Fetches the head of HTML pages for link metadata.
///
/// Link URLs come from model output, so every target is checked before the
/// request goes out: only `http`/`https`, and never an address on a loopback,
/// private, link-local or otherwise reserved network.
#[derive(Clone)]
pub struct HtmlFetcher {
    client: Client,
    timeout_secs: u64,
}

impl HtmlFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; rdip/0.3)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Download at most `max_bytes` of an HTML page.
    ///
    /// Returns `None` when the response is not `text/html`.
    pub async fn fetch_html(&self, url: &str, max_bytes: usize) -> Result<Option<String>, AppError> {
        let target = public_target(url).await?;

        let mut response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| send_error(self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        if !is_html {
            return Ok(None);
        }

        let mut body = Vec::with_capacity(max_bytes.min(16 * 1024));
        while body.len() < max_bytes {
            match response
                .chunk()
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?
            {
                Some(bytes) => body.extend_from_slice(&bytes),
                None => break,
            }
        }
        body.truncate(max_bytes);

        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }
}

/// Parse `raw` and make sure it points at a public web host.
///
/// Domain names are resolved and every returned address is checked, so a
/// name pointing into a private network is refused as well.
async fn public_target(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw).map_err(|e| AppError::HttpError(format!("Invalid link URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::HttpError(format!(
            "Refusing to fetch {} link",
            url.scheme()
        )));
    }

    let addrs: Vec<IpAddr> = match url.host() {
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(name)) => {
            let port = url.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((name, port))
                .await
                .map_err(|e| AppError::NetworkError(format!("Cannot resolve {name}: {e}")))?
                .map(|sock| sock.ip())
                .collect()
        }
        None => return Err(AppError::HttpError("Link URL has no host".to_string())),
    };

    if addrs.is_empty() {
        return Err(AppError::NetworkError(format!(
            "No addresses for {}",
            url.host_str().unwrap_or_default()
        )));
    }
    if let Some(ip) = addrs.into_iter().find(|ip| !is_public(*ip)) {
        return Err(AppError::HttpError(format!(
            "Refusing to fetch non-public address {ip}"
        )));
    }
    Ok(url)
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10 is carrier-grade NAT
    let shared = a == 100 && (64..128).contains(&b);
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || shared)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let head = ip.segments()[0];
    let unique_local = head & 0xfe00 == 0xfc00;
    let link_local = head & 0xffc0 == 0xfe80;
    !(ip.is_unspecified() || ip.is_loopback() || unique_local || link_local)
}
