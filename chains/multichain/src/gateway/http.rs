use super::GatewayError;
use core_logic::ProxyManager;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client routed through the wallet's proxy, if it has one.
///
/// `proxy` is the stored `user:pass@host:port` line.
pub fn client_for(proxy: Option<&str>) -> Result<Client, GatewayError> {
    let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

    if let Some(line) = proxy {
        let conf = ProxyManager::parse(line, 0)
            .map_err(|e| GatewayError::Rejected(format!("bad proxy: {}", e)))?;
        let proxy = reqwest::Proxy::all(conf.url())
            .map_err(|e| GatewayError::Rejected(format!("bad proxy: {}", e)))?
            .basic_auth(&conf.username, &conf.password);
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| GatewayError::Rejected(format!("http client: {}", e)))
}

/// Maps a reqwest failure onto the gateway error classes. Connection
/// problems, timeouts, 429 and 5xx are transient.
pub fn map_reqwest(context: &str, err: reqwest::Error) -> GatewayError {
    let transient = err.is_timeout()
        || err.is_connect()
        || err.is_request()
        || err
            .status()
            .is_some_and(|s| s.is_server_error() || s.as_u16() == 429);
    if transient {
        GatewayError::Transient(format!("{}: {}", context, err))
    } else {
        GatewayError::Rejected(format!("{}: {}", context, err))
    }
}

/// Asks the mobile proxy provider for a fresh exit IP.
pub async fn change_ip(url: &str) {
    let result = async {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        client.get(url).send().await?.error_for_status()
    }
    .await;

    match result {
        Ok(_) => info!("Mobile proxy IP changed"),
        Err(e) => warn!("Failed to change mobile proxy IP: {}", e),
    }
}
