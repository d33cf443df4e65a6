use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

/// Best-effort client address: first parseable `x-forwarded-for` hop (IPv4
/// preferred), then `x-real-ip`, then the socket peer.
pub fn extract_client_ip(headers: &HeaderMap, connect_info: Option<SocketAddr>) -> Option<IpAddr> {
    let mut first: Option<IpAddr> = None;
    let mut first_ipv4: Option<IpAddr> = None;

    if let Some(raw) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        for part in raw.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            if let Ok(ip) = part.parse::<IpAddr>() {
                if first.is_none() {
                    first = Some(ip);
                }
                if ip.is_ipv4() && first_ipv4.is_none() {
                    first_ipv4 = Some(ip);
                }
            }
        }
    }

    if let Some(ip) = first_ipv4.or(first) {
        return Some(ip);
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .or_else(|| connect_info.map(|addr| addr.ip()))
}

/// Client address of the current request, when one can be determined.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    pub fn as_string(&self) -> Option<String> {
        self.0.map(|ip| ip.to_string())
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        Ok(ClientIp(extract_client_ip(&parts.headers, peer)))
    }
}
