use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::services::ClientMeta;

const UNKNOWN: &str = "unknown";
/// Longest user agent kept on a session record.
const MAX_USER_AGENT_LEN: usize = 512;

/// Caller address and user agent, extracted from the request
pub struct Client(pub ClientMeta);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let ip_address = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| UNKNOWN.to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Ok(Client(ClientMeta {
            ip_address,
            user_agent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> ClientMeta {
        let (mut parts, _) = req.into_parts();
        Client::from_request_parts(&mut parts, &()).await.unwrap().0
    }

    #[tokio::test]
    async fn prefers_first_forwarded_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap();

        let meta = extract(req).await;
        assert_eq!(meta.ip_address, "203.0.113.7");
        assert_eq!(meta.user_agent, "curl/8.0");
    }

    #[tokio::test]
    async fn falls_back_to_unknown() {
        let meta = extract(Request::builder().body(()).unwrap()).await;
        assert_eq!(meta.ip_address, "unknown");
        assert_eq!(meta.user_agent, "unknown");
    }
}
