use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{
    config::Config,
    utils::{ApiResponse, error_codes},
};

#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

/// Client address: proxy headers first, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let remote_ip = peer.map(|addr| addr.ip().to_string());

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

impl RateLimiter {
    pub fn new(redis: Arc<redis::Client>, config: Config) -> Self {
        Self {
            redis,
            config: Arc::new(config),
        }
    }

    pub async fn check_rate_limit(
        self: Arc<Self>,
        req: Request<Body>,
        next: Next,
    ) -> Result<Response, StatusCode> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        let ip = client_ip(req.headers(), peer);

        let key = format!("rate_limit:{}", ip);
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!("Rate limiter cannot reach redis: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        // fixed window: INCR, and start the window on the first hit
        let count: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        if count == 1 {
            let _: () = conn
                .expire(&key, self.config.rate_limit_window().as_secs() as i64)
                .await
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        }

        if count > i64::from(self.config.rate_limit_requests) {
            tracing::info!("Rate limit hit for {}", ip);
            let body = Json(ApiResponse::<()> {
                code: error_codes::RATE_LIMIT,
                msg: format!(
                    "Request was throttled. Expected available in {} seconds.",
                    self.config.rate_limit_window().as_secs()
                ),
                resp_data: None,
                errors: None,
            });
            return Ok((StatusCode::TOO_MANY_REQUESTS, body).into_response());
        }

        Ok(next.run(req).await)
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    limiter.check_rate_limit(req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_ip_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.7".parse().unwrap());
        headers.insert("x-forwarded-for", "10.0.0.8, 10.0.0.9".parse().unwrap());
        assert_eq!(client_ip(&headers, None), "10.0.0.7");
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " 10.0.0.8 , 10.0.0.9".parse().unwrap());
        assert_eq!(client_ip(&headers, None), "10.0.0.8");
    }

    #[test]
    fn falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.2:5555".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.168.1.2");
        assert_eq!(client_ip(&headers, None), "unknown");
    }
}
