//! Request extractors.
//!
//! [`Authenticated`] runs the authorization kernel before any handler
//! code; a rejected token never reaches the handler body. The `Api*`
//! wrappers re-route axum's rejections through [`ApiError`] so every
//! failure has the same body shape.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use clinic_auth::{AuthContext, ClientInfo};
use clinic_core::repository::Pagination;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct ApiForm<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// The caller's [`AuthContext`].
#[derive(Debug, Clone)]
pub struct Authenticated(pub AuthContext);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ctx = state.kernel.authenticate(bearer_token(parts)).await?;
        Ok(Self(ctx))
    }
}

/// Client address and user agent for audit records.
///
/// `X-Forwarded-For` is honoured only when the socket peer is a
/// configured trusted proxy. The address recorded is the nearest hop that
/// is not itself a trusted proxy.
#[derive(Debug, Clone, Default)]
pub struct Client(pub ClientInfo);

fn client_ip(forwarded: Option<&str>, peer: Option<IpAddr>, trusted: &[IpAddr]) -> Option<IpAddr> {
    let mut client = peer?;
    if let Some(chain) = forwarded {
        for hop in chain.rsplit(',') {
            if !trusted.contains(&client) {
                break;
            }
            match hop.trim().parse::<IpAddr>() {
                Ok(ip) => client = ip,
                Err(_) => break,
            }
        }
    }
    Some(client)
}

impl FromRequestParts<AppState> for Client {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());
        let ip_address = client_ip(forwarded, peer, &state.trusted_proxies).map(|ip| ip.to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self(ClientInfo {
            ip_address,
            user_agent,
        }))
    }
}

/// `?offset=&limit=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

pub const MAX_PAGE_SIZE: u64 = 200;

impl PageParams {
    pub fn pagination(self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            offset: self.offset.unwrap_or(defaults.offset),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        }
    }
}
