use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use praetor_application::AccessContext;
use praetor_core::{AppError, PrincipalId, TenantId};

use crate::error::ApiResult;
use crate::state::AppState;

pub const ADMIN_PRINCIPAL_HEADER: &str = "x-admin-principal-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Principal on whose behalf an administrative request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminActor {
    pub principal_id: PrincipalId,
    pub client_ip: Option<IpAddr>,
}

impl AdminActor {
    pub fn context(&self, tenant_context: Option<TenantId>) -> AccessContext {
        AccessContext {
            tenant_context,
            client_ip: self.client_ip,
        }
    }
}

/// Caller address derived from forwarding headers or the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddress(pub Option<IpAddr>);

pub async fn require_internal_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    if !tokens_match(presented.as_bytes(), state.internal_api_token.as_bytes()) {
        tracing::warn!(path = %request.uri().path(), "rejected internal request without valid token");
        return Err(AppError::Unauthorized("invalid internal api token".to_owned()).into());
    }

    let socket_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip());
    let client_ip = client_ip(request.headers(), socket_ip);
    request.extensions_mut().insert(ClientAddress(client_ip));

    Ok(next.run(request).await)
}

pub async fn require_admin_actor(mut request: Request, next: Next) -> ApiResult<Response> {
    let principal_id = request
        .headers()
        .get(ADMIN_PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(PrincipalId::from_str)
        .transpose()
        .map_err(|_| AppError::Unauthorized("malformed admin principal header".to_owned()))?
        .ok_or_else(|| AppError::Unauthorized("admin principal header is required".to_owned()))?;

    let client_ip = request
        .extensions()
        .get::<ClientAddress>()
        .and_then(|ClientAddress(client_ip)| *client_ip);
    request.extensions_mut().insert(AdminActor {
        principal_id,
        client_ip,
    });

    Ok(next.run(request).await)
}

/// Uses the first `x-forwarded-for` hop, falling back to the socket address.
///
/// The first hop is whatever the client sent, so it is only trustworthy when
/// the proxy in front of this service overwrites `x-forwarded-for` instead of
/// appending to it. Deployments behind an appending proxy must strip the
/// header at the edge; otherwise ip allow-lists can be bypassed by a forged
/// header.
pub fn client_ip(headers: &HeaderMap, socket_ip: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| IpAddr::from_str(value.trim()).ok())
        .or(socket_ip)
}

fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }

    presented
        .iter()
        .zip(expected)
        .fold(0_u8, |difference, (left, right)| difference | (left ^ right))
        == 0
}
