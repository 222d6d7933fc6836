/// WebSocket entry point and connection status endpoint
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::auth::{extract_bearer, AuthUser};
use crate::state::AppState;
use crate::websocket::WsSession;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Upgrade to a realtime session.
///
/// Endpoint: GET /ws
///
/// Browsers cannot set headers on a WebSocket upgrade, so the credential
/// may ride in `?token=` as well as the Authorization header. Rejection
/// happens before the upgrade. The connection is registered before the
/// actor starts, so a fanout racing the handshake already finds it.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query.into_inner().token.or_else(|| extract_bearer(&req));
    let token = match token {
        Some(token) => token,
        None => {
            warn!("websocket rejected: no credential presented");
            return Ok(HttpResponse::Unauthorized().finish());
        }
    };

    let claims = match state.validator.validate(&token) {
        Ok(claims) => claims,
        Err(_) => {
            warn!("websocket rejected: invalid credential");
            return Ok(HttpResponse::Unauthorized().finish());
        }
    };
    let subject = claims.sub;

    let (connection_id, rx) = state.registry.register(subject).await;

    let session = WsSession::new(connection_id, claims, token, rx, state.as_ref().clone());

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            // The actor never started, so nothing else will clean this up
            state.registry.unregister(subject, connection_id).await;
            Err(e)
        }
    }
}

/// Aggregate connection and room statistics.
///
/// Endpoint: GET /api/v1/ws/status
pub async fn ws_status(state: web::Data<AppState>, _user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "total_connections": state.registry.total_connections().await,
        "active_connections": state.registry.active_connections().await,
        "subjects": state.registry.subject_count().await,
        "rooms": state.rooms.room_count().await,
        "room_memberships": state.rooms.total_memberships().await,
    }))
}

/// Register WebSocket routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_connect))
        .service(web::scope("/api/v1/ws").route("/status", web::get().to(ws_status)));
}
