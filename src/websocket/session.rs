//! Per-connection WebSocket actor.
//!
//! The HTTP handler validates the credential and registers the connection
//! before the actor starts; the session owns everything after that:
//! heartbeats, periodic credential re-checks, command dispatch, and
//! forwarding of events pushed through the connection's outbound channel.
//! When the registry drops that channel (forced invalidation) the forward
//! loop ends and the session closes the transport.

use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::messages::{ClientEvent, ServerEvent};
use super::registry::ConnectionId;
use super::rooms::RoomId;
use crate::auth::Claims;
use crate::error::AppError;
use crate::state::AppState;

/// Upper bound on a single room message, in bytes of UTF-8 text.
const MAX_MESSAGE_BYTES: usize = 4096;

// Pre-serialized event to write to the socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct TextMessage(String);

// Outbound channel closed underneath us; close the transport
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Terminate;

pub struct WsSession {
    connection_id: ConnectionId,
    claims: Claims,
    /// Raw bearer token, re-validated periodically for long-lived sessions
    token: String,
    /// Receiver side of the registry's channel, moved into the forward
    /// loop when the actor starts
    outbound: Option<mpsc::UnboundedReceiver<String>>,
    hb: Instant,
    state: AppState,
}

impl WsSession {
    pub fn new(
        connection_id: ConnectionId,
        claims: Claims,
        token: String,
        outbound: mpsc::UnboundedReceiver<String>,
        state: AppState,
    ) -> Self {
        Self {
            connection_id,
            claims,
            token,
            outbound: Some(outbound),
            hb: Instant::now(),
            state,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.state.config.heartbeat_interval(), |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.state.config.client_timeout() {
                warn!("WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Sessions can outlive their credential; re-validate on an interval
    /// and close with a policy code once the credential stops verifying.
    fn recheck_credential(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.state.config.credential_recheck_interval(), |act, ctx| {
            if act.state.validator.validate(&act.token).is_err() {
                warn!(
                    "credential for subject {} no longer valid, closing session",
                    act.claims.sub
                );
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("credential expired".to_string()),
                }));
                ctx.stop();
            }
        });
    }

    fn dispatch(&self, event: ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let state = self.state.clone();
        let claims = self.claims.clone();
        let connection_id = self.connection_id;
        let addr = ctx.address();

        match event {
            ClientEvent::JoinRoom { room } => {
                actix::spawn(async move {
                    let reply = match room.parse::<RoomId>() {
                        Ok(room_id) => match state
                            .rooms
                            .join(connection_id, &claims, room_id.clone())
                            .await
                        {
                            Ok(()) => {
                                state.registry.mark_active(claims.sub, connection_id).await;
                                ServerEvent::room_joined(&room_id)
                            }
                            Err(e) => ServerEvent::from_app_error(&e),
                        },
                        Err(e) => ServerEvent::from_app_error(&e),
                    };
                    send_event(&addr, reply);
                });
            }

            ClientEvent::LeaveRoom { room } => {
                actix::spawn(async move {
                    let reply = match room.parse::<RoomId>() {
                        Ok(room_id) => {
                            state.rooms.leave(&room_id, connection_id).await;
                            ServerEvent::room_left(&room_id)
                        }
                        Err(e) => ServerEvent::from_app_error(&e),
                    };
                    send_event(&addr, reply);
                });
            }

            ClientEvent::SendMessage { room, text } => {
                actix::spawn(async move {
                    if let Err(e) = validate_message_text(&text) {
                        send_event(&addr, ServerEvent::from_app_error(&e));
                        return;
                    }
                    match room.parse::<RoomId>() {
                        Ok(room_id) => {
                            // The sender is a room member, so it hears its own
                            // message through the broadcast; no extra ack.
                            if let Err(e) = state
                                .rooms
                                .publish(&room_id, connection_id, claims.sub, &claims.name, text)
                                .await
                            {
                                send_event(&addr, ServerEvent::from_app_error(&e));
                            }
                        }
                        Err(e) => send_event(&addr, ServerEvent::from_app_error(&e)),
                    }
                });
            }

            ClientEvent::ListUnread => {
                actix::spawn(async move {
                    let reply = match state.store.list_unread(claims.sub).await {
                        Ok(notifications) => ServerEvent::unread_list(notifications),
                        Err(e) => {
                            error!("failed to list unread for {}: {}", claims.sub, e);
                            ServerEvent::from_app_error(&e)
                        }
                    };
                    send_event(&addr, reply);
                });
            }

            ClientEvent::MarkRead { id } => {
                actix::spawn(async move {
                    match state.store.mark_read(id, claims.sub).await {
                        Ok(()) => {
                            send_event(&addr, ServerEvent::marked_read(id));
                            // Every connection of the subject converges on the
                            // store-derived badge value.
                            state.fanout.push_unread_count(claims.sub).await;
                        }
                        Err(e) => send_event(&addr, ServerEvent::from_app_error(&e)),
                    }
                });
            }

            ClientEvent::MarkAllRead => {
                actix::spawn(async move {
                    match state.store.mark_all_read(claims.sub).await {
                        Ok(_) => state.fanout.push_unread_count(claims.sub).await,
                        Err(e) => send_event(&addr, ServerEvent::from_app_error(&e)),
                    }
                });
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "WebSocket session started for subject {} (connection {})",
            self.claims.sub, self.connection_id
        );

        self.hb(ctx);
        self.recheck_credential(ctx);

        // Bridge the registry's outbound channel onto the socket. The loop
        // ending means the registry dropped this connection's sender.
        if let Some(mut rx) = self.outbound.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    addr.do_send(TextMessage(payload));
                }
                addr.do_send(Terminate);
            });
        }

        // Acknowledge the handshake with the current unread count so the
        // client can seed its badge without a round trip.
        let store = self.state.store.clone();
        let subject = self.claims.sub;
        let connection_id = self.connection_id;
        let addr = ctx.address();
        actix::spawn(async move {
            let unread_count = store.unread_count(subject).await.unwrap_or_else(|e| {
                warn!("unread count unavailable for {}: {}", subject, e);
                0
            });
            send_event(&addr, ServerEvent::connected(connection_id, unread_count));
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            "WebSocket session stopped for subject {} (connection {})",
            self.claims.sub, self.connection_id
        );

        let rooms = self.state.rooms.clone();
        let registry = self.state.registry.clone();
        let subject = self.claims.sub;
        let connection_id = self.connection_id;

        actix::spawn(async move {
            rooms.leave_all(connection_id).await;
            registry.unregister(subject, connection_id).await;
        });
    }
}

impl Handler<TextMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: TextMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<Terminate> for WsSession {
    type Result = ();

    fn handle(&mut self, _msg: Terminate, ctx: &mut Self::Context) {
        info!("connection {} invalidated, closing transport", self.connection_id);
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some("session invalidated".to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match ClientEvent::from_json(&text) {
                Ok(event) => self.dispatch(event, ctx),
                Err(e) => {
                    warn!("unparseable client event: {e}");
                    send_event(
                        &ctx.address(),
                        ServerEvent::error("bad_request", "unparseable event"),
                    );
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!("binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket close received: {:?}", reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket protocol error: {e}");
                ctx.stop();
            }
            _ => {}
        }
    }
}

fn send_event(addr: &Addr<WsSession>, event: ServerEvent) {
    match event.to_json() {
        Ok(json) => addr.do_send(TextMessage(json)),
        Err(e) => error!("failed to serialize server event: {e}"),
    }
}

fn validate_message_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("message text is empty".into()));
    }
    if text.len() > MAX_MESSAGE_BYTES {
        return Err(AppError::BadRequest(format!(
            "message exceeds {MAX_MESSAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_validation() {
        assert!(validate_message_text("hello").is_ok());
        assert!(validate_message_text("").is_err());
        assert!(validate_message_text("   \n\t").is_err());
        assert!(validate_message_text(&"x".repeat(MAX_MESSAGE_BYTES)).is_ok());
        assert!(validate_message_text(&"x".repeat(MAX_MESSAGE_BYTES + 1)).is_err());
    }
}
