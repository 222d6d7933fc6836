use crate::{
    auth::CredentialValidator,
    config::Config,
    services::{NotificationFanout, NotificationStore},
    websocket::{ConnectionRegistry, RoomRouter},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub validator: CredentialValidator,
    pub registry: ConnectionRegistry,
    pub rooms: RoomRouter,
    /// Store behind a trait so tests and DB-less deployments can swap it
    pub store: Arc<dyn NotificationStore>,
    pub fanout: Arc<NotificationFanout>,
}
