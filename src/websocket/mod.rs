/// Realtime WebSocket layer.
///
/// Pieces fit together as follows:
/// 1. ConnectionRegistry: live connections per authenticated subject
/// 2. RoomRouter: room membership and ordered message fanout
/// 3. WsSession: the per-connection actor speaking the wire protocol
/// 4. ClientEvent / ServerEvent: the wire protocol itself
pub mod messages;
pub mod registry;
pub mod rooms;
pub mod session;

pub use messages::{ClientEvent, ServerEvent};
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionState, OutboundSender};
pub use rooms::{RoomId, RoomRouter};
pub use session::WsSession;
