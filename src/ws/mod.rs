mod handler;
mod messages;
mod rooms;

pub use handler::{ws_handler, GatewayState};
pub use messages::{ActionKind, ClientMessage, ServerMessage};
pub use rooms::RoomBus;
