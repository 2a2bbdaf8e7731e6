//! Axum web adapter: the authenticated control surface and the WebSocket
//! event channel.

pub mod auth;
pub mod bootstrap;
pub mod broadcast;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use bootstrap::{AppContext, bootstrap, start_server};
pub use broadcast::EventBroadcaster;
pub use state::AppState;
