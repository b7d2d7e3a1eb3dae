//! # courier-server
//!
//! HTTP and WebSocket front end for the Courier chat hub.
//!
//! - `GET /ws` - WebSocket endpoint speaking `{event, data}` JSON frames
//! - `POST /emit` - Broadcast gateway for out-of-process collaborators
//! - `GET /health` - Liveness and hub statistics
//!
//! The binary is a thin wrapper around [`run_server`]; tests bind their own
//! listener and call [`serve`].

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod store;

pub use config::Config;
pub use handlers::{build_router, run_server, serve, AppState, EmitRequest, EmitResponse};
pub use store::MongoUserStore;
