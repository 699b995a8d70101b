pub mod cancel;
pub mod handlers;
pub mod server;
pub mod wire;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
