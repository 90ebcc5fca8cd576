//! Environment signals that gate and trigger sync passes.
//!
//! Each middleware owns one `tokio::sync::watch` channel and is its only
//! writer. The engine reads the cached values for its preconditions and
//! runs one consumer task per channel to decide when a pass is due.

mod account;
mod application;
mod network;

pub use account::AccountStatusMiddleware;
pub use application::{ApplicationState, ApplicationStateMiddleware};
pub use network::NetworkStatusMiddleware;
