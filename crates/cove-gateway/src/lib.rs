pub mod connection;
pub mod error;
pub mod handlers;
pub mod presence;
pub mod registry;
pub mod state;

pub use state::GatewayState;
