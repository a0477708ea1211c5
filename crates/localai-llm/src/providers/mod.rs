//! Transport implementations.

pub mod gateway;

pub use gateway::GatewayTransport;
