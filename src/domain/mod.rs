//! Core domain model: orders, merchants, channels, provider vocabularies and the ports
//! the engine talks through.

pub mod channel;
pub mod fee;
pub mod merchant;
pub mod order;
pub mod ports;
pub mod provider;
