//! Application layer orchestrating the gateway operations.
//!
//! Every request runs validator -> config resolver -> idempotent order lookup/create ->
//! channel client -> response normalization -> state transition. `TradeEngine` is the
//! single entry point; refunds live in their own module but extend the same engine.

pub mod engine;
pub mod refund;
pub mod resolver;
pub mod response;
pub mod validator;
