//! HTTP middleware for the portal server.

pub mod rate_limit;
pub mod timing;

pub use rate_limit::rate_limit_layer;
pub use timing::timing_layer;
