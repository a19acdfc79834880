//! HTTP API: routing, request context and response mapping over the signup
//! engines.

pub mod app;
pub mod context;
pub mod middleware;
