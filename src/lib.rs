//! JMESPath relay library.
//!
//! Accepts JSON over HTTP, reshapes it with a JMESPath expression evaluated
//! against `{"body": ..., "query_params": ...}`, and forwards the result to a
//! single upstream URL.

pub mod config;
pub mod expression;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transform;

pub use config::schema::ProxyConfig;
pub use expression::Expression;
pub use http::HttpServer;
pub use transform::{apply, Transform, TransformError};
