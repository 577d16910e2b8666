//! Tower middleware applied to every request.
//!
//! - `RequestIdLayer`: assigns or propagates `x-request-id`
//! - `LoggingLayer`: one structured log line per request

mod logging;
mod request_id;

pub use logging::{LoggingLayer, LoggingMiddleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, RequestIdLayer, RequestIdMiddleware};
