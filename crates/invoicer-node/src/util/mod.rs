//! Process-level helpers for running the node as a service.
//!
//! | Module | Description | Feature |
//! |--------|-------------|---------|
//! | [`shutdown`] | SIGTERM/SIGINT driven graceful shutdown | - |
//! | [`telemetry`] | Log subscriber, HTTP tracing and optional OTLP export | `telemetry` adds OTLP |

pub mod shutdown;
pub mod telemetry;

pub use shutdown::*;
pub use telemetry::*;
