//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! route / static registration (configuration phase)
//!     → server.rs (collect into an axum Router, reject conflicts)
//! start
//!     → bind plain or TLS listener (net::tls)
//!     → request.rs (request ID, tracing span, timeout)
//!     → handler(State<SharedResources>, ...)
//! shutdown(deadline)
//!     → drain in-flight requests → force close at the deadline
//! ```

pub mod request;
pub mod server;

pub use request::{apply_layers, RequestIdExt, X_REQUEST_ID};
pub use server::{ServerComponent, SharedResources};
