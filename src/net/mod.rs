//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! HttpConfig.tls (cert + key paths)
//!     → tls.rs (verify both files exist, load PEM into rustls)
//!     → http::server binds with or without TLS
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently
//! - Missing TLS files are a startup error for the server only

pub mod tls;
