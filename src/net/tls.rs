//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;
use crate::error::ComponentError;

/// Check that both TLS files exist, without reading them.
pub fn verify_tls_files(tls: &TlsConfig) -> Result<(), ComponentError> {
    for (what, path) in [("Certificate", &tls.cert_path), ("Private key", &tls.key_path)] {
        if !Path::new(path).is_file() {
            return Err(ComponentError::Tls(format!("{} file not found: {:?}", what, path)));
        }
    }
    Ok(())
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, ComponentError> {
    verify_tls_files(tls)?;
    RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| ComponentError::Tls(e.to_string()))
}
