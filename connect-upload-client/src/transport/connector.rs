//! TLS connector setup for the hyper client.
//!
//! HTTPS uses rustls with the ring provider and the system root store;
//! plain `http://` endpoints go through the same connector untouched.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

use crate::BuildError;

/// Build the default TLS configuration: ring crypto and native root certificates.
pub fn default_tls_config() -> Result<ClientConfig, BuildError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| BuildError::Tls(e.to_string()))?;

    Ok(builder
        .with_root_certificates(build_root_store())
        .with_no_client_auth())
}

fn build_root_store() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    if !native_certs.errors.is_empty() {
        // Some certificates may still have loaded.
        tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
    }
    let (added, ignored) = roots.add_parsable_certificates(native_certs.certs);
    tracing::trace!(added, ignored, "loaded native root certificates");

    roots
}

/// Build an HTTPS connector that also accepts `http://` URLs.
pub fn build_https_connector(config: ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build()
}
