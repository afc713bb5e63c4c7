use std::path::Path;

use rama::{
    error::{BoxError, ErrorContext as _},
    net::tls::{
        ApplicationProtocol, DataEncoding,
        server::{ServerAuth, ServerAuthData, ServerConfig},
    },
    tls::boring::server::{TlsAcceptorData, TlsAcceptorLayer},
    utils::str::NonEmptyStr,
};

/// Create the TLS acceptor for the lifecycle server from a PEM crt (chain)
/// and PEM private key, prefering HTTP/2 over HTTP/1.1 during ALPN.
pub async fn try_new_tls_acceptor_layer(
    cert_path: &Path,
    key_path: &Path,
) -> Result<TlsAcceptorLayer, BoxError> {
    let crt = read_pem_file(cert_path)
        .await
        .context("read server certificate")?;
    let key = read_pem_file(key_path)
        .await
        .context("read server private key")?;

    let tls_acceptor_data: TlsAcceptorData = ServerConfig {
        application_layer_protocol_negotiation: Some(vec![
            ApplicationProtocol::HTTP_2,
            ApplicationProtocol::HTTP_11,
        ]),
        ..ServerConfig::new(ServerAuth::Single(ServerAuthData {
            private_key: DataEncoding::Pem(key),
            cert_chain: DataEncoding::Pem(crt),
            ocsp: None,
        }))
    }
    .try_into()
    .context("create tls acceptor data")
    .with_context_debug_field("cert_path", || cert_path.to_owned())
    .with_context_debug_field("key_path", || key_path.to_owned())?;

    Ok(TlsAcceptorLayer::new(tls_acceptor_data))
}

async fn read_pem_file(path: &Path) -> Result<NonEmptyStr, BoxError> {
    tokio::fs::read_to_string(path)
        .await
        .context("read PEM file")
        .with_context_debug_field("path", || path.to_owned())?
        .try_into()
        .context("PEM file content as NonEmpty variant")
        .with_context_debug_field("path", || path.to_owned())
}
