//! Construction of the per-slot HTTP clients.
//!
//! Every slot gets its own client with its own connection pool,
//! so slots never share (HTTP/2) connections with each other.

use std::{path::Path, sync::Arc, time::Duration};

use rama::{
    Layer as _, Service as _,
    error::{BoxError, ErrorContext as _, ErrorExt as _},
    http::{Request, Response, client::EasyHttpWebClient},
    layer::TimeoutLayer,
    rt::Executor,
    service::BoxService,
    tls::boring::{
        client::TlsConnectorDataBuilder,
        core::x509::{X509, store::X509StoreBuilder},
    },
};

/// The client type used by each slot of a [`super::ClientPool`].
pub type WebClient = BoxService<Request, Response, BoxError>;

/// Read the trust root (one or more PEM encoded CA certificates)
/// and turn it into the TLS connector config shared by all slots.
///
/// Offers `h2` and `http/1.1` via ALPN, the server decides.
pub async fn try_load_trust_root(path: &Path) -> Result<Arc<TlsConnectorDataBuilder>, BoxError> {
    let pem = tokio::fs::read(path)
        .await
        .context("read trust root certificate")
        .with_context_debug_field("path", || path.to_owned())?;

    let certs = X509::stack_from_pem(&pem)
        .context("parse trust root certificate(s) as PEM")
        .with_context_debug_field("path", || path.to_owned())?;
    if certs.is_empty() {
        return Err(BoxError::from("no PEM certificate found in trust root")
            .context_debug_field("path", path.to_owned()));
    }

    let mut store_builder = X509StoreBuilder::new().context("create x509 store builder")?;
    for cert in certs {
        store_builder
            .add_cert(cert)
            .context("add trust root certificate to x509 store")?;
    }
    let store = Arc::new(store_builder.build());

    Ok(Arc::new(
        TlsConnectorDataBuilder::new_http_auto().with_server_verify_cert_store(store),
    ))
}

/// Create a new client that trusts the servers signed by the given trust root.
pub fn new_web_client(
    tls_config: Arc<TlsConnectorDataBuilder>,
    request_timeout: Duration,
) -> Result<WebClient, BoxError> {
    let inner = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(Some(tls_config))
        .with_default_http_connector(Executor::default())
        .try_with_default_connection_pool()
        .context("create connection pool for slot web client")?
        .build_client();

    Ok(TimeoutLayer::new(request_timeout).into_layer(inner).boxed())
}
