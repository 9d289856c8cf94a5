//! API server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::auth::AuthGate;
use super::listener::{MtlsListener, PeerCertificate};
use super::router::{AppState, create_router};
use crate::config::Config;
use crate::mtls::{CertificateBundle, build_server_config, tls::cipher_suite_names};
use crate::{Error, Result};

/// Price monitor API server
#[derive(Debug)]
pub struct Server {
    /// Configuration
    config: Config,
    /// Certificate material, loaded once
    bundle: Arc<CertificateBundle>,
    /// Business routes mounted behind the gate
    extra: Router,
}

impl Server {
    /// Load certificate material for `config`.
    ///
    /// Any configuration-fatal error (missing or blank file, unusable CA)
    /// surfaces here, before a socket is opened.
    pub fn new(config: Config) -> Result<Self> {
        let bundle = Arc::new(CertificateBundle::load(&config.mtls)?);
        Ok(Self {
            config,
            bundle,
            extra: Router::new(),
        })
    }

    /// Mount business routes behind the gate.
    #[must_use]
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra = self.extra.merge(routes);
        self
    }

    /// Build the router: gate, built-in routes and the mounted business
    /// routes.
    pub fn app(&self) -> Result<Router> {
        let gate = AuthGate::new(&self.config.mtls, &self.bundle)?;
        Ok(create_router(
            Arc::new(AppState::new(gate)),
            self.extra.clone(),
        ))
    }

    /// Run the server until Ctrl-C or SIGTERM.
    ///
    /// With mTLS on, TLS is terminated here unless forwarded certificate
    /// headers are trusted, in which case a proxy owns TLS and the server
    /// listens on plain TCP behind it.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = self
            .app()?
            .into_make_service_with_connect_info::<PeerCertificate>();
        let mtls = &self.config.mtls;

        let tcp = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("PRICE MONITOR v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");

        if mtls.enabled && !mtls.trust_forwarded_headers {
            let tls = build_server_config(&self.bundle, mtls.require_client_cert)?;
            info!(
                require_client_cert = mtls.require_client_cert,
                bypass_paths = ?mtls.bypass_paths,
                known_client_certs = self.bundle.known_client_certs().len(),
                cipher_suites = ?cipher_suite_names(&tls),
                "mTLS enabled (TLS 1.2+, forward-secret AEAD suites)"
            );
            info!("============================================================");

            let listener =
                MtlsListener::new(tcp, Arc::new(tls), self.config.server.handshake_timeout)?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        } else {
            if mtls.enabled {
                warn!(
                    bypass_paths = ?mtls.bypass_paths,
                    "mTLS via proxy: plain HTTP, client certificates read from ssl-client-cert / x-ssl-cert. Keep this port reachable only by the proxy."
                );
            } else {
                warn!("mTLS disabled: plain HTTP, every request is anonymous. Development only.");
            }
            info!("============================================================");

            axum::serve(tcp, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
