//! TLS listener for `axum::serve`.
//!
//! Handshakes run on their own tasks so a slow or hostile client cannot stall
//! the accept loop. Only completed handshakes reach the server; failures are
//! logged at `debug` and dropped.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::Connected;
use axum::serve::{IncomingStream, Listener};
use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{debug, error};

/// Completed handshakes buffered ahead of the server.
const ACCEPT_BACKLOG: usize = 128;

/// Back-off after a failing `accept()` (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Listener yielding TLS streams whose handshake already completed.
#[derive(Debug)]
pub struct MtlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<(TlsStream<TcpStream>, SocketAddr)>,
}

impl MtlsListener {
    /// Start accepting on `listener`, handshaking with `config`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        listener: TcpListener,
        config: Arc<ServerConfig>,
        handshake_timeout: Duration,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (tx, ready) = mpsc::channel(ACCEPT_BACKLOG);

        tokio::spawn(accept_loop(
            listener,
            TlsAcceptor::from(config),
            handshake_timeout,
            tx,
        ));

        Ok(Self { local_addr, ready })
    }
}

impl Listener for MtlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(conn) => conn,
            // Accept loop gone: never yield again, graceful shutdown ends serve.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    ready: mpsc::Sender<(TlsStream<TcpStream>, SocketAddr)>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "TCP accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        if ready.is_closed() {
            debug!("Listener dropped, stopping accept loop");
            return;
        }

        let acceptor = acceptor.clone();
        let ready = ready.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    let _ = ready.send((tls, addr)).await;
                }
                Ok(Err(e)) => debug!(remote = %addr, error = %e, "TLS handshake failed"),
                Err(_) => debug!(remote = %addr, "TLS handshake timed out"),
            }
        });
    }
}

/// Connection info: remote address, whether this process terminated TLS,
/// and the leaf certificate the client presented during the handshake.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    /// Remote socket address
    pub remote_addr: SocketAddr,
    /// TLS was terminated by [`MtlsListener`], not by a proxy
    pub tls: bool,
    /// DER leaf certificate
    pub certificate: Option<CertificateDer<'static>>,
}

impl PeerCertificate {
    /// Connection info for a plain TCP peer.
    #[must_use]
    pub fn none(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            tls: false,
            certificate: None,
        }
    }

    /// Whether certificate headers on this connection may come from a
    /// TLS-terminating proxy. Never true for connections this process
    /// decrypted itself.
    #[must_use]
    pub fn may_carry_forwarded_certificate(&self) -> bool {
        !self.tls
    }
}

impl Connected<IncomingStream<'_, MtlsListener>> for PeerCertificate {
    fn connect_info(stream: IncomingStream<'_, MtlsListener>) -> Self {
        let (_, session) = stream.io().get_ref();
        Self {
            remote_addr: *stream.remote_addr(),
            tls: true,
            certificate: session
                .peer_certificates()
                .and_then(|chain| chain.first())
                .map(|leaf| leaf.clone().into_owned()),
        }
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for PeerCertificate {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self::none(*stream.remote_addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plain_tcp_peers_may_carry_forwarded_certificates() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let plain = PeerCertificate::none(addr);
        let tls = PeerCertificate { tls: true, ..PeerCertificate::none(addr) };

        assert!(plain.may_carry_forwarded_certificate());
        assert!(!tls.may_carry_forwarded_certificate());
    }
}
