//! # Single-attempt probes.
//!
//! [`Probe`] is the seam between the verifier's polling loop and the network.
//! [`NetProbe`] is the default implementation; tests and embedders may plug in
//! their own.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::health::HealthTarget;

/// One readiness probe attempt.
///
/// Implementations must not fail on ordinary connection errors; they report
/// `false` instead.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn check(&self, target: &HealthTarget) -> bool;
}

/// HTTP GET (2xx) / TCP connect probe with a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct NetProbe {
    client: reqwest::Client,
    attempt_timeout: Duration,
}

impl NetProbe {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            attempt_timeout,
        }
    }

    async fn check_http(&self, url: &url::Url) -> bool {
        match self
            .client
            .get(url.clone())
            .timeout(self.attempt_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                tracing::trace!(%url, error = %err, "http probe failed");
                false
            }
        }
    }

    async fn check_tcp(&self, host: &str, port: u16) -> bool {
        match tokio::time::timeout(self.attempt_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(err)) => {
                tracing::trace!(host, port, error = %err, "tcp probe failed");
                false
            }
            Err(_elapsed) => false,
        }
    }
}

impl Default for NetProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Probe for NetProbe {
    async fn check(&self, target: &HealthTarget) -> bool {
        match target {
            HealthTarget::Http(url) => self.check_http(url).await,
            HealthTarget::Tcp { host, port } => self.check_tcp(host, *port).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_probe_sees_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = NetProbe::new(Duration::from_millis(500));

        let open = HealthTarget::Tcp {
            host: "127.0.0.1".into(),
            port,
        };
        assert!(probe.check(&open).await);

        drop(listener);
        assert!(!probe.check(&open).await);
    }

    async fn serve_once(listener: TcpListener, status_line: &'static str) {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = sock.read(&mut buf).await;
        let resp = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        sock.write_all(resp.as_bytes()).await.unwrap();
        let _ = sock.shutdown().await;
    }

    #[tokio::test]
    async fn http_probe_requires_2xx() {
        let probe = NetProbe::new(Duration::from_secs(2));

        let ok = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ok_url = format!("http://{}/health", ok.local_addr().unwrap());
        let server = tokio::spawn(serve_once(ok, "HTTP/1.1 200 OK"));
        assert!(probe.check(&HealthTarget::parse(&ok_url).unwrap()).await);
        server.await.unwrap();

        let bad = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bad_url = format!("http://{}/health", bad.local_addr().unwrap());
        let server = tokio::spawn(serve_once(bad, "HTTP/1.1 503 Service Unavailable"));
        assert!(!probe.check(&HealthTarget::parse(&bad_url).unwrap()).await);
        server.await.unwrap();
    }
}
