//! # Health probe targets.
//!
//! Accepted forms:
//! - `http://host[:port]/path`, `https://...` → HTTP GET, any 2xx is healthy
//! - `tcp://host:port` or bare `host:port`    → TCP connect-then-close

use std::fmt;
use std::str::FromStr;

use url::Url;

/// Parsed readiness target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthTarget {
    /// HTTP(S) endpoint.
    Http(Url),
    /// Raw TCP port.
    Tcp { host: String, port: u16 },
}

impl HealthTarget {
    /// Parses a target string; the error is a human-readable reason.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty target".to_string());
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw).map_err(|e| e.to_string())?;
            if url.host_str().is_none() {
                return Err("missing host".to_string());
            }
            return Ok(HealthTarget::Http(url));
        }

        if raw.starts_with("tcp://") {
            let url = Url::parse(raw).map_err(|e| e.to_string())?;
            let host = url.host_str().ok_or("missing host")?;
            let port = url.port().ok_or("missing port")?;
            return Ok(HealthTarget::Tcp {
                host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
                port,
            });
        }

        if raw.contains("://") {
            return Err(format!("unsupported scheme in '{raw}'"));
        }

        let (host, port) = raw.rsplit_once(':').ok_or("expected host:port")?;
        let port: u16 = port.parse().map_err(|_| format!("invalid port '{port}'"))?;
        if host.is_empty() {
            return Err("missing host".to_string());
        }
        Ok(HealthTarget::Tcp {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        })
    }
}

impl FromStr for HealthTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HealthTarget::parse(s)
    }
}

impl fmt::Display for HealthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthTarget::Http(url) => write!(f, "{url}"),
            HealthTarget::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http() {
        let t = HealthTarget::parse("http://localhost:8000/health").unwrap();
        match t {
            HealthTarget::Http(url) => {
                assert_eq!(url.port(), Some(8000));
                assert_eq!(url.path(), "/health");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_tcp_forms() {
        let expected = HealthTarget::Tcp {
            host: "localhost".into(),
            port: 27017,
        };
        assert_eq!(HealthTarget::parse("tcp://localhost:27017").unwrap(), expected);
        assert_eq!(HealthTarget::parse("localhost:27017").unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(HealthTarget::parse("").is_err());
        assert!(HealthTarget::parse("localhost").is_err());
        assert!(HealthTarget::parse("localhost:http").is_err());
        assert!(HealthTarget::parse("tcp://localhost").is_err());
        assert!(HealthTarget::parse("ftp://localhost:21").is_err());
    }

    #[test]
    fn display_round_trips_tcp() {
        let t = HealthTarget::parse("127.0.0.1:5432").unwrap();
        assert_eq!(t.to_string(), "tcp://127.0.0.1:5432");
    }
}
