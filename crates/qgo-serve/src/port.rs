//! Port selection

use crate::{ServeError, ServeResult};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;

/// First port tried by automatic discovery
pub const DEFAULT_PORT: u16 = 8000;

/// How the server port is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChoice {
    /// Use exactly this port; a collision is an error
    Fixed(u16),
    /// Scan upward from `start` and take the first bindable port
    Auto { start: u16 },
}

impl PortChoice {
    /// Fixed when a port was configured, automatic from [`DEFAULT_PORT`] otherwise
    pub fn from_option(port: Option<u16>) -> Self {
        match port {
            Some(port) => Self::Fixed(port),
            None => Self::Auto {
                start: DEFAULT_PORT,
            },
        }
    }
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Bind a listener on all interfaces according to `choice`
pub async fn bind(choice: PortChoice) -> ServeResult<TcpListener> {
    match choice {
        PortChoice::Fixed(port) => TcpListener::bind(addr(port))
            .await
            .map_err(|error| ServeError::Bind { port, error }),
        PortChoice::Auto { start } => {
            for port in start..=u16::MAX {
                match TcpListener::bind(addr(port)).await {
                    Ok(listener) => return Ok(listener),
                    Err(e) => tracing::debug!(port, error = %e, "port unavailable"),
                }
            }
            Err(ServeError::NoOpenPort { start })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_port_collision_fails() {
        let taken = TcpListener::bind(addr(0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        match bind(PortChoice::Fixed(port)).await {
            Err(ServeError::Bind { port: p, .. }) => assert_eq!(p, port),
            other => panic!("expected bind error, got {:?}", other.map(|l| l.local_addr())),
        }
    }

    #[tokio::test]
    async fn test_auto_skips_taken_port() {
        let taken = TcpListener::bind(addr(0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind(PortChoice::Auto { start: port }).await.unwrap();
        assert!(listener.local_addr().unwrap().port() > port);
        assert!(listener.local_addr().unwrap().ip().is_unspecified());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(PortChoice::from_option(Some(9000)), PortChoice::Fixed(9000));
        assert_eq!(
            PortChoice::from_option(None),
            PortChoice::Auto { start: DEFAULT_PORT }
        );
    }
}
