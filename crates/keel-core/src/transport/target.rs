//! Request target construction for both transports.

use std::fmt;
use std::path::PathBuf;

use crate::endpoint::Endpoint;
use crate::query::Query;

/// A concrete request target.
///
/// Displays as `http://unix:<socket>:/<path>` for unix sockets and as
/// `<scheme>://<host>[:<port>]/<path>` for network endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Unix {
        socket: PathBuf,
        path_and_query: String,
    },
    Network {
        url: String,
    },
}

impl Target {
    /// Human-readable address used in connection errors.
    pub fn authority(&self) -> String {
        match self {
            Target::Unix { socket, .. } => socket.display().to_string(),
            Target::Network { url } => url.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Unix {
                socket,
                path_and_query,
            } => write!(f, "http://unix:{}:{}", socket.display(), path_and_query),
            Target::Network { url } => f.write_str(url),
        }
    }
}

/// Build the target for a logical `path` (e.g. `containers/json`) and query.
///
/// Deterministic: the same endpoint, path and query always yield the same
/// target.
pub fn build_target(endpoint: &Endpoint, path: &str, query: Option<&Query>) -> Target {
    let mut path_and_query = format!("/{}", path.trim_start_matches('/'));
    if let Some(encoded) = query.and_then(Query::encode) {
        path_and_query.push('?');
        path_and_query.push_str(&encoded);
    }

    match endpoint {
        Endpoint::UnixSocket(socket) => Target::Unix {
            socket: socket.clone(),
            path_and_query,
        },
        Endpoint::Network { host, port, .. } => {
            let scheme = if endpoint.is_secure() { "https" } else { "http" };
            let url = match port {
                Some(port) => format!("{scheme}://{host}:{port}{path_and_query}"),
                None => format!("{scheme}://{host}{path_and_query}"),
            };
            Target::Network { url }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Scheme, TlsMaterial};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unix_target_embeds_socket_path() {
        let endpoint = Endpoint::unix("/var/run/engine.sock");
        let target = build_target(&endpoint, "info", None);
        assert_eq!(target.to_string(), "http://unix:/var/run/engine.sock:/info");
        assert_eq!(
            target,
            Target::Unix {
                socket: PathBuf::from("/var/run/engine.sock"),
                path_and_query: "/info".to_string(),
            }
        );
    }

    #[test]
    fn test_network_target_forced_to_https_when_tls_requested() {
        let endpoint = Endpoint::network(Scheme::Https, "engine.example.com", None);
        let query = Query::new().param("status", "running");
        let target = build_target(&endpoint, "containers/json", Some(&query));
        assert_eq!(
            target.to_string(),
            "https://engine.example.com/containers/json?status=running"
        );
    }

    #[test]
    fn test_network_target_https_with_tls_material() {
        let endpoint = Endpoint::network(Scheme::Http, "10.0.0.5", Some(2375))
            .with_tls(TlsMaterial::new("ca", "cert", "key"));
        let target = build_target(&endpoint, "/version", None);
        assert_eq!(target.to_string(), "https://10.0.0.5:2375/version");
    }

    #[test]
    fn test_network_target_https_on_tls_port() {
        let endpoint = Endpoint::network(Scheme::Http, "10.0.0.5", Some(2376));
        let target = build_target(&endpoint, "info", None);
        assert_eq!(target.to_string(), "https://10.0.0.5:2376/info");
    }

    #[test]
    fn test_plain_http_target() {
        let endpoint = Endpoint::network(Scheme::Http, "localhost", Some(2375));
        let target = build_target(&endpoint, "info", Some(&Query::new()));
        assert_eq!(target.to_string(), "http://localhost:2375/info");
    }

    #[test]
    fn test_build_target_is_idempotent() {
        let endpoints = [
            Endpoint::unix("/var/run/engine.sock"),
            Endpoint::network(Scheme::Http, "engine.example.com", Some(2375)),
        ];
        let query = Query::new()
            .param("all", 1)
            .filter("status", "running")
            .filter("label", "tier=web");
        for endpoint in &endpoints {
            let first = build_target(endpoint, "containers/json", Some(&query));
            let second = build_target(endpoint, "containers/json", Some(&query));
            assert_eq!(first, second);
            assert_eq!(first.to_string(), second.to_string());
        }
    }
}
