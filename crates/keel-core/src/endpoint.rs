//! Engine endpoint descriptors and their resolution from configuration.
//!
//! An [`Endpoint`] is either a local unix socket or a network address,
//! optionally carrying TLS material. Resolution precedence is: explicit
//! config value, then `DOCKER_HOST`, then the local engine socket.

use std::fmt;
use std::path::{Path, PathBuf};

use keel_config::EngineConfig;
use tracing::debug;
use zeroize::Zeroize;

/// Default local engine socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// The engine's conventional TLS port.
pub const TLS_PORT: u16 = 2376;

/// Environment variable naming the engine endpoint.
pub const HOST_VAR: &str = "DOCKER_HOST";
/// Environment variable that switches TLS on.
pub const TLS_VERIFY_VAR: &str = "DOCKER_TLS_VERIFY";
/// Environment variable naming the certificate directory.
pub const CERT_PATH_VAR: &str = "DOCKER_CERT_PATH";

/// Errors from endpoint parsing and resolution.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid engine host {0:?}")]
    InvalidHost(String),

    #[error("unsupported engine scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("TLS requested but no certificate directory is configured")]
    MissingCertPath,

    #[error("failed to read TLS material {path}: {source}")]
    TlsMaterial {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// HTTP scheme of a network endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// PEM-encoded CA certificate, client certificate, and client key.
///
/// The key is zeroized on drop and never shown in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    ca: Vec<u8>,
    cert: Vec<u8>,
    key: Vec<u8>,
    dir: Option<PathBuf>,
}

impl TlsMaterial {
    pub fn new(ca: impl Into<Vec<u8>>, cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            ca: ca.into(),
            cert: cert.into(),
            key: key.into(),
            dir: None,
        }
    }

    /// Record the certificate directory the material came from.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Read `ca.pem`, `cert.pem` and `key.pem` from a certificate directory.
    pub async fn load(dir: &Path) -> Result<Self, EndpointError> {
        async fn read(path: PathBuf) -> Result<Vec<u8>, EndpointError> {
            tokio::fs::read(&path)
                .await
                .map_err(|source| EndpointError::TlsMaterial { path, source })
        }

        debug!(dir = %dir.display(), "loading TLS material");
        Ok(Self {
            ca: read(dir.join("ca.pem")).await?,
            cert: read(dir.join("cert.pem")).await?,
            key: read(dir.join("key.pem")).await?,
            dir: Some(dir.to_path_buf()),
        })
    }

    pub fn ca(&self) -> &[u8] {
        &self.ca
    }

    pub fn cert(&self) -> &[u8] {
        &self.cert
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Certificate directory, when the material was loaded from disk.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_len", &self.ca.len())
            .field("cert_len", &self.cert.len())
            .field("key", &"[REDACTED]")
            .field("dir", &self.dir)
            .finish()
    }
}

impl Drop for TlsMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Where the engine lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A local unix domain socket.
    UnixSocket(PathBuf),
    /// A TCP endpoint, optionally secured with client TLS material.
    Network {
        scheme: Scheme,
        host: String,
        port: Option<u16>,
        tls: Option<TlsMaterial>,
    },
}

impl Endpoint {
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Endpoint::UnixSocket(path.into())
    }

    pub fn network(scheme: Scheme, host: impl Into<String>, port: Option<u16>) -> Self {
        Endpoint::Network {
            scheme,
            host: host.into(),
            port,
            tls: None,
        }
    }

    /// Attach TLS material. Has no effect on unix-socket endpoints.
    pub fn with_tls(self, material: TlsMaterial) -> Self {
        match self {
            Endpoint::Network { host, port, .. } => Endpoint::Network {
                scheme: Scheme::Https,
                host,
                port,
                tls: Some(material),
            },
            unix => unix,
        }
    }

    /// Parse a host string such as `unix:///var/run/docker.sock`,
    /// `tcp://10.0.0.5:2376` or `https://engine.example.com`.
    pub fn parse(host: &str) -> Result<Self, EndpointError> {
        let host = host.trim();
        if let Some(path) = host.strip_prefix("unix://") {
            return Self::unix_from(path, host);
        }
        if let Some(path) = host.strip_prefix("unix:") {
            return Self::unix_from(path, host);
        }
        // `http://unix:/path/to.sock` addresses a socket through an http URL.
        if let Some(path) = host.strip_prefix("http://unix:") {
            return Self::unix_from(path.trim_end_matches(':'), host);
        }

        let url = url::Url::parse(host).map_err(|_| EndpointError::InvalidHost(host.to_string()))?;
        let scheme = match url.scheme() {
            "tcp" | "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EndpointError::InvalidHost(host.to_string()))?;
        Ok(Self::network(scheme, hostname, url.port()))
    }

    fn unix_from(path: &str, original: &str) -> Result<Self, EndpointError> {
        if path.is_empty() {
            return Err(EndpointError::InvalidHost(original.to_string()));
        }
        Ok(Endpoint::UnixSocket(PathBuf::from(path)))
    }

    /// Resolve the endpoint from config, falling back to process environment.
    pub async fn from_env(config: &EngineConfig) -> Result<Self, EndpointError> {
        Self::resolve(config, |name| std::env::var(name).ok()).await
    }

    /// Resolve the endpoint from config and an injected environment lookup.
    ///
    /// TLS is activated when `tls_verify` (or `DOCKER_TLS_VERIFY`) is set, or
    /// when a network endpoint uses [`TLS_PORT`]. Material is then loaded
    /// from `cert_path`, `DOCKER_CERT_PATH`, or `$HOME/.docker`.
    pub async fn resolve<F>(config: &EngineConfig, env: F) -> Result<Self, EndpointError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = config
            .host
            .clone()
            .or_else(|| env(HOST_VAR).filter(|h| !h.is_empty()));
        let endpoint = match host {
            Some(host) => Self::parse(&host)?,
            None => Self::unix(DEFAULT_SOCKET_PATH),
        };

        if matches!(endpoint, Endpoint::UnixSocket(_)) {
            return Ok(endpoint);
        }

        let tls_requested = config
            .tls_verify
            .unwrap_or_else(|| env(TLS_VERIFY_VAR).is_some_and(|v| !v.is_empty() && v != "0"))
            || endpoint.port() == Some(TLS_PORT);
        if !tls_requested {
            return Ok(endpoint);
        }

        let cert_dir = config
            .cert_path
            .clone()
            .map(PathBuf::from)
            .or_else(|| env(CERT_PATH_VAR).filter(|p| !p.is_empty()).map(PathBuf::from))
            .or_else(|| env("HOME").map(|home| Path::new(&home).join(".docker")))
            .ok_or(EndpointError::MissingCertPath)?;

        let material = TlsMaterial::load(&cert_dir).await?;
        Ok(endpoint.with_tls(material))
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Endpoint::Network { port, .. } => *port,
            Endpoint::UnixSocket(_) => None,
        }
    }

    pub fn tls(&self) -> Option<&TlsMaterial> {
        match self {
            Endpoint::Network { tls, .. } => tls.as_ref(),
            Endpoint::UnixSocket(_) => None,
        }
    }

    /// Whether requests to this endpoint go over https.
    pub fn is_secure(&self) -> bool {
        match self {
            Endpoint::UnixSocket(_) => false,
            Endpoint::Network {
                scheme, port, tls, ..
            } => *scheme == Scheme::Https || tls.is_some() || *port == Some(TLS_PORT),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::UnixSocket(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Network { host, port, .. } => {
                let scheme = if self.is_secure() { "https" } else { "http" };
                match port {
                    Some(port) => write!(f, "{scheme}://{host}:{port}"),
                    None => write!(f, "{scheme}://{host}"),
                }
            }
        }
    }
}
