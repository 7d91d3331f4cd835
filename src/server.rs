//! Connection bootstrap.
//!
//! The Perforce client library is consumed through [`ServerFactory`] and
//! [`Server`]; this module only turns resolved [`Settings`] into a parsed
//! [`ServerAddress`] and drives a single connect call.
//!
//! Accepted server URIs look like `p4java://host:1666` with an optional query
//! string (`p4java://host:1666?key=value`) whose pairs are handed to the
//! factory as address parameters. Scheme suffix `s` selects SSL.

use std::{fmt, path::PathBuf, str::FromStr};

use tracing::{debug, info, warn};
use url::Url;

use crate::{config::Settings, error::ConnectionError, properties::Properties};

/// Transport named by the URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `p4java`: one connection per command.
    P4Java,
    /// `p4javas`
    P4JavaSsl,
    /// `p4jrpc`: one connection for the life of the server object.
    P4JRpc,
    /// `p4jrpcs`
    P4JRpcSsl,
    /// `p4jrpcnts`: like `p4jrpc`, without thread-safety guarantees.
    P4JRpcNts,
    /// `p4jrpcntss`
    P4JRpcNtsSsl,
}

impl Protocol {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Some(match scheme {
            "p4java" => Self::P4Java,
            "p4javas" => Self::P4JavaSsl,
            "p4jrpc" => Self::P4JRpc,
            "p4jrpcs" => Self::P4JRpcSsl,
            "p4jrpcnts" => Self::P4JRpcNts,
            "p4jrpcntss" => Self::P4JRpcNtsSsl,
            _ => return None,
        })
    }

    pub fn scheme(self) -> &'static str {
        match self {
            Self::P4Java => "p4java",
            Self::P4JavaSsl => "p4javas",
            Self::P4JRpc => "p4jrpc",
            Self::P4JRpcSsl => "p4jrpcs",
            Self::P4JRpcNts => "p4jrpcnts",
            Self::P4JRpcNtsSsl => "p4jrpcntss",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::P4JavaSsl | Self::P4JRpcSsl | Self::P4JRpcNtsSsl)
    }
}

/// A parsed connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    protocol: Protocol,
    host: String,
    port: u16,
    params: Properties,
}

impl ServerAddress {
    /// Parse a server URI. Fails with [`ConnectionError::InvalidUri`] on bad
    /// syntax, an unknown scheme, or a missing host or port.
    pub fn parse(uri: &str) -> Result<Self, ConnectionError> {
        let url = Url::parse(uri).map_err(|e| ConnectionError::invalid_uri(uri, e.to_string()))?;

        let protocol = Protocol::from_scheme(url.scheme()).ok_or_else(|| {
            ConnectionError::invalid_uri(uri, format!("unknown protocol scheme '{}'", url.scheme()))
        })?;

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(ConnectionError::invalid_uri(uri, "missing host")),
        };
        let port = url
            .port()
            .ok_or_else(|| ConnectionError::invalid_uri(uri, "missing port"))?;

        if !matches!(url.path(), "" | "/") {
            return Err(ConnectionError::invalid_uri(
                uri,
                format!("unexpected path '{}'", url.path()),
            ));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ConnectionError::invalid_uri(uri, "credentials belong in userName/password"));
        }

        let params = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            protocol,
            host,
            port,
            params,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Host as written in the URI; IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Query-string parameters from the URI.
    pub fn params(&self) -> &Properties {
        &self.params
    }

    /// `host:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol.scheme(), self.authority())
    }
}

/// Options describing the program that is using the server connection.
/// Passed through to the factory untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageOptions {
    pub program_name: Option<String>,
    pub program_version: Option<String>,
    pub text_language: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub host_name: Option<String>,
}

impl UsageOptions {
    pub fn for_program(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            program_name: Some(name.into()),
            program_version: Some(version.into()),
            ..Self::default()
        }
    }
}

/// A server session produced by a [`ServerFactory`].
pub trait Server {
    /// Open the session. Protocol, authentication and network failures are
    /// reported as [`ConnectionError`].
    fn connect(&mut self) -> Result<(), ConnectionError>;

    fn is_connected(&self) -> bool;
}

/// Client-library entry point that builds server sessions.
pub trait ServerFactory {
    type Server: Server;

    /// Build a session for `address`. `Ok(None)` means the library declined
    /// to produce one.
    fn get_server(
        &self,
        address: &ServerAddress,
        props: Option<&Properties>,
        opts: Option<&UsageOptions>,
    ) -> Result<Option<Self::Server>, ConnectionError>;
}

/// Build a session for `settings.server_uri` and connect it.
///
/// The URI is parsed before the factory is called, so a malformed address
/// fails without any network activity. Errors are returned unchanged; there
/// is no retry.
pub fn connect<F: ServerFactory>(
    settings: &Settings,
    factory: &F,
    props: Option<&Properties>,
    opts: Option<&UsageOptions>,
) -> Result<Option<F::Server>, ConnectionError> {
    let address = ServerAddress::parse(settings.server_uri.as_str())?;
    debug!(%address, secure = address.protocol().is_secure(), "requesting server");

    let Some(mut server) = factory.get_server(&address, props, opts)? else {
        warn!(%address, "server factory returned no server");
        return Ok(None);
    };
    server.connect()?;

    info!(%address, user = settings.user_name.as_str(), "connected");
    Ok(Some(server))
}
