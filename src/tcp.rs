//! Transport-level [`ServerFactory`].
//!
//! Opens a plain blocking TCP connection to the resolved address and nothing
//! more: no Perforce handshake, no SSL, no login. Enough for the demo binary
//! to prove the server address is reachable.

use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::{
    error::ConnectionError,
    properties::Properties,
    server::{Server, ServerAddress, ServerFactory, UsageOptions},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpServerFactory;

impl ServerFactory for TcpServerFactory {
    type Server = TcpServer;

    fn get_server(
        &self,
        address: &ServerAddress,
        _props: Option<&Properties>,
        opts: Option<&UsageOptions>,
    ) -> Result<Option<TcpServer>, ConnectionError> {
        let program = opts.and_then(|o| o.program_name.as_deref()).unwrap_or("-");
        debug!(%address, program, "tcp server created");
        Ok(Some(TcpServer {
            address: address.clone(),
            stream: None,
        }))
    }
}

#[derive(Debug)]
pub struct TcpServer {
    address: ServerAddress,
    stream: Option<TcpStream>,
}

impl TcpServer {
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Close the socket if open.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Server for TcpServer {
    fn connect(&mut self) -> Result<(), ConnectionError> {
        let host = self.address.host().trim_start_matches('[').trim_end_matches(']');
        let port = self.address.port();

        let candidates = (host, port).to_socket_addrs().map_err(|e| {
            ConnectionError::Connection(format!("cannot resolve {}: {e}", self.address.authority()))
        })?;

        let mut last_err = None;
        for addr in candidates {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    debug!(%addr, "tcp connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(ConnectionError::Connection(match last_err {
            Some(e) => format!("cannot connect to {}: {e}", self.address.authority()),
            None => format!("no addresses found for {}", self.address.authority()),
        }))
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    fn address_for(port: u16) -> ServerAddress {
        ServerAddress::parse(&format!("p4java://127.0.0.1:{port}")).unwrap()
    }

    #[test]
    fn connects_to_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut server = TcpServerFactory
            .get_server(&address_for(port), None, None)
            .unwrap()
            .unwrap();
        assert!(!server.is_connected());

        server.connect().unwrap();
        assert!(server.is_connected());
        assert!(listener.accept().is_ok());

        server.disconnect();
        assert!(!server.is_connected());
    }

    #[test]
    fn refused_connection_is_a_connection_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut server = TcpServerFactory
            .get_server(&address_for(port), None, None)
            .unwrap()
            .unwrap();
        let err = server.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::Connection(_)), "{err}");
        assert!(!server.is_connected());
    }
}
