use std::{
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use anyhow::anyhow;
use socket2::{Socket, TcpKeepalive};

use crate::protocol::{Request, Response};

/// script server address
#[derive(Debug, Clone)]
pub struct ServerAddress {
    /// server host
    host: String,
    /// server port
    port: u16,
}

impl ServerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct ServerClient {
    stream: TcpStream,
}

impl ServerClient {
    /// Try every address the host resolves to, first success wins.
    pub fn connect(server_address: &ServerAddress) -> anyhow::Result<Self> {
        let mut last_error = None;
        for addr in server_address.address().to_socket_addrs()? {
            match Self::connect_addr(addr) {
                Ok(stream) => return Ok(Self { stream }),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            anyhow!("{} did not resolve to any address", server_address.address())
        }))
    }

    fn connect_addr(addr: SocketAddr) -> anyhow::Result<TcpStream> {
        let socket = Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;

        socket.set_nodelay(true)?;
        // scripts can run for a long time; only the write side is bounded
        socket.set_write_timeout(Some(Duration::from_secs(30)))?;

        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(60))
            .with_interval(Duration::from_secs(10));
        socket.set_tcp_keepalive(&keepalive)?;

        socket
            .connect(&addr.into())
            .map_err(|e| anyhow!("cannot connect to {addr}: {e}"))?;

        let stream: TcpStream = socket.into();
        stream.set_nonblocking(false)?;
        Ok(stream)
    }

    /// Send one command and wait for its response.
    pub fn send_command(&mut self, command: &str) -> anyhow::Result<Response> {
        Request::new(command).write_to(&mut self.stream)?;
        Ok(Response::read_from(&mut self.stream)?)
    }
}
