use std::{
    collections::BTreeMap,
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Handle,
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time,
};

use crate::{
    byte_buffer::BytesBuffer,
    error::ProtocolError,
    protocol::{Request, Response},
};

const READ_CHUNK: usize = 4096;

/// pause after a failed accept, so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Opaque handle for an accepted client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Remote address, decoded once at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAddress {
    V4 { octets: [u8; 4], port: u16 },
    V6 { octets: [u8; 16], port: u16 },
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(a) => PeerAddress::V4 {
                octets: a.ip().octets(),
                port: a.port(),
            },
            SocketAddr::V6(a) => PeerAddress::V6 {
                octets: a.ip().octets(),
                port: a.port(),
            },
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PeerAddress::V4 { octets, port } => write!(f, "{}:{port}", Ipv4Addr::from(octets)),
            PeerAddress::V6 { octets, port } => write!(f, "[{}]:{port}", Ipv6Addr::from(octets)),
        }
    }
}

/// What the listener and connection tasks report to the server loop.
#[derive(Debug)]
pub enum ConnectionEvent {
    Accepted {
        stream: TcpStream,
        address: SocketAddr,
    },
    AcceptFailed(io::Error),
    /// one complete frame from `id`
    Request { id: ConnectionId, request: Request },
    /// reading from `id` stopped; `ProtocolError::Closed` for a clean hang-up
    ReadStopped { id: ConnectionId, error: ProtocolError },
}

/// Accept connections forever, handing each one to the server loop.
pub async fn accept_loop(listener: TcpListener, events: UnboundedSender<ConnectionEvent>) {
    loop {
        let event = match listener.accept().await {
            Ok((stream, address)) => ConnectionEvent::Accepted { stream, address },
            Err(e) => ConnectionEvent::AcceptFailed(e),
        };
        let failed = matches!(event, ConnectionEvent::AcceptFailed(_));
        if events.send(event).is_err() {
            return;
        }
        if failed {
            time::sleep(ACCEPT_BACKOFF).await;
        }
    }
}

/// Collect bytes from `reader` and report each request once its whole frame
/// is in. A client that stalls mid-frame only stalls this task.
async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    events: UnboundedSender<ConnectionEvent>,
) {
    let mut pending = BytesBuffer::new(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    let error = loop {
        match Request::decode(&mut pending) {
            Ok(Some(request)) => {
                if events.send(ConnectionEvent::Request { id, request }).is_err() {
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => break e,
        }

        match reader.read(&mut chunk).await {
            Ok(0) => break ProtocolError::Closed,
            Ok(n) => pending.put_u8_slice(&chunk[..n]),
            Err(e) => break e.into(),
        }
    };
    let _ = events.send(ConnectionEvent::ReadStopped { id, error });
}

/// An accepted connection: a background reader task plus the write half the
/// server answers through.
pub struct Client {
    peer: PeerAddress,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Client {
    pub fn spawn(
        runtime: &Handle,
        id: ConnectionId,
        stream: TcpStream,
        peer: PeerAddress,
        events: UnboundedSender<ConnectionEvent>,
    ) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let reader = runtime.spawn(read_loop(id, reader, events));
        Ok(Self {
            peer,
            writer,
            reader,
        })
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    /// Write one response, giving up if the peer does not take it in time.
    pub async fn send(&mut self, response: &Response, timeout: Duration) -> Result<(), ProtocolError> {
        let frame = response.encode();
        let write = async {
            self.writer.write_all(&frame).await?;
            self.writer.flush().await
        };
        match time::timeout(timeout, write).await {
            Ok(written) => Ok(written?),
            Err(_) => Err(ProtocolError::WriteTimeout(timeout)),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Open client connections keyed by handle, in accept order.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: BTreeMap<ConnectionId, Client>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next handle and store whatever `connect` builds for it.
    pub fn register<E>(
        &mut self,
        connect: impl FnOnce(ConnectionId) -> Result<Client, E>,
    ) -> Result<ConnectionId, E> {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        self.clients.insert(id, connect(id)?);
        Ok(id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn peer(&self, id: ConnectionId) -> Option<PeerAddress> {
        self.clients.get(&id).map(Client::peer)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use tokio::{
        runtime::{Builder, Runtime},
        sync::mpsc,
    };

    use super::*;

    fn runtime() -> Runtime {
        Builder::new_current_thread().enable_all().build().unwrap()
    }

    fn pair(runtime: &Runtime) -> (std::net::TcpStream, TcpStream, SocketAddr) {
        runtime.block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let outgoing = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
            let (incoming, peer) = listener.accept().await.unwrap();
            (outgoing, incoming, peer)
        })
    }

    #[test]
    fn peer_address_display() {
        let v4: PeerAddress = "10.0.0.7:10008".parse::<SocketAddr>().unwrap().into();
        assert_eq!(v4.to_string(), "10.0.0.7:10008");
        let v6: PeerAddress = "[::1]:99".parse::<SocketAddr>().unwrap().into();
        assert_eq!(v6.to_string(), "[::1]:99");
        assert!(matches!(v6, PeerAddress::V6 { port: 99, .. }));
    }

    #[test]
    fn registry_hands_out_distinct_ids_in_order() {
        let runtime = runtime();
        let (events, _rx) = mpsc::unbounded_channel();
        let mut registry = ConnectionRegistry::new();

        let (_a_out, a_in, a_peer) = pair(&runtime);
        let (_b_out, b_in, b_peer) = pair(&runtime);
        let a = registry
            .register(|id| Client::spawn(runtime.handle(), id, a_in, a_peer.into(), events.clone()))
            .unwrap();
        let b = registry
            .register(|id| Client::spawn(runtime.handle(), id, b_in, b_peer.into(), events.clone()))
            .unwrap();
        assert!(a < b);

        assert!(registry.remove(a).is_some());
        assert!(registry.peer(a).is_none());
        assert_eq!(registry.peer(b), Some(b_peer.into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reader_reports_split_frames_then_hang_up() {
        let runtime = runtime();
        let (events, mut rx) = mpsc::unbounded_channel();
        let (mut outgoing, incoming, peer) = pair(&runtime);
        let id = ConnectionId::new(3);
        let _client = Client::spawn(runtime.handle(), id, incoming, peer.into(), events).unwrap();

        let frame = Request::new("hello").encode().unwrap();
        outgoing.write_all(&frame[..2]).unwrap();
        outgoing.flush().unwrap();
        let nothing_yet = runtime.block_on(async {
            time::timeout(Duration::from_millis(100), rx.recv()).await
        });
        assert!(nothing_yet.is_err());

        outgoing.write_all(&frame[2..]).unwrap();
        drop(outgoing);

        let (first, second) = runtime.block_on(async { (rx.recv().await, rx.recv().await) });
        assert!(matches!(
            first,
            Some(ConnectionEvent::Request { id: got, ref request }) if got == id && request.command == "hello"
        ));
        assert!(matches!(
            second,
            Some(ConnectionEvent::ReadStopped {
                error: ProtocolError::Closed,
                ..
            })
        ));
    }

    #[test]
    fn send_times_out_when_peer_stops_reading() {
        let runtime = runtime();
        let (events, _rx) = mpsc::unbounded_channel();
        let (mut outgoing, incoming, peer) = pair(&runtime);
        let mut client =
            Client::spawn(runtime.handle(), ConnectionId::new(0), incoming, peer.into(), events)
                .unwrap();

        let response = Response::success("x".repeat(60_000));
        let timeout = Duration::from_millis(100);
        let result = runtime.block_on(async {
            // nobody reads `outgoing`, so the socket buffers eventually fill
            for _ in 0..1_000 {
                client.send(&response, timeout).await?;
            }
            Ok::<_, ProtocolError>(())
        });
        assert!(matches!(result, Err(ProtocolError::WriteTimeout(t)) if t == timeout));

        let mut header = [0u8; 4];
        outgoing.read_exact(&mut header).unwrap();
        assert_eq!(header[0], crate::protocol::MAGIC);
    }
}
