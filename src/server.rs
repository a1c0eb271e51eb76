//! Socket server that feeds client commands, one at a time, to a shared
//! interpreter.
//!
//! Sockets are driven by a single-threaded tokio runtime: every listener
//! and every client has its own task, and those tasks only run while the
//! server waits in `poll` or writes a response. Each loop iteration waits
//! (with a timeout) for connection events, queues every complete request,
//! then runs the whole queue in arrival order. There is exactly one
//! execution thread: a long-running command delays every client.

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    net::TcpListener,
    runtime::{Builder, Runtime},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::{self, JoinHandle},
    time,
};

use crate::{
    command_queue::{Command, CommandQueue},
    config::ServerConfig,
    connection::{Client, ConnectionEvent, ConnectionId, ConnectionRegistry, PeerAddress, accept_loop},
    error::{ProtocolError, ServerError},
    interpreter::{Interpreter, InterpreterHooks, OutputBuffer},
    log_sink::LogSink,
    protocol::Response,
};

/// upper bound on one readiness wait
pub const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// how long a client may leave a response unread before it is dropped
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const LISTEN_BACKLOG: i32 = 5;

/// Switches the interpreter flips from inside a command.
#[derive(Clone, Default)]
pub struct ServerControl {
    quit: Arc<AtomicBool>,
    repoll: Arc<AtomicBool>,
}

impl ServerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// True once after a command finished.
    fn take_repoll(&self) -> bool {
        self.repoll.swap(false, Ordering::SeqCst)
    }
}

impl InterpreterHooks for ServerControl {
    fn on_quit(&self) {
        self.request_quit();
    }

    fn on_post_command(&self) {
        self.repoll.store(true, Ordering::SeqCst);
    }
}

pub struct Server<I> {
    runtime: Runtime,
    local_addrs: Vec<SocketAddr>,
    listeners: Vec<JoinHandle<()>>,
    events: UnboundedReceiver<ConnectionEvent>,
    event_sender: UnboundedSender<ConnectionEvent>,
    clients: ConnectionRegistry,
    queue: CommandQueue,
    interpreter: I,
    control: ServerControl,
    log: LogSink,
    write_timeout: Duration,
}

impl<I: Interpreter> Server<I> {
    /// Listen on every address `config.ip` resolves to.
    ///
    /// Any failure here is fatal and is also written to the log.
    pub fn bind(
        config: &ServerConfig,
        interpreter: I,
        control: ServerControl,
        mut log: LogSink,
    ) -> Result<Self, ServerError> {
        let addresses =
            resolve(&config.ip, config.port).inspect_err(|e| log.warn(&e.to_string()))?;

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (event_sender, events) = mpsc::unbounded_channel();

        let mut local_addrs = Vec::with_capacity(addresses.len());
        let mut listeners = Vec::with_capacity(addresses.len());
        for address in addresses {
            let listener = listen_on(address).inspect_err(|e| log.warn(&e.to_string()))?;
            let local = listener.local_addr()?;
            let listener = {
                let _guard = runtime.enter();
                TcpListener::from_std(listener)?
            };
            log.line(&format!("Listening on {local}"));
            listeners.push(runtime.spawn(accept_loop(listener, event_sender.clone())));
            local_addrs.push(local);
        }

        Ok(Self {
            runtime,
            local_addrs,
            listeners,
            events,
            event_sender,
            clients: ConnectionRegistry::new(),
            queue: CommandQueue::new(),
            interpreter,
            control,
            log,
            write_timeout: WRITE_TIMEOUT,
        })
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.local_addrs.clone()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Serve until the interpreter evaluates the quit directive.
    pub fn run(&mut self) {
        self.interpreter.suppress_progress();
        self.log.line("Server ready");

        while !self.control.quit_requested() {
            let timeout = self.next_wait();
            self.poll(timeout);
            self.drain_queue();
        }

        self.shutdown();
    }

    /// A command that just finished may have left more work behind, so the
    /// wait after it does not block.
    fn next_wait(&self) -> Duration {
        if self.control.take_repoll() {
            Duration::ZERO
        } else {
            POLL_TIMEOUT
        }
    }

    /// Wait up to `timeout` for requests, accepting connections and
    /// queueing complete requests along the way. Returns how many requests
    /// were queued.
    pub fn poll(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut queued = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let batch = self
                .runtime
                .block_on(wait_for_events(&mut self.events, remaining));
            for event in batch {
                queued += self.handle_event(event);
            }

            if queued > 0 || Instant::now() >= deadline {
                return queued;
            }
        }
    }

    /// Run every queued command in order. Returns how many ran.
    pub fn drain_queue(&mut self) -> usize {
        let mut executed = 0;
        while let Some(command) = self.queue.pop() {
            self.execute(command);
            executed += 1;

            if self.control.quit_requested() {
                let discarded = self.queue.discard_all();
                if discarded > 0 {
                    self.log.warn(&format!(
                        "Quit requested, discarding {discarded} queued request(s)"
                    ));
                }
                break;
            }
        }
        executed
    }

    /// Returns 1 if the event queued a request.
    fn handle_event(&mut self, event: ConnectionEvent) -> usize {
        match event {
            ConnectionEvent::Accepted { stream, address } => {
                let peer = PeerAddress::from(address);
                let runtime = self.runtime.handle();
                let events = &self.event_sender;
                match self
                    .clients
                    .register(|id| Client::spawn(runtime, id, stream, peer, events.clone()))
                {
                    Ok(id) => self
                        .log
                        .line(&format!("Accepted connection {id} from {peer}")),
                    Err(e) => self
                        .log
                        .warn(&format!("Cannot set up connection from {peer}: {e}")),
                }
                0
            }
            ConnectionEvent::AcceptFailed(e) => {
                self.log.warn(&format!("accept failed: {e}"));
                0
            }
            ConnectionEvent::Request { id, request } => {
                // left over from a connection that was dropped meanwhile
                let Some(peer) = self.clients.peer(id) else {
                    return 0;
                };
                let text = request.command;
                let sequence = self.queue.push(text.clone(), id);
                self.log.line(&format!(
                    "Received request #{sequence} from {peer}: {text} [queue length: {}]",
                    self.queue.len()
                ));
                1
            }
            ConnectionEvent::ReadStopped {
                id,
                error: ProtocolError::Closed,
            } => {
                self.drop_client(id, "disconnected");
                0
            }
            ConnectionEvent::ReadStopped { id, error } => {
                self.drop_client(id, &format!("read failed: {error}"));
                0
            }
        }
    }

    fn drop_client(&mut self, id: ConnectionId, reason: &str) {
        let Some(client) = self.clients.remove(id) else {
            return;
        };
        let orphaned = self.queue.invalidate_origin(id);
        let mut line = format!("Connection {id} from {} closed: {reason}", client.peer());
        if orphaned > 0 {
            line.push_str(&format!(
                " ({orphaned} queued request(s) will run without a reply)"
            ));
        }
        self.log.line(&line);
    }

    fn execute(&mut self, command: Command) {
        log::debug!(
            "request #{} waited {:.3} seconds in the queue",
            command.sequence,
            command.queued_for().as_secs_f64()
        );
        let started = Instant::now();
        let output = OutputBuffer::new();
        self.interpreter.redirect_output(Some(output.clone()));
        let status = self.interpreter.interpret(&command.text);
        self.interpreter.redirect_output(None);

        let response = if status.is_error() {
            Response::error(self.interpreter.last_error_message())
        } else {
            Response::success(output.take())
        };

        if let Some(original) = response.truncated_from() {
            self.log.warn(&format!(
                "Response to request #{} is {original} bytes, sending only the first {}",
                command.sequence,
                response.body().len()
            ));
        }
        self.log.line(&format!(
            "Processed request #{} in {:.3} seconds",
            command.sequence,
            started.elapsed().as_secs_f64()
        ));

        let Some((id, client)) = command
            .origin
            .and_then(|id| self.clients.get_mut(id).map(|client| (id, client)))
        else {
            self.log.line(&format!(
                "Client for request #{} is gone, response dropped",
                command.sequence
            ));
            return;
        };
        let sent = self
            .runtime
            .block_on(client.send(&response, self.write_timeout));
        if let Err(e) = sent {
            self.drop_client(id, &format!("write failed: {e}"));
        }
    }

    fn shutdown(&mut self) {
        self.log.line(&format!(
            "Shutting down, closing {} connection(s)",
            self.clients.len()
        ));
        self.clients.clear();
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        // let the aborted tasks release their sockets
        self.runtime.block_on(task::yield_now());
    }
}

/// Everything the connection tasks report within `timeout`: waits for the
/// first event, then takes whatever else is already there.
async fn wait_for_events(
    events: &mut UnboundedReceiver<ConnectionEvent>,
    timeout: Duration,
) -> Vec<ConnectionEvent> {
    // give ready tasks a turn even when not waiting at all
    task::yield_now().await;

    let mut batch = Vec::new();
    match events.try_recv() {
        Ok(event) => batch.push(event),
        Err(_) => {
            if let Ok(Some(event)) = time::timeout(timeout, events.recv()).await {
                batch.push(event);
            }
        }
    }
    while let Ok(event) = events.try_recv() {
        batch.push(event);
    }
    batch
}

fn resolve(ip: &str, port: u16) -> Result<Vec<SocketAddr>, ServerError> {
    let display = format!("{ip}:{port}");
    let resolved = (ip, port)
        .to_socket_addrs()
        .map_err(|source| ServerError::Resolve {
            address: display.clone(),
            source,
        })?;

    let mut addresses: Vec<SocketAddr> = Vec::new();
    for address in resolved {
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    if addresses.is_empty() {
        return Err(ServerError::NoAddress(display));
    }
    Ok(addresses)
}

fn listen_on(address: SocketAddr) -> Result<StdTcpListener, ServerError> {
    let socket = Socket::new(
        Domain::for_address(address),
        Type::STREAM,
        Some(Protocol::TCP),
    )?;
    // separate sockets per family, so v6 must not also claim v4
    if address.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_reuse_address(true)?;

    socket
        .bind(&address.into())
        .map_err(|source| ServerError::Bind { address, source })?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| ServerError::Listen { address, source })?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}
