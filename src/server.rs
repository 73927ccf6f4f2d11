use std::{
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, trace, warn};

use crate::{
    config::ServerConfig,
    error::Error,
    pixel_buffer::Canvas,
    protocol::{Command, Decoder, ACK},
    worker::{Priority, StopToken, Worker, WorkerState},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerReport {
    pub accepted: u64,
    pub refused: u64,
    /// Connections that did not wind down within the join timeout.
    pub stuck: u64,
}

/// Remote pattern generator: turns a TCP command stream into buffer writes.
pub struct ControlServer {
    listener: TcpListener,
    canvas: Arc<dyn Canvas>,
    config: ServerConfig,
}
impl ControlServer {
    pub fn bind(canvas: Arc<dyn Canvas>, config: ServerConfig) -> Result<Self, Error> {
        let listener = TcpListener::bind(config.bind)?;
        // Polled so the accept loop can notice a stop request.
        listener.set_nonblocking(true)?;
        info!("control server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            canvas,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(self) -> Result<Worker<ServerReport>, Error> {
        Worker::spawn("control-server", Priority::Elevated, move |stop| {
            self.run(&stop)
        })
    }

    pub fn run(self, stop: &StopToken) -> ServerReport {
        let mut report = ServerReport::default();
        let mut connections: Vec<Worker<()>> = Vec::new();

        while !stop.is_requested() {
            connections.retain(|c| c.state() != WorkerState::Stopped);

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if connections.len() >= self.config.max_connections {
                        warn!(
                            "refusing {peer}: already serving {} connections",
                            connections.len()
                        );
                        report.refused += 1;
                        continue;
                    }
                    match self.open(stream, peer) {
                        Ok(worker) => {
                            report.accepted += 1;
                            connections.push(worker);
                        }
                        Err(err) => warn!("could not serve {peer}: {err}"),
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    stop.sleep(self.config.poll_interval);
                }
                Err(err) => {
                    warn!("accept failed: {err}");
                    stop.sleep(self.config.poll_interval);
                }
            }
        }

        report.stuck = join_all(connections, self.config.connection_join_timeout);
        info!(
            "control server stopped ({} accepted, {} refused)",
            report.accepted, report.refused
        );
        report
    }

    fn open(&self, stream: TcpStream, peer: SocketAddr) -> Result<Worker<()>, Error> {
        // Accepted sockets may inherit non-blocking mode from the listener.
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.config.poll_interval))?;
        stream.set_write_timeout(Some(self.config.poll_interval))?;
        stream.set_nodelay(true)?;

        let connection = Connection {
            stream,
            peer,
            decoder: Decoder::new(),
            canvas: Arc::clone(&self.canvas),
        };
        Worker::spawn(format!("conn:{peer}"), Priority::Normal, move |stop| {
            connection.serve(&stop)
        })
    }
}

/// Stops every connection and waits for all of them against one deadline.
/// Returns how many were still running when it passed.
fn join_all(connections: Vec<Worker<()>>, timeout: Duration) -> u64 {
    for connection in &connections {
        connection.request_stop();
    }
    let deadline = Instant::now() + timeout;
    let mut stuck = 0;
    for connection in connections {
        let left = deadline.saturating_duration_since(Instant::now());
        if let Err(err) = connection.join_timeout(left) {
            error!("{err}");
            stuck += 1;
        }
    }
    stuck
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: Decoder,
    canvas: Arc<dyn Canvas>,
}
impl Connection {
    fn serve(mut self, stop: &StopToken) {
        debug!("{} connected", self.peer);
        match self.read_commands(stop) {
            Ok(applied) => debug!("{} closed after {applied} commands", self.peer),
            Err(err) => warn!("dropping {}: {err}", self.peer),
        }
    }

    fn read_commands(&mut self, stop: &StopToken) -> Result<u64, Error> {
        let mut chunk = [0u8; 512];
        let mut applied = 0;
        while !stop.is_requested() {
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.decoder.finish()?;
                    return Ok(applied);
                }
                Ok(n) => n,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err.into()),
            };

            self.decoder.push(&chunk[..n]);
            while let Some(command) = self.decoder.next_command()? {
                self.apply(command, stop)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn apply(&mut self, command: Command, stop: &StopToken) -> Result<(), Error> {
        trace!("{}: {command:?}", self.peer);
        match command {
            Command::SetPixel { x, y, color } => {
                self.canvas.set_pixel(u32::from(x), u32::from(y), color)?
            }
            Command::Clear => self.canvas.clear(),
            Command::Fill(color) => self.canvas.fill(color),
            Command::Sync => self.acknowledge(stop)?,
        }
        Ok(())
    }

    /// A peer that never reads its acks fills the send buffer; keep retrying
    /// until it drains or the connection is told to stop.
    fn acknowledge(&mut self, stop: &StopToken) -> io::Result<()> {
        loop {
            match self.stream.write(&[ACK]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(_) => return Ok(()),
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    if stop.is_requested() {
                        return Err(io::Error::new(
                            ErrorKind::TimedOut,
                            "peer stopped reading acknowledgements",
                        ));
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
