//! Connection manager owning the single serial connection.
//!
//! The manager runs as its own task and is driven through a
//! [`ManagerHandle`]. Connection handshakes run on a separate background
//! task, one at a time, so that listing devices and sending data are never
//! blocked by a slow peer. Further connect requests are queued in arrival
//! order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use serde::{Deserialize, Serialize};

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use uuid::Uuid;

use crate::host::{Capability, Host, Link, Permissions, RemoteDevice};
use crate::{Address, DeviceInfo, Error, ErrorCode};


#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Service to open on the remote device.
    pub service: Uuid,

    /// Upper bound for a single connection handshake. `None` waits until
    /// the host stack gives up.
    pub connect_timeout: Option<Duration>,

    /// Connect requests that may wait behind the one in flight before new
    /// ones are rejected.
    pub max_pending_connects: usize,

    pub command_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            service: crate::UUID,
            connect_timeout: None,
            max_pending_connects: 4,
            command_capacity: 32,
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}


type Reply<T> = oneshot::Sender<T>;

enum Command {
    PairedDevices { reply: Reply<Vec<DeviceInfo>> },
    Connect { address: Address, reply: Reply<Result<(), Error>> },
    Send { data: Bytes, reply: Reply<Result<(), Error>> },
    Disconnect { reply: Reply<()> },
    State { reply: Reply<ConnectionState> },
}

struct Connection {
    address: Address,
    link: Box<dyn Link>,
}

impl Connection {
    async fn close(mut self) {
        tracing::debug!(address=%self.address, "closing connection");

        if let Err(err) = self.link.shutdown().await {
            tracing::debug!(address=%self.address, error=?err, "error shutting down connection");
        }
    }
}

struct PendingConnect {
    device: Box<dyn RemoteDevice>,
    reply: Reply<Result<(), Error>>,
}

struct Handshake {
    address: Address,
    reply: Reply<Result<(), Error>>,
    task: JoinHandle<Result<Box<dyn Link>, Error>>,
}


pub struct Manager {
    host: Arc<dyn Host>,
    permissions: Arc<dyn Permissions>,
    config: ManagerConfig,

    commands: mpsc::Receiver<Command>,

    connection: Option<Connection>,
    handshake: Option<Handshake>,
    pending: VecDeque<PendingConnect>,
}

impl Manager {
    pub fn new(
        host: Arc<dyn Host>,
        permissions: Arc<dyn Permissions>,
        config: ManagerConfig,
    ) -> (Manager, ManagerHandle) {
        let (command_tx, commands) = mpsc::channel(config.command_capacity.max(1));

        let manager = Manager {
            host,
            permissions,
            config,
            commands,
            connection: None,
            handshake: None,
            pending: VecDeque::new(),
        };

        (manager, ManagerHandle { commands: command_tx })
    }

    /// Create a manager and run it on a new task.
    pub fn spawn(
        host: Arc<dyn Host>,
        permissions: Arc<dyn Permissions>,
        config: ManagerConfig,
    ) -> ManagerHandle {
        let (manager, handle) = Self::new(host, permissions, config);
        tokio::spawn(manager.run());
        handle
    }

    /// Process requests until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::trace!("connection manager started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.process(cmd).await,
                    None => break,
                },
                result = join(&mut self.handshake) => {
                    self.complete(result).await
                },
            }
        }

        self.shutdown().await;
        tracing::trace!("connection manager stopped");
    }

    async fn process(&mut self, cmd: Command) {
        match cmd {
            Command::PairedDevices { reply } => {
                let _ = reply.send(self.paired_devices().await);
            },
            Command::Connect { address, reply } => {
                self.connect(address, reply).await;
            },
            Command::Send { data, reply } => {
                let _ = reply.send(self.send(&data).await);
            },
            Command::Disconnect { reply } => {
                if let Some(conn) = self.connection.take() {
                    conn.close().await;
                }
                let _ = reply.send(());
            },
            Command::State { reply } => {
                let _ = reply.send(self.state());
            },
        }
    }

    fn state(&self) -> ConnectionState {
        if self.handshake.is_some() {
            ConnectionState::Connecting
        } else if self.connection.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Idle
        }
    }

    async fn paired_devices(&mut self) -> Vec<DeviceInfo> {
        if !self.permissions.is_granted(Capability::Connect) {
            tracing::warn!("bluetooth connect permission not granted, cannot list devices");
            return Vec::new();
        }

        match self.host.bonded_devices().await {
            Ok(devices) => {
                tracing::trace!(count=devices.len(), "queried bonded devices");
                devices
            },
            Err(err) => {
                tracing::warn!(error=%err, "failed to query bonded devices");
                Vec::new()
            },
        }
    }

    async fn connect(&mut self, address: Address, reply: Reply<Result<(), Error>>) {
        if !self.permissions.is_granted(Capability::Connect) {
            tracing::warn!(address=%address, "bluetooth connect permission not granted");
            let _ = reply.send(Err(Error::permission_denied(ErrorCode::PermissionDenied.description())));
            return;
        }

        let device = match self.host.resolve(address).await {
            Ok(device) => device,
            Err(err) => {
                tracing::debug!(address=%address, error=%err, "failed to resolve device");
                let _ = reply.send(Err(err.with_code(ErrorCode::DeviceNotFound)));
                return;
            },
        };

        if self.pending.len() >= self.config.max_pending_connects {
            tracing::warn!(address=%address, pending=self.pending.len(), "rejecting connect request");
            let _ = reply.send(Err(Error::busy(format!("{} connect requests already pending", self.pending.len()))));
            return;
        }

        self.pending.push_back(PendingConnect { device, reply });
        self.start_next();
    }

    fn start_next(&mut self) {
        if self.handshake.is_some() {
            return;
        }

        let Some(PendingConnect { device, reply }) = self.pending.pop_front() else {
            return;
        };

        let address = device.address();
        let service = self.config.service;
        let timeout = self.config.connect_timeout;

        tracing::debug!(address=%address, "starting connection handshake");

        let task = tokio::spawn(async move {
            handshake(&*device, service, timeout).await
        });

        self.handshake = Some(Handshake { address, reply, task });
    }

    async fn complete(&mut self, result: Result<Box<dyn Link>, Error>) {
        let Some(handshake) = self.handshake.take() else {
            return;
        };

        match result {
            Ok(link) => {
                if let Some(old) = self.connection.take() {
                    tracing::debug!(old=%old.address, new=%handshake.address, "replacing connection");
                    old.close().await;
                }

                tracing::debug!(address=%handshake.address, "connected");
                self.connection = Some(Connection { address: handshake.address, link });

                let _ = handshake.reply.send(Ok(()));
            },
            Err(err) => {
                tracing::warn!(address=%handshake.address, error=%err, "connection failed");
                let _ = handshake.reply.send(Err(err));
            },
        }

        self.start_next();
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let Some(conn) = self.connection.as_mut() else {
            tracing::debug!(len=data.len(), "no connection, cannot send data");
            return Err(Error::not_connected("no connection open"));
        };

        match write(conn.link.as_mut(), data).await {
            Ok(()) => {
                tracing::trace!(address=%conn.address, len=data.len(), "data sent");
                Ok(())
            },
            Err(err) => {
                tracing::warn!(address=%conn.address, error=?err, "failed to send data, dropping connection");
                self.connection = None;

                Err(Error::extend(ErrorCode::SendError, err.to_string(), err))
            },
        }
    }

    async fn shutdown(mut self) {
        if let Some(handshake) = self.handshake.take() {
            handshake.task.abort();
            let _ = handshake.reply.send(Err(Error::from(ErrorCode::Unavailable)));
        }

        for pending in self.pending.drain(..) {
            let _ = pending.reply.send(Err(Error::from(ErrorCode::Unavailable)));
        }

        if let Some(conn) = self.connection.take() {
            conn.close().await;
        }
    }
}

/// Wait for the handshake in flight, if any. A task that died without a
/// result counts as a failed handshake.
async fn join(handshake: &mut Option<Handshake>) -> Result<Box<dyn Link>, Error> {
    let Some(handshake) = handshake else {
        return std::future::pending().await;
    };

    match (&mut handshake.task).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(address=%handshake.address, error=%err, "connection handshake task failed");
            Err(Error::extend(ErrorCode::ConnectionError, "connection handshake aborted", err))
        },
    }
}

async fn handshake(
    device: &dyn RemoteDevice,
    service: Uuid,
    timeout: Option<Duration>,
) -> Result<Box<dyn Link>, Error> {
    let connect = device.connect(service);

    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect).await
            .map_err(|_| Error::connection("connection attempt timed out"))?,
        None => connect.await,
    };

    result.map_err(|err| err.with_code(ErrorCode::ConnectionError))
}

async fn write(link: &mut dyn Link, data: &[u8]) -> std::io::Result<()> {
    link.write_all(data).await?;
    link.flush().await
}


/// Cloneable handle to a running [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
}

impl ManagerHandle {
    async fn request<T>(&self, cmd: impl FnOnce(Reply<T>) -> Command) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();

        self.commands.send(cmd(reply)).await
            .map_err(|_| Error::from(ErrorCode::Unavailable))?;

        rx.await.map_err(|_| Error::from(ErrorCode::Unavailable))
    }

    /// Devices bonded with the host, in host order. Empty if the adapter is
    /// missing or the connect permission has not been granted.
    pub async fn paired_devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        self.request(|reply| Command::PairedDevices { reply }).await
    }

    /// Connect to the device with the given address, replacing the current
    /// connection on success.
    pub async fn connect(&self, address: &str) -> Result<(), Error> {
        let address: Address = address.parse()?;
        self.connect_to(address).await
    }

    pub async fn connect_to(&self, address: Address) -> Result<(), Error> {
        self.request(|reply| Command::Connect { address, reply }).await?
    }

    /// Send the UTF-8 encoding of `data` over the current connection.
    pub async fn send(&self, data: &str) -> Result<(), Error> {
        self.send_bytes(Bytes::copy_from_slice(data.as_bytes())).await
    }

    pub async fn send_bytes(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        let data = data.into();
        self.request(|reply| Command::Send { data, reply }).await?
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn state(&self) -> Result<ConnectionState, Error> {
        self.request(|reply| Command::State { reply }).await
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::PairedDevices { .. } => write!(f, "PairedDevices"),
            Command::Connect { address, .. } => write!(f, "Connect({address})"),
            Command::Send { data, .. } => write!(f, "Send({} bytes)", data.len()),
            Command::Disconnect { .. } => write!(f, "Disconnect"),
            Command::State { .. } => write!(f, "State"),
        }
    }
}
