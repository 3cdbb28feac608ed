use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use tokio::io::DuplexStream;
use tokio::sync::Notify;

use uuid::Uuid;

use super::{Capability, Host, Link, Permissions, RemoteDevice};
use crate::{Address, DeviceInfo, Error};


#[derive(Default)]
struct Peer {
    unreachable: bool,
    panics: bool,
    gate: Option<Arc<Notify>>,
    streams: Vec<DuplexStream>,
    attempts: usize,
}

/// In-memory host. Every successful connect hands one end of a duplex
/// pipe to the manager and keeps the other end for the test.
#[derive(Clone, Default)]
pub struct MockHost {
    bonded: Arc<Mutex<Vec<DeviceInfo>>>,
    peers: Arc<Mutex<HashMap<Address, Peer>>>,
    absent: Arc<AtomicBool>,
    resolves: Arc<AtomicUsize>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, name: &str, address: &str) -> Self {
        let address: Address = address.parse().unwrap();

        self.bonded.lock().unwrap().push(DeviceInfo::new(name, address));
        self.peers.lock().unwrap().entry(address).or_default();
        self
    }

    pub fn set_absent(&self, absent: bool) {
        self.absent.store(absent, Ordering::SeqCst);
    }

    pub fn set_unreachable(&self, address: &str) {
        let address: Address = address.parse().unwrap();
        self.peers.lock().unwrap().entry(address).or_default().unreachable = true;
    }

    /// Make connects to `address` panic instead of returning.
    pub fn set_panicking(&self, address: &str) {
        let address: Address = address.parse().unwrap();
        self.peers.lock().unwrap().entry(address).or_default().panics = true;
    }

    /// Hold connects to `address` until the returned notifier fires.
    pub fn gate(&self, address: &str) -> Arc<Notify> {
        let address: Address = address.parse().unwrap();
        let gate = Arc::new(Notify::new());

        self.peers.lock().unwrap().entry(address).or_default().gate = Some(gate.clone());
        gate
    }

    /// Take the peer side of the most recent connection to `address`.
    pub fn take_peer(&self, address: &str) -> Option<DuplexStream> {
        let address: Address = address.parse().unwrap();
        self.peers.lock().unwrap().get_mut(&address)?.streams.pop()
    }

    pub fn attempts(&self, address: &str) -> usize {
        let address: Address = address.parse().unwrap();
        self.peers.lock().unwrap().get(&address).map_or(0, |p| p.attempts)
    }

    /// Number of address lookups, successful or not.
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Host for MockHost {
    async fn bonded_devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        if self.absent.load(Ordering::SeqCst) {
            return Err(Error::unavailable("no adapter"));
        }

        Ok(self.bonded.lock().unwrap().clone())
    }

    async fn resolve(&self, address: Address) -> Result<Box<dyn RemoteDevice>, Error> {
        self.resolves.fetch_add(1, Ordering::SeqCst);

        if self.absent.load(Ordering::SeqCst) {
            return Err(Error::device_not_found("no adapter"));
        }

        if !self.peers.lock().unwrap().contains_key(&address) {
            return Err(Error::device_not_found(format!("no device with address {address}")));
        }

        Ok(Box::new(MockDevice { address, host: self.clone() }))
    }
}


struct MockDevice {
    address: Address,
    host: MockHost,
}

#[async_trait]
impl RemoteDevice for MockDevice {
    fn address(&self) -> Address {
        self.address
    }

    async fn connect(&self, _service: Uuid) -> Result<Box<dyn Link>, Error> {
        let (gate, panics) = {
            let mut peers = self.host.peers.lock().unwrap();
            let peer = peers.get_mut(&self.address).unwrap();
            peer.attempts += 1;
            (peer.gate.clone(), peer.panics)
        };

        // outside the lock, a panic must not poison it
        if panics {
            panic!("connect to {} panicked", self.address);
        }

        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut peers = self.host.peers.lock().unwrap();
        let peer = peers.get_mut(&self.address).unwrap();

        if peer.unreachable {
            return Err(Error::connection("read failed, socket might closed or timeout"));
        }

        let (local, remote) = tokio::io::duplex(1024);
        peer.streams.push(remote);

        Ok(Box::new(local))
    }
}


pub struct MockPermissions {
    granted: AtomicBool,
}

impl MockPermissions {
    pub fn new(granted: bool) -> Self {
        Self { granted: AtomicBool::new(granted) }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

impl Permissions for MockPermissions {
    fn is_granted(&self, _capability: Capability) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}
