//! Collaborator interfaces to the host Bluetooth stack and permission
//! system.

use async_trait::async_trait;

use tokio::io::{AsyncRead, AsyncWrite};

use uuid::Uuid;

use crate::{Address, DeviceInfo, Error};

#[cfg(feature = "bluez")]
pub mod bluez;

#[cfg(test)]
pub(crate) mod mock;


/// Open bidirectional byte stream to a remote device.
pub trait Link: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Link for T where T: AsyncRead + AsyncWrite + Send + Unpin {}


/// Host Bluetooth adapter.
#[async_trait]
pub trait Host: Send + Sync {
    /// Devices bonded with the adapter, in host order. Fails if no adapter
    /// is present.
    async fn bonded_devices(&self) -> Result<Vec<DeviceInfo>, Error>;

    /// Look up the device with the given address. Fails with
    /// [`ErrorCode::DeviceNotFound`](crate::ErrorCode::DeviceNotFound) if
    /// the address is unknown or no adapter is present.
    async fn resolve(&self, address: Address) -> Result<Box<dyn RemoteDevice>, Error>;
}

#[async_trait]
pub trait RemoteDevice: Send + Sync {
    fn address(&self) -> Address;

    /// Open an RFCOMM channel to the given service. Blocks until the
    /// handshake completes or fails.
    async fn connect(&self, service: Uuid) -> Result<Box<dyn Link>, Error>;
}


#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Query bonded devices and connect to them.
    Connect,
}

/// Runtime permission check, queried before any host call.
pub trait Permissions: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Permission checker for hosts without a runtime permission model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Granted;

impl Permissions for Granted {
    fn is_granted(&self, _capability: Capability) -> bool {
        true
    }
}
