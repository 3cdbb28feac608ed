//! Connection manager for Bluetooth Serial Port Profile (SPP) devices.
//! Lists bonded devices, keeps at most one RFCOMM connection open and
//! writes raw bytes to it. The Bluetooth stack itself is consumed through
//! the collaborator traits in [`host`].
//!
//! The [`channel`] module exposes the manager over a simple
//! request/response protocol so that a UI process can drive it.

use uuid::{uuid, Uuid};

pub mod channel;
pub mod device;
pub mod error;
pub mod host;
pub mod manager;

pub use device::{Address, DeviceInfo};
pub use error::{Error, ErrorCode};
pub use manager::{ConnectionState, Manager, ManagerConfig, ManagerHandle};

/// UUID of the Serial Port Profile service record.
///
/// Defined as `00001101-0000-1000-8000-00805f9b34fb`.
pub const UUID: Uuid = uuid!("00001101-0000-1000-8000-00805f9b34fb");
