//! Host implementation on top of BlueZ via `bluer`.

use std::time::Duration;

use async_trait::async_trait;

use bluer::{Adapter, Device, Session};
use bluer::rfcomm::{Profile, ProfileHandle, ReqError, Role};

use futures::StreamExt;

use uuid::Uuid;

use super::{Host, Link, RemoteDevice};
use crate::{Address, DeviceInfo, Error, ErrorCode};


pub struct BluezHost {
    session: Session,
    adapter: Option<Adapter>,
}

impl BluezHost {
    pub async fn new() -> Result<Self, Error> {
        let session = Session::new().await?;

        let adapter = match session.default_adapter().await {
            Ok(adapter) => Some(adapter),
            Err(err) => {
                tracing::debug!(error=?err, "no default adapter available");
                None
            },
        };

        Ok(Self { session, adapter })
    }

    fn adapter(&self) -> Result<&Adapter, Error> {
        self.adapter.as_ref()
            .ok_or_else(|| Error::unavailable("no Bluetooth adapter present"))
    }
}

#[async_trait]
impl Host for BluezHost {
    async fn bonded_devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        let adapter = self.adapter()?;
        let mut devices = Vec::new();

        for addr in adapter.device_addresses().await? {
            let dev = adapter.device(addr)?;

            if !dev.is_paired().await? {
                continue;
            }

            // the alias falls back to the address if the device has no name
            let name = dev.alias().await?;
            devices.push(DeviceInfo::new(name, Address::new(addr.0)));
        }

        Ok(devices)
    }

    async fn resolve(&self, address: Address) -> Result<Box<dyn RemoteDevice>, Error> {
        let adapter = self.adapter()
            .map_err(|err| err.with_code(ErrorCode::DeviceNotFound))?;

        let addr = bluer::Address(address.bytes());

        if !adapter.device_addresses().await?.contains(&addr) {
            tracing::debug!(address=%address, "address not known to adapter");
            return Err(Error::device_not_found(format!("no device with address {address}")));
        }

        let device = adapter.device(addr)?;

        Ok(Box::new(BluezDevice {
            session: self.session.clone(),
            device,
        }))
    }
}


struct BluezDevice {
    session: Session,
    device: Device,
}

#[async_trait]
impl RemoteDevice for BluezDevice {
    fn address(&self) -> Address {
        Address::new(self.device.address().0)
    }

    async fn connect(&self, service: Uuid) -> Result<Box<dyn Link>, Error> {
        let profile = Profile {
            uuid: service,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };

        tracing::debug!(%service, "registering rfcomm profile");
        let mut handle = self.session.register_profile(profile).await?;

        tracing::debug!(address=%self.device.address(), "connecting to rfcomm profile");
        let stream = tokio::try_join!(
            try_connect_profile(&self.device, &service),
            accept_profile_request(&mut handle, &self.device),
        )?.1;

        Ok(Box::new(stream))
    }
}

async fn try_connect_profile(dev: &Device, service: &Uuid) -> Result<(), Error> {
    const RETRY_TIMEOUT: Duration = Duration::from_secs(1);
    const MAX_TRIES: u32 = 3;

    let mut i = 0;
    while let Err(err) = dev.connect_profile(service).await {
        if i >= MAX_TRIES { return Err(err.into()) }
        i += 1;

        tracing::debug!(error=?err, "connecting to profile failed, trying again ({}/{})", i, MAX_TRIES);

        tokio::time::sleep(RETRY_TIMEOUT).await;
    }

    tracing::debug!(address=%dev.address(), "rfcomm profile connected");
    Ok(())
}

async fn accept_profile_request(handle: &mut ProfileHandle, dev: &Device) -> Result<bluer::rfcomm::Stream, Error> {
    while let Some(req) = handle.next().await {
        tracing::debug!(address=%req.device(), "received new profile connection request");

        if req.device() == dev.address() {
            tracing::debug!(address=%req.device(), "accepting profile connection request");
            return Ok(req.accept()?);
        } else {
            req.reject(ReqError::Rejected);
        }
    }

    Err(Error::connection("profile terminated without requests"))
}
