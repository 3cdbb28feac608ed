//! Mapping from method-channel requests to connection manager operations.

use serde_json::Value;

use super::{method, Reply, Request};
use crate::{ErrorCode, ManagerHandle};


/// Handle a single request. Resolves once the operation has completed,
/// which for `connectToDevice` means once the handshake is done.
pub async fn dispatch(manager: &ManagerHandle, request: &Request) -> Reply {
    tracing::trace!(id=request.id, method=%request.method, "dispatching request");

    match request.method.as_str() {
        method::GET_PAIRED_DEVICES => {
            // never an error towards the caller, an empty list is reported
            // instead
            let devices = manager.paired_devices().await.unwrap_or_default();

            match serde_json::to_value(devices) {
                Ok(value) => Reply::success(value),
                Err(err) => Reply::error(ErrorCode::Unknown, err.to_string()),
            }
        },
        method::CONNECT_TO_DEVICE => {
            let Some(address) = request.argument_str("address") else {
                return Reply::error(ErrorCode::InvalidArgument, "address is missing");
            };

            manager.connect(address).await
                .map(|()| Value::Null)
                .into()
        },
        method::SEND_DATA => {
            let Some(data) = request.argument_str("data") else {
                return Reply::error(ErrorCode::InvalidArgument, "data is missing");
            };

            manager.send(data).await
                .map(|()| Value::Null)
                .into()
        },
        method::DISCONNECT => {
            manager.disconnect().await
                .map(|()| Value::Null)
                .into()
        },
        method::GET_CONNECTION_STATE => {
            manager.state().await
                .map(|state| Value::String(state.to_string()))
                .into()
        },
        _ => {
            tracing::debug!(method=%request.method, "unknown method");
            Reply::NotImplemented
        },
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::host::mock::MockHost;
    use crate::{Manager, ManagerConfig};

    use std::sync::Arc;

    use serde_json::json;
    use tokio::io::AsyncReadExt;

    const PRINTER: &str = "AA:BB:CC:00:11:22";

    fn setup() -> (MockHost, ManagerHandle) {
        let host = MockHost::new().with_device("Printer", PRINTER);
        let manager = Manager::spawn(Arc::new(host.clone()), Arc::new(crate::host::Granted), ManagerConfig::default());
        (host, manager)
    }

    fn error_code(reply: &Reply) -> &str {
        match reply {
            Reply::Error { code, .. } => code,
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_printer_scenario() {
        let (host, manager) = setup();

        let req = Request::new(1, method::GET_PAIRED_DEVICES);
        let reply = dispatch(&manager, &req).await;
        assert_eq!(reply, Reply::success(json!([{ "name": "Printer", "address": PRINTER }])));

        let req = Request::new(2, method::CONNECT_TO_DEVICE).with_argument("address", PRINTER);
        assert_eq!(dispatch(&manager, &req).await, Reply::success(Value::Null));

        let req = Request::new(3, method::SEND_DATA).with_argument("data", "ON");
        assert_eq!(dispatch(&manager, &req).await, Reply::success(Value::Null));

        let mut peer = host.take_peer(PRINTER).unwrap();
        let mut buf = [0; 2];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x4f, 0x4e]);

        let resolves = host.resolves();
        let req = Request::new(4, method::CONNECT_TO_DEVICE);
        assert_eq!(error_code(&dispatch(&manager, &req).await), "INVALID_ARGUMENT");
        assert_eq!(host.resolves(), resolves);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (host, manager) = setup();

        let req = Request::new(1, method::CONNECT_TO_DEVICE).with_argument("address", Value::Null);
        assert_eq!(error_code(&dispatch(&manager, &req).await), "INVALID_ARGUMENT");
        assert_eq!(host.resolves(), 0);

        let req = Request::new(2, method::CONNECT_TO_DEVICE).with_argument("address", "AA:BB");
        assert_eq!(error_code(&dispatch(&manager, &req).await), "INVALID_ARGUMENT");
        assert_eq!(host.resolves(), 0);
        assert_eq!(host.attempts(PRINTER), 0);

        let req = Request::new(3, method::SEND_DATA);
        assert_eq!(error_code(&dispatch(&manager, &req).await), "INVALID_ARGUMENT");

        let req = Request::new(4, method::SEND_DATA).with_argument("data", 1);
        assert_eq!(error_code(&dispatch(&manager, &req).await), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_errors() {
        let (host, manager) = setup();
        host.set_unreachable(PRINTER);

        let req = Request::new(1, method::CONNECT_TO_DEVICE).with_argument("address", "00:11:22:33:44:55");
        assert_eq!(error_code(&dispatch(&manager, &req).await), "DEVICE_NOT_FOUND");

        let req = Request::new(2, method::CONNECT_TO_DEVICE).with_argument("address", PRINTER);
        let reply = dispatch(&manager, &req).await;
        assert_eq!(error_code(&reply), "CONNECTION_ERROR");

        let Reply::Error { message, .. } = reply else { unreachable!() };
        assert_eq!(message, "read failed, socket might closed or timeout");

        let req = Request::new(3, method::SEND_DATA).with_argument("data", "ON");
        assert_eq!(error_code(&dispatch(&manager, &req).await), "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn test_state_and_disconnect() {
        let (_host, manager) = setup();

        let state = Request::new(1, method::GET_CONNECTION_STATE);
        assert_eq!(dispatch(&manager, &state).await, Reply::success("idle"));

        let req = Request::new(2, method::CONNECT_TO_DEVICE).with_argument("address", PRINTER);
        dispatch(&manager, &req).await;
        assert_eq!(dispatch(&manager, &state).await, Reply::success("connected"));

        let req = Request::new(3, method::DISCONNECT);
        assert_eq!(dispatch(&manager, &req).await, Reply::success(Value::Null));
        assert_eq!(dispatch(&manager, &state).await, Reply::success("idle"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_host, manager) = setup();

        let req = Request::new(1, "enableBluetooth");
        assert_eq!(dispatch(&manager, &req).await, Reply::NotImplemented);
    }
}
