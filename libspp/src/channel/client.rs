//! Calling side of the method channel.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use futures::channel::oneshot;
use futures::lock::Mutex;
use futures::stream::{SplitSink, SplitStream};

use serde_json::{Map, Value};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use super::{method, ClientCodec, Reply, Request, Response};
use crate::{ConnectionState, DeviceInfo, Error, ErrorCode};


type Transport<T> = Framed<T, ClientCodec>;

struct State {
    next_id: u64,
    pending: HashMap<u64, oneshot::Sender<Reply>>,
}

/// Client connection. [`Client::run`] has to be polled for calls issued
/// via a [`ClientHandle`] to complete.
pub struct Client<T> {
    receiver: SplitStream<Transport<T>>,
    sender: Arc<Mutex<SplitSink<Transport<T>, Request>>>,
    state: Arc<Mutex<State>>,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite,
{
    pub fn new(io: T) -> Self {
        let (sink, stream) = ClientCodec::new().wrap(io).split();

        let state = State {
            next_id: 0,
            pending: HashMap::new(),
        };

        Client {
            receiver: stream,
            sender: Arc::new(Mutex::new(sink)),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> ClientHandle<T> {
        ClientHandle {
            sender: self.sender.clone(),
            state: self.state.clone(),
        }
    }

    /// Receive responses until the server closes the connection.
    pub async fn run(&mut self) -> Result<(), Error> {
        let result = self.receive().await;

        // fail everything still waiting, there will be no reply
        self.state.lock().await.pending.clear();

        result
    }

    async fn receive(&mut self) -> Result<(), Error> {
        while let Some(frame) = self.receiver.next().await {
            match frame? {
                Ok(response) => self.complete(response).await,
                Err(err) => tracing::warn!(error=%err, "dropping malformed response"),
            }
        }

        Ok(())
    }

    async fn complete(&self, response: Response) {
        let call = self.state.lock().await.pending.remove(&response.id);

        match call {
            Some(call) => {
                tracing::debug!(id=response.id, "completing call");
                let _ = call.send(response.reply);
            },
            None => {
                tracing::warn!(id=response.id, "received response for non-pending call");
            },
        }
    }
}


pub struct ClientHandle<T> {
    sender: Arc<Mutex<SplitSink<Transport<T>, Request>>>,
    state: Arc<Mutex<State>>,
}

impl<T> Clone for ClientHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> ClientHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    pub async fn call(&self, method: &str, arguments: Map<String, Value>) -> Result<Value, Error> {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut state = self.state.lock().await;
            let id = state.next_id;
            state.next_id = state.next_id.wrapping_add(1);
            state.pending.insert(id, tx);
            id
        };

        let request = Request { id, method: method.to_owned(), arguments };

        tracing::debug!(id, method, "sending request");
        if let Err(err) = self.sender.lock().await.send(request).await {
            self.state.lock().await.pending.remove(&id);
            return Err(err.into());
        }

        let reply = rx.await
            .map_err(|_| Error::unavailable("connection closed before response"))?;

        reply.into_result()
    }

    pub async fn paired_devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        let value = self.call(method::GET_PAIRED_DEVICES, Map::new()).await?;

        serde_json::from_value(value)
            .map_err(|e| Error::extend(ErrorCode::Unknown, "malformed device list", e))
    }

    pub async fn connect(&self, address: &str) -> Result<(), Error> {
        let mut args = Map::new();
        args.insert("address".into(), address.into());

        self.call(method::CONNECT_TO_DEVICE, args).await?;
        Ok(())
    }

    pub async fn send(&self, data: &str) -> Result<(), Error> {
        let mut args = Map::new();
        args.insert("data".into(), data.into());

        self.call(method::SEND_DATA, args).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.call(method::DISCONNECT, Map::new()).await?;
        Ok(())
    }

    pub async fn state(&self) -> Result<ConnectionState, Error> {
        let value = self.call(method::GET_CONNECTION_STATE, Map::new()).await?;

        serde_json::from_value(value)
            .map_err(|e| Error::extend(ErrorCode::Unknown, "malformed connection state", e))
    }
}
