//! Serving side of the method channel.

use futures::{SinkExt, StreamExt};

use serde_json::Value;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use super::{dispatch::dispatch, Frame, Reply, Request, Response, ServerCodec};
use crate::{ErrorCode, ManagerHandle};


/// Serve method-channel requests arriving on `io` until the peer closes
/// its side. Requests are handled concurrently and answered as soon as
/// they complete.
///
/// An invalid request is answered with `INVALID_ARGUMENT` if its id can be
/// recovered and skipped otherwise. Only I/O and framing errors end the
/// session.
pub async fn serve<T>(io: T, manager: ManagerHandle) -> std::io::Result<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut sink, mut stream) = ServerCodec::new().wrap(io).split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let reader = async move {
        while let Some(frame) = stream.next().await {
            let request = match parse(frame?) {
                Ok(request) => request,
                Err(Some(response)) => {
                    let _ = tx.send(response);
                    continue;
                },
                Err(None) => continue,
            };

            tracing::debug!(id=request.id, method=%request.method, "received request");

            let manager = manager.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let reply = dispatch(&manager, &request).await;
                let _ = tx.send(Response { id: request.id, reply });
            });
        }

        tracing::trace!("request stream closed");
        Ok::<(), std::io::Error>(())
    };

    // completes once the reader and all request tasks have dropped their
    // senders
    let writer = async move {
        while let Some(response) = rx.recv().await {
            tracing::debug!(id=response.id, "sending response");
            sink.send(response).await?;
        }

        Ok::<(), std::io::Error>(())
    };

    tokio::try_join!(reader, writer)?;
    Ok(())
}

fn parse(frame: Frame<Value>) -> Result<Request, Option<Response>> {
    let value = frame.map_err(|err| {
        tracing::warn!(error=%err, "dropping malformed frame");
        None
    })?;

    let id = value.get("id").and_then(Value::as_u64);

    serde_json::from_value(value).map_err(|err| {
        tracing::warn!(id=?id, error=%err, "received invalid request");

        id.map(|id| Response {
            id,
            reply: Reply::error(ErrorCode::InvalidArgument, format!("invalid request: {err}")),
        })
    })
}
