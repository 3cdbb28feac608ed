use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use super::{Request, Response};


pub type Frame<D> = Result<D, serde_json::Error>;


const MAX_FRAME_SIZE: u32 = 64 * 1024;
const HEADER_SIZE: usize = 4;


/// Length-prefixed JSON frames: a 4-byte big-endian length followed by
/// the JSON body. Decodes `D` and encodes `E`.
///
/// A body that is not a valid `D` is handed out as an error item and the
/// stream continues with the next frame. Only broken framing ends the
/// stream.
pub struct Codec<D, E> {
    _types: PhantomData<fn(E) -> D>,
}

/// Codec for the serving side: reads request frames, writes responses.
/// Frames are only decoded as far as JSON so that invalid requests can
/// still be answered by id.
pub type ServerCodec = Codec<Value, Response>;

/// Codec for the calling side: reads responses, writes requests.
pub type ClientCodec = Codec<Response, Request>;

impl<D, E> Codec<D, E> {
    pub fn new() -> Self {
        Self { _types: PhantomData }
    }

    pub fn wrap<T>(self, io: T) -> Framed<T, Self>
    where
        T: AsyncRead + AsyncWrite,
    {
        Framed::with_capacity(io, self, 4096)
    }
}

impl<D, E> Default for Codec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E> std::fmt::Debug for Codec<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish()
    }
}

impl<D: DeserializeOwned, E> Decoder for Codec<D, E> {
    type Item = Frame<D>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut length = [0; HEADER_SIZE];
        length.copy_from_slice(&src[..HEADER_SIZE]);
        let length = u32::from_be_bytes(length);

        if length > MAX_FRAME_SIZE {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Frame of length {length} is too large."),
            ))?;
        }

        let size = HEADER_SIZE + length as usize;

        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let item = serde_json::from_slice(&src[HEADER_SIZE..size]);
        src.advance(size);

        Ok(Some(item))
    }
}

impl<D, E: Serialize> Encoder<E> for Codec<D, E> {
    type Error = std::io::Error;

    fn encode(&mut self, item: E, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let data = serde_json::to_vec(&item)?;

        if data.len() > MAX_FRAME_SIZE as usize {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Frame of length {} is too large.", data.len()),
            ))?;
        }

        buf.reserve(HEADER_SIZE + data.len());
        buf.put_u32(data.len() as u32);
        buf.put_slice(&data);

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::{Reply, Request, Response};

    use bytes::BytesMut;


    #[test]
    fn test_encode() {
        let mut buf = BytesMut::new();
        let mut codec = ClientCodec::new();

        let req = Request::new(1, "sendData").with_argument("data", "ON");

        codec.encode(req, &mut buf)
            .expect("error encoding request");

        let body = br#"{"id":1,"method":"sendData","arguments":{"data":"ON"}}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&buf[4..], &body[..]);
    }

    #[test]
    fn test_decode() {
        let mut codec = ClientCodec::new();

        let body = br#"{"id":9,"status":"success","value":null}"#;
        let mut buf = BytesMut::new();
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);
        buf.put_u8(0x00);

        let rsp = codec.decode(&mut buf)
            .expect("error decoding frame")
            .expect("frame incomplete")
            .expect("error decoding response");

        assert_eq!(rsp, Response { id: 9, reply: Reply::success(serde_json::Value::Null) });

        // the trailing byte belongs to the next frame
        assert_eq!(&buf[..], &[0x00]);
    }

    #[test]
    fn test_decode_incomplete() {
        let mut codec = ServerCodec::new();

        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x20, b'{'][..]);

        let decoded = codec.decode(&mut buf)
            .expect("error decoding request");

        assert!(decoded.is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_decode_oversized() {
        let mut codec = ServerCodec::new();

        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE + 1);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_decode_malformed() {
        let mut codec = ServerCodec::new();

        let body = b"{not json";
        let mut buf = BytesMut::new();
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);

        let frame = codec.decode(&mut buf)
            .expect("error decoding frame")
            .expect("frame incomplete");

        assert!(frame.is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_after_malformed() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::new();

        for body in [&b"{x}"[..], &br#"{"id":2}"#[..]] {
            buf.put_u32(body.len() as u32);
            buf.put_slice(body);
        }

        assert!(codec.decode(&mut buf).unwrap().unwrap().is_err());

        let value = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(value, serde_json::json!({ "id": 2 }));
    }
}
