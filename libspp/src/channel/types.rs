use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{Error, ErrorCode};


pub mod method {
    pub const GET_PAIRED_DEVICES: &str = "getPairedDevices";
    pub const CONNECT_TO_DEVICE: &str = "connectToDevice";
    pub const SEND_DATA: &str = "sendData";
    pub const DISCONNECT: &str = "disconnect";
    pub const GET_CONNECTION_STATE: &str = "getConnectionState";
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,

    #[serde(default, deserialize_with = "arguments_or_null")]
    pub arguments: Map<String, Value>,
}

// callers send `null` for methods without arguments
fn arguments_or_null<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// String argument with the given name, `None` if missing or not a
    /// string.
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Success {
        #[serde(default)]
        value: Value,
    },
    Error {
        code: String,
        message: String,

        #[serde(default)]
        details: Value,
    },
    NotImplemented,
}

impl Reply {
    pub fn success(value: impl Into<Value>) -> Self {
        Reply::Success { value: value.into() }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Reply::Error {
            code: code.as_str().to_owned(),
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            Reply::Success { value } => Ok(value),
            Reply::Error { code, message, .. } => {
                let code = code.parse().unwrap_or(ErrorCode::Unknown);
                Err(Error::new(code, message))
            },
            Reply::NotImplemented => Err(Error::from(ErrorCode::NotImplemented)),
        }
    }
}

impl From<Result<Value, Error>> for Reply {
    fn from(result: Result<Value, Error>) -> Self {
        match result {
            Ok(value) => Reply::Success { value },
            Err(err) => Reply::error(err.code(), err.message()),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,

    #[serde(flatten)]
    pub reply: Reply,
}
