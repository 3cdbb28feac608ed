use std::str::FromStr;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    DeviceNotFound,
    ConnectionError,
    SendError,
    NotConnected,
    PermissionDenied,
    Busy,
    Unavailable,
    NotImplemented,
    Unknown,
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "The request is missing or has a malformed argument",
            ErrorCode::DeviceNotFound => "The address does not resolve to a known device",
            ErrorCode::ConnectionError => "The connection handshake failed",
            ErrorCode::SendError => "Writing to the connection failed",
            ErrorCode::NotConnected => "No connection is open",
            ErrorCode::PermissionDenied => "The host denied the Bluetooth connect permission",
            ErrorCode::Busy => "Too many connection requests are pending",
            ErrorCode::Unavailable => "The connection manager is not running",
            ErrorCode::NotImplemented => "The requested method is not implemented",
            ErrorCode::Unknown => "Unknown error",
        }
    }

    /// Identifier of this code as used on the method channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::SendError => "SEND_ERROR",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Busy => "BUSY",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s {
            "INVALID_ARGUMENT" => ErrorCode::InvalidArgument,
            "DEVICE_NOT_FOUND" => ErrorCode::DeviceNotFound,
            "CONNECTION_ERROR" => ErrorCode::ConnectionError,
            "SEND_ERROR" => ErrorCode::SendError,
            "NOT_CONNECTED" => ErrorCode::NotConnected,
            "PERMISSION_DENIED" => ErrorCode::PermissionDenied,
            "BUSY" => ErrorCode::Busy,
            "UNAVAILABLE" => ErrorCode::Unavailable,
            "NOT_IMPLEMENTED" => ErrorCode::NotImplemented,
            _ => ErrorCode::Unknown,
        };

        Ok(code)
    }
}


#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn device_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceNotFound, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionError, message)
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotConnected, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Busy, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn extend(
        code: ErrorCode,
        message: impl Into<String>,
        error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(error.into()),
        }
    }

    /// Re-tag an error with a different code, keeping message and source.
    pub fn with_code(self, code: ErrorCode) -> Self {
        Self { code, ..self }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.description())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ErrorCode::DeviceNotFound,
            ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            ErrorKind::InvalidInput => ErrorCode::InvalidArgument,
            ErrorKind::NotConnected => ErrorCode::NotConnected,
            ErrorKind::BrokenPipe
            | ErrorKind::WriteZero
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted => ErrorCode::SendError,
            ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
            | ErrorKind::AddrNotAvailable => ErrorCode::ConnectionError,
            _ => ErrorCode::Unknown,
        };

        Error::extend(code, err.to_string(), err)
    }
}

impl From<crate::device::InvalidAddress> for Error {
    fn from(err: crate::device::InvalidAddress) -> Self {
        Error::extend(ErrorCode::InvalidArgument, err.to_string(), err)
    }
}

#[cfg(feature = "bluez")]
impl From<bluer::Error> for Error {
    fn from(err: bluer::Error) -> Self {
        use bluer::ErrorKind;

        let code = match &err.kind {
            ErrorKind::DoesNotExist => ErrorCode::DeviceNotFound,
            ErrorKind::NotAuthorized => ErrorCode::PermissionDenied,
            ErrorKind::InvalidArguments => ErrorCode::InvalidArgument,
            ErrorKind::NotReady | ErrorKind::NotAvailable => ErrorCode::Unavailable,
            _ => ErrorCode::ConnectionError,
        };

        Error::extend(code, err.message.clone(), err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| (&**err) as _)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_code_strings() {
        let codes = [
            ErrorCode::InvalidArgument,
            ErrorCode::DeviceNotFound,
            ErrorCode::ConnectionError,
            ErrorCode::SendError,
            ErrorCode::NotConnected,
            ErrorCode::PermissionDenied,
            ErrorCode::Busy,
            ErrorCode::Unavailable,
            ErrorCode::NotImplemented,
            ErrorCode::Unknown,
        ];

        for code in codes {
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), code);
        }

        assert_eq!("SOMETHING_ELSE".parse::<ErrorCode>().unwrap(), ErrorCode::Unknown);
    }

    #[test]
    fn test_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer went away");
        let err = Error::from(err);

        assert_eq!(err.code(), ErrorCode::SendError);
        assert_eq!(err.message(), "peer went away");
        assert!(std::error::Error::source(&err).is_some());
    }
}
