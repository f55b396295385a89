//! Status codes answered by the stream endpoint.

use thiserror::Error;

/// Failure statuses of a stream request as seen by the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StreamErrorCode {
    /// No channel with the requested identifier.
    NotFound = 404,
    /// Unexpected upstream fault.
    BadGateway = 502,
    /// Upstream rejected the stream and no fallback can be generated.
    ServiceUnavailable = 503,
    /// Upstream did not answer in time.
    GatewayTimeout = 504,
}

impl StreamErrorCode {
    /// Short description sent as the response body.
    pub fn detail(self) -> &'static str {
        match self {
            StreamErrorCode::NotFound => "Channel not found",
            StreamErrorCode::BadGateway => "Bad gateway",
            StreamErrorCode::ServiceUnavailable => "Stream temporarily unavailable",
            StreamErrorCode::GatewayTimeout => "Gateway timeout",
        }
    }
}

impl From<StreamErrorCode> for u16 {
    fn from(value: StreamErrorCode) -> Self {
        value as u16
    }
}

impl TryFrom<u16> for StreamErrorCode {
    type Error = UnknownStatus;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            404 => Ok(StreamErrorCode::NotFound),
            502 => Ok(StreamErrorCode::BadGateway),
            503 => Ok(StreamErrorCode::ServiceUnavailable),
            504 => Ok(StreamErrorCode::GatewayTimeout),
            other => Err(UnknownStatus(other)),
        }
    }
}

/// A status code the stream endpoint never answers with.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown stream status code: {0}")]
pub struct UnknownStatus(pub u16);
