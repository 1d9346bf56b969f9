use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC derived error codes carried in an error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    #[default]
    InternalServerError,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
    Other(i64),
}

impl ErrorCode {
    pub fn as_i64(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::BadRequest => -32600,
            ErrorCode::InternalServerError => -32603,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::Timeout => -32008,
            ErrorCode::Conflict => -32009,
            ErrorCode::PreconditionFailed => -32012,
            ErrorCode::PayloadTooLarge => -32013,
            ErrorCode::UnprocessableContent => -32022,
            ErrorCode::TooManyRequests => -32029,
            ErrorCode::ClientClosedRequest => -32099,
            ErrorCode::Other(code) => *code,
        }
    }

    /// Wire name of the code, e.g. `BAD_REQUEST`.
    pub fn key(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            ErrorCode::Other(_) => "UNKNOWN",
        }
    }

    /// HTTP status a server conventionally answers with for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnprocessableContent => 422,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::ClientClosedRequest => 499,
            ErrorCode::InternalServerError | ErrorCode::Other(_) => 500,
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::BadRequest,
            -32603 => ErrorCode::InternalServerError,
            -32001 => ErrorCode::Unauthorized,
            -32003 => ErrorCode::Forbidden,
            -32004 => ErrorCode::NotFound,
            -32005 => ErrorCode::MethodNotSupported,
            -32008 => ErrorCode::Timeout,
            -32009 => ErrorCode::Conflict,
            -32012 => ErrorCode::PreconditionFailed,
            -32013 => ErrorCode::PayloadTooLarge,
            -32022 => ErrorCode::UnprocessableContent,
            -32029 => ErrorCode::TooManyRequests,
            -32099 => ErrorCode::ClientClosedRequest,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.as_i64()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Other(code) => write!(f, "UNKNOWN({})", code),
            known => f.write_str(known.key()),
        }
    }
}

/// Payload of a server error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub message: String,
    #[serde(default)]
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorShape {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorShape {
            message: message.into(),
            code,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `data.code` as sent by the server, falling back to the numeric code's name.
    pub fn code_name(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|data| data.get("code"))
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.code.key())
    }

    /// `data.httpStatus` as sent by the server.
    pub fn http_status(&self) -> Option<u16> {
        self.data
            .as_ref()
            .and_then(|data| data.get("httpStatus"))
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub data: Value,
}

/// Normalised response: `{"result":{"data":..}}` or `{"error":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Envelope {
    Result(ResultData),
    Error(ErrorShape),
}

impl Envelope {
    pub fn data(data: Value) -> Self {
        Envelope::Result(ResultData { data })
    }

    pub fn error(shape: ErrorShape) -> Self {
        Envelope::Error(shape)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error(_))
    }

    /// Parse a response body, returning `None` when it is not an envelope.
    pub fn from_value(value: &Value) -> Option<Envelope> {
        serde_json::from_value(value.clone()).ok()
    }
}
