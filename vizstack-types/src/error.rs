use std::fmt;

/// The typed error kinds carried in a response `<status>`. See spec §7.
///
/// `INVALID_OPERATION` and `INVALID_VALUE`, referenced by the original
/// implementation, were never defined there; call sites that would have
/// used them map to `BadOperation` / `IncorrectValue` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VizErrorKind {
    IncorrectValue,
    Unimplemented,
    ResourceBusy,
    BadResource,
    BadConfiguration,
    ResourceUnspecified,
    InternalError,
    UserError,
    BadProtocol,
    NotConnected,
    ResourceUnavailable,
    SocketError,
    BadOperation,
    AccessDenied,
}

impl VizErrorKind {
    /// The integer carried on the wire in `<status>`. 0 is reserved for success.
    pub fn code(self) -> i32 {
        match self {
            VizErrorKind::IncorrectValue => 1,
            VizErrorKind::Unimplemented => 2,
            VizErrorKind::ResourceBusy => 3,
            VizErrorKind::BadResource => 4,
            VizErrorKind::BadConfiguration => 5,
            VizErrorKind::ResourceUnspecified => 6,
            VizErrorKind::InternalError => 7,
            VizErrorKind::UserError => 8,
            VizErrorKind::BadProtocol => 9,
            VizErrorKind::NotConnected => 10,
            VizErrorKind::ResourceUnavailable => 11,
            VizErrorKind::SocketError => 12,
            VizErrorKind::BadOperation => 13,
            VizErrorKind::AccessDenied => 14,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => VizErrorKind::IncorrectValue,
            2 => VizErrorKind::Unimplemented,
            3 => VizErrorKind::ResourceBusy,
            4 => VizErrorKind::BadResource,
            5 => VizErrorKind::BadConfiguration,
            6 => VizErrorKind::ResourceUnspecified,
            7 => VizErrorKind::InternalError,
            8 => VizErrorKind::UserError,
            9 => VizErrorKind::BadProtocol,
            10 => VizErrorKind::NotConnected,
            11 => VizErrorKind::ResourceUnavailable,
            12 => VizErrorKind::SocketError,
            13 => VizErrorKind::BadOperation,
            14 => VizErrorKind::AccessDenied,
            _ => return None,
        })
    }
}

impl fmt::Display for VizErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VizErrorKind::IncorrectValue => "INCORRECT_VALUE",
            VizErrorKind::Unimplemented => "UNIMPLEMENTED",
            VizErrorKind::ResourceBusy => "RESOURCE_BUSY",
            VizErrorKind::BadResource => "BAD_RESOURCE",
            VizErrorKind::BadConfiguration => "BAD_CONFIGURATION",
            VizErrorKind::ResourceUnspecified => "RESOURCE_UNSPECIFIED",
            VizErrorKind::InternalError => "INTERNAL_ERROR",
            VizErrorKind::UserError => "USER_ERROR",
            VizErrorKind::BadProtocol => "BAD_PROTOCOL",
            VizErrorKind::NotConnected => "NOT_CONNECTED",
            VizErrorKind::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
            VizErrorKind::SocketError => "SOCKET_ERROR",
            VizErrorKind::BadOperation => "BAD_OPERATION",
            VizErrorKind::AccessDenied => "ACCESS_DENIED",
        };
        f.write_str(name)
    }
}

/// The broker's universal error type. Carries a kind (for `<status>`) and a
/// human message (for `<message>`).
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct VizError {
    pub kind: VizErrorKind,
    pub message: String,
}

impl VizError {
    pub fn new(kind: VizErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn incorrect_value(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::IncorrectValue, message)
    }

    pub fn bad_configuration(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::BadConfiguration, message)
    }

    pub fn bad_resource(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::BadResource, message)
    }

    pub fn user_error(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::UserError, message)
    }

    pub fn bad_protocol(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::BadProtocol, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::AccessDenied, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(VizErrorKind::InternalError, message)
    }
}

pub type VizResult<T> = Result<T, VizError>;
