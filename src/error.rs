use std::fmt;

/// Errors raised by a serial link. None of these are fatal to the bridge;
/// they all degrade to `connected = false` and a throttled reopen.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Port {port} unavailable: {reason}")]
    Unavailable { port: String, reason: String },

    #[error("Permission denied opening {0}")]
    PermissionDenied(String),

    #[error("Link disconnected")]
    Disconnected,

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Map a `serialport` open failure onto the link taxonomy.
    pub(crate) fn from_open(port: &str, err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                LinkError::PermissionDenied(port.to_string())
            }
            _ => LinkError::Unavailable {
                port: port.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

/// Why a single telemetry frame was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame is not valid UTF-8")]
    NotText,

    #[error("Frame exceeds {0} bytes without a delimiter")]
    Overlong(usize),

    #[error("Unknown frame tag {0:?}")]
    UnknownTag(String),

    #[error("Tag {tag} expects {expected} fields, got {got}")]
    FieldCount {
        tag: char,
        expected: usize,
        got: usize,
    },

    #[error("Field {0:?} is not a finite number")]
    NotNumeric(String),

    #[error("Checksum mismatch: frame says 0x{expected:02X}, computed 0x{computed:02X}")]
    Checksum { expected: u8, computed: u8 },

    #[error("Malformed checksum suffix {0:?}")]
    BadChecksumField(String),

    #[error("Quaternion norm {0:.4} is not close to 1")]
    NotUnit(f64),

    #[error("Button level {0:?} is not 0 or 1")]
    BadLevel(String),

    #[error("Malformed JSON orientation: {0}")]
    Json(String),
}

/// Bridge construction failures. Absent hardware is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Cannot build link state: {0}")]
    NoLink(String),
}

/// Errors reported back to the host runtime as integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("Requested interface is not provided by this driver")]
    InterfaceNotFound,

    #[error("Device bridge could not be constructed")]
    BridgeUnavailable,

    #[error("Host context missing; provider not initialised")]
    NotInitialized,

    #[error("Unknown tracked device {0}")]
    UnknownDevice(u32),

    #[error("Host rejected input component")]
    InputComponent,
}

impl InitError {
    /// Host-visible error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            InitError::InterfaceNotFound => 105,
            InitError::BridgeUnavailable => 200,
            InitError::NotInitialized => 201,
            InitError::UnknownDevice(_) => 204,
            InitError::InputComponent => 205,
        }
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &dyn fmt::Display) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error_codes() {
        assert_eq!(InitError::InterfaceNotFound.code(), 105);
        assert_eq!(InitError::BridgeUnavailable.code(), 200);
    }

    #[test]
    fn test_last_error_is_nul_terminated() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());
        last.set(&LinkError::Disconnected);
        let msg = unsafe { std::ffi::CStr::from_ptr(last.as_ptr()) };
        assert_eq!(msg.to_str().unwrap(), "Link disconnected");
    }
}
