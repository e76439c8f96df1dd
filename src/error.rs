use std::fmt;
use std::time::Duration;

/// Errors raised by the capture adapter.
///
/// Vendor failures during negotiation never surface through this type at the
/// platform boundary; they are logged and reported as `success = false`.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Platform update requested before configuration completed")]
    NotConfigured,

    #[error("Camera configuration did not complete within {0:?}")]
    ConfigurationTimeout(Duration),

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera reported no stream capabilities")]
    NoStreamCapabilities,

    #[error("Row stride {stride} is smaller than row width {row_bytes} bytes")]
    InvalidStride { stride: usize, row_bytes: usize },

    #[error("Plane buffer holds {actual} bytes, {needed} required")]
    PlaneTooSmall { needed: usize, actual: usize },

    #[error("Plane dimensions overflow addressable memory")]
    SizeOverflow,

    #[error("{op} failed: {message}")]
    Vendor { op: &'static str, message: String },

    #[error("Negotiation error: {0}")]
    Negotiation(String),
}

impl CaptureError {
    /// Shorthand for a failed vendor SDK call.
    pub fn vendor(op: &'static str, message: impl Into<String>) -> Self {
        CaptureError::Vendor {
            op,
            message: message.into(),
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

    pub fn set(&self, err: &CaptureError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
