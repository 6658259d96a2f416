use core::fmt;

/// Failure code reported by a flash driver.
///
/// The value is whatever the driver chose to return (typically a negative errno) and is handed
/// back to the caller untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No area with the requested id exists in the table.
    NotFound,
    /// The backing device is not initialized or not available.
    NotReady,
    /// Offset and length reach past the end of the area.
    OutOfBounds,
    /// A scratch buffer handed in by the caller is empty.
    InvalidArgument,
    /// The caller's output buffer cannot hold every result.
    NoSpace,
    Device(DeviceError),
}

const ENOENT: i32 = 2;
const ENOMEM: i32 = 12;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;

impl ErrorKind {
    /// Negative errno equivalent, for callers that speak the firmware's integer convention.
    ///
    /// Driver errors are passed through as reported.
    pub fn errno(&self) -> i32 {
        match self {
            ErrorKind::NotFound => -ENOENT,
            ErrorKind::NotReady => -ENODEV,
            ErrorKind::OutOfBounds | ErrorKind::InvalidArgument => -EINVAL,
            ErrorKind::NoSpace => -ENOMEM,
            ErrorKind::Device(DeviceError(code)) => *code,
        }
    }
}

impl From<DeviceError> for ErrorKind {
    fn from(err: DeviceError) -> Self {
        ErrorKind::Device(err)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "flash area not found"),
            ErrorKind::NotReady => write!(f, "flash device not ready"),
            ErrorKind::OutOfBounds => write!(f, "access outside of flash area"),
            ErrorKind::InvalidArgument => write!(f, "invalid argument"),
            ErrorKind::NoSpace => write!(f, "output buffer too small"),
            ErrorKind::Device(DeviceError(code)) => write!(f, "flash driver error {}", code),
        }
    }
}
