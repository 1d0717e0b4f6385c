//! Status codes for Detour operations

/// Status enum for Detour operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation was successful
    Success,
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter was invalid
    InvalidParam,
    /// The fixed-size tile or polygon table is full
    OutOfMemory,
    /// Result did not fit in the output buffer
    BufferTooSmall,
    /// Value does not exist or is not found
    NotFound,
    /// Value already exists
    AlreadyExists,
    /// Input data is corrupted or invalid
    DataCorrupted,
    /// File has wrong magic number
    WrongMagic,
    /// File has wrong version
    WrongVersion,
    /// Operation partially succeeded
    PartialResult,
}

impl Status {
    /// Checks if the status is a failure
    pub fn is_failure(&self) -> bool {
        *self != Status::Success && *self != Status::PartialResult
    }

    /// Checks if the status is a success
    pub fn is_success(&self) -> bool {
        *self == Status::Success || *self == Status::PartialResult
    }
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "Success"),
            Status::Failure => write!(f, "Failure"),
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::OutOfMemory => write!(f, "Out of memory"),
            Status::BufferTooSmall => write!(f, "Buffer too small"),
            Status::NotFound => write!(f, "Value not found"),
            Status::AlreadyExists => write!(f, "Value already exists"),
            Status::DataCorrupted => write!(f, "Data corrupted"),
            Status::WrongMagic => write!(f, "Wrong magic number"),
            Status::WrongVersion => write!(f, "Wrong version"),
            Status::PartialResult => write!(f, "Partial result"),
        }
    }
}

impl From<Status> for recast_common::Error {
    fn from(status: Status) -> Self {
        recast_common::Error::Detour(status.to_string())
    }
}
