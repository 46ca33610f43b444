//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Everything except `Vulkan`, `Loading`, `NoSuitableDevice` and
/// `AllocationFailed` signals a caller bug and is not meant to be recovered
/// from mid-frame.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Zero length or capacity, or a count that does not fit a GPU index.
    #[error("Invalid argument for `{buffer}`: {reason}")]
    InvalidArgument { buffer: String, reason: String },

    /// `allocate` called on a buffer that already owns storage.
    #[error("Buffer `{0}` is already initialized")]
    AlreadyInitialized(String),

    /// Operation needs storage that has not been allocated yet.
    #[error("Buffer `{0}` has no GPU storage")]
    NotResident(String),

    /// Slot range outside the limit the operation is checked against.
    #[error("Range {index}..{end} of `{buffer}` exceeds limit {limit}")]
    OutOfRange {
        buffer: String,
        index: u64,
        end: u64,
        limit: u64,
    },

    /// Byte-level access outside a storage allocation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
