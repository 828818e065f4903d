use core::fmt;

/// Why an allocation or reallocation request produced no memory.
///
/// Neither failure mutates the allocator: the lists, bins and counters
/// are left exactly as they were before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocFailure {
    /// The requested size was zero or above [`MAX_ALLOC_SIZE`](crate::MAX_ALLOC_SIZE).
    InvalidSize,
    /// Growing the heap or creating a mapping failed.
    ResourceExhausted,
}

impl fmt::Display for AllocFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocFailure::InvalidSize => f.write_str("requested size is zero or too large"),
            AllocFailure::ResourceExhausted => f.write_str("backing store could not provide memory"),
        }
    }
}

impl core::error::Error for AllocFailure {}

#[cfg(feature = "allocator-api2")]
impl From<AllocFailure> for allocator_api2::alloc::AllocError {
    fn from(_: AllocFailure) -> Self {
        allocator_api2::alloc::AllocError
    }
}
