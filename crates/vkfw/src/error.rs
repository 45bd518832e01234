//! Error taxonomy shared by the core and every backend
//!
//! Backend transport failures (lost connection, lost surface) are surfaced
//! verbatim through the dispatch entry points. The core never retries them:
//! resuming a broken display connection is not safe.

use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors reported by VKFW
#[derive(Error, Debug)]
pub enum VkfwError {
    /// A backend could not grow its input buffers, or a Vulkan call ran out
    /// of host memory
    ///
    /// Other allocations follow Rust's default and abort on failure.
    #[error("out of host memory")]
    OutOfMemory,

    /// The display connection or window surface is gone
    #[error("display connection or surface lost")]
    SurfaceLost,

    /// A backend or the platform could not be brought up
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// The application was built against an incompatible library version
    #[error("version mismatch: application expects {expected_major}.{expected_minor}.{expected_patch} (variant {expected_variant})")]
    VersionMismatch {
        /// Expected API variant (must be 0)
        expected_variant: u32,
        /// Expected major version
        expected_major: u32,
        /// Expected minor version
        expected_minor: u32,
        /// Expected patch version
        expected_patch: u32,
    },

    /// No candidate backend could open a connection
    #[error("no usable window backend")]
    NoBackend,

    /// The window handle is stale or was destroyed
    #[error("invalid or destroyed window handle")]
    InvalidWindow,

    /// The active backend does not implement an optional capability
    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    /// The backend failed without being able to classify the failure
    #[error("unknown backend error")]
    Unknown,

    /// A Vulkan call made by a backend failed
    #[error("Vulkan error: {0:?}")]
    Vulkan(vk::Result),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl VkfwError {
    /// Map the error onto the `VkResult` code of the C interface
    pub fn to_vk_result(&self) -> vk::Result {
        match self {
            Self::OutOfMemory => vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            Self::SurfaceLost => vk::Result::ERROR_SURFACE_LOST_KHR,
            Self::InitializationFailed(_)
            | Self::VersionMismatch { .. }
            | Self::NoBackend
            | Self::Config(_) => vk::Result::ERROR_INITIALIZATION_FAILED,
            Self::Unsupported(_) => vk::Result::ERROR_FEATURE_NOT_PRESENT,
            Self::InvalidWindow | Self::Unknown => vk::Result::ERROR_UNKNOWN,
            Self::Vulkan(result) => *result,
        }
    }
}

impl From<vk::Result> for VkfwError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfMemory,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            vk::Result::ERROR_UNKNOWN => Self::Unknown,
            other => Self::Vulkan(other),
        }
    }
}

impl From<std::collections::TryReserveError> for VkfwError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Result alias used throughout the crate
pub type VkfwResult<T> = Result<T, VkfwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_result_mapping() {
        assert_eq!(
            VkfwError::OutOfMemory.to_vk_result(),
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
        );
        assert_eq!(
            VkfwError::SurfaceLost.to_vk_result(),
            vk::Result::ERROR_SURFACE_LOST_KHR
        );
        assert_eq!(VkfwError::NoBackend.to_vk_result(), vk::Result::ERROR_INITIALIZATION_FAILED);
        assert_eq!(VkfwError::Unknown.to_vk_result(), vk::Result::ERROR_UNKNOWN);
    }

    #[test]
    fn test_failed_reservation_is_out_of_memory() {
        let err: VkfwError = Vec::<u64>::new().try_reserve(usize::MAX).unwrap_err().into();
        assert!(matches!(err, VkfwError::OutOfMemory));
        assert_eq!(err.to_vk_result(), vk::Result::ERROR_OUT_OF_HOST_MEMORY);
    }

    #[test]
    fn test_from_vk_result_keeps_transport_errors() {
        assert!(matches!(
            VkfwError::from(vk::Result::ERROR_SURFACE_LOST_KHR),
            VkfwError::SurfaceLost
        ));
        assert!(matches!(
            VkfwError::from(vk::Result::ERROR_DEVICE_LOST),
            VkfwError::Vulkan(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
