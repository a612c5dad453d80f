// Copyright 2025 Ember Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the GPU core.

use crate::descriptor::DescriptorType;
use std::fmt;

/// An error related to fence creation or synchronization.
///
/// Fence failures are not retried: a broken fence means the device is in an
/// unrecoverable state, so every variant here is terminal for the device.
#[derive(Debug)]
pub enum FenceError {
    /// The backend failed to create the native fence object.
    CreationFailed(String),
    /// A blocking CPU-side wait on the fence failed.
    WaitFailed(String),
    /// The device was lost while waiting on the fence.
    DeviceLost,
}

impl fmt::Display for FenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceError::CreationFailed(msg) => {
                write!(f, "Failed to create a fence object: {msg}")
            }
            FenceError::WaitFailed(msg) => write!(f, "Fence wait failed: {msg}"),
            FenceError::DeviceLost => {
                write!(f, "The device was lost while waiting on a fence.")
            }
        }
    }
}

impl std::error::Error for FenceError {}

/// An error related to transient-memory or descriptor-slot allocation.
#[derive(Debug)]
pub enum AllocError {
    /// The descriptor pool has no free slot of the requested type.
    ///
    /// This is the one retriable failure in the allocation family: a blocking
    /// flush runs the deferred-release sweep and may free slots whose fence
    /// values the GPU has since reached. See [`crate::retry`].
    DescriptorPoolExhausted {
        /// The descriptor type that ran out of slots.
        ty: DescriptorType,
        /// The configured capacity for that type.
        capacity: u32,
    },
    /// The backend failed to provide a new memory page.
    PageAllocationFailed(String),
    /// Applying shader resource bindings failed for a non-exhaustion reason.
    BindingFailed(String),
}

impl AllocError {
    /// Whether this failure may be resolved by a blocking flush that runs the
    /// deferred-release sweep.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, AllocError::DescriptorPoolExhausted { .. })
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::DescriptorPoolExhausted { ty, capacity } => {
                write!(
                    f,
                    "Descriptor pool exhausted for type {ty:?} (capacity {capacity})"
                )
            }
            AllocError::PageAllocationFailed(msg) => {
                write!(f, "Failed to allocate a memory heap page: {msg}")
            }
            AllocError::BindingFailed(msg) => {
                write!(f, "Applying resource bindings failed: {msg}")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// An error raised by the blit family of operations.
///
/// Degenerate rectangles are *not* errors (they are silent no-ops); these
/// variants all indicate a caller contract violation or an unsupported
/// request on the shader-based path.
#[derive(Debug)]
pub enum BlitError {
    /// A buffer resource was passed where a texture view is required.
    BufferResource,
    /// The shader-based path cannot address mip-mapped or array views.
    SubresourceView,
    /// Complex blits (reduction modes or channel transforms) do not support
    /// multi-sampled sources.
    MultisampledComplexSource,
    /// Integer source formats are only supported by the single-sampled
    /// standard blit.
    IntegerSourceFormat {
        /// Whether the rejected request was a complex blit.
        complex: bool,
    },
}

impl fmt::Display for BlitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlitError::BufferResource => {
                write!(f, "blit() does not support buffer resources")
            }
            BlitError::SubresourceView => {
                write!(f, "blit() does not support texture arrays or mip maps")
            }
            BlitError::MultisampledComplexSource => {
                write!(f, "blit() does not support sample count > 1 for complex blit")
            }
            BlitError::IntegerSourceFormat { complex } => {
                if *complex {
                    write!(f, "blit() requires non-integer source format for complex blit")
                } else {
                    write!(
                        f,
                        "blit() requires non-integer source format for multi-sampled textures"
                    )
                }
            }
        }
    }
}

impl std::error::Error for BlitError {}

/// A high-level error for device creation and per-frame device operations.
#[derive(Debug)]
pub enum DeviceError {
    /// The requested adapter id was never enumerated.
    AdapterNotEnumerated(u32),
    /// The backend failed to create the logical device or one of its
    /// mandatory sub-objects.
    CreationFailed(String),
    /// The requested API version is not supported by the adapter.
    UnsupportedApiVersion {
        /// Requested major version.
        major: u32,
        /// Requested minor version.
        minor: u32,
    },
    /// No direct queue was requested; the default render context cannot
    /// exist without one.
    MissingDirectQueue,
    /// The active backend does not support the requested feature.
    Unsupported(String),
    /// A resource handle was used after its owner was destroyed.
    InvalidHandle,
    /// A fence operation failed.
    Fence(FenceError),
    /// An allocation failed (and, where applicable, the bounded retry was
    /// already consumed).
    Alloc(AllocError),
    /// A blit operation was rejected.
    Blit(BlitError),
    /// An unexpected internal error.
    Internal(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::AdapterNotEnumerated(id) => {
                write!(f, "Device {id} not enumerated")
            }
            DeviceError::CreationFailed(msg) => {
                write!(f, "Failed to create device: {msg}")
            }
            DeviceError::UnsupportedApiVersion { major, minor } => {
                write!(f, "Requested API version {major}.{minor} is not supported")
            }
            DeviceError::MissingDirectQueue => {
                write!(
                    f,
                    "At least one direct queue is required for the default render context"
                )
            }
            DeviceError::Unsupported(msg) => write!(f, "Unsupported: {msg}"),
            DeviceError::InvalidHandle => {
                write!(f, "Resource handle used after its owner was destroyed.")
            }
            DeviceError::Fence(err) => write!(f, "Fence error: {err}"),
            DeviceError::Alloc(err) => write!(f, "Allocation error: {err}"),
            DeviceError::Blit(err) => write!(f, "Blit error: {err}"),
            DeviceError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Fence(err) => Some(err),
            DeviceError::Alloc(err) => Some(err),
            DeviceError::Blit(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FenceError> for DeviceError {
    fn from(err: FenceError) -> Self {
        DeviceError::Fence(err)
    }
}

impl From<AllocError> for DeviceError {
    fn from(err: AllocError) -> Self {
        DeviceError::Alloc(err)
    }
}

impl From<BlitError> for DeviceError {
    fn from(err: BlitError) -> Self {
        DeviceError::Blit(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn fence_error_display() {
        let err = FenceError::CreationFailed("out of host memory".to_string());
        assert_eq!(
            format!("{err}"),
            "Failed to create a fence object: out of host memory"
        );
    }

    #[test]
    fn alloc_error_exhaustion_classification() {
        let exhausted = AllocError::DescriptorPoolExhausted {
            ty: DescriptorType::Sampler,
            capacity: 2048,
        };
        assert!(exhausted.is_exhaustion());

        let other = AllocError::BindingFailed("bad root index".to_string());
        assert!(!other.is_exhaustion());
    }

    #[test]
    fn device_error_display_wrapping_alloc_error() {
        let alloc = AllocError::DescriptorPoolExhausted {
            ty: DescriptorType::TextureSrv,
            capacity: 16,
        };
        let dev: DeviceError = alloc.into();
        assert_eq!(
            format!("{dev}"),
            "Allocation error: Descriptor pool exhausted for type TextureSrv (capacity 16)"
        );
        assert!(dev.source().is_some());
    }
}
