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

//! The one-shot flush-and-retry policy for resource exhaustion.
//!
//! Descriptor slots (and anything else on the fence discipline) may be
//! exhausted only because releases are still waiting on fence values the GPU
//! has not reached. A blocking flush runs the deferred-release sweep and may
//! recover exactly that situation, once. A second failure after a flush
//! means the pool is undersized, which no amount of retrying fixes, so it is
//! reported upward as a typed failure for the caller to check.

use crate::error::{AllocError, DeviceError};

/// Runs `op`; on a retriable exhaustion failure, runs `flush` (expected to
/// be a blocking flush that sweeps deferred releases) and retries `op`
/// exactly once.
///
/// Non-exhaustion failures and second failures propagate without further
/// attempts.
pub fn run_with_exhaustion_retry<T>(
    mut op: impl FnMut() -> Result<T, AllocError>,
    flush: impl FnOnce() -> Result<(), DeviceError>,
) -> Result<T, DeviceError> {
    match op() {
        Ok(value) => Ok(value),
        Err(err) if err.is_exhaustion() => {
            log::warn!("{err}; flushing the GPU and retrying");
            flush()?;
            op().map_err(|second| {
                log::error!("{second} after a blocking flush; giving up");
                DeviceError::from(second)
            })
        }
        Err(err) => Err(DeviceError::from(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorType;

    fn exhausted() -> AllocError {
        AllocError::DescriptorPoolExhausted {
            ty: DescriptorType::Sampler,
            capacity: 0,
        }
    }

    #[test]
    fn success_never_flushes() {
        let mut flushes = 0;
        let result = run_with_exhaustion_retry(
            || Ok::<_, AllocError>(7),
            || {
                flushes += 1;
                Ok(())
            },
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(flushes, 0);
    }

    #[test]
    fn exhaustion_flushes_once_then_succeeds() {
        let mut attempts = 0;
        let mut flushes = 0;
        let result = run_with_exhaustion_retry(
            || {
                attempts += 1;
                if attempts == 1 {
                    Err(exhausted())
                } else {
                    Ok(attempts)
                }
            },
            || {
                flushes += 1;
                Ok(())
            },
        );
        assert_eq!(result.unwrap(), 2);
        assert_eq!(flushes, 1);
    }

    #[test]
    fn second_exhaustion_is_reported_not_retried() {
        let mut attempts = 0;
        let mut flushes = 0;
        let result: Result<(), _> = run_with_exhaustion_retry(
            || {
                attempts += 1;
                Err(exhausted())
            },
            || {
                flushes += 1;
                Ok(())
            },
        );
        assert_eq!(attempts, 2);
        assert_eq!(flushes, 1);
        assert!(matches!(
            result,
            Err(DeviceError::Alloc(AllocError::DescriptorPoolExhausted { .. }))
        ));
    }

    #[test]
    fn non_exhaustion_failures_skip_the_flush() {
        let mut flushes = 0;
        let result: Result<(), _> = run_with_exhaustion_retry(
            || Err(AllocError::BindingFailed("bad root index".to_string())),
            || {
                flushes += 1;
                Ok(())
            },
        );
        assert_eq!(flushes, 0);
        assert!(matches!(
            result,
            Err(DeviceError::Alloc(AllocError::BindingFailed(_)))
        ));
    }
}
