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

//! # Ember Infra
//!
//! Concrete implementations of the `ember-core` backend traits.
//!
//! Currently ships the software backend: a deterministic CPU implementation
//! that executes command lists at submit time against in-memory resources.
//! It exists for headless use, for the integration test suite, and as the
//! reference for what a driver-backed implementation must do. Its
//! instrumentation counters make the core's invariants observable (barrier
//! elision, blit path selection, blocking waits).

pub mod soft;

pub use soft::{SoftBackend, SoftInstance, SoftStats};
