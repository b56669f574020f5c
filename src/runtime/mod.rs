// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities for observability.
//!
//! Operations log through [`StageLogger`], which opens one `tracing` span
//! per operation and times every stage inside it.

mod logging;

pub use logging::{LogLevel, LoggingConfig, StageLogger, StageRecord};
