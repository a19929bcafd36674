// SPDX-License-Identifier: GPL-3.0-only

pub mod protocol;
pub mod traits;

pub use protocol::{MediaError, MediaErrorKind};
pub use traits::{DeviceBus, ServiceAdapter, SignalStream};
