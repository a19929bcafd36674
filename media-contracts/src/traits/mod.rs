// SPDX-License-Identifier: GPL-3.0-only

pub mod adapter;
pub mod bus;

pub use adapter::ServiceAdapter;
pub use bus::{DeviceBus, SignalStream};
