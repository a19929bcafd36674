// SPDX-License-Identifier: GPL-3.0-only

//! Scripted stand-ins for the device-management service and the system bus.

pub mod fake;

pub use fake::{Call, FakeDevice, FakeService, Op};
