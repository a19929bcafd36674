// SPDX-License-Identifier: GPL-3.0-only

pub mod error;

pub use error::{MediaError, MediaErrorKind};
