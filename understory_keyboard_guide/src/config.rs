// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracker configuration.
//!
//! The knobs here are empirically tuned workarounds for specific host defects.
//! Hosts that do not exhibit those defects can turn them off.

/// Default Y adjustment applied to extension-hosted keyboard frames on tablets
/// until the real value has been learned from a begin-frame sentinel.
pub const DEFAULT_EXTENSION_ADJUSTMENT: f64 = 24.0;

/// Configuration for a [`KeyboardTracker`](crate::KeyboardTracker).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Adjustment used for extension-hosted tablet frames before the host has
    /// revealed the real value.
    pub default_extension_adjustment: f64,
    /// Discard events whose frame width disagrees with the screen width.
    ///
    /// Such events are posted while the screen is being reconfigured; a
    /// consistent event follows.
    pub reject_width_mismatch: bool,
    /// Remember the first responder when backgrounded and restore it when
    /// foregrounded. Only honored by the shared tracker on an application host.
    pub restore_first_responder: bool,
}

impl TrackerConfig {
    /// Create the default configuration.
    pub const fn new() -> Self {
        Self {
            default_extension_adjustment: DEFAULT_EXTENSION_ADJUSTMENT,
            reject_width_mismatch: true,
            restore_first_responder: true,
        }
    }

    /// Set the default extension adjustment.
    pub const fn with_default_extension_adjustment(mut self, adjustment: f64) -> Self {
        self.default_extension_adjustment = adjustment;
        self
    }

    /// Enable or disable width-mismatch rejection.
    pub const fn with_reject_width_mismatch(mut self, reject: bool) -> Self {
        self.reject_width_mismatch = reject;
        self
    }

    /// Enable or disable first-responder restoration.
    pub const fn with_restore_first_responder(mut self, restore: bool) -> Self {
        self.restore_first_responder = restore;
        self
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}
