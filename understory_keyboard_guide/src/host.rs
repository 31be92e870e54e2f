// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The application host a tracker is bound to.

use crate::space::SurfaceHost;
use crate::types::SpaceId;

/// The kind of process hosting the tracker.
///
/// Exactly one is bound to a [`KeyboardTracker`](crate::KeyboardTracker) at
/// activation and never rebound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ApplicationHost {
    /// A normal application process with access to the window registry.
    Application,
    /// A restricted extension process, scoped to the surface of its hosting
    /// view controller. There is no window registry; the key window is the
    /// window that surface currently lives in.
    Extension {
        /// Root surface of the hosting view controller.
        root: SpaceId,
    },
}

impl ApplicationHost {
    /// Whether this is a restricted extension host.
    pub const fn is_extension(&self) -> bool {
        matches!(self, Self::Extension { .. })
    }

    /// The key window as visible to this host.
    pub fn key_window(&self, host: &dyn SurfaceHost) -> Option<SpaceId> {
        match *self {
            Self::Application => host.key_window(),
            Self::Extension { root } => host.window_of(root),
        }
    }
}
