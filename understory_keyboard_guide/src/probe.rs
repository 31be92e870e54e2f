// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Relative-position probe.
//!
//! Hosts do not notify anyone when a surface moves relative to its window (a
//! window being resized, a split view changing, a sheet sliding). They do lay
//! the surface out, though. A probe is a zero-size attachment anchored to the
//! window its surface lives in; each layout pass while it is anchored reports
//! back to its delegate with that window.

use alloc::rc::Weak;
use core::cell::Cell;
use core::fmt;

use tracing::trace;

use crate::space::{SurfaceAttachment, SurfaceHost};
use crate::types::SpaceId;

/// Receives layout callbacks from a [`RelativePositionProbe`].
pub trait ProbeDelegate {
    /// The probe's surface was laid out while in `window`.
    fn probe_did_layout_in_window(&self, host: &dyn SurfaceHost, probe: &RelativePositionProbe, window: SpaceId);

    /// The probe's surface left its window (it was detached or destroyed).
    fn probe_did_leave_window(&self, _host: &dyn SurfaceHost, _probe: &RelativePositionProbe) {}
}

/// Detects surface repositioning through the host's layout pass.
pub struct RelativePositionProbe {
    surface: SpaceId,
    delegate: Weak<dyn ProbeDelegate>,
    anchor: Cell<Option<SpaceId>>,
    laying_out: Cell<bool>,
}

impl fmt::Debug for RelativePositionProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelativePositionProbe")
            .field("surface", &self.surface)
            .field("anchor", &self.anchor.get())
            .finish_non_exhaustive()
    }
}

impl RelativePositionProbe {
    /// Create a detached probe for `surface`. Attach it with [`SurfaceHost::attach`].
    pub fn new(surface: SpaceId, delegate: Weak<dyn ProbeDelegate>) -> Self {
        Self {
            surface,
            delegate,
            anchor: Cell::new(None),
            laying_out: Cell::new(false),
        }
    }

    /// The surface this probe is attached to.
    pub fn surface(&self) -> SpaceId {
        self.surface
    }

    /// The window the probe is currently anchored to.
    pub fn anchor(&self) -> Option<SpaceId> {
        self.anchor.get()
    }
}

impl SurfaceAttachment for RelativePositionProbe {
    fn will_move_to_window(&self, _host: &dyn SurfaceHost, new_window: Option<SpaceId>) {
        if new_window.is_none() && self.anchor.take().is_some() {
            trace!(surface = ?self.surface, "probe released its window anchor");
        }
    }

    fn did_move_to_window(&self, host: &dyn SurfaceHost, window: Option<SpaceId>) {
        match window {
            Some(window) => {
                self.anchor.set(Some(window));
                trace!(surface = ?self.surface, ?window, "probe anchored");
            }
            None => {
                if let Some(delegate) = self.delegate.upgrade() {
                    delegate.probe_did_leave_window(host, self);
                }
            }
        }
    }

    fn layout(&self, host: &dyn SurfaceHost) {
        if self.laying_out.replace(true) {
            return;
        }
        if let Some(window) = host.window_of(self.surface)
            && let Some(delegate) = self.delegate.upgrade()
        {
            delegate.probe_did_layout_in_window(host, self, window);
        }
        self.laying_out.set(false);
    }

    fn anchored_window(&self) -> Option<SpaceId> {
        self.anchor.get()
    }
}
