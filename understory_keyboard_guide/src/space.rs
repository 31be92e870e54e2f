// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host boundary: coordinate-space projection, surfaces, and attachments.
//!
//! Everything in this crate is expressed in terms of these traits. A toolkit
//! integration implements [`SurfaceHost`] once; `understory_surface_tree`
//! provides a headless implementation.

use alloc::rc::Rc;

use kurbo::Rect;

use crate::responder::ResponderChain;
use crate::types::{HostTraits, Screen, SpaceId};

/// Converts rectangles between coordinate spaces.
pub trait CoordinateSpace {
    /// Project `rect` from the `from` space into the `to` space.
    ///
    /// Returns `None` when the two spaces are unrelated (different screens,
    /// detached surfaces, stale identifiers).
    fn project_rect(&self, rect: Rect, from: SpaceId, to: SpaceId) -> Option<Rect>;
}

/// The host environment as seen by trackers, providers, and guides.
///
/// Calls arrive on the single UI thread; implementations should not hold
/// interior borrows across calls into [`SurfaceAttachment`]s, since those may
/// call back into the host.
pub trait SurfaceHost: CoordinateSpace + ResponderChain {
    /// Host capabilities and known quirks.
    fn traits(&self) -> HostTraits;

    /// The screen the keyboard is presented on.
    fn screen(&self) -> Screen;

    /// The application's key window, if any.
    fn key_window(&self) -> Option<SpaceId>;

    /// The window containing `surface` (a window contains itself).
    fn window_of(&self, surface: SpaceId) -> Option<SpaceId>;

    /// Bounds of `surface` in its own coordinate space.
    fn bounds(&self, surface: SpaceId) -> Option<Rect>;

    /// Attach an object to `surface` so it receives window-membership and
    /// layout callbacks for as long as the surface lives.
    ///
    /// If the surface is already in a window, the host immediately delivers
    /// [`SurfaceAttachment::did_move_to_window`].
    fn attach(&self, surface: SpaceId, attachment: Rc<dyn SurfaceAttachment>);

    /// Run a synchronous layout pass for `surface` if one is pending.
    fn layout_if_needed(&self, surface: SpaceId);
}

/// Callbacks delivered by a [`SurfaceHost`] to objects attached to a surface.
///
/// All methods default to no-ops.
pub trait SurfaceAttachment {
    /// The surface is about to join `new_window`, or leave its window when `None`.
    fn will_move_to_window(&self, host: &dyn SurfaceHost, new_window: Option<SpaceId>) {
        let _ = (host, new_window);
    }

    /// The surface is now in `window`, or in no window when `None`.
    fn did_move_to_window(&self, host: &dyn SurfaceHost, window: Option<SpaceId>) {
        let _ = (host, window);
    }

    /// The host laid out the surface.
    ///
    /// Delivered whenever the surface's placement on screen or its bounds
    /// changed, and, for anchored attachments, when the anchor window's bounds
    /// changed.
    fn layout(&self, host: &dyn SurfaceHost) {
        let _ = host;
    }

    /// The window this attachment keeps a constraint against, if any.
    fn anchored_window(&self) -> Option<SpaceId> {
        None
    }
}
