// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public value types: space identities, screens, host traits, and keyboard state.

use kurbo::Rect;

use crate::space::CoordinateSpace;

/// Opaque identity of a coordinate space known to the host.
///
/// A space may be a screen, a window, or any view inside a window. The value is
/// meaningful only to the [`CoordinateSpace`] that produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u64);

/// A screen the keyboard can be presented on.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Screen {
    /// The screen's own coordinate space.
    pub space: SpaceId,
    /// Bounds of the screen in its own space.
    pub bounds: Rect,
}

bitflags::bitflags! {
    /// Capabilities and known quirks of the host environment.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HostTraits: u8 {
        /// Keyboard frames are always expressed in a stable, absolute screen space.
        ///
        /// Hosts without this trait report frames relative to the key window and
        /// misreport the X origin as `0`.
        const ABSOLUTE_SCREEN_SPACE = 0b0000_0001;
        /// The device is tablet class (multi-window, floating keyboards, …).
        const TABLET = 0b0000_0010;
    }
}

impl Default for HostTraits {
    fn default() -> Self {
        Self::ABSOLUTE_SCREEN_SPACE
    }
}

/// One observed placement of the docked keyboard.
///
/// Immutable once constructed: the tracker replaces the whole value on every
/// accepted event and never mutates it in place. The frame is never
/// [`Rect::ZERO`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeyboardState {
    is_local: bool,
    frame: Rect,
    space: SpaceId,
}

impl KeyboardState {
    pub(crate) const fn new(is_local: bool, frame: Rect, space: SpaceId) -> Self {
        Self {
            is_local,
            frame,
            space,
        }
    }

    /// Whether the keyboard is presented for this application.
    ///
    /// On multi-window hosts another application may own the keyboard session;
    /// most consumers should ignore non-local states.
    pub const fn is_local(&self) -> bool {
        self.is_local
    }

    /// The keyboard frame in [`KeyboardState::space`].
    pub const fn frame(&self) -> Rect {
        self.frame
    }

    /// The coordinate space the frame is expressed in.
    pub const fn space(&self) -> SpaceId {
        self.space
    }

    /// Project the keyboard frame into `target`'s coordinate space.
    ///
    /// Returns `None` when `target` is not on the same screen as the keyboard
    /// or is not attached to any window.
    pub fn frame_in(&self, spaces: &(impl CoordinateSpace + ?Sized), target: SpaceId) -> Option<Rect> {
        spaces.project_rect(self.frame, self.space, target)
    }
}
