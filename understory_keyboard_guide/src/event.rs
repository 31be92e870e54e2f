// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inbound host events.

use kurbo::Rect;

/// Which keyboard notification the host posted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyboardEventKind {
    /// The keyboard is about to appear.
    WillShow,
    /// The keyboard is about to disappear (or undock).
    WillHide,
    /// The keyboard frame is about to change.
    WillChangeFrame,
}

/// Raw keyboard payload as posted by the host.
///
/// Every field is optional because hosts routinely omit them. Rectangles are
/// taken verbatim and are not normalized; in particular `frame_begin` may carry
/// a negative height.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct KeyboardPayload {
    /// Whether the keyboard belongs to this application.
    pub is_local: Option<bool>,
    /// Frame at the start of the transition.
    pub frame_begin: Option<Rect>,
    /// Frame at the end of the transition.
    pub frame_end: Option<Rect>,
}

impl KeyboardPayload {
    /// A complete payload for a local keyboard ending at `frame_end`.
    pub fn local(frame_end: Rect) -> Self {
        Self {
            is_local: Some(true),
            frame_begin: None,
            frame_end: Some(frame_end),
        }
    }

    /// A complete payload for a keyboard owned by another application.
    pub fn remote(frame_end: Rect) -> Self {
        Self {
            is_local: Some(false),
            frame_begin: None,
            frame_end: Some(frame_end),
        }
    }

    /// Set the begin frame.
    pub fn with_begin(mut self, frame_begin: Rect) -> Self {
        self.frame_begin = Some(frame_begin);
        self
    }
}

/// An event delivered by the host to [`KeyboardTracker::handle_event`](crate::KeyboardTracker::handle_event).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HostEvent {
    /// A keyboard notification with its (possibly absent) payload.
    Keyboard(KeyboardEventKind, Option<KeyboardPayload>),
    /// The application entered the background.
    DidEnterBackground,
    /// The application is about to enter the foreground.
    WillEnterForeground,
}

impl HostEvent {
    /// Shorthand for a will-show event.
    pub fn will_show(payload: KeyboardPayload) -> Self {
        Self::Keyboard(KeyboardEventKind::WillShow, Some(payload))
    }

    /// Shorthand for a will-hide event without payload.
    pub fn will_hide() -> Self {
        Self::Keyboard(KeyboardEventKind::WillHide, None)
    }

    /// Shorthand for a will-change-frame event.
    pub fn will_change_frame(payload: KeyboardPayload) -> Self {
        Self::Keyboard(KeyboardEventKind::WillChangeFrame, Some(payload))
    }
}
