// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_keyboard_guide --heading-base-level=0

//! Understory Keyboard Guide: track a virtual keyboard and expose keyboard-safe areas.
//!
//! ## Overview
//!
//! Hosts present a virtual keyboard over application content and post events
//! when it shows, hides, or moves. Those events are inconsistent: payloads go
//! missing, frames arrive as the zero rectangle, and some hosts misreport the
//! origin. This crate turns them into one canonical docked keyboard state and
//! derives, for any surface, the part of it the keyboard does not cover.
//!
//! ## Pieces
//!
//! - [`KeyboardTracker`] normalizes host events into an optional
//!   [`KeyboardState`] and broadcasts every change to weakly held
//!   [`KeyboardObserver`]s.
//! - [`SafeAreaProvider`] computes, per top-level surface, a general and a
//!   local-only guide whose bottom edge stops at the keyboard. A
//!   [`RelativePositionProbe`] keeps it correct when the surface moves on
//!   screen without any keyboard event.
//! - [`SafeAreaRegistry`] creates providers lazily, one per surface.
//! - [`SafeAreaGuide`] follows the provider of whichever window a view is in.
//!
//! Control flows one way: host event, tracker, providers, guides, observers.
//! Everything runs synchronously on the UI thread; the handle types are not
//! `Send`.
//!
//! ## Host boundary
//!
//! The crate never talks to a windowing system directly. Implement
//! [`SurfaceHost`] (coordinate projection, window membership, responder chain,
//! attachments) for your toolkit; `understory_surface_tree` provides a headless
//! implementation.
//!
//! ## Safe-area math
//!
//! The covered height of a surface is
//! `max(0, bounds.y1 - max(bounds.y0, keyboard.y0))` with the keyboard frame
//! projected into the surface's space; see [`compute_inset`].
//!
//! ## Features
//!
//! - `std` (default): enables [`KeyboardTracker::shared`] and forwards `std` to
//!   dependencies.
//! - `libm`: `no_std` float math for `kurbo`.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod config;
mod event;
mod guide;
mod host;
pub mod layout;
pub mod observer;
mod probe;
pub mod responder;
mod safe_area;
mod space;
mod tracker;
mod types;

#[cfg(test)]
mod test_host;

pub use config::{DEFAULT_EXTENSION_ADJUSTMENT, TrackerConfig};
pub use event::{HostEvent, KeyboardEventKind, KeyboardPayload};
pub use guide::SafeAreaGuide;
pub use host::ApplicationHost;
pub use layout::{GuideKind, LayoutError};
pub use observer::{Bus, Subscription};
pub use probe::{ProbeDelegate, RelativePositionProbe};
pub use responder::{Outcome, ResponderChain, ResponderId, ResponderTraits};
pub use safe_area::{
    LayoutPass, SafeAreaGeometry, SafeAreaObserver, SafeAreaProvider, SafeAreaRegistry, compute_inset,
};
pub use space::{CoordinateSpace, SurfaceAttachment, SurfaceHost};
pub use tracker::{KeyboardObserver, KeyboardTracker, Rejection, Subscriptions};
pub use types::{HostTraits, KeyboardState, Screen, SpaceId};
