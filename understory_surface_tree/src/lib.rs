// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_surface_tree --heading-base-level=0

//! Understory Surface Tree: a headless host for the Understory keyboard guide.
//!
//! A [`Tree`] models one screen holding windows and nested views, each with a
//! local transform and bounds. It implements
//! [`SurfaceHost`](understory_keyboard_guide::SurfaceHost), so trackers,
//! safe-area providers, and per-view guides can run against it without a real
//! windowing system: in tests, in tools, or behind a toolkit that keeps its own
//! scene graph.
//!
//! ## What it does
//!
//! - Projects rectangles between any two surfaces on the screen using world
//!   transforms as of the last layout pass.
//! - Tracks window membership and tells attachments when a surface joins or
//!   leaves a window ([`Tree::reparent`], [`Tree::remove`]).
//! - Runs layout passes: [`Tree::commit`] and
//!   [`SurfaceHost::layout_if_needed`](understory_keyboard_guide::SurfaceHost::layout_if_needed)
//!   apply pending geometry, then lay out attachments whose surface moved on
//!   screen or changed size, and attachments anchored to a window that did.
//!   This is what lets a relative-position probe notice a window moving
//!   without any keyboard event.
//! - Keeps a first responder and walks the responder chain from it through its
//!   ancestors.
//!
//! ## Not a layout engine
//!
//! Frames are set explicitly with [`Tree::set_frame`], [`Tree::set_transform`],
//! and [`Tree::set_bounds`]; a pass only propagates them to world space. Forced
//! passes are counted (see [`Tree::layout_requests`]).
//!
//! ## API overview
//!
//! - [`Tree`]: the surface container.
//! - [`LocalSurface`]: per-surface bounds, transform, and [`SurfaceFlags`].
//! - [`NodeId`]: generational handle, convertible to and from
//!   [`SpaceId`](understory_keyboard_guide::SpaceId) and
//!   [`ResponderId`](understory_keyboard_guide::ResponderId).
//! - [`Relayout`]: what a commit changed and how many callbacks it delivered.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod tree;
mod types;
mod util;

pub use tree::Tree;
pub use types::{LocalSurface, NodeId, Relayout, SurfaceFlags};
