// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the surface tree: identifiers, flags, and local geometry.

use alloc::vec::Vec;

use kurbo::{Affine, Point, Rect};
use understory_keyboard_guide::{ResponderId, SpaceId};

/// Identifier for a surface in the tree (generational).
///
/// Converts losslessly to the [`SpaceId`] and [`ResponderId`] the keyboard
/// guide works with.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    const fn pack(self) -> u64 {
        ((self.1 as u64) << 32) | self.0 as u64
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "The packed value holds two 32-bit halves."
    )]
    const fn unpack(v: u64) -> Self {
        Self(v as u32, (v >> 32) as u32)
    }
}

impl From<NodeId> for SpaceId {
    fn from(id: NodeId) -> Self {
        Self(id.pack())
    }
}

impl From<SpaceId> for NodeId {
    fn from(space: SpaceId) -> Self {
        Self::unpack(space.0)
    }
}

impl From<NodeId> for ResponderId {
    fn from(id: NodeId) -> Self {
        Self(id.pack())
    }
}

impl From<ResponderId> for NodeId {
    fn from(responder: ResponderId) -> Self {
        Self::unpack(responder.0)
    }
}

bitflags::bitflags! {
    /// Surface roles and responder capabilities.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u8 {
        /// The surface is a window: it and its descendants belong to it.
        const WINDOW = 0b0000_0001;
        /// The surface accepts text input.
        const TEXT_INPUT = 0b0000_0010;
        /// The surface can become the first responder.
        const CAN_BECOME_FIRST_RESPONDER = 0b0000_0100;
    }
}

/// Local geometry and role of a surface.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalSurface {
    /// Bounds in the surface's own coordinates.
    pub bounds: Rect,
    /// Transform from the surface's coordinates into its parent's.
    pub transform: Affine,
    /// Role and responder capabilities.
    pub flags: SurfaceFlags,
}

impl Default for LocalSurface {
    fn default() -> Self {
        Self {
            bounds: Rect::ZERO,
            transform: Affine::IDENTITY,
            flags: SurfaceFlags::empty(),
        }
    }
}

impl LocalSurface {
    /// A plain view occupying `frame` in its parent's coordinates.
    pub fn view(frame: Rect) -> Self {
        Self {
            bounds: Rect::from_origin_size(Point::ZERO, frame.size()),
            transform: Affine::translate(frame.origin().to_vec2()),
            flags: SurfaceFlags::empty(),
        }
    }

    /// A window occupying `frame` in screen coordinates.
    pub fn window(frame: Rect) -> Self {
        Self {
            flags: SurfaceFlags::WINDOW,
            ..Self::view(frame)
        }
    }

    /// A text field occupying `frame` in its parent's coordinates.
    pub fn text_field(frame: Rect) -> Self {
        Self {
            flags: SurfaceFlags::TEXT_INPUT | SurfaceFlags::CAN_BECOME_FIRST_RESPONDER,
            ..Self::view(frame)
        }
    }
}

/// Result of [`Tree::commit`](crate::Tree::commit).
#[derive(Clone, Debug, Default)]
pub struct Relayout {
    /// Surfaces whose placement on screen or bounds changed.
    pub surfaces: Vec<NodeId>,
    /// Layout callbacks delivered to attachments.
    pub deliveries: usize,
}
