// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small in-memory host for unit tests: translation-only spaces rooted at a
//! screen, one default window, and a flat responder table.

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use kurbo::{Point, Rect, Vec2};

use crate::responder::{self, Outcome, ResponderChain, ResponderId, ResponderTraits};
use crate::space::{CoordinateSpace, SurfaceAttachment, SurfaceHost};
use crate::types::{HostTraits, Screen, SpaceId};

const SCREEN: SpaceId = SpaceId(0);
const WINDOW: SpaceId = SpaceId(1);

#[derive(Clone, Copy)]
struct Node {
    parent: Option<SpaceId>,
    /// Frame in the parent's coordinates.
    frame: Rect,
    is_window: bool,
}

pub(crate) struct TestHost {
    traits: Cell<HostTraits>,
    nodes: RefCell<Vec<Node>>,
    key_window: Cell<Option<SpaceId>>,
    responders: RefCell<Vec<Option<ResponderTraits>>>,
    first_responder: Cell<Option<ResponderId>>,
    attachments: RefCell<Vec<(SpaceId, Rc<dyn SurfaceAttachment>)>>,
    layouts: Cell<u32>,
}

impl TestHost {
    fn with_screen(size: Rect, traits: HostTraits) -> Self {
        let screen = Node {
            parent: None,
            frame: size,
            is_window: false,
        };
        let window = Node {
            parent: Some(SCREEN),
            frame: size,
            is_window: true,
        };
        Self {
            traits: Cell::new(traits),
            nodes: RefCell::new(vec![screen, window]),
            key_window: Cell::new(Some(WINDOW)),
            responders: RefCell::new(Vec::new()),
            first_responder: Cell::new(None),
            attachments: RefCell::new(Vec::new()),
            layouts: Cell::new(0),
        }
    }

    pub(crate) fn phone() -> Self {
        Self::with_screen(Rect::new(0.0, 0.0, 320.0, 568.0), HostTraits::ABSOLUTE_SCREEN_SPACE)
    }

    pub(crate) fn tablet() -> Self {
        Self::with_screen(
            Rect::new(0.0, 0.0, 768.0, 1024.0),
            HostTraits::ABSOLUTE_SCREEN_SPACE | HostTraits::TABLET,
        )
    }

    pub(crate) fn window(&self) -> SpaceId {
        WINDOW
    }

    pub(crate) fn set_traits(&self, traits: HostTraits) {
        self.traits.set(traits);
    }

    pub(crate) fn set_key_window(&self, window: Option<SpaceId>) {
        self.key_window.set(window);
    }

    /// Move the default window's origin on screen.
    pub(crate) fn move_window(&self, origin: Point) {
        let mut nodes = self.nodes.borrow_mut();
        let frame = nodes[1].frame;
        nodes[1].frame = frame.with_origin(origin);
    }

    pub(crate) fn set_frame(&self, surface: SpaceId, frame: Rect) {
        self.nodes.borrow_mut()[Self::index(surface)].frame = frame;
    }

    pub(crate) fn add_window(&self, frame: Rect) -> SpaceId {
        self.push(Node {
            parent: Some(SCREEN),
            frame,
            is_window: true,
        })
    }

    pub(crate) fn add_view(&self, parent: SpaceId, frame: Rect) -> SpaceId {
        self.push(Node {
            parent: Some(parent),
            frame,
            is_window: false,
        })
    }

    /// Reparent `surface`, delivering window-membership callbacks to every
    /// attachment in its subtree.
    pub(crate) fn set_parent(&self, surface: SpaceId, parent: Option<SpaceId>) {
        let new_window = parent.and_then(|p| self.window_of(p));
        let affected: Vec<_> = self
            .attachments
            .borrow()
            .iter()
            .filter(|(s, _)| self.is_within(*s, surface))
            .map(|(s, a)| (*s, a.clone()))
            .collect();
        for (_, a) in &affected {
            a.will_move_to_window(self, new_window);
        }
        self.nodes.borrow_mut()[Self::index(surface)].parent = parent;
        for (s, a) in &affected {
            a.did_move_to_window(self, self.window_of(*s));
        }
    }

    /// Deliver a layout pass to every attachment, detached ones included.
    pub(crate) fn layout(&self) {
        let all: Vec<_> = self.attachments.borrow().iter().map(|(_, a)| a.clone()).collect();
        for a in all {
            a.layout(self);
        }
    }

    /// Deliver a layout pass to the attachments in `top`'s subtree.
    fn layout_within(&self, top: SpaceId) {
        let within: Vec<_> = self
            .attachments
            .borrow()
            .iter()
            .filter(|(s, _)| self.is_within(*s, top))
            .map(|(_, a)| a.clone())
            .collect();
        for a in within {
            a.layout(self);
        }
    }

    pub(crate) fn layout_count(&self) -> u32 {
        self.layouts.get()
    }

    pub(crate) fn add_responder(&self, traits: ResponderTraits) -> ResponderId {
        let mut responders = self.responders.borrow_mut();
        responders.push(Some(traits));
        ResponderId(responders.len() as u64 - 1)
    }

    pub(crate) fn set_responder_traits(&self, responder: ResponderId, traits: ResponderTraits) {
        self.responders.borrow_mut()[responder.0 as usize] = Some(traits);
    }

    /// Destroy `responder`; the host stops reporting traits for it.
    pub(crate) fn remove_responder(&self, responder: ResponderId) {
        self.responders.borrow_mut()[responder.0 as usize] = None;
    }

    pub(crate) fn set_first_responder(&self, responder: Option<ResponderId>) {
        self.first_responder.set(responder);
    }

    pub(crate) fn first_responder(&self) -> Option<ResponderId> {
        self.first_responder.get()
    }

    fn push(&self, node: Node) -> SpaceId {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(node);
        SpaceId(nodes.len() as u64 - 1)
    }

    fn index(id: SpaceId) -> usize {
        id.0 as usize
    }

    fn node(&self, id: SpaceId) -> Option<Node> {
        self.nodes.borrow().get(Self::index(id)).copied()
    }

    fn is_within(&self, mut id: SpaceId, ancestor: SpaceId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.node(id).and_then(|n| n.parent) {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Origin of `id` in screen coordinates, if it is connected to the screen.
    fn origin_on_screen(&self, mut id: SpaceId) -> Option<Vec2> {
        let mut offset = Vec2::ZERO;
        while id != SCREEN {
            let node = self.node(id)?;
            offset += node.frame.origin().to_vec2();
            id = node.parent?;
        }
        Some(offset)
    }
}

impl CoordinateSpace for TestHost {
    fn project_rect(&self, rect: Rect, from: SpaceId, to: SpaceId) -> Option<Rect> {
        let from = self.origin_on_screen(from)?;
        let to = self.origin_on_screen(to)?;
        Some(rect + (from - to))
    }
}

impl ResponderChain for TestHost {
    fn send_action(&self, action: &mut dyn FnMut(ResponderId) -> Outcome) {
        if let Some(first) = self.first_responder.get() {
            responder::run(&[first], action);
        }
    }

    fn responder_traits(&self, responder: ResponderId) -> Option<ResponderTraits> {
        self.responders.borrow().get(responder.0 as usize).copied().flatten()
    }

    fn become_first_responder(&self, responder: ResponderId) -> bool {
        let can = self
            .responder_traits(responder)
            .is_some_and(|t| t.contains(ResponderTraits::CAN_BECOME_FIRST_RESPONDER));
        if can {
            self.first_responder.set(Some(responder));
        }
        can
    }
}

impl SurfaceHost for TestHost {
    fn traits(&self) -> HostTraits {
        self.traits.get()
    }

    fn screen(&self) -> Screen {
        Screen {
            space: SCREEN,
            bounds: self.nodes.borrow()[0].frame,
        }
    }

    fn key_window(&self) -> Option<SpaceId> {
        self.key_window.get()
    }

    fn window_of(&self, surface: SpaceId) -> Option<SpaceId> {
        self.origin_on_screen(surface)?;
        let mut id = surface;
        loop {
            let node = self.node(id)?;
            if node.is_window {
                return Some(id);
            }
            id = node.parent?;
        }
    }

    fn bounds(&self, surface: SpaceId) -> Option<Rect> {
        self.node(surface)
            .map(|n| Rect::from_origin_size(Point::ZERO, n.frame.size()))
    }

    fn attach(&self, surface: SpaceId, attachment: Rc<dyn SurfaceAttachment>) {
        self.attachments.borrow_mut().push((surface, attachment.clone()));
        if let Some(window) = self.window_of(surface) {
            attachment.did_move_to_window(self, Some(window));
        }
    }

    fn layout_if_needed(&self, surface: SpaceId) {
        self.layouts.set(self.layouts.get() + 1);
        self.layout_within(surface);
    }
}
