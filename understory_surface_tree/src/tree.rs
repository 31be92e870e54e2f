// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: structure, layout passes, host traits.

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use kurbo::{Affine, Rect};
use smallvec::SmallVec;
use tracing::{debug, trace};
use understory_keyboard_guide::responder::{self, Outcome, ResponderChain, ResponderId, ResponderTraits};
use understory_keyboard_guide::{CoordinateSpace, HostTraits, Screen, SpaceId, SurfaceAttachment, SurfaceHost};

use crate::types::{LocalSurface, NodeId, Relayout, SurfaceFlags};
use crate::util::transform_rect_bbox;

/// A screen with windows and views, acting as a keyboard-guide host.
///
/// The root is the screen. Windows are surfaces flagged
/// [`SurfaceFlags::WINDOW`]; every surface belongs to the nearest window among
/// its ancestors (itself included), provided the chain reaches the screen.
///
/// Structural changes ([`Tree::insert`], [`Tree::reparent`], [`Tree::remove`])
/// take effect immediately and deliver window-membership callbacks to
/// attachments. Geometry changes are batched: world transforms and bounds seen
/// through [`SurfaceHost`] update on the next layout pass, which then lays out
/// every attachment whose surface moved on screen or changed size, plus every
/// attachment anchored to such a window. Passes run on [`Tree::commit`] and on
/// [`SurfaceHost::layout_if_needed`].
///
/// ## Example
///
/// ```rust
/// use kurbo::Rect;
/// use understory_keyboard_guide::{CoordinateSpace, SurfaceHost};
/// use understory_surface_tree::Tree;
///
/// let mut tree = Tree::new(Rect::new(0.0, 0.0, 320.0, 568.0));
/// let window = tree.insert_window(Rect::new(0.0, 0.0, 320.0, 568.0));
/// let view = tree.insert_view(window, Rect::new(0.0, 100.0, 320.0, 300.0));
/// tree.commit();
///
/// assert_eq!(tree.window_of(view.into()), Some(window.into()));
/// assert_eq!(
///     tree.project_rect(Rect::new(0.0, 0.0, 10.0, 10.0), view.into(), window.into()),
///     Some(Rect::new(0.0, 100.0, 10.0, 110.0))
/// );
/// ```
pub struct Tree {
    /// slots
    nodes: Vec<Option<Node>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    screen: NodeId,
    traits: HostTraits,
    key_window: Option<NodeId>,
    first_responder: Cell<Option<NodeId>>,
    attachments: RefCell<Vec<(NodeId, Rc<dyn SurfaceAttachment>)>>,
    layout_requests: Cell<u64>,
    in_pass: Cell<bool>,
}

impl core::fmt::Debug for Tree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &self.free_list.len())
            .field("traits", &self.traits)
            .field("key_window", &self.key_window)
            .field("first_responder", &self.first_responder.get())
            .field("attachments", &self.attachments.borrow().len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct Node {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: LocalSurface,
    /// As of the last pass.
    world_transform: Cell<Affine>,
    /// As of the last pass.
    bounds: Cell<Rect>,
    dirty: Cell<bool>,
}

impl Node {
    fn new(generation: u32, local: LocalSurface) -> Self {
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            local,
            world_transform: Cell::new(Affine::IDENTITY),
            bounds: Cell::new(Rect::ZERO),
            dirty: Cell::new(true),
        }
    }
}

impl Tree {
    /// Create a tree whose screen root has `screen_bounds`.
    ///
    /// Hosts default to [`HostTraits::ABSOLUTE_SCREEN_SPACE`].
    pub fn new(screen_bounds: Rect) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            screen: NodeId::new(0, 1),
            traits: HostTraits::default(),
            key_window: None,
            first_responder: Cell::new(None),
            attachments: RefCell::new(Vec::new()),
            layout_requests: Cell::new(0),
            in_pass: Cell::new(false),
        };
        tree.screen = tree.insert(
            None,
            LocalSurface {
                bounds: screen_bounds,
                ..LocalSurface::default()
            },
        );
        tree.commit();
        tree
    }

    /// The screen root.
    pub fn screen_id(&self) -> NodeId {
        self.screen
    }

    /// Set the traits reported through [`SurfaceHost::traits`].
    pub fn set_host_traits(&mut self, traits: HostTraits) {
        self.traits = traits;
    }

    /// Insert a new surface as a child of `parent` (or as a detached root if `None`).
    ///
    /// Its geometry becomes visible to the host traits on the next
    /// [`Tree::commit`].
    pub fn insert(&mut self, parent: Option<NodeId>, local: LocalSurface) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, local));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, local)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        let id = NodeId::new(idx, generation);
        if let Some(p) = parent
            && self.is_alive(p)
        {
            self.link_parent(id, p);
        }
        id
    }

    /// Insert a window occupying `frame` in screen coordinates.
    pub fn insert_window(&mut self, frame: Rect) -> NodeId {
        self.insert(Some(self.screen), LocalSurface::window(frame))
    }

    /// Insert a view occupying `frame` in `parent`'s coordinates.
    pub fn insert_view(&mut self, parent: NodeId, frame: Rect) -> NodeId {
        self.insert(Some(parent), LocalSurface::view(frame))
    }

    /// Move `id` (and its subtree) under `new_parent`, or detach it for `None`.
    ///
    /// Attachments in the subtree whose window changes are told before and
    /// after the move. Moving a surface under itself or one of its descendants
    /// is ignored.
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) {
        if !self.is_alive(id) || id == self.screen {
            return;
        }
        if new_parent.is_some_and(|p| is_within_nodes(&self.nodes, p, id)) {
            debug!(?id, ?new_parent, "refusing to reparent a surface into its own subtree");
            return;
        }
        let new_root_window = new_parent
            .filter(|p| self.is_alive(*p))
            .and_then(|p| self.window_node_of(p));
        let parent_on_screen = new_parent.is_some_and(|p| self.is_on_screen(p));
        let moves: Vec<_> = self
            .attachments_within(id)
            .into_iter()
            .filter_map(|(surface, attachment)| {
                let old = self.window_node_of(surface);
                let new = if parent_on_screen {
                    self.window_between(surface, id).or(new_root_window)
                } else {
                    None
                };
                (old != new).then_some((surface, attachment, new))
            })
            .collect();

        for (_, attachment, new) in &moves {
            attachment.will_move_to_window(&*self, new.map(SpaceId::from));
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        if let Some(p) = new_parent
            && self.is_alive(p)
        {
            self.link_parent(id, p);
        }
        self.mark_subtree_dirty(id);
        trace!(?id, ?new_parent, moved = moves.len(), "reparented surface");
        let host: &Self = self;
        for (surface, attachment, _) in &moves {
            let window = host.window_node_of(*surface).map(SpaceId::from);
            attachment.did_move_to_window(host, window);
        }
    }

    /// Remove a surface and its subtree.
    ///
    /// Attachments in the subtree leave their window and are dropped.
    pub fn remove(&mut self, id: NodeId) {
        if !self.is_alive(id) || id == self.screen {
            return;
        }
        let leaving: Vec<_> = self
            .attachments_within(id)
            .into_iter()
            .filter(|(surface, _)| self.window_node_of(*surface).is_some())
            .collect();
        for (_, attachment) in &leaving {
            attachment.will_move_to_window(&*self, None);
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        for (_, attachment) in &leaving {
            attachment.did_move_to_window(&*self, None);
        }
        self.attachments
            .get_mut()
            .retain(|(surface, _)| !is_within_nodes(&self.nodes, *surface, id));
        if self.first_responder.get().is_some_and(|r| is_within_nodes(&self.nodes, r, id)) {
            self.first_responder.set(None);
        }
        if self.key_window.is_some_and(|w| is_within_nodes(&self.nodes, w, id)) {
            self.key_window = None;
        }
        self.free_subtree(id);
    }

    fn free_subtree(&mut self, id: NodeId) {
        let children = self.node(id).children.clone();
        for child in children {
            self.free_subtree(child);
        }
        self.nodes[id.idx()] = None;
        self.free_list.push(id.idx());
    }

    /// Update the local transform.
    pub fn set_transform(&mut self, id: NodeId, tf: Affine) {
        if let Some(n) = self.node_opt_mut(id)
            && n.local.transform != tf
        {
            n.local.transform = tf;
            n.dirty.set(true);
        }
    }

    /// Update the local bounds.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Rect) {
        if let Some(n) = self.node_opt_mut(id)
            && n.local.bounds != bounds
        {
            n.local.bounds = bounds;
            n.dirty.set(true);
        }
    }

    /// Place `id` at `frame` in its parent's coordinates.
    pub fn set_frame(&mut self, id: NodeId, frame: Rect) {
        let placed = LocalSurface::view(frame);
        self.set_transform(id, placed.transform);
        self.set_bounds(id, placed.bounds);
    }

    /// Update the surface flags.
    pub fn set_flags(&mut self, id: NodeId, flags: SurfaceFlags) {
        if let Some(n) = self.node_opt_mut(id) {
            n.local.flags = flags;
        }
    }

    /// Make `window` the key window, or clear it.
    pub fn make_key(&mut self, window: Option<NodeId>) {
        self.key_window = window.filter(|w| self.flags(*w).is_some_and(|f| f.contains(SurfaceFlags::WINDOW)));
    }

    /// The current first responder.
    pub fn first_responder(&self) -> Option<NodeId> {
        self.first_responder.get()
    }

    /// Clear the first responder.
    pub fn resign_first_responder(&self) {
        self.first_responder.set(None);
    }

    /// Number of [`SurfaceHost::layout_if_needed`] requests received so far.
    pub fn layout_requests(&self) -> u64 {
        self.layout_requests.get()
    }

    /// Run the batched update and lay out affected attachments.
    ///
    /// Recomputes world transforms and bounds for every live surface, then
    /// delivers [`SurfaceAttachment::layout`] once to each attachment whose
    /// surface changed or whose anchored window changed.
    pub fn commit(&mut self) -> Relayout {
        self.run_pass()
    }

    /// A pass requested while one is running is absorbed by the running one.
    fn run_pass(&self) -> Relayout {
        let mut relayout = Relayout::default();
        if self.in_pass.replace(true) {
            return relayout;
        }
        let roots: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Some(n) if n.parent.is_none() =>
                {
                    #[allow(
                        clippy::cast_possible_truncation,
                        reason = "NodeId uses 32-bit indices by design."
                    )]
                    Some(NodeId::new(i as u32, n.generation))
                }
                _ => None,
            })
            .collect();
        for root in roots {
            self.update_world(root, &mut relayout.surfaces);
        }

        let attachments: Vec<_> = self.attachments.borrow().clone();
        for (surface, attachment) in attachments {
            let anchored = attachment
                .anchored_window()
                .is_some_and(|w| relayout.surfaces.contains(&NodeId::from(w)));
            if anchored || relayout.surfaces.contains(&surface) {
                attachment.layout(self);
                relayout.deliveries += 1;
            }
        }
        self.in_pass.set(false);
        debug!(
            changed = relayout.surfaces.len(),
            deliveries = relayout.deliveries,
            "ran layout pass"
        );
        relayout
    }

    /// Returns true if `id` refers to a live surface.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .is_some_and(|n| n.generation == id.1)
    }

    /// Returns the parent of a surface if live, or `None` for roots or stale ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id).and_then(|n| n.parent)
    }

    /// Get the children of a surface, or an empty slice if it is stale.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.node_opt(id).map_or(&[], |n| &n.children)
    }

    /// Returns the flags of a surface if live.
    pub fn flags(&self, id: NodeId) -> Option<SurfaceFlags> {
        self.node_opt(id).map(|n| n.local.flags)
    }

    /// Return the world transform of a live surface as of the last layout pass.
    pub fn world_transform(&self, id: NodeId) -> Option<Affine> {
        self.node_opt(id).map(|n| n.world_transform.get())
    }

    /// Number of attachments currently held.
    pub fn attachment_count(&self) -> usize {
        self.attachments.borrow().len()
    }

    // --- internals ---

    fn node_opt(&self, id: NodeId) -> Option<&Node> {
        self.nodes
            .get(id.idx())?
            .as_ref()
            .filter(|n| n.generation == id.1)
    }

    fn node_opt_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    /// Access a node; panics if `id` is stale.
    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.idx()].as_ref().expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.idx()].as_mut().expect("dangling NodeId")
    }

    fn link_parent(&mut self, id: NodeId, parent: NodeId) {
        self.node_mut(parent).children.push(id);
        self.node_mut(id).parent = Some(parent);
    }

    fn unlink_parent(&mut self, id: NodeId, parent: NodeId) {
        self.node_mut(parent).children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
    }

    fn mark_subtree_dirty(&self, id: NodeId) {
        let node = self.node(id);
        node.dirty.set(true);
        for &c in &node.children {
            self.mark_subtree_dirty(c);
        }
    }

    fn update_world(&self, root: NodeId, changed: &mut Vec<NodeId>) {
        let mut stack = vec![(root, Affine::IDENTITY)];
        while let Some((id, parent_tf)) = stack.pop() {
            let node = self.node(id);
            let world = parent_tf * node.local.transform;
            if node.dirty.get() || world != node.world_transform.get() || node.local.bounds != node.bounds.get() {
                changed.push(id);
            }
            node.world_transform.set(world);
            node.bounds.set(node.local.bounds);
            node.dirty.set(false);
            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
    }

    fn is_on_screen(&self, mut id: NodeId) -> bool {
        loop {
            if id == self.screen {
                return true;
            }
            match self.parent_of(id) {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Nearest window at or above `id`, if `id` is on screen.
    fn window_node_of(&self, id: NodeId) -> Option<NodeId> {
        if !self.is_on_screen(id) {
            return None;
        }
        self.window_between(id, self.screen)
    }

    /// Nearest window walking from `id` up to `top` (inclusive).
    fn window_between(&self, mut id: NodeId, top: NodeId) -> Option<NodeId> {
        loop {
            let node = self.node_opt(id)?;
            if node.local.flags.contains(SurfaceFlags::WINDOW) {
                return Some(id);
            }
            if id == top {
                return None;
            }
            id = node.parent?;
        }
    }

    fn attachments_within(&self, top: NodeId) -> Vec<(NodeId, Rc<dyn SurfaceAttachment>)> {
        self.attachments
            .borrow()
            .iter()
            .filter(|(surface, _)| is_within_nodes(&self.nodes, *surface, top))
            .cloned()
            .collect()
    }

    fn live(&self, space: SpaceId) -> Option<NodeId> {
        let id = NodeId::from(space);
        self.is_alive(id).then_some(id)
    }
}

fn is_within_nodes(nodes: &[Option<Node>], mut id: NodeId, top: NodeId) -> bool {
    loop {
        if id == top {
            return true;
        }
        match nodes.get(id.idx()).and_then(Option::as_ref) {
            Some(n) if n.generation == id.1 => match n.parent {
                Some(p) => id = p,
                None => return false,
            },
            _ => return false,
        }
    }
}

impl CoordinateSpace for Tree {
    fn project_rect(&self, rect: Rect, from: SpaceId, to: SpaceId) -> Option<Rect> {
        let from = self.live(from).filter(|id| self.is_on_screen(*id))?;
        let to = self.live(to).filter(|id| self.is_on_screen(*id))?;
        let from_tf = self.node(from).world_transform.get();
        let to_tf = self.node(to).world_transform.get();
        Some(transform_rect_bbox(to_tf.inverse() * from_tf, rect))
    }
}

impl ResponderChain for Tree {
    fn send_action(&self, action: &mut dyn FnMut(ResponderId) -> Outcome) {
        let mut chain: SmallVec<[ResponderId; 8]> = SmallVec::new();
        let mut current = self.first_responder.get().filter(|r| self.is_alive(*r));
        while let Some(id) = current {
            chain.push(id.into());
            current = self.parent_of(id);
        }
        responder::run(&chain, action);
    }

    fn responder_traits(&self, responder: ResponderId) -> Option<ResponderTraits> {
        let flags = self.node_opt(NodeId::from(responder))?.local.flags;
        let mut traits = ResponderTraits::empty();
        traits.set(ResponderTraits::TEXT_INPUT, flags.contains(SurfaceFlags::TEXT_INPUT));
        traits.set(
            ResponderTraits::CAN_BECOME_FIRST_RESPONDER,
            flags.contains(SurfaceFlags::CAN_BECOME_FIRST_RESPONDER),
        );
        Some(traits)
    }

    fn become_first_responder(&self, responder: ResponderId) -> bool {
        let id = NodeId::from(responder);
        let can = self
            .flags(id)
            .is_some_and(|f| f.contains(SurfaceFlags::CAN_BECOME_FIRST_RESPONDER))
            && self.window_node_of(id).is_some();
        if can {
            self.first_responder.set(Some(id));
        }
        can
    }
}

impl SurfaceHost for Tree {
    fn traits(&self) -> HostTraits {
        self.traits
    }

    fn screen(&self) -> Screen {
        Screen {
            space: self.screen.into(),
            bounds: self.node(self.screen).local.bounds,
        }
    }

    fn key_window(&self) -> Option<SpaceId> {
        self.key_window.map(SpaceId::from)
    }

    fn window_of(&self, surface: SpaceId) -> Option<SpaceId> {
        self.window_node_of(self.live(surface)?).map(SpaceId::from)
    }

    fn bounds(&self, surface: SpaceId) -> Option<Rect> {
        self.node_opt(NodeId::from(surface)).map(|n| n.bounds.get())
    }

    fn attach(&self, surface: SpaceId, attachment: Rc<dyn SurfaceAttachment>) {
        let Some(id) = self.live(surface) else {
            return;
        };
        self.attachments.borrow_mut().push((id, attachment.clone()));
        trace!(surface = ?id, "attached to surface");
        if let Some(window) = self.window_node_of(id) {
            attachment.did_move_to_window(self, Some(window.into()));
        }
    }

    /// Runs a full pass; pending geometry anywhere may affect `surface`.
    fn layout_if_needed(&self, surface: SpaceId) {
        self.layout_requests.set(self.layout_requests.get() + 1);
        let relayout = self.run_pass();
        trace!(?surface, changed = relayout.surfaces.len(), "forced layout pass");
    }
}
