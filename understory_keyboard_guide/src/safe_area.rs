// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-surface keyboard safe areas.
//!
//! A [`SafeAreaProvider`] owns two layout guides on one surface (usually a
//! window): a general guide that avoids any docked keyboard, and a local-only
//! guide that avoids only keyboards presented for this application. Each guide
//! spans the surface except for its bottom edge, which a required constraint
//! pins to the surface bottom minus the keyboard overlap.
//!
//! Providers recompute that overlap when
//!
//! - the tracker broadcasts a new docked state. The surface's pending layout
//!   is flushed first, so the overlap is measured against current geometry; or
//! - their [`RelativePositionProbe`] reports a layout pass, meaning the surface
//!   may have moved on screen without any keyboard event. The host is already
//!   laying out, so no extra pass is forced.
//!
//! Insets are never stored; they are re-derived from the guide's solved frame
//! versus the surface bounds.
//!
//! A [`SafeAreaRegistry`] creates providers lazily, one per surface. A
//! provider whose surface leaves its window retires: it stops observing the
//! tracker and its registry forgets it.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::{fmt, ptr};

use hashbrown::HashMap;
use kurbo::{Insets, Rect};
use tracing::{debug, error, trace};

use crate::layout::{AnchorTarget, BottomAnchor, ConstraintId, GuideKind, Priority, Relation};
use crate::observer::{Bus, Subscription};
use crate::probe::{ProbeDelegate, RelativePositionProbe};
use crate::space::SurfaceHost;
use crate::tracker::{KeyboardObserver, KeyboardTracker};
use crate::types::{KeyboardState, SpaceId};

/// Height of the part of `bounds` covered by a keyboard whose frame is
/// `keyboard`, both in the same coordinate space.
///
/// Never negative, and zero once the keyboard's top edge is at or below the
/// bottom of `bounds`.
///
/// ```
/// use kurbo::Rect;
/// use understory_keyboard_guide::compute_inset;
///
/// let surface = Rect::new(0.0, 0.0, 320.0, 568.0);
/// assert_eq!(compute_inset(surface, Rect::new(0.0, 368.0, 320.0, 568.0)), 200.0);
/// assert_eq!(compute_inset(surface, Rect::new(0.0, 600.0, 320.0, 800.0)), 0.0);
/// ```
pub fn compute_inset(bounds: Rect, keyboard: Rect) -> f64 {
    (bounds.y1 - bounds.y0.max(keyboard.y0)).max(0.0)
}

/// Receives safe-area changes from a provider or a per-view guide.
pub trait SafeAreaObserver {
    /// The safe area changed; `insets` are the new effective insets.
    fn safe_area_did_change(&self, host: &dyn SurfaceHost, insets: Insets);
}

/// Snapshot of a surface's keyboard safe area.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SafeAreaGeometry {
    /// Insets avoiding any docked keyboard.
    pub insets: Insets,
    /// Insets avoiding only keyboards presented for this application.
    pub local_only_insets: Insets,
    /// Whether consumers should ignore keyboards of other applications.
    pub is_local_only: bool,
}

impl SafeAreaGeometry {
    /// The insets consumers should honor, given [`SafeAreaGeometry::is_local_only`].
    pub fn effective(&self) -> Insets {
        if self.is_local_only {
            self.local_only_insets
        } else {
            self.insets
        }
    }
}

/// Whether a provider forces the host's pending layout before measuring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayoutPass {
    /// Force a synchronous pass of the surface, then measure.
    Immediate,
    /// Leave it to the pass the host is already running (or will run).
    Deferred,
}

#[derive(Debug)]
struct Guides {
    general: BottomAnchor,
    general_bottom: ConstraintId,
    local_only: BottomAnchor,
    local_only_bottom: ConstraintId,
}

impl Guides {
    fn new() -> Self {
        let (general, general_bottom) = pinned_anchor();
        let (local_only, local_only_bottom) = pinned_anchor();
        Self {
            general,
            general_bottom,
            local_only,
            local_only_bottom,
        }
    }

    fn anchor(&self, kind: GuideKind) -> &BottomAnchor {
        match kind {
            GuideKind::General => &self.general,
            GuideKind::LocalOnly => &self.local_only,
        }
    }

    fn anchor_mut(&mut self, kind: GuideKind) -> (&mut BottomAnchor, ConstraintId) {
        match kind {
            GuideKind::General => (&mut self.general, self.general_bottom),
            GuideKind::LocalOnly => (&mut self.local_only, self.local_only_bottom),
        }
    }
}

fn pinned_anchor() -> (BottomAnchor, ConstraintId) {
    let mut anchor = BottomAnchor::new();
    let bottom = anchor.add(Relation::Equal, Priority::Required, AnchorTarget::SurfaceBottom);
    if let Err(err) = anchor.activate(bottom) {
        error!(%err, "failed to pin safe-area guide");
    }
    (anchor, bottom)
}

type ProviderMap = RefCell<HashMap<SpaceId, Rc<SafeAreaProvider>>>;

/// The keyboard safe area of one surface.
pub struct SafeAreaProvider {
    tracker: KeyboardTracker,
    registry: RefCell<Weak<ProviderMap>>,
    surface: SpaceId,
    guides: RefCell<Guides>,
    is_local_only: Cell<bool>,
    probe: Rc<RelativePositionProbe>,
    subscription: RefCell<Option<Subscription>>,
    observers: Bus<dyn SafeAreaObserver>,
}

impl fmt::Debug for SafeAreaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeAreaProvider")
            .field("surface", &self.surface)
            .field("is_local_only", &self.is_local_only.get())
            .field("probe", &self.probe)
            .finish_non_exhaustive()
    }
}

impl SafeAreaProvider {
    /// Create a provider for `surface`, observe `tracker`, and attach a probe.
    ///
    /// The geometry reflects the tracker's current state right away.
    pub fn new(tracker: &KeyboardTracker, host: &dyn SurfaceHost, surface: SpaceId) -> Rc<Self> {
        let provider = Rc::new_cyclic(|this: &Weak<Self>| {
            let delegate: Weak<dyn ProbeDelegate> = this.clone() as Weak<dyn ProbeDelegate>;
            Self {
                tracker: tracker.clone(),
                registry: RefCell::new(Weak::new()),
                surface,
                guides: RefCell::new(Guides::new()),
                is_local_only: Cell::new(false),
                probe: Rc::new(RelativePositionProbe::new(surface, delegate)),
                subscription: RefCell::new(None),
                observers: Bus::new(),
            }
        });
        *provider.subscription.borrow_mut() = Some(tracker.add_observer(&provider));
        host.attach(surface, provider.probe.clone());
        provider.update(host, LayoutPass::Immediate);
        provider
    }

    /// The surface this provider describes.
    pub fn surface(&self) -> SpaceId {
        self.surface
    }

    /// The tracker this provider follows.
    pub fn tracker(&self) -> &KeyboardTracker {
        &self.tracker
    }

    /// The probe attached to the surface.
    pub fn probe(&self) -> &Rc<RelativePositionProbe> {
        &self.probe
    }

    /// Whether [`SafeAreaProvider::effective_insets`] ignores keyboards of
    /// other applications.
    pub fn is_local_only(&self) -> bool {
        self.is_local_only.get()
    }

    /// Set the local-only flag, notifying observers if it changed.
    pub fn set_local_only(&self, host: &dyn SurfaceHost, is_local_only: bool) {
        if self.is_local_only.replace(is_local_only) != is_local_only {
            self.notify(host);
        }
    }

    /// Whether the provider still follows the tracker.
    ///
    /// Cleared once the surface leaves its window.
    pub fn is_observing(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    /// Register for changes of this provider's geometry.
    pub fn subscribe(&self, observer: Weak<dyn SafeAreaObserver>) -> Subscription {
        self.observers.subscribe(observer)
    }

    /// Recompute both guides from the tracker's current state.
    pub fn update(&self, host: &dyn SurfaceHost, pass: LayoutPass) {
        if pass == LayoutPass::Immediate {
            host.layout_if_needed(self.surface);
        }
        let state = self.tracker.docked_keyboard_state();
        let length = state
            .as_ref()
            .and_then(|s| self.overlap(host, s))
            .unwrap_or(0.0);
        let local_length = if state.is_some_and(|s| s.is_local()) {
            length
        } else {
            0.0
        };

        let changed = {
            let mut guides = self.guides.borrow_mut();
            let general = set_bottom(&mut guides, GuideKind::General, length);
            let local_only = set_bottom(&mut guides, GuideKind::LocalOnly, local_length);
            general || local_only
        };
        trace!(surface = ?self.surface, length, local_length, changed, ?pass, "safe area updated");

        if changed {
            self.notify(host);
        }
    }

    /// Stop following the tracker and leave the registry.
    fn retire(&self) {
        drop(self.subscription.borrow_mut().take());
        let registry = self.registry.replace(Weak::new());
        let removed = registry.upgrade().and_then(|map| {
            let mut providers = map.borrow_mut();
            let current = providers
                .get(&self.surface)
                .is_some_and(|p| ptr::eq(Rc::as_ptr(p), self));
            if current {
                providers.remove(&self.surface)
            } else {
                None
            }
        });
        debug!(surface = ?self.surface, forgotten = removed.is_some(), "retired safe-area provider");
    }

    fn overlap(&self, host: &dyn SurfaceHost, state: &KeyboardState) -> Option<f64> {
        let keyboard = state.frame_in(host, self.surface)?;
        let bounds = host.bounds(self.surface)?;
        Some(compute_inset(bounds, keyboard))
    }

    fn notify(&self, host: &dyn SurfaceHost) {
        let insets = self.effective_insets(host);
        self.observers.broadcast(|o| o.safe_area_did_change(host, insets));
    }

    /// Frame of the `kind` guide in the surface's coordinates, as currently
    /// constrained. Does not run a layout pass.
    pub fn guide_frame(&self, host: &dyn SurfaceHost, kind: GuideKind) -> Option<Rect> {
        let bounds = host.bounds(self.surface)?;
        let bottom = self.guides.borrow().anchor(kind).solve(|target| match target {
            AnchorTarget::SurfaceBottom => Some(bounds.y1),
            AnchorTarget::Guide(_) => None,
        })?;
        Some(Rect::new(bounds.x0, bounds.y0, bounds.x1, bottom))
    }

    fn guide_insets(&self, host: &dyn SurfaceHost, kind: GuideKind) -> Insets {
        match (host.bounds(self.surface), self.guide_frame(host, kind)) {
            (Some(bounds), Some(guide)) => Insets::new(0.0, 0.0, 0.0, bounds.y1 - guide.y1),
            _ => Insets::ZERO,
        }
    }

    /// Insets from the surface bounds to the general guide.
    pub fn insets(&self, host: &dyn SurfaceHost) -> Insets {
        self.guide_insets(host, GuideKind::General)
    }

    /// Insets from the surface bounds to the local-only guide.
    pub fn local_only_insets(&self, host: &dyn SurfaceHost) -> Insets {
        self.guide_insets(host, GuideKind::LocalOnly)
    }

    /// The insets consumers should honor.
    pub fn effective_insets(&self, host: &dyn SurfaceHost) -> Insets {
        self.geometry(host).effective()
    }

    /// Snapshot of this provider's geometry.
    pub fn geometry(&self, host: &dyn SurfaceHost) -> SafeAreaGeometry {
        SafeAreaGeometry {
            insets: self.insets(host),
            local_only_insets: self.local_only_insets(host),
            is_local_only: self.is_local_only.get(),
        }
    }
}

fn set_bottom(guides: &mut Guides, kind: GuideKind, length: f64) -> bool {
    let (anchor, bottom) = guides.anchor_mut(kind);
    anchor.set_constant(bottom, -length).unwrap_or_else(|err| {
        error!(%err, ?kind, "failed to move safe-area guide");
        false
    })
}

impl KeyboardObserver for SafeAreaProvider {
    fn docked_keyboard_state_did_change(
        &self,
        host: &dyn SurfaceHost,
        _tracker: &KeyboardTracker,
        _state: Option<&KeyboardState>,
    ) {
        self.update(host, LayoutPass::Immediate);
    }
}

impl ProbeDelegate for SafeAreaProvider {
    fn probe_did_layout_in_window(&self, host: &dyn SurfaceHost, _probe: &RelativePositionProbe, _window: SpaceId) {
        self.update(host, LayoutPass::Deferred);
    }

    fn probe_did_leave_window(&self, _host: &dyn SurfaceHost, _probe: &RelativePositionProbe) {
        self.retire();
    }
}

/// Lazily created safe-area providers, one per surface.
pub struct SafeAreaRegistry {
    tracker: KeyboardTracker,
    providers: Rc<ProviderMap>,
}

impl fmt::Debug for SafeAreaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeAreaRegistry")
            .field("providers", &self.providers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl SafeAreaRegistry {
    /// Create an empty registry whose providers follow `tracker`.
    pub fn new(tracker: KeyboardTracker) -> Self {
        Self {
            tracker,
            providers: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// The tracker providers follow.
    pub fn tracker(&self) -> &KeyboardTracker {
        &self.tracker
    }

    /// The provider for `surface`, created on first use.
    ///
    /// A provider whose surface left its window is forgotten, so asking again
    /// after the surface rejoins a window creates a fresh one.
    pub fn provider_for(&self, host: &dyn SurfaceHost, surface: SpaceId) -> Rc<SafeAreaProvider> {
        if let Some(provider) = self.get(surface) {
            return provider;
        }
        // Construction calls back into the host; no borrow is held across it.
        let provider = SafeAreaProvider::new(&self.tracker, host, surface);
        *provider.registry.borrow_mut() = Rc::downgrade(&self.providers);
        debug!(?surface, "created safe-area provider");
        self.providers
            .borrow_mut()
            .entry(surface)
            .or_insert(provider)
            .clone()
    }

    /// The provider for `surface`, if one exists.
    pub fn get(&self, surface: SpaceId) -> Option<Rc<SafeAreaProvider>> {
        self.providers.borrow().get(&surface).cloned()
    }

    /// Forget the provider for `surface` without retiring it.
    pub fn remove(&self, surface: SpaceId) -> Option<Rc<SafeAreaProvider>> {
        self.providers.borrow_mut().remove(&surface)
    }

    /// Geometry of `surface`, creating its provider if needed.
    pub fn geometry(&self, host: &dyn SurfaceHost, surface: SpaceId) -> SafeAreaGeometry {
        self.provider_for(host, surface).geometry(host)
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.borrow().len()
    }

    /// Whether no provider has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
