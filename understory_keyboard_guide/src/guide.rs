// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-view safe-area guides.
//!
//! A [`SafeAreaGuide`] gives any view a layout guide that follows the safe
//! area of whichever window the view is currently in. Its bottom edge carries
//! three constraints:
//!
//! - required `== view bottom`, active while the view is in no window;
//! - required `<= view bottom`, active while following a provider;
//! - low-priority `== provider guide bottom`, recreated whenever the provider
//!   or the local-only flag changes.
//!
//! When the link is retargeted the old link is always deactivated before the
//! new one is activated.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};
use core::fmt;

use kurbo::{Insets, Rect};
use tracing::{error, trace};

use crate::layout::{AnchorTarget, BottomAnchor, ConstraintId, GuideKind, LayoutError, Priority, Relation};
use crate::observer::{Bus, Subscription};
use crate::safe_area::{SafeAreaObserver, SafeAreaProvider, SafeAreaRegistry};
use crate::space::{SurfaceAttachment, SurfaceHost};
use crate::types::SpaceId;

#[derive(Debug)]
struct Constraints {
    anchor: BottomAnchor,
    eq_bottom: ConstraintId,
    le_bottom: ConstraintId,
    to_provider: Option<ConstraintId>,
}

/// A layout guide on a view that avoids the keyboard.
pub struct SafeAreaGuide {
    this: Weak<Self>,
    registry: Rc<SafeAreaRegistry>,
    view: SpaceId,
    is_local_only: Cell<bool>,
    provider: RefCell<Option<Rc<SafeAreaProvider>>>,
    provider_subscription: RefCell<Option<Subscription>>,
    constraints: RefCell<Constraints>,
    last_insets: Cell<Insets>,
    observers: Bus<dyn SafeAreaObserver>,
}

impl fmt::Debug for SafeAreaGuide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeAreaGuide")
            .field("view", &self.view)
            .field("is_local_only", &self.is_local_only.get())
            .field("provider", &self.provider.borrow().as_ref().map(|p| p.surface()))
            .field("insets", &self.last_insets.get())
            .finish_non_exhaustive()
    }
}

impl SafeAreaGuide {
    /// Create a guide for `view` and attach it.
    ///
    /// If the view is already in a window the guide starts following that
    /// window's provider immediately.
    pub fn new(registry: Rc<SafeAreaRegistry>, host: &dyn SurfaceHost, view: SpaceId) -> Rc<Self> {
        let mut anchor = BottomAnchor::new();
        let eq_bottom = anchor.add(Relation::Equal, Priority::Required, AnchorTarget::SurfaceBottom);
        let le_bottom = anchor.add(Relation::LessOrEqual, Priority::Required, AnchorTarget::SurfaceBottom);
        if let Err(err) = anchor.activate(eq_bottom) {
            error!(%err, "failed to pin view guide");
        }
        let guide = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            registry,
            view,
            is_local_only: Cell::new(false),
            provider: RefCell::new(None),
            provider_subscription: RefCell::new(None),
            constraints: RefCell::new(Constraints {
                anchor,
                eq_bottom,
                le_bottom,
                to_provider: None,
            }),
            last_insets: Cell::new(Insets::ZERO),
            observers: Bus::new(),
        });
        host.attach(view, guide.clone());
        guide
    }

    /// The view this guide lives on.
    pub fn view(&self) -> SpaceId {
        self.view
    }

    /// The provider currently followed.
    pub fn provider(&self) -> Option<Rc<SafeAreaProvider>> {
        self.provider.borrow().clone()
    }

    /// Whether keyboards of other applications are ignored.
    pub fn is_local_only(&self) -> bool {
        self.is_local_only.get()
    }

    /// Follow the provider's local-only guide instead of its general guide.
    pub fn set_local_only(&self, host: &dyn SurfaceHost, is_local_only: bool) {
        if self.is_local_only.replace(is_local_only) != is_local_only {
            self.update_constraints();
            self.refresh(host);
        }
    }

    /// Register for changes of this guide's insets.
    pub fn subscribe(&self, observer: Weak<dyn SafeAreaObserver>) -> Subscription {
        self.observers.subscribe(observer)
    }

    /// Frame of the guide in the view's coordinates.
    pub fn frame(&self, host: &dyn SurfaceHost) -> Option<Rect> {
        let bounds = host.bounds(self.view)?;
        let provider = self.provider.borrow().clone();
        let bottom = self.constraints.borrow().anchor.solve(|target| match target {
            AnchorTarget::SurfaceBottom => Some(bounds.y1),
            AnchorTarget::Guide(kind) => {
                let provider = provider.as_ref()?;
                let frame = provider.guide_frame(host, kind)?;
                host.project_rect(frame, provider.surface(), self.view)
                    .map(|r| r.y1)
            }
        })?;
        Some(Rect::new(bounds.x0, bounds.y0, bounds.x1, bottom))
    }

    /// Insets from the view's bounds to the guide.
    pub fn insets(&self, host: &dyn SurfaceHost) -> Insets {
        match (host.bounds(self.view), self.frame(host)) {
            (Some(bounds), Some(frame)) => {
                let covered = (bounds.y1 - bounds.y0.max(frame.y1)).max(0.0);
                Insets::new(0.0, 0.0, 0.0, covered)
            }
            _ => Insets::ZERO,
        }
    }

    fn set_provider(&self, host: &dyn SurfaceHost, provider: Option<Rc<SafeAreaProvider>>) {
        let same = match (&*self.provider.borrow(), &provider) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        trace!(view = ?self.view, provider = ?provider.as_ref().map(|p| p.surface()), "guide switching provider");
        let subscription = provider.as_ref().map(|p| {
            let weak: Weak<dyn SafeAreaObserver> = self.this.clone() as Weak<dyn SafeAreaObserver>;
            p.subscribe(weak)
        });
        *self.provider_subscription.borrow_mut() = subscription;
        *self.provider.borrow_mut() = provider;
        self.update_constraints();
        self.refresh(host);
    }

    fn update_constraints(&self) {
        let kind = if self.is_local_only.get() {
            GuideKind::LocalOnly
        } else {
            GuideKind::General
        };
        let attached = self.provider.borrow().is_some();
        let mut constraints = self.constraints.borrow_mut();
        if let Err(err) = constraints.relink(attached.then_some(kind)) {
            error!(%err, view = ?self.view, "failed to retarget view guide");
        }
    }

    /// Re-derive the insets and notify observers if they changed.
    fn refresh(&self, host: &dyn SurfaceHost) {
        let insets = self.insets(host);
        if self.last_insets.replace(insets) != insets {
            self.observers.broadcast(|o| o.safe_area_did_change(host, insets));
        }
    }
}

impl Constraints {
    /// Point the provider link at `target`, or drop it for `None`.
    fn relink(&mut self, target: Option<GuideKind>) -> Result<(), LayoutError> {
        if let Some(old) = self.to_provider.take() {
            self.anchor.deactivate(old)?;
            self.anchor.remove(old)?;
        }
        match target {
            Some(kind) => {
                self.anchor.deactivate(self.eq_bottom)?;
                self.anchor.activate(self.le_bottom)?;
                let link = self.anchor.add(Relation::Equal, Priority::Low, AnchorTarget::Guide(kind));
                self.anchor.activate(link)?;
                self.to_provider = Some(link);
            }
            None => {
                self.anchor.deactivate(self.le_bottom)?;
                self.anchor.activate(self.eq_bottom)?;
            }
        }
        Ok(())
    }
}

impl SurfaceAttachment for SafeAreaGuide {
    fn will_move_to_window(&self, host: &dyn SurfaceHost, new_window: Option<SpaceId>) {
        if new_window.is_none() {
            self.set_provider(host, None);
        }
    }

    fn did_move_to_window(&self, host: &dyn SurfaceHost, window: Option<SpaceId>) {
        if let Some(window) = window {
            let provider = self.registry.provider_for(host, window);
            self.set_provider(host, Some(provider));
        }
    }

    fn layout(&self, host: &dyn SurfaceHost) {
        self.refresh(host);
    }
}

impl SafeAreaObserver for SafeAreaGuide {
    fn safe_area_did_change(&self, host: &dyn SurfaceHost, _insets: Insets) {
        self.refresh(host);
    }
}
