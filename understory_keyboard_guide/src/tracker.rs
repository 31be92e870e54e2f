// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The keyboard tracker: normalizes host keyboard events into one docked state.
//!
//! ## Event normalization
//!
//! - will-hide clears the state unconditionally.
//! - will-show always recomputes the state from its payload.
//! - will-change-frame only recomputes while a docked state exists; an
//!   undocked (floating or hidden) keyboard ignores frame changes, which would
//!   otherwise make it spuriously reappear.
//!
//! Recomputation discards the event (no state change, no broadcast) when:
//!
//! - `is_local` or the end frame is missing;
//! - the end frame is [`Rect::ZERO`], which hosts post as garbage;
//! - on hosts without an absolute screen space, there is no key window;
//! - the frame width disagrees with the screen width, which happens while the
//!   screen is being reconfigured and is followed by a consistent event.
//!
//! Every accepted event installs a fresh [`KeyboardState`] and broadcasts to
//! all observers, synchronously, after the state has been replaced.
//!
//! ## Host defects
//!
//! On hosts with an absolute screen space the end frame is used as is, except
//! inside an extension on a tablet, where the host shifts the Y origin down and
//! under-reports the height. The magnitude is revealed by a begin frame with a
//! negative height; it is learned once and kept for the tracker's lifetime.
//! Until then [`TrackerConfig::default_extension_adjustment`] is applied.
//!
//! Older hosts report frames with an X origin of `0`; the tracker reprojects
//! them into the key window using the screen origin.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, OnceCell, RefCell};
use core::fmt;

use kurbo::Rect;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::event::{HostEvent, KeyboardEventKind, KeyboardPayload};
use crate::host::ApplicationHost;
use crate::observer::{Bus, Subscription};
use crate::responder::{FirstResponderProbe, ResponderId, ResponderTraits, RestorationPolicy};
use crate::space::SurfaceHost;
use crate::types::{HostTraits, KeyboardState, SpaceId};

/// Receives docked keyboard state changes from a [`KeyboardTracker`].
pub trait KeyboardObserver {
    /// The docked keyboard state was replaced (possibly with `None`).
    fn docked_keyboard_state_did_change(
        &self,
        host: &dyn SurfaceHost,
        tracker: &KeyboardTracker,
        state: Option<&KeyboardState>,
    );
}

bitflags::bitflags! {
    /// Host notifications a tracker consumes once activated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Subscriptions: u8 {
        /// will-show, will-hide, and will-change-frame.
        const KEYBOARD = 0b0000_0001;
        /// entered-background and will-enter-foreground.
        const LIFECYCLE = 0b0000_0010;
    }
}

/// Why a keyboard payload was discarded.
///
/// These are expected host noise; they are logged and never surfaced.
#[derive(Copy, Clone, Debug, Error, PartialEq)]
pub enum Rejection {
    /// The payload lacked a required field.
    #[error("keyboard payload is missing `{0}`")]
    MissingField(&'static str),
    /// The end frame was the zero rectangle.
    #[error("keyboard frame is the zero rectangle")]
    ZeroFrame,
    /// The host needs a key window to interpret the frame and has none.
    #[error("no key window to interpret the keyboard frame")]
    NoKeyWindow,
    /// The screen origin could not be projected into the key window.
    #[error("screen origin cannot be projected into the key window")]
    Unprojectable,
    /// The frame width disagrees with the screen width.
    #[error("keyboard width {frame_width} does not match screen width {screen_width}")]
    WidthMismatch {
        /// Width of the screen.
        screen_width: f64,
        /// Width of the reported frame.
        frame_width: f64,
    },
}

/// Authority for the current docked keyboard placement.
///
/// A cheap, clonable handle; clones share state. It is deliberately neither
/// `Send` nor `Sync`: all use happens on the UI thread.
///
/// Construct a test- or scope-local tracker with [`KeyboardTracker::new`], or
/// use the per-thread [`KeyboardTracker::shared`] instance, which is the only
/// one that also consumes application lifecycle events.
///
/// ```
/// use understory_keyboard_guide::KeyboardTracker;
///
/// let tracker = KeyboardTracker::new();
/// assert!(!tracker.is_active());
/// tracker.activate_application();
/// assert!(tracker.is_active());
/// assert!(tracker.docked_keyboard_state().is_none());
/// ```
#[derive(Clone)]
pub struct KeyboardTracker {
    inner: Rc<TrackerInner>,
}

struct TrackerInner {
    is_shared: bool,
    config: TrackerConfig,
    host: OnceCell<ApplicationHost>,
    subscriptions: Cell<Subscriptions>,
    docked: Cell<Option<KeyboardState>>,
    extension_adjustment: OnceCell<f64>,
    first_responder: FirstResponderProbe,
    last_first_responder: Cell<Option<ResponderId>>,
    restoration: RefCell<RestorationPolicy>,
    observers: Bus<dyn KeyboardObserver>,
}

impl fmt::Debug for KeyboardTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardTracker")
            .field("is_shared", &self.inner.is_shared)
            .field("host", &self.inner.host.get())
            .field("docked", &self.inner.docked.get())
            .field("observers", &self.inner.observers)
            .finish_non_exhaustive()
    }
}

impl Default for KeyboardTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardTracker {
    /// Create an inactive, non-shared tracker with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Create an inactive, non-shared tracker.
    pub fn with_config(config: TrackerConfig) -> Self {
        Self::build(false, config)
    }

    /// The shared tracker of the calling (UI) thread.
    ///
    /// The first call creates it; activation is still explicit.
    #[cfg(feature = "std")]
    pub fn shared() -> Self {
        std::thread_local! {
            static SHARED: KeyboardTracker = KeyboardTracker::build(true, TrackerConfig::default());
        }
        SHARED.with(Clone::clone)
    }

    fn build(is_shared: bool, config: TrackerConfig) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                is_shared,
                config,
                host: OnceCell::new(),
                subscriptions: Cell::new(Subscriptions::empty()),
                docked: Cell::new(None),
                extension_adjustment: OnceCell::new(),
                first_responder: FirstResponderProbe::default(),
                last_first_responder: Cell::new(None),
                restoration: RefCell::new(RestorationPolicy::new()),
                observers: Bus::new(),
            }),
        }
    }

    /// Whether this is the per-thread shared tracker.
    pub fn is_shared(&self) -> bool {
        self.inner.is_shared
    }

    /// The configuration this tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Bind `host` and start consuming events.
    ///
    /// Only the first call has an effect; later calls are ignored, whichever
    /// host they name. Lifecycle events are consumed only by the shared tracker
    /// bound to an [`ApplicationHost::Application`].
    pub fn activate(&self, host: ApplicationHost) {
        if self.inner.host.set(host).is_err() {
            trace!(?host, "keyboard tracker already active");
            return;
        }
        let mut subscriptions = Subscriptions::KEYBOARD;
        if self.inner.is_shared && !host.is_extension() {
            subscriptions |= Subscriptions::LIFECYCLE;
        }
        self.inner.subscriptions.set(subscriptions);
        debug!(?host, ?subscriptions, shared = self.inner.is_shared, "keyboard tracker activated");
    }

    /// Activate for a normal application process.
    pub fn activate_application(&self) {
        self.activate(ApplicationHost::Application);
    }

    /// Activate for an extension process hosted by the view controller whose
    /// root surface is `root`.
    pub fn activate_extension(&self, root: SpaceId) {
        self.activate(ApplicationHost::Extension { root });
    }

    /// Whether [`KeyboardTracker::activate`] has been called.
    pub fn is_active(&self) -> bool {
        self.inner.host.get().is_some()
    }

    /// The bound application host.
    pub fn application_host(&self) -> Option<ApplicationHost> {
        self.inner.host.get().copied()
    }

    /// Host notifications this tracker consumes.
    pub fn subscriptions(&self) -> Subscriptions {
        self.inner.subscriptions.get()
    }

    /// The current docked keyboard state, if any.
    pub fn docked_keyboard_state(&self) -> Option<KeyboardState> {
        self.inner.docked.get()
    }

    /// The extension adjustment learned from the host, if any.
    pub fn learned_extension_adjustment(&self) -> Option<f64> {
        self.inner.extension_adjustment.get().copied()
    }

    /// Register `observer` for state changes.
    ///
    /// The tracker holds it weakly. Keep the returned token to stay
    /// registered, or [`Subscription::detach`] it to stay registered for the
    /// observer's lifetime.
    pub fn add_observer<O: KeyboardObserver + 'static>(&self, observer: &Rc<O>) -> Subscription {
        let weak: Weak<dyn KeyboardObserver> = Rc::downgrade(observer) as Weak<dyn KeyboardObserver>;
        self.inner.observers.subscribe(weak)
    }

    /// Deregister `observer`. Takes effect for every later broadcast.
    pub fn remove_observer<O: KeyboardObserver + ?Sized>(&self, observer: &Rc<O>) {
        self.inner.observers.unsubscribe(Rc::as_ptr(observer));
    }

    /// Number of live registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Override whether `responder` is restored as first responder after
    /// backgrounding; `None` restores the default (text-input responders only).
    ///
    /// Overrides for responders the host no longer knows are dropped on the
    /// next return to the foreground.
    pub fn set_should_restore_first_responder(&self, responder: ResponderId, restore: Option<bool>) {
        self.inner.restoration.borrow_mut().set(responder, restore);
    }

    /// Find the current first responder by probing the responder chain.
    ///
    /// Returns `None` when called re-entrantly from within a probe.
    pub fn current_first_responder(&self, host: &dyn SurfaceHost) -> Option<ResponderId> {
        self.inner.first_responder.current(host)
    }

    /// Feed one host event to the tracker.
    ///
    /// Events are ignored before activation and when their kind is not among
    /// [`KeyboardTracker::subscriptions`].
    pub fn handle_event(&self, host: &dyn SurfaceHost, event: &HostEvent) {
        let subscriptions = self.inner.subscriptions.get();
        match *event {
            HostEvent::Keyboard(kind, payload) if subscriptions.contains(Subscriptions::KEYBOARD) => {
                self.handle_keyboard(host, kind, payload.as_ref());
            }
            HostEvent::DidEnterBackground if subscriptions.contains(Subscriptions::LIFECYCLE) => {
                self.did_enter_background(host);
            }
            HostEvent::WillEnterForeground if subscriptions.contains(Subscriptions::LIFECYCLE) => {
                self.will_enter_foreground(host);
            }
            _ => trace!(?event, "ignoring unsubscribed host event"),
        }
    }

    fn handle_keyboard(&self, host: &dyn SurfaceHost, kind: KeyboardEventKind, payload: Option<&KeyboardPayload>) {
        match kind {
            KeyboardEventKind::WillHide => self.set_docked(host, None),
            KeyboardEventKind::WillShow => self.update_from_payload(host, payload),
            KeyboardEventKind::WillChangeFrame => {
                if self.inner.docked.get().is_some() {
                    self.update_from_payload(host, payload);
                } else {
                    trace!("ignoring frame change of an undocked keyboard");
                }
            }
        }
    }

    fn update_from_payload(&self, host: &dyn SurfaceHost, payload: Option<&KeyboardPayload>) {
        match self.normalize(host, payload) {
            Ok(state) => self.set_docked(host, Some(state)),
            Err(rejection) => trace!(%rejection, "discarding keyboard event"),
        }
    }

    /// Derive a keyboard state from a raw payload.
    fn normalize(&self, host: &dyn SurfaceHost, payload: Option<&KeyboardPayload>) -> Result<KeyboardState, Rejection> {
        let payload = payload.ok_or(Rejection::MissingField("payload"))?;
        let is_local = payload.is_local.ok_or(Rejection::MissingField("is_local"))?;
        let frame = payload.frame_end.ok_or(Rejection::MissingField("frame_end"))?;
        if frame == Rect::ZERO {
            return Err(Rejection::ZeroFrame);
        }

        let app_host = self.inner.host.get().copied().unwrap_or(ApplicationHost::Application);
        let traits = host.traits();
        let screen = host.screen();
        let (space, frame) = if traits.contains(HostTraits::ABSOLUTE_SCREEN_SPACE) {
            let frame = if app_host.is_extension() && traits.contains(HostTraits::TABLET) {
                let adjustment = self.extension_adjustment(payload.frame_begin);
                Rect::new(frame.x0, frame.y0 - adjustment, frame.x1, frame.y1)
            } else {
                frame
            };
            (screen.space, frame)
        } else {
            let window = app_host.key_window(host).ok_or(Rejection::NoKeyWindow)?;
            let origin = host
                .project_rect(Rect::ZERO, screen.space, window)
                .ok_or(Rejection::Unprojectable)?;
            (window, Rect::new(origin.x0, frame.y0, origin.x0 + frame.width(), frame.y1))
        };

        if self.inner.config.reject_width_mismatch && screen.bounds.width() != frame.width() {
            return Err(Rejection::WidthMismatch {
                screen_width: screen.bounds.width(),
                frame_width: frame.width(),
            });
        }
        Ok(KeyboardState::new(is_local, frame, space))
    }

    /// The Y adjustment for extension-hosted tablet frames.
    ///
    /// A begin frame with negative height reveals the real value; the first one
    /// seen is kept.
    fn extension_adjustment(&self, frame_begin: Option<Rect>) -> f64 {
        if let Some(begin) = frame_begin
            && begin.height() < 0.0
            && self.inner.extension_adjustment.set(-begin.height()).is_ok()
        {
            debug!(adjustment = -begin.height(), "learned extension keyboard adjustment");
        }
        self.inner
            .extension_adjustment
            .get()
            .copied()
            .unwrap_or(self.inner.config.default_extension_adjustment)
    }

    fn set_docked(&self, host: &dyn SurfaceHost, state: Option<KeyboardState>) {
        self.inner.docked.set(state);
        debug!(?state, "docked keyboard state changed");
        let notified = self
            .inner
            .observers
            .broadcast(|o| o.docked_keyboard_state_did_change(host, self, state.as_ref()));
        trace!(notified, "broadcast docked keyboard state");
    }

    fn did_enter_background(&self, host: &dyn SurfaceHost) {
        if !self.inner.config.restore_first_responder {
            return;
        }
        let responder = self.current_first_responder(host);
        trace!(?responder, "remembering first responder");
        self.inner.last_first_responder.set(responder);
    }

    fn will_enter_foreground(&self, host: &dyn SurfaceHost) {
        self.inner
            .restoration
            .borrow_mut()
            .retain(|r| host.responder_traits(r).is_some());
        let Some(responder) = self.inner.last_first_responder.take() else {
            return;
        };
        let Some(traits) = host.responder_traits(responder) else {
            return;
        };
        let restore = self.inner.restoration.borrow().should_restore(responder, traits);
        if restore && traits.contains(ResponderTraits::CAN_BECOME_FIRST_RESPONDER) {
            let restored = host.become_first_responder(responder);
            debug!(?responder, restored, "restoring first responder");
        }
    }
}
