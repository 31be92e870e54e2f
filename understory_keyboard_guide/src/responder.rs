// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Responder chain access and first-responder restoration.
//!
//! When an application is backgrounded the host may tear down and rebuild
//! view hierarchies without posting any keyboard notification, so a text field
//! can lose focus while consumers still believe the keyboard is docked. The
//! shared tracker works around this by remembering the first responder when the
//! application enters the background and restoring it on the way back.
//!
//! There is no direct registry of the first responder. Instead a reply probe
//! is sent down the active responder chain with [`ResponderChain::send_action`];
//! whoever receives it first is the first responder.
//!
//! ## Walking a chain
//!
//! Hosts that keep their chain as a list can implement `send_action` with
//! [`run`], which honors [`Outcome::Stop`]:
//!
//! ```
//! use understory_keyboard_guide::responder::{run, Outcome, ResponderId};
//!
//! let chain = [ResponderId(3), ResponderId(2), ResponderId(1)];
//! let mut seen = Vec::new();
//! let stopped = run(&chain, &mut |r| {
//!     seen.push(r);
//!     if r == ResponderId(2) { Outcome::Stop } else { Outcome::Continue }
//! });
//! assert_eq!(stopped, Some(ResponderId(2)));
//! assert_eq!(seen, vec![ResponderId(3), ResponderId(2)]);
//! ```

use core::cell::Cell;

use hashbrown::HashMap;

/// Identifier of a responder (any object that can hold text-input focus).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponderId(pub u64);

bitflags::bitflags! {
    /// Capabilities of a responder.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ResponderTraits: u8 {
        /// The responder accepts text input (text field, text view, …).
        const TEXT_INPUT = 0b0000_0001;
        /// The responder can currently become the first responder.
        const CAN_BECOME_FIRST_RESPONDER = 0b0000_0010;
    }
}

/// Propagation control for actions sent down the responder chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Offer the action to the next responder.
    Continue,
    /// The action was handled; stop walking the chain.
    Stop,
}

/// The host's responder chain.
pub trait ResponderChain {
    /// Offer `action` to the active responder chain, starting with the first
    /// responder and walking outward until it returns [`Outcome::Stop`].
    ///
    /// Does nothing when there is no first responder.
    fn send_action(&self, action: &mut dyn FnMut(ResponderId) -> Outcome);

    /// Capabilities of `responder`, or `None` if it no longer exists.
    fn responder_traits(&self, responder: ResponderId) -> Option<ResponderTraits>;

    /// Ask `responder` to become the first responder. Returns whether it did.
    fn become_first_responder(&self, responder: ResponderId) -> bool;
}

/// Offer `action` to each responder in `chain` in order, honoring stop outcomes.
///
/// Returns the responder that stopped propagation, or `None` if the whole
/// chain was visited.
pub fn run(
    chain: &[ResponderId],
    action: &mut dyn FnMut(ResponderId) -> Outcome,
) -> Option<ResponderId> {
    for &r in chain {
        match action(r) {
            Outcome::Continue => {}
            Outcome::Stop => return Some(r),
        }
    }
    None
}

/// Per-responder opt-in for focus restoration.
///
/// A responder restores by default iff it is [`ResponderTraits::TEXT_INPUT`];
/// explicit overrides take precedence.
#[derive(Clone, Debug, Default)]
pub struct RestorationPolicy {
    overrides: HashMap<ResponderId, bool>,
}

impl RestorationPolicy {
    /// Create a policy with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the default for `responder`; `None` clears the override.
    pub fn set(&mut self, responder: ResponderId, restore: Option<bool>) {
        match restore {
            Some(v) => {
                self.overrides.insert(responder, v);
            }
            None => {
                self.overrides.remove(&responder);
            }
        }
    }

    /// Whether `responder` should be restored as first responder.
    pub fn should_restore(&self, responder: ResponderId, traits: ResponderTraits) -> bool {
        self.overrides
            .get(&responder)
            .copied()
            .unwrap_or_else(|| traits.contains(ResponderTraits::TEXT_INPUT))
    }

    /// Drop the overrides of responders `keep` rejects.
    pub fn retain(&mut self, mut keep: impl FnMut(ResponderId) -> bool) {
        self.overrides.retain(|responder, _| keep(*responder));
    }

    /// Number of explicit overrides.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Whether no override is set.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Finds the current first responder with a reply probe.
#[derive(Debug, Default)]
pub(crate) struct FirstResponderProbe {
    replying: Cell<bool>,
}

impl FirstResponderProbe {
    /// Send the reply probe and return whoever answered.
    ///
    /// A nested call made while a probe is in flight returns `None`.
    pub(crate) fn current(&self, chain: &dyn ResponderChain) -> Option<ResponderId> {
        if self.replying.replace(true) {
            return None;
        }
        let mut replied = None;
        chain.send_action(&mut |r| {
            replied = Some(r);
            Outcome::Stop
        });
        self.replying.set(false);
        replied
    }
}
