// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A minimal constraint model for the bottom edge of a layout guide.
//!
//! Safe-area guides only ever move their bottom edge, so instead of a general
//! solver each guide owns a [`BottomAnchor`]: a small set of constraints on one
//! edge, each relating it to some target edge plus a constant.
//!
//! ## Solving
//!
//! - An active required [`Relation::Equal`] wins outright.
//! - Otherwise an active low-priority equality gives the preferred value,
//!   clamped by every active [`Relation::LessOrEqual`] upper bound.
//! - Otherwise the tightest upper bound is used.
//! - With nothing active (or no resolvable target) the anchor is unconstrained.
//!
//! ## Activation order
//!
//! Two active equalities at the same priority make the edge ambiguous, which a
//! host layout engine treats as a fatal inconsistency. [`BottomAnchor::activate`]
//! reports it as [`LayoutError::Conflict`]; when retargeting an equality,
//! deactivate the old constraint before activating the new one.
//!
//! ```
//! use understory_keyboard_guide::layout::{AnchorTarget, BottomAnchor, Priority, Relation};
//!
//! let mut anchor = BottomAnchor::new();
//! let to_bottom = anchor.add(Relation::Equal, Priority::Required, AnchorTarget::SurfaceBottom);
//! anchor.activate(to_bottom).unwrap();
//! anchor.set_constant(to_bottom, -200.0).unwrap();
//!
//! let bottom = anchor.solve(|target| match target {
//!     AnchorTarget::SurfaceBottom => Some(568.0),
//!     AnchorTarget::Guide(_) => None,
//! });
//! assert_eq!(bottom, Some(368.0));
//! ```

use smallvec::SmallVec;
use thiserror::Error;

/// Which of a provider's two layout guides a constraint refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GuideKind {
    /// Avoids any docked keyboard.
    General,
    /// Avoids only keyboards presented for this application.
    LocalOnly,
}

/// The relation a constraint imposes on the anchored edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `edge == target + constant`
    Equal,
    /// `edge <= target + constant`
    LessOrEqual,
}

/// Constraint priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Satisfied only when it does not contradict a required constraint.
    Low,
    /// Must be satisfied.
    Required,
}

/// The edge a constraint relates the anchor to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnchorTarget {
    /// The bottom edge of the surface that owns the guide.
    SurfaceBottom,
    /// The bottom edge of a provider guide, projected into the owning surface.
    Guide(GuideKind),
}

/// Handle for a constraint within one [`BottomAnchor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintId(u32);

/// Errors raised by constraint misuse.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// Activating the constraint would leave two active equalities at the same
    /// priority on one edge.
    #[error("constraint {new:?} conflicts with active constraint {active:?} at {priority:?} priority")]
    Conflict {
        /// The constraint being activated.
        new: ConstraintId,
        /// The already-active constraint.
        active: ConstraintId,
        /// The shared priority.
        priority: Priority,
    },
    /// The handle does not name a live constraint on this anchor.
    #[error("unknown constraint {0:?}")]
    UnknownConstraint(ConstraintId),
    /// Only inactive constraints can be removed.
    #[error("constraint {0:?} is still active")]
    StillActive(ConstraintId),
}

#[derive(Copy, Clone, Debug)]
struct Constraint {
    relation: Relation,
    priority: Priority,
    target: AnchorTarget,
    constant: f64,
    active: bool,
}

/// The constraint set on one guide's bottom edge.
#[derive(Clone, Debug, Default)]
pub struct BottomAnchor {
    slots: SmallVec<[Option<Constraint>; 4]>,
}

impl BottomAnchor {
    /// Create an anchor with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inactive constraint with a zero constant.
    pub fn add(&mut self, relation: Relation, priority: Priority, target: AnchorTarget) -> ConstraintId {
        let c = Constraint {
            relation,
            priority,
            target,
            constant: 0.0,
            active: false,
        };
        let idx = if let Some(free) = self.slots.iter().position(Option::is_none) {
            self.slots[free] = Some(c);
            free
        } else {
            self.slots.push(Some(c));
            self.slots.len() - 1
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "A guide never carries anywhere near u32::MAX constraints."
        )]
        ConstraintId(idx as u32)
    }

    /// Remove an inactive constraint; its handle may be reused.
    pub fn remove(&mut self, id: ConstraintId) -> Result<(), LayoutError> {
        let c = self.get(id)?;
        if c.active {
            return Err(LayoutError::StillActive(id));
        }
        self.slots[id.0 as usize] = None;
        Ok(())
    }

    /// Activate `id`.
    ///
    /// Fails without changing anything if another equality at the same
    /// priority is active.
    pub fn activate(&mut self, id: ConstraintId) -> Result<(), LayoutError> {
        let c = self.get(id)?;
        if c.active {
            return Ok(());
        }
        if c.relation == Relation::Equal
            && let Some(active) = self.active_equality(c.priority)
        {
            return Err(LayoutError::Conflict {
                new: id,
                active,
                priority: c.priority,
            });
        }
        self.get_mut(id)?.active = true;
        Ok(())
    }

    /// Deactivate `id`. Deactivating an inactive constraint is a no-op.
    pub fn deactivate(&mut self, id: ConstraintId) -> Result<(), LayoutError> {
        self.get_mut(id)?.active = false;
        Ok(())
    }

    /// Whether `id` is live and active.
    pub fn is_active(&self, id: ConstraintId) -> bool {
        self.get(id).is_ok_and(|c| c.active)
    }

    /// Update the constant of `id`. Returns whether it changed.
    pub fn set_constant(&mut self, id: ConstraintId, constant: f64) -> Result<bool, LayoutError> {
        let c = self.get_mut(id)?;
        let changed = c.constant != constant;
        c.constant = constant;
        Ok(changed)
    }

    /// The constant of `id`.
    pub fn constant(&self, id: ConstraintId) -> Result<f64, LayoutError> {
        self.get(id).map(|c| c.constant)
    }

    /// Solve for the anchored edge.
    ///
    /// `resolve` maps each target to its current edge position in the owning
    /// surface's coordinates; unresolvable targets are skipped.
    pub fn solve(&self, resolve: impl Fn(AnchorTarget) -> Option<f64>) -> Option<f64> {
        let mut required = None;
        let mut preferred = None;
        let mut upper: Option<f64> = None;
        for c in self.slots.iter().flatten().filter(|c| c.active) {
            let Some(edge) = resolve(c.target) else {
                continue;
            };
            let value = edge + c.constant;
            match (c.relation, c.priority) {
                (Relation::Equal, Priority::Required) => required = Some(value),
                (Relation::Equal, Priority::Low) => preferred = Some(value),
                (Relation::LessOrEqual, _) => {
                    upper = Some(upper.map_or(value, |u| u.min(value)));
                }
            }
        }
        required.or_else(|| match (preferred, upper) {
            (Some(p), Some(u)) => Some(p.min(u)),
            (p, u) => p.or(u),
        })
    }

    fn active_equality(&self, priority: Priority) -> Option<ConstraintId> {
        self.slots.iter().enumerate().find_map(|(i, c)| match c {
            Some(c) if c.active && c.relation == Relation::Equal && c.priority == priority => {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "Slot indices originate from ConstraintId values."
                )]
                Some(ConstraintId(i as u32))
            }
            _ => None,
        })
    }

    fn get(&self, id: ConstraintId) -> Result<&Constraint, LayoutError> {
        self.slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(LayoutError::UnknownConstraint(id))
    }

    fn get_mut(&mut self, id: ConstraintId) -> Result<&mut Constraint, LayoutError> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(LayoutError::UnknownConstraint(id))
    }
}
