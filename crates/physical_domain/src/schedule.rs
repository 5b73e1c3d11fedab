//! Periodic tick scheduling.
//!
//! The domain drives itself by sending a [`TickOp`] to its container, timed one tick
//! ahead. When the op comes back, [`PhysicalDomain::handle_tick_op`] ticks by the time that
//! actually elapsed since the previous op and hands out the next one.

use serde::{Deserialize, Serialize};

use crate::domain::PhysicalDomain;
use crate::entity::EntityId;

/// Argument marking a tick op as addressed to the physical domain.
pub const TICK_ARG: &str = "domain";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOp {
    pub to: EntityId,
    pub arg: String,
    /// Simulated time at which the op should be delivered.
    pub seconds: f64,
    /// Delivery time of the previous tick op, if any.
    pub last_tick: Option<f64>,
}

impl PhysicalDomain {
    /// First tick op for a domain created at `now`.
    pub fn schedule_tick(&self, now: f64) -> TickOp {
        TickOp {
            to: self.container_id(),
            arg: TICK_ARG.to_string(),
            seconds: now + self.config().tick_size,
            last_tick: None,
        }
    }

    /// Ticks the domain for an incoming op and returns the follow-up. Ops meant for
    /// something else are ignored.
    pub fn handle_tick_op(&mut self, op: &TickOp) -> Option<TickOp> {
        if op.arg != TICK_ARG || op.to != self.container_id() {
            return None;
        }
        let tick_size = match op.last_tick {
            Some(last) if op.seconds > last => op.seconds - last,
            _ => self.config().tick_size,
        };
        self.tick(tick_size);

        Some(TickOp {
            to: op.to,
            arg: TICK_ARG.to_string(),
            seconds: op.seconds + self.config().tick_size,
            last_tick: Some(op.seconds),
        })
    }
}
