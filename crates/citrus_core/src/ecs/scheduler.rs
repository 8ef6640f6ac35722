//! Lifecycle scheduler
//!
//! Drives the per-frame flushes across every pool in registration order:
//!
//! ```text
//! Idle -> CreateSwap -> CreateApply -> Idle -> (action pass)
//!      -> DestroyMark -> DestroySwap -> DestroyApply -> EntityReclaim -> Idle
//! ```
//!
//! Every pool's pending queue is swapped out before any hook runs, and the
//! commands hooks record are applied after the phase that ran them.

use super::element::{ElementRef, GuiGrouping};
use super::world::Manager;
use crate::error::EcsError;

/// Phase the scheduler is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecyclePhase {
    /// Between flushes
    #[default]
    Idle,
    /// Moving pending creations into in-flight buffers
    CreateSwap,
    /// Running construction hooks and payload loads
    CreateApply,
    /// Running per-frame action hooks
    Action,
    /// Queueing the elements of destroyed entities
    DestroyMark,
    /// Moving pending destructions into in-flight buffers
    DestroySwap,
    /// Freeing slots and running destruction hooks
    DestroyApply,
    /// Unlinking and freeing destroyed entities
    EntityReclaim,
}

/// Frame counter and time step handed to hooks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    /// Frames completed so far
    pub frame: u64,
    /// Seconds per frame
    pub time_step: f64,
}

impl FrameClock {
    /// Clock at frame zero
    pub const fn new(time_step: f64) -> Self {
        Self { frame: 0, time_step }
    }

    /// Simulated seconds elapsed
    #[allow(clippy::cast_precision_loss)]
    pub fn time(&self) -> f64 {
        self.frame as f64 * self.time_step
    }
}

/// Outcome of a flush
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Element requests processed
    pub processed: usize,
    /// Entities returned to the free list
    pub entities_reclaimed: usize,
    /// Failures from payload loads and deferred commands
    pub errors: Vec<EcsError>,
}

impl FlushReport {
    /// Whether the flush completed without errors
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: Self) {
        self.processed += other.processed;
        self.entities_reclaimed += other.entities_reclaimed;
        self.errors.extend(other.errors);
    }
}

impl Manager {
    /// Run the create flush: construct every element requested since the last one
    pub fn flush_create(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        self.phase = LifecyclePhase::CreateSwap;
        for pool in self.registry.iter_mut() {
            pool.swap_create();
        }

        self.phase = LifecyclePhase::CreateApply;
        let clock = self.clock;
        for pool in self.registry.iter_mut() {
            pool.flush_create(&self.entities, &mut self.commands, clock, &mut report);
        }
        self.apply_commands(&mut report);

        self.phase = LifecyclePhase::Idle;
        log::debug!(
            "Frame {}: create flush processed {} elements ({} errors)",
            clock.frame,
            report.processed,
            report.errors.len()
        );
        report
    }

    /// Run the action hook over every live element of every enabled kind
    pub fn action(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        self.phase = LifecyclePhase::Action;
        let clock = self.clock;
        for pool in self.registry.iter_mut() {
            pool.action(&self.entities, &mut self.commands, clock);
        }
        self.apply_commands(&mut report);

        self.phase = LifecyclePhase::Idle;
        report
    }

    /// Collect inspector groupings from every live element that provides one
    pub fn render_gui(&self) -> Vec<(ElementRef, GuiGrouping)> {
        self.registry.iter().flat_map(|pool| pool.render_gui()).collect()
    }

    /// Run the destroy flush: free requested elements, then reclaim entities
    pub fn flush_destroy(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        let clock = self.clock;

        // Entities queued by hooks below stay pending for the next flush
        self.phase = LifecyclePhase::DestroyMark;
        let pending = self.entities.take_pending_destroy();
        for &entity in &pending {
            let owned = match self.entities.elements(entity) {
                Ok(owned) => owned.to_vec(),
                Err(err) => {
                    report.errors.push(err);
                    continue;
                }
            };
            for element in owned {
                if let Err(err) = self
                    .registry
                    .pool_mut(element.kind())
                    .and_then(|pool| pool.enqueue_destroy(element))
                {
                    report.errors.push(err);
                }
            }
        }

        self.phase = LifecyclePhase::DestroySwap;
        for pool in self.registry.iter_mut() {
            pool.swap_destroy();
        }

        self.phase = LifecyclePhase::DestroyApply;
        for pool in self.registry.iter_mut() {
            pool.flush_destroy(&mut self.entities, &mut self.commands, clock, &mut report);
        }
        self.apply_commands(&mut report);

        self.phase = LifecyclePhase::EntityReclaim;
        for entity in pending {
            let leftover = self.entities.reclaim(entity);
            for element in leftover {
                // Added after the mark phase; freed on the next destroy flush
                if let Err(err) = self
                    .registry
                    .pool_mut(element.kind())
                    .and_then(|pool| pool.enqueue_destroy(element))
                {
                    report.errors.push(err);
                }
            }
            report.entities_reclaimed += 1;
        }

        self.phase = LifecyclePhase::Idle;
        log::debug!(
            "Frame {}: destroy flush freed {} elements and {} entities",
            clock.frame,
            report.processed,
            report.entities_reclaimed
        );
        for err in &report.errors {
            log::warn!("Flush error: {}", err);
        }
        report
    }

    /// Advance one frame: create flush, action pass, destroy flush
    pub fn step(&mut self) -> FlushReport {
        let mut report = self.flush_create();
        report.merge(self.action());
        report.merge(self.flush_destroy());
        self.clock.frame += 1;
        report
    }

    /// Frames completed so far
    pub const fn frame(&self) -> u64 {
        self.clock.frame
    }

    /// Simulated seconds elapsed
    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    /// Seconds per frame
    pub const fn time_step(&self) -> f64 {
        self.clock.time_step
    }

    /// Ask the frame loop to stop
    pub fn stop(&mut self) {
        log::info!("Stop requested at frame {}", self.clock.frame);
        self.stopped = true;
    }

    /// Whether a stop was requested
    pub const fn stopped(&self) -> bool {
        self.stopped
    }

    /// Phase currently running
    pub const fn phase(&self) -> LifecyclePhase {
        self.phase
    }
}
