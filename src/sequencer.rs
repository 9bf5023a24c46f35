use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, after};

use crate::{
    catalog::NavigationState,
    config::TryAllConfig,
    error::SequencerError,
    gallery::{Gallery, Snapshot},
    pipeline::compositor::Compositor,
    types::{JewelryKind, Mutator},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Running { index: usize },
    /// Run completed; results stay available until the next run.
    Finished,
}

/// The single delayed capture of one step. Dropping it cancels the capture.
#[derive(Debug)]
pub struct ScheduledCapture {
    index: usize,
    timer: Receiver<Instant>,
}

impl ScheduledCapture {
    fn new(index: usize, settle: Duration) -> Self {
        Self {
            index,
            timer: after(settle),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Fires once when the settle interval has elapsed.
    pub fn timer(&self) -> &Receiver<Instant> {
        &self.timer
    }
}

/// Result of one settle-and-capture step. `captured` is false when the surface could not be
/// encoded, in which case no snapshot was added for `index`.
#[derive(Debug)]
pub enum StepOutcome {
    Advanced {
        index: usize,
        captured: bool,
        next: usize,
    },
    /// The run is over. `gallery` is `None` when it produced no snapshots, as with `stop`.
    Finished {
        index: usize,
        captured: bool,
        gallery: Option<Gallery>,
    },
}

/// Walks every asset of the selected category, waits for the overlay to settle, and captures
/// the compositor output for each one.
pub struct TryAllSequencer {
    settle: Duration,
    state: SequencerState,
    category: Option<String>,
    kind: Option<JewelryKind>,
    snapshots: Vec<Snapshot>,
    pending: Option<ScheduledCapture>,
}

impl TryAllSequencer {
    pub fn new(config: TryAllConfig) -> Self {
        Self {
            settle: config.settle,
            state: SequencerState::Idle,
            category: None,
            kind: None,
            snapshots: Vec::new(),
            pending: None,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SequencerState::Running { .. })
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn pending(&self) -> Option<&ScheduledCapture> {
        self.pending.as_ref()
    }

    pub fn clear_results(&mut self) {
        self.snapshots.clear();
        if self.state == SequencerState::Finished {
            self.state = SequencerState::Idle;
        }
    }

    pub fn start(&mut self, nav: &mut NavigationState) -> Result<(), SequencerError> {
        if self.is_running() {
            return Err(SequencerError::AlreadyRunning);
        }
        let category = nav
            .current_category()
            .ok_or(SequencerError::NoCategory)?
            .to_string();
        let spec = nav.current_spec().ok_or(SequencerError::NoCategory)?;
        let len = nav.current_assets().map_or(0, <[_]>::len);
        if len == 0 {
            return Err(SequencerError::EmptyCatalog(category));
        }

        log::info!("try-all started on {category} ({len} assets)");
        self.snapshots.clear();
        self.category = Some(category);
        self.kind = Some(spec.kind);
        nav.lock(spec.kind);
        self.state = SequencerState::Running { index: 0 };

        if let Err(err) = self.step(nav, 0) {
            self.abort(nav);
            return Err(err);
        }
        Ok(())
    }

    /// Start when idle, stop when running. Stopping returns the partial results, if any.
    pub fn toggle(&mut self, nav: &mut NavigationState) -> Result<Option<Gallery>, SequencerError> {
        if self.is_running() {
            Ok(self.stop(nav))
        } else {
            self.start(nav).map(|()| None)
        }
    }

    /// Cancel the pending capture and return to idle.
    pub fn stop(&mut self, nav: &mut NavigationState) -> Option<Gallery> {
        if !self.is_running() {
            return None;
        }
        self.abort(nav);
        log::info!("try-all stopped after {} captures", self.snapshots.len());

        if self.snapshots.is_empty() {
            None
        } else {
            Some(Gallery::new(self.snapshots.clone()))
        }
    }

    /// Run the capture for the pending step. Does nothing when no capture is scheduled, which
    /// is the case after `stop`.
    pub fn capture_due(
        &mut self,
        nav: &mut NavigationState,
        compositor: &Compositor,
    ) -> Option<StepOutcome> {
        let pending = self.pending.take()?;
        let index = pending.index();

        let captured = match compositor.snapshot() {
            Ok(snapshot) => {
                self.snapshots.push(snapshot);
                log::info!("try-all captured step {index}");
                true
            }
            Err(err) => {
                log::warn!("try-all capture {index} failed: {err}");
                false
            }
        };

        let len = self
            .category
            .as_deref()
            .and_then(|id| nav.assets(id))
            .map_or(0, <[_]>::len);
        let next = index + 1;
        if next >= len {
            nav.unlock();
            log::info!("try-all finished with {} snapshots", self.snapshots.len());
            let gallery = if self.snapshots.is_empty() {
                self.state = SequencerState::Idle;
                None
            } else {
                self.state = SequencerState::Finished;
                Some(Gallery::new(self.snapshots.clone()))
            };
            return Some(StepOutcome::Finished {
                index,
                captured,
                gallery,
            });
        }

        self.state = SequencerState::Running { index: next };
        if let Err(err) = self.step(nav, next) {
            log::warn!("try-all step {next} failed: {err}");
            return Some(StepOutcome::Finished {
                index,
                captured,
                gallery: self.stop(nav),
            });
        }
        Some(StepOutcome::Advanced {
            index,
            captured,
            next,
        })
    }

    fn step(&mut self, nav: &mut NavigationState, index: usize) -> Result<(), SequencerError> {
        let category = self.category.as_deref().ok_or(SequencerError::NoCategory)?;
        nav.select_asset(category, index, Mutator::Sequencer)?;
        self.pending = Some(ScheduledCapture::new(index, self.settle));
        log::debug!("try-all showing {category} #{index}");
        Ok(())
    }

    fn abort(&mut self, nav: &mut NavigationState) {
        self.pending = None;
        nav.unlock();
        self.state = SequencerState::Idle;
    }

    pub fn kind(&self) -> Option<JewelryKind> {
        self.kind
    }
}
