use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::types::{Detection, DetectorKind, Frame, Landmark};

pub const FACE_LANDMARKS: usize = 468;

/// External landmark model. Returns one landmark list per detected subject, empty when nothing
/// was found.
pub trait LandmarkDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Vec<Landmark>>>;
}

impl<F> LandmarkDetector for F
where
    F: FnMut(&Frame) -> anyhow::Result<Vec<Vec<Landmark>>> + Send + 'static,
{
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Vec<Landmark>>> {
        self(frame)
    }
}

/// Detector that reports the same subject on every frame.
#[derive(Clone, Debug, Default)]
pub struct FixedLandmarks {
    points: Vec<Landmark>,
}

impl FixedLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    /// Never detects anything.
    pub fn absent() -> Self {
        Self::default()
    }

    /// A frontal face filling the middle of the frame, with only the anchor points that the
    /// overlay reads placed meaningfully.
    pub fn centered_face(left_ear: usize, right_ear: usize, neck: usize) -> Self {
        let mut points = vec![Landmark::new(0.5, 0.45); FACE_LANDMARKS];
        if let Some(p) = points.get_mut(left_ear) {
            *p = Landmark::new(0.38, 0.48);
        }
        if let Some(p) = points.get_mut(right_ear) {
            *p = Landmark::new(0.62, 0.48);
        }
        if let Some(p) = points.get_mut(neck) {
            *p = Landmark::new(0.5, 0.62);
        }
        Self { points }
    }
}

impl LandmarkDetector for FixedLandmarks {
    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Vec<Landmark>>> {
        if self.points.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![self.points.clone()])
        }
    }
}

#[derive(Clone, Debug)]
pub enum DetectorMessage {
    Result(Detection),
    /// The detector could not be initialised; this kind stays inert.
    Unavailable { kind: DetectorKind, reason: String },
}

/// One detector kind behind an in-flight guard.
///
/// A frame is handed over only while no call is in flight; otherwise it is dropped for this
/// kind. The guard is cleared when the result is produced, whatever the outcome.
pub struct DetectorSlot {
    kind: DetectorKind,
    busy: Arc<AtomicBool>,
    dropped: AtomicU64,
    frame_tx: Sender<Frame>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DetectorSlot {
    pub fn spawn<D, I>(kind: DetectorKind, init: I, result_tx: Sender<DetectorMessage>) -> Self
    where
        D: LandmarkDetector,
        I: FnOnce() -> anyhow::Result<D> + Send + 'static,
    {
        let (frame_tx, frame_rx) = bounded(1);
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = Arc::clone(&busy);

        let handle = thread::Builder::new()
            .name(format!("{}-detector", kind.label()))
            .spawn(move || match init() {
                Ok(detector) => {
                    log::info!("{} detector ready", kind.label());
                    run_worker_loop(kind, detector, frame_rx, worker_busy, result_tx);
                }
                Err(err) => {
                    log::error!("failed to start {} detector: {err:?}", kind.label());
                    let _ = result_tx.send(DetectorMessage::Unavailable {
                        kind,
                        reason: format!("{err:#}"),
                    });
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("failed to spawn {} detector thread: {err}", kind.label());
                None
            }
        };

        Self {
            kind,
            busy,
            dropped: AtomicU64::new(0),
            frame_tx,
            handle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn offer(&self, frame: &Frame) -> bool {
        if self.busy.swap(true, Ordering::AcqRel) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("{} detector busy, frame dropped", self.kind.label());
            return false;
        }

        match self.frame_tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => {
                // Worker is gone; leave the guard set so this kind stays inert.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl Drop for DetectorSlot {
    fn drop(&mut self) {
        // Closing the frame channel ends the worker loop once the in-flight call returns.
        let (closed_tx, _) = bounded(0);
        drop(std::mem::replace(&mut self.frame_tx, closed_tx));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker_loop<D: LandmarkDetector>(
    kind: DetectorKind,
    mut detector: D,
    frame_rx: Receiver<Frame>,
    busy: Arc<AtomicBool>,
    result_tx: Sender<DetectorMessage>,
) {
    while let Ok(frame) = frame_rx.recv() {
        let landmarks = match detector.detect(&frame) {
            Ok(subjects) => subjects.into_iter().next().unwrap_or_default(),
            Err(err) => {
                log::warn!("{} detection failed: {err:?}", kind.label());
                Vec::new()
            }
        };

        busy.store(false, Ordering::Release);
        let detection = Detection {
            kind,
            landmarks,
            timestamp: frame.timestamp,
        };
        if result_tx.send(DetectorMessage::Result(detection)).is_err() {
            break;
        }
    }
    log::debug!("{} detector worker stopped", kind.label());
}

/// Fans frames out to the hand and face detectors, each behind its own in-flight guard.
pub struct LandmarkStream {
    hand: DetectorSlot,
    face: DetectorSlot,
}

impl LandmarkStream {
    pub fn new(hand: DetectorSlot, face: DetectorSlot) -> Self {
        Self { hand, face }
    }

    pub fn start<H, HI, F, FI>(hand_init: HI, face_init: FI) -> (Self, Receiver<DetectorMessage>)
    where
        H: LandmarkDetector,
        HI: FnOnce() -> anyhow::Result<H> + Send + 'static,
        F: LandmarkDetector,
        FI: FnOnce() -> anyhow::Result<F> + Send + 'static,
    {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let hand = DetectorSlot::spawn(DetectorKind::Hand, hand_init, result_tx.clone());
        let face = DetectorSlot::spawn(DetectorKind::Face, face_init, result_tx);
        (Self::new(hand, face), result_rx)
    }

    pub fn slot(&self, kind: DetectorKind) -> &DetectorSlot {
        match kind {
            DetectorKind::Hand => &self.hand,
            DetectorKind::Face => &self.face,
        }
    }

    pub fn offer(&self, frame: &Frame, kind: DetectorKind) -> bool {
        self.slot(kind).offer(frame)
    }

    /// Offer the frame to both detectors; returns which ones accepted it.
    pub fn offer_all(&self, frame: &Frame) -> (bool, bool) {
        (
            self.offer(frame, DetectorKind::Hand),
            self.offer(frame, DetectorKind::Face),
        )
    }
}
