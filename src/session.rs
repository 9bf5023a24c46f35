use std::{sync::Arc, time::Instant};

use crossbeam_channel::{Receiver, Sender, never, select};

use crate::{
    catalog::{AssetSource, LoadMode, NavigationState},
    config::AppConfig,
    gallery::{Bundle, Gallery, ShareOutcome, ShareTarget},
    gesture::GestureEngine,
    pipeline::{
        compositor::{CompositedFrame, Compositor},
        detector::{DetectorMessage, LandmarkStream},
    },
    sequencer::{StepOutcome, TryAllSequencer},
    types::{Detection, DetectorKind, Frame, HandIndicator, JewelryKind, Mutator},
};

#[derive(Clone, Debug)]
pub enum Command {
    SelectCategory(String),
    SelectAsset { category: String, index: usize },
    ToggleTryAll,
    StopTryAll,
    SelectSnapshot(usize),
    CloseGallery,
    ClearGallery,
    Package,
    Share,
    Shutdown,
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    HandStatus(HandIndicator),
    Navigated { kind: JewelryKind, index: usize },
    TryAllStarted { category: String, total: usize },
    Captured { index: usize },
    TryAllStopped,
    GalleryReady { count: usize },
    GalleryFocus { index: usize },
    Bundle(Bundle),
    Shared(ShareOutcome),
    /// A detector failed to start; its landmarks will never arrive.
    DetectorUnavailable { kind: DetectorKind, reason: String },
    /// Non-fatal condition the user should see.
    Notice(String),
}

/// Channels the session loop listens on and reports to.
pub struct SessionIo {
    pub frames: Receiver<Frame>,
    pub commands: Receiver<Command>,
    pub detections: Receiver<DetectorMessage>,
    pub events: Sender<SessionEvent>,
    pub composited: Option<Sender<CompositedFrame>>,
}

/// All mutable application state, owned by one thread.
pub struct Session {
    config: AppConfig,
    nav: NavigationState,
    gestures: GestureEngine,
    compositor: Compositor,
    sequencer: TryAllSequencer,
    gallery: Option<Gallery>,
    latest_frame: Option<Frame>,
    hand_indicator: HandIndicator,
    share_target: Option<Box<dyn ShareTarget + Send>>,
}

impl Session {
    pub fn new(config: AppConfig, source: Arc<dyn AssetSource>) -> Self {
        let nav = NavigationState::new(config.catalog.clone(), source);
        Self {
            gestures: GestureEngine::new(config.gesture.clone()),
            compositor: Compositor::new(config.overlay.clone()),
            sequencer: TryAllSequencer::new(config.try_all.clone()),
            nav,
            config,
            gallery: None,
            latest_frame: None,
            hand_indicator: HandIndicator::NotDetected,
            share_target: None,
        }
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.nav = self.nav.with_load_mode(mode);
        self
    }

    pub fn with_share_target(mut self, target: Box<dyn ShareTarget + Send>) -> Self {
        self.share_target = Some(target);
        self
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.nav
    }

    pub fn sequencer(&self) -> &TryAllSequencer {
        &self.sequencer
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn gallery(&self) -> Option<&Gallery> {
        self.gallery.as_ref()
    }

    pub fn hand_indicator(&self) -> HandIndicator {
        self.hand_indicator
    }

    /// Keep the frame as the current base layer and offer it to both detectors.
    pub fn handle_frame(&mut self, frame: Frame, stream: &LandmarkStream) {
        let (hand, face) = stream.offer_all(&frame);
        log::trace!("frame offered: hand={hand} face={face}");
        self.latest_frame = Some(frame);
    }

    pub fn set_frame(&mut self, frame: Frame) {
        self.latest_frame = Some(frame);
    }

    pub fn handle_detection(
        &mut self,
        detection: &Detection,
        now: Instant,
    ) -> (Vec<SessionEvent>, Option<CompositedFrame>) {
        match detection.kind {
            DetectorKind::Hand => (self.on_hand(detection, now), None),
            DetectorKind::Face => (Vec::new(), self.on_face(detection)),
        }
    }

    fn on_hand(&mut self, detection: &Detection, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let outcome = self
            .gestures
            .observe(&detection.landmarks, now, self.sequencer.is_running());

        if let Some(direction) = outcome.event {
            match self.nav.navigate(direction, Mutator::Gesture) {
                Ok(true) => {
                    if let Some(spec) = self.nav.current_spec() {
                        if let Some(index) = self.nav.active_index(spec.kind) {
                            events.push(SessionEvent::Navigated {
                                kind: spec.kind,
                                index,
                            });
                        }
                    }
                }
                Ok(false) => log::debug!("swipe ignored, nothing to navigate"),
                Err(err) => log::debug!("swipe ignored: {err}"),
            }
        }

        let indicator = self.gestures.indicator(now);
        if indicator != self.hand_indicator {
            self.hand_indicator = indicator;
            events.push(SessionEvent::HandStatus(indicator));
        }
        events
    }

    fn on_face(&mut self, detection: &Detection) -> Option<CompositedFrame> {
        let frame = self.latest_frame.as_ref()?;
        let earring = self.nav.active(JewelryKind::Earring).map(Arc::as_ref);
        let necklace = self.nav.active(JewelryKind::Necklace).map(Arc::as_ref);
        let overlays = self
            .compositor
            .compose(frame, &detection.landmarks, earring, necklace)?;

        Some(CompositedFrame {
            image: self.compositor.surface().clone(),
            overlays,
            timestamp: frame.timestamp,
        })
    }

    pub fn handle_command(&mut self, command: Command) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match command {
            Command::SelectCategory(id) => {
                if let Err(err) = self.nav.select_category(&id, Mutator::User) {
                    events.push(SessionEvent::Notice(err.to_string()));
                }
            }
            Command::SelectAsset { category, index } => {
                match self.nav.select_asset(&category, index, Mutator::User) {
                    Ok(()) => {
                        if let Some(spec) = self.nav.catalog().spec(&category) {
                            events.push(SessionEvent::Navigated {
                                kind: spec.kind,
                                index,
                            });
                        }
                    }
                    Err(err) => events.push(SessionEvent::Notice(err.to_string())),
                }
            }
            Command::ToggleTryAll => match self.sequencer.toggle(&mut self.nav) {
                Ok(Some(gallery)) => self.open_gallery(gallery, &mut events),
                Ok(None) if self.sequencer.is_running() => {
                    // The previous run's results are replaced by this one.
                    self.gallery = None;
                    let category = self.nav.current_category().unwrap_or_default().to_string();
                    let total = self.nav.current_assets().map_or(0, <[_]>::len);
                    events.push(SessionEvent::TryAllStarted { category, total });
                }
                Ok(None) => events.push(SessionEvent::TryAllStopped),
                Err(err) => events.push(SessionEvent::Notice(err.to_string())),
            },
            Command::StopTryAll => {
                let was_running = self.sequencer.is_running();
                match self.sequencer.stop(&mut self.nav) {
                    Some(gallery) => self.open_gallery(gallery, &mut events),
                    None if was_running => events.push(SessionEvent::TryAllStopped),
                    None => {}
                }
            }
            Command::SelectSnapshot(index) => match self.gallery.as_mut() {
                Some(gallery) => match gallery.select(index) {
                    Ok(_) => events.push(SessionEvent::GalleryFocus { index }),
                    Err(err) => events.push(SessionEvent::Notice(err.to_string())),
                },
                None => events.push(SessionEvent::Notice("no snapshots yet".to_string())),
            },
            Command::CloseGallery => {
                if let Some(gallery) = self.gallery.as_mut() {
                    gallery.close();
                }
            }
            Command::ClearGallery => {
                self.gallery = None;
                self.sequencer.clear_results();
            }
            Command::Package => match self.gallery.as_ref() {
                Some(gallery) => match gallery.package(&self.config.export) {
                    Ok(bundle) => events.push(SessionEvent::Bundle(bundle)),
                    Err(err) => {
                        log::warn!("packaging failed: {err}");
                        events.push(SessionEvent::Notice(err.to_string()));
                    }
                },
                None => events.push(SessionEvent::Notice("no snapshots to download".to_string())),
            },
            Command::Share => {
                let outcome = match self.gallery.as_ref() {
                    Some(gallery) => gallery.share(
                        self.share_target.as_deref().map(|t| t as &dyn ShareTarget),
                        &self.config.export,
                    ),
                    None => ShareOutcome::Failed("no snapshots to share".to_string()),
                };
                events.push(SessionEvent::Shared(outcome));
            }
            Command::Shutdown => {}
        }
        events
    }

    /// The pending try-all capture is due.
    pub fn handle_capture_due(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match self.sequencer.capture_due(&mut self.nav, &self.compositor) {
            Some(StepOutcome::Advanced { index, captured, .. }) => {
                if captured {
                    events.push(SessionEvent::Captured { index });
                }
            }
            Some(StepOutcome::Finished {
                index,
                captured,
                gallery,
            }) => {
                if captured {
                    events.push(SessionEvent::Captured { index });
                }
                match gallery {
                    Some(gallery) => self.open_gallery(gallery, &mut events),
                    None => events.push(SessionEvent::TryAllStopped),
                }
            }
            None => {}
        }
        events
    }

    fn open_gallery(&mut self, gallery: Gallery, events: &mut Vec<SessionEvent>) {
        let count = gallery.len();
        self.gallery = Some(gallery);
        events.push(SessionEvent::GalleryReady { count });
    }

    /// Event loop. Returns when the frame source or command channel closes, or on `Shutdown`.
    pub fn run(mut self, stream: LandmarkStream, io: SessionIo) {
        let idle = never();
        let mut detectors_gone = false;
        log::info!("session started");

        loop {
            let detections = if detectors_gone { &idle } else { &io.detections };
            let timer = self
                .sequencer
                .pending()
                .map(|pending| pending.timer().clone())
                .unwrap_or_else(never);

            // `None` ends the loop.
            let step: Option<Vec<SessionEvent>> = select! {
                recv(io.frames) -> msg => match msg {
                    Ok(frame) => {
                        self.handle_frame(frame, &stream);
                        Some(Vec::new())
                    }
                    Err(_) => {
                        log::info!("frame source closed");
                        None
                    }
                },
                recv(detections) -> msg => match msg {
                    Ok(DetectorMessage::Result(detection)) => {
                        let (events, composited) = self.handle_detection(&detection, Instant::now());
                        if let (Some(tx), Some(frame)) = (io.composited.as_ref(), composited) {
                            // Drop if the consumer is behind.
                            let _ = tx.try_send(frame);
                        }
                        Some(events)
                    }
                    Ok(DetectorMessage::Unavailable { kind, reason }) => {
                        log::warn!("{} tracking unavailable: {reason}", kind.label());
                        Some(vec![SessionEvent::DetectorUnavailable { kind, reason }])
                    }
                    Err(_) => {
                        log::warn!("all detectors stopped");
                        detectors_gone = true;
                        Some(Vec::new())
                    }
                },
                recv(io.commands) -> msg => match msg {
                    Ok(Command::Shutdown) | Err(_) => None,
                    Ok(command) => Some(self.handle_command(command)),
                },
                recv(timer) -> _ => Some(self.handle_capture_due()),
            };

            let Some(events) = step else {
                break;
            };
            for event in events {
                if io.events.send(event).is_err() {
                    log::debug!("event receiver dropped");
                }
            }
        }

        self.sequencer.stop(&mut self.nav);
        log::info!("session stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        catalog::tests::solid_source,
        types::Landmark,
    };

    fn session() -> Session {
        let config = AppConfig::default().with_settle(Duration::from_millis(5));
        Session::new(config, solid_source()).with_load_mode(LoadMode::Inline)
    }

    fn hand(dx: f32) -> Detection {
        let mut landmarks = vec![Landmark::new(0.5, 0.5); 21];
        landmarks[5] = Landmark::new(0.4, 0.5);
        landmarks[8] = Landmark::new(0.4 + dx, 0.4);
        Detection {
            kind: DetectorKind::Hand,
            landmarks,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn swipe_navigates_current_category() {
        let mut session = session();
        session.handle_command(Command::SelectCategory("gold_earrings".into()));
        let (events, composited) = session.handle_detection(&hand(0.3), Instant::now());
        assert!(composited.is_none());
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Navigated { kind: JewelryKind::Earring, index: 0 }
        )));
        assert_eq!(session.hand_indicator(), HandIndicator::Flash);
    }

    #[test]
    fn gestures_are_inert_during_try_all() {
        let mut session = session();
        session.handle_command(Command::SelectCategory("gold_necklaces".into()));
        session.handle_command(Command::ToggleTryAll);
        assert!(session.sequencer().is_running());

        let (events, _) = session.handle_detection(&hand(-0.3), Instant::now());
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Navigated { .. })));
        assert_eq!(session.navigation().active_index(JewelryKind::Necklace), Some(0));

        let events = session.handle_command(Command::SelectAsset {
            category: "gold_necklaces".into(),
            index: 3,
        });
        assert!(matches!(events[0], SessionEvent::Notice(_)));
    }

    #[test]
    fn toggle_without_category_reports_notice() {
        let mut session = session();
        let events = session.handle_command(Command::ToggleTryAll);
        assert!(matches!(&events[0], SessionEvent::Notice(msg) if msg.contains("category")));
        assert!(!session.sequencer().is_running());
    }

    #[test]
    fn face_results_compose_latest_frame() {
        let mut session = session();
        let detection = Detection {
            kind: DetectorKind::Face,
            landmarks: Vec::new(),
            timestamp: Instant::now(),
        };
        let (_, composited) = session.handle_detection(&detection, Instant::now());
        assert!(composited.is_none());

        let frame = Frame::filled(6, 4, [1, 2, 3, 255]);
        session.set_frame(frame.clone());
        let (_, composited) = session.handle_detection(&detection, Instant::now());
        let composited = composited.unwrap();
        assert!(composited.overlays.is_empty());
        assert_eq!(composited.image.as_raw(), &frame.rgba);
    }

    #[test]
    fn stopping_mid_run_opens_partial_gallery_and_packages() {
        let mut session = session();
        session.set_frame(Frame::filled(6, 4, [1, 2, 3, 255]));
        session.handle_detection(
            &Detection {
                kind: DetectorKind::Face,
                landmarks: Vec::new(),
                timestamp: Instant::now(),
            },
            Instant::now(),
        );
        session.handle_command(Command::SelectCategory("diamond_earrings".into()));
        session.handle_command(Command::ToggleTryAll);
        session.handle_capture_due();
        session.handle_capture_due();

        let events = session.handle_command(Command::StopTryAll);
        assert!(matches!(events[0], SessionEvent::GalleryReady { count: 2 }));

        let events = session.handle_command(Command::Package);
        match &events[0] {
            SessionEvent::Bundle(bundle) => assert_eq!(bundle.entries.len(), 2),
            other => panic!("unexpected event {other:?}"),
        }

        let events = session.handle_command(Command::Share);
        assert!(matches!(events[0], SessionEvent::Shared(ShareOutcome::Unsupported)));
    }

    fn face_cycle(session: &mut Session) -> Option<CompositedFrame> {
        let detection = Detection {
            kind: DetectorKind::Face,
            landmarks: Vec::new(),
            timestamp: Instant::now(),
        };
        session.handle_detection(&detection, Instant::now()).1
    }

    #[test]
    fn new_run_replaces_previous_gallery() {
        let mut session = session();
        session.set_frame(Frame::filled(6, 4, [1, 2, 3, 255]));
        face_cycle(&mut session);
        session.handle_command(Command::SelectCategory("gold_earrings".into()));
        session.handle_command(Command::ToggleTryAll);
        session.handle_capture_due();
        session.handle_capture_due();
        session.handle_command(Command::StopTryAll);
        assert_eq!(session.gallery().map(Gallery::len), Some(2));

        let events = session.handle_command(Command::ToggleTryAll);
        assert!(matches!(events[0], SessionEvent::TryAllStarted { .. }));
        assert!(session.gallery().is_none());

        let events = session.handle_command(Command::Package);
        assert!(matches!(events[0], SessionEvent::Notice(_)));
    }

    #[test]
    fn run_without_frames_reports_no_captures() {
        let mut session = session();
        session.handle_command(Command::SelectCategory("gold_necklaces".into()));
        session.handle_command(Command::ToggleTryAll);

        let mut events = Vec::new();
        while session.sequencer().pending().is_some() {
            events.extend(session.handle_capture_due());
        }
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Captured { .. })));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::GalleryReady { .. })));
        assert!(matches!(events.last(), Some(SessionEvent::TryAllStopped)));
        assert!(session.gallery().is_none());
    }

    #[test]
    fn malformed_frame_is_not_published() {
        let mut session = session();
        session.set_frame(Frame::filled(6, 4, [1, 2, 3, 255]));
        assert!(face_cycle(&mut session).is_some());

        let mut short = Frame::filled(6, 4, [1, 2, 3, 255]);
        short.rgba.pop();
        session.set_frame(short);
        assert!(face_cycle(&mut session).is_none());
        assert_eq!(session.compositor().surface().dimensions(), (0, 0));
    }
}
