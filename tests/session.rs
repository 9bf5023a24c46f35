use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use aurum_atelier::{
    AppConfig, Command, Frame, JewelryKind, Landmark, Session, SessionEvent, SessionIo,
    pipeline::{CompositedFrame, DetectorMessage, FixedLandmarks, LandmarkStream},
};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use image::{Rgba, RgbaImage};

const WAIT: Duration = Duration::from_secs(10);

type Stream = (LandmarkStream, Receiver<DetectorMessage>);

fn gold_source() -> Arc<dyn aurum_atelier::AssetSource> {
    Arc::new(|_: &Path| -> anyhow::Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(8, 4, Rgba([255, 215, 0, 255])))
    })
}

struct Harness {
    commands: Sender<Command>,
    events: Receiver<SessionEvent>,
    composited: Receiver<CompositedFrame>,
    running: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Harness {
    fn start(config: AppConfig, stream: Stream) -> Self {
        Self::start_with(config, stream, |_| {})
    }

    /// `setup` runs on the session before its loop starts, ahead of any frame.
    fn start_with(config: AppConfig, stream: Stream, setup: impl FnOnce(&mut Session)) -> Self {
        let (stream, detections) = stream;
        let mut session = Session::new(config, gold_source());
        setup(&mut session);
        let (frame_tx, frame_rx) = bounded(1);
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (composited_tx, composited_rx) = bounded(1);
        let running = Arc::new(AtomicBool::new(true));

        let feeder = {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    if frame_tx.send(Frame::filled(64, 48, [30, 30, 30, 255])).is_err() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };
        let io = SessionIo {
            frames: frame_rx,
            commands: command_rx,
            detections,
            events: event_tx,
            composited: Some(composited_tx),
        };
        let session = thread::spawn(move || session.run(stream, io));

        Self {
            commands: command_tx,
            events: event_rx,
            composited: composited_rx,
            running,
            threads: vec![feeder, session],
        }
    }

    fn wait_for(&self, mut pick: impl FnMut(&SessionEvent) -> bool) -> SessionEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let event = self.events.recv_timeout(left).expect("timed out waiting for event");
            if pick(&event) {
                return event;
            }
        }
    }

    fn shutdown(self) -> Vec<SessionEvent> {
        self.commands.send(Command::Shutdown).unwrap();
        self.running.store(false, Ordering::Relaxed);
        for handle in self.threads {
            handle.join().unwrap();
        }
        self.events.try_iter().collect()
    }
}

fn face_stream(config: &AppConfig) -> Stream {
    let overlay = config.overlay.clone();
    LandmarkStream::start(
        || Ok(FixedLandmarks::absent()),
        move || {
            Ok(FixedLandmarks::centered_face(
                overlay.left_ear_index,
                overlay.right_ear_index,
                overlay.neck_index,
            ))
        },
    )
}

#[test]
fn try_all_run_captures_every_necklace_and_packages() {
    let config = AppConfig::default().with_settle(Duration::from_millis(60));
    let harness = Harness::start(config.clone(), face_stream(&config));

    harness.commands.send(Command::SelectCategory("gold_necklaces".into())).unwrap();
    harness.commands.send(Command::ToggleTryAll).unwrap();

    match harness.wait_for(|e| matches!(e, SessionEvent::TryAllStarted { .. })) {
        SessionEvent::TryAllStarted { category, total } => {
            assert_eq!(category, "gold_necklaces");
            assert_eq!(total, 5);
        }
        _ => unreachable!(),
    }

    let frame = harness.composited.recv_timeout(WAIT).unwrap();
    assert_eq!(frame.image.dimensions(), (64, 48));

    match harness.wait_for(|e| matches!(e, SessionEvent::GalleryReady { .. })) {
        SessionEvent::GalleryReady { count } => assert_eq!(count, 5),
        _ => unreachable!(),
    }

    harness.commands.send(Command::Package).unwrap();
    match harness.wait_for(|e| matches!(e, SessionEvent::Bundle(_))) {
        SessionEvent::Bundle(bundle) => {
            assert_eq!(bundle.file_name, "My_Aurum_Collection.zip");
            assert_eq!(bundle.entries.len(), 5);
            assert_eq!(bundle.entries[0], "Aurum_Look_1.png");
        }
        _ => unreachable!(),
    }

    harness.shutdown();
}

#[test]
fn composited_frames_carry_necklace_overlay() {
    let config = AppConfig::default();
    let harness = Harness::start(config.clone(), face_stream(&config));
    harness
        .commands
        .send(Command::SelectAsset {
            category: "diamond_necklaces".into(),
            index: 2,
        })
        .unwrap();
    harness.wait_for(|e| matches!(e, SessionEvent::Navigated { kind: JewelryKind::Necklace, index: 2 }));

    let deadline = Instant::now() + WAIT;
    let mut found = false;
    while Instant::now() < deadline {
        let frame = harness.composited.recv_timeout(WAIT).unwrap();
        if frame.overlays.iter().any(|o| o.kind == JewelryKind::Necklace) {
            found = true;
            break;
        }
    }
    assert!(found);
    harness.shutdown();
}

#[test]
fn repeated_swipes_inside_cooldown_navigate_once() {
    let config = AppConfig::default().with_cooldown(Duration::from_secs(30));
    let swipe = |_: &Frame| -> anyhow::Result<Vec<Vec<Landmark>>> {
        let mut hand = vec![Landmark::new(0.5, 0.5); 21];
        hand[5] = Landmark::new(0.3, 0.5);
        hand[8] = Landmark::new(0.6, 0.4);
        Ok(vec![hand])
    };
    let stream = LandmarkStream::start(move || Ok(swipe), || Ok(FixedLandmarks::absent()));
    let harness = Harness::start_with(config, stream, |session| {
        session.handle_command(Command::SelectCategory("gold_earrings".into()));
    });

    match harness.wait_for(|e| matches!(e, SessionEvent::Navigated { .. })) {
        SessionEvent::Navigated { kind, index } => {
            assert_eq!(kind, JewelryKind::Earring);
            assert_eq!(index, 0);
        }
        _ => unreachable!(),
    }

    thread::sleep(Duration::from_millis(100));
    let rest = harness.shutdown();
    assert!(!rest.iter().any(|e| matches!(e, SessionEvent::Navigated { .. })));
}

#[test]
fn detector_init_failure_is_reported() {
    let config = AppConfig::default();
    let stream = LandmarkStream::start(
        || -> anyhow::Result<FixedLandmarks> { anyhow::bail!("hand model missing") },
        || Ok(FixedLandmarks::absent()),
    );
    let harness = Harness::start(config, stream);
    match harness.wait_for(|e| matches!(e, SessionEvent::DetectorUnavailable { .. })) {
        SessionEvent::DetectorUnavailable { reason, .. } => assert!(reason.contains("hand model missing")),
        _ => unreachable!(),
    }
    harness.shutdown();
}
