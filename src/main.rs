use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use aurum_atelier::{
    AppConfig, Command, FileAssetSource, Frame, Session, SessionEvent, SessionIo,
    config::CatalogConfig,
    pipeline::{FixedLandmarks, LandmarkStream},
};
use crossbeam_channel::{bounded, unbounded};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn usage() -> String {
    "usage: aurum-atelier <frame.png> <category> [asset-root] [output-dir]".to_string()
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(frame_path), Some(category)) = (args.next(), args.next()) else {
        bail!(usage());
    };
    let asset_root = args.next().map(PathBuf::from);
    let output_dir = args.next().map_or_else(|| PathBuf::from("."), PathBuf::from);

    let image = image::open(&frame_path)
        .with_context(|| format!("failed to open frame {frame_path}"))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let frame = Frame::new(image.into_raw(), width, height);

    let mut catalog = CatalogConfig::default();
    if let Some(root) = asset_root {
        catalog = catalog.with_root(root);
    }
    let config = AppConfig::default().with_catalog(catalog);
    let overlay = config.overlay.clone();

    let session = Session::new(config, Arc::new(FileAssetSource));
    let (stream, detections) = LandmarkStream::start(
        || Ok(FixedLandmarks::absent()),
        move || {
            Ok(FixedLandmarks::centered_face(
                overlay.left_ear_index,
                overlay.right_ear_index,
                overlay.neck_index,
            ))
        },
    );

    let (frame_tx, frame_rx) = bounded(1);
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();

    let running = Arc::new(AtomicBool::new(true));
    let feeder = {
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("frame-feeder".into())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    let mut next = frame.clone();
                    next.timestamp = std::time::Instant::now();
                    if frame_tx.send(next).is_err() {
                        break;
                    }
                    thread::sleep(FRAME_INTERVAL);
                }
            })
            .context("failed to spawn frame feeder")?
    };

    let io = SessionIo {
        frames: frame_rx,
        commands: command_rx,
        detections,
        events: event_tx,
        composited: None,
    };
    let session_thread = thread::Builder::new()
        .name("session".into())
        .spawn(move || session.run(stream, io))
        .context("failed to spawn session")?;

    command_tx.send(Command::SelectCategory(category.clone()))?;
    command_tx.send(Command::ToggleTryAll)?;

    let mut result = Ok(None);
    for event in event_rx.iter() {
        match event {
            SessionEvent::TryAllStarted { category, total } => {
                log::info!("trying on {total} pieces from {category}");
            }
            SessionEvent::Captured { index } => println!("captured look {}", index + 1),
            SessionEvent::GalleryReady { count } => {
                println!("{count} looks ready, packaging");
                command_tx.send(Command::Package)?;
            }
            SessionEvent::Bundle(bundle) => {
                result = bundle.write_to(&output_dir).map(Some).map_err(anyhow::Error::from);
                break;
            }
            SessionEvent::TryAllStopped => break,
            SessionEvent::DetectorUnavailable { kind, reason } => {
                log::warn!("{} tracking unavailable: {reason}", kind.label());
            }
            SessionEvent::Notice(message) => {
                result = Err(anyhow::anyhow!(message));
                break;
            }
            other => log::debug!("{other:?}"),
        }
    }

    let _ = command_tx.send(Command::Shutdown);
    running.store(false, Ordering::Relaxed);
    if session_thread.join().is_err() {
        log::error!("session thread panicked");
    }
    if feeder.join().is_err() {
        log::error!("frame feeder panicked");
    }

    match result? {
        Some(path) => println!("saved {}", path.display()),
        None => println!("nothing captured for {category}"),
    }
    Ok(())
}
