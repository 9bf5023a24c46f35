pub mod catalog;
pub mod config;
pub mod error;
pub mod gallery;
pub mod gesture;
pub mod pipeline;
pub mod sequencer;
pub mod session;
pub mod types;

pub use catalog::{Asset, AssetSource, FileAssetSource, LoadMode, NavigationState};
pub use config::AppConfig;
pub use gallery::{Bundle, Gallery, ShareOutcome, ShareTarget, Snapshot};
pub use session::{Command, Session, SessionEvent, SessionIo};
pub use types::{Frame, JewelryKind, Landmark, NavDirection};
