use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::types::JewelryKind;

const DEFAULT_ASSET_ROOT: &str = "assets";
const DEFAULT_ASSET_EXTENSION: &str = "png";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CategorySpec {
    pub kind: JewelryKind,
    pub count: usize,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub root: PathBuf,
    pub extension: String,
    pub categories: BTreeMap<String, CategorySpec>,
}

impl CatalogConfig {
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_ASSET_EXTENSION.to_string(),
            categories: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, id: &str, kind: JewelryKind, count: usize) -> Self {
        self.categories
            .insert(id.to_string(), CategorySpec { kind, count });
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn spec(&self, id: &str) -> Option<CategorySpec> {
        self.categories.get(id).copied()
    }

    /// `<root>/<category>/<n>.<ext>`, `index` is 0-based, file names are 1-based.
    pub fn asset_path(&self, category: &str, index: usize) -> PathBuf {
        asset_path_in(&self.root, category, index, &self.extension)
    }
}

fn asset_path_in(root: &Path, category: &str, index: usize, ext: &str) -> PathBuf {
    root.join(category).join(format!("{}.{}", index + 1, ext))
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig::empty(DEFAULT_ASSET_ROOT)
            .with_category("gold_earrings", JewelryKind::Earring, 5)
            .with_category("gold_necklaces", JewelryKind::Necklace, 5)
            .with_category("diamond_earrings", JewelryKind::Earring, 5)
            .with_category("diamond_necklaces", JewelryKind::Necklace, 6)
    }
}

#[derive(Clone, Debug)]
pub struct GestureConfig {
    pub swipe_threshold: f32,
    pub cooldown: Duration,
    pub flash: Duration,
    pub fingertip_index: usize,
    pub knuckle_index: usize,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold: 0.12,
            cooldown: Duration::from_millis(600),
            flash: Duration::from_millis(300),
            fingertip_index: 8,
            knuckle_index: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OverlayConfig {
    pub left_ear_index: usize,
    pub right_ear_index: usize,
    pub neck_index: usize,
    pub earring_scale: f32,
    pub necklace_scale: f32,
    pub necklace_drop: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            left_ear_index: 132,
            right_ear_index: 361,
            neck_index: 152,
            earring_scale: 0.25,
            necklace_scale: 1.2,
            necklace_drop: 0.2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TryAllConfig {
    pub settle: Duration,
}

impl Default for TryAllConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1_800),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub bundle_name: String,
    pub entry_prefix: String,
    pub share_title: String,
    pub share_text: String,
    pub share_url: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            bundle_name: "My_Aurum_Collection.zip".to_string(),
            entry_prefix: "Aurum_Look_".to_string(),
            share_title: "Aurum Atelier".to_string(),
            share_text: "Check out my virtual jewelry looks!".to_string(),
            share_url: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub gesture: GestureConfig,
    pub overlay: OverlayConfig,
    pub try_all: TryAllConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    pub fn with_catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.try_all.settle = settle;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.gesture.cooldown = cooldown;
        self
    }

    pub fn with_share_url(mut self, url: impl Into<String>) -> Self {
        self.export.share_url = url.into();
        self
    }
}
