use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use anyhow::Context;
use image::RgbaImage;

use crate::{
    config::{CatalogConfig, CategorySpec},
    error::NavigationError,
    types::{JewelryKind, Mutator, NavDirection},
};

/// Something that can turn an asset location into pixels.
pub trait AssetSource: Send + Sync + 'static {
    fn load(&self, path: &Path) -> anyhow::Result<RgbaImage>;
}

impl<F> AssetSource for F
where
    F: Fn(&Path) -> anyhow::Result<RgbaImage> + Send + Sync + 'static,
{
    fn load(&self, path: &Path) -> anyhow::Result<RgbaImage> {
        self(path)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FileAssetSource;

impl AssetSource for FileAssetSource {
    fn load(&self, path: &Path) -> anyhow::Result<RgbaImage> {
        let image = image::open(path)
            .with_context(|| format!("failed to open asset {}", path.display()))?;
        Ok(image.to_rgba8())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Decode on the rayon pool; assets stay pending until decoded.
    #[default]
    Background,
    /// Decode on the calling thread.
    Inline,
}

/// Lazily decoded jewelry image. `None` inside the cell means the load failed.
pub struct Asset {
    category: String,
    index: usize,
    path: PathBuf,
    image: OnceLock<Option<RgbaImage>>,
}

impl Asset {
    pub fn pending(category: &str, index: usize, path: PathBuf) -> Self {
        Self {
            category: category.to_string(),
            index,
            path,
            image: OnceLock::new(),
        }
    }

    pub fn ready(category: &str, index: usize, image: RgbaImage) -> Self {
        let asset = Self::pending(category, index, PathBuf::new());
        let fresh = asset.image.set(Some(image)).is_ok();
        debug_assert!(fresh, "new asset cell already filled");
        asset
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ready(&self) -> bool {
        self.image().is_some()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.image.get(), Some(None))
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.get().and_then(Option::as_ref)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image().map(|img| img.dimensions())
    }

    fn resolve(&self, result: anyhow::Result<RgbaImage>) {
        let image = match result {
            Ok(image) if image.width() > 0 && image.height() > 0 => Some(image),
            Ok(_) => {
                log::warn!("asset {} decoded to an empty image", self.path.display());
                None
            }
            Err(err) => {
                log::warn!("failed to load asset: {err:#}");
                None
            }
        };
        // Each asset is resolved by exactly one load task.
        if self.image.set(image).is_err() {
            log::debug!("asset {} resolved twice; keeping the first result", self.path.display());
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("category", &self.category)
            .field("index", &self.index)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// A selectable entry for a view layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetOption {
    pub category: String,
    pub index: usize,
    pub ready: bool,
}

pub struct NavigationState {
    catalog: CatalogConfig,
    source: Arc<dyn AssetSource>,
    load_mode: LoadMode,
    cache: HashMap<String, Vec<Arc<Asset>>>,
    current: Option<String>,
    earring: Option<Arc<Asset>>,
    necklace: Option<Arc<Asset>>,
    locked: Option<JewelryKind>,
}

impl NavigationState {
    pub fn new(catalog: CatalogConfig, source: Arc<dyn AssetSource>) -> Self {
        Self {
            catalog,
            source,
            load_mode: LoadMode::default(),
            cache: HashMap::new(),
            current: None,
            earring: None,
            necklace: None,
            locked: None,
        }
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn catalog(&self) -> &CatalogConfig {
        &self.catalog
    }

    pub fn current_category(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_spec(&self) -> Option<CategorySpec> {
        self.current.as_deref().and_then(|id| self.catalog.spec(id))
    }

    pub fn current_assets(&self) -> Option<&[Arc<Asset>]> {
        self.current
            .as_deref()
            .and_then(|id| self.cache.get(id))
            .map(Vec::as_slice)
    }

    pub fn assets(&self, category: &str) -> Option<&[Arc<Asset>]> {
        self.cache.get(category).map(Vec::as_slice)
    }

    pub fn active(&self, kind: JewelryKind) -> Option<&Arc<Asset>> {
        match kind {
            JewelryKind::Earring => self.earring.as_ref(),
            JewelryKind::Necklace => self.necklace.as_ref(),
        }
    }

    /// Position of the active asset of `kind` within the current category.
    pub fn active_index(&self, kind: JewelryKind) -> Option<usize> {
        let active = self.active(kind)?;
        self.current_assets()?
            .iter()
            .position(|asset| Arc::ptr_eq(asset, active))
    }

    pub fn locked_kind(&self) -> Option<JewelryKind> {
        self.locked
    }

    pub fn options(&self, category: &str) -> Vec<AssetOption> {
        self.assets(category)
            .map(|list| {
                list.iter()
                    .map(|asset| AssetOption {
                        category: category.to_string(),
                        index: asset.index(),
                        ready: asset.is_ready(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn select_category(&mut self, id: &str, by: Mutator) -> Result<(), NavigationError> {
        let spec = self
            .catalog
            .spec(id)
            .ok_or_else(|| NavigationError::UnknownCategory(id.to_string()))?;
        if let Some(kind) = self.locked {
            if by != Mutator::Sequencer {
                return Err(NavigationError::Locked(kind));
            }
        }

        self.ensure_loaded(id, spec);
        self.current = Some(id.to_string());

        // A pointer of this kind that belongs to another category is stale now.
        let list = self.cache.get(id).cloned().unwrap_or_default();
        let slot = self.slot_mut(spec.kind);
        let stale = slot
            .as_ref()
            .is_some_and(|asset| !list.iter().any(|a| Arc::ptr_eq(a, asset)));
        if stale {
            *slot = None;
        }

        log::info!("selected category {id} ({} x{})", spec.kind.label(), spec.count);
        Ok(())
    }

    pub fn select_asset(
        &mut self,
        category: &str,
        index: usize,
        by: Mutator,
    ) -> Result<(), NavigationError> {
        let spec = self
            .catalog
            .spec(category)
            .ok_or_else(|| NavigationError::UnknownCategory(category.to_string()))?;
        self.check_lock(spec.kind, by)?;
        // The active pointer must belong to the current category, so picking from another one
        // switches to it first.
        if self.current.as_deref() != Some(category) {
            self.select_category(category, by)?;
        }

        let list = self
            .cache
            .get(category)
            .ok_or_else(|| NavigationError::NotLoaded(category.to_string()))?;
        let asset = list
            .get(index)
            .cloned()
            .ok_or(NavigationError::IndexOutOfRange {
                category: category.to_string(),
                index,
                len: list.len(),
            })?;
        *self.slot_mut(spec.kind) = Some(asset);
        Ok(())
    }

    /// Step the active asset of the current category's kind. Returns `false` when there is
    /// nothing to navigate (no category or an empty list).
    pub fn navigate(&mut self, direction: NavDirection, by: Mutator) -> Result<bool, NavigationError> {
        let Some(spec) = self.current_spec() else {
            return Ok(false);
        };
        self.check_lock(spec.kind, by)?;
        let Some(list) = self.current_assets() else {
            return Ok(false);
        };
        if list.is_empty() {
            return Ok(false);
        }

        let len = list.len() as isize;
        let idx = self
            .active_index(spec.kind)
            .map(|i| i as isize)
            .unwrap_or(-1);
        let next = ((idx + direction.step() + len) % len) as usize;
        let asset = Arc::clone(&list[next]);
        *self.slot_mut(spec.kind) = Some(asset);
        log::debug!("navigated {} to index {next}", direction.label());
        Ok(true)
    }

    pub fn clear_active(&mut self, kind: JewelryKind) {
        *self.slot_mut(kind) = None;
    }

    pub(crate) fn lock(&mut self, kind: JewelryKind) {
        self.locked = Some(kind);
    }

    pub(crate) fn unlock(&mut self) {
        self.locked = None;
    }

    fn check_lock(&self, kind: JewelryKind, by: Mutator) -> Result<(), NavigationError> {
        match self.locked {
            Some(locked) if locked == kind && by != Mutator::Sequencer => {
                Err(NavigationError::Locked(kind))
            }
            _ => Ok(()),
        }
    }

    fn slot_mut(&mut self, kind: JewelryKind) -> &mut Option<Arc<Asset>> {
        match kind {
            JewelryKind::Earring => &mut self.earring,
            JewelryKind::Necklace => &mut self.necklace,
        }
    }

    fn ensure_loaded(&mut self, id: &str, spec: CategorySpec) {
        if self.cache.contains_key(id) {
            return;
        }

        log::info!("loading {} assets for {id}", spec.count);
        let list: Vec<Arc<Asset>> = (0..spec.count)
            .map(|index| Arc::new(Asset::pending(id, index, self.catalog.asset_path(id, index))))
            .collect();

        for asset in &list {
            let asset = Arc::clone(asset);
            let source = Arc::clone(&self.source);
            match self.load_mode {
                LoadMode::Background => {
                    rayon::spawn(move || asset.resolve(source.load(asset.path())));
                }
                LoadMode::Inline => asset.resolve(source.load(asset.path())),
            }
        }

        self.cache.insert(id.to_string(), list);
    }
}
