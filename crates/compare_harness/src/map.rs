//! A reference host map for exercising the overlay layer.
//!
//! [`StubMap`] implements the full [`MapHost`] contract — source registry
//! with validation, synchronous tile caches, listener dispatch, repaint
//! counting — over plain in-memory state, and adds the driver methods tests
//! use to move the camera, resize the container, load tiles, and emit
//! notifications.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use glam::Mat4;

use compare_layer::{
    ListenerId, MapEvent, MapHost, MapListener, ResizeListener, TileCache, TileId, Viewport,
    VisibleTile,
};

use crate::gl::{RecordingGl, TextureId};

/// Raster source descriptor understood by the stub host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSourceSpec {
    /// URL template with `{z}/{x}/{y}` placeholders.
    pub tiles_url: String,
    pub tile_size: u32,
}

impl RasterSourceSpec {
    pub fn new(tiles_url: impl Into<String>, tile_size: u32) -> Self {
        Self {
            tiles_url: tiles_url.into(),
            tile_size,
        }
    }
}

/// One tile held by the stub cache. `texture` stays `None` while the tile
/// is notionally still downloading.
#[derive(Debug, Clone, Copy)]
pub struct StubTile {
    pub texture: Option<TextureId>,
    pub proj_matrix: Mat4,
}

/// Tile cache for one registered source.
#[derive(Default)]
pub struct StubTileCache {
    tiles: BTreeMap<TileId, StubTile>,
    /// How many times the layer requested a visibility recompute.
    pub update_count: u32,
    /// Transform supplied with the latest recompute request.
    pub last_transform: Option<Mat4>,
}

impl StubTileCache {
    pub fn insert(&mut self, id: TileId, tile: StubTile) {
        self.tiles.insert(id, tile);
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileCache<RecordingGl> for StubTileCache {
    fn update(&mut self, transform: &Mat4) {
        self.update_count += 1;
        self.last_transform = Some(*transform);
    }

    fn visible_coordinates(&self) -> Vec<TileId> {
        self.tiles.keys().copied().collect()
    }

    fn tile(&self, id: TileId) -> Option<VisibleTile<RecordingGl>> {
        self.tiles.get(&id).map(|tile| VisibleTile {
            texture: tile.texture,
            proj_matrix: tile.proj_matrix,
        })
    }
}

/// In-memory host map.
pub struct StubMap {
    sources: HashMap<String, RasterSourceSpec>,
    caches: HashMap<String, Rc<RefCell<StubTileCache>>>,
    in_use: Vec<(String, String)>,
    listeners: Vec<(ListenerId, MapListener<StubMap>)>,
    resize_observers: Vec<(ListenerId, ResizeListener<StubMap>)>,
    next_listener_id: u64,
    transform: Mat4,
    container: Viewport,
    pixel_ratio: f32,
    repaint_requests: Cell<u32>,
    /// When set, `tile_cache` returns `None` — simulates a host that breaks
    /// the synchronous-after-registration guarantee.
    pub withhold_tile_cache: bool,
}

impl Default for StubMap {
    fn default() -> Self {
        Self::new()
    }
}

impl StubMap {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            caches: HashMap::new(),
            in_use: Vec::new(),
            listeners: Vec::new(),
            resize_observers: Vec::new(),
            next_listener_id: 0,
            transform: Mat4::IDENTITY,
            container: Viewport::new(800.0, 600.0),
            pixel_ratio: 1.0,
            repaint_requests: Cell::new(0),
            withhold_tile_cache: false,
        }
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn set_container(&mut self, container: Viewport) {
        self.container = container;
    }

    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio;
    }

    pub fn repaint_requests(&self) -> u32 {
        self.repaint_requests.get()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn resize_observer_count(&self) -> usize {
        self.resize_observers.len()
    }

    pub fn source_spec(&self, id: &str) -> Option<&RasterSourceSpec> {
        self.sources.get(id)
    }

    pub fn source_in_use(&self, source_id: &str, layer_id: &str) -> bool {
        self.in_use
            .iter()
            .any(|(source, layer)| source == source_id && layer == layer_id)
    }

    /// Put a tile into a registered source's cache.
    pub fn insert_tile(
        &self,
        source_id: &str,
        id: TileId,
        texture: Option<TextureId>,
        proj_matrix: Mat4,
    ) {
        let cache = self
            .caches
            .get(source_id)
            .expect("insert_tile into unregistered source");
        cache.borrow_mut().insert(
            id,
            StubTile {
                texture,
                proj_matrix,
            },
        );
    }

    /// Deliver a map event to every registered listener.
    pub fn notify(&self, event: &MapEvent) {
        let listeners: Vec<_> = self
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self, event);
        }
    }

    /// Fire the container-resize observers.
    pub fn notify_resize(&self) {
        let observers: Vec<_> = self
            .resize_observers
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        for observer in observers {
            observer(self);
        }
    }
}

impl MapHost for StubMap {
    type Gl = RecordingGl;
    type Cache = StubTileCache;
    type SourceSpec = RasterSourceSpec;

    fn add_source(&mut self, id: &str, spec: &RasterSourceSpec) -> Result<(), String> {
        if self.sources.contains_key(id) {
            return Err(format!("source `{id}` is already registered"));
        }
        if spec.tiles_url.is_empty() {
            return Err("tile URL template is empty".into());
        }
        self.sources.insert(id.to_owned(), spec.clone());
        // The cache exists as soon as registration succeeds, before any
        // tiles load.
        self.caches
            .insert(id.to_owned(), Rc::new(RefCell::new(StubTileCache::default())));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) {
        self.sources.remove(id);
        self.caches.remove(id);
        self.in_use.retain(|(source, _)| source != id);
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn tile_cache(&self, source_id: &str) -> Option<Rc<RefCell<StubTileCache>>> {
        if self.withhold_tile_cache {
            return None;
        }
        self.caches.get(source_id).cloned()
    }

    fn mark_source_in_use(&mut self, source_id: &str, layer_id: &str) {
        self.in_use
            .push((source_id.to_owned(), layer_id.to_owned()));
    }

    fn view_transform(&self) -> Mat4 {
        self.transform
    }

    fn container_size(&self) -> Viewport {
        self.container
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn trigger_repaint(&self) {
        self.repaint_requests.set(self.repaint_requests.get() + 1);
    }

    fn subscribe(&mut self, listener: MapListener<Self>) -> ListenerId {
        self.next_listener_id += 1;
        self.listeners.push((self.next_listener_id, listener));
        self.next_listener_id
    }

    fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    fn observe_resize(&mut self, listener: ResizeListener<Self>) -> ListenerId {
        self.next_listener_id += 1;
        self.resize_observers.push((self.next_listener_id, listener));
        self.next_listener_id
    }

    fn unobserve_resize(&mut self, id: ListenerId) {
        self.resize_observers
            .retain(|(listener_id, _)| *listener_id != id);
    }
}
