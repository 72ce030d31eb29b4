//! Contracts the host map engine must satisfy for the overlay to integrate.
//!
//! The layer never owns the map: it registers a tile source, subscribes to
//! the host's notification streams, borrows the live tile cache for its
//! source, and is driven through its lifecycle hooks by the host's render
//! loop. Everything here is single-threaded by design, matching a browser
//! style event loop: listeners are plain `Rc` closures and repaint requests
//! go through interior mutability.

use std::rc::Rc;

use glam::Mat4;

use crate::gl::GlApi;
use crate::state::Viewport;

/// Handle returned by listener registration, used to unregister on detach.
pub type ListenerId = u64;

/// Listener on the host's map event stream.
pub type MapListener<H> = Rc<dyn Fn(&H, &MapEvent)>;

/// Listener on the host container's size changes.
pub type ResizeListener<H> = Rc<dyn Fn(&H)>;

/// Notifications the host delivers to registered map listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    /// The viewport moved (pan).
    Moved,
    /// The zoom level changed.
    ZoomChanged,
    /// A tile source received data.
    SourceData {
        source_id: String,
        kind: SourceDataKind,
    },
}

/// Discriminator on source-data events: only [`Content`] indicates new
/// renderable tiles and triggers a refresh; [`Metadata`] is ignored.
///
/// [`Content`]: SourceDataKind::Content
/// [`Metadata`]: SourceDataKind::Metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDataKind {
    Metadata,
    Content,
}

/// Tile coordinate within the source's pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }
}

/// One currently visible tile, as read from the host's tile cache.
///
/// `texture` is `None` while the tile is still in flight; such tiles are
/// skipped by the render hook, never treated as errors.
pub struct VisibleTile<G: GlApi> {
    pub texture: Option<G::Texture>,
    /// Host-supplied matrix placing this tile's quad in the current frame.
    pub proj_matrix: Mat4,
}

impl<G: GlApi> Clone for VisibleTile<G> {
    fn clone(&self) -> Self {
        Self {
            texture: self.texture,
            proj_matrix: self.proj_matrix,
        }
    }
}

impl<G: GlApi> std::fmt::Debug for VisibleTile<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibleTile")
            .field("texture", &self.texture)
            .field("proj_matrix", &self.proj_matrix)
            .finish()
    }
}

/// The host's per-source tile cache.
///
/// Shared with the host and read-only from the layer's perspective: the
/// layer only requests visibility recomputation and reads the resulting
/// tile list, it never mutates tile contents.
pub trait TileCache<G: GlApi> {
    /// Recompute which tiles are resident/loading for the given viewport
    /// transform. Fetch scheduling only; draws nothing.
    fn update(&mut self, transform: &Mat4);

    /// Identifiers of the currently visible tiles, in the host's draw order.
    fn visible_coordinates(&self) -> Vec<TileId>;

    /// Resolve one visible tile. `None` when the identifier is no longer
    /// resident.
    fn tile(&self, id: TileId) -> Option<VisibleTile<G>>;
}

/// The host map engine.
///
/// One non-obvious requirement: [`tile_cache`] must return the live cache
/// synchronously after [`add_source`] succeeds, before any tiles load —
/// binding the layer to the cache up front is what lets it observe the
/// initial tile batch. Hosts that create caches lazily must materialize one
/// during registration.
///
/// Hosts also commonly skip loading tiles for sources no styled layer
/// references; [`mark_source_in_use`] forces that linkage for a layer whose
/// draws happen outside the host's style evaluation.
///
/// [`tile_cache`]: MapHost::tile_cache
/// [`add_source`]: MapHost::add_source
/// [`mark_source_in_use`]: MapHost::mark_source_in_use
pub trait MapHost: Sized + 'static {
    type Gl: GlApi;
    type Cache: TileCache<Self::Gl> + 'static;
    /// Overlay source descriptor; opaque to the layer, validated by the
    /// host during registration.
    type SourceSpec;

    /// Register a tile source. `Err` carries the host's validation message.
    fn add_source(&mut self, id: &str, spec: &Self::SourceSpec) -> Result<(), String>;
    fn remove_source(&mut self, id: &str);
    fn has_source(&self, id: &str) -> bool;

    /// The live tile cache for a registered source.
    fn tile_cache(&self, source_id: &str) -> Option<Rc<std::cell::RefCell<Self::Cache>>>;

    /// Pin a source as used by the given layer so its tiles keep loading.
    fn mark_source_in_use(&mut self, source_id: &str, layer_id: &str);

    /// The current viewport transform, fed to [`TileCache::update`].
    fn view_transform(&self) -> Mat4;

    /// Current container size in device-independent pixels.
    fn container_size(&self) -> Viewport;

    /// Ratio of physical to logical pixels for the current display.
    fn device_pixel_ratio(&self) -> f32;

    /// Request an out-of-cycle redraw.
    fn trigger_repaint(&self);

    fn subscribe(&mut self, listener: MapListener<Self>) -> ListenerId;
    fn unsubscribe(&mut self, id: ListenerId);

    fn observe_resize(&mut self, listener: ResizeListener<Self>) -> ListenerId;
    fn unobserve_resize(&mut self, id: ListenerId);
}
