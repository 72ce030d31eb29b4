//! The comparison layer controller.
//!
//! Owns the offset state and the GPU program handle, binds to the host's
//! lifecycle notifications on attach, and drives the per-frame draw through
//! the injected [`OverlayRenderer`] strategy.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::Mat4;

use crate::error::AttachError;
use crate::host::{
    ListenerId, MapEvent, MapHost, MapListener, ResizeListener, SourceDataKind, TileCache,
    VisibleTile,
};
use crate::program::{ClipRenderer, OverlayRenderer};
use crate::state::{Offset, Viewport};

/// State the notification closures share with the controller.
struct SharedState<H: MapHost> {
    viewport: Viewport,
    cache: Option<Rc<RefCell<H::Cache>>>,
}

/// Overlays a second raster source on the host map, revealed inside an
/// offset-controlled rectangle so the two sources can be compared in one
/// rendering surface.
///
/// Constructed detached, holding no host or GPU resources. The host's
/// custom-layer mechanism drives it through [`attach`], then
/// [`prerender`]/[`render`] once per displayed frame (same transform matrix
/// for both), then [`detach`]. Application code moves the reveal region
/// with [`update_offset`].
///
/// Detach must be called explicitly before the rendering context goes away;
/// GPU objects are never released from drop glue (the context could not be
/// guaranteed current there).
///
/// [`attach`]: CompareLayer::attach
/// [`prerender`]: CompareLayer::prerender
/// [`render`]: CompareLayer::render
/// [`detach`]: CompareLayer::detach
/// [`update_offset`]: CompareLayer::update_offset
pub struct CompareLayer<H: MapHost, R: OverlayRenderer<H::Gl> = ClipRenderer> {
    id: String,
    source_id: String,
    source_spec: H::SourceSpec,
    renderer: R,
    offset: Offset,
    shared: Rc<RefCell<SharedState<H>>>,
    host: Option<Weak<RefCell<H>>>,
    gl: Option<Rc<H::Gl>>,
    program: Option<R::Program>,
    source_registered: bool,
    map_listener: Option<ListenerId>,
    resize_listener: Option<ListenerId>,
}

impl<H: MapHost> CompareLayer<H, ClipRenderer> {
    /// A detached layer using the default clipped-quad strategy.
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        source_spec: H::SourceSpec,
        initial_offset: Offset,
    ) -> Self {
        Self::with_renderer(id, source_id, source_spec, initial_offset, ClipRenderer)
    }
}

impl<H: MapHost, R: OverlayRenderer<H::Gl>> CompareLayer<H, R> {
    /// A detached layer with an injected rendering strategy. Pure data
    /// capture; nothing can fail here.
    pub fn with_renderer(
        id: impl Into<String>,
        source_id: impl Into<String>,
        source_spec: H::SourceSpec,
        initial_offset: Offset,
        renderer: R,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            source_spec,
            renderer,
            offset: initial_offset,
            shared: Rc::new(RefCell::new(SharedState {
                viewport: Viewport::default(),
                cache: None,
            })),
            host: None,
            gl: None,
            program: None,
            source_registered: false,
            map_listener: None,
            resize_listener: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn is_attached(&self) -> bool {
        self.host.is_some()
    }

    /// Bind to the host map and build the GPU program.
    ///
    /// Ordered side effects: store the host/context references, register
    /// the map-event listener (pan, zoom, and arriving overlay data all
    /// funnel into the tile-refresh action), register the overlay source,
    /// bind its live tile cache, pin the source as in use, run the
    /// strategy's setup, take the initial container measurement, and start
    /// observing resizes.
    ///
    /// Any failure unwinds everything registered so far and leaves the
    /// layer detached.
    pub fn attach(&mut self, host: &Rc<RefCell<H>>, gl: &Rc<H::Gl>) -> Result<(), AttachError> {
        if self.host.is_some() {
            return Err(AttachError::AlreadyAttached);
        }

        self.host = Some(Rc::downgrade(host));
        self.gl = Some(Rc::clone(gl));

        let listener = self.map_event_listener();
        self.map_listener = Some(host.borrow_mut().subscribe(listener));

        // The borrow must end before the error path runs detach, which
        // borrows the host again.
        let registration = host
            .borrow_mut()
            .add_source(&self.source_id, &self.source_spec);
        if let Err(reason) = registration {
            self.detach();
            return Err(AttachError::Source(reason));
        }
        self.source_registered = true;

        // Bind the cache before any tiles load so the initial batch is
        // observed. The host guarantees this is available synchronously
        // after registration.
        let cache = host.borrow().tile_cache(&self.source_id);
        let Some(cache) = cache else {
            self.detach();
            return Err(AttachError::NoTileCache(self.source_id.clone()));
        };
        self.shared.borrow_mut().cache = Some(cache);

        // Sources referenced by no styled layer are not loaded; this
        // layer's draws happen outside style evaluation entirely.
        host.borrow_mut()
            .mark_source_in_use(&self.source_id, &self.id);

        let pixel_ratio = host.borrow().device_pixel_ratio();
        match self.renderer.setup(gl, self.offset, pixel_ratio) {
            Ok(program) => self.program = Some(program),
            Err(err) => {
                self.detach();
                return Err(AttachError::Program(err));
            }
        }

        self.shared.borrow_mut().viewport = host.borrow().container_size();
        let observer = self.resize_observer();
        self.resize_listener = Some(host.borrow_mut().observe_resize(observer));

        log::debug!(
            "layer {}: attached, overlaying source {}",
            self.id,
            self.source_id
        );
        Ok(())
    }

    /// Unbind from the host and release all GPU resources.
    ///
    /// Idempotent and callable at any point, including before attach and
    /// after the host itself was dropped. GPU teardown runs while the
    /// retained context handle is still valid, before the references are
    /// cleared.
    pub fn detach(&mut self) {
        let was_attached = self.host.is_some();

        if let Some(host) = self.host.take().and_then(|weak| weak.upgrade()) {
            let mut host = host.borrow_mut();
            if let Some(id) = self.map_listener.take() {
                host.unsubscribe(id);
            }
            if self.source_registered && host.has_source(&self.source_id) {
                host.remove_source(&self.source_id);
            }
            if let Some(id) = self.resize_listener.take() {
                host.unobserve_resize(id);
            }
        }

        if let Some(program) = self.program.take() {
            if let Some(gl) = self.gl.as_ref() {
                self.renderer.teardown(gl, program);
            }
        }

        self.gl = None;
        self.source_registered = false;
        self.map_listener = None;
        self.resize_listener = None;
        self.shared.borrow_mut().cache = None;

        if was_attached {
            log::debug!("layer {}: detached", self.id);
        }
    }

    /// Early per-frame hook, invoked by the host immediately before
    /// [`render`] with the same transform matrix. Forwards the visible tile
    /// list to the strategy's `prerender`; a no-op while detached.
    ///
    /// [`render`]: CompareLayer::render
    pub fn prerender(&mut self, gl: &H::Gl, matrix: &Mat4) {
        if self.program.is_none() {
            return;
        }
        let tiles = self.visible_tiles();
        self.renderer.prerender(gl, matrix, &tiles);
    }

    /// Per-frame draw submission. Silently skips when no program exists
    /// (never attached, or setup failed); tolerates an empty tile list.
    pub fn render(&mut self, gl: &H::Gl, matrix: &Mat4) {
        let Some(program) = self.program.as_ref() else {
            return;
        };
        let Some(host) = self.host.as_ref().and_then(Weak::upgrade) else {
            return;
        };

        // Re-read the display scale every frame; it changes when the window
        // moves across monitors.
        let pixel_ratio = host.borrow().device_pixel_ratio();
        let viewport = self.shared.borrow().viewport;
        let tiles = self.visible_tiles();

        self.renderer
            .render(gl, matrix, program, &tiles, self.offset, viewport, pixel_ratio);
    }

    /// Replace the offset wholesale and request a repaint.
    ///
    /// No validation: values outside `[0, 1]` pass through and clamp the
    /// reveal to fully hidden or fully visible. Never touches GPU
    /// resources.
    pub fn update_offset(&mut self, offset: Offset) {
        self.offset = offset;
        if let Some(host) = self.host.as_ref().and_then(Weak::upgrade) {
            host.borrow().trigger_repaint();
        }
    }

    fn visible_tiles(&self) -> Vec<VisibleTile<H::Gl>> {
        let Some(cache) = self.shared.borrow().cache.clone() else {
            return Vec::new();
        };
        let cache = cache.borrow();
        cache
            .visible_coordinates()
            .into_iter()
            .filter_map(|id| cache.tile(id))
            .collect()
    }

    fn map_event_listener(&self) -> MapListener<H> {
        let shared = Rc::downgrade(&self.shared);
        let source_id = self.source_id.clone();
        Rc::new(move |host: &H, event: &MapEvent| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            match event {
                MapEvent::Moved | MapEvent::ZoomChanged => refresh_tiles(&shared, host),
                MapEvent::SourceData {
                    source_id: event_source,
                    kind,
                } => {
                    if *kind == SourceDataKind::Content && *event_source == source_id {
                        refresh_tiles(&shared, host);
                    }
                }
            }
        })
    }

    fn resize_observer(&self) -> ResizeListener<H> {
        let shared = Rc::downgrade(&self.shared);
        Rc::new(move |host: &H| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            shared.borrow_mut().viewport = host.container_size();
            host.trigger_repaint();
        })
    }
}

/// The tile-refresh action: have the host cache recompute residency for the
/// current viewport transform. Schedules fetches; draws nothing.
fn refresh_tiles<H: MapHost>(shared: &RefCell<SharedState<H>>, host: &H) {
    let cache = shared.borrow().cache.clone();
    if let Some(cache) = cache {
        cache.borrow_mut().update(&host.view_transform());
    }
}
