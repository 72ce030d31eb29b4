//! Swipe-comparison overlay layer for raster tile maps.
//!
//! Overlays a second raster tile source on top of a base map inside one
//! rendering surface, revealed within a rectangle anchored at the canvas
//! origin whose right and bottom edges track a normalized two-axis
//! [`Offset`]. Sweeping one axis gives the classic before/after swipe;
//! driving both gives an L-shaped reveal.
//!
//! The crate supplies the layer side only. The host map engine — tile
//! sources, projection, the render loop, the live GL context — is reached
//! through the [`MapHost`]/[`TileCache`] traits, and the host drives the
//! layer through `attach`/`prerender`/`render`/`detach`. GPU work goes
//! through the [`GlApi`] trait, implemented for [`glow::Context`] and for
//! test doubles.
//!
//! Everything is single-threaded and event-driven; no type here is `Send`.

pub mod error;
pub mod gl;
pub mod host;
pub mod layer;
pub mod program;
pub mod shaders;
pub mod state;

pub use error::{AttachError, ProgramError, ShaderStage};
pub use gl::GlApi;
pub use host::{
    ListenerId, MapEvent, MapHost, MapListener, ResizeListener, SourceDataKind, TileCache, TileId,
    VisibleTile,
};
pub use layer::CompareLayer;
pub use program::{ClipProgram, ClipRenderer, OverlayRenderer};
pub use state::{Offset, Viewport};
