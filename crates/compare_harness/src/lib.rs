//! Test harness for the comparison overlay layer.
//!
//! Stands in for the two external collaborators the layer integrates with:
//! [`RecordingGl`] plays the rendering context and keeps a ledger of every
//! GPU-side effect, [`StubMap`] plays the host map engine. The layer crate's
//! integration tests drive both; `src/main.rs` runs a headless demo scenario
//! on top of them.

pub mod gl;
pub mod map;

pub use gl::{DrawCall, RecordingGl, TextureId, UniformValue};
pub use map::{RasterSourceSpec, StubMap, StubTile, StubTileCache};
