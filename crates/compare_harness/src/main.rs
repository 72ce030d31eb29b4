//! Headless demo: a full attach → load → swipe → detach run of the
//! comparison overlay against the stub host, logging per-frame draw
//! statistics.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use glam::Mat4;

use compare_harness::{RasterSourceSpec, RecordingGl, StubMap};
use compare_layer::{CompareLayer, MapEvent, Offset, SourceDataKind, TileId};

/// `compare_demo` - sweeps the swipe offset across a synthetic tile grid.
///
/// Everything runs in memory: the host map and the GL context are the test
/// doubles from this crate, so the run exercises the complete layer
/// lifecycle without a window or GPU.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Config {
    /// Number of frames over which the swipe sweeps from hidden to full.
    #[arg(long, env = "COMPARE_FRAMES", default_value_t = 8)]
    frames: u32,

    /// Edge length of the square tile grid to load.
    #[arg(long, env = "COMPARE_GRID", default_value_t = 3)]
    grid: u32,

    /// Number of tiles left without a texture, as if still downloading.
    #[arg(long, env = "COMPARE_PENDING", default_value_t = 1)]
    pending: u32,
}

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    let map = Rc::new(RefCell::new(StubMap::new()));
    let gl = Rc::new(RecordingGl::new());

    let mut layer: CompareLayer<StubMap> = CompareLayer::new(
        "comparison",
        "after",
        RasterSourceSpec::new("https://tiles.example.com/{z}/{x}/{y}.png", 256),
        Offset::HIDDEN,
    );
    layer.attach(&map, &gl)?;

    // Load a square tile grid; the first `pending` tiles stay textureless,
    // as tiles do while their fetch is in flight.
    let mut loaded = 0u32;
    {
        let map_ref = map.borrow();
        for x in 0..config.grid {
            for y in 0..config.grid {
                let index = x * config.grid + y;
                let texture = (index >= config.pending).then(|| gl.mint_texture());
                loaded += u32::from(texture.is_some());
                let proj = Mat4::from_translation(glam::vec3(x as f32, y as f32, 0.0));
                map_ref.insert_tile("after", TileId::new(1, x, y), texture, proj);
            }
        }
        map_ref.notify(&MapEvent::SourceData {
            source_id: "after".into(),
            kind: SourceDataKind::Content,
        });
    }
    log::info!("loaded {loaded}/{} tiles", config.grid * config.grid);

    let matrix = Mat4::IDENTITY;
    let steps = config.frames.max(2);
    let mut drawn_before = 0;
    for frame in 0..steps {
        let fraction = frame as f32 / (steps - 1) as f32;
        layer.update_offset(Offset::new(fraction, fraction));
        layer.prerender(&gl, &matrix);
        layer.render(&gl, &matrix);
        let drawn = gl.draw_call_count();
        log::info!(
            "frame {frame}: offset {fraction:.2}, {} tile draws",
            drawn - drawn_before
        );
        drawn_before = drawn;
    }

    layer.detach();

    if gl.live_objects() != 0 {
        log::error!("{} GPU objects leaked", gl.live_objects());
    } else {
        log::info!(
            "all GPU objects released; {} repaints requested",
            map.borrow().repaint_requests()
        );
    }

    Ok(())
}
