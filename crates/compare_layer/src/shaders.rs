//! GLSL source for the overlay program.

/// Width/height of one tile's internal coordinate system. Vertex positions
/// arrive as a unit quad and are scaled by this before the per-tile matrix
/// is applied; the value must match the host's tile coordinate precision
/// exactly or tiles misalign. The literal in [`VERTEX`] mirrors this
/// constant.
pub const TILE_EXTENT: f32 = 8192.0;

/// Vertex stage: unit quad into world space via the per-tile matrix, with
/// the quad-local texture coordinate and both reveal thresholds forwarded
/// unchanged.
pub const VERTEX: &str = r#"
uniform mat4 u_matrix;
uniform float u_offset_x;
uniform float u_offset_y;

attribute vec2 a_pos;

varying vec2 v_tex_pos;
varying float v_offset_x;
varying float v_offset_y;

void main() {
    gl_Position = u_matrix * vec4(a_pos * 8192.0, 0.0, 1.0);
    v_tex_pos = a_pos;
    v_offset_x = u_offset_x;
    v_offset_y = u_offset_y;
}
"#;

/// Fragment stage: sample the overlay texture and discard everything past
/// the pixel thresholds, measured in device-pixel-ratio-corrected canvas
/// coordinates. The surviving region is a rectangle anchored at the canvas
/// origin whose edges the two thresholds control independently.
pub const FRAGMENT: &str = r#"
precision mediump float;

uniform sampler2D u_texture;
uniform float u_pixel_ratio;

varying vec2 v_tex_pos;
varying float v_offset_x;
varying float v_offset_y;

void main() {
    vec2 canvas_pos = gl_FragCoord.xy / u_pixel_ratio;
    if (canvas_pos.x > v_offset_x || canvas_pos.y > v_offset_y) {
        discard;
    }
    gl_FragColor = texture2D(u_texture, v_tex_pos);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_source_scales_by_the_tile_extent() {
        let literal = format!("{:.1}", TILE_EXTENT);
        assert!(VERTEX.contains(&literal));
    }

    #[test]
    fn sources_declare_the_cached_names() {
        assert!(VERTEX.contains("attribute vec2 a_pos"));
        for uniform in ["u_matrix", "u_offset_x", "u_offset_y"] {
            assert!(VERTEX.contains(uniform), "vertex stage missing {uniform}");
        }
        for uniform in ["u_texture", "u_pixel_ratio"] {
            assert!(FRAGMENT.contains(uniform), "fragment stage missing {uniform}");
        }
    }
}
