//! Visual parameters driven by audio
//!
//! The renderer itself is out of scope here; these are the numeric knobs a
//! mesh renderer would read every frame.

use meshwave_core::ParameterTable;

/// Mesh renderer parameters
#[derive(Debug, Clone, PartialEq)]
pub struct VisualParams {
    pub luma_key_level: f32,
    pub x_displace: f32,
    pub y_displace: f32,
    pub z_frequency: f32,
    pub x_frequency: f32,
    pub y_frequency: f32,
    pub zoom: f32,
    /// Grid spacing in pixels
    pub scale: i32,
    pub center_x: f32,
    pub center_y: f32,
    pub z_lfo_arg: f32,
    pub z_lfo_amp: f32,
    pub x_lfo_arg: f32,
    pub x_lfo_amp: f32,
    pub y_lfo_arg: f32,
    pub y_lfo_amp: f32,
    pub rotate_x: f32,
    pub rotate_y: f32,
    pub rotate_z: f32,
    pub global_x_displace: f32,
    pub global_y_displace: f32,
    pub stroke_weight: f32,
}

impl Default for VisualParams {
    fn default() -> Self {
        Self {
            luma_key_level: 0.0,
            x_displace: 0.0,
            y_displace: 0.0,
            z_frequency: 0.03,
            x_frequency: 0.015,
            y_frequency: 0.02,
            zoom: 0.0,
            scale: 8,
            center_x: 0.0,
            center_y: 0.0,
            z_lfo_arg: 0.0,
            z_lfo_amp: 0.0,
            x_lfo_arg: 0.0,
            x_lfo_amp: 0.0,
            y_lfo_arg: 0.0,
            y_lfo_amp: 0.0,
            rotate_x: 0.0,
            rotate_y: 0.0,
            rotate_z: 0.0,
            global_x_displace: 0.0,
            global_y_displace: 0.0,
            stroke_weight: 1.0,
        }
    }
}

/// Parameter ids mapped onto [`VisualParams`] fields
pub fn parameter_table() -> ParameterTable<VisualParams> {
    let mut table: ParameterTable<VisualParams> = ParameterTable::new();
    table
        .register("luma_key_level", |p| p.luma_key_level, |p, v| p.luma_key_level = v)
        .register("x_displace", |p| p.x_displace, |p, v| p.x_displace = v)
        .register("y_displace", |p| p.y_displace, |p, v| p.y_displace = v)
        .register("z_frequency", |p| p.z_frequency, |p, v| p.z_frequency = v)
        .register("x_frequency", |p| p.x_frequency, |p, v| p.x_frequency = v)
        .register("y_frequency", |p| p.y_frequency, |p, v| p.y_frequency = v)
        .register("zoom", |p| p.zoom, |p, v| p.zoom = v)
        // Integer grid spacing: additive writes truncate the increment, not the sum
        .register_with_add(
            "scale",
            |p| p.scale as f32,
            |p, v| p.scale = v as i32,
            |p, d| p.scale += d as i32,
        )
        .register("center_x", |p| p.center_x, |p, v| p.center_x = v)
        .register("center_y", |p| p.center_y, |p, v| p.center_y = v)
        .register("z_lfo_arg", |p| p.z_lfo_arg, |p, v| p.z_lfo_arg = v)
        .register("z_lfo_amp", |p| p.z_lfo_amp, |p, v| p.z_lfo_amp = v)
        .register("x_lfo_arg", |p| p.x_lfo_arg, |p, v| p.x_lfo_arg = v)
        .register("x_lfo_amp", |p| p.x_lfo_amp, |p, v| p.x_lfo_amp = v)
        .register("y_lfo_arg", |p| p.y_lfo_arg, |p, v| p.y_lfo_arg = v)
        .register("y_lfo_amp", |p| p.y_lfo_amp, |p, v| p.y_lfo_amp = v)
        .register("rotate_x", |p| p.rotate_x, |p, v| p.rotate_x = v)
        .register("rotate_y", |p| p.rotate_y, |p, v| p.rotate_y = v)
        .register("rotate_z", |p| p.rotate_z, |p, v| p.rotate_z = v)
        .register("global_x_displace", |p| p.global_x_displace, |p, v| p.global_x_displace = v)
        .register("global_y_displace", |p| p.global_y_displace, |p, v| p.global_y_displace = v)
        .register("stroke_weight", |p| p.stroke_weight, |p, v| p.stroke_weight = v);
    table
}
