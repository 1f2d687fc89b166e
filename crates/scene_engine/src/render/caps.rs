//! Display capability conversion
//!
//! [`DisplayCapabilities`] is the engine's description of a surface's pixel
//! format; [`ApiPixelFormat`] is the form the graphics binding takes. The
//! conversion is field by field. The binding has no floating-point buffer
//! flag, so that flag comes back `false`.

use serde::{Deserialize, Serialize};

/// Requested or granted pixel format of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayCapabilities {
    /// Red channel bits
    pub red_bits: u8,
    /// Green channel bits
    pub green_bits: u8,
    /// Blue channel bits
    pub blue_bits: u8,
    /// Alpha channel bits
    pub alpha_bits: u8,
    /// Depth buffer bits
    pub depth_bits: u8,
    /// Stencil buffer bits
    pub stencil_bits: u8,
    /// Accumulation buffer red bits
    pub accum_red_bits: u8,
    /// Accumulation buffer green bits
    pub accum_green_bits: u8,
    /// Accumulation buffer blue bits
    pub accum_blue_bits: u8,
    /// Accumulation buffer alpha bits
    pub accum_alpha_bits: u8,
    /// Front and back buffer
    pub double_buffered: bool,
    /// Left and right eye buffers
    pub stereo: bool,
    /// Rendered by graphics hardware
    pub hardware_accelerated: bool,
    /// Multisample buffers present
    pub sample_buffers: bool,
    /// Samples per pixel when multisampling
    pub num_samples: u8,
    /// Opaque surfaces ignore the transparent values
    pub background_opaque: bool,
    /// Transparent key, red; `-1` when unset
    pub transparent_red: i32,
    /// Transparent key, green
    pub transparent_green: i32,
    /// Transparent key, blue
    pub transparent_blue: i32,
    /// Transparent key, alpha
    pub transparent_alpha: i32,
    /// Floating-point color buffer; not representable in [`ApiPixelFormat`]
    pub float_buffer: bool,
}

impl Default for DisplayCapabilities {
    fn default() -> Self {
        Self {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 24,
            stencil_bits: 8,
            accum_red_bits: 0,
            accum_green_bits: 0,
            accum_blue_bits: 0,
            accum_alpha_bits: 0,
            double_buffered: true,
            stereo: false,
            hardware_accelerated: true,
            sample_buffers: false,
            num_samples: 0,
            background_opaque: true,
            transparent_red: -1,
            transparent_green: -1,
            transparent_blue: -1,
            transparent_alpha: -1,
            float_buffer: false,
        }
    }
}

/// Pixel format as the graphics binding describes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApiPixelFormat {
    /// Red, green, blue, alpha
    pub color_bits: [u8; 4],
    /// Depth buffer bits
    pub depth_bits: u8,
    /// Stencil buffer bits
    pub stencil_bits: u8,
    /// Red, green, blue, alpha
    pub accum_bits: [u8; 4],
    /// Front and back buffer
    pub double_buffer: bool,
    /// Left and right eye buffers
    pub stereo: bool,
    /// Rendered by graphics hardware
    pub accelerated: bool,
    /// Multisampling enabled
    pub multisample: bool,
    /// Samples per pixel
    pub samples: u8,
    /// Background is opaque
    pub opaque: bool,
    /// Red, green, blue, alpha
    pub transparent_value: [i32; 4],
}

impl From<&DisplayCapabilities> for ApiPixelFormat {
    fn from(caps: &DisplayCapabilities) -> Self {
        Self {
            color_bits: [caps.red_bits, caps.green_bits, caps.blue_bits, caps.alpha_bits],
            depth_bits: caps.depth_bits,
            stencil_bits: caps.stencil_bits,
            accum_bits: [caps.accum_red_bits, caps.accum_green_bits, caps.accum_blue_bits, caps.accum_alpha_bits],
            double_buffer: caps.double_buffered,
            stereo: caps.stereo,
            accelerated: caps.hardware_accelerated,
            multisample: caps.sample_buffers,
            samples: caps.num_samples,
            opaque: caps.background_opaque,
            transparent_value: [
                caps.transparent_red,
                caps.transparent_green,
                caps.transparent_blue,
                caps.transparent_alpha,
            ],
        }
    }
}

impl From<&ApiPixelFormat> for DisplayCapabilities {
    fn from(format: &ApiPixelFormat) -> Self {
        let [red_bits, green_bits, blue_bits, alpha_bits] = format.color_bits;
        let [accum_red_bits, accum_green_bits, accum_blue_bits, accum_alpha_bits] = format.accum_bits;
        let [transparent_red, transparent_green, transparent_blue, transparent_alpha] = format.transparent_value;
        Self {
            red_bits,
            green_bits,
            blue_bits,
            alpha_bits,
            depth_bits: format.depth_bits,
            stencil_bits: format.stencil_bits,
            accum_red_bits,
            accum_green_bits,
            accum_blue_bits,
            accum_alpha_bits,
            double_buffered: format.double_buffer,
            stereo: format.stereo,
            hardware_accelerated: format.accelerated,
            sample_buffers: format.multisample,
            num_samples: format.samples,
            background_opaque: format.opaque,
            transparent_red,
            transparent_green,
            transparent_blue,
            transparent_alpha,
            float_buffer: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_every_represented_field() {
        let caps = DisplayCapabilities {
            red_bits: 5,
            green_bits: 6,
            blue_bits: 5,
            alpha_bits: 1,
            depth_bits: 16,
            stencil_bits: 4,
            accum_red_bits: 16,
            accum_green_bits: 15,
            accum_blue_bits: 14,
            accum_alpha_bits: 13,
            double_buffered: false,
            stereo: true,
            hardware_accelerated: false,
            sample_buffers: true,
            num_samples: 4,
            background_opaque: false,
            transparent_red: 10,
            transparent_green: 20,
            transparent_blue: 30,
            transparent_alpha: 40,
            float_buffer: false,
        };
        let back = DisplayCapabilities::from(&ApiPixelFormat::from(&caps));
        assert_eq!(back, caps);
    }

    #[test]
    fn test_float_buffer_is_lost_on_the_way_back() {
        let caps = DisplayCapabilities { float_buffer: true, ..DisplayCapabilities::default() };
        let back = DisplayCapabilities::from(&ApiPixelFormat::from(&caps));
        assert!(!back.float_buffer);
        assert_eq!(back, DisplayCapabilities { float_buffer: false, ..caps });
    }
}
