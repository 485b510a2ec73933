//! Collaborator interfaces for the GPU context and the host renderer
//!
//! The hook core never talks to a graphics API directly. Texture formats, size limits
//! and LUT texture uploads go through the [`Gpu`] trait, and the per-invocation texture
//! handles supplied by the host only need to expose their dimensions ([`TexInfo`]) and
//! their color representation normalization ([`ColorRepr`]). Backends implement these
//! traits; an optional `wgpu` implementation ships with the crate.

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Capability bits of a texture format
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatCaps: u32 {
        /// The format can be bound as a sampled texture
        const SAMPLEABLE = 1 << 0;
        /// The format supports linear filtering when sampled
        const LINEAR = 1 << 1;
    }
}

/// A texture format as enumerated by the GPU context
///
/// The `name` is what shader documents reference in `//!FORMAT` lines and must match
/// exactly. Opaque formats exist for the GPU's internal use and cannot back a LUT.
#[derive(Debug, Clone)]
pub struct TexFormat {
    pub name: String,
    pub caps: FormatCaps,
    /// Size of one texel in bytes, used to validate hex payload lengths
    pub texel_size: usize,
    pub opaque: bool,
}

/// Texture size limits of the GPU context, per dimensionality
#[derive(Debug, Clone, Copy)]
pub struct GpuLimits {
    pub max_tex_1d_dim: u32,
    pub max_tex_2d_dim: u32,
    pub max_tex_3d_dim: u32,
}

/// Sampling mode of a LUT texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SampleMode {
    #[default]
    Nearest,
    Linear,
}

/// Addressing mode of a LUT texture outside the [0, 1] coordinate range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AddressMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

/// Creation parameters for a LUT texture
///
/// `h` and `d` are zero for textures of lower dimensionality; the payload in `data`
/// covers `w * max(h, 1) * max(d, 1)` texels.
#[derive(Debug)]
pub struct TexParams<'a> {
    pub w: u32,
    pub h: u32,
    pub d: u32,
    pub format: &'a TexFormat,
    pub sample_mode: SampleMode,
    pub address_mode: AddressMode,
    pub sampleable: bool,
    pub data: &'a [u8],
}

/// Capabilities the GPU context must provide to the parser
///
/// Textures returned by [`Gpu::create_texture`] are owned values; releasing the GPU
/// resource on drop is the backend's responsibility, which is how a hook object frees
/// its LUT textures on teardown (and how a failed parse leaves nothing behind).
pub trait Gpu {
    /// The backend's owned texture type
    type Texture;

    /// Enumerates the available texture formats.
    fn formats(&self) -> &[TexFormat];

    /// Returns the texture size limits.
    fn limits(&self) -> GpuLimits;

    /// Creates a texture and uploads its initial contents.
    ///
    /// Returns `None` if the backend cannot create or upload the texture.
    fn create_texture(&self, params: &TexParams<'_>) -> Option<Self::Texture>;
}

/// Dimensions of a host texture handle
///
/// This is the only property of the host's textures the expression evaluator and the
/// binding preamble need.
pub trait TexInfo {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Color representation of a host texture
///
/// [`ColorRepr::normalize`] rescales the representation in place so that sampled values
/// span the nominal range, and returns the multiplier a shader must apply to do the
/// same. The engine calls it on a copy and emits the result as the `_mul` macro.
pub trait ColorRepr {
    fn normalize(&mut self) -> f32;
}

/// An axis-aligned rectangle in texel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Creates a rectangle with its origin at (0, 0).
    pub fn sized(w: f32, h: f32) -> Self {
        Self::new(0.0, 0.0, w, h)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// A host texture together with its source crop and color representation
///
/// This is the record the host hands to the engine for the hooked input texture and for
/// every texture recorded through the save protocol.
#[derive(Debug, Clone)]
pub struct HookTex<T, R> {
    pub tex: T,
    pub src_rect: Rect,
    pub repr: R,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_dimensions() {
        let rect = Rect::new(10.0, 20.0, 650.0, 500.0);
        assert_eq!(rect.width(), 640.0);
        assert_eq!(rect.height(), 480.0);
        assert_eq!(Rect::sized(640.0, 480.0).width(), 640.0);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SampleMode::default(), SampleMode::Nearest);
        assert_eq!(AddressMode::default(), AddressMode::Clamp);
    }
}
