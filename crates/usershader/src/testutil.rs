//! In-process GPU and host doubles shared by the unit tests

use crate::gpu::{AddressMode, ColorRepr, FormatCaps, Gpu, GpuLimits, SampleMode, TexFormat, TexInfo, TexParams};

/// A headless GPU context with a small fixed format table
pub(crate) struct TestGpu {
    pub formats: Vec<TexFormat>,
    pub limits: GpuLimits,
    pub fail_create: bool,
}

impl TestGpu {
    pub fn new() -> Self {
        let formats = vec![
            TexFormat {
                name: "rgba8".to_string(),
                caps: FormatCaps::SAMPLEABLE | FormatCaps::LINEAR,
                texel_size: 4,
                opaque: false,
            },
            TexFormat {
                name: "rgba16f".to_string(),
                caps: FormatCaps::SAMPLEABLE | FormatCaps::LINEAR,
                texel_size: 8,
                opaque: false,
            },
            TexFormat {
                name: "r32f".to_string(),
                caps: FormatCaps::SAMPLEABLE,
                texel_size: 4,
                opaque: false,
            },
            TexFormat {
                name: "opaque4".to_string(),
                caps: FormatCaps::SAMPLEABLE,
                texel_size: 4,
                opaque: true,
            },
        ];
        Self {
            formats,
            limits: GpuLimits { max_tex_1d_dim: 1024, max_tex_2d_dim: 1024, max_tex_3d_dim: 128 },
            fail_create: false,
        }
    }

    /// A GPU whose texture creation always fails
    pub fn failing() -> Self {
        Self { fail_create: true, ..Self::new() }
    }
}

impl Gpu for TestGpu {
    type Texture = TestLut;

    fn formats(&self) -> &[TexFormat] {
        &self.formats
    }

    fn limits(&self) -> GpuLimits {
        self.limits
    }

    fn create_texture(&self, params: &TexParams<'_>) -> Option<Self::Texture> {
        if self.fail_create {
            return None;
        }
        Some(TestLut {
            w: params.w,
            h: params.h,
            d: params.d,
            format: params.format.name.clone(),
            sample_mode: params.sample_mode,
            address_mode: params.address_mode,
            data: params.data.to_vec(),
        })
    }
}

/// The texture record produced by [`TestGpu`]
#[derive(Debug)]
pub(crate) struct TestLut {
    pub w: u32,
    pub h: u32,
    pub d: u32,
    pub format: String,
    #[allow(dead_code)]
    pub sample_mode: SampleMode,
    pub address_mode: AddressMode,
    pub data: Vec<u8>,
}

/// A host texture handle carrying only its dimensions
#[derive(Debug, Clone)]
pub(crate) struct TestTex {
    pub w: u32,
    pub h: u32,
}

impl TexInfo for TestTex {
    fn width(&self) -> u32 {
        self.w
    }

    fn height(&self) -> u32 {
        self.h
    }
}

/// A color representation with a configurable normalization scale
#[derive(Debug, Clone)]
pub(crate) struct TestRepr {
    pub scale: f32,
}

impl ColorRepr for TestRepr {
    fn normalize(&mut self) -> f32 {
        let scale = self.scale;
        self.scale = 1.0;
        scale
    }
}
