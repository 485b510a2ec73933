//! wgpu implementation of the GPU capability interface
//!
//! [`WgpuGpu`] exposes a table of non-opaque, sampleable texture formats under their
//! conventional user shader names and uploads `//!TEXTURE` payloads through a
//! `wgpu::Queue`. Filterability of the 32-bit float formats depends on the device
//! reporting `FLOAT32_FILTERABLE`.

use crate::gpu::{AddressMode, FormatCaps, Gpu, GpuLimits, SampleMode, TexFormat, TexInfo, TexParams};

/// Builds the format table, as parallel vectors of descriptor and wgpu format.
fn format_table(float32_filterable: bool) -> (Vec<TexFormat>, Vec<wgpu::TextureFormat>) {
    let entries: [(&str, wgpu::TextureFormat, usize, bool); 10] = [
        ("r8", wgpu::TextureFormat::R8Unorm, 1, true),
        ("rg8", wgpu::TextureFormat::Rg8Unorm, 2, true),
        ("rgba8", wgpu::TextureFormat::Rgba8Unorm, 4, true),
        ("rgb10a2", wgpu::TextureFormat::Rgb10a2Unorm, 4, true),
        ("r16f", wgpu::TextureFormat::R16Float, 2, true),
        ("rg16f", wgpu::TextureFormat::Rg16Float, 4, true),
        ("rgba16f", wgpu::TextureFormat::Rgba16Float, 8, true),
        ("r32f", wgpu::TextureFormat::R32Float, 4, float32_filterable),
        ("rg32f", wgpu::TextureFormat::Rg32Float, 8, float32_filterable),
        ("rgba32f", wgpu::TextureFormat::Rgba32Float, 16, float32_filterable),
    ];

    let mut formats = Vec::with_capacity(entries.len());
    let mut wgpu_formats = Vec::with_capacity(entries.len());
    for (name, format, texel_size, filterable) in entries {
        let mut caps = FormatCaps::SAMPLEABLE;
        if filterable {
            caps |= FormatCaps::LINEAR;
        }
        formats.push(TexFormat { name: name.to_string(), caps, texel_size, opaque: false });
        wgpu_formats.push(format);
    }
    (formats, wgpu_formats)
}

/// Maps a LUT sampling mode to the wgpu filter mode.
pub fn filter_mode(mode: SampleMode) -> wgpu::FilterMode {
    match mode {
        SampleMode::Nearest => wgpu::FilterMode::Nearest,
        SampleMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Maps a LUT addressing mode to the wgpu address mode.
pub fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
    }
}

/// GPU context backed by a wgpu device and queue
pub struct WgpuGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    formats: Vec<TexFormat>,
    wgpu_formats: Vec<wgpu::TextureFormat>,
}

impl WgpuGpu {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let float32_filterable = device.features().contains(wgpu::Features::FLOAT32_FILTERABLE);
        let (formats, wgpu_formats) = format_table(float32_filterable);
        Self { device, queue, formats, wgpu_formats }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

/// A LUT texture created through [`WgpuGpu`]
///
/// Carries the sampling and addressing modes from the shader document so the host can
/// build a matching sampler (wgpu keeps samplers separate from textures). The wgpu
/// texture is released when this value is dropped.
#[derive(Debug)]
pub struct WgpuLutTexture {
    pub texture: wgpu::Texture,
    pub sample_mode: SampleMode,
    pub address_mode: AddressMode,
}

impl WgpuLutTexture {
    /// Creates a sampler descriptor matching the declared FILTER and BORDER modes.
    pub fn sampler_desc(&self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: Some("usershader lut sampler"),
            address_mode_u: address_mode(self.address_mode),
            address_mode_v: address_mode(self.address_mode),
            address_mode_w: address_mode(self.address_mode),
            mag_filter: filter_mode(self.sample_mode),
            min_filter: filter_mode(self.sample_mode),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }
}

impl Gpu for WgpuGpu {
    type Texture = WgpuLutTexture;

    fn formats(&self) -> &[TexFormat] {
        &self.formats
    }

    fn limits(&self) -> GpuLimits {
        let limits = self.device.limits();
        GpuLimits {
            max_tex_1d_dim: limits.max_texture_dimension_1d,
            max_tex_2d_dim: limits.max_texture_dimension_2d,
            max_tex_3d_dim: limits.max_texture_dimension_3d,
        }
    }

    fn create_texture(&self, params: &TexParams<'_>) -> Option<Self::Texture> {
        let index = self.formats.iter().position(|fmt| fmt.name == params.format.name)?;
        let format = self.wgpu_formats[index];

        let dimension = if params.d > 0 {
            wgpu::TextureDimension::D3
        } else if params.h > 0 {
            wgpu::TextureDimension::D2
        } else {
            wgpu::TextureDimension::D1
        };
        let size = wgpu::Extent3d {
            width: params.w,
            height: params.h.max(1),
            depth_or_array_layers: params.d.max(1),
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("usershader lut"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            params.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(params.w * params.format.texel_size as u32),
                rows_per_image: Some(size.height),
            },
            size,
        );

        Some(WgpuLutTexture { texture, sample_mode: params.sample_mode, address_mode: params.address_mode })
    }
}

impl TexInfo for wgpu::Texture {
    fn width(&self) -> u32 {
        wgpu::Texture::width(self)
    }

    fn height(&self) -> u32 {
        wgpu::Texture::height(self)
    }
}
