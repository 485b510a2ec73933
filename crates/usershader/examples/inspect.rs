//! User shader inspector
//!
//! Parses an mpv-format user shader document with a headless GPU context and prints its
//! pass and texture structure. Useful for checking what a shader file declares before
//! wiring it into a renderer.
//!
//! # Usage
//! ```bash
//! cargo run --example inspect -- Anime4K_Upscale_CNN_x2_M.glsl --verbose
//! ```

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use usershader::{ColorRepr, FormatCaps, Gpu, GpuLimits, TexFormat, TexInfo, TexParams, UserShaderHook};

/// Command-line arguments for the shader inspector
#[derive(Parser)]
#[command(version, about = "Inspect the passes and textures of an mpv user shader")]
struct Args {
    /// Shader file to inspect
    shader: PathBuf,

    /// Dump pass descriptors as YAML instead of one line per pass
    #[arg(long, short)]
    verbose: bool,
}

/// Headless GPU context accepting the common LUT formats without uploading anything
struct InspectGpu {
    formats: Vec<TexFormat>,
}

impl InspectGpu {
    fn new() -> Self {
        let entries: [(&str, usize); 9] = [
            ("r8", 1),
            ("rg8", 2),
            ("rgba8", 4),
            ("r16f", 2),
            ("rg16f", 4),
            ("rgba16f", 8),
            ("r32f", 4),
            ("rg32f", 8),
            ("rgba32f", 16),
        ];
        let formats = entries
            .into_iter()
            .map(|(name, texel_size)| TexFormat {
                name: name.to_string(),
                caps: FormatCaps::SAMPLEABLE | FormatCaps::LINEAR,
                texel_size,
                opaque: false,
            })
            .collect();
        Self { formats }
    }
}

/// Texture record capturing only what the inspector prints
struct InspectLut {
    w: u32,
    h: u32,
    d: u32,
    format: String,
}

impl Gpu for InspectGpu {
    type Texture = InspectLut;

    fn formats(&self) -> &[TexFormat] {
        &self.formats
    }

    fn limits(&self) -> GpuLimits {
        GpuLimits { max_tex_1d_dim: 16384, max_tex_2d_dim: 16384, max_tex_3d_dim: 2048 }
    }

    fn create_texture(&self, params: &TexParams<'_>) -> Option<Self::Texture> {
        Some(InspectLut { w: params.w, h: params.h, d: params.d, format: params.format.name.clone() })
    }
}

// The inspector never executes the hook, so the host-side types are vestigial.
#[derive(Clone)]
struct NoTex;

impl TexInfo for NoTex {
    fn width(&self) -> u32 {
        0
    }

    fn height(&self) -> u32 {
        0
    }
}

#[derive(Clone)]
struct NoRepr;

impl ColorRepr for NoRepr {
    fn normalize(&mut self) -> f32 {
        1.0
    }
}

#[derive(Serialize)]
struct PassSummary<'a> {
    desc: &'a str,
    stages: Vec<&'static str>,
    binds: &'a [String],
    save: Option<&'a str>,
    width: String,
    height: String,
    when: String,
    components: i32,
    compute: Option<(i32, i32)>,
    body_lines: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let source = std::fs::read_to_string(&args.shader)?;

    let gpu = InspectGpu::new();
    let hook: UserShaderHook<InspectLut, NoTex, NoRepr> = UserShaderHook::parse(&gpu, &source)?;

    println!("{}: {} passes, {} textures, stages {:?}", args.shader.display(), hook.passes().len(), hook.lut_textures().len(), hook.stages());

    for lut in hook.lut_textures() {
        println!("texture '{}': {}x{}x{} {}", lut.name, lut.tex.w, lut.tex.h.max(1), lut.tex.d.max(1), lut.tex.format);
    }

    let summaries: Vec<PassSummary> = hook
        .passes()
        .iter()
        .map(|pass| PassSummary {
            desc: &pass.pass.desc,
            stages: pass.exec_stages.iter().map(|stage| stage.mp_name()).collect(),
            binds: &pass.pass.bind_tex,
            save: pass.pass.save_tex.as_deref(),
            width: pass.pass.width.to_string(),
            height: pass.pass.height.to_string(),
            when: pass.pass.cond.to_string(),
            components: pass.pass.components,
            compute: pass.pass.is_compute.then_some((pass.pass.block_w, pass.pass.block_h)),
            body_lines: pass.pass.body.lines().count(),
        })
        .collect();

    if args.verbose {
        print!("{}", serde_norway::to_string(&summaries)?);
    } else {
        for (i, summary) in summaries.iter().enumerate() {
            println!(
                "pass {i}: '{}' hooks [{}] binds [{}] size ({}) x ({})",
                summary.desc,
                summary.stages.join(", "),
                summary.binds.join(", "),
                summary.width,
                summary.height
            );
        }
    }

    Ok(())
}
