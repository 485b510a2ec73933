//! Hook registry, per-invocation execution engine and lifecycle
//!
//! A [`UserShaderHook`] is built once from a shader document and then driven by the host
//! renderer: [`UserShaderHook::reset`] at every frame boundary, [`UserShaderHook::hook`]
//! repeatedly at each pipeline stage until no [`HookStatus::AGAIN`] is returned, and
//! [`UserShaderHook::save`] after every invocation that signalled [`HookStatus::SAVE`].
//! Dropping the hook object releases its LUT textures.

use crate::gpu::{ColorRepr, Gpu, HookTex, Rect, TexInfo};
use crate::parse::{parse_document, Block, LutTexture, ParseError, ShaderPass};
use crate::shader::{ShaderBuffer, ShaderSig, ShaderVar};
use crate::stage::HookStage;
use crate::szexp::EvalError;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Status bits returned by a successful hook invocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HookStatus: u32 {
        /// The host must call [`UserShaderHook::save`] with the resulting texture
        const SAVE = 1 << 0;
        /// More passes match this stage; call [`UserShaderHook::hook`] again with the
        /// next `count`
        const AGAIN = 1 << 1;
    }
}

/// A registered pass together with the stages it executes on
#[derive(Debug, Clone)]
pub struct HookPass {
    /// Union of the stage flags of every `HOOK` entry
    pub exec_stages: HookStage,
    pub pass: ShaderPass,
}

/// An entry of the dynamic per-frame texture table
#[derive(Debug, Clone)]
pub struct PassTexture<T, R> {
    pub name: String,
    pub tex: HookTex<T, R>,
}

/// Inputs of one hook invocation
pub struct HookParams<'a, S: ShaderBuffer> {
    /// The stage being executed (a single-bit set)
    pub stage: HookStage,
    /// The current input texture of this stage
    pub tex: HookTex<S::Tex, S::Repr>,
    /// Source crop of the frame being rendered
    pub src_rect: Rect,
    /// Destination rectangle of the frame being rendered
    pub dst_rect: Rect,
    /// The shader buffer to emit into
    pub sh: &'a mut S,
    /// Zero-based index of this invocation within the current stage; the host increments
    /// it after every invocation that returned [`HookStatus::AGAIN`]
    pub count: usize,
}

/// Inputs of one save callback
pub struct SaveParams<T, R> {
    pub stage: HookStage,
    /// The texture produced by the pass that signalled [`HookStatus::SAVE`]
    pub tex: HookTex<T, R>,
    pub count: usize,
}

/// Fatal failures during a hook invocation
///
/// The engine state stays consistent across these: nothing is partially appended to the
/// texture table, so the host may continue the frame or abandon it.
#[derive(Debug, Clone, PartialEq)]
pub enum HookError {
    /// Evaluation of a size or condition expression failed
    Eval { directive: &'static str, source: EvalError },
    /// The shader buffer refused compute dispatch
    ComputeDispatch { block_w: i32, block_h: i32 },
    /// The shader buffer refused the output size requirement
    SizeRequirement { width: f32, height: f32 },
    /// The shader buffer failed to bind a texture
    BindFailed(String),
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eval { directive, source } => write!(f, "failed evaluating {directive} expression: {source}"),
            Self::ComputeDispatch { block_w, block_h } => write!(f, "failed dispatching compute shader ({block_w}x{block_h})"),
            Self::SizeRequirement { width, height } => {
                write!(f, "incompatible shader size requirements ({width}x{height}), perhaps a non-resizable pass was resized")
            }
            Self::BindFailed(name) => write!(f, "failed binding texture '{name}'"),
        }
    }
}

impl std::error::Error for HookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Eval { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Fixed seed for the xoshiro256+ state, so the `random` uniform sequence is
/// reproducible across runs.
const PRNG_SEED: [u64; 4] = [0xb76d71f9443c228a, 0x93a02092fc4807e8, 0x06d81748f838bd07, 0x9381ee129dddce6c];

/// One step of the xoshiro256+ generator, mapped to a double in [0, 1) via the canonical
/// 53-bit conversion.
fn prng_step(s: &mut [u64; 4]) -> f64 {
    let result = s[0].wrapping_add(s[3]);
    let t = s[1] << 17;

    s[2] ^= s[0];
    s[3] ^= s[1];
    s[1] ^= s[2];
    s[0] ^= s[3];

    s[2] ^= t;
    s[3] = s[3].rotate_left(45);

    (result >> 11) as f64 * 2f64.powi(-53)
}

/// A parsed user shader, ready to participate in the render pipeline
///
/// Generic over the GPU context's LUT texture type `L`, the host's texture handle `T`
/// and its color representation `R`. The object is immutable after construction except
/// for the per-frame texture table, the frame counter and the PRNG state, all of which
/// are only touched through [`Self::reset`], [`Self::hook`] and [`Self::save`] on the
/// single rendering thread.
#[derive(Debug)]
pub struct UserShaderHook<L, T, R> {
    passes: Vec<HookPass>,
    lut_textures: Vec<LutTexture<L>>,
    /// Stages whose input textures must be recorded because a later pass binds them
    save_stages: HookStage,
    /// All stages the host must invoke the hook on
    stages: HookStage,
    pass_textures: Vec<PassTexture<T, R>>,
    frame_count: i32,
    prng_state: [u64; 4],
}

impl<L, T, R> UserShaderHook<L, T, R>
where
    T: TexInfo + Clone,
    R: ColorRepr + Clone,
{
    /// Parses a user shader document and registers everything it declares
    ///
    /// LUT textures are uploaded through `gpu` during parsing. On failure nothing is
    /// retained; any textures created for earlier blocks are dropped again.
    pub fn parse<G: Gpu<Texture = L>>(gpu: &G, source: &str) -> Result<Self, ParseError> {
        let blocks = parse_document(gpu, source).inspect_err(|err| tracing::error!("failed parsing user shader: {err}"))?;

        let mut hook = Self {
            passes: Vec::new(),
            lut_textures: Vec::new(),
            save_stages: HookStage::empty(),
            stages: HookStage::empty(),
            pass_textures: Vec::new(),
            frame_count: 0,
            prng_state: PRNG_SEED,
        };

        for block in blocks {
            match block {
                Block::Pass(pass) => hook.register_pass(pass),
                Block::Texture(tex) => hook.register_texture(tex),
            }
        }

        // The hook must run on the save stages as well as the exec stages, so that it
        // can record every input texture it may need to bind later.
        hook.stages = hook.save_stages;
        for pass in &hook.passes {
            hook.stages |= pass.exec_stages;
        }

        Ok(hook)
    }

    fn register_pass(&mut self, pass: ShaderPass) {
        let mut exec_stages = HookStage::empty();
        for name in &pass.hook_tex {
            exec_stages |= HookStage::from_mp_name(name);
        }
        for name in &pass.bind_tex {
            self.save_stages |= HookStage::from_mp_name(name);
            if name == "HOOKED" {
                self.save_stages |= exec_stages;
            }
        }

        tracing::info!("registering hook pass: {}", pass.desc);
        self.passes.push(HookPass { exec_stages, pass });
    }

    fn register_texture(&mut self, tex: LutTexture<L>) {
        tracing::info!("registering named texture '{}'", tex.name);
        self.lut_textures.push(tex);
    }

    /// Returns the registered passes, in document order.
    pub fn passes(&self) -> &[HookPass] {
        &self.passes
    }

    /// Returns the registered LUT textures, in document order.
    pub fn lut_textures(&self) -> &[LutTexture<L>] {
        &self.lut_textures
    }

    /// Returns the union of stages the host must invoke this hook on.
    pub fn stages(&self) -> HookStage {
        self.stages
    }

    /// Returns the stages whose input textures the engine records for later binding.
    pub fn save_stages(&self) -> HookStage {
        self.save_stages
    }

    /// Returns the current per-frame texture table.
    pub fn pass_textures(&self) -> &[PassTexture<T, R>] {
        &self.pass_textures
    }

    /// Clears the per-frame texture table
    ///
    /// Called by the host at frame boundaries. The frame counter and the PRNG state
    /// deliberately persist across frames.
    pub fn reset(&mut self) {
        self.pass_textures.clear();
    }

    /// Executes the next matching pass for the given stage invocation
    ///
    /// Returns the status bits for this invocation, or a fatal error that aborts the
    /// frame's use of this hook at the host's discretion.
    pub fn hook<S>(&mut self, params: HookParams<'_, S>) -> Result<HookStatus, HookError>
    where
        S: ShaderBuffer<Tex = T, Repr = R, Lut = L>,
    {
        let stage_name = params.stage.mp_name();

        // Record the stage's input texture if a later pass may bind it, but only on the
        // first invocation of the stage.
        if params.count == 0 && self.save_stages.intersects(params.stage) {
            tracing::trace!("saving input texture '{stage_name}' for binding");
            self.pass_textures.push(PassTexture { name: stage_name.to_string(), tex: params.tex.clone() });
        }

        // One walk both counts every pass matching this stage and selects the count-th
        // one; the total decides whether AGAIN must be signalled.
        let mut total_count = 0;
        let mut selected = None;
        for (i, pass) in self.passes.iter().enumerate() {
            if pass.exec_stages.intersects(params.stage) {
                let index = total_count;
                total_count += 1;
                if index < params.count {
                    continue;
                }
                if selected.is_none() {
                    selected = Some(i);
                }
            }
        }

        // No more passes for this stage
        let Some(selected) = selected else {
            return Ok(HookStatus::empty());
        };

        let pass = &self.passes[selected].pass;
        tracing::trace!("executing hook pass {}/{total_count} on stage '{stage_name}': {}", params.count, pass.desc);

        let hooked_size = (params.tex.tex.width() as f32, params.tex.tex.height() as f32);
        let src_size = (params.src_rect.width(), params.src_rect.height());
        let dst_size = (params.dst_rect.width(), params.dst_rect.height());
        let pass_textures = &self.pass_textures;
        let mut lookup = |name: &str| -> Option<(f32, f32)> {
            match name {
                "HOOKED" => Some(hooked_size),
                "NATIVE_CROPPED" => Some(src_size),
                "OUTPUT" => Some(dst_size),
                _ => pass_textures
                    .iter()
                    .find(|ptex| ptex.name == name)
                    .map(|ptex| (ptex.tex.tex.width() as f32, ptex.tex.tex.height() as f32)),
            }
        };

        // Test the execution condition
        let run = pass.cond.eval(&mut lookup).map_err(|source| HookError::Eval { directive: "WHEN", source })?;

        let mut status = HookStatus::empty();

        if run != 0.0 {
            if pass.is_compute && !params.sh.try_compute(pass.block_w, pass.block_h) {
                tracing::error!("failed dispatching compute shader");
                return Err(HookError::ComputeDispatch { block_w: pass.block_w, block_h: pass.block_h });
            }

            let out_w = pass.width.eval(&mut lookup).map_err(|source| HookError::Eval { directive: "WIDTH", source })?;
            let out_h = pass.height.eval(&mut lookup).map_err(|source| HookError::Eval { directive: "HEIGHT", source })?;

            if !params.sh.require(ShaderSig::None, out_w, out_h) {
                tracing::error!("incompatible shader size requirements, perhaps a non-resizable pass was resized");
                return Err(HookError::SizeRequirement { width: out_w, height: out_h });
            }

            for texname in &pass.bind_tex {
                if texname == "HOOKED" {
                    bind_hook_tex(params.sh, stage_name, &params.tex)?;
                    for suffix in ["raw", "pos", "size", "rot", "off", "pt", "map", "mul", "tex", "texOff"] {
                        params.sh.push_header(&format!("#define HOOKED_{suffix} {stage_name}_{suffix}\n"));
                    }
                    continue;
                }

                if let Some(lut) = self.lut_textures.iter().find(|lut| lut.name == *texname) {
                    let Some(ident) = params.sh.bind_lut(texname, &lut.tex) else {
                        return Err(HookError::BindFailed(texname.clone()));
                    };
                    params.sh.push_header(&format!("#define {texname} {ident}\n"));
                    continue;
                }

                if let Some(ptex) = self.pass_textures.iter().find(|ptex| ptex.name == *texname) {
                    bind_hook_tex(params.sh, texname, &ptex.tex)?;
                    continue;
                }

                // Unresolved names are skipped; if the body expands the macros anyway,
                // the GLSL compiler reports them.
                tracing::trace!("no texture named '{texname}' available for binding, skipping");
            }

            // Set up the global input variables
            self.frame_count += 1;
            let ident = params.sh.declare_var(ShaderVar::int("frame", self.frame_count, true));
            params.sh.push_header(&format!("#define frame {ident}\n"));

            let random = prng_step(&mut self.prng_state) as f32;
            let ident = params.sh.declare_var(ShaderVar::float("random", random, true));
            params.sh.push_header(&format!("#define random {ident}\n"));

            let ident = params.sh.declare_var(ShaderVar::vec2("input_size", [src_size.0, src_size.1], false));
            params.sh.push_header(&format!("#define input_size {ident}\n"));

            let ident = params.sh.declare_var(ShaderVar::vec2("target_size", [dst_size.0, dst_size.1], false));
            params.sh.push_header(&format!("#define target_size {ident}\n"));

            let ident = params.sh.declare_var(ShaderVar::vec2("tex_offset", [params.tex.src_rect.x0, params.tex.src_rect.y0], false));
            params.sh.push_header(&format!("#define tex_offset {ident}\n"));

            // Splice in the user shader body itself
            params.sh.push_header(&pass.body);

            if pass.is_compute {
                params.sh.push_main("hook();\n");
            } else {
                params.sh.push_main("vec4 color = hook();\n");
            }

            // TODO: apply the OFFSET transform at dispatch time

            if pass.save_tex.is_some() {
                status |= HookStatus::SAVE;
            }
        } else {
            tracing::trace!("skipping hook pass due to condition");
        }

        if params.count + 1 < total_count {
            status |= HookStatus::AGAIN;
        }

        Ok(status)
    }

    /// Records the texture produced by the pass that signalled [`HookStatus::SAVE`]
    ///
    /// Re-runs the pass selection of [`Self::hook`] to identify the triggering pass and
    /// appends its `SAVE` name to the texture table.
    pub fn save(&mut self, params: &SaveParams<T, R>) {
        let mut total_count = 0;
        let mut found = None;
        for pass in &self.passes {
            if pass.exec_stages.intersects(params.stage) {
                let index = total_count;
                total_count += 1;
                if index < params.count {
                    continue;
                }
                found = Some(pass);
                break;
            }
        }

        let Some(pass) = found else {
            tracing::warn!("save invoked on stage '{}' with no matching pass", params.stage.mp_name());
            return;
        };
        let Some(name) = pass.pass.save_tex.clone() else {
            tracing::warn!("save invoked for pass '{}' which declares no SAVE texture", pass.pass.desc);
            return;
        };

        tracing::trace!("saving output texture '{name}' from hook execution on '{}'", params.stage.mp_name());
        self.pass_textures.push(PassTexture { name, tex: params.tex.clone() });
    }
}

/// Emits the full binding preamble for a hook texture under the logical name `name`.
fn bind_hook_tex<S: ShaderBuffer>(sh: &mut S, name: &str, tex: &HookTex<S::Tex, S::Repr>) -> Result<(), HookError> {
    let Some(bound) = sh.bind_tex(name, tex) else {
        return Err(HookError::BindFailed(name.to_string()));
    };

    sh.push_header(&format!("#define {name}_raw {}\n", bound.raw));
    sh.push_header(&format!("#define {name}_pos {}\n", bound.pos));
    sh.push_header(&format!("#define {name}_size {}\n", bound.size));
    sh.push_header(&format!("#define {name}_pt {}\n", bound.pt));
    sh.push_header(&format!("#define {name}_off vec2({:?}, {:?})\n", tex.src_rect.x0, tex.src_rect.y0));

    let mut repr = tex.repr.clone();
    let scale = repr.normalize();
    sh.push_header(&format!("#define {name}_mul {scale:?}\n"));

    // TODO: implement tex_map

    // Compatibility with mpv
    sh.push_header(&format!("#define {name}_rot mat2(1.0, 0.0, 0.0, 1.0)\n"));

    // Sampling function boilerplate
    sh.push_header(&format!("#define {name}_tex(pos) ({name}_mul * vec4(texture({name}_raw, pos)))\n"));
    sh.push_header(&format!("#define {name}_texOff(off) ({name}_tex({name}_pos + {name}_pt * vec2(off)))\n"));

    Ok(())
}
