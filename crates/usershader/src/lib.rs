//! mpv user shader parsing and hook execution
//!
//! This crate implements the textual `//!` shader-hook format popularized by mpv user
//! shaders: a document parser producing typed pass and LUT texture descriptors, the RPN
//! expression language governing pass sizes and execution conditions, and the execution
//! engine that emits GLSL fragments into a host shader buffer and drives the multi-pass
//! SAVE/AGAIN protocol of the surrounding renderer.
//!
//! The crate is host-agnostic: graphics resources are reached through the capability
//! traits in [`gpu`] and [`shader`]. An implementation of the GPU side for wgpu is
//! available behind the `wgpu` feature.

pub mod engine;
pub mod gpu;
pub mod parse;
pub mod shader;
pub mod stage;
pub mod szexp;

#[cfg(feature = "wgpu")]
pub mod wgpu_gpu;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{HookError, HookParams, HookPass, HookStatus, PassTexture, SaveParams, UserShaderHook};
pub use gpu::{AddressMode, ColorRepr, FormatCaps, Gpu, GpuLimits, HookTex, Rect, SampleMode, TexFormat, TexInfo, TexParams};
pub use parse::{LutTexture, ParseError, ShaderPass, Transform2x2, SHADER_MAX_BINDS, SHADER_MAX_HOOKS};
pub use shader::{BoundTex, DeclaredVar, ShaderBuffer, ShaderBuilder, ShaderSig, ShaderVar, ShaderVarData};
pub use stage::HookStage;
pub use szexp::{EvalError, ExprParseError, SizeExpr, SizeOp1, SizeOp2, SizeToken, MAX_SZEXP_SIZE};

#[cfg(feature = "wgpu")]
pub use wgpu_gpu::{WgpuGpu, WgpuLutTexture};
