//! Shader buffer seam and a reference string-assembly implementation
//!
//! During a hook invocation the engine emits macro preambles, variable declarations and
//! the user pass body into a shader buffer supplied by the host. The [`ShaderBuffer`]
//! trait captures exactly the operations the engine needs; [`ShaderBuilder`] is a plain
//! GLSL-flavored implementation that assembles everything into one source string, used
//! by the crate's tests and tooling and usable as a starting point for hosts.

use crate::gpu::{ColorRepr, HookTex, TexInfo};
use std::marker::PhantomData;

/// Identifiers handed back when a hook texture is bound
///
/// The engine wraps these in the `NAME_raw` / `NAME_pos` / `NAME_size` / `NAME_pt`
/// macros of the binding preamble.
#[derive(Debug, Clone)]
pub struct BoundTex {
    /// Sampler identifier
    pub raw: String,
    /// Normalized sample position (vec2)
    pub pos: String,
    /// Texture dimensions in texels (vec2)
    pub size: String,
    /// Reciprocal dimensions, one texel step (vec2)
    pub pt: String,
}

/// Value of a typed shader variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderVarData {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
}

/// A typed variable declaration request
///
/// `dynamic` marks values that change every invocation (frame counter, random seed), as
/// opposed to values that are constant for the lifetime of the generated shader.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderVar {
    pub name: &'static str,
    pub data: ShaderVarData,
    pub dynamic: bool,
}

impl ShaderVar {
    pub fn int(name: &'static str, value: i32, dynamic: bool) -> Self {
        Self { name, data: ShaderVarData::Int(value), dynamic }
    }

    pub fn float(name: &'static str, value: f32, dynamic: bool) -> Self {
        Self { name, data: ShaderVarData::Float(value), dynamic }
    }

    pub fn vec2(name: &'static str, value: [f32; 2], dynamic: bool) -> Self {
        Self { name, data: ShaderVarData::Vec2(value), dynamic }
    }
}

/// Input signature a pass requires of the shader buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderSig {
    /// The pass reads no prior shader output; it samples its inputs itself
    None,
    /// The pass consumes the color produced by the buffer so far
    Color,
}

/// Operations the engine performs against the host's shader buffer
pub trait ShaderBuffer {
    /// Host texture handle type
    type Tex: TexInfo + Clone;
    /// Host color representation type
    type Repr: ColorRepr + Clone;
    /// LUT texture type, as produced by the GPU context at parse time
    type Lut;

    /// Binds a host texture for sampling.
    ///
    /// `name` is a debug hint, not the identifier; the returned identifiers are chosen
    /// by the buffer. Returns `None` if the texture cannot be bound.
    fn bind_tex(&mut self, name: &str, tex: &HookTex<Self::Tex, Self::Repr>) -> Option<BoundTex>;

    /// Binds a LUT texture as a plain sampled descriptor, returning its identifier.
    fn bind_lut(&mut self, name: &str, lut: &Self::Lut) -> Option<String>;

    /// Declares a typed variable and returns the identifier it is reachable under.
    fn declare_var(&mut self, var: ShaderVar) -> String;

    /// Requests compute dispatch with the given workgroup size.
    ///
    /// Returns false if the buffer cannot execute this pass as a compute shader.
    fn try_compute(&mut self, block_w: i32, block_h: i32) -> bool;

    /// Requires an input signature and output size of the buffer.
    ///
    /// Returns false if the requirement conflicts with one already imposed (e.g. the
    /// pass tried to resize a non-resizable buffer).
    fn require(&mut self, sig: ShaderSig, width: f32, height: f32) -> bool;

    /// Appends text to the header section (macros, function definitions).
    fn push_header(&mut self, text: &str);

    /// Appends text to the main section (statements in the entry point).
    fn push_main(&mut self, text: &str);
}

/// A variable declared through a [`ShaderBuilder`]
#[derive(Debug, Clone)]
pub struct DeclaredVar {
    pub ident: String,
    pub var: ShaderVar,
}

/// Reference shader buffer that assembles a single GLSL-flavored source string
///
/// Bound textures become numbered sampler uniforms with accompanying position varyings
/// and size/step defines; variables become numbered uniforms whose values are recorded
/// for the host to upload. LUTs are declared as 2D samplers; hosts with 1D or 3D LUTs
/// will want their own buffer implementation.
#[derive(Debug)]
pub struct ShaderBuilder<T, R, L> {
    decls: String,
    header: String,
    main: String,
    vars: Vec<DeclaredVar>,
    num_texs: u32,
    num_luts: u32,
    num_vars: u32,
    compute: Option<(i32, i32)>,
    requirement: Option<(ShaderSig, f32, f32)>,
    _marker: PhantomData<fn() -> (T, R, L)>,
}

impl<T, R, L> ShaderBuilder<T, R, L> {
    pub fn new() -> Self {
        Self {
            decls: String::new(),
            header: String::new(),
            main: String::new(),
            vars: Vec::new(),
            num_texs: 0,
            num_luts: 0,
            num_vars: 0,
            compute: None,
            requirement: None,
            _marker: PhantomData,
        }
    }

    /// Returns the declaration section built so far.
    pub fn decls(&self) -> &str {
        &self.decls
    }

    /// Returns the header section built so far.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Returns the main section built so far.
    pub fn main_code(&self) -> &str {
        &self.main
    }

    /// Returns the variables declared so far, with their recorded values.
    pub fn vars(&self) -> &[DeclaredVar] {
        &self.vars
    }

    /// Returns the required output size, if one was imposed.
    pub fn output_size(&self) -> Option<(f32, f32)> {
        self.requirement.map(|(_, w, h)| (w, h))
    }

    /// Returns the requested compute workgroup size, if any.
    pub fn workgroup(&self) -> Option<(i32, i32)> {
        self.compute
    }

    pub fn is_compute(&self) -> bool {
        self.compute.is_some()
    }

    /// Assembles the final source string.
    pub fn finish(self) -> String {
        let mut out = String::new();
        if let Some((bw, bh)) = self.compute {
            out.push_str(&format!("layout(local_size_x = {bw}, local_size_y = {bh}) in;\n"));
        }
        out.push_str(&self.decls);
        out.push_str(&self.header);
        out.push_str("void main() {\n");
        out.push_str(&self.main);
        out.push_str("}\n");
        out
    }
}

impl<T, R, L> Default for ShaderBuilder<T, R, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TexInfo + Clone, R: ColorRepr + Clone, L> ShaderBuffer for ShaderBuilder<T, R, L> {
    type Tex = T;
    type Repr = R;
    type Lut = L;

    fn bind_tex(&mut self, _name: &str, tex: &HookTex<Self::Tex, Self::Repr>) -> Option<BoundTex> {
        let n = self.num_texs;
        self.num_texs += 1;

        let raw = format!("_tex_{n}");
        let pos = format!("_tex_{n}_pos");
        let size = format!("_tex_{n}_size");
        let pt = format!("_tex_{n}_pt");

        let w = tex.tex.width() as f32;
        let h = tex.tex.height() as f32;
        self.decls.push_str(&format!("uniform sampler2D {raw};\n"));
        self.decls.push_str(&format!("in vec2 {pos};\n"));
        self.decls.push_str(&format!("#define {size} vec2({w:?}, {h:?})\n"));
        self.decls.push_str(&format!("#define {pt} vec2({:?}, {:?})\n", 1.0 / w, 1.0 / h));

        Some(BoundTex { raw, pos, size, pt })
    }

    fn bind_lut(&mut self, _name: &str, _lut: &Self::Lut) -> Option<String> {
        let n = self.num_luts;
        self.num_luts += 1;

        let ident = format!("_lut_{n}");
        self.decls.push_str(&format!("uniform sampler2D {ident};\n"));
        Some(ident)
    }

    fn declare_var(&mut self, var: ShaderVar) -> String {
        let ident = format!("{}_{}", var.name, self.num_vars);
        self.num_vars += 1;

        let glsl_type = match var.data {
            ShaderVarData::Int(_) => "int",
            ShaderVarData::Float(_) => "float",
            ShaderVarData::Vec2(_) => "vec2",
        };
        self.decls.push_str(&format!("uniform {glsl_type} {ident};\n"));
        self.vars.push(DeclaredVar { ident: ident.clone(), var });
        ident
    }

    fn try_compute(&mut self, block_w: i32, block_h: i32) -> bool {
        if block_w < 1 || block_h < 1 {
            return false;
        }
        self.compute = Some((block_w, block_h));
        true
    }

    fn require(&mut self, sig: ShaderSig, width: f32, height: f32) -> bool {
        match self.requirement {
            Some((cur_sig, cur_w, cur_h)) => cur_sig == sig && cur_w == width && cur_h == height,
            None => {
                self.requirement = Some((sig, width, height));
                true
            }
        }
    }

    fn push_header(&mut self, text: &str) {
        self.header.push_str(text);
    }

    fn push_main(&mut self, text: &str) {
        self.main.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Rect;

    #[derive(Debug, Clone)]
    struct Tex {
        w: u32,
        h: u32,
    }

    impl TexInfo for Tex {
        fn width(&self) -> u32 {
            self.w
        }

        fn height(&self) -> u32 {
            self.h
        }
    }

    #[derive(Debug, Clone)]
    struct Repr;

    impl ColorRepr for Repr {
        fn normalize(&mut self) -> f32 {
            1.0
        }
    }

    type Builder = ShaderBuilder<Tex, Repr, ()>;

    fn hook_tex(w: u32, h: u32) -> HookTex<Tex, Repr> {
        HookTex { tex: Tex { w, h }, src_rect: Rect::sized(w as f32, h as f32), repr: Repr }
    }

    #[test]
    fn test_bind_tex_identifiers_are_unique() {
        let mut sh = Builder::new();
        let a = sh.bind_tex("first", &hook_tex(640, 480)).unwrap();
        let b = sh.bind_tex("second", &hook_tex(320, 240)).unwrap();
        assert_ne!(a.raw, b.raw);
        assert!(sh.decls().contains(&format!("uniform sampler2D {};", a.raw)));
        assert!(sh.decls().contains("vec2(640.0, 480.0)"));
    }

    #[test]
    fn test_declare_var_records_value() {
        let mut sh = Builder::new();
        let ident = sh.declare_var(ShaderVar::int("frame", 7, true));
        assert!(sh.decls().contains(&format!("uniform int {ident};")));
        assert_eq!(sh.vars().len(), 1);
        assert_eq!(sh.vars()[0].var.data, ShaderVarData::Int(7));
        assert!(sh.vars()[0].var.dynamic);
    }

    #[test]
    fn test_require_conflict() {
        let mut sh = Builder::new();
        assert!(sh.require(ShaderSig::None, 640.0, 480.0));
        assert!(sh.require(ShaderSig::None, 640.0, 480.0));
        assert!(!sh.require(ShaderSig::None, 1280.0, 480.0));
    }

    #[test]
    fn test_compute_mode() {
        let mut sh = Builder::new();
        assert!(sh.try_compute(16, 16));
        assert_eq!(sh.workgroup(), Some((16, 16)));
        assert!(!Builder::new().try_compute(0, 16));
    }

    #[test]
    fn test_finish_assembles_sections() {
        let mut sh = Builder::new();
        sh.push_header("#define X 1\n");
        sh.push_main("vec4 color = vec4(X);\n");
        let source = sh.finish();
        let header_at = source.find("#define X 1").unwrap();
        let main_at = source.find("vec4 color").unwrap();
        assert!(header_at < main_at);
        assert!(source.ends_with("}\n"));
    }
}
