//! User shader document parsing
//!
//! A user shader document is a sequence of blocks, each introduced by one or more header
//! lines of the form `//!COMMAND args`. A block starting with `//!TEXTURE` declares an
//! auxiliary lookup texture with an inline hex payload; any other block declares a shader
//! pass whose headers are followed by a raw GLSL body. Text before the first header is
//! discarded, and blocks are separated by the next occurrence of `//!`.

use crate::gpu::{AddressMode, FormatCaps, Gpu, SampleMode, TexFormat, TexParams};
use crate::szexp::{ExprParseError, SizeExpr};
use serde::Serialize;
use std::fmt;

/// Maximum number of `HOOK` directives per pass.
pub const SHADER_MAX_HOOKS: usize = 16;
/// Maximum number of `BIND` directives per pass.
pub const SHADER_MAX_BINDS: usize = 16;

/// A 2x2 linear transform with translation
///
/// Parsed from `//!OFFSET` and stored with the pass. It is not currently applied at
/// dispatch time, but it is kept in the descriptor so hosts and a future dispatch path
/// can consume it without a format change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform2x2 {
    pub mat: [[f32; 2]; 2],
    /// Translation component
    pub c: [f32; 2],
}

impl Transform2x2 {
    pub fn identity() -> Self {
        Self { mat: [[1.0, 0.0], [0.0, 1.0]], c: [0.0, 0.0] }
    }
}

impl Default for Transform2x2 {
    fn default() -> Self {
        Self::identity()
    }
}

/// A parsed shader pass descriptor
///
/// Field defaults follow the document format: an unnamed pass is described as
/// `"(unknown)"`, its output size tracks the hooked texture (`HOOKED.w` / `HOOKED.h`)
/// and its condition is the constant `1`.
#[derive(Debug, Clone, Serialize)]
pub struct ShaderPass {
    /// Human-readable description from `DESC`
    pub desc: String,
    /// Stage names this pass hooks, from `HOOK` (at most [`SHADER_MAX_HOOKS`])
    pub hook_tex: Vec<String>,
    /// Texture names to bind in the body, from `BIND` (at most [`SHADER_MAX_BINDS`])
    pub bind_tex: Vec<String>,
    /// Name the output is saved under, from `SAVE`
    pub save_tex: Option<String>,
    /// Raw GLSL body
    pub body: String,
    /// Sampling offset transform from `OFFSET`
    pub offset: Transform2x2,
    /// Component count from `COMPONENTS`
    pub components: i32,
    /// Output width expression from `WIDTH`
    pub width: SizeExpr,
    /// Output height expression from `HEIGHT`
    pub height: SizeExpr,
    /// Execution condition from `WHEN`
    pub cond: SizeExpr,
    /// Whether the pass dispatches as a compute shader, from `COMPUTE`
    pub is_compute: bool,
    /// Compute block size (one block per workgroup)
    pub block_w: i32,
    pub block_h: i32,
    /// Threads per workgroup; zero when `COMPUTE` used the two-argument form
    pub threads_w: i32,
    pub threads_h: i32,
}

impl Default for ShaderPass {
    fn default() -> Self {
        Self {
            desc: "(unknown)".to_string(),
            hook_tex: Vec::new(),
            bind_tex: Vec::new(),
            save_tex: None,
            body: String::new(),
            offset: Transform2x2::identity(),
            components: 0,
            width: SizeExpr::var_w("HOOKED"),
            height: SizeExpr::var_h("HOOKED"),
            cond: SizeExpr::constant(1.0),
            is_compute: false,
            block_w: 0,
            block_h: 0,
            threads_w: 0,
            threads_h: 0,
        }
    }
}

/// An auxiliary lookup texture declared by a `//!TEXTURE` block
#[derive(Debug)]
pub struct LutTexture<L> {
    /// Name the texture is bound under (default `USER_TEX`)
    pub name: String,
    /// The uploaded texture, owned until the hook object is dropped
    pub tex: L,
}

/// One parsed document block
#[derive(Debug)]
pub(crate) enum Block<L> {
    Pass(ShaderPass),
    Texture(LutTexture<L>),
}

/// Splits off the first line, excluding its terminator.
fn split_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(pos) => (&s[..pos], &s[pos + 1..]),
        None => (s, ""),
    }
}

/// Scans leading whitespace-separated float values, stopping at the first token that
/// does not parse. Returns how many values were written.
fn scan_floats(s: &str, out: &mut [f32]) -> usize {
    let mut n = 0;
    for word in s.split_whitespace() {
        if n == out.len() {
            break;
        }
        match word.parse::<f32>() {
            Ok(value) => {
                out[n] = value;
                n += 1;
            }
            Err(_) => break,
        }
    }
    n
}

/// Integer counterpart of [`scan_floats`].
fn scan_ints(s: &str, out: &mut [i32]) -> usize {
    let mut n = 0;
    for word in s.split_whitespace() {
        if n == out.len() {
            break;
        }
        match word.parse::<i32>() {
            Ok(value) => {
                out[n] = value;
                n += 1;
            }
            Err(_) => break,
        }
    }
    n
}

/// Parses one pass block, consuming its header lines and body from `cursor`.
pub(crate) fn parse_pass(cursor: &mut &str) -> Result<ShaderPass, ParseError> {
    let mut out = ShaderPass::default();

    // Parse all headers
    loop {
        let (raw_line, rest) = split_line(cursor);
        let Some(line) = raw_line.trim().strip_prefix("//!") else {
            break;
        };
        *cursor = rest;

        if let Some(args) = line.strip_prefix("HOOK") {
            if out.hook_tex.len() == SHADER_MAX_HOOKS {
                return Err(ParseError::TooManyHooks);
            }
            out.hook_tex.push(args.trim().to_string());
            continue;
        }

        if let Some(args) = line.strip_prefix("BIND") {
            if out.bind_tex.len() == SHADER_MAX_BINDS {
                return Err(ParseError::TooManyBinds);
            }
            out.bind_tex.push(args.trim().to_string());
            continue;
        }

        if let Some(args) = line.strip_prefix("SAVE") {
            out.save_tex = Some(args.trim().to_string());
            continue;
        }

        if let Some(args) = line.strip_prefix("DESC") {
            out.desc = args.trim().to_string();
            continue;
        }

        if let Some(args) = line.strip_prefix("OFFSET") {
            let mut vals = [0.0f32; 2];
            if scan_floats(args, &mut vals) != 2 || !vals.iter().all(|v| v.is_finite()) {
                return Err(ParseError::BadOffset);
            }
            out.offset.c = vals;
            continue;
        }

        if let Some(args) = line.strip_prefix("WIDTH") {
            out.width = SizeExpr::parse(args).map_err(|source| ParseError::Expr { directive: "WIDTH", source })?;
            continue;
        }

        if let Some(args) = line.strip_prefix("HEIGHT") {
            out.height = SizeExpr::parse(args).map_err(|source| ParseError::Expr { directive: "HEIGHT", source })?;
            continue;
        }

        if let Some(args) = line.strip_prefix("WHEN") {
            out.cond = SizeExpr::parse(args).map_err(|source| ParseError::Expr { directive: "WHEN", source })?;
            continue;
        }

        if let Some(args) = line.strip_prefix("COMPONENTS") {
            let mut vals = [0i32; 1];
            if scan_ints(args, &mut vals) != 1 {
                return Err(ParseError::BadComponents);
            }
            out.components = vals[0];
            continue;
        }

        if let Some(args) = line.strip_prefix("COMPUTE") {
            let mut vals = [0i32; 4];
            match scan_ints(args, &mut vals) {
                2 => {
                    out.is_compute = true;
                    out.block_w = vals[0];
                    out.block_h = vals[1];
                }
                4 => {
                    out.is_compute = true;
                    out.block_w = vals[0];
                    out.block_h = vals[1];
                    out.threads_w = vals[2];
                    out.threads_h = vals[3];
                }
                _ => return Err(ParseError::BadCompute),
            }
            continue;
        }

        return Err(ParseError::UnrecognizedCommand(line.to_string()));
    }

    // The rest of the document up to the next header marker is the shader body
    let (body, rest) = match cursor.find("//!") {
        Some(pos) => cursor.split_at(pos),
        None => (*cursor, ""),
    };
    out.body = body.to_string();
    *cursor = rest;

    if out.hook_tex.is_empty() {
        tracing::warn!("pass has no hooked textures (will be ignored)");
    }

    Ok(out)
}

/// Parses one `//!TEXTURE` block, decoding and uploading its hex payload.
pub(crate) fn parse_tex<G: Gpu>(gpu: &G, cursor: &mut &str) -> Result<LutTexture<G::Texture>, ParseError> {
    let mut name = "USER_TEX".to_string();
    let mut w: i32 = 1;
    let mut h: i32 = 1;
    let mut d: i32 = 0;
    let mut format: Option<&TexFormat> = None;
    let mut sample_mode = SampleMode::default();
    let mut address_mode = AddressMode::default();

    loop {
        let (raw_line, rest) = split_line(cursor);
        let Some(line) = raw_line.trim().strip_prefix("//!") else {
            break;
        };
        *cursor = rest;

        if let Some(args) = line.strip_prefix("TEXTURE") {
            name = args.trim().to_string();
            continue;
        }

        if let Some(args) = line.strip_prefix("SIZE") {
            let mut vals = [w, h, d];
            let dims = scan_ints(args, &mut vals);
            let limits = gpu.limits();
            let limit = match dims {
                1 => limits.max_tex_1d_dim,
                2 => limits.max_tex_2d_dim,
                3 => limits.max_tex_3d_dim,
                _ => return Err(ParseError::BadSize),
            };

            // Every present dimension must fit the limit for the parsed dimensionality
            for &size in &vals[..dims] {
                if size < 1 || size as u32 > limit {
                    return Err(ParseError::SizeLimit { size, limit });
                }
            }

            w = vals[0];
            h = if dims < 2 { 0 } else { vals[1] };
            d = if dims < 3 { 0 } else { vals[2] };
            continue;
        }

        if let Some(args) = line.strip_prefix("FORMAT ") {
            let fmt_name = args.trim();
            let found = gpu.formats().iter().find(|fmt| fmt.name == fmt_name);
            let Some(found) = found.filter(|fmt| !fmt.opaque) else {
                return Err(ParseError::UnknownFormat(fmt_name.to_string()));
            };
            if !found.caps.contains(FormatCaps::SAMPLEABLE) {
                return Err(ParseError::FormatNotSampleable(fmt_name.to_string()));
            }
            format = Some(found);
            continue;
        }

        if let Some(args) = line.strip_prefix("FILTER") {
            sample_mode = match args.trim() {
                "LINEAR" => SampleMode::Linear,
                "NEAREST" => SampleMode::Nearest,
                other => return Err(ParseError::UnknownFilter(other.to_string())),
            };
            continue;
        }

        if let Some(args) = line.strip_prefix("BORDER") {
            address_mode = match args.trim() {
                "CLAMP" => AddressMode::Clamp,
                "REPEAT" => AddressMode::Repeat,
                "MIRROR" => AddressMode::Mirror,
                other => return Err(ParseError::UnknownBorder(other.to_string())),
            };
            continue;
        }

        return Err(ParseError::UnrecognizedCommand(line.to_string()));
    }

    let Some(format) = format else {
        return Err(ParseError::MissingFormat);
    };
    if sample_mode == SampleMode::Linear && !format.caps.contains(FormatCaps::LINEAR) {
        return Err(ParseError::FormatNotLinear(format.name.clone()));
    }

    // The rest of the block up to the next header marker is raw hex data
    let (hexdata, rest) = match cursor.find("//!") {
        Some(pos) => cursor.split_at(pos),
        None => (*cursor, ""),
    };
    *cursor = rest;

    let data = hex::decode(hexdata.trim()).map_err(|_| ParseError::BadHexData)?;

    let texels = w as usize * h.max(1) as usize * d.max(1) as usize;
    let expected = texels * format.texel_size;
    if data.len() != expected {
        return Err(ParseError::TextureSizeMismatch { got: data.len(), expected });
    }

    let params = TexParams {
        w: w as u32,
        h: h as u32,
        d: d as u32,
        format,
        sample_mode,
        address_mode,
        sampleable: true,
        data: &data,
    };
    let tex = gpu.create_texture(&params).ok_or(ParseError::TextureCreate)?;

    Ok(LutTexture { name, tex })
}

/// Parses a whole document into its blocks, in order.
pub(crate) fn parse_document<G: Gpu>(gpu: &G, source: &str) -> Result<Vec<Block<G::Texture>>, ParseError> {
    // Skip all garbage (e.g. comments) before the first header
    let Some(pos) = source.find("//!") else {
        return Err(ParseError::NoHeaders);
    };
    let mut cursor = &source[pos..];

    let mut blocks = Vec::new();
    while !cursor.is_empty() {
        // Peek at the first header to dispatch the block type
        if cursor.starts_with("//!TEXTURE") {
            blocks.push(Block::Texture(parse_tex(gpu, &mut cursor)?));
        } else {
            blocks.push(Block::Pass(parse_pass(&mut cursor)?));
        }
    }

    Ok(blocks)
}

/// Errors raised while parsing a user shader document
///
/// All of these are fatal: construction fails and any partially created textures are
/// released.
#[derive(Debug)]
pub enum ParseError {
    /// The document contains no `//!` header at all
    NoHeaders,
    /// A header line names no known command
    UnrecognizedCommand(String),
    /// More than [`SHADER_MAX_HOOKS`] `HOOK` directives in one pass
    TooManyHooks,
    /// More than [`SHADER_MAX_BINDS`] `BIND` directives in one pass
    TooManyBinds,
    /// `OFFSET` did not supply two float arguments
    BadOffset,
    /// `COMPONENTS` did not supply an integer argument
    BadComponents,
    /// `COMPUTE` supplied an argument count other than two or four
    BadCompute,
    /// A `WIDTH`, `HEIGHT` or `WHEN` expression failed to parse
    Expr { directive: &'static str, source: ExprParseError },
    /// `SIZE` supplied no usable dimensions
    BadSize,
    /// A `SIZE` dimension is out of the GPU's range
    SizeLimit { size: i32, limit: u32 },
    /// `FORMAT` names no available (non-opaque) format
    UnknownFormat(String),
    /// The chosen format cannot be sampled
    FormatNotSampleable(String),
    /// `FILTER LINEAR` was requested for a format without linear filtering
    FormatNotLinear(String),
    /// The texture block never specified a `FORMAT`
    MissingFormat,
    /// `FILTER` names no known mode
    UnknownFilter(String),
    /// `BORDER` names no known mode
    UnknownBorder(String),
    /// The texture payload is not a single line of valid hex
    BadHexData,
    /// The decoded payload does not match the declared texture size
    TextureSizeMismatch { got: usize, expected: usize },
    /// The GPU context failed to create or upload the texture
    TextureCreate,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHeaders => write!(f, "shader appears to contain no headers"),
            Self::UnrecognizedCommand(cmd) => write!(f, "unrecognized command '{cmd}'"),
            Self::TooManyHooks => write!(f, "passes may only hook up to {SHADER_MAX_HOOKS} textures"),
            Self::TooManyBinds => write!(f, "passes may only bind up to {SHADER_MAX_BINDS} textures"),
            Self::BadOffset => write!(f, "error while parsing OFFSET"),
            Self::BadComponents => write!(f, "error while parsing COMPONENTS"),
            Self::BadCompute => write!(f, "error while parsing COMPUTE"),
            Self::Expr { directive, source } => write!(f, "error while parsing {directive}: {source}"),
            Self::BadSize => write!(f, "error while parsing SIZE"),
            Self::SizeLimit { size, limit } => write!(f, "SIZE {size} exceeds texture size limits ({limit})"),
            Self::UnknownFormat(name) => write!(f, "unrecognized/unavailable FORMAT name: '{name}'"),
            Self::FormatNotSampleable(name) => write!(f, "chosen FORMAT '{name}' is not sampleable"),
            Self::FormatNotLinear(name) => write!(f, "FORMAT '{name}' cannot be linear filtered"),
            Self::MissingFormat => write!(f, "no FORMAT specified"),
            Self::UnknownFilter(name) => write!(f, "unrecognized FILTER: '{name}'"),
            Self::UnknownBorder(name) => write!(f, "unrecognized BORDER: '{name}'"),
            Self::BadHexData => write!(f, "error while parsing TEXTURE body: must be a valid hexadecimal sequence, on a single line"),
            Self::TextureSizeMismatch { got, expected } => write!(f, "shader TEXTURE size mismatch: got {got} bytes, expected {expected}"),
            Self::TextureCreate => write!(f, "failed uploading custom texture"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Expr { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::szexp::{SizeOp2, SizeToken};
    use crate::testutil::TestGpu;

    fn parse_single_pass(doc: &str) -> ShaderPass {
        let mut cursor = doc;
        let pass = parse_pass(&mut cursor).unwrap();
        assert!(cursor.is_empty(), "residual document: {cursor:?}");
        pass
    }

    #[test]
    fn test_pass_defaults() {
        let pass = parse_single_pass("//!HOOK MAIN\nbody\n");
        assert_eq!(pass.desc, "(unknown)");
        assert_eq!(pass.width, SizeExpr::var_w("HOOKED"));
        assert_eq!(pass.height, SizeExpr::var_h("HOOKED"));
        assert_eq!(pass.cond, SizeExpr::constant(1.0));
        assert_eq!(pass.components, 0);
        assert_eq!(pass.offset, Transform2x2::identity());
        assert!(!pass.is_compute);
        assert!(pass.save_tex.is_none());
    }

    #[test]
    fn test_pass_commands() {
        let doc = "//!HOOK LUMA\n//!HOOK CHROMA\n//!BIND HOOKED\n//!BIND SOME_TEX\n//!SAVE OUT\n//!DESC my pass\n//!OFFSET 1.5 -2.5\n//!WIDTH HOOKED.w 2 *\n//!HEIGHT 32\n//!WHEN OUTPUT.w 500 >\n//!COMPONENTS 3\nvec4 hook() {}\n";
        let pass = parse_single_pass(doc);
        assert_eq!(pass.hook_tex, vec!["LUMA", "CHROMA"]);
        assert_eq!(pass.bind_tex, vec!["HOOKED", "SOME_TEX"]);
        assert_eq!(pass.save_tex.as_deref(), Some("OUT"));
        assert_eq!(pass.desc, "my pass");
        assert_eq!(pass.offset.c, [1.5, -2.5]);
        assert_eq!(pass.width.tokens()[2], SizeToken::Op2(SizeOp2::Mul));
        assert_eq!(pass.components, 3);
        assert_eq!(pass.body, "vec4 hook() {}\n");
    }

    #[test]
    fn test_pass_body_splits_at_next_header() {
        let mut cursor = "//!HOOK MAIN\nline one\nline two\n//!HOOK OUTPUT\nrest\n";
        let pass = parse_pass(&mut cursor).unwrap();
        assert_eq!(pass.body, "line one\nline two\n");
        assert!(cursor.starts_with("//!HOOK OUTPUT"));
    }

    #[test]
    fn test_pass_compute_forms() {
        let two = parse_single_pass("//!HOOK MAIN\n//!COMPUTE 16 8\n");
        assert!(two.is_compute);
        assert_eq!((two.block_w, two.block_h, two.threads_w, two.threads_h), (16, 8, 0, 0));

        let four = parse_single_pass("//!HOOK MAIN\n//!COMPUTE 32 32 8 8\n");
        assert_eq!((four.block_w, four.block_h, four.threads_w, four.threads_h), (32, 32, 8, 8));

        let mut cursor = "//!COMPUTE 16\n";
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::BadCompute)));
        let mut cursor = "//!COMPUTE 16 16 8\n";
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::BadCompute)));
    }

    #[test]
    fn test_pass_hook_overflow() {
        let doc = "//!HOOK MAIN\n".repeat(SHADER_MAX_HOOKS + 1);
        let mut cursor = doc.as_str();
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::TooManyHooks)));
    }

    #[test]
    fn test_pass_bind_overflow() {
        let doc = "//!BIND X\n".repeat(SHADER_MAX_BINDS + 1);
        let mut cursor = doc.as_str();
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::TooManyBinds)));
    }

    #[test]
    fn test_pass_unrecognized_command() {
        let mut cursor = "//!FROBNICATE 1\n";
        match parse_pass(&mut cursor) {
            Err(ParseError::UnrecognizedCommand(cmd)) => assert_eq!(cmd, "FROBNICATE 1"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_pass_bad_offset() {
        let mut cursor = "//!OFFSET 1.0\n";
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::BadOffset)));
        let mut cursor = "//!OFFSET x y\n";
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::BadOffset)));
    }

    #[test]
    fn test_pass_bad_expression() {
        let mut cursor = "//!WIDTH bogus\n";
        assert!(matches!(parse_pass(&mut cursor), Err(ParseError::Expr { directive: "WIDTH", .. })));
    }

    #[test]
    fn test_pass_commands_without_space() {
        // Command prefixes are matched without requiring a separator
        let pass = parse_single_pass("//!HOOKMAIN\n");
        assert_eq!(pass.hook_tex, vec!["MAIN"]);
    }

    #[test]
    fn test_texture_block() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE WEIGHTS\n//!SIZE 2\n//!FORMAT rgba8\n//!FILTER NEAREST\n//!BORDER REPEAT\ndeadbeefcafebabe\n";
        let lut = parse_tex(&gpu, &mut cursor).unwrap();
        assert_eq!(lut.name, "WEIGHTS");
        assert_eq!((lut.tex.w, lut.tex.h, lut.tex.d), (2, 0, 0));
        assert_eq!(lut.tex.format, "rgba8");
        assert_eq!(lut.tex.address_mode, AddressMode::Repeat);
        assert_eq!(lut.tex.data, hex::decode("deadbeefcafebabe").unwrap());
    }

    #[test]
    fn test_texture_default_name() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE\n//!SIZE 1\n//!FORMAT rgba8\n00112233\n";
        let lut = parse_tex(&gpu, &mut cursor).unwrap();
        assert_eq!(lut.name, "");

        let mut cursor = "//!SIZE 1\n//!FORMAT rgba8\n00112233\n";
        let lut = parse_tex(&gpu, &mut cursor).unwrap();
        assert_eq!(lut.name, "USER_TEX");
    }

    #[test]
    fn test_texture_3d_payload_size() {
        let gpu = TestGpu::new();
        // 2 x 2 x 2 texels of rgba8 -> 32 bytes -> 64 hex digits
        let payload = "00".repeat(32);
        let doc = format!("//!TEXTURE T\n//!SIZE 2 2 2\n//!FORMAT rgba8\n{payload}\n");
        let mut cursor = doc.as_str();
        let lut = parse_tex(&gpu, &mut cursor).unwrap();
        assert_eq!((lut.tex.w, lut.tex.h, lut.tex.d), (2, 2, 2));
    }

    #[test]
    fn test_texture_payload_size_mismatch() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE T\n//!SIZE 2\n//!FORMAT rgba8\ndead\n";
        match parse_tex(&gpu, &mut cursor) {
            Err(ParseError::TextureSizeMismatch { got, expected }) => {
                assert_eq!(got, 2);
                assert_eq!(expected, 8);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_texture_payload_must_be_single_line() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE T\n//!SIZE 2\n//!FORMAT rgba8\ndeadbeef\ncafebabe\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::BadHexData)));
    }

    #[test]
    fn test_texture_bad_hex() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE T\n//!SIZE 1\n//!FORMAT rgba8\nzzzzzzzz\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::BadHexData)));
    }

    #[test]
    fn test_texture_unknown_format() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE T\n//!FORMAT nonsense\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::UnknownFormat(_))));
    }

    #[test]
    fn test_texture_opaque_format_rejected() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE T\n//!FORMAT opaque4\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::UnknownFormat(_))));
    }

    #[test]
    fn test_texture_linear_filter_requires_cap() {
        let gpu = TestGpu::new();
        // r32f is sampleable but not linearly filterable in the test GPU
        let mut cursor = "//!TEXTURE T\n//!SIZE 1\n//!FORMAT r32f\n//!FILTER LINEAR\n00000000\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::FormatNotLinear(_))));

        // FILTER may precede FORMAT; the capability check runs after the headers
        let mut cursor = "//!TEXTURE T\n//!SIZE 1\n//!FILTER LINEAR\n//!FORMAT rgba8\n00112233\n";
        assert!(parse_tex(&gpu, &mut cursor).is_ok());
    }

    #[test]
    fn test_texture_missing_format() {
        let gpu = TestGpu::new();
        let mut cursor = "//!TEXTURE T\n//!SIZE 1\n00112233\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::MissingFormat)));
    }

    #[test]
    fn test_texture_size_limits() {
        let gpu = TestGpu::new();
        let over = gpu.limits.max_tex_2d_dim + 1;
        let doc = format!("//!TEXTURE T\n//!SIZE 2 {over}\n//!FORMAT rgba8\n00\n");
        let mut cursor = doc.as_str();
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::SizeLimit { .. })));

        let mut cursor = "//!TEXTURE T\n//!SIZE 0\n//!FORMAT rgba8\n00\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::SizeLimit { .. })));

        let mut cursor = "//!TEXTURE T\n//!SIZE\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::BadSize)));
    }

    #[test]
    fn test_texture_create_failure() {
        let gpu = TestGpu::failing();
        let mut cursor = "//!TEXTURE T\n//!SIZE 1\n//!FORMAT rgba8\n00112233\n";
        assert!(matches!(parse_tex(&gpu, &mut cursor), Err(ParseError::TextureCreate)));
    }

    #[test]
    fn test_document_dispatch() {
        let gpu = TestGpu::new();
        let doc = "some leading garbage\n//!HOOK MAIN\nbody a\n//!TEXTURE LUT\n//!SIZE 1\n//!FORMAT rgba8\n00112233\n//!HOOK OUTPUT\nbody b\n";
        let blocks = parse_document(&gpu, doc).unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(matches!(&blocks[0], Block::Pass(pass) if pass.body == "body a\n"));
        assert!(matches!(&blocks[1], Block::Texture(lut) if lut.name == "LUT"));
        assert!(matches!(&blocks[2], Block::Pass(pass) if pass.body == "body b\n"));
    }

    #[test]
    fn test_document_without_headers() {
        let gpu = TestGpu::new();
        assert!(matches!(parse_document(&gpu, ""), Err(ParseError::NoHeaders)));
        assert!(matches!(parse_document(&gpu, "just a comment\n"), Err(ParseError::NoHeaders)));
    }

    #[test]
    fn test_document_error_propagates() {
        let gpu = TestGpu::new();
        let doc = "//!HOOK MAIN\nbody\n//!NOPE\n";
        assert!(matches!(parse_document(&gpu, doc), Err(ParseError::UnrecognizedCommand(_))));
    }

    #[test]
    fn test_parser_is_total_on_garbage() {
        let gpu = TestGpu::new();
        for doc in [
            "//!",
            "//!TEXTURE",
            "//! \n",
            "//!HOOK",
            "//!HOOK MAIN\n//!",
            "//!TEXTURE\n//!SIZE -5\n",
            "//!TEXTURE\n//!SIZE 1 1 1 1\n",
            "//!WIDTH \u{7f}\n",
            "x//!y",
        ] {
            // Must return cleanly, never panic
            let _ = parse_document(&gpu, doc);
        }
    }
}
