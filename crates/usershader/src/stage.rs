//! Pipeline stages and their mpv-facing names
//!
//! The surrounding renderer exposes a fixed set of pipeline stages at which user passes
//! can run. Stages are encoded as bits in a 16-bit set so that a single pass can hook
//! several stages at once and the engine can test membership with a mask intersection.

use bitflags::bitflags;

bitflags! {
    /// A set of pipeline stages
    ///
    /// Each flag marks one discrete point in the render pipeline. The textual names used
    /// in shader documents differ from the flag names in two places inherited from mpv:
    /// `MAIN` maps to [`HookStage::RGB_OVERLAY`] and `MAINPRESUB` maps to
    /// [`HookStage::RGB`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookStage: u16 {
        const RGB_INPUT     = 1 << 0;
        const LUMA_INPUT    = 1 << 1;
        const CHROMA_INPUT  = 1 << 2;
        const ALPHA_INPUT   = 1 << 3;
        const XYZ_INPUT     = 1 << 4;

        const CHROMA_SCALED = 1 << 5;
        const ALPHA_SCALED  = 1 << 6;

        const NATIVE        = 1 << 7;
        const RGB           = 1 << 8;
        const RGB_OVERLAY   = 1 << 9;

        const LINEAR        = 1 << 10;
        const SIGMOID       = 1 << 11;
        const PREKERNEL     = 1 << 12;
        const POSTKERNEL    = 1 << 13;

        const SCALED        = 1 << 14;
        const OUTPUT        = 1 << 15;
    }
}

/// Stage flag / document name pairs, in pipeline order. Both mapping directions run
/// over this table so the bijection holds by construction.
const STAGE_NAMES: &[(HookStage, &str)] = &[
    (HookStage::RGB_INPUT, "RGB"),
    (HookStage::LUMA_INPUT, "LUMA"),
    (HookStage::CHROMA_INPUT, "CHROMA"),
    (HookStage::ALPHA_INPUT, "ALPHA"),
    (HookStage::XYZ_INPUT, "XYZ"),
    (HookStage::CHROMA_SCALED, "CHROMA_SCALED"),
    (HookStage::ALPHA_SCALED, "ALPHA_SCALED"),
    (HookStage::NATIVE, "NATIVE"),
    (HookStage::RGB, "MAINPRESUB"),
    (HookStage::RGB_OVERLAY, "MAIN"),
    (HookStage::LINEAR, "LINEAR"),
    (HookStage::SIGMOID, "SIGMOID"),
    (HookStage::PREKERNEL, "PREKERNEL"),
    (HookStage::POSTKERNEL, "POSTKERNEL"),
    (HookStage::SCALED, "SCALED"),
    (HookStage::OUTPUT, "OUTPUT"),
];

impl HookStage {
    /// Maps a textual stage name from a shader document to a stage set
    ///
    /// Unknown names map to the empty set, which makes the referring pass inert rather
    /// than failing the parse.
    pub fn from_mp_name(name: &str) -> Self {
        STAGE_NAMES.iter().find(|(_, n)| *n == name).map_or(Self::empty(), |(stage, _)| *stage)
    }

    /// Returns the textual name of a single-stage set
    ///
    /// Empty or multi-bit sets have no document name and render as `"UNKNOWN"`.
    pub fn mp_name(self) -> &'static str {
        STAGE_NAMES.iter().find(|(stage, _)| *stage == self).map_or("UNKNOWN", |(_, name)| *name)
    }
}
