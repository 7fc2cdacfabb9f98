use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{Effect, EffectCore};
use crate::material::UniformRegistry;

const FRAGMENT: &str = include_str!("shaders/tone_mapping.wgsl");

/// Tone mapping operators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneMappingMode {
    /// Exposure only.
    Linear,
    Reinhard,
    /// Reinhard with a white point.
    Reinhard2,
    #[default]
    AcesFilmic,
}

impl ToneMappingMode {
    /// Value of the `TONE_MAPPING_MODE` constant in the shader.
    pub fn index(self) -> u32 {
        match self {
            ToneMappingMode::Linear => 0,
            ToneMappingMode::Reinhard => 1,
            ToneMappingMode::Reinhard2 => 2,
            ToneMappingMode::AcesFilmic => 3,
        }
    }
}

/// Maps high dynamic range colors into the displayable range.
pub struct ToneMappingEffect {
    core: EffectCore,
    mode: ToneMappingMode,
}

impl ToneMappingEffect {
    pub fn new(mode: ToneMappingMode) -> Self {
        let uniforms = UniformRegistry::new()
            .with("exposure", 1.0f32)
            .with("white_point", 4.0f32);
        Self {
            core: EffectCore::new("tone_mapping", FRAGMENT)
                .with_uniforms(uniforms)
                .with_define("TONE_MAPPING_MODE", mode.index().to_string()),
            mode,
        }
    }

    pub fn mode(&self) -> ToneMappingMode {
        self.mode
    }

    /// Changing the operator requires a recompile.
    pub fn set_mode(&mut self, mode: ToneMappingMode) {
        self.mode = mode;
        self.core.set_define("TONE_MAPPING_MODE", mode.index().to_string());
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.core.set_uniform("exposure", exposure);
    }

    pub fn set_white_point(&mut self, white_point: f32) {
        self.core.set_uniform("white_point", white_point.max(f32::EPSILON));
    }
}

impl Default for ToneMappingEffect {
    fn default() -> Self {
        Self::new(ToneMappingMode::default())
    }
}

impl Effect for ToneMappingEffect {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EffectCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_a_valued_define() {
        let mut effect = ToneMappingEffect::new(ToneMappingMode::Reinhard);
        assert_eq!(effect.core().defines().get("TONE_MAPPING_MODE").map(String::as_str), Some("1"));
        let revision = effect.core().revision();
        effect.set_mode(ToneMappingMode::Reinhard);
        assert_eq!(effect.core().revision(), revision);
        effect.set_mode(ToneMappingMode::Linear);
        assert_eq!(effect.core().revision(), revision + 1);
    }

    #[test]
    fn mode_parses_from_toml() {
        #[derive(Deserialize)]
        struct Settings {
            mode: ToneMappingMode,
        }
        let settings: Settings = toml::from_str("mode = \"reinhard2\"").unwrap();
        assert_eq!(settings.mode, ToneMappingMode::Reinhard2);
    }
}
