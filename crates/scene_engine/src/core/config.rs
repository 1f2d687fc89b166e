//! # Engine Configuration
//!
//! Configuration for the pipeline manager, the rendering processors it
//! drives and the cull stage. All structures are serializable so an
//! application can ship them as TOML or RON next to its assets.
//!
//! ## Configuration Categories
//!
//! - **Engine Config**: threading model, frame pacing, logging
//! - **Processor Config**: per-surface rendering options
//! - **Culling Config**: traversal behaviour and scratch sizing

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// How the manager maps pipelines onto threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThreadingModel {
    /// One thread drives every surface sequentially
    #[default]
    SingleThread,
    /// Each surface gets a dedicated render thread
    ThreadPerSurface,
}

/// # Processor Configuration
///
/// Options applied to every [`RenderingProcessor`](crate::render::RenderingProcessor)
/// a manager creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Release the graphics context on dispose (single-threaded ownership)
    pub single_thread_resource_release: bool,
    /// Draw transparent geometry in a second pass after all opaque geometry
    pub two_pass_transparency: bool,
    /// Fragments with alpha at or below this value are discarded
    pub alpha_test_cutoff: f32,
    /// Distance between the eyes for stereo rendering, in world units
    pub stereo_eye_separation: f32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            single_thread_resource_release: false,
            two_pass_transparency: false,
            alpha_test_cutoff: 0.0,
            stereo_eye_separation: 0.066,
        }
    }
}

impl ProcessorConfig {
    /// Enable context release on dispose
    pub fn with_single_thread_resource_release(mut self, enabled: bool) -> Self {
        self.single_thread_resource_release = enabled;
        self
    }

    /// Enable two-pass transparency
    pub fn with_two_pass_transparency(mut self, enabled: bool) -> Self {
        self.two_pass_transparency = enabled;
        self
    }

    /// Set the alpha test cutoff
    pub fn with_alpha_test_cutoff(mut self, cutoff: f32) -> Self {
        self.alpha_test_cutoff = cutoff;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.alpha_test_cutoff) {
            return Err(format!("Alpha test cutoff must be within [0, 1], got {}", self.alpha_test_cutoff));
        }
        if self.stereo_eye_separation < 0.0 || !self.stereo_eye_separation.is_finite() {
            return Err("Stereo eye separation must be a finite, non-negative distance".to_string());
        }
        Ok(())
    }
}

/// # Culling Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    /// Test node bounds against the view frustum
    pub enable_frustum_culling: bool,
    /// Number of instruction slots the traversal arena starts with
    pub initial_instruction_depth: usize,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enable_frustum_culling: true,
            initial_instruction_depth: 16,
        }
    }
}

/// # Engine Configuration
///
/// Core behaviour of the pipeline manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log filter used when the application initialises logging
    pub log_level: String,
    /// Thread mapping for pipelines
    pub threading_model: ThreadingModel,
    /// Target FPS for frame rate limiting
    pub target_fps: Option<u32>,
    /// Stop after this many frames (demo and test runs)
    pub max_frames: Option<u64>,
    /// Rendering processor options
    pub processor: ProcessorConfig,
    /// Cull stage options
    pub culling: CullingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            threading_model: ThreadingModel::default(),
            target_fps: None,
            max_frames: None,
            processor: ProcessorConfig::default(),
            culling: CullingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the threading model
    pub fn with_threading_model(mut self, model: ThreadingModel) -> Self {
        self.threading_model = model;
        self
    }

    /// Set target FPS
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Limit the number of frames run
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Set processor options
    pub fn with_processor(mut self, processor: ProcessorConfig) -> Self {
        self.processor = processor;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.log_level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }
        if self.target_fps == Some(0) {
            return Err("Target FPS must be at least 1".to_string());
        }
        if self.culling.initial_instruction_depth == 0 {
            return Err("Instruction arena needs at least one slot".to_string());
        }
        self.processor.validate()
    }
}

impl Config for EngineConfig {
    fn check_values(&self) -> Result<(), String> {
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threading_model, ThreadingModel::SingleThread);
        assert!(!config.processor.single_thread_resource_release);
    }

    #[test]
    fn test_invalid_alpha_cutoff_rejected() {
        let config = EngineConfig::new().with_processor(ProcessorConfig::default().with_alpha_test_cutoff(1.5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_document_uses_defaults() {
        let text = r#"
            threading_model = "ThreadPerSurface"
            target_fps = 60

            [processor]
            two_pass_transparency = true
        "#;
        let config = EngineConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();
        assert_eq!(config.threading_model, ThreadingModel::ThreadPerSurface);
        assert_eq!(config.target_fps, Some(60));
        assert!(config.processor.two_pass_transparency);
        assert_eq!(config.culling, CullingConfig::default());
    }

    #[test]
    fn test_parsed_values_are_validated() {
        let text = r#"
            target_fps = 0
        "#;
        let result = EngineConfig::from_str_with_format(text, ConfigFormat::Toml);
        assert!(matches!(result, Err(ConfigError::Invalid(message)) if message.contains("Target FPS")));
        assert!(matches!(
            EngineConfig::from_str_with_format("target_fps = ", ConfigFormat::Toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig::new()
            .with_threading_model(ThreadingModel::ThreadPerSurface)
            .with_max_frames(3);
        let text = config.to_string_with_format(ConfigFormat::Ron).unwrap();
        let parsed = EngineConfig::from_str_with_format(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(parsed, config);
    }
}
