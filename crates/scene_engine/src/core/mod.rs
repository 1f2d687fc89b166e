//! # Core Engine Module
//!
//! Shared configuration used by the pipeline manager and the subsystems it
//! drives.

pub mod config;

pub use config::{
    Config,
    ConfigError,
    CullingConfig,
    EngineConfig,
    ProcessorConfig,
    ThreadingModel,
};
