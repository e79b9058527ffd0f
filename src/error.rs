//=========================================================================
// Engine Errors
//=========================================================================
//
// Fatal, native-level failures. Script-level failures are `ScriptFault`s
// and never surface here: they are reported and the frame continues.
//
//=========================================================================

use std::path::PathBuf;

use thiserror::Error;

use crate::core::input::UnknownDeviceCode;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    ConfigValue(#[from] UnknownDeviceCode),

    #[error("event loop failure: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    /// The window (and with it the render surface) could not be created.
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
}

pub type EngineResult<T> = Result<T, EngineError>;
