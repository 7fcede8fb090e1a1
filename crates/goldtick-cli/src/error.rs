use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] goldtick_core::ConfigError),

    #[error(transparent)]
    Source(#[from] goldtick_core::SourceError),

    #[error(transparent)]
    Pipeline(#[from] goldtick_core::PipelineError),

    #[error(transparent)]
    Warehouse(#[from] goldtick_core::WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Source(_) => 3,
            Self::Pipeline(_) => 3,
            Self::Serialization(_) => 4,
            Self::Warehouse(_) => 10,
            Self::Io(_) => 10,
        }
    }
}
