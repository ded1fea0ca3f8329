mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    AnalysisSettings, ConfigError, Environment, RecognitionSettings, ReportSettings, Settings,
    StoreBackend,
};
