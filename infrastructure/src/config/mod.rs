//! Configuration file loading.

mod file_config;
mod loader;

pub use file_config::{
    FileConfig, FileLocalModelConfig, FileLogConfig, FileOpenAiConfig, FileSecretsConfig,
};
pub use loader::ConfigLoader;
