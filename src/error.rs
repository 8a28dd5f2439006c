use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// The error type for configuration, capture, matching and action failures.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config is not valid YAML: {source}")]
    ConfigParse {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Config validation failed: {description}")]
    ConfigInvalid { description: String },

    #[error("Screen capture failed: {description}")]
    CaptureFailed { description: String },

    #[error("Failed to load template {path:?}: {source}")]
    TemplateLoad {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Template {path:?} is empty")]
    EmptyTemplate { path: PathBuf },

    #[error("Failed to decode image: {source}")]
    ImageDecode {
        #[from]
        source: image::ImageError,
    },

    #[error("Failed to save image {path:?}: {source}")]
    ImageSave {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("Command '{command}' failed: {description}")]
    CommandFailed { command: String, description: String },

    #[error("WebDriver request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("No browser driver available")]
    NoBrowser,

    #[error("Variable store {path:?}: {description}")]
    Variables { path: PathBuf, description: String },

    #[error("Operation timed out after {duration:?}: {description}")]
    Timeout {
        duration: std::time::Duration,
        description: String,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn invalid(description: impl Into<String>) -> Self {
        RunnerError::ConfigInvalid {
            description: description.into(),
        }
    }

    pub fn capture(description: impl Into<String>) -> Self {
        RunnerError::CaptureFailed {
            description: description.into(),
        }
    }

    /// True for errors raised while loading or validating the configuration.
    /// These are fatal at startup; everything else is reported per action.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RunnerError::ConfigRead { .. }
                | RunnerError::ConfigParse { .. }
                | RunnerError::ConfigInvalid { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_classified() {
        assert!(RunnerError::invalid("missing target").is_config_error());
        assert!(!RunnerError::capture("no display").is_config_error());
        assert!(!RunnerError::NoBrowser.is_config_error());
    }

    #[test]
    fn test_error_messages() {
        let err = RunnerError::CommandFailed {
            command: "xdotool".to_string(),
            description: "exit status 1".to_string(),
        };
        assert_eq!(err.to_string(), "Command 'xdotool' failed: exit status 1");
    }
}
