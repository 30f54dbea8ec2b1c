/// Build orchestration error types
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(#[from] qgo_config::ConfigError),

    #[error("Missing entry point: no .go file with func main() found under {dir}")]
    MissingEntryPoint { dir: PathBuf },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Failed to launch `{command}`: {error}")]
    Spawn {
        command: String,
        error: std::io::Error,
    },

    #[error("Stage {stage} failed ({reason}): {command}")]
    StageFailed {
        stage: usize,
        command: String,
        reason: StageFailure,
    },

    #[error("Injected command for stage {stage} failed ({reason}): {command}")]
    InjectionFailed {
        stage: usize,
        command: String,
        reason: String,
    },

    #[error("No scripts defined in the manifest")]
    NoScripts,

    #[error("\"{name}\" script does not exist or cannot be found")]
    UnknownScript { name: String },

    #[error("No process has been started")]
    NoProcess,

    #[error("Failed to kill process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a launch error for the given command line
    pub fn spawn(command: impl Into<String>, error: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            error,
        }
    }

    /// Create a missing entry point error
    pub fn missing_entry_point(dir: impl Into<PathBuf>) -> Self {
        Self::MissingEntryPoint { dir: dir.into() }
    }
}

/// Why a pipeline stage was judged to have failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFailure {
    /// Non-zero exit (or terminated by a signal when `None`)
    ExitCode(Option<i32>),
    /// Zero exit, but the stage wrote to stderr
    Stderr { bytes: usize },
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode(Some(code)) => write!(f, "exit code {}", code),
            Self::ExitCode(None) => write!(f, "terminated by signal"),
            Self::Stderr { bytes } => write!(f, "{} bytes written to stderr", bytes),
        }
    }
}

impl From<qgo_config::LookupError> for BuildError {
    fn from(error: qgo_config::LookupError) -> Self {
        Self::Config(error.into())
    }
}
