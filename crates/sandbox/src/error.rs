use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script directory {}: {source}", path.display())]
    ScriptDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command not found on PATH: {name}")]
    NotOnPath { name: String },

    #[error("script scan task failed: {0}")]
    ScanTask(#[from] tokio::task::JoinError),
}
