use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path an adapter depends on is unusable. Disables that adapter only.
    #[error("{context} ({}): {source}", path.display())]
    Filesystem {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown text encoding '{label}'")]
    UnknownEncoding { label: String },

    #[cfg(feature = "file-watcher")]
    #[error("file watcher: {0}")]
    Watch(#[from] notify_debouncer_full::notify::Error),

    #[error(transparent)]
    Channel(#[from] chatbridge_channels::Error),

    #[error(transparent)]
    Sandbox(#[from] chatbridge_sandbox::Error),
}

impl Error {
    pub fn filesystem(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            context,
            path: path.into(),
            source,
        }
    }

    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::Filesystem { .. } | Self::UnknownEncoding { .. })
    }
}
