//! Change notifications for the file adapter's input file.
//!
//! Watches the parent directory (non-recursively) so the file can be
//! replaced or recreated without losing the watch.

use std::{path::Path, time::Duration};

use {
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::error::Result;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Keeps the debouncer alive; dropping it stops the watch.
pub struct InputWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl InputWatcher {
    /// Start watching `file`. The receiver yields one unit per debounced batch
    /// that touched it.
    pub fn start(file: &Path) -> Result<(Self, mpsc::UnboundedReceiver<()>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = file.file_name().map(|n| n.to_os_string());
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };

        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let touched = events.iter().any(|event| {
                        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name().map(|n| n.to_os_string()) == target)
                    });
                    if touched {
                        debug!("input file changed");
                        let _ = tx.send(());
                    }
                },
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "input watcher error");
                    }
                },
            }
        })?;

        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "watching input directory");

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}
