// File trigger: reports files newly created in a watched directory

use crate::errors::{TriggerPollError, ValidationError};
use crate::models::{SourceKind, TriggerEvent};
use crate::trigger::TriggerSource;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

/// Simple file-name glob: `*` matches any run of characters, `?` exactly one
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    glob: String,
    regex: Regex,
}

impl FilenamePattern {
    pub fn new(glob: &str) -> Result<Self, ValidationError> {
        if glob.is_empty() {
            return Err(ValidationError::InvalidPattern {
                pattern: glob.to_string(),
                reason: "pattern cannot be empty".to_string(),
            });
        }

        let mut source = String::with_capacity(glob.len() + 12);
        source.push_str("(?s)^");
        for c in glob.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| ValidationError::InvalidPattern {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

pub struct FileTrigger {
    directory: PathBuf,
    pattern: FilenamePattern,
    seen: HashSet<OsString>,
    max_events_per_poll: Option<usize>,
}

impl FileTrigger {
    /// Watch `directory`, creating it if missing. Emitted paths are absolute.
    pub async fn new(
        directory: impl AsRef<Path>,
        pattern: FilenamePattern,
    ) -> Result<Self, TriggerPollError> {
        let directory = directory.as_ref();
        let listing_error = |e: std::io::Error| TriggerPollError::DirectoryListing {
            path: directory.display().to_string(),
            reason: e.to_string(),
        };

        tokio::fs::create_dir_all(directory).await.map_err(listing_error)?;
        let directory = tokio::fs::canonicalize(directory).await.map_err(listing_error)?;

        debug!(directory = %directory.display(), pattern = pattern.as_str(), "Watching directory");

        Ok(Self {
            directory,
            pattern,
            seen: HashSet::new(),
            max_events_per_poll: None,
        })
    }

    pub fn with_max_events_per_poll(mut self, limit: Option<usize>) -> Self {
        self.max_events_per_poll = limit;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn listing_error(&self, e: std::io::Error) -> TriggerPollError {
        TriggerPollError::DirectoryListing {
            path: self.directory.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl TriggerSource for FileTrigger {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    #[instrument(skip(self), fields(directory = %self.directory.display()))]
    async fn poll(&mut self) -> Result<Vec<TriggerEvent>, TriggerPollError> {
        let read_dir = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| self.listing_error(e))?;
        let mut entries = ReadDirStream::new(read_dir);

        let mut fresh = Vec::new();
        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(|e| self.listing_error(e))?;
            let name = entry.file_name();
            if self.seen.contains(&name) || !self.pattern.matches(&name.to_string_lossy()) {
                continue;
            }
            // Follows symlinks; entries that vanished since listing are skipped
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => fresh.push(name),
                _ => continue,
            }
        }

        fresh.sort();
        if let Some(limit) = self.max_events_per_poll {
            fresh.truncate(limit);
        }

        let events: Vec<TriggerEvent> = fresh
            .into_iter()
            .map(|name| {
                let path = self.directory.join(&name);
                self.seen.insert(name);
                TriggerEvent::file(path)
            })
            .collect();

        if !events.is_empty() {
            debug!(count = events.len(), "New files observed");
        }
        Ok(events)
    }

    fn release(&mut self, event: &TriggerEvent) {
        let Some(path) = event.file_path() else {
            return;
        };
        if path.parent() != Some(self.directory.as_path()) {
            return;
        }
        if let Some(name) = path.file_name() {
            if self.seen.remove(name) {
                debug!(file = %path.display(), "File released for redelivery");
            }
        }
    }
}
