//! Flat per-session archive of telemetry snapshots.
//!
//! Each snapshot lands in its own file named from its timestamp at second
//! granularity, so two snapshots taken in the same second share a name and
//! the later write wins.

use std::{io, path::PathBuf};

use anthill_types::{
    config::{ArchiveConfig, ArchiveTimeZone},
    telemetry::TelemetrySnapshot,
    AnthillError, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, info};

pub const IDENTIFIER_PREFIX: &str = "debug_";

/// Destination for finished snapshots.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Stores the snapshot and returns its archive identifier.
    async fn submit(&self, snapshot: TelemetrySnapshot) -> Result<String>;
}

/// Derives `debug_<YYYYMMDD>_<HHMMSS>.<ext>` from epoch milliseconds.
pub fn archive_identifier(
    timestamp_ms: i64,
    timezone: ArchiveTimeZone,
    extension: &str,
) -> Result<String> {
    let stamp = match timezone {
        ArchiveTimeZone::Utc => format_stamp(Utc.timestamp_millis_opt(timestamp_ms).single()),
        ArchiveTimeZone::Local => {
            format_stamp(Local.timestamp_millis_opt(timestamp_ms).single())
        }
    }
    .ok_or_else(|| {
        AnthillError::InvalidSnapshot(format!("timestamp {timestamp_ms} is out of range"))
    })?;
    Ok(format!("{IDENTIFIER_PREFIX}{stamp}.{extension}"))
}

fn format_stamp<Tz: TimeZone>(moment: Option<DateTime<Tz>>) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    moment.map(|m| m.format("%Y%m%d_%H%M%S").to_string())
}

/// Rejects anything that could escape the archive directory.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty()
        || identifier.contains("..")
        || identifier.contains('/')
        || identifier.contains('\\')
    {
        return Err(AnthillError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LogArchive {
    dir: PathBuf,
    extension: String,
    timezone: ArchiveTimeZone,
}

impl LogArchive {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.log_dir),
            extension: config.extension.clone(),
            timezone: config.timezone,
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn identifier_for(&self, timestamp_ms: i64) -> Result<String> {
        archive_identifier(timestamp_ms, self.timezone, &self.extension)
    }

    /// Writes the snapshot whole, overwriting any same-second predecessor.
    pub async fn archive(&self, snapshot: &TelemetrySnapshot) -> Result<String> {
        let identifier = self.identifier_for(snapshot.timestamp)?;
        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| AnthillError::PersistenceWrite(format!("serialize snapshot: {err}")))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| AnthillError::PersistenceWrite(format!("create log dir: {err}")))?;
        let path = self.dir.join(&identifier);
        tokio::fs::write(&path, body)
            .await
            .map_err(|err| AnthillError::PersistenceWrite(format!("{}: {err}", path.display())))?;
        info!("Archived telemetry snapshot as {}", identifier);
        Ok(identifier)
    }

    /// All stored identifiers, newest first.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AnthillError::Ops(format!("list log dir: {err}"))),
        };

        let suffix = format!(".{}", self.extension);
        let mut identifiers = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| AnthillError::Ops(format!("list log dir: {err}")))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(&suffix) {
                    identifiers.push(name.to_string());
                }
            }
        }
        identifiers.sort_unstable_by(|a, b| b.cmp(a));
        debug!("Listed {} archived snapshots", identifiers.len());
        Ok(identifiers)
    }

    pub async fn read(&self, identifier: &str) -> Result<TelemetrySnapshot> {
        validate_identifier(identifier)?;
        let path = self.dir.join(identifier);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AnthillError::NotFound(identifier.to_string()))
            }
            Err(err) => {
                return Err(AnthillError::Ops(format!("{}: {err}", path.display())));
            }
        };
        serde_json::from_slice(&raw).map_err(|err| AnthillError::Corrupt {
            identifier: identifier.to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl ArchiveSink for LogArchive {
    async fn submit(&self, snapshot: TelemetrySnapshot) -> Result<String> {
        self.archive(&snapshot).await
    }
}
