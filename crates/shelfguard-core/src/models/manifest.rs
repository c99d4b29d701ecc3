use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use super::{ContentHash, UploadRecord};
use crate::constants::MANIFEST_COLUMNS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManifestAction {
    Moved,
    Renamed,
    Discarded,
}

impl Display for ManifestAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ManifestAction::Moved => write!(f, "moved"),
            ManifestAction::Renamed => write!(f, "renamed"),
            ManifestAction::Discarded => write!(f, "discarded"),
        }
    }
}

impl FromStr for ManifestAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moved" => Ok(ManifestAction::Moved),
            "renamed" => Ok(ManifestAction::Renamed),
            "discarded" => Ok(ManifestAction::Discarded),
            _ => Err(anyhow::anyhow!("Invalid manifest action: {}", s)),
        }
    }
}

/// One line of the audit manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub timestamp: DateTime<Utc>,
    pub upload_id: Uuid,
    pub original_filename: String,
    pub destination_path: Option<PathBuf>,
    pub content_hash: Option<ContentHash>,
    pub size_bytes: u64,
    pub action: ManifestAction,
    pub reason: Option<String>,
}

impl ManifestEntry {
    pub fn for_record(
        record: &UploadRecord,
        action: ManifestAction,
        destination_path: Option<PathBuf>,
        reason: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            upload_id: record.id,
            original_filename: record.original_filename.clone(),
            destination_path,
            content_hash: record.content_hash.clone(),
            size_bytes: record.size_bytes,
            action,
            reason,
        }
    }

    /// Fields in manifest column order. Absent values are empty strings.
    pub fn to_row(&self) -> [String; 8] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.upload_id.to_string(),
            self.original_filename.clone(),
            self.destination_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.content_hash
                .as_ref()
                .map(|h| h.to_string())
                .unwrap_or_default(),
            self.size_bytes.to_string(),
            self.action.to_string(),
            self.reason.clone().unwrap_or_default(),
        ]
    }

    /// Parse a row produced by [`ManifestEntry::to_row`].
    pub fn from_row<S: AsRef<str>>(row: &[S]) -> Result<Self, anyhow::Error> {
        if row.len() != MANIFEST_COLUMNS.len() {
            anyhow::bail!(
                "Manifest row has {} columns, expected {}",
                row.len(),
                MANIFEST_COLUMNS.len()
            );
        }
        let field = |i: usize| row[i].as_ref();
        let optional = |i: usize| Some(field(i)).filter(|s| !s.is_empty());

        Ok(Self {
            timestamp: DateTime::parse_from_rfc3339(field(0))?.with_timezone(&Utc),
            upload_id: field(1).parse()?,
            original_filename: field(2).to_string(),
            destination_path: optional(3).map(PathBuf::from),
            content_hash: optional(4).map(str::parse).transpose()?,
            size_bytes: field(5).parse()?,
            action: field(6).parse()?,
            reason: optional(7).map(str::to_string),
        })
    }
}
