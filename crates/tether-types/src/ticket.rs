use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credential::ArchiveVersion;

/// Direction of a sync operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDirection {
    /// capture -> pack -> put
    Upload,
    /// get -> unpack -> replace
    Download,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// One in-flight sync operation.
///
/// At most one ticket per direction is active at a time; the sync
/// coordinator owns issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTicket {
    /// Time-ordered identifier (UUID v7).
    pub id: Uuid,
    pub direction: SyncDirection,
    /// Version being transferred, once known.
    pub version: Option<ArchiveVersion>,
    pub started_at: DateTime<Utc>,
}

impl SyncTicket {
    pub fn new(direction: SyncDirection) -> Self {
        Self {
            id: Uuid::now_v7(),
            direction,
            version: None,
            started_at: Utc::now(),
        }
    }

    /// Short id for log lines.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}
