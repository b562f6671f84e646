//! Export of a namespace as JSON (full fidelity) or CSV (audit projection).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::MemoryStatistics;
use crate::persistence::FORMAT_VERSION;
use crate::types::{MemoryEntry, Partition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown export format: {}",
                other
            ))),
        }
    }
}

/// JSON export wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExport {
    pub namespace: String,
    pub exported_at: DateTime<Utc>,
    pub version: String,
    pub statistics: MemoryStatistics,
    pub partitions: Vec<Partition>,
    pub entries: Vec<MemoryEntry>,
}

const CSV_HEADER: &str = "id,key,type,access_level,created_at,updated_at,owner,tags";

pub(crate) fn to_json(export: &MemoryExport) -> MemoryResult<String> {
    Ok(serde_json::to_string_pretty(export)?)
}

impl MemoryExport {
    pub(crate) fn new(
        namespace: &str,
        exported_at: DateTime<Utc>,
        statistics: MemoryStatistics,
        partitions: Vec<Partition>,
        entries: Vec<MemoryEntry>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            exported_at,
            version: FORMAT_VERSION.to_string(),
            statistics,
            partitions,
            entries,
        }
    }
}

/// One row per entry. Values are omitted; tags are joined with `;`.
pub(crate) fn to_csv(entries: &[MemoryEntry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        let tags = entry.tags.iter().cloned().collect::<Vec<_>>().join(";");
        let row = [
            entry.id.as_str(),
            entry.key.as_str(),
            entry.entry_type.as_str(),
            entry.access_level.as_str(),
            &entry.created_at.to_rfc3339(),
            &entry.updated_at.to_rfc3339(),
            entry.owner.as_deref().unwrap_or(""),
            &tags,
        ]
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
