use std::path::PathBuf;
use thiserror::Error;

/// Errors scoped to a single snapshot entry or a single entity's files.
///
/// Pipeline-level failures (data directory unreachable, snapshot unreadable)
/// travel as `anyhow::Error` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot record #{index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("entity {entity}: unparseable observed_at `{value}`")]
    UnparseableTimestamp { entity: String, value: String },
    #[error("entity {entity}: corrupt active log {}: {reason}", path.display())]
    CorruptLog {
        entity: String,
        path: PathBuf,
        reason: String,
    },
    #[error("entity {entity}: corrupt archive chunk {month} at {}: {reason}", path.display())]
    CorruptChunk {
        entity: String,
        month: String,
        path: PathBuf,
        reason: String,
    },
    #[error("invalid entity id `{entity}`: must be a plain file stem")]
    InvalidEntityId { entity: String },
    #[error("entity {entity}: i/o failure on {}: {source}", path.display())]
    Io {
        entity: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(entity: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            entity: entity.to_string(),
            path: path.into(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::E001MissingField,
            Self::UnparseableTimestamp { .. } => ErrorCode::E002UnparseableTimestamp,
            Self::CorruptLog { .. } => ErrorCode::E003CorruptLog,
            Self::CorruptChunk { .. } => ErrorCode::E004CorruptChunk,
            Self::InvalidEntityId { .. } => ErrorCode::E005InvalidEntityId,
            Self::Io { .. } => ErrorCode::E006Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001MissingField,
    E002UnparseableTimestamp,
    E003CorruptLog,
    E004CorruptChunk,
    E005InvalidEntityId,
    E006Io,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001MissingField => "E001_MISSING_FIELD",
            Self::E002UnparseableTimestamp => "E002_UNPARSEABLE_TIMESTAMP",
            Self::E003CorruptLog => "E003_CORRUPT_LOG",
            Self::E004CorruptChunk => "E004_CORRUPT_CHUNK",
            Self::E005InvalidEntityId => "E005_INVALID_ENTITY_ID",
            Self::E006Io => "E006_IO",
        }
    }
}

/// An entity-scoped failure collected during a run instead of aborting it.
#[derive(Debug)]
pub struct EntityFailure {
    pub entity: String,
    pub error: StoreError,
}

impl EntityFailure {
    pub fn new(entity: impl Into<String>, error: StoreError) -> Self {
        Self {
            entity: entity.into(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = StoreError::MissingField {
            index: 3,
            field: "dam_id",
        };
        assert_eq!(err.code().as_str(), "E001_MISSING_FIELD");
        assert!(err.to_string().contains("#3"));
    }

    #[test]
    fn corrupt_chunk_message_names_entity_and_month() {
        let err = StoreError::CorruptChunk {
            entity: "E1".to_string(),
            month: "2024-01".to_string(),
            path: PathBuf::from("archive/E1_2024-01.ndjson.gz"),
            reason: "bad gzip".to_string(),
        };
        assert!(err.to_string().contains("E1"));
        assert!(err.to_string().contains("2024-01"));
    }
}
