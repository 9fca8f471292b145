use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How changes for a table are propagated from source to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CdcPolicy {
    /// Truncate the target table and reload every row on each cycle.
    #[default]
    FullRefresh,
    /// Apply stream inserts only; deletes on the source are ignored.
    AppendOnlyStream,
    /// Apply stream deletes then inserts (updates arrive as delete+insert).
    StandardStream,
}

impl CdcPolicy {
    pub const ALL: [CdcPolicy; 3] = [
        CdcPolicy::FullRefresh,
        CdcPolicy::AppendOnlyStream,
        CdcPolicy::StandardStream,
    ];

    /// Parses an operator-supplied cdc_type, case-insensitively. An absent
    /// value defaults to FULL_REFRESH.
    pub fn parse(value: Option<&str>) -> Result<Self, ModelError> {
        let Some(raw) = value else {
            return Ok(CdcPolicy::FullRefresh);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CdcPolicy::FullRefresh);
        }
        trimmed.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CdcPolicy::FullRefresh => "FULL_REFRESH",
            CdcPolicy::AppendOnlyStream => "APPEND_ONLY_STREAM",
            CdcPolicy::StandardStream => "STANDARD_STREAM",
        }
    }

    /// True for the two policies that consume a source-side stream object.
    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            CdcPolicy::AppendOnlyStream | CdcPolicy::StandardStream
        )
    }
}

impl FromStr for CdcPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FULL_REFRESH" => Ok(CdcPolicy::FullRefresh),
            "APPEND_ONLY_STREAM" => Ok(CdcPolicy::AppendOnlyStream),
            "STANDARD_STREAM" => Ok(CdcPolicy::StandardStream),
            _ => Err(ModelError::UnknownCdcPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for CdcPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
