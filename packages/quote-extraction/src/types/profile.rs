//! Source profiles and learned correction rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-issuer extraction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub id: Uuid,
    pub owner_id: Uuid,

    /// Display name, also matched against uploaded file names
    pub name: String,

    /// Page-selection spec, e.g. `"0"`, `"2"`, `"1,3-5"`
    pub page_spec: String,

    /// Free-text rules injected into extraction requests
    pub instructions: String,
}

impl SourceProfile {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id,
            name: name.into(),
            page_spec: String::new(),
            instructions: String::new(),
        }
    }

    pub fn with_page_spec(mut self, spec: impl Into<String>) -> Self {
        self.page_spec = spec.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// Pick the profile whose name appears in `file_name`.
///
/// Comparison ignores case and punctuation. When several names match, the
/// longest one wins so that "Porto Seguro Auto" beats "Porto".
pub fn match_profile<'a>(file_name: &str, profiles: &'a [SourceProfile]) -> Option<&'a SourceProfile> {
    let haystack = normalize(file_name);
    profiles
        .iter()
        .filter_map(|p| {
            let needle = normalize(&p.name);
            (!needle.is_empty() && haystack.contains(&needle)).then_some((needle.len(), p))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, p)| p)
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Line-item fields a human can correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionField {
    Company,
    Plan,
    Liability,
    Notes,
    Tranche3,
    Tranche5,
    Tranche10,
    ReplacementMonths,
    DealerWorkshop,
}

impl CorrectionField {
    pub const ALL: [CorrectionField; 9] = [
        Self::Company,
        Self::Plan,
        Self::Liability,
        Self::Notes,
        Self::Tranche3,
        Self::Tranche5,
        Self::Tranche10,
        Self::ReplacementMonths,
        Self::DealerWorkshop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Plan => "plan",
            Self::Liability => "liability",
            Self::Notes => "notes",
            Self::Tranche3 => "tranche_3",
            Self::Tranche5 => "tranche_5",
            Self::Tranche10 => "tranche_10",
            Self::ReplacementMonths => "replacement_months",
            Self::DealerWorkshop => "dealer_workshop",
        }
    }
}

impl fmt::Display for CorrectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrectionField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

/// A learned override replayed into every extraction for its profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRule {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub owner_id: Uuid,
    pub field: CorrectionField,
    pub wrong_value: String,
    pub corrected_value: String,
    pub created_at: DateTime<Utc>,
}

impl CorrectionRule {
    pub fn new(
        profile_id: Uuid,
        owner_id: Uuid,
        field: CorrectionField,
        wrong_value: impl Into<String>,
        corrected_value: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            profile_id,
            owner_id,
            field,
            wrong_value: wrong_value.into(),
            corrected_value: corrected_value.into(),
            created_at: Utc::now(),
        }
    }
}
