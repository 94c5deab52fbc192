//! Structured extraction results, as returned by providers and the cache.

use serde::{Deserialize, Deserializer, Serialize};

/// The structured data extracted from one quote document.
///
/// Field names match the JSON schema the providers are asked to produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Name of the insured person or company
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subject_name: String,

    /// Description of the insured asset (vehicle, property)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subject_asset: String,

    /// One entry per company/plan combination found in the document
    #[serde(default, deserialize_with = "null_as_default")]
    pub offers: Vec<Offer>,
}

impl ExtractionResult {
    /// Parse provider JSON into a result.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sorted, de-duplicated union of the pages every offer was found on.
    pub fn found_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .offers
            .iter()
            .flat_map(|o| o.found_pages.iter().copied())
            .collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

/// A single offer: one company and plan with its premiums.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub plan: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub premiums: Premiums,

    /// Third-party liability coverage, as written in the document
    #[serde(default, deserialize_with = "null_as_empty")]
    pub liability: String,

    /// Whether repairs at dealer workshops are covered
    #[serde(default, deserialize_with = "lenient_bool")]
    pub dealer_workshop: bool,

    /// Months during which a total loss pays the new-vehicle value
    #[serde(default, deserialize_with = "lenient_months")]
    pub replacement_months: Option<u32>,

    /// 1-indexed pages the offer was read from
    #[serde(default, deserialize_with = "null_as_default")]
    pub found_pages: Vec<u32>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
}

/// Premium amounts keyed by deductible tranche.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Premiums {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub tranche_3: Option<f64>,

    #[serde(default, deserialize_with = "lenient_amount")]
    pub tranche_5: Option<f64>,

    #[serde(default, deserialize_with = "lenient_amount")]
    pub tranche_10: Option<f64>,
}

impl Premiums {
    pub fn new(tranche_3: f64, tranche_5: f64, tranche_10: f64) -> Self {
        Self {
            tranche_3: Some(tranche_3),
            tranche_5: Some(tranche_5),
            tranche_10: Some(tranche_10),
        }
    }

    /// True when no tranche carries a positive amount.
    pub fn is_all_zero(&self) -> bool {
        [self.tranche_3, self.tranche_5, self.tranche_10]
            .iter()
            .all(|p| p.map_or(true, |v| v == 0.0))
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Bool(bool),
    Text(String),
}

fn lenient_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Text(s)) => parse_amount(&s),
        Some(Loose::Bool(_)) | None => None,
    })
}

fn lenient_months<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Number(n)) if n >= 0.0 => Some(n.round() as u32),
        Some(Loose::Text(s)) => s
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Bool(b)) => b,
        Some(Loose::Number(n)) => n != 0.0,
        Some(Loose::Text(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "sim" | "si" | "s" | "y"
        ),
        None => false,
    })
}

/// Parse a currency amount written by a human.
///
/// Handles currency prefixes and both `1.234,56` and `1,234.56` styles.
/// Returns `None` when no digits are present.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        // Comma is the decimal separator: 1.234,56
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        // Dot is the decimal separator: 1,234.56
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(comma)) => {
            // A lone comma followed by exactly three digits is a thousands separator
            if cleaned.len() - comma == 4 && cleaned.matches(',').count() == 1 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (Some(dot), None) => {
            if cleaned.matches('.').count() > 1 || cleaned.len() - dot == 4 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse().ok()
}
