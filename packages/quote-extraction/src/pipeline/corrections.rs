//! Human corrections and the rules learned from them.
//!
//! Editing a line item with learning enabled records a
//! `(field, wrong value, corrected value)` rule under the item's source
//! profile. Every rule for a profile is replayed into later extractions.

use tracing::info;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::traits::store::{CorrectionStore, QuoteStore};
use crate::types::{
    profile::{CorrectionField, CorrectionRule},
    quote::QuoteLineItem,
    result::parse_amount,
};

/// Outcome of a human edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub item: QuoteLineItem,

    /// Rule recorded by this edit, if any
    pub rule: Option<CorrectionRule>,
}

/// Current value of a field, rendered as text.
pub fn field_value(item: &QuoteLineItem, field: CorrectionField) -> String {
    let amount = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    match field {
        CorrectionField::Company => item.company.clone(),
        CorrectionField::Plan => item.plan.clone(),
        CorrectionField::Liability => item.liability.clone(),
        CorrectionField::Notes => item.notes.clone(),
        CorrectionField::Tranche3 => amount(item.premiums.tranche_3),
        CorrectionField::Tranche5 => amount(item.premiums.tranche_5),
        CorrectionField::Tranche10 => amount(item.premiums.tranche_10),
        CorrectionField::ReplacementMonths => item
            .replacement_months
            .map(|m| m.to_string())
            .unwrap_or_default(),
        CorrectionField::DealerWorkshop => item.dealer_workshop.to_string(),
    }
}

/// Set a field from text. Empty text clears optional fields.
pub fn set_field(item: &mut QuoteLineItem, field: CorrectionField, value: &str) -> Result<()> {
    let value = value.trim();
    let invalid = || ExtractionError::InvalidEdit {
        field: field.to_string(),
        value: value.to_string(),
    };
    let amount = || -> Result<Option<f64>> {
        if value.is_empty() {
            Ok(None)
        } else {
            parse_amount(value).map(Some).ok_or_else(invalid)
        }
    };

    match field {
        CorrectionField::Company => item.company = value.to_string(),
        CorrectionField::Plan => item.plan = value.to_string(),
        CorrectionField::Liability => item.liability = value.to_string(),
        CorrectionField::Notes => item.notes = value.to_string(),
        CorrectionField::Tranche3 => item.premiums.tranche_3 = amount()?,
        CorrectionField::Tranche5 => item.premiums.tranche_5 = amount()?,
        CorrectionField::Tranche10 => item.premiums.tranche_10 = amount()?,
        CorrectionField::ReplacementMonths => {
            item.replacement_months = if value.is_empty() {
                None
            } else {
                Some(value.parse().map_err(|_| invalid())?)
            }
        }
        CorrectionField::DealerWorkshop => {
            item.dealer_workshop = match value.to_lowercase().as_str() {
                "true" | "yes" | "sim" | "1" => true,
                "false" | "no" | "nao" | "não" | "0" => false,
                _ => return Err(invalid()),
            }
        }
    }
    Ok(())
}

/// The rule an edit from `old_value` to `new_value` teaches, if any.
///
/// Both values must be non-empty and differ, and the item must have been
/// extracted under a profile.
pub fn learned_rule(
    item: &QuoteLineItem,
    owner_id: Uuid,
    field: CorrectionField,
    old_value: &str,
    new_value: &str,
) -> Option<CorrectionRule> {
    let (old_value, new_value) = (old_value.trim(), new_value.trim());
    if old_value.is_empty() || new_value.is_empty() || old_value == new_value {
        return None;
    }
    let profile_id = item.profile_id?;
    Some(CorrectionRule::new(
        profile_id,
        owner_id,
        field,
        old_value,
        new_value,
    ))
}

/// Apply a human edit to a stored line item.
///
/// With `learn` set, a correction rule is recorded when the edit changes a
/// non-empty value into a different non-empty value.
pub async fn apply_edit<S>(
    store: &S,
    owner_id: Uuid,
    item_id: Uuid,
    field: CorrectionField,
    value: &str,
    learn: bool,
) -> Result<EditOutcome>
where
    S: QuoteStore + CorrectionStore + ?Sized,
{
    let mut item = store
        .get_line_item(item_id)
        .await?
        .ok_or_else(|| ExtractionError::NotFound {
            entity: "line item",
            id: item_id.to_string(),
        })?;

    let old_value = field_value(&item, field);
    set_field(&mut item, field, value)?;
    let new_value = field_value(&item, field);

    store.update_line_item(&item).await?;

    let rule = if learn {
        learned_rule(&item, owner_id, field, &old_value, &new_value)
    } else {
        None
    };
    if let Some(rule) = &rule {
        store.add_rule(rule).await?;
        info!(
            profile_id = %rule.profile_id,
            field = %rule.field,
            wrong = %rule.wrong_value,
            corrected = %rule.corrected_value,
            "Learned correction rule"
        );
    }

    Ok(EditOutcome { item, rule })
}
