//! Provider instructions for quote extraction.
//!
//! One request carries three blocks: the fixed output schema, the source
//! profile's free-text rules, and every learned correction for the profile.

use crate::types::profile::{CorrectionRule, SourceProfile};

/// Fixed output-schema instructions sent with every document.
pub const EXTRACT_PROMPT: &str = r#"Read this insurance quote document and extract every offer it contains.

An offer is one insurance company and plan with its premiums. Premiums are
quoted at three deductible tranches: 3%, 5% and 10%.

Output JSON only, no commentary:
{
    "subject_name": "insured person or company, empty string if absent",
    "subject_asset": "insured vehicle or property as written, empty string if absent",
    "offers": [
        {
            "company": "insurance company name",
            "plan": "plan or product name",
            "premiums": {
                "tranche_3": 0.0,
                "tranche_5": 0.0,
                "tranche_10": 0.0
            },
            "liability": "third-party liability coverage as written",
            "dealer_workshop": false,
            "replacement_months": null,
            "found_pages": [1],
            "notes": "anything relevant that does not fit the fields above"
        }
    ]
}

Rules:
- Premiums are plain numbers: no currency symbols, no thousands separators.
- Use null for a tranche that is not quoted. Never invent a value.
- "found_pages" lists the 1-indexed pages of THIS document the offer was read from.
- "replacement_months" is the number of months a total loss pays the new-vehicle value.
- "dealer_workshop" is true only if repairs at dealer workshops are covered."#;

/// Profile rules to use for a file.
///
/// The resolved profile's instructions when it has any; otherwise every
/// known profile's instructions, so an unmatched upload still benefits from
/// what was written for similar issuers.
pub fn profile_rules(profile: Option<&SourceProfile>, known: &[SourceProfile]) -> String {
    if let Some(profile) = profile.filter(|p| !p.instructions.trim().is_empty()) {
        return profile.instructions.trim().to_string();
    }

    known
        .iter()
        .filter(|p| !p.instructions.trim().is_empty())
        .map(|p| format!("[{}]\n{}", p.name, p.instructions.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render one correction rule as a directive.
pub fn render_correction(rule: &CorrectionRule) -> String {
    format!(
        "- If you see \"{}\" as {}, correct it to \"{}\".",
        rule.wrong_value, rule.field, rule.corrected_value
    )
}

/// Assemble the full instruction text for one provider request.
///
/// Every rule is rendered, in the order given, with no de-duplication.
pub fn build_instructions(profile_rules: &str, corrections: &[CorrectionRule]) -> String {
    let mut out = String::from(EXTRACT_PROMPT);

    if !profile_rules.trim().is_empty() {
        out.push_str("\n\nIssuer-specific rules:\n");
        out.push_str(profile_rules.trim());
    }

    if !corrections.is_empty() {
        out.push_str("\n\nCorrections learned from previous reviews of this issuer:\n");
        for rule in corrections {
            out.push_str(&render_correction(rule));
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::profile::CorrectionField;
    use uuid::Uuid;

    fn profile(name: &str, instructions: &str) -> SourceProfile {
        SourceProfile::new(Uuid::nil(), name).with_instructions(instructions)
    }

    #[test]
    fn test_profile_rules_prefer_resolved_profile() {
        let acme = profile("Acme", "Prices are on the summary table.");
        let known = vec![acme.clone(), profile("Beta", "Ignore page 1.")];

        assert_eq!(profile_rules(Some(&acme), &known), "Prices are on the summary table.");
    }

    #[test]
    fn test_profile_rules_fall_back_to_all_profiles() {
        let known = vec![
            profile("Acme", "Prices are on the summary table."),
            profile("Empty", "  "),
            profile("Beta", "Ignore page 1."),
        ];
        let blank = profile("Gamma", "");

        let rules = profile_rules(Some(&blank), &known);
        assert!(rules.contains("[Acme]\nPrices are on the summary table."));
        assert!(rules.contains("[Beta]\nIgnore page 1."));
        assert!(!rules.contains("[Empty]"));
        assert_eq!(profile_rules(None, &known), rules);
    }

    #[test]
    fn test_all_corrections_replayed_in_order() {
        let id = Uuid::nil();
        let rules = vec![
            CorrectionRule::new(id, id, CorrectionField::Plan, "Ouro", "Gold"),
            CorrectionRule::new(id, id, CorrectionField::Plan, "Ouro", "Gold"),
            CorrectionRule::new(id, id, CorrectionField::Company, "ACME SA", "Acme Seguros"),
        ];

        let text = build_instructions("Be careful.", &rules);
        assert!(text.starts_with(EXTRACT_PROMPT));
        assert!(text.contains("Issuer-specific rules:\nBe careful."));
        assert_eq!(text.matches("If you see \"Ouro\" as plan, correct it to \"Gold\".").count(), 2);

        let plan = text.find("Ouro").unwrap();
        let company = text.find("ACME SA").unwrap();
        assert!(plan < company);
    }

    #[test]
    fn test_no_optional_sections_when_empty() {
        assert_eq!(build_instructions("  ", &[]), EXTRACT_PROMPT);
    }
}
