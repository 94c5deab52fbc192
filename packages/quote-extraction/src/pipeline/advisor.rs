//! Optimization advisor.
//!
//! After a batch, compares where offers were actually found with what each
//! source profile currently sends, and proposes a better page spec. Advice
//! is never applied automatically; [`apply_suggestion`] is the explicit
//! human step.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::pages::PageSpec;
use crate::traits::store::ProfileStore;
use crate::types::profile::SourceProfile;

/// What one processed file tells the advisor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileObservation {
    pub profile_id: Option<Uuid>,

    /// Union of the offers' found pages, original numbering
    pub found_pages: Vec<u32>,

    pub escalated: bool,
}

/// A proposed page spec change for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    pub profile_id: Uuid,
    pub profile_name: String,
    pub current_spec: String,
    pub suggested_spec: String,
    pub rationale: String,
}

#[derive(Default)]
struct ProfileTally {
    pages: BTreeSet<u32>,
    files: usize,
    escalations: usize,
}

/// Build suggestions for every profile seen in `observations`.
///
/// A profile gets a suggestion when any of its files escalated, or when the
/// pages its offers were found on differ from what its spec selects.
/// Observations without a profile, or naming an unknown one, are ignored.
pub fn advise(
    profiles: &[SourceProfile],
    observations: &[FileObservation],
) -> Vec<OptimizationSuggestion> {
    let mut tallies: BTreeMap<Uuid, ProfileTally> = BTreeMap::new();
    for observation in observations {
        let Some(profile_id) = observation.profile_id else {
            continue;
        };
        let tally = tallies.entry(profile_id).or_default();
        tally.pages.extend(observation.found_pages.iter().copied());
        tally.files += 1;
        if observation.escalated {
            tally.escalations += 1;
        }
    }

    let mut suggestions: Vec<OptimizationSuggestion> = tallies
        .into_iter()
        .filter_map(|(profile_id, tally)| {
            let profile = profiles.iter().find(|p| p.id == profile_id)?;
            suggest(profile, &tally)
        })
        .collect();
    suggestions.sort_by(|a, b| a.profile_name.cmp(&b.profile_name));
    suggestions
}

fn suggest(profile: &SourceProfile, tally: &ProfileTally) -> Option<OptimizationSuggestion> {
    let current = PageSpec::parse(&profile.page_spec);
    let escalated = tally.escalations > 0;

    let suggested = match PageSpec::from_found_pages(tally.pages.iter().copied()) {
        Some(spec) => spec,
        // Nothing located even after escalating: only the whole document is safe.
        None if escalated => PageSpec::Full,
        None => return None,
    };

    if !escalated && suggested == current {
        return None;
    }

    let rationale = if escalated {
        format!(
            "{} of {} file(s) returned no premiums with spec \"{}\" and had to be re-read in full; \
             offers were found on pages {}.",
            tally.escalations,
            tally.files,
            current,
            describe_pages(&tally.pages),
        )
    } else {
        format!(
            "Across {} file(s) offers were found on pages {}, but spec \"{}\" selects a different set.",
            tally.files,
            describe_pages(&tally.pages),
            current,
        )
    };

    Some(OptimizationSuggestion {
        profile_id: profile.id,
        profile_name: profile.name.clone(),
        current_spec: profile.page_spec.clone(),
        suggested_spec: suggested.to_string(),
        rationale,
    })
}

fn describe_pages(pages: &BTreeSet<u32>) -> String {
    if pages.is_empty() {
        return "(none)".to_string();
    }
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write a suggestion's page spec to its profile.
pub async fn apply_suggestion<S: ProfileStore + ?Sized>(
    store: &S,
    suggestion: &OptimizationSuggestion,
) -> Result<()> {
    store
        .update_page_spec(suggestion.profile_id, &suggestion.suggested_spec)
        .await?;
    info!(
        profile = %suggestion.profile_name,
        from = %suggestion.current_spec,
        to = %suggestion.suggested_spec,
        "Applied page spec suggestion"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn profile(name: &str, spec: &str) -> SourceProfile {
        SourceProfile::new(Uuid::nil(), name).with_page_spec(spec)
    }

    fn seen(profile: &SourceProfile, pages: &[u32], escalated: bool) -> FileObservation {
        FileObservation {
            profile_id: Some(profile.id),
            found_pages: pages.to_vec(),
            escalated,
        }
    }

    #[test]
    fn test_matching_spec_gives_no_advice() {
        let acme = profile("Acme", "2");
        let advice = advise(&[acme.clone()], &[seen(&acme, &[1], false), seen(&acme, &[2], false)]);
        assert!(advice.is_empty());
    }

    #[test]
    fn test_union_differs_from_spec() {
        let acme = profile("Acme", "2");
        let advice = advise(&[acme.clone()], &[seen(&acme, &[1, 3], false), seen(&acme, &[4], false)]);

        assert_eq!(advice.len(), 1);
        assert_eq!(advice[0].current_spec, "2");
        assert_eq!(advice[0].suggested_spec, "1,3-4");
    }

    #[test]
    fn test_escalation_always_advises() {
        let acme = profile("Acme", "2");
        let advice = advise(&[acme.clone()], &[seen(&acme, &[1, 2], true)]);

        assert_eq!(advice.len(), 1);
        assert_eq!(advice[0].suggested_spec, "2");
        assert!(advice[0].rationale.contains("re-read in full"));
    }

    #[test]
    fn test_escalation_with_nothing_found_suggests_whole_document() {
        let acme = profile("Acme", "2");
        let advice = advise(&[acme.clone()], &[seen(&acme, &[], true)]);
        assert_eq!(advice[0].suggested_spec, "0");

        assert!(advise(&[acme.clone()], &[seen(&acme, &[], false)]).is_empty());
    }

    #[test]
    fn test_unprofiled_files_ignored() {
        let acme = profile("Acme", "2");
        let advice = advise(
            &[acme],
            &[FileObservation {
                profile_id: None,
                found_pages: vec![5],
                escalated: true,
            }],
        );
        assert!(advice.is_empty());
    }

    #[test]
    fn test_equivalent_spec_spelling_is_not_a_change() {
        let acme = profile("Acme", "1-2");
        assert!(advise(&[acme.clone()], &[seen(&acme, &[1, 2], false)]).is_empty());
    }

    #[tokio::test]
    async fn test_apply_suggestion_updates_profile() {
        let store = MemoryStore::new();
        let acme = profile("Acme", "2");
        store.upsert_profile(&acme).await.unwrap();

        let advice = advise(&[acme.clone()], &[seen(&acme, &[3], false)]);
        apply_suggestion(&store, &advice[0]).await.unwrap();

        let updated = store.get_profile(acme.id).await.unwrap().unwrap();
        assert_eq!(updated.page_spec, "3-3");
    }
}
