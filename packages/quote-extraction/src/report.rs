//! Side-by-side comparison of a quote's offers.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::types::quote::{QuoteLineItem, QuoteWithItems};

/// Deductible levels a premium is quoted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tranche {
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "10")]
    Ten,
}

impl Tranche {
    pub const ALL: [Tranche; 3] = [Tranche::Three, Tranche::Five, Tranche::Ten];

    fn premium(self, item: &QuoteLineItem) -> Option<f64> {
        let value = match self {
            Self::Three => item.premiums.tranche_3,
            Self::Five => item.premiums.tranche_5,
            Self::Ten => item.premiums.tranche_10,
        };
        value.filter(|v| *v > 0.0)
    }
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Three => "3%",
            Self::Five => "5%",
            Self::Ten => "10%",
        };
        f.write_str(label)
    }
}

/// The cheapest offer at one tranche.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cheapest {
    pub tranche: Tranche,
    pub item_id: Uuid,
    pub company: String,
    pub plan: String,
    pub premium: f64,
}

/// A quote's offers ordered for comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteComparison {
    pub quote_id: Uuid,
    pub subject_name: String,
    pub subject_asset: String,

    /// Ascending by the 5% premium; offers without one come last
    pub rows: Vec<QuoteLineItem>,

    /// One entry per tranche that has at least one positive premium
    pub cheapest: Vec<Cheapest>,
}

impl QuoteComparison {
    pub fn new(quote: &QuoteWithItems) -> Self {
        let mut rows = quote.items.clone();
        rows.sort_by(|a, b| by_premium(Tranche::Five.premium(a), Tranche::Five.premium(b)));

        let cheapest = Tranche::ALL
            .into_iter()
            .filter_map(|tranche| {
                rows.iter()
                    .filter_map(|item| tranche.premium(item).map(|p| (p, item)))
                    .min_by(|(a, _), (b, _)| a.total_cmp(b))
                    .map(|(premium, item)| Cheapest {
                        tranche,
                        item_id: item.id,
                        company: item.company.clone(),
                        plan: item.plan.clone(),
                        premium,
                    })
            })
            .collect();

        Self {
            quote_id: quote.quote.id,
            subject_name: quote.quote.subject_name.clone(),
            subject_asset: quote.quote.subject_asset.clone(),
            rows,
            cheapest,
        }
    }

    pub fn cheapest_at(&self, tranche: Tranche) -> Option<&Cheapest> {
        self.cheapest.iter().find(|c| c.tranche == tranche)
    }
}

fn by_premium(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn money(value: Option<f64>) -> String {
    value
        .filter(|v| *v > 0.0)
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for QuoteComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Quote {}", self.quote_id)?;
        if !self.subject_name.is_empty() || !self.subject_asset.is_empty() {
            writeln!(f, "{} / {}", self.subject_name, self.subject_asset)?;
        }
        writeln!(
            f,
            "{:<24} {:<20} {:>12} {:>12} {:>12}  {}",
            "Company", "Plan", "3%", "5%", "10%", "Item"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<24} {:<20} {:>12} {:>12} {:>12}  {}",
                row.company,
                row.plan,
                money(row.premiums.tranche_3),
                money(row.premiums.tranche_5),
                money(row.premiums.tranche_10),
                row.id,
            )?;
        }
        for cheapest in &self.cheapest {
            writeln!(
                f,
                "Cheapest at {}: {} {} ({:.2})",
                cheapest.tranche, cheapest.company, cheapest.plan, cheapest.premium
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        quote::{AttachedFile, Quote},
        result::{Offer, Premiums},
    };

    fn quote(offers: &[(&str, Premiums)]) -> QuoteWithItems {
        let quote = Quote::new(Uuid::new_v4(), Some("lote".into()));
        let file = AttachedFile::new("a.pdf", "h");
        let items = offers
            .iter()
            .map(|(company, premiums)| {
                let offer = Offer {
                    company: company.to_string(),
                    premiums: *premiums,
                    ..Default::default()
                };
                QuoteLineItem::from_offer(quote.id, &offer, &file)
            })
            .collect();
        QuoteWithItems { quote, items }
    }

    #[test]
    fn test_rows_sorted_by_five_percent_premium() {
        let comparison = QuoteComparison::new(&quote(&[
            ("Beta", Premiums::new(10.0, 300.0, 1.0)),
            ("Zero", Premiums::default()),
            ("Acme", Premiums::new(20.0, 200.0, 2.0)),
        ]));

        let order: Vec<_> = comparison.rows.iter().map(|r| r.company.as_str()).collect();
        assert_eq!(order, vec!["Acme", "Beta", "Zero"]);
    }

    #[test]
    fn test_cheapest_per_tranche() {
        let comparison = QuoteComparison::new(&quote(&[
            ("Beta", Premiums::new(10.0, 300.0, 0.0)),
            ("Acme", Premiums::new(20.0, 200.0, 0.0)),
        ]));

        assert_eq!(comparison.cheapest_at(Tranche::Three).unwrap().company, "Beta");
        assert_eq!(comparison.cheapest_at(Tranche::Five).unwrap().company, "Acme");
        assert!(comparison.cheapest_at(Tranche::Ten).is_none());
    }

    #[test]
    fn test_display_lists_every_offer() {
        let comparison = QuoteComparison::new(&quote(&[("Acme", Premiums::new(1.0, 2.0, 3.0))]));
        let text = comparison.to_string();

        assert!(text.contains("Acme"));
        assert!(text.contains("Cheapest at 5%: Acme"));
    }
}
