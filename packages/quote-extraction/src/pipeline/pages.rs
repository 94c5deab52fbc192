//! Page-selection grammar.
//!
//! A source profile carries a short page spec telling the optimizer which
//! pages of an upload are worth sending:
//!
//! | spec          | meaning                                   |
//! |---------------|-------------------------------------------|
//! | `"0"`         | whole document                            |
//! | `"3"`         | first 3 pages                             |
//! | `"1,3-5,10"`  | exactly those 1-indexed pages             |
//! | `""` / junk   | first 2 pages                             |
//!
//! Malformed list tokens are skipped one by one. Parsing never fails.

use std::fmt;

use crate::types::config::DEFAULT_PAGE_SPEC;

/// Fallback when a spec yields nothing usable.
const FALLBACK_FIRST_N: u32 = 2;

/// An inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start >= 1 && start <= end).then_some(Self { start, end })
    }

    pub fn single(page: u32) -> Option<Self> {
        Self::new(page, page)
    }

    fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// A parsed page spec.
///
/// Explicit lists are kept as sorted, merged ranges so equal page sets
/// compare equal. A list that is exactly pages `1..=n` is stored as
/// [`PageSpec::FirstN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSpec {
    /// Keep the whole document.
    Full,

    /// Keep the first N pages.
    FirstN(u32),

    /// Keep exactly these pages.
    Pages(Vec<PageRange>),
}

impl Default for PageSpec {
    fn default() -> Self {
        Self::FirstN(FALLBACK_FIRST_N)
    }
}

impl PageSpec {
    /// Parse a spec string. Never fails; see the module docs for fallbacks.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        if !raw.contains(',') && !raw.contains('-') {
            return match raw.parse::<u32>() {
                Ok(0) => Self::Full,
                Ok(n) => Self::FirstN(n),
                Err(_) => Self::default(),
            };
        }

        let ranges: Vec<PageRange> = raw.split(',').filter_map(parse_token).collect();
        Self::from_ranges(ranges).unwrap_or_default()
    }

    /// Parse a profile's spec, treating a missing one like an empty one.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        Self::parse(raw.unwrap_or(DEFAULT_PAGE_SPEC))
    }

    /// Canonical spec for a set of 1-indexed pages. `None` when no valid
    /// page is given.
    pub fn from_found_pages(pages: impl IntoIterator<Item = u32>) -> Option<Self> {
        Self::from_ranges(pages.into_iter().filter_map(PageRange::single).collect())
    }

    fn from_ranges(mut ranges: Vec<PageRange>) -> Option<Self> {
        if ranges.is_empty() {
            return None;
        }
        ranges.sort();

        let mut merged: Vec<PageRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }

        match merged.as_slice() {
            [only] if only.start == 1 => Some(Self::FirstN(only.end)),
            _ => Some(Self::Pages(merged)),
        }
    }

    /// Whether this spec already asks for the whole document.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// Resolve against a concrete page count.
    ///
    /// The result is never an empty keep list: if clipping removes every
    /// requested page, page 1 is kept.
    pub fn resolve(&self, page_count: usize) -> PageSelection {
        let count = u32::try_from(page_count).unwrap_or(u32::MAX);

        let mut keep: Vec<usize> = match self {
            Self::Full => return PageSelection::Whole,
            Self::FirstN(n) if *n >= count => return PageSelection::Whole,
            Self::FirstN(n) => (0..(*n).max(1) as usize).collect(),
            Self::Pages(ranges) => ranges
                .iter()
                .filter(|r| r.start <= count)
                .flat_map(|r| r.start..=r.end.min(count))
                .map(|page| page as usize - 1)
                .collect(),
        };

        if keep.is_empty() {
            keep.push(0);
        }
        if keep.len() >= page_count {
            return PageSelection::Whole;
        }
        PageSelection::Keep(keep)
    }
}

fn parse_token(token: &str) -> Option<PageRange> {
    let token = token.trim();
    match token.split_once('-') {
        Some((start, end)) => {
            PageRange::new(start.trim().parse().ok()?, end.trim().parse().ok()?)
        }
        None => PageRange::single(token.parse().ok()?),
    }
}

impl fmt::Display for PageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("0"),
            Self::FirstN(n) => write!(f, "{n}"),
            // A lone page must keep its dash, or it would read as "first k".
            Self::Pages(ranges) if ranges.len() == 1 => {
                write!(f, "{}-{}", ranges[0].start, ranges[0].end)
            }
            Self::Pages(ranges) => {
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if range.len() == 1 {
                        write!(f, "{}", range.start)?;
                    } else {
                        write!(f, "{}-{}", range.start, range.end)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Resolved selection against a concrete document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    /// Send the document unchanged.
    Whole,

    /// Keep these 0-indexed pages, ascending and unique.
    Keep(Vec<usize>),
}

impl PageSelection {
    pub fn is_whole(&self) -> bool {
        matches!(self, Self::Whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keep(spec: &str, count: usize) -> PageSelection {
        PageSpec::parse(spec).resolve(count)
    }

    #[test]
    fn test_explicit_list_is_clipped_union() {
        assert_eq!(keep("1,3-5,10", 12), PageSelection::Keep(vec![0, 2, 3, 4, 9]));
        assert_eq!(keep("1,3-5,10", 6), PageSelection::Keep(vec![0, 2, 3, 4]));
        assert_eq!(keep("5-3,4,abc,,0", 10), PageSelection::Keep(vec![3]));
        assert_eq!(PageSpec::parse("3,1,3,2-3"), PageSpec::FirstN(3));
    }

    #[test]
    fn test_zero_means_whole_document() {
        assert_eq!(PageSpec::parse("0"), PageSpec::Full);
        assert!(keep("0", 40).is_whole());
        assert!(keep(" 0 ", 1).is_whole());
    }

    #[test]
    fn test_empty_or_garbage_falls_back_to_first_two() {
        assert_eq!(PageSpec::parse(""), PageSpec::FirstN(2));
        assert_eq!(PageSpec::parse("   "), PageSpec::FirstN(2));
        assert_eq!(PageSpec::parse("pages"), PageSpec::FirstN(2));
        assert_eq!(PageSpec::parse("x,y-z"), PageSpec::FirstN(2));
        assert_eq!(keep("", 10), PageSelection::Keep(vec![0, 1]));
        assert_eq!(PageSpec::parse_or_default(None), PageSpec::FirstN(2));
    }

    #[test]
    fn test_first_n() {
        assert_eq!(keep("3", 10), PageSelection::Keep(vec![0, 1, 2]));
        assert!(keep("3", 3).is_whole());
        assert!(keep("3", 2).is_whole());
    }

    #[test]
    fn test_clipping_everything_keeps_first_page() {
        assert_eq!(keep("7-9", 3), PageSelection::Keep(vec![0]));
    }

    #[test]
    fn test_single_range_is_explicit() {
        assert_eq!(keep("3-5", 10), PageSelection::Keep(vec![2, 3, 4]));
        assert_eq!(PageSpec::parse("1-4"), PageSpec::FirstN(4));
    }

    #[test]
    fn test_display_canonical_forms() {
        let spec = |pages: &[u32]| PageSpec::from_found_pages(pages.iter().copied()).unwrap();

        assert_eq!(spec(&[1, 2]).to_string(), "2");
        assert_eq!(spec(&[2, 1, 2]).to_string(), "2");
        assert_eq!(spec(&[1, 3, 4, 5, 10]).to_string(), "1,3-5,10");
        assert_eq!(spec(&[3]).to_string(), "3-3");
        assert_eq!(spec(&[1]).to_string(), "1");
        assert_eq!(PageSpec::Full.to_string(), "0");
        assert!(PageSpec::from_found_pages([0]).is_none());
        assert!(PageSpec::from_found_pages(Vec::new()).is_none());
    }

    proptest! {
        #[test]
        fn parse_never_panics(raw in ".{0,40}") {
            let _ = PageSpec::parse(&raw).resolve(5);
        }

        #[test]
        fn resolved_pages_are_sorted_unique_in_bounds(
            raw in "[0-9,\\- ]{0,30}",
            count in 1usize..60,
        ) {
            match PageSpec::parse(&raw).resolve(count) {
                PageSelection::Whole => {}
                PageSelection::Keep(pages) => {
                    prop_assert!(!pages.is_empty());
                    prop_assert!(pages.len() < count);
                    prop_assert!(pages.iter().all(|&p| p < count));
                    prop_assert!(pages.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }

        #[test]
        fn found_pages_round_trip_through_text(
            pages in proptest::collection::vec(1u32..50, 1..12),
        ) {
            let spec = PageSpec::from_found_pages(pages.iter().copied()).unwrap();
            prop_assert_eq!(PageSpec::parse(&spec.to_string()), spec);
        }

        #[test]
        fn found_pages_resolve_to_exactly_those_pages(
            pages in proptest::collection::vec(1u32..30, 1..10),
        ) {
            let spec = PageSpec::from_found_pages(pages.iter().copied()).unwrap();
            let mut expected: Vec<usize> = pages.iter().map(|&p| p as usize - 1).collect();
            expected.sort_unstable();
            expected.dedup();

            match spec.resolve(100) {
                PageSelection::Keep(kept) => prop_assert_eq!(kept, expected),
                PageSelection::Whole => prop_assert!(false, "100-page document never whole"),
            }
        }
    }
}
