//! Per-column filter criteria and the record predicate.

use chrono::{DateTime, Utc};

use crate::format::relative_time;
use crate::{Amount, ListingRecord, TagSet};

/// Current constraint for every filterable column. Empty strings and `None`
/// leave a column unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub bhk: Option<f64>,
    pub bedroom_type: String,
    /// `"true"`, `"false"` or empty.
    pub sharing: String,
    pub gender: String,
    pub address: String,
    pub rent: Option<f64>,
    pub deposit: Option<f64>,
    pub restrictions: String,
    pub furnishing: String,
    pub brokerage: Option<f64>,
    pub available_date: String,
    /// Matched against the relative-time phrase, not the raw timestamp.
    pub created_at_text: String,
    pub author: String,
}

impl FilterCriteria {
    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }

    /// All active clauses must hold.
    pub fn matches(&self, record: &ListingRecord, now: DateTime<Utc>) -> bool {
        let d = &record.details;
        exact_number(self.bhk, &d.bhk)
            && exact_text(&self.bedroom_type, &d.bedroom_type)
            && sharing_matches(&self.sharing, d.sharing)
            && membership(&self.gender, &d.gender)
            && contains_folded(&d.address, &self.address)
            && exact_number(self.rent, &d.rent)
            && exact_number(self.deposit, &d.deposit)
            && membership(&self.restrictions, &d.restrictions)
            && exact_text(&self.furnishing, &d.furnishing)
            && exact_number(self.brokerage, &d.brokerage)
            && contains_folded(&d.available_date, &self.available_date)
            && (self.created_at_text.is_empty()
                || contains_folded(&relative_time(&record.created_at, now), &self.created_at_text))
            && contains_folded(&record.author, &self.author)
    }
}

/// Ordered subsequence of `records` accepted by `criteria`.
pub fn filter_records<'a>(
    records: &'a [ListingRecord],
    criteria: &FilterCriteria,
    now: DateTime<Utc>,
) -> Vec<&'a ListingRecord> {
    if criteria.is_unconstrained() {
        return records.iter().collect();
    }
    records.iter().filter(|r| criteria.matches(r, now)).collect()
}

/// Parse free-typed numeric input the way a browser number field does:
/// blank clears the criterion, anything unparseable stays active as NaN and
/// therefore never matches.
pub fn parse_number_input(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.parse::<f64>().unwrap_or(f64::NAN))
}

fn exact_number(criterion: Option<f64>, value: &Amount) -> bool {
    match criterion {
        None => true,
        Some(wanted) => value.value() == Some(wanted),
    }
}

fn exact_text(criterion: &str, value: &str) -> bool {
    criterion.is_empty() || criterion == value
}

fn sharing_matches(criterion: &str, sharing: bool) -> bool {
    match criterion {
        "" => true,
        "true" => sharing,
        "false" => !sharing,
        _ => false,
    }
}

fn membership(criterion: &str, tags: &TagSet) -> bool {
    criterion.is_empty() || tags.contains(criterion)
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}
