//! Cleanup applied to extracted details before they are served: canonical
//! bedroom / furnishing / restriction codes, split gender tags, tidied
//! address and availability text.

use std::cmp::Reverse;

use crate::format::parse_timestamp;
use crate::{ListingDetails, ListingRecord, TagSet};

/// Raw-text markers for posts that are not rental listings.
const OFFTOPIC_MARKERS: [&str; 3] = ["lead", "car rental", "external"];

/// What the messages endpoint serves: every record normalized, off-topic
/// posts dropped, newest first with unreadable timestamps at the end.
pub fn prepare_feed(mut records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    records.retain(|r| !is_offtopic(r));
    records.iter_mut().for_each(normalize_record);
    records.sort_by_cached_key(|r| Reverse(parse_timestamp(&r.created_at)));
    records
}

pub fn normalize_record(record: &mut ListingRecord) {
    normalize_details(&mut record.details);
}

/// Amounts are left untouched so unknown values stay unknown.
pub fn normalize_details(details: &mut ListingDetails) {
    details.bedroom_type = map_bedroom(&details.bedroom_type);
    details.gender = split_gender(&details.gender);
    details.address = tidy_address(&details.address);
    details.restrictions = map_restrictions(&details.restrictions);
    details.furnishing = map_furnishing(&details.furnishing);
    details.available_date = tidy_available_date(&details.available_date);
    details.contact = tidy_contact(&details.contact);
}

pub fn is_offtopic(record: &ListingRecord) -> bool {
    let text = record.raw_text.to_lowercase();
    OFFTOPIC_MARKERS.iter().any(|m| text.contains(m))
}

pub fn map_bedroom(text: &str) -> String {
    match text.to_lowercase().as_str() {
        "non-master bedroom" => "Non-master Bedroom".to_string(),
        "master" | "master bedroom" => "Master Bedroom".to_string(),
        "hall" => "Hall".to_string(),
        "single" | "single room" => "Single".to_string(),
        "double" => "Double".to_string(),
        _ => text.to_string(),
    }
}

pub fn split_gender(tags: &TagSet) -> TagSet {
    TagSet::new(
        tags.iter()
            .flat_map(|t| title_case(t).split('/').map(str::to_string).collect::<Vec<_>>()),
    )
}

pub fn map_restrictions(tags: &TagSet) -> TagSet {
    let mut out: Vec<String> = tags
        .iter()
        .flat_map(|t| t.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| restriction_code(t).unwrap_or(t).to_string())
        .collect();
    if out.iter().any(|t| t == "NONE") {
        out = vec!["NONE".to_string()];
    }
    out.sort();
    TagSet::new(out)
}

fn restriction_code(phrase: &str) -> Option<&'static str> {
    match phrase.to_lowercase().as_str() {
        "no smoking" | "non smoker" => Some("NO_SMOKING"),
        "no drinking" | "no alcohol" | "non drinker" => Some("NO_DRINKING"),
        "no restrictions" | "no restriction" | "no_restrictions" => Some("NONE"),
        "no boys" | "no boys allowed" => Some("NO_BOYS"),
        "only vegetarians" | "no non-vegetarian food" | "no non-vegetarian" | "pure veg" => {
            Some("NO_NONVEG")
        }
        _ => None,
    }
}

pub fn map_furnishing(text: &str) -> String {
    let squashed: String = text.chars().filter(|c| *c != '-' && *c != ' ').collect();
    match squashed.to_lowercase().as_str() {
        "semifurnished" => "SEMI_FURNISHED".to_string(),
        "furnished" | "fullyfurnished" | "fullfurnished" => "FURNISHED".to_string(),
        "unfurnished" => "UNFURNISHED".to_string(),
        _ => squashed,
    }
}

pub fn tidy_address(text: &str) -> String {
    title_case(text).replace("  ", " ")
}

pub fn tidy_available_date(text: &str) -> String {
    let lowered = text.to_lowercase().replace(',', " ");
    let words: Vec<String> = lowered
        .split_whitespace()
        .filter(|w| *w != "after" && !is_year(w))
        .map(|w| if w == "apr" { "april".to_string() } else { strip_ordinal(w) })
        .collect();
    let tidy = title_case(&words.join(" "));
    if tidy.contains("Now") || tidy.contains("Immediate") {
        return "Immediate".to_string();
    }
    let mut parts: Vec<&str> = tidy.split(' ').collect();
    if parts.len() == 2 {
        parts.sort_unstable();
        return parts.join(" ");
    }
    tidy
}

pub fn tidy_contact(text: &str) -> String {
    if text.to_lowercase().contains("ping") {
        "DM".to_string()
    } else {
        text.to_string()
    }
}

fn is_year(word: &str) -> bool {
    word.len() == 4 && word.chars().all(|c| c.is_ascii_digit()) && word.starts_with("20")
}

/// `"5th"` → `"5"`, `"21st"` → `"21"`.
fn strip_ordinal(word: &str) -> String {
    for suffix in ["th", "st", "nd", "rd"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            if stem.chars().last().is_some_and(|c| c.is_ascii_digit()) {
                return stem.to_string();
            }
        }
    }
    word.to_string()
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bedroom_and_furnishing_map_to_canonical_codes() {
        assert_eq!(map_bedroom("master"), "Master Bedroom");
        assert_eq!(map_bedroom("SINGLE ROOM"), "Single");
        assert_eq!(map_bedroom("Studio"), "Studio");
        assert_eq!(map_furnishing("Semi-Furnished"), "SEMI_FURNISHED");
        assert_eq!(map_furnishing("fully furnished"), "FURNISHED");
        assert_eq!(map_furnishing("Unfurnished"), "UNFURNISHED");
        assert_eq!(map_furnishing("bare shell"), "bareshell");
    }

    #[test]
    fn gender_splits_on_slash() {
        let tags = split_gender(&TagSet::new(["male/female"]));
        assert_eq!(tags.as_slice(), ["Male", "Female"]);
        let tags = split_gender(&TagSet::new(["Family", "male"]));
        assert_eq!(tags.as_slice(), ["Family", "Male"]);
    }

    #[test]
    fn restrictions_collapse_and_sort() {
        let tags = map_restrictions(&TagSet::new(["no smoking, pure veg"]));
        assert_eq!(tags.as_slice(), ["NO_NONVEG", "NO_SMOKING"]);
        let tags = map_restrictions(&TagSet::new(["no boys", "No restrictions"]));
        assert_eq!(tags.as_slice(), ["NONE"]);
        let tags = map_restrictions(&TagSet::new(["no pets"]));
        assert_eq!(tags.as_slice(), ["no pets"]);
    }

    #[test]
    fn availability_text_is_tidied() {
        assert_eq!(tidy_available_date("1st apr"), "1 April");
        assert_eq!(tidy_available_date("April 15th, 2025"), "15 April");
        assert_eq!(tidy_available_date("after 5th may"), "5 May");
        assert_eq!(tidy_available_date("ready now"), "Immediate");
        assert_eq!(tidy_available_date("immediately"), "Immediate");
        assert_eq!(tidy_available_date(""), "");
    }

    #[test]
    fn address_and_contact() {
        assert_eq!(tidy_address("hsr  layout sector 2"), "Hsr Layout Sector 2");
        assert_eq!(tidy_contact("Ping me on telegram"), "DM");
        assert_eq!(tidy_contact("+91 98765 43210"), "+91 98765 43210");
    }

    #[test]
    fn normalization_keeps_unknown_amounts_unknown() {
        let mut record: ListingRecord = serde_json::from_value(json!({
            "id": 1,
            "raw_text": "Room available",
            "details": {"Rent": null, "Deposit": "two months", "Bedroom": "hall"}
        }))
        .unwrap();
        normalize_record(&mut record);
        assert_eq!(record.details.rent.value(), None);
        assert_eq!(record.details.deposit.value(), None);
        assert_eq!(record.details.bedroom_type, "Hall");
    }

    #[test]
    fn feed_is_filtered_normalized_and_newest_first() {
        let records: Vec<ListingRecord> = serde_json::from_value(json!([
            {"id": 1, "raw_text": "room", "time_created": "2025-03-01T10:00:00Z",
             "details": {"Furnished": "semi-furnished"}},
            {"id": 2, "raw_text": "looking for leads", "time_created": "2025-03-09T10:00:00Z"},
            {"id": 3, "raw_text": "flat", "time_created": "yesterday"},
            {"id": 4, "raw_text": "flat", "time_created": "2025-03-05 08:30:00"}
        ]))
        .unwrap();
        let feed = prepare_feed(records);
        assert_eq!(feed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 1, 3]);
        assert_eq!(feed[1].details.furnishing, "SEMI_FURNISHED");
    }

    #[test]
    fn offtopic_posts_are_detected() {
        let mut record: ListingRecord = serde_json::from_value(json!({"id": 1})).unwrap();
        record.raw_text = "Car rental available for weekend".into();
        assert!(is_offtopic(&record));
        record.raw_text = "2BHK in HSR".into();
        assert!(!is_offtopic(&record));
    }
}
