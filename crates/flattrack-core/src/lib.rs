//! Listing model, ingestion rules and the dashboard's filter/format core.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub mod dashboard;
pub mod filter;
pub mod format;
pub mod normalize;

pub use dashboard::{Column, ColumnInput, DashboardState};
pub use filter::{filter_records, parse_number_input, FilterCriteria};

pub const CRATE_NAME: &str = "flattrack-core";

/// One fetched rental message with its structured extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub raw_text: String,
    #[serde(rename = "time_created", default, deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: String,
    #[serde(default, deserialize_with = "lenient_details")]
    pub details: ListingDetails,
}

/// Structured fields extracted from a message.
///
/// Every field tolerates the shapes the upstream extractor is known to emit,
/// so a single odd value degrades one cell instead of rejecting the record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingDetails {
    #[serde(rename = "BHK")]
    pub bhk: Amount,
    #[serde(rename = "Bedroom", deserialize_with = "lenient_string")]
    pub bedroom_type: String,
    #[serde(rename = "Sharing", deserialize_with = "lenient_bool")]
    pub sharing: bool,
    #[serde(rename = "Gender")]
    pub gender: TagSet,
    #[serde(rename = "Address", deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(rename = "Rent")]
    pub rent: Amount,
    #[serde(rename = "Restrictions")]
    pub restrictions: TagSet,
    #[serde(rename = "Furnished", deserialize_with = "lenient_string")]
    pub furnishing: String,
    #[serde(rename = "Deposit")]
    pub deposit: Amount,
    #[serde(rename = "Brokerage")]
    pub brokerage: Amount,
    #[serde(rename = "AvailableDate", deserialize_with = "lenient_string")]
    pub available_date: String,
    #[serde(rename = "ContactDetail", deserialize_with = "lenient_string")]
    pub contact: String,
}

/// Numeric wire value that may be missing or carry free text instead.
///
/// The wire value is kept as-is so records round-trip through the API
/// unchanged; only finite JSON numbers count as a known amount.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(serde_json::Number),
    Text(String),
    #[default]
    Missing,
    Other(JsonValue),
}

impl Amount {
    pub fn from_f64(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(Self::Number)
            .unwrap_or(Self::Missing)
    }

    pub fn from_i64(value: i64) -> Self {
        Self::Number(value.into())
    }

    /// Known numeric value, `None` when absent or not a number.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

/// Ordered tags for fields the source emits either as one string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            tags.into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        )
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) => Self::new([s.as_str()]),
            JsonValue::Array(items) => Self::new(items.iter().filter_map(|v| v.as_str())),
            _ => Self::default(),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        JsonValue::Object(_) => String::new(),
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Bool(b) => b,
        JsonValue::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        JsonValue::String(s) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
        }
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => false,
    })
}

/// Objects deserialize field by field; a JSON-encoded object string is
/// unwrapped first. Anything else yields empty details so the record stays.
fn lenient_details<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ListingDetails, D::Error> {
    let value = match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => serde_json::from_str(&s).unwrap_or(JsonValue::Null),
        other => other,
    };
    Ok(match value {
        JsonValue::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => ListingDetails::default(),
    })
}

/// Outcome of reading a JSON array of records one element at a time.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecords {
    pub records: Vec<ListingRecord>,
    pub rejected: usize,
}

/// Deserialize each array element independently so one broken element
/// (missing or non-integer `id`, not an object) does not drop the rest.
pub fn parse_records(value: JsonValue) -> ParsedRecords {
    let JsonValue::Array(items) = value else {
        return ParsedRecords {
            records: Vec::new(),
            rejected: 1,
        };
    };
    let mut out = ParsedRecords::default();
    for item in items {
        match serde_json::from_value::<ListingRecord>(item) {
            Ok(record) => out.records.push(record),
            Err(_) => out.rejected += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_and_list_gender_normalize_to_the_same_tags() {
        let scalar: ListingDetails = serde_json::from_value(json!({"Gender": "Male"})).unwrap();
        let list: ListingDetails = serde_json::from_value(json!({"Gender": ["Male"]})).unwrap();
        assert_eq!(scalar.gender, list.gender);
        assert!(scalar.gender.contains("Male"));
    }

    #[test]
    fn odd_tag_shapes_degrade_to_empty() {
        let details: ListingDetails =
            serde_json::from_value(json!({"Gender": {"x": 1}, "Restrictions": null})).unwrap();
        assert!(details.gender.is_empty());
        assert!(details.restrictions.is_empty());

        let mixed: ListingDetails =
            serde_json::from_value(json!({"Restrictions": ["NO_BOYS", 3, "NONE"]})).unwrap();
        assert_eq!(mixed.restrictions.as_slice(), ["NO_BOYS", "NONE"]);
    }

    #[test]
    fn amounts_keep_wire_shape_and_expose_only_numbers() {
        let details: ListingDetails = serde_json::from_value(json!({
            "Rent": 25000,
            "Deposit": "Negotiable",
            "Brokerage": null
        }))
        .unwrap();
        assert_eq!(details.rent.value(), Some(25000.0));
        assert_eq!(details.deposit, Amount::Text("Negotiable".into()));
        assert_eq!(details.deposit.value(), None);
        assert_eq!(details.brokerage.value(), None);
        assert_eq!(details.bhk, Amount::Missing);

        let back = serde_json::to_value(&details).unwrap();
        assert_eq!(back["Rent"], json!(25000));
        assert_eq!(back["Deposit"], json!("Negotiable"));
    }

    #[test]
    fn lenient_fields_accept_null_and_numbers() {
        let details: ListingDetails = serde_json::from_value(json!({
            "Address": null,
            "AvailableDate": 2025,
            "Sharing": "false",
            "ContactDetail": ["DM", "call"]
        }))
        .unwrap();
        assert_eq!(details.address, "");
        assert_eq!(details.available_date, "2025");
        assert!(!details.sharing);
        assert_eq!(details.contact, "DM, call");
    }

    #[test]
    fn wire_keys_match_the_messages_endpoint() {
        let record: ListingRecord = serde_json::from_value(json!({
            "id": 7,
            "raw_text": "2BHK in Koramangala",
            "time_created": "2025-03-01T10:00:00+00:00",
            "author": "Flats Group",
            "details": {"BHK": 2, "Bedroom": "Hall", "Sharing": true}
        }))
        .unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.created_at, "2025-03-01T10:00:00+00:00");
        assert_eq!(record.details.bhk.value(), Some(2.0));
        assert!(record.details.sharing);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["time_created"], json!("2025-03-01T10:00:00+00:00"));
        assert_eq!(back["details"]["Bedroom"], json!("Hall"));
    }

    #[test]
    fn parse_records_skips_only_broken_elements() {
        let parsed = parse_records(json!([
            {"id": 1, "details": {}},
            {"raw_text": "no id"},
            "not an object",
            {"id": 2}
        ]));
        assert_eq!(parsed.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(parsed.rejected, 2);

        let not_array = parse_records(json!({"id": 1}));
        assert!(not_array.records.is_empty());
        assert_eq!(not_array.rejected, 1);
    }

    #[test]
    fn odd_details_shapes_keep_the_record() {
        let parsed = parse_records(json!([
            {"id": 1, "details": null},
            {"id": 2, "details": "{\"BHK\": 2, \"Gender\": \"Male\"}"},
            {"id": 3, "raw_text": null, "author": 5, "details": {"BHK": "2", "Gender": 7}},
            {"id": 4, "details": [1, 2]},
            {"id": 5, "details": "not json"}
        ]));
        assert_eq!(parsed.rejected, 0);
        assert_eq!(
            parsed.records.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(parsed.records[0].details, ListingDetails::default());
        assert_eq!(parsed.records[1].details.bhk.value(), Some(2.0));
        assert!(parsed.records[1].details.gender.contains("Male"));
        assert_eq!(parsed.records[2].author, "5");
        assert_eq!(parsed.records[2].details.bhk.value(), None);
        assert!(parsed.records[2].details.gender.is_empty());
        assert_eq!(parsed.records[3].details, ListingDetails::default());
        assert_eq!(parsed.records[4].details, ListingDetails::default());
    }

    #[test]
    fn only_explicit_truthy_words_mark_sharing() {
        for (raw, expected) in [
            (json!("true"), true),
            (json!(" Yes "), true),
            (json!("1"), true),
            (json!("N/A"), false),
            (json!("unknown"), false),
            (json!("false"), false),
            (json!(""), false),
            (json!(1), true),
            (json!(0), false),
        ] {
            let details: ListingDetails =
                serde_json::from_value(json!({ "Sharing": raw.clone() })).unwrap();
            assert_eq!(details.sharing, expected, "{raw}");
        }
    }
}
