//! Display lookups: badge styles, restriction glyphs, relative time, amounts
//! and text truncation. Every function is total over its input.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::Amount;

pub const DEFAULT_TRUNCATE_LEN: usize = 50;
pub const ELLIPSIS: &str = "...";
/// Rendered for unknown amounts and unreadable timestamps.
pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleTag {
    Positive,
    Negative,
    NeutralBlue,
    Unknown,
}

impl StyleTag {
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Positive => "bg-green-100 text-green-800",
            Self::Negative => "bg-red-100 text-red-800",
            Self::NeutralBlue => "bg-blue-100 text-blue-800",
            Self::Unknown => "bg-gray-100 text-gray-800",
        }
    }
}

pub fn gender_style(gender: &str) -> StyleTag {
    match gender {
        "Male" => StyleTag::Positive,
        "Female" => StyleTag::Negative,
        "Family" => StyleTag::NeutralBlue,
        _ => StyleTag::Unknown,
    }
}

pub fn bedroom_style(bedroom: &str) -> StyleTag {
    match bedroom {
        "Hall" => StyleTag::Positive,
        "Non-master Bedroom" | "Single" => StyleTag::Negative,
        "Master Bedroom" | "Double" => StyleTag::NeutralBlue,
        _ => StyleTag::Unknown,
    }
}

pub fn furnishing_style(furnishing: &str) -> StyleTag {
    match furnishing {
        "FURNISHED" => StyleTag::Positive,
        "UNFURNISHED" => StyleTag::Negative,
        "SEMI_FURNISHED" => StyleTag::NeutralBlue,
        _ => StyleTag::Unknown,
    }
}

/// `"Master Bedroom"` → `"Master"`; only the first occurrence is dropped.
pub fn bedroom_label(bedroom: &str) -> String {
    bedroom.replacen("Bedroom", "", 1).trim().to_string()
}

/// `"SEMI_FURNISHED"` → `"SEMIFURNISHED"`.
pub fn furnishing_label(furnishing: &str) -> String {
    furnishing.replacen('_', "", 1)
}

pub fn sharing_badge(sharing: bool) -> (&'static str, StyleTag) {
    if sharing {
        ("Yes", StyleTag::Positive)
    } else {
        ("No", StyleTag::Negative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionGlyph {
    NoNonVeg,
    NoDrinking,
    NoSmoking,
    NoBoys,
    NoRestrictions,
    /// Unrecognized code, shown as a plain badge with the code as given.
    Label(String),
}

impl RestrictionGlyph {
    /// Icon identity, `None` for plain labels.
    pub fn icon(&self) -> Option<&'static str> {
        match self {
            Self::NoNonVeg => Some("no-symbol"),
            Self::NoDrinking => Some("beaker"),
            Self::NoSmoking => Some("fire"),
            Self::NoBoys => Some("user-group"),
            Self::NoRestrictions => Some("check-circle"),
            Self::Label(_) => None,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::NoNonVeg => "No Non-Veg",
            Self::NoDrinking => "No Drinking",
            Self::NoSmoking => "No Smoking",
            Self::NoBoys => "No Boys",
            Self::NoRestrictions => "No Restrictions",
            Self::Label(text) => text,
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Self::NoRestrictions => "text-green-600",
            Self::Label(_) => StyleTag::Unknown.css_class(),
            _ => "text-red-600",
        }
    }
}

pub fn restriction_glyph(code: &str) -> RestrictionGlyph {
    match code.to_uppercase().as_str() {
        "NO_NONVEG" => RestrictionGlyph::NoNonVeg,
        "NO_DRINKING" => RestrictionGlyph::NoDrinking,
        "NO_SMOKING" => RestrictionGlyph::NoSmoking,
        "NO_BOYS" => RestrictionGlyph::NoBoys,
        "NONE" => RestrictionGlyph::NoRestrictions,
        _ => RestrictionGlyph::Label(code.to_string()),
    }
}

/// First `max_len` characters plus [`ELLIPSIS`] when the text is longer.
pub fn truncate(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
    }
}

/// `₹` plus a thousands-grouped value; unknown and zero amounts render as
/// [`PLACEHOLDER`].
pub fn format_amount(amount: &Amount) -> String {
    match amount.value() {
        Some(v) if v != 0.0 => format!("₹{}", group_thousands(v)),
        _ => PLACEHOLDER.to_string(),
    }
}

fn group_thousands(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = (value.abs() * 1000.0).round() / 1000.0;
    let whole = rounded.trunc();
    let digits = format!("{whole:.0}");
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let fraction = rounded - whole;
    if fraction > 0.0 {
        let frac = format!("{fraction:.3}");
        let frac = frac.trim_start_matches('0').trim_end_matches('0');
        grouped.push_str(frac);
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Accepts RFC 3339, naive ISO date-times (read as UTC) and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Tooltip form of a timestamp.
pub fn absolute_time(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

const MINUTES_IN_DAY: f64 = 1440.0;
const MINUTES_IN_ALMOST_TWO_DAYS: f64 = 2520.0;
const MINUTES_IN_MONTH: f64 = 43200.0;
const MINUTES_IN_TWO_MONTHS: f64 = 86400.0;

/// Human phrase for `raw` relative to `now`, e.g. `"5 minutes ago"` or
/// `"in about 2 hours"`. Used by both the time cell and the time filter.
pub fn relative_time(raw: &str, now: DateTime<Utc>) -> String {
    let Some(at) = parse_timestamp(raw) else {
        return PLACEHOLDER.to_string();
    };
    let future = at > now;
    let (later, earlier) = if future { (at, now) } else { (now, at) };
    let distance = distance_words(later, earlier);
    if future {
        format!("in {distance}")
    } else {
        format!("{distance} ago")
    }
}

fn distance_words(later: DateTime<Utc>, earlier: DateTime<Utc>) -> String {
    let seconds = (later - earlier).num_seconds() as f64;
    let minutes = (seconds / 60.0).round();

    if minutes < 2.0 {
        return if minutes == 0.0 {
            "less than a minute".to_string()
        } else {
            "1 minute".to_string()
        };
    }
    if minutes < 45.0 {
        return format!("{minutes:.0} minutes");
    }
    if minutes < 90.0 {
        return "about 1 hour".to_string();
    }
    if minutes < MINUTES_IN_DAY {
        let hours = (minutes / 60.0).round();
        return format!("about {hours:.0} hours");
    }
    if minutes < MINUTES_IN_ALMOST_TWO_DAYS {
        return "1 day".to_string();
    }
    if minutes < MINUTES_IN_MONTH {
        let days = (minutes / MINUTES_IN_DAY).round();
        return format!("{days:.0} days");
    }
    if minutes < MINUTES_IN_TWO_MONTHS {
        let months = (minutes / MINUTES_IN_MONTH).round();
        return plural(months as i64, "about 1 month", "about {} months");
    }

    let months = calendar_months_between(later, earlier);
    if months < 12 {
        let nearest = (minutes / MINUTES_IN_MONTH).round() as i64;
        return plural(nearest, "1 month", "{} months");
    }
    let years = months / 12;
    match months % 12 {
        0..=2 => plural(years, "about 1 year", "about {} years"),
        3..=8 => plural(years, "over 1 year", "over {} years"),
        _ => plural(years + 1, "almost 1 year", "almost {} years"),
    }
}

fn plural(count: i64, one: &str, many: &str) -> String {
    if count == 1 {
        one.to_string()
    } else {
        many.replace("{}", &count.to_string())
    }
}

/// Whole calendar months from `earlier` to `later`.
fn calendar_months_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    let mut months = (later.year() as i64 - earlier.year() as i64) * 12
        + (later.month() as i64 - earlier.month() as i64);
    let later_in_month = (later.day(), later.num_seconds_from_midnight(), later.nanosecond());
    let earlier_in_month = (
        earlier.day(),
        earlier.num_seconds_from_midnight(),
        earlier.nanosecond(),
    );
    if months > 0 && later_in_month < earlier_in_month {
        months -= 1;
    }
    months
}
