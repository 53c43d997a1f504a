//! Table state behind the dashboard: per-column criteria, which filter inputs
//! are open, and the shared full-text toggle.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::filter::{filter_records, parse_number_input, FilterCriteria};
use crate::ListingRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Bhk,
    BedroomType,
    Sharing,
    Gender,
    Address,
    Rent,
    Deposit,
    Restrictions,
    Furnishing,
    Brokerage,
    AvailableDate,
    CreatedAt,
    Author,
}

/// How a column's filter is edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnInput {
    Number,
    /// `(value, label)` pairs; the first entry is the empty "All" choice.
    Select(&'static [(&'static str, &'static str)]),
    Text,
}

const BEDROOM_OPTIONS: &[(&str, &str)] = &[
    ("", "All"),
    ("Hall", "Hall"),
    ("Non-master Bedroom", "Non-Master"),
    ("Master Bedroom", "Master"),
    ("Single", "Single"),
    ("Double", "Double"),
];

const SHARING_OPTIONS: &[(&str, &str)] = &[("", "All"), ("true", "True"), ("false", "False")];

const GENDER_OPTIONS: &[(&str, &str)] =
    &[("", "All"), ("Male", "Male"), ("Female", "Female"), ("Family", "Family")];

const RESTRICTION_OPTIONS: &[(&str, &str)] = &[
    ("", "All"),
    ("NONE", "None"),
    ("NO_SMOKING", "No Smoking"),
    ("NO_DRINKING", "No Drinking"),
    ("NO_BOYS", "No Boys"),
    ("NO_NONVEG", "No Non-Veg"),
];

const FURNISHING_OPTIONS: &[(&str, &str)] = &[
    ("", "All"),
    ("FURNISHED", "Furnished"),
    ("SEMI_FURNISHED", "Semi-Furnished"),
    ("UNFURNISHED", "Unfurnished"),
];

impl Column {
    pub const ALL: [Column; 13] = [
        Column::Bhk,
        Column::BedroomType,
        Column::Sharing,
        Column::Gender,
        Column::Address,
        Column::Rent,
        Column::Deposit,
        Column::Restrictions,
        Column::Furnishing,
        Column::Brokerage,
        Column::AvailableDate,
        Column::CreatedAt,
        Column::Author,
    ];

    /// Stable query-string key.
    pub fn key(self) -> &'static str {
        match self {
            Column::Bhk => "bhk",
            Column::BedroomType => "bedroom",
            Column::Sharing => "sharing",
            Column::Gender => "gender",
            Column::Address => "address",
            Column::Rent => "rent",
            Column::Deposit => "deposit",
            Column::Restrictions => "restrictions",
            Column::Furnishing => "furnished",
            Column::Brokerage => "brokerage",
            Column::AvailableDate => "available",
            Column::CreatedAt => "time",
            Column::Author => "author",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            Column::Bhk => "BHK",
            Column::BedroomType => "Occupancy",
            Column::Sharing => "Sharing",
            Column::Gender => "Gender",
            Column::Address => "Address",
            Column::Rent => "Rent",
            Column::Deposit => "Deposit",
            Column::Restrictions => "Restrictions",
            Column::Furnishing => "Furnished",
            Column::Brokerage => "Brokerage",
            Column::AvailableDate => "AvailableDate",
            Column::CreatedAt => "Time",
            Column::Author => "SenderName",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            Column::Bhk => "Filter BHK...",
            Column::Address => "Filter Address...",
            Column::Rent => "Filter Rent...",
            Column::Deposit => "Filter Deposit...",
            Column::Brokerage => "Filter Brokerage...",
            Column::AvailableDate => "Filter Available Date...",
            Column::CreatedAt => "Filter Time Created...",
            Column::Author => "Filter Author...",
            _ => "",
        }
    }

    pub fn input(self) -> ColumnInput {
        match self {
            Column::Bhk | Column::Rent | Column::Deposit | Column::Brokerage => ColumnInput::Number,
            Column::BedroomType => ColumnInput::Select(BEDROOM_OPTIONS),
            Column::Sharing => ColumnInput::Select(SHARING_OPTIONS),
            Column::Gender => ColumnInput::Select(GENDER_OPTIONS),
            Column::Restrictions => ColumnInput::Select(RESTRICTION_OPTIONS),
            Column::Furnishing => ColumnInput::Select(FURNISHING_OPTIONS),
            Column::Address | Column::AvailableDate | Column::CreatedAt | Column::Author => {
                ColumnInput::Text
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    criteria: FilterCriteria,
    open_filters: BTreeSet<Column>,
    show_full_text: bool,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Replace one column's criterion from raw user input. Numeric columns
    /// parse the text; every other column stores it verbatim.
    pub fn set_filter(&mut self, column: Column, raw: &str) {
        let c = &mut self.criteria;
        match column {
            Column::Bhk => c.bhk = parse_number_input(raw),
            Column::Rent => c.rent = parse_number_input(raw),
            Column::Deposit => c.deposit = parse_number_input(raw),
            Column::Brokerage => c.brokerage = parse_number_input(raw),
            Column::BedroomType => c.bedroom_type = raw.to_string(),
            Column::Sharing => c.sharing = raw.to_string(),
            Column::Gender => c.gender = raw.to_string(),
            Column::Address => c.address = raw.to_string(),
            Column::Restrictions => c.restrictions = raw.to_string(),
            Column::Furnishing => c.furnishing = raw.to_string(),
            Column::AvailableDate => c.available_date = raw.to_string(),
            Column::CreatedAt => c.created_at_text = raw.to_string(),
            Column::Author => c.author = raw.to_string(),
        }
    }

    /// Current criterion as it would appear in the column's input.
    pub fn criterion(&self, column: Column) -> String {
        let c = &self.criteria;
        match column {
            Column::Bhk => number_text(c.bhk),
            Column::Rent => number_text(c.rent),
            Column::Deposit => number_text(c.deposit),
            Column::Brokerage => number_text(c.brokerage),
            Column::BedroomType => c.bedroom_type.clone(),
            Column::Sharing => c.sharing.clone(),
            Column::Gender => c.gender.clone(),
            Column::Address => c.address.clone(),
            Column::Restrictions => c.restrictions.clone(),
            Column::Furnishing => c.furnishing.clone(),
            Column::AvailableDate => c.available_date.clone(),
            Column::CreatedAt => c.created_at_text.clone(),
            Column::Author => c.author.clone(),
        }
    }

    pub fn toggle_filter_visibility(&mut self, column: Column) {
        if !self.open_filters.remove(&column) {
            self.open_filters.insert(column);
        }
    }

    pub fn is_filter_visible(&self, column: Column) -> bool {
        self.open_filters.contains(&column)
    }

    pub fn open_filters(&self) -> impl Iterator<Item = Column> + '_ {
        self.open_filters.iter().copied()
    }

    /// Flips full text for every row at once.
    pub fn toggle_full_text(&mut self) {
        self.show_full_text = !self.show_full_text;
    }

    pub fn show_full_text(&self) -> bool {
        self.show_full_text
    }

    pub fn visible_records<'a>(
        &self,
        records: &'a [ListingRecord],
        now: DateTime<Utc>,
    ) -> Vec<&'a ListingRecord> {
        filter_records(records, &self.criteria, now)
    }
}

fn number_text(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.is_nan() => "NaN".to_string(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => v.to_string(),
    }
}
