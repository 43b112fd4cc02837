//! Report series known to the dashboards.
//!
//! Each series names the collection it reads, how it filters and projects
//! rows, and how partial rows are reduced into one row per grouping key.

use crate::{
    aggregate::{with_ratio, GroupSpec},
    batch::Row,
    query::Criterion,
};
use std::collections::BTreeMap;

pub trait SeriesSource: Send + Sync {
    fn collection_name(&self) -> &str;
    fn find_criteria(&self) -> BTreeMap<String, Criterion>;
    fn projection_fields(&self) -> Option<Vec<String>>;
    /// Must be idempotent: grouping its own output returns the same rows.
    fn group_results(&self, rows: Vec<Row>) -> Vec<Row>;
}

/// Gain in accuracy by card number, for users who did a fixed number of stacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccuracyGainSeries {
    pub stacks: u32,
    pub user_segment: Option<String>,
}

impl AccuracyGainSeries {
    pub const COLLECTION: &'static str = "accuracy_deltas";
    pub const CARDS_PER_STACK: u32 = 8;

    pub fn new(stacks: u32) -> Self {
        Self {
            stacks,
            user_segment: None,
        }
    }

    fn group_spec() -> GroupSpec {
        GroupSpec::new("card_number", ["sum_deltas", "num_deltas"])
    }
}

impl SeriesSource for AccuracyGainSeries {
    fn collection_name(&self) -> &str {
        Self::COLLECTION
    }

    fn find_criteria(&self) -> BTreeMap<String, Criterion> {
        let mut criteria = BTreeMap::new();
        // the reducer writes problem counts as strings
        criteria.insert(
            "num_problems_done".to_string(),
            Criterion::equals((self.stacks * Self::CARDS_PER_STACK).to_string()),
        );
        if let Some(segment) = &self.user_segment {
            criteria.insert("user_segment".to_string(), Criterion::equals(segment.as_str()));
        }
        criteria
    }

    fn projection_fields(&self) -> Option<Vec<String>> {
        Some(vec![
            "card_number".to_string(),
            "sum_deltas".to_string(),
            "num_deltas".to_string(),
        ])
    }

    fn group_results(&self, rows: Vec<Row>) -> Vec<Row> {
        let grouped = Self::group_spec().group(rows);
        with_ratio(grouped, "sum_deltas", "num_deltas", "avg_deltas")
    }
}

/// Share of correct answers by card number within a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionSeries {
    pub topic: String,
    pub user_segment: Option<String>,
}

impl RetentionSeries {
    pub const COLLECTION: &'static str = "topic_retention";
    /// Pseudo-topic aggregating every topic.
    pub const ANY_TOPIC: &'static str = "any";

    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            user_segment: None,
        }
    }
}

impl Default for RetentionSeries {
    fn default() -> Self {
        Self::new(Self::ANY_TOPIC)
    }
}

impl SeriesSource for RetentionSeries {
    fn collection_name(&self) -> &str {
        Self::COLLECTION
    }

    fn find_criteria(&self) -> BTreeMap<String, Criterion> {
        let mut criteria = BTreeMap::new();
        criteria.insert("topic".to_string(), Criterion::equals(self.topic.as_str()));
        if let Some(segment) = &self.user_segment {
            criteria.insert("user_segment".to_string(), Criterion::equals(segment.as_str()));
        }
        criteria
    }

    fn projection_fields(&self) -> Option<Vec<String>> {
        Some(vec![
            "card_number".to_string(),
            "correct".to_string(),
            "attempts".to_string(),
        ])
    }

    fn group_results(&self, rows: Vec<Row>) -> Vec<Row> {
        let grouped = GroupSpec::new("card_number", ["correct", "attempts"]).group(rows);
        with_ratio(grouped, "correct", "attempts", "percent_correct")
    }
}

/// Share of correct answers per topic over a window of card numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentCorrectSeries {
    pub user_segment: Option<String>,
    pub first_card: Option<u32>,
    pub last_card: Option<u32>,
}

impl PercentCorrectSeries {
    pub const COLLECTION: &'static str = "topic_percent_correct";
}

impl SeriesSource for PercentCorrectSeries {
    fn collection_name(&self) -> &str {
        Self::COLLECTION
    }

    fn find_criteria(&self) -> BTreeMap<String, Criterion> {
        let mut criteria = BTreeMap::new();
        if let Some(segment) = &self.user_segment {
            criteria.insert("user_segment".to_string(), Criterion::equals(segment.as_str()));
        }
        let cards = match (self.first_card, self.last_card) {
            (Some(first), Some(last)) => Some(Criterion::between(first, last)),
            (Some(first), None) => Some(Criterion::at_least(first)),
            (None, Some(last)) => Some(Criterion::between(1, last)),
            (None, None) => None,
        };
        if let Some(cards) = cards {
            criteria.insert("card_number".to_string(), cards);
        }
        criteria
    }

    fn projection_fields(&self) -> Option<Vec<String>> {
        Some(vec![
            "topic".to_string(),
            "correct".to_string(),
            "attempts".to_string(),
        ])
    }

    fn group_results(&self, rows: Vec<Row>) -> Vec<Row> {
        let grouped = GroupSpec::new("topic", ["correct", "attempts"]).group(rows);
        with_ratio(grouped, "correct", "attempts", "percent_correct")
    }
}

/// Any collection, filtered and grouped as the caller describes.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSeries {
    pub collection: String,
    pub criteria: BTreeMap<String, Criterion>,
    pub projection: Option<Vec<String>>,
    pub group: GroupSpec,
}

impl CustomSeries {
    pub fn new(collection: impl Into<String>, group: GroupSpec) -> Self {
        Self {
            collection: collection.into(),
            criteria: BTreeMap::new(),
            projection: None,
            group,
        }
    }

    pub fn with_criterion(mut self, field: impl Into<String>, criterion: Criterion) -> Self {
        self.criteria.insert(field.into(), criterion);
        self
    }

    /// Projects exactly the fields the grouping needs.
    pub fn with_group_projection(mut self) -> Self {
        let mut fields = vec![self.group.key_field.clone()];
        fields.extend(self.group.sum_fields.iter().cloned());
        self.projection = Some(fields);
        self
    }
}

impl SeriesSource for CustomSeries {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn find_criteria(&self) -> BTreeMap<String, Criterion> {
        self.criteria.clone()
    }

    fn projection_fields(&self) -> Option<Vec<String>> {
        self.projection.clone()
    }

    fn group_results(&self, rows: Vec<Row>) -> Vec<Row> {
        self.group.group(rows)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Series {
    AccuracyGain(AccuracyGainSeries),
    Retention(RetentionSeries),
    PercentCorrect(PercentCorrectSeries),
    Custom(CustomSeries),
}

impl Series {
    fn source(&self) -> &dyn SeriesSource {
        match self {
            Series::AccuracyGain(series) => series,
            Series::Retention(series) => series,
            Series::PercentCorrect(series) => series,
            Series::Custom(series) => series,
        }
    }
}

impl SeriesSource for Series {
    fn collection_name(&self) -> &str {
        self.source().collection_name()
    }

    fn find_criteria(&self) -> BTreeMap<String, Criterion> {
        self.source().find_criteria()
    }

    fn projection_fields(&self) -> Option<Vec<String>> {
        self.source().projection_fields()
    }

    fn group_results(&self, rows: Vec<Row>) -> Vec<Row> {
        self.source().group_results(rows)
    }
}

impl From<AccuracyGainSeries> for Series {
    fn from(series: AccuracyGainSeries) -> Self {
        Series::AccuracyGain(series)
    }
}

impl From<RetentionSeries> for Series {
    fn from(series: RetentionSeries) -> Self {
        Series::Retention(series)
    }
}

impl From<PercentCorrectSeries> for Series {
    fn from(series: PercentCorrectSeries) -> Self {
        Series::PercentCorrect(series)
    }
}

impl From<CustomSeries> for Series {
    fn from(series: CustomSeries) -> Self {
        Series::Custom(series)
    }
}
