use crate::consts::{DEFAULT_BATCH_SIZE, FIND_COMMAND, MORE_COMMAND};
use crate::batch::Cursor;
use chrono::NaiveDate;
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::{ParseError, Url};

/// Request parameters, ordered by name so that serialization is canonical.
pub type QueryParams = BTreeMap<String, String>;

/// Filter applied to a single field of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Criterion {
    Eq(Value),
    Range(Range),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Range {
    #[serde(rename = "$gte", skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(rename = "$gt", skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(rename = "$lte", skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(rename = "$lt", skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
}

impl Criterion {
    pub fn equals(value: impl Into<Value>) -> Self {
        Self::Eq(value.into())
    }

    /// Inclusive range on both ends.
    pub fn between(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self::Range(Range {
            gte: Some(from.into()),
            lte: Some(to.into()),
            ..Default::default()
        })
    }

    pub fn at_least(from: impl Into<Value>) -> Self {
        Self::Range(Range {
            gte: Some(from.into()),
            ..Default::default()
        })
    }

    /// Report collections store their days as `YYYY-MM-DD` strings.
    pub fn date_range(from: NaiveDate, to: NaiveDate) -> Self {
        Self::between(
            from.format("%Y-%m-%d").to_string(),
            to.format("%Y-%m-%d").to_string(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl From<SortOrder> for i8 {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Immutable description of a paginated collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection_url: Url,
    criteria: BTreeMap<String, Criterion>,
    projection: Option<Vec<String>>,
    sort: Vec<(String, SortOrder)>,
    batch_size: usize,
}

impl Query {
    /// `collection_url` points at the collection itself
    /// (e.g. `http://host:27080/report/daily_video_stats/`). Urls that
    /// commands cannot be resolved against (`data:`, `mailto:`) are rejected.
    pub fn new(collection_url: Url) -> Result<Self, ParseError> {
        if collection_url.cannot_be_a_base() {
            return Err(ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            collection_url,
            criteria: BTreeMap::new(),
            projection: None,
            sort: vec![],
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_criterion(mut self, field: impl Into<String>, criterion: Criterion) -> Self {
        self.criteria.insert(field.into(), criterion);
        self
    }

    pub fn with_criteria(mut self, criteria: impl IntoIterator<Item = (String, Criterion)>) -> Self {
        self.criteria.extend(criteria);
        self
    }

    pub fn with_projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Zero is not a meaningful page size and is bumped to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    pub fn criteria(&self) -> &BTreeMap<String, Criterion> {
        &self.criteria
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn find_url(&self) -> Url {
        self.command_url(FIND_COMMAND)
    }

    pub fn more_url(&self) -> Url {
        self.command_url(MORE_COMMAND)
    }

    pub fn find_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("criteria".into(), encode(&self.criteria));
        params.insert("batch_size".into(), self.batch_size.to_string());
        if let Some(projection) = &self.projection {
            let fields: Map<String, Value> = projection
                .iter()
                .map(|field| (field.clone(), Value::from(1)))
                .collect();
            params.insert("fields".into(), encode(&fields));
        }
        if !self.sort.is_empty() {
            params.insert("sort".into(), encode(&SortKeys(&self.sort)));
        }
        params
    }

    pub fn more_params(&self, cursor: &Cursor) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("batch_size".into(), self.batch_size.to_string());
        params.insert("id".into(), cursor.as_str().to_string());
        params
    }

    fn command_url(&self, command: &str) -> Url {
        let mut url = self.collection_url.clone();
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.join(command)
            .expect("collection url is a base, checked in Query::new")
    }
}

/// Sort document in the order the keys were added; earlier keys take precedence.
struct SortKeys<'a>(&'a [(String, SortOrder)]);

impl Serialize for SortKeys<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, order) in self.0 {
            map.serialize_entry(field, &i8::from(*order))?;
        }
        map.end()
    }
}

fn encode<T: Serialize>(value: &T) -> String {
    // maps with string keys and json values always serialize
    serde_json::to_string(value).unwrap_or_default()
}
