use crate::{
    aggregate::GroupSpec,
    query::Criterion,
    series::{AccuracyGainSeries, CustomSeries, PercentCorrectSeries, RetentionSeries, Series},
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Fetches one report series and prints its aggregate", long_about = None)]
pub struct Args {
    /// Config file; overrides the one named by `SERIES__CONFIG`.
    #[clap(short, long)]
    pub config_path: Option<std::path::PathBuf>,

    /// Rows requested per page, overriding `source.batch_size`.
    #[clap(long)]
    pub batch_size: Option<usize>,

    #[clap(subcommand)]
    pub series: SeriesCommand,
}

#[derive(Subcommand, Debug)]
pub enum SeriesCommand {
    /// Accuracy gain by card number for users who did `stacks` stacks.
    AccuracyGain {
        #[clap(long, default_value_t = 1)]
        stacks: u32,
        #[clap(long)]
        segment: Option<String>,
    },
    /// Share of correct answers by card number within a topic.
    Retention {
        #[clap(long, default_value = RetentionSeries::ANY_TOPIC)]
        topic: String,
        #[clap(long)]
        segment: Option<String>,
    },
    /// Share of correct answers per topic over a window of cards.
    PercentCorrect {
        #[clap(long)]
        segment: Option<String>,
        #[clap(long)]
        first_card: Option<u32>,
        #[clap(long)]
        last_card: Option<u32>,
    },
    /// Any collection, grouped by `key` with `sum` fields summed.
    Custom {
        #[clap(long)]
        collection: String,
        #[clap(long)]
        key: String,
        #[clap(long = "sum")]
        sum_fields: Vec<String>,
        /// Mongo criteria document, e.g. '{"dt": {"$gte": "2012-01-01"}}'.
        #[clap(long)]
        criteria: Option<String>,
    },
}

impl SeriesCommand {
    pub fn into_series(self) -> anyhow::Result<Series> {
        let series = match self {
            SeriesCommand::AccuracyGain { stacks, segment } => AccuracyGainSeries {
                stacks,
                user_segment: segment,
            }
            .into(),
            SeriesCommand::Retention { topic, segment } => RetentionSeries {
                topic,
                user_segment: segment,
            }
            .into(),
            SeriesCommand::PercentCorrect {
                segment,
                first_card,
                last_card,
            } => PercentCorrectSeries {
                user_segment: segment,
                first_card,
                last_card,
            }
            .into(),
            SeriesCommand::Custom {
                collection,
                key,
                sum_fields,
                criteria,
            } => {
                let mut series =
                    CustomSeries::new(collection, GroupSpec::new(key, sum_fields))
                        .with_group_projection();
                if let Some(criteria) = criteria {
                    for (field, value) in parse_criteria(&criteria)? {
                        series = series.with_criterion(field, Criterion::equals(value));
                    }
                }
                series.into()
            }
        };
        Ok(series)
    }
}

fn parse_criteria(criteria: &str) -> anyhow::Result<Map<String, Value>> {
    serde_json::from_str(criteria).context("criteria must be a json object")
}
