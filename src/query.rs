use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::drilldown::Dimension;
use crate::error::ShimError;
use crate::parser::datasets::DatasetName;

/// The closed set of questions the shim can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    MedianLoadTime,
    Perc95LoadTime,
    Perc98LoadTime,
    NumberOfSamples,
    MarginOfError,
    Summary,
    BounceData,
    Intraday,
    IntradayRange,
    IntradayRangeByPageGroup,
}

impl QueryKind {
    pub const ALL: [QueryKind; 10] = [
        QueryKind::MedianLoadTime,
        QueryKind::Perc95LoadTime,
        QueryKind::Perc98LoadTime,
        QueryKind::NumberOfSamples,
        QueryKind::MarginOfError,
        QueryKind::Summary,
        QueryKind::BounceData,
        QueryKind::Intraday,
        QueryKind::IntradayRange,
        QueryKind::IntradayRangeByPageGroup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueryKind::MedianLoadTime => "median_load_time",
            QueryKind::Perc95LoadTime => "perc95_load_time",
            QueryKind::Perc98LoadTime => "perc98_load_time",
            QueryKind::NumberOfSamples => "number_of_samples",
            QueryKind::MarginOfError => "margin_of_error",
            QueryKind::Summary => "summary",
            QueryKind::BounceData => "bounce_data",
            QueryKind::Intraday => "intraday",
            QueryKind::IntradayRange => "intraday_range",
            QueryKind::IntradayRangeByPageGroup => "intraday_range_by_page_group",
        }
    }

    /// Bucket the query reads.
    pub fn dataset(self) -> DatasetName {
        match self {
            QueryKind::MedianLoadTime
            | QueryKind::Perc95LoadTime
            | QueryKind::Perc98LoadTime
            | QueryKind::NumberOfSamples
            | QueryKind::MarginOfError
            | QueryKind::Summary => DatasetName::Summary,
            QueryKind::BounceData => DatasetName::BounceHistogram,
            QueryKind::Intraday | QueryKind::IntradayRange | QueryKind::IntradayRangeByPageGroup => {
                DatasetName::Intraday
            }
        }
    }

    /// Scalar field projected out of each matched record; `None` returns records whole.
    pub fn seek(self) -> Option<&'static str> {
        match self {
            QueryKind::MedianLoadTime => Some("load"),
            QueryKind::Perc95LoadTime => Some("perc95"),
            QueryKind::Perc98LoadTime => Some("perc98"),
            QueryKind::NumberOfSamples => Some("n"),
            QueryKind::MarginOfError => Some("moe"),
            _ => None,
        }
    }

    pub fn is_range(self) -> bool {
        matches!(self, QueryKind::IntradayRange | QueryKind::IntradayRangeByPageGroup)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('-', "_").to_ascii_lowercase();
        QueryKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = QueryKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown query '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// One drilldown level; `values: None` means "every value the dashboard lists".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub dimension: Dimension,
    pub values: Option<Vec<String>>,
}

impl Tier {
    pub fn all(dimension: Dimension) -> Self {
        Tier { dimension, values: None }
    }

    pub fn only<I, S>(dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tier {
            dimension,
            values: Some(values.into_iter().map(Into::into).collect()),
        }
    }
}

/// `DIM` or `DIM=v1,v2`.
impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((dim, values)) => {
                let values: Vec<&str> = values.split(',').map(str::trim).filter(|v| !v.is_empty()).collect();
                if values.is_empty() {
                    return Err(format!("tier '{}' lists no values", s));
                }
                Ok(Tier::only(dim.trim().parse()?, values))
            }
            None => Ok(Tier::all(s.trim().parse()?)),
        }
    }
}

/// Zero, one or two drilldown levels, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tiers {
    #[default]
    Zero,
    One(Tier),
    Two(Tier, Tier),
}

impl Tiers {
    pub fn len(&self) -> usize {
        match self {
            Tiers::Zero => 0,
            Tiers::One(_) => 1,
            Tiers::Two(..) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn innermost(&self) -> Option<&Tier> {
        match self {
            Tiers::Zero => None,
            Tiers::One(t) | Tiers::Two(_, t) => Some(t),
        }
    }
}

impl TryFrom<Vec<Tier>> for Tiers {
    type Error = String;

    fn try_from(tiers: Vec<Tier>) -> Result<Self, Self::Error> {
        let mut it = tiers.into_iter();
        match (it.next(), it.next(), it.next()) {
            (None, _, _) => Ok(Tiers::Zero),
            (Some(a), None, _) => Ok(Tiers::One(a)),
            (Some(a), Some(b), None) => Ok(Tiers::Two(a, b)),
            _ => Err("at most two drilldown tiers are supported".to_string()),
        }
    }
}

/// When the query applies. Times of day are ignored; only the UTC date counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSpec {
    #[default]
    Unset,
    Day(DateTime<Utc>),
    Range {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub kind: QueryKind,
    pub tiers: Tiers,
    pub dates: DateSpec,
}

/// Validated dates, normalized to midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Day(NaiveDate),
    Days { start: NaiveDate, end: NaiveDate },
}

impl QueryDescriptor {
    pub fn on(kind: QueryKind, tiers: Tiers, date: DateTime<Utc>) -> Self {
        QueryDescriptor {
            kind,
            tiers,
            dates: DateSpec::Day(date),
        }
    }

    pub fn between(kind: QueryKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        QueryDescriptor {
            kind,
            tiers: Tiers::Zero,
            dates: DateSpec::Range {
                start: Some(start),
                end: Some(end),
            },
        }
    }

    /// Check that the dates the kind needs are present.
    pub fn validate(&self) -> Result<Schedule, ShimError> {
        let missing = |fields: Vec<&'static str>| ShimError::MissingFields {
            query: self.kind.name(),
            fields,
        };

        if self.kind.is_range() {
            let (start, end) = match self.dates {
                DateSpec::Range { start, end } => (start, end),
                _ => (None, None),
            };
            match (start, end) {
                (Some(s), Some(e)) => Ok(Schedule::Days {
                    start: s.date_naive(),
                    end: e.date_naive(),
                }),
                (s, e) => {
                    let mut fields = Vec::new();
                    if s.is_none() {
                        fields.push("start");
                    }
                    if e.is_none() {
                        fields.push("end");
                    }
                    Err(missing(fields))
                }
            }
        } else {
            match self.dates {
                DateSpec::Day(d) => Ok(Schedule::Day(d.date_naive())),
                _ => Err(missing(vec!["date"])),
            }
        }
    }
}

/// `YYYY-MM-DD`, RFC 3339, or a Unix timestamp in seconds.
pub fn parse_when(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<i64>() {
        return DateTime::from_timestamp(ts, 0).ok_or_else(|| format!("timestamp {} out of range", ts));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("cannot read '{}' as a date (use YYYY-MM-DD or a Unix timestamp)", s))
}
