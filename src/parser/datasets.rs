use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use super::page::SummaryRecord;
use crate::error::ShimError;

/// The eight buckets a dashboard page can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetName {
    Intraday,
    BounceHistogram,
    Bandwidth,
    PageGroup,
    Histogram,
    Country,
    Browser,
    Summary,
}

impl DatasetName {
    pub const ALL: [DatasetName; 8] = [
        DatasetName::Intraday,
        DatasetName::BounceHistogram,
        DatasetName::Bandwidth,
        DatasetName::PageGroup,
        DatasetName::Histogram,
        DatasetName::Country,
        DatasetName::Browser,
        DatasetName::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetName::Intraday => "intraday",
            DatasetName::BounceHistogram => "bounce_histogram",
            DatasetName::Bandwidth => "bandwidth",
            DatasetName::PageGroup => "pagegroup",
            DatasetName::Histogram => "histogram",
            DatasetName::Country => "country",
            DatasetName::Browser => "browser",
            DatasetName::Summary => "summary",
        }
    }

    /// Name of the embedded literal this bucket is built from.
    pub fn block_name(self) -> Option<&'static str> {
        match self {
            DatasetName::Intraday => Some("intraday_data"),
            DatasetName::BounceHistogram => Some("bounce_histogram_data"),
            DatasetName::Bandwidth => Some("bandwidth_data"),
            DatasetName::PageGroup => Some("page_group_data"),
            DatasetName::Histogram => Some("histogram_data"),
            DatasetName::Country => Some("geo_data"),
            DatasetName::Browser => Some("browser_data"),
            DatasetName::Summary => None,
        }
    }

    /// The summary is a single flat record; every other bucket is keyed.
    pub fn is_flat(self) -> bool {
        self == DatasetName::Summary
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetName {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = match s.to_ascii_lowercase().as_str() {
            "intraday" => DatasetName::Intraday,
            "bounce_histogram" | "bounce" => DatasetName::BounceHistogram,
            "bandwidth" => DatasetName::Bandwidth,
            "pagegroup" | "page_group" => DatasetName::PageGroup,
            "histogram" => DatasetName::Histogram,
            "country" | "geo" => DatasetName::Country,
            "browser" => DatasetName::Browser,
            "summary" => DatasetName::Summary,
            _ => return Err(ShimError::UnknownDataset(s.to_string())),
        };
        Ok(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntradayRecord {
    pub load: Value,
    pub n: Value,
    pub moe: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BounceRecord {
    pub beacons: Value,
    pub sessions: Value,
    pub avg_pages_per_session: Value,
    pub avg_mins_per_session: Value,
    pub bounces: Value,
    pub abandonments: Value,
    pub bounce_rate: Value,
    pub total_sales: Value,
    pub items_sold: Value,
    pub conversion_rate: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageGroupRecord {
    pub load: Value,
    pub moe: Value,
    pub n: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramRecord {
    pub beacons: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRecord {
    pub load: Value,
    pub n: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowserRecord {
    pub load: Value,
    pub moe: Value,
    pub n: Value,
}

/// Normalized contents of one page. Buckets for blocks the page did not
/// carry are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Datasets {
    pub intraday: BTreeMap<String, IntradayRecord>,
    pub bounce_histogram: BTreeMap<String, BounceRecord>,
    pub bandwidth: BTreeMap<String, Value>,
    #[serde(rename = "pagegroup")]
    pub page_group: BTreeMap<String, PageGroupRecord>,
    pub histogram: BTreeMap<String, HistogramRecord>,
    pub country: BTreeMap<String, CountryRecord>,
    pub browser: BTreeMap<String, BrowserRecord>,
    pub summary: SummaryRecord,
}

/// One `{c: [{v: ..}, ..]}` row, addressed by cell position.
struct Row<'a>(&'a [Value]);

impl Row<'_> {
    fn cell(&self, i: usize) -> Value {
        self.0
            .get(i)
            .and_then(|c| c.get("v"))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn key(&self, i: usize) -> Option<String> {
        match self.cell(i) {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn rows(tree: &Value) -> impl Iterator<Item = Row<'_>> {
    tree.get("rows")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|r| r.get("c").and_then(Value::as_array))
        .map(|cells| Row(cells.as_slice()))
}

fn collect<T>(
    blocks: &BTreeMap<String, Value>,
    name: DatasetName,
    key_pos: usize,
    build: impl Fn(&Row<'_>) -> T,
) -> BTreeMap<String, T> {
    let Some(tree) = name.block_name().and_then(|b| blocks.get(b)) else {
        return BTreeMap::new();
    };
    rows(tree)
        .filter_map(|row| row.key(key_pos).map(|k| (k, build(&row))))
        .collect()
}

/// Insert `_` between the last non-digit character and a trailing digit run
/// ("Chrome21" -> "Chrome_21"). A stem already ending in `_` is left alone,
/// so healing is idempotent.
pub fn heal_browser_key(key: &str) -> String {
    let stem = key.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.len() == key.len() || stem.is_empty() || stem.ends_with('_') {
        return key.to_string();
    }
    format!("{}_{}", stem, &key[stem.len()..])
}

impl Datasets {
    pub fn from_blocks(blocks: &BTreeMap<String, Value>, summary: SummaryRecord) -> Self {
        Datasets {
            intraday: collect(blocks, DatasetName::Intraday, 0, |r| IntradayRecord {
                load: r.cell(1),
                n: r.cell(4),
                moe: r.cell(5),
            }),
            bounce_histogram: collect(blocks, DatasetName::BounceHistogram, 0, |r| BounceRecord {
                beacons: r.cell(1),
                sessions: r.cell(2),
                avg_pages_per_session: r.cell(3),
                avg_mins_per_session: r.cell(4),
                bounces: r.cell(5),
                abandonments: r.cell(6),
                bounce_rate: r.cell(7),
                total_sales: r.cell(8),
                items_sold: r.cell(9),
                conversion_rate: r.cell(10),
            }),
            bandwidth: collect(blocks, DatasetName::Bandwidth, 0, |r| r.cell(1)),
            page_group: collect(blocks, DatasetName::PageGroup, 0, |r| PageGroupRecord {
                load: r.cell(1),
                moe: r.cell(2),
                n: r.cell(3),
            }),
            histogram: collect(blocks, DatasetName::Histogram, 0, |r| HistogramRecord {
                beacons: r.cell(1),
            }),
            country: collect(blocks, DatasetName::Country, 3, |r| CountryRecord {
                load: r.cell(1),
                n: r.cell(2),
            }),
            browser: collect(blocks, DatasetName::Browser, 0, |r| BrowserRecord {
                load: r.cell(1),
                moe: r.cell(2),
                n: r.cell(3),
            })
            .into_iter()
            .map(|(k, v)| (heal_browser_key(&k), v))
            .collect(),
            summary,
        }
    }

    /// True when no bucket, summary included, holds anything.
    pub fn is_empty(&self) -> bool {
        self.intraday.is_empty()
            && self.bounce_histogram.is_empty()
            && self.bandwidth.is_empty()
            && self.page_group.is_empty()
            && self.histogram.is_empty()
            && self.country.is_empty()
            && self.browser.is_empty()
            && self.summary.is_empty()
    }

    /// One bucket as a value tree: an object keyed by natural key, or the flat
    /// summary object.
    pub fn get(&self, name: DatasetName) -> Value {
        match name {
            DatasetName::Intraday => keyed(&self.intraday),
            DatasetName::BounceHistogram => keyed(&self.bounce_histogram),
            DatasetName::Bandwidth => keyed(&self.bandwidth),
            DatasetName::PageGroup => keyed(&self.page_group),
            DatasetName::Histogram => keyed(&self.histogram),
            DatasetName::Country => keyed(&self.country),
            DatasetName::Browser => keyed(&self.browser),
            DatasetName::Summary => to_value(&self.summary),
        }
    }

    /// Natural keys of a keyed bucket; empty for the summary.
    pub fn keys(&self, name: DatasetName) -> Vec<String> {
        match self.get(name) {
            Value::Object(map) if !name.is_flat() => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

fn keyed<T: Serialize>(m: &BTreeMap<String, T>) -> Value {
    Value::Object(m.iter().map(|(k, v)| (k.clone(), to_value(v))).collect::<Map<_, _>>())
}
