use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::parser::datasets::DatasetName;

/// Fixed-width date segment appended to every dated page URL.
pub const URL_DATE_FORMAT: &str = "%Y/%m/%d";

/// Bucket names as they appear in the bandwidth dataset, in code order.
/// Anything else (including "Other") is code 8.
pub const BANDWIDTH_BUCKETS: [&str; 8] = [
    "Lessthan64Kbps",
    "64-512Kbps",
    "512Kbps-2Mbps",
    "2-6Mbps",
    "6-10Mbps",
    "10-100Mbps",
    "100-1000Mbps",
    "Morethan1Gbps",
];
pub const BANDWIDTH_OTHER: u8 = 8;

pub fn bandwidth_code(bucket: &str) -> u8 {
    BANDWIDTH_BUCKETS
        .iter()
        .position(|b| *b == bucket)
        .map(|i| i as u8)
        .unwrap_or(BANDWIDTH_OTHER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    PageGroup,
    Country,
    Bandwidth,
    Browser,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::PageGroup,
        Dimension::Country,
        Dimension::Bandwidth,
        Dimension::Browser,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::PageGroup => "pagegroup",
            Dimension::Country => "country",
            Dimension::Bandwidth => "bandwidth",
            Dimension::Browser => "browser",
        }
    }

    /// The bucket holding this dimension's own dashboard view.
    pub fn dataset(self) -> DatasetName {
        match self {
            Dimension::PageGroup => DatasetName::PageGroup,
            Dimension::Country => DatasetName::Country,
            Dimension::Bandwidth => DatasetName::Bandwidth,
            Dimension::Browser => DatasetName::Browser,
        }
    }

    /// Scalar fields the dimension's dashboard view already carries per value.
    pub fn dashboard_fields(self) -> &'static [&'static str] {
        match self {
            Dimension::Country => &["load", "n"],
            Dimension::PageGroup => &["load", "n", "moe"],
            Dimension::Browser => &["load", "n", "moe"],
            Dimension::Bandwidth => &["beacons"],
        }
    }

    fn url_prefix(self) -> &'static str {
        match self {
            Dimension::PageGroup => "pg",
            Dimension::Country => "c",
            Dimension::Bandwidth => "bw",
            Dimension::Browser => "u",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pagegroup" | "page_group" | "page" => Ok(Dimension::PageGroup),
            "country" => Ok(Dimension::Country),
            "bandwidth" => Ok(Dimension::Bandwidth),
            "browser" => Ok(Dimension::Browser),
            _ => Err(format!(
                "unknown drilldown '{}' (expected pagegroup, country, bandwidth or browser)",
                s
            )),
        }
    }
}

/// At most one value per dimension; only used to build a page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drilldown {
    pub pagegroup: Option<String>,
    pub country: Option<String>,
    pub bandwidth: Option<String>,
    pub browser: Option<String>,
}

impl Drilldown {
    pub fn none() -> Self {
        Drilldown::default()
    }

    pub fn with(mut self, dim: Dimension, value: impl Into<String>) -> Self {
        self.set(dim, value.into());
        self
    }

    pub fn set(&mut self, dim: Dimension, value: String) {
        *self.slot_mut(dim) = Some(value);
    }

    pub fn get(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::PageGroup => self.pagegroup.as_deref(),
            Dimension::Country => self.country.as_deref(),
            Dimension::Bandwidth => self.bandwidth.as_deref(),
            Dimension::Browser => self.browser.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.get(*d).is_none())
    }

    fn slot_mut(&mut self, dim: Dimension) -> &mut Option<String> {
        match dim {
            Dimension::PageGroup => &mut self.pagegroup,
            Dimension::Country => &mut self.country,
            Dimension::Bandwidth => &mut self.bandwidth,
            Dimension::Browser => &mut self.browser,
        }
    }

    /// Path segments in the order the dashboard expects:
    /// bandwidth, page group, browser, country. Values are percent-encoded.
    pub fn path(&self) -> String {
        const ORDER: [Dimension; 4] = [
            Dimension::Bandwidth,
            Dimension::PageGroup,
            Dimension::Browser,
            Dimension::Country,
        ];

        if self.country.is_some() && self.browser.is_some() {
            warn!(
                country = self.country.as_deref().unwrap_or_default(),
                browser = self.browser.as_deref().unwrap_or_default(),
                "country and browser drilldowns are combined; the dashboard may not support this"
            );
        }

        let mut path = String::new();
        for dim in ORDER {
            let Some(value) = self.get(dim) else {
                continue;
            };
            let segment = match dim {
                Dimension::Bandwidth => bandwidth_code(value).to_string(),
                _ => urlencoding::encode(value).into_owned(),
            };
            path.push('/');
            path.push_str(dim.url_prefix());
            path.push('/');
            path.push_str(&segment);
        }
        path
    }
}

/// Builds page URLs for one dashboard domain.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base: String,
}

impl UrlResolver {
    pub fn new(base_url: &str, domain: &str) -> Self {
        UrlResolver {
            base: format!("{}/domain/{}", base_url.trim_end_matches('/'), domain),
        }
    }

    pub fn resolve(&self, date: Option<NaiveDate>, drilldown: &Drilldown) -> String {
        let mut url = self.base.clone();
        url.push_str(&drilldown.path());
        if let Some(d) = date {
            url.push('/');
            url.push_str(&d.format(URL_DATE_FORMAT).to_string());
        }
        url
    }
}
