use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::info;

use crate::drilldown::{Dimension, Drilldown, UrlResolver};
use crate::error::ShimError;
use crate::fetch::PageFetcher;
use crate::parser::{self, datasets::DatasetName, datasets::Datasets};

/// Pause before every fetch so a long enumeration does not hammer the dashboard.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// One dashboard domain: resolves page URLs, fetches them one at a time and
/// turns each into normalized datasets.
pub struct Dashboard<F> {
    fetcher: F,
    urls: UrlResolver,
    throttle: Duration,
}

impl<F: PageFetcher> Dashboard<F> {
    pub fn new(fetcher: F, urls: UrlResolver) -> Self {
        Dashboard {
            fetcher,
            urls,
            throttle: DEFAULT_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// All eight buckets of the page for `date` under `drilldown`.
    pub fn datasets(&self, date: Option<NaiveDate>, drilldown: &Drilldown) -> Result<Datasets, ShimError> {
        let url = self.urls.resolve(date, drilldown);
        if !self.throttle.is_zero() {
            thread::sleep(self.throttle);
        }
        info!(%url, "fetching dashboard page");
        let raw = self.fetcher.fetch(&url)?;
        parser::extract_page(&url, &raw)
    }

    /// One bucket of the page, optionally restricted to the given keys.
    pub fn dataset(
        &self,
        date: Option<NaiveDate>,
        name: DatasetName,
        only: Option<&[String]>,
        drilldown: &Drilldown,
    ) -> Result<Value, ShimError> {
        let data = self.datasets(date, drilldown)?.get(name);
        Ok(match only {
            Some(keys) => restrict(data, keys),
            None => data,
        })
    }

    /// Values of `dim` present on the page for `date` under `within`, e.g. the
    /// browsers seen for one page group.
    pub fn tier_values(
        &self,
        date: Option<NaiveDate>,
        dim: Dimension,
        within: &Drilldown,
    ) -> Result<Vec<String>, ShimError> {
        Ok(self.datasets(date, within)?.keys(dim.dataset()))
    }
}

fn restrict(data: Value, keys: &[String]) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| keys.contains(k))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}
