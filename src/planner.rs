use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::dashboard::Dashboard;
use crate::drilldown::{Dimension, Drilldown};
use crate::error::ShimError;
use crate::fetch::PageFetcher;
use crate::parser::datasets::DatasetName;
use crate::query::{QueryDescriptor, QueryKind, Schedule, Tier, Tiers};

/// Validate `query`, fetch every page it needs and assemble the result tree.
///
/// Validation failures return before any page is fetched.
pub fn execute<F: PageFetcher>(dashboard: &Dashboard<F>, query: &QueryDescriptor) -> Result<Value, ShimError> {
    let schedule = query.validate()?;
    info!(query = %query.kind, tiers = query.tiers.len(), "planning query");

    match (query.kind, schedule) {
        (QueryKind::IntradayRangeByPageGroup, Schedule::Days { start, end }) => {
            range_by_page_group(dashboard, start, end)
        }
        (_, Schedule::Days { start, end }) => Ok(range(dashboard, start, end)),
        (kind, Schedule::Day(date)) => point(dashboard, kind, &query.tiers, date),
    }
}

/// Intraday records for every day in `[start, end]`, merged into one map.
///
/// A failing day stops the walk; whatever was gathered before it is returned.
fn range<F: PageFetcher>(dashboard: &Dashboard<F>, start: NaiveDate, end: NaiveDate) -> Value {
    let mut merged = Map::new();
    for day in start.iter_days().take_while(|d| *d <= end) {
        match dashboard.dataset(Some(day), DatasetName::Intraday, None, &Drilldown::none()) {
            Ok(Value::Object(records)) => merged.extend(records),
            Ok(_) => {}
            Err(e) => {
                warn!(%day, error = %e, "stopping intraday range early");
                break;
            }
        }
    }
    Value::Object(merged)
}

/// Intraday records for every day in `[start, end]`, split by page group.
///
/// Each day's page groups are read from that day's dashboard. Any failure
/// aborts the whole query.
fn range_by_page_group<F: PageFetcher>(
    dashboard: &Dashboard<F>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Value, ShimError> {
    let mut by_group = Map::new();
    for day in start.iter_days().take_while(|d| *d <= end) {
        let groups = dashboard.tier_values(Some(day), Dimension::PageGroup, &Drilldown::none())?;
        info!(%day, groups = groups.len(), "splitting intraday by page group");
        for group in &groups {
            let drilldown = Drilldown::none().with(Dimension::PageGroup, group.as_str());
            let records = dashboard.dataset(Some(day), DatasetName::Intraday, None, &drilldown)?;
            let slot = by_group
                .entry(group.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let (Value::Object(into), Value::Object(records)) = (slot, records) {
                into.extend(records);
            }
        }
    }
    Ok(Value::Object(by_group))
}

fn point<F: PageFetcher>(
    dashboard: &Dashboard<F>,
    kind: QueryKind,
    tiers: &Tiers,
    date: NaiveDate,
) -> Result<Value, ShimError> {
    let day = Some(date);
    let dataset = kind.dataset();
    let seek = kind.seek();

    match tiers {
        Tiers::Zero => {
            let data = dashboard.dataset(day, dataset, None, &Drilldown::none())?;
            Ok(project(dataset, data, seek))
        }
        Tiers::One(tier) if on_dashboard(tier.dimension, seek) => {
            let dim = tier.dimension;
            let data = dashboard.dataset(day, dim.dataset(), tier.values.as_deref(), &Drilldown::none())?;
            Ok(project(dim.dataset(), data, seek))
        }
        Tiers::One(tier) => {
            let mut out = Map::new();
            for value in values_of(dashboard, day, tier, &Drilldown::none())? {
                let drilldown = Drilldown::none().with(tier.dimension, value.as_str());
                let data = dashboard.dataset(day, dataset, None, &drilldown)?;
                out.insert(value, project(dataset, data, seek));
            }
            Ok(Value::Object(out))
        }
        Tiers::Two(outer, inner) => {
            let mut out = Map::new();
            for outer_value in values_of(dashboard, day, outer, &Drilldown::none())? {
                let within = Drilldown::none().with(outer.dimension, outer_value.as_str());
                let mut nested = Map::new();
                for inner_value in values_of(dashboard, day, inner, &within)? {
                    let drilldown = within.clone().with(inner.dimension, inner_value.as_str());
                    let data = dashboard.dataset(day, dataset, None, &drilldown)?;
                    nested.insert(inner_value, project(dataset, data, seek));
                }
                out.insert(outer_value, Value::Object(nested));
            }
            Ok(Value::Object(out))
        }
    }
}

/// Whether one fetch of the dimension's own view answers the query: true for
/// whole-record queries and for fields that view carries per value.
fn on_dashboard(dim: Dimension, seek: Option<&str>) -> bool {
    seek.map_or(true, |s| dim.dashboard_fields().contains(&s))
}

fn values_of<F: PageFetcher>(
    dashboard: &Dashboard<F>,
    day: Option<NaiveDate>,
    tier: &Tier,
    within: &Drilldown,
) -> Result<Vec<String>, ShimError> {
    match &tier.values {
        Some(values) => Ok(values.clone()),
        None => dashboard.tier_values(day, tier.dimension, within),
    }
}

/// Pick `seek` out of a bucket: the bare field for the flat summary, or the
/// field of every record for keyed buckets. Absent fields become null.
pub fn project(dataset: DatasetName, data: Value, seek: Option<&str>) -> Value {
    let Some(field) = seek else {
        return data;
    };
    let pick = |record: &Value| record.get(field).cloned().unwrap_or(Value::Null);

    if dataset.is_flat() {
        return pick(&data);
    }
    match data {
        Value::Object(records) => Value::Object(records.iter().map(|(k, r)| (k.clone(), pick(r))).collect()),
        other => pick(&other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::testing::*;
    use crate::query::DateSpec;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn on(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn intraday(rows: &[(&str, &str, &str)]) -> String {
        let rows: Vec<[&str; 6]> = rows.iter().map(|(ts, load, n)| [*ts, *load, "0", "0", *n, "0.1"]).collect();
        let refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        table("intraday_data", &refs)
    }

    fn page_groups(names: &[&str]) -> String {
        let rows: Vec<[&str; 4]> = names.iter().map(|n| [*n, "2.0", "0.1", "10"]).collect();
        let refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        table("page_group_data", &refs)
    }

    fn browsers(names: &[&str]) -> String {
        let rows: Vec<[&str; 4]> = names.iter().map(|n| [*n, "2.0", "0.1", "10"]).collect();
        let refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        table("browser_data", &refs)
    }

    #[test]
    fn missing_dates_fetch_nothing() {
        let d = dashboard(ScriptedFetcher::default());
        let q = QueryDescriptor {
            kind: QueryKind::IntradayRange,
            tiers: Tiers::Zero,
            dates: DateSpec::Range { start: Some(on(2013, 1, 1)), end: None },
        };
        let err = execute(&d, &q).unwrap_err();
        assert_eq!(err.to_record().code, 7);
        assert_eq!(d.fetcher().fetch_count(), 0);
    }

    #[test]
    fn range_merges_each_day() {
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/2013/01/01", intraday(&[("1357000000", "2.1", "5"), ("1357003600", "2.2", "6")]))
                .page("/2013/01/02", intraday(&[("1357086400", "2.3", "7")]))
                .page("/2013/01/03", intraday(&[("1357172800", "2.4", "8"), ("1357176400", "2.5", "9")])),
        );
        let q = QueryDescriptor::between(QueryKind::IntradayRange, on(2013, 1, 1), on(2013, 1, 3));
        let v = execute(&d, &q).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 5);
        assert_eq!(v["1357086400"], json!({"load": 2.3, "n": 7, "moe": 0.1}));
        assert_eq!(d.fetcher().fetch_count(), 3);
    }

    #[test]
    fn range_keeps_days_before_a_failure() {
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/2013/01/01", intraday(&[("1357000000", "2.1", "5")]))
                .failing("/2013/01/02", 502)
                .page("/2013/01/03", intraday(&[("1357172800", "2.4", "8")])),
        );
        let q = QueryDescriptor::between(QueryKind::IntradayRange, on(2013, 1, 1), on(2013, 1, 3));
        let v = execute(&d, &q).unwrap();
        assert_eq!(v, json!({"1357000000": {"load": 2.1, "n": 5, "moe": 0.1}}));
        assert_eq!(d.fetcher().fetch_count(), 2);
    }

    #[test]
    fn range_by_page_group_splits_and_merges() {
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/2013/01/01", page_groups(&["Home", "Search"]))
                .page("/2013/01/02", page_groups(&["Home"]))
                .page("/pg/Home/2013/01/01", intraday(&[("1357000000", "2.1", "5")]))
                .page("/pg/Search/2013/01/01", intraday(&[("1357000000", "3.1", "2")]))
                .page("/pg/Home/2013/01/02", intraday(&[("1357086400", "2.2", "4")])),
        );
        let q = QueryDescriptor::between(QueryKind::IntradayRangeByPageGroup, on(2013, 1, 1), on(2013, 1, 2));
        let v = execute(&d, &q).unwrap();
        assert_eq!(v["Home"].as_object().unwrap().len(), 2);
        assert_eq!(v["Search"]["1357000000"]["load"], json!(3.1));
        assert_eq!(v["Search"].as_object().unwrap().len(), 1);
        assert_eq!(d.fetcher().fetch_count(), 5);
    }

    #[test]
    fn range_by_page_group_aborts_on_any_failure() {
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/2013/01/01", page_groups(&["Home", "Search"]))
                .page("/pg/Home/2013/01/01", intraday(&[("1357000000", "2.1", "5")]))
                .failing("/pg/Search/2013/01/01", 500),
        );
        let q = QueryDescriptor::between(QueryKind::IntradayRangeByPageGroup, on(2013, 1, 1), on(2013, 1, 2));
        let err = execute(&d, &q).unwrap_err();
        assert!(matches!(err, ShimError::Http { status: 500, .. }));
    }

    #[test]
    fn one_tier_enumeration_aborts_on_failure() {
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/pg/Home/2013/01/15", summary(2.0, 10))
                .failing("/pg/Search/2013/01/15", 503)
                .page("/pg/Checkout/2013/01/15", summary(1.0, 2)),
        );
        let q = QueryDescriptor::on(
            QueryKind::Perc95LoadTime,
            Tiers::One(Tier::only(Dimension::PageGroup, ["Home", "Search", "Checkout"])),
            on(2013, 1, 15),
        );
        let err = execute(&d, &q).unwrap_err();
        assert!(matches!(err, ShimError::Http { status: 503, .. }));
        assert_eq!(d.fetcher().fetch_count(), 2);
    }

    #[test]
    fn two_tiers_abort_on_first_failure() {
        let page = summary(2.0, 10);
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/pg/Home/u/Chrome/2013/01/15", page.clone())
                .failing("/pg/Home/u/Firefox/2013/01/15", 503)
                .page("/pg/Search/u/Chrome/2013/01/15", page.clone())
                .page("/pg/Search/u/Firefox/2013/01/15", page),
        );
        let q = QueryDescriptor::on(
            QueryKind::MedianLoadTime,
            Tiers::Two(
                Tier::only(Dimension::PageGroup, ["Home", "Search"]),
                Tier::only(Dimension::Browser, ["Chrome", "Firefox"]),
            ),
            on(2013, 1, 15),
        );
        let err = execute(&d, &q).unwrap_err();
        assert!(matches!(err, ShimError::Http { status: 503, .. }));
        assert_eq!(d.fetcher().fetch_count(), 2);
    }

    #[test]
    fn failed_value_discovery_aborts() {
        let d = dashboard(ScriptedFetcher::default().failing("/2013/01/15", 502));
        let q = QueryDescriptor::on(
            QueryKind::Perc95LoadTime,
            Tiers::One(Tier::all(Dimension::PageGroup)),
            on(2013, 1, 15),
        );
        assert!(matches!(execute(&d, &q), Err(ShimError::Http { status: 502, .. })));
        assert_eq!(d.fetcher().fetch_count(), 1);

        let d = dashboard(ScriptedFetcher::default().page("/pg/Home/2013/01/15", "<html></html>"));
        let q = QueryDescriptor::on(
            QueryKind::MedianLoadTime,
            Tiers::Two(Tier::only(Dimension::PageGroup, ["Home", "Search"]), Tier::all(Dimension::Browser)),
            on(2013, 1, 15),
        );
        assert!(matches!(execute(&d, &q), Err(ShimError::NoData { .. })));
        assert_eq!(d.fetcher().fetch_count(), 1);
    }

    #[test]
    fn two_tiers_fetch_every_pair() {
        let page = summary(2.0, 10);
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/pg/Home/u/Chrome/2013/01/15", page.clone())
                .page("/pg/Home/u/Firefox/2013/01/15", page.clone())
                .page("/pg/Search/u/Chrome/2013/01/15", summary(3.0, 4))
                .page("/pg/Search/u/Firefox/2013/01/15", page),
        );
        let q = QueryDescriptor::on(
            QueryKind::MedianLoadTime,
            Tiers::Two(
                Tier::only(Dimension::PageGroup, ["Home", "Search"]),
                Tier::only(Dimension::Browser, ["Chrome", "Firefox"]),
            ),
            on(2013, 1, 15),
        );
        let v = execute(&d, &q).unwrap();
        assert_eq!(
            v,
            json!({
                "Home": {"Chrome": 2.0, "Firefox": 2.0},
                "Search": {"Chrome": 3.0, "Firefox": 2.0},
            })
        );
        assert_eq!(d.fetcher().fetch_count(), 4);
    }

    #[test]
    fn two_tiers_discover_inner_values_within_outer() {
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/pg/Home/2013/01/15", browsers(&["Chrome21"]))
                .page("/pg/Home/u/Chrome_21/2013/01/15", summary(1.5, 3)),
        );
        let q = QueryDescriptor::on(
            QueryKind::NumberOfSamples,
            Tiers::Two(Tier::only(Dimension::PageGroup, ["Home"]), Tier::all(Dimension::Browser)),
            on(2013, 1, 15),
        );
        assert_eq!(execute(&d, &q).unwrap(), json!({"Home": {"Chrome_21": 3}}));
    }

    #[test]
    fn one_tier_served_by_the_dimension_view() {
        let page = table(
            "geo_data",
            &[&["'United States'", "2.1", "100", "'US'"], &["Canada", "2.4", "20", "CA"]],
        );
        let d = dashboard(ScriptedFetcher::default().page("/2013/01/15", page));
        let q = QueryDescriptor::on(
            QueryKind::MedianLoadTime,
            Tiers::One(Tier::all(Dimension::Country)),
            on(2013, 1, 15),
        );
        assert_eq!(execute(&d, &q).unwrap(), json!({"US": 2.1, "CA": 2.4}));
        assert_eq!(d.fetcher().fetch_count(), 1);
    }

    #[test]
    fn one_tier_enumerates_when_the_view_lacks_the_field() {
        let mut perc = summary(2.0, 10);
        perc.push_str("<td>p95:  6.5 sec</td>\n");
        let d = dashboard(
            ScriptedFetcher::default()
                .page("/2013/01/15", page_groups(&["Home", "Search"]))
                .page("/pg/Home/2013/01/15", perc)
                .page("/pg/Search/2013/01/15", summary(1.0, 2)),
        );
        let q = QueryDescriptor::on(
            QueryKind::Perc95LoadTime,
            Tiers::One(Tier::all(Dimension::PageGroup)),
            on(2013, 1, 15),
        );
        assert_eq!(execute(&d, &q).unwrap(), json!({"Home": 6.5, "Search": null}));
        assert_eq!(d.fetcher().fetch_count(), 3);
    }

    #[test]
    fn zero_tiers_project_the_summary() {
        let d = dashboard(ScriptedFetcher::default().page("/2013/01/15", summary(2.5, 1200)));
        let date = on(2013, 1, 15);
        let q = QueryDescriptor::on(QueryKind::MedianLoadTime, Tiers::Zero, date);
        assert_eq!(execute(&d, &q).unwrap(), json!(2.5));

        let q = QueryDescriptor::on(QueryKind::MarginOfError, Tiers::Zero, date);
        assert_eq!(execute(&d, &q).unwrap(), Value::Null);

        let q = QueryDescriptor::on(QueryKind::Summary, Tiers::Zero, date);
        assert_eq!(execute(&d, &q).unwrap(), json!({"load": 2.5, "n": 1200}));
    }

    #[test]
    fn project_keyed_bucket() {
        let data = json!({"a": {"load": 1, "n": 2}, "b": {"n": 3}});
        assert_eq!(
            project(DatasetName::PageGroup, data, Some("load")),
            json!({"a": 1, "b": null})
        );
    }
}
