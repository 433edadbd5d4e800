//! Temporal filtering: absolute bounds plus a small natural-language
//! phrase grammar with a confidence threshold.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use memoria_core::{Error, MemorySearchResult, Result, SearchQuery, TemporalBounds};
use memoria_store::MemoryStore;
use regex::Regex;
use tracing::warn;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ParsedRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn parse_absolute(raw: &str, label: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    Err(Error::Validation(format!(
        "invalid {label} date '{raw}' (expected RFC 3339 or YYYY-MM-DD)"
    )))
}

/// Resolve a natural-language phrase into a range with a confidence score.
/// Unknown phrases come back as confidence 0.
pub(crate) fn parse_phrase(phrase: &str, now: DateTime<Utc>) -> (Option<ParsedRange>, f64) {
    let normalized = phrase.trim().to_lowercase();
    let day_start = |ts: DateTime<Utc>| {
        Utc.from_utc_datetime(
            &ts.date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid"),
        )
    };

    let range = |start, end| Some(ParsedRange { start: Some(start), end: Some(end) });

    match normalized.as_str() {
        "today" => return (range(day_start(now), now), 0.9),
        "yesterday" => {
            let start = day_start(now) - Duration::days(1);
            return (range(start, start + Duration::days(1)), 0.9);
        }
        "last hour" => return (range(now - Duration::hours(1), now), 0.9),
        "last week" => return (range(now - Duration::weeks(1), now), 0.85),
        "last month" => return (range(now - Duration::days(30), now), 0.8),
        "this week" => {
            let weekday = now.date_naive().weekday().num_days_from_monday() as i64;
            let start = day_start(now) - Duration::days(weekday);
            return (range(start, now), 0.75);
        }
        "this month" => {
            let day_of_month = now.date_naive().day0() as i64;
            let start = day_start(now) - Duration::days(day_of_month);
            return (range(start, now), 0.75);
        }
        _ => {}
    }

    let hours_ago = Regex::new(r"^(\d{1,3})\s+hours?\s+ago$").expect("static regex");
    if let Some(caps) = hours_ago.captures(&normalized) {
        let hours: i64 = caps[1].parse().unwrap_or(0);
        let start = now - Duration::hours(hours);
        return (
            Some(ParsedRange { start: Some(start), end: Some(start + Duration::hours(1)) }),
            0.75,
        );
    }

    let days_ago = Regex::new(r"^(\d{1,4})\s+days?\s+ago$").expect("static regex");
    if let Some(caps) = days_ago.captures(&normalized) {
        let days: i64 = caps[1].parse().unwrap_or(0);
        let start = day_start(now) - Duration::days(days);
        return (
            Some(ParsedRange { start: Some(start), end: Some(start + Duration::days(1)) }),
            0.8,
        );
    }

    let last_n_days = Regex::new(r"^last\s+(\d{1,4})\s+days?$").expect("static regex");
    if let Some(caps) = last_n_days.captures(&normalized) {
        let days: i64 = caps[1].parse().unwrap_or(0);
        return (
            Some(ParsedRange { start: Some(now - Duration::days(days)), end: Some(now) }),
            0.8,
        );
    }

    (None, 0.0)
}

/// Resolve all bounds into one range.  Inverted ranges are normalized;
/// an unparseable start date or a low-confidence phrase is rejected.
pub(crate) fn resolve_range(
    bounds: &TemporalBounds,
    now: DateTime<Utc>,
    confidence_threshold: f64,
) -> Result<ParsedRange> {
    let mut start = None;
    let mut end = None;

    if let Some(raw) = bounds.created_after.as_deref().or(bounds.since.as_deref()) {
        start = Some(parse_absolute(raw, "start")?);
    }
    if let Some(raw) = bounds.created_before.as_deref().or(bounds.until.as_deref()) {
        end = Some(parse_absolute(raw, "end")?);
    }

    if let Some(phrase) = &bounds.natural_language {
        let (parsed, confidence) = parse_phrase(phrase, now);
        match parsed {
            Some(range) if confidence >= confidence_threshold => {
                start = start.or(range.start);
                end = end.or(range.end);
            }
            _ => {
                return Err(Error::Validation(format!(
                    "temporal phrase '{phrase}' not understood (confidence {confidence:.2})"
                )));
            }
        }
    }

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            warn!(start = %s, end = %e, "temporal range inverted, normalizing");
            return Ok(ParsedRange { start: Some(e), end: Some(s) });
        }
    }
    Ok(ParsedRange { start, end })
}

pub struct TemporalFilterStrategy {
    store: Arc<dyn MemoryStore>,
    confidence_threshold: f64,
}

impl TemporalFilterStrategy {
    pub fn new(store: Arc<dyn MemoryStore>, confidence_threshold: f64) -> Self {
        Self { store, confidence_threshold }
    }
}

#[async_trait]
impl SearchStrategy for TemporalFilterStrategy {
    fn name(&self) -> &'static str {
        names::TEMPORAL_FILTER
    }

    fn priority(&self) -> i32 {
        default_priority(names::TEMPORAL_FILTER)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::TemporalFilter]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.temporal.is_empty()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let now = Utc::now();
        let range = resolve_range(&query.temporal, now, self.confidence_threshold)
            .map_err(|err| Error::strategy(self.name(), err))?;

        let candidates =
            fetch_candidates(&self.store, query, query.text.trim(), self.name()).await?;
        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .filter_map(|mut hit| {
                if range.start.is_some_and(|s| hit.timestamp < s) {
                    return None;
                }
                if range.end.is_some_and(|e| hit.timestamp > e) {
                    return None;
                }
                let age_days = (now - hit.timestamp).num_seconds().max(0) as f64 / 86_400.0;
                let freshness = 1.0 / (1.0 + age_days / 7.0);
                hit.score = (hit.score * 0.5 + freshness * 0.5).clamp(0.0, 1.0);
                Some(hit)
            })
            .collect();

        Ok(finalize(hits, self.name(), query.limit))
    }
}
