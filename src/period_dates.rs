//! Resolution of a column's effective date range.
//!
//! Resolution is a priority chain evaluated against the owning instance:
//!
//! 1. outside comparison mode every column takes the instance's fixed dates;
//! 2. `NoDateFilter` columns have no dates and are always valid;
//! 3. `Fixed` columns take their manually entered dates;
//! 4. relative `Day` columns start `offset` days from the pivot date;
//! 5. relative `Week` columns start on the Monday of the pivot week, shifted by `offset` weeks;
//! 6. relative `DateRange` columns walk an ordered catalog of named date ranges.
//!
//! Anything else leaves the column without dates and not valid.

use crate::schema::{
    CompanyId, DateRangeId, DateRangeTypeId, Period, PeriodMode, PeriodType, ReportInstance,
};
use crate::utils::{add_days, week_start};
use chrono::NaiveDate;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named entry of a date range catalog (e.g. a fiscal month or quarter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub id: DateRangeId,
    pub name: String,
    pub type_id: DateRangeTypeId,
    #[serde(default)]
    pub company_id: CompanyId,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.date_start <= date && date <= self.date_end
    }
}

/// Lookup into the catalog of named date ranges.
pub trait DateRangeCatalog {
    /// Returns the first entry of the given type containing `date`.
    fn containing(
        &self,
        type_id: DateRangeTypeId,
        company_id: CompanyId,
        date: NaiveDate,
    ) -> Option<DateRange>;

    /// Returns all entries of the given type, ordered by start date.
    fn ordered(&self, type_id: DateRangeTypeId, company_id: CompanyId) -> Vec<DateRange>;

    fn get(&self, id: DateRangeId) -> Option<DateRange>;
}

/// Catalog backed by a plain list of entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDateRangeCatalog {
    ranges: Vec<DateRange>,
}

impl InMemoryDateRangeCatalog {
    pub fn new(ranges: Vec<DateRange>) -> Self {
        Self { ranges }
    }

    pub fn push(&mut self, range: DateRange) {
        self.ranges.push(range);
    }
}

impl DateRangeCatalog for InMemoryDateRangeCatalog {
    fn containing(
        &self,
        type_id: DateRangeTypeId,
        company_id: CompanyId,
        date: NaiveDate,
    ) -> Option<DateRange> {
        self.ranges
            .iter()
            .find(|r| r.type_id == type_id && r.company_id == company_id && r.contains(date))
            .cloned()
    }

    fn ordered(&self, type_id: DateRangeTypeId, company_id: CompanyId) -> Vec<DateRange> {
        let mut ranges: Vec<DateRange> = self
            .ranges
            .iter()
            .filter(|r| r.type_id == type_id && r.company_id == company_id)
            .cloned()
            .collect();
        ranges.sort_by_key(|r| (r.date_start, r.id));
        ranges
    }

    fn get(&self, id: DateRangeId) -> Option<DateRange> {
        self.ranges.iter().find(|r| r.id == id).cloned()
    }
}

/// The effective date range of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvedDates {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub valid: bool,
}

impl ResolvedDates {
    fn bounded(date_from: Option<NaiveDate>, date_to: Option<NaiveDate>) -> Self {
        Self {
            date_from,
            date_to,
            valid: date_from.is_some() && date_to.is_some(),
        }
    }

    fn always_valid(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from: Some(date_from),
            date_to: Some(date_to),
            valid: true,
        }
    }

    fn unbounded() -> Self {
        Self {
            date_from: None,
            date_to: None,
            valid: true,
        }
    }

    /// Both bounds, when the range is fully resolved.
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.date_from.zip(self.date_to)
    }
}

pub fn resolve_period_dates(
    instance: &ReportInstance,
    period: &Period,
    today: NaiveDate,
    catalog: &dyn DateRangeCatalog,
) -> ResolvedDates {
    if !instance.comparison_mode() {
        return ResolvedDates::bounded(instance.date_from, instance.date_to);
    }

    let pivot = instance.pivot_date(today);

    match (period.mode, period.period_type) {
        (PeriodMode::NoDateFilter, _) => ResolvedDates::unbounded(),
        (PeriodMode::Fixed, _) => {
            ResolvedDates::bounded(period.manual_date_from, period.manual_date_to)
        }
        (PeriodMode::RelativeToBase, Some(PeriodType::Day)) => {
            let date_from = add_days(pivot, period.offset);
            let date_to = add_days(date_from, period.duration - 1);
            ResolvedDates::always_valid(date_from, date_to)
        }
        (PeriodMode::RelativeToBase, Some(PeriodType::Week)) => {
            let date_from = add_days(week_start(pivot), period.offset.saturating_mul(7));
            let date_to = add_days(date_from, period.duration.saturating_mul(7) - 1);
            ResolvedDates::always_valid(date_from, date_to)
        }
        (PeriodMode::RelativeToBase, Some(PeriodType::DateRange)) => {
            resolve_catalog_window(instance, period, pivot, catalog).unwrap_or_default()
        }
        (PeriodMode::RelativeToBase, None) => ResolvedDates::default(),
    }
}

fn resolve_catalog_window(
    instance: &ReportInstance,
    period: &Period,
    pivot: NaiveDate,
    catalog: &dyn DateRangeCatalog,
) -> Option<ResolvedDates> {
    let type_id = period.date_range_type?;

    let Some(current) = catalog.containing(type_id, instance.company_id, pivot) else {
        warn!(
            "No date range of type {} contains pivot date {} (column {})",
            type_id, pivot, period.name
        );
        return None;
    };

    let all_ranges = catalog.ordered(type_id, instance.company_id);
    let position = all_ranges.iter().position(|r| r.id == current.id)? as i64;

    let window = position
        .checked_add(period.offset)
        .and_then(|start| Some((start, start.checked_add(period.duration)?)));
    let Some((start, end)) = window.filter(|(start, end)| {
        *start >= 0 && period.duration >= 1 && *end <= all_ranges.len() as i64
    }) else {
        warn!(
            "Column {} window (offset {}, duration {}) is outside the {} entries of type {}",
            period.name,
            period.offset,
            period.duration,
            all_ranges.len(),
            type_id
        );
        return None;
    };

    let window = &all_ranges[start as usize..end as usize];
    let first = window.first()?;
    let last = window.last()?;
    Some(ResolvedDates::always_valid(first.date_start, last.date_end))
}
