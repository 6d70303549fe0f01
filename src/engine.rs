//! The report matrix orchestrator.
//!
//! One [`ReportEngine::compute`] call resolves parameters, declares every
//! column in display order, then runs the comparison pass followed by the sum
//! pass. Any failure aborts the call and no matrix is returned.

use crate::columns::{ColumnBuilder, ReportTemplate};
use crate::error::Result;
use crate::expression::FilterHooks;
use crate::matrix::{MatrixAccumulator, ReportMatrix};
use crate::params::{param_values, ReferenceLookup};
use crate::period_dates::{resolve_period_dates, DateRangeCatalog, ResolvedDates};
use crate::schema::{Period, PeriodMode, ReportInstance};
use crate::utils::{format_date, subst_description_dates};
use chrono::{Local, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_move_line_model() -> String {
    "account.move.line".to_string()
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Date format used in column descriptions when the instance has none.
    #[serde(default = "default_date_format")]
    pub default_date_format: String,

    /// Model holding the journal items drill-downs open by default.
    #[serde(default = "default_move_line_model")]
    pub move_line_model: String,

    /// Overrides the current date used as pivot when an instance has no base date.
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_date_format: default_date_format(),
            move_line_model: default_move_line_model(),
            today: None,
        }
    }
}

/// Computes report instances of one report template.
pub struct ReportEngine<'a, T: ReportTemplate> {
    pub(crate) template: &'a T,
    pub(crate) catalog: &'a dyn DateRangeCatalog,
    pub(crate) lookup: &'a dyn ReferenceLookup,
    pub(crate) hooks: FilterHooks,
    pub(crate) config: EngineConfig,
}

impl<'a, T: ReportTemplate> ReportEngine<'a, T> {
    pub fn new(
        template: &'a T,
        catalog: &'a dyn DateRangeCatalog,
        lookup: &'a dyn ReferenceLookup,
    ) -> Self {
        Self {
            template,
            catalog,
            lookup,
            hooks: FilterHooks::default(),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: FilterHooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.config
            .today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Effective dates of one column of `instance`.
    pub fn period_dates(&self, instance: &ReportInstance, period: &Period) -> ResolvedDates {
        resolve_period_dates(instance, period, self.today(), self.catalog)
    }

    pub fn compute(&self, instance: &ReportInstance) -> Result<ReportMatrix> {
        info!(
            "Computing report instance {} ({} columns)",
            instance.name,
            instance.periods.len()
        );

        let params = param_values(instance, self.lookup)?;
        let mut processor = self.template.prepare_processor(instance.company_id)?;
        let mut matrix = self.template.prepare_matrix();

        {
            let mut builder = ColumnBuilder::new(
                self.template,
                &mut processor,
                &self.hooks,
                &params,
                instance.target_move,
            );
            for period in instance.ordered_periods() {
                let dates = self.period_dates(instance, period);
                let description =
                    describe_column(instance, period, &dates, &self.config.default_date_format);
                builder.add_column(&mut matrix, period, &dates, period.name.clone(), description)?;
            }
        }

        debug!("Computing comparison columns of {}", instance.name);
        matrix.compute_comparisons()?;
        debug!("Computing sum columns of {}", instance.name);
        matrix.compute_sums()?;

        Ok(matrix.as_dict())
    }
}

/// Column description shown under the label, e.g. "from 2024-01-01 to 2024-01-31".
///
/// Columns without a date filter, or whose dates are not fully resolved, have none.
pub fn describe_column(
    instance: &ReportInstance,
    period: &Period,
    dates: &ResolvedDates,
    default_date_format: &str,
) -> Option<String> {
    if period.mode == PeriodMode::NoDateFilter {
        return None;
    }
    let (date_from, date_to) = dates.range()?;

    let date_format = instance
        .date_format
        .as_deref()
        .unwrap_or(default_date_format);
    let from = format_date(date_from, date_format);
    let to = format_date(date_to, date_format);

    let description = if date_from == date_to {
        match &instance.description_format_single {
            Some(fmt) => subst_description_dates(fmt, &from, &to),
            None => from,
        }
    } else {
        match &instance.description_format_range {
            Some(fmt) => subst_description_dates(fmt, &from, &to),
            None => format!("from {} to {}", from, to),
        }
    };
    Some(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PeriodSource, PeriodType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dates(from: NaiveDate, to: NaiveDate) -> ResolvedDates {
        ResolvedDates {
            date_from: Some(from),
            date_to: Some(to),
            valid: true,
        }
    }

    #[test]
    fn test_default_descriptions() {
        let instance = ReportInstance::new(1, "Test");
        let period = Period::new(1, 1, "Yesterday").relative(PeriodType::Day, -1, 1);

        let single = dates(date(2024, 3, 14), date(2024, 3, 14));
        assert_eq!(
            describe_column(&instance, &period, &single, "%Y-%m-%d").as_deref(),
            Some("2024-03-14")
        );

        let range = dates(date(2024, 3, 11), date(2024, 3, 17));
        assert_eq!(
            describe_column(&instance, &period, &range, "%d/%m/%Y").as_deref(),
            Some("from 11/03/2024 to 17/03/2024")
        );
    }

    #[test]
    fn test_custom_description_formats() {
        let mut instance = ReportInstance::new(1, "Test");
        instance.date_format = Some("%b %d".to_string());
        instance.description_format_single = Some("On <<from>>".to_string());
        instance.description_format_range = Some("<<from>> → <<to>>".to_string());
        let period = Period::new(1, 1, "Week").relative(PeriodType::Week, 0, 1);

        let single = dates(date(2024, 3, 14), date(2024, 3, 14));
        assert_eq!(
            describe_column(&instance, &period, &single, "%Y-%m-%d").as_deref(),
            Some("On Mar 14")
        );
        let range = dates(date(2024, 3, 11), date(2024, 3, 17));
        assert_eq!(
            describe_column(&instance, &period, &range, "%Y-%m-%d").as_deref(),
            Some("Mar 11 → Mar 17")
        );
    }

    #[test]
    fn test_no_description_without_dates() {
        let instance = ReportInstance::new(1, "Test");
        let sum = Period::new(2, 1, "Total").with_source(PeriodSource::SumColumns {
            columns: Vec::new(),
            accdet: false,
        });
        let range = dates(date(2024, 1, 1), date(2024, 1, 31));
        assert_eq!(describe_column(&instance, &sum, &range, "%Y-%m-%d"), None);

        let fixed = Period::new(3, 1, "Open").fixed(Some(date(2024, 1, 1)), None);
        let half_open = ResolvedDates {
            date_from: Some(date(2024, 1, 1)),
            date_to: None,
            valid: false,
        };
        assert_eq!(describe_column(&instance, &fixed, &half_open, "%Y-%m-%d"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.move_line_model, "account.move.line");
        assert_eq!(config.default_date_format, "%Y-%m-%d");
    }
}
