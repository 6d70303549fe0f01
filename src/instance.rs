//! Configuration edits on a report instance.
//!
//! Every structural edit goes through [`ReportInstance::edit`], which
//! re-validates the whole instance and rolls the edit back on failure.

use crate::error::{ReportError, Result};
use crate::period_dates::{DateRange, DateRangeCatalog};
use crate::schema::{
    ParamDefinition, ParamValue, Period, PeriodId, PeriodSource, PeriodType, ReportInstance, Sign,
    SumColumn,
};
use crate::validation::validate_instance;
use chrono::NaiveDate;
use log::debug;

impl ReportInstance {
    /// Applies `change` and validates the result; the instance is left
    /// untouched if either fails.
    pub fn edit<R>(&mut self, change: impl FnOnce(&mut ReportInstance) -> Result<R>) -> Result<R> {
        let mut draft = self.clone();
        let result = change(&mut draft)?;
        validate_instance(&draft)?;
        *self = draft;
        Ok(result)
    }

    /// Adds a column owned by this instance. A zero id is replaced by the next free one.
    pub fn add_period(&mut self, mut period: Period) -> Result<PeriodId> {
        self.edit(|instance| {
            if period.id == 0 {
                period.id = instance.next_period_id();
            }
            period.instance_id = instance.id;
            let id = period.id;
            instance.periods.push(period);
            Ok(id)
        })
    }

    pub fn update_period(&mut self, id: PeriodId, change: impl FnOnce(&mut Period)) -> Result<()> {
        self.edit(|instance| {
            let period = instance
                .period_mut(id)
                .ok_or(ReportError::UnknownPeriod(id))?;
            change(period);
            Ok(())
        })
    }

    /// Removes a column; fails if another column still sums or compares it.
    pub fn remove_period(&mut self, id: PeriodId) -> Result<Period> {
        self.edit(|instance| {
            let position = instance
                .periods
                .iter()
                .position(|p| p.id == id)
                .ok_or(ReportError::UnknownPeriod(id))?;
            if let Some(user) = instance
                .periods
                .iter()
                .find(|p| p.id != id && p.referenced_columns().contains(&id))
            {
                return Err(ReportError::ColumnInUse {
                    column: instance.periods[position].name.clone(),
                    used_by: user.name.clone(),
                });
            }
            Ok(instance.periods.remove(position))
        })
    }

    pub fn add_sum_column(
        &mut self,
        id: PeriodId,
        sign: Sign,
        period_to_sum: PeriodId,
    ) -> Result<()> {
        self.edit(|instance| {
            let period = instance
                .period_mut(id)
                .ok_or(ReportError::UnknownPeriod(id))?;
            let PeriodSource::SumColumns { columns, .. } = &mut period.source else {
                return Err(ReportError::NotSumColumns(period.name.clone()));
            };
            columns.push(SumColumn {
                sign,
                period_to_sum,
            });
            Ok(())
        })
    }

    /// Switches between the single fixed range view and the multi-column view.
    ///
    /// Leaving comparison mode replaces all columns by a single `Default` one;
    /// the fixed dates stay unset until supplied. Entering it clears the fixed dates.
    pub fn set_comparison_mode(&mut self, enabled: bool) -> Result<()> {
        self.edit(|instance| {
            if enabled {
                instance.date_from = None;
                instance.date_to = None;
                instance.date_range = None;
                return Ok(());
            }

            debug!(
                "Report instance {} leaves comparison mode, dropping {} columns",
                instance.name,
                instance.periods.len()
            );
            let id = instance.next_period_id();
            instance.periods.clear();
            let mut default = Period::new(id, instance.id, "Default");
            default.period_type = Some(PeriodType::Day);
            instance.periods.push(default);
            Ok(())
        })
    }

    /// Uses a catalog entry as the instance's fixed date range.
    pub fn apply_date_range(&mut self, range: &DateRange) {
        self.date_range = Some(range.id);
        self.date_from = Some(range.date_start);
        self.date_to = Some(range.date_end);
    }

    /// Sets the fixed dates, forgetting the catalog entry they came from
    /// if they no longer match it.
    pub fn set_dates(
        &mut self,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        catalog: &dyn DateRangeCatalog,
    ) {
        self.date_from = date_from;
        self.date_to = date_to;
        if !matches_range(self.date_range, date_from, date_to, catalog) {
            self.date_range = None;
        }
    }

    /// Creates a value for every template parameter that has none yet.
    /// Existing values are never removed. Returns the number of values added.
    pub fn synch_params(&mut self, template_params: &[ParamDefinition]) -> usize {
        let mut added = 0;
        for param in template_params {
            if self.param_values.iter().any(|pv| pv.param.id == param.id) {
                continue;
            }
            self.param_values.push(ParamValue::new(param.clone()));
            added += 1;
        }
        self.param_values.sort_by_key(|pv| pv.param.sequence);
        added
    }
}

impl Period {
    /// Uses a catalog entry as the column's manual dates.
    pub fn apply_date_range(&mut self, range: &DateRange) {
        self.date_range = Some(range.id);
        self.manual_date_from = Some(range.date_start);
        self.manual_date_to = Some(range.date_end);
    }

    pub fn set_manual_dates(
        &mut self,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        catalog: &dyn DateRangeCatalog,
    ) {
        self.manual_date_from = date_from;
        self.manual_date_to = date_to;
        if !matches_range(self.date_range, date_from, date_to, catalog) {
            self.date_range = None;
        }
    }
}

fn matches_range(
    range_id: Option<u64>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    catalog: &dyn DateRangeCatalog,
) -> bool {
    let Some(range) = range_id.and_then(|id| catalog.get(id)) else {
        return false;
    };
    date_from == Some(range.date_start) && date_to == Some(range.date_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::period_dates::InMemoryDateRangeCatalog;
    use crate::schema::PeriodMode;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instance() -> ReportInstance {
        let mut instance = ReportInstance::new(10, "Monthly P&L");
        instance
            .add_period(Period::new(0, 0, "Current").relative(PeriodType::Day, 0, 1))
            .unwrap();
        instance
            .add_period(Period::new(0, 0, "Previous").relative(PeriodType::Day, -1, 1))
            .unwrap();
        instance
    }

    fn q1() -> DateRange {
        DateRange {
            id: 3,
            name: "Q1".to_string(),
            type_id: 1,
            company_id: 0,
            date_start: date(2024, 1, 1),
            date_end: date(2024, 3, 31),
        }
    }

    #[test]
    fn test_add_period_assigns_ids_and_owner() {
        let instance = instance();
        assert_eq!(instance.periods[0].id, 1);
        assert_eq!(instance.periods[1].id, 2);
        assert!(instance.periods.iter().all(|p| p.instance_id == 10));
    }

    #[test]
    fn test_invalid_edit_is_rolled_back() {
        let mut instance = instance();
        let sum = Period::new(0, 0, "Sum").with_source(PeriodSource::SumColumns {
            columns: Vec::new(),
            accdet: false,
        });
        let sum_id = instance.add_period(sum).unwrap();

        let err = instance
            .add_sum_column(sum_id, Sign::Plus, sum_id)
            .unwrap_err();
        assert!(matches!(err, ReportError::SelfSum(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let PeriodSource::SumColumns { columns, .. } = &instance.period(sum_id).unwrap().source
        else {
            panic!("source changed");
        };
        assert!(columns.is_empty());

        instance.add_sum_column(sum_id, Sign::Minus, 1).unwrap();
        assert!(matches!(
            instance.add_sum_column(1, Sign::Plus, 2),
            Err(ReportError::NotSumColumns(_))
        ));
    }

    #[test]
    fn test_update_is_revalidated() {
        let mut instance = instance();
        let cmp = Period::new(0, 0, "Delta").with_source(PeriodSource::CompareColumns {
            from: Some(2),
            to: Some(1),
        });
        let cmp_id = instance.add_period(cmp).unwrap();

        let result = instance.update_period(cmp_id, |p| {
            p.source = PeriodSource::CompareColumns {
                from: Some(cmp_id),
                to: Some(1),
            }
        });
        assert!(matches!(result, Err(ReportError::CompareWithItself(_))));

        let result = instance.update_period(1, |p| p.mode = PeriodMode::NoDateFilter);
        assert!(matches!(result, Err(ReportError::DateFilterRequired(_))));
        assert_eq!(instance.period(1).unwrap().mode, PeriodMode::RelativeToBase);
    }

    #[test]
    fn test_remove_referenced_period_is_refused() {
        let mut instance = instance();
        let cmp = Period::new(0, 0, "Delta").with_source(PeriodSource::CompareColumns {
            from: Some(2),
            to: Some(1),
        });
        let cmp_id = instance.add_period(cmp).unwrap();

        let sum = Period::new(0, 0, "Total").with_source(PeriodSource::SumColumns {
            columns: vec![SumColumn {
                sign: Sign::Plus,
                period_to_sum: 2,
            }],
            accdet: false,
        });
        let sum_id = instance.add_period(sum).unwrap();

        let err = instance.remove_period(1).unwrap_err();
        let ReportError::ColumnInUse { column, used_by } = &err else {
            panic!("unexpected error: {}", err);
        };
        assert_eq!((column.as_str(), used_by.as_str()), ("Current", "Delta"));
        assert_eq!(
            err.to_string(),
            "Column Current cannot be removed, it is used by column Delta"
        );
        assert!(matches!(
            instance.remove_period(2),
            Err(ReportError::ColumnInUse { used_by, .. }) if used_by == "Delta"
        ));
        assert_eq!(instance.periods.len(), 4);

        instance.remove_period(cmp_id).unwrap();
        instance.remove_period(1).unwrap();
        assert!(matches!(
            instance.remove_period(2),
            Err(ReportError::ColumnInUse { used_by, .. }) if used_by == "Total"
        ));
        instance.remove_period(sum_id).unwrap();
        instance.remove_period(2).unwrap();
        assert!(instance.periods.is_empty());
        assert!(matches!(
            instance.remove_period(2),
            Err(ReportError::UnknownPeriod(2))
        ));
    }

    #[test]
    fn test_comparison_mode_toggle() {
        let mut instance = instance();
        assert!(instance.comparison_mode());

        instance.set_comparison_mode(false).unwrap();
        assert_eq!(instance.periods.len(), 1);
        assert_eq!(instance.periods[0].name, "Default");
        assert_eq!(instance.periods[0].id, 3);
        assert_eq!(instance.periods[0].instance_id, 10);
        assert_eq!(instance.periods[0].period_type, Some(PeriodType::Day));
        assert_eq!(instance.date_from, None);
        assert_eq!(instance.date_to, None);

        instance.apply_date_range(&q1());
        assert!(!instance.comparison_mode());

        instance.set_comparison_mode(true).unwrap();
        assert_eq!(instance.date_from, None);
        assert_eq!(instance.date_to, None);
        assert!(instance.comparison_mode());
    }

    #[test]
    fn test_date_range_shortcut_is_forgotten_on_manual_change() {
        let catalog = InMemoryDateRangeCatalog::new(vec![q1()]);
        let mut instance = ReportInstance::new(1, "Quarter");
        instance.apply_date_range(&q1());
        assert_eq!(instance.date_from, Some(date(2024, 1, 1)));

        instance.set_dates(Some(date(2024, 1, 1)), Some(date(2024, 3, 31)), &catalog);
        assert_eq!(instance.date_range, Some(3));

        instance.set_dates(Some(date(2024, 1, 1)), Some(date(2024, 2, 29)), &catalog);
        assert_eq!(instance.date_range, None);

        let mut period = Period::new(1, 1, "Q1");
        period.apply_date_range(&q1());
        assert_eq!(period.manual_date_to, Some(date(2024, 3, 31)));
        period.set_manual_dates(Some(date(2024, 2, 1)), Some(date(2024, 3, 31)), &catalog);
        assert_eq!(period.date_range, None);
    }

    #[test]
    fn test_synch_params_only_adds_missing() {
        let params = vec![
            ParamDefinition {
                id: 1,
                name: "b".to_string(),
                sequence: 2,
                param_type: "num".to_string(),
                reference: None,
            },
            ParamDefinition {
                id: 2,
                name: "a".to_string(),
                sequence: 1,
                param_type: "str".to_string(),
                reference: None,
            },
        ];

        let mut instance = ReportInstance::new(1, "Params");
        let mut existing = ParamValue::new(params[0].clone());
        existing.val_num = Some(4.0);
        instance.param_values.push(existing);

        assert_eq!(instance.synch_params(&params), 1);
        assert_eq!(instance.param_values.len(), 2);
        assert_eq!(instance.param_values[0].name(), "a");
        assert_eq!(instance.param_values[1].val_num, Some(4.0));

        assert_eq!(instance.synch_params(&params[..1]), 0);
        assert_eq!(instance.param_values.len(), 2);
    }
}
