//! Structural checks over a report instance's configuration.
//!
//! These run on every edit (see [`crate::instance`]); computation assumes they
//! already passed.

use crate::error::{ReportError, Result};
use crate::schema::{Period, PeriodId, PeriodMode, PeriodSource, ReportInstance};
use std::collections::{HashMap, HashSet};

/// Columns of one report instance, indexed by id.
pub struct PeriodIndex<'a> {
    instance: &'a ReportInstance,
    periods: HashMap<PeriodId, &'a Period>,
}

impl<'a> PeriodIndex<'a> {
    pub fn new(instance: &'a ReportInstance) -> Self {
        let periods = instance.periods.iter().map(|p| (p.id, p)).collect();
        Self { instance, periods }
    }

    pub fn get(&self, id: PeriodId) -> Option<&'a Period> {
        self.periods.get(&id).copied()
    }

    /// True when `id` names a column owned by the indexed instance.
    pub fn belongs(&self, id: PeriodId) -> bool {
        self.get(id)
            .map(|p| p.instance_id == self.instance.id)
            .unwrap_or(false)
    }
}

pub fn validate_instance(instance: &ReportInstance) -> Result<()> {
    let index = PeriodIndex::new(instance);

    let mut names = HashSet::new();
    for period in &instance.periods {
        if !names.insert(period.name.as_str()) {
            return Err(ReportError::DuplicatePeriodName(period.name.clone()));
        }
        validate_period(period, &index)?;
    }
    check_sum_cycles(instance, &index)?;

    let mut params = HashSet::new();
    for value in &instance.param_values {
        if !params.insert(value.param.id) {
            return Err(ReportError::DuplicateParamValue(value.name().to_string()));
        }
    }

    Ok(())
}

pub fn validate_period(period: &Period, index: &PeriodIndex<'_>) -> Result<()> {
    check_numeric_bounds(period)?;
    check_mode_source(period)?;
    check_sum_columns(period, index)?;
    check_compare_columns(period, index)
}

fn check_numeric_bounds(period: &Period) -> Result<()> {
    if period.duration <= 0 {
        return Err(ReportError::InvalidDuration {
            column: period.name.clone(),
            duration: period.duration,
        });
    }
    if period.normalize_factor <= 0 {
        return Err(ReportError::InvalidNormalizeFactor {
            column: period.name.clone(),
            factor: period.normalize_factor,
        });
    }
    Ok(())
}

fn check_mode_source(period: &Period) -> Result<()> {
    let has_date_filter = period.mode != PeriodMode::NoDateFilter;
    if period.source.requires_date_filter() && !has_date_filter {
        return Err(ReportError::DateFilterRequired(period.name.clone()));
    }
    if !period.source.requires_date_filter() && has_date_filter {
        return Err(ReportError::DateFilterForbidden(period.name.clone()));
    }
    Ok(())
}

fn check_sum_columns(period: &Period, index: &PeriodIndex<'_>) -> Result<()> {
    let PeriodSource::SumColumns { columns, .. } = &period.source else {
        return Ok(());
    };

    for column in columns {
        if column.period_to_sum == period.id {
            return Err(ReportError::SelfSum(period.name.clone()));
        }
        if !index.belongs(column.period_to_sum) {
            return Err(ReportError::UnknownSumColumn {
                column: period.name.clone(),
                target: column.period_to_sum,
            });
        }
    }
    Ok(())
}

/// Sums may build on other sums, but never on themselves through a chain.
fn check_sum_cycles(instance: &ReportInstance, index: &PeriodIndex<'_>) -> Result<()> {
    let mut done = HashSet::new();
    for period in &instance.periods {
        let mut active = HashSet::new();
        visit_sum(period, index, &mut active, &mut done)?;
    }
    Ok(())
}

fn visit_sum<'a>(
    period: &'a Period,
    index: &PeriodIndex<'a>,
    active: &mut HashSet<PeriodId>,
    done: &mut HashSet<PeriodId>,
) -> Result<()> {
    let PeriodSource::SumColumns { columns, .. } = &period.source else {
        return Ok(());
    };
    if done.contains(&period.id) {
        return Ok(());
    }
    if !active.insert(period.id) {
        return Err(ReportError::CircularSum(period.name.clone()));
    }
    for column in columns {
        if let Some(source) = index.get(column.period_to_sum) {
            visit_sum(source, index, active, done)?;
        }
    }
    active.remove(&period.id);
    done.insert(period.id);
    Ok(())
}

fn check_compare_columns(period: &Period, index: &PeriodIndex<'_>) -> Result<()> {
    let PeriodSource::CompareColumns { from, to } = &period.source else {
        return Ok(());
    };

    let (Some(from), Some(to)) = (from, to) else {
        return Err(ReportError::CompareColumnsMissing(period.name.clone()));
    };
    if *from == period.id || *to == period.id {
        return Err(ReportError::CompareWithItself(period.name.clone()));
    }
    if !index.belongs(*from) || !index.belongs(*to) || period.instance_id != index.instance.id {
        return Err(ReportError::CompareAcrossInstances(period.name.clone()));
    }
    Ok(())
}
