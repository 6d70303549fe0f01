//! Column builder: feeds one column into the matrix accumulator according to
//! its source.

use crate::error::{ReportError, Result};
use crate::expression::{ColumnFilters, ExpressionProcessor, FilterHooks};
use crate::matrix::{KpiDefinition, MatrixAccumulator};
use crate::params::ParamContext;
use crate::period_dates::ResolvedDates;
use crate::schema::{
    CompanyId, ParamDefinition, Period, PeriodId, PeriodSource, SumColumn, TargetMove,
};
use chrono::NaiveDate;
use log::debug;

/// What the report template needs to compute one actuals column.
pub struct PeriodDeclaration<'a> {
    pub period_id: PeriodId,
    pub label: String,
    pub description: Option<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Posted/all restriction; `None` for alternative sources.
    pub target_move: Option<TargetMove>,
    /// Sub-KPIs to compute; empty means all.
    pub subkpis: &'a [String],
    pub normalize_factor: i64,
    pub filters: ColumnFilters<'a>,
    /// Journal-item-like model to read instead of the default one.
    pub aml_model: Option<&'a str>,
    pub params: &'a ParamContext,
}

/// The report template: KPI rows, parameters and the routine evaluating all
/// KPIs over one date range.
pub trait ReportTemplate {
    type Processor: ExpressionProcessor;
    type Matrix: MatrixAccumulator;

    fn kpis(&self) -> Vec<KpiDefinition>;

    fn params(&self) -> Vec<ParamDefinition>;

    /// A fresh processor with nothing parsed yet.
    fn new_processor(&self, company_id: CompanyId) -> Self::Processor;

    /// A processor that has parsed every KPI expression of the template.
    fn prepare_processor(&self, company_id: CompanyId) -> Result<Self::Processor>;

    fn prepare_matrix(&self) -> Self::Matrix;

    /// Declares the column in `matrix` and sets the value of every KPI for it.
    fn declare_and_compute_period(
        &self,
        matrix: &mut Self::Matrix,
        processor: &mut Self::Processor,
        declaration: PeriodDeclaration<'_>,
    ) -> Result<()>;
}

pub struct ColumnBuilder<'a, T: ReportTemplate> {
    template: &'a T,
    processor: &'a mut T::Processor,
    hooks: &'a FilterHooks,
    params: &'a ParamContext,
    target_move: TargetMove,
}

impl<'a, T: ReportTemplate> ColumnBuilder<'a, T> {
    pub fn new(
        template: &'a T,
        processor: &'a mut T::Processor,
        hooks: &'a FilterHooks,
        params: &'a ParamContext,
        target_move: TargetMove,
    ) -> Self {
        Self {
            template,
            processor,
            hooks,
            params,
            target_move,
        }
    }

    pub fn add_column(
        &mut self,
        matrix: &mut T::Matrix,
        period: &Period,
        dates: &ResolvedDates,
        label: String,
        description: Option<String>,
    ) -> Result<()> {
        debug!("Adding column {} ({:?})", period.name, period.source);
        match &period.source {
            PeriodSource::Actuals => {
                let target_move = Some(self.target_move);
                self.add_actuals(matrix, period, dates, label, description, target_move, None)
            }
            PeriodSource::ActualsAlternate { aml_model } => self.add_actuals(
                matrix,
                period,
                dates,
                label,
                description,
                None,
                Some(aml_model.as_str()),
            ),
            PeriodSource::SumColumns { columns, accdet } => {
                add_sum(matrix, period, columns, *accdet, label, description);
                Ok(())
            }
            PeriodSource::CompareColumns { from, to } => {
                let (Some(from), Some(to)) = (from, to) else {
                    return Err(ReportError::CompareColumnsMissing(period.name.clone()));
                };
                matrix.declare_comparison(period.id, *to, *from, label, description);
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_actuals(
        &mut self,
        matrix: &mut T::Matrix,
        period: &Period,
        dates: &ResolvedDates,
        label: String,
        description: Option<String>,
        target_move: Option<TargetMove>,
        aml_model: Option<&str>,
    ) -> Result<()> {
        let Some((date_from, date_to)) = dates.range() else {
            return Err(ReportError::MissingDateRange(period.name.clone()));
        };

        let declaration = PeriodDeclaration {
            period_id: period.id,
            label,
            description,
            date_from,
            date_to,
            target_move,
            subkpis: &period.subkpis,
            normalize_factor: period.normalize_factor,
            filters: ColumnFilters::new(period, self.hooks),
            aml_model,
            params: self.params,
        };
        self.template
            .declare_and_compute_period(matrix, &mut *self.processor, declaration)
    }
}

fn add_sum<M: MatrixAccumulator>(
    matrix: &mut M,
    period: &Period,
    columns: &[SumColumn],
    accdet: bool,
    label: String,
    description: Option<String>,
) {
    let columns = columns
        .iter()
        .map(|c| (c.sign, c.period_to_sum))
        .collect();
    matrix.declare_sum(period.id, columns, label, description, accdet);
}
