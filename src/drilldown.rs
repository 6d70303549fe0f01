use crate::columns::ReportTemplate;
use crate::engine::ReportEngine;
use crate::error::{ReportError, Result};
use crate::expression::{AccountId, Domain, ExpressionProcessor};
use crate::matrix::DrilldownArg;
use crate::schema::{PeriodId, PeriodSource, ReportInstance};
use log::debug;
use serde::{Deserialize, Serialize};

/// A drill-down request, usually taken from a matrix cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrilldownRequest {
    #[serde(default)]
    pub period_id: Option<PeriodId>,
    #[serde(default)]
    pub expr: Option<String>,
    #[serde(default)]
    pub account_id: Option<AccountId>,
}

impl From<DrilldownArg> for DrilldownRequest {
    fn from(arg: DrilldownArg) -> Self {
        Self {
            period_id: Some(arg.period_id),
            expr: Some(arg.expr),
            account_id: arg.account_id,
        }
    }
}

/// What to open to show the journal items behind a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrilldownAction {
    pub name: String,
    pub domain: Domain,
    pub res_model: String,
}

impl<'a, T: ReportTemplate> ReportEngine<'a, T> {
    /// Rebuilds the journal item filter behind one cell.
    ///
    /// Returns `Ok(None)` when the request lacks a column or an expression, or
    /// when the expression uses no account variable.
    pub fn drilldown(
        &self,
        instance: &ReportInstance,
        request: &DrilldownRequest,
    ) -> Result<Option<DrilldownAction>> {
        let (Some(period_id), Some(expr)) = (request.period_id, request.expr.as_deref()) else {
            return Ok(None);
        };
        if !<T::Processor as ExpressionProcessor>::has_account_var(expr) {
            debug!("No drill-down for {}: no account variable", expr);
            return Ok(None);
        }

        let period = instance
            .period(period_id)
            .ok_or(ReportError::UnknownPeriod(period_id))?;
        let dates = self.period_dates(instance, period);

        let mut processor = self.template.new_processor(instance.company_id);
        processor.parse_expr(expr)?;
        processor.done_parsing()?;

        let target_move = match period.source {
            PeriodSource::Actuals => Some(instance.target_move),
            _ => None,
        };
        let mut domain = processor.aml_domain_for_expr(
            expr,
            dates.date_from,
            dates.date_to,
            target_move,
            request.account_id,
        )?;
        domain.extend(self.hooks.move_line_filter(period));

        let res_model = match &period.source {
            PeriodSource::ActualsAlternate { aml_model } => aml_model.clone(),
            _ => self.config.move_line_model.clone(),
        };
        debug!(
            "Drill-down on {} for column {}: {} terms on {}",
            expr,
            period.name,
            domain.len(),
            res_model
        );

        Ok(Some(DrilldownAction {
            name: format!("{} - {}", expr, period.name),
            domain,
            res_model,
        }))
    }
}
