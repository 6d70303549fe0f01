//! # MIS Report Engine
//!
//! Computes management information reports: a report template defines KPI
//! rows, a report instance defines the columns (periods) they are evaluated
//! over, and the engine produces the resulting KPI matrix.
//!
//! ## Core Concepts
//!
//! - **Report Instance**: a base date, an optional fixed date range and a list of columns
//! - **Period**: one column; its dates are fixed, relative to the base date, or absent
//! - **Sources**: a column reads journal items (`actuals`), an alternative journal-item-like
//!   model (`actuals_alt`), sums other columns (`sumcol`) or compares two columns (`cmpcol`)
//! - **Comparison mode**: several columns are shown instead of a single fixed range
//! - **Drill-down**: rebuilds the journal item filter behind one cell
//!
//! ## Example
//!
//! ```rust,ignore
//! use mis_report_engine::*;
//! use chrono::NaiveDate;
//!
//! let mut instance = ReportInstance::new(1, "Monthly P&L");
//! instance.date = NaiveDate::from_ymd_opt(2024, 3, 15);
//! let current = instance.add_period(
//!     Period::new(0, 0, "This week").relative(PeriodType::Week, 0, 1),
//! )?;
//! let previous = instance.add_period(
//!     Period::new(0, 0, "Last week").relative(PeriodType::Week, -1, 1),
//! )?;
//! instance.add_period(
//!     Period::new(0, 0, "Variation").with_source(PeriodSource::CompareColumns {
//!         from: Some(previous),
//!         to: Some(current),
//!     }),
//! )?;
//!
//! let catalog = InMemoryDateRangeCatalog::default();
//! let matrix = compute_report(&template, &catalog, &NoReferences, &instance)?;
//! ```

pub mod columns;
pub mod drilldown;
pub mod engine;
pub mod error;
pub mod expression;
pub mod instance;
pub mod matrix;
pub mod params;
pub mod period_dates;
pub mod schema;
pub mod utils;
pub mod validation;

pub use columns::{ColumnBuilder, PeriodDeclaration, ReportTemplate};
pub use drilldown::{DrilldownAction, DrilldownRequest};
pub use engine::{describe_column, EngineConfig, ReportEngine};
pub use error::{ErrorKind, ReportError, Result};
pub use expression::{
    AccountId, ColumnFilters, Domain, DomainTerm, ExpressionProcessor, FilterHooks,
};
pub use matrix::{
    ColumnHeader, ColumnKind, CompareMethod, DetailRow, DrilldownArg, KpiDefinition, KpiMatrix,
    MatrixAccumulator, MatrixCell, MatrixRow, ReportMatrix,
};
pub use params::{
    display_value, param_values, ref_description, NoReferences, ParamContext, ParamScalar,
    ParamType, ReferenceLookup,
};
pub use period_dates::{
    resolve_period_dates, DateRange, DateRangeCatalog, InMemoryDateRangeCatalog, ResolvedDates,
};
pub use schema::*;
pub use validation::{validate_instance, validate_period, PeriodIndex};

/// Computes `instance` with default engine settings.
pub fn compute_report<T: ReportTemplate>(
    template: &T,
    catalog: &dyn DateRangeCatalog,
    lookup: &dyn ReferenceLookup,
    instance: &ReportInstance,
) -> Result<ReportMatrix> {
    ReportEngine::new(template, catalog, lookup).compute(instance)
}

/// Loads a report instance from JSON and checks its configuration.
pub fn load_instance(json: &str) -> Result<ReportInstance> {
    let instance: ReportInstance = serde_json::from_str(json)?;
    validate_instance(&instance)?;
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_instance_validates() {
        let json = r#"{
            "id": 1,
            "name": "Quarter",
            "periods": [
                {"id": 1, "instance_id": 1, "name": "Q", "mode": "relative",
                 "period_type": "d", "offset": 0, "duration": 90, "source": "actuals"},
                {"id": 2, "instance_id": 1, "name": "Twice", "mode": "none",
                 "source": "sumcol", "columns": [{"period_to_sum": 2}]}
            ]
        }"#;
        let err = load_instance(json).unwrap_err();
        assert!(matches!(err, ReportError::SelfSum(_)));

        let fixed = json.replace(r#""period_to_sum": 2"#, r#""period_to_sum": 1"#);
        let instance = load_instance(&fixed).unwrap();
        assert_eq!(instance.periods.len(), 2);
    }

    #[test]
    fn test_load_instance_rejects_malformed_json() {
        let err = load_instance("{").unwrap_err();
        assert!(matches!(err, ReportError::SerializationError(_)));
        assert_eq!(err.kind(), ErrorKind::Computation);
    }
}
