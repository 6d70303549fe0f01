use crate::error::Result;
use crate::schema::{Period, TargetMove};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type AccountId = u64;

/// One `(field, operator, value)` condition of a record filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTerm {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

impl DomainTerm {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for DomainTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.field, self.operator, self.value)
    }
}

/// A record filter: all terms must hold.
pub type Domain = Vec<DomainTerm>;

/// Parses KPI expressions and turns them into journal item filters.
///
/// One processor serves a single computation or drill-down and is never shared.
pub trait ExpressionProcessor {
    /// True if `expr` refers to at least one account variable, i.e. it is
    /// backed by journal items and can be drilled into.
    fn has_account_var(expr: &str) -> bool
    where
        Self: Sized;

    fn parse_expr(&mut self, expr: &str) -> Result<()>;

    /// Ends the parsing phase; filters are only available afterwards.
    fn done_parsing(&mut self) -> Result<()>;

    /// Journal item filter selecting the rows that make up `expr` over the
    /// given dates. `target_move` is `None` when no posted/all restriction applies.
    fn aml_domain_for_expr(
        &self,
        expr: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        target_move: Option<TargetMove>,
        account_id: Option<AccountId>,
    ) -> Result<Domain>;
}

pub type MoveLineFilterHook = Box<dyn Fn(&Period) -> Domain + Send + Sync>;
pub type QueryFilterHook = Box<dyn Fn(&Period, &str) -> Domain + Send + Sync>;

/// Extension points narrowing the data a column reads, e.g. to an analytic
/// account or an operating unit. Both default to no extra restriction.
pub struct FilterHooks {
    move_line: MoveLineFilterHook,
    query: QueryFilterHook,
}

impl Default for FilterHooks {
    fn default() -> Self {
        Self {
            move_line: Box::new(|_| Domain::new()),
            query: Box::new(|_, _| Domain::new()),
        }
    }
}

impl fmt::Debug for FilterHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterHooks").finish_non_exhaustive()
    }
}

impl FilterHooks {
    #[must_use]
    pub fn with_move_line_filter(
        mut self,
        hook: impl Fn(&Period) -> Domain + Send + Sync + 'static,
    ) -> Self {
        self.move_line = Box::new(hook);
        self
    }

    #[must_use]
    pub fn with_query_filter(
        mut self,
        hook: impl Fn(&Period, &str) -> Domain + Send + Sync + 'static,
    ) -> Self {
        self.query = Box::new(hook);
        self
    }

    /// Filter ANDed to every accounting expression filter of `period`.
    pub fn move_line_filter(&self, period: &Period) -> Domain {
        (self.move_line)(period)
    }

    /// Filter ANDed to a query of `period` reading `model`.
    pub fn query_filter(&self, period: &Period, model: &str) -> Domain {
        (self.query)(period, model)
    }
}

/// The hooks bound to one column, as handed to the report template.
#[derive(Clone, Copy)]
pub struct ColumnFilters<'a> {
    period: &'a Period,
    hooks: &'a FilterHooks,
}

impl<'a> ColumnFilters<'a> {
    pub fn new(period: &'a Period, hooks: &'a FilterHooks) -> Self {
        Self { period, hooks }
    }

    pub fn move_lines(&self) -> Domain {
        self.hooks.move_line_filter(self.period)
    }

    pub fn query(&self, model: &str) -> Domain {
        self.hooks.query_filter(self.period, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_hooks_do_not_restrict() {
        let hooks = FilterHooks::default();
        let period = Period::new(1, 1, "Current");
        assert!(hooks.move_line_filter(&period).is_empty());
        assert!(hooks.query_filter(&period, "sale.order").is_empty());
    }

    #[test]
    fn test_custom_hooks() {
        let hooks = FilterHooks::default()
            .with_move_line_filter(|period| {
                vec![DomainTerm::new("analytic_account_id", "=", period.id)]
            })
            .with_query_filter(|_, model| {
                if model == "sale.order" {
                    vec![DomainTerm::new("team_id", "in", json!([1, 2]))]
                } else {
                    Domain::new()
                }
            });

        let period = Period::new(4, 1, "Current");
        let filters = ColumnFilters::new(&period, &hooks);
        assert_eq!(
            filters.move_lines(),
            vec![DomainTerm::new("analytic_account_id", "=", 4u64)]
        );
        assert_eq!(filters.query("sale.order").len(), 1);
        assert!(filters.query("purchase.order").is_empty());
    }

    #[test]
    fn test_term_display() {
        let term = DomainTerm::new("date", ">=", "2024-01-01");
        assert_eq!(term.to_string(), "(date, >=, \"2024-01-01\")");
    }
}
