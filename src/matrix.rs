//! The matrix accumulator: per-column declarations plus the two finishing
//! passes deriving comparison and sum columns.
//!
//! Declarations must all happen before [`MatrixAccumulator::compute_comparisons`],
//! which must run before [`MatrixAccumulator::compute_sums`]. The accumulator
//! does not enforce this order; the report engine does.

use crate::error::{ReportError, Result};
use crate::expression::AccountId;
use crate::schema::{PeriodId, Sign};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Period,
    Sum,
    Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub period_id: PeriodId,
    pub label: String,
    pub description: Option<String>,
    pub kind: ColumnKind,
    /// Sub-KPI labels; empty when the column has a single value per KPI.
    pub subkpis: Vec<String>,
    pub normalize_factor: i64,
}

/// Everything needed to drill into a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrilldownArg {
    pub period_id: PeriodId,
    pub expr: String,
    #[serde(default)]
    pub account_id: Option<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatrixCell {
    pub value: Option<f64>,
    pub drilldown: Option<DrilldownArg>,
}

impl MatrixCell {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            drilldown: None,
        }
    }

    pub fn with_drilldown(mut self, arg: DrilldownArg) -> Self {
        self.drilldown = Some(arg);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMethod {
    #[default]
    Diff,
    Pct,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub compare_method: CompareMethod,
}

impl KpiDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            compare_method: CompareMethod::Diff,
        }
    }

    #[must_use]
    pub fn compared_by(mut self, method: CompareMethod) -> Self {
        self.compare_method = method;
        self
    }
}

pub trait MatrixAccumulator {
    /// Declares a column whose values are set by the report template.
    fn declare_period(&mut self, header: ColumnHeader);

    fn set_values(&mut self, kpi: &str, period_id: PeriodId, cells: Vec<MatrixCell>) -> Result<()>;

    fn set_detail_values(
        &mut self,
        kpi: &str,
        account_id: AccountId,
        period_id: PeriodId,
        cells: Vec<MatrixCell>,
    ) -> Result<()>;

    fn declare_sum(
        &mut self,
        period_id: PeriodId,
        columns: Vec<(Sign, PeriodId)>,
        label: String,
        description: Option<String>,
        sum_accdet: bool,
    );

    fn declare_comparison(
        &mut self,
        period_id: PeriodId,
        to_period_id: PeriodId,
        from_period_id: PeriodId,
        label: String,
        description: Option<String>,
    );

    fn compute_comparisons(&mut self) -> Result<()>;

    fn compute_sums(&mut self) -> Result<()>;

    fn as_dict(&self) -> ReportMatrix;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub account_id: AccountId,
    pub cells: BTreeMap<PeriodId, Vec<MatrixCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub kpi: String,
    pub description: String,
    pub cells: BTreeMap<PeriodId, Vec<MatrixCell>>,
    pub details: Vec<DetailRow>,
}

/// The computed report: one row per KPI, one column per declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMatrix {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<MatrixRow>,
}

impl ReportMatrix {
    pub fn row(&self, kpi: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.kpi == kpi)
    }

    pub fn cells(&self, kpi: &str, period_id: PeriodId) -> Option<&[MatrixCell]> {
        self.row(kpi)
            .and_then(|r| r.cells.get(&period_id))
            .map(Vec::as_slice)
    }

    /// Value of the first sub-column of a cell.
    pub fn value(&self, kpi: &str, period_id: PeriodId) -> Option<f64> {
        self.cells(kpi, period_id)
            .and_then(|cells| cells.first())
            .and_then(|cell| cell.value)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

type CellMap = HashMap<PeriodId, Vec<MatrixCell>>;

#[derive(Debug, Default)]
struct KpiRow {
    cells: CellMap,
    details: BTreeMap<AccountId, CellMap>,
}

#[derive(Debug)]
struct SumDeclaration {
    period_id: PeriodId,
    columns: Vec<(Sign, PeriodId)>,
    sum_accdet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Visit {
    New,
    Active,
    Done,
}

#[derive(Debug)]
struct ComparisonDeclaration {
    period_id: PeriodId,
    to_period_id: PeriodId,
    from_period_id: PeriodId,
}

/// In-memory accumulator keyed by KPI name and column id.
#[derive(Debug)]
pub struct KpiMatrix {
    kpis: Vec<KpiDefinition>,
    columns: Vec<ColumnHeader>,
    rows: HashMap<String, KpiRow>,
    sums: Vec<SumDeclaration>,
    comparisons: Vec<ComparisonDeclaration>,
}

impl KpiMatrix {
    pub fn new(kpis: Vec<KpiDefinition>) -> Self {
        let rows = kpis
            .iter()
            .map(|k| (k.name.clone(), KpiRow::default()))
            .collect();
        Self {
            kpis,
            columns: Vec::new(),
            rows,
            sums: Vec::new(),
            comparisons: Vec::new(),
        }
    }

    fn header(&self, period_id: PeriodId) -> Result<&ColumnHeader> {
        self.columns
            .iter()
            .find(|c| c.period_id == period_id)
            .ok_or(ReportError::UnknownColumn(period_id))
    }

    /// Sum indices ordered so that every sum comes after the sums it reads.
    fn sum_order(&self) -> Result<Vec<usize>> {
        let positions: HashMap<PeriodId, usize> = self
            .sums
            .iter()
            .enumerate()
            .map(|(i, sum)| (sum.period_id, i))
            .collect();
        let mut state = vec![Visit::New; self.sums.len()];
        let mut order = Vec::with_capacity(self.sums.len());
        for index in 0..self.sums.len() {
            self.visit_sum(index, &positions, &mut state, &mut order)?;
        }
        Ok(order)
    }

    fn visit_sum(
        &self,
        index: usize,
        positions: &HashMap<PeriodId, usize>,
        state: &mut [Visit],
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match state[index] {
            Visit::Done => return Ok(()),
            Visit::Active => {
                let id = self.sums[index].period_id;
                let label = self
                    .header(id)
                    .map(|h| h.label.clone())
                    .unwrap_or_else(|_| format!("#{}", id));
                return Err(ReportError::CircularSum(label));
            }
            Visit::New => {}
        }
        state[index] = Visit::Active;
        for (_, source) in &self.sums[index].columns {
            if let Some(&next) = positions.get(source) {
                self.visit_sum(next, positions, state, order)?;
            }
        }
        state[index] = Visit::Done;
        order.push(index);
        Ok(())
    }

    fn row_mut(&mut self, kpi: &str) -> Result<&mut KpiRow> {
        self.rows
            .get_mut(kpi)
            .ok_or_else(|| ReportError::Template(format!("Unknown KPI {}", kpi)))
    }

    fn subkpis_of(&self, period_id: PeriodId) -> Vec<String> {
        self.header(period_id)
            .map(|h| h.subkpis.clone())
            .unwrap_or_default()
    }

    fn push_derived_column(
        &mut self,
        period_id: PeriodId,
        kind: ColumnKind,
        subkpis: Vec<String>,
        label: String,
        description: Option<String>,
    ) {
        self.columns.push(ColumnHeader {
            period_id,
            label,
            description,
            kind,
            subkpis,
            normalize_factor: 1,
        });
    }
}

fn sum_cells(sources: &[(f64, Option<&Vec<MatrixCell>>)]) -> Option<Vec<MatrixCell>> {
    let width = sources
        .iter()
        .filter_map(|(_, cells)| cells.map(|c| c.len()))
        .max()?;

    let cells = (0..width)
        .map(|i| {
            let values: Vec<f64> = sources
                .iter()
                .filter_map(|(factor, cells)| {
                    cells
                        .and_then(|c| c.get(i))
                        .and_then(|cell| cell.value)
                        .map(|v| factor * v)
                })
                .collect();
            MatrixCell {
                value: (!values.is_empty()).then(|| values.iter().sum()),
                drilldown: None,
            }
        })
        .collect();
    Some(cells)
}

fn compare_values(method: CompareMethod, to: Option<f64>, from: Option<f64>) -> Option<f64> {
    match method {
        CompareMethod::None => None,
        CompareMethod::Diff => match (to, from) {
            (None, None) => None,
            (to, from) => Some(to.unwrap_or(0.0) - from.unwrap_or(0.0)),
        },
        CompareMethod::Pct => match from {
            Some(from) if from != 0.0 => Some((to.unwrap_or(0.0) - from) / from.abs()),
            _ => None,
        },
    }
}

impl MatrixAccumulator for KpiMatrix {
    fn declare_period(&mut self, header: ColumnHeader) {
        self.columns.push(header);
    }

    fn set_values(&mut self, kpi: &str, period_id: PeriodId, cells: Vec<MatrixCell>) -> Result<()> {
        self.header(period_id)?;
        self.row_mut(kpi)?.cells.insert(period_id, cells);
        Ok(())
    }

    fn set_detail_values(
        &mut self,
        kpi: &str,
        account_id: AccountId,
        period_id: PeriodId,
        cells: Vec<MatrixCell>,
    ) -> Result<()> {
        self.header(period_id)?;
        self.row_mut(kpi)?
            .details
            .entry(account_id)
            .or_default()
            .insert(period_id, cells);
        Ok(())
    }

    fn declare_sum(
        &mut self,
        period_id: PeriodId,
        columns: Vec<(Sign, PeriodId)>,
        label: String,
        description: Option<String>,
        sum_accdet: bool,
    ) {
        let subkpis = columns
            .first()
            .map(|(_, id)| self.subkpis_of(*id))
            .unwrap_or_default();
        self.push_derived_column(period_id, ColumnKind::Sum, subkpis, label, description);
        self.sums.push(SumDeclaration {
            period_id,
            columns,
            sum_accdet,
        });
    }

    fn declare_comparison(
        &mut self,
        period_id: PeriodId,
        to_period_id: PeriodId,
        from_period_id: PeriodId,
        label: String,
        description: Option<String>,
    ) {
        let subkpis = self.subkpis_of(to_period_id);
        self.push_derived_column(period_id, ColumnKind::Comparison, subkpis, label, description);
        self.comparisons.push(ComparisonDeclaration {
            period_id,
            to_period_id,
            from_period_id,
        });
    }

    fn compute_comparisons(&mut self) -> Result<()> {
        for comparison in &self.comparisons {
            let to_factor = self.header(comparison.to_period_id)?.normalize_factor as f64;
            let from_factor = self.header(comparison.from_period_id)?.normalize_factor as f64;
            debug!(
                "Comparing column {} to column {} into column {}",
                comparison.to_period_id, comparison.from_period_id, comparison.period_id
            );

            for kpi in &self.kpis {
                let Some(row) = self.rows.get_mut(&kpi.name) else {
                    continue;
                };
                let to_cells = row.cells.get(&comparison.to_period_id);
                let from_cells = row.cells.get(&comparison.from_period_id);
                let width = to_cells
                    .map(Vec::len)
                    .max(from_cells.map(Vec::len))
                    .unwrap_or(0);
                if width == 0 {
                    continue;
                }

                let cells = (0..width)
                    .map(|i| {
                        let to = to_cells
                            .and_then(|c| c.get(i))
                            .and_then(|c| c.value)
                            .map(|v| v / to_factor);
                        let from = from_cells
                            .and_then(|c| c.get(i))
                            .and_then(|c| c.value)
                            .map(|v| v / from_factor);
                        MatrixCell {
                            value: compare_values(kpi.compare_method, to, from),
                            drilldown: None,
                        }
                    })
                    .collect();
                row.cells.insert(comparison.period_id, cells);
            }
        }
        Ok(())
    }

    fn compute_sums(&mut self) -> Result<()> {
        for index in self.sum_order()? {
            let sum = &self.sums[index];
            let mut factors = Vec::with_capacity(sum.columns.len());
            for (sign, source) in &sum.columns {
                self.header(*source)?;
                factors.push((sign.factor(), *source));
            }
            debug!(
                "Summing columns {:?} into column {}",
                factors, sum.period_id
            );

            for row in self.rows.values_mut() {
                let sources: Vec<(f64, Option<&Vec<MatrixCell>>)> = factors
                    .iter()
                    .map(|(factor, source)| (*factor, row.cells.get(source)))
                    .collect();
                if let Some(cells) = sum_cells(&sources) {
                    row.cells.insert(sum.period_id, cells);
                }

                if !sum.sum_accdet {
                    continue;
                }
                let accounts: BTreeSet<AccountId> = row
                    .details
                    .iter()
                    .filter(|(_, cells)| factors.iter().any(|(_, s)| cells.contains_key(s)))
                    .map(|(account, _)| *account)
                    .collect();
                for account in accounts {
                    let Some(detail) = row.details.get_mut(&account) else {
                        continue;
                    };
                    let sources: Vec<(f64, Option<&Vec<MatrixCell>>)> = factors
                        .iter()
                        .map(|(factor, source)| (*factor, detail.get(source)))
                        .collect();
                    if let Some(cells) = sum_cells(&sources) {
                        detail.insert(sum.period_id, cells);
                    }
                }
            }
        }
        Ok(())
    }

    fn as_dict(&self) -> ReportMatrix {
        let rows = self
            .kpis
            .iter()
            .map(|kpi| {
                let row = self.rows.get(&kpi.name);
                let cells = row
                    .map(|r| r.cells.iter().map(|(k, v)| (*k, v.clone())).collect())
                    .unwrap_or_default();
                let details = row
                    .map(|r| {
                        r.details
                            .iter()
                            .map(|(account_id, cells)| DetailRow {
                                account_id: *account_id,
                                cells: cells.iter().map(|(k, v)| (*k, v.clone())).collect(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                MatrixRow {
                    kpi: kpi.name.clone(),
                    description: kpi.description.clone(),
                    cells,
                    details,
                }
            })
            .collect();

        ReportMatrix {
            columns: self.columns.clone(),
            rows,
        }
    }
}
