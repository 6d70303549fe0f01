use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type InstanceId = u64;
pub type PeriodId = u64;
pub type CompanyId = u64;
pub type DateRangeId = u64;
pub type DateRangeTypeId = u64;

pub const DEFAULT_PERIOD_SEQUENCE: i32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetMove {
    #[schemars(description = "Only posted journal entries are aggregated")]
    #[default]
    Posted,

    #[schemars(description = "All journal entries, including drafts, are aggregated")]
    All,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
pub enum PeriodMode {
    #[serde(rename = "fix")]
    #[schemars(description = "Fixed dates entered on the column")]
    #[default]
    Fixed,

    #[serde(rename = "relative")]
    #[schemars(description = "Dates computed relative to the report base date")]
    RelativeToBase,

    #[serde(rename = "none")]
    #[schemars(description = "No date filter (mandatory for derived columns)")]
    NoDateFilter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub enum PeriodType {
    #[serde(rename = "d")]
    Day,

    #[serde(rename = "w")]
    Week,

    #[serde(rename = "date_range")]
    DateRange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
pub enum Sign {
    #[serde(rename = "+")]
    #[default]
    Plus,

    #[serde(rename = "-")]
    Minus,
}

impl Sign {
    pub fn factor(self) -> f64 {
        match self {
            Sign::Plus => 1.0,
            Sign::Minus => -1.0,
        }
    }
}

/// One signed term of a "sum columns" column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SumColumn {
    #[serde(default)]
    pub sign: Sign,

    #[schemars(description = "Identifier of the column to add or subtract")]
    pub period_to_sum: PeriodId,
}

/// Where the values of a column come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PeriodSource {
    #[schemars(description = "Current data, from accounting and other queries")]
    Actuals,

    #[serde(rename = "actuals_alt")]
    #[schemars(
        description = "Current data from an alternative source, e.g. a database view providing look-alike journal items"
    )]
    ActualsAlternate {
        #[schemars(
            description = "A journal-item-like model, i.e. having at least debit, credit, date and account fields"
        )]
        aml_model: String,
    },

    #[serde(rename = "sumcol")]
    #[schemars(description = "Summation (+/-) of other columns")]
    SumColumns {
        #[serde(default)]
        columns: Vec<SumColumn>,

        #[serde(default)]
        #[schemars(description = "Also sum the per-account details")]
        accdet: bool,
    },

    #[serde(rename = "cmpcol")]
    #[schemars(description = "Compare to another column")]
    CompareColumns {
        #[serde(default)]
        from: Option<PeriodId>,

        #[serde(default)]
        to: Option<PeriodId>,
    },
}

impl Default for PeriodSource {
    fn default() -> Self {
        Self::Actuals
    }
}

impl PeriodSource {
    pub fn requires_date_filter(&self) -> bool {
        matches!(
            self,
            PeriodSource::Actuals | PeriodSource::ActualsAlternate { .. }
        )
    }
}

fn default_sequence() -> i32 {
    DEFAULT_PERIOD_SEQUENCE
}

fn default_offset() -> i64 {
    -1
}

fn default_one() -> i64 {
    1
}

/// A column of a report instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Period {
    pub id: PeriodId,

    #[schemars(description = "The report instance owning this column")]
    pub instance_id: InstanceId,

    #[schemars(description = "Column label, unique within the report instance")]
    pub name: String,

    #[serde(default = "default_sequence")]
    pub sequence: i32,

    #[serde(default)]
    pub mode: PeriodMode,

    #[serde(default)]
    #[schemars(description = "Period type, only meaningful for relative columns")]
    pub period_type: Option<PeriodType>,

    #[serde(default)]
    #[schemars(description = "Catalog of named date ranges used by 'date_range' columns")]
    pub date_range_type: Option<DateRangeTypeId>,

    #[serde(default = "default_offset")]
    #[schemars(description = "Offset from current period")]
    pub offset: i64,

    #[serde(default = "default_one")]
    #[schemars(description = "Number of periods")]
    pub duration: i64,

    #[serde(default)]
    pub manual_date_from: Option<NaiveDate>,

    #[serde(default)]
    pub manual_date_to: Option<NaiveDate>,

    #[serde(default)]
    #[schemars(description = "Catalog entry the manual dates were copied from, if any")]
    pub date_range: Option<DateRangeId>,

    #[serde(default = "default_one")]
    #[schemars(description = "Factor used to normalize the period when comparing columns")]
    pub normalize_factor: i64,

    #[serde(default)]
    #[schemars(description = "Sub-KPIs to compute; empty means all")]
    pub subkpis: Vec<String>,

    #[serde(flatten)]
    pub source: PeriodSource,
}

impl Period {
    pub fn new(id: PeriodId, instance_id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            id,
            instance_id,
            name: name.into(),
            sequence: DEFAULT_PERIOD_SEQUENCE,
            mode: PeriodMode::Fixed,
            period_type: None,
            date_range_type: None,
            offset: default_offset(),
            duration: 1,
            manual_date_from: None,
            manual_date_to: None,
            date_range: None,
            normalize_factor: 1,
            subkpis: Vec::new(),
            source: PeriodSource::Actuals,
        }
    }

    #[must_use]
    pub fn relative(mut self, period_type: PeriodType, offset: i64, duration: i64) -> Self {
        self.mode = PeriodMode::RelativeToBase;
        self.period_type = Some(period_type);
        self.offset = offset;
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn fixed(mut self, date_from: Option<NaiveDate>, date_to: Option<NaiveDate>) -> Self {
        self.mode = PeriodMode::Fixed;
        self.manual_date_from = date_from;
        self.manual_date_to = date_to;
        self
    }

    #[must_use]
    pub fn with_date_range_type(mut self, type_id: DateRangeTypeId) -> Self {
        self.date_range_type = Some(type_id);
        self
    }

    /// Sets the source; derived sources drop the date filter.
    #[must_use]
    pub fn with_source(mut self, source: PeriodSource) -> Self {
        self.set_source(source);
        self
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn set_source(&mut self, source: PeriodSource) {
        if !source.requires_date_filter() {
            self.mode = PeriodMode::NoDateFilter;
        }
        self.source = source;
    }

    /// Columns this column sums or compares.
    pub fn referenced_columns(&self) -> Vec<PeriodId> {
        match &self.source {
            PeriodSource::SumColumns { columns, .. } => {
                columns.iter().map(|c| c.period_to_sum).collect()
            }
            PeriodSource::CompareColumns { from, to } => from.iter().chain(to).copied().collect(),
            PeriodSource::Actuals | PeriodSource::ActualsAlternate { .. } => Vec::new(),
        }
    }

    pub fn is_date_range_type(&self) -> bool {
        self.period_type == Some(PeriodType::DateRange)
    }
}

/// A reference-type parameter is resolved by searching `model` for a record
/// whose `search_field` equals the stored key, and reading `value_field`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReferenceTarget {
    pub model: String,
    #[serde(default)]
    pub model_description: Option<String>,
    pub search_field: String,
    #[serde(default)]
    pub search_field_description: Option<String>,
    pub value_field: String,
}

impl ReferenceTarget {
    pub fn model_label(&self) -> &str {
        self.model_description.as_deref().unwrap_or(&self.model)
    }

    pub fn search_field_label(&self) -> &str {
        self.search_field_description
            .as_deref()
            .unwrap_or(&self.search_field)
    }
}

/// A parameter declared by the report template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ParamDefinition {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[schemars(description = "Parameter type tag: 'str', 'num' or 'ref'")]
    pub param_type: String,
    #[serde(default)]
    pub reference: Option<ReferenceTarget>,
}

/// The value given to one template parameter for one report instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ParamValue {
    pub param: ParamDefinition,
    #[serde(default)]
    pub val_str: Option<String>,
    #[serde(default)]
    pub val_num: Option<f64>,
    #[serde(default)]
    pub val_ref: Option<String>,
}

impl ParamValue {
    pub fn new(param: ParamDefinition) -> Self {
        Self {
            param,
            val_str: None,
            val_num: None,
            val_ref: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.param.name
    }
}

/// One computation request: a report template applied to a set of columns.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportInstance {
    pub id: InstanceId,

    pub name: String,

    #[serde(default)]
    pub company_id: CompanyId,

    #[serde(default)]
    #[schemars(description = "Report base date (leave empty to use current date)")]
    pub date: Option<NaiveDate>,

    #[serde(default)]
    #[schemars(description = "Fixed start date; when set the instance is not in comparison mode")]
    pub date_from: Option<NaiveDate>,

    #[serde(default)]
    pub date_to: Option<NaiveDate>,

    #[serde(default)]
    pub date_range: Option<DateRangeId>,

    #[serde(default)]
    pub target_move: TargetMove,

    #[serde(default)]
    pub periods: Vec<Period>,

    #[serde(default)]
    pub param_values: Vec<ParamValue>,

    #[serde(default)]
    #[schemars(description = "strftime-style date format, e.g. '%d/%m/%Y'")]
    pub date_format: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "Column description when 'from' and 'to' dates are the same, using <<from>> and <<to>> placeholders"
    )]
    pub description_format_single: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "Column description when 'from' and 'to' dates differ, using <<from>> and <<to>> placeholders"
    )]
    pub description_format_range: Option<String>,
}

impl ReportInstance {
    pub fn new(id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            company_id: 0,
            date: None,
            date_from: None,
            date_to: None,
            date_range: None,
            target_move: TargetMove::Posted,
            periods: Vec::new(),
            param_values: Vec::new(),
            date_format: None,
            description_format_single: None,
            description_format_range: None,
        }
    }

    /// The date all relative columns are computed from.
    pub fn pivot_date(&self, today: NaiveDate) -> NaiveDate {
        self.date.unwrap_or(today)
    }

    /// True when the instance shows its configured columns rather than a
    /// single fixed date range.
    pub fn comparison_mode(&self) -> bool {
        !self.periods.is_empty() && self.date_from.is_none()
    }

    pub fn period(&self, id: PeriodId) -> Option<&Period> {
        self.periods.iter().find(|p| p.id == id)
    }

    pub fn period_mut(&mut self, id: PeriodId) -> Option<&mut Period> {
        self.periods.iter_mut().find(|p| p.id == id)
    }

    /// Columns in display order: by sequence, then by id.
    pub fn ordered_periods(&self) -> Vec<&Period> {
        let mut periods: Vec<&Period> = self.periods.iter().collect();
        periods.sort_by_key(|p| (p.sequence, p.id));
        periods
    }

    pub fn next_period_id(&self) -> PeriodId {
        self.periods.iter().map(|p| p.id).max().unwrap_or(0) + 1
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportInstance)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
