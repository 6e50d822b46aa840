//! Query parameter model
//!
//! Typed representation of the parameters the platform REST API understands
//! on its list endpoints: structured filters (`q`), per-embed filters
//! (`q.<embed>`), nested resource inclusion (`embed`), sparse field selection
//! (`fields`), ordering (`sort_by`), page size (`limit`) and two escape
//! hatches (raw `field=value` pairs and a literal query string).
//!
//! All values are immutable once built and are turned into a query string by
//! [`QueryEncoder`](super::query_encoder::QueryEncoder).
//!
//! ## Usage
//!
//! ```
//! use bracelet_core::domain::query::{Filter, FilterTerm, QueryParams, SortTerm};
//!
//! let params = QueryParams::new()
//!     .with_q(Filter::new(FilterTerm::eq("patient_id", 12)).and(FilterTerm::gt("bpm", 90)))
//!     .with_sort(vec![SortTerm::desc("ts")])
//!     .with_limit(20);
//! assert!(params.has_limit());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Filter primitives
// ============================================================================

/// Comparison applied by a single filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparativeOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Nin,
    /// Begins with
    Beg,
    /// Contains
    Con,
    /// Ends with
    End,
}

impl ComparativeOp {
    /// Wire token for the operation, e.g. `EQ`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparativeOp::Eq => "EQ",
            ComparativeOp::Ne => "NE",
            ComparativeOp::Gt => "GT",
            ComparativeOp::Ge => "GE",
            ComparativeOp::Lt => "LT",
            ComparativeOp::Le => "LE",
            ComparativeOp::In => "IN",
            ComparativeOp::Nin => "NIN",
            ComparativeOp::Beg => "BEG",
            ComparativeOp::Con => "CON",
            ComparativeOp::End => "END",
        }
    }

    /// Whether the operation takes a list of values.
    pub fn is_set_operation(&self) -> bool {
        matches!(self, ComparativeOp::In | ComparativeOp::Nin)
    }
}

impl fmt::Display for ComparativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparativeOp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EQ" => Ok(ComparativeOp::Eq),
            "NE" => Ok(ComparativeOp::Ne),
            "GT" => Ok(ComparativeOp::Gt),
            "GE" => Ok(ComparativeOp::Ge),
            "LT" => Ok(ComparativeOp::Lt),
            "LE" => Ok(ComparativeOp::Le),
            "IN" => Ok(ComparativeOp::In),
            "NIN" => Ok(ComparativeOp::Nin),
            "BEG" => Ok(ComparativeOp::Beg),
            "CON" => Ok(ComparativeOp::Con),
            "END" => Ok(ComparativeOp::End),
            other => Err(DomainError::InvalidFilter(format!(
                "unknown comparison operation '{other}'"
            ))),
        }
    }
}

/// A single filter operand.
///
/// Numbers are rendered unquoted on the wire; everything else is quoted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Scalar {
    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }

    /// Parses a CLI-style literal: integers and floats become numbers,
    /// anything else stays a string.
    pub fn parse_literal(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return Scalar::Int(n);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Scalar::Float(f);
            }
        }
        Scalar::Str(raw.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(n) => write!(f, "{n}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

macro_rules! scalar_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Scalar {
            fn from(value: $t) -> Self {
                Scalar::Int(i64::from(value))
            }
        })*
    };
}

scalar_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

/// Operand of a filter term: a single scalar or a list (for `IN`/`NIN`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

macro_rules! filter_value_from_scalar {
    ($($t:ty),*) => {
        $(impl From<$t> for FilterValue {
            fn from(value: $t) -> Self {
                FilterValue::One(Scalar::from(value))
            }
        })*
    };
}

filter_value_from_scalar!(i8, i16, i32, i64, u8, u16, u32, f64, bool, &str, String);

impl From<Scalar> for FilterValue {
    fn from(value: Scalar) -> Self {
        FilterValue::One(value)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::Many(values.into_iter().map(Into::into).collect())
    }
}

/// One leaf condition: `field.OP:value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub field: String,
    pub operation: ComparativeOp,
    pub value: FilterValue,
}

impl FilterTerm {
    pub fn new(
        field: impl Into<String>,
        operation: ComparativeOp,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operation,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Ge, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Le, value)
    }

    pub fn is_in<T: Into<Scalar>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(field, ComparativeOp::In, values)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, ComparativeOp::Con, value)
    }
}

impl FromStr for FilterTerm {
    type Err = DomainError;

    /// Parses `field.OP:value`. Values of `IN`/`NIN` are split on commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lhs, raw_value) = s.split_once(':').ok_or_else(|| {
            DomainError::InvalidFilter(format!("expected 'field.OP:value', got '{s}'"))
        })?;
        let (field, op) = lhs.rsplit_once('.').ok_or_else(|| {
            DomainError::InvalidFilter(format!("missing operation in '{lhs}'"))
        })?;
        if field.is_empty() {
            return Err(DomainError::InvalidFilter(format!("empty field in '{s}'")));
        }

        let operation: ComparativeOp = op.parse()?;
        let value = if operation.is_set_operation() {
            FilterValue::Many(
                raw_value
                    .split(',')
                    .filter(|v| !v.is_empty())
                    .map(Scalar::parse_literal)
                    .collect(),
            )
        } else {
            FilterValue::One(Scalar::parse_literal(raw_value))
        };

        Ok(FilterTerm {
            field: field.to_string(),
            operation,
            value,
        })
    }
}

/// Boolean joiner between two filter terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOperator {
    And,
    Or,
}

impl LogicOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicOperator::And => "AND",
            LogicOperator::Or => "OR",
        }
    }
}

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flat boolean expression over filter terms.
///
/// Every term after the first carries the operator joining it to the
/// previous one, so the rendered expression never depends on inference.
/// Grouping (parentheses) is not expressible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    first: FilterTerm,
    rest: Vec<(LogicOperator, FilterTerm)>,
}

impl Filter {
    pub fn new(first: FilterTerm) -> Self {
        Self {
            first,
            rest: Vec::new(),
        }
    }

    pub fn and(mut self, term: FilterTerm) -> Self {
        self.rest.push((LogicOperator::And, term));
        self
    }

    pub fn or(mut self, term: FilterTerm) -> Self {
        self.rest.push((LogicOperator::Or, term));
        self
    }

    /// Conjunction of all `terms`, or `None` if there are none.
    pub fn all(terms: impl IntoIterator<Item = FilterTerm>) -> Option<Self> {
        Self::joined(terms, LogicOperator::And)
    }

    /// Disjunction of all `terms`, or `None` if there are none.
    pub fn any(terms: impl IntoIterator<Item = FilterTerm>) -> Option<Self> {
        Self::joined(terms, LogicOperator::Or)
    }

    fn joined(terms: impl IntoIterator<Item = FilterTerm>, op: LogicOperator) -> Option<Self> {
        let mut iter = terms.into_iter();
        let first = iter.next()?;
        Some(Self {
            first,
            rest: iter.map(|t| (op, t)).collect(),
        })
    }

    pub fn first(&self) -> &FilterTerm {
        &self.first
    }

    /// Terms after the first, each with its joining operator.
    pub fn rest(&self) -> &[(LogicOperator, FilterTerm)] {
        &self.rest
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    /// Always false; a filter holds at least one term.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl From<FilterTerm> for Filter {
    fn from(term: FilterTerm) -> Self {
        Filter::new(term)
    }
}

// ============================================================================
// Ordering, projection and passthrough parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortTerm {
    pub field: String,
    pub direction: SortDirection,
}

impl SortTerm {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl FromStr for SortTerm {
    type Err = DomainError;

    /// Parses `field` or `field:ASC` / `field:DESC`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => Ok(SortTerm::asc(s)),
            Some((field, dir)) => match dir.to_ascii_uppercase().as_str() {
                "ASC" => Ok(SortTerm::asc(field)),
                "DESC" => Ok(SortTerm::desc(field)),
                other => Err(DomainError::InvalidFilter(format!(
                    "unknown sort direction '{other}'"
                ))),
            },
        }
    }
}

/// Element of a projection: a plain name or a nested projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectionItem {
    Name(String),
    Nested(Projection),
}

/// Recursive name list used for both `embed` and `fields`.
///
/// A projection with a parent renders as `parent(child,...)`; the top level
/// usually has none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub parent: Option<String>,
    pub children: Vec<ProjectionItem>,
}

/// Nested resource inclusion.
pub type EmbedSpec = Projection;
/// Sparse field selection.
pub type FieldSpec = Projection;

impl Projection {
    /// Top-level projection over plain names.
    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parent: None,
            children: names
                .into_iter()
                .map(|n| ProjectionItem::Name(n.into()))
                .collect(),
        }
    }

    /// Named sub-projection, e.g. `patients(id,code)`.
    pub fn nested<I, S>(parent: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parent: Some(parent.into()),
            ..Self::of(names)
        }
    }

    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.children.push(ProjectionItem::Name(name.into()));
        self
    }

    pub fn with_nested(mut self, child: Projection) -> Self {
        self.children.push(ProjectionItem::Nested(child));
        self
    }
}

/// Literal `field=value` pair. The value is not escaped by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParam {
    pub field: String,
    pub value: String,
}

impl RawParam {
    pub fn new(field: impl Into<String>, value: impl ToString) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

/// Pre-built query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainParam {
    pub filters: String,
    /// When set, the literal replaces every other parameter kind.
    pub ignore_others: bool,
}

// ============================================================================
// Parameter set
// ============================================================================

/// Kinds of query parameter, in the order they are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKind {
    Q,
    QExtra,
    Embed,
    Fields,
    Sort,
    Limit,
    Raw,
    Plain,
}

/// A request's parameter set: at most one value per [`ParamKind`].
///
/// Setting a kind that is already present replaces it; values are never
/// merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub q: Option<Filter>,
    /// Filters scoped to an embedded resource, keyed by embed name.
    pub q_extra: Option<Vec<(String, Filter)>>,
    pub embed: Option<EmbedSpec>,
    pub fields: Option<FieldSpec>,
    pub sort: Option<Vec<SortTerm>>,
    pub limit: Option<u32>,
    pub raw: Option<Vec<RawParam>>,
    pub plain: Option<PlainParam>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_q(mut self, filter: impl Into<Filter>) -> Self {
        self.q = Some(filter.into());
        self
    }

    pub fn with_q_extra(mut self, entries: Vec<(String, Filter)>) -> Self {
        self.q_extra = Some(entries);
        self
    }

    pub fn with_embed(mut self, embed: EmbedSpec) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn with_fields(mut self, fields: FieldSpec) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortTerm>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_raw(mut self, raw: Vec<RawParam>) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn with_plain(mut self, filters: impl Into<String>, ignore_others: bool) -> Self {
        self.plain = Some(PlainParam {
            filters: filters.into(),
            ignore_others,
        });
        self
    }

    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    /// Kinds currently present, in encoding order.
    pub fn kinds(&self) -> Vec<ParamKind> {
        let mut kinds = Vec::new();
        if self.q.is_some() {
            kinds.push(ParamKind::Q);
        }
        if self.q_extra.is_some() {
            kinds.push(ParamKind::QExtra);
        }
        if self.embed.is_some() {
            kinds.push(ParamKind::Embed);
        }
        if self.fields.is_some() {
            kinds.push(ParamKind::Fields);
        }
        if self.sort.is_some() {
            kinds.push(ParamKind::Sort);
        }
        if self.limit.is_some() {
            kinds.push(ParamKind::Limit);
        }
        if self.raw.is_some() {
            kinds.push(ParamKind::Raw);
        }
        if self.plain.is_some() {
            kinds.push(ParamKind::Plain);
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}
