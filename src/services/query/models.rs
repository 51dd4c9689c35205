//! Query pipeline models: intents, time ranges, entities, filters and
//! generation results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shape of the generated query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[default]
    Select,
    Facet,
    Timeseries,
    Funnel,
    Histogram,
    Percentile,
    Rate,
    Compare,
}

/// High-level user intent behind an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    #[default]
    Explore,
    Monitor,
    Analyze,
    Compare,
    Troubleshoot,
    Forecast,
    Alert,
    Report,
}

/// Aggregation functions of the output dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationType {
    Count,
    Sum,
    Average,
    Min,
    Max,
    Percentile,
    UniqueCount,
    Latest,
    Rate,
    Histogram,
}

impl AggregationType {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationType::Count => "count",
            AggregationType::Sum => "sum",
            AggregationType::Average => "average",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Percentile => "percentile",
            AggregationType::UniqueCount => "uniqueCount",
            AggregationType::Latest => "latest",
            AggregationType::Rate => "rate",
            AggregationType::Histogram => "histogram",
        }
    }
}

/// Recognised time range shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeRangeType {
    #[default]
    LastHour,
    LastDay,
    LastWeek,
    LastMonth,
    LastQuarter,
    Relative,
    Absolute,
}

/// A query time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimeRange {
    #[serde(rename = "type")]
    pub range_type: TimeRangeType,
    /// Full clause for relative ranges, e.g. "SINCE 2 hours ago"
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relative_expression: Option<String>,
    /// "YYYY-MM-DD HH:MM:SS" bounds for absolute ranges
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<String>,
}

impl TimeRange {
    pub fn of(range_type: TimeRangeType) -> Self {
        Self { range_type, ..Self::default() }
    }

    pub fn relative(expression: impl Into<String>) -> Self {
        Self {
            range_type: TimeRangeType::Relative,
            relative_expression: Some(expression.into()),
            start: None,
            end: None,
        }
    }

    /// Render the SINCE/UNTIL clause of the dialect
    pub fn to_clause(&self) -> String {
        match self.range_type {
            TimeRangeType::LastHour => "SINCE 1 hour ago".to_string(),
            TimeRangeType::LastDay => "SINCE 1 day ago".to_string(),
            TimeRangeType::LastWeek => "SINCE 1 week ago".to_string(),
            TimeRangeType::LastMonth => "SINCE 1 month ago".to_string(),
            TimeRangeType::LastQuarter => "SINCE 3 months ago".to_string(),
            TimeRangeType::Relative => self
                .relative_expression
                .clone()
                .unwrap_or_else(|| "SINCE 1 hour ago".to_string()),
            TimeRangeType::Absolute => match (&self.start, &self.end) {
                (Some(start), Some(end)) => format!("SINCE '{}' UNTIL '{}'", start, end),
                _ => "SINCE 1 hour ago".to_string(),
            },
        }
    }

    /// Window length in hours, used by the cost model
    pub fn hours(&self) -> f64 {
        match self.range_type {
            TimeRangeType::LastHour => 1.0,
            TimeRangeType::LastDay => 24.0,
            TimeRangeType::LastWeek => 168.0,
            TimeRangeType::LastMonth => 720.0,
            TimeRangeType::LastQuarter => 2160.0,
            TimeRangeType::Relative => self
                .relative_expression
                .as_deref()
                .and_then(parse_relative_hours)
                .unwrap_or(1.0),
            TimeRangeType::Absolute => 1.0,
        }
    }
}

/// Parse "SINCE <n> <unit> ago" into hours
fn parse_relative_hours(expression: &str) -> Option<f64> {
    let lower = expression.to_lowercase();
    let mut parts = lower.split_whitespace();
    let since = parts.next()?;
    if since != "since" {
        return None;
    }
    let n: f64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    let factor = if unit.starts_with("minute") {
        1.0 / 60.0
    } else if unit.starts_with("hour") {
        1.0
    } else if unit.starts_with("day") {
        24.0
    } else if unit.starts_with("week") {
        168.0
    } else if unit.starts_with("month") {
        720.0
    } else {
        return None;
    };
    Some(n * factor)
}

/// Semantic kind of an extracted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Metric,
    Attribute,
    EventType,
}

/// A metric or attribute referenced by the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub aggregation: Option<AggregationType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,
}

impl QueryEntity {
    pub fn metric(name: impl Into<String>, aggregation: Option<AggregationType>) -> Self {
        Self { name: name.into(), kind: EntityKind::Metric, aggregation, alias: None }
    }
}

/// Comparison operators of the dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Ge => ">=",
            FilterOperator::Le => "<=",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::Like => "LIKE",
            FilterOperator::NotLike => "NOT LIKE",
        }
    }
}

/// A single WHERE condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self { field: field.into(), operator, value }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl OrderDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Structured interpretation of an utterance, independent of the dialect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIntent {
    pub intent_type: IntentType,
    pub query_type: QueryType,
    pub entities: Vec<QueryEntity>,
    pub event_types: Vec<String>,
    pub filters: Vec<QueryFilter>,
    pub time_range: TimeRange,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub order_by: Option<OrderDirection>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub limit: Option<u64>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw_query: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QueryIntent {
    pub fn primary_event_type(&self) -> Option<&str> {
        self.event_types.first().map(|s| s.as_str())
    }

    pub fn has_aggregation(&self) -> bool {
        self.entities.iter().any(|e| e.aggregation.is_some())
    }
}

/// A schema visible to the generator, used for event-type matching,
/// volume estimation and facet suggestions
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub records_per_hour: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub common_facets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attributes: Vec<String>,
}

/// Context for query generation
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct QueryContext {
    #[serde(default)]
    pub available_schemas: Vec<SchemaInfo>,
    #[serde(default)]
    pub user_preferences: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cost_constraints: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub performance_hints: Option<Map<String, Value>>,
    #[serde(default)]
    pub previous_queries: Vec<String>,
    #[serde(default)]
    pub domain_knowledge: Map<String, Value>,
}

impl QueryContext {
    /// Fingerprint folded into the generator's cache key
    pub fn fingerprint(&self) -> String {
        let mut names: Vec<&str> =
            self.available_schemas.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        format!(
            "schemas:{}|cost:{}",
            names.join(","),
            self.cost_constraints.is_some()
        )
    }
}

/// Result of query generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub intent: QueryIntent,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_clauses() {
        assert_eq!(TimeRange::of(TimeRangeType::LastHour).to_clause(), "SINCE 1 hour ago");
        assert_eq!(TimeRange::of(TimeRangeType::LastQuarter).to_clause(), "SINCE 3 months ago");
        assert_eq!(TimeRange::relative("SINCE 5 hours ago").to_clause(), "SINCE 5 hours ago");

        let absolute = TimeRange {
            range_type: TimeRangeType::Absolute,
            relative_expression: None,
            start: Some("2024-01-01 00:00:00".to_string()),
            end: Some("2024-01-02 00:00:00".to_string()),
        };
        assert_eq!(
            absolute.to_clause(),
            "SINCE '2024-01-01 00:00:00' UNTIL '2024-01-02 00:00:00'"
        );
    }

    #[test]
    fn test_time_range_hours() {
        assert_eq!(TimeRange::of(TimeRangeType::LastWeek).hours(), 168.0);
        assert_eq!(TimeRange::relative("SINCE 3 days ago").hours(), 72.0);
        assert_eq!(TimeRange::relative("SINCE 30 minutes ago").hours(), 0.5);
    }

    #[test]
    fn test_filter_operator_serialization() {
        assert_eq!(serde_json::to_string(&FilterOperator::NotIn).unwrap(), "\"NOT IN\"");
        let op: FilterOperator = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, FilterOperator::Ge);
    }

    #[test]
    fn test_aggregation_names() {
        assert_eq!(AggregationType::UniqueCount.as_str(), "uniqueCount");
        assert_eq!(
            serde_json::to_string(&AggregationType::UniqueCount).unwrap(),
            "\"uniqueCount\""
        );
    }
}
