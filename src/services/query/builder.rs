//! Query builder
//!
//! Renders a [`QueryIntent`] into a single-line query in the telemetry
//! dialect. Clause order is fixed: SELECT, FROM, WHERE, SINCE/UNTIL,
//! FACET, TIMESERIES, ORDER BY, LIMIT, COMPARE WITH.

use serde_json::Value;

use super::models::{AggregationType, QueryEntity, QueryFilter, QueryIntent, QueryType};

/// Field names that must be backtick-quoted in the dialect
const RESERVED_FIELDS: [&str; 6] = ["timestamp", "type", "name", "host", "user", "message"];

#[derive(Debug, Clone)]
pub struct QueryBuilderConfig {
    pub validate_syntax: bool,
    pub auto_optimize: bool,
}

impl Default for QueryBuilderConfig {
    fn default() -> Self {
        Self { validate_syntax: true, auto_optimize: true }
    }
}

pub struct QueryBuilder {
    config: QueryBuilderConfig,
}

/// Ordered clause slots assembled into the final string
#[derive(Default)]
struct QueryParts {
    select: String,
    from: String,
    where_clause: Option<String>,
    time: String,
    facet: Option<String>,
    timeseries: Option<String>,
    order: Option<String>,
    limit: Option<String>,
    compare: Option<String>,
}

impl QueryParts {
    fn assemble(self) -> String {
        let mut parts = vec![self.select, self.from];
        if let Some(where_clause) = self.where_clause {
            parts.push(where_clause);
        }
        parts.push(self.time);
        for optional in [self.facet, self.timeseries, self.order, self.limit, self.compare] {
            if let Some(clause) = optional {
                parts.push(clause);
            }
        }
        parts.join(" ")
    }
}

impl QueryBuilder {
    pub fn new(config: QueryBuilderConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, intent: &QueryIntent) -> String {
        let mut query = match intent.query_type {
            QueryType::Select => self.build_select(intent),
            QueryType::Facet => self.build_facet(intent),
            QueryType::Timeseries => self.build_timeseries(intent),
            QueryType::Percentile => self.build_percentile(intent),
            QueryType::Histogram => self.build_histogram(intent),
            QueryType::Rate => self.build_rate(intent),
            QueryType::Compare => self.build_compare(intent),
            QueryType::Funnel => self.build_funnel(intent),
        };

        if self.config.validate_syntax && !validate_query(&query) {
            tracing::warn!("Generated query failed validation: {}", query);
        }

        if self.config.auto_optimize
            && !query.contains("LIMIT")
            && !query.contains("TIMESERIES")
        {
            query.push_str(" LIMIT 100");
        }

        query
    }

    fn base_parts(&self, intent: &QueryIntent) -> QueryParts {
        QueryParts {
            select: build_select_clause(&intent.entities),
            from: build_from_clause(&intent.event_types),
            where_clause: build_where_clause(&intent.filters),
            time: intent.time_range.to_clause(),
            ..QueryParts::default()
        }
    }

    fn order_and_limit(&self, intent: &QueryIntent, parts: &mut QueryParts) {
        if let Some(direction) = intent.order_by {
            parts.order = Some(format!(
                "ORDER BY {} {}",
                order_field(intent),
                direction.as_str()
            ));
        }
        if let Some(limit) = intent.limit {
            parts.limit = Some(format!("LIMIT {}", limit));
        }
    }

    fn build_select(&self, intent: &QueryIntent) -> String {
        let mut parts = self.base_parts(intent);
        self.order_and_limit(intent, &mut parts);
        parts.assemble()
    }

    fn build_facet(&self, intent: &QueryIntent) -> String {
        let mut parts = self.base_parts(intent);
        if !intent.group_by.is_empty() {
            let fields: Vec<String> = intent.group_by.iter().map(|f| escape_field(f)).collect();
            parts.facet = Some(format!("FACET {}", fields.join(", ")));
        }
        self.order_and_limit(intent, &mut parts);
        parts.assemble()
    }

    fn build_timeseries(&self, intent: &QueryIntent) -> String {
        let mut parts = self.base_parts(intent);
        let bucket = intent
            .metadata
            .get("bucket_size")
            .and_then(Value::as_str)
            .filter(|b| *b != "AUTO");
        parts.timeseries = Some(match bucket {
            Some(bucket) => format!("TIMESERIES {}", bucket),
            None => "TIMESERIES".to_string(),
        });
        self.order_and_limit(intent, &mut parts);
        parts.assemble()
    }

    fn build_percentile(&self, intent: &QueryIntent) -> String {
        let percentiles: Vec<u64> = intent
            .metadata
            .get("percentiles")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_u64).collect())
            .filter(|p: &Vec<u64>| !p.is_empty())
            .unwrap_or_else(|| vec![50, 95, 99]);

        let mut items = Vec::new();
        for entity in &intent.entities {
            if entity.aggregation == Some(AggregationType::Percentile) {
                for p in &percentiles {
                    items.push(format!(
                        "percentile({}, {}) AS 'p{}'",
                        escape_field(&entity.name),
                        p,
                        p
                    ));
                }
            } else {
                items.push(format_entity(entity));
            }
        }
        if items.is_empty() {
            items.push("count(*)".to_string());
        }

        let mut parts = self.base_parts(intent);
        parts.select = format!("SELECT {}", items.join(", "));
        if !intent.group_by.is_empty() {
            let fields: Vec<String> = intent.group_by.iter().map(|f| escape_field(f)).collect();
            parts.facet = Some(format!("FACET {}", fields.join(", ")));
        }
        parts.assemble()
    }

    fn build_histogram(&self, intent: &QueryIntent) -> String {
        let bucket = intent
            .metadata
            .get("bucket_size")
            .and_then(Value::as_str)
            .filter(|b| *b != "AUTO");

        let mut items = Vec::new();
        for entity in &intent.entities {
            if entity.aggregation == Some(AggregationType::Histogram) {
                match bucket {
                    Some(bucket) => items
                        .push(format!("histogram({}, {})", escape_field(&entity.name), bucket)),
                    None => items.push(format!("histogram({})", escape_field(&entity.name))),
                }
            } else {
                items.push(format_entity(entity));
            }
        }
        if items.is_empty() {
            items.push("count(*)".to_string());
        }

        let mut parts = self.base_parts(intent);
        parts.select = format!("SELECT {}", items.join(", "));
        parts.assemble()
    }

    fn build_rate(&self, intent: &QueryIntent) -> String {
        let interval = intent
            .metadata
            .get("rate_interval")
            .and_then(Value::as_str)
            .unwrap_or("1 minute");

        let mut items = Vec::new();
        for entity in &intent.entities {
            if entity.aggregation == Some(AggregationType::Rate) {
                if entity.name == "*" {
                    items.push(format!("rate(count(*), {})", interval));
                } else {
                    items.push(format!(
                        "rate(sum({}), {})",
                        escape_field(&entity.name),
                        interval
                    ));
                }
            } else {
                items.push(format_entity(entity));
            }
        }
        if items.is_empty() {
            items.push(format!("rate(count(*), {})", interval));
        }

        let mut parts = self.base_parts(intent);
        parts.select = format!("SELECT {}", items.join(", "));
        // Rate queries are inherently bucketed
        parts.timeseries = Some("TIMESERIES".to_string());
        parts.assemble()
    }

    fn build_compare(&self, intent: &QueryIntent) -> String {
        let period = intent
            .metadata
            .get("compare_period")
            .and_then(Value::as_str)
            .unwrap_or("1 week");

        let mut parts = self.base_parts(intent);
        self.order_and_limit(intent, &mut parts);
        parts.compare = Some(format!("COMPARE WITH {} ago", period));
        parts.assemble()
    }

    fn build_funnel(&self, intent: &QueryIntent) -> String {
        let Some(steps) = intent
            .metadata
            .get("funnel_steps")
            .and_then(Value::as_array)
            .filter(|steps| !steps.is_empty())
        else {
            return self.build_select(intent);
        };

        let step_defs: Vec<String> = steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| {
                let name = step.get("name").and_then(Value::as_str)?;
                let condition = step.get("condition").and_then(Value::as_str)?;
                Some(format!(
                    "step{} AS '{}' WHERE {}",
                    i + 1,
                    escape_string(name),
                    condition
                ))
            })
            .collect();

        let mut parts = self.base_parts(intent);
        parts.select = format!("SELECT funnel({})", step_defs.join(", "));
        parts.where_clause = None;
        parts.assemble()
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(QueryBuilderConfig::default())
    }
}

fn build_select_clause(entities: &[QueryEntity]) -> String {
    if entities.is_empty() {
        return "SELECT count(*)".to_string();
    }
    let items: Vec<String> = entities
        .iter()
        .map(|entity| {
            if entity.name == "*" && entity.aggregation == Some(AggregationType::Count) {
                "count(*)".to_string()
            } else {
                format_entity(entity)
            }
        })
        .collect();
    format!("SELECT {}", items.join(", "))
}

fn build_from_clause(event_types: &[String]) -> String {
    if event_types.is_empty() {
        return "FROM Transaction".to_string();
    }
    let escaped: Vec<String> = event_types.iter().map(|e| escape_event_type(e)).collect();
    format!("FROM {}", escaped.join(", "))
}

fn build_where_clause(filters: &[QueryFilter]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let conditions: Vec<String> = filters.iter().map(format_filter).collect();
    Some(format!("WHERE {}", conditions.join(" AND ")))
}

fn format_entity(entity: &QueryEntity) -> String {
    let field = escape_field(&entity.name);
    let mut expr = match entity.aggregation {
        Some(aggregation) => format!("{}({})", aggregation.as_str(), field),
        None => field,
    };
    if let Some(alias) = &entity.alias {
        expr.push_str(&format!(" AS '{}'", escape_string(alias)));
    }
    expr
}

pub fn format_filter(filter: &QueryFilter) -> String {
    let field = escape_field(&filter.field);
    match &filter.value {
        Value::Array(values) => {
            let rendered: Vec<String> = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("'{}'", escape_string(s)),
                    other => other.to_string(),
                })
                .collect();
            format!("{} {} ({})", field, filter.operator.as_str(), rendered.join(", "))
        },
        Value::String(s) => {
            format!("{} {} '{}'", field, filter.operator.as_str(), escape_string(s))
        },
        other => format!("{} {} {}", field, filter.operator.as_str(), other),
    }
}

fn order_field(intent: &QueryIntent) -> String {
    if let Some(field) = intent.metadata.get("order_field").and_then(Value::as_str) {
        return escape_field(field);
    }
    for entity in &intent.entities {
        if entity.aggregation.is_some() {
            if let Some(alias) = &entity.alias {
                return format!("'{}'", escape_string(alias));
            }
            if entity.name == "*" && entity.aggregation == Some(AggregationType::Count) {
                return "count(*)".to_string();
            }
            return format_entity(entity);
        }
    }
    "count(*)".to_string()
}

/// Backtick-quote fields in the reserved set or containing spaces/hyphens
pub fn escape_field(field: &str) -> String {
    if RESERVED_FIELDS.contains(&field.to_lowercase().as_str())
        || field.contains(' ')
        || field.contains('-')
    {
        format!("`{}`", field)
    } else {
        field.to_string()
    }
}

/// Inverse of [`escape_field`]
pub fn unescape_field(field: &str) -> String {
    field
        .strip_prefix('`')
        .and_then(|f| f.strip_suffix('`'))
        .unwrap_or(field)
        .to_string()
}

fn escape_event_type(event_type: &str) -> String {
    if event_type.contains(' ') || event_type.contains('-') {
        format!("`{}`", event_type)
    } else {
        event_type.to_string()
    }
}

/// Escape single quotes inside string literals
pub fn escape_string(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// Syntactic validation: SELECT and FROM present, quotes paired,
/// parentheses balanced
pub fn validate_query(query: &str) -> bool {
    if !query.contains("SELECT") {
        tracing::warn!("Query missing SELECT clause");
        return false;
    }
    if !query.contains("FROM") {
        tracing::warn!("Query missing FROM clause");
        return false;
    }
    if query.matches('\'').count() % 2 != 0 {
        tracing::warn!("Unbalanced single quotes in query");
        return false;
    }
    if query.matches('(').count() != query.matches(')').count() {
        tracing::warn!("Unbalanced parentheses in query");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::super::intent_parser::IntentParser;
    use super::super::models::*;
    use super::*;
    use serde_json::json;

    fn build(query: &str) -> String {
        let intent = IntentParser::new().parse(query, None);
        QueryBuilder::default().build(&intent)
    }

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_faceted_percentile_scenario() {
        let query = build("95th percentile response time by service for production since 1 hour ago");
        assert_eq!(
            normalize(&query),
            "SELECT percentile(duration, 95) AS 'p95' FROM Transaction \
             WHERE appName = 'production' SINCE 1 hour ago FACET service LIMIT 100"
        );
    }

    #[test]
    fn test_bare_count_gets_default_limit() {
        let query = build("count");
        assert_eq!(normalize(&query), "SELECT count(*) FROM Transaction SINCE 1 hour ago LIMIT 100");
    }

    #[test]
    fn test_every_query_is_well_formed() {
        let utterances = [
            "count",
            "average response time by service",
            "error rate over time",
            "compare throughput versus last week",
            "histogram of duration for app checkout",
            "95th percentile latency",
            "top 5 hosts by cpu",
            "show transactions where duration > 1000",
        ];
        for utterance in utterances {
            let query = build(utterance);
            assert!(validate_query(&query), "invalid query for '{}': {}", utterance, query);
        }
    }

    #[test]
    fn test_rate_query_has_timeseries() {
        let query = build("error rate for service checkout");
        assert!(query.contains("rate("));
        assert!(query.contains("TIMESERIES"));
        assert!(!query.contains("LIMIT"));
    }

    #[test]
    fn test_compare_clause_is_last() {
        let intent = QueryIntent {
            intent_type: IntentType::Compare,
            query_type: QueryType::Compare,
            entities: vec![QueryEntity::metric("duration", Some(AggregationType::Average))],
            event_types: vec!["Transaction".to_string()],
            filters: vec![],
            time_range: TimeRange::of(TimeRangeType::LastDay),
            group_by: vec![],
            order_by: None,
            limit: Some(10),
            confidence: 1.0,
            raw_query: None,
            metadata: serde_json::Map::new(),
        };
        let query = QueryBuilder::default().build(&intent);
        assert!(query.ends_with("COMPARE WITH 1 week ago"), "got: {}", query);
        assert!(query.contains("LIMIT 10"));
    }

    #[test]
    fn test_reserved_field_escaping() {
        let filter = QueryFilter::new("host", FilterOperator::Eq, json!("web-1"));
        assert_eq!(format_filter(&filter), "`host` = 'web-1'");

        for field in ["timestamp", "my field", "multi-word", "user", "plain"] {
            assert_eq!(unescape_field(&escape_field(field)), field);
        }
        assert_eq!(escape_field("plain"), "plain");
    }

    #[test]
    fn test_string_escaping() {
        let filter = QueryFilter::new("label", FilterOperator::Eq, json!("it's here"));
        let rendered = format_filter(&filter);
        assert_eq!(rendered, "label = 'it\\'s here'");
    }

    #[test]
    fn test_in_filter_rendering() {
        let filter = QueryFilter::new(
            "appName",
            FilterOperator::In,
            json!(["web", "api", 3]),
        );
        assert_eq!(format_filter(&filter), "appName IN ('web', 'api', 3)");
    }

    #[test]
    fn test_funnel_fallback_without_steps() {
        let intent = IntentParser::new().parse("funnel of checkout", None);
        let query = QueryBuilder::default().build(&intent);
        assert!(query.contains("SELECT"));
        assert!(query.contains("FROM"));
    }

    #[test]
    fn test_funnel_with_steps() {
        let mut intent = IntentParser::new().parse("funnel of checkout", None);
        intent.metadata.insert(
            "funnel_steps".into(),
            json!([
                {"name": "visit", "condition": "pageUrl LIKE '%home%'"},
                {"name": "buy", "condition": "pageUrl LIKE '%checkout%'"},
            ]),
        );
        let query = QueryBuilder::default().build(&intent);
        assert!(query.contains("funnel(step1 AS 'visit'"));
        assert!(query.contains("step2 AS 'buy'"));
    }
}
