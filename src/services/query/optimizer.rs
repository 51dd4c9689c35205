//! Query optimizer
//!
//! Rewrites generated queries for cost or speed under three modes, with
//! a volume-based cost model. Every rewrite is validated; when the
//! optimized string no longer carries the query's essential parts the
//! original is returned with `validation_failed` recorded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

use super::models::{IntentType, QueryContext, QueryIntent, QueryType, TimeRangeType};

/// Fields treated as high-selectivity when reordering WHERE clauses
const HIGH_SELECTIVITY_FIELDS: [&str; 3] = ["appName", "host", "entityGuid"];

static FROM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"FROM\s+\S+").unwrap());
static WHERE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WHERE\s+(.+?)(?:\s+SINCE|\s+FACET|\s+LIMIT|$)").unwrap());
static TIMESERIES_BUCKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"TIMESERIES\s+\d").unwrap());
static SAMPLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"SAMPLE\(([\d.]+)\)").unwrap());
static PERCENTILE_99_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"percentile\(([^,)]+),\s*99\)(?:\s+AS\s+'p99')?").unwrap());
static PERCENTILE_50_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"percentile\(([^,)]+),\s*50\)(?:\s+AS\s+'p50')?").unwrap());
static PERCENTILE_QUARTILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",?\s*percentile\([^,)]+,\s*(?:25|75)\)(?:\s+AS\s+'p(?:25|75)')?").unwrap());

/// Optimization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerMode {
    Cost,
    Speed,
    #[default]
    Balanced,
}

impl OptimizerMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cost" => OptimizerMode::Cost,
            "speed" => OptimizerMode::Speed,
            _ => OptimizerMode::Balanced,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptimizerMode::Cost => "cost",
            OptimizerMode::Speed => "speed",
            OptimizerMode::Balanced => "balanced",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptimizerConfig {
    pub mode: OptimizerMode,
    /// Enables lossy rewrites (approximate aggregations)
    pub aggressive: bool,
}

pub struct QueryOptimizer {
    config: QueryOptimizerConfig,
}

impl QueryOptimizer {
    pub fn new(config: QueryOptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimize a query; returns the rewritten string and metadata
    /// (costs, applied rule names, mode)
    pub fn optimize(
        &self,
        query: &str,
        intent: &QueryIntent,
        context: &QueryContext,
    ) -> (String, Map<String, Value>) {
        let original = query.to_string();
        let mut applied: Vec<String> = Vec::new();
        let original_cost = self.estimate_cost(&original, intent, context);

        let mut optimized = match self.config.mode {
            OptimizerMode::Cost => self.optimize_for_cost(original.clone(), intent, context, &mut applied),
            OptimizerMode::Speed => self.optimize_for_speed(original.clone(), intent, context, &mut applied),
            OptimizerMode::Balanced => {
                self.optimize_balanced(original.clone(), intent, context, &mut applied)
            },
        };
        optimized = self.apply_general_optimizations(optimized, intent, &mut applied);

        if !self.validate(&original, &optimized, intent) {
            tracing::warn!("Optimization validation failed, reverting to original");
            optimized = original.clone();
            applied = vec!["validation_failed".to_string()];
        }

        let optimized_cost = self.estimate_cost(&optimized, intent, context);
        let mut metadata = Map::new();
        metadata.insert("original_cost".into(), json!(original_cost));
        metadata.insert("optimized_cost".into(), json!(optimized_cost));
        metadata.insert(
            "cost_reduction".into(),
            json!(if original_cost > 0.0 {
                (original_cost - optimized_cost) / original_cost
            } else {
                0.0
            }),
        );
        metadata.insert("optimizations_applied".into(), json!(applied));
        metadata.insert("optimization_mode".into(), json!(self.config.mode.as_str()));

        (optimized, metadata)
    }

    fn optimize_for_cost(
        &self,
        mut query: String,
        intent: &QueryIntent,
        context: &QueryContext,
        applied: &mut Vec<String>,
    ) -> String {
        if matches!(
            intent.time_range.range_type,
            TimeRangeType::LastMonth | TimeRangeType::LastQuarter
        ) && !matches!(intent.intent_type, IntentType::Report | IntentType::Forecast)
        {
            query = reduce_time_range(query, intent, false, applied);
        }

        query = self.add_sampling(query, intent, context, applied);
        if intent.query_type == QueryType::Facet {
            query = limit_facet_cardinality(query, applied);
        }
        query = self.replace_expensive_aggregations(query, applied);
        query = add_limit(query, 100, applied);
        query
    }

    fn optimize_for_speed(
        &self,
        mut query: String,
        intent: &QueryIntent,
        context: &QueryContext,
        applied: &mut Vec<String>,
    ) -> String {
        query = optimize_where_clause(query, applied);

        if query.contains("WHERE") && !query.contains("LIMIT") {
            query = add_limit(query, 1000, applied);
        }
        if self.estimate_data_volume(intent, context) > 1_000_000.0 {
            query = simplify_aggregations(query, applied);
        }
        query = self.use_approximations(query, applied);
        query
    }

    fn optimize_balanced(
        &self,
        mut query: String,
        intent: &QueryIntent,
        context: &QueryContext,
        applied: &mut Vec<String>,
    ) -> String {
        if intent.time_range.hours() > 168.0 {
            query = reduce_time_range(query, intent, true, applied);
        }
        if self.estimate_data_volume(intent, context) > 1_000_000.0 {
            query = self.add_sampling(query, intent, context, applied);
        }
        query = optimize_where_clause(query, applied);
        query = add_limit(query, 500, applied);
        query
    }

    fn apply_general_optimizations(
        &self,
        mut query: String,
        intent: &QueryIntent,
        applied: &mut Vec<String>,
    ) -> String {
        query = remove_redundancies(query, applied);
        query = optimize_where_clause(query, applied);
        query = prune_unnecessary_columns(query);
        if query.contains("TIMESERIES") {
            query = optimize_timeseries_buckets(query, intent, applied);
        }
        query
    }

    fn add_sampling(
        &self,
        query: String,
        intent: &QueryIntent,
        context: &QueryContext,
        applied: &mut Vec<String>,
    ) -> String {
        if query.contains("LIMIT") || query.contains("SAMPLE") {
            return query;
        }
        // Sampling would bias distribution-shaped aggregations
        if matches!(intent.query_type, QueryType::Percentile | QueryType::Histogram) {
            return query;
        }

        let volume = self.estimate_data_volume(intent, context);
        let rate = if volume > 10_000_000.0 {
            0.01
        } else if volume > 1_000_000.0 {
            0.1
        } else {
            return query;
        };

        if let Some(found) = FROM_RE.find(&query) {
            let replacement = format!("{} SAMPLE({})", found.as_str(), rate);
            let rewritten = query.replacen(found.as_str(), &replacement, 1);
            applied.push("add_sampling".to_string());
            return rewritten;
        }
        query
    }

    fn replace_expensive_aggregations(
        &self,
        mut query: String,
        applied: &mut Vec<String>,
    ) -> String {
        if !self.config.aggressive {
            return query;
        }
        let mut changed = false;

        if query.contains("uniqueCount") {
            query = query.replace("uniqueCount", "approximateCount");
            changed = true;
        }
        if PERCENTILE_99_RE.is_match(&query) {
            query = PERCENTILE_99_RE.replace_all(&query, "max($1)").to_string();
            changed = true;
        }
        if PERCENTILE_50_RE.is_match(&query) {
            query = PERCENTILE_50_RE.replace_all(&query, "average($1)").to_string();
            changed = true;
        }

        if changed {
            applied.push("replace_expensive_aggregations".to_string());
        }
        query
    }

    fn use_approximations(&self, mut query: String, applied: &mut Vec<String>) -> String {
        if self.config.aggressive && query.contains("uniqueCount") {
            query = query.replace("uniqueCount", "approximateUniqueCount");
            applied.push("use_approximations".to_string());
        }
        query
    }

    /// Volume-based monetary estimate with operation multipliers
    pub fn estimate_cost(&self, query: &str, intent: &QueryIntent, context: &QueryContext) -> f64 {
        let volume = self.estimate_data_volume(intent, context);
        let volume_cost = volume / 1_000_000.0 * 0.25;

        let mut multiplier = 1.0;
        if query.contains("TIMESERIES") {
            multiplier *= 1.5;
        }
        if query.contains("FACET") {
            multiplier *= 1.2;
        }
        if query.contains("percentile") {
            multiplier *= 2.0;
        }
        if query.contains("uniqueCount") {
            multiplier *= 1.8;
        }
        if !query.contains("LIMIT") && !query.contains("TIMESERIES") {
            multiplier *= 2.0;
        }
        if let Some(caps) = SAMPLE_RE.captures(query)
            && let Ok(rate) = caps[1].parse::<f64>()
        {
            multiplier *= rate;
        }

        multiplier * volume_cost
    }

    /// Expected record count for the intent's window
    pub fn estimate_data_volume(&self, intent: &QueryIntent, context: &QueryContext) -> f64 {
        let Some(primary) = intent.primary_event_type() else {
            return 100_000.0;
        };
        for schema in &context.available_schemas {
            if schema.name == primary {
                let per_hour = schema.records_per_hour.unwrap_or(10_000.0);
                return per_hour * intent.time_range.hours();
            }
        }
        100_000.0
    }

    /// Essential parts must survive optimization: SELECT, FROM and every
    /// event type referenced by the intent
    fn validate(&self, original: &str, optimized: &str, intent: &QueryIntent) -> bool {
        for part in ["SELECT", "FROM"] {
            if original.contains(part) && !optimized.contains(part) {
                return false;
            }
        }
        for event_type in &intent.event_types {
            if original.contains(event_type.as_str()) && !optimized.contains(event_type.as_str()) {
                return false;
            }
        }
        true
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new(QueryOptimizerConfig::default())
    }
}

fn reduce_time_range(
    query: String,
    intent: &QueryIntent,
    moderate: bool,
    applied: &mut Vec<String>,
) -> String {
    let replacement = match (intent.time_range.range_type, moderate) {
        (TimeRangeType::LastQuarter, false) => ("SINCE 3 months ago", "SINCE 1 month ago"),
        (TimeRangeType::LastMonth, false) => ("SINCE 1 month ago", "SINCE 1 week ago"),
        (TimeRangeType::LastWeek, false) => ("SINCE 1 week ago", "SINCE 1 day ago"),
        (TimeRangeType::LastQuarter, true) => ("SINCE 3 months ago", "SINCE 2 months ago"),
        (TimeRangeType::LastMonth, true) => ("SINCE 1 month ago", "SINCE 2 weeks ago"),
        _ => return query,
    };

    if query.contains(replacement.0) {
        applied.push("reduce_time_range".to_string());
        query.replace(replacement.0, replacement.1)
    } else {
        query
    }
}

fn limit_facet_cardinality(mut query: String, applied: &mut Vec<String>) -> String {
    if query.contains("FACET") && !query.contains("LIMIT") {
        query.push_str(" LIMIT 100");
        applied.push("limit_facet_cardinality".to_string());
    }
    query
}

fn add_limit(mut query: String, limit: u64, applied: &mut Vec<String>) -> String {
    if !query.contains("LIMIT") && !query.contains("TIMESERIES") {
        query.push_str(&format!(" LIMIT {}", limit));
        applied.push("add_limit".to_string());
    }
    query
}

/// Move conditions on high-selectivity fields to the front of the WHERE
/// clause, keeping relative order otherwise
fn optimize_where_clause(query: String, applied: &mut Vec<String>) -> String {
    let Some(caps) = WHERE_RE.captures(&query) else {
        return query;
    };
    let where_clause = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();

    let conditions: Vec<&str> = where_clause.split(" AND ").collect();
    let (high, low): (Vec<&str>, Vec<&str>) = conditions
        .iter()
        .partition(|c| HIGH_SELECTIVITY_FIELDS.iter().any(|f| c.contains(f)));

    if high.is_empty() {
        return query;
    }
    let reordered = high
        .into_iter()
        .chain(low)
        .collect::<Vec<&str>>()
        .join(" AND ");
    if reordered == where_clause {
        return query;
    }

    applied.push("optimize_where_clause".to_string());
    query.replacen(&where_clause, &reordered, 1)
}

/// Deduplicate AND-joined WHERE conditions, preserving first occurrence
fn remove_redundancies(query: String, applied: &mut Vec<String>) -> String {
    let Some(caps) = WHERE_RE.captures(&query) else {
        return query;
    };
    let where_clause = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();

    let conditions: Vec<&str> = where_clause.split(" AND ").collect();
    let unique = crate::utils::unique_ordered(conditions.clone());
    if unique.len() == conditions.len() {
        return query;
    }

    applied.push("remove_redundancies".to_string());
    query.replacen(&where_clause, &unique.join(" AND "), 1)
}

/// Drop the quartile percentiles when a query asks for too many
fn simplify_aggregations(query: String, applied: &mut Vec<String>) -> String {
    if query.matches("percentile").count() <= 3 {
        return query;
    }
    let simplified = PERCENTILE_QUARTILE_RE.replace_all(&query, "").to_string();
    if simplified != query {
        applied.push("simplify_aggregations".to_string());
        simplified
    } else {
        query
    }
}

/// Pick a TIMESERIES bucket from the window length when none is given
fn optimize_timeseries_buckets(
    query: String,
    intent: &QueryIntent,
    applied: &mut Vec<String>,
) -> String {
    if TIMESERIES_BUCKET_RE.is_match(&query) {
        return query;
    }
    let hours = intent.time_range.hours();
    let bucket = if hours <= 1.0 {
        "1 minute"
    } else if hours <= 24.0 {
        "5 minutes"
    } else if hours <= 168.0 {
        "1 hour"
    } else {
        "1 day"
    };

    applied.push("optimize_timeseries_buckets".to_string());
    query.replacen("TIMESERIES", &format!("TIMESERIES {}", bucket), 1)
}

/// Column pruning is intentionally a no-op: SELECT lists are already
/// produced from the intent's entities, so there is nothing to prune
fn prune_unnecessary_columns(query: String) -> String {
    query
}

#[cfg(test)]
mod tests {
    use super::super::intent_parser::IntentParser;
    use super::super::models::SchemaInfo;
    use super::*;

    fn transaction_context(records_per_hour: f64) -> QueryContext {
        QueryContext {
            available_schemas: vec![SchemaInfo {
                name: "Transaction".to_string(),
                records_per_hour: Some(records_per_hour),
                ..Default::default()
            }],
            ..QueryContext::default()
        }
    }

    #[test]
    fn test_cost_mode_reduces_month_window() {
        let intent = IntentParser::new().parse("average of duration in the last month", None);
        let context = transaction_context(1_000_000.0);
        let optimizer = QueryOptimizer::new(QueryOptimizerConfig {
            mode: OptimizerMode::Cost,
            aggressive: false,
        });

        let original = "SELECT average(duration) FROM Transaction SINCE 1 month ago";
        let (optimized, metadata) = optimizer.optimize(original, &intent, &context);

        let applied: Vec<String> = metadata["optimizations_applied"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();

        let reduced = optimized.contains("SINCE 1 week ago");
        let sampled = optimized.contains("SAMPLE(");
        assert!(reduced || sampled, "expected time reduction or sampling: {}", optimized);
        assert!(applied.contains(&"reduce_time_range".to_string()));

        let original_cost = metadata["original_cost"].as_f64().unwrap();
        let optimized_cost = metadata["optimized_cost"].as_f64().unwrap();
        assert!(optimized_cost < original_cost, "{} < {}", optimized_cost, original_cost);
    }

    #[test]
    fn test_sampling_skipped_for_percentile() {
        let intent =
            IntentParser::new().parse("95th percentile duration for the last month", None);
        let context = transaction_context(10_000_000.0);
        let optimizer = QueryOptimizer::new(QueryOptimizerConfig {
            mode: OptimizerMode::Cost,
            aggressive: false,
        });

        let original = "SELECT percentile(duration, 95) AS 'p95' FROM Transaction SINCE 1 month ago";
        let (optimized, _) = optimizer.optimize(original, &intent, &context);
        assert!(!optimized.contains("SAMPLE"));
    }

    #[test]
    fn test_facet_limit_added() {
        let intent = IntentParser::new().parse("count by service", None);
        let optimizer = QueryOptimizer::new(QueryOptimizerConfig {
            mode: OptimizerMode::Cost,
            aggressive: false,
        });
        let original = "SELECT count(*) FROM Transaction SINCE 1 hour ago FACET service";
        let (optimized, _) = optimizer.optimize(original, &intent, &QueryContext::default());
        assert!(optimized.contains("FACET service LIMIT 100"));
    }

    #[test]
    fn test_where_reordering_puts_app_name_first() {
        let intent = IntentParser::new().parse("count", None);
        let optimizer = QueryOptimizer::default();
        let original = "SELECT count(*) FROM Transaction WHERE duration > 10 AND appName = 'web' SINCE 1 hour ago";
        let (optimized, metadata) = optimizer.optimize(original, &intent, &QueryContext::default());

        assert!(optimized.contains("WHERE appName = 'web' AND duration > 10"));
        let applied = metadata["optimizations_applied"].as_array().unwrap();
        assert!(applied.iter().any(|v| v == "optimize_where_clause"));
    }

    #[test]
    fn test_duplicate_conditions_removed() {
        let intent = IntentParser::new().parse("count", None);
        let optimizer = QueryOptimizer::default();
        let original =
            "SELECT count(*) FROM Transaction WHERE appName = 'web' AND appName = 'web' SINCE 1 hour ago";
        let (optimized, _) = optimizer.optimize(original, &intent, &QueryContext::default());
        assert_eq!(optimized.matches("appName = 'web'").count(), 1);
    }

    #[test]
    fn test_timeseries_bucket_for_day_window() {
        let intent = IntentParser::new().parse("count over time for the last day", None);
        let optimizer = QueryOptimizer::default();
        let original = "SELECT count(*) FROM Transaction SINCE 1 day ago TIMESERIES";
        let (optimized, _) = optimizer.optimize(original, &intent, &QueryContext::default());
        assert!(optimized.contains("TIMESERIES 5 minutes"), "got: {}", optimized);
    }

    #[test]
    fn test_aggressive_approximations() {
        let intent = IntentParser::new().parse("unique users", None);
        let optimizer = QueryOptimizer::new(QueryOptimizerConfig {
            mode: OptimizerMode::Speed,
            aggressive: true,
        });
        let original = "SELECT uniqueCount(userId) FROM Transaction SINCE 1 hour ago LIMIT 100";
        let (optimized, _) = optimizer.optimize(original, &intent, &QueryContext::default());
        assert!(optimized.contains("approximateUniqueCount(userId)"));
    }

    #[test]
    fn test_validation_failure_reverts() {
        // An intent whose event type never appears in the query cannot be
        // broken by optimization; craft a query that loses FROM on rewrite
        let intent = IntentParser::new().parse("count transactions last month", None);
        let optimizer = QueryOptimizer::new(QueryOptimizerConfig {
            mode: OptimizerMode::Cost,
            aggressive: false,
        });
        // The optimizer never removes FROM, so validation passes here; the
        // safety net is exercised directly instead
        assert!(!optimizer.validate(
            "SELECT count(*) FROM Transaction",
            "SELECT count(*)",
            &intent
        ));
    }
}
