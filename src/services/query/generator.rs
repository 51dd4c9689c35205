//! Query generator
//!
//! Front door of the query pipeline: parse, build, optimize, with a
//! bounded LRU result cache, a FIFO history for metrics and suggestion
//! learning, and helpers to suggest and explain queries.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::builder::{QueryBuilder, QueryBuilderConfig};
use super::intent_parser::IntentParser;
use super::models::{
    AggregationType, IntentType, QueryContext, QueryIntent, QueryResult, QueryType, TimeRangeType,
};
use super::optimizer::{QueryOptimizer, QueryOptimizerConfig};
use crate::utils::LruCache;

/// Fixed completion templates offered by suggest_queries
const QUERY_TEMPLATES: [&str; 8] = [
    "Show me {metric} for {service} in the last {time}",
    "What is the average {metric} by {dimension}",
    "Compare {metric} between {period1} and {period2}",
    "Find anomalies in {metric} for {service}",
    "Top 10 {dimension} by {metric}",
    "Error rate for {service} over time",
    "Performance metrics for {application}",
    "Alert when {metric} exceeds {threshold}",
];

/// Facet fields that explode cardinality
const HIGH_CARDINALITY_FIELDS: [&str; 3] = ["userId", "sessionId", "requestId"];

static SELECT_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SELECT\s+(.+?)\s+FROM").unwrap());
static FROM_SOURCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"FROM\s+(\S+)").unwrap());
static SINCE_RELATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SINCE\s+(\d+\s+\w+\s+ago)").unwrap());
static SINCE_ABSOLUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"SINCE\s+'([^']+)'").unwrap());
static WHERE_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WHERE\s+(.+?)(?:\s+SINCE|\s+FACET|\s+LIMIT|$)").unwrap());
static FACET_FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"FACET\s+(\S+)").unwrap());

#[derive(Debug, Clone)]
pub struct QueryGeneratorConfig {
    pub cache_size: usize,
    pub history_size: usize,
    pub enable_caching: bool,
    pub builder: QueryBuilderConfig,
    pub optimizer: QueryOptimizerConfig,
}

impl Default for QueryGeneratorConfig {
    fn default() -> Self {
        Self {
            cache_size: 100,
            history_size: 1000,
            enable_caching: true,
            builder: QueryBuilderConfig::default(),
            optimizer: QueryOptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    utterance: String,
    query: String,
    confidence: f64,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

pub struct QueryGenerator {
    parser: IntentParser,
    builder: QueryBuilder,
    optimizer: QueryOptimizer,
    config: QueryGeneratorConfig,
    cache: Mutex<LruCache<String, QueryResult>>,
    history: Mutex<VecDeque<HistoryEntry>>,
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
}

impl QueryGenerator {
    pub fn new(config: QueryGeneratorConfig) -> Self {
        Self {
            parser: IntentParser::new(),
            builder: QueryBuilder::new(config.builder.clone()),
            optimizer: QueryOptimizer::new(config.optimizer.clone()),
            cache: Mutex::new(LruCache::new(config.cache_size)),
            history: Mutex::new(VecDeque::new()),
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            config,
        }
    }

    /// Generate an optimized query from a natural-language utterance
    pub fn generate(&self, natural_query: &str, context: Option<&QueryContext>) -> QueryResult {
        let start = Instant::now();
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let cache_key = self.cache_key(natural_query, context);
        if self.config.enable_caching {
            let cached = self.cache.lock().unwrap().get(&cache_key).cloned();
            if let Some(mut result) = cached {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Cache hit for query: {:.50}", natural_query);
                result.metadata.insert("cache_hit".into(), json!(true));
                return result;
            }
        }

        let intent = self.parser.parse(natural_query, context);
        tracing::debug!(
            "Parsed intent: {:?}, {:?}",
            intent.intent_type,
            intent.query_type
        );

        let built = self.builder.build(&intent);
        tracing::debug!("Built query: {}", built);

        let (query, optimization) = match context {
            Some(context) => {
                let (optimized, metadata) = self.optimizer.optimize(&built, &intent, context);
                if optimized != built {
                    tracing::info!("Query optimized");
                }
                (optimized, Value::Object(metadata))
            },
            None => (built, Value::Object(Map::new())),
        };

        let estimated_cost = self.estimate_query_cost(&intent, context);
        let warnings = self.generate_warnings(&intent);
        let suggestions = self.generate_suggestions(&intent);
        let alternatives = self.generate_alternatives(&intent, context);

        let mut metadata = Map::new();
        metadata.insert(
            "generation_time".into(),
            json!(start.elapsed().as_secs_f64()),
        );
        metadata.insert("optimization".into(), optimization);
        metadata.insert("cache_hit".into(), json!(false));

        let result = QueryResult {
            query,
            confidence: intent.confidence,
            intent,
            estimated_cost,
            warnings,
            suggestions,
            alternatives,
            metadata,
        };

        if self.config.enable_caching {
            self.cache.lock().unwrap().put(cache_key, result.clone());
        }
        self.record_history(natural_query, &result);

        result
    }

    /// Generate queries for a batch of utterances under one context
    pub fn generate_batch(
        &self,
        queries: &[String],
        context: Option<&QueryContext>,
    ) -> Vec<QueryResult> {
        queries.iter().map(|q| self.generate(q, context)).collect()
    }

    /// Up to 10 deduplicated completions for a partial utterance
    pub fn suggest_queries(
        &self,
        partial_query: &str,
        context: Option<&QueryContext>,
    ) -> Vec<String> {
        let partial_lower = partial_query.trim().to_lowercase();
        let mut suggestions: Vec<String> = Vec::new();

        for template in QUERY_TEMPLATES {
            let prefix = template.split('{').next().unwrap_or("").to_lowercase();
            if prefix.starts_with(&partial_lower) {
                suggestions.push(template.to_string());
            }
        }

        if let Some(context) = context {
            for schema in context.available_schemas.iter().take(5) {
                suggestions.push(format!("Show me all data from {}", schema.name));
                suggestions.push(format!("What are the top metrics in {}", schema.name));
                suggestions.push(format!("Analyze patterns in {}", schema.name));
            }
        }

        {
            let history = self.history.lock().unwrap();
            for entry in history.iter().rev().take(10) {
                if entry.utterance.to_lowercase().starts_with(&partial_lower) {
                    suggestions.push(entry.utterance.clone());
                }
            }
        }

        let mut unique = crate::utils::unique_ordered(suggestions);
        unique.truncate(10);
        unique
    }

    /// Decompose a query string into a natural-language explanation
    pub fn explain_query(&self, query: &str) -> Map<String, Value> {
        let mut aggregations: Vec<String> = Vec::new();
        let mut filters: Vec<String> = Vec::new();
        let mut grouping: Vec<String> = Vec::new();
        let mut data_source = String::new();
        let mut time_range = String::new();

        let upper = query.to_uppercase();
        if let Some(caps) = SELECT_SECTION_RE.captures(&upper) {
            let select_clause = &caps[1];
            for (keyword, description) in [
                ("COUNT", "counting records"),
                ("SUM", "summing"),
                ("AVERAGE", "averaging"),
                ("MAX", "finding maximum"),
                ("MIN", "finding minimum"),
                ("PERCENTILE", "calculating percentiles"),
            ] {
                if select_clause.contains(keyword) {
                    aggregations.push(description.to_string());
                }
            }
        }

        if let Some(caps) = FROM_SOURCE_RE.captures(query) {
            data_source = caps[1].to_string();
        }
        if let Some(caps) = SINCE_RELATIVE_RE.captures(query) {
            time_range = format!("Looking at data from {}", &caps[1]);
        } else if let Some(caps) = SINCE_ABSOLUTE_RE.captures(query) {
            time_range = format!("Data since {}", &caps[1]);
        }
        if let Some(caps) = WHERE_SECTION_RE.captures(query) {
            filters.push(format!("Filtered by: {}", &caps[1]));
        }
        if let Some(caps) = FACET_FIELD_RE.captures(query) {
            grouping.push(format!("Grouped by {}", &caps[1]));
        }

        let mut summary_parts: Vec<String> = Vec::new();
        if aggregations.is_empty() {
            summary_parts.push("This query retrieves".to_string());
        } else {
            summary_parts.push(format!("This query is {}", aggregations.join(", ")));
        }
        summary_parts.push(format!("data from {}", data_source));
        if !time_range.is_empty() {
            summary_parts.push(time_range.to_lowercase());
        }
        if !filters.is_empty() {
            summary_parts.push(format!("with filters: {}", filters.join(", ")));
        }
        if !grouping.is_empty() {
            summary_parts.push(grouping.join(", "));
        }

        let mut explanation = Map::new();
        explanation.insert("summary".into(), json!(format!("{}.", summary_parts.join(" "))));
        explanation.insert("data_source".into(), json!(data_source));
        explanation.insert("time_range".into(), json!(time_range));
        explanation.insert("aggregations".into(), json!(aggregations));
        explanation.insert("filters".into(), json!(filters));
        explanation.insert("grouping".into(), json!(grouping));
        explanation
    }

    fn estimate_query_cost(
        &self,
        intent: &QueryIntent,
        context: Option<&QueryContext>,
    ) -> Option<f64> {
        let context = context?;
        let primary = intent.primary_event_type()?;
        let schema = context
            .available_schemas
            .iter()
            .find(|s| s.name == primary)?;

        let records_per_hour = schema.records_per_hour.unwrap_or(10_000.0);
        let estimated_records = records_per_hour * intent.time_range.hours();
        let volume_factor = (estimated_records / 100_000.0).min(10.0);

        let mut complexity_factor = 1.0;
        match intent.query_type {
            QueryType::Timeseries => complexity_factor *= 1.5,
            QueryType::Facet => complexity_factor *= 1.2 * intent.group_by.len().max(1) as f64,
            QueryType::Percentile => complexity_factor *= 2.0,
            _ => {},
        }
        for entity in &intent.entities {
            if matches!(
                entity.aggregation,
                Some(AggregationType::Percentile) | Some(AggregationType::UniqueCount)
            ) {
                complexity_factor *= 1.5;
            }
        }

        Some((volume_factor * complexity_factor * 100.0).round() / 100.0)
    }

    fn generate_warnings(&self, intent: &QueryIntent) -> Vec<String> {
        let mut warnings = Vec::new();
        let hours = intent.time_range.hours();

        if intent.query_type == QueryType::Percentile && hours > 168.0 {
            warnings
                .push("Percentile calculations over long time ranges can be expensive".to_string());
        }
        for field in &intent.group_by {
            if HIGH_CARDINALITY_FIELDS.contains(&field.as_str()) {
                warnings.push(format!("Grouping by {} may result in high cardinality", field));
            }
        }
        if intent.filters.is_empty() && hours > 24.0 {
            warnings.push("Consider adding filters to reduce data volume".to_string());
        }

        warnings
    }

    fn generate_suggestions(&self, intent: &QueryIntent) -> Vec<String> {
        let mut suggestions = Vec::new();
        let raw = intent.raw_query.as_deref().unwrap_or("").to_lowercase();

        if raw.contains("over time") && intent.query_type != QueryType::Timeseries {
            suggestions.push("Consider using TIMESERIES for time-based visualization".to_string());
        }
        for entity in &intent.entities {
            let name = entity.name.to_lowercase();
            if (name.contains("duration") || name.contains("latency"))
                && entity.aggregation != Some(AggregationType::Percentile)
            {
                suggestions.push(format!(
                    "Consider using percentiles for {} to better understand distribution",
                    entity.name
                ));
            }
        }
        if intent.intent_type == IntentType::Troubleshoot
            && intent.time_range.range_type == TimeRangeType::LastMonth
        {
            suggestions.push(
                "For troubleshooting, consider using a shorter time range for faster results"
                    .to_string(),
            );
        }

        suggestions
    }

    fn generate_alternatives(
        &self,
        intent: &QueryIntent,
        context: Option<&QueryContext>,
    ) -> Vec<String> {
        let mut alternatives = Vec::new();

        if !intent.has_aggregation() && !intent.entities.is_empty() {
            let mut alt = intent.clone();
            alt.entities[0].aggregation = Some(AggregationType::Count);
            alternatives.push(self.builder.build(&alt));
        }

        if intent.query_type == QueryType::Select
            && let Some(context) = context
        {
            let primary = intent.primary_event_type().unwrap_or("Transaction");
            let facet = context
                .available_schemas
                .iter()
                .find(|s| s.name == primary)
                .and_then(|s| s.common_facets.first().cloned())
                .unwrap_or_else(|| "appName".to_string());

            let mut alt = intent.clone();
            alt.query_type = QueryType::Facet;
            alt.group_by = vec![facet];
            alternatives.push(self.builder.build(&alt));
        }

        alternatives.truncate(3);
        alternatives
    }

    fn cache_key(&self, query: &str, context: Option<&QueryContext>) -> String {
        match context {
            Some(context) => {
                format!("{}|{}", query.trim().to_lowercase(), context.fingerprint())
            },
            None => query.trim().to_lowercase(),
        }
    }

    fn record_history(&self, utterance: &str, result: &QueryResult) {
        let mut history = self.history.lock().unwrap();
        history.push_back(HistoryEntry {
            utterance: utterance.to_string(),
            query: result.query.clone(),
            confidence: result.confidence,
            timestamp: Utc::now(),
        });
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    pub fn metrics(&self) -> Value {
        let history = self.history.lock().unwrap();
        let total = self.total_requests.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let average_confidence = if history.is_empty() {
            0.0
        } else {
            history.iter().map(|h| h.confidence).sum::<f64>() / history.len() as f64
        };

        json!({
            "total_queries": total,
            "cache_size": self.cache.lock().unwrap().len(),
            "cache_hit_rate": hits as f64 / total.max(1) as f64,
            "history_size": history.len(),
            "average_confidence": average_confidence,
        })
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// Most recent generated queries, newest last
    pub fn recent_history(&self, limit: usize) -> Vec<(String, String)> {
        let history = self.history.lock().unwrap();
        history
            .iter()
            .rev()
            .take(limit)
            .map(|h| (h.utterance.clone(), h.query.clone()))
            .collect()
    }
}

impl Default for QueryGenerator {
    fn default() -> Self {
        Self::new(QueryGeneratorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::super::models::SchemaInfo;
    use super::*;

    fn generator() -> QueryGenerator {
        QueryGenerator::default()
    }

    #[test]
    fn test_generate_is_deterministic_and_cached() {
        let generator = generator();
        let first = generator.generate("count of errors in the last hour", None);
        assert_eq!(first.metadata["cache_hit"], json!(false));

        let second = generator.generate("count of errors in the last hour", None);
        assert_eq!(second.metadata["cache_hit"], json!(true));
        assert_eq!(first.query, second.query);
    }

    #[test]
    fn test_cache_key_is_case_insensitive() {
        let generator = generator();
        generator.generate("Count Errors", None);
        let second = generator.generate("count errors", None);
        assert_eq!(second.metadata["cache_hit"], json!(true));
    }

    #[test]
    fn test_estimated_cost_with_schema() {
        let context = QueryContext {
            available_schemas: vec![SchemaInfo {
                name: "Transaction".to_string(),
                records_per_hour: Some(1_000_000.0),
                ..Default::default()
            }],
            ..QueryContext::default()
        };
        let result = generator().generate("count in the last day", Some(&context));
        assert!(result.estimated_cost.is_some());
        assert!(result.estimated_cost.unwrap() > 0.0);
    }

    #[test]
    fn test_warning_for_unfiltered_long_range() {
        let result = generator().generate("count for the last week", None);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.contains("adding filters"))
        );
    }

    #[test]
    fn test_suggestions_for_latency_metrics() {
        let result = generator().generate("average response time", None);
        assert!(
            result
                .suggestions
                .iter()
                .any(|s| s.contains("percentiles"))
        );
    }

    #[test]
    fn test_suggest_queries_from_templates_and_history() {
        let generator = generator();
        generator.generate("top 10 services by throughput", None);

        let from_templates = generator.suggest_queries("top", None);
        assert!(from_templates.iter().any(|s| s.starts_with("Top 10")));
        assert!(
            from_templates
                .iter()
                .any(|s| s == "top 10 services by throughput")
        );
        assert!(from_templates.len() <= 10);
    }

    #[test]
    fn test_explain_query() {
        let explanation = generator().explain_query(
            "SELECT count(*) FROM Transaction WHERE appName = 'web' SINCE 1 hour ago FACET host",
        );
        assert_eq!(explanation["data_source"], json!("Transaction"));
        assert!(
            explanation["summary"]
                .as_str()
                .unwrap()
                .contains("counting records")
        );
        assert_eq!(explanation["grouping"], json!(["Grouped by host"]));
    }

    #[test]
    fn test_alternatives_for_select_with_context() {
        let context = QueryContext {
            available_schemas: vec![SchemaInfo {
                name: "Transaction".to_string(),
                common_facets: vec!["appName".to_string()],
                ..Default::default()
            }],
            ..QueryContext::default()
        };
        // An utterance with no aggregation keywords and no grouping
        let result = generator().generate("show transactions", Some(&context));
        assert!(!result.alternatives.is_empty());
        for alt in &result.alternatives {
            assert!(alt.contains("SELECT"));
            assert!(alt.contains("FROM"));
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let generator = QueryGenerator::new(QueryGeneratorConfig {
            history_size: 5,
            enable_caching: false,
            ..QueryGeneratorConfig::default()
        });
        for i in 0..12 {
            generator.generate(&format!("count of batch {}", i), None);
        }
        assert_eq!(generator.metrics()["history_size"], json!(5));
    }
}
