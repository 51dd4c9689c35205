//! Natural-language intent parser
//!
//! Turns an utterance into a structured [`QueryIntent`] using ordered
//! keyword tables and regex families. Parsing is deterministic; the
//! confidence score reflects how much of the intent had to be defaulted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use super::models::{
    AggregationType, EntityKind, FilterOperator, IntentType, OrderDirection, QueryContext,
    QueryEntity, QueryFilter, QueryIntent, QueryType, TimeRange, TimeRangeType,
};

/// Metric synonyms: phrase -> (field, aggregation)
const METRIC_SYNONYMS: [(&str, &str, AggregationType); 9] = [
    ("response time", "duration", AggregationType::Average),
    ("latency", "duration", AggregationType::Average),
    ("error rate", "error", AggregationType::Rate),
    ("error count", "error", AggregationType::Count),
    ("throughput", "count", AggregationType::Rate),
    ("cpu", "cpuPercent", AggregationType::Average),
    ("memory", "memoryUsedPercent", AggregationType::Average),
    ("count", "*", AggregationType::Count),
    ("total", "*", AggregationType::Count),
];

/// Event type keywords: keyword -> telemetry event type
const EVENT_TYPE_KEYWORDS: [(&str, &str); 11] = [
    ("transaction", "Transaction"),
    ("error", "TransactionError"),
    ("log", "Log"),
    ("metric", "Metric"),
    ("span", "Span"),
    ("trace", "Span"),
    ("browser", "PageView"),
    ("mobile", "Mobile"),
    ("synthetic", "SyntheticCheck"),
    ("infrastructure", "SystemSample"),
    ("process", "ProcessSample"),
];

const VAGUE_TERMS: [&str; 4] = ["something", "anything", "stuff", "things"];

static PERCENTILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)(?:st|nd|rd|th)?\s*percentile(?:\s+(?:of\s+)?(\w+))?").unwrap()
});

static TIME_PATTERNS: Lazy<Vec<(Regex, TimeRangeType)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"last\s+hour|past\s+hour|previous\s+hour").unwrap(),
            TimeRangeType::LastHour,
        ),
        (
            Regex::new(r"last\s+day|past\s+day|yesterday|previous\s+day").unwrap(),
            TimeRangeType::LastDay,
        ),
        (
            Regex::new(r"last\s+week|past\s+week|previous\s+week").unwrap(),
            TimeRangeType::LastWeek,
        ),
        (
            Regex::new(r"last\s+month|past\s+month|previous\s+month").unwrap(),
            TimeRangeType::LastMonth,
        ),
        (
            Regex::new(r"(?:last|past|this)\s+quarter").unwrap(),
            TimeRangeType::LastQuarter,
        ),
    ]
});

static RELATIVE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:last|past)\s+(\d+)\s*(minute|hour|day|week|month)s?").unwrap()
});
static SINCE_AGO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"since\s+(\d+)\s*(minute|hour|day|week|month)s?\s+ago").unwrap());

static VERB_RES: Lazy<Vec<(Regex, AggregationType)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\b(?:average|avg|mean)\s+(?:of\s+)?(\w+)").unwrap(),
            AggregationType::Average,
        ),
        (Regex::new(r"\bsum\s+(?:of\s+)?(\w+)").unwrap(), AggregationType::Sum),
        (
            Regex::new(r"\b(?:maximum|max)\s+(?:of\s+)?(\w+)").unwrap(),
            AggregationType::Max,
        ),
        (
            Regex::new(r"\b(?:minimum|min)\s+(?:of\s+)?(\w+)").unwrap(),
            AggregationType::Min,
        ),
    ]
});

static WHERE_SYMBOLIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\w+)\s*(>=|<=|!=|>|<|=)\s*(?:['\x22]([^'\x22]+)['\x22]|([\w.-]+))").unwrap()
});
static EQUALS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\w+)\s+equals?\s+(?:['\x22]([^'\x22]+)['\x22]|([\w.-]+))").unwrap()
});
static IS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\w+)\s+is\s+(?:['\x22]([^'\x22]+)['\x22]|([\w.-]+))").unwrap()
});
static GREATER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s+greater\s+than\s+(\d+(?:\.\d+)?)").unwrap());
static LESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s+less\s+than\s+(\d+(?:\.\d+)?)").unwrap());
static CONTAINING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\w+)\s+(not\s+)?containing\s+(?:['\x22]([^'\x22]+)['\x22]|([\w.-]+))").unwrap()
});
static APP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:for|from|in)\s+(?:app|application|service)\s+['\x22]?([\w.-]+)['\x22]?")
        .unwrap()
});
static ENVIRONMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:for|in)\s+(production|prod|staging|development|dev|test|qa)\b").unwrap()
});

static GROUP_BY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:group\s+by|grouped\s+by|by)\s+(\w+(?:\s*,\s*\w+)*)").unwrap()
});
static FACET_INDICATOR_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["per", "by", "for each", "breakdown by"]
        .iter()
        .map(|kw| Regex::new(&format!(r"{}\s+(\w+)", kw)).unwrap())
        .collect()
});

static LIMIT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:top|first|limit)\s+(\d+)").unwrap(),
        Regex::new(r"(\d+)\s+(?:results?|records?|rows?)").unwrap(),
    ]
});

/// Words that look like filter fields but never are
const FIELD_STOPLIST: [&str; 6] = ["what", "it", "that", "this", "there", "which"];
/// Group-by tokens to ignore
const GROUP_STOPLIST: [&str; 4] = ["the", "a", "each", "all"];

pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, query: &str, context: Option<&QueryContext>) -> QueryIntent {
        let raw = query.trim().to_string();
        let lower = raw.to_lowercase();

        let intent_type = detect_intent_type(&lower);
        let time_range = extract_time_range(&lower);
        let (entities, percentiles, entities_defaulted) = extract_entities(&lower);
        let (event_types, event_type_defaulted) = extract_event_types(&lower, context);
        let filters = extract_filters(&lower);
        let group_by = extract_group_by(&lower);
        let query_type = determine_query_type(&lower, &group_by);
        let limit = extract_limit(&lower);
        let order_by = extract_order_by(&lower);
        let confidence =
            calculate_confidence(&lower, &entities, entities_defaulted, event_type_defaulted);

        let mut metadata = serde_json::Map::new();
        metadata.insert("parser_version".into(), json!("1.0"));
        if !percentiles.is_empty() {
            metadata.insert("percentiles".into(), json!(percentiles));
        }

        QueryIntent {
            intent_type,
            query_type,
            entities,
            event_types,
            filters,
            time_range,
            group_by,
            order_by,
            limit,
            confidence,
            raw_query: Some(raw),
            metadata,
        }
    }
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_intent_type(lower: &str) -> IntentType {
    let table: [(&[&str], IntentType); 8] = [
        (&["explore", "show me", "what is", "list"], IntentType::Explore),
        (&["monitor", "watch", "track", "real-time", "live"], IntentType::Monitor),
        (&["analyze", "investigate", "deep dive", "understand"], IntentType::Analyze),
        (&["compare", "versus", "vs", "difference"], IntentType::Compare),
        (&["troubleshoot", "debug", "error", "issue", "problem"], IntentType::Troubleshoot),
        (&["forecast", "predict", "trend", "projection"], IntentType::Forecast),
        (&["alert", "notify", "warn", "threshold"], IntentType::Alert),
        (&["report", "summary", "dashboard"], IntentType::Report),
    ];

    for (keywords, intent) in table {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return intent;
        }
    }
    IntentType::Explore
}

fn extract_time_range(lower: &str) -> TimeRange {
    for (pattern, range_type) in TIME_PATTERNS.iter() {
        if pattern.is_match(lower) {
            return TimeRange::of(*range_type);
        }
    }

    for pattern in [&*RELATIVE_TIME_RE, &*SINCE_AGO_RE] {
        if let Some(caps) = pattern.captures(lower) {
            let n: u64 = caps[1].parse().unwrap_or(1);
            let unit = &caps[2];
            let plural = if n > 1 { "s" } else { "" };
            return TimeRange::relative(format!("SINCE {} {}{} ago", n, unit, plural));
        }
    }

    TimeRange::of(TimeRangeType::LastHour)
}

/// Returns (entities, percentile values, whether the default entity was used)
fn extract_entities(lower: &str) -> (Vec<QueryEntity>, Vec<u64>, bool) {
    let mut entities: Vec<QueryEntity> = Vec::new();
    let mut matched_spans: Vec<(usize, usize)> = Vec::new();

    let mut push_unique = |entities: &mut Vec<QueryEntity>, entity: QueryEntity| {
        if !entities.iter().any(|e| e.name == entity.name) {
            entities.push(entity);
        }
    };

    for (phrase, field, aggregation) in METRIC_SYNONYMS {
        if let Some(pos) = lower.find(phrase) {
            matched_spans.push((pos, pos + phrase.len()));
            push_unique(&mut entities, QueryEntity::metric(field, Some(aggregation)));
        }
    }

    // Bare aggregation verb followed by a token, unless the token is
    // already covered by a synonym phrase
    for (pattern, aggregation) in VERB_RES.iter() {
        if let Some(caps) = pattern.captures(lower) {
            let group = caps.get(1).unwrap();
            let overlaps = matched_spans
                .iter()
                .any(|&(start, end)| group.start() < end && group.end() > start);
            let token = group.as_str();
            if !overlaps && !FIELD_STOPLIST.contains(&token) {
                push_unique(
                    &mut entities,
                    QueryEntity::metric(token, Some(*aggregation)),
                );
            }
        }
    }

    // Percentile requests override the first metric's aggregation
    let mut percentiles: Vec<u64> = Vec::new();
    for caps in PERCENTILE_RE.captures_iter(lower) {
        if let Ok(p) = caps[1].parse::<u64>() {
            if !percentiles.contains(&p) {
                percentiles.push(p);
            }
            if entities.is_empty()
                && let Some(field) = caps.get(2)
            {
                entities.push(QueryEntity::metric(
                    field.as_str(),
                    Some(AggregationType::Percentile),
                ));
            }
        }
    }
    if !percentiles.is_empty()
        && let Some(first) = entities.iter_mut().find(|e| e.kind == EntityKind::Metric)
    {
        first.aggregation = Some(AggregationType::Percentile);
    }

    let defaulted = entities.is_empty();
    if defaulted {
        entities.push(QueryEntity::metric("*", Some(AggregationType::Count)));
    }

    (entities, percentiles, defaulted)
}

/// Returns (event types, whether the default was used)
fn extract_event_types(lower: &str, context: Option<&QueryContext>) -> (Vec<String>, bool) {
    let mut event_types: Vec<String> = Vec::new();

    for (keyword, event_type) in EVENT_TYPE_KEYWORDS {
        if lower.contains(keyword) && !event_types.iter().any(|e| e == event_type) {
            event_types.push(event_type.to_string());
        }
    }

    if let Some(context) = context {
        for schema in &context.available_schemas {
            if lower.contains(&schema.name.to_lowercase())
                && !event_types.iter().any(|e| e == &schema.name)
            {
                event_types.push(schema.name.clone());
            }
        }
    }

    if event_types.is_empty() {
        (vec!["Transaction".to_string()], true)
    } else {
        (event_types, false)
    }
}

fn extract_filters(lower: &str) -> Vec<QueryFilter> {
    let mut filters: Vec<QueryFilter> = Vec::new();

    let mut push_unique = |filters: &mut Vec<QueryFilter>, filter: QueryFilter| {
        if !filters.iter().any(|f| {
            f.field == filter.field && f.operator == filter.operator && f.value == filter.value
        }) {
            filters.push(filter);
        }
    };

    // Symbolic comparisons: "where status > 400", "duration >= 2.5"
    for caps in WHERE_SYMBOLIC_RE.captures_iter(lower) {
        let field = caps[1].to_string();
        if FIELD_STOPLIST.contains(&field.as_str()) {
            continue;
        }
        let operator = match &caps[2] {
            ">" => FilterOperator::Gt,
            "<" => FilterOperator::Lt,
            ">=" => FilterOperator::Ge,
            "<=" => FilterOperator::Le,
            "!=" => FilterOperator::Ne,
            _ => FilterOperator::Eq,
        };
        let value = caps
            .get(3)
            .or_else(|| caps.get(4))
            .map(|m| parse_filter_value(m.as_str()))
            .unwrap_or(Value::Null);
        push_unique(&mut filters, QueryFilter::new(field, operator, value));
    }

    // "X equals Y" and "X is Y"
    for pattern in [&*EQUALS_RE, &*IS_RE] {
        for caps in pattern.captures_iter(lower) {
            let field = caps[1].to_string();
            if FIELD_STOPLIST.contains(&field.as_str()) {
                continue;
            }
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| parse_filter_value(m.as_str()))
                .unwrap_or(Value::Null);
            push_unique(&mut filters, QueryFilter::new(field, FilterOperator::Eq, value));
        }
    }

    // Spelled-out comparisons
    for caps in GREATER_RE.captures_iter(lower) {
        push_unique(
            &mut filters,
            QueryFilter::new(&caps[1], FilterOperator::Gt, parse_filter_value(&caps[2])),
        );
    }
    for caps in LESS_RE.captures_iter(lower) {
        push_unique(
            &mut filters,
            QueryFilter::new(&caps[1], FilterOperator::Lt, parse_filter_value(&caps[2])),
        );
    }

    // containing / not containing
    for caps in CONTAINING_RE.captures_iter(lower) {
        let operator = if caps.get(2).is_some() {
            FilterOperator::NotLike
        } else {
            FilterOperator::Like
        };
        let value = caps
            .get(3)
            .or_else(|| caps.get(4))
            .map(|m| Value::String(m.as_str().to_string()))
            .unwrap_or(Value::Null);
        push_unique(&mut filters, QueryFilter::new(&caps[1], operator, value));
    }

    // Application and environment references map onto appName
    if let Some(caps) = APP_RE.captures(lower) {
        push_unique(
            &mut filters,
            QueryFilter::new("appName", FilterOperator::Eq, json!(&caps[1])),
        );
    }
    if let Some(caps) = ENVIRONMENT_RE.captures(lower) {
        push_unique(
            &mut filters,
            QueryFilter::new("appName", FilterOperator::Eq, json!(&caps[1])),
        );
    }

    filters
}

fn parse_filter_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return json!(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return json!(f);
    }
    Value::String(raw.to_string())
}

fn extract_group_by(lower: &str) -> Vec<String> {
    let mut group_by: Vec<String> = Vec::new();

    if let Some(caps) = GROUP_BY_RE.captures(lower) {
        for field in caps[1].split(',') {
            let field = field.trim().to_string();
            if !field.is_empty()
                && !GROUP_STOPLIST.contains(&field.as_str())
                && !group_by.contains(&field)
            {
                group_by.push(field);
            }
        }
    }

    for pattern in FACET_INDICATOR_RES.iter() {
        if let Some(caps) = pattern.captures(lower) {
            let field = caps[1].to_string();
            if !GROUP_STOPLIST.contains(&field.as_str()) && !group_by.contains(&field) {
                group_by.push(field);
            }
        }
    }

    group_by
}

fn determine_query_type(lower: &str, group_by: &[String]) -> QueryType {
    if lower.contains("timeseries") || lower.contains("over time") || lower.contains("trend") {
        QueryType::Timeseries
    } else if lower.contains("percentile") {
        QueryType::Percentile
    } else if lower.contains("histogram") || lower.contains("distribution") {
        QueryType::Histogram
    } else if lower.contains("rate") {
        QueryType::Rate
    } else if lower.contains("compare") || lower.contains("versus") {
        QueryType::Compare
    } else if lower.contains("funnel") {
        QueryType::Funnel
    } else if !group_by.is_empty() {
        QueryType::Facet
    } else {
        QueryType::Select
    }
}

fn extract_limit(lower: &str) -> Option<u64> {
    for pattern in LIMIT_RES.iter() {
        if let Some(caps) = pattern.captures(lower) {
            return caps[1].parse().ok();
        }
    }
    None
}

fn extract_order_by(lower: &str) -> Option<OrderDirection> {
    if lower.contains("highest") || lower.contains("most") || lower.contains("descending") {
        Some(OrderDirection::Desc)
    } else if lower.contains("lowest") || lower.contains("least") || lower.contains("ascending") {
        Some(OrderDirection::Asc)
    } else {
        None
    }
}

fn calculate_confidence(
    lower: &str,
    entities: &[QueryEntity],
    entities_defaulted: bool,
    event_type_defaulted: bool,
) -> f64 {
    let mut confidence: f64 = 1.0;

    for term in VAGUE_TERMS {
        if lower.contains(term) {
            confidence *= 0.8;
        }
    }

    if entities_defaulted || entities.iter().all(|e| e.name == "*") {
        confidence *= 0.9;
    }
    if event_type_defaulted {
        confidence *= 0.95;
    }

    for term in ["select", "from", "where", "group by"] {
        if lower.contains(term) {
            confidence = (confidence * 1.1).min(1.0);
        }
    }

    confidence.clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> QueryIntent {
        IntentParser::new().parse(query, None)
    }

    #[test]
    fn test_bare_count_defaults() {
        let intent = parse("count");

        assert_eq!(intent.intent_type, IntentType::Explore);
        assert_eq!(intent.query_type, QueryType::Select);
        assert_eq!(intent.event_types, vec!["Transaction"]);
        assert_eq!(intent.entities.len(), 1);
        assert_eq!(intent.entities[0].name, "*");
        assert_eq!(intent.entities[0].aggregation, Some(AggregationType::Count));
        assert_eq!(intent.time_range.range_type, TimeRangeType::LastHour);
        assert!(intent.confidence >= 0.6 && intent.confidence <= 0.9);
    }

    #[test]
    fn test_percentile_query_parsing() {
        let intent = parse("95th percentile response time by service for production since 1 hour ago");

        assert_eq!(intent.query_type, QueryType::Percentile);
        assert_eq!(intent.entities.len(), 1);
        assert_eq!(intent.entities[0].name, "duration");
        assert_eq!(intent.entities[0].aggregation, Some(AggregationType::Percentile));
        assert_eq!(intent.metadata["percentiles"], serde_json::json!([95]));
        assert_eq!(intent.group_by, vec!["service"]);
        assert_eq!(
            intent.filters,
            vec![QueryFilter::new("appName", FilterOperator::Eq, json!("production"))]
        );
        assert_eq!(intent.time_range.to_clause(), "SINCE 1 hour ago");
    }

    #[test]
    fn test_time_range_extraction() {
        assert_eq!(parse("errors in the last week").time_range.range_type, TimeRangeType::LastWeek);
        assert_eq!(parse("what happened yesterday").time_range.range_type, TimeRangeType::LastDay);
        assert_eq!(
            parse("cpu for the last 3 days").time_range.to_clause(),
            "SINCE 3 days ago"
        );
        assert_eq!(
            parse("since 30 minutes ago").time_range.to_clause(),
            "SINCE 30 minutes ago"
        );
    }

    #[test]
    fn test_filters_symbolic_and_spelled() {
        let intent = parse("show transactions where duration > 1000 and status equals 'failed'");
        assert!(intent.filters.contains(&QueryFilter::new(
            "duration",
            FilterOperator::Gt,
            json!(1000)
        )));
        assert!(intent.filters.contains(&QueryFilter::new(
            "status",
            FilterOperator::Eq,
            json!("failed")
        )));
    }

    #[test]
    fn test_group_by_and_facet() {
        let intent = parse("average response time by service");
        assert_eq!(intent.query_type, QueryType::Facet);
        assert_eq!(intent.group_by, vec!["service"]);
    }

    #[test]
    fn test_vague_terms_reduce_confidence() {
        let precise = parse("count of transactions from service checkout");
        let vague = parse("show me something about stuff");
        assert!(vague.confidence < precise.confidence);
    }

    #[test]
    fn test_intent_type_keywords() {
        assert_eq!(parse("troubleshoot the checkout issue").intent_type, IntentType::Troubleshoot);
        assert_eq!(parse("compare cpu versus memory").intent_type, IntentType::Compare);
        assert_eq!(parse("alert when latency exceeds limit").intent_type, IntentType::Alert);
    }

    #[test]
    fn test_limit_and_order() {
        let intent = parse("top 10 services with the highest error count");
        assert_eq!(intent.limit, Some(10));
        assert_eq!(intent.order_by, Some(OrderDirection::Desc));
    }

    #[test]
    fn test_event_type_from_context_schema() {
        let context = QueryContext {
            available_schemas: vec![super::super::models::SchemaInfo {
                name: "CustomEvent".to_string(),
                ..Default::default()
            }],
            ..QueryContext::default()
        };
        let intent = IntentParser::new().parse("count customevent entries", Some(&context));
        assert!(intent.event_types.iter().any(|e| e == "CustomEvent"));
    }
}
