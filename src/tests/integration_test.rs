//! Cross-engine integration scenarios

use serde_json::{Value, json};
use std::sync::Arc;

use crate::services::frame::Frame;
use crate::services::patterns::{PatternEngine, PatternEngineConfig};
use crate::services::query::{QueryContext, QueryGenerator, SchemaInfo};
use crate::services::visualization::{
    ChartRecommender, LayoutOptimizer, LayoutStrategy, ShapeAnalyzer, Widget, WidgetPriority,
};
use crate::utils::paginate;

/// Operational telemetry: hourly latency and throughput per service
fn telemetry_rows() -> Vec<Value> {
    (0..144)
        .map(|i| {
            json!({
                "timestamp": format!("2024-02-{:02} {:02}:00:00", 1 + i / 24, i % 24),
                "latency": 80.0
                    + 25.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).sin()
                    + (i % 5) as f64,
                "throughput": 1500.0
                    - 200.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).sin()
                    + (i % 7) as f64 * 3.0,
                "service": (["checkout", "search", "auth"][i % 3]),
            })
        })
        .collect()
}

#[tokio::test]
async fn test_frame_to_dashboard_pipeline() {
    let frame = Frame::from_json(&json!(telemetry_rows())).unwrap();

    // Patterns over the frame
    let engine = PatternEngine::new(PatternEngineConfig::default());
    let report = engine.analyze(Arc::new(frame.clone()), None, None, None).await;
    assert!(!report.patterns.is_empty());
    assert!(report.metadata.detectors_used.len() >= 3);

    // Shape and chart recommendations over the same frame
    let shape = ShapeAnalyzer::default().analyze(&frame, None);
    assert!(shape.has_time_series);
    let recommendations = ChartRecommender::default().recommend(&shape, None);
    assert!(!recommendations.is_empty());

    // Widgets from the recommendations, laid out on a dashboard
    let widgets: Vec<Widget> = recommendations
        .iter()
        .enumerate()
        .map(|(i, rec)| Widget {
            id: format!("w{}", i),
            title: format!("{:?}", rec.chart_type),
            chart_type: rec.chart_type,
            data_query: "SELECT average(latency) FROM Transaction TIMESERIES".to_string(),
            size: None,
            position: None,
            priority: WidgetPriority::Medium,
            related_widgets: vec![],
            min_size: None,
            max_size: None,
            fixed_position: false,
        })
        .collect();

    let layout = LayoutOptimizer::default().optimize(&widgets, None, LayoutStrategy::Grid);
    assert_eq!(layout.placements.len(), widgets.len());
    for (i, a) in layout.placements.iter().enumerate() {
        for b in layout.placements.iter().skip(i + 1) {
            assert!(!a.overlaps(b));
        }
    }
}

#[tokio::test]
async fn test_shape_feeds_query_context() {
    let frame = Frame::from_json(&json!(telemetry_rows())).unwrap();
    let shape = ShapeAnalyzer::default().analyze(&frame, None);

    // A schema derived from the analyzed shape steers generation
    let context = QueryContext {
        available_schemas: vec![SchemaInfo {
            name: "Transaction".to_string(),
            records_per_hour: Some(50_000.0),
            common_facets: shape.primary_dimensions.clone(),
            attributes: shape.primary_metrics.clone(),
        }],
        ..QueryContext::default()
    };

    let generator = QueryGenerator::default();
    let result = generator.generate("show transactions for the last day", Some(&context));

    assert!(result.estimated_cost.is_some());
    // The facet alternative comes from the shape's primary dimension
    assert!(
        result
            .alternatives
            .iter()
            .any(|alt| alt.contains("FACET service")),
        "alternatives: {:?}",
        result.alternatives
    );
}

#[test]
fn test_paginate_roundtrip_property() {
    for (len, size) in [(0usize, 5usize), (1, 1), (7, 3), (20, 5), (21, 5), (100, 7)] {
        let items: Vec<usize> = (0..len).collect();
        let mut collected = Vec::new();
        let mut page_number = 1;

        loop {
            let page = paginate(&items, page_number, size);
            collected.extend(page.items.iter().copied());

            let last_page = len.div_ceil(size).max(0);
            if page_number >= last_page {
                assert!(!page.has_next, "len={} size={} page={}", len, size, page_number);
            } else {
                assert!(page.has_next);
            }

            if !page.has_next {
                break;
            }
            page_number += 1;
        }

        assert_eq!(collected, items, "len={} size={}", len, size);
    }
}

#[tokio::test]
async fn test_engine_metrics_accumulate() {
    let engine = PatternEngine::new(PatternEngineConfig::default());
    let frame = Arc::new(Frame::from_json(&json!(telemetry_rows())).unwrap());

    engine.analyze(frame.clone(), None, None, None).await;
    engine.analyze(frame, None, None, None).await;

    let metrics = engine.metrics();
    assert_eq!(metrics["total_detections"], json!(1));
    assert_eq!(metrics["cache_hits"], json!(1));
    assert_eq!(metrics["cache_size"], json!(1));
}
