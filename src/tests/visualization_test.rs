//! End-to-end visualization scenarios

use serde_json::{Value, json};

use crate::services::frame::Frame;
use crate::services::visualization::{
    ChartRecommender, ChartType, DashboardLayout, LayoutConstraints, LayoutOptimizer,
    LayoutStrategy, ShapeAnalyzer, Widget, WidgetPriority, WidgetSize,
};

fn widget(id: &str, chart_type: ChartType, size: WidgetSize, priority: WidgetPriority) -> Widget {
    Widget {
        id: id.to_string(),
        title: id.to_string(),
        chart_type,
        data_query: "SELECT count(*) FROM Transaction".to_string(),
        size: Some(size),
        position: None,
        priority,
        related_widgets: vec![],
        min_size: None,
        max_size: None,
        fixed_position: false,
    }
}

fn assert_layout_invariants(layout: &DashboardLayout) {
    for (i, a) in layout.placements.iter().enumerate() {
        assert!(
            a.position.x + a.size.width <= layout.grid_columns,
            "{} exceeds grid width",
            a.widget_id
        );
        assert!(
            a.position.y + a.size.height <= layout.grid_rows,
            "{} exceeds grid height",
            a.widget_id
        );
        for b in layout.placements.iter().skip(i + 1) {
            assert!(!a.overlaps(b), "{} overlaps {}", a.widget_id, b.widget_id);
        }
    }
    for score in [
        layout.space_utilization,
        layout.visual_balance,
        layout.relationship_score,
        layout.overall_score,
    ] {
        assert!((0.0..=1.0).contains(&score), "score {} out of [0,1]", score);
    }
}

#[test]
fn test_grid_placement_scenario() {
    let widgets = vec![
        widget("w1", ChartType::TimeseriesLine, WidgetSize::Large, WidgetPriority::Critical),
        widget("w2", ChartType::Billboard, WidgetSize::Small, WidgetPriority::Medium),
        widget("w3", ChartType::Billboard, WidgetSize::Small, WidgetPriority::Medium),
        widget("w4", ChartType::Billboard, WidgetSize::Small, WidgetPriority::Medium),
        widget("w5", ChartType::Billboard, WidgetSize::Small, WidgetPriority::Medium),
    ];
    let constraints = LayoutConstraints { max_columns: 4, ..LayoutConstraints::default() };
    let layout =
        LayoutOptimizer::default().optimize(&widgets, Some(&constraints), LayoutStrategy::Grid);

    let expected = [("w1", 0, 0), ("w2", 2, 0), ("w3", 3, 0), ("w4", 2, 1), ("w5", 3, 1)];
    for (id, x, y) in expected {
        let placement = layout
            .placements
            .iter()
            .find(|p| p.widget_id == id)
            .unwrap_or_else(|| panic!("{} not placed", id));
        assert_eq!((placement.position.x, placement.position.y), (x, y), "widget {}", id);
    }
    assert_eq!(layout.grid_rows, 2);
    assert!((layout.space_utilization - 1.0).abs() < 1e-9);
    assert_layout_invariants(&layout);
}

#[test]
fn test_every_strategy_produces_valid_layout() {
    let widgets: Vec<Widget> = vec![
        widget("a", ChartType::TimeseriesLine, WidgetSize::Large, WidgetPriority::Critical),
        widget("b", ChartType::Table, WidgetSize::Wide, WidgetPriority::High),
        widget("c", ChartType::Bar, WidgetSize::Medium, WidgetPriority::Medium),
        widget("d", ChartType::Billboard, WidgetSize::Small, WidgetPriority::Medium),
        widget("e", ChartType::Pie, WidgetSize::Medium, WidgetPriority::Low),
        widget("f", ChartType::Gauge, WidgetSize::Small, WidgetPriority::Optional),
    ];

    for strategy in [
        LayoutStrategy::Grid,
        LayoutStrategy::Masonry,
        LayoutStrategy::Flow,
        LayoutStrategy::Fixed,
        LayoutStrategy::Responsive,
    ] {
        let layout = LayoutOptimizer::default().optimize(&widgets, None, strategy);
        assert_eq!(layout.strategy, strategy);
        assert_eq!(layout.placements.len(), widgets.len());
        assert_layout_invariants(&layout);

        // Every placement references an input widget exactly once
        for placement in &layout.placements {
            assert_eq!(
                widgets.iter().filter(|w| w.id == placement.widget_id).count(),
                1
            );
        }
    }
}

#[test]
fn test_shape_to_recommendation_pipeline() {
    let rows: Vec<Value> = (0..120)
        .map(|i| {
            json!({
                "timestamp": format!("2024-03-01 {:02}:{:02}:00", (i / 60) % 24, i % 60),
                "latency": 120.0 + (i % 11) as f64 * 6.0,
            })
        })
        .collect();
    let frame = Frame::from_json(&json!(rows)).unwrap();

    let shape = ShapeAnalyzer::default().analyze(&frame, None);
    assert!(shape.has_time_series);
    assert_eq!(shape.primary_metrics, vec!["latency"]);

    let recommendations = ChartRecommender::default().recommend(&shape, None);
    assert!(!recommendations.is_empty());
    assert!(recommendations.len() <= 5);
    for rec in &recommendations {
        assert!((0.1..=0.99).contains(&rec.confidence));
    }
    // A single metric over time: the trend rule leads with a time chart
    assert!(matches!(
        recommendations[0].chart_type,
        ChartType::TimeseriesLine | ChartType::TimeseriesArea
    ));
    assert_eq!(recommendations[0].x_axis.as_deref(), Some("timestamp"));
}

#[test]
fn test_related_widgets_scored() {
    let mut a = widget("errors", ChartType::Billboard, WidgetSize::Small, WidgetPriority::High);
    a.related_widgets = vec!["error_trend".to_string()];
    let b = widget(
        "error_trend",
        ChartType::TimeseriesLine,
        WidgetSize::Large,
        WidgetPriority::High,
    );

    let layout = LayoutOptimizer::default().optimize(&[a, b], None, LayoutStrategy::Grid);
    assert!(layout.relationship_score > 0.99);
    assert_layout_invariants(&layout);
}

#[test]
fn test_layout_suggestions_for_sparse_grid() {
    let widgets =
        vec![widget("lonely", ChartType::Billboard, WidgetSize::Small, WidgetPriority::Low)];
    let optimizer = LayoutOptimizer::default();
    let layout = optimizer.optimize(&widgets, None, LayoutStrategy::Grid);

    let suggestions = optimizer.suggest_improvements(&layout);
    assert!(suggestions.iter().any(|s| s.contains("larger widget sizes")));
    assert!(suggestions.iter().any(|s| s.contains("masonry")));
}
