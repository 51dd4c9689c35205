//! Dashboard layout optimizer
//!
//! Places widgets on an integer grid under one of five strategies and
//! scores the result: space utilization, visual balance, relationship
//! proximity and a weighted overall score, all in [0, 1].

use std::collections::HashMap;
use std::time::Instant;

use super::models::{
    ChartType, DashboardLayout, LayoutConstraints, LayoutStrategy, Widget, WidgetPlacement,
    WidgetSize,
};

#[derive(Debug, Clone)]
pub struct LayoutOptimizerConfig {
    pub default_grid_columns: usize,
}

impl Default for LayoutOptimizerConfig {
    fn default() -> Self {
        Self { default_grid_columns: 4 }
    }
}

pub struct LayoutOptimizer {
    config: LayoutOptimizerConfig,
}

impl LayoutOptimizer {
    pub fn new(config: LayoutOptimizerConfig) -> Self {
        Self { config }
    }

    pub fn optimize(
        &self,
        widgets: &[Widget],
        constraints: Option<&LayoutConstraints>,
        strategy: LayoutStrategy,
    ) -> DashboardLayout {
        let start = Instant::now();
        let default_constraints = LayoutConstraints::default();
        let constraints = constraints.unwrap_or(&default_constraints);

        tracing::info!(
            "Optimizing layout for {} widgets using {:?} strategy",
            widgets.len(),
            strategy
        );

        if widgets.is_empty() {
            return DashboardLayout {
                strategy,
                grid_columns: self.config.default_grid_columns,
                grid_rows: 0,
                placements: Vec::new(),
                space_utilization: 0.0,
                visual_balance: 0.0,
                relationship_score: 0.0,
                overall_score: 0.0,
                optimization_time: start.elapsed().as_secs_f64(),
            };
        }

        // Priority descending, input order on ties
        let mut sorted: Vec<&Widget> = widgets.iter().collect();
        sorted.sort_by(|a, b| b.priority.value().cmp(&a.priority.value()));

        let mut layout = match strategy {
            LayoutStrategy::Grid => self.grid_layout(&sorted, constraints),
            LayoutStrategy::Masonry => self.masonry_layout(&sorted, constraints),
            LayoutStrategy::Flow => self.flow_layout(&sorted, constraints),
            LayoutStrategy::Fixed => self.fixed_layout(&sorted, constraints),
            LayoutStrategy::Responsive => self.responsive_layout(&sorted, constraints),
        };
        layout.strategy = strategy;

        calculate_metrics(&mut layout, widgets);
        layout.optimization_time = start.elapsed().as_secs_f64();
        layout
    }

    fn grid_columns(&self, constraints: &LayoutConstraints) -> usize {
        self.config.default_grid_columns.min(constraints.max_columns).max(1)
    }

    fn grid_layout(&self, widgets: &[&Widget], constraints: &LayoutConstraints) -> DashboardLayout {
        let columns = self.grid_columns(constraints);
        let mut grid = Occupancy::new(constraints.max_rows, columns);
        let mut placements = Vec::new();

        for widget in widgets {
            let size = widget_size(widget);
            match grid.first_fit(size.width(), size.height()) {
                Some((x, y)) => {
                    grid.occupy(x, y, size.width(), size.height());
                    placements.push(WidgetPlacement::new(
                        &widget.id,
                        x,
                        y,
                        size.width(),
                        size.height(),
                    ));
                },
                None => tracing::warn!("Could not place widget {}", widget.id),
            }
        }

        DashboardLayout {
            strategy: LayoutStrategy::Grid,
            grid_columns: columns,
            grid_rows: used_rows(&placements),
            placements,
            space_utilization: 0.0,
            visual_balance: 0.0,
            relationship_score: 0.0,
            overall_score: 0.0,
            optimization_time: 0.0,
        }
    }

    fn masonry_layout(
        &self,
        widgets: &[&Widget],
        constraints: &LayoutConstraints,
    ) -> DashboardLayout {
        let columns = self.grid_columns(constraints);
        let mut column_heights = vec![0usize; columns];
        let mut placements = Vec::new();

        for widget in widgets {
            let size = masonry_size(widget, columns);
            let width = size.width().min(columns);
            let height = size.height();

            let (x, y) = if width == 1 {
                // Shortest column wins, leftmost on ties
                let col = column_heights
                    .iter()
                    .enumerate()
                    .min_by_key(|&(i, &h)| (h, i))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                (col, column_heights[col])
            } else {
                // Start column minimizing the max spanned height
                let mut best = (0usize, usize::MAX);
                for start in 0..=(columns - width) {
                    let spanned_max =
                        *column_heights[start..start + width].iter().max().unwrap_or(&0);
                    if spanned_max < best.1 {
                        best = (start, spanned_max);
                    }
                }
                best
            };

            for col in x..x + width {
                column_heights[col] = y + height;
            }
            placements.push(WidgetPlacement::new(&widget.id, x, y, width, height));
        }

        DashboardLayout {
            strategy: LayoutStrategy::Masonry,
            grid_columns: columns,
            grid_rows: column_heights.iter().copied().max().unwrap_or(0),
            placements,
            space_utilization: 0.0,
            visual_balance: 0.0,
            relationship_score: 0.0,
            overall_score: 0.0,
            optimization_time: 0.0,
        }
    }

    fn flow_layout(&self, widgets: &[&Widget], constraints: &LayoutConstraints) -> DashboardLayout {
        let columns = self.grid_columns(constraints);
        let mut placements = Vec::new();
        let (mut x, mut y) = (0usize, 0usize);
        let mut row_height = 0usize;

        for widget in widgets {
            let size = widget_size(widget);
            let width = size.width().min(columns);
            let height = size.height();

            if x + width > columns {
                x = 0;
                y += row_height;
                row_height = 0;
            }

            placements.push(WidgetPlacement::new(&widget.id, x, y, width, height));
            x += width;
            row_height = row_height.max(height);
        }

        DashboardLayout {
            strategy: LayoutStrategy::Flow,
            grid_columns: columns,
            grid_rows: y + row_height,
            placements,
            space_utilization: 0.0,
            visual_balance: 0.0,
            relationship_score: 0.0,
            overall_score: 0.0,
            optimization_time: 0.0,
        }
    }

    fn fixed_layout(
        &self,
        widgets: &[&Widget],
        constraints: &LayoutConstraints,
    ) -> DashboardLayout {
        let columns = self.grid_columns(constraints);
        let mut grid = Occupancy::new(constraints.max_rows, columns);
        let mut placements = Vec::new();
        let mut floating: Vec<&Widget> = Vec::new();

        for widget in widgets {
            let size = widget_size(widget);
            match (widget.fixed_position, widget.position) {
                (true, Some((x, y)))
                    if grid.is_free(x, y, size.width(), size.height()) =>
                {
                    grid.occupy(x, y, size.width(), size.height());
                    placements.push(WidgetPlacement::new(
                        &widget.id,
                        x,
                        y,
                        size.width(),
                        size.height(),
                    ));
                },
                (true, Some(_)) => {
                    tracing::warn!(
                        "Fixed position of widget {} conflicts; placing it dynamically",
                        widget.id
                    );
                    floating.push(widget);
                },
                _ => floating.push(widget),
            }
        }

        for widget in floating {
            let size = widget_size(widget);
            if let Some((x, y)) = grid.first_fit(size.width(), size.height()) {
                grid.occupy(x, y, size.width(), size.height());
                placements.push(WidgetPlacement::new(
                    &widget.id,
                    x,
                    y,
                    size.width(),
                    size.height(),
                ));
            } else {
                tracing::warn!("Could not place widget {}", widget.id);
            }
        }

        DashboardLayout {
            strategy: LayoutStrategy::Fixed,
            grid_columns: columns,
            grid_rows: used_rows(&placements),
            placements,
            space_utilization: 0.0,
            visual_balance: 0.0,
            relationship_score: 0.0,
            overall_score: 0.0,
            optimization_time: 0.0,
        }
    }

    fn responsive_layout(
        &self,
        widgets: &[&Widget],
        constraints: &LayoutConstraints,
    ) -> DashboardLayout {
        let mut layout = self.grid_layout(widgets, constraints);
        layout.strategy = LayoutStrategy::Responsive;

        if constraints.mobile_friendly {
            // Single-column stack; anything wider shrinks to one cell
            layout.grid_columns = 1;
            let mut y = 0;
            for placement in layout.placements.iter_mut() {
                if placement.size.width > 1 {
                    placement.size.width = 1;
                    placement.size.height = 1;
                }
                placement.position.x = 0;
                placement.position.y = y;
                y += placement.size.height;
            }
            layout.grid_rows = y;
        } else if constraints.tablet_friendly {
            layout.grid_columns = layout.grid_columns.min(2);
            for placement in layout.placements.iter_mut() {
                if placement.size.width > 2 {
                    placement.size.width = 2;
                    placement.size.height = 1;
                }
            }
            // Re-place on the narrower grid to keep placements in bounds
            let mut grid = Occupancy::new(constraints.max_rows, layout.grid_columns);
            for placement in layout.placements.iter_mut() {
                if let Some((x, y)) = grid.first_fit(placement.size.width, placement.size.height) {
                    grid.occupy(x, y, placement.size.width, placement.size.height);
                    placement.position.x = x;
                    placement.position.y = y;
                }
            }
            layout.grid_rows = used_rows(&layout.placements);
        }

        layout
    }

    /// Rule-driven diagnostics for an existing layout
    pub fn suggest_improvements(&self, layout: &DashboardLayout) -> Vec<String> {
        let mut suggestions = Vec::new();

        if layout.space_utilization < 0.6 {
            suggestions
                .push("Consider using larger widget sizes to better utilize space".to_string());
        } else if layout.space_utilization > 0.9 {
            suggestions
                .push("Layout may be too dense - consider spacing widgets more".to_string());
        }
        if layout.visual_balance < 0.7 {
            suggestions.push(
                "Layout appears unbalanced - try distributing widgets more evenly".to_string(),
            );
        }
        if layout.relationship_score < 0.5 {
            suggestions
                .push("Related widgets are far apart - consider grouping them".to_string());
        }
        if layout.grid_rows > 10 {
            suggestions.push(
                "Dashboard is very tall - consider using wider widgets or multiple pages"
                    .to_string(),
            );
        }
        if layout.strategy == LayoutStrategy::Grid && layout.space_utilization < 0.7 {
            suggestions
                .push("Consider using masonry layout for better space utilization".to_string());
        }

        suggestions
    }
}

impl Default for LayoutOptimizer {
    fn default() -> Self {
        Self::new(LayoutOptimizerConfig::default())
    }
}

/// Cell occupancy for first-fit placement
struct Occupancy {
    rows: usize,
    columns: usize,
    cells: Vec<bool>,
}

impl Occupancy {
    fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns, cells: vec![false; rows * columns] }
    }

    fn is_free(&self, x: usize, y: usize, width: usize, height: usize) -> bool {
        if x + width > self.columns || y + height > self.rows {
            return false;
        }
        for row in y..y + height {
            for col in x..x + width {
                if self.cells[row * self.columns + col] {
                    return false;
                }
            }
        }
        true
    }

    fn occupy(&mut self, x: usize, y: usize, width: usize, height: usize) {
        for row in y..(y + height).min(self.rows) {
            for col in x..(x + width).min(self.columns) {
                self.cells[row * self.columns + col] = true;
            }
        }
    }

    /// Scan rows top-to-bottom, columns left-to-right
    fn first_fit(&self, width: usize, height: usize) -> Option<(usize, usize)> {
        if width > self.columns || height > self.rows {
            return None;
        }
        for y in 0..=(self.rows - height) {
            for x in 0..=(self.columns - width) {
                if self.is_free(x, y, width, height) {
                    return Some((x, y));
                }
            }
        }
        None
    }
}

/// Chart-type default sizes, overridden by an explicit widget size and
/// clamped by min/max constraints
fn widget_size(widget: &Widget) -> WidgetSize {
    if let Some(size) = widget.size {
        return size;
    }

    let mut size = match widget.chart_type {
        ChartType::Line
        | ChartType::TimeseriesLine
        | ChartType::TimeseriesArea
        | ChartType::TimeseriesStacked
        | ChartType::Area
        | ChartType::Heatmap
        | ChartType::Scatter => WidgetSize::Large,
        ChartType::Bar
        | ChartType::StackedBar
        | ChartType::Pie
        | ChartType::Histogram
        | ChartType::BoxPlot
        | ChartType::Violin => WidgetSize::Medium,
        ChartType::Billboard | ChartType::Gauge | ChartType::Sparkline | ChartType::Bullet => {
            WidgetSize::Small
        },
        ChartType::Table => WidgetSize::Wide,
        ChartType::Funnel | ChartType::Markdown => WidgetSize::Medium,
    };

    if let Some(min) = widget.min_size
        && size.area() < min.area()
    {
        size = min;
    }
    if let Some(max) = widget.max_size
        && size.area() > max.area()
    {
        size = max;
    }
    size
}

/// Masonry prefers consistent widths per column count
fn masonry_size(widget: &Widget, columns: usize) -> WidgetSize {
    match columns {
        4 => match widget.chart_type {
            ChartType::Table | ChartType::Heatmap => WidgetSize::Wide,
            ChartType::Billboard | ChartType::Gauge | ChartType::Sparkline => WidgetSize::Small,
            _ => WidgetSize::Medium,
        },
        3 => match widget.chart_type {
            ChartType::Table => WidgetSize::Wide,
            _ => WidgetSize::Small,
        },
        _ => WidgetSize::Small,
    }
}

fn used_rows(placements: &[WidgetPlacement]) -> usize {
    placements
        .iter()
        .map(|p| p.position.y + p.size.height)
        .max()
        .unwrap_or(0)
}

fn calculate_metrics(layout: &mut DashboardLayout, widgets: &[Widget]) {
    if layout.placements.is_empty() {
        return;
    }

    let total_cells = (layout.grid_columns * layout.grid_rows).max(1);
    let used_cells: usize = layout
        .placements
        .iter()
        .map(|p| p.size.width * p.size.height)
        .sum();
    layout.space_utilization = used_cells as f64 / total_cells as f64;

    layout.visual_balance = visual_balance(layout);
    layout.relationship_score = relationship_score(layout, widgets);
    layout.overall_score = 0.3 * layout.space_utilization
        + 0.3 * layout.visual_balance
        + 0.4 * layout.relationship_score;
}

/// 1 minus the normalized distance between the area-weighted center of
/// mass and the grid center
fn visual_balance(layout: &DashboardLayout) -> f64 {
    let mut total_weight = 0.0;
    let mut weighted_x = 0.0;
    let mut weighted_y = 0.0;

    for placement in &layout.placements {
        let cx = placement.position.x as f64 + placement.size.width as f64 / 2.0;
        let cy = placement.position.y as f64 + placement.size.height as f64 / 2.0;
        let weight = (placement.size.width * placement.size.height) as f64;
        weighted_x += cx * weight;
        weighted_y += cy * weight;
        total_weight += weight;
    }
    if total_weight == 0.0 {
        return 0.0;
    }

    let com_x = weighted_x / total_weight;
    let com_y = weighted_y / total_weight;
    let center_x = layout.grid_columns as f64 / 2.0;
    let center_y = layout.grid_rows as f64 / 2.0;

    let distance = ((com_x - center_x).powi(2) + (com_y - center_y).powi(2)).sqrt();
    let max_distance = (center_x.powi(2) + center_y.powi(2)).sqrt();

    if max_distance > 0.0 { (1.0 - distance / max_distance).clamp(0.0, 1.0) } else { 1.0 }
}

/// Fraction of declared related pairs within Manhattan distance 2;
/// 1.0 when no relationships are declared
fn relationship_score(layout: &DashboardLayout, widgets: &[Widget]) -> f64 {
    let positions: HashMap<&str, (usize, usize)> = layout
        .placements
        .iter()
        .map(|p| (p.widget_id.as_str(), (p.position.x, p.position.y)))
        .collect();

    let mut total = 0usize;
    let mut close = 0usize;

    for widget in widgets {
        let Some(&(x, y)) = positions.get(widget.id.as_str()) else {
            continue;
        };
        for related in &widget.related_widgets {
            let Some(&(rx, ry)) = positions.get(related.as_str()) else {
                continue;
            };
            total += 1;
            let distance = x.abs_diff(rx) + y.abs_diff(ry);
            if distance <= 2 {
                close += 1;
            }
        }
    }

    if total == 0 { 1.0 } else { close as f64 / total as f64 }
}
