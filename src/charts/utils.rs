use std::ops::Range;

use plotters::{prelude::SeriesLabelPosition, style::Color};

use super::theme::plotters_colors as theme;

pub struct LegendConfig;

impl LegendConfig {
    pub fn position() -> SeriesLabelPosition {
        SeriesLabelPosition::UpperRight
    }

    pub fn background() -> plotters::style::RGBAColor {
        theme::SURFACE0.mix(0.7)
    }

    pub fn border() -> &'static plotters::style::RGBColor {
        &theme::SURFACE1
    }

    pub fn font() -> (&'static str, i32, &'static plotters::style::RGBColor) {
        ("sans-serif", 14, &theme::TEXT)
    }
}

pub fn legend_rect(
    color: plotters::style::RGBColor,
) -> impl Fn((i32, i32)) -> plotters::element::Rectangle<(i32, i32)> {
    move |(x, y)| {
        plotters::element::Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.mix(0.8).filled())
    }
}

/// Value range of every finite value, padded by 5% on each side.
pub fn padded_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> Range<f64> {
    let (y_min, y_max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
            (min.min(*v), max.max(*v))
        });
    if y_min > y_max {
        return 0.0..1.0;
    }

    let y_range = (y_max - y_min).max(0.01);
    (y_min - y_range * 0.05)..(y_max + y_range * 0.05)
}

/// Running sum of `values`.
pub fn cumulative(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |total, value| {
            *total += value;
            Some(*total)
        })
        .collect()
}
