use std::{error::Error, path::Path};

use chrono::NaiveDateTime;
use plotters::{
    chart::ChartBuilder,
    coord::Shift,
    drawing::{DrawingArea, DrawingAreaErrorKind},
    prelude::{BitMapBackend, DrawingBackend, IntoDrawingArea},
    series::{AreaSeries, LineSeries},
    style::{Color, IntoFont, RGBColor, ShapeStyle},
};
use serde::{Deserialize, Serialize};

use super::{
    theme::plotters_colors as theme,
    utils::{cumulative, legend_rect, padded_range, LegendConfig},
};
use crate::constants::charts::TRAJECTORY_DIMS;

/// Trading trajectory of one pair over the trading period: both legs' log
/// prices, the position taken at each step and the realized returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFigure {
    pub env_name: String,
    pub dates: Vec<NaiveDateTime>,
    pub asset_names: [String; 2],
    pub x_log_prices: Vec<f64>,
    pub y_log_prices: Vec<f64>,
    pub actions: Vec<f64>,
    pub returns: Vec<f64>,
    /// PNG drawn by the environment itself. Sinks prefer it over `render_png`.
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
}

impl TrajectoryFigure {
    pub fn dims(&self) -> (u32, u32) {
        TRAJECTORY_DIMS
    }

    pub fn title(&self) -> String {
        let date = |date: Option<&NaiveDateTime>| {
            date.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        format!(
            "{} {}-{} ({} - {})",
            self.env_name,
            self.asset_names[0],
            self.asset_names[1],
            date(self.dates.first()),
            date(self.dates.last()),
        )
    }

    fn steps(&self) -> usize {
        [
            self.dates.len(),
            self.x_log_prices.len(),
            self.y_log_prices.len(),
            self.actions.len(),
            self.returns.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
        .max(1)
    }

    pub fn render_png(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let root = BitMapBackend::new(path, self.dims()).into_drawing_area();
        self.draw(&root)?;
        root.present()?;
        Ok(())
    }

    /// Renders into a packed RGB buffer, row-major, `dims()` sized.
    pub fn render_rgb(&self) -> Result<Vec<u8>, Box<dyn Error>> {
        let (width, height) = self.dims();
        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            self.draw(&root)?;
            root.present()?;
        }
        Ok(buffer)
    }

    fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
    ) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        root.fill(&theme::BASE)?;
        let root = root.titled(
            &self.title(),
            ("sans-serif", 22).into_font().color(&theme::TEXT),
        )?;
        let panels = root.split_evenly((3, 1));

        let x_max = self.steps() as u32;
        let date_label = |x: &u32| {
            self.dates
                .get(*x as usize)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };

        self.draw_lines(
            &panels[0],
            "log price",
            x_max,
            &date_label,
            &[
                (self.asset_names[0].as_str(), &self.x_log_prices, theme::BLUE),
                (self.asset_names[1].as_str(), &self.y_log_prices, theme::PEACH),
            ],
        )?;
        self.draw_lines(
            &panels[1],
            "action",
            x_max,
            &date_label,
            &[("action", &self.actions, theme::MAUVE)],
        )?;

        let cumulative_returns = cumulative(&self.returns);
        let mut chart = ChartBuilder::on(&panels[2])
            .caption("cumulative return", ("sans-serif", 18, &theme::TEXT))
            .margin(5)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(0..x_max, padded_range(&cumulative_returns))?;
        chart
            .configure_mesh()
            .label_style(("sans-serif", 15, &theme::TEXT))
            .axis_style(theme::SURFACE1)
            .light_line_style(theme::SURFACE0)
            .x_label_formatter(&date_label)
            .draw()?;
        chart.draw_series(
            AreaSeries::new(
                cumulative_returns
                    .iter()
                    .enumerate()
                    .map(|(index, value)| (index as u32, *value)),
                0.0,
                theme::GREEN.mix(0.2),
            )
            .border_style(ShapeStyle::from(&theme::GREEN).stroke_width(1)),
        )?;

        Ok(())
    }

    fn draw_lines<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        caption: &str,
        x_max: u32,
        date_label: &dyn Fn(&u32) -> String,
        series: &[(&str, &Vec<f64>, RGBColor)],
    ) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        let mut chart = ChartBuilder::on(area)
            .caption(caption, ("sans-serif", 18, &theme::TEXT))
            .margin(5)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(
                0..x_max,
                padded_range(series.iter().flat_map(|(_, values, _)| values.iter())),
            )?;
        chart
            .configure_mesh()
            .label_style(("sans-serif", 15, &theme::TEXT))
            .axis_style(theme::SURFACE1)
            .light_line_style(theme::SURFACE0)
            .x_label_formatter(date_label)
            .draw()?;

        for (label, values, color) in series {
            chart
                .draw_series(LineSeries::new(
                    values
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.is_finite())
                        .map(|(index, v)| (index as u32, *v)),
                    ShapeStyle::from(color).stroke_width(2),
                ))?
                .label(*label)
                .legend(legend_rect(*color));
        }

        chart
            .configure_series_labels()
            .position(LegendConfig::position())
            .background_style(LegendConfig::background())
            .border_style(LegendConfig::border())
            .label_font(LegendConfig::font())
            .draw()?;

        Ok(())
    }
}
