use crate::error::{Result, RndError};
use crate::models::{DensitySlice, DensitySurface, PriceSeries};
use crate::qualifiers::{Placement, QualifierOutput};
use plotters::backend::BitMapBackend;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 900;

fn plot_err<E: std::fmt::Display>(e: E) -> RndError {
    RndError::PlotError(e.to_string())
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Pad a range so flat data still gets a drawable axis
fn padded(lo: f64, hi: f64, frac: f64) -> (f64, f64) {
    let span = hi - lo;
    if span > 0.0 {
        (lo - frac * span, hi + frac * span)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

/// Density against strike for a single expiry, written as PNG.
pub fn plot_density_slice<P: AsRef<Path>>(slice: &DensitySlice, output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    if slice.is_empty() {
        return Err(RndError::PlotError(format!(
            "No density points for {} {}",
            slice.symbol, slice.expiry
        )));
    }

    let points: Vec<(f64, f64)> = slice.points.iter().map(|p| (p.strike, p.density)).collect();
    let (k_lo, k_hi) = bounds(points.iter().map(|p| p.0))
        .ok_or_else(|| RndError::PlotError("Non-finite strikes".to_string()))?;
    let d_hi = bounds(points.iter().map(|p| p.1)).map_or(1.0, |(_, hi)| hi);
    let (k_lo, k_hi) = padded(k_lo, k_hi, 0.05);
    let d_hi = if d_hi > 0.0 { d_hi * 1.1 } else { 1.0 };

    let root = BitMapBackend::new(output_path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{} Risk-Neutral Density - {}", slice.symbol, slice.expiry),
            ("sans-serif", 30).into_font(),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(k_lo..k_hi, 0.0..d_hi)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Strike")
        .y_desc("Density")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
        .map_err(plot_err)?;
    chart
        .draw_series(points.iter().map(|&(k, d)| Circle::new((k, d), 3, BLUE.filled())))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Density slice plot written to {}", output_path.display());
    Ok(())
}

/// Expiry × strike heatmap of the surface, viridis-coloured, with a colour bar.
pub fn plot_density_heatmap<P: AsRef<Path>>(surface: &DensitySurface, output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    let (strikes, expiries, grid) = surface.to_grid();
    if strikes.is_empty() || expiries.is_empty() {
        return Err(RndError::PlotError(format!(
            "Surface for {} has no density points",
            surface.symbol
        )));
    }

    let (k_lo, k_hi) = bounds(strikes.iter().copied())
        .ok_or_else(|| RndError::PlotError("Non-finite strikes".to_string()))?;
    let (d_lo, d_hi) = bounds(grid.iter().copied()).unwrap_or((0.0, 1.0));
    let d_span = if d_hi > d_lo { d_hi - d_lo } else { 1.0 };
    let cell_w = if strikes.len() > 1 {
        (k_hi - k_lo) / (strikes.len() - 1) as f64
    } else {
        1.0
    };
    let (x_lo, x_hi) = (k_lo - cell_w, k_hi + cell_w);
    let n_exp = expiries.len();

    let root = BitMapBackend::new(output_path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let (plot_area, bar_area) = root.split_horizontally((WIDTH - 120) as i32);

    let expiry_label = |y: &f64| -> String {
        let i = y.round();
        if i >= 0.0 && (i as usize) < n_exp && (y - i).abs() < 1e-6 {
            expiries[i as usize].format("%Y-%m-%d").to_string()
        } else {
            String::new()
        }
    };

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(
            format!("{} Risk-Neutral Density Surface", surface.symbol),
            ("sans-serif", 30).into_font(),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(100)
        .build_cartesian_2d(x_lo..x_hi, -0.5..(n_exp as f64 - 0.5))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Strike")
        .y_desc("Expiry")
        .y_labels(n_exp.min(20))
        .y_label_formatter(&expiry_label)
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    let gradient = colorous::VIRIDIS;
    for (i, _) in expiries.iter().enumerate() {
        for (j, &strike) in strikes.iter().enumerate() {
            let d = grid[[i, j]];
            if d.is_nan() {
                continue;
            }
            let color = gradient.eval_continuous((d - d_lo) / d_span);
            let rgb = RGBColor(color.r, color.g, color.b);
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [
                        (strike - 0.5 * cell_w, i as f64 - 0.5),
                        (strike + 0.5 * cell_w, i as f64 + 0.5),
                    ],
                    rgb.filled(),
                )))
                .map_err(plot_err)?;
        }
    }

    let bar_height = 400;
    let bar_top = 100;
    for i in 0..bar_height {
        let color = gradient.eval_continuous(1.0 - i as f64 / bar_height as f64);
        let rgb = RGBColor(color.r, color.g, color.b);
        bar_area
            .draw(&Rectangle::new([(20, bar_top + i), (40, bar_top + i + 1)], rgb.filled()))
            .map_err(plot_err)?;
    }
    let text = TextStyle::from(("sans-serif", 12)).color(&BLACK);
    bar_area
        .draw_text(&format!("{:.2e}", d_hi), &text, (45, bar_top))
        .map_err(plot_err)?;
    bar_area
        .draw_text(&format!("{:.2e}", d_lo), &text, (45, bar_top + bar_height))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Density heatmap written to {}", output_path.display());
    Ok(())
}

/// Closing prices with every overlay qualifier drawn on the same axes.
/// Subplot qualifiers are skipped.
pub fn plot_price_overlays<P: AsRef<Path>>(
    symbol: &str,
    prices: &PriceSeries,
    outputs: &[(String, QualifierOutput)],
    output_path: P,
) -> Result<()> {
    let output_path = output_path.as_ref();
    if prices.is_empty() {
        return Err(RndError::PlotError(format!("No prices for {}", symbol)));
    }

    let overlays: Vec<_> = outputs
        .iter()
        .filter(|(_, o)| o.placement == Placement::Overlay)
        .flat_map(|(_, o)| o.series.iter())
        .collect();

    let all_values = prices
        .values
        .iter()
        .copied()
        .chain(overlays.iter().flat_map(|s| s.values.iter().flatten().copied()));
    let (lo, hi) = bounds(all_values)
        .ok_or_else(|| RndError::PlotError("No finite values to plot".to_string()))?;
    let (lo, hi) = padded(lo, hi, 0.05);
    let n = prices.len();

    let date_label = |x: &f64| -> String {
        let i = x.round();
        if i >= 0.0 && (i as usize) < n {
            prices.dates[i as usize].format("%Y-%m-%d").to_string()
        } else {
            String::new()
        }
    };

    let root = BitMapBackend::new(output_path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(symbol.to_string(), ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0.0..(n.max(2) - 1) as f64, lo..hi)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&date_label)
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            prices.values.iter().enumerate().map(|(i, &v)| (i as f64, v)),
            &BLACK,
        ))
        .map_err(plot_err)?
        .label("close")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    let palette = colorous::CATEGORY10;
    for (idx, series) in overlays.iter().enumerate() {
        let c = palette[idx % palette.len()];
        let color = RGBColor(c.r, c.g, c.b);
        let points: Vec<(f64, f64)> = series
            .values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
            .collect();
        chart
            .draw_series(LineSeries::new(points, &color))
            .map_err(plot_err)?
            .label(series.name.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Price chart written to {}", output_path.display());
    Ok(())
}
