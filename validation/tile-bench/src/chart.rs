//! Throughput against concurrency, as an inline SVG chart or text bars.

use std::fmt::Write;
use thiserror::Error;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 320.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 44.0;
const Y_TICKS: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("no data points to plot")]
    Empty,

    #[error("non-finite value at concurrency {0}")]
    NonFinite(u32),

    #[error("concurrency must be positive on a log axis")]
    ZeroConcurrency,

    #[error("failed to format chart")]
    Format(#[from] std::fmt::Error),
}

/// Render an RPS-vs-concurrency line chart with a log-scaled x axis.
///
/// Points are drawn in the given order.
pub fn rps_chart(series: &[(u32, f64)]) -> Result<String, ChartError> {
    check_series(series)?;

    let log_min = series.iter().map(|(c, _)| f64::from(*c).log10()).fold(f64::INFINITY, f64::min);
    let log_max = series.iter().map(|(c, _)| f64::from(*c).log10()).fold(f64::NEG_INFINITY, f64::max);
    let max_rps = series.iter().map(|(_, r)| *r).fold(0.0, f64::max);
    let y_max = if max_rps > 0.0 { max_rps * 1.1 } else { 1.0 };

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x_of = |c: u32| {
        if log_max > log_min {
            MARGIN_LEFT + (f64::from(c).log10() - log_min) / (log_max - log_min) * plot_w
        } else {
            MARGIN_LEFT + plot_w / 2.0
        }
    };
    let y_of = |rps: f64| MARGIN_TOP + plot_h - rps / y_max * plot_h;

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {WIDTH} {HEIGHT}" width="{WIDTH}" height="{HEIGHT}" class="rps-chart">"#
    )?;
    writeln!(
        svg,
        r##"<rect x="{MARGIN_LEFT}" y="{MARGIN_TOP}" width="{plot_w}" height="{plot_h}" fill="none" stroke="#ccc"/>"##
    )?;

    for i in 0..=Y_TICKS {
        let value = y_max * i as f64 / Y_TICKS as f64;
        let y = y_of(value);
        writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#eee"/><text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{value:.0}</text>"##,
            MARGIN_LEFT + plot_w,
            MARGIN_LEFT - 6.0,
            y + 4.0
        )?;
    }

    for &(concurrency, _) in series {
        let x = x_of(concurrency);
        writeln!(
            svg,
            r#"<text x="{x:.1}" y="{:.1}" font-size="11" text-anchor="middle">{concurrency}</text>"#,
            MARGIN_TOP + plot_h + 16.0
        )?;
    }

    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle">Concurrent users (log scale)</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 6.0
    )?;
    writeln!(
        svg,
        r#"<text x="14" y="{:.1}" font-size="12" text-anchor="middle" transform="rotate(-90 14 {:.1})">Requests/sec</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0
    )?;

    let points: Vec<String> = series
        .iter()
        .map(|&(c, rps)| format!("{:.1},{:.1}", x_of(c), y_of(rps)))
        .collect();
    writeln!(
        svg,
        r##"<polyline points="{}" fill="none" stroke="#2b6cb0" stroke-width="2"/>"##,
        points.join(" ")
    )?;
    for &(c, rps) in series {
        writeln!(
            svg,
            r##"<circle cx="{:.1}" cy="{:.1}" r="3.5" fill="#2b6cb0"><title>c={c}: {rps:.2} req/s</title></circle>"##,
            x_of(c),
            y_of(rps)
        )?;
    }
    svg.push_str("</svg>\n");
    Ok(svg)
}

/// One `#` bar per point, scaled so the highest RPS spans `width` columns.
///
/// Lines keep the given order; values line up after the padded bars.
pub fn text_bars(series: &[(u32, f64)], width: usize) -> Result<String, ChartError> {
    check_series(series)?;
    let max_rps = series.iter().map(|(_, r)| *r).fold(0.0, f64::max);
    let label_width = series
        .iter()
        .map(|(c, _)| c.to_string().len())
        .max()
        .unwrap_or(1);

    let mut out = String::new();
    for &(concurrency, rps) in series {
        let len = if max_rps > 0.0 {
            (rps / max_rps * width as f64).round() as usize
        } else {
            0
        };
        writeln!(
            out,
            "c={:>label_width$} | {:<width$} {:.2}",
            concurrency,
            "#".repeat(len),
            rps
        )?;
    }
    Ok(out)
}

fn check_series(series: &[(u32, f64)]) -> Result<(), ChartError> {
    if series.is_empty() {
        return Err(ChartError::Empty);
    }
    for &(concurrency, rps) in series {
        if concurrency == 0 {
            return Err(ChartError::ZeroConcurrency);
        }
        if !rps.is_finite() || rps < 0.0 {
            return Err(ChartError::NonFinite(concurrency));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_contains_one_marker_per_point() {
        let svg = rps_chart(&[(1, 900.0), (10, 650.0), (100, 400.0)]).unwrap();
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains("c=10: 650.00 req/s"));
    }

    #[test]
    fn test_log_axis_spacing() {
        let svg = rps_chart(&[(1, 1.0), (10, 1.0), (100, 1.0)]).unwrap();
        // equal decades are equally spaced across the 552px plot area
        assert!(svg.contains(r#"cx="64.0""#));
        assert!(svg.contains(r#"cx="340.0""#));
        assert!(svg.contains(r#"cx="616.0""#));
    }

    #[test]
    fn test_single_point_is_centered() {
        let svg = rps_chart(&[(50, 10.0)]).unwrap();
        assert!(svg.contains(r#"cx="340.0""#));
    }

    #[test]
    fn test_rejects_unplottable_series() {
        assert_eq!(rps_chart(&[]), Err(ChartError::Empty));
        assert_eq!(rps_chart(&[(1, f64::NAN)]), Err(ChartError::NonFinite(1)));
        assert_eq!(rps_chart(&[(0, 1.0)]), Err(ChartError::ZeroConcurrency));
    }

    #[test]
    fn test_text_bars_scale_to_highest_rps() {
        let bars = text_bars(&[(1, 1000.0), (10, 500.0), (100, 0.0)], 20).unwrap();
        let lines: Vec<&str> = bars.lines().collect();
        assert_eq!(
            lines,
            vec![
                "c=  1 | #################### 1000.00",
                "c= 10 | ##########           500.00",
                "c=100 |                      0.00",
            ]
        );
    }

    #[test]
    fn test_text_bars_reject_what_the_chart_rejects() {
        assert_eq!(text_bars(&[], 20), Err(ChartError::Empty));
        assert_eq!(text_bars(&[(5, f64::INFINITY)], 20), Err(ChartError::NonFinite(5)));
        // all-zero throughput draws empty bars
        assert_eq!(text_bars(&[(1, 0.0)], 4).unwrap(), "c=1 |      0.00\n");
    }
}
