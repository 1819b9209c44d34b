//! Figure builder: chart specification (traces + layout) and the
//! self-contained HTML artifact.
//!
//! Traces are Plotly-shaped JSON. The HTML document embeds the figure data,
//! pulls the renderer from a CDN, and appends the zoom-loader script when the
//! chart carries tiled series.

use serde_json::{Value as Json, json};

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::mat::MatSlice;
use crate::types::{AxisScale, ChartType, Series};

use super::sample::downsample_frame;

/// Downsample cap applied to 3D traces.
const MAX_3D_POINTS: usize = 200_000;
/// Grid resolution for heatmap and scattered-contour gridding.
const GRID_BINS: usize = 80;
/// Grid-likeness tolerance: |X|·|Y| <= tolerance · rows.
const GRID_TOLERANCE: f64 = 1.2;

/// One series with its materialized display frame.
#[derive(Debug, Clone)]
pub struct SeriesFrame {
    pub series: Series,
    pub effective_type: ChartType,
    pub frame: Frame,
}

/// A renderable chart specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub traces: Vec<Json>,
    pub layout: Json,
}

/// Build the figure for a tabular visualization.
pub fn build_figure(series_frames: &[SeriesFrame]) -> CoreResult<Figure> {
    let mut traces = Vec::with_capacity(series_frames.len());
    let mut x_scales: Vec<AxisScale> = Vec::new();
    let mut y_scales: Vec<AxisScale> = Vec::new();
    let mut needs_scene = false;

    let mut last_axes: Option<(String, String, Option<String>)> = None;

    for item in series_frames {
        x_scales.push(item.series.x_scale);
        y_scales.push(item.series.y_scale);
        if matches!(
            item.effective_type,
            ChartType::Scatter3d | ChartType::Line3d | ChartType::Surface
        ) {
            needs_scene = true;
        }
        last_axes = Some((
            item.series.x_axis.clone(),
            item.series.y_axis.clone(),
            item.series.z_axis.clone(),
        ));
        traces.push(build_trace(item)?);
    }

    x_scales.dedup();
    y_scales.dedup();
    if x_scales.len() > 1 || y_scales.len() > 1 {
        return Err(CoreError::InvalidJob(
            "all series must use the same x_scale/y_scale".to_string(),
        ));
    }
    let x_scale = x_scales.first().copied().unwrap_or_default();
    let y_scale = y_scales.first().copied().unwrap_or_default();

    let mut layout = json!({
        "template": "plotly_white",
        "paper_bgcolor": "white",
        "plot_bgcolor": "white",
        "autosize": true,
        "margin": {"l": 0, "r": 0, "t": 40, "b": 0},
        "legend": {"title": {"text": "Series"}},
        "xaxis": axis_layout(x_scale),
        "yaxis": axis_layout(y_scale),
    });

    if series_frames.len() > 1 {
        layout["title"] = json!({"text": "Overplot"});
    }

    if needs_scene {
        let (x_axis, y_axis, z_axis) = last_axes.unwrap_or_default();
        layout["margin"] = json!({"l": 40, "r": 40, "t": 40, "b": 40});
        layout["scene"] = json!({
            "domain": {"x": [0.0, 1.0], "y": [0.0, 1.0]},
            "xaxis": {"title": {"text": x_axis}},
            "yaxis": {"title": {"text": y_axis}},
            "zaxis": {"title": {"text": z_axis.unwrap_or_default()}},
            "camera": {"eye": {"x": 1.1, "y": 1.1, "z": 0.7}},
        });
    }

    Ok(Figure { traces, layout })
}

fn axis_layout(scale: AxisScale) -> Json {
    match scale {
        AxisScale::Linear => json!({"type": "linear"}),
        AxisScale::Log => json!({
            "type": "log",
            "dtick": 1,
            "exponentformat": "power",
            "showexponent": "all",
        }),
    }
}

fn build_trace(item: &SeriesFrame) -> CoreResult<Json> {
    let series = &item.series;
    let frame = &item.frame;
    let label = series.display_label();
    let x_axis = series.x_axis.as_str();
    let y_axis = series.y_axis.as_str();

    let trace = match item.effective_type {
        ChartType::Bar => json!({
            "type": "bar",
            "name": label,
            "x": column_json(frame, x_axis)?,
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::Line => json!({
            "type": "scattergl",
            "name": label,
            "mode": "lines",
            "x": column_json(frame, x_axis)?,
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::Scatter => json!({
            "type": "scattergl",
            "name": label,
            "mode": "markers",
            "opacity": 0.8,
            "x": column_json(frame, x_axis)?,
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::ScatterLine => json!({
            "type": "scattergl",
            "name": label,
            "mode": "markers+lines",
            "x": column_json(frame, x_axis)?,
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::Polar => json!({
            "type": "scatterpolar",
            "name": label,
            "mode": "lines+markers",
            "theta": column_json(frame, x_axis)?,
            "r": column_json(frame, y_axis)?,
        }),
        ChartType::Histogram => json!({
            "type": "histogram",
            "name": label,
            "opacity": 0.75,
            "x": column_json(frame, y_axis)?,
        }),
        ChartType::Box => json!({
            "type": "box",
            "name": label,
            "boxpoints": "outliers",
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::Violin => json!({
            "type": "violin",
            "name": label,
            "box": {"visible": true},
            "meanline": {"visible": true},
            "points": "outliers",
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::Heatmap => json!({
            "type": "histogram2d",
            "name": label,
            "nbinsx": GRID_BINS,
            "nbinsy": GRID_BINS,
            "showscale": true,
            "x": column_json(frame, x_axis)?,
            "y": column_json(frame, y_axis)?,
        }),
        ChartType::Contour => {
            let z_axis = require_z(series)?;
            let (xs, ys, grid) = contour_grid(frame, x_axis, y_axis, z_axis)?;
            json!({
                "type": "contour",
                "name": label,
                "contours": {"coloring": "heatmap", "showlabels": true},
                "line": {"width": 1},
                "showscale": true,
                "colorscale": "Electric",
                "x": numbers_json(&xs),
                "y": numbers_json(&ys),
                "z": grid_json(&grid),
            })
        }
        ChartType::Scatter3d | ChartType::Line3d => {
            let z_axis = require_z(series)?;
            let mut triple = numeric_triple(frame, x_axis, y_axis, z_axis)?;
            if triple.is_empty() {
                return Err(CoreError::EmptySelection(format!(
                    "no valid numeric data for 3D series '{label}'"
                )));
            }
            if item.effective_type == ChartType::Line3d {
                triple.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            }
            let capped = downsample_frame(&triple_frame(&triple, x_axis, y_axis, z_axis), MAX_3D_POINTS);
            let mode_fields = if item.effective_type == ChartType::Line3d {
                json!({"mode": "lines", "line": {"width": 3}})
            } else {
                json!({"mode": "markers", "marker": {"size": 3, "opacity": 0.7}})
            };
            let mut trace = json!({
                "type": "scatter3d",
                "name": label,
                "x": column_json(&capped, x_axis)?,
                "y": column_json(&capped, y_axis)?,
                "z": column_json(&capped, z_axis)?,
            });
            merge(&mut trace, mode_fields);
            trace
        }
        ChartType::Surface => {
            let z_axis = require_z(series)?;
            let (xs, ys, grid) = surface_grid(frame, x_axis, y_axis, z_axis)?;
            json!({
                "type": "surface",
                "name": label,
                "showscale": true,
                "x": numbers_json(&xs),
                "y": numbers_json(&ys),
                "z": grid_json(&grid),
            })
        }
    };
    Ok(trace)
}

/// Build the minimal figure for a MAT slice.
pub fn build_mat_figure(
    chart_type: ChartType,
    var_name: &str,
    axis_dims: &[usize],
    slice: &MatSlice,
) -> CoreResult<Figure> {
    let mut traces = Vec::new();
    let mut layout = json!({
        "template": "plotly_white",
        "paper_bgcolor": "white",
        "plot_bgcolor": "white",
        "autosize": true,
        "margin": {"l": 40, "r": 40, "t": 40, "b": 40},
        "title": {"text": format!("{var_name} ({chart_type})")},
        "legend": {"title": {"text": "MAT Variable"}},
    });

    match chart_type {
        ChartType::Line | ChartType::Scatter => {
            let [x_dim] = axis_dims else {
                return Err(CoreError::InvalidJob(format!(
                    "{chart_type} requires exactly one mapped dimension"
                )));
            };
            let x_vals = &slice.coords[x_dim];
            if slice.values.data.len() != x_vals.len() {
                return Err(CoreError::InvalidJob(
                    "MAT slice shape mismatch for line/scatter rendering".to_string(),
                ));
            }
            let mode = if chart_type == ChartType::Line {
                "lines"
            } else {
                "markers"
            };
            traces.push(json!({
                "type": "scatter",
                "name": var_name,
                "mode": mode,
                "x": numbers_json(x_vals),
                "y": numbers_json(&slice.values.data),
            }));
            layout["xaxis"] = json!({"title": {"text": slice.labels[x_dim]}});
            layout["yaxis"] = json!({"title": {"text": var_name}});
        }
        ChartType::Heatmap | ChartType::Contour | ChartType::Surface => {
            let [x_dim, y_dim] = axis_dims else {
                return Err(CoreError::InvalidJob(format!(
                    "{chart_type} requires exactly two mapped dimensions"
                )));
            };
            let x_vals = &slice.coords[x_dim];
            let y_vals = &slice.coords[y_dim];
            if slice.values.dims != [x_vals.len(), y_vals.len()] {
                return Err(CoreError::InvalidJob(
                    "MAT slice shape does not match mapped coordinate lengths".to_string(),
                ));
            }

            // The renderer expects z indexed [y][x]; the slice is [x][y].
            let mut grid = vec![vec![f64::NAN; x_vals.len()]; y_vals.len()];
            for (yi, row) in grid.iter_mut().enumerate() {
                for (xi, cell) in row.iter_mut().enumerate() {
                    *cell = slice.values.data[slice.values.offset(&[xi, yi])];
                }
            }

            let trace_type = match chart_type {
                ChartType::Heatmap => "heatmap",
                ChartType::Contour => "contour",
                _ => "surface",
            };
            let mut trace = json!({
                "type": trace_type,
                "name": var_name,
                "x": numbers_json(x_vals),
                "y": numbers_json(y_vals),
                "z": grid_json(&grid),
            });
            if chart_type == ChartType::Contour {
                merge(
                    &mut trace,
                    json!({"contours": {"coloring": "heatmap", "showlabels": true}}),
                );
            }
            traces.push(trace);

            layout["xaxis"] = json!({"title": {"text": slice.labels[x_dim]}});
            layout["yaxis"] = json!({"title": {"text": slice.labels[y_dim]}});
        }
        other => {
            return Err(CoreError::UnsupportedFormat(format!(
                "chart type '{other}' is not supported for MAT sources"
            )));
        }
    }

    Ok(Figure { traces, layout })
}

/// Render the self-contained HTML artifact, appending the zoom loader when
/// present.
pub fn render_html(figure: &Figure, loader_script: Option<&str>) -> String {
    let data = Json::Array(figure.traces.clone()).to_string();
    let layout = figure.layout.to_string();
    let loader = loader_script
        .map(|script| format!("<script>\n{script}\n</script>"))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
         <script src=\"https://cdn.plot.ly/plotly-2.32.0.min.js\"></script>\n\
         <style>html, body {{ margin: 0; height: 100%; }} .plotly-graph-div {{ height: 100%; }}</style>\n\
         </head>\n<body>\n<div id=\"chart\" class=\"plotly-graph-div\"></div>\n\
         <script>\nPlotly.newPlot(document.getElementById(\"chart\"), {data}, {layout}, {{\"responsive\": true}});\n</script>\n\
         {loader}\n</body>\n</html>\n"
    )
}

fn require_z(series: &Series) -> CoreResult<&str> {
    series
        .z_axis
        .as_deref()
        .ok_or_else(|| CoreError::InvalidJob(format!(
            "series '{}' requires a z axis",
            series.display_label()
        )))
}

fn column_json(frame: &Frame, name: &str) -> CoreResult<Json> {
    let values = frame.numeric_by_name(name, "figure trace")?;
    Ok(Json::Array(
        values
            .into_iter()
            .map(|v| match v {
                Some(x) => f2j(x),
                None => Json::Null,
            })
            .collect(),
    ))
}

fn numbers_json(values: &[f64]) -> Json {
    Json::Array(values.iter().map(|v| f2j(*v)).collect())
}

fn grid_json(grid: &[Vec<f64>]) -> Json {
    Json::Array(grid.iter().map(|row| numbers_json(row)).collect())
}

fn f2j(x: f64) -> Json {
    serde_json::Number::from_f64(x).map(Json::Number).unwrap_or(Json::Null)
}

fn merge(into: &mut Json, from: Json) {
    if let (Json::Object(dst), Json::Object(src)) = (into, from) {
        for (key, value) in src {
            dst.insert(key, value);
        }
    }
}

fn numeric_triple(
    frame: &Frame,
    x_axis: &str,
    y_axis: &str,
    z_axis: &str,
) -> CoreResult<Vec<(f64, f64, f64)>> {
    let xs = frame.numeric_by_name(x_axis, "figure trace")?;
    let ys = frame.numeric_by_name(y_axis, "figure trace")?;
    let zs = frame.numeric_by_name(z_axis, "figure trace")?;

    let mut out = Vec::with_capacity(frame.len());
    for ((x, y), z) in xs.into_iter().zip(ys).zip(zs) {
        if let (Some(x), Some(y), Some(z)) = (x, y, z) {
            if !x.is_nan() && !y.is_nan() && !z.is_nan() {
                out.push((x, y, z));
            }
        }
    }
    Ok(out)
}

fn triple_frame(triple: &[(f64, f64, f64)], x_axis: &str, y_axis: &str, z_axis: &str) -> Frame {
    use crate::frame::Column;
    Frame::new(
        vec![x_axis.to_string(), y_axis.to_string(), z_axis.to_string()],
        vec![
            Column::Float64(triple.iter().map(|t| Some(t.0)).collect()),
            Column::Float64(triple.iter().map(|t| Some(t.1)).collect()),
            Column::Float64(triple.iter().map(|t| Some(t.2)).collect()),
        ],
    )
}

fn sorted_unique(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out.dedup();
    out
}

/// Contour gridding. Grid-like inputs pivot exactly; scattered inputs fall
/// back to a bin-mean grid at [`GRID_BINS`] resolution.
fn contour_grid(
    frame: &Frame,
    x_axis: &str,
    y_axis: &str,
    z_axis: &str,
) -> CoreResult<(Vec<f64>, Vec<f64>, Vec<Vec<f64>>)> {
    let triple = numeric_triple(frame, x_axis, y_axis, z_axis)?;
    if triple.is_empty() {
        return Err(CoreError::EmptySelection(
            "no valid numeric data for contour".to_string(),
        ));
    }

    let xs: Vec<f64> = triple.iter().map(|t| t.0).collect();
    let ys: Vec<f64> = triple.iter().map(|t| t.1).collect();
    let x_unique = sorted_unique(&xs);
    let y_unique = sorted_unique(&ys);

    let grid_like = (x_unique.len() * y_unique.len()) as f64 <= triple.len() as f64 * GRID_TOLERANCE
        && x_unique.len() >= 3
        && y_unique.len() >= 3;

    if grid_like {
        let mut sums = vec![vec![0.0; x_unique.len()]; y_unique.len()];
        let mut counts = vec![vec![0u64; x_unique.len()]; y_unique.len()];
        for (x, y, z) in &triple {
            let (Some(xi), Some(yi)) = (position_of(&x_unique, *x), position_of(&y_unique, *y))
            else {
                continue;
            };
            sums[yi][xi] += z;
            counts[yi][xi] += 1;
        }
        let grid = mean_grid(sums, counts);
        return Ok((x_unique, y_unique, grid));
    }

    // Scattered points: bin-mean onto a regular grid.
    let (x_centers, y_centers, grid) = bin_mean_grid(&triple, GRID_BINS);
    Ok((x_centers, y_centers, grid))
}

fn position_of(sorted: &[f64], value: f64) -> Option<usize> {
    sorted
        .binary_search_by(|probe| probe.partial_cmp(&value).unwrap_or(std::cmp::Ordering::Less))
        .ok()
}

fn mean_grid(sums: Vec<Vec<f64>>, counts: Vec<Vec<u64>>) -> Vec<Vec<f64>> {
    sums.into_iter()
        .zip(counts)
        .map(|(sum_row, count_row)| {
            sum_row
                .into_iter()
                .zip(count_row)
                .map(|(sum, count)| if count > 0 { sum / count as f64 } else { f64::NAN })
                .collect()
        })
        .collect()
}

fn bin_mean_grid(
    triple: &[(f64, f64, f64)],
    bins: usize,
) -> (Vec<f64>, Vec<f64>, Vec<Vec<f64>>) {
    let x_min = triple.iter().map(|t| t.0).fold(f64::INFINITY, f64::min);
    let x_max = triple.iter().map(|t| t.0).fold(f64::NEG_INFINITY, f64::max);
    let y_min = triple.iter().map(|t| t.1).fold(f64::INFINITY, f64::min);
    let y_max = triple.iter().map(|t| t.1).fold(f64::NEG_INFINITY, f64::max);

    let x_step = ((x_max - x_min) / bins as f64).max(f64::MIN_POSITIVE);
    let y_step = ((y_max - y_min) / bins as f64).max(f64::MIN_POSITIVE);

    let mut sums = vec![vec![0.0; bins]; bins];
    let mut counts = vec![vec![0u64; bins]; bins];
    for (x, y, z) in triple {
        let xi = (((x - x_min) / x_step) as usize).min(bins - 1);
        let yi = (((y - y_min) / y_step) as usize).min(bins - 1);
        sums[yi][xi] += z;
        counts[yi][xi] += 1;
    }

    let x_centers = (0..bins)
        .map(|i| x_min + x_step * (i as f64 + 0.5))
        .collect();
    let y_centers = (0..bins)
        .map(|i| y_min + y_step * (i as f64 + 0.5))
        .collect();
    (x_centers, y_centers, mean_grid(sums, counts))
}

/// Surface gridding: pivot onto sorted unique X/Y with mean aggregation,
/// then linearly interpolate missing cells along both axes.
fn surface_grid(
    frame: &Frame,
    x_axis: &str,
    y_axis: &str,
    z_axis: &str,
) -> CoreResult<(Vec<f64>, Vec<f64>, Vec<Vec<f64>>)> {
    let triple = numeric_triple(frame, x_axis, y_axis, z_axis)?;
    if triple.is_empty() {
        return Err(CoreError::EmptySelection(
            "no valid numeric data for surface".to_string(),
        ));
    }

    let x_unique = sorted_unique(&triple.iter().map(|t| t.0).collect::<Vec<_>>());
    let y_unique = sorted_unique(&triple.iter().map(|t| t.1).collect::<Vec<_>>());

    let mut sums = vec![vec![0.0; x_unique.len()]; y_unique.len()];
    let mut counts = vec![vec![0u64; x_unique.len()]; y_unique.len()];
    for (x, y, z) in &triple {
        let (Some(xi), Some(yi)) = (position_of(&x_unique, *x), position_of(&y_unique, *y)) else {
            continue;
        };
        sums[yi][xi] += z;
        counts[yi][xi] += 1;
    }
    let mut grid = mean_grid(sums, counts);

    // Fill gaps along rows, then along columns.
    for row in grid.iter_mut() {
        interpolate_gaps(row);
    }
    for col in 0..x_unique.len() {
        let mut column: Vec<f64> = grid.iter().map(|row| row[col]).collect();
        interpolate_gaps(&mut column);
        for (row, value) in grid.iter_mut().zip(column) {
            row[col] = value;
        }
    }

    Ok((x_unique, y_unique, grid))
}

/// Linear interpolation across NaN gaps between known neighbors. Leading and
/// trailing gaps stay NaN.
fn interpolate_gaps(values: &mut [f64]) {
    let mut last_known: Option<usize> = None;
    for i in 0..values.len() {
        if values[i].is_nan() {
            continue;
        }
        if let Some(prev) = last_known {
            if i > prev + 1 {
                let start = values[prev];
                let end = values[i];
                let span = (i - prev) as f64;
                for (offset, slot) in (prev + 1..i).enumerate() {
                    values[slot] = start + (end - start) * (offset as f64 + 1.0) / span;
                }
            }
        }
        last_known = Some(i);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Figure, SeriesFrame, build_figure, build_mat_figure, interpolate_gaps, render_html,
    };
    use crate::frame::{Column, Frame};
    use crate::mat::{MatArray, MatSlice};
    use crate::types::{AxisScale, ChartType, Series};
    use std::collections::BTreeMap;

    fn xy_frame() -> Frame {
        Frame::new(
            vec!["x".into(), "y".into()],
            vec![
                Column::Float64(vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::Float64(vec![Some(10.0), Some(20.0), Some(30.0)]),
            ],
        )
    }

    fn series(chart_type: Option<ChartType>) -> Series {
        Series {
            job_id: "j1".to_string(),
            x_axis: "x".to_string(),
            y_axis: "y".to_string(),
            z_axis: None,
            label: Some("run 1".to_string()),
            x_scale: AxisScale::Linear,
            y_scale: AxisScale::Linear,
            chart_type,
            derived_columns: Vec::new(),
        }
    }

    #[test]
    fn line_trace_uses_lines_mode() {
        let fig = build_figure(&[SeriesFrame {
            series: series(None),
            effective_type: ChartType::Line,
            frame: xy_frame(),
        }])
        .unwrap();
        assert_eq!(fig.traces.len(), 1);
        assert_eq!(fig.traces[0]["mode"], "lines");
        assert_eq!(fig.traces[0]["type"], "scattergl");
        // Single series: no Overplot title.
        assert!(fig.layout.get("title").is_none());
    }

    #[test]
    fn multi_series_gets_overplot_title_and_series_legend() {
        let item = SeriesFrame {
            series: series(None),
            effective_type: ChartType::Scatter,
            frame: xy_frame(),
        };
        let fig = build_figure(&[item.clone(), item]).unwrap();
        assert_eq!(fig.layout["title"]["text"], "Overplot");
        assert_eq!(fig.layout["legend"]["title"]["text"], "Series");
    }

    #[test]
    fn mismatched_axis_scales_fail() {
        let mut log_series = series(None);
        log_series.x_scale = AxisScale::Log;
        let frames = vec![
            SeriesFrame {
                series: series(None),
                effective_type: ChartType::Line,
                frame: xy_frame(),
            },
            SeriesFrame {
                series: log_series,
                effective_type: ChartType::Line,
                frame: xy_frame(),
            },
        ];
        assert!(build_figure(&frames).is_err());
    }

    #[test]
    fn log_axes_get_decade_ticks() {
        let mut s = series(None);
        s.x_scale = AxisScale::Log;
        s.y_scale = AxisScale::Log;
        let fig = build_figure(&[SeriesFrame {
            series: s,
            effective_type: ChartType::Scatter,
            frame: xy_frame(),
        }])
        .unwrap();
        assert_eq!(fig.layout["xaxis"]["type"], "log");
        assert_eq!(fig.layout["xaxis"]["dtick"], 1);
        assert_eq!(fig.layout["yaxis"]["exponentformat"], "power");
    }

    #[test]
    fn histogram_bins_the_y_column() {
        let fig = build_figure(&[SeriesFrame {
            series: series(None),
            effective_type: ChartType::Histogram,
            frame: xy_frame(),
        }])
        .unwrap();
        assert_eq!(fig.traces[0]["type"], "histogram");
        assert_eq!(fig.traces[0]["x"], serde_json::json!([10.0, 20.0, 30.0]));
    }

    #[test]
    fn surface_requires_z_axis() {
        let fig = build_figure(&[SeriesFrame {
            series: series(None),
            effective_type: ChartType::Surface,
            frame: xy_frame(),
        }]);
        assert!(fig.is_err());
    }

    #[test]
    fn scene_layout_is_square_with_fixed_camera() {
        let mut s = series(None);
        s.z_axis = Some("y".to_string());
        let fig = build_figure(&[SeriesFrame {
            series: s,
            effective_type: ChartType::Scatter3d,
            frame: xy_frame(),
        }])
        .unwrap();
        assert_eq!(fig.layout["scene"]["domain"]["x"], serde_json::json!([0.0, 1.0]));
        assert_eq!(fig.layout["scene"]["camera"]["eye"]["z"], 0.7);
    }

    #[test]
    fn mat_line_figure_uses_coords_and_labels() {
        let slice = MatSlice {
            coords: BTreeMap::from([(0usize, vec![0.0, 1.0, 2.0])]),
            labels: BTreeMap::from([(0usize, "alpha".to_string())]),
            values: MatArray {
                dims: vec![3],
                data: vec![5.0, 6.0, 7.0],
                class_name: "double".to_string(),
            },
        };
        let fig = build_mat_figure(ChartType::Line, "CL", &[0], &slice).unwrap();
        assert_eq!(fig.traces[0]["mode"], "lines");
        assert_eq!(fig.layout["xaxis"]["title"]["text"], "alpha");
        assert_eq!(fig.layout["title"]["text"], "CL (line)");
    }

    #[test]
    fn mat_heatmap_transposes_to_renderer_order() {
        // values[x][y] over 2 x 3.
        let slice = MatSlice {
            coords: BTreeMap::from([(0usize, vec![0.0, 1.0]), (1usize, vec![0.0, 1.0, 2.0])]),
            labels: BTreeMap::from([(0usize, "x".to_string()), (1usize, "y".to_string())]),
            values: MatArray {
                dims: vec![2, 3],
                data: vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0],
                class_name: "double".to_string(),
            },
        };
        let fig = build_mat_figure(ChartType::Heatmap, "CL", &[0, 1], &slice).unwrap();
        // z[y][x]: row y=2 must be [value(x=0,y=2), value(x=1,y=2)] = [2, 12].
        assert_eq!(fig.traces[0]["z"][2], serde_json::json!([2.0, 12.0]));
    }

    #[test]
    fn interpolation_fills_interior_gaps_only() {
        let mut values = vec![f64::NAN, 1.0, f64::NAN, f64::NAN, 4.0, f64::NAN];
        interpolate_gaps(&mut values);
        assert!(values[0].is_nan());
        assert_eq!(values[1], 1.0);
        assert_eq!(values[2], 2.0);
        assert_eq!(values[3], 3.0);
        assert_eq!(values[4], 4.0);
        assert!(values[5].is_nan());
    }

    #[test]
    fn html_embeds_figure_and_optional_loader() {
        let fig = Figure {
            traces: vec![serde_json::json!({"type": "bar"})],
            layout: serde_json::json!({"autosize": true}),
        };
        let plain = render_html(&fig, None);
        assert!(plain.contains("Plotly.newPlot"));
        assert!(plain.contains("\"type\":\"bar\""));
        assert!(!plain.contains("__ZOOM__"));

        let with_loader = render_html(&fig, Some("console.log('__ZOOM__');"));
        assert!(with_loader.contains("__ZOOM__"));
    }
}
