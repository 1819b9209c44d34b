//! Embedded zoom-loader script.
//!
//! The loader is the only client-side code the core emits. Its contract is
//! part of the pipeline: debounce range events, classify the new span into
//! overview/tile/raw, fetch JSON with a bearer token, refuse non-JSON
//! responses, and restyle traces in place. The span classifier is mirrored
//! here in Rust ([`choose_mode`]) so the thresholds stay testable.

use serde_json::json;

use crate::types::{ChartType, TileStats};

/// Span-ratio threshold above which the coarsest level is used.
pub const COARSE_RATIO: f64 = 0.40;
/// Span-ratio threshold above which the middle level is used.
pub const MIDDLE_RATIO: f64 = 0.12;
/// Expected-point budget under which the loader switches to raw points.
pub const RAW_BUDGET: f64 = 2_000_000.0;
/// Debounce applied to relayout storms, in milliseconds.
pub const DEBOUNCE_MS: u64 = 250;

/// Loader mode for one zoom gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMode {
    /// Fetch a tile at the given LOD level.
    Tile { level: usize },
    /// Fetch raw windowed points.
    Raw,
}

/// Classify a zoom span against the series stats. Mirrors the embedded JS:
/// raw when the expected row count fits the budget, else a tile level by
/// span ratio; degenerate stats fall back to the middle level.
pub fn choose_mode(stats: Option<&TileStats>, x_min: f64, x_max: f64, levels: &[usize]) -> ZoomMode {
    let coarsest = levels.first().copied().unwrap_or(256);
    let middle = levels.get(1).copied().unwrap_or(coarsest);
    let Some(stats) = stats else {
        return ZoomMode::Tile { level: middle };
    };

    let total = (stats.x_max - stats.x_min).abs();
    let span = (x_max - x_min).abs();
    if !total.is_finite() || total <= 0.0 || !span.is_finite() || span <= 0.0 {
        return ZoomMode::Tile { level: middle };
    }

    let ratio = span / total;
    let expected = if stats.rows > 0 {
        stats.rows as f64 * ratio
    } else {
        f64::INFINITY
    };

    if expected <= RAW_BUDGET {
        return ZoomMode::Raw;
    }
    if ratio > COARSE_RATIO {
        return ZoomMode::Tile { level: coarsest };
    }
    if ratio > MIDDLE_RATIO {
        return ZoomMode::Tile { level: middle };
    }
    ZoomMode::Tile {
        level: levels.last().copied().unwrap_or(middle),
    }
}

/// Per-series metadata embedded into the loader config.
#[derive(Debug, Clone)]
pub struct LoaderSeriesMeta {
    pub x_axis: String,
    pub y_axis: String,
    pub z_axis: Option<String>,
    pub chart_type: ChartType,
}

/// Build the loader script, or `None` when no series is tile-capable.
pub fn build_zoom_loader(
    viz_id: &str,
    levels: &[usize],
    series_meta: &[LoaderSeriesMeta],
    series_stats: &[Option<TileStats>],
    default_api_base: &str,
) -> Option<String> {
    let tile_capable = series_meta
        .iter()
        .any(|meta| meta.chart_type.family() == crate::types::ChartFamily::Tiled);
    if !tile_capable {
        return None;
    }

    let config = json!({
        "vizId": viz_id,
        "levels": levels,
        "defaultApiBase": default_api_base,
        "debounceMs": DEBOUNCE_MS,
        "coarseRatio": COARSE_RATIO,
        "middleRatio": MIDDLE_RATIO,
        "rawBudget": RAW_BUDGET,
        "seriesMeta": series_meta
            .iter()
            .map(|meta| json!({
                "x_axis": meta.x_axis,
                "y_axis": meta.y_axis,
                "z_axis": meta.z_axis,
                "chart_type": meta.chart_type,
            }))
            .collect::<Vec<_>>(),
        "seriesStats": series_stats
            .iter()
            .map(|stats| match stats {
                Some(s) => json!(s),
                None => json!({}),
            })
            .collect::<Vec<_>>(),
    });

    Some(LOADER_TEMPLATE.replace("__CFG__", &config.to_string()))
}

/// The client-side controller. Swaps trace data on X-range changes:
/// overview restore on autorange/double-click, tiles while zoomed out, raw
/// windowed points once the expected count fits the budget.
const LOADER_TEMPLATE: &str = r#"(function() {
  const cfg = __CFG__;
  const gd = document.querySelector('.plotly-graph-div');
  if (!gd || !window.Plotly) return;

  const API_BASE =
    (window.__FD_API_BASE__ && String(window.__FD_API_BASE__)) ||
    (window.parent && window.parent.__FD_API_BASE__ && String(window.parent.__FD_API_BASE__)) ||
    cfg.defaultApiBase;

  function joinUrl(base, path) {
    const b = base.endsWith('/') ? base.slice(0, -1) : base;
    const p = path.startsWith('/') ? path : ('/' + path);
    return b + p;
  }

  let timer = null;
  function debounce(fn) {
    if (timer) clearTimeout(timer);
    timer = setTimeout(fn, cfg.debounceMs);
  }

  function chooseMode(stat, xmin, xmax) {
    const total = Math.abs(
      (stat && stat.x_max !== undefined ? stat.x_max : NaN) -
      (stat && stat.x_min !== undefined ? stat.x_min : NaN)
    );
    const span = Math.abs(xmax - xmin);
    if (!isFinite(total) || total <= 0 || !isFinite(span) || span <= 0) {
      return { mode: 'tile', level: cfg.levels[1] };
    }
    const ratio = span / total;
    const totalRows = Number(stat && stat.rows ? stat.rows : 0);
    const expected = totalRows ? (totalRows * ratio) : Infinity;
    if (expected <= cfg.rawBudget) {
      return { mode: 'raw' };
    }
    if (ratio > cfg.coarseRatio) return { mode: 'tile', level: cfg.levels[0] };
    if (ratio > cfg.middleRatio) return { mode: 'tile', level: cfg.levels[1] };
    return { mode: 'tile', level: cfg.levels[cfg.levels.length - 1] };
  }

  function getToken() {
    try {
      if (window.localStorage) {
        const t = window.localStorage.getItem('token');
        if (t) return t;
      }
    } catch (e) {}
    try {
      if (window.parent && window.parent.localStorage) {
        const t = window.parent.localStorage.getItem('token');
        if (t) return t;
      }
    } catch (e) {}
    return null;
  }

  async function fetchJson(url) {
    let res;
    try {
      const token = getToken();
      const headers = token ? { Authorization: 'Bearer ' + token } : {};
      res = await fetch(url, { credentials: 'include', headers });
    } catch (e) {
      console.warn('zoom-fetch failed', e);
      return null;
    }
    const contentType = (res.headers.get('content-type') || '').toLowerCase();
    if (!res.ok) {
      const txt = await res.text();
      console.warn('zoom-api error', res.status, txt.slice(0, 200));
      return null;
    }
    if (!contentType.includes('application/json')) {
      const txt = await res.text();
      console.warn('zoom-api non-json', contentType, txt.slice(0, 200));
      return null;
    }
    try {
      return await res.json();
    } catch (e) {
      console.warn('zoom-api json parse failed', e);
      return null;
    }
  }

  function restyleFromRows(i, rows, xAxis, yAxis) {
    if (!rows.length) return;
    const xs = rows.map(r => r[xAxis]);
    const ys = rows.map(r => r[yAxis]);
    Plotly.restyle(gd, { x: [xs], y: [ys] }, [i]);
  }

  async function restoreOverview() {
    const n = (gd.data && gd.data.length) ? gd.data.length : 0;
    for (let i = 0; i < n; i++) {
      const meta = cfg.seriesMeta[i] || {};
      if (!meta.x_axis || !meta.y_axis) continue;
      const path = '/api/visualizations/' + cfg.vizId + '/tiles?series=' + i + '&level=' + cfg.levels[0];
      const js = await fetchJson(joinUrl(API_BASE, path));
      if (!js) continue;
      restyleFromRows(i, js.data || [], meta.x_axis, meta.y_axis);
    }
  }

  async function updateTrace(i, xmin, xmax) {
    const meta = cfg.seriesMeta[i] || {};
    const stat = cfg.seriesStats[i] || {};
    if (!meta.x_axis || !meta.y_axis) return;
    const mode = chooseMode(stat, xmin, xmax);

    let path;
    if (mode.mode === 'raw') {
      path = '/api/visualizations/' + cfg.vizId + '/raw?series=' + i +
        '&x_min=' + encodeURIComponent(xmin) + '&x_max=' + encodeURIComponent(xmax) +
        '&max_points=' + cfg.rawBudget;
    } else {
      path = '/api/visualizations/' + cfg.vizId + '/tiles?series=' + i + '&level=' + mode.level +
        '&x_min=' + encodeURIComponent(xmin) + '&x_max=' + encodeURIComponent(xmax);
    }
    const js = await fetchJson(joinUrl(API_BASE, path));
    if (!js) return;
    restyleFromRows(i, js.data || [], meta.x_axis, meta.y_axis);
  }

  gd.on('plotly_doubleclick', () => {
    debounce(() => restoreOverview());
  });

  gd.on('plotly_relayout', (ev) => {
    if (ev && ev['xaxis.autorange'] === true) {
      debounce(() => restoreOverview());
      return;
    }
    const r0 = ev ? ev['xaxis.range[0]'] : undefined;
    const r1 = ev ? ev['xaxis.range[1]'] : undefined;
    if (r0 === undefined || r1 === undefined) return;
    const xmin = Number(r0);
    const xmax = Number(r1);
    if (!isFinite(xmin) || !isFinite(xmax)) return;
    debounce(() => {
      const n = (gd.data && gd.data.length) ? gd.data.length : 0;
      for (let i = 0; i < n; i++) {
        updateTrace(i, xmin, xmax);
      }
    });
  });
})();
"#;
