//! MAT N-D slicing: axis mapping, filter resolution and extraction.
//!
//! A slice request names the dimensions that stay free (in the order they map
//! to X/Y/Z), optional explicit coordinate names per dimension, and filter
//! values for the rest. Filters resolve to integer indices by nearest
//! coordinate value when a vector is available, index clamping otherwise;
//! unmentioned dimensions pin to index 0. Coordinate resolution is pure so it
//! can be tested without any file I/O.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::types::{AxisMapping, ChartType, FilterValue, MatRequest};

use super::format::{MatArray, MatVersion, read_mat, sniff_version};
use super::index::{MatFileIndex, flatten_numeric};

/// Default cap on extracted slice elements.
pub const DEFAULT_MAX_CELLS: usize = 2_000_000;

/// Fully resolved slice request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatSliceSpec {
    /// Free dimensions, in the order they map to X/Y/Z.
    pub axis_dims: Vec<usize>,
    /// Explicit dim -> coordinate-name overrides.
    pub coord_map: BTreeMap<usize, String>,
    /// User-supplied filters, keyed by dim index, `dim_N` or coordinate name.
    pub filters: BTreeMap<String, FilterValue>,
    pub max_cells: usize,
}

/// Slice result: one coordinate vector and label per free dim, plus the
/// extracted values with dims in `axis_dims` order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatSlice {
    pub coords: BTreeMap<usize, Vec<f64>>,
    pub labels: BTreeMap<usize, String>,
    pub values: MatArray,
}

/// Axis keys a chart type requires in its mapping.
pub fn chart_axis_keys(chart_type: ChartType) -> &'static [&'static str] {
    match chart_type {
        ChartType::Line
        | ChartType::Scatter
        | ChartType::ScatterLine
        | ChartType::Bar
        | ChartType::Histogram
        | ChartType::Box
        | ChartType::Violin
        | ChartType::Polar => &["x"],
        ChartType::Heatmap | ChartType::Contour | ChartType::Surface => &["x", "y"],
        ChartType::Scatter3d | ChartType::Line3d => &["x", "y", "z"],
    }
}

/// Build a [`MatSliceSpec`] from a chart type plus the request's mapping and
/// filters. Mapped dimensions must be unique and present for every required
/// axis key.
pub fn build_slice_spec(
    chart_type: ChartType,
    mapping: &BTreeMap<String, AxisMapping>,
    filters: &BTreeMap<String, FilterValue>,
    max_cells: usize,
) -> CoreResult<MatSliceSpec> {
    let mut axis_dims = Vec::new();
    let mut coord_map = BTreeMap::new();

    for key in chart_axis_keys(chart_type) {
        let axis = mapping.get(*key).ok_or_else(|| {
            CoreError::InvalidJob(format!("mapping.{key} is required for {chart_type} charts"))
        })?;
        if axis_dims.contains(&axis.dim) {
            return Err(CoreError::InvalidJob(
                "mapping dimensions must be unique".to_string(),
            ));
        }
        axis_dims.push(axis.dim);
        if let Some(coord) = axis.coord.as_deref() {
            let coord = coord.trim();
            if !coord.is_empty() {
                coord_map.insert(axis.dim, coord.to_string());
            }
        }
    }

    if axis_dims.is_empty() {
        return Err(CoreError::InvalidJob(
            "at least one mapped axis is required".to_string(),
        ));
    }

    Ok(MatSliceSpec {
        axis_dims,
        coord_map,
        filters: filters.clone(),
        max_cells: max_cells.max(1),
    })
}

impl MatSliceSpec {
    /// Convenience constructor from a [`MatRequest`].
    pub fn from_request(chart_type: ChartType, request: &MatRequest) -> CoreResult<Self> {
        build_slice_spec(chart_type, &request.mapping, &request.filters, DEFAULT_MAX_CELLS)
    }
}

/// One dimension's resolved coordinate vector (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct CoordVector {
    pub name: String,
    pub values: Option<Vec<f64>>,
    pub size: usize,
}

/// Resolve a requested name against available names: exact, case-folded, and
/// with `.`/`/` path separators swapped.
pub fn resolve_name<'a>(requested: &str, candidates: &'a [String]) -> Option<&'a String> {
    if let Some(found) = candidates.iter().find(|c| *c == requested) {
        return Some(found);
    }
    let folded = requested.to_lowercase();
    if let Some(found) = candidates.iter().find(|c| c.to_lowercase() == folded) {
        return Some(found);
    }
    for alt in [requested.replace('.', "/"), requested.replace('/', ".")] {
        if let Some(found) = candidates.iter().find(|c| *c == &alt) {
            return Some(found);
        }
        let alt_folded = alt.to_lowercase();
        if let Some(found) = candidates.iter().find(|c| c.to_lowercase() == alt_folded) {
            return Some(found);
        }
    }
    None
}

/// Coerce a value into a coordinate vector of `expected_len`: 1-D arrays and
/// 2-D arrays with a singleton dimension qualify.
pub fn coerce_coord_vector(array: &MatArray, expected_len: usize) -> Option<Vec<f64>> {
    match array.dims.as_slice() {
        [] => (expected_len == 1).then(|| array.data.clone()),
        [n] if *n == expected_len => Some(array.data.clone()),
        [1, n] | [n, 1] if *n == expected_len => Some(array.data.clone()),
        _ => None,
    }
}

/// Build coordinate vectors for every dimension of `shape`, consulting the
/// explicit `coord_map` first, then the index's guesses.
pub fn build_coord_vectors(
    values_map: &BTreeMap<String, MatArray>,
    shape: &[usize],
    var_name: &str,
    spec: &MatSliceSpec,
    meta: Option<&MatFileIndex>,
) -> BTreeMap<usize, CoordVector> {
    let all_names: Vec<String> = values_map.keys().cloned().collect();

    let mut vectors = BTreeMap::new();
    for (dim, size) in shape.iter().enumerate() {
        let coord_name: Option<String> = spec
            .coord_map
            .get(&dim)
            .cloned()
            .or_else(|| meta.and_then(|m| m.coord_guess(var_name, dim)).map(String::from));

        let mut display_name = coord_name.clone().unwrap_or_else(|| format!("dim_{dim}"));
        let mut values = None;

        if let Some(name) = coord_name.as_deref() {
            if let Some(resolved) = resolve_name(name, &all_names) {
                if let Some(vec) = values_map
                    .get(resolved)
                    .and_then(|arr| coerce_coord_vector(arr, *size))
                {
                    values = Some(vec);
                    display_name = resolved.clone();
                }
            }
        }

        vectors.insert(
            dim,
            CoordVector {
                name: display_name,
                values,
                size: *size,
            },
        );
    }
    vectors
}

/// Resolve user filters to integer indices per dimension.
///
/// Keys match a dimension index, `dim_N`, or a coordinate name (case-folded).
/// Index-like values clamp into `[0, size-1]`; numeric values match the
/// nearest coordinate value when a vector exists, else round-and-clamp.
/// Unresolvable filters are ignored.
pub fn resolve_filters_to_indices(
    filters: &BTreeMap<String, FilterValue>,
    coords: &BTreeMap<usize, CoordVector>,
) -> BTreeMap<usize, usize> {
    let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
    for (dim, vector) in coords {
        by_name.insert(vector.name.to_lowercase(), *dim);
    }

    let mut resolved = BTreeMap::new();
    for (key, value) in filters {
        let key = key.trim();

        let dim = key
            .parse::<usize>()
            .ok()
            .filter(|d| coords.contains_key(d))
            .or_else(|| {
                key.strip_prefix("dim_")
                    .and_then(|rest| rest.parse::<usize>().ok())
                    .filter(|d| coords.contains_key(d))
            })
            .or_else(|| by_name.get(&key.to_lowercase()).copied());

        let Some(dim) = dim else { continue };
        let vector = &coords[&dim];
        if vector.size == 0 {
            continue;
        }

        let (numeric, index_like) = match value {
            FilterValue::Index(i) => (*i as f64, true),
            FilterValue::Number(x) => (*x, false),
            FilterValue::Text(text) => {
                let trimmed = text.trim();
                let Some(parsed) = crate::frame::parse_numeric(trimmed) else {
                    continue;
                };
                let digits_only = {
                    let body = trimmed.trim_start_matches(['+', '-']);
                    !body.is_empty() && body.chars().all(|c| c.is_ascii_digit())
                };
                (parsed, digits_only)
            }
        };

        let index = if index_like {
            clamp_index(numeric.round() as i64, vector.size)
        } else {
            match &vector.values {
                Some(values) if values.len() == vector.size => nearest_index(values, numeric)
                    .unwrap_or_else(|| clamp_index(numeric.round() as i64, vector.size)),
                _ => clamp_index(numeric.round() as i64, vector.size),
            }
        };
        resolved.insert(dim, index);
    }
    resolved
}

fn clamp_index(idx: i64, size: usize) -> usize {
    idx.clamp(0, size.saturating_sub(1) as i64) as usize
}

fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let distance = (v - target).abs();
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }
    best.map(|(i, _)| i)
}

/// Per-dimension selection after filter resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimSelect {
    /// Dimension stays free.
    All,
    /// Dimension is pinned to one index.
    At(usize),
}

/// Build the N-D indexer: `All` for free dims, resolved indices for filtered
/// dims, index 0 for unmentioned dims. Also returns the free dims in natural
/// (ascending) order.
pub fn build_indexer(
    shape: &[usize],
    axis_dims: &[usize],
    filter_indices: &BTreeMap<usize, usize>,
) -> (Vec<DimSelect>, Vec<usize>) {
    let mut indexer = Vec::with_capacity(shape.len());
    let mut natural_order = Vec::new();
    for (dim, size) in shape.iter().enumerate() {
        if axis_dims.contains(&dim) {
            indexer.push(DimSelect::All);
            natural_order.push(dim);
        } else {
            let idx = filter_indices.get(&dim).copied().unwrap_or(0);
            indexer.push(DimSelect::At(clamp_index(idx as i64, *size)));
        }
    }
    (indexer, natural_order)
}

fn validate_axes(axis_dims: &[usize], shape: &[usize]) -> CoreResult<()> {
    if axis_dims.is_empty() {
        return Err(CoreError::InvalidJob(
            "at least one axis dimension is required".to_string(),
        ));
    }
    let mut seen = axis_dims.to_vec();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != axis_dims.len() {
        return Err(CoreError::InvalidJob(
            "mapped axis dimensions must be unique".to_string(),
        ));
    }
    for dim in axis_dims {
        if *dim >= shape.len() {
            return Err(CoreError::InvalidJob(format!(
                "axis dim {dim} out of bounds for shape {shape:?}"
            )));
        }
    }
    Ok(())
}

/// Extract the slice from an array given the indexer; the result's dims are
/// the free dims in natural order, column-major like the source.
fn extract(array: &MatArray, indexer: &[DimSelect], natural_order: &[usize]) -> MatArray {
    let out_dims: Vec<usize> = natural_order.iter().map(|d| array.dims[*d]).collect();
    let count: usize = out_dims.iter().product();

    let mut out = Vec::with_capacity(count);
    let mut multi = vec![0usize; natural_order.len()];
    let mut full_index: Vec<usize> = indexer
        .iter()
        .map(|sel| match sel {
            DimSelect::All => 0,
            DimSelect::At(i) => *i,
        })
        .collect();

    for _ in 0..count {
        for (slot, dim) in natural_order.iter().enumerate() {
            full_index[*dim] = multi[slot];
        }
        out.push(array.data[array.offset(&full_index)]);

        // Advance the free-dim multi-index, first dim fastest (column-major).
        for slot in 0..multi.len() {
            multi[slot] += 1;
            if multi[slot] < out_dims[slot] {
                break;
            }
            multi[slot] = 0;
        }
    }

    MatArray {
        dims: out_dims,
        data: out,
        class_name: array.class_name.clone(),
    }
}

/// Transpose a column-major array from `natural_order` dims to the requested
/// `axis_dims` order.
fn normalize_axis_order(values: MatArray, natural_order: &[usize], requested: &[usize]) -> MatArray {
    if natural_order == requested {
        return values;
    }
    // perm[k] = position in natural order of the k-th requested dim.
    let perm: Vec<usize> = requested
        .iter()
        .map(|dim| {
            natural_order
                .iter()
                .position(|d| d == dim)
                .expect("axis dims validated against natural order")
        })
        .collect();

    let out_dims: Vec<usize> = perm.iter().map(|p| values.dims[*p]).collect();
    let count: usize = out_dims.iter().product();

    let mut out = vec![0.0; count];
    let mut out_multi = vec![0usize; out_dims.len()];
    let mut in_multi = vec![0usize; out_dims.len()];
    for slot in out.iter_mut() {
        for (k, p) in perm.iter().enumerate() {
            in_multi[*p] = out_multi[k];
        }
        *slot = values.data[values.offset(&in_multi)];

        for k in 0..out_multi.len() {
            out_multi[k] += 1;
            if out_multi[k] < out_dims[k] {
                break;
            }
            out_multi[k] = 0;
        }
    }

    MatArray {
        dims: out_dims,
        data: out,
        class_name: values.class_name,
    }
}

/// Slice a variable out of an already-flattened value map.
pub fn slice_values(
    values_map: &BTreeMap<String, MatArray>,
    var_name: &str,
    spec: &MatSliceSpec,
    meta: Option<&MatFileIndex>,
) -> CoreResult<MatSlice> {
    let all_names: Vec<String> = values_map.keys().cloned().collect();
    let resolved_var = resolve_name(var_name, &all_names)
        .ok_or_else(|| CoreError::NotFound(format!("variable '{var_name}' in MAT file")))?
        .clone();
    let array = &values_map[&resolved_var];
    let shape = array.dims.clone();

    validate_axes(&spec.axis_dims, &shape)?;

    let vectors = build_coord_vectors(values_map, &shape, &resolved_var, spec, meta);
    let filter_indices = resolve_filters_to_indices(&spec.filters, &vectors);
    let (indexer, natural_order) = build_indexer(&shape, &spec.axis_dims, &filter_indices);

    let cells: usize = natural_order.iter().map(|d| shape[*d]).product();
    if cells > spec.max_cells {
        return Err(CoreError::SliceTooLarge {
            cells,
            max_cells: spec.max_cells,
        });
    }

    let extracted = extract(array, &indexer, &natural_order);
    let values = normalize_axis_order(extracted, &natural_order, &spec.axis_dims);

    let mut coords = BTreeMap::new();
    let mut labels = BTreeMap::new();
    for dim in &spec.axis_dims {
        let vector = &vectors[dim];
        let coord_values = vector
            .values
            .clone()
            .unwrap_or_else(|| (0..vector.size).map(|i| i as f64).collect());
        coords.insert(*dim, coord_values);
        labels.insert(*dim, vector.name.clone());
    }

    Ok(MatSlice {
        coords,
        labels,
        values,
    })
}

/// Slice a variable out of a MAT file on disk.
pub fn read_mat_slice(
    path: &Path,
    var_name: &str,
    spec: &MatSliceSpec,
    meta: Option<&MatFileIndex>,
) -> CoreResult<MatSlice> {
    match sniff_version(path)? {
        MatVersion::Legacy => {
            let file = read_mat(path)?;
            let values_map = flatten_numeric(&file);
            slice_values(&values_map, var_name, spec, meta)
        }
        MatVersion::V73 => read_mat_slice_v73(path, var_name, spec, meta),
    }
}

#[cfg(feature = "mat-v73")]
fn read_mat_slice_v73(
    path: &Path,
    var_name: &str,
    spec: &MatSliceSpec,
    meta: Option<&MatFileIndex>,
) -> CoreResult<MatSlice> {
    let file = hdf5::File::open(path)
        .map_err(|e| CoreError::MatFormat(format!("cannot open v7.3 container: {e}")))?;
    let names = file
        .member_names()
        .map_err(|e| CoreError::MatFormat(format!("cannot list v7.3 members: {e}")))?;

    // v7.3 stores arrays row-major relative to MATLAB's column-major view, so
    // dims come back reversed; reading the full dataset and re-describing it
    // column-major keeps the slicing code shared with the legacy path.
    let mut values_map = BTreeMap::new();
    for name in names.iter().filter(|n| !n.starts_with('#')) {
        let Ok(dataset) = file.dataset(name) else {
            continue;
        };
        let Ok(data) = dataset.read_raw::<f64>() else {
            continue;
        };
        let mut dims = dataset.shape();
        dims.reverse();
        let stored = MatArray {
            dims: dims.clone(),
            data,
            class_name: "double".to_string(),
        };
        // HDF5 raw order is row-major over the reversed dims, which is
        // exactly column-major over `dims`.
        values_map.insert(name.clone(), stored);
    }

    slice_values(&values_map, var_name, spec, meta)
}

#[cfg(not(feature = "mat-v73"))]
fn read_mat_slice_v73(
    _path: &Path,
    _var_name: &str,
    _spec: &MatSliceSpec,
    _meta: Option<&MatFileIndex>,
) -> CoreResult<MatSlice> {
    Err(CoreError::UnsupportedFormat(
        "MATLAB 7.3 containers require the 'mat-v73' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        DEFAULT_MAX_CELLS, MatSliceSpec, build_slice_spec, resolve_filters_to_indices,
        resolve_name, slice_values,
    };
    use crate::error::CoreError;
    use crate::mat::format::MatArray;
    use crate::types::{AxisMapping, ChartType, FilterValue};

    fn cl_fixture() -> BTreeMap<String, MatArray> {
        // CL[i, j, k] = 100i + 10j + k over 3 x 4 x 5, column-major storage.
        let (ni, nj, nk) = (3usize, 4usize, 5usize);
        let mut data = vec![0.0; ni * nj * nk];
        for k in 0..nk {
            for j in 0..nj {
                for i in 0..ni {
                    data[i + j * ni + k * ni * nj] = 100.0 * i as f64 + 10.0 * j as f64 + k as f64;
                }
            }
        }

        let mut map = BTreeMap::new();
        map.insert(
            "CL".to_string(),
            MatArray {
                dims: vec![ni, nj, nk],
                data,
                class_name: "double".to_string(),
            },
        );
        map.insert(
            "alpha".to_string(),
            MatArray {
                dims: vec![ni],
                data: (0..ni).map(|i| i as f64).collect(),
                class_name: "double".to_string(),
            },
        );
        map.insert(
            "beta".to_string(),
            MatArray {
                dims: vec![1, nj],
                data: (0..nj).map(|j| j as f64).collect(),
                class_name: "double".to_string(),
            },
        );
        map.insert(
            "mach".to_string(),
            MatArray {
                dims: vec![nk],
                data: (0..nk).map(|k| 0.1 * k as f64).collect(),
                class_name: "double".to_string(),
            },
        );
        map
    }

    fn spec_free_0_2(beta_filter: FilterValue) -> MatSliceSpec {
        let mut filters = BTreeMap::new();
        filters.insert("beta".to_string(), beta_filter);
        MatSliceSpec {
            axis_dims: vec![0, 2],
            coord_map: BTreeMap::from([
                (0, "alpha".to_string()),
                (1, "beta".to_string()),
                (2, "mach".to_string()),
            ]),
            filters,
            max_cells: DEFAULT_MAX_CELLS,
        }
    }

    #[test]
    fn filtering_beta_returns_alpha_by_mach_plane() {
        let values = cl_fixture();
        let slice =
            slice_values(&values, "CL", &spec_free_0_2(FilterValue::Number(1.0)), None).unwrap();

        assert_eq!(slice.values.dims, vec![3, 5]);
        for i in 0..3 {
            for k in 0..5 {
                let got = slice.values.data[slice.values.offset(&[i, k])];
                assert_eq!(got, 100.0 * i as f64 + 10.0 + k as f64, "at ({i},{k})");
            }
        }
        assert_eq!(slice.labels[&0], "alpha");
        assert_eq!(slice.coords[&2], vec![0.0, 0.1, 0.2, 0.30000000000000004, 0.4]);
    }

    #[test]
    fn requested_axis_order_transposes_the_result() {
        let values = cl_fixture();
        let mut spec = spec_free_0_2(FilterValue::Number(0.0));
        spec.axis_dims = vec![2, 0];

        let slice = slice_values(&values, "CL", &spec, None).unwrap();
        assert_eq!(slice.values.dims, vec![5, 3]);
        // value[(k, i)] must equal CL[i, 0, k].
        assert_eq!(slice.values.data[slice.values.offset(&[4, 2])], 204.0);
    }

    #[test]
    fn nearest_value_filter_resolution() {
        let values = cl_fixture();
        // mach vector is 0.0..0.4; 0.32 resolves to index 3.
        let mut filters = BTreeMap::new();
        filters.insert("mach".to_string(), FilterValue::Number(0.32));
        let spec = MatSliceSpec {
            axis_dims: vec![0, 1],
            coord_map: BTreeMap::from([(2, "mach".to_string())]),
            filters,
            max_cells: DEFAULT_MAX_CELLS,
        };
        let slice = slice_values(&values, "CL", &spec, None).unwrap();
        assert_eq!(slice.values.data[slice.values.offset(&[0, 0])], 3.0);
    }

    #[test]
    fn unmentioned_dims_pin_to_zero() {
        let values = cl_fixture();
        let spec = MatSliceSpec {
            axis_dims: vec![0],
            coord_map: BTreeMap::new(),
            filters: BTreeMap::new(),
            max_cells: DEFAULT_MAX_CELLS,
        };
        let slice = slice_values(&values, "CL", &spec, None).unwrap();
        assert_eq!(slice.values.dims, vec![3]);
        assert_eq!(slice.values.data, vec![0.0, 100.0, 200.0]);
        // No coord vector resolved: labels fall back to dim_N, coords to 0..n.
        assert_eq!(slice.labels[&0], "dim_0");
        assert_eq!(slice.coords[&0], vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn cell_cap_is_enforced_with_observed_count() {
        let values = cl_fixture();
        let mut spec = spec_free_0_2(FilterValue::Number(0.0));
        spec.max_cells = 10;
        match slice_values(&values, "CL", &spec, None).unwrap_err() {
            CoreError::SliceTooLarge { cells, max_cells } => {
                assert_eq!(cells, 15);
                assert_eq!(max_cells, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn index_like_filters_clamp() {
        let values = cl_fixture();
        let coords = super::build_coord_vectors(
            &values,
            &[3, 4, 5],
            "CL",
            &spec_free_0_2(FilterValue::Index(99)),
            None,
        );
        let resolved = resolve_filters_to_indices(
            &BTreeMap::from([("beta".to_string(), FilterValue::Index(99))]),
            &coords,
        );
        assert_eq!(resolved.get(&1), Some(&3));
    }

    #[test]
    fn digit_only_text_acts_as_index() {
        let values = cl_fixture();
        let coords = super::build_coord_vectors(
            &values,
            &[3, 4, 5],
            "CL",
            &spec_free_0_2(FilterValue::Number(0.0)),
            None,
        );
        let resolved = resolve_filters_to_indices(
            &BTreeMap::from([("dim_2".to_string(), FilterValue::Text("2".to_string()))]),
            &coords,
        );
        assert_eq!(resolved.get(&2), Some(&2));
    }

    #[test]
    fn name_resolution_folds_case_and_separators() {
        let names = vec!["Wing.CL".to_string(), "mach".to_string()];
        assert_eq!(resolve_name("wing.cl", &names), Some(&names[0]));
        assert_eq!(resolve_name("Wing/CL", &names), Some(&names[0]));
        assert_eq!(resolve_name("MACH", &names), Some(&names[1]));
        assert_eq!(resolve_name("missing", &names), None);
    }

    #[test]
    fn build_slice_spec_requires_every_axis_key() {
        let mapping = BTreeMap::from([("x".to_string(), AxisMapping { dim: 0, coord: None })]);
        let err = build_slice_spec(ChartType::Heatmap, &mapping, &BTreeMap::new(), 100).unwrap_err();
        assert!(err.to_string().contains("mapping.y"));

        let ok = build_slice_spec(ChartType::Line, &mapping, &BTreeMap::new(), 100).unwrap();
        assert_eq!(ok.axis_dims, vec![0]);
    }

    #[test]
    fn duplicate_mapping_dims_fail() {
        let mapping = BTreeMap::from([
            ("x".to_string(), AxisMapping { dim: 1, coord: None }),
            ("y".to_string(), AxisMapping { dim: 1, coord: None }),
        ]);
        assert!(build_slice_spec(ChartType::Heatmap, &mapping, &BTreeMap::new(), 100).is_err());
    }
}
