//! MAT variable indexing and coordinate-name guessing.
//!
//! The walker flattens a parsed container into dotted/bracketed paths
//! (`wing.loads[0].CL`), recording shape/dtype/kind per reachable value.
//! Coordinate guessing then matches every dimension of every N-D numeric
//! array against same-length vectors, ranked by a fixed priority list.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

use super::format::{MatArray, MatFile, MatValue, MatVersion, read_mat, sniff_version};

/// Recursion limit for the legacy walker.
pub const WALK_DEPTH_LIMIT: usize = 16;

/// Coordinate-name priority, checked before lexicographic order.
const COORD_PRIORITY: [&str; 11] = [
    "x", "y", "z", "time", "t", "alpha", "beta", "mach", "lat", "lon", "alt",
];

/// Classification of an indexed variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatKind {
    NumericArray,
    Struct,
    Cell,
    Unsupported,
}

/// One reachable variable in a MAT container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatVariableIndex {
    pub name: String,
    pub shape: Vec<usize>,
    pub ndim: usize,
    pub dtype: String,
    pub kind: MatKind,
    /// Best coordinate-vector guess per dimension.
    #[serde(default)]
    pub coords_guess: Vec<Option<String>>,
    /// All same-length candidates per dimension, keyed by dimension index.
    #[serde(default)]
    pub coord_candidates: BTreeMap<String, Vec<String>>,
}

/// Index of every reachable variable plus per-variable coordinate guesses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MatFileIndex {
    pub version: String,
    pub variables: Vec<MatVariableIndex>,
    /// Per-variable best guesses (mirrors `variables[..].coords_guess`).
    #[serde(default)]
    pub coords_guess: BTreeMap<String, Vec<Option<String>>>,
}

impl MatFileIndex {
    /// Guessed coordinate name for one dimension of one variable.
    pub fn coord_guess(&self, var: &str, dim: usize) -> Option<&str> {
        self.coords_guess
            .get(var)
            .and_then(|dims| dims.get(dim))
            .and_then(|v| v.as_deref())
    }
}

/// Index a MAT file on disk, dispatching on the sniffed version.
pub fn index_mat(path: &Path) -> CoreResult<MatFileIndex> {
    match sniff_version(path)? {
        MatVersion::Legacy => {
            let file = read_mat(path)?;
            Ok(index_parsed(&file, "legacy"))
        }
        MatVersion::V73 => index_v73(path),
    }
}

/// Build the index from an already-parsed legacy container.
pub fn index_parsed(file: &MatFile, version: &str) -> MatFileIndex {
    let mut variables: Vec<MatVariableIndex> = Vec::new();
    for (name, value) in &file.variables {
        walk(name, value, 0, &mut variables);
    }
    variables.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    let mut index = MatFileIndex {
        version: version.to_string(),
        variables,
        coords_guess: BTreeMap::new(),
    };
    attach_coord_guesses(&mut index);
    index
}

/// Flatten numeric values reachable in a legacy container, by indexed path.
pub fn flatten_numeric(file: &MatFile) -> BTreeMap<String, MatArray> {
    let mut out = BTreeMap::new();
    for (name, value) in &file.variables {
        flatten_value(name, value, 0, &mut out);
    }
    out
}

fn flatten_value(path: &str, value: &MatValue, depth: usize, out: &mut BTreeMap<String, MatArray>) {
    if depth > WALK_DEPTH_LIMIT || path.is_empty() {
        return;
    }
    match value {
        MatValue::Numeric(arr) => {
            out.entry(path.to_string()).or_insert_with(|| arr.clone());
        }
        MatValue::Struct {
            fields, elements, ..
        } => {
            for (i, element) in elements.iter().enumerate() {
                for (field, child) in fields.iter().zip(element.iter()) {
                    let next = if elements.len() == 1 {
                        format!("{path}.{field}")
                    } else {
                        format!("{path}[{i}].{field}")
                    };
                    flatten_value(&next, child, depth + 1, out);
                }
            }
        }
        MatValue::Cell { elements, .. } => {
            for (i, child) in elements.iter().enumerate() {
                flatten_value(&format!("{path}[{i}]"), child, depth + 1, out);
            }
        }
        MatValue::Unsupported { .. } => {}
    }
}

fn walk(path: &str, value: &MatValue, depth: usize, out: &mut Vec<MatVariableIndex>) {
    if depth > WALK_DEPTH_LIMIT || path.is_empty() {
        return;
    }
    match value {
        MatValue::Numeric(arr) => out.push(MatVariableIndex {
            name: path.to_string(),
            shape: arr.dims.clone(),
            ndim: arr.dims.len(),
            dtype: arr.class_name.clone(),
            kind: MatKind::NumericArray,
            coords_guess: Vec::new(),
            coord_candidates: BTreeMap::new(),
        }),
        MatValue::Struct {
            dims,
            fields,
            elements,
        } => {
            out.push(MatVariableIndex {
                name: path.to_string(),
                shape: dims.clone(),
                ndim: dims.len(),
                dtype: "struct".to_string(),
                kind: MatKind::Struct,
                coords_guess: Vec::new(),
                coord_candidates: BTreeMap::new(),
            });
            for (i, element) in elements.iter().enumerate() {
                for (field, child) in fields.iter().zip(element.iter()) {
                    let next = if elements.len() == 1 {
                        format!("{path}.{field}")
                    } else {
                        format!("{path}[{i}].{field}")
                    };
                    walk(&next, child, depth + 1, out);
                }
            }
        }
        MatValue::Cell { dims, elements } => {
            out.push(MatVariableIndex {
                name: path.to_string(),
                shape: dims.clone(),
                ndim: dims.len(),
                dtype: "cell".to_string(),
                kind: MatKind::Cell,
                coords_guess: Vec::new(),
                coord_candidates: BTreeMap::new(),
            });
            for (i, child) in elements.iter().enumerate() {
                walk(&format!("{path}[{i}]"), child, depth + 1, out);
            }
        }
        MatValue::Unsupported { class_name, dims } => out.push(MatVariableIndex {
            name: path.to_string(),
            shape: dims.clone(),
            ndim: dims.len(),
            dtype: class_name.clone(),
            kind: MatKind::Unsupported,
            coords_guess: Vec::new(),
            coord_candidates: BTreeMap::new(),
        }),
    }
}

/// Length of a variable treated as a coordinate vector: 1-D arrays, or 2-D
/// arrays with a singleton dimension.
fn vector_length(shape: &[usize]) -> Option<usize> {
    match shape {
        [n] => Some(*n),
        [1, n] | [n, 1] => Some(*n),
        _ => None,
    }
}

fn choose_guess(candidates: &[String]) -> Option<String> {
    let mut ranked: Vec<&String> = candidates.iter().collect();
    ranked.sort_by_key(|name| {
        let lower = name.to_lowercase();
        (!COORD_PRIORITY.contains(&lower.as_str()), lower)
    });
    ranked.first().map(|s| (*s).clone())
}

fn attach_coord_guesses(index: &mut MatFileIndex) {
    let mut vectors_by_len: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for variable in &index.variables {
        if variable.kind != MatKind::NumericArray {
            continue;
        }
        if let Some(len) = vector_length(&variable.shape) {
            vectors_by_len.entry(len).or_default().push(variable.name.clone());
        }
    }

    let mut guesses: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();
    for variable in &mut index.variables {
        if variable.kind != MatKind::NumericArray || variable.ndim == 0 {
            continue;
        }

        let mut per_dim = Vec::with_capacity(variable.ndim);
        for (dim, size) in variable.shape.iter().enumerate() {
            let mut candidates: Vec<String> = vectors_by_len
                .get(size)
                .map(|names| {
                    names
                        .iter()
                        .filter(|n| *n != &variable.name)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            candidates.sort();
            candidates.dedup();

            per_dim.push(choose_guess(&candidates));
            variable
                .coord_candidates
                .insert(dim.to_string(), candidates);
        }

        variable.coords_guess = per_dim.clone();
        guesses.insert(variable.name.clone(), per_dim);
    }
    index.coords_guess = guesses;
}

#[cfg(feature = "mat-v73")]
fn index_v73(path: &Path) -> CoreResult<MatFileIndex> {
    let file = hdf5::File::open(path)
        .map_err(|e| CoreError::MatFormat(format!("cannot open v7.3 container: {e}")))?;

    let mut variables = Vec::new();
    let mut names = file
        .member_names()
        .map_err(|e| CoreError::MatFormat(format!("cannot list v7.3 members: {e}")))?;
    names.sort_by_key(|n| n.to_lowercase());

    for name in names {
        if name.starts_with('#') {
            continue;
        }
        let (kind, dtype, shape) = match file.dataset(&name) {
            Ok(dataset) => {
                let matlab_class = dataset
                    .attr("MATLAB_class")
                    .and_then(|a| a.read_scalar::<hdf5::types::VarLenUnicode>())
                    .map(|s| s.as_str().to_lowercase())
                    .unwrap_or_default();
                let shape = dataset.shape();
                match matlab_class.as_str() {
                    "cell" => (MatKind::Cell, matlab_class, shape),
                    "struct" => (MatKind::Struct, matlab_class, shape),
                    "char" => (MatKind::Unsupported, matlab_class, shape),
                    _ => (
                        MatKind::NumericArray,
                        if matlab_class.is_empty() {
                            "double".to_string()
                        } else {
                            matlab_class
                        },
                        shape,
                    ),
                }
            }
            // Groups with no dataset shape are struct-like containers.
            Err(_) => (MatKind::Struct, "group".to_string(), Vec::new()),
        };

        variables.push(MatVariableIndex {
            name,
            ndim: shape.len(),
            shape,
            dtype,
            kind,
            coords_guess: Vec::new(),
            coord_candidates: BTreeMap::new(),
        });
    }

    let mut index = MatFileIndex {
        version: "v7.3".to_string(),
        variables,
        coords_guess: BTreeMap::new(),
    };
    attach_coord_guesses(&mut index);
    Ok(index)
}

#[cfg(not(feature = "mat-v73"))]
fn index_v73(_path: &Path) -> CoreResult<MatFileIndex> {
    Err(CoreError::UnsupportedFormat(
        "MATLAB 7.3 containers require the 'mat-v73' feature".to_string(),
    ))
}
