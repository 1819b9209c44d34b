//! MATLAB container support: version sniffing, variable indexing, N-D
//! slicing, and the ingest-side parser that turns a configured slice into a
//! tabular frame.

pub mod format;
pub mod index;
pub mod slice;

pub use format::{MatArray, MatFile, MatValue, MatVersion, read_mat, sniff_version};
pub use index::{MatFileIndex, MatKind, MatVariableIndex, WALK_DEPTH_LIMIT, index_mat};
pub use slice::{
    DEFAULT_MAX_CELLS, MatSlice, MatSliceSpec, build_slice_spec, chart_axis_keys, read_mat_slice,
};

use std::path::Path;

use crate::error::CoreResult;
use crate::frame::{Column, Frame};
use crate::ingestion::{FormatParser, FrameSink, ParserContext};

/// Ingest-side MAT parser.
///
/// Always indexes the container. When the job carries a MAT table config the
/// configured slice is additionally materialized as an X value table: the
/// first free dimension's coordinates become the leading column, and a 2-D
/// slice contributes one `{var}_{k}` column per index along the second free
/// dimension.
#[derive(Debug, Default)]
pub struct MatParser;

impl FormatParser for MatParser {
    fn stream(
        &self,
        source: &Path,
        ctx: &ParserContext<'_>,
        sink: &mut dyn FrameSink,
    ) -> CoreResult<Option<MatFileIndex>> {
        let meta = index_mat(source)?;

        if let Some(config) = ctx.mat_config {
            let spec = MatSliceSpec {
                axis_dims: config.mapping.values().map(|m| m.dim).collect(),
                coord_map: config
                    .mapping
                    .values()
                    .filter_map(|m| m.coord.clone().map(|c| (m.dim, c)))
                    .collect(),
                filters: config.filters.clone(),
                max_cells: DEFAULT_MAX_CELLS,
            };
            let sliced = read_mat_slice(source, &config.var, &spec, Some(&meta))?;
            sink.write_frame(&slice_to_frame(&config.var, &spec, &sliced))?;
        }

        Ok(Some(meta))
    }
}

/// Lay a 1-D or 2-D slice out as a table.
fn slice_to_frame(var: &str, spec: &MatSliceSpec, sliced: &MatSlice) -> Frame {
    let x_dim = spec.axis_dims[0];
    let x_label = sliced.labels.get(&x_dim).cloned().unwrap_or_else(|| "x".to_string());
    let x_coords = sliced.coords.get(&x_dim).cloned().unwrap_or_default();

    let mut frame = Frame::default();
    frame.push_column(x_label, Column::Float64(x_coords.into_iter().map(Some).collect()));

    match sliced.values.dims.as_slice() {
        [_] => {
            frame.push_column(
                var,
                Column::Float64(sliced.values.data.iter().copied().map(Some).collect()),
            );
        }
        [rows, cols] => {
            for col in 0..*cols {
                let mut values = Vec::with_capacity(*rows);
                for row in 0..*rows {
                    values.push(Some(sliced.values.data[sliced.values.offset(&[row, col])]));
                }
                frame.push_column(format!("{var}_{col}"), Column::Float64(values));
            }
        }
        _ => {
            // Higher-rank slices flatten into one value column.
            frame.push_column(
                var,
                Column::Float64(sliced.values.data.iter().copied().map(Some).collect()),
            );
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Write;

    use super::MatParser;
    use crate::ingestion::{CollectSink, FormatParser, ParserContext};
    use crate::mat::format::write_numeric_mat;
    use crate::types::{AxisMapping, MatRequest};

    fn mat_file() -> tempfile::NamedTempFile {
        let cl: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let bytes = write_numeric_mat(&[
            ("CL", &[3, 4], &cl),
            ("alpha", &[3], &[0.0, 1.0, 2.0]),
            ("mach", &[4], &[0.3, 0.5, 0.7, 0.9]),
        ]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file
    }

    #[test]
    fn without_config_only_metadata_is_produced() {
        let file = mat_file();
        let mut sink = CollectSink::default();
        let meta = MatParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap()
            .unwrap();
        assert!(sink.frames.is_empty());
        assert!(meta.variables.iter().any(|v| v.name == "CL"));
    }

    #[test]
    fn config_materializes_an_x_value_table() {
        let file = mat_file();
        let request = MatRequest {
            job_id: String::new(),
            var: "CL".to_string(),
            mapping: BTreeMap::from([(
                "x".to_string(),
                AxisMapping {
                    dim: 0,
                    coord: Some("alpha".to_string()),
                },
            )]),
            filters: BTreeMap::new(),
        };
        let ctx = ParserContext {
            mat_config: Some(&request),
            ..Default::default()
        };

        let mut sink = CollectSink::default();
        MatParser.stream(file.path(), &ctx, &mut sink).unwrap();

        let frame = &sink.frames[0];
        assert_eq!(frame.names(), ["alpha", "CL"]);
        // Free dim 0, other dims pinned to 0: column 0 of the 3x4 array.
        assert_eq!(
            frame.numeric_by_name("CL", "test").unwrap(),
            vec![Some(0.0), Some(1.0), Some(2.0)]
        );
    }
}
