//! Canonical columnar artifact: snappy-compressed parquet.
//!
//! Ingestion writes one row group per parsed chunk through
//! [`ArtifactWriter`]; every column is `optional double` when numerically
//! coercible and `optional binary (utf8)` otherwise. [`ArtifactReader`] gives
//! batched iteration with column projection, and [`ArtifactReader::read_window`]
//! pushes an X-range down to row-group statistics before filtering rows, which
//! is what keeps deep-zoom raw reads from scanning whole artifacts.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use parquet::basic::{Compression, ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::file::statistics::Statistics;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::types::{Type, TypePtr};
use tempfile::NamedTempFile;

use crate::error::{CoreError, CoreResult};
use crate::frame::{Column, ColumnKind, Frame};

/// Streaming parquet writer over any sink.
pub struct ArtifactWriter<W: Write + Send> {
    writer: SerializedFileWriter<W>,
    names: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows_written: u64,
}

impl ArtifactWriter<File> {
    /// Create an artifact at `path` with the given schema.
    pub fn create(path: &Path, names: &[String], kinds: &[ColumnKind]) -> CoreResult<Self> {
        let file =
            File::create(path).map_err(|e| CoreError::WriteError(format!("{}: {e}", path.display())))?;
        Self::new(file, names, kinds)
    }
}

impl<W: Write + Send> ArtifactWriter<W> {
    /// Create a writer over an arbitrary sink with the given schema.
    pub fn new(sink: W, names: &[String], kinds: &[ColumnKind]) -> CoreResult<Self> {
        let schema = build_schema(names, kinds)?;
        let props = Arc::new(
            WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build(),
        );
        let writer = SerializedFileWriter::new(sink, schema, props)?;
        Ok(Self {
            writer,
            names: names.to_vec(),
            kinds: kinds.to_vec(),
            rows_written: 0,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    /// Write one frame as one row group. The frame must match the schema the
    /// writer was created with.
    pub fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        debug_assert_eq!(frame.names(), self.names.as_slice());
        if frame.is_empty() {
            return Ok(());
        }

        let mut row_group = self.writer.next_row_group()?;
        let mut idx = 0usize;
        while let Some(mut col_writer) = row_group.next_column()? {
            let column = frame.column(idx).ok_or_else(|| {
                CoreError::WriteError(format!("frame is missing column {idx} for artifact schema"))
            })?;

            match self.kinds[idx] {
                ColumnKind::Float64 => {
                    let values = column.numeric();
                    let mut data = Vec::with_capacity(values.len());
                    let mut def_levels = Vec::with_capacity(values.len());
                    for v in values {
                        match v {
                            Some(x) => {
                                data.push(x);
                                def_levels.push(1i16);
                            }
                            None => def_levels.push(0),
                        }
                    }
                    col_writer
                        .typed::<DoubleType>()
                        .write_batch(&data, Some(&def_levels), None)?;
                }
                ColumnKind::Utf8 => {
                    let mut data: Vec<ByteArray> = Vec::new();
                    let mut def_levels: Vec<i16> = Vec::new();
                    match column {
                        Column::Utf8(cells) => {
                            for cell in cells {
                                match cell {
                                    Some(s) => {
                                        data.push(ByteArray::from(s.as_str()));
                                        def_levels.push(1);
                                    }
                                    None => def_levels.push(0),
                                }
                            }
                        }
                        Column::Float64(cells) => {
                            for cell in cells {
                                match cell {
                                    Some(x) => {
                                        data.push(ByteArray::from(x.to_string().as_str()));
                                        def_levels.push(1);
                                    }
                                    None => def_levels.push(0),
                                }
                            }
                        }
                    }
                    col_writer
                        .typed::<ByteArrayType>()
                        .write_batch(&data, Some(&def_levels), None)?;
                }
            }

            col_writer.close()?;
            idx += 1;
        }
        row_group.close()?;
        self.rows_written += frame.len() as u64;
        Ok(())
    }

    /// Finish the file; returns total rows written.
    pub fn close(self) -> CoreResult<u64> {
        self.writer.close()?;
        Ok(self.rows_written)
    }
}

fn build_schema(names: &[String], kinds: &[ColumnKind]) -> CoreResult<TypePtr> {
    let mut fields: Vec<TypePtr> = Vec::with_capacity(names.len());
    for (name, kind) in names.iter().zip(kinds.iter()) {
        let field = match kind {
            ColumnKind::Float64 => Type::primitive_type_builder(name, PhysicalType::DOUBLE)
                .with_repetition(Repetition::OPTIONAL)
                .build()?,
            ColumnKind::Utf8 => Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                .with_converted_type(ConvertedType::UTF8)
                .with_repetition(Repetition::OPTIONAL)
                .build()?,
        };
        fields.push(Arc::new(field));
    }
    let schema = Type::group_type_builder("schema").with_fields(fields).build()?;
    Ok(Arc::new(schema))
}

/// Serialize one frame into an in-memory parquet file (single row group).
pub fn frame_to_parquet_bytes(frame: &Frame) -> CoreResult<Vec<u8>> {
    let mut writer = ArtifactWriter::new(Vec::new(), frame.names(), &frame.kinds())?;
    writer.write_frame(frame)?;
    Ok(writer.writer.into_inner()?)
}

/// Batched parquet reader with column projection and X-range pushdown.
pub struct ArtifactReader {
    reader: SerializedFileReader<File>,
    names: Vec<String>,
    kinds: Vec<ColumnKind>,
    // Keeps the backing temp file alive for spooled streams.
    _spool: Option<NamedTempFile>,
}

impl ArtifactReader {
    /// Open an artifact from a local file.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let file =
            File::open(path).map_err(|e| CoreError::ReadError(format!("{}: {e}", path.display())))?;
        let reader = SerializedFileReader::new(file)?;
        let (names, kinds) = schema_of(&reader);
        Ok(Self {
            reader,
            names,
            kinds,
            _spool: None,
        })
    }

    /// Spool a streamed object to a scratch file and open it.
    pub fn from_stream(mut stream: Box<dyn Read + Send>) -> CoreResult<Self> {
        let mut spool = NamedTempFile::new().map_err(CoreError::Io)?;
        io::copy(&mut stream, spool.as_file_mut()).map_err(CoreError::Io)?;
        let file = spool.reopen().map_err(CoreError::Io)?;
        let reader = SerializedFileReader::new(file)?;
        let (names, kinds) = schema_of(&reader);
        Ok(Self {
            reader,
            names,
            kinds,
            _spool: Some(spool),
        })
    }

    /// Column names in schema order.
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    /// Exact row count from file metadata.
    pub fn num_rows(&self) -> u64 {
        self.reader.metadata().file_metadata().num_rows().max(0) as u64
    }

    /// Read every row group into one frame per group, optionally projecting.
    pub fn frames(&self, projection: Option<&[String]>) -> CoreResult<Vec<Frame>> {
        let groups = self.reader.metadata().num_row_groups();
        let mut out = Vec::with_capacity(groups);
        for i in 0..groups {
            out.push(self.read_row_group(i, projection)?);
        }
        Ok(out)
    }

    /// Read the whole artifact into one frame.
    pub fn read_all(&self, projection: Option<&[String]>) -> CoreResult<Frame> {
        let frames = self.frames(projection)?;
        concat_frames(frames, self.projected_schema(projection)?)
    }

    /// Read only rows with `x_min <= x <= x_max` on `x_axis`, projecting to
    /// `projection`. Row groups whose statistics fall wholly outside the
    /// window are skipped without being decoded.
    pub fn read_window(
        &self,
        projection: &[String],
        x_axis: &str,
        x_min: Option<f64>,
        x_max: Option<f64>,
    ) -> CoreResult<Frame> {
        let x_leaf = self
            .leaf_index(x_axis)
            .ok_or_else(|| CoreError::ColumnNotFound {
                column: x_axis.to_string(),
                context: "artifact window read".to_string(),
            })?;

        let schema = self.projected_schema(Some(projection))?;
        let mut kept = Vec::new();
        for i in 0..self.reader.metadata().num_row_groups() {
            if self.group_outside_window(i, x_leaf, x_min, x_max) {
                continue;
            }
            let frame = self.read_row_group(i, Some(projection))?;
            kept.push(filter_frame_window(&frame, x_axis, x_min, x_max)?);
        }
        concat_frames(kept, schema)
    }

    fn projected_schema(
        &self,
        projection: Option<&[String]>,
    ) -> CoreResult<(Vec<String>, Vec<ColumnKind>)> {
        match projection {
            None => Ok((self.names.clone(), self.kinds.clone())),
            Some(wanted) => {
                let mut names = Vec::new();
                let mut kinds = Vec::new();
                for (name, kind) in self.names.iter().zip(self.kinds.iter()) {
                    if wanted.iter().any(|w| w == name) {
                        names.push(name.clone());
                        kinds.push(*kind);
                    }
                }
                for w in wanted {
                    if !names.contains(w) {
                        return Err(CoreError::ColumnNotFound {
                            column: w.clone(),
                            context: "artifact projection".to_string(),
                        });
                    }
                }
                Ok((names, kinds))
            }
        }
    }

    fn leaf_index(&self, column: &str) -> Option<usize> {
        self.names.iter().position(|n| n == column)
    }

    fn group_outside_window(
        &self,
        group: usize,
        x_leaf: usize,
        x_min: Option<f64>,
        x_max: Option<f64>,
    ) -> bool {
        let meta = self.reader.metadata().row_group(group);
        let Some(stats) = meta.column(x_leaf).statistics() else {
            return false;
        };
        let Statistics::Double(values) = stats else {
            return false;
        };
        let (Some(lo), Some(hi)) = (values.min_opt(), values.max_opt()) else {
            return false;
        };
        if x_min.is_some_and(|min| *hi < min) {
            return true;
        }
        if x_max.is_some_and(|max| *lo > max) {
            return true;
        }
        false
    }

    fn read_row_group(&self, group: usize, projection: Option<&[String]>) -> CoreResult<Frame> {
        let (names, kinds) = self.projected_schema(projection)?;
        let proj_type = self.projection_type(&names)?;
        let group_reader = self.reader.get_row_group(group)?;
        let iter = group_reader.get_row_iter(Some(proj_type))?;

        let mut columns: Vec<Column> = kinds
            .iter()
            .map(|k| match k {
                ColumnKind::Float64 => Column::Float64(Vec::new()),
                ColumnKind::Utf8 => Column::Utf8(Vec::new()),
            })
            .collect();

        for row in iter {
            let row = row?;
            for (i, (_, field)) in row.get_column_iter().enumerate() {
                match &mut columns[i] {
                    Column::Float64(v) => v.push(field_to_f64(field)),
                    Column::Utf8(v) => v.push(field_to_string(field)),
                }
            }
        }

        Ok(Frame::new(names, columns))
    }

    fn projection_type(&self, names: &[String]) -> CoreResult<Type> {
        let root = self
            .reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .root_schema();
        let fields: Vec<TypePtr> = root
            .get_fields()
            .iter()
            .filter(|f| names.iter().any(|n| n == f.name()))
            .cloned()
            .collect();
        Ok(Type::group_type_builder("schema").with_fields(fields).build()?)
    }
}

fn schema_of(reader: &SerializedFileReader<File>) -> (Vec<String>, Vec<ColumnKind>) {
    let root = reader.metadata().file_metadata().schema_descr().root_schema();
    let mut names = Vec::new();
    let mut kinds = Vec::new();
    for field in root.get_fields() {
        names.push(field.name().to_string());
        let kind = if field.is_primitive() {
            match field.get_physical_type() {
                PhysicalType::BYTE_ARRAY
                | PhysicalType::FIXED_LEN_BYTE_ARRAY
                | PhysicalType::BOOLEAN => ColumnKind::Utf8,
                _ => ColumnKind::Float64,
            }
        } else {
            ColumnKind::Utf8
        };
        kinds.push(kind);
    }
    (names, kinds)
}

fn field_to_f64(field: &Field) -> Option<f64> {
    match field {
        Field::Null => None,
        Field::Double(v) => Some(*v),
        Field::Float(v) => Some(f64::from(*v)),
        Field::Int(v) => Some(f64::from(*v)),
        Field::Long(v) => Some(*v as f64),
        Field::Short(v) => Some(f64::from(*v)),
        Field::Byte(v) => Some(f64::from(*v)),
        Field::UInt(v) => Some(f64::from(*v)),
        Field::ULong(v) => Some(*v as f64),
        Field::UShort(v) => Some(f64::from(*v)),
        Field::UByte(v) => Some(f64::from(*v)),
        Field::Str(s) => crate::frame::parse_numeric(s),
        _ => None,
    }
}

fn field_to_string(field: &Field) -> Option<String> {
    match field {
        Field::Null => None,
        Field::Str(s) => Some(s.clone()),
        Field::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn filter_frame_window(
    frame: &Frame,
    x_axis: &str,
    x_min: Option<f64>,
    x_max: Option<f64>,
) -> CoreResult<Frame> {
    if x_min.is_none() && x_max.is_none() {
        return Ok(frame.clone());
    }
    let x = frame.numeric_by_name(x_axis, "window filter")?;
    let keep: Vec<bool> = x
        .iter()
        .map(|v| match v {
            Some(x) => x_min.is_none_or(|lo| *x >= lo) && x_max.is_none_or(|hi| *x <= hi),
            // Keep nulls here; numeric coercion downstream drops them.
            None => true,
        })
        .collect();

    let mut columns = Vec::with_capacity(frame.width());
    for idx in 0..frame.width() {
        let filtered = match frame.column(idx).expect("index in range") {
            Column::Float64(v) => Column::Float64(
                v.iter()
                    .zip(keep.iter())
                    .filter_map(|(cell, k)| k.then_some(*cell))
                    .collect(),
            ),
            Column::Utf8(v) => Column::Utf8(
                v.iter()
                    .zip(keep.iter())
                    .filter_map(|(cell, k)| k.then(|| cell.clone()))
                    .collect(),
            ),
        };
        columns.push(filtered);
    }
    Ok(Frame::new(frame.names().to_vec(), columns))
}

fn concat_frames(frames: Vec<Frame>, schema: (Vec<String>, Vec<ColumnKind>)) -> CoreResult<Frame> {
    let (names, kinds) = schema;
    let mut columns: Vec<Column> = kinds
        .iter()
        .map(|k| match k {
            ColumnKind::Float64 => Column::Float64(Vec::new()),
            ColumnKind::Utf8 => Column::Utf8(Vec::new()),
        })
        .collect();

    for frame in frames {
        for (i, acc) in columns.iter_mut().enumerate() {
            match (acc, frame.column(i)) {
                (Column::Float64(dst), Some(col)) => dst.extend(col.numeric()),
                (Column::Utf8(dst), Some(Column::Utf8(src))) => dst.extend(src.iter().cloned()),
                (Column::Utf8(dst), Some(Column::Float64(src))) => {
                    dst.extend(src.iter().map(|v| v.map(|x| x.to_string())));
                }
                (_, None) => {
                    return Err(CoreError::ReadError(
                        "row group is missing a projected column".to_string(),
                    ));
                }
            }
        }
    }
    Ok(Frame::new(names, columns))
}
