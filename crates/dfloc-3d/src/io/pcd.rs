use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read or write the PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header
    #[error("Unsupported PCD header")]
    UnsupportedProperty,

    /// Malformed PCD header
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Unsupported data section encoding
    #[error("Unsupported PCD data encoding: {0}")]
    UnsupportedData(String),

    /// A data record could not be parsed
    #[error("Malformed PCD data record at point {0}")]
    MalformedData(usize),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PcdData {
    Ascii,
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    offset: usize, // byte offset within a binary point
    column: usize, // first column within an ascii point
    size: usize,   // size of one element (bytes)
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize, // total bytes per point
    num_points: usize, // number of points
    data: PcdData,
}

impl PcdLayout {
    fn get_field(&self, name: &str) -> Result<&PcdField, PcdError> {
        self.fields.get(name).ok_or(PcdError::UnsupportedProperty)
    }
}

/// Read a little-endian float of 4 or 8 bytes from a byte buffer
#[inline]
fn read_float(buf: &[u8], field: &PcdField) -> Result<f64, PcdError> {
    let slice = buf
        .get(field.offset..field.offset + field.size)
        .ok_or(PcdError::UnsupportedProperty)?;
    match field.size {
        4 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(slice);
            Ok(f32::from_le_bytes(bytes) as f64)
        }
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(slice);
            Ok(f64::from_le_bytes(bytes))
        }
        _ => Err(PcdError::UnsupportedProperty),
    }
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut points = 0usize;

    let data = loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("binary") => break PcdData::Binary,
                Some("ascii") => break PcdData::Ascii,
                other => {
                    return Err(PcdError::UnsupportedData(
                        other.unwrap_or_default().to_string(),
                    ))
                }
            },
            Some("SIZE") => {
                sizes = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::UnsupportedProperty))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::UnsupportedProperty))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("COUNT") => {
                counts = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::UnsupportedProperty))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("POINTS") => {
                let token = it.next().ok_or(PcdError::UnsupportedProperty)?;
                points = token
                    .parse::<usize>()
                    .map_err(|_| PcdError::UnsupportedProperty)?;
            }
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            _ => {}
        }
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::UnsupportedProperty);
    }

    // Compute byte offsets and ascii columns for each field
    let mut offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        // COUNT defaults to 1 when omitted
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];

        if matches!(name.as_str(), "x" | "y" | "z")
            && !((size == 4 || size == 8) && count == 1 && types[i] == 'F')
        {
            return Err(PcdError::UnsupportedProperty);
        }

        let field_bytes = size.checked_mul(count).ok_or(PcdError::MalformedHeader)?;

        if fields
            .insert(
                name.clone(),
                PcdField {
                    offset,
                    column,
                    size,
                },
            )
            .is_some()
        {
            return Err(PcdError::MalformedHeader);
        }

        offset = offset
            .checked_add(field_bytes)
            .ok_or(PcdError::MalformedHeader)?;
        column += count;

        if offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader);
        }
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points: points,
        data,
    })
}

/// Read a PCD file with `DATA binary` or `DATA ascii` encoding.
///
/// Only the `x`, `y` and `z` fields are read; they must be floats of 4 or 8
/// bytes. Points with non finite coordinates are skipped.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let Some(file_ext) = path.as_ref().extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let layout = parse_pcd_layout(&mut reader)?;

    if layout.num_points == 0 || layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    let points = match layout.data {
        PcdData::Binary => read_binary_body(&mut reader, &layout)?,
        PcdData::Ascii => read_ascii_body(&mut reader, &layout)?,
    };

    let skipped = layout.num_points - points.len();
    if skipped > 0 {
        log::debug!("Skipped {} non finite PCD points", skipped);
    }

    Ok(PointCloud::new(points))
}

fn read_binary_body<R: Read>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<Vec<[f64; 3]>, PcdError> {
    let fx = layout.get_field("x")?;
    let fy = layout.get_field("y")?;
    let fz = layout.get_field("z")?;

    if layout.point_step == 0 {
        return Err(PcdError::MalformedHeader);
    }

    let mut buffer = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.num_points);

    for _ in 0..layout.num_points {
        reader.read_exact(&mut buffer)?;
        let point = [
            read_float(&buffer, fx)?,
            read_float(&buffer, fy)?,
            read_float(&buffer, fz)?,
        ];
        if point.iter().all(|v| v.is_finite()) {
            points.push(point);
        }
    }

    Ok(points)
}

fn read_ascii_body<R: BufRead>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<Vec<[f64; 3]>, PcdError> {
    let columns = [
        layout.get_field("x")?.column,
        layout.get_field("y")?.column,
        layout.get_field("z")?.column,
    ];

    let mut points = Vec::with_capacity(layout.num_points);
    let mut index = 0usize;
    let mut line = String::new();

    while index < layout.num_points {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::MalformedData(index));
        }
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        if tokens.is_empty() {
            continue;
        }

        let mut point = [0.0; 3];
        for (value, column) in point.iter_mut().zip(columns.iter()) {
            *value = tokens
                .get(*column)
                .and_then(|t| t.parse::<f64>().ok())
                .ok_or(PcdError::MalformedData(index))?;
        }
        if point.iter().all(|v| v.is_finite()) {
            points.push(point);
        }
        index += 1;
    }

    Ok(points)
}

/// Write a point cloud as a binary PCD file with `x y z` float fields.
///
/// # Arguments
/// * `path` - Path of the `.pcd` file to create.
/// * `pointcloud` - The points to write.
pub fn write_pcd_binary(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), PcdError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    let n = pointcloud.len();
    write!(
        writer,
        "# .PCD v0.7 - Point Cloud Data file format\n\
         VERSION 0.7\n\
         FIELDS x y z\n\
         SIZE 4 4 4\n\
         TYPE F F F\n\
         COUNT 1 1 1\n\
         WIDTH {n}\n\
         HEIGHT 1\n\
         VIEWPOINT 0 0 0 1 0 0 0\n\
         POINTS {n}\n\
         DATA binary\n"
    )?;

    for point in pointcloud.points() {
        for value in point {
            writer.write_all(&(*value as f32).to_le_bytes())?;
        }
    }
    writer.flush()?;

    Ok(())
}
