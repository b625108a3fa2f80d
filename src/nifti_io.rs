//! NIfTI-1 volume I/O
//!
//! Reads `.nii` and `.nii.gz` files of any dimensionality into `ndarray`
//! arrays in file dimension order, and writes float32 single-file NIfTI-1
//! volumes (gzip-compressed when the path ends in `.gz`).
//!
//! Voxel data on disk are in Fortran order (first axis fastest). The affine is
//! a row-major 4x4 matrix taken from the sform when present.

use crate::error::{ClusterTestError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, Array5, ArrayD, ArrayViewD, Ix5};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};
use std::io::{Cursor, Write};
use std::path::Path;

/// Row-major 4x4 voxel-to-world transform
pub type Affine = [f64; 16];

pub const IDENTITY_AFFINE: Affine = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;
const DT_FLOAT32: i16 = 16;
const MAX_DIMS: usize = 7;

/// A loaded volume with its geometry
#[derive(Debug, Clone)]
pub struct NiftiVolume {
    /// Voxel data in file dimension order
    pub data: ArrayD<f64>,
    pub affine: Affine,
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Affine from the header: sform when set, otherwise voxel-size scaling
fn header_affine(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let (s, t, u) = (&header.srow_x, &header.srow_y, &header.srow_z);
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64, //
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64, //
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64, //
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        let mut affine = IDENTITY_AFFINE;
        affine[0] = header.pixdim[1] as f64;
        affine[5] = header.pixdim[2] as f64;
        affine[10] = header.pixdim[3] as f64;
        affine
    }
}

/// Voxel sizes implied by the affine's spatial columns
fn voxel_size(affine: &Affine) -> [f32; 3] {
    let column = |c: usize| {
        (affine[c] * affine[c] + affine[4 + c] * affine[4 + c] + affine[8 + c] * affine[8 + c])
            .sqrt() as f32
    };
    [column(0), column(1), column(2)]
}

/// Decode a NIfTI volume from bytes (gzip auto-detected)
pub fn read_volume_bytes(bytes: &[u8]) -> Result<NiftiVolume> {
    let obj = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))?
    };

    let affine = header_affine(obj.header());
    let data: ArrayD<f64> = obj.into_volume().into_ndarray()?;

    tracing::debug!("Decoded NIfTI volume with shape {:?}", data.shape());

    Ok(NiftiVolume { data, affine })
}

/// Load a `.nii` or `.nii.gz` file
pub fn load_volume(path: &Path) -> Result<NiftiVolume> {
    let bytes = std::fs::read(path)?;
    read_volume_bytes(&bytes)
}

/// Load one condition as a (subjects, time, X, Y, Z) array
pub fn load_condition(path: &Path) -> Result<(Array5<f64>, Affine)> {
    let volume = load_volume(path)?;
    let shape = volume.data.shape().to_vec();
    let data = volume
        .data
        .into_dimensionality::<Ix5>()
        .map_err(|_| {
            ClusterTestError::InvalidDimensions(format!(
                "{}: expected 5D (subjects, time, X, Y, Z) data, got shape {:?}",
                path.display(),
                shape
            ))
        })?;
    Ok((data, volume.affine))
}

/// Encode an array as an uncompressed single-file NIfTI-1 (float32)
pub fn encode_volume(data: ArrayViewD<'_, f64>, affine: &Affine) -> Result<Vec<u8>> {
    let shape = data.shape();
    if shape.is_empty() || shape.len() > MAX_DIMS {
        return Err(ClusterTestError::InvalidDimensions(format!(
            "NIfTI supports 1 to {} dimensions, got {}",
            MAX_DIMS,
            shape.len()
        )));
    }

    let mut dim = [1i16; 8];
    dim[0] = shape.len() as i16;
    for (slot, &extent) in dim[1..].iter_mut().zip(shape) {
        *slot = i16::try_from(extent).map_err(|_| {
            ClusterTestError::InvalidDimensions(format!(
                "extent {} exceeds the NIfTI-1 limit of {}",
                extent,
                i16::MAX
            ))
        })?;
    }

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    header[70..72].copy_from_slice(&DT_FLOAT32.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let [vx, vy, vz] = voxel_size(affine);
    let pixdim: [f32; 8] = [1.0, vx, vy, vz, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    for (row, base) in [280usize, 296, 312].into_iter().enumerate() {
        for col in 0..4 {
            let offset = base + col * 4;
            header[offset..offset + 4]
                .copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(VOX_OFFSET + data.len() * 4);
    buffer.write_all(&header)?;
    buffer.write_all(&[0u8; VOX_OFFSET - HEADER_SIZE])?;

    // Reversed axes iterate the first original axis fastest
    for &value in data.t().iter() {
        buffer.write_all(&(value as f32).to_le_bytes())?;
    }

    Ok(buffer)
}

/// Write a volume to `path`, gzip-compressed when the name ends in `.gz`
pub fn save_volume(path: &Path, data: ArrayViewD<'_, f64>, affine: &Affine) -> Result<()> {
    let encoded = encode_volume(data, affine)?;

    let gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded)?;
        std::fs::write(path, encoder.finish()?)?;
    } else {
        std::fs::write(path, encoded)?;
    }

    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Convenience for callers holding an owned array of any dimension
pub fn save_array<D: ndarray::Dimension>(
    path: &Path,
    data: &Array<f64, D>,
    affine: &Affine,
) -> Result<()> {
    save_volume(path, data.view().into_dyn(), affine)
}
