//! NIfTI-1 reading and writing
//!
//! Volumes come in as `Volume<f64>` with their voxel-to-world affine (sform
//! when present, otherwise a voxel-size diagonal). 4D files yield their first
//! volume. Output is always float32 with sform set.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use nalgebra::Matrix4;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{CoregError, Result};
use crate::rigid::voxel_sizes;
use crate::volume::Volume;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Short header summary for error messages
fn describe_header(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Decode a NIfTI-1 image (`.nii` or gzipped `.nii.gz`) from memory
///
/// # Errors
/// `Nifti` when the bytes do not decode, `InvalidDimensions` for images with
/// fewer than three dimensions.
pub fn load_nifti(bytes: &[u8]) -> Result<Volume<f64>> {
    let obj = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = match GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed) {
                Ok(_) => describe_header(&decompressed),
                Err(_) => "could not decompress".to_string(),
            };
            CoregError::Nifti(format!("failed to read gzipped NIfTI: {} ({})", e, info))
        })?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes)).map_err(|e| {
            CoregError::Nifti(format!("failed to read NIfTI: {} ({})", e, describe_header(bytes)))
        })?
    };

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(CoregError::InvalidDimensions(format!(
            "expected a 3D or 4D image, got {}D",
            ndim
        )));
    }
    let affine = header_affine(header);

    let array: Array<f64, IxDyn> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| CoregError::Nifti(format!("failed to convert voxel data: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(CoregError::InvalidDimensions(format!(
            "expected a 3D or 4D array, got shape {:?}",
            shape
        )));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    if shape.len() > 3 {
        info!("{}D image, using the first volume", shape.len());
    }

    // Fortran order: x fastest
    let mut data = Vec::with_capacity(nx * ny * nz);
    let mut index = vec![0usize; shape.len()];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                index[0] = i;
                index[1] = j;
                index[2] = k;
                data.push(array[IxDyn(&index)]);
            }
        }
    }

    debug!("loaded NIfTI {}x{}x{}, voxel size {:?}", nx, ny, nz, voxel_sizes(&affine));
    Volume::new(data, (nx, ny, nz), affine)
}

/// Voxel-to-world transform: sform if set, else scaling by pixdim
fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let (x, y, z) = (&header.srow_x, &header.srow_y, &header.srow_z);
        Matrix4::new(
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        )
    } else {
        let scale = |p: f32| if p > 0.0 { p as f64 } else { 1.0 };
        Matrix4::new(
            scale(header.pixdim[1]), 0.0, 0.0, 0.0,
            0.0, scale(header.pixdim[2]), 0.0, 0.0,
            0.0, 0.0, scale(header.pixdim[3]), 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

/// Encode a volume as an uncompressed single-file NIfTI-1 image (float32)
///
/// # Errors
/// `InvalidDimensions` when an axis does not fit the 16-bit header field.
pub fn save_nifti(volume: &Volume<f64>) -> Result<Vec<u8>> {
    let (nx, ny, nz) = volume.dims;
    let to_i16 = |n: usize| {
        i16::try_from(n).map_err(|_| {
            CoregError::InvalidDimensions(format!("axis length {} exceeds the NIfTI-1 limit", n))
        })
    };
    let dim: [i16; 8] = [3, to_i16(nx)?, to_i16(ny)?, to_i16(nz)?, 1, 1, 1, 1];
    let vox = voxel_sizes(&volume.affine);

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());
    for (i, d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }
    // datatype FLOAT32, bitpix 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, vox[0] as f32, vox[1] as f32, vox[2] as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }
    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());
    // sform_code = scanner anat
    header[254..256].copy_from_slice(&1i16.to_le_bytes());
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(volume.affine[(row, col)] as f32).to_le_bytes());
        }
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(VOX_OFFSET + volume.len() * 4);
    buffer.write_all(&header)?;
    // empty extension block
    buffer.write_all(&[0u8; 4])?;
    for &v in &volume.data {
        buffer.write_all(&(v as f32).to_le_bytes())?;
    }
    Ok(buffer)
}

/// [`save_nifti`] followed by gzip compression
pub fn save_nifti_gz(volume: &Volume<f64>) -> Result<Vec<u8>> {
    let raw = save_nifti(volume)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Read a `.nii` or `.nii.gz` file
pub fn read_nifti_file(path: &Path) -> Result<Volume<f64>> {
    info!("reading {}", path.display());
    let bytes = std::fs::read(path)?;
    load_nifti(&bytes)
}

/// Write a volume; paths ending in `.nii.gz` are gzip compressed
pub fn save_nifti_to_file(path: &Path, volume: &Volume<f64>) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        save_nifti_gz(volume)?
    } else {
        save_nifti(volume)?
    };
    info!("writing {}", path.display());
    std::fs::write(path, &bytes)?;
    Ok(())
}
