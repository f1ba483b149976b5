//! Flat binary matrix files.
//!
//! A matrix file is a headerless sequence of little-endian IEEE-754 `f32` values in
//! column-major (Fortran) order. The file does not record its shape: readers are
//! told the row count and infer the column count from the file length.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use ndarray::{Array2, ArrayView2, ShapeBuilder, ShapeError};
use thiserror::Error;

const VALUE_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug)]
pub enum MatrixIoError {
    #[error("File '{}' does not exist.", .0.display())]
    FileNotFound(PathBuf),

    #[error("Directory '{}' does not exist.", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "File '{}' is {bytes} bytes long, which is not a whole number of f32 values.",
        .path.display()
    )]
    TruncatedFile { path: PathBuf, bytes: usize },

    #[error(
        "File '{}' holds {values} values, which cannot be arranged into {rows} rows.",
        .path.display()
    )]
    RowCountMismatch {
        path: PathBuf,
        values: usize,
        rows: usize,
    },

    #[error("The row count of '{}' must be positive.", .0.display())]
    ZeroRows(PathBuf),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> MatrixIoError + '_ {
    move |source| MatrixIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Errors unless `path` names an existing regular file.
pub fn check_file_exists(path: &Path) -> Result<(), MatrixIoError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MatrixIoError::FileNotFound(path.to_path_buf()))
    }
}

/// Errors unless the directory an output file would be written to exists. A bare
/// file name refers to the working directory and always passes.
pub fn check_dir_exists(path: &Path) -> Result<(), MatrixIoError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(MatrixIoError::DirectoryNotFound(parent.to_path_buf()))
        }
        _ => Ok(()),
    }
}

/// Reads a column-major `f32` file into an `(nrows × n)` matrix.
pub fn read_matrix(path: &Path, nrows: usize) -> Result<Array2<f64>, MatrixIoError> {
    if nrows == 0 {
        return Err(MatrixIoError::ZeroRows(path.to_path_buf()));
    }
    check_file_exists(path)?;

    let file = File::open(path).map_err(io_error(path))?;
    let bytes = file.metadata().map_err(io_error(path))?.len() as usize;
    if bytes == 0 {
        return Ok(Array2::zeros((nrows, 0)));
    }
    if bytes % VALUE_BYTES != 0 {
        return Err(MatrixIoError::TruncatedFile {
            path: path.to_path_buf(),
            bytes,
        });
    }
    let values = bytes / VALUE_BYTES;
    if values % nrows != 0 {
        return Err(MatrixIoError::RowCountMismatch {
            path: path.to_path_buf(),
            values,
            rows: nrows,
        });
    }

    // The mapping is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_error(path))?;
    let data: Vec<f64> = mmap
        .chunks_exact(VALUE_BYTES)
        .map(|chunk| f64::from(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect();

    let ncols = values / nrows;
    log::debug!("Read {nrows}x{ncols} matrix from {}", path.display());
    Ok(Array2::from_shape_vec((nrows, ncols).f(), data)?)
}

/// Writes `matrix` as column-major little-endian `f32`, narrowing each value.
pub fn write_matrix(path: &Path, matrix: ArrayView2<f64>) -> Result<(), MatrixIoError> {
    check_dir_exists(path)?;
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);

    for column in matrix.columns() {
        for &value in column {
            writer
                .write_all(&(value as f32).to_le_bytes())
                .map_err(io_error(path))?;
        }
    }
    writer.flush().map_err(io_error(path))?;
    log::debug!(
        "Wrote {}x{} matrix to {}",
        matrix.nrows(),
        matrix.ncols(),
        path.display()
    );
    Ok(())
}
