use crate::ParseOptions;
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;
use std::path::Path;

/// Parses the SOR file at the given path and returns the record as a JSON
/// string.
#[pyfunction]
fn parse_file(path: String) -> PyResult<String> {
    let record = crate::parse_file(Path::new(&path), &ParseOptions::default())
        .map_err(|err| PyRuntimeError::new_err(err.to_string()))?;
    serde_json::to_string(&record).map_err(|err| PyRuntimeError::new_err(err.to_string()))
}

/// Parses the provided bytestring as a SOR file and returns the record as
/// a JSON string.
#[pyfunction]
fn parse_bytes(bytes: &Bound<'_, PyBytes>) -> PyResult<String> {
    let record = crate::parse_bytes("<bytes>", bytes.as_bytes(), &ParseOptions::default())
        .map_err(|err| PyRuntimeError::new_err(err.to_string()))?;
    serde_json::to_string(&record).map_err(|err| PyRuntimeError::new_err(err.to_string()))
}

/// This module is implemented in Rust.
#[pymodule]
fn sorparse(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(parse_file, m)?)?;
    m.add_function(wrap_pyfunction!(parse_bytes, m)?)?;
    Ok(())
}
