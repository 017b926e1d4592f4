//! Format-neutral access to the wind fields of a decoded grid file.

use crate::geo::BoundingBox;
use crate::{grib1, grib2};
use std::path::Path;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridFormat {
    Grib1,
    Grib2,
}

impl GridFormat {
    /// Format from a file name or URL extension (`.grb` or `.grb2`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.rsplit('.').next()? {
            "grb" => Some(GridFormat::Grib1),
            "grb2" => Some(GridFormat::Grib2),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            GridFormat::Grib1 => "grb",
            GridFormat::Grib2 => "grb2",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindComponent {
    U,
    V,
}

impl WindComponent {
    pub fn name(&self) -> &'static str {
        match self {
            WindComponent::U => "U component of wind",
            WindComponent::V => "V component of wind",
        }
    }
}

/// A wind field of a grid file: its position and a textual description.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub index: usize,
    pub description: String,
}

/// Grid points of one field falling inside a bounding box.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridWindow {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub values: Vec<f64>,
}

impl GridWindow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, lat: f64, lon: f64, value: f64) {
        self.lats.push(lat);
        self.lons.push(lon);
        self.values.push(value);
    }
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("GRIB2 error {0}")]
    Grib2(#[from] grib::GribError),

    #[error("malformed GRIB1 message at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("no field with index {0}")]
    NoSuchField(usize),
}

pub fn malformed(offset: usize, reason: impl ToString) -> GridError {
    GridError::Malformed {
        offset,
        reason: reason.to_string(),
    }
}

/// Decoded grid file exposing its U and V wind fields.
pub trait GridFile {
    fn format(&self) -> GridFormat;

    /// Fields of the given component, in file order.
    fn fields(&self, component: WindComponent) -> Vec<FieldInfo>;

    /// Read a field restricted to the grid points inside `window`.
    fn read_window(&self, field: &FieldInfo, window: &BoundingBox) -> Result<GridWindow, GridError>;
}

/// Open a grid file with the decoder matching `format`.
pub fn open(path: &Path, format: GridFormat) -> Result<Box<dyn GridFile>, GridError> {
    match format {
        GridFormat::Grib1 => Ok(Box::new(grib1::Grib1File::open(path)?)),
        GridFormat::Grib2 => Ok(Box::new(grib2::Grib2File::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name() {
        assert_eq!(
            GridFormat::from_name("namanl_218_20190101_0000_000.grb2"),
            Some(GridFormat::Grib2)
        );
        assert_eq!(
            GridFormat::from_name("https://host/a/b/namanl_218_20190101_0000_000.grb"),
            Some(GridFormat::Grib1)
        );
        assert_eq!(GridFormat::from_name("index.html"), None);
        assert_eq!(GridFormat::from_name("noext"), None);
    }

    #[test]
    fn test_open_grib1_file() {
        use crate::grib1::tests::latlon_message;
        use std::io::Write;

        let packed: Vec<u8> = (0..12).collect();
        let mut tmp = tempfile::Builder::new().suffix(".grb").tempfile().unwrap();
        tmp.write_all(&latlon_message(33, 700, 0, &packed, None)).unwrap();
        tmp.write_all(&latlon_message(34, 700, 0, &packed, None)).unwrap();
        tmp.flush().unwrap();

        let format = GridFormat::from_name(&tmp.path().to_string_lossy()).unwrap();
        let grid = open(tmp.path(), format).unwrap();
        assert_eq!(grid.format(), GridFormat::Grib1);
        assert_eq!(grid.fields(WindComponent::U).len(), 1);
        assert_eq!(grid.fields(WindComponent::V).len(), 1);
    }

    #[test]
    fn test_open_garbage_as_grib2_fails() {
        let tmp = tempfile::Builder::new().suffix(".grb2").tempfile().unwrap();
        std::fs::write(tmp.path(), b"<html>not found</html>").unwrap();
        assert!(matches!(
            open(tmp.path(), GridFormat::Grib2),
            Err(GridError::Malformed { .. })
        ));
    }

    #[test]
    fn test_window_push() {
        let mut window = GridWindow::default();
        assert!(window.is_empty());
        window.push(1.0, 2.0, 3.0);
        assert_eq!(window.len(), 1);
        assert_eq!(window.lats, vec![1.0]);
        assert_eq!(window.lons, vec![2.0]);
    }
}
