//! Pressure level matching against GRIB field descriptions.

use crate::grid::{FieldInfo, GridFormat};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PressureLevel {
    pub label: String,
    pub hpa: i32,
}

impl PressureLevel {
    pub fn new(label: impl Into<String>, hpa: i32) -> Self {
        Self {
            label: label.into(),
            hpa,
        }
    }

    /// Value searched for in field descriptions of the given format.
    ///
    /// GRIB2 describes isobaric levels in Pa, so the hPa value is scaled by 10
    /// and found as a prefix of the Pa figure (700 -> "7000" in "70000 Pa").
    pub fn search_value(&self, format: GridFormat) -> i32 {
        match format {
            GridFormat::Grib1 => self.hpa,
            GridFormat::Grib2 => self.hpa * 10,
        }
    }
}

/// First field whose description contains the level's search value.
pub fn resolve_field<'a>(
    fields: &'a [FieldInfo],
    level: &PressureLevel,
    format: GridFormat,
) -> Option<&'a FieldInfo> {
    let needle = level.search_value(format).to_string();
    fields.iter().find(|f| f.description.contains(&needle))
}
