//! GRIB edition 2 wind fields, decoded with the `grib` crate.

use crate::geo::{normalize_lon, BoundingBox};
use crate::grid::{malformed, FieldInfo, GridError, GridFile, GridFormat, GridWindow, WindComponent};
use grib::Grib2SubmessageDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

// Wind component parameters in GRIB2:
// Discipline 0 (Meteorological), Category 2 (Momentum)
// Parameter 2 = U-component, Parameter 3 = V-component
const DISCIPLINE_METEOROLOGICAL: u8 = 0;
const CATEGORY_MOMENTUM: u8 = 2;
const PARAM_U_WIND: u8 = 2;
const PARAM_V_WIND: u8 = 3;

const SURFACE_ISOBARIC: u8 = 100;
const SURFACE_HEIGHT_ABOVE_GROUND: u8 = 103;

type Reader = grib::SeekableGrib2Reader<BufReader<File>>;

struct WindField {
    key: (usize, usize),
    component: WindComponent,
    description: String,
}

pub struct Grib2File {
    grib: grib::Grib2<Reader>,
    fields: Vec<WindField>,
}

impl Grib2File {
    pub fn open(path: &Path) -> Result<Self, GridError> {
        let reader = BufReader::new(File::open(path)?);
        let grib = grib::from_reader(reader)?;

        let mut fields = Vec::new();
        let mut submessages = 0;
        for (key, submessage) in grib.iter() {
            submessages += 1;
            if submessage.indicator().discipline != DISCIPLINE_METEOROLOGICAL {
                continue;
            }
            let prod_def = submessage.prod_def();
            if prod_def.parameter_category() != Some(CATEGORY_MOMENTUM) {
                continue;
            }
            let component = match prod_def.parameter_number() {
                Some(PARAM_U_WIND) => WindComponent::U,
                Some(PARAM_V_WIND) => WindComponent::V,
                _ => continue,
            };
            let level = match prod_def.fixed_surfaces() {
                Some((first, _)) => {
                    describe_surface(first.surface_type, first.scale_factor, first.scaled_value)
                }
                None => "unknown level".to_string(),
            };
            fields.push(WindField {
                key,
                component,
                description: format!("{}:m s**-1:{}", component.name(), level),
            });
        }

        if submessages == 0 {
            return Err(malformed(0, "no GRIB2 message found"));
        }

        log::debug!("GRIB2: {} submessages, {} wind fields", submessages, fields.len());
        Ok(Self { grib, fields })
    }
}

impl GridFile for Grib2File {
    fn format(&self) -> GridFormat {
        GridFormat::Grib2
    }

    fn fields(&self, component: WindComponent) -> Vec<FieldInfo> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.component == component)
            .map(|(index, f)| FieldInfo {
                index,
                description: f.description.clone(),
            })
            .collect()
    }

    fn read_window(&self, field: &FieldInfo, window: &BoundingBox) -> Result<GridWindow, GridError> {
        let wanted = self
            .fields
            .get(field.index)
            .ok_or(GridError::NoSuchField(field.index))?;

        let (_, submessage) = self
            .grib
            .iter()
            .find(|(key, _)| *key == wanted.key)
            .ok_or(GridError::NoSuchField(field.index))?;

        let latlons: Vec<(f32, f32)> = submessage.latlons()?.collect();
        let decoder = Grib2SubmessageDecoder::from(submessage)?;

        let mut out = GridWindow::default();
        for ((lat, lon), value) in latlons.into_iter().zip(decoder.dispatch()?) {
            let (lat, lon) = (lat as f64, lon as f64);
            if value.is_nan() || !window.contains(lat, lon) {
                continue;
            }
            out.push(lat, normalize_lon(lon), value as f64);
        }
        Ok(out)
    }
}

/// Text for a GRIB2 fixed surface, levels printed in their native unit (Pa for isobaric).
fn describe_surface(surface_type: u8, scale_factor: i8, scaled_value: i32) -> String {
    let value = scaled_value as f64 * 10f64.powi(-(scale_factor as i32));
    let value = if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    };
    match surface_type {
        SURFACE_ISOBARIC => format!("isobaricInPa:level {} Pa", value),
        SURFACE_HEIGHT_ABOVE_GROUND => format!("heightAboveGround:level {} m", value),
        other => format!("surfaceType {}:level {}", other, value),
    }
}
