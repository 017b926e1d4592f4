//! GRIB edition 1 decoder for the wind fields of NAM `.grb` files.
//!
//! A message is laid out as:
//! - Section 0 (IS): "GRIB", total length (3 bytes), edition
//! - Section 1 (PDS): parameter, level, decimal scale factor
//! - Section 2 (GDS): grid geometry (lat/lon or Lambert conformal)
//! - Section 3 (BMS): optional bitmap of present points
//! - Section 4 (BDS): simple packed values
//! - Section 5: "7777"
//!
//! Only what the wind extraction needs is supported: grid point data with
//! simple packing on regular lat/lon and Lambert conformal grids.

use crate::geo::BoundingBox;
use crate::grid::{malformed, FieldInfo, GridError, GridFile, GridFormat, GridWindow, WindComponent};
use crate::lambert::LambertConformal;
use bytes::Bytes;
use std::path::Path;

/// NCEP parameter table: U and V components of wind.
const PARAM_U_WIND: u8 = 33;
const PARAM_V_WIND: u8 = 34;

const LEVEL_ISOBARIC: u8 = 100;
const LEVEL_HEIGHT_ABOVE_GROUND: u8 = 105;

const GDS_LAT_LON: u8 = 0;
const GDS_LAMBERT: u8 = 3;

/// Earth radius assumed by GRIB1 (meters).
const GRIB1_EARTH_RADIUS_M: f64 = 6_367_470.0;

const SCAN_I_NEGATIVE: u8 = 0x80;
const SCAN_J_POSITIVE: u8 = 0x40;
const SCAN_J_CONSECUTIVE: u8 = 0x20;

pub struct Grib1File {
    data: Bytes,
    messages: Vec<Message>,
}

impl Grib1File {
    pub fn open(path: &Path) -> Result<Self, GridError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(Bytes::from(data))
    }

    pub fn from_bytes(data: Bytes) -> Result<Self, GridError> {
        let mut messages = Vec::new();
        let mut offset = 0;

        while let Some(pos) = find_marker(&data[offset..]) {
            let start = offset + pos;
            let message = Message::parse(&data, start)?;
            offset = start + message.length;
            messages.push(message);
        }

        if messages.is_empty() {
            return Err(malformed(0, "no GRIB message found"));
        }

        log::debug!("GRIB1: {} messages", messages.len());
        Ok(Self { data, messages })
    }

    fn wind_component(message: &Message) -> Option<WindComponent> {
        match message.param {
            PARAM_U_WIND => Some(WindComponent::U),
            PARAM_V_WIND => Some(WindComponent::V),
            _ => None,
        }
    }
}

impl GridFile for Grib1File {
    fn format(&self) -> GridFormat {
        GridFormat::Grib1
    }

    fn fields(&self, component: WindComponent) -> Vec<FieldInfo> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| Self::wind_component(m) == Some(component))
            .map(|(index, m)| FieldInfo {
                index,
                description: format!("{}:m s**-1:{}", component.name(), m.level_description()),
            })
            .collect()
    }

    fn read_window(&self, field: &FieldInfo, window: &BoundingBox) -> Result<GridWindow, GridError> {
        let message = self
            .messages
            .get(field.index)
            .ok_or(GridError::NoSuchField(field.index))?;
        message.read_window(&self.data, window)
    }
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

#[derive(Debug)]
struct Message {
    offset: usize,
    length: usize,
    param: u8,
    level_type: u8,
    level: u16,
    decimal_scale: i32,
    grid: GridDefinition,
    /// Byte range of the bitmap bits, if any
    bitmap: Option<(usize, usize)>,
    packing: Packing,
}

#[derive(Debug)]
struct Packing {
    binary_scale: i32,
    reference: f64,
    bits_per_value: u32,
    /// Byte range of the packed values
    data: (usize, usize),
}

impl Message {
    fn parse(data: &[u8], offset: usize) -> Result<Self, GridError> {
        let is = slice(data, offset, 8)?;
        let length = u24(&is[4..7]) as usize;
        let edition = is[7];
        if edition != 1 {
            return Err(GridError::Unsupported(format!("GRIB edition {}", edition)));
        }
        let end = offset + length;
        if length < 12 || end > data.len() || &data[end - 4..end] != b"7777" {
            return Err(malformed(offset, "missing 7777 end marker"));
        }

        // Section 1
        let pds_start = offset + 8;
        let pds = section(data, pds_start, end)?;
        if pds.len() < 28 {
            return Err(malformed(offset, "product definition section too short"));
        }
        let flags = pds[7];
        let param = pds[8];
        let level_type = pds[9];
        let level = u16::from_be_bytes([pds[10], pds[11]]);
        let decimal_scale = sm16(&pds[26..28]);

        let mut next = pds_start + pds.len();

        // Section 2
        if flags & 0x80 == 0 {
            return Err(GridError::Unsupported("GRIB1 message without grid description".into()));
        }
        let gds = section(data, next, end)?;
        let grid = GridDefinition::parse(gds).map_err(|reason| malformed(next, reason))?;
        next += gds.len();

        // Section 3
        let bitmap = if flags & 0x40 != 0 {
            let bms = section(data, next, end)?;
            if bms.len() < 6 {
                return Err(malformed(next, "bitmap section too short"));
            }
            if u16::from_be_bytes([bms[4], bms[5]]) != 0 {
                return Err(GridError::Unsupported("predefined GRIB1 bitmap".into()));
            }
            let range = (next + 6, next + bms.len());
            next += bms.len();
            Some(range)
        } else {
            None
        };

        // Section 4
        let bds = section(data, next, end)?;
        if bds.len() < 11 {
            return Err(malformed(next, "binary data section too short"));
        }
        let bds_flags = bds[3];
        if bds_flags & 0x80 != 0 {
            return Err(GridError::Unsupported("spherical harmonic coefficients".into()));
        }
        if bds_flags & 0x40 != 0 {
            return Err(GridError::Unsupported("GRIB1 complex packing".into()));
        }
        let packing = Packing {
            binary_scale: sm16(&bds[4..6]),
            reference: ibm_float(&bds[6..10]),
            bits_per_value: bds[10] as u32,
            data: (next + 11, next + bds.len()),
        };

        Ok(Self {
            offset,
            length,
            param,
            level_type,
            level,
            decimal_scale,
            grid,
            bitmap,
            packing,
        })
    }

    fn level_description(&self) -> String {
        match self.level_type {
            LEVEL_ISOBARIC => format!("isobaricInhPa:level {} hPa", self.level),
            LEVEL_HEIGHT_ABOVE_GROUND => format!("heightAboveGround:level {} m", self.level),
            other => format!("levelType {}:level {}", other, self.level),
        }
    }

    fn read_window(&self, data: &[u8], window: &BoundingBox) -> Result<GridWindow, GridError> {
        let bitmap = self.bitmap.map(|(start, end)| &data[start..end]);
        let packed = &data[self.packing.data.0..self.packing.data.1];
        let points = self.grid.num_points();

        if let Some(bits) = bitmap {
            if bits.len() * 8 < points {
                return Err(malformed(self.offset, "bitmap shorter than grid"));
            }
        }

        let binary = 2f64.powi(self.packing.binary_scale);
        let decimal = 10f64.powi(-self.decimal_scale);
        let nbits = self.packing.bits_per_value;

        let mut out = GridWindow::default();
        let mut value_index = 0usize;

        for k in 0..points {
            if let Some(bits) = bitmap {
                if bits[k / 8] & (0x80 >> (k % 8)) == 0 {
                    continue;
                }
            }

            let (lat, lon) = self.grid.location(k);
            if window.contains(lat, lon) {
                let x = if nbits == 0 {
                    0
                } else {
                    BitReader::new(packed, value_index * nbits as usize)
                        .read(nbits)
                        .ok_or_else(|| malformed(self.offset, "packed data too short"))?
                };
                let value = (self.packing.reference + x as f64 * binary) * decimal;
                out.push(lat, crate::geo::normalize_lon(lon), value);
            }
            value_index += 1;
        }

        Ok(out)
    }
}

#[derive(Debug)]
enum GridDefinition {
    LatLon {
        ni: usize,
        nj: usize,
        la1: f64,
        lo1: f64,
        di: f64,
        dj: f64,
        scan: u8,
    },
    Lambert {
        nx: usize,
        ny: usize,
        dx: f64,
        dy: f64,
        scan: u8,
        proj: LambertConformal,
    },
}

impl GridDefinition {
    fn parse(gds: &[u8]) -> Result<Self, String> {
        if gds.len() < 28 {
            return Err("grid description section too short".into());
        }
        let millis = |b: &[u8]| sm24(b) as f64 / 1000.0;

        match gds[5] {
            GDS_LAT_LON => {
                let ni = u16::from_be_bytes([gds[6], gds[7]]) as usize;
                let nj = u16::from_be_bytes([gds[8], gds[9]]) as usize;
                let la1 = millis(&gds[10..13]);
                let lo1 = millis(&gds[13..16]);
                let la2 = millis(&gds[17..20]);
                let lo2 = millis(&gds[20..23]);
                let di_raw = u16::from_be_bytes([gds[23], gds[24]]);
                let dj_raw = u16::from_be_bytes([gds[25], gds[26]]);
                // increments are optional, fall back to the grid extent
                let di = if di_raw == u16::MAX && ni > 1 {
                    (lo2 - lo1).abs() / (ni - 1) as f64
                } else {
                    di_raw as f64 / 1000.0
                };
                let dj = if dj_raw == u16::MAX && nj > 1 {
                    (la2 - la1).abs() / (nj - 1) as f64
                } else {
                    dj_raw as f64 / 1000.0
                };
                Ok(GridDefinition::LatLon {
                    ni,
                    nj,
                    la1,
                    lo1,
                    di,
                    dj,
                    scan: gds[27],
                })
            }
            GDS_LAMBERT => {
                if gds.len() < 34 {
                    return Err("Lambert grid description too short".into());
                }
                let nx = u16::from_be_bytes([gds[6], gds[7]]) as usize;
                let ny = u16::from_be_bytes([gds[8], gds[9]]) as usize;
                let la1 = millis(&gds[10..13]);
                let lo1 = millis(&gds[13..16]);
                let lov = millis(&gds[17..20]);
                let dx = u24(&gds[20..23]) as f64;
                let dy = u24(&gds[23..26]) as f64;
                let latin1 = millis(&gds[28..31]);
                let latin2 = millis(&gds[31..34]);
                Ok(GridDefinition::Lambert {
                    nx,
                    ny,
                    dx,
                    dy,
                    scan: gds[27],
                    proj: LambertConformal::new(la1, lo1, lov, latin1, latin2, GRIB1_EARTH_RADIUS_M),
                })
            }
            other => Err(format!("unsupported grid type {}", other)),
        }
    }

    fn num_points(&self) -> usize {
        match self {
            GridDefinition::LatLon { ni, nj, .. } => ni * nj,
            GridDefinition::Lambert { nx, ny, .. } => nx * ny,
        }
    }

    /// Latitude and longitude of the k-th stored point.
    fn location(&self, k: usize) -> (f64, f64) {
        match self {
            GridDefinition::LatLon {
                ni,
                nj,
                la1,
                lo1,
                di,
                dj,
                scan,
            } => {
                let (i, j) = scan_position(k, *ni, *nj, *scan);
                (la1 + j * dj, lo1 + i * di)
            }
            GridDefinition::Lambert {
                nx,
                ny,
                dx,
                dy,
                scan,
                proj,
            } => {
                let (i, j) = scan_position(k, *nx, *ny, *scan);
                proj.grid_point(i, j, *dx, *dy)
            }
        }
    }
}

/// Signed grid offsets (i east, j north) of the k-th point for a scanning mode.
fn scan_position(k: usize, ni: usize, nj: usize, scan: u8) -> (f64, f64) {
    let (i, j) = if scan & SCAN_J_CONSECUTIVE != 0 {
        (k / nj, k % nj)
    } else {
        (k % ni, k / ni)
    };
    let i_sign = if scan & SCAN_I_NEGATIVE != 0 { -1.0 } else { 1.0 };
    let j_sign = if scan & SCAN_J_POSITIVE != 0 { 1.0 } else { -1.0 };
    (i as f64 * i_sign, j as f64 * j_sign)
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8], GridError> {
    data.get(start..start + len)
        .ok_or_else(|| malformed(start, "unexpected end of data"))
}

/// A section starting at `start`, its length read from the first 3 bytes.
fn section(data: &[u8], start: usize, end: usize) -> Result<&[u8], GridError> {
    let header = slice(data, start, 3)?;
    let len = u24(header) as usize;
    if len < 3 || start + len > end {
        return Err(malformed(start, format!("bad section length {}", len)));
    }
    Ok(&data[start..start + len])
}

fn u24(b: &[u8]) -> u32 {
    (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32
}

/// Sign-and-magnitude 16-bit integer.
fn sm16(b: &[u8]) -> i32 {
    let magnitude = ((b[0] & 0x7f) as i32) << 8 | b[1] as i32;
    if b[0] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Sign-and-magnitude 24-bit integer.
fn sm24(b: &[u8]) -> i32 {
    let magnitude = ((b[0] & 0x7f) as i32) << 16 | (b[1] as i32) << 8 | b[2] as i32;
    if b[0] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// IBM System/360 single precision float: sign, base-16 exponent biased by 64, 24-bit fraction.
fn ibm_float(b: &[u8]) -> f64 {
    let sign = if b[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (b[0] & 0x7f) as i32 - 64;
    let mantissa = u24(&b[1..4]) as f64 / (1u32 << 24) as f64;
    sign * mantissa * 16f64.powi(exponent)
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], bit_offset: usize) -> Self {
        Self {
            data,
            pos: bit_offset,
        }
    }

    /// Next `nbits` bits as a big-endian unsigned integer.
    fn read(&mut self, nbits: u32) -> Option<u64> {
        let mut value: u64 = 0;
        let mut remaining = nbits;
        while remaining > 0 {
            let byte = *self.data.get(self.pos / 8)?;
            let used = (self.pos % 8) as u32;
            let available = 8 - used;
            let take = available.min(remaining);
            let bits = (byte as u32 >> (available - take)) & ((1u32 << take) - 1);
            value = (value << take) | bits as u64;
            self.pos += take as usize;
            remaining -= take;
        }
        Some(value)
    }
}
