use serde::Serialize;

/// One of the five nearest grid points for a (time, level) pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputRow {
    pub time: String,
    pub lat: f64,
    pub lon: f64,
    pub dist_to_pnt_interest: f64,
    pub pressure_height: i32,
    pub u: f64,
    pub v: f64,
    pub wnd_spd: f64,
    pub wnd_dir: f64,
}

/// Wind speed from its U and V components.
pub fn wind_speed(u: f64, v: f64) -> f64 {
    (u * u + v * v).sqrt()
}

/// Direction the wind blows from, in degrees clockwise from north.
pub fn wind_direction(u: f64, v: f64) -> f64 {
    (180.0 + u.atan2(v).to_degrees()).rem_euclid(360.0)
}
