//! Lambert conformal conic projection on a sphere.
//!
//! Used to locate the points of GRIB1 Lambert grids (NAM grids 212 and 218):
//! the grid is defined by its first point, the orientation longitude (LoV),
//! two standard parallels and a constant grid spacing in meters.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

#[derive(Debug, Clone)]
pub struct LambertConformal {
    /// Orientation longitude in radians
    lon0: f64,
    /// Cone constant
    n: f64,
    f: f64,
    radius: f64,
    /// Projected coordinates of the first grid point (meters)
    x1: f64,
    y1: f64,
}

impl LambertConformal {
    /// All angles in degrees, `radius` in meters.
    pub fn new(lat1: f64, lon1: f64, lov: f64, latin1: f64, latin2: f64, radius: f64) -> Self {
        let latin1 = latin1.to_radians();
        let latin2 = latin2.to_radians();

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            (latin1.cos() / latin2.cos()).ln()
                / ((FRAC_PI_4 + latin2 / 2.0).tan() / (FRAC_PI_4 + latin1 / 2.0).tan()).ln()
        };
        let f = latin1.cos() * (FRAC_PI_4 + latin1 / 2.0).tan().powf(n) / n;

        let mut proj = Self {
            lon0: lov.to_radians(),
            n,
            f,
            radius,
            x1: 0.0,
            y1: 0.0,
        };
        let (x1, y1) = proj.forward(lat1, lon1);
        proj.x1 = x1;
        proj.y1 = y1;
        proj
    }

    /// Geographic (degrees) to projected coordinates (meters, apex at origin).
    pub fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let rho = self.rho(lat.to_radians());
        let theta = self.n * wrap_pi(lon.to_radians() - self.lon0);
        (rho * theta.sin(), -rho * theta.cos())
    }

    /// Projected coordinates (meters) to geographic (degrees), longitude in [-180, 180).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let sign = self.n.signum();
        let rho = sign * (x * x + y * y).sqrt();
        let theta = if self.n > 0.0 {
            x.atan2(-y)
        } else {
            (-x).atan2(y)
        };

        let lat = 2.0 * (self.radius * self.f / rho).powf(1.0 / self.n).atan() - FRAC_PI_2;
        let lon = self.lon0 + theta / self.n;

        (lat.to_degrees(), crate::geo::normalize_lon(lon.to_degrees()))
    }

    /// Location of the grid point `dx` * `i`, `dy` * `j` meters from the first point.
    pub fn grid_point(&self, i: f64, j: f64, dx: f64, dy: f64) -> (f64, f64) {
        self.inverse(self.x1 + i * dx, self.y1 + j * dy)
    }

    fn rho(&self, lat: f64) -> f64 {
        self.radius * self.f / (FRAC_PI_4 + lat / 2.0).tan().powf(self.n)
    }
}

fn wrap_pi(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADIUS: f64 = 6_367_470.0;

    fn nam_218() -> LambertConformal {
        LambertConformal::new(12.19, -133.459, -95.0, 25.0, 25.0, RADIUS)
    }

    #[test]
    fn test_first_point_is_origin_of_grid() {
        let proj = nam_218();
        let (lat, lon) = proj.grid_point(0.0, 0.0, 12190.58, 12190.58);
        assert!((lat - 12.19).abs() < 1e-6, "lat {}", lat);
        assert!((lon + 133.459).abs() < 1e-6, "lon {}", lon);
    }

    #[test]
    fn test_round_trip() {
        let proj = nam_218();
        for (lat, lon) in [(50.97, -118.17), (35.0, -95.0), (20.0, -70.0), (55.0, -60.0)] {
            let (x, y) = proj.forward(lat, lon);
            let (lat2, lon2) = proj.inverse(x, y);
            assert!((lat - lat2).abs() < 1e-6, "lat {} -> {}", lat, lat2);
            assert!((lon - lon2).abs() < 1e-6, "lon {} -> {}", lon, lon2);
        }
    }

    #[test]
    fn test_grid_moves_north_along_j() {
        let proj = nam_218();
        let (lat0, _) = proj.grid_point(300.0, 100.0, 12190.58, 12190.58);
        let (lat1, _) = proj.grid_point(300.0, 101.0, 12190.58, 12190.58);
        assert!(lat1 > lat0);
        // one 12 km step is about 0.11 degrees of latitude
        assert!((lat1 - lat0 - 0.11).abs() < 0.02, "step {}", lat1 - lat0);
    }

    #[test]
    fn test_secant_cone() {
        let proj = LambertConformal::new(21.138, -122.72, -97.5, 33.0, 45.0, RADIUS);
        let (x, y) = proj.forward(40.0, -100.0);
        let (lat, lon) = proj.inverse(x, y);
        assert!((lat - 40.0).abs() < 1e-6);
        assert!((lon + 100.0).abs() < 1e-6);
    }
}
