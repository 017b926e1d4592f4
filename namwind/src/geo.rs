//! Great-circle distances and nearest grid point selection.

/// Mean Earth radius used for distances to the site (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Number of grid points kept around the site for each level.
pub const NEAREST_COUNT: usize = 5;

/// Half-width of the bounding box queried around the site (degrees).
const WINDOW_HALF_WIDTH_DEG: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Site {
    pub lat: f64,
    pub lon: f64,
}

impl Site {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Box of +/- 1 degree around the site.
    pub fn window(&self) -> BoundingBox {
        BoundingBox {
            lat_min: self.lat - WINDOW_HALF_WIDTH_DEG,
            lat_max: self.lat + WINDOW_HALF_WIDTH_DEG,
            lon_min: normalize_lon(self.lon) - WINDOW_HALF_WIDTH_DEG,
            lon_max: normalize_lon(self.lon) + WINDOW_HALF_WIDTH_DEG,
        }
    }
}

/// Inclusive lat/lon box, longitudes in [-180, 180).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let lon = normalize_lon(lon);
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}

/// Bring a longitude into [-180, 180).
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Haversine distance in kilometers between two points given in degrees.
pub fn great_circle_distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let lat1 = lat_a.to_radians();
    let lat2 = lat_b.to_radians();
    let dlat = (lat_b - lat_a).to_radians();
    let dlon = (lon_b - lon_a).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
}

/// Distance from every candidate point to the site.
pub fn distances_to(site: &Site, lats: &[f64], lons: &[f64]) -> Vec<f64> {
    lats.iter()
        .zip(lons)
        .map(|(&lat, &lon)| great_circle_distance(lat, lon, site.lat, site.lon))
        .collect()
}

/// Indices of the `NEAREST_COUNT` smallest distances, closest first.
///
/// The sort is stable so equal distances keep their grid order.
pub fn nearest_indices(distances: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order.truncate(NEAREST_COUNT);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(great_circle_distance(50.97, -118.17, 50.97, -118.17), 0.0);
        assert_eq!(great_circle_distance(-33.9, 151.2, -33.9, 151.2), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let ab = great_circle_distance(51.5074, -0.1278, 48.8566, 2.3522);
        let ba = great_circle_distance(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((ab - ba).abs() < 1e-9);
        // London to Paris
        assert!((ab - 343.5).abs() < 1.0, "got {}", ab);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = great_circle_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.195).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(great_circle_distance(f64::NAN, 0.0, 0.0, 0.0).is_nan());
    }

    #[test]
    fn test_nearest_indices_keeps_five_smallest_in_order() {
        let distances = [9.0, 3.0, 7.0, 1.0, 8.0, 2.0, 6.0, 4.0];
        let nearest = nearest_indices(&distances);
        assert_eq!(nearest, vec![3, 5, 1, 7, 6]);
        let selected: Vec<f64> = nearest.iter().map(|&i| distances[i]).collect();
        assert_eq!(selected, vec![1.0, 2.0, 3.0, 4.0, 6.0]);
    }

    #[test]
    fn test_nearest_indices_ties_keep_grid_order() {
        let distances = [2.0, 1.0, 1.0, 2.0, 1.0, 0.5];
        assert_eq!(nearest_indices(&distances), vec![5, 1, 2, 4, 0]);
    }

    #[test]
    fn test_nearest_indices_fewer_than_five() {
        assert_eq!(nearest_indices(&[4.0, 2.0]), vec![1, 0]);
        assert!(nearest_indices(&[]).is_empty());
    }

    #[test]
    fn test_distances_to_site() {
        let site = Site::new(50.0, -118.0);
        let d = distances_to(&site, &[50.0, 51.0], &[-118.0, -118.0]);
        assert_eq!(d[0], 0.0);
        assert!((d[1] - 111.195).abs() < 0.01);
    }

    #[test]
    fn test_window_handles_0_360_longitudes() {
        let window = Site::new(50.97, -118.17).window();
        assert!(window.contains(50.5, -118.5));
        assert!(window.contains(50.5, 241.5));
        assert!(!window.contains(52.5, -118.17));
        assert!(!window.contains(50.97, -116.0));
    }

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(241.5), -118.5);
        assert_eq!(normalize_lon(-118.5), -118.5);
        assert_eq!(normalize_lon(180.0), -180.0);
        assert_eq!(normalize_lon(0.0), 0.0);
    }
}
