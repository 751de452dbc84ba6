//! 经纬度与距离计算
//! 球面大圆距离（Haversine）以及圆形区域的外接矩形

use serde::{Deserialize, Serialize};

/// 地球平均半径（米），与 Leaflet `CRS.Earth` 一致
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 1 英里对应的米数
pub const METERS_PER_MILE: f64 = 1609.34;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// 坐标是否可用于空间查询
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

/// 两点间大圆距离（米）
pub fn haversine_meters(a: &LatLng, b: &LatLng) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// 经纬度边界框
///
/// `west > east` 表示跨越反子午线。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// 以 `center` 为圆心、`radius_m` 为半径的圆的外接矩形
    pub fn around(center: &LatLng, radius_m: f64) -> Self {
        let angular = radius_m / EARTH_RADIUS_M;
        let dlat = angular.to_degrees();

        let south = (center.lat - dlat).max(-90.0);
        let north = (center.lat + dlat).min(90.0);

        // 覆盖极点或半径超过半个地球时经度取全范围
        if south <= -90.0 || north >= 90.0 || angular >= std::f64::consts::FRAC_PI_2 {
            return Self { south, north, west: -180.0, east: 180.0 };
        }

        let ratio = angular.sin() / center.lat.to_radians().cos();
        if ratio >= 1.0 {
            return Self { south, north, west: -180.0, east: 180.0 };
        }
        let dlng = ratio.asin().to_degrees();

        Self {
            south,
            north,
            west: wrap_longitude(center.lng - dlng),
            east: wrap_longitude(center.lng + dlng),
        }
    }

    pub fn contains(&self, p: &LatLng) -> bool {
        if p.lat < self.south || p.lat > self.north {
            return false;
        }
        if self.west <= self.east {
            p.lng >= self.west && p.lng <= self.east
        } else {
            p.lng >= self.west || p.lng <= self.east
        }
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// 从圆心向正北移动 `meters` 后的点（测试与样例数据用）
pub fn offset_north(origin: &LatLng, meters: f64) -> LatLng {
    LatLng::new(origin.lat + (meters / EARTH_RADIUS_M).to_degrees(), origin.lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_london_paris() {
        let london = LatLng::new(51.5074, -0.1278);
        let paris = LatLng::new(48.8566, 2.3522);
        let km = haversine_meters(&london, &paris) / 1000.0;
        assert!((km - 343.5).abs() < 2.0, "got {}", km);
    }

    #[test]
    fn test_offset_north_distance() {
        let origin = LatLng::new(51.5, -0.1);
        let p = offset_north(&origin, 5000.0);
        assert!((haversine_meters(&origin, &p) - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_coordinates() {
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());
        assert!(!LatLng::new(0.0, f64::INFINITY).is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(LatLng::new(-90.0, 180.0).is_valid());
    }

    #[test]
    fn test_bbox_contains_circle_edge() {
        let center = LatLng::new(51.5, -0.1);
        let bbox = BoundingBox::around(&center, 10_000.0);
        assert!(bbox.contains(&offset_north(&center, 9_999.0)));
        assert!(!bbox.contains(&offset_north(&center, 10_100.0)));
        assert!(bbox.west < center.lng && bbox.east > center.lng);
    }

    #[test]
    fn test_bbox_wraps_antimeridian() {
        let center = LatLng::new(0.0, 179.99);
        let bbox = BoundingBox::around(&center, 5_000.0);
        assert!(bbox.west > bbox.east);
        assert!(bbox.contains(&LatLng::new(0.0, -179.99)));
        assert!(!bbox.contains(&LatLng::new(0.0, 0.0)));
    }

    #[test]
    fn test_bbox_near_pole_covers_all_longitudes() {
        let center = LatLng::new(89.99, 10.0);
        let bbox = BoundingBox::around(&center, 5_000.0);
        assert_eq!((bbox.west, bbox.east), (-180.0, 180.0));
        assert!(bbox.contains(&LatLng::new(89.995, -170.0)));
    }
}
