//! 空间包含查询

use crate::geo::{haversine_meters, BoundingBox, LatLng};
use crate::types::{Point, QueryRegion};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// 判断点是否在区域内的规则
///
/// 配置文件与命令行都只接受已知取值，拼错会直接报错而不是退回默认值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentPolicy {
    /// 大圆距离 ≤ 半径
    #[default]
    Circle,
    /// 落在圆的外接矩形内（更宽松）
    #[serde(alias = "bbox", alias = "bounding-box")]
    #[value(aliases = ["bbox", "bounding_box"])]
    BoundingBox,
}

/// 区域查询
///
/// 返回点保持输入中的相对顺序；坐标无效的点永远不返回。以后要换成网格等
/// 索引实现时只需要实现这个 trait。
pub trait SpatialQuery: Send + Sync {
    fn query(&self, region: &QueryRegion, points: &[Point]) -> Vec<Point>;
}

/// 线性扫描，O(n)
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan {
    policy: ContainmentPolicy,
}

impl LinearScan {
    pub fn new(policy: ContainmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ContainmentPolicy {
        self.policy
    }
}

impl SpatialQuery for LinearScan {
    fn query(&self, region: &QueryRegion, points: &[Point]) -> Vec<Point> {
        let matcher = Matcher::new(self.policy, region);
        let result: Vec<Point> = points
            .iter()
            .filter(|p| p.has_valid_location() && matcher.contains(&p.location))
            .cloned()
            .collect();
        log::debug!(
            "[query] ({:.5}, {:.5}) r={:.0}m: {}/{} 个点",
            region.center.lat,
            region.center.lng,
            region.radius_meters,
            result.len(),
            points.len()
        );
        result
    }
}

enum Matcher {
    Circle { center: LatLng, radius: f64 },
    Box(BoundingBox),
}

impl Matcher {
    fn new(policy: ContainmentPolicy, region: &QueryRegion) -> Self {
        match policy {
            ContainmentPolicy::Circle => Matcher::Circle {
                center: region.center,
                radius: region.radius_meters,
            },
            ContainmentPolicy::BoundingBox => {
                Matcher::Box(BoundingBox::around(&region.center, region.radius_meters))
            }
        }
    }

    fn contains(&self, p: &LatLng) -> bool {
        match self {
            Matcher::Circle { center, radius } => haversine_meters(center, p) <= *radius,
            Matcher::Box(bbox) => bbox.contains(p),
        }
    }
}
