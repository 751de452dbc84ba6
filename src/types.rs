use crate::error::{AggregatorError, Result};
use crate::geo::{miles_to_meters, LatLng};
use serde::{Deserialize, Serialize};

/// 类别缺失时使用的兜底值
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// 兴趣点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub name: String,
    pub category: String,
    pub location: LatLng,
    pub link: Option<String>,
    /// 来源数据集 ID
    pub dataset: String,
}

impl Point {
    pub fn new(name: impl Into<String>, category: impl Into<String>, location: LatLng) -> Self {
        let category = category.into();
        Self {
            name: name.into(),
            category: if category.trim().is_empty() {
                UNKNOWN_CATEGORY.to_string()
            } else {
                category
            },
            location,
            link: None,
            dataset: String::new(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        let link = link.into();
        self.link = if link.trim().is_empty() { None } else { Some(link) };
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    pub fn has_valid_location(&self) -> bool {
        self.location.is_valid()
    }
}

/// 当前的空间过滤条件（圆心 + 半径）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryRegion {
    pub center: LatLng,
    pub radius_meters: f64,
}

impl QueryRegion {
    pub fn new(center: LatLng, radius_meters: f64) -> Result<Self> {
        if !center.is_valid() {
            return Err(AggregatorError::InvalidRegion(format!(
                "圆心坐标无效: ({}, {})",
                center.lat, center.lng
            )));
        }
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(AggregatorError::InvalidRegion(format!(
                "半径必须是非负数: {}",
                radius_meters
            )));
        }
        Ok(Self { center, radius_meters })
    }

    pub fn from_miles(center: LatLng, radius_miles: f64) -> Result<Self> {
        Self::new(center, miles_to_meters(radius_miles))
    }
}
