//! 数据集目录
//!
//! 数据集 ID → 有序资源列表。纯查找，不做任何 I/O。

use crate::error::{AggregatorError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const HERITAGE_BASE_URL: &str = "https://raw.githubusercontent.com/TrustImpact/heritagemap/main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// 该数据集中点的类别标签，撤回数据集时按此匹配
    #[serde(default)]
    pub categories: Vec<String>,
    /// 按顺序获取的资源
    #[serde(default)]
    pub resources: Vec<String>,
    /// 可选的索引资源，每行一个分页文件地址
    #[serde(default)]
    pub manifest: Option<String>,
}

impl DatasetDescriptor {
    pub fn new(id: &str, label: &str, categories: &[&str], resources: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            resources,
            manifest: None,
        }
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }
}

fn heritage_url(file: &str) -> String {
    format!("{}/{}", HERITAGE_BASE_URL, file)
}

/// 内置数据集
pub static DEFAULT_DATASETS: Lazy<Vec<DatasetDescriptor>> = Lazy::new(|| {
    vec![
        DatasetDescriptor::new(
            "parks",
            "Parks & Gardens",
            &["Parks & Gardens"],
            vec![heritage_url("parks.csv")],
        ),
        DatasetDescriptor::new(
            "whs",
            "World Heritage Sites",
            &["World Heritage Site"],
            vec![heritage_url("WHS.csv")],
        ),
        DatasetDescriptor::new(
            "battlefields",
            "Battlefields",
            &["Battlefield"],
            vec![heritage_url("battlefields.csv")],
        ),
        DatasetDescriptor::new(
            "monuments",
            "Scheduled Monuments",
            &["Monument"],
            vec![heritage_url("monuments.csv")],
        ),
        // 上游把登录建筑拆成了多个分页文件
        DatasetDescriptor::new(
            "listedbuildings",
            "Listed Buildings",
            &["Listed Building"],
            (1..=6)
                .map(|i| heritage_url(&format!("listedbuildings{}.csv", i)))
                .collect(),
        ),
    ]
});

#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    datasets: HashMap<String, DatasetDescriptor>,
    order: Vec<String>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for d in DEFAULT_DATASETS.iter() {
            catalog.register(d.clone());
        }
        catalog
    }

    /// 注册数据集，ID 相同则覆盖
    pub fn register(&mut self, descriptor: DatasetDescriptor) {
        let key = descriptor.id.to_lowercase();
        if !self.datasets.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.datasets.insert(key, descriptor);
    }

    pub fn resolve(&self, dataset_id: &str) -> Result<DatasetDescriptor> {
        self.datasets
            .get(&dataset_id.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| AggregatorError::UnknownDataset(dataset_id.to_string()))
    }

    /// 按注册顺序返回所有数据集 ID
    pub fn dataset_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|k| self.datasets.get(k))
            .map(|d| d.id.clone())
            .collect()
    }

    /// 撤回数据集时要匹配的类别标签（总是包含标签本身）
    pub fn category_tags(&self, dataset_tag: &str) -> Vec<String> {
        let mut tags = vec![dataset_tag.trim().to_string()];
        if let Ok(d) = self.resolve(dataset_tag) {
            tags.extend(d.categories);
        }
        tags
    }
}
