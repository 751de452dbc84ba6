use crate::catalog::{DatasetDescriptor, SourceCatalog};
use crate::error::Result;
use crate::parser::CategoryAliases;
use crate::query::ContainmentPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 默认搜索半径（英里）
    pub default_radius_miles: f64,
    pub containment: ContainmentPolicy,
    /// 单个资源的超时（秒）
    pub resource_timeout_secs: u64,
    /// 临时性失败的重试次数
    pub retry_count: u32,
    /// `ingest_all` 同时处理的数据集数量
    pub max_concurrent_datasets: usize,
    pub user_agent: String,
    /// 额外或覆盖的数据集
    pub datasets: Vec<DatasetDescriptor>,
    /// 额外的类别别名（原始值 → 规范值）
    pub category_aliases: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_radius_miles: 10.0,
            containment: ContainmentPolicy::Circle,
            resource_timeout_secs: 30,
            retry_count: 2,
            max_concurrent_datasets: 4,
            user_agent: format!("poi-aggregator/{}", env!("CARGO_PKG_VERSION")),
            datasets: vec![],
            category_aliases: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// 内置目录加上配置中的数据集
    pub fn catalog(&self) -> SourceCatalog {
        let mut catalog = SourceCatalog::with_defaults();
        for d in &self.datasets {
            catalog.register(d.clone());
        }
        catalog
    }

    pub fn aliases(&self) -> CategoryAliases {
        let mut aliases = CategoryAliases::with_defaults();
        for (raw, canonical) in &self.category_aliases {
            aliases.insert(raw, canonical);
        }
        aliases
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("aggregator_config.json")
}

/// 读取配置，文件不存在时返回默认值
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        log::info!("[config] 已加载 {}", path.display());
        Ok(config)
    } else {
        log::debug!("[config] {} 不存在，使用默认配置", path.display());
        Ok(AppConfig::default())
    }
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.containment, ContainmentPolicy::Circle);
        assert_eq!(config.resource_timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "containment": "bounding_box",
                "datasets": [{"id": "castles", "categories": ["Castle"], "resources": ["castles.csv"]}],
                "category_aliases": {"Castel": "Castle"}
            }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.containment, ContainmentPolicy::BoundingBox);
        assert_eq!(config.retry_count, 2);

        let catalog = config.catalog();
        assert_eq!(catalog.resolve("castles").unwrap().resources, vec!["castles.csv"]);
        assert!(catalog.resolve("parks").is_ok());
        assert_eq!(config.aliases().normalize("castel"), "Castle");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.default_radius_miles = 3.5;
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap().default_radius_miles, 3.5);
    }

    #[test]
    fn test_unknown_containment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"containment": "bboxx"}"#).unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, r#"{"containment": "bbox"}"#).unwrap();
        assert_eq!(load_config(&path).unwrap().containment, ContainmentPolicy::BoundingBox);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_config(&path).is_err());
    }
}
