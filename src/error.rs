//! 聚合器错误类型

use thiserror::Error;

/// 致命错误
///
/// 部分失败（单个资源、单行）不会走这里，而是汇总进 `IngestionReport`。
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("未知数据集: {0}")]
    UnknownDataset(String),

    #[error("资源缺少必需列: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("无法读取表头: {0}")]
    Header(String),

    #[error("无效的查询区域: {0}")]
    InvalidRegion(String),

    #[error("无法创建 HTTP 客户端: {0}")]
    Transport(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
