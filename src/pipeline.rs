//! 多数据源采集流水线
//!
//! 同一数据集内的资源严格按顺序获取：资源 N 的点追加进存储之后才开始获取
//! 资源 N+1。不同数据集之间可以并发（`ingest_all`）。任何单个资源的失败
//! 都只记录进报告，不会中断整批采集。

use crate::catalog::{DatasetDescriptor, SourceCatalog};
use crate::config::AppConfig;
use crate::error::{AggregatorError, Result};
use crate::fetcher::{Fetcher, ResourceFetcher};
use crate::parser::{RecordParser, RowError};
use crate::store::PointStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 报告中的失败项
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestionFailure {
    UnknownDataset {
        dataset: String,
    },
    Retrieval {
        dataset: String,
        locator: String,
        reason: String,
    },
    Schema {
        dataset: String,
        locator: String,
        missing: Vec<String>,
    },
    Row {
        dataset: String,
        locator: String,
        row: usize,
        reason: String,
    },
}

impl IngestionFailure {
    /// 整个资源失败（而不是单行）
    pub fn is_resource_failure(&self) -> bool {
        matches!(self, Self::Retrieval { .. } | Self::Schema { .. })
    }

    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::UnknownDataset { .. } => None,
            Self::Retrieval { locator, .. }
            | Self::Schema { locator, .. }
            | Self::Row { locator, .. } => Some(locator),
        }
    }
}

impl fmt::Display for IngestionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDataset { dataset } => write!(f, "未配置数据集 {}", dataset),
            Self::Retrieval { locator, reason, .. } => {
                write!(f, "获取失败 {}: {}", locator, reason)
            }
            Self::Schema { locator, missing, .. } => {
                write!(f, "{} 缺少列: {}", locator, missing.join(", "))
            }
            Self::Row { locator, row, reason, .. } => {
                write!(f, "{} 第 {} 行: {}", locator, row, reason)
            }
        }
    }
}

/// 一批采集的结果
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub batch_id: Uuid,
    pub requested: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resources_attempted: usize,
    pub resources_loaded: usize,
    pub points_appended: usize,
    pub failures: Vec<IngestionFailure>,
}

impl IngestionReport {
    fn begin(requested: &[String]) -> Self {
        let now = Utc::now();
        Self {
            batch_id: Uuid::new_v4(),
            requested: requested.to_vec(),
            started_at: now,
            finished_at: now,
            resources_attempted: 0,
            resources_loaded: 0,
            points_appended: 0,
            failures: vec![],
        }
    }

    fn merge(&mut self, outcome: DatasetOutcome) {
        self.resources_attempted += outcome.attempted;
        self.resources_loaded += outcome.loaded;
        self.points_appended += outcome.points;
        self.failures.extend(outcome.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn resources_failed(&self) -> usize {
        self.failures.iter().filter(|f| f.is_resource_failure()).count()
    }

    /// 失败的资源地址
    pub fn failed_resources(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| f.is_resource_failure())
            .filter_map(|f| f.locator())
            .collect()
    }

    pub fn unknown_datasets(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|f| match f {
                IngestionFailure::UnknownDataset { dataset } => Some(dataset.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn row_errors(&self) -> Vec<&IngestionFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f, IngestionFailure::Row { .. }))
            .collect()
    }

    /// 给用户看的一行摘要
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "{} 个点，{}/{} 个资源加载失败",
            self.points_appended,
            self.resources_failed(),
            self.resources_attempted
        )];
        let rows = self.row_errors().len();
        if rows > 0 {
            parts.push(format!("{} 行被跳过", rows));
        }
        let unknown = self.unknown_datasets();
        if !unknown.is_empty() {
            parts.push(format!("未知数据集: {}", unknown.join(", ")));
        }
        parts.join("；")
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[derive(Debug, Default)]
struct DatasetOutcome {
    attempted: usize,
    loaded: usize,
    points: usize,
    failures: Vec<IngestionFailure>,
}

pub struct IngestionPipeline<F: Fetcher = ResourceFetcher> {
    catalog: SourceCatalog,
    parser: RecordParser,
    fetcher: F,
    store: Arc<PointStore>,
    timeout: Duration,
    max_concurrent: usize,
}

impl IngestionPipeline<ResourceFetcher> {
    /// 使用 HTTP/文件获取器；HTTP 客户端无法创建时返回 `Transport` 错误
    pub fn from_config(config: &AppConfig, store: Arc<PointStore>) -> Result<Self> {
        let fetcher = ResourceFetcher::new(config)?;
        Ok(Self::new(config, fetcher, store))
    }
}

impl<F: Fetcher> IngestionPipeline<F> {
    pub fn new(config: &AppConfig, fetcher: F, store: Arc<PointStore>) -> Self {
        Self {
            catalog: config.catalog(),
            parser: RecordParser::new(config.aliases()),
            fetcher,
            store,
            timeout: Duration::from_secs(config.resource_timeout_secs.max(1)),
            max_concurrent: config.max_concurrent_datasets.max(1),
        }
    }

    pub fn with_catalog(mut self, catalog: SourceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<PointStore> {
        &self.store
    }

    /// 按请求顺序逐个处理数据集
    pub async fn ingest(&self, dataset_ids: &[String]) -> IngestionReport {
        let mut report = IngestionReport::begin(dataset_ids);

        for id in dataset_ids {
            report.merge(self.ingest_requested(id).await);
        }

        self.complete(report)
    }

    /// 多个数据集并发处理，每个数据集内部仍按顺序；报告按请求顺序合并
    pub async fn ingest_all(&self, dataset_ids: &[String]) -> IngestionReport {
        let mut report = IngestionReport::begin(dataset_ids);

        let outcomes: Vec<DatasetOutcome> = stream::iter(dataset_ids)
            .map(|id| self.ingest_requested(id))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        for outcome in outcomes {
            report.merge(outcome);
        }

        self.complete(report)
    }

    /// 从存储中移除某数据集的点（按类别，不区分大小写）
    pub fn retract(&self, dataset_tag: &str) -> usize {
        let tags: Vec<String> = self
            .catalog
            .category_tags(dataset_tag)
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();

        let removed = self
            .store
            .remove_where(|p| tags.contains(&p.category.to_lowercase()));
        log::info!("[ingest] 撤回 {}: 移除 {} 个点", dataset_tag, removed);
        removed
    }

    fn unknown(&self, id: &str) -> IngestionFailure {
        let err = AggregatorError::UnknownDataset(id.to_string());
        log::error!("[ingest] {}", err);
        IngestionFailure::UnknownDataset {
            dataset: id.to_string(),
        }
    }

    fn complete(&self, mut report: IngestionReport) -> IngestionReport {
        report.finished_at = Utc::now();
        self.store.mark_ingestion_completed();

        if report.is_clean() {
            log::info!("[ingest] 批次 {} 完成: {}", report.batch_id, report.summary());
        } else {
            log::warn!("[ingest] 批次 {} 完成: {}", report.batch_id, report.summary());
        }
        report
    }

    async fn ingest_requested(&self, id: &str) -> DatasetOutcome {
        match self.catalog.resolve(id) {
            Ok(descriptor) => self.ingest_dataset(&descriptor).await,
            Err(_) => DatasetOutcome {
                failures: vec![self.unknown(id)],
                ..Default::default()
            },
        }
    }

    async fn ingest_dataset(&self, descriptor: &DatasetDescriptor) -> DatasetOutcome {
        let mut outcome = DatasetOutcome::default();
        let mut locators = descriptor.resources.clone();

        if let Some(manifest) = &descriptor.manifest {
            match self.load_manifest(manifest).await {
                Ok(entries) => {
                    log::info!("[ingest] {} 索引列出 {} 个资源", descriptor.id, entries.len());
                    locators.extend(entries);
                }
                Err(reason) => {
                    outcome.attempted += 1;
                    log::warn!("[ingest] 索引 {} 获取失败: {}", manifest, reason);
                    outcome.failures.push(IngestionFailure::Retrieval {
                        dataset: descriptor.id.clone(),
                        locator: manifest.clone(),
                        reason,
                    });
                }
            }
        }

        log::info!(
            "[ingest] 开始数据集 {}，共 {} 个资源",
            descriptor.id,
            locators.len()
        );

        for locator in &locators {
            self.ingest_resource(&descriptor.id, locator, &mut outcome).await;
        }

        outcome
    }

    async fn ingest_resource(&self, dataset: &str, locator: &str, outcome: &mut DatasetOutcome) {
        outcome.attempted += 1;
        log::info!("[ingest] 加载 {}", locator);

        let bytes = match self.fetch(locator).await {
            Ok(bytes) => bytes,
            Err(reason) => {
                log::warn!("[ingest] 获取 {} 失败: {}", locator, reason);
                outcome.failures.push(IngestionFailure::Retrieval {
                    dataset: dataset.to_string(),
                    locator: locator.to_string(),
                    reason,
                });
                return;
            }
        };

        let parsed = match self.parser.parse(bytes.as_slice()) {
            Ok(parsed) => parsed,
            Err(AggregatorError::Schema { missing }) => {
                log::warn!("[ingest] {} 缺少必需列: {}", locator, missing.join(", "));
                outcome.failures.push(IngestionFailure::Schema {
                    dataset: dataset.to_string(),
                    locator: locator.to_string(),
                    missing,
                });
                return;
            }
            Err(e) => {
                log::warn!("[ingest] {} 无法解析: {}", locator, e);
                outcome.failures.push(IngestionFailure::Retrieval {
                    dataset: dataset.to_string(),
                    locator: locator.to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        for RowError { row, reason } in parsed.row_errors {
            log::debug!("[ingest] {} 第 {} 行跳过: {}", locator, row, reason);
            outcome.failures.push(IngestionFailure::Row {
                dataset: dataset.to_string(),
                locator: locator.to_string(),
                row,
                reason,
            });
        }

        let points: Vec<_> = parsed
            .points
            .into_iter()
            .map(|p| p.with_dataset(dataset))
            .collect();
        let appended = self.store.append(dataset, points);

        outcome.loaded += 1;
        outcome.points += appended;
        log::info!("[ingest] {} 加载 {} 个点", locator, appended);
    }

    /// 带超时的获取，超时也算获取失败
    async fn fetch(&self, locator: &str) -> std::result::Result<Vec<u8>, String> {
        match tokio::time::timeout(self.timeout, self.fetcher.fetch(locator)).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(e.reason),
            Err(_) => Err(format!("超时（{} 秒）", self.timeout.as_secs_f64())),
        }
    }

    async fn load_manifest(&self, manifest: &str) -> std::result::Result<Vec<String>, String> {
        let bytes = self.fetch(manifest).await?;
        Ok(parse_manifest(manifest, &String::from_utf8_lossy(&bytes)))
    }
}

/// 解析索引：每行一个地址，`#` 开头为注释
///
/// 相对地址按索引自身的位置解析：URL 形式的索引（`http(s)://`、`file://`）
/// 走 URL 拼接规则，`/data/x.csv`、`../x.csv` 都相对于索引所在主机和目录；
/// 本地路径的索引按文件系统路径拼接。
pub fn parse_manifest(manifest_locator: &str, content: &str) -> Vec<String> {
    let base = Url::parse(manifest_locator).ok();
    let dir = Path::new(manifest_locator).parent();

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|entry| match (&base, dir) {
            (Some(base), _) => match base.join(entry) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    log::warn!("[ingest] 索引条目 {} 无法解析: {}", entry, e);
                    entry.to_string()
                }
            },
            (None, Some(dir)) if !entry.contains("://") => {
                dir.join(entry).to_string_lossy().into_owned()
            }
            _ => entry.to_string(),
        })
        .collect()
}
