//! 会话：持有点存储、当前查询区域和采集流水线
//!
//! 区域变化或存储变化都会让缓存的查询结果失效，下次读取时重新计算。

use crate::catalog::SourceCatalog;
use crate::config::AppConfig;
use crate::error::Result;
use crate::fetcher::{Fetcher, ResourceFetcher};
use crate::pipeline::{IngestionPipeline, IngestionReport};
use crate::query::{LinearScan, SpatialQuery};
use crate::store::PointStore;
use crate::types::{Point, QueryRegion};
use serde::Serialize;
use std::sync::Arc;

/// 类别 → 数量，按首次出现的顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorySummary {
    pub counts: Vec<(String, usize)>,
}

impl CategorySummary {
    pub fn from_points(points: &[Point]) -> Self {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for p in points {
            match counts.iter_mut().find(|(c, _)| *c == p.category) {
                Some((_, n)) => *n += 1,
                None => counts.push((p.category.clone(), 1)),
            }
        }
        Self { counts }
    }

    pub fn get(&self, category: &str) -> usize {
        self.counts
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// 交给展示层的结果
#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub region: QueryRegion,
    pub points: Vec<Point>,
    pub summary: CategorySummary,
}

/// 结果展示（地图标记、表格、汇总），由外部实现
pub trait ResultProjector {
    fn project(&mut self, view: &ResultView);
}

struct CachedResult {
    region: QueryRegion,
    version: u64,
    points: Vec<Point>,
}

pub struct Session<F: Fetcher = ResourceFetcher> {
    store: Arc<PointStore>,
    pipeline: IngestionPipeline<F>,
    engine: Box<dyn SpatialQuery>,
    region: Option<QueryRegion>,
    cache: Option<CachedResult>,
}

impl Session<ResourceFetcher> {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = ResourceFetcher::new(config)?;
        Ok(Self::new(config, fetcher))
    }
}

impl<F: Fetcher> Session<F> {
    pub fn new(config: &AppConfig, fetcher: F) -> Self {
        let store = Arc::new(PointStore::new());
        Self {
            pipeline: IngestionPipeline::new(config, fetcher, store.clone()),
            store,
            engine: Box::new(LinearScan::new(config.containment)),
            region: None,
            cache: None,
        }
    }

    pub fn with_catalog(mut self, catalog: SourceCatalog) -> Self {
        self.pipeline = self.pipeline.with_catalog(catalog);
        self
    }

    /// 替换查询引擎（例如带索引的实现）
    pub fn with_engine(mut self, engine: Box<dyn SpatialQuery>) -> Self {
        self.engine = engine;
        self.cache = None;
        self
    }

    pub fn catalog(&self) -> &SourceCatalog {
        self.pipeline.catalog()
    }

    pub fn store(&self) -> &Arc<PointStore> {
        &self.store
    }

    pub fn region(&self) -> Option<&QueryRegion> {
        self.region.as_ref()
    }

    pub async fn ingest(&mut self, dataset_ids: &[String]) -> IngestionReport {
        let report = self.pipeline.ingest(dataset_ids).await;
        self.refresh();
        report
    }

    pub async fn ingest_all(&mut self, dataset_ids: &[String]) -> IngestionReport {
        let report = self.pipeline.ingest_all(dataset_ids).await;
        self.refresh();
        report
    }

    pub fn retract(&mut self, dataset_tag: &str) -> usize {
        let removed = self.pipeline.retract(dataset_tag);
        self.refresh();
        removed
    }

    /// 清空存储
    pub fn reset(&mut self) {
        self.store.clear();
        self.cache = None;
    }

    /// 设置新的查询区域，旧区域与缓存结果一并丢弃
    pub fn set_region(&mut self, region: QueryRegion) -> Vec<Point> {
        self.region = Some(region);
        self.cache = None;
        self.results()
    }

    pub fn clear_region(&mut self) {
        self.region = None;
        self.cache = None;
    }

    /// 当前区域内的点；没有区域时为空
    pub fn results(&mut self) -> Vec<Point> {
        let Some(region) = self.region else {
            return vec![];
        };
        let version = self.store.version();

        if let Some(cache) = &self.cache {
            if cache.region == region && cache.version == version {
                return cache.points.clone();
            }
        }

        let engine = &self.engine;
        let points = self.store.with_points(|all| engine.query(&region, all));
        self.cache = Some(CachedResult {
            region,
            version,
            points: points.clone(),
        });
        points
    }

    /// 把当前结果交给展示层；没有区域时不做任何事
    pub fn project(&mut self, projector: &mut dyn ResultProjector) -> bool {
        let Some(region) = self.region else {
            return false;
        };
        let points = self.results();
        let view = ResultView {
            region,
            summary: CategorySummary::from_points(&points),
            points,
        };
        projector.project(&view);
        true
    }

    /// 存储变化后重新计算当前区域
    fn refresh(&mut self) {
        if self.region.is_some() {
            let n = self.results().len();
            log::debug!("[query] 存储已变化，当前区域内 {} 个点", n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{offset_north, LatLng};
    use crate::pipeline::tests::{scenario_fetcher, test_catalog};
    use crate::query::ContainmentPolicy;

    struct Recorder {
        views: Vec<ResultView>,
    }

    impl ResultProjector for Recorder {
        fn project(&mut self, view: &ResultView) {
            self.views.push(view.clone());
        }
    }

    fn session() -> Session<crate::pipeline::tests::FakeFetcher> {
        Session::new(&AppConfig::default(), scenario_fetcher()).with_catalog(test_catalog())
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn london() -> LatLng {
        LatLng::new(51.5, -0.1)
    }

    #[test]
    fn test_no_region_no_results() {
        let mut s = session();
        s.store().append("x", vec![Point::new("X", "Monument", london())]);
        assert!(s.results().is_empty());
        let mut recorder = Recorder { views: vec![] };
        assert!(!s.project(&mut recorder));
        assert!(recorder.views.is_empty());
    }

    #[test]
    fn test_requery_after_append_is_superset() {
        let mut s = session();
        let region = QueryRegion::new(london(), 10_000.0).unwrap();
        s.store().append(
            "x",
            vec![
                Point::new("X1", "Monument", offset_north(&london(), 1_000.0)),
                Point::new("far", "Monument", offset_north(&london(), 50_000.0)),
            ],
        );
        let before = s.set_region(region);
        assert_eq!(before.len(), 1);

        s.store().append(
            "y",
            vec![Point::new("X2", "Battlefield", offset_north(&london(), 2_000.0))],
        );
        let after = s.results();
        let names: Vec<_> = after.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["X1", "X2"]);
        assert_eq!(&after[..1], &before[..]);
    }

    #[test]
    fn test_results_cached_until_change() {
        let mut s = session();
        s.store()
            .append("x", vec![Point::new("X", "Monument", london())]);
        let region = QueryRegion::new(london(), 100.0).unwrap();
        let first = s.set_region(region);
        let second = s.results();
        assert_eq!(first, second);

        let moved = QueryRegion::new(LatLng::new(10.0, 10.0), 100.0).unwrap();
        assert!(s.set_region(moved).is_empty());
        s.clear_region();
        assert!(s.results().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_updates_active_region() {
        let mut s = session();
        s.set_region(QueryRegion::new(london(), 5_000.0).unwrap());

        let report = s.ingest(&ids(&["a", "b", "c"])).await;
        assert_eq!(report.resources_failed(), 1);

        let mut recorder = Recorder { views: vec![] };
        assert!(s.project(&mut recorder));
        let view = &recorder.views[0];
        let names: Vec<_> = view.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A1", "A2", "B1"]);
        assert_eq!(view.summary.get("Monument"), 2);
        assert_eq!(view.summary.get("Battlefield"), 1);
        assert_eq!(view.summary.total(), 3);
    }

    #[tokio::test]
    async fn test_retract_and_reset() {
        let mut s = session();
        s.set_region(QueryRegion::new(london(), 5_000.0).unwrap());
        s.ingest(&ids(&["a", "b"])).await;
        assert_eq!(s.retract("a"), 2);
        let names: Vec<_> = s.results().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["B1"]);

        s.reset();
        assert!(s.results().is_empty());
        assert!(s.store().is_empty());
    }

    #[test]
    fn test_bounding_box_policy_from_config() {
        let mut config = AppConfig::default();
        config.containment = ContainmentPolicy::BoundingBox;
        let mut s = Session::new(&config, scenario_fetcher());
        let corner = LatLng::new(offset_north(&london(), 9_000.0).lat, london().lng + 0.13);
        s.store().append("x", vec![Point::new("corner", "Monument", corner)]);
        assert_eq!(s.set_region(QueryRegion::new(london(), 10_000.0).unwrap()).len(), 1);
    }

    #[test]
    fn test_summary_first_appearance_order() {
        let points = vec![
            Point::new("a", "Monument", london()),
            Point::new("b", "Battlefield", london()),
            Point::new("c", "Monument", london()),
        ];
        let summary = CategorySummary::from_points(&points);
        assert_eq!(
            summary.counts,
            vec![("Monument".to_string(), 2), ("Battlefield".to_string(), 1)]
        );
    }
}
