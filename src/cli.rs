//! 命令行入口：采集数据集、设置区域并把结果打印到终端

use crate::config::{default_config_path, load_config};
use crate::error::{AggregatorError, Result};
use crate::geo::LatLng;
use crate::pipeline::IngestionReport;
use crate::query::ContainmentPolicy;
use crate::session::{CategorySummary, ResultProjector, ResultView, Session};
use crate::types::QueryRegion;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "poi-aggregator", version, about = "Heritage POI radius search")]
pub struct Cli {
    /// Dataset ids to load (see --list)
    pub datasets: Vec<String>,

    /// Config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Search center latitude
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Search center longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lng: Option<f64>,

    /// Search radius in miles (defaults to the configured radius)
    #[arg(long)]
    pub radius_miles: Option<f64>,

    /// Containment rule for the search area
    #[arg(long, value_enum)]
    pub containment: Option<ContainmentPolicy>,

    /// Load datasets one after another instead of concurrently
    #[arg(long)]
    pub sequential: bool,

    /// List configured datasets and exit
    #[arg(long)]
    pub list: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// 终端表格输出
pub struct ConsoleProjector;

impl ResultProjector for ConsoleProjector {
    fn project(&mut self, view: &ResultView) {
        println!(
            "\n{} 个结果（({:.5}, {:.5}) 周围 {:.0} 米）",
            view.points.len(),
            view.region.center.lat,
            view.region.center.lng,
            view.region.radius_meters
        );
        println!("{:<48} {:<24} Link", "Name", "Type");
        for p in &view.points {
            println!(
                "{:<48} {:<24} {}",
                p.name,
                p.category,
                p.link.as_deref().unwrap_or("No Link")
            );
        }
        print_summary(&view.summary);
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a IngestionReport,
    results: Option<&'a ResultView>,
}

struct JsonProjector {
    view: Option<ResultView>,
}

impl ResultProjector for JsonProjector {
    fn project(&mut self, view: &ResultView) {
        self.view = Some(view.clone());
    }
}

fn print_summary(summary: &CategorySummary) {
    println!("\nSummary:");
    for (category, count) in &summary.counts {
        println!("  {}: {}", category, count);
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path)?;
    if let Some(policy) = cli.containment {
        config.containment = policy;
    }

    let mut session = Session::from_config(&config)?;

    if cli.list {
        for id in session.catalog().dataset_ids() {
            let d = session.catalog().resolve(&id)?;
            println!("{:<16} {:<24} {} 个资源", d.id, d.label, d.resources.len());
        }
        return Ok(());
    }

    if cli.datasets.is_empty() {
        return Err(AggregatorError::Config(
            "至少需要一个数据集，可用 --list 查看".to_string(),
        ));
    }

    let region = match (cli.lat, cli.lng) {
        (Some(lat), Some(lng)) => Some(QueryRegion::from_miles(
            LatLng::new(lat, lng),
            cli.radius_miles.unwrap_or(config.default_radius_miles),
        )?),
        _ => None,
    };
    if let Some(region) = region {
        session.set_region(region);
    }

    let report = if cli.sequential {
        session.ingest(&cli.datasets).await
    } else {
        session.ingest_all(&cli.datasets).await
    };

    if cli.json {
        let mut projector = JsonProjector { view: None };
        session.project(&mut projector);
        let output = JsonOutput {
            report: &report,
            results: projector.view.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", report.summary());
    for failure in report.failures.iter().filter(|f| f.is_resource_failure()) {
        println!("  - {}", failure);
    }

    if !session.project(&mut ConsoleProjector) {
        // 没有给出区域时只打印库存
        let all = session.store().all();
        println!("\n已加载 {} 个点（未指定搜索位置）", all.len());
        print_summary(&CategorySummary::from_points(&all));
    }

    Ok(())
}
