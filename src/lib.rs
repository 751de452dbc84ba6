pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod geo;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod session;
pub mod store;
pub mod types;

pub use catalog::{DatasetDescriptor, SourceCatalog};
pub use config::AppConfig;
pub use error::{AggregatorError, Result};
pub use fetcher::{FetchError, Fetcher, ResourceFetcher};
pub use geo::LatLng;
pub use parser::{CategoryAliases, RecordParser, RowError};
pub use pipeline::{IngestionFailure, IngestionPipeline, IngestionReport};
pub use query::{ContainmentPolicy, LinearScan, SpatialQuery};
pub use session::{CategorySummary, ResultProjector, ResultView, Session};
pub use store::{PointStore, StoreEvent};
pub use types::{Point, QueryRegion};

use clap::Parser;

pub fn run() {
    env_logger::init();

    let cli = cli::Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: 无法启动运行时: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(cli::execute(cli)) {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
