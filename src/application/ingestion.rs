//! # Ingestion run
//!
//! Runs every enabled source over its configured targets, sharing one item
//! budget, and reports per-source counts. A source that cannot start (no
//! browser, bad selectors) or that loses its storage mid-run is marked failed
//! and the other sources still run.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::crawling::{
    ItemBudget, ListingSource, PageDelays, PaginationController, RenderedSource, StaticSource, StopReason,
    TargetReport,
};
use crate::domain::product::Source;
use crate::domain::repositories::CatalogStore;
use crate::domain::upsert::{UpsertEngine, UpsertStats};
use crate::infrastructure::browser::RendererFactory;
use crate::infrastructure::config::{AppConfig, CrawlTarget, DelayRange};
use crate::infrastructure::http_client::HtmlFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Completed,
    /// Disabled in configuration or filtered out on the command line
    Disabled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub source: Source,
    pub status: SourceStatus,
    pub targets: Vec<TargetReport>,
}

impl SourceSummary {
    fn new(source: Source) -> Self {
        Self {
            source,
            status: SourceStatus::Completed,
            targets: Vec::new(),
        }
    }

    fn disabled(source: Source) -> Self {
        Self {
            status: SourceStatus::Disabled,
            ..Self::new(source)
        }
    }

    pub fn items_collected(&self) -> usize {
        self.targets.iter().map(|t| t.items_collected).sum()
    }

    pub fn pages_fetched(&self) -> u32 {
        self.targets.iter().map(|t| t.pages_fetched).sum()
    }

    pub fn writes(&self) -> UpsertStats {
        let mut total = UpsertStats::default();
        for target in &self.targets {
            total.absorb(target.writes);
        }
        total
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SourceStatus::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub sources: Vec<SourceSummary>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn items_collected(&self) -> usize {
        self.sources.iter().map(SourceSummary::items_collected).sum()
    }

    pub fn writes(&self) -> UpsertStats {
        let mut total = UpsertStats::default();
        for source in &self.sources {
            total.absorb(source.writes());
        }
        total
    }

    pub fn source(&self, source: Source) -> Option<&SourceSummary> {
        self.sources.iter().find(|s| s.source == source)
    }

    /// True when at least one source ran and every source that ran failed
    pub fn all_failed(&self) -> bool {
        let mut attempted = self
            .sources
            .iter()
            .filter(|s| s.status != SourceStatus::Disabled)
            .peekable();
        attempted.peek().is_some() && attempted.all(SourceSummary::is_failed)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let writes = self.writes();
        writeln!(
            f,
            "Run finished in {:.1}s: collected={} inserted={} updated={} history={} unchanged={}{}",
            self.elapsed.as_secs_f64(),
            self.items_collected(),
            writes.inserted,
            writes.updated,
            writes.history_appended,
            writes.skipped,
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        for source in &self.sources {
            let status = match &source.status {
                SourceStatus::Completed => "completed".to_string(),
                SourceStatus::Disabled => "disabled".to_string(),
                SourceStatus::Failed(reason) => format!("FAILED: {reason}"),
            };
            writeln!(
                f,
                "  {:<13} {:<10} pages={} collected={}",
                source.source.as_str(),
                status,
                source.pages_fetched(),
                source.items_collected()
            )?;
            for target in &source.targets {
                writeln!(
                    f,
                    "    - {}: pages={} skipped={} collected={} dropped={} ({})",
                    target.label,
                    target.pages_fetched,
                    target.pages_skipped,
                    target.items_collected,
                    target.items_dropped,
                    target.stop
                )?;
            }
        }
        Ok(())
    }
}

pub struct IngestionRun {
    config: AppConfig,
    store: Arc<dyn CatalogStore>,
    renderers: Arc<dyn RendererFactory>,
    fetcher: Arc<dyn HtmlFetcher>,
    cancel: CancellationToken,
    only: Option<Source>,
}

impl IngestionRun {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CatalogStore>,
        renderers: Arc<dyn RendererFactory>,
        fetcher: Arc<dyn HtmlFetcher>,
    ) -> Self {
        Self {
            config,
            store,
            renderers,
            fetcher,
            cancel: CancellationToken::new(),
            only: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Restrict the run to one source
    pub fn only(mut self, source: Option<Source>) -> Self {
        self.only = source;
        self
    }

    pub async fn execute(&self) -> RunSummary {
        let started = Instant::now();
        let budget = ItemBudget::new(self.config.crawl.max_items_total);
        info!(
            "Starting ingestion run: max {} items, {} sources",
            budget.limit(),
            if self.config.crawl.parallel_sources { "parallel" } else { "sequential" }
        );

        let sources = if self.config.crawl.parallel_sources {
            join_all(Source::ALL.map(|source| self.run_source(source, budget.clone()))).await
        } else {
            let mut sources = Vec::with_capacity(Source::ALL.len());
            for source in Source::ALL {
                sources.push(self.run_source(source, budget.clone()).await);
            }
            sources
        };

        let summary = RunSummary {
            sources,
            elapsed: started.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            "Ingestion run finished: {} items collected, {} writes in {:?}",
            summary.items_collected(),
            summary.writes().writes(),
            summary.elapsed
        );
        summary
    }

    fn is_enabled(&self, source: Source) -> bool {
        if self.only.is_some_and(|only| only != source) {
            return false;
        }
        match source {
            Source::Kabum => self.config.kabum.enabled,
            Source::MercadoLivre => self.config.mercadolivre.enabled,
        }
    }

    async fn run_source(&self, source: Source, budget: ItemBudget) -> SourceSummary {
        if !self.is_enabled(source) {
            info!("[{}] Source disabled, skipping", source);
            return SourceSummary::disabled(source);
        }

        let summary = match source {
            Source::Kabum => self.run_kabum(budget).await,
            Source::MercadoLivre => self.run_mercadolivre(budget).await,
        };

        match &summary.status {
            SourceStatus::Failed(reason) => error!("[{}] Source failed: {}", source, reason),
            _ if summary.items_collected() == 0 => {
                warn!("[{}] Source produced no items", source)
            }
            _ => info!(
                "[{}] Source finished with {} items",
                source,
                summary.items_collected()
            ),
        }
        summary
    }

    async fn run_kabum(&self, budget: ItemBudget) -> SourceSummary {
        let config = &self.config.kabum;
        let mut summary = SourceSummary::new(Source::Kabum);

        let renderer = match self.renderers.open().await {
            Ok(renderer) => renderer,
            Err(e) => {
                summary.status = SourceStatus::Failed(format!("browser session could not start: {e}"));
                return summary;
            }
        };
        let mut adapter = match RenderedSource::new(renderer, config) {
            Ok(adapter) => adapter,
            Err(e) => {
                summary.status = SourceStatus::Failed(e.to_string());
                return summary;
            }
        };

        let controller = self
            .controller(Source::Kabum, budget, config.max_pages)
            .with_delays(PageDelays {
                page: config.page_delay,
                detail: config.detail_delay,
            })
            .with_gallery(config.collect_gallery);

        self.crawl_targets(&controller, &mut adapter, &config.targets, &mut summary)
            .await;
        adapter.shutdown().await;
        summary
    }

    async fn run_mercadolivre(&self, budget: ItemBudget) -> SourceSummary {
        let config = &self.config.mercadolivre;
        let mut summary = SourceSummary::new(Source::MercadoLivre);

        let mut adapter = match StaticSource::new(Arc::clone(&self.fetcher), config) {
            Ok(adapter) => adapter,
            Err(e) => {
                summary.status = SourceStatus::Failed(e.to_string());
                return summary;
            }
        };

        let controller = self
            .controller(Source::MercadoLivre, budget, config.max_pages)
            .with_delays(PageDelays {
                page: config.page_delay,
                detail: DelayRange::none(),
            });

        self.crawl_targets(&controller, &mut adapter, &config.targets, &mut summary)
            .await;
        adapter.shutdown().await;
        summary
    }

    fn controller(&self, source: Source, budget: ItemBudget, max_pages: u32) -> PaginationController {
        PaginationController::new(
            Arc::clone(&self.store),
            UpsertEngine::new(source.upsert_policy()),
            budget,
            max_pages,
        )
        .with_cancellation(self.cancel.clone())
    }

    async fn crawl_targets(
        &self,
        controller: &PaginationController,
        adapter: &mut dyn ListingSource,
        targets: &[CrawlTarget],
        summary: &mut SourceSummary,
    ) {
        let source = adapter.source();
        if targets.is_empty() {
            warn!("[{}] No targets configured", source);
        }

        for target in targets {
            if self.cancel.is_cancelled() {
                info!("[{}] Cancelled, skipping remaining targets", source);
                break;
            }
            match controller.crawl_target(adapter, target).await {
                Ok(report) => {
                    let stop = report.stop;
                    summary.targets.push(report);
                    if matches!(stop, StopReason::MaxItems | StopReason::Cancelled) {
                        break;
                    }
                }
                Err(e) => {
                    summary.status = SourceStatus::Failed(e.to_string());
                    break;
                }
            }
        }
    }
}
