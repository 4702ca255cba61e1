//! The generation orchestrator.
//!
//! [`ItemGenerator::generate`] runs one complete generation call:
//!
//! 1. **Strategies** - every strategy generates its modeled candidates through
//!    the pre-filter; each result is merged into a fresh candidate store.
//! 2. **Scoring** - the deduplicated population is cut into batches; each
//!    batch is scored with one scorer call.
//! 3. **Inner filter** - scored items passing the inner filter update the
//!    statistics and are appended to the destination.
//! 4. **After filter** - statistics are finalized over the appended slice and
//!    may yield a filter that removes appended items failing it.
//!
//! The generator holds configuration only. Candidate store, batches and
//! statistics live for one call.
//!
//! # Example
//!
//! ```ignore
//! use itemforge::generator::{GeneratorConfig, ItemGenerator};
//! use itemforge::scoring::LinearScorer;
//! use itemforge::strategy::StaticStrategy;
//!
//! let generator = ItemGenerator::new(LinearScorer::new().with_weight("ctr", 1.0))
//!     .with_strategy(StaticStrategy::new("popular", popular_items))
//!     .with_strategy(StaticStrategy::new("recent", recent_items))
//!     .with_config(GeneratorConfig::new().with_batch_size(32));
//!
//! let mut ranked = Vec::new();
//! let report = generator.generate(&mut ranked).await?;
//! ```

pub mod config;
mod report;

pub use config::{ConfigError, GeneratorConfig};
pub use report::{GenerationEvent, GenerationReport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use crate::dedup::{self, CandidateStore, InMemoryStore, UpdateOutcome};
use crate::error::GenerateError;
use crate::filter::{AfterFilterFactory, FilterHandler, ItemFilter, NaiveFilterHandler};
use crate::item::Item;
use crate::metrics::{FilterStage, MetricsCollector};
use crate::scoring::{BatchSample, Scorer};
use crate::statistics::{IdleStatistics, ItemGroupStatistics, ScoreStatistics};
use crate::strategy::Strategy;

use report::emit;

type StoreFactory<I> = Arc<dyn Fn() -> Box<dyn CandidateStore<I>> + Send + Sync>;
type StatisticsFactory<I> = Arc<dyn Fn() -> Box<dyn ItemGroupStatistics<I>> + Send + Sync>;

/// Shared flag that stops a running generation call at its next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag so the generator can be used again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Generates, merges, scores and filters items from a set of strategies.
pub struct ItemGenerator<I: Item> {
    strategies: Vec<Arc<dyn Strategy<I>>>,
    scorer: Arc<dyn Scorer<I>>,
    filters: Arc<dyn FilterHandler<I>>,
    statistics: Option<StatisticsFactory<I>>,
    store: StoreFactory<I>,
    config: GeneratorConfig,
    events: Option<Sender<GenerationEvent>>,
    cancellation: CancellationFlag,
    metrics: MetricsCollector,
}

impl<I: Item> ItemGenerator<I> {
    /// Creates a generator with no strategies, no filters, idle statistics and
    /// an in-memory candidate store.
    pub fn new(scorer: impl Scorer<I> + 'static) -> Self {
        let store: StoreFactory<I> =
            Arc::new(|| Box::new(InMemoryStore::<I>::new()) as Box<dyn CandidateStore<I>>);
        Self {
            strategies: Vec::new(),
            scorer: Arc::new(scorer),
            filters: Arc::new(NaiveFilterHandler),
            statistics: None,
            store,
            config: GeneratorConfig::default(),
            events: None,
            cancellation: CancellationFlag::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Appends a strategy. Strategies run and merge in the order they are added.
    pub fn with_strategy(self, strategy: impl Strategy<I> + 'static) -> Self {
        self.with_shared_strategy(Arc::new(strategy))
    }

    /// Appends a strategy shared with other generators.
    pub fn with_shared_strategy(mut self, strategy: Arc<dyn Strategy<I>>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Sets the filter handler.
    pub fn with_filters(mut self, filters: impl FilterHandler<I> + 'static) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    /// Sets the factory creating the statistics aggregator of each call.
    ///
    /// Without one, calls use [`ScoreStatistics`] when an after-filter is
    /// configured and [`IdleStatistics`] otherwise.
    pub fn with_statistics<S, F>(mut self, factory: F) -> Self
    where
        S: ItemGroupStatistics<I> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let factory: StatisticsFactory<I> =
            Arc::new(move || Box::new(factory()) as Box<dyn ItemGroupStatistics<I>>);
        self.statistics = Some(factory);
        self
    }

    /// Sets the factory creating the candidate store of each call.
    pub fn with_store<S, F>(mut self, factory: F) -> Self
    where
        S: CandidateStore<I> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.store = Arc::new(move || Box::new(factory()) as Box<dyn CandidateStore<I>>);
        self
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for replacing the configured batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Sends progress events to `tx`.
    ///
    /// Events are sent without waiting, so a slow or idle receiver never
    /// stalls generation. Events that find the channel full are dropped and
    /// counted in [`GenerationReport::events_dropped`]; size the channel for
    /// one `ItemAccepted` per candidate to receive them all.
    pub fn with_events(mut self, tx: Sender<GenerationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    /// Returns a handle that cancels running calls.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs one generation call, appending the accepted items to `destination`.
    ///
    /// Only the items appended by this call are ever removed; entries before
    /// `report.start_index` are untouched. On error the destination may hold
    /// items appended before the failure, starting at the length it had when
    /// the call began.
    pub async fn generate(&self, destination: &mut Vec<I>) -> Result<GenerationReport, GenerateError> {
        let started = Instant::now();
        self.metrics.generation_started();

        let result = self.run(destination).await;

        let status = match &result {
            Ok(_) => "success",
            Err(GenerateError::Cancelled { .. }) => "cancelled",
            Err(_) => "failure",
        };
        self.metrics
            .generation_finished(status, started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, destination: &mut Vec<I>) -> Result<GenerationReport, GenerateError> {
        self.validate()?;

        let start = destination.len();
        let mut report = GenerationReport::new(start);
        emit(
            &self.events,
            GenerationEvent::Started {
                strategies: self.strategies.len(),
                start_index: start,
            },
            &mut report,
        );

        let pre = self.filters.pre_filter();
        let inner = self.filters.inner_filter();
        let mut statistics = self.new_statistics();

        let population = self.collect_candidates(pre.as_ref(), &mut report).await?;
        self.score_population(
            population,
            inner.as_ref(),
            statistics.as_mut(),
            destination,
            &mut report,
        )
        .await?;

        statistics.compute(&destination[start..]);
        debug!(
            observed = statistics.observed(),
            scored = statistics.snapshot().map(|s| s.count),
            "Statistics finalized"
        );

        self.check_cancelled("after-filter")?;
        let after = self.after_filter(statistics.as_ref());
        self.apply_after_filter(after, destination, &mut report);

        report.finished_at = Utc::now();
        info!(
            generated = report.generated,
            merged = report.merged,
            candidates = report.candidates,
            batches = report.batches,
            appended = report.appended,
            kept = report.kept(),
            "Generation complete"
        );
        emit(
            &self.events,
            GenerationEvent::Completed {
                appended: report.appended,
                removed: report.after_removed,
            },
            &mut report,
        );

        Ok(report)
    }

    fn validate(&self) -> Result<(), GenerateError> {
        if self.strategies.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one strategy is required".to_string(),
            )
            .into());
        }
        self.config.validate()?;
        Ok(())
    }

    fn check_cancelled(&self, stage: &str) -> Result<(), GenerateError> {
        if self.cancellation.is_cancelled() {
            info!(stage = stage, "Generation cancelled");
            return Err(GenerateError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }

    fn new_statistics(&self) -> Box<dyn ItemGroupStatistics<I>> {
        if let Some(factory) = &self.statistics {
            return factory();
        }

        let policy_needs_statistics = self
            .config
            .after_filter
            .as_ref()
            .is_some_and(|policy| policy.needs_statistics());
        if self.filters.needs_statistics() || policy_needs_statistics {
            Box::new(ScoreStatistics::new())
        } else {
            Box::new(IdleStatistics)
        }
    }

    /// Runs every strategy and merges their output into one population.
    async fn collect_candidates(
        &self,
        pre: &dyn ItemFilter<I>,
        report: &mut GenerationReport,
    ) -> Result<Vec<I>, GenerateError> {
        let mut store = (self.store)();

        if self.config.concurrent_strategies {
            self.check_cancelled("strategies")?;
            let outputs =
                futures::future::join_all(self.strategies.iter().map(|s| s.generate(pre))).await;

            // Merge in strategy order regardless of completion order.
            for (strategy, output) in self.strategies.iter().zip(outputs) {
                let items = output.map_err(|source| GenerateError::Strategy {
                    strategy: strategy.name().to_string(),
                    source,
                })?;
                self.merge_output(strategy.name(), items, store.as_mut(), report)?;
            }
        } else {
            for strategy in &self.strategies {
                self.check_cancelled(&format!("strategy '{}'", strategy.name()))?;
                let items = strategy
                    .generate(pre)
                    .await
                    .map_err(|source| GenerateError::Strategy {
                        strategy: strategy.name().to_string(),
                        source,
                    })?;
                self.merge_output(strategy.name(), items, store.as_mut(), report)?;
            }
        }

        let population = store.take_candidates();
        report.candidates = population.len();
        info!(
            strategies = self.strategies.len(),
            generated = report.generated,
            merged = report.merged,
            candidates = report.candidates,
            "Candidate generation complete"
        );
        Ok(population)
    }

    fn merge_output(
        &self,
        strategy: &str,
        items: Vec<I>,
        store: &mut dyn CandidateStore<I>,
        report: &mut GenerationReport,
    ) -> Result<(), GenerateError> {
        let generated = items.len();
        let mut merged = 0usize;
        for item in items {
            if dedup::update(&mut *store, item)? == UpdateOutcome::Merged {
                merged += 1;
            }
        }

        report.generated += generated;
        report.merged += merged;
        self.metrics.record_generated(strategy, generated);
        self.metrics.record_merged(merged);
        debug!(
            strategy = strategy,
            generated = generated,
            merged = merged,
            tracked = store.len(),
            "Merged strategy output"
        );
        emit(
            &self.events,
            GenerationEvent::StrategyCompleted {
                strategy: strategy.to_string(),
                generated,
                merged,
            },
            report,
        );
        Ok(())
    }

    /// Cuts the population into full batches plus one trailing partial batch.
    fn into_batches(&self, population: Vec<I>) -> Result<Vec<BatchSample<I>>, GenerateError> {
        let size = self.config.batch_size;
        let mut batches = Vec::with_capacity(population.len().div_ceil(size));
        let mut current = BatchSample::new(size);

        for item in population {
            if current.is_full() {
                batches.push(std::mem::replace(&mut current, BatchSample::new(size)));
            }
            current
                .add(item)
                .map_err(|source| GenerateError::Scoring {
                    batch: batches.len(),
                    source,
                })?;
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }

    /// Scores the population batch by batch and appends inner-filter survivors.
    ///
    /// Up to `scoring_concurrency` batches are scored at once; results are
    /// consumed in batch order.
    async fn score_population(
        &self,
        population: Vec<I>,
        inner: &dyn ItemFilter<I>,
        statistics: &mut dyn ItemGroupStatistics<I>,
        destination: &mut Vec<I>,
        report: &mut GenerationReport,
    ) -> Result<(), GenerateError> {
        let batches = self.into_batches(population)?;
        let scorer = self.scorer.as_ref();
        let cancellation = &self.cancellation;

        let mut scored = stream::iter(batches.into_iter().enumerate())
            .map(move |(index, mut batch)| async move {
                if cancellation.is_cancelled() {
                    return Err(GenerateError::Cancelled {
                        stage: format!("batch {}", index),
                    });
                }
                let started = Instant::now();
                batch
                    .score_by(scorer)
                    .await
                    .map_err(|source| GenerateError::Scoring {
                        batch: index,
                        source,
                    })?;
                let latency = started.elapsed().as_secs_f64();
                let items = batch.drain().map_err(|source| GenerateError::Scoring {
                    batch: index,
                    source,
                })?;
                Ok((index, items, latency))
            })
            .buffered(self.config.scoring_concurrency);

        while let Some(result) = scored.next().await {
            let (index, items, latency) = result?;
            let size = items.len();

            report.batches += 1;
            report.scored += size;
            self.metrics.record_batch(scorer.name(), size, latency);
            debug!(
                batch = index,
                size = size,
                latency_secs = latency,
                "Batch scored"
            );
            emit(
                &self.events,
                GenerationEvent::BatchScored { batch: index, size },
                report,
            );

            self.accept(items, inner, statistics, destination, report);
        }

        info!(
            batches = report.batches,
            scored = report.scored,
            appended = report.appended,
            inner_rejected = report.inner_rejected,
            "Scoring complete"
        );
        Ok(())
    }

    fn accept(
        &self,
        items: Vec<I>,
        inner: &dyn ItemFilter<I>,
        statistics: &mut dyn ItemGroupStatistics<I>,
        destination: &mut Vec<I>,
        report: &mut GenerationReport,
    ) {
        let mut rejected = 0usize;
        for item in items {
            if !inner.test(&item) {
                rejected += 1;
                continue;
            }

            statistics.increase(&item);
            let score = item.score();
            self.metrics.record_accepted(score);
            emit(
                &self.events,
                GenerationEvent::ItemAccepted {
                    key: format!("{:?}", item.key()),
                    score,
                    position: destination.len(),
                },
                report,
            );

            destination.push(item);
            report.appended += 1;
        }

        report.inner_rejected += rejected;
        self.metrics.record_filtered(FilterStage::Inner, rejected);
    }

    /// The handler's after-filter wins over the configured policy.
    fn after_filter(
        &self,
        statistics: &dyn ItemGroupStatistics<I>,
    ) -> Option<Box<dyn ItemFilter<I>>> {
        self.filters.after_filter(statistics).or_else(|| {
            self.config
                .after_filter
                .as_ref()
                .and_then(|policy| AfterFilterFactory::<I>::create(policy, statistics))
        })
    }

    /// Removes appended items failing the after-filter, evaluating them in append order.
    fn apply_after_filter(
        &self,
        filter: Option<Box<dyn ItemFilter<I>>>,
        destination: &mut Vec<I>,
        report: &mut GenerationReport,
    ) {
        let Some(filter) = filter else {
            debug!("No after-filter derived");
            return;
        };

        let appended = destination.split_off(report.start_index);
        let before = appended.len();
        destination.extend(appended.into_iter().filter(|item| filter.test(item)));
        let kept = destination.len() - report.start_index;
        let removed = before - kept;

        report.after_removed = removed;
        self.metrics.record_filtered(FilterStage::After, removed);
        info!(kept = kept, removed = removed, "After-filter applied");
        emit(
            &self.events,
            GenerationEvent::AfterFilterApplied { kept, removed },
            report,
        );
    }
}
