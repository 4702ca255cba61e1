//! End-to-end tests of `ItemGenerator::generate`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use itemforge::dedup::{CandidateStore, InMemoryStore};
use itemforge::filter::{AfterFilterPolicy, FilterChain};
use itemforge::scoring::{FnScorer, LinearScorer};
use itemforge::sources::{DirLineSource, SqlRowSource};
use itemforge::statistics::{ItemGroupStatistics, ScoreSnapshot, ScoreStatistics};
use itemforge::strategy::{LineFileStrategy, StaticStrategy, Strategy};
use itemforge::{
    CancellationFlag, Candidate, GenerateError, GeneratorConfig, Item, ItemGenerator, MergeError,
    MergeRule, ScoreError, StrategyError,
};

type SeenIds = Arc<Mutex<Vec<String>>>;

/// Scores `x + y` and records every id it scores.
fn recording_scorer(
    seen: SeenIds,
) -> FnScorer<impl Fn(&[Candidate]) -> Result<Vec<f64>, ScoreError> + Send + Sync> {
    FnScorer::new(
        "sum",
        move |items: &[Candidate]| -> Result<Vec<f64>, ScoreError> {
            let mut seen = seen.lock().unwrap();
            Ok(items
                .iter()
                .map(|c| {
                    seen.push(c.id.clone());
                    c.feature("x").unwrap_or(0.0) + c.feature("y").unwrap_or(0.0)
                })
                .collect())
        },
    )
}

fn candidate(id: &str, features: &[(&str, f64)]) -> Candidate {
    features
        .iter()
        .fold(Candidate::new(id), |c, (name, value)| c.with_feature(*name, *value))
}

fn scored(items: &[Candidate]) -> Vec<(String, Option<f64>)> {
    items.iter().map(|c| (c.id.clone(), c.score())).collect()
}

fn strategy_a() -> StaticStrategy<Candidate> {
    StaticStrategy::new(
        "A",
        vec![
            candidate("k1", &[("x", 1.0), ("y", 2.0)]),
            candidate("k2", &[("x", 3.0), ("y", 4.0)]),
        ],
    )
}

fn strategy_b() -> StaticStrategy<Candidate> {
    StaticStrategy::new("B", vec![candidate("k1", &[("y", 5.0)])])
}

#[tokio::test]
async fn test_duplicates_merge_with_max_and_score_once() {
    let seen = SeenIds::default();
    let generator = ItemGenerator::new(recording_scorer(seen.clone()))
        .with_strategy(strategy_a())
        .with_strategy(strategy_b())
        .with_batch_size(1);

    let mut out = Vec::new();
    let report = generator.generate(&mut out).await.unwrap();

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].id, "k1");
    assert_eq!(out[0].feature("x"), Some(1.0));
    assert_eq!(out[0].feature("y"), Some(5.0));
    assert_eq!(out[0].score(), Some(6.0));
    assert_eq!(out[1].id, "k2");
    assert_eq!(out[1].feature("y"), Some(4.0));
    assert_eq!(out[1].score(), Some(7.0));

    let sources: Vec<&str> = out[0].sources().iter().map(String::as_str).collect();
    assert_eq!(sources, vec!["A", "B"]);

    assert_eq!(report.generated, 3);
    assert_eq!(report.merged, 1);
    assert_eq!(report.batches, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["k1", "k2"]);
}

#[tokio::test]
async fn test_merge_is_independent_of_strategy_order() {
    let forward = ItemGenerator::new(recording_scorer(SeenIds::default()))
        .with_strategy(strategy_a())
        .with_strategy(strategy_b());
    let backward = ItemGenerator::new(recording_scorer(SeenIds::default()))
        .with_strategy(strategy_b())
        .with_strategy(strategy_a());

    let mut first = Vec::new();
    let mut second = Vec::new();
    forward.generate(&mut first).await.unwrap();
    backward.generate(&mut second).await.unwrap();

    let by_id = |items: &[Candidate]| -> HashMap<String, Candidate> {
        items.iter().map(|c| (c.id.clone(), c.clone())).collect()
    };
    let first = by_id(&first);
    let second = by_id(&second);
    assert_eq!(first.len(), second.len());
    for (id, item) in &first {
        assert_eq!(item.features(), second[id].features());
        assert_eq!(item.score(), second[id].score());
    }
}

#[tokio::test]
async fn test_conflicting_merge_rules_are_independent_of_strategy_order() {
    let summing = || {
        StaticStrategy::new(
            "A",
            vec![
                candidate("k", &[("clicks", 2.0)]).with_feature_rule("clicks", MergeRule::Sum),
            ],
        )
    };
    let maxing = || StaticStrategy::new("B", vec![candidate("k", &[("clicks", 3.0)])]);
    let clicks_scorer = || LinearScorer::new().with_weight("clicks", 1.0);

    let mut forward = Vec::new();
    ItemGenerator::new(clicks_scorer())
        .with_strategy(summing())
        .with_strategy(maxing())
        .generate(&mut forward)
        .await
        .unwrap();

    let mut backward = Vec::new();
    ItemGenerator::new(clicks_scorer())
        .with_strategy(maxing())
        .with_strategy(summing())
        .generate(&mut backward)
        .await
        .unwrap();

    assert_eq!(forward[0].feature("clicks"), Some(5.0));
    assert_eq!(backward[0].feature("clicks"), Some(5.0));
    assert_eq!(forward[0].score(), backward[0].score());
}

#[tokio::test]
async fn test_output_is_independent_of_batch_size() {
    let population: Vec<Candidate> = (0..11)
        .map(|i| candidate(&format!("item-{i}"), &[("x", i as f64 * 0.1)]))
        .collect();

    let mut baseline: Option<Vec<(String, Option<f64>)>> = None;
    for batch_size in [1, 2, 3, 4, 11, 64] {
        let seen = SeenIds::default();
        let generator = ItemGenerator::new(recording_scorer(seen.clone()))
            .with_strategy(StaticStrategy::new("all", population.clone()))
            .with_filters(
                FilterChain::new()
                    .with_inner_filter(|c: &Candidate| c.score().unwrap_or(0.0) >= 0.3)
                    .with_after_filter(AfterFilterPolicy::TopK { k: 4 }),
            )
            .with_batch_size(batch_size);

        let mut out = Vec::new();
        let report = generator.generate(&mut out).await.unwrap();
        assert_eq!(report.batches, 11usize.div_ceil(batch_size));
        assert_eq!(seen.lock().unwrap().len(), 11);

        let result = scored(&out);
        match &baseline {
            None => baseline = Some(result),
            Some(expected) => assert_eq!(&result, expected, "batch size {batch_size}"),
        }
    }

    let kept: Vec<String> = baseline.unwrap().into_iter().map(|(id, _)| id).collect();
    assert_eq!(kept, vec!["item-7", "item-8", "item-9", "item-10"]);
}

#[tokio::test]
async fn test_pre_filtered_items_are_never_modeled_or_scored() {
    let modeled = SeenIds::default();
    let modeled_log = modeled.clone();
    let strategy = StaticStrategy::new(
        "A",
        vec![
            candidate("keep", &[("x", 1.0)]),
            candidate("skip", &[("x", 9.0)]),
        ],
    )
    .with_modeler(move |c: &mut Candidate| {
        modeled_log.lock().unwrap().push(c.id.clone());
        Ok(())
    });

    let seen = SeenIds::default();
    let generator = ItemGenerator::new(recording_scorer(seen.clone()))
        .with_strategy(strategy)
        .with_filters(FilterChain::new().with_pre_filter(|c: &Candidate| c.id != "skip"));

    let mut out = Vec::new();
    generator.generate(&mut out).await.unwrap();

    assert_eq!(scored(&out), vec![("keep".to_string(), Some(1.0))]);
    assert_eq!(*modeled.lock().unwrap(), vec!["keep"]);
    assert_eq!(*seen.lock().unwrap(), vec!["keep"]);
}

#[tokio::test]
async fn test_inner_filter_runs_after_scoring() {
    let generator = ItemGenerator::new(recording_scorer(SeenIds::default()))
        .with_strategy(strategy_a())
        .with_filters(
            FilterChain::new().with_inner_filter(|c: &Candidate| c.score().is_some_and(|s| s > 5.0)),
        );

    let mut out = Vec::new();
    let report = generator.generate(&mut out).await.unwrap();
    assert_eq!(scored(&out), vec![("k2".to_string(), Some(7.0))]);
    assert_eq!(report.scored, 2);
    assert_eq!(report.inner_rejected, 1);
}

#[tokio::test]
async fn test_top_one_keeps_only_the_best() {
    let strategy = StaticStrategy::new(
        "A",
        vec![
            candidate("low", &[("x", 0.2)]),
            candidate("high", &[("x", 0.9)]),
            candidate("mid", &[("x", 0.5)]),
        ],
    );
    let generator = ItemGenerator::new(LinearScorer::new().with_weight("x", 1.0))
        .with_strategy(strategy)
        .with_filters(FilterChain::new().with_after_filter(AfterFilterPolicy::TopK { k: 1 }));

    let mut out = Vec::new();
    let report = generator.generate(&mut out).await.unwrap();
    assert_eq!(scored(&out), vec![("high".to_string(), Some(0.9))]);
    assert_eq!(report.appended, 3);
    assert_eq!(report.after_removed, 2);
}

#[tokio::test]
async fn test_after_filter_only_touches_appended_items() {
    let generator = ItemGenerator::new(LinearScorer::new().with_weight("x", 1.0))
        .with_strategy(StaticStrategy::new(
            "A",
            vec![candidate("a", &[("x", 0.3)]), candidate("b", &[("x", 0.8)])],
        ))
        .with_statistics(ScoreStatistics::new)
        .with_config(GeneratorConfig::new().with_after_filter(AfterFilterPolicy::AboveMean));

    // Earlier unscored entries must survive the after-filter.
    let mut out = vec![candidate("old-1", &[]), candidate("old-2", &[])];
    let report = generator.generate(&mut out).await.unwrap();

    let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["old-1", "old-2", "b"]);
    assert_eq!(report.start_index, 2);
    assert_eq!(report.range(), 2..3);
    assert!(out[0].score().is_none());
}

/// Score statistics that remember which items they were finalized over.
struct RecordingStatistics {
    inner: ScoreStatistics,
    computed_over: SeenIds,
}

impl ItemGroupStatistics<Candidate> for RecordingStatistics {
    fn increase(&mut self, item: &Candidate) {
        self.inner.increase(item);
    }

    fn compute(&mut self, items: &[Candidate]) {
        self.computed_over
            .lock()
            .unwrap()
            .extend(items.iter().map(|c| c.id.clone()));
        ItemGroupStatistics::<Candidate>::compute(&mut self.inner, items);
    }

    fn snapshot(&self) -> Option<&ScoreSnapshot> {
        ItemGroupStatistics::<Candidate>::snapshot(&self.inner)
    }
}

#[tokio::test]
async fn test_statistics_ignore_scored_entries_before_the_call() {
    let computed_over = SeenIds::default();
    let recorded = computed_over.clone();
    let generator = ItemGenerator::new(LinearScorer::new().with_weight("x", 1.0))
        .with_strategy(StaticStrategy::new(
            "A",
            vec![
                candidate("a", &[("x", 0.3)]),
                candidate("b", &[("x", 0.8)]),
                candidate("c", &[("x", 0.6)]),
            ],
        ))
        .with_statistics(move || RecordingStatistics {
            inner: ScoreStatistics::new(),
            computed_over: recorded.clone(),
        })
        .with_config(GeneratorConfig::new().with_after_filter(AfterFilterPolicy::AboveMean));

    // High scores already in the destination would lift the mean above every
    // appended item if they were counted.
    let mut out = Vec::new();
    for (id, score) in [("old-1", 10.0), ("old-2", 12.0)] {
        let mut old = candidate(id, &[]);
        old.set_score(score);
        out.push(old);
    }

    let report = generator.generate(&mut out).await.unwrap();

    assert_eq!(*computed_over.lock().unwrap(), vec!["a", "b", "c"]);
    let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["old-1", "old-2", "b", "c"]);
    assert_eq!(report.after_removed, 1);
    assert_eq!(out[0].score(), Some(10.0));
}

#[tokio::test]
async fn test_top_k_ranks_only_appended_items() {
    let generator = ItemGenerator::new(LinearScorer::new().with_weight("x", 1.0))
        .with_strategy(StaticStrategy::new(
            "A",
            vec![
                candidate("a", &[("x", 0.3)]),
                candidate("b", &[("x", 0.8)]),
                candidate("c", &[("x", 0.6)]),
            ],
        ))
        .with_config(GeneratorConfig::new().with_after_filter(AfterFilterPolicy::TopK { k: 2 }));

    let mut old = candidate("old", &[]);
    old.set_score(100.0);
    let mut out = vec![old];

    generator.generate(&mut out).await.unwrap();

    let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["old", "b", "c"]);
}

#[tokio::test]
async fn test_no_filters_appends_scored_population() {
    let generator = ItemGenerator::new(recording_scorer(SeenIds::default()))
        .with_strategy(strategy_a())
        .with_strategy(strategy_b())
        .with_batch_size(8);

    let mut out = Vec::new();
    let report = generator.generate(&mut out).await.unwrap();
    assert_eq!(out.len(), report.candidates);
    assert_eq!(report.kept(), report.candidates);
    assert!(out.iter().all(|c| c.score().is_some()));
}

#[tokio::test]
async fn test_scorer_failure_aborts_and_keeps_earlier_batches() {
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let scorer = FnScorer::new(
        "flaky",
        move |items: &[Candidate]| -> Result<Vec<f64>, ScoreError> {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            if *calls == 2 {
                return Err(ScoreError::Model("model server unavailable".to_string()));
            }
            Ok(vec![1.0; items.len()])
        },
    );

    let population = (0..5).map(|i| candidate(&format!("c{i}"), &[])).collect();
    let generator = ItemGenerator::new(scorer)
        .with_strategy(StaticStrategy::new("A", population))
        .with_batch_size(2);

    let mut out = Vec::new();
    let err = generator.generate(&mut out).await.unwrap_err();
    assert!(matches!(err, GenerateError::Scoring { batch: 1, .. }));
    assert_eq!(out.len(), 2);
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_score_count_mismatch_aborts() {
    let scorer = FnScorer::new(
        "short",
        |_: &[Candidate]| -> Result<Vec<f64>, ScoreError> { Ok(vec![0.5]) },
    );
    let generator = ItemGenerator::new(scorer)
        .with_strategy(strategy_a())
        .with_batch_size(2);

    let mut out = Vec::new();
    let err = generator.generate(&mut out).await.unwrap_err();
    assert!(matches!(err, GenerateError::Scoring { batch: 0, .. }));
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_before_next_batch() {
    let flag = CancellationFlag::new();
    let trigger = flag.clone();
    let scorer = FnScorer::new(
        "cancelling",
        move |items: &[Candidate]| -> Result<Vec<f64>, ScoreError> {
            trigger.cancel();
            Ok(vec![1.0; items.len()])
        },
    );

    let population = (0..4).map(|i| candidate(&format!("c{i}"), &[])).collect();
    let generator = ItemGenerator::new(scorer)
        .with_strategy(StaticStrategy::new("A", population))
        .with_batch_size(2)
        .with_cancellation(flag);

    let mut out = Vec::new();
    let err = generator.generate(&mut out).await.unwrap_err();
    match err {
        GenerateError::Cancelled { stage } => assert_eq!(stage, "batch 1"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(out.len(), 2);
}

#[tokio::test]
async fn test_concurrent_mode_matches_sequential() {
    let population: Vec<Candidate> = (0..20)
        .map(|i| candidate(&format!("p{i}"), &[("x", (i % 7) as f64)]))
        .collect();
    let overlap: Vec<Candidate> = (10..30)
        .map(|i| candidate(&format!("p{i}"), &[("y", (i % 5) as f64)]))
        .collect();

    let build = |config: GeneratorConfig| {
        ItemGenerator::new(recording_scorer(SeenIds::default()))
            .with_strategy(StaticStrategy::new("first", population.clone()))
            .with_strategy(StaticStrategy::new("second", overlap.clone()))
            .with_config(config.with_after_filter(AfterFilterPolicy::TopFraction { fraction: 0.5 }))
    };

    let sequential = build(GeneratorConfig::new().with_batch_size(3));
    let concurrent = build(
        GeneratorConfig::new()
            .with_batch_size(3)
            .with_concurrent_strategies(true)
            .with_scoring_concurrency(4),
    );

    let mut expected = Vec::new();
    let mut actual = Vec::new();
    sequential.generate(&mut expected).await.unwrap();
    concurrent.generate(&mut actual).await.unwrap();

    assert_eq!(scored(&actual), scored(&expected));
    assert_eq!(actual.len(), 15);
}

struct FlakyStore {
    inner: InMemoryStore<Candidate>,
    saves_left: usize,
}

impl CandidateStore<Candidate> for FlakyStore {
    fn find_existing(&mut self, item: &Candidate) -> Result<Option<&mut Candidate>, MergeError> {
        self.inner.find_existing(item)
    }

    fn save(&mut self, item: Candidate) -> Result<(), MergeError> {
        if self.saves_left == 0 {
            return Err(MergeError::Unavailable("store is full".to_string()));
        }
        self.saves_left -= 1;
        self.inner.save(item)
    }

    fn take_candidates(&mut self) -> Vec<Candidate> {
        self.inner.take_candidates()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[tokio::test]
async fn test_store_failure_aborts() {
    let generator = ItemGenerator::new(recording_scorer(SeenIds::default()))
        .with_strategy(strategy_a())
        .with_store(|| FlakyStore {
            inner: InMemoryStore::new(),
            saves_left: 1,
        });

    let mut out = Vec::new();
    let err = generator.generate(&mut out).await.unwrap_err();
    assert!(matches!(err, GenerateError::Merge(MergeError::Unavailable(_))));
    assert!(out.is_empty());
}

struct SqlStrategy {
    source: SqlRowSource,
}

#[async_trait]
impl Strategy<Candidate> for SqlStrategy {
    fn name(&self) -> &str {
        "sql"
    }

    async fn candidates(&self) -> Result<Vec<Candidate>, StrategyError> {
        use sqlx::Row;

        let items = self
            .source
            .collect_all(|row| {
                let id: String = row.try_get("id")?;
                let ctr: f64 = row.try_get("ctr")?;
                Ok(Candidate::new(id).with_feature("ctr", ctr))
            })
            .await?;
        Ok(items)
    }

    async fn model(&self, item: &mut Candidate) -> Result<(), StrategyError> {
        item.set_feature("from_sql", 1.0);
        Ok(())
    }
}

#[tokio::test]
async fn test_sql_and_directory_strategies_together() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("CREATE TABLE items (id TEXT PRIMARY KEY, ctr REAL NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO items VALUES ('a', 0.4), ('b', 0.1), ('z', 0.05)")
        .execute(&pool)
        .await
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("recent.tsv"), "a\tctr=0.7\nc\tctr=0.3\n").unwrap();
    std::fs::write(dir.path().join("notes.md"), "not\ta=candidate\n").unwrap();

    let sql = SqlStrategy {
        source: SqlRowSource::new(pool, "SELECT id, ctr FROM items WHERE ctr >= ?1 ORDER BY id")
            .bind(0.1),
    };
    let lines = LineFileStrategy::new(
        "recent",
        DirLineSource::new(dir.path()).accept(r"\.tsv$").unwrap(),
    );

    let generator = ItemGenerator::new(LinearScorer::new().with_weight("ctr", 1.0))
        .with_strategy(sql)
        .with_strategy(lines)
        .with_config(GeneratorConfig::new().with_after_filter(AfterFilterPolicy::TopK { k: 2 }));

    let mut out = Vec::new();
    let report = generator.generate(&mut out).await.unwrap();

    assert_eq!(report.generated, 4);
    assert_eq!(report.candidates, 3);
    let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(out[0].feature("ctr"), Some(0.7));
    assert_eq!(out[0].feature("from_sql"), Some(1.0));
    assert_eq!(out[0].feature("via_recent"), Some(1.0));
}
