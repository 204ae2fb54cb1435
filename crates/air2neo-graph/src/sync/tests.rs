use air2neo_core::source::MemorySource;
use std::sync::Mutex;

use air2neo_core::{
    GraphCounts, MemoryGraph, MemoryWatermarkStore, NodeIdentity, NodeRecord, RetryPolicy,
};
use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::{Value, json};

use super::*;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

fn meta_row(id: &str, fields: Value) -> SourceRow {
    let mut row = SourceRow::new(id, ts(0));
    if let Value::Object(map) = fields {
        row.fields = map.into_iter().collect();
    }
    row
}

fn company(id: &str, secs: i64, name: &str) -> SourceRow {
    SourceRow::new(id, ts(secs)).with_field("Name", json!(name))
}

fn industry(id: &str, secs: i64, name: &str) -> SourceRow {
    SourceRow::new(id, ts(secs)).with_field("Name", json!(name))
}

fn company_id(id: &str) -> NodeIdentity {
    NodeIdentity::new("Company", "_aid", id)
}

fn industry_id(id: &str) -> NodeIdentity {
    NodeIdentity::new("Industry", "_aid", id)
}

struct Fixture {
    source: MemorySource,
    graph: MemoryGraph,
    watermarks: MemoryWatermarkStore,
    config: SyncConfig,
}

impl Fixture {
    /// Companies link to Industries through two grouped columns.
    fn new() -> Self {
        let source = MemorySource::new();
        source.upsert(
            "Tables",
            meta_row(
                "recMeta1",
                json!({
                    "Name": "Companies",
                    "Label": "Company",
                    "Node Properties": ["Name"],
                    "Edges": ["IN_INDUSTRY__BANK -> Industries", "IN_INDUSTRY__TECH -> Industries"],
                }),
            ),
        );
        source.upsert(
            "Tables",
            meta_row(
                "recMeta2",
                json!({"Name": "Industries", "Label": "Industry", "Node Properties": ["Name"]}),
            ),
        );
        source.add_table("Companies");
        source.add_table("Industries");

        let config = SyncConfig {
            batch_size: 2,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
            ..SyncConfig::default()
        };

        Self {
            source,
            graph: MemoryGraph::new(),
            watermarks: MemoryWatermarkStore::new(),
            config,
        }
    }

    fn engine(&self) -> SyncEngine<'_, MemorySource, MemoryGraph, MemoryWatermarkStore> {
        SyncEngine::new(&self.source, &self.graph, &self.watermarks, &self.config)
    }

    async fn run(&self) -> RunReport {
        self.run_with(SyncOptions::default()).await
    }

    async fn run_with(&self, options: SyncOptions) -> RunReport {
        self.engine().run(&options).await.unwrap()
    }

    async fn watermark(&self, table: &str, kind: SyncKind) -> Option<Watermark> {
        self.watermarks
            .get(&WatermarkKey::new(table, kind))
            .await
            .unwrap()
    }
}

fn pass<'r>(report: &'r RunReport, table: &str, kind: SyncKind) -> &'r PassReport {
    let table = report.table(table).unwrap();
    match kind {
        SyncKind::Properties => &table.properties,
        SyncKind::Edges => &table.edges,
    }
}

#[tokio::test]
async fn test_companies_industries_scenario() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Companies",
        company("rec1", 1, "Acme").with_field("IN_INDUSTRY__BANK", json!(["rec9"])),
    );
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));

    let report = fx.run().await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(
        fx.graph.node(&company_id("rec1")).unwrap().get("Name"),
        Some(&json!("Acme"))
    );
    assert_eq!(
        fx.graph.node(&industry_id("rec9")).unwrap().get("Name"),
        Some(&json!("Banking"))
    );
    assert_eq!(
        fx.graph.relationships(),
        vec![(company_id("rec1"), industry_id("rec9"), "IN_INDUSTRY".to_string())]
    );
    assert_eq!(pass(&report, "Industries", SyncKind::Edges).state, PassState::Skipped);

    let constraints = fx.graph.constraints();
    assert!(constraints.contains(&("Company".to_string(), vec!["_aid".to_string()])));
    assert!(constraints.contains(&("Industry".to_string(), vec!["_aid".to_string()])));
}

#[tokio::test]
async fn test_rerun_without_changes_is_a_no_op() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Companies",
        company("rec1", 1, "Acme").with_field("IN_INDUSTRY__BANK", json!(["rec9"])),
    );
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));
    fx.run().await;
    let mutations = fx.graph.mutation_count();

    let second = fx.run().await;
    assert!(second.is_success());
    assert!(second.passes().all(|p| p.rows_read == 0));

    let refreshed = fx
        .run_with(SyncOptions {
            full_refresh: true,
            ..SyncOptions::default()
        })
        .await;
    assert!(refreshed.is_success());
    assert_eq!(pass(&refreshed, "Companies", SyncKind::Properties).rows_read, 1);
    assert_eq!(fx.graph.mutation_count(), mutations);
}

#[tokio::test]
async fn test_watermark_advances_to_batch_maximum_and_never_back() {
    let fx = Fixture::new();
    for (i, id) in ["rec1", "rec2", "rec3", "rec4", "rec5"].iter().enumerate() {
        fx.source.upsert("Industries", industry(id, i as i64 + 1, id));
    }

    let report = fx.run().await;
    let props = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(props.rows_read, 5);
    assert_eq!(props.batches_committed, 3);
    assert_eq!(props.records_written, 5);

    let wm = fx.watermark("Industries", SyncKind::Properties).await.unwrap();
    assert_eq!(wm.at, ts(5));
    assert!(wm.boundary_ids.contains("rec5"));

    // A row surfacing late with an old timestamp never drags the watermark back.
    fx.source.upsert("Industries", industry("rec0", 0, "late"));
    fx.run().await;
    let after = fx.watermark("Industries", SyncKind::Properties).await.unwrap();
    assert_eq!(after.at, ts(5));
}

#[tokio::test]
async fn test_grouped_columns_collapse_to_one_type() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Companies",
        company("rec1", 1, "Acme")
            .with_field("IN_INDUSTRY__BANK", json!(["rec9"]))
            .with_field("IN_INDUSTRY__TECH", json!(["rec9", "rec8"])),
    );

    let report = fx.run().await;
    assert!(report.is_success());

    let mut rels = fx.graph.relationships();
    rels.sort();
    assert_eq!(
        rels,
        vec![
            (company_id("rec1"), industry_id("rec8"), "IN_INDUSTRY".to_string()),
            (company_id("rec1"), industry_id("rec9"), "IN_INDUSTRY".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_edges_to_unsynced_targets_are_filled_in_later() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Companies",
        company("rec1", 1, "Acme").with_field("IN_INDUSTRY__BANK", json!(["rec9"])),
    );
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));

    let only_companies = fx
        .run_with(SyncOptions {
            tables: vec!["Companies".to_string()],
            ..SyncOptions::default()
        })
        .await;
    assert_eq!(only_companies.tables.len(), 1);

    let bare = fx.graph.node(&industry_id("rec9")).unwrap();
    assert_eq!(bare.len(), 1);
    assert_eq!(bare.get("_aid"), Some(&json!("rec9")));

    fx.run().await;
    let filled = fx.graph.node(&industry_id("rec9")).unwrap();
    assert_eq!(filled.get("Name"), Some(&json!("Banking")));
    assert_eq!(fx.graph.nodes_with_label("Industry").len(), 1);
    assert_eq!(fx.graph.relationships().len(), 1);
}

#[tokio::test]
async fn test_unlisted_properties_are_not_clobbered() {
    let fx = Fixture::new();
    fx.source.upsert("Companies", company("rec1", 1, "Acme"));
    fx.run().await;

    fx.graph
        .merge_nodes(&[NodeRecord {
            identity: company_id("rec1"),
            properties: [("Note".to_string(), json!("hand-written"))]
                .into_iter()
                .collect(),
        }])
        .await
        .unwrap();

    fx.source.upsert("Companies", company("rec1", 10, "Acme Corp"));
    fx.run().await;

    let node = fx.graph.node(&company_id("rec1")).unwrap();
    assert_eq!(node.get("Name"), Some(&json!("Acme Corp")));
    assert_eq!(node.get("Note"), Some(&json!("hand-written")));
}

#[tokio::test]
async fn test_rows_at_the_watermark_are_processed_exactly_once() {
    let fx = Fixture::new();
    fx.source.upsert("Industries", industry("rec1", 5, "First"));
    fx.run().await;

    fx.source.upsert("Industries", industry("rec2", 5, "Second"));
    let second = fx.run().await;
    assert_eq!(pass(&second, "Industries", SyncKind::Properties).rows_read, 1);
    assert!(fx.graph.node(&industry_id("rec2")).is_some());

    let third = fx.run().await;
    assert_eq!(pass(&third, "Industries", SyncKind::Properties).rows_read, 0);

    let wm = fx.watermark("Industries", SyncKind::Properties).await.unwrap();
    assert_eq!(wm.boundary_ids.len(), 2);
}

#[tokio::test]
async fn test_write_failure_is_isolated_and_keeps_watermark() {
    let fx = Fixture::new();
    fx.source.upsert("Companies", company("rec1", 1, "Acme"));
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));
    fx.graph.fail_label("Industry");

    let report = fx.run().await;
    assert!(!report.is_success());
    let failed = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(failed.state, PassState::Failed);
    assert!(failed.error.as_deref().unwrap().contains("Write failure"));
    assert_eq!(pass(&report, "Companies", SyncKind::Properties).state, PassState::Committed);
    assert_eq!(fx.watermark("Industries", SyncKind::Properties).await, None);
    assert!(fx.watermark("Companies", SyncKind::Properties).await.is_some());

    fx.graph.heal_label("Industry");
    let retry = fx.run().await;
    assert!(retry.is_success());
    assert_eq!(pass(&retry, "Industries", SyncKind::Properties).rows_read, 1);
    assert_eq!(pass(&retry, "Companies", SyncKind::Properties).rows_read, 0);
}

#[tokio::test]
async fn test_watermark_store_failure_fails_pass_and_rerun_recovers() {
    let fx = Fixture::new();
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));
    fx.watermarks.set_failing(true);

    let report = fx.run().await;
    let failed = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(failed.state, PassState::Failed);
    assert_eq!(failed.batches_committed, 0);
    assert!(failed.error.as_deref().unwrap().contains("Watermark"));

    fx.watermarks.set_failing(false);
    let rerun = fx.run().await;
    assert!(rerun.is_success());
    assert_eq!(pass(&rerun, "Industries", SyncKind::Properties).rows_read, 1);
    assert_eq!(fx.graph.nodes_with_label("Industry").len(), 1);
}

#[tokio::test]
async fn test_source_outage_fails_only_that_table() {
    let fx = Fixture::new();
    fx.source.upsert("Companies", company("rec1", 1, "Acme"));
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));
    fx.source.fail_next("Industries", 10);

    let report = fx.run().await;
    let failed = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(failed.state, PassState::Failed);
    assert!(failed.error.as_deref().unwrap().contains("after 2 attempt(s)"));
    assert_eq!(fx.source.calls("Industries"), 2);
    assert!(pass(&report, "Companies", SyncKind::Properties).state.is_success());
    assert!(pass(&report, "Companies", SyncKind::Edges).state.is_success());
}

#[tokio::test]
async fn test_invalid_link_is_reported_not_fatal() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Companies",
        company("rec1", 1, "Acme")
            .with_field("IN_INDUSTRY__BANK", json!({"not": "a link"}))
            .with_field("IN_INDUSTRY__TECH", json!(["rec8"])),
    );

    let report = fx.run().await;
    let edges = pass(&report, "Companies", SyncKind::Edges);
    assert_eq!(edges.state, PassState::Committed);
    assert_eq!(edges.row_errors.len(), 1);
    assert_eq!(edges.row_errors[0].column, "IN_INDUSTRY__BANK");
    assert_eq!(report.row_errors().count(), 1);
    assert_eq!(fx.graph.relationships().len(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_before_first_batch() {
    let fx = Fixture::new();
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = fx
        .engine()
        .with_shutdown(rx)
        .run(&SyncOptions::default())
        .await
        .unwrap();

    assert!(report.was_cancelled());
    assert_eq!(pass(&report, "Industries", SyncKind::Properties).state, PassState::Cancelled);
    assert_eq!(fx.graph.counts().await.unwrap(), Default::default());
    assert_eq!(fx.watermark("Industries", SyncKind::Properties).await, None);
}

#[tokio::test]
async fn test_metatable_seed_is_used_until_a_watermark_exists() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Tables",
        meta_row(
            "recMeta2",
            json!({
                "Name": "Industries",
                "Label": "Industry",
                "Node Properties": ["Name"],
                "Last Ingested Properties": ts(10).to_rfc3339(),
            }),
        ),
    );
    fx.source.upsert("Industries", industry("rec1", 5, "Old"));
    fx.source.upsert("Industries", industry("rec2", 15, "New"));

    let report = fx.run().await;
    assert_eq!(pass(&report, "Industries", SyncKind::Properties).rows_read, 1);
    assert!(fx.graph.node(&industry_id("rec1")).is_none());
    assert!(fx.graph.node(&industry_id("rec2")).is_some());

    let refreshed = fx
        .run_with(SyncOptions {
            full_refresh: true,
            ..SyncOptions::default()
        })
        .await;
    assert_eq!(pass(&refreshed, "Industries", SyncKind::Properties).rows_read, 2);
    assert!(fx.graph.node(&industry_id("rec1")).is_some());
}

#[tokio::test]
async fn test_nuke_clears_graph_and_watermarks() {
    let fx = Fixture::new();
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));
    fx.run().await;
    fx.graph
        .merge_nodes(&[NodeRecord {
            identity: NodeIdentity::new("Stray", "_aid", "recX"),
            properties: Default::default(),
        }])
        .await
        .unwrap();

    let report = fx
        .run_with(SyncOptions {
            nuke: true,
            ..SyncOptions::default()
        })
        .await;

    assert_eq!(pass(&report, "Industries", SyncKind::Properties).rows_read, 1);
    assert!(fx.graph.nodes_with_label("Stray").is_empty());
    assert_eq!(fx.graph.nodes_with_label("Industry").len(), 1);
}

#[tokio::test]
async fn test_schema_error_aborts_run_before_any_write() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Tables",
        meta_row("recMeta3", json!({"Name": "Broken", "Edges": ["X -> Nowhere"]})),
    );
    fx.source.upsert("Industries", industry("rec9", 2, "Banking"));

    let err = fx.engine().run(&SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::Schema { .. }));
    assert_eq!(fx.graph.mutation_count(), 0);
}

#[tokio::test]
async fn test_unknown_table_selection_is_rejected() {
    let fx = Fixture::new();
    let options = SyncOptions {
        tables: vec!["Nope".to_string()],
        ..SyncOptions::default()
    };
    let err = fx.engine().run(&options).await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

/// Graph that records which node ids were merged, and can raise the
/// shutdown signal once the first node batch has been written.
struct RecordingGraph<'g> {
    inner: &'g MemoryGraph,
    merged: Mutex<Vec<String>>,
    stop_after_first_batch: Option<watch::Sender<bool>>,
}

impl<'g> RecordingGraph<'g> {
    fn new(inner: &'g MemoryGraph, stop_after_first_batch: Option<watch::Sender<bool>>) -> Self {
        Self {
            inner,
            merged: Mutex::new(Vec::new()),
            stop_after_first_batch,
        }
    }

    fn merged(&self) -> Vec<String> {
        self.merged.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphSink for RecordingGraph<'_> {
    async fn ensure_constraint(&self, label: &str, properties: &[String]) -> anyhow::Result<()> {
        self.inner.ensure_constraint(label, properties).await
    }

    async fn merge_nodes(&self, nodes: &[NodeRecord]) -> anyhow::Result<usize> {
        let written = self.inner.merge_nodes(nodes).await?;
        self.merged
            .lock()
            .unwrap()
            .extend(nodes.iter().map(|n| n.identity.id.clone()));
        if let Some(tx) = &self.stop_after_first_batch {
            let _ = tx.send(true);
        }
        Ok(written)
    }

    async fn merge_relationships(&self, edges: &[EdgeRecord]) -> anyhow::Result<usize> {
        self.inner.merge_relationships(edges).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear().await
    }

    async fn counts(&self) -> anyhow::Result<GraphCounts> {
        self.inner.counts().await
    }
}

fn boundary(at: DateTime<Utc>, ids: &[&str]) -> Watermark {
    Watermark {
        at,
        boundary_ids: ids.iter().map(|id| id.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_interrupted_pass_resumes_after_last_committed_batch() {
    let fx = Fixture::new();
    // Three rows share ts(2) and straddle the first two batches of two.
    fx.source.upsert("Industries", industry("rec1", 1, "Agri"));
    fx.source.upsert("Industries", industry("rec2", 2, "Banking"));
    fx.source.upsert("Industries", industry("rec3", 2, "Chemicals"));
    fx.source.upsert("Industries", industry("rec4", 2, "Defense"));
    fx.source.upsert("Industries", industry("rec5", 3, "Energy"));

    let (tx, rx) = watch::channel(false);
    let graph = RecordingGraph::new(&fx.graph, Some(tx));
    let report = SyncEngine::new(&fx.source, &graph, &fx.watermarks, &fx.config)
        .with_shutdown(rx)
        .run(&SyncOptions::default())
        .await
        .unwrap();

    let interrupted = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(interrupted.state, PassState::Cancelled);
    assert_eq!(interrupted.rows_read, 5);
    assert_eq!(interrupted.batches_committed, 1);
    assert_eq!(graph.merged(), vec!["rec1", "rec2"]);
    assert_eq!(
        fx.watermark("Industries", SyncKind::Properties).await,
        Some(boundary(ts(2), &["rec2"]))
    );

    let resumed_graph = RecordingGraph::new(&fx.graph, None);
    let report = SyncEngine::new(&fx.source, &resumed_graph, &fx.watermarks, &fx.config)
        .run(&SyncOptions::default())
        .await
        .unwrap();

    let resumed = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(resumed.state, PassState::Committed);
    assert_eq!(resumed.rows_read, 3);
    assert_eq!(resumed.batches_committed, 2);
    assert_eq!(resumed_graph.merged(), vec!["rec3", "rec4", "rec5"]);
    assert_eq!(
        fx.watermark("Industries", SyncKind::Properties).await,
        Some(boundary(ts(3), &["rec5"]))
    );
    assert_eq!(fx.graph.nodes_with_label("Industry").len(), 5);
}

#[tokio::test]
async fn test_full_refresh_reports_stored_watermark_as_floor() {
    let fx = Fixture::new();
    fx.source.upsert("Industries", industry("rec1", 1, "Agri"));
    fx.source.upsert("Industries", industry("rec2", 3, "Banking"));
    let key = WatermarkKey::new("Industries", SyncKind::Properties);
    fx.watermarks.set(&key, &Watermark::at(ts(10))).await.unwrap();

    let report = fx
        .run_with(SyncOptions {
            full_refresh: true,
            ..SyncOptions::default()
        })
        .await;

    let refreshed = pass(&report, "Industries", SyncKind::Properties);
    assert_eq!(refreshed.state, PassState::Committed);
    assert_eq!(refreshed.rows_read, 2);
    assert_eq!(refreshed.watermark.as_ref().map(|w| w.at), Some(ts(10)));
    assert_eq!(fx.watermark("Industries", SyncKind::Properties).await.map(|w| w.at), Some(ts(10)));
}

#[tokio::test]
async fn test_id_constraint_is_ensured_next_to_composite_one() {
    let fx = Fixture::new();
    fx.source.upsert(
        "Tables",
        meta_row(
            "recMeta2",
            json!({
                "Name": "Industries",
                "Label": "Industry",
                "Node Properties": ["Name", "Code"],
                "Constraint Fields": ["Code"],
            }),
        ),
    );

    let report = fx.run().await;
    assert!(report.is_success(), "{:?}", report);

    let constraints = fx.graph.constraints();
    assert!(constraints.contains(&("Industry".to_string(), vec!["_aid".to_string()])));
    assert!(constraints.contains(&(
        "Industry".to_string(),
        vec!["_aid".to_string(), "Code".to_string()]
    )));
}
