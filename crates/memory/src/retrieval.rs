//! Memory Retrieval — pipeline stage 5 (spec §4.3).
//!
//! `plan_waterfall` is the pure budget-split function (§8 boundary
//! behavior and E4 scenario); `retrieve` wires it to a live
//! [`MemoryStore`] and [`Embedder`], issuing the channel-scoped leg first
//! and backfilling globally while excluding ids already returned.

use relay_domain::error::Result;

use crate::provider::{Embedder, MemoryStore};
use crate::types::{ChannelScope, RetrievalRequest, RetrievedMemory, SimilarityQuery, WaterfallPlan};

/// Splits `limit` into a channel-scoped budget and a global backfill limit.
///
/// The ratio is clamped to `[0, 1]` before use; the resulting channel
/// budget is rounded down from `limit as f64 * ratio` and then clamped to
/// at least 1 (spec §8 boundary: `totalLimit=1, ratio=0.5` -> `channelBudget=1`).
pub fn plan_waterfall(limit: u32, ratio: f64) -> WaterfallPlan {
    let ratio = ratio.clamp(0.0, 1.0);
    let raw = (limit as f64 * ratio).floor() as u32;
    let channel_budget = raw.max(1).min(limit.max(1));
    let global_limit = limit.saturating_sub(channel_budget);
    WaterfallPlan { channel_budget, global_limit }
}

/// Runs stage 5 end to end: embed the query text, then either a single
/// global query or a channel-scoped-first waterfall.
pub async fn retrieve(
    store: &dyn MemoryStore,
    embedder: &dyn Embedder,
    request: &RetrievalRequest,
) -> Result<Vec<RetrievedMemory>> {
    let embedding = embedder.embed(&request.query_text).await?;

    match &request.channel_scope {
        None => {
            let query = SimilarityQuery {
                embedding,
                persona_id: request.persona_id,
                personality_id: request.personality_id,
                channel_id: None,
                score_threshold: request.score_threshold,
                exclude_newer_than: request.exclude_newer_than,
                exclude_ids: vec![],
                limit: request.limit,
            };
            store.query_similar(&query).await
        }
        Some(ChannelScope { channel_id, budget_ratio }) => {
            let plan = plan_waterfall(request.limit, *budget_ratio);

            let channel_query = SimilarityQuery {
                embedding: embedding.clone(),
                persona_id: request.persona_id,
                personality_id: request.personality_id,
                channel_id: Some(channel_id.clone()),
                score_threshold: request.score_threshold,
                exclude_newer_than: request.exclude_newer_than,
                exclude_ids: vec![],
                limit: plan.channel_budget,
            };
            let mut channel_results = store.query_similar(&channel_query).await?;

            if plan.global_limit == 0 {
                return Ok(channel_results);
            }

            let exclude_ids = channel_results.iter().map(|m| m.id).collect();
            let global_query = SimilarityQuery {
                embedding,
                persona_id: request.persona_id,
                personality_id: request.personality_id,
                channel_id: None,
                score_threshold: request.score_threshold,
                exclude_newer_than: request.exclude_newer_than,
                exclude_ids,
                limit: plan.global_limit,
            };
            let global_results = store.query_similar(&global_query).await?;

            channel_results.extend(global_results);
            Ok(channel_results)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use relay_domain::types::{Memory, MemoryScope, PendingMemory};
    use uuid::Uuid;

    /// Spec §8 boundary: `totalLimit=1, ratio=0.5` -> `channelBudget=1`.
    #[test]
    fn boundary_tiny_limit_clamps_channel_budget_to_one() {
        let plan = plan_waterfall(1, 0.5);
        assert_eq!(plan, WaterfallPlan { channel_budget: 1, global_limit: 0 });
    }

    /// Spec §8 E4: `totalLimit=10, channelBudgetRatio=0.3` -> budget 3, backfill 7.
    #[test]
    fn e4_waterfall_split() {
        let plan = plan_waterfall(10, 0.3);
        assert_eq!(plan, WaterfallPlan { channel_budget: 3, global_limit: 7 });
    }

    #[test]
    fn ratio_outside_unit_interval_is_clamped() {
        assert_eq!(plan_waterfall(10, 1.5).channel_budget, 10);
        assert_eq!(plan_waterfall(10, -0.5).channel_budget, 1);
    }

    #[test]
    fn zero_limit_never_panics() {
        let plan = plan_waterfall(0, 0.3);
        assert_eq!(plan.channel_budget, 1);
        assert_eq!(plan.global_limit, 0);
    }

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }
    }

    /// Records the `limit`/`channel_id`/`exclude_ids` of every query it
    /// receives, and returns canned results in call order.
    struct RecordingStore {
        calls: Mutex<Vec<SimilarityQuery>>,
        responses: Mutex<Vec<Vec<RetrievedMemory>>>,
    }

    fn fake_memory(id: Uuid) -> RetrievedMemory {
        RetrievedMemory { id, text: "x".into(), scope: MemoryScope::Personal, score: 0.9, created_at: Utc::now() }
    }

    #[async_trait]
    impl MemoryStore for RecordingStore {
        async fn query_similar(&self, query: &SimilarityQuery) -> Result<Vec<RetrievedMemory>> {
            self.calls.lock().unwrap().push(query.clone());
            Ok(self.responses.lock().unwrap().remove(0))
        }
        async fn insert_memory(&self, _memory: &Memory) -> Result<crate::types::InsertOutcome> {
            unimplemented!()
        }
        async fn create_pending(&self, _pending: &PendingMemory) -> Result<()> {
            unimplemented!()
        }
        async fn delete_pending(&self, _id: Uuid) -> Result<()> {
            unimplemented!()
        }
        async fn mark_pending_failed(&self, _id: Uuid, _error: &str) -> Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn waterfall_queries_channel_first_then_global_excluding_channel_ids() {
        let channel_id_1 = Uuid::new_v4();
        let store = RecordingStore {
            calls: Mutex::new(vec![]),
            responses: Mutex::new(vec![vec![fake_memory(channel_id_1)], vec![fake_memory(Uuid::new_v4())]]),
        };
        let request = RetrievalRequest {
            query_text: "hello".into(),
            persona_id: Uuid::new_v4(),
            personality_id: None,
            score_threshold: 0.3,
            exclude_newer_than: None,
            limit: 10,
            channel_scope: Some(ChannelScope { channel_id: "chan-1".into(), budget_ratio: 0.3 }),
        };

        let results = retrieve(&store, &FakeEmbedder, &request).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, channel_id_1, "channel-scoped result must come first");

        let calls = store.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].channel_id.as_deref(), Some("chan-1"));
        assert_eq!(calls[0].limit, 3);
        assert!(calls[1].channel_id.is_none());
        assert_eq!(calls[1].limit, 7);
        assert_eq!(calls[1].exclude_ids, vec![channel_id_1]);
    }

    #[tokio::test]
    async fn no_channel_scope_issues_a_single_global_query() {
        let store = RecordingStore {
            calls: Mutex::new(vec![]),
            responses: Mutex::new(vec![vec![]]),
        };
        let request = RetrievalRequest {
            query_text: "hello".into(),
            persona_id: Uuid::new_v4(),
            personality_id: None,
            score_threshold: 0.3,
            exclude_newer_than: None,
            limit: 5,
            channel_scope: None,
        };
        retrieve(&store, &FakeEmbedder, &request).await.unwrap();
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }
}
