//! Result relay worker, the single consumer of the correlation queue.
//!
//! One long-lived task drains everything the backends produce: model
//! discovery results are upserted into the catalog, answer fragments are
//! folded into their conversation turn and republished to the originating
//! client's push channel.
//!
//! The worker runs isolated from the request-handling path and talks to it
//! only through the queue. A crash here would silently stop every future
//! chat answer system-wide, so item handling is exception-isolating: a
//! malformed item, a missing turn or a storage failure is logged and the
//! loop moves on.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_domain::{AnswerFragment, FragmentOutcome, RelayItem};

use crate::ports::action_store::{ActionStore, StoreError};
use crate::ports::push_channel::PushChannel;
use crate::queue::RelayReceiver;

/// Event name answer payloads are pushed under.
pub const ANSWER_EVENT: &str = "answer";

/// Drains the correlation queue, persists fragments and notifies clients.
pub struct RelayWorker {
    store: Arc<dyn ActionStore>,
    push: Arc<dyn PushChannel>,
    rx: RelayReceiver,
}

impl RelayWorker {
    pub fn new(store: Arc<dyn ActionStore>, push: Arc<dyn PushChannel>, rx: RelayReceiver) -> Self {
        Self { store, push, rx }
    }

    /// Consume the queue until `shutdown` fires or every sender is gone.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("answer relay worker started");
        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                item = self.rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            if let Err(e) = self.handle_item(item).await {
                warn!("relay: dropping item after error: {e}");
            }
        }
        info!("answer relay worker stopped");
    }

    async fn handle_item(&self, item: RelayItem) -> Result<(), StoreError> {
        match item {
            RelayItem::Discovery { backend, model } => {
                info!("new chat model discovered: {backend} : {model}");
                self.store
                    .add_discovered_model(vigil_domain::DiscoveredModel { backend, model })
                    .await
            }
            RelayItem::Answer(fragment) => self.handle_answer(fragment).await,
        }
    }

    async fn handle_answer(&self, fragment: AnswerFragment) -> Result<(), StoreError> {
        let outcome = self
            .store
            .apply_answer_fragment(
                &fragment.tag.action_id,
                fragment.delta.as_deref(),
                fragment.ended,
            )
            .await?;

        match outcome {
            FragmentOutcome::Applied => {}
            FragmentOutcome::AlreadyFinal => {
                debug!(
                    "relay: duplicate terminal fragment for {}, ignoring",
                    fragment.tag.action_id
                );
                return Ok(());
            }
            FragmentOutcome::RejectedAfterFinal => {
                warn!(
                    "relay: delta received after finality for {}, dropping",
                    fragment.tag.action_id
                );
                return Ok(());
            }
        }

        let channel = fragment.tag.channel.clone();
        self.push
            .emit(ANSWER_EVENT, client_payload(&fragment), &channel);
        Ok(())
    }
}

/// The payload republished to the client.
///
/// The session channel id is internal routing information and is stripped
/// here; it must never reach the client.
fn client_payload(fragment: &AnswerFragment) -> Value {
    let mut payload = json!({
        "action_id": fragment.tag.action_id,
        "question_idx": fragment.tag.question_idx,
        "chat_id": fragment.tag.conversation_id,
        "chat_key": fragment.backend,
        "model_key": fragment.model,
        "ended": fragment.ended,
    });
    if let Some(delta) = &fragment.delta {
        payload["answer"] = json!(delta);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::relay_channel;
    use std::sync::Mutex;
    use vigil_domain::{
        ActionId, ActionRecord, AskChatAi, ChannelId, CorrelationTag, DiscoveredModel, PriorTurn,
        TurnScope,
    };

    // -- Mock ports ------------------------------------------------------------

    #[derive(Default)]
    struct MockStore {
        turns: Mutex<Vec<(ActionId, AskChatAi)>>,
        discovered: Mutex<Vec<DiscoveredModel>>,
        fail_applies: bool,
    }

    impl MockStore {
        fn with_turn(id: &str, turn: AskChatAi) -> Self {
            let store = Self::default();
            store
                .turns
                .lock()
                .unwrap()
                .push((ActionId::new(id), turn));
            store
        }

        fn turn(&self, id: &str) -> Option<AskChatAi> {
            self.turns
                .lock()
                .unwrap()
                .iter()
                .find(|(tid, _)| tid.as_str() == id)
                .map(|(_, t)| t.clone())
        }
    }

    #[async_trait::async_trait]
    impl ActionStore for MockStore {
        async fn insert_action(&self, _action: ActionRecord) -> Result<ActionId, StoreError> {
            unimplemented!("not used by the relay worker")
        }

        async fn apply_answer_fragment(
            &self,
            action_id: &ActionId,
            delta: Option<&str>,
            ended: bool,
        ) -> Result<FragmentOutcome, StoreError> {
            if self.fail_applies {
                return Err(StoreError::Backend("injected failure".to_string()));
            }
            let mut turns = self.turns.lock().unwrap();
            let (_, turn) = turns
                .iter_mut()
                .find(|(tid, _)| tid == action_id)
                .ok_or_else(|| StoreError::NotFound(action_id.to_string()))?;
            Ok(turn.apply_answer(delta, ended))
        }

        async fn prior_turns(&self, _scope: &TurnScope) -> Result<Vec<PriorTurn>, StoreError> {
            Ok(vec![])
        }

        async fn clear_discovered_models(&self) -> Result<(), StoreError> {
            self.discovered.lock().unwrap().clear();
            Ok(())
        }

        async fn add_discovered_model(&self, model: DiscoveredModel) -> Result<(), StoreError> {
            let mut discovered = self.discovered.lock().unwrap();
            if !discovered.contains(&model) {
                discovered.push(model);
            }
            Ok(())
        }

        async fn discovered_models(&self) -> Result<Vec<DiscoveredModel>, StoreError> {
            Ok(self.discovered.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct RecordingPush {
        emitted: Mutex<Vec<(String, Value, ChannelId)>>,
    }

    impl PushChannel for RecordingPush {
        fn emit(&self, event: &str, payload: Value, target: &ChannelId) {
            self.emitted
                .lock()
                .unwrap()
                .push((event.to_string(), payload, target.clone()));
        }
    }

    // -- Helpers ---------------------------------------------------------------

    fn tag(action_id: &str) -> CorrelationTag {
        CorrelationTag {
            action_id: ActionId::new(action_id),
            channel: ChannelId::new("sid-internal"),
            question_idx: 2,
            conversation_id: "OPENAI.gpt-3.5-turbo".to_string(),
        }
    }

    fn chat_turn() -> AskChatAi {
        AskChatAi::new(
            2,
            "OPENAI.gpt-3.5-turbo",
            "OPENAI",
            "gpt-3.5-turbo",
            Some("hello".to_string()),
        )
    }

    async fn drive(
        store: Arc<MockStore>,
        push: Arc<RecordingPush>,
        items: Vec<RelayItem>,
    ) {
        let (tx, rx) = relay_channel();
        let worker = RelayWorker::new(store, push, rx);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown));
        for item in items {
            tx.send(item).unwrap();
        }
        // Dropping the last sender ends the loop.
        drop(tx);
        handle.await.unwrap();
    }

    // -- Tests -----------------------------------------------------------------

    #[tokio::test]
    async fn sse_sequence_is_persisted_and_republished() {
        let store = Arc::new(MockStore::with_turn("a1", chat_turn()));
        let push = Arc::new(RecordingPush::default());

        let items = vec![
            RelayItem::Answer(AnswerFragment::delta(tag("a1"), "OPENAI", "gpt-3.5-turbo", "Hi")),
            RelayItem::Answer(AnswerFragment::delta(
                tag("a1"),
                "OPENAI",
                "gpt-3.5-turbo",
                " there",
            )),
            RelayItem::Answer(AnswerFragment::terminal(tag("a1"), "OPENAI", "gpt-3.5-turbo")),
        ];
        drive(Arc::clone(&store), Arc::clone(&push), items).await;

        let turn = store.turn("a1").unwrap();
        assert_eq!(turn.answer.as_deref(), Some("Hi there"));
        assert!(turn.achieved);

        let emitted = push.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 3);
        for (event, payload, target) in emitted.iter() {
            assert_eq!(event, ANSWER_EVENT);
            assert_eq!(target.as_str(), "sid-internal");
            // The internal routing id never leaks into the payload.
            assert!(!payload.to_string().contains("sid-internal"));
        }
        assert_eq!(emitted[0].1["answer"], "Hi");
        assert_eq!(emitted[0].1["ended"], false);
        assert_eq!(emitted[2].1.get("answer"), None);
        assert_eq!(emitted[2].1["ended"], true);
    }

    #[tokio::test]
    async fn discovery_items_are_upserted() {
        let store = Arc::new(MockStore::default());
        let push = Arc::new(RecordingPush::default());

        let discovery = RelayItem::Discovery {
            backend: "LOCALMODEL".into(),
            model: "llama.7B".into(),
        };
        drive(
            Arc::clone(&store),
            Arc::clone(&push),
            vec![discovery.clone(), discovery],
        )
        .await;

        assert_eq!(store.discovered_models().await.unwrap().len(), 1);
        assert!(push.emitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_turn_does_not_stop_the_loop() {
        let store = Arc::new(MockStore::with_turn("known", chat_turn()));
        let push = Arc::new(RecordingPush::default());

        let items = vec![
            RelayItem::Answer(AnswerFragment::delta(
                tag("missing"),
                "OPENAI",
                "gpt-3.5-turbo",
                "lost",
            )),
            RelayItem::Answer(AnswerFragment::delta(
                tag("known"),
                "OPENAI",
                "gpt-3.5-turbo",
                "ok",
            )),
        ];
        drive(Arc::clone(&store), Arc::clone(&push), items).await;

        // The bad item was dropped, the next one still went through.
        assert_eq!(store.turn("known").unwrap().answer.as_deref(), Some("ok"));
        assert_eq!(push.emitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_is_isolated_per_item() {
        let mut failing = MockStore::with_turn("a1", chat_turn());
        failing.fail_applies = true;
        let store = Arc::new(failing);
        let push = Arc::new(RecordingPush::default());

        drive(
            Arc::clone(&store),
            Arc::clone(&push),
            vec![RelayItem::Answer(AnswerFragment::delta(
                tag("a1"),
                "OPENAI",
                "gpt-3.5-turbo",
                "x",
            ))],
        )
        .await;

        // Nothing persisted, nothing pushed, and the worker exited cleanly.
        assert!(push.emitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_finality_is_not_republished() {
        let store = Arc::new(MockStore::with_turn("a1", chat_turn()));
        let push = Arc::new(RecordingPush::default());

        let items = vec![
            RelayItem::Answer(AnswerFragment::terminal(tag("a1"), "OPENAI", "gpt-3.5-turbo")),
            RelayItem::Answer(AnswerFragment::terminal(tag("a1"), "OPENAI", "gpt-3.5-turbo")),
        ];
        drive(Arc::clone(&store), Arc::clone(&push), items).await;

        assert!(store.turn("a1").unwrap().achieved);
        assert_eq!(push.emitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn late_delta_is_dropped_after_finality() {
        let store = Arc::new(MockStore::with_turn("a1", chat_turn()));
        let push = Arc::new(RecordingPush::default());

        let items = vec![
            RelayItem::Answer(AnswerFragment::delta(tag("a1"), "OPENAI", "gpt-3.5-turbo", "x")),
            RelayItem::Answer(AnswerFragment::terminal(tag("a1"), "OPENAI", "gpt-3.5-turbo")),
            RelayItem::Answer(AnswerFragment::delta(
                tag("a1"),
                "OPENAI",
                "gpt-3.5-turbo",
                "late",
            )),
        ];
        drive(Arc::clone(&store), Arc::clone(&push), items).await;

        let turn = store.turn("a1").unwrap();
        assert_eq!(turn.answer.as_deref(), Some("x"));
        assert!(turn.achieved);
        assert_eq!(push.emitted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_token_stops_the_worker() {
        let store = Arc::new(MockStore::default());
        let push = Arc::new(RecordingPush::default());
        let (tx, rx) = relay_channel();
        let worker = RelayWorker::new(store, push, rx);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        shutdown.cancel();
        handle.await.unwrap();
        drop(tx);
    }
}
