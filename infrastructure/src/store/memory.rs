//! In-memory action store.
//!
//! Reference implementation of the [`ActionStore`] port, used by tests and
//! single-process runs. Deployments back the same port with the exam
//! database instead. Records keep insertion order, which doubles as the
//! timestamp order `prior_turns` must honor.

use std::sync::Mutex;

use async_trait::async_trait;
use vigil_application::{ActionStore, StoreError};
use vigil_domain::{
    ActionDetail, ActionId, ActionRecord, DiscoveredModel, FragmentOutcome, PriorTurn, TurnScope,
};

#[derive(Default)]
pub struct InMemoryActionStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    actions: Vec<ActionRecord>,
    discovered: Vec<DiscoveredModel>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot one record by id (test and report helper).
    pub fn find_action(&self, action_id: &ActionId) -> Option<ActionRecord> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .actions
            .iter()
            .find(|record| record.id.as_ref() == Some(action_id))
            .cloned()
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn insert_action(&self, mut action: ActionRecord) -> Result<ActionId, StoreError> {
        let id = action.id.clone().unwrap_or_else(ActionId::generate);
        action.id = Some(id.clone());
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.actions.push(action);
        Ok(id)
    }

    async fn apply_answer_fragment(
        &self,
        action_id: &ActionId,
        delta: Option<&str>,
        ended: bool,
    ) -> Result<FragmentOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .actions
            .iter_mut()
            .find(|record| record.id.as_ref() == Some(action_id))
            .ok_or_else(|| StoreError::NotFound(action_id.to_string()))?;
        match &mut record.detail {
            ActionDetail::AskChatAi(ask) => Ok(ask.apply_answer(delta, ended)),
            _ => Err(StoreError::NotFound(format!(
                "{action_id} is not a chat action"
            ))),
        }
    }

    async fn prior_turns(&self, scope: &TurnScope) -> Result<Vec<PriorTurn>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .actions
            .iter()
            .filter(|record| {
                record.exam_id == scope.exam_id
                    && record.student_username == scope.student_username
            })
            .filter_map(|record| match &record.detail {
                ActionDetail::AskChatAi(ask)
                    if ask.question_idx == scope.question_idx
                        && ask.chat_id == scope.conversation_id =>
                {
                    ask.effective_prompt().map(|prompt| PriorTurn {
                        prompt: prompt.to_string(),
                        answer: ask.answer.clone(),
                        achieved: ask.achieved,
                    })
                }
                _ => None,
            })
            .collect())
    }

    async fn clear_discovered_models(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.discovered.clear();
        Ok(())
    }

    async fn add_discovered_model(&self, model: DiscoveredModel) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.discovered.contains(&model) {
            inner.discovered.push(model);
        }
        Ok(())
    }

    async fn discovered_models(&self) -> Result<Vec<DiscoveredModel>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.discovered.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_domain::AskChatAi;

    fn chat_record(prompt: &str, chat_id: &str, question_idx: usize) -> ActionRecord {
        ActionRecord::new(
            "exam-1",
            "alice",
            ActionDetail::AskChatAi(AskChatAi::new(
                question_idx,
                chat_id,
                "OPENAI",
                "gpt-3.5-turbo",
                Some(prompt.to_string()),
            )),
        )
    }

    fn scope(question_idx: usize, chat_id: &str) -> TurnScope {
        TurnScope {
            exam_id: "exam-1".to_string(),
            student_username: "alice".to_string(),
            question_idx,
            conversation_id: chat_id.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_an_id() {
        let store = InMemoryActionStore::new();
        let id = store
            .insert_action(chat_record("q", "c1", 0))
            .await
            .unwrap();
        assert!(store.find_action(&id).is_some());
    }

    #[tokio::test]
    async fn fragments_accumulate_on_the_right_turn() {
        let store = InMemoryActionStore::new();
        let id = store
            .insert_action(chat_record("q", "c1", 0))
            .await
            .unwrap();

        store
            .apply_answer_fragment(&id, Some("Hello"), false)
            .await
            .unwrap();
        store
            .apply_answer_fragment(&id, Some(" world"), false)
            .await
            .unwrap();
        store.apply_answer_fragment(&id, None, true).await.unwrap();

        let record = store.find_action(&id).unwrap();
        let ask = record.as_chat().unwrap();
        assert_eq!(ask.answer.as_deref(), Some("Hello world"));
        assert!(ask.achieved);
    }

    #[tokio::test]
    async fn missing_turn_is_not_found() {
        let store = InMemoryActionStore::new();
        let result = store
            .apply_answer_fragment(&ActionId::new("ghost"), Some("x"), false)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn prior_turns_filter_by_conversation() {
        let store = InMemoryActionStore::new();
        let first = store
            .insert_action(chat_record("q1", "c1", 0))
            .await
            .unwrap();
        store
            .apply_answer_fragment(&first, Some("a1"), true)
            .await
            .unwrap();
        // Same student, different conversation and question.
        store
            .insert_action(chat_record("other", "c2", 0))
            .await
            .unwrap();
        store
            .insert_action(chat_record("elsewhere", "c1", 3))
            .await
            .unwrap();
        store
            .insert_action(chat_record("q2", "c1", 0))
            .await
            .unwrap();

        let turns = store.prior_turns(&scope(0, "c1")).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].prompt, "q1");
        assert!(turns[0].achieved);
        assert_eq!(turns[0].answer.as_deref(), Some("a1"));
        assert_eq!(turns[1].prompt, "q2");
        assert!(!turns[1].achieved);
    }

    #[tokio::test]
    async fn discovery_catalog_clears_and_dedupes() {
        let store = InMemoryActionStore::new();
        let row = DiscoveredModel {
            backend: "OPENAI".into(),
            model: "gpt-3.5-turbo".into(),
        };
        store.add_discovered_model(row.clone()).await.unwrap();
        store.add_discovered_model(row).await.unwrap();
        assert_eq!(store.discovered_models().await.unwrap().len(), 1);

        store.clear_discovered_models().await.unwrap();
        assert!(store.discovered_models().await.unwrap().is_empty());
    }
}
