//! The chat AI service: adapter registry, dispatch router and lifecycle.
//!
//! One explicitly constructed instance lives in the server's composition
//! root and is shared by reference with every request handler: one
//! instance per process, without hidden global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_domain::{
    ActionId, ActionRecord, BackendKey, ChannelId, ChatChoice, CorrelationTag, DiscoveredModel,
    Exam, PromptRequest, SocratQuestionnaire, StudentChatChoice, TurnScope,
};

use crate::ports::action_store::{ActionStore, StoreError};
use crate::ports::chat_backend::ChatBackend;
use crate::ports::push_channel::PushChannel;
use crate::queue::RelayReceiver;
use crate::relay::RelayWorker;

/// How many one-second polls `start` waits for backends to connect before
/// proceeding in degraded mode.
const CONNECT_WAIT_POLLS: u32 = 5;
const CONNECT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Title shown for models the backend has no display name for.
const UNKNOWN_MODEL_TITLE: &str = "Unknown/No model";

/// Lifecycle errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service already started")]
    AlreadyStarted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Synchronous dispatch failures, surfaced to the HTTP caller before any
/// queue entry is produced.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Action is not a chat prompt")]
    NotAChatPrompt,

    #[error("No prompt to process")]
    MissingPrompt,

    #[error("Unmanaged chat backend: {0}")]
    UnknownBackend(BackendKey),
}

/// Registry of configured backends plus the prompt dispatch path.
pub struct ChatAiService {
    backends: HashMap<BackendKey, Arc<dyn ChatBackend>>,
    store: Arc<dyn ActionStore>,
    push: Arc<dyn PushChannel>,
    relay_rx: Mutex<Option<RelayReceiver>>,
}

impl ChatAiService {
    pub fn new(
        backends: Vec<Arc<dyn ChatBackend>>,
        store: Arc<dyn ActionStore>,
        push: Arc<dyn PushChannel>,
        relay_rx: RelayReceiver,
    ) -> Self {
        let backends = backends
            .into_iter()
            .map(|b| (b.descriptor().key.clone(), b))
            .collect();
        Self {
            backends,
            store,
            push,
            relay_rx: Mutex::new(Some(relay_rx)),
        }
    }

    /// Bring the subsystem up: spawn the relay worker, connect every
    /// backend with a bounded wait, then clear and repopulate the
    /// discovered-model catalog.
    ///
    /// Backends that never connect are logged and simply absent from the
    /// catalog; startup does not fail on them.
    pub async fn start(
        &self,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, ServiceError> {
        let rx = self
            .relay_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(ServiceError::AlreadyStarted)?;
        let worker = RelayWorker::new(Arc::clone(&self.store), Arc::clone(&self.push), rx);
        let handle = tokio::spawn(worker.run(shutdown));

        info!("connecting {} chat backends", self.backends.len());
        for backend in self.backends.values() {
            debug!("connecting chat backend {}", backend.descriptor().key);
            backend.connect().await;
        }

        let mut waited = 0;
        while waited < CONNECT_WAIT_POLLS && self.backends.values().any(|b| !b.is_connected()) {
            waited += 1;
            debug!("waiting 1s for chat backends to connect");
            tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
        }
        for backend in self.backends.values().filter(|b| !b.is_connected()) {
            warn!(
                "chat backend {} never connected, continuing without it",
                backend.descriptor().key
            );
        }

        debug!("clearing discovered chat models");
        self.store.clear_discovered_models().await?;

        debug!("asking connected backends for their models");
        for backend in self.backends.values().filter(|b| b.is_connected()) {
            backend.request_available_models().await;
        }

        info!("chat AI service ready");
        Ok(handle)
    }

    /// The full (backend, model) catalog for the admin configuration UI.
    ///
    /// Discovered rows whose backend is no longer registered are skipped
    /// with a warning, never an error.
    pub async fn available_chats(&self) -> Result<Vec<ChatChoice>, StoreError> {
        let mut choices = Vec::new();
        for DiscoveredModel { backend, model } in self.store.discovered_models().await? {
            let Some(adapter) = self.backends.get(&backend) else {
                warn!("discovered model {model} references unregistered backend {backend}, skipping");
                continue;
            };
            let descriptor = adapter.descriptor();
            let title = adapter
                .model_title(&model)
                .unwrap_or_else(|| UNKNOWN_MODEL_TITLE.to_string());
            choices.push(ChatChoice {
                id: ChatChoice::choice_id(&backend, &model),
                title: format!("{}. {}.", descriptor.display_name, title),
                backend,
                model,
                passthrough: descriptor.passthrough,
                private_key_required: descriptor.private_key_required,
            });
        }
        Ok(choices)
    }

    /// The catalog filtered to the chats an exam author pre-selected.
    pub async fn choices_for_exam(&self, exam: &Exam) -> Result<Vec<StudentChatChoice>, StoreError> {
        let catalog = self.available_chats().await?;
        let mut choices: Vec<StudentChatChoice> = catalog
            .iter()
            .filter(|choice| exam.selected_chats.contains_key(&choice.id))
            .map(student_choice)
            .collect();
        choices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(choices)
    }

    /// The single chat a questionnaire pins, when it is still available.
    pub async fn choices_for_questionnaire(
        &self,
        socrat: &SocratQuestionnaire,
    ) -> Result<Vec<StudentChatChoice>, StoreError> {
        let Some(selected) = socrat.selected_chat.as_ref() else {
            return Ok(vec![]);
        };
        let catalog = self.available_chats().await?;
        Ok(catalog
            .iter()
            .filter(|choice| choice.id == selected.id)
            .map(student_choice)
            .collect())
    }

    /// Dispatch a recorded chat prompt to its backend.
    ///
    /// Resolves the prompt text (explicit, else hidden system-seeded) and
    /// the adapter, then forwards a [`PromptRequest`]. There is no return
    /// value: every result arrives asynchronously through the correlation
    /// queue. This never blocks on backend I/O.
    pub async fn process_prompt(
        &self,
        action_id: &ActionId,
        action: &ActionRecord,
        channel: &ChannelId,
        private_key: Option<String>,
        init_prompt_override: Option<String>,
    ) -> Result<(), DispatchError> {
        let ask = action.as_chat().ok_or(DispatchError::NotAChatPrompt)?;
        let prompt = ask
            .effective_prompt()
            .ok_or(DispatchError::MissingPrompt)?
            .to_string();
        let backend = self
            .backends
            .get(&ask.backend)
            .ok_or_else(|| DispatchError::UnknownBackend(ask.backend.clone()))?;

        let request = PromptRequest {
            model: ask.model.clone(),
            prompt,
            tag: CorrelationTag {
                action_id: action_id.clone(),
                channel: channel.clone(),
                question_idx: ask.question_idx,
                conversation_id: ask.chat_id.clone(),
            },
            private_key,
            system_prompt: init_prompt_override,
            scope: TurnScope {
                exam_id: action.exam_id.clone(),
                student_username: action.student_username.clone(),
                question_idx: ask.question_idx,
                conversation_id: ask.chat_id.clone(),
            },
        };
        backend.send_prompt(request).await;
        Ok(())
    }

    /// Whether a backend key is registered.
    pub fn has_backend(&self, key: &BackendKey) -> bool {
        self.backends.contains_key(key)
    }
}

fn student_choice(choice: &ChatChoice) -> StudentChatChoice {
    StudentChatChoice {
        id: choice.id.clone(),
        backend: choice.backend.clone(),
        model: choice.model.clone(),
        title: choice.title.clone(),
        passthrough: choice.passthrough,
    }
}
