//! Chat prompt intake.
//!
//! Glue between a validated student action and the dispatch router: check
//! the chat is one the author pre-selected, decrypt the stored API key at
//! use, persist the action, then hand it to the service. When the student
//! has no live push channel there is no way to return the answer, so the
//! turn is finalized immediately with a placeholder instead of spending a
//! backend call.

use thiserror::Error;
use tracing::warn;
use vigil_domain::{ActionId, ActionRecord, ChannelId, Exam, SocratQuestionnaire};

use crate::ports::action_store::{ActionStore, StoreError};
use crate::ports::secrets::{SecretCipher, SecretError};
use crate::service::{ChatAiService, DispatchError};

/// Answer recorded when a prompt arrives without a live push channel.
const NO_CHANNEL_ANSWER: &str =
    "<Chat service connection error. Unable to process the prompt>";

#[derive(Error, Debug)]
pub enum AskChatError {
    #[error("Action is not a chat prompt")]
    NotAChatPrompt,

    #[error("Chat {0} is not selected for this exam")]
    ChatNotAllowed(String),

    #[error("Question {0} does not exist")]
    UnknownQuestion(usize),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Persist and dispatch a chat prompt issued during an exam.
///
/// Returns the id assigned to the recorded action. Results reach the
/// student asynchronously through the push channel.
pub async fn dispatch_exam_prompt(
    service: &ChatAiService,
    store: &dyn ActionStore,
    cipher: &dyn SecretCipher,
    exam: &Exam,
    record: ActionRecord,
    channel: Option<&ChannelId>,
) -> Result<ActionId, AskChatError> {
    let ask = record.as_chat().ok_or(AskChatError::NotAChatPrompt)?;
    let settings = exam
        .selected_chats
        .get(&ask.chat_id)
        .ok_or_else(|| AskChatError::ChatNotAllowed(ask.chat_id.clone()))?;
    let private_key = settings
        .api_key
        .as_deref()
        .map(|stored| cipher.decrypt(stored))
        .transpose()?;

    let action_id = store.insert_action(record.clone()).await?;
    match channel {
        Some(channel) => {
            service
                .process_prompt(&action_id, &record, channel, private_key, None)
                .await?;
        }
        None => {
            warn!("no push channel for student, will not be able to return the answer");
            store
                .apply_answer_fragment(&action_id, Some(NO_CHANNEL_ANSWER), true)
                .await?;
        }
    }
    Ok(action_id)
}

/// Persist and dispatch a questionnaire prompt.
///
/// The questionnaire pins a single chat; its per-question `init_prompt`
/// rides along as the system-prompt override so the backend steers the
/// whole guided conversation.
pub async fn dispatch_socrat_prompt(
    service: &ChatAiService,
    store: &dyn ActionStore,
    cipher: &dyn SecretCipher,
    socrat: &SocratQuestionnaire,
    record: ActionRecord,
    channel: Option<&ChannelId>,
) -> Result<ActionId, AskChatError> {
    let ask = record.as_chat().ok_or(AskChatError::NotAChatPrompt)?;
    let selected = socrat
        .selected_chat
        .as_ref()
        .filter(|selected| selected.id == ask.chat_id)
        .ok_or_else(|| AskChatError::ChatNotAllowed(ask.chat_id.clone()))?;
    let question = socrat
        .question(ask.question_idx)
        .ok_or(AskChatError::UnknownQuestion(ask.question_idx))?;
    let private_key = selected
        .api_key
        .as_deref()
        .map(|stored| cipher.decrypt(stored))
        .transpose()?;
    let init_prompt = question.init_prompt.clone();

    let action_id = store.insert_action(record.clone()).await?;
    match channel {
        Some(channel) => {
            service
                .process_prompt(&action_id, &record, channel, private_key, init_prompt)
                .await?;
        }
        None => {
            warn!("no push channel for student, will not be able to return the answer");
            store
                .apply_answer_fragment(&action_id, Some(NO_CHANNEL_ANSWER), true)
                .await?;
        }
    }
    Ok(action_id)
}
