use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("only the sender can delete a message")]
    NotMessageSender,

    #[error("messages can only be deleted within {window_minutes} minutes of sending")]
    DeleteWindowExpired { window_minutes: i64 },

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
