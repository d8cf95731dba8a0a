use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    Human,
    Assistant,
    System,
}

impl ChatRole {
    /// Role string used in the chat_history table.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ChatRole::Human => "user",
            ChatRole::Assistant => "bot",
            ChatRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Human,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Session-scoped conversation state: the invoice the transcript belongs to
/// and the ordered turn buffer. A new upload starts a fresh conversation.
pub struct ChatSession {
    pub id: String,
    current_invoice_id: Option<i64>,
    last_uploaded: Option<String>,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            current_invoice_id: None,
            last_uploaded: None,
            history: Vec::new(),
        }
    }

    pub fn current_invoice_id(&self) -> Option<i64> {
        self.current_invoice_id
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Register an incoming upload. Returns true when the file is new, in
    /// which case the prior transcript has been cleared before any
    /// processing starts.
    pub fn note_upload(&mut self, file_name: &str) -> bool {
        if self.last_uploaded.as_deref() == Some(file_name) {
            return false;
        }
        self.last_uploaded = Some(file_name.to_string());
        self.history.clear();
        self.current_invoice_id = None;
        true
    }

    pub fn set_current_invoice(&mut self, invoice_id: i64) {
        self.current_invoice_id = Some(invoice_id);
    }

    /// Replace the in-memory transcript with the engine's updated history
    /// and persist the accepted pair, keyed by the invoice active now.
    /// Persistence is fire-and-forget: a failed write is logged and the
    /// conversation continues.
    pub async fn record_exchange(
        &mut self,
        question: &str,
        answer: &str,
        updated_history: Vec<ChatTurn>,
        db: &Database,
    ) {
        self.history = updated_history;

        let invoice_id = match self.current_invoice_id {
            Some(id) => id,
            None => return,
        };

        for (role, content) in [(ChatRole::Human, question), (ChatRole::Assistant, answer)] {
            if let Err(e) = db
                .insert_chat_message(
                    invoice_id,
                    role.as_db_str().to_string(),
                    content.to_string(),
                    Utc::now(),
                )
                .await
            {
                warn!("failed to persist chat message: {}", e);
            }
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::InvoiceFields;

    fn fields() -> InvoiceFields {
        InvoiceFields {
            invoice_number: "INV-2001".to_string(),
            invoice_date: "2025-05-06".to_string(),
            total_amount: "100".to_string(),
            supplier: "Amazon".to_string(),
            customer: "K. Patel".to_string(),
            items: "Shoes".to_string(),
        }
    }

    #[test]
    fn new_upload_clears_transcript() {
        let mut session = ChatSession::new();
        session.set_current_invoice(1);
        session.history = vec![ChatTurn::human("hi"), ChatTurn::assistant("hello")];

        assert!(session.note_upload("invoice-a.png"));
        assert!(session.history().is_empty());
        assert_eq!(session.current_invoice_id(), None);
    }

    #[test]
    fn re_upload_of_same_file_is_ignored() {
        let mut session = ChatSession::new();
        assert!(session.note_upload("invoice-a.png"));
        session.set_current_invoice(1);
        session.history = vec![ChatTurn::human("hi")];

        assert!(!session.note_upload("invoice-a.png"));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.current_invoice_id(), Some(1));
    }

    #[tokio::test]
    async fn record_exchange_persists_user_and_bot_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let id = db.insert_invoice(fields(), vec![]).await.unwrap();

        let mut session = ChatSession::new();
        session.set_current_invoice(id);
        let updated = vec![ChatTurn::human("q"), ChatTurn::assistant("a")];
        session.record_exchange("q", "a", updated, &db).await;

        let rows = db.fetch_chat_history(id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "user");
        assert_eq!(rows[0].1, "q");
        assert_eq!(rows[1].0, "bot");
        assert_eq!(rows[1].1, "a");
    }

    #[tokio::test]
    async fn persistence_failure_keeps_conversation_alive() {
        let db = Database::open_in_memory().await.unwrap();
        let id = db.insert_invoice(fields(), vec![]).await.unwrap();
        db.drop_table("chat_history").await.unwrap();

        let mut session = ChatSession::new();
        session.set_current_invoice(id);
        let updated = vec![ChatTurn::human("q"), ChatTurn::assistant("a")];
        // Must not panic or error; the in-memory transcript still advances.
        session.record_exchange("q", "a", updated, &db).await;
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn exchange_without_active_invoice_stays_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut session = ChatSession::new();
        let updated = vec![ChatTurn::human("q"), ChatTurn::assistant("a")];
        session.record_exchange("q", "a", updated, &db).await;
        assert_eq!(session.history().len(), 2);
    }
}
