use anyhow::Result;
use chrono::NaiveDate;
use log::debug;

use crate::database::Database;
use crate::providers::traits::CompletionProvider;
use crate::session::{ChatRole, ChatTurn};

use super::document;
use super::prompt;
use super::retriever::Retriever;

/// Combines retrieved invoice documents, the rule prompt, and (for chat)
/// running conversational memory, delegating generation to the provider.
pub struct AnswerEngine {
    provider: Box<dyn CompletionProvider + Send + Sync>,
    db: Database,
    reference_date: NaiveDate,
}

impl AnswerEngine {
    pub fn new(
        provider: Box<dyn CompletionProvider + Send + Sync>,
        db: Database,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            provider,
            db,
            reference_date,
        }
    }

    /// One-shot question answering with no conversational memory.
    pub async fn query(&self, question: &str) -> Result<String> {
        let context = self.retrieve_context(question).await?;
        let prompt = prompt::answer_prompt(self.reference_date, &context, question);
        self.provider.complete(&prompt).await
    }

    /// One chat turn. The incoming question is condensed into a
    /// disambiguated form before retrieval when history exists; the
    /// returned history holds the prior turns plus the new human/assistant
    /// pair and never contains a system entry.
    pub async fn chat(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<(String, Vec<ChatTurn>)> {
        let rendered_history = render_history(history);

        let retrieval_question = if history.is_empty() {
            question.to_string()
        } else {
            let condensed = self
                .provider
                .complete(&prompt::condense_prompt(&rendered_history, question))
                .await?;
            let condensed = condensed.trim().to_string();
            if condensed.is_empty() {
                question.to_string()
            } else {
                debug!("condensed question: {}", condensed);
                condensed
            }
        };

        let context = self.retrieve_context(&retrieval_question).await?;

        let full_prompt = format!(
            "{}\n\nConversation so far:\n{}\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
            prompt::chat_system_prompt(self.reference_date),
            if rendered_history.is_empty() {
                "(none)"
            } else {
                rendered_history.as_str()
            },
            context,
            retrieval_question
        );

        // Whatever the chain produced is returned, even if empty.
        let answer = self.provider.complete(&full_prompt).await?;

        let mut updated: Vec<ChatTurn> = history
            .iter()
            .filter(|turn| turn.role != ChatRole::System)
            .cloned()
            .collect();
        updated.push(ChatTurn::human(question));
        updated.push(ChatTurn::assistant(answer.clone()));

        Ok((answer, updated))
    }

    /// Lightweight "summarize it" handling over the newest invoice only.
    pub async fn summarize_latest(&self) -> Result<Option<String>> {
        let invoice = match self.db.fetch_latest_invoice().await? {
            Some(invoice) => invoice,
            None => return Ok(None),
        };

        let doc = document::build_latest(&invoice);
        let prompt = prompt::answer_prompt(
            self.reference_date,
            &doc.content,
            "Summarize this invoice.",
        );
        let answer = self.provider.complete(&prompt).await?;
        Ok(Some(answer))
    }

    /// Rebuild the full document corpus and similarity index, then return
    /// the whole corpus as context, most relevant document first. Rebuilt
    /// from the store on every call; acceptable only while the corpus stays
    /// small.
    async fn retrieve_context(&self, question: &str) -> Result<String> {
        let invoices = self.db.fetch_all_invoices().await?;
        let documents = document::build_corpus(&invoices);
        let retriever = Retriever::build(documents, self.provider.as_ref()).await?;

        if retriever.is_empty() {
            return Ok(String::new());
        }

        let query_embedding = self.provider.generate_embedding(question).await?;
        let ranked = retriever.rank_all(&query_embedding);

        Ok(ranked
            .iter()
            .map(|r| r.document.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn render_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .filter_map(|turn| match turn.role {
            ChatRole::Human => Some(format!("Human: {}", turn.content)),
            ChatRole::Assistant => Some(format!("Assistant: {}", turn.content)),
            ChatRole::System => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::InvoiceFields;
    use crate::providers::utils::fallback_embedding;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Records every completion prompt and replays scripted replies.
    /// Embeddings come from the deterministic token-hash fallback.
    #[derive(Clone)]
    struct ScriptedProvider {
        api_key: String,
        prompts: Arc<Mutex<Vec<String>>>,
        replies: Arc<Mutex<VecDeque<String>>>,
    }

    impl ScriptedProvider {
        fn with_replies(replies: &[&str]) -> Self {
            Self {
                api_key: String::new(),
                prompts: Arc::new(Mutex::new(Vec::new())),
                replies: Arc::new(Mutex::new(
                    replies.iter().map(|r| r.to_string()).collect(),
                )),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn new(_api_key: String, _system_message: String) -> anyhow::Result<Self> {
            Ok(Self::with_replies(&[]))
        }

        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn generate_embedding(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            fallback_embedding(text).await
        }

        async fn get_model_info(&self) -> anyhow::Result<String> {
            Ok("scripted".to_string())
        }

        fn get_system_message(&self) -> String {
            String::new()
        }

        fn get_api_key(&self) -> &String {
            &self.api_key
        }

        fn clone_box(&self) -> Box<dyn CompletionProvider + Send + Sync> {
            Box::new(self.clone())
        }
    }

    fn fields(number: &str, customer: &str) -> InvoiceFields {
        InvoiceFields {
            invoice_number: number.to_string(),
            invoice_date: "2025-05-06".to_string(),
            total_amount: "100".to_string(),
            supplier: "Amazon".to_string(),
            customer: customer.to_string(),
            items: "Shoes".to_string(),
        }
    }

    fn reference_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 6).unwrap()
    }

    async fn seeded_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_invoice(fields("INV-2001", "K. Patel"), vec![])
            .await
            .unwrap();
        db.insert_invoice(fields("INV-2002", "N. Singh"), vec![])
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn query_feeds_full_corpus_and_rules_to_the_model() {
        let db = seeded_db().await;
        let provider = ScriptedProvider::with_replies(&["The oldest invoice is INV-2001."]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let answer = engine.query("first invoice summary?").await.unwrap();
        assert_eq!(answer, "The oldest invoice is INV-2001.");

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        // Both documents, with their positions, are in the context.
        assert!(prompt.contains("Invoice Number: INV-2001"));
        assert!(prompt.contains("Invoice Number: INV-2002"));
        assert!(prompt.contains("Upload Order: 1 (1 = Oldest, 2 = Newest)"));
        assert!(prompt.contains("Upload Order: 2 (1 = Oldest, 2 = Newest)"));
        assert!(prompt.contains("You are InvoiceBot"));
        assert!(prompt.contains("Question: first invoice summary?"));
    }

    #[tokio::test]
    async fn query_with_empty_corpus_still_answers() {
        let db = Database::open_in_memory().await.unwrap();
        let provider = ScriptedProvider::with_replies(&["No invoices yet."]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let answer = engine.query("anything?").await.unwrap();
        assert_eq!(answer, "No invoices yet.");
    }

    #[tokio::test]
    async fn first_chat_turn_skips_condensation() {
        let db = seeded_db().await;
        let provider = ScriptedProvider::with_replies(&["Hello."]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let (answer, updated) = engine.chat("summarize invoice 1", &[]).await.unwrap();
        assert_eq!(answer, "Hello.");

        // Only the answer call, no condense call.
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Conversation so far:\n(none)"));

        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].role, ChatRole::Human);
        assert_eq!(updated[0].content, "summarize invoice 1");
        assert_eq!(updated[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn follow_up_turn_condenses_before_retrieval() {
        let db = seeded_db().await;
        let provider = ScriptedProvider::with_replies(&[
            "What is the date of invoice INV-2001?",
            "Invoice INV-2001 was issued on 2025-05-06.",
        ]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let history = vec![
            ChatTurn::human("summarize invoice 1"),
            ChatTurn::assistant("The oldest invoice is INV-2001 (K. Patel)."),
        ];
        let (answer, updated) = engine.chat("what is its date?", &history).await.unwrap();
        assert_eq!(answer, "Invoice INV-2001 was issued on 2025-05-06.");

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        // The condense call sees the rendered history and the raw question.
        assert!(prompts[0].contains("Rephrased Question:"));
        assert!(prompts[0].contains("Human: summarize invoice 1"));
        assert!(prompts[0].contains("Question: what is its date?"));
        // The answer call retrieves with the condensed form.
        assert!(prompts[1].contains("Question: What is the date of invoice INV-2001?"));

        // History keeps the original question, not the condensed one.
        assert_eq!(updated.len(), 4);
        assert_eq!(updated[2].content, "what is its date?");
    }

    #[tokio::test]
    async fn empty_condensation_falls_back_to_original_question() {
        let db = seeded_db().await;
        let provider = ScriptedProvider::with_replies(&["   ", "Answer."]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let history = vec![ChatTurn::human("hi"), ChatTurn::assistant("hello")];
        let (_, _) = engine.chat("last invoice?", &history).await.unwrap();

        let prompts = provider.prompts();
        assert!(prompts[1].contains("Question: last invoice?"));
    }

    #[tokio::test]
    async fn returned_history_never_contains_system_turns() {
        let db = seeded_db().await;
        let provider = ScriptedProvider::with_replies(&["condensed", "Answer."]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let history = vec![
            ChatTurn {
                role: ChatRole::System,
                content: "rules".to_string(),
                timestamp: Utc::now(),
            },
            ChatTurn::human("hi"),
            ChatTurn::assistant("hello"),
        ];
        let (_, updated) = engine.chat("next question", &history).await.unwrap();

        assert!(updated.iter().all(|t| t.role != ChatRole::System));
        assert_eq!(updated.len(), 4);
    }

    #[tokio::test]
    async fn summarize_latest_uses_only_the_newest_invoice() {
        let db = seeded_db().await;
        let provider = ScriptedProvider::with_replies(&["Summary of INV-2002."]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());

        let answer = engine.summarize_latest().await.unwrap().unwrap();
        assert_eq!(answer, "Summary of INV-2002.");

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Invoice Number: INV-2002"));
        assert!(!prompts[0].contains("Invoice Number: INV-2001"));
        assert!(!prompts[0].contains("Upload Order"));
    }

    #[tokio::test]
    async fn summarize_latest_on_empty_store_is_none() {
        let db = Database::open_in_memory().await.unwrap();
        let provider = ScriptedProvider::with_replies(&[]);
        let engine = AnswerEngine::new(provider.clone_box(), db, reference_date());
        assert!(engine.summarize_latest().await.unwrap().is_none());
    }
}
