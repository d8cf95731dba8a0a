use colored::Colorize;
use chrono::NaiveDate;

use crate::database::Database;
use crate::providers::traits::CompletionProvider;
use crate::rag::engine::AnswerEngine;
use crate::session::{ChatRole, ChatSession};

pub mod invoice;

pub struct CommandHandler {
    provider: Box<dyn CompletionProvider + Send + Sync>,
    db: Database,
    engine: AnswerEngine,
    session: ChatSession,
    reference_date: NaiveDate,
}

impl CommandHandler {
    pub fn new(
        provider: Box<dyn CompletionProvider + Send + Sync>,
        db: Database,
        reference_date: NaiveDate,
    ) -> Self {
        let engine = AnswerEngine::new(provider.clone(), db.clone(), reference_date);
        Self {
            provider,
            db,
            engine,
            session: ChatSession::new(),
            reference_date,
        }
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<(), String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }

        match input.to_lowercase().as_str() {
            "help" => return self.show_help(),
            "history" => return self.show_history(),
            "summary" => return self.summarize_latest().await,
            _ => {}
        }

        if let Some(path) = input.strip_prefix("upload ") {
            return invoice::handle_upload(
                path.trim(),
                self.provider.as_ref(),
                &self.db,
                &mut self.session,
                self.reference_date,
            )
            .await;
        }

        // One-shot query without conversational memory
        if let Some(question) = input.strip_prefix("ask ") {
            let answer = self
                .engine
                .query(question.trim())
                .await
                .map_err(|e| format!("Failed to answer query: {}", e))?;
            self.print_answer(&answer);
            return Ok(());
        }

        // Default to a chat turn against the invoice history
        self.handle_chat(input).await
    }

    async fn handle_chat(&mut self, question: &str) -> Result<(), String> {
        let (answer, updated_history) = self
            .engine
            .chat(question, self.session.history())
            .await
            .map_err(|e| format!("Failed to get response: {}", e))?;

        self.session
            .record_exchange(question, &answer, updated_history, &self.db)
            .await;

        self.print_answer(&answer);
        Ok(())
    }

    async fn summarize_latest(&mut self) -> Result<(), String> {
        match self
            .engine
            .summarize_latest()
            .await
            .map_err(|e| format!("Failed to summarize: {}", e))?
        {
            Some(summary) => self.print_answer(&summary),
            None => println!("No invoices uploaded yet."),
        }
        Ok(())
    }

    fn show_history(&self) -> Result<(), String> {
        if self.session.history().is_empty() {
            println!("No conversation yet for the current invoice.");
            return Ok(());
        }
        for turn in self.session.history() {
            match turn.role {
                ChatRole::Human => println!("{} {}", "You:".cyan(), turn.content),
                ChatRole::Assistant => println!("{} {}", "Bot:".green(), turn.content),
                ChatRole::System => {}
            }
        }
        Ok(())
    }

    fn show_help(&self) -> Result<(), String> {
        println!("📄 Invoice Commands:");
        println!("  upload <image_path>  - OCR an invoice image, extract fields, store it");
        println!("  ask <question>       - One-shot question, no conversation memory");
        println!("  summary              - Summarize the most recently uploaded invoice");
        println!("  history              - Show the current conversation");
        println!("  exit | quit          - Leave");
        println!();
        println!("Anything else is sent as a chat message about your invoices.");
        Ok(())
    }

    fn print_answer(&self, answer: &str) {
        if answer.trim().is_empty() {
            println!("{}", "The model returned an empty answer.".yellow());
        } else {
            println!("{}", answer.truecolor(255, 236, 179));
        }
        println!();
    }
}
