use chrono::{NaiveDate, Utc};
use std::env;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub models: Vec<String>,
    pub api_url: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn from_env(provider: &str) -> Self {
        let prefix = provider.to_uppercase();

        // Get models from env or use defaults
        let models = env::var(format!("{}_MODELS", prefix))
            .map(|m| m.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| match provider {
                "gemini" => vec![
                    "gemini-2.0-flash".to_string(),
                    "gemini-1.5-flash-8b".to_string(),
                ],
                "deepseek" => vec!["deepseek-chat".to_string()],
                _ => vec![],
            });

        // Get API URL from env or use default
        let api_url = env::var(format!("{}_API_URL", prefix)).unwrap_or_else(|_| match provider {
            "gemini" => "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            "deepseek" => "https://api.deepseek.com/v1/chat/completions".to_string(),
            _ => String::new(),
        });

        // Get temperature from env or use default
        let temperature = env::var(format!("{}_TEMPERATURE", prefix))
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.2);

        Self {
            models,
            api_url,
            temperature,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    /// Fixed "today" used for relative-date reasoning in every prompt and
    /// for the ingestion-date fallback. Overridable so answers about "last
    /// week" stay reproducible against a known dataset.
    pub reference_date: NaiveDate,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let db_path = env::var("INVOICEBOT_DB").unwrap_or_else(|_| "invoices.db".to_string());

        let reference_date = env::var("INVOICEBOT_REFERENCE_DATE")
            .ok()
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
            .unwrap_or_else(|| Utc::now().date_naive());

        Self {
            db_path,
            reference_date,
        }
    }
}
