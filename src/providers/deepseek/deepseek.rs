use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::ProviderConfig;
use crate::providers::traits::CompletionProvider;
use crate::providers::utils::fallback_embedding;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::env;

#[derive(Clone)]
pub struct DeepSeekProvider {
    api_key: String,
    system_message: Arc<RwLock<String>>,
    client: Client,
    api_url: String,
    model: String,
    temperature: f32,
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    async fn new(api_key: String, system_message: String) -> Result<Self> {
        let config = ProviderConfig::from_env("deepseek");
        let model = env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| "deepseek-chat".to_string());

        Ok(Self {
            api_key,
            system_message: Arc::new(RwLock::new(system_message)),
            client: Client::new(),
            api_url: config.api_url,
            model,
            temperature: config.temperature,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let system_message = self
            .system_message
            .read()
            .map_err(|e| anyhow!("Failed to read system message: {}", e))?
            .clone();

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": self.model,
                "messages": [
                    {
                        "role": "system",
                        "content": system_message
                    },
                    {
                        "role": "user",
                        "content": prompt
                    }
                ],
                "temperature": self.temperature
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!(
                "API request failed: Status {}, Body: {}",
                status,
                error_text
            ));
        }

        let response_json: Value = response.json().await?;

        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("API returned error: {}", error));
        }

        response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                let debug_json = serde_json::to_string_pretty(&response_json).unwrap_or_default();
                anyhow!("Invalid response format. Response JSON: {}", debug_json)
            })
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        // DeepSeek exposes no embedding endpoint; hash tokens into a fixed
        // width vector so retrieval stays functional.
        fallback_embedding(text).await
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.model.clone())
    }

    fn get_system_message(&self) -> String {
        self.system_message.read().unwrap().clone()
    }

    fn get_api_key(&self) -> &String {
        &self.api_key
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider + Send + Sync> {
        Box::new(self.clone())
    }
}
