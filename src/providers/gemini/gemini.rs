use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::ProviderConfig;
use crate::providers::traits::CompletionProvider;
use crate::providers::EMBEDDING_DIM;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::env;

const EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    system_message: Arc<RwLock<String>>,
    client: Client,
    api_url: String,
    model: String,
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn new(api_key: String, system_message: String) -> Result<Self> {
        let config = ProviderConfig::from_env("gemini");
        let model = env::var("GEMINI_MODEL")
            .ok()
            .or_else(|| config.models.first().cloned())
            .unwrap_or_else(|| "gemini-2.0-flash".to_string());

        Ok(Self {
            api_key,
            system_message: Arc::new(RwLock::new(system_message)),
            client: Client::new(),
            api_url: config.api_url,
            model,
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
            .post(format!("{}/{}:generateContent", self.api_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [{
                    "role": "user",
                    "parts": [{
                        "text": format!("{}\n{}", system_message, prompt)
                    }]
                }]
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

        response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Invalid response format"))
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/{}:embedContent", self.api_url, EMBEDDING_MODEL))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "model": format!("models/{}", EMBEDDING_MODEL),
                "content": {
                    "parts": [{ "text": text }]
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!(
                "Embedding request failed: Status {}, Body: {}",
                status,
                error_text
            ));
        }

        let response_json: Value = response.json().await?;

        let values = response_json["embedding"]["values"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid embedding response format"))?;

        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.len() != EMBEDDING_DIM {
            return Err(anyhow!(
                "Embedding has wrong size: {} (expected {})",
                vector.len(),
                EMBEDDING_DIM
            ));
        }

        Ok(vector)
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
