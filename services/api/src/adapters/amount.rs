//! services/api/src/adapters/amount.rs
//!
//! This module contains the adapter for the free-text amount inference.
//! It implements the `AmountEstimator` port from the `core` crate by asking a
//! local Ollama model to read the invoice and answer with a bare number.

use async_trait::async_trait;
use invoice_core::ports::{AmountEstimator, PortResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `AmountEstimator` port using Ollama's
/// `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaAmountAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaAmountAdapter {
    /// Creates a new `OllamaAmountAdapter`.
    pub fn new(client: reqwest::Client, base_url: String, model: String) -> Self {
        Self { client, base_url, model }
    }

    fn build_prompt(xml_content: &str) -> String {
        format!(
            "You are an assistant that reads XML invoices.\n\
             Given the document below, reply with ONLY the total amount due,\n\
             as a plain number with no symbols, letters or extra text.\n\n\
             Invoice XML:\n{}",
            xml_content
        )
    }
}

//=========================================================================================
// `AmountEstimator` Trait Implementation
//=========================================================================================

#[async_trait]
impl AmountEstimator for OllamaAmountAdapter {
    /// Best-effort amount estimate. Every failure degrades to 0.0 with a
    /// warning: an unreachable endpoint, a bad response body or an answer
    /// with no usable number. Ingestion must not depend on the model.
    async fn estimate_amount(&self, text: &str) -> PortResult<f64> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: Self::build_prompt(text),
            stream: false,
        };

        let response = match self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Amount model unreachable ({}), defaulting to 0.0", e);
                return Ok(0.0);
            }
        };

        let body: GenerateResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Amount model returned an unreadable body ({}), defaulting to 0.0", e);
                return Ok(0.0);
            }
        };

        match parse_first_number(&body.response) {
            Some(amount) => Ok(amount),
            None => {
                warn!("Amount model returned no usable number, defaulting to 0.0");
                Ok(0.0)
            }
        }
    }
}

/// Pulls the first numeric token out of a model answer, normalizing decimal
/// commas to dots.
fn parse_first_number(answer: &str) -> Option<f64> {
    answer
        .split_whitespace()
        .map(|token| token.replace(',', "."))
        .find_map(|token| token.trim().parse::<f64>().ok())
}
