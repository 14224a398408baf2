use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use crate::config::Config;
use crate::model::{ConverseOptions, ConverseRequest, ConverseResponse, ModelTarget, extract_text};
use crate::providers;

const DRY_RUN_PREFIX: &str = "DRY-RUN: No request sent. Prompt: ";

pub type ConverseFuture<'a> = Pin<Box<dyn Future<Output = Result<ConverseResponse>> + 'a>>;

/// The remote side of a single Converse round trip.
pub trait ConverseBackend {
    fn converse<'a>(
        &'a self,
        client: &'a Client,
        cfg: &'a Config,
        target: &'a ModelTarget,
        request: &'a ConverseRequest,
    ) -> ConverseFuture<'a>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockBackend;

impl ConverseBackend for BedrockBackend {
    fn converse<'a>(
        &'a self,
        client: &'a Client,
        cfg: &'a Config,
        target: &'a ModelTarget,
        request: &'a ConverseRequest,
    ) -> ConverseFuture<'a> {
        Box::pin(async move { providers::bedrock::converse(client, cfg, target, request).await })
    }
}

pub struct Converser<'a, B = BedrockBackend> {
    client: &'a Client,
    cfg: &'a Config,
    backend: B,
}

impl<'a> Converser<'a, BedrockBackend> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        Self {
            client,
            cfg,
            backend: BedrockBackend,
        }
    }
}

impl<'a, B> Converser<'a, B> {
    pub fn with_backend(client: &'a Client, cfg: &'a Config, backend: B) -> Self {
        Self {
            client,
            cfg,
            backend,
        }
    }

    fn resolve_target(&self, options: &ConverseOptions) -> ModelTarget {
        ModelTarget {
            region: non_empty(options.region.as_deref())
                .unwrap_or(&self.cfg.region)
                .to_string(),
            model_id: non_empty(options.model_id.as_deref())
                .unwrap_or(&self.cfg.model_id)
                .to_string(),
        }
    }
}

impl<'a, B> Converser<'a, B>
where
    B: ConverseBackend,
{
    /// Sends `prompt` as a single user turn and returns the reply text.
    ///
    /// In dry-run mode nothing is sent and a placeholder embedding the prompt
    /// is returned instead.
    pub async fn converse(&self, prompt: &str, options: &ConverseOptions) -> Result<String> {
        if self.cfg.dry_run {
            info!(prompt_len = prompt.len(), "dry-run enabled, skipping request");
            return Ok(dry_run_text(prompt));
        }

        let target = self.resolve_target(options);
        let request = ConverseRequest::user_prompt(prompt, &options.inference);
        let response = self
            .backend
            .converse(self.client, self.cfg, &target, &request)
            .await?;

        let text = extract_text(&response.output.message);
        debug!(
            model_id = %target.model_id,
            text_len = text.len(),
            "extracted converse reply"
        );
        Ok(text)
    }
}

pub fn dry_run_text(prompt: &str) -> String {
    format!("{DRY_RUN_PREFIX}{prompt}")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}
