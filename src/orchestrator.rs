//! The `optimize` pipeline: validate → read files → fingerprint → cache →
//! route → persist.

use crate::Claudette;
use claudette_core::{
    fingerprint, prompt_hash, request::validate_path, request::MAX_FILES, ChatRequest,
    ChatResponse, ClaudetteError, FileContext, RequestOptions,
};
use claudette_ledger::NewQuotaEntry;
use std::time::Instant;

impl Claudette {
    /// The main entry point: one user prompt, optional file context,
    /// optional routing preferences, one uniform response.
    ///
    /// Cache and ledger failures are downgraded to warnings; the primary
    /// request proceeds regardless.
    pub async fn optimize(
        &self,
        prompt: &str,
        files: &[String],
        options: RequestOptions,
    ) -> Result<ChatResponse, ClaudetteError> {
        let started = Instant::now();

        let mut request = ChatRequest {
            prompt: prompt.to_string(),
            files: Vec::new(),
            options,
        };
        request.options.timeout_ms = Some(
            request
                .options
                .timeout_ms
                .unwrap_or(self.get_config().thresholds.request_timeout_ms),
        );
        // Prompt constraints are checked before any file I/O; the file
        // bounds themselves are enforced by read_files.
        request.validate()?;
        request.files = self.read_files(files).await?;

        let key = fingerprint(&request);
        let prompt_digest = prompt_hash(&request.prompt);

        let raw_mode = request.options.bypass_optimization;
        let caching = self.get_config().features.caching && !raw_mode;

        if caching && !request.options.bypass_cache {
            match self.cache().get(&key).await {
                Ok(Some(mut cached)) => {
                    cached.cache_hit = true;
                    cached.latency_ms = started.elapsed().as_millis() as u64;
                    self.append_ledger(&cached, &prompt_digest).await;
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => {
                    // Treated as a miss; the response path still works.
                    tracing::warn!(error = %e, "cache lookup failed, proceeding without it");
                }
            }
        }

        let mut response = if raw_mode {
            self.router().route_raw(&request).await?
        } else {
            self.router().route(&request).await?
        };
        response.latency_ms = started.elapsed().as_millis() as u64;

        if caching {
            if let Err(e) = self
                .cache()
                .put(&key, &prompt_digest, &response, self.get_config().cache_ttl())
                .await
            {
                tracing::warn!(error = %e, "cache insert failed");
            }
        }
        self.append_ledger(&response, &prompt_digest).await;

        if response.cost_eur >= self.get_config().thresholds.cost_warning_eur {
            tracing::warn!(
                cost_eur = response.cost_eur,
                backend = %response.backend_used,
                "request cost exceeded the warning threshold"
            );
        }

        Ok(response)
    }

    /// Reads the attached files, bounded and path-checked. Unreadable files
    /// produce warnings; the request only fails when every file failed.
    async fn read_files(&self, files: &[String]) -> Result<Vec<FileContext>, ClaudetteError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        if files.len() > MAX_FILES {
            return Err(ClaudetteError::InvalidInput(format!(
                "too many context files ({} > {MAX_FILES})",
                files.len()
            )));
        }

        let mut contexts = Vec::with_capacity(files.len());
        for path in files {
            validate_path(path)?;
            match tokio::fs::read_to_string(path).await {
                Ok(content) => contexts.push(FileContext {
                    path: path.clone(),
                    content,
                }),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping unreadable context file");
                }
            }
        }
        if contexts.is_empty() {
            return Err(ClaudetteError::InvalidInput(
                "none of the context files could be read".into(),
            ));
        }
        Ok(contexts)
    }

    /// Appends one quota row; failures are logged and swallowed.
    async fn append_ledger(&self, response: &ChatResponse, prompt_digest: &str) {
        let entry = NewQuotaEntry {
            backend: response.backend_used.clone(),
            prompt_hash: prompt_digest.to_string(),
            tokens_input: response.tokens_input,
            tokens_output: response.tokens_output,
            cost_eur: response.cost_eur,
            cache_hit: response.cache_hit,
            latency_ms: response.latency_ms,
        };
        if let Err(e) = self.store().append_quota(entry).await {
            tracing::warn!(error = %e, "ledger append failed");
        }
    }
}
