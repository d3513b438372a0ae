//! The content resolution pipeline.
//!
//! Tiers are tried in order and the first one to answer wins:
//!
//! 1. [`CacheTier`]: previously generated text that still passes validity
//! 2. [`StaticTier`]: authored curriculum content
//! 3. [`GenerativeTier`]: the remote service, with timeout and retry policy
//! 4. [`OfflineTier`]: canned text; its return type is not optional, which
//!    is what makes [`ContentPipeline::resolve`] total

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tracing::{debug, info, warn};

use crate::availability::{AvailabilityMonitor, HealthProbe};
use crate::cache::{CacheEntry, CacheKey, CacheValidity, CACHE_COLLECTION};
use crate::curriculum::Curriculum;
use crate::fallback::FallbackStore;
use crate::generative::{CompletionRequest, GenerationSettings, GenerativeClient, GenerativeError};
use crate::store::DocumentStore;
use crate::{prompt, ContentMode, ContentRequest, LearningStyle, ResolutionResult};

/// Default hard bound on one generative call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Default number of attempts when rate limited.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between rate-limited attempts.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);

/// Timeout and retry behaviour of the generative tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard bound on a single call.
    pub timeout: Duration,
    /// Total attempts allowed when rate limited.
    pub max_attempts: u32,
    /// Pause before retrying after a rate limit.
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
        }
    }
}

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Do not read from the cache.
    pub skip_cache: bool,
    /// Call the generative service even while the monitor is cooling down.
    pub ignore_gate: bool,
}

impl ResolveOptions {
    /// Options used by the availability probe.
    pub const fn probe() -> Self {
        Self {
            skip_cache: true,
            ignore_gate: true,
        }
    }
}

/// One tier of the pipeline.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// Tier name for logs.
    fn name(&self) -> &'static str;

    /// Returns a result, or `None` to fall through to the next tier.
    async fn attempt(
        &self,
        request: &ContentRequest,
        options: ResolveOptions,
    ) -> Option<ResolutionResult>;
}

/// Serves previously generated explanations.
pub struct CacheTier {
    store: Arc<dyn DocumentStore>,
    validity: CacheValidity,
}

impl CacheTier {
    /// Creates the tier.
    pub fn new(store: Arc<dyn DocumentStore>, validity: CacheValidity) -> Self {
        Self { store, validity }
    }
}

#[async_trait]
impl ResolveStrategy for CacheTier {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn attempt(
        &self,
        request: &ContentRequest,
        options: ResolveOptions,
    ) -> Option<ResolutionResult> {
        if options.skip_cache {
            return None;
        }
        let key = CacheKey::for_request(request).to_storage_key();
        let document = match self.store.get(CACHE_COLLECTION, &key).await {
            Ok(document) => document?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };

        let explanation = serde_json::from_value::<CacheEntry>(document.clone())
            .map(|entry| entry.explanation)
            .ok()
            .or_else(|| {
                document
                    .get("explanation")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })?;

        if self.validity.is_valid(&explanation) {
            debug!(key = %key, "Cache hit");
            Some(ResolutionResult::cached(explanation))
        } else {
            debug!(key = %key, "Cached entry is stale; bypassing");
            None
        }
    }
}

/// Answers from the authored curriculum.
pub struct StaticTier {
    curriculum: Arc<Curriculum>,
}

impl StaticTier {
    /// Creates the tier.
    pub fn new(curriculum: Arc<Curriculum>) -> Self {
        Self { curriculum }
    }
}

#[async_trait]
impl ResolveStrategy for StaticTier {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn attempt(
        &self,
        request: &ContentRequest,
        _options: ResolveOptions,
    ) -> Option<ResolutionResult> {
        if request.mode() != ContentMode::Explain || request.is_free_text_explain() {
            return None;
        }
        self.curriculum
            .authored_explanation(request.topic(), request.level(), request.style())
            .map(ResolutionResult::authored)
    }
}

/// Calls the generative service under the retry policy.
pub struct GenerativeTier {
    client: Arc<dyn GenerativeClient>,
    store: Arc<dyn DocumentStore>,
    monitor: AvailabilityMonitor,
    policy: RetryPolicy,
    settings: GenerationSettings,
}

impl GenerativeTier {
    /// Creates the tier.
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        store: Arc<dyn DocumentStore>,
        monitor: AvailabilityMonitor,
        policy: RetryPolicy,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            client,
            store,
            monitor,
            policy,
            settings,
        }
    }

    async fn call_once(&self, prompt: &str) -> Result<String, GenerativeError> {
        let request = CompletionRequest::new(prompt, self.settings);
        let response = time::timeout(self.policy.timeout, self.client.complete(request))
            .await
            .map_err(|_| GenerativeError::Timeout {
                after_ms: u64::try_from(self.policy.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        if response.text.trim().is_empty() {
            return Err(GenerativeError::Malformed("empty completion".to_string()));
        }
        Ok(response.text)
    }

    async fn write_cache(&self, key: &CacheKey, explanation: &str) {
        let entry = CacheEntry::new(key, explanation);
        let result = match serde_json::to_value(&entry) {
            Ok(value) => self.store.set(CACHE_COLLECTION, &entry.key, value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(key = %entry.key, error = %e, "Cache write failed; continuing");
        }
    }
}

#[async_trait]
impl ResolveStrategy for GenerativeTier {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn attempt(
        &self,
        request: &ContentRequest,
        options: ResolveOptions,
    ) -> Option<ResolutionResult> {
        if !options.ignore_gate && !self.monitor.is_ready() {
            debug!(
                cooldown_secs = self.monitor.cooldown_seconds_remaining(),
                "Generative service cooling down; skipping"
            );
            return None;
        }

        let prompt = prompt::build_prompt(request);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut rate_limit_reported = false;
        let mut soft_retry_used = false;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.call_once(&prompt).await {
                Ok(text) => {
                    self.write_cache(&CacheKey::for_request(request), &text).await;
                    self.monitor.report_success();
                    return Some(ResolutionResult::generated(text));
                }
                Err(GenerativeError::RateLimited) => {
                    if !rate_limit_reported {
                        self.monitor.report_error();
                        rate_limit_reported = true;
                    }
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, "Rate limited on every attempt; falling back");
                        return None;
                    }
                    warn!(attempt, max_attempts, "Rate limited; retrying after delay");
                    time::sleep(self.policy.rate_limit_delay).await;
                }
                Err(e) if e.is_service_unavailable() => {
                    warn!(error = %e, "Generative service unavailable; falling back");
                    self.monitor.report_error();
                    return None;
                }
                Err(
                    e @ (GenerativeError::Timeout { .. }
                    | GenerativeError::Malformed(_)
                    | GenerativeError::Unavailable { .. }),
                ) => {
                    if soft_retry_used || attempt >= max_attempts {
                        warn!(error = %e, kind = e.kind(), "Generative call failed again; falling back");
                        return None;
                    }
                    debug!(error = %e, kind = e.kind(), "Generative call failed; retrying once");
                    soft_retry_used = true;
                }
                Err(e @ GenerativeError::Rejected { .. }) => {
                    warn!(error = %e, "Generative request rejected; falling back");
                    return None;
                }
            }
        }
    }
}

/// Last-resort tier backed by the fallback store.
pub struct OfflineTier {
    fallback: Arc<FallbackStore>,
}

impl OfflineTier {
    /// Creates the tier.
    pub fn new(fallback: Arc<FallbackStore>) -> Self {
        Self { fallback }
    }

    /// Always produces a non-empty offline result.
    pub fn resolve(&self, request: &ContentRequest) -> ResolutionResult {
        ResolutionResult::offline(self.fallback.offline_text(request))
    }
}

/// Ordered resolver tiers with a guaranteed terminal fallback.
pub struct ContentPipeline {
    tiers: Vec<Box<dyn ResolveStrategy>>,
    terminal: OfflineTier,
    monitor: AvailabilityMonitor,
}

impl ContentPipeline {
    /// Starts building a pipeline around its three required collaborators.
    pub fn builder(
        client: Arc<dyn GenerativeClient>,
        store: Arc<dyn DocumentStore>,
        monitor: AvailabilityMonitor,
    ) -> PipelineBuilder {
        PipelineBuilder {
            client,
            store,
            monitor,
            curriculum: Arc::new(Curriculum::default()),
            fallback: Arc::new(FallbackStore::builtin()),
            validity: CacheValidity::default(),
            policy: RetryPolicy::default(),
            settings: GenerationSettings::default(),
        }
    }

    /// The monitor gating the generative tier.
    pub fn monitor(&self) -> &AvailabilityMonitor {
        &self.monitor
    }

    /// Tier names in resolution order.
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers
            .iter()
            .map(|t| t.name())
            .chain(std::iter::once("offline"))
            .collect()
    }

    /// Resolves a request. Never fails and never returns empty text.
    pub async fn resolve(&self, request: &ContentRequest) -> ResolutionResult {
        self.resolve_with(request, ResolveOptions::default()).await
    }

    /// Resolves a request with explicit options.
    pub async fn resolve_with(
        &self,
        request: &ContentRequest,
        options: ResolveOptions,
    ) -> ResolutionResult {
        for tier in &self.tiers {
            if let Some(result) = tier.attempt(request, options).await {
                info!(
                    topic = %request.topic(),
                    level = request.level(),
                    mode = %request.mode(),
                    origin = %result.origin,
                    "Content resolved"
                );
                return result;
            }
        }
        info!(
            topic = %request.topic(),
            level = request.level(),
            mode = %request.mode(),
            "Serving offline fallback"
        );
        self.terminal.resolve(request)
    }
}

#[async_trait]
impl HealthProbe for ContentPipeline {
    async fn probe(&self) -> bool {
        let Ok(request) =
            ContentRequest::new("health check", 1, LearningStyle::Default, ContentMode::Explain)
        else {
            return false;
        };
        let request = request.with_source("Reply with OK.", None);
        !self
            .resolve_with(&request, ResolveOptions::probe())
            .await
            .is_offline
    }
}

/// Builder for [`ContentPipeline`].
pub struct PipelineBuilder {
    client: Arc<dyn GenerativeClient>,
    store: Arc<dyn DocumentStore>,
    monitor: AvailabilityMonitor,
    curriculum: Arc<Curriculum>,
    fallback: Arc<FallbackStore>,
    validity: CacheValidity,
    policy: RetryPolicy,
    settings: GenerationSettings,
}

impl PipelineBuilder {
    /// Sets the authored curriculum.
    #[must_use]
    pub fn curriculum(mut self, curriculum: Arc<Curriculum>) -> Self {
        self.curriculum = curriculum;
        self
    }

    /// Sets the fallback store.
    #[must_use]
    pub fn fallback(mut self, fallback: Arc<FallbackStore>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the cache validity rule.
    #[must_use]
    pub fn validity(mut self, validity: CacheValidity) -> Self {
        self.validity = validity;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the sampling parameters.
    #[must_use]
    pub const fn settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> ContentPipeline {
        let tiers: Vec<Box<dyn ResolveStrategy>> = vec![
            Box::new(CacheTier::new(Arc::clone(&self.store), self.validity)),
            Box::new(StaticTier::new(self.curriculum)),
            Box::new(GenerativeTier::new(
                self.client,
                self.store,
                self.monitor.clone(),
                self.policy,
                self.settings,
            )),
        ];
        ContentPipeline {
            tiers,
            terminal: OfflineTier::new(self.fallback),
            monitor: self.monitor,
        }
    }
}
