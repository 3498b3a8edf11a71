//! Human-readable rationales for routing decisions and campaign descriptions.
//!
//! Both operations try the configured [`ExplanationGenerator`] first, bounded
//! by a timeout, and cache successful output for the configured TTL. Any
//! generator failure falls back to a deterministic rule-based answer and is
//! never surfaced to the caller. Fallback answers are cached too, but only
//! for [`FALLBACK_TTL`], so a generator outage costs one timeout per key
//! rather than one per request.

use super::cache::{TtlCache, cache_key};
use crate::config::ExplanationConfig;
use crate::domain::charge::{ChargeRequest, Provider};
use crate::domain::ports::{ExplanationGeneratorBox, GenerationRequest};
use crate::domain::risk::RiskFactor;
use crate::domain::subscription::CampaignAnalysis;
use crate::error::{PaymentError, Result};
use crate::infrastructure::llm::LlmClient;
use crate::infrastructure::offline::OfflineGenerator;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const ROUTING_NAMESPACE: &str = "routing";
const CAMPAIGN_NAMESPACE: &str = "campaign";

const ROUTING_MAX_TOKENS: u32 = 150;
const CAMPAIGN_MAX_TOKENS: u32 = 300;

const ROUTING_SYSTEM_PROMPT: &str = "You are a payment risk analyst. In one or two plain sentences, \
explain to an operator why a payment was routed to a provider or blocked. Only use the facts given.";

const CAMPAIGN_SYSTEM_PROMPT: &str = "You analyze charitable campaign descriptions. Respond only with \
a JSON object of the form {\"tags\": [\"...\"], \"summary\": \"...\"}, using one to five short \
lowercase tags and a summary of at most 100 characters.";

/// Upper bound on how long a fallback answer is served from cache.
pub const FALLBACK_TTL: Duration = Duration::from_secs(30);

const SUMMARY_MAX_CHARS: usize = 100;
const DEFAULT_CAMPAIGN_TAG: &str = "charitable cause";

const KEYWORD_TAGS: &[(&[&str], &str)] = &[
    (&["disaster", "emergency", "earthquake"], "disaster relief"),
    (&["water"], "clean water"),
    (&["food", "hunger"], "food aid"),
    (&["children", "kids"], "children"),
    (&["education", "school"], "education"),
    (&["health", "medical"], "healthcare"),
];

const PLACE_TAGS: &[(&str, &str)] = &[
    ("africa", "Africa"),
    ("asia", "Asia"),
    ("haiti", "Haiti"),
    ("ukraine", "Ukraine"),
    ("syria", "Syria"),
    ("gaza", "Gaza"),
    ("yemen", "Yemen"),
    ("sudan", "Sudan"),
    ("nepal", "Nepal"),
    ("turkey", "Turkey"),
];

pub struct ExplanationService {
    generator: ExplanationGeneratorBox,
    timeout: Duration,
    fallback_ttl: Duration,
    routing_cache: TtlCache<String>,
    campaign_cache: TtlCache<CampaignAnalysis>,
}

impl ExplanationService {
    pub fn new(generator: ExplanationGeneratorBox, cache_ttl: Duration, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            fallback_ttl: cache_ttl.min(FALLBACK_TTL),
            routing_cache: TtlCache::new(cache_ttl),
            campaign_cache: TtlCache::new(cache_ttl),
        }
    }

    /// Picks the live generator when explanations are enabled and an API key
    /// is configured, otherwise the offline one.
    pub fn from_config(config: ExplanationConfig) -> Result<Self> {
        let cache_ttl = config.cache_ttl();
        let timeout = config.timeout();

        let generator: ExplanationGeneratorBox = if config.enabled
            && let Some(api_key) = config.api_key
        {
            info!(model = %config.model, "Using live explanation generator");
            Box::new(LlmClient::new(config.api_url, api_key, config.model, timeout)?)
        } else {
            if config.enabled {
                warn!("Explanations enabled but no API key configured; using rule-based explanations");
            }
            Box::new(OfflineGenerator)
        };

        Ok(Self::new(generator, cache_ttl, timeout))
    }

    pub async fn explain_routing(
        &self,
        request: &ChargeRequest,
        score: f64,
        provider: Provider,
        factors: &[RiskFactor],
    ) -> String {
        let score_text = format!("{score:.2}");
        let factor_labels: Vec<&str> = factors.iter().map(RiskFactor::label).collect();
        let key = cache_key(
            ROUTING_NAMESPACE,
            &[&score_text, provider.as_str(), &factor_labels.join(",")],
        );

        if let Some(text) = self.routing_cache.get(&key).await {
            debug!("Routing explanation cache hit");
            return text;
        }

        let outcome = match provider {
            Provider::Blocked => "blocked".to_string(),
            other => format!("routed to {}", display_name(other)),
        };
        let prompt = format!(
            "A payment of {} {} (minor units) was {outcome}. Risk score: {score_text} on a 0 to 1 scale. Risk factors: {}.",
            request.amount.value(),
            request.currency,
            if factor_labels.is_empty() {
                "none".to_string()
            } else {
                factor_labels.join(", ")
            },
        );
        let generation = GenerationRequest {
            system: ROUTING_SYSTEM_PROMPT.to_string(),
            prompt,
            max_tokens: ROUTING_MAX_TOKENS,
            json: false,
        };

        match self.generate(&generation).await {
            Ok(text) => {
                self.routing_cache.insert(key, text.clone()).await;
                text
            }
            Err(e) => {
                warn!(error = %e, "Routing explanation unavailable, using fallback");
                let text = fallback_routing_explanation(score, provider, factors);
                self.routing_cache
                    .insert_with_ttl(key, text.clone(), self.fallback_ttl)
                    .await;
                text
            }
        }
    }

    pub async fn analyze_campaign(&self, description: &str) -> CampaignAnalysis {
        let key = cache_key(CAMPAIGN_NAMESPACE, &[description]);

        if let Some(analysis) = self.campaign_cache.get(&key).await {
            debug!("Campaign analysis cache hit");
            return analysis;
        }

        let generation = GenerationRequest {
            system: CAMPAIGN_SYSTEM_PROMPT.to_string(),
            prompt: format!("Campaign description: {description}"),
            max_tokens: CAMPAIGN_MAX_TOKENS,
            json: true,
        };

        match self
            .generate(&generation)
            .await
            .and_then(|text| parse_campaign_analysis(&text))
        {
            Ok(analysis) => {
                self.campaign_cache.insert(key, analysis.clone()).await;
                analysis
            }
            Err(e) => {
                warn!(error = %e, "Campaign analysis unavailable, using keyword fallback");
                let analysis = fallback_campaign_analysis(description);
                self.campaign_cache
                    .insert_with_ttl(key, analysis.clone(), self.fallback_ttl)
                    .await;
                analysis
            }
        }
    }

    /// Drops expired entries from both caches. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        self.routing_cache.purge_expired().await + self.campaign_cache.purge_expired().await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::ExplanationError(format!(
                "generator timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

fn display_name(provider: Provider) -> &'static str {
    match provider {
        Provider::Stripe => "Stripe",
        Provider::Paypal => "PayPal",
        Provider::Blocked => "blocked",
    }
}

fn risk_level(score: f64) -> &'static str {
    if score < 0.3 {
        "low"
    } else if score < 0.5 {
        "moderate"
    } else {
        "high"
    }
}

pub fn fallback_routing_explanation(score: f64, provider: Provider, factors: &[RiskFactor]) -> String {
    let head = match provider {
        Provider::Blocked => "Transaction blocked".to_string(),
        other => format!("Payment routed to {}", display_name(other)),
    };
    let mut text = format!("{head} due to {} risk score ({score:.2})", risk_level(score));
    if !factors.is_empty() {
        let labels: Vec<&str> = factors.iter().map(RiskFactor::label).collect();
        text.push_str(" with risk factors: ");
        text.push_str(&labels.join(", "));
    }
    text
}

pub fn fallback_campaign_analysis(description: &str) -> CampaignAnalysis {
    let lowered = description.to_lowercase();
    let mut tags: Vec<String> = Vec::new();

    let keyword_tags = KEYWORD_TAGS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, tag)| *tag);
    let place_tags = PLACE_TAGS
        .iter()
        .filter(|(needle, _)| lowered.contains(needle))
        .map(|(_, tag)| *tag);

    for tag in keyword_tags.chain(place_tags) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    if tags.is_empty() {
        tags.push(DEFAULT_CAMPAIGN_TAG.to_string());
    }

    CampaignAnalysis {
        tags,
        summary: truncate_summary(description.trim()),
    }
}

fn truncate_summary(description: &str) -> String {
    if description.chars().count() > SUMMARY_MAX_CHARS {
        let head: String = description.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        description.to_string()
    }
}

#[derive(Deserialize)]
struct RawCampaignAnalysis {
    tags: Vec<String>,
    summary: String,
}

fn parse_campaign_analysis(text: &str) -> Result<CampaignAnalysis> {
    let body = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let raw: RawCampaignAnalysis = serde_json::from_str(body)
        .map_err(|e| PaymentError::ExplanationError(format!("malformed campaign analysis: {e}")))?;

    let tags: Vec<String> = raw
        .tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    if tags.is_empty() {
        return Err(PaymentError::ExplanationError(
            "campaign analysis contained no tags".to_string(),
        ));
    }

    Ok(CampaignAnalysis {
        tags,
        summary: raw.summary.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ExplanationGenerator;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed reply and counts calls.
    struct ScriptedGenerator {
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExplanationGenerator for ScriptedGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Never answers within any reasonable timeout. Counts calls.
    #[derive(Default)]
    struct SlowGenerator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExplanationGenerator for SlowGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    fn scripted(reply: &str) -> (ExplanationService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = ScriptedGenerator {
            reply: reply.to_string(),
            calls: calls.clone(),
        };
        let service = ExplanationService::new(
            Box::new(generator),
            Duration::from_secs(300),
            Duration::from_secs(5),
        );
        (service, calls)
    }

    fn request() -> ChargeRequest {
        ChargeRequest::new(500, "USD", "tok_visa", "user@gmail.com").unwrap()
    }

    #[test]
    fn test_fallback_routing_templates() {
        assert_eq!(
            fallback_routing_explanation(0.12, Provider::Stripe, &[]),
            "Payment routed to Stripe due to low risk score (0.12)"
        );
        assert_eq!(
            fallback_routing_explanation(0.45, Provider::Paypal, &[RiskFactor::ForeignCurrency]),
            "Payment routed to PayPal due to moderate risk score (0.45) with risk factors: foreign currency"
        );
        assert_eq!(
            fallback_routing_explanation(
                0.85,
                Provider::Blocked,
                &[RiskFactor::LargeAmount, RiskFactor::TestSource]
            ),
            "Transaction blocked due to high risk score (0.85) with risk factors: large amount, test payment source"
        );
    }

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(risk_level(0.29), "low");
        assert_eq!(risk_level(0.3), "moderate");
        assert_eq!(risk_level(0.5), "high");
    }

    #[test]
    fn test_fallback_campaign_keywords() {
        let analysis =
            fallback_campaign_analysis("Emergency clean WATER and school food for kids in Haiti");
        assert_eq!(
            analysis.tags,
            vec!["disaster relief", "clean water", "food aid", "children", "education", "Haiti"]
        );
    }

    #[test]
    fn test_fallback_campaign_default_tag_and_truncation() {
        let long = "a".repeat(150);
        let analysis = fallback_campaign_analysis(&long);
        assert_eq!(analysis.tags, vec![DEFAULT_CAMPAIGN_TAG]);
        assert_eq!(analysis.summary, format!("{}...", "a".repeat(100)));

        let short = fallback_campaign_analysis("Plant trees");
        assert_eq!(short.summary, "Plant trees");
    }

    #[test]
    fn test_parse_campaign_analysis() {
        let parsed =
            parse_campaign_analysis("```json\n{\"tags\": [\" food aid \"], \"summary\": \"Meals\"}\n```")
                .unwrap();
        assert_eq!(parsed.tags, vec!["food aid"]);
        assert_eq!(parsed.summary, "Meals");

        assert!(parse_campaign_analysis("not json").is_err());
        assert!(parse_campaign_analysis("{\"tags\": [], \"summary\": \"x\"}").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_explanation_cached_within_ttl() {
        let (service, calls) = scripted("Low risk, sent to Stripe.");
        let req = request();

        let first = service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
        let second = service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
        assert_eq!(first, "Low risk, sent to Stripe.");
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routing_cache_key_includes_provider_and_factors() {
        let (service, calls) = scripted("text");
        let req = request();

        service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
        service.explain_routing(&req, 0.12, Provider::Paypal, &[]).await;
        service
            .explain_routing(&req, 0.12, Provider::Stripe, &[RiskFactor::TestSource])
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_campaign_analysis_uses_generator_json() {
        let (service, calls) =
            scripted(r#"{"tags": ["clean water", "Kenya"], "summary": "Wells for villages"}"#);

        let analysis = service.analyze_campaign("Build wells in Kenya").await;
        assert_eq!(analysis.tags, vec!["clean water", "Kenya"]);
        assert_eq!(analysis.summary, "Wells for villages");

        service.analyze_campaign("Build wells in Kenya").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_campaign_reply_falls_back() {
        let (service, calls) = scripted("Sure! Here are some tags: water");

        let analysis = service.analyze_campaign("Clean water for schools").await;
        assert_eq!(analysis.tags, vec!["clean water", "education"]);

        let cached = service.analyze_campaign("Clean water for schools").await;
        assert_eq!(cached, analysis);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The fallback expires well before the configured TTL.
        tokio::time::advance(FALLBACK_TTL).await;
        service.analyze_campaign("Clean water for schools").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let service = ExplanationService::new(
            Box::new(SlowGenerator::default()),
            Duration::from_secs(300),
            Duration::from_secs(1),
        );
        let text = service
            .explain_routing(&request(), 0.85, Provider::Blocked, &[RiskFactor::LargeAmount])
            .await;
        assert_eq!(
            text,
            "Transaction blocked due to high risk score (0.85) with risk factors: large amount"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_waits_for_timeout_once_per_key() {
        let generator = SlowGenerator::default();
        let calls = generator.calls.clone();
        let service = ExplanationService::new(
            Box::new(generator),
            Duration::from_secs(300),
            Duration::from_secs(2),
        );
        let req = request();

        let started = tokio::time::Instant::now();
        let first = service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        for _ in 0..10 {
            let again = service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
            assert_eq!(again, first);
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(FALLBACK_TTL).await;
        service.explain_routing(&req, 0.12, Provider::Stripe, &[]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_ttl_never_exceeds_cache_ttl() {
        let (service, calls) = {
            let calls = Arc::new(AtomicUsize::new(0));
            let generator = ScriptedGenerator {
                reply: "no json here".to_string(),
                calls: calls.clone(),
            };
            let service = ExplanationService::new(
                Box::new(generator),
                Duration::from_secs(5),
                Duration::from_secs(1),
            );
            (service, calls)
        };

        service.analyze_campaign("Food bank").await;
        tokio::time::advance(Duration::from_secs(5)).await;
        service.analyze_campaign("Food bank").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_offline_config_uses_fallback() {
        let service = ExplanationService::from_config(ExplanationConfig {
            enabled: true,
            ..Default::default()
        })
        .unwrap();
        let text = service
            .explain_routing(&request(), 0.12, Provider::Stripe, &[])
            .await;
        assert_eq!(text, "Payment routed to Stripe due to low risk score (0.12)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_covers_both_caches() {
        let (service, _) = scripted(r#"{"tags": ["education"], "summary": "Books"}"#);
        service.explain_routing(&request(), 0.12, Provider::Stripe, &[]).await;
        service.analyze_campaign("Books for schools").await;

        assert_eq!(service.purge_expired().await, 0);
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(service.purge_expired().await, 2);
    }
}
