use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use circuitops_agent::concierge::{LeadEngagement, NtfyAlert};
use circuitops_agent::{
    AnthropicClient, ConciergeService, LeadAlert, LlmClient, LlmIntentClassifier,
};
#[cfg(test)]
use circuitops_core::config::LoadOptions;
use circuitops_core::config::{AppConfig, ConfigError, RateLimitConfig};
use circuitops_core::ratelimit::{RateLimitPolicy, RateLimiter};
use circuitops_slack::{
    ChannelNotifier, EventProcessor, HandlerContext, HandlerService, HttpBackend,
    SignatureVerifier, SlackWebClient,
};
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::{AppState, Readiness};

const USER_AGENT: &str = concat!("circuitops-server/", env!("CARGO_PKG_VERSION"));

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
    /// Every limiter the sweeper has to keep bounded.
    pub limiters: Vec<Arc<RateLimiter>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Forwards high-intent chat leads to the Slack notification channel.
struct SlackLeadAlert {
    notifier: Arc<ChannelNotifier>,
}

#[async_trait]
impl LeadAlert for SlackLeadAlert {
    async fn lead_engaged(&self, engagement: &LeadEngagement) {
        self.notifier
            .hot_lead(
                engagement.lead_tier.as_str(),
                &engagement.last_message,
                engagement.message_count,
            )
            .await;
    }
}

/// Loads configuration itself; the binary loads it first so logging is up
/// before wiring starts, and goes through [`bootstrap_with_config`].
#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let http =
        Client::builder().user_agent(USER_AGENT).build().map_err(BootstrapError::HttpClient)?;

    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(http.clone(), &config.llm));
    let classifier =
        LlmIntentClassifier::new(llm.clone(), &config.llm, &config.backend.default_vertical);

    let backend = HttpBackend::new(http.clone(), config.backend.dashboard_key.clone());
    let commands = HandlerService::new(HandlerContext::new(Arc::new(backend), &config.backend));
    let slack = Arc::new(SlackWebClient::from_config(http.clone(), &config.slack));

    let slack_limiter = Arc::new(RateLimiter::new(policy(
        &config.rate_limit,
        config.rate_limit.slack_max_per_window,
    )));
    let chat_limiter = Arc::new(RateLimiter::new(policy(
        &config.rate_limit,
        config.rate_limit.chat_max_per_window,
    )));

    let notifier =
        Arc::new(ChannelNotifier::new(slack.clone(), config.slack.notify_channel_id.clone()));
    let events = EventProcessor::new(
        Arc::new(classifier),
        Arc::new(commands),
        slack,
        slack_limiter.clone(),
    )
    .with_alerts(notifier.clone());

    let mut concierge = ConciergeService::new(llm.clone(), &config.llm)
        .with_alert(Arc::new(SlackLeadAlert { notifier: notifier.clone() }));
    if let Some(ntfy) = NtfyAlert::from_config(http.clone(), &config.notify) {
        concierge = concierge.with_alert(Arc::new(ntfy));
    }
    info!(
        event_name = "system.bootstrap.notifications",
        correlation_id = "bootstrap",
        slack_channel = notifier.is_enabled(),
        ntfy = config.notify.ntfy_topic.is_some(),
        demo_webhook = config.notify.demo_webhook_url.is_some(),
        "notification targets resolved"
    );

    let signatures_verified = config.verifies_slack_signatures();
    let verifier = config
        .slack
        .signing_secret
        .clone()
        .filter(|_| signatures_verified)
        .map(SignatureVerifier::new);

    let state = AppState {
        verifier,
        events: Arc::new(events),
        event_deadline: Duration::from_secs(config.server.event_deadline_secs),
        concierge: Arc::new(concierge),
        chat_limiter: chat_limiter.clone(),
        notifier,
        http,
        demo_webhook_url: config.notify.demo_webhook_url.clone(),
        trust_proxy_headers: config.server.trust_proxy_headers,
        readiness: Readiness { signatures_verified, classifier_configured: llm.is_configured() },
    };

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        signatures_verified,
        classifier_configured = state.readiness.classifier_configured,
        "application wiring complete"
    );

    Ok(Application { config, state, limiters: vec![slack_limiter, chat_limiter] })
}

fn policy(config: &RateLimitConfig, max_per_window: u32) -> RateLimitPolicy {
    RateLimitPolicy { max_per_window, window: Duration::from_secs(config.window_secs) }
}

/// Periodically drops expired limiter entries so idle senders do not
/// accumulate for the life of the process.
pub fn spawn_sweeper(limiters: Vec<Arc<RateLimiter>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed: usize = limiters.iter().map(|limiter| limiter.sweep_expired()).sum();
            if removed > 0 {
                debug!(
                    event_name = "system.ratelimit.swept",
                    correlation_id = "sweeper",
                    removed,
                    "expired rate limit entries removed"
                );
            }
        }
    })
}
