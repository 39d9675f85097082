use std::time::Duration;

use chrono::Utc;
use circuitops_core::intent::IntentParams;
use tokio::task::JoinSet;
use tracing::warn;

use super::{checked_at, display_value, fixed, percent, HandlerContext};
use crate::backend::BackendRequest;
use crate::blocks::{CommandResult, MessageBuilder};

const DASHBOARD_TIMEOUT: Duration = Duration::from_secs(8);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusAction {
    Overview,
    Health,
    Governance,
    System,
}

impl StatusAction {
    /// Unrecognised actions fall back to a health sweep.
    pub fn parse(action: &str) -> Self {
        match action {
            "overview" => Self::Overview,
            "governance" => Self::Governance,
            "system" => Self::System,
            _ => Self::Health,
        }
    }
}

pub async fn handle(ctx: &HandlerContext, action: &str, params: &IntentParams) -> CommandResult {
    let vertical = ctx.vertical(params);
    match StatusAction::parse(action) {
        StatusAction::Health => health_check(ctx).await,
        StatusAction::Overview => dashboard_overview(ctx, &vertical).await,
        StatusAction::Governance => {
            let path = "/api/v1/dashboard/governance";
            json_dashboard(ctx, &vertical, path, "Governance", "governance telemetry").await
        }
        StatusAction::System => {
            let path = "/api/v1/dashboard/system-health";
            json_dashboard(ctx, &vertical, path, "System Health", "system health").await
        }
    }
}

async fn health_check(ctx: &HandlerContext) -> CommandResult {
    let mut probes = JoinSet::new();

    let targets = std::iter::once(("Console API".to_string(), ctx.endpoints.console("/health")))
        .chain(ctx.verticals.iter().map(|vertical| {
            (format!("COS {vertical}"), ctx.endpoints.vertical(vertical, "/health"))
        }));
    for (index, (name, url)) in targets.enumerate() {
        let backend = ctx.backend.clone();
        probes.spawn(async move {
            let status = backend.probe(&url, PROBE_TIMEOUT).await;
            (index, name, status)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(error) => warn!(error = %error, "health probe task failed"),
        }
    }
    results.sort_by_key(|(index, _, _)| *index);

    let all_up = results.iter().all(|(_, _, status)| status.is_up());
    let lines = results
        .iter()
        .map(|(_, name, status)| {
            let icon = if status.is_up() { ":white_check_mark:" } else { ":x:" };
            format!("{icon} *{name}*: {status}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let (text, header) = if all_up {
        ("All systems operational", "All Systems Operational")
    } else {
        ("Some systems have issues", "System Health Issues")
    };

    MessageBuilder::new(text)
        .header(header)
        .section(lines)
        .context(format!("Checked at {}", checked_at(Utc::now())))
        .build()
}

async fn dashboard_overview(ctx: &HandlerContext, vertical: &str) -> CommandResult {
    let request = BackendRequest::get(
        ctx.endpoints.vertical(vertical, "/api/v1/dashboard/overview"),
        DASHBOARD_TIMEOUT,
    )
    .with_dashboard_key();

    let data = match ctx.backend.send(request).await {
        Ok(data) => data,
        Err(error) => {
            warn!(vertical, error = %error, "dashboard overview fetch failed");
            return CommandResult::text(format!("Could not fetch dashboard for {vertical}"));
        }
    };

    let tiers = data.get("tier_distribution").and_then(|value| value.as_object()).map(|tiers| {
        tiers
            .iter()
            .map(|(tier, count)| format!("{tier}: {}", display_value(Some(count))))
            .collect::<Vec<_>>()
            .join(" | ")
    });

    let message = MessageBuilder::new(format!("Dashboard overview for {vertical}"))
        .header(format!("Dashboard: {vertical}"))
        .fields(|fields| {
            fields
                .field("Total Prospects", display_value(data.get("total_prospects")))
                .field("Scored", display_value(data.get("scored")))
                .field("Avg Score", fixed(data.get("avg_score"), 2))
                .field("Emails Sent", display_value(data.get("emails_sent")))
                .field("Active Engagements", display_value(data.get("active_engagements")))
                .field("Conversion Rate", percent(data.get("conversion_rate")));
        });
    let message = match tiers {
        Some(tiers) => message.section(format!("*Tier Distribution:* {tiers}")),
        None => message,
    };
    message.build()
}

async fn json_dashboard(
    ctx: &HandlerContext,
    vertical: &str,
    path: &str,
    title: &str,
    description: &str,
) -> CommandResult {
    let request =
        BackendRequest::get(ctx.endpoints.vertical(vertical, path), DASHBOARD_TIMEOUT)
            .with_dashboard_key();

    match ctx.backend.send(request).await {
        Ok(data) => MessageBuilder::new(format!("{} for {vertical}", capitalize(description)))
            .header(format!("{title}: {vertical}"))
            .json_dump(&data)
            .build(),
        Err(error) => {
            warn!(vertical, path, error = %error, "dashboard fetch failed");
            CommandResult::text(format!("Could not fetch {description} for {vertical}"))
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
