use std::time::Duration;

use circuitops_core::intent::IntentParams;
use serde_json::Value;
use tracing::warn;

use super::{display_str, display_value, id_param, list_payload, percent, HandlerContext};
use crate::backend::BackendRequest;
use crate::blocks::{CommandResult, MessageBuilder};

const CAMPAIGNS_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_LISTED: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CampaignsAction {
    List,
    Analytics,
}

impl CampaignsAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "list" => Some(Self::List),
            "analytics" => Some(Self::Analytics),
            _ => None,
        }
    }
}

pub async fn handle(ctx: &HandlerContext, action: &str, params: &IntentParams) -> CommandResult {
    let vertical = ctx.vertical(params);
    match CampaignsAction::parse(action) {
        Some(CampaignsAction::List) => list_campaigns(ctx, &vertical).await,
        Some(CampaignsAction::Analytics) => {
            campaign_analytics(ctx, &vertical, id_param(params, "campaign_id")).await
        }
        None => CommandResult::text(format!("Unknown campaigns action: {action}")),
    }
}

async fn list_campaigns(ctx: &HandlerContext, vertical: &str) -> CommandResult {
    let request = BackendRequest::get(
        ctx.endpoints.vertical(vertical, "/api/v1/instantly/campaigns"),
        CAMPAIGNS_TIMEOUT,
    );
    let data = match ctx.backend.send(request).await {
        Ok(data) => data,
        Err(error) => {
            warn!(vertical, error = %error, "campaign listing failed");
            return CommandResult::text(format!("Could not fetch campaigns for {vertical}"));
        }
    };

    let campaigns = list_payload(&data, "campaigns").map(Vec::as_slice).unwrap_or_default();
    if campaigns.is_empty() {
        return CommandResult::text("No campaigns found");
    }

    let lines = campaigns.iter().take(MAX_LISTED).map(campaign_line).collect::<Vec<_>>();
    MessageBuilder::new(format!("{} campaigns for {vertical}", campaigns.len()))
        .header(format!("Campaigns: {vertical}"))
        .section(lines.join("\n"))
        .build()
}

fn campaign_line(campaign: &Value) -> String {
    let mut line = format!(
        "- *{}* ({})",
        display_value(campaign.get("name")),
        display_str(campaign.get("status")).unwrap_or("unknown"),
    );
    if let Some(rate) = campaign.get("reply_rate").and_then(Value::as_f64) {
        line.push_str(&format!(" | {:.1}% reply rate", rate * 100.0));
    }
    if let Some(id) = display_str(campaign.get("id")) {
        line.push_str(&format!(" `{id}`"));
    }
    line
}

async fn campaign_analytics(
    ctx: &HandlerContext,
    vertical: &str,
    campaign_id: Option<(&str, String)>,
) -> CommandResult {
    let Some((campaign_id, segment)) = campaign_id else {
        return CommandResult::text(
            "Missing campaign ID. Usage: \"show analytics for campaign <id>\"",
        );
    };

    let path = format!("/api/v1/instantly/campaigns/{segment}/analytics");
    let request = BackendRequest::get(ctx.endpoints.vertical(vertical, &path), CAMPAIGNS_TIMEOUT);
    let data = match ctx.backend.send(request).await {
        Ok(data) => data,
        Err(error) => {
            warn!(vertical, campaign_id, error = %error, "campaign analytics fetch failed");
            return CommandResult::text(format!(
                "Could not fetch analytics for campaign {campaign_id}"
            ));
        }
    };

    MessageBuilder::new(format!("Campaign {campaign_id} analytics"))
        .header("Campaign Analytics")
        .fields(|fields| {
            fields
                .field("Sent", display_value(data.get("sent")))
                .field("Opens", display_value(data.get("opens")))
                .field("Replies", display_value(data.get("replies")))
                .field("Bounces", display_value(data.get("bounces")))
                .field("Reply Rate", percent(data.get("reply_rate")))
                .field("Open Rate", percent(data.get("open_rate")));
        })
        .build()
}
