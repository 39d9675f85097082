use std::time::Duration;

use circuitops_core::intent::IntentParams;
use serde_json::{Map, Value};
use tracing::warn;

use super::{
    display_str, display_value, fixed, id_param, list_payload, param, HandlerContext,
    NOT_AVAILABLE,
};
use crate::backend::{BackendError, BackendRequest};
use crate::blocks::{truncate_chars, CommandResult, MessageBuilder, MAX_JSON_DUMP_CHARS};

const LEADS_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeadsAction {
    Score,
    Rescore,
    Pipeline,
    ScoringDist,
    Engagement,
    Enrichment,
    Monthly,
}

impl LeadsAction {
    pub fn parse(action: &str) -> Option<Self> {
        Some(match action {
            "score" => Self::Score,
            "rescore" => Self::Rescore,
            "pipeline" => Self::Pipeline,
            "scoring_dist" => Self::ScoringDist,
            "engagement" => Self::Engagement,
            "enrichment" => Self::Enrichment,
            "monthly" => Self::Monthly,
            _ => return None,
        })
    }
}

pub async fn handle(ctx: &HandlerContext, action: &str, params: &IntentParams) -> CommandResult {
    let Some(parsed) = LeadsAction::parse(action) else {
        return CommandResult::text(format!("Unknown leads action: {action}"));
    };
    let vertical = ctx.vertical(params);

    match parsed {
        LeadsAction::Score => score_lead(ctx, &vertical, params).await,
        LeadsAction::Rescore => {
            rescore_lead(ctx, &vertical, id_param(params, "contact_id")).await
        }
        LeadsAction::Pipeline => pipeline_funnel(ctx, &vertical).await,
        LeadsAction::ScoringDist => {
            let dump = DashboardDump {
                path: "/api/v1/dashboard/scoring-distribution",
                title: "Scoring Distribution",
                summary: "Scoring distribution",
                subject: "scoring distribution",
            };
            dump.fetch(ctx, &vertical).await
        }
        LeadsAction::Engagement => {
            let dump = DashboardDump {
                path: "/api/v1/dashboard/engagement",
                title: "Engagement",
                summary: "Engagement metrics",
                subject: "engagement",
            };
            dump.fetch(ctx, &vertical).await
        }
        LeadsAction::Enrichment => enrich_prospect(ctx, &vertical, params).await,
        LeadsAction::Monthly => monthly_report(ctx, &vertical).await,
    }
}

async fn send(ctx: &HandlerContext, request: BackendRequest) -> Result<Value, BackendError> {
    let url = request.url.clone();
    ctx.backend.send(request).await.inspect_err(|error| {
        warn!(url = %url, error = %error, "leads backend call failed");
    })
}

fn score_text(data: &Value) -> String {
    fixed(data.get("score"), 3)
}

fn tier_text(data: &Value) -> &str {
    display_str(data.get("tier")).unwrap_or(NOT_AVAILABLE)
}

async fn score_lead(ctx: &HandlerContext, vertical: &str, params: &IntentParams) -> CommandResult {
    let name = param(params, "name");
    let email = param(params, "email");
    let Some(who) = name.or(email) else {
        return CommandResult::text(
            "Need at least a name or email. Usage: \"score lead John Doe at Acme Corp\"",
        );
    };

    let mut body = Map::new();
    for (field, value) in [
        ("full_name", name),
        ("company", param(params, "company")),
        ("email", email),
        ("market", param(params, "market")),
    ] {
        if let Some(value) = value {
            body.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    let request = BackendRequest::post(ctx.endpoints.vertical(vertical, "/api/score"), LEADS_TIMEOUT)
        .json(Value::Object(body));
    let Ok(data) = send(ctx, request).await else {
        return CommandResult::text("Scoring failed. Check API logs.");
    };

    let decision = display_str(data.get("gate_decision"))
        .or_else(|| display_str(data.get("decision")))
        .unwrap_or(NOT_AVAILABLE);
    let halo = data.get("halo_boost").and_then(Value::as_f64).filter(|boost| *boost != 0.0);
    let sprint = data.get("sprint_detected").and_then(Value::as_bool).unwrap_or(false);

    let message = MessageBuilder::new(format!(
        "Scored: {who} | {} ({})",
        tier_text(&data),
        score_text(&data)
    ))
    .header("Lead Scoring Result")
    .fields(|fields| {
        fields
            .field("Score", score_text(&data))
            .field("Tier", tier_text(&data))
            .field("Gate Decision", decision)
            .field("Vertical", vertical);
    });

    match halo {
        Some(boost) => message
            .section(format!(
                "*Halo Boost:* {boost:.3} | *Sprint:* {}",
                if sprint { "YES" } else { "No" }
            ))
            .build(),
        None => message.build(),
    }
}

async fn rescore_lead(
    ctx: &HandlerContext,
    vertical: &str,
    contact_id: Option<(&str, String)>,
) -> CommandResult {
    let Some((contact_id, segment)) = contact_id else {
        return CommandResult::text("Missing contact ID. Usage: \"rescore contact abc123\"");
    };

    let request = BackendRequest::post(
        ctx.endpoints.vertical(vertical, &format!("/api/rescore/{segment}")),
        LEADS_TIMEOUT,
    )
    .json(Value::Object(Map::new()));
    let Ok(data) = send(ctx, request).await else {
        return CommandResult::text(format!("Rescore failed for {contact_id}"));
    };

    MessageBuilder::new(format!(
        "Rescored {contact_id}: {} ({})",
        tier_text(&data),
        score_text(&data)
    ))
    .header("Rescore Result")
    .fields(|fields| {
        fields
            .field("Contact", format!("`{contact_id}`"))
            .field("Score", score_text(&data))
            .field("Tier", tier_text(&data))
            .field("Decision", display_str(data.get("gate_decision")).unwrap_or(NOT_AVAILABLE));
    })
    .build()
}

async fn pipeline_funnel(ctx: &HandlerContext, vertical: &str) -> CommandResult {
    let request = BackendRequest::get(
        ctx.endpoints.vertical(vertical, "/api/v1/dashboard/pipeline-funnel"),
        LEADS_TIMEOUT,
    )
    .with_dashboard_key();
    let Ok(data) = send(ctx, request).await else {
        return CommandResult::text(format!("Could not fetch pipeline for {vertical}"));
    };

    let lines = list_payload(&data, "stages")
        .map(|stages| stages.iter().map(stage_line).collect::<Vec<_>>())
        .unwrap_or_default();
    let body = if lines.is_empty() { "No pipeline data".to_string() } else { lines.join("\n") };

    MessageBuilder::new(format!("Pipeline funnel for {vertical}"))
        .header(format!("Pipeline: {vertical}"))
        .section(body)
        .build()
}

fn stage_line(stage: &Value) -> String {
    let name = display_str(stage.get("name")).unwrap_or(NOT_AVAILABLE);
    let count = display_value(stage.get("count"));
    match stage.get("conversion_rate").and_then(Value::as_f64) {
        Some(rate) => format!("*{name}*: {count} ({:.1}%)", rate * 100.0),
        None => format!("*{name}*: {count}"),
    }
}

/// A keyed dashboard endpoint whose payload is shown as raw JSON.
struct DashboardDump {
    path: &'static str,
    title: &'static str,
    summary: &'static str,
    subject: &'static str,
}

impl DashboardDump {
    async fn fetch(&self, ctx: &HandlerContext, vertical: &str) -> CommandResult {
        let request = BackendRequest::get(ctx.endpoints.vertical(vertical, self.path), LEADS_TIMEOUT)
            .with_dashboard_key();
        let Ok(data) = send(ctx, request).await else {
            return CommandResult::text(format!("Could not fetch {} for {vertical}", self.subject));
        };

        MessageBuilder::new(format!("{} for {vertical}", self.summary))
            .header(format!("{}: {vertical}", self.title))
            .json_dump(&data)
            .build()
    }
}

async fn enrich_prospect(ctx: &HandlerContext, vertical: &str, params: &IntentParams) -> CommandResult {
    let Some(name) = param(params, "name") else {
        return CommandResult::text("Need a name. Usage: \"enrich John Doe at Acme Corp\"");
    };

    let mut request = BackendRequest::get(
        ctx.endpoints.vertical(vertical, "/api/v1/enrichment/prospect"),
        LEADS_TIMEOUT,
    )
    .query("name", name);
    if let Some(company) = param(params, "company") {
        request = request.query("company", company);
    }
    let Ok(data) = send(ctx, request).await else {
        return CommandResult::text(format!("Enrichment failed for {name}"));
    };

    MessageBuilder::new(format!("Enrichment results for {name}"))
        .header(format!("Enrichment: {name}"))
        .json_dump(&data)
        .build()
}

async fn monthly_report(ctx: &HandlerContext, vertical: &str) -> CommandResult {
    let request =
        BackendRequest::get(ctx.endpoints.vertical(vertical, "/reports/monthly"), LEADS_TIMEOUT);
    let Ok(data) = send(ctx, request).await else {
        return CommandResult::text(format!("Could not fetch monthly report for {vertical}"));
    };

    let message = MessageBuilder::new(format!("Monthly report for {vertical}"))
        .header(format!("Monthly Report: {vertical}"));
    let message = match data.get("narrative").and_then(Value::as_str) {
        Some(narrative) => message.section(truncate_chars(narrative, MAX_JSON_DUMP_CHARS)),
        None => message.json_dump(&data),
    };
    message.build()
}
