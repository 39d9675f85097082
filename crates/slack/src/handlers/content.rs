use std::time::Duration;

use chrono::DateTime;
use circuitops_core::intent::IntentParams;
use serde_json::Value;
use tracing::warn;

use super::{
    display_str, display_value, id_param, list_payload, HandlerContext, NOT_AVAILABLE,
};
use crate::backend::{BackendError, BackendRequest};
use crate::blocks::{CommandResult, MessageBuilder};

const CONTENT_TIMEOUT: Duration = Duration::from_secs(15);
const RECENT_POSTS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentAction {
    GenerateBlog,
    BlogStatus,
    SocialQueue,
    ApprovePost,
    PushPost,
    Distribute,
    LinkedinBatch,
    ContentPerf,
}

impl ContentAction {
    pub fn parse(action: &str) -> Option<Self> {
        Some(match action {
            "generate_blog" => Self::GenerateBlog,
            "blog_status" => Self::BlogStatus,
            "social_queue" => Self::SocialQueue,
            "approve_post" => Self::ApprovePost,
            "push_post" => Self::PushPost,
            "distribute" => Self::Distribute,
            "linkedin_batch" => Self::LinkedinBatch,
            "content_perf" => Self::ContentPerf,
            _ => return None,
        })
    }
}

pub async fn handle(ctx: &HandlerContext, action: &str, params: &IntentParams) -> CommandResult {
    let Some(parsed) = ContentAction::parse(action) else {
        return CommandResult::text(format!("Unknown content action: {action}"));
    };

    match parsed {
        ContentAction::GenerateBlog => generate_blog(ctx).await,
        ContentAction::BlogStatus => blog_status(ctx).await,
        ContentAction::SocialQueue => social_queue(ctx).await,
        ContentAction::ApprovePost => approve_post(ctx, id_param(params, "id")).await,
        ContentAction::PushPost => push_post(ctx, id_param(params, "id")).await,
        ContentAction::Distribute => distribute(ctx, id_param(params, "blog_id")).await,
        ContentAction::LinkedinBatch => linkedin_batch(ctx).await,
        ContentAction::ContentPerf => content_performance(ctx, &ctx.vertical(params)).await,
    }
}

async fn console_post(ctx: &HandlerContext, path: &str) -> Result<Value, BackendError> {
    let request = BackendRequest::post(ctx.endpoints.console(path), CONTENT_TIMEOUT);
    ctx.backend.send(request).await.inspect_err(|error| {
        warn!(path, error = %error, "content backend call failed");
    })
}

async fn console_get(ctx: &HandlerContext, request: BackendRequest) -> Result<Value, BackendError> {
    let url = request.url.clone();
    ctx.backend.send(request).await.inspect_err(|error| {
        warn!(url = %url, error = %error, "content backend call failed");
    })
}

async fn generate_blog(ctx: &HandlerContext) -> CommandResult {
    let Ok(data) = console_post(ctx, "/api/v1/blog/auto-generate").await else {
        return CommandResult::text("Blog generation triggered (check logs for status)");
    };

    let body = match display_str(data.get("title")) {
        Some(title) => format!(
            ":white_check_mark: Generated: *{title}*\nSlug: `{}`\nStatus: {}",
            display_str(data.get("slug")).unwrap_or(NOT_AVAILABLE),
            display_str(data.get("status")).unwrap_or("draft"),
        ),
        None => ":white_check_mark: Generation triggered. Check blog admin for the new post."
            .to_string(),
    };

    MessageBuilder::new("Blog generation triggered").header("Blog Generation").section(body).build()
}

async fn blog_status(ctx: &HandlerContext) -> CommandResult {
    let request =
        BackendRequest::get(ctx.endpoints.console("/api/v1/blog/public/posts"), CONTENT_TIMEOUT)
            .query("limit", RECENT_POSTS.to_string());
    let data = console_get(ctx, request).await;
    let Some(posts) = data.as_ref().ok().and_then(|data| list_payload(data, "posts")) else {
        return CommandResult::text("Could not fetch blog posts");
    };

    let lines = posts.iter().take(RECENT_POSTS).map(post_line).collect::<Vec<_>>();
    let body = if lines.is_empty() { "No posts found".to_string() } else { lines.join("\n") };

    MessageBuilder::new(format!("Recent blog posts ({})", posts.len()))
        .header("Recent Blog Posts")
        .section(body)
        .build()
}

fn post_line(post: &Value) -> String {
    let mut line = format!(
        "- *{}* ({}) `{}`",
        display_value(post.get("title")),
        display_value(post.get("status")),
        display_value(post.get("slug")),
    );
    if let Some(published) = display_str(post.get("published_at")) {
        let date = DateTime::parse_from_rfc3339(published)
            .map(|at| at.format("%b %-d, %Y").to_string())
            .unwrap_or_else(|_| published.to_string());
        line.push_str(&format!(" | {date}"));
    }
    line
}

async fn social_queue(ctx: &HandlerContext) -> CommandResult {
    let request = BackendRequest::get(
        ctx.endpoints.console("/api/v1/social/analytics/queue-summary"),
        CONTENT_TIMEOUT,
    );
    let Ok(data) = console_get(ctx, request).await else {
        return CommandResult::text("Could not fetch social queue. Auth may be required.");
    };

    let lines = data
        .as_object()
        .map(|counts| {
            counts
                .iter()
                .map(|(status, count)| format!("- *{status}*: {}", display_value(Some(count))))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let body = if lines.is_empty() { "No data".to_string() } else { lines.join("\n") };

    MessageBuilder::new("Social post queue summary").header("Social Queue").section(body).build()
}

async fn approve_post(ctx: &HandlerContext, post_id: Option<(&str, String)>) -> CommandResult {
    let Some((post_id, segment)) = post_id else {
        return CommandResult::text("Missing post ID. Usage: \"approve social post <id>\"");
    };

    match console_post(ctx, &format!("/api/v1/social/posts/{segment}/approve")).await {
        Ok(_) => CommandResult::text(format!("Post {post_id} approved")),
        Err(_) => CommandResult::text(format!(
            "Could not approve post {post_id}. Auth may be required."
        )),
    }
}

async fn push_post(ctx: &HandlerContext, post_id: Option<(&str, String)>) -> CommandResult {
    let Some((post_id, segment)) = post_id else {
        return CommandResult::text("Missing post ID. Usage: \"push social post <id>\"");
    };

    match console_post(ctx, &format!("/api/v1/social/posts/{segment}/push")).await {
        Ok(_) => CommandResult::text(format!("Post {post_id} pushed to GHL")),
        Err(_) => {
            CommandResult::text(format!("Could not push post {post_id}. Auth may be required."))
        }
    }
}

async fn distribute(ctx: &HandlerContext, blog_id: Option<(&str, String)>) -> CommandResult {
    let Some((blog_id, segment)) = blog_id else {
        return CommandResult::text(
            "Missing blog post ID. Usage: \"distribute social for blog <id>\"",
        );
    };

    let Ok(data) = console_post(ctx, &format!("/api/v1/social/distribute/{segment}")).await else {
        return CommandResult::text(format!(
            "Distribution triggered for blog {blog_id}. Check social queue."
        ));
    };

    let body = if data.get("status").and_then(Value::as_str) == Some("already_distributed") {
        format!(":warning: Already distributed for blog {blog_id}")
    } else {
        let created = match data.get("posts_created") {
            Some(Value::Number(count)) if count.as_u64() != Some(0) => count.to_string(),
            _ => "?".to_string(),
        };
        format!(":white_check_mark: Generated {created} social posts from blog {blog_id}")
    };

    MessageBuilder::new(format!("Social posts generated for blog {blog_id}"))
        .header("Social Distribution")
        .section(body)
        .build()
}

async fn linkedin_batch(ctx: &HandlerContext) -> CommandResult {
    let text = match console_post(ctx, "/api/v1/social/generate-licensing/cron").await {
        Ok(_) => "LinkedIn batch generation triggered",
        Err(_) => "LinkedIn batch triggered (check social queue)",
    };

    MessageBuilder::new(text)
        .header("LinkedIn Batch")
        .section(
            ":white_check_mark: LinkedIn licensing post batch triggered. \
             Check the social queue for new pending posts.",
        )
        .build()
}

async fn content_performance(ctx: &HandlerContext, vertical: &str) -> CommandResult {
    let request = BackendRequest::get(
        ctx.endpoints.vertical(vertical, "/api/v1/dashboard/content-performance"),
        CONTENT_TIMEOUT,
    )
    .with_dashboard_key();

    match console_get(ctx, request).await {
        Ok(data) => MessageBuilder::new(format!("Content performance for {vertical}"))
            .header(format!("Content Performance: {vertical}"))
            .json_dump(&data)
            .build(),
        Err(_) => CommandResult::text(format!("Could not fetch content performance for {vertical}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{handle, ContentAction};
    use crate::backend::{BackendError, Method};
    use crate::blocks::Block;
    use crate::handlers::testing::{context, params, ScriptedBackend};

    fn section_text(blocks: &[Block], index: usize) -> String {
        match blocks.get(index) {
            Some(Block::Section { text: Some(text), .. }) => text.text().to_string(),
            other => panic!("expected text section at {index}, got {other:?}"),
        }
    }

    #[test]
    fn parses_every_known_action() {
        for action in [
            "generate_blog",
            "blog_status",
            "social_queue",
            "approve_post",
            "push_post",
            "distribute",
            "linkedin_batch",
            "content_perf",
        ] {
            assert!(ContentAction::parse(action).is_some(), "{action} should parse");
        }
        assert_eq!(ContentAction::parse("publish_everything"), None);
    }

    #[tokio::test]
    async fn recent_posts_render_one_bullet_per_post() {
        let backend = ScriptedBackend::replying(vec![Ok(json!({"posts": [
            {"title": "Licensing 101", "status": "published", "slug": "licensing-101",
             "published_at": "2026-03-02T15:00:00Z"},
            {"title": "Gym Growth", "status": "draft", "slug": "gym-growth"},
            {"title": "Event Season", "status": "scheduled", "slug": "event-season"}
        ]}))]);
        let result = handle(&context(backend.clone()), "blog_status", &params(&[])).await;

        assert_eq!(result.text, "Recent blog posts (3)");
        let body = section_text(&result.blocks, 1);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.starts_with("- *")));
        assert_eq!(lines[0], "- *Licensing 101* (published) `licensing-101` | Mar 2, 2026");
        assert_eq!(lines[1], "- *Gym Growth* (draft) `gym-growth`");

        let request = &backend.requests()[0];
        assert_eq!(request.url, "https://api.drivebrandgrowth.com/console/api/v1/blog/public/posts");
        assert_eq!(request.query, vec![("limit".to_string(), "5".to_string())]);
    }

    #[tokio::test]
    async fn bare_array_of_posts_is_accepted_and_capped() {
        let posts: Vec<_> = (0..8)
            .map(|index| json!({"title": format!("Post {index}"), "status": "draft", "slug": "s"}))
            .collect();
        let backend = ScriptedBackend::replying(vec![Ok(json!(posts))]);
        let result = handle(&context(backend), "blog_status", &params(&[])).await;

        assert_eq!(result.text, "Recent blog posts (8)");
        assert_eq!(section_text(&result.blocks, 1).lines().count(), 5);
    }

    #[tokio::test]
    async fn blog_listing_timeout_is_an_apology() {
        let backend = ScriptedBackend::replying(vec![Err(BackendError::Timeout)]);
        let result = handle(&context(backend), "blog_status", &params(&[])).await;

        assert_eq!(result.text, "Could not fetch blog posts");
        assert!(result.blocks.is_empty());
    }

    #[tokio::test]
    async fn approve_requires_an_id() {
        let backend = ScriptedBackend::replying(Vec::new());
        let result = handle(&context(backend.clone()), "approve_post", &params(&[])).await;

        assert!(result.text.starts_with("Missing post ID."));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn approve_posts_to_console() {
        let backend = ScriptedBackend::replying(vec![Ok(json!({"ok": true}))]);
        let result =
            handle(&context(backend.clone()), "approve_post", &params(&[("id", "p-9")])).await;

        assert_eq!(result.text, "Post p-9 approved");
        let request = &backend.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert!(request.url.ends_with("/console/api/v1/social/posts/p-9/approve"));
    }

    #[tokio::test]
    async fn post_ids_stay_inside_their_path_segment() {
        let backend = ScriptedBackend::replying(vec![Ok(json!({"ok": true}))]);
        let result =
            handle(&context(backend.clone()), "push_post", &params(&[("id", "../x")])).await;

        assert_eq!(result.text, "Post ../x pushed to GHL");
        assert!(backend.requests()[0].url.ends_with("/console/api/v1/social/posts/..%2Fx/push"));

        let dotted = ScriptedBackend::replying(Vec::new());
        let result =
            handle(&context(dotted.clone()), "approve_post", &params(&[("id", "..")])).await;
        assert!(result.text.starts_with("Missing post ID."));
        assert!(dotted.requests().is_empty());
    }

    #[tokio::test]
    async fn distribute_reports_existing_distribution() {
        let backend =
            ScriptedBackend::replying(vec![Ok(json!({"status": "already_distributed"}))]);
        let result =
            handle(&context(backend), "distribute", &params(&[("blog_id", "b-1")])).await;

        assert_eq!(section_text(&result.blocks, 1), ":warning: Already distributed for blog b-1");
    }

    #[tokio::test]
    async fn content_performance_uses_vertical_and_key() {
        let backend = ScriptedBackend::replying(vec![Ok(json!({"views": 10}))]);
        let result = handle(
            &context(backend.clone()),
            "content_perf",
            &params(&[("vertical", "events")]),
        )
        .await;

        assert_eq!(result.text, "Content performance for events");
        let request = &backend.requests()[0];
        assert!(request.dashboard_auth);
        assert!(request.url.ends_with("/events/api/v1/dashboard/content-performance"));
    }

    #[tokio::test]
    async fn unknown_action_is_named() {
        let result =
            handle(&context(ScriptedBackend::replying(Vec::new())), "poetry", &params(&[])).await;
        assert_eq!(result.text, "Unknown content action: poetry");
        assert!(result.blocks.is_empty());
    }
}
