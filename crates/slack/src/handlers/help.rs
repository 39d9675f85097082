use crate::blocks::{CommandResult, MessageBuilder};

struct HelpSection {
    title: &'static str,
    commands: &'static [(&'static str, &'static str)],
}

const SECTIONS: &[HelpSection] = &[
    HelpSection {
        title: ":bar_chart: Status & Monitoring",
        commands: &[
            ("system status", "health check all services"),
            ("dashboard overview", "KPI summary"),
            ("governance telemetry", "autonomy gate stats"),
            ("system health", "integration health"),
        ],
    },
    HelpSection {
        title: ":pencil: Content",
        commands: &[
            ("generate a blog post", "trigger AI blog generation"),
            ("show recent posts", "list latest blog posts"),
            ("social queue", "show pending social posts"),
            ("approve post <id>", "approve a social post"),
            ("push post <id>", "publish to GHL"),
            ("distribute social for blog <id>", "create social from blog"),
            ("linkedin batch", "generate LinkedIn posts"),
            ("content performance", "content metrics"),
        ],
    },
    HelpSection {
        title: ":dart: Leads & Scoring",
        commands: &[
            ("score lead John Doe at Acme Corp", "score a prospect"),
            ("rescore contact <id>", "re-score existing contact"),
            ("pipeline metrics", "funnel breakdown"),
            ("scoring distribution", "score histogram"),
            ("engagement metrics", "engagement stats"),
            ("enrich John Doe at Acme", "run enrichment"),
            ("monthly report", "full monthly summary"),
        ],
    },
    HelpSection {
        title: ":email: Campaigns",
        commands: &[
            ("list campaigns", "show Instantly campaigns"),
            ("campaign analytics <id>", "campaign metrics"),
        ],
    },
];

pub fn handle(default_vertical: &str) -> CommandResult {
    let message = SECTIONS.iter().fold(
        MessageBuilder::new("CircuitOS Ops: Available Commands").header("CircuitOS Ops: Commands"),
        |message, section| {
            let commands = section
                .commands
                .iter()
                .map(|(phrase, purpose)| format!("> \"{phrase}\": {purpose}"))
                .collect::<Vec<_>>()
                .join("\n");
            message.section(format!("*{}*\n{commands}", section.title)).divider()
        },
    );

    message
        .context(format!(
            "You can use natural language; I understand the intent. Add \"for <vertical>\" \
             to target a specific vertical (default: {default_vertical})."
        ))
        .build()
}
