//! HTML fragments shared by the page handlers

use rotulador_common::config::{ProjectConfig, Task};
use rotulador_common::pipeline::{PhaseProgress, TaskProgress};
use std::fmt::Write as _;

use crate::i18n::Localizer;

const HTMX_SCRIPT: &str = "https://unpkg.com/htmx.org@1.9.12";

/// Escape text for HTML element content and quoted attributes
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Wrap page content in the common document layout
pub fn layout(loc: &Localizer, title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="{lang}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - rotulador</title>
    <link rel="stylesheet" href="/static/style.css">
    <script src="{htmx}"></script>
</head>
<body>
    <header>
        <nav>
            <a href="/">{home}</a>
            <a href="/help">{help}</a>
        </nav>
    </header>
    <main>
{content}
    </main>
</body>
</html>
"#,
        lang = escape(loc.language()),
        title = escape(title),
        htmx = HTMX_SCRIPT,
        home = escape(&loc.t("nav.home")),
        help = escape(&loc.t("nav.help")),
        content = content,
    )
}

/// Stacked bar of completed / pending / filtered / waiting images
pub fn progress_bar(loc: &Localizer, progress: &PhaseProgress) -> String {
    let segments = [
        ("completed", "progress.completed", progress.completed, progress.completed_percent),
        ("pending", "progress.pending", progress.pending, progress.pending_percent),
        ("filtered", "progress.filtered", progress.filtered_wrong_class, progress.filtered_percent),
        ("not-yet", "progress.not_yet", progress.not_yet_annotated, progress.not_yet_annotated_percent),
    ];

    let mut bar = String::from(r#"<div class="progress-bar">"#);
    let mut legend = String::from(r#"<div class="legend">"#);
    for (class, label_id, count, percent) in segments {
        let label = escape(&loc.t(label_id));
        let _ = write!(
            bar,
            r#"<div class="{class}" style="width: {percent:.2}%" title="{label}: {count}"></div>"#
        );
        let _ = write!(legend, "<span>{label}: {count} ({percent:.1}%)</span>");
    }
    bar.push_str("</div>");
    legend.push_str("</div>");

    format!("{}\n{}", bar, legend)
}

/// "3 of 10 done, 7 left"
pub fn progress_summary(loc: &Localizer, progress: &TaskProgress) -> String {
    escape(&loc.t_with(
        "progress.summary",
        &[
            ("completed", progress.completed.to_string()),
            ("eligible", progress.eligible.to_string()),
            ("available", progress.available.to_string()),
        ],
    ))
}

/// Human-readable list of a task's `if` conditions, or empty
pub fn conditions(loc: &Localizer, config: &ProjectConfig, task: &Task) -> String {
    if task.conditions.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = task
        .conditions
        .iter()
        .map(|(dep_id, required)| {
            let dependency = config.task(dep_id);
            let task_name = dependency
                .map(display_name)
                .unwrap_or(dep_id.as_str());
            let value_name = dependency
                .and_then(|dep| dep.classes.get(required))
                .map(|class| loc.t(&class.name))
                .unwrap_or_else(|| required.clone());
            format!("{} = {}", escape(&loc.t(task_name)), escape(&value_name))
        })
        .collect();

    format!(
        r#"<p class="condition">{}: {}</p>"#,
        escape(&loc.t("help.condition")),
        parts.join(", ")
    )
}

/// Name shown for a task, falling back to its id
pub fn display_name(task: &Task) -> &str {
    if !task.name.is_empty() {
        &task.name
    } else if !task.short_name.is_empty() {
        &task.short_name
    } else {
        &task.id
    }
}
