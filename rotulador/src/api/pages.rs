//! Annotation pages
//!
//! Every handler loads a fresh [`Snapshot`] so eligibility and progress
//! reflect answers submitted by other annotators up to this request.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Extension, Form, Router,
};
use rotulador_common::config::Task;
use rotulador_common::hash::is_sha256_hex;
use rotulador_common::pipeline::{AnnotationStep, Pipeline, Snapshot};
use serde::Deserialize;
use std::fmt::Write as _;
use tracing::{debug, info};

use super::assets::serve_asset;
use super::auth::AuthenticatedUser;
use super::views::{self, escape};
use crate::i18n::Localizer;
use crate::{ApiError, ApiResult, AppState};

/// Authenticated page routes
pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/help", get(help_index))
        .route("/help/:task_id", get(help_task))
        .route("/annotate", get(annotate_entry))
        .route(
            "/annotate/:task_id/:image",
            get(annotate_form).post(annotate_submit),
        )
        .route("/asset/:sha256", get(serve_asset))
}

async fn load_snapshot(state: &AppState) -> ApiResult<Snapshot> {
    Ok(Snapshot::load(&state.images(), &state.annotations()).await?)
}

fn find_task<'a>(state: &'a AppState, task_id: &str) -> ApiResult<&'a Task> {
    state
        .config
        .task(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))
}

/// Draw the next step; the thread-local RNG never lives across an await
fn next_step(
    state: &AppState,
    snapshot: &Snapshot,
    task_id: Option<&str>,
) -> ApiResult<Option<AnnotationStep>> {
    let mut rng = rand::thread_rng();
    Ok(Pipeline::new(&state.config, snapshot).next_step(task_id, &mut rng)?)
}

fn annotate_path(task_id: &str, image_sha256: &str) -> String {
    format!("/annotate/{}/{}", task_id, image_sha256)
}

/// GET /
pub async fn home(State(state): State<AppState>, loc: Localizer) -> Html<String> {
    let title = loc.t("home.title");
    let content = format!(
        r#"<h1>{title}</h1>
<p class="description">{description}</p>
<p>
    <a class="button" href="/annotate">{start}</a>
    <a class="button" href="/help">{guide}</a>
</p>"#,
        title = escape(&title),
        description = escape(&state.config.meta.description),
        start = escape(&loc.t("home.start")),
        guide = escape(&loc.t("home.guide")),
    );
    Html(views::layout(&loc, &title, &content))
}

/// GET /help
///
/// Timeline of all tasks with their progress.
pub async fn help_index(State(state): State<AppState>, loc: Localizer) -> ApiResult<Html<String>> {
    let snapshot = load_snapshot(&state).await?;
    let pipeline = Pipeline::new(&state.config, &snapshot);

    let mut items = String::new();
    for progress in pipeline.all_task_progress()? {
        let Some(task) = state.config.task(&progress.task_id) else {
            continue;
        };
        let _ = write!(
            items,
            r#"<li>
    <h3><a href="/help/{id}">{name}</a></h3>
    {conditions}
    <p>{summary}</p>
    {bar}
</li>
"#,
            id = escape(&task.id),
            name = escape(&loc.t(views::display_name(task))),
            conditions = views::conditions(&loc, &state.config, task),
            summary = views::progress_summary(&loc, &progress),
            bar = views::progress_bar(&loc, &progress.phase),
        );
    }

    let title = loc.t("help.title");
    let content = format!(
        r#"<h1>{title}</h1>
<p class="description">{description}</p>
<h2>{timeline}</h2>
<ol class="timeline">
{items}</ol>"#,
        title = escape(&title),
        description = escape(&state.config.meta.description),
        timeline = escape(&loc.t("help.timeline")),
        items = items,
    );
    Ok(Html(views::layout(&loc, &title, &content)))
}

/// GET /help/:task_id
///
/// One task's classes, examples and progress.
pub async fn help_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    loc: Localizer,
) -> ApiResult<Html<String>> {
    let task = find_task(&state, &task_id)?;
    let snapshot = load_snapshot(&state).await?;
    let progress = Pipeline::new(&state.config, &snapshot).task_progress(&task_id)?;

    let mut classes = String::new();
    for class_id in task.sorted_class_ids() {
        let Some(class) = task.classes.get(class_id) else {
            continue;
        };
        let _ = write!(
            classes,
            "<dt>{}</dt>\n<dd>{}",
            escape(&loc.t(&class.name)),
            escape(&loc.t(&class.description))
        );
        if !class.examples.is_empty() {
            classes.push_str(r#"<div class="examples">"#);
            for example in &class.examples {
                let src = if is_sha256_hex(example) {
                    format!("/asset/{}", example)
                } else {
                    example.clone()
                };
                let _ = write!(
                    classes,
                    r#"<img src="{}" alt="{}" loading="lazy">"#,
                    escape(&src),
                    escape(&loc.t("help.examples"))
                );
            }
            classes.push_str("</div>");
        }
        classes.push_str("</dd>\n");
    }

    let action = if progress.available > 0 {
        format!(
            r#"<a class="button" href="/annotate?task={}">{}</a>"#,
            escape(&task.id),
            escape(&loc.t("help.annotate_task"))
        )
    } else {
        format!("<p>{}</p>", escape(&loc.t("help.nothing_available")))
    };

    let title = loc.t(views::display_name(task));
    let content = format!(
        r#"<h1>{title}</h1>
{conditions}
<h2>{progress_title}</h2>
<p>{summary}</p>
{bar}
<h2>{classes_title}</h2>
<dl class="class-list">
{classes}</dl>
{action}"#,
        title = escape(&title),
        conditions = views::conditions(&loc, &state.config, task),
        progress_title = escape(&loc.t("progress.title")),
        summary = views::progress_summary(&loc, &progress),
        bar = views::progress_bar(&loc, &progress.phase),
        classes_title = escape(&loc.t("help.classes")),
        classes = classes,
        action = action,
    );
    Ok(Html(views::layout(&loc, &title, &content)))
}

#[derive(Debug, Deserialize)]
pub struct AnnotateQuery {
    task: Option<String>,
}

/// GET /annotate?task=ID
///
/// Redirects to the next image to annotate, or shows the completion page.
/// Without a task every task is tried in pipeline order.
pub async fn annotate_entry(
    State(state): State<AppState>,
    Query(query): Query<AnnotateQuery>,
    loc: Localizer,
) -> ApiResult<Response> {
    let task_id = query.task.as_deref().filter(|id| !id.is_empty());
    let snapshot = load_snapshot(&state).await?;

    match next_step(&state, &snapshot, task_id)? {
        Some(step) => Ok(Redirect::to(&annotate_path(&step.task_id, &step.image_sha256)).into_response()),
        None => Ok(Html(complete_page(&loc)).into_response()),
    }
}

fn complete_page(loc: &Localizer) -> String {
    let title = loc.t("complete.title");
    let content = format!(
        r#"<h1>{}</h1>
<p>{}</p>
<a class="button" href="/">{}</a>"#,
        escape(&title),
        escape(&loc.t("complete.body")),
        escape(&loc.t("complete.back")),
    );
    views::layout(loc, &title, &content)
}

/// GET /annotate/:task_id/:image
pub async fn annotate_form(
    State(state): State<AppState>,
    Path((task_id, image_sha256)): Path<(String, String)>,
    loc: Localizer,
) -> ApiResult<Html<String>> {
    let task = find_task(&state, &task_id)?;
    let snapshot = load_snapshot(&state).await?;
    let image = snapshot
        .image(&image_sha256)
        .ok_or_else(|| ApiError::NotFound(format!("image {}", image_sha256)))?;
    let progress = Pipeline::new(&state.config, &snapshot).task_progress(&task_id)?;

    let mut buttons = String::new();
    for (index, class_id) in task.sorted_class_ids().into_iter().enumerate() {
        let Some(class) = task.classes.get(class_id) else {
            continue;
        };
        let key = if index < 9 {
            (index + 1).to_string()
        } else {
            String::new()
        };
        let key_badge = if key.is_empty() {
            String::new()
        } else {
            format!(r#"<span class="key">{}</span>"#, key)
        };
        let _ = write!(
            buttons,
            r#"<button class="button" type="submit" name="selectedClass" value="{value}" data-key="{key}" title="{description}">{badge}{name}</button>
"#,
            value = escape(class_id),
            key = key,
            description = escape(&loc.t(&class.description)),
            badge = key_badge,
            name = escape(&loc.t(&class.name)),
        );
    }

    let action = annotate_path(&task_id, &image.sha256);
    let title = loc.t(views::display_name(task));
    let content = format!(
        r#"<h1>{title}</h1>
<p>{summary}</p>
{bar}
<img class="annotation-image" src="/asset/{sha}" alt="{alt}" title="{filename}">
<form method="post" action="{action}" hx-post="{action}">
    <input type="hidden" name="sure" value="off">
    <label><input type="checkbox" name="sure" value="on" checked> {sure}</label>
    <div class="classes">
{buttons}    </div>
</form>
<p class="legend">{shortcuts} <a href="/help/{task_id}">{help}</a></p>
<script src="/static/annotate.js"></script>"#,
        title = escape(&title),
        summary = views::progress_summary(&loc, &progress),
        bar = views::progress_bar(&loc, &progress.phase),
        sha = escape(&image.sha256),
        alt = escape(&loc.t("annotate.image_alt")),
        filename = escape(&image.filename),
        action = escape(&action),
        sure = escape(&loc.t("annotate.sure")),
        buttons = buttons,
        shortcuts = escape(&loc.t("annotate.shortcuts")),
        task_id = escape(&task.id),
        help = escape(&loc.t("nav.help")),
    );
    Ok(Html(views::layout(&loc, &title, &content)))
}

/// Submitted annotation form
///
/// `sure` may appear twice (hidden `off` plus the checkbox); any `on`
/// value means sure.
struct AnnotationForm {
    selected_class: String,
    sure: bool,
}

impl AnnotationForm {
    fn from_fields(fields: &[(String, String)]) -> ApiResult<Self> {
        let selected_class = fields
            .iter()
            .find(|(name, _)| name == "selectedClass")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| ApiError::BadRequest("missing selectedClass".to_string()))?;

        let sure_values: Vec<&str> = fields
            .iter()
            .filter(|(name, _)| name == "sure")
            .map(|(_, value)| value.as_str())
            .collect();
        if sure_values.is_empty() {
            return Err(ApiError::BadRequest("missing sure".to_string()));
        }

        Ok(Self {
            selected_class,
            sure: sure_values.contains(&"on"),
        })
    }
}

/// POST /annotate/:task_id/:image
///
/// Records the authenticated user's answer and sends them on to the next
/// image of the same task, the help page of the next task with work left,
/// or the home page when everything is done.
pub async fn annotate_submit(
    State(state): State<AppState>,
    Path((task_id, image_sha256)): Path<(String, String)>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let task = find_task(&state, &task_id)?;
    let stage = state
        .config
        .stage_index(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))?;

    if state.images().get(&image_sha256).await?.is_none() {
        return Err(ApiError::NotFound(format!("image {}", image_sha256)));
    }

    let form = AnnotationForm::from_fields(&fields)?;
    if !task.has_class(&form.selected_class) {
        return Err(ApiError::BadRequest(format!(
            "unknown class '{}' for task {}",
            form.selected_class, task_id
        )));
    }

    state
        .annotations()
        .upsert(&image_sha256, &username, stage, &form.selected_class, form.sure)
        .await?;
    info!(
        user = %username,
        task = %task_id,
        image = %image_sha256,
        value = %form.selected_class,
        sure = form.sure,
        "Annotation recorded"
    );

    let snapshot = load_snapshot(&state).await?;
    let step = match next_step(&state, &snapshot, Some(&task_id))? {
        Some(step) => Some(step),
        None => next_step(&state, &snapshot, None)?,
    };

    let location = match step {
        None => "/".to_string(),
        Some(step) if step.task_id != task_id => format!("/help/{}", step.task_id),
        Some(step) => annotate_path(&task_id, &step.image_sha256),
    };
    debug!("next location for {}: {}", username, location);

    let is_htmx = headers
        .get("HX-Request")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if is_htmx {
        Ok((StatusCode::OK, [("HX-Redirect", location)]).into_response())
    } else {
        Ok(Redirect::to(&location).into_response())
    }
}
