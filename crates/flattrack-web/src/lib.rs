//! Axum + Askama dashboard over the loaded listings, plus the `/messages`
//! feed it can be pointed at.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use flattrack_core::format::{
    absolute_time, bedroom_label, bedroom_style, format_amount, furnishing_label,
    furnishing_style, gender_style, relative_time, restriction_glyph, sharing_badge, truncate,
    DEFAULT_TRUNCATE_LEN, PLACEHOLDER,
};
use flattrack_core::{Amount, Column, ColumnInput, DashboardState, ListingRecord};
use flattrack_storage::{FeedFileSource, MessageSource, RecordStore, TrackerConfig};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;
use url::form_urlencoded;

pub const CRATE_NAME: &str = "flattrack-web";

/// Query key holding the comma-separated keys of open filter inputs.
const SHOW_KEY: &str = "show";
const FULL_KEY: &str = "full";

#[derive(Clone)]
pub struct AppState {
    pub workspace_root: PathBuf,
    /// File behind `GET /messages`.
    pub messages_path: PathBuf,
    pub store: Arc<RwLock<RecordStore>>,
}

impl AppState {
    pub fn new(workspace_root: impl Into<PathBuf>, messages_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            messages_path: messages_path.into(),
            store: Arc::new(RwLock::new(RecordStore::new())),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.workspace_root.clone(), config.messages_file())
    }
}

struct OptionView {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

struct HeaderView {
    label: &'static str,
    /// `"filter"`, `"text"` (full-text toggle) or `"plain"`.
    kind: &'static str,
    key: &'static str,
    open: bool,
    toggle_href: String,
    input_kind: &'static str,
    placeholder: &'static str,
    value: String,
    options: Vec<OptionView>,
}

struct HiddenField {
    name: String,
    value: String,
}

struct BadgeView {
    text: String,
    class: &'static str,
}

struct GlyphView {
    icon: &'static str,
    title: String,
    class: &'static str,
}

struct RowView {
    bhk: String,
    bedroom: Option<BadgeView>,
    sharing: BadgeView,
    genders: Vec<BadgeView>,
    address: String,
    rent: String,
    deposit: String,
    restrictions: Vec<GlyphView>,
    furnishing: Option<BadgeView>,
    brokerage: String,
    available_date: String,
    time_relative: String,
    time_absolute: String,
    contact: String,
    text: String,
    author: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    loading: bool,
    headers: Vec<HeaderView>,
    hidden_fields: Vec<HiddenField>,
    rows: Vec<RowView>,
    total: usize,
    show_full_text: bool,
    full_text_href: String,
    clear_href: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/messages", get(messages_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(TrackerConfig::from_env()?).await
}

/// Binds the configured port and starts the one-shot load in the background;
/// the page shows the loading state until it lands.
pub async fn serve(config: TrackerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config);
    spawn_initial_load(state.store.clone(), config.message_source()?);
    let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
    info!(port = config.web_port, "dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// The store lock is only taken once the fetch has finished, so readers keep
/// seeing the loading state in the meantime.
pub fn spawn_initial_load(
    store: Arc<RwLock<RecordStore>>,
    source: Box<dyn MessageSource>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(source = %source.describe(), "loading messages");
        let result = source.fetch().await;
        store.write().await.finish_load(result);
    })
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let view = dashboard_state_from_query(&query);
    let store = state.store.read().await;
    render_html(build_dashboard(&view, &store, Utc::now()))
}

async fn messages_handler(State(state): State<Arc<AppState>>) -> Response {
    match FeedFileSource::new(&state.messages_path).fetch().await {
        Ok(records) => Json(records).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => {
            (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response()
        }
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

/// Rebuilds table state from the query string: one key per column criterion,
/// `show` for open filter inputs and `full=1` for expanded text.
pub fn dashboard_state_from_query(query: &BTreeMap<String, String>) -> DashboardState {
    let mut state = DashboardState::new();
    for column in Column::ALL {
        if let Some(raw) = query.get(column.key()) {
            state.set_filter(column, raw);
        }
    }
    if let Some(show) = query.get(SHOW_KEY) {
        for column in show.split(',').filter_map(|key| Column::from_key(key.trim())) {
            if !state.is_filter_visible(column) {
                state.toggle_filter_visibility(column);
            }
        }
    }
    if query.get(FULL_KEY).is_some_and(|v| v == "1") {
        state.toggle_full_text();
    }
    state
}

/// Inverse of [`dashboard_state_from_query`]; empty criteria are omitted.
pub fn dashboard_href(state: &DashboardState) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for column in Column::ALL {
        let value = state.criterion(column);
        if !value.is_empty() {
            query.append_pair(column.key(), &value);
        }
    }
    let open: Vec<&str> = state.open_filters().map(Column::key).collect();
    if !open.is_empty() {
        query.append_pair(SHOW_KEY, &open.join(","));
    }
    if state.show_full_text() {
        query.append_pair(FULL_KEY, "1");
    }
    let query = query.finish();
    if query.is_empty() {
        "/".to_string()
    } else {
        format!("/?{query}")
    }
}

fn build_dashboard(
    view: &DashboardState,
    store: &RecordStore,
    now: DateTime<Utc>,
) -> DashboardTemplate {
    let rows: Vec<RowView> = if store.is_loading() {
        Vec::new()
    } else {
        view.visible_records(store.records(), now)
            .into_iter()
            .map(|record| row_view(record, view.show_full_text(), now))
            .collect()
    };

    let mut full_text = view.clone();
    full_text.toggle_full_text();

    let mut clear = DashboardState::new();
    for column in view.open_filters() {
        clear.toggle_filter_visibility(column);
    }
    if view.show_full_text() {
        clear.toggle_full_text();
    }

    DashboardTemplate {
        loading: store.is_loading(),
        headers: header_views(view),
        hidden_fields: hidden_fields(view),
        total: rows.len(),
        rows,
        show_full_text: view.show_full_text(),
        full_text_href: dashboard_href(&full_text),
        clear_href: dashboard_href(&clear),
    }
}

fn header_views(view: &DashboardState) -> Vec<HeaderView> {
    let mut headers: Vec<HeaderView> = Column::ALL
        .into_iter()
        .map(|c| filter_header(view, c))
        .collect();
    let author = headers.pop();
    headers.push(plain_header("Contact", "plain"));
    headers.push(plain_header("Text", "text"));
    headers.extend(author);
    headers
}

fn filter_header(view: &DashboardState, column: Column) -> HeaderView {
    let mut toggled = view.clone();
    toggled.toggle_filter_visibility(column);
    let value = view.criterion(column);
    let (input_kind, options) = match column.input() {
        ColumnInput::Number => ("number", Vec::new()),
        ColumnInput::Text => ("text", Vec::new()),
        ColumnInput::Select(choices) => (
            "select",
            choices
                .iter()
                .map(|(v, label)| OptionView {
                    value: v,
                    label,
                    selected: *v == value,
                })
                .collect(),
        ),
    };
    HeaderView {
        label: column.label(),
        kind: "filter",
        key: column.key(),
        open: view.is_filter_visible(column),
        toggle_href: dashboard_href(&toggled),
        input_kind,
        placeholder: column.placeholder(),
        value,
        options,
    }
}

fn plain_header(label: &'static str, kind: &'static str) -> HeaderView {
    HeaderView {
        label,
        kind,
        key: "",
        open: false,
        toggle_href: String::new(),
        input_kind: "",
        placeholder: "",
        value: String::new(),
        options: Vec::new(),
    }
}

/// Criteria of closed filters plus the view flags, so submitting the open
/// inputs keeps everything else in place.
fn hidden_fields(view: &DashboardState) -> Vec<HiddenField> {
    let mut fields: Vec<HiddenField> = Column::ALL
        .into_iter()
        .filter(|c| !view.is_filter_visible(*c))
        .map(|c| (c, view.criterion(c)))
        .filter(|(_, value)| !value.is_empty())
        .map(|(c, value)| HiddenField {
            name: c.key().to_string(),
            value,
        })
        .collect();
    let open: Vec<&str> = view.open_filters().map(Column::key).collect();
    if !open.is_empty() {
        fields.push(HiddenField {
            name: SHOW_KEY.to_string(),
            value: open.join(","),
        });
    }
    if view.show_full_text() {
        fields.push(HiddenField {
            name: FULL_KEY.to_string(),
            value: "1".to_string(),
        });
    }
    fields
}

fn row_view(record: &ListingRecord, show_full_text: bool, now: DateTime<Utc>) -> RowView {
    let d = &record.details;
    let (sharing_text, sharing_style) = sharing_badge(d.sharing);
    RowView {
        bhk: count_text(&d.bhk),
        bedroom: (!d.bedroom_type.is_empty()).then(|| BadgeView {
            text: bedroom_label(&d.bedroom_type),
            class: bedroom_style(&d.bedroom_type).css_class(),
        }),
        sharing: BadgeView {
            text: sharing_text.to_string(),
            class: sharing_style.css_class(),
        },
        genders: d
            .gender
            .iter()
            .map(|g| BadgeView {
                text: g.to_string(),
                class: gender_style(g).css_class(),
            })
            .collect(),
        address: d.address.clone(),
        rent: format_amount(&d.rent),
        deposit: format_amount(&d.deposit),
        restrictions: d
            .restrictions
            .iter()
            .map(|code| {
                let glyph = restriction_glyph(code);
                GlyphView {
                    icon: glyph.icon().unwrap_or(""),
                    title: glyph.title().to_string(),
                    class: glyph.css_class(),
                }
            })
            .collect(),
        furnishing: (!d.furnishing.is_empty()).then(|| BadgeView {
            text: furnishing_label(&d.furnishing),
            class: furnishing_style(&d.furnishing).css_class(),
        }),
        brokerage: format_amount(&d.brokerage),
        available_date: d.available_date.clone(),
        time_relative: relative_time(&record.created_at, now),
        time_absolute: absolute_time(&record.created_at),
        contact: d.contact.clone(),
        text: if show_full_text {
            record.raw_text.clone()
        } else {
            truncate(&record.raw_text, DEFAULT_TRUNCATE_LEN)
        },
        author: record.author.clone(),
    }
}

/// BHK is shown as given: numbers without a trailing `.0`, free text as-is.
fn count_text(amount: &Amount) -> String {
    match amount {
        Amount::Number(n) => n.to_string(),
        Amount::Text(text) if !text.is_empty() => text.clone(),
        _ => PLACEHOLDER.to_string(),
    }
}
