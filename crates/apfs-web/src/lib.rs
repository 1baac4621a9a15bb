//! Axum + Askama dashboard over the forecast store.
//!
//! Thin read layer: filter predicates are parameterized in the store, and
//! the chat panel's query errors are rendered as strings in the page rather
//! than crashing the session.

use std::sync::Arc;

use apfs_core::ForecastRecord;
use apfs_llm::{strip_code_fence, TextGenerator};
use apfs_store::{ForecastStore, QueryError, RecordFilter};
use askama::Template;
use axum::{
    extract::{Form, Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::warn;

pub const CRATE_NAME: &str = "apfs-web";

const APP_CSS: &str = include_str!("../assets/app.css");
const TABLE_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub store: ForecastStore,
    pub generator: Option<Arc<dyn TextGenerator>>,
}

impl AppState {
    pub fn new(store: ForecastStore, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { store, generator }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RecordsQuery {
    title: Option<String>,
    program: Option<String>,
    state: Option<String>,
    naics: Option<String>,
    dollar_range: Option<String>,
}

impl RecordsQuery {
    /// Empty form fields arrive as empty strings; treat them as no filter.
    fn into_filter(self) -> RecordFilter {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        RecordFilter {
            title: clean(self.title),
            program: clean(self.program),
            state: clean(self.state),
            naics: clean(self.naics),
            dollar_range: clean(self.dollar_range),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    question: String,
}

#[derive(Debug, Deserialize)]
struct RecommendForm {
    profile: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_records: i64,
    total_programs: usize,
    total_dollar_ranges: usize,
}

#[derive(Template)]
#[template(path = "records.html")]
struct RecordsTemplate {
    title: String,
    state: String,
    naics: String,
    programs: Vec<String>,
    dollar_ranges: Vec<String>,
}

#[derive(Template)]
#[template(path = "records_table_partial.html")]
struct RecordsTablePartialTemplate {
    rows: Vec<RecordRow>,
}

#[derive(Debug, Clone)]
struct RecordRow {
    id: i64,
    title: String,
    organization: String,
    program: String,
    dollar_range: String,
    naics: String,
    state: String,
}

#[derive(Template)]
#[template(path = "record_detail.html")]
struct RecordDetailTemplate {
    record_id: i64,
    title: String,
    fields: Vec<DetailField>,
}

#[derive(Debug, Clone)]
struct DetailField {
    label: String,
    value: String,
}

#[derive(Template)]
#[template(path = "chat.html")]
struct ChatTemplate {
    question: String,
    error: String,
    generated_sql: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ChatTemplate {
    fn blank() -> Self {
        Self {
            question: String::new(),
            error: String::new(),
            generated_sql: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "recommend.html")]
struct RecommendTemplate {
    profile: String,
    error: String,
    competencies: Vec<String>,
    rows: Vec<RecordRow>,
}

impl RecommendTemplate {
    fn blank() -> Self {
        Self {
            profile: String::new(),
            error: String::new(),
            competencies: Vec::new(),
            rows: Vec::new(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/records", get(records_page_handler))
        .route("/records/table", get(records_table_handler))
        .route("/records/{id}", get(record_detail_handler))
        .route(
            "/recommend",
            get(recommend_page_handler).post(recommend_handler),
        )
        .route("/chat", get(chat_page_handler).post(chat_ask_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("APFS_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data.db".to_string());

    let store = ForecastStore::open(&database_url).await?;
    store.ensure_schema().await?;

    let generator: Option<Arc<dyn TextGenerator>> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Some(Arc::new(apfs_llm::CompletionClient::new(
            apfs_llm::CompletionConfig::new(key),
        )?)),
        _ => {
            warn!("OPENAI_API_KEY not set; chat panel disabled");
            None
        }
    };

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(AppState::new(store, generator))).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let total_records = match state.store.count().await {
        Ok(n) => n,
        Err(err) => return server_error(err.into()),
    };
    let programs = state.store.distinct_programs().await.unwrap_or_default();
    let dollar_ranges = state
        .store
        .distinct_dollar_ranges()
        .await
        .unwrap_or_default();
    render_html(IndexTemplate {
        total_records,
        total_programs: programs.len(),
        total_dollar_ranges: dollar_ranges.len(),
    })
}

async fn records_page_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordsQuery>,
) -> Response {
    let programs = state.store.distinct_programs().await.unwrap_or_default();
    let dollar_ranges = state
        .store
        .distinct_dollar_ranges()
        .await
        .unwrap_or_default();
    render_html(RecordsTemplate {
        title: query.title.unwrap_or_default(),
        state: query.state.unwrap_or_default(),
        naics: query.naics.unwrap_or_default(),
        programs,
        dollar_ranges,
    })
}

async fn records_table_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordsQuery>,
) -> Response {
    match state.store.search(&query.into_filter(), TABLE_LIMIT).await {
        Ok(records) => render_html(RecordsTablePartialTemplate {
            rows: records.iter().map(record_row).collect(),
        }),
        Err(err) => server_error(err.into()),
    }
}

async fn record_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.store.get(id).await {
        Ok(Some(record)) => {
            let title = record
                .requirements_title
                .clone()
                .unwrap_or_else(|| format!("Record {id}"));
            render_html(RecordDetailTemplate {
                record_id: id,
                title,
                fields: detail_fields(&record),
            })
        }
        Ok(None) => (StatusCode::NOT_FOUND, Html("Record not found".to_string())).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn recommend_page_handler() -> Response {
    render_html(RecommendTemplate::blank())
}

async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RecommendForm>,
) -> Response {
    let mut page = RecommendTemplate::blank();
    page.profile = form.profile.clone();

    let Some(generator) = &state.generator else {
        page.error = "Completion service is not configured; set OPENAI_API_KEY.".to_string();
        return render_html(page);
    };
    if form.profile.trim().is_empty() {
        page.error = "Paste a company profile first.".to_string();
        return render_html(page);
    }

    let reply = match generator.generate(&competencies_prompt(&form.profile)).await {
        Ok(text) => text,
        Err(err) => {
            page.error = format!("Completion service error: {err}");
            return render_html(page);
        }
    };
    let competencies = parse_competencies(&reply);
    if competencies.is_empty() {
        page.error = "No competencies could be extracted from the profile.".to_string();
        return render_html(page);
    }

    match state.store.recommend(&competencies, TABLE_LIMIT).await {
        Ok(records) => {
            page.competencies = competencies;
            page.rows = records.iter().map(record_row).collect();
        }
        Err(err) => return server_error(err.into()),
    }
    render_html(page)
}

async fn chat_page_handler() -> Response {
    render_html(ChatTemplate::blank())
}

async fn chat_ask_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ChatForm>,
) -> Response {
    let mut page = ChatTemplate::blank();
    page.question = form.question.clone();

    let Some(generator) = &state.generator else {
        page.error = "Completion service is not configured; set OPENAI_API_KEY.".to_string();
        return render_html(page);
    };

    let prompt = sql_prompt(&form.question);
    let generated = match generator.generate(&prompt).await {
        Ok(text) => strip_code_fence(&text).to_string(),
        Err(err) => {
            page.error = format!("Completion service error: {err}");
            return render_html(page);
        }
    };
    page.generated_sql = generated.clone();

    match state.store.run_select(&generated).await {
        Ok(table) => {
            page.columns = table.columns;
            page.rows = table.rows;
        }
        // Query failures render as a string; the session stays usable.
        Err(QueryError::NotASelect) => {
            page.error = "The generated query was not a single SELECT and was not run.".to_string();
        }
        Err(QueryError::Execution(msg)) => {
            page.error = format!("Query failed: {msg}");
        }
    }
    render_html(page)
}

async fn app_css_handler() -> Response {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], APP_CSS).into_response()
}

fn competencies_prompt(profile: &str) -> String {
    format!(
        "Extract the core competencies and relevant keywords from the \
         following company profile text. Answer with a comma-separated list \
         only, no commentary.\n\n{profile}"
    )
}

/// Competency list as the model returns it: comma-separated, occasionally
/// line-broken.
fn parse_competencies(reply: &str) -> Vec<String> {
    reply
        .split([',', '\n'])
        .map(|c| c.trim().trim_start_matches('-').trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn sql_prompt(question: &str) -> String {
    format!(
        "You translate questions about government contract forecasts into a \
         single SQLite SELECT statement.\n\
         The only table is `data` with columns: {}.\n\
         Answer with the SQL statement only, no commentary.\n\
         Question: {question}",
        apfs_store::SCHEMA_COLUMNS.join(", ")
    )
}

fn record_row(record: &ForecastRecord) -> RecordRow {
    fn show(v: &Option<String>) -> String {
        v.clone().unwrap_or_default()
    }
    RecordRow {
        id: record.id,
        title: show(&record.requirements_title),
        organization: show(&record.organization),
        program: show(&record.small_business_program),
        dollar_range: show(&record.dollar_range),
        naics: show(&record.naics),
        state: show(&record.place_of_performance_state),
    }
}

fn detail_fields(record: &ForecastRecord) -> Vec<DetailField> {
    fn field(label: &str, value: &Option<String>) -> DetailField {
        DetailField {
            label: label.to_string(),
            value: value.clone().unwrap_or_default(),
        }
    }
    vec![
        field("Organization", &record.organization),
        field("Small-business program", &record.small_business_program),
        field("Dollar range", &record.dollar_range),
        field("Contract vehicle", &record.contract_vehicle),
        field("Competitive", &record.competitive),
        field("Award quarter", &record.award_quarter),
        field("Estimated release date", &record.estimated_release_date),
        field("NAICS", &record.naics),
        field("Contract type", &record.contract_type),
        field("APFS number", &record.apfs_number),
        field("Requirement", &record.requirement),
        field("Contract status", &record.contract_status),
        field(
            "Performance start",
            &record.estimated_period_of_performance_start,
        ),
        field(
            "Performance end",
            &record.estimated_period_of_performance_end,
        ),
        field("Anticipated award date", &record.anticipated_award_date),
        field("City", &record.place_of_performance_city),
        field("State", &record.place_of_performance_state),
        field(
            "Requirements contact",
            &contact(
                &record.requirements_contact_first_name,
                &record.requirements_contact_last_name,
                &record.requirements_contact_email,
            ),
        ),
        field(
            "Alternate contact",
            &contact(
                &record.alternate_contact_first_name,
                &record.alternate_contact_last_name,
                &record.alternate_contact_email,
            ),
        ),
        DetailField {
            label: "Fiscal year".to_string(),
            value: record
                .fiscal_year
                .map(|y| y.to_string())
                .unwrap_or_default(),
        },
        field("Requirements office", &record.requirements_office),
        field("Contracting office", &record.contracting_office),
        field("Current state", &record.current_state),
        field("Published", &record.published_date),
        field("Previously published", &record.previous_published_date),
        field("Last updated", &record.last_updated_date),
    ]
}

fn contact(
    first: &Option<String>,
    last: &Option<String>,
    email: &Option<String>,
) -> Option<String> {
    let name = [first.as_deref(), last.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    match (name.is_empty(), email) {
        (true, None) => None,
        (true, Some(email)) => Some(email.clone()),
        (false, None) => Some(name),
        (false, Some(email)) => Some(format!("{name} <{email}>")),
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

#[cfg(test)]
mod tests {
    use super::*;
    use apfs_llm::GenerateError;
    use async_trait::async_trait;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct CannedGenerator {
        reply: String,
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(self.reply.clone())
        }
    }

    async fn seeded_state(generator: Option<Arc<dyn TextGenerator>>) -> AppState {
        let store = ForecastStore::open_in_memory().await.expect("open");
        store.ensure_schema().await.expect("schema");
        let record = ForecastRecord {
            id: 1,
            organization: Some("DHS".into()),
            requirements_title: Some("Cloud Migration Support".into()),
            requirement: Some("Cloud migration and managed hosting services".into()),
            small_business_program: Some("8(a)".into()),
            dollar_range: Some("$0 to $250K".into()),
            naics: Some("541511".into()),
            place_of_performance_state: Some("VA".into()),
            ..Default::default()
        };
        store.apply(&[record]).await.expect("apply");
        AppState::new(store, generator)
    }

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn post_form(app: Router, uri: &str, body: String) -> String {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(
                        header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn post_chat(app: Router, question: &str) -> String {
        post_form(app, "/chat", format!("question={question}")).await
    }

    #[tokio::test]
    async fn index_shows_record_count() {
        let app = app(seeded_state(None).await);
        let (status, text) = get_text(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("APFS Forecast Portal"));
        assert!(text.contains("forecast records"));
    }

    #[tokio::test]
    async fn records_table_filters_by_title() {
        let app = app(seeded_state(None).await);
        let (status, text) = get_text(app.clone(), "/records/table?title=Cloud").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Cloud Migration Support"));

        let (status, text) = get_text(app, "/records/table?title=Nonexistent").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("No records match"));
    }

    #[tokio::test]
    async fn record_detail_renders_flattened_fields() {
        let app = app(seeded_state(None).await);
        let (status, text) = get_text(app.clone(), "/records/1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("$0 to $250K"));

        let (status, _) = get_text(app, "/records/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_without_generator_explains_itself() {
        let app = app(seeded_state(None).await);
        let text = post_chat(app, "how many records").await;
        assert!(text.contains("not configured"));
    }

    #[tokio::test]
    async fn chat_runs_generated_select_and_renders_rows() {
        let generator: Arc<dyn TextGenerator> = Arc::new(CannedGenerator {
            reply: "```sql\nSELECT id, organization FROM data\n```".into(),
        });
        let app = app(seeded_state(Some(generator)).await);
        let text = post_chat(app, "list organizations").await;
        assert!(text.contains("DHS"));
        assert!(text.contains("SELECT id, organization FROM data"));
    }

    #[tokio::test]
    async fn chat_surfaces_rejected_queries_as_text() {
        let generator: Arc<dyn TextGenerator> = Arc::new(CannedGenerator {
            reply: "DROP TABLE data".into(),
        });
        let app = app(seeded_state(Some(generator)).await);
        let text = post_chat(app.clone(), "delete everything").await;
        assert!(text.contains("not a single SELECT"));

        // The table survived the rejected statement.
        let (_, table) = get_text(app, "/records/table").await;
        assert!(table.contains("DHS"));
    }

    #[tokio::test]
    async fn recommend_extracts_competencies_and_lists_matches() {
        let generator: Arc<dyn TextGenerator> = Arc::new(CannedGenerator {
            reply: "cloud migration, logistics".into(),
        });
        let app = app(seeded_state(Some(generator)).await);
        let text = post_form(app, "/recommend", "profile=We+do+cloud+work".into()).await;
        assert!(text.contains("cloud migration"));
        assert!(text.contains("Cloud Migration Support"));
    }

    #[tokio::test]
    async fn recommend_without_generator_explains_itself() {
        let app = app(seeded_state(None).await);
        let text = post_form(app, "/recommend", "profile=anything".into()).await;
        assert!(text.contains("not configured"));
    }

    #[tokio::test]
    async fn recommend_with_no_extractable_competencies_says_so() {
        let generator: Arc<dyn TextGenerator> = Arc::new(CannedGenerator {
            reply: " , \n ".into(),
        });
        let app = app(seeded_state(Some(generator)).await);
        let text = post_form(app, "/recommend", "profile=blank+profile".into()).await;
        assert!(text.contains("No competencies"));
    }

    #[test]
    fn competency_replies_parse_across_commas_and_lines() {
        assert_eq!(
            parse_competencies("cloud migration, logistics,\n- staffing\n"),
            vec!["cloud migration", "logistics", "staffing"]
        );
        assert!(parse_competencies("  ,\n").is_empty());
    }

    #[tokio::test]
    async fn css_asset_is_served() {
        let app = app(seeded_state(None).await);
        let (status, text) = get_text(app, "/assets/static/app.css").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("--accent"));
    }
}
