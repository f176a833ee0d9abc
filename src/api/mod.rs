use crate::chat::ChatService;
use crate::config::ApiConfig;
use crate::error::{generate_request_id, ChatError};
use crate::memory::llm_provider::TokenStream;
use crate::monitoring::health::{ComponentStatus, HealthTracker};
use crate::monitoring::metrics;
use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{web, App, HttpResponse, HttpServer};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared handler state.
pub struct ApiState {
    pub chat: Arc<ChatService>,
    pub health: Arc<HealthTracker>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub content: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

#[derive(Deserialize)]
pub struct StreamQuery {
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

#[derive(Serialize)]
struct MenuItem<'a> {
    index: usize,
    label: &'a str,
}

fn sse_frame(event: &str, data: &Value) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// `token` frames per delta, then one `done` frame with the whole answer,
/// or an `error` frame if the answer stream fails.
pub fn sse_events(tokens: TokenStream) -> impl Stream<Item = Result<Bytes, Infallible>> + 'static {
    stream::unfold(Some((tokens, String::new())), |state| async move {
        let (mut tokens, mut answer) = state?;
        match tokens.next().await {
            Some(Ok(text)) => {
                answer.push_str(&text);
                let frame = sse_frame("token", &json!({ "text": text }));
                Some((Ok(frame), Some((tokens, answer))))
            }
            Some(Err(e)) => Some((Ok(sse_frame("error", &json!({ "message": e.to_string() }))), None)),
            None => Some((Ok(sse_frame("done", &json!({ "answer": answer }))), None)),
        }
    })
}

async fn respond(
    state: &ApiState,
    session_id: Uuid,
    tokens: TokenStream,
    stream: bool,
) -> Result<HttpResponse, ChatError> {
    if stream {
        return Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .streaming(sse_events(tokens)));
    }

    let mut tokens = tokens;
    let mut answer = String::new();
    while let Some(delta) = tokens.next().await {
        answer.push_str(&delta?);
    }
    drop(tokens);
    let messages = state.chat.messages(session_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "session_id": session_id,
        "answer": answer,
        "messages": messages
    })))
}

async fn page_handler(state: web::Data<ApiState>) -> HttpResponse {
    let persona = state.chat.persona();
    let menu: Vec<MenuItem> = persona
        .menu
        .iter()
        .enumerate()
        .map(|(index, item)| MenuItem { index, label: &item.label })
        .collect();
    HttpResponse::Ok().json(json!({
        "title": persona.page_title,
        "icon": persona.page_icon,
        "heading": persona.heading,
        "menu": menu,
        "menu_columns": persona.menu_columns,
        "input_placeholder": persona.input_placeholder,
        "mode": state.chat.mode(),
        "index_ready": state.chat.index_ready(),
        "indexing_message": persona.indexing_message
    }))
}

async fn create_session(state: web::Data<ApiState>) -> HttpResponse {
    let (session_id, messages) = state.chat.create_session().await;
    HttpResponse::Created().json(json!({
        "session_id": session_id,
        "messages": messages
    }))
}

async fn get_messages(state: web::Data<ApiState>, path: web::Path<Uuid>) -> Result<HttpResponse, ChatError> {
    let session_id = path.into_inner();
    let messages = state.chat.messages(session_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "session_id": session_id,
        "messages": messages
    })))
}

async fn post_message(
    state: web::Data<ApiState>,
    path: web::Path<Uuid>,
    body: web::Json<SubmitRequest>,
) -> Result<HttpResponse, ChatError> {
    let session_id = path.into_inner();
    let request = body.into_inner();
    let tokens = state.chat.submit(session_id, &request.content).await?;
    respond(&state, session_id, tokens, request.stream).await
}

async fn post_quick_reply(
    state: web::Data<ApiState>,
    path: web::Path<(Uuid, usize)>,
    query: web::Query<StreamQuery>,
) -> Result<HttpResponse, ChatError> {
    let (session_id, index) = path.into_inner();
    let tokens = state.chat.quick_reply(session_id, index).await?;
    respond(&state, session_id, tokens, query.stream).await
}

async fn delete_session(state: web::Data<ApiState>, path: web::Path<Uuid>) -> Result<HttpResponse, ChatError> {
    state.chat.close_session(path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

async fn health_check(state: web::Data<ApiState>) -> HttpResponse {
    let request_id = generate_request_id();
    let status = state.health.get_status();
    let body = json!({
        "status": status.status,
        "ready": state.health.is_ready(),
        "timestamp": status.timestamp,
        "uptime_seconds": status.uptime_seconds,
        "components": status.components,
        "message": status.message,
        "sessions": state.chat.session_count(),
        "request_id": request_id
    });
    if status.status == ComponentStatus::Unhealthy {
        warn!(request_id = %request_id, "Health check reports unhealthy");
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

async fn get_metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(metrics::export_prometheus())
}

/// Route table, shared by the server and the integration tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/monitoring")
            .route("/health", web::get().to(health_check))
            .route("/metrics", web::get().to(get_metrics)),
    )
    .route("/", web::get().to(page_handler))
    .route("/sessions", web::post().to(create_session))
    .route("/sessions/{id}", web::delete().to(delete_session))
    .service(
        web::resource("/sessions/{id}/messages")
            .route(web::get().to(get_messages))
            .route(web::post().to(post_message)),
    )
    .route("/sessions/{id}/quick_replies/{index}", web::post().to(post_quick_reply));
}

pub fn start_api_server(
    config: &ApiConfig,
    chat: Arc<ChatService>,
    health: Arc<HealthTracker>,
) -> std::io::Result<Server> {
    let bind_addr = config.bind_addr();
    let state = web::Data::new(ApiState { chat, health });

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .configure(routes)
    })
    .bind(&bind_addr)?
    .run();

    info!(addr = %bind_addr, "HTTP server listening");
    Ok(server)
}
