use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::ChatService;

#[utoipa::path(
    post,
    path = "/chat/session",
    tag = "chat",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取或创建会话成功", body = ChatSession),
        (status = 401, description = "未授权")
    )
)]
pub async fn open_session(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match chat_service.open_session(user_id).await {
        Ok(session) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": session
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/chat/messages",
    tag = "chat",
    request_body = SendMessageRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "发送消息成功", body = ChatMessage),
        (status = 400, description = "消息内容非法"),
        (status = 401, description = "未授权")
    )
)]
pub async fn send_message(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    request: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match chat_service.user_send(user_id, request.into_inner()).await {
        Ok(message) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": message
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/chat/messages",
    tag = "chat",
    params(
        ("after_id" = Option<i64>, Query, description = "只拉取此ID之后的消息"),
        ("limit" = Option<u32>, Query, description = "单次拉取上限")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "拉取消息成功", body = Vec<ChatMessage>),
        (status = 401, description = "未授权")
    )
)]
pub async fn poll_messages(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    query: web::Query<MessageQuery>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match chat_service.user_poll(user_id, &query).await {
        Ok(messages) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": messages
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/chat/unread",
    tag = "chat",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取未读数成功", body = UnreadCountResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn unread_count(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match chat_service.user_unread(user_id).await {
        Ok(count) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": count
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn chat_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .route("/session", web::post().to(open_session))
            .route("/messages", web::post().to(send_message))
            .route("/messages", web::get().to(poll_messages))
            .route("/unread", web::get().to(unread_count)),
    );
}
