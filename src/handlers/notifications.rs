/// Notification REST handlers
use actix_web::{web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::CreateNotificationRequest;
use crate::state::AppState;

const MAX_TITLE_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 2000;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

fn validate_create(req: &CreateNotificationRequest) -> Result<(), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is empty".into()));
    }
    if req.title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::BadRequest(format!(
            "title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }
    if req.body.trim().is_empty() {
        return Err(AppError::BadRequest("body is empty".into()));
    }
    if req.body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::BadRequest(format!(
            "body exceeds {MAX_BODY_CHARS} characters"
        )));
    }
    Ok(())
}

/// Create a notification and fan it out to the recipient's live channels.
///
/// POST /api/v1/notifications
pub async fn create_notification(
    state: web::Data<AppState>,
    _user: AuthUser,
    req: web::Json<CreateNotificationRequest>,
) -> Result<HttpResponse, AppError> {
    validate_create(&req)?;

    let notification = state.fanout.notify(req.recipient_id, req.payload()).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(notification)))
}

/// List the caller's unread notifications, newest first.
///
/// GET /api/v1/notifications/unread
pub async fn list_unread(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let notifications = state.store.list_unread(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notifications)))
}

/// The caller's unread count.
///
/// GET /api/v1/notifications/unread/count
pub async fn unread_count(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let count = state.store.unread_count(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "count": count }))))
}

/// Mark one of the caller's notifications as read.
///
/// POST /api/v1/notifications/{id}/read
///
/// A notification owned by someone else gets the same not-found answer
/// as an id that does not exist.
pub async fn mark_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    state.store.mark_read(id, user.id).await?;
    state.fanout.push_unread_count(user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "id": id }))))
}

/// Mark everything unread for the caller as read.
///
/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let updated = state.store.mark_all_read(user.id).await?;
    state.fanout.push_unread_count(user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "updated": updated }))))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("", web::post().to(create_notification))
            .route("/unread", web::get().to(list_unread))
            .route("/unread/count", web::get().to(unread_count))
            .route("/read-all", web::post().to(mark_all_read))
            .route("/{id}/read", web::post().to(mark_read)),
    );
}
