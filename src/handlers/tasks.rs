/// Moderation task list for the admin surface.
use super::AppState;
use crate::error::Result;
use actix_web::{web, HttpResponse};

pub async fn list_tasks(state: web::Data<AppState>) -> Result<HttpResponse> {
    let tasks = state.tasks.list().await?;
    Ok(HttpResponse::Ok().json(tasks))
}
