use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::api::validation::{encode_paper, validate_image_upload};
use crate::core::state::AppState;
use crate::schemas::paper::PaperResponse;
use crate::services::ownership::owned_exam;
use crate::store::NewPaper;

const PAPER_FIELD: &str = "paper";

pub(in crate::api::exams) async fn upload_paper(
    Path((exam_id, student_id)): Path<(String, String)>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PaperResponse>), ApiError> {
    let exam = owned_exam(state.store(), &exam_id, &teacher_id).await?;

    let roster = state
        .store()
        .students_in_class(&exam.class_id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to load class roster"))?;
    if !roster.iter().any(|student| student.id == student_id) {
        return Err(ApiError::NotFound(format!(
            "Student {student_id} is not on the roster of exam {}",
            exam.id
        )));
    }

    let storage = state.settings().storage();
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some(PAPER_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
        {
            // Encoded size is checked later; raw bytes beyond the limit can never fit.
            if bytes.len() as u64 + chunk.len() as u64 > storage.max_paper_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "Image exceeds the {} byte limit",
                    storage.max_paper_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some((filename, content_type, bytes));
        break;
    }

    let Some((filename, content_type, bytes)) = upload else {
        return Err(ApiError::BadRequest(format!("Missing multipart field '{PAPER_FIELD}'")));
    };

    let extension =
        validate_image_upload(&filename, &content_type, &storage.allowed_image_extensions)?;
    let image_data = encode_paper(&bytes, &extension, storage.max_paper_bytes)?;

    let paper = state
        .store()
        .insert_paper(NewPaper { exam_id: exam.id.clone(), student_id, image_data })
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to store paper"))?;

    tracing::info!(
        exam_id = %exam.id,
        student_id = %paper.student_id,
        paper_id = %paper.id,
        bytes = bytes.len(),
        "Paper uploaded"
    );
    Ok((StatusCode::CREATED, Json(PaperResponse::from(paper))))
}

/// Scores already read from the paper are kept.
pub(in crate::api::exams) async fn delete_paper(
    Path((exam_id, paper_id)): Path<(String, String)>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = owned_exam(state.store(), &exam_id, &teacher_id).await?;

    let removed = state
        .store()
        .delete_paper(&exam.id, &paper_id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to delete paper"))?;

    if !removed {
        return Err(ApiError::NotFound(format!("Paper {paper_id} not found")));
    }

    tracing::info!(exam_id = %exam.id, paper_id = %paper_id, "Paper deleted");
    Ok(StatusCode::NO_CONTENT)
}
