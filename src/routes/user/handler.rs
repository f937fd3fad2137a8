use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
};
use sha2::{Digest, Sha256};

use crate::{
    AppState,
    error::{AppError, NON_FIELD_ERRORS, ValidationErrors},
    routes::classroom::model::{Classroom, ClassroomSummary},
    utils::{ApiJson, Claims, HandlerResult, created, generate_token, ok},
};

use super::model::{
    AuthTokenRequest, AuthTokenResponse, CreateUserRequest, Profile, UpdateUserRequest, User,
    picture_extension,
};

const DUPLICATE_STD_ID: &str =
    "A user with this Student/Faculty ID already exists in the given institution.";

#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> HandlerResult<Profile> {
    let new_user = req.validate()?;

    let mut errors = ValidationErrors::new();
    if User::email_taken(&state.pool, &new_user.email).await? {
        errors.add("email", "User with this email already exists.");
    }
    if User::std_id_taken(&state.pool, new_user.std_id, new_user.institution, None).await? {
        errors.add(NON_FIELD_ERRORS, DUPLICATE_STD_ID);
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let user = User::create(&state.pool, new_user).await?;
    created(Profile::from(user))
}

#[axum::debug_handler]
pub async fn create_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AuthTokenRequest>,
) -> HandlerResult<AuthTokenResponse> {
    let Some(user) = User::authenticate(&state.pool, &req.email, &req.password).await? else {
        return Err(AppError::field(
            NON_FIELD_ERRORS,
            "Unable to authenticate with provided credentials.",
        ));
    };

    let (token, expires_at) = generate_token(user.id, user.is_staff, &state.config)?;
    tracing::debug!("Issued token for user {}", user.id);
    ok(AuthTokenResponse { token, expires_at })
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Profile> {
    let user = User::find_by_id(&state.pool, claims.user_id()?)
        .await?
        .ok_or(AppError::Unauthorized)?;
    ok(Profile::from(user))
}

#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> HandlerResult<Profile> {
    let changes = req.validate()?;
    let user_id = claims.user_id()?;

    // uniqueness is checked on the resulting pair, not just the changed half
    if changes.std_id.is_some() || changes.institution.is_some() {
        let current = User::find_by_id(&state.pool, user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let std_id = changes.std_id.unwrap_or(current.std_id);
        let institution = changes.institution.unwrap_or(current.institution);
        if User::std_id_taken(&state.pool, std_id, institution, Some(user_id)).await? {
            return Err(AppError::field(NON_FIELD_ERRORS, DUPLICATE_STD_ID));
        }
    }

    let user = User::update(&state.pool, user_id, changes).await?;
    ok(Profile::from(user))
}

#[axum::debug_handler]
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, AppError> {
    User::delete(&state.pool, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart upload of the `picture` field; stored by content hash.
#[axum::debug_handler]
pub async fn upload_picture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> HandlerResult<Profile> {
    let user_id = claims.user_id()?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("picture") {
            continue;
        }

        let ext = field
            .file_name()
            .and_then(picture_extension)
            .ok_or_else(|| {
                AppError::field(
                    "picture",
                    "File extension is not allowed. Allowed extensions are: jpg, jpeg, png, gif.",
                )
            })?;
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::field("picture", "The submitted file is empty."));
        }

        let file_name = format!("{:x}.{}", Sha256::digest(&bytes), ext);
        let dir = std::path::Path::new(&state.config.media_root).join("profile_pics");
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), &bytes).await?;

        let stored = format!("profile_pics/{}", file_name);
        tracing::info!("User {} uploaded picture {}", user_id, stored);
        let user = User::set_picture(&state.pool, user_id, &stored).await?;
        return ok(Profile::from(user));
    }

    Err(AppError::field("picture", "No file was submitted."))
}

#[axum::debug_handler]
pub async fn my_classes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> HandlerResult<Vec<ClassroomSummary>> {
    let classes = Classroom::enrolled_for(&state.pool, claims.user_id()?).await?;
    ok(classes.into_iter().map(ClassroomSummary::from).collect())
}
