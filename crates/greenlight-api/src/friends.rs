use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use greenlight_db::Database;
use greenlight_db::models::ListRow;
use greenlight_types::api::{
    AddFriendRequest, AddMemberRequest, Claims, CreateListRequest, DirectoryEntry, ListDetail,
    ListSummary, RenameListRequest,
};
use greenlight_types::models::UserSummary;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

fn list_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(ApiError::bad_request("list name must be 1-64 characters"));
    }
    Ok(name.to_string())
}

/// The list if the caller owns it. Other users' lists are reported missing.
fn owned_list(db: &Database, list_id: Uuid, user_id: Uuid) -> ApiResult<ListRow> {
    db.get_list(&list_id.to_string())?
        .filter(|l| l.user_id == user_id.to_string())
        .ok_or(ApiError::NotFound)
}

fn detail(db: &Database, list: ListRow) -> ApiResult<ListDetail> {
    let members = db
        .list_members(&list.id)?
        .into_iter()
        .map(|m| m.into_summary())
        .collect();
    Ok(ListDetail {
        list: list.into_list(),
        members,
    })
}

// -- Directory --

/// Every other user, flagged with whether the caller already friended them.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<DirectoryEntry>>> {
    let rows = blocking(&state, move |db| Ok(db.list_directory(&claims.sub.to_string())?)).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(user, is_friend)| DirectoryEntry {
                user: user.into_summary(),
                is_friend,
            })
            .collect(),
    ))
}

// -- Friends --

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let rows = blocking(&state, move |db| Ok(db.list_friends(&claims.sub.to_string())?)).await?;
    Ok(Json(rows.into_iter().map(|r| r.into_summary()).collect()))
}

pub async fn add_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddFriendRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.friend_id == claims.sub {
        return Err(ApiError::bad_request("cannot friend yourself"));
    }

    let friend = blocking(&state, move |db| {
        let friend = db
            .get_user_by_id(&req.friend_id.to_string())?
            .ok_or(ApiError::NotFound)?;
        let id = Uuid::new_v4().to_string();
        if !db.add_friend(&id, &claims.sub.to_string(), &friend.id)? {
            return Err(ApiError::conflict("already friends"));
        }
        Ok(friend.summary())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(friend)))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path(friend_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        if !db.remove_friend(&claims.sub.to_string(), &friend_id.to_string())? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Lists --

pub async fn create_list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateListRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = list_name(&req.name)?;

    let list = blocking(&state, move |db| {
        let owner = claims.sub.to_string();
        let requested: Vec<String> = req
            .member_ids
            .iter()
            .filter(|id| **id != claims.sub)
            .map(Uuid::to_string)
            .collect();
        let members = db.existing_user_ids(&requested)?;

        let id = Uuid::new_v4().to_string();
        db.create_list(&id, &owner, &name, &members)?;
        let list = db.get_list(&id)?.ok_or(ApiError::NotFound)?;
        detail(db, list)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn list_lists(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ListSummary>>> {
    let rows = blocking(&state, move |db| Ok(db.list_lists(&claims.sub.to_string())?)).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(list, member_count)| ListSummary {
                list: list.into_list(),
                member_count,
            })
            .collect(),
    ))
}

pub async fn get_list(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ListDetail>> {
    let list = blocking(&state, move |db| {
        let list = owned_list(db, list_id, claims.sub)?;
        detail(db, list)
    })
    .await?;
    Ok(Json(list))
}

pub async fn rename_list(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RenameListRequest>,
) -> ApiResult<Json<ListDetail>> {
    let name = list_name(&req.name)?;
    let list = blocking(&state, move |db| {
        let list = owned_list(db, list_id, claims.sub)?;
        db.rename_list(&list.id, &name)?;
        let list = db.get_list(&list.id)?.ok_or(ApiError::NotFound)?;
        detail(db, list)
    })
    .await?;
    Ok(Json(list))
}

pub async fn delete_list(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        let list = owned_list(db, list_id, claims.sub)?;
        db.delete_list(&list.id)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_list_member(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.user_id == claims.sub {
        return Err(ApiError::bad_request("cannot add yourself to a list"));
    }

    let list = blocking(&state, move |db| {
        let list = owned_list(db, list_id, claims.sub)?;
        let member = db
            .get_user_by_id(&req.user_id.to_string())?
            .ok_or(ApiError::NotFound)?;
        if !db.add_list_member(&list.id, &member.id)? {
            return Err(ApiError::conflict("already a member"));
        }
        detail(db, list)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn remove_list_member(
    State(state): State<AppState>,
    Path((list_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |db| {
        let list = owned_list(db, list_id, claims.sub)?;
        if !db.remove_list_member(&list.id, &user_id.to_string())? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
