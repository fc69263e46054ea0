use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use dsync::{LocalLocker, LockArgs, LockRequesterInfo, NetLocker};
use dsync_common::error::Result;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{
    error::RestError,
    types::{
        LockReply, PATH_FORCE_UNLOCK, PATH_HEALTH, PATH_LOCK, PATH_LOCKS, PATH_REFRESH,
        PATH_RLOCK, PATH_RUNLOCK, PATH_UNLOCK, route,
    },
};

type LockerState = State<Arc<LocalLocker>>;

fn reply(call: &str, args: &LockArgs, result: Result<bool>) -> std::result::Result<Json<LockReply>, RestError> {
    let success = result?;
    debug!(call, uid = %args.uid, resources = ?args.resources, owner = %args.owner, success, "lock rpc");
    Ok(Json(LockReply { success }))
}

async fn lock(
    State(locker): LockerState,
    Json(args): Json<LockArgs>,
) -> std::result::Result<Json<LockReply>, RestError> {
    reply(PATH_LOCK, &args, locker.lock(&args).await)
}

async fn rlock(
    State(locker): LockerState,
    Json(args): Json<LockArgs>,
) -> std::result::Result<Json<LockReply>, RestError> {
    reply(PATH_RLOCK, &args, locker.rlock(&args).await)
}

async fn unlock(
    State(locker): LockerState,
    Json(args): Json<LockArgs>,
) -> std::result::Result<Json<LockReply>, RestError> {
    reply(PATH_UNLOCK, &args, locker.unlock(&args).await)
}

async fn runlock(
    State(locker): LockerState,
    Json(args): Json<LockArgs>,
) -> std::result::Result<Json<LockReply>, RestError> {
    reply(PATH_RUNLOCK, &args, locker.runlock(&args).await)
}

async fn refresh(
    State(locker): LockerState,
    Json(args): Json<LockArgs>,
) -> std::result::Result<Json<LockReply>, RestError> {
    reply(PATH_REFRESH, &args, locker.refresh(&args).await)
}

async fn force_unlock(
    State(locker): LockerState,
    Json(args): Json<LockArgs>,
) -> std::result::Result<Json<LockReply>, RestError> {
    reply(PATH_FORCE_UNLOCK, &args, locker.force_unlock(&args).await)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn list_locks(State(locker): LockerState) -> Json<HashMap<String, Vec<LockRequesterInfo>>> {
    Json(locker.dup_lock_map())
}

/// Serves one grant table under [`LOCK_REST_PREFIX`](crate::LOCK_REST_PREFIX).
pub fn lock_router(locker: Arc<LocalLocker>) -> Router {
    Router::new()
        .route(&route(PATH_HEALTH), get(health))
        .route(&route(PATH_LOCKS), get(list_locks))
        .route(&route(PATH_LOCK), post(lock))
        .route(&route(PATH_RLOCK), post(rlock))
        .route(&route(PATH_UNLOCK), post(unlock))
        .route(&route(PATH_RUNLOCK), post(runlock))
        .route(&route(PATH_REFRESH), post(refresh))
        .route(&route(PATH_FORCE_UNLOCK), post(force_unlock))
        .layer(TraceLayer::new_for_http())
        .with_state(locker)
}
