use hishtory_data::{DeletionRequest, EncHistoryEntry, StorageAdapter, UsageKind, UsageUpdate};
use salvo::http::StatusCode;
use salvo::prelude::*;

use crate::error::AppError;
use crate::{config, engine, hoops, state};

fn required_query(req: &mut Request, name: &str) -> Result<String, AppError> {
    req.query::<String>(name).ok_or_else(|| AppError::invalid(format!("missing required query parameter `{name}`")))
}

#[handler]
pub async fn register(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let device_id = required_query(req, "device_id")?;
    let ip = hoops::client_ip(req);

    engine::registry::register(state::adapter().as_ref(), config::get().max_num_users, &user_id, &device_id, &ip).await?;

    res.status_code(StatusCode::OK);
    Ok(())
}

#[handler]
pub async fn uninstall(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let device_id = required_query(req, "device_id")?;

    engine::registry::unregister(state::adapter().as_ref(), &user_id, &device_id).await?;

    res.status_code(StatusCode::OK);
    Ok(())
}

#[handler]
pub async fn submit(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let source_device_id = required_query(req, "source_device_id")?;
    let ip = hoops::client_ip(req);
    let version = hoops::client_version(req);

    let payload = req.payload().await?;
    let entries: Vec<EncHistoryEntry> = serde_json::from_slice(payload)?;

    let adapter = state::adapter();
    let response = engine::fan_out::submit(adapter.as_ref(), &entries, &source_device_id).await?;

    if let Some(first) = entries.first() {
        let update = UsageUpdate {
            user_id: first.user_id.clone(),
            device_id: source_device_id,
            ip: Some(ip),
            version,
            kind: UsageKind::Submit { num_entries: entries.len() as i64 },
        };
        if let Err(e) = adapter.record_usage(update).await {
            tracing::warn!(error = ?e, "failed to record submit usage");
        }
    }

    res.render(Json(response));
    Ok(())
}

#[handler]
pub async fn query(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let device_id = required_query(req, "device_id")?;
    let ip = hoops::client_ip(req);
    let version = hoops::client_version(req);

    let adapter = state::adapter().clone();
    let entries = engine::retention::query(adapter.as_ref(), &user_id, &device_id).await?;

    let encrypted_ids: Vec<String> = entries.iter().map(|e| e.encrypted_id.clone()).collect();
    engine::retention::increment_read_counts_in_background(adapter.clone(), user_id.clone(), device_id.clone(), encrypted_ids);

    let update = UsageUpdate { user_id, device_id, ip: Some(ip), version, kind: UsageKind::Query };
    if let Err(e) = adapter.record_usage(update).await {
        tracing::warn!(error = ?e, "failed to record query usage");
    }

    res.render(Json(entries));
    Ok(())
}

#[handler]
pub async fn bootstrap(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let entries = engine::bootstrap::bootstrap(state::adapter().as_ref(), &user_id).await?;
    res.render(Json(entries));
    Ok(())
}

#[handler]
pub async fn get_dump_requests(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let device_id = required_query(req, "device_id")?;
    let requests = engine::dump::pending_dump_requests(state::adapter().as_ref(), &user_id, &device_id).await?;
    res.render(Json(requests));
    Ok(())
}

#[handler]
pub async fn submit_dump(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let requesting_device_id = required_query(req, "requesting_device_id")?;
    let source_device_id = required_query(req, "source_device_id")?;

    let payload = req.payload().await?;
    let entries: Vec<EncHistoryEntry> = serde_json::from_slice(payload)?;

    engine::dump::submit_dump(state::adapter().as_ref(), &entries, &user_id, &requesting_device_id, &source_device_id).await?;

    res.status_code(StatusCode::OK);
    Ok(())
}

#[handler]
pub async fn add_deletion_request(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let payload = req.payload().await?;
    let request: DeletionRequest = serde_json::from_slice(payload)?;

    engine::deletion::add_deletion_request(state::adapter().as_ref(), request).await?;

    res.status_code(StatusCode::OK);
    Ok(())
}

#[handler]
pub async fn get_deletion_requests(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let user_id = required_query(req, "user_id")?;
    let device_id = required_query(req, "device_id")?;
    let requests = engine::deletion::get_deletion_requests(state::adapter().as_ref(), &user_id, &device_id).await?;
    res.render(Json(requests));
    Ok(())
}
