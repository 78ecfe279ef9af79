//! Handlers mounted only when `HISHTORY_TEST=1`. These exist so the
//! hishtory client's own test suite can reset and inspect coordinator state
//! between runs; never wired up in a production deployment.

use hishtory_data::StorageAdapter;
use salvo::prelude::*;

use crate::error::AppError;
use crate::state;

#[handler]
pub async fn wipe_db_entries(res: &mut Response) -> Result<(), AppError> {
    state::adapter().wipe_entries().await?;
    res.status_code(StatusCode::OK);
    Ok(())
}

#[handler]
pub async fn get_num_connections(res: &mut Response) -> Result<(), AppError> {
    let n = state::adapter().num_connections().await?;
    res.render(Json(n));
    Ok(())
}
