mod misc;
mod sync;
mod test_only;

use salvo::prelude::*;

use crate::hoops;

pub fn router(test_mode: bool) -> Router {
    let mut api = Router::with_path("api/v1")
        .push(Router::with_path("register").get(sync::register))
        .push(Router::with_path("submit").post(sync::submit))
        .push(Router::with_path("query").get(sync::query))
        .push(Router::with_path("bootstrap").get(sync::bootstrap))
        .push(Router::with_path("get-dump-requests").get(sync::get_dump_requests))
        .push(Router::with_path("submit-dump").post(sync::submit_dump))
        .push(Router::with_path("add-deletion-request").post(sync::add_deletion_request))
        .push(Router::with_path("get-deletion-requests").get(sync::get_deletion_requests))
        .push(Router::with_path("uninstall").post(sync::uninstall))
        .push(Router::with_path("banner").get(misc::banner))
        .push(Router::with_path("download").get(misc::download))
        .push(Router::with_path("feedback").post(misc::feedback))
        .push(Router::with_path("trigger-cron").post(misc::trigger_cron));

    if test_mode {
        api = api
            .push(Router::with_path("wipe-db-entries").get(test_only::wipe_db_entries).post(test_only::wipe_db_entries))
            .push(Router::with_path("get-num-connections").get(test_only::get_num_connections));
    }

    Router::new()
        .hoop(hoops::ensure_accept)
        .push(Router::with_path("healthcheck").get(misc::healthcheck))
        .push(api)
}
