use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/submissions", submission_routes(config))
        .nest("/identity", identity_routes())
}

fn submission_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::submission::create_submission))
        .layer(handlers::submission::submission_upload_body_limit(config));

    OpenApiRouter::new()
        .routes(routes!(
            handlers::submission::list_submissions,
            handlers::submission::delete_submissions
        ))
        .routes(routes!(handlers::submission::stream_submissions))
        .routes(routes!(handlers::submission::get_submission))
        .routes(routes!(handlers::submission::download_archive))
        .merge(upload)
}

fn identity_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::identity::before_user_created))
}
