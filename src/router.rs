use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors, staff_middleware},
    routes,
};

/// Builds every route under `api_base_uri`. Rate limiting and CORS are
/// left to the caller since they depend on the deployment.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/user/create/", post(routes::user::create_user))
        .route("/user/token/", post(routes::user::create_token));

    let protected_routes = Router::new()
        // account
        .route(
            "/user/me/",
            get(routes::user::get_me)
                .patch(routes::user::update_me)
                .delete(routes::user::delete_me),
        )
        .route("/user/me/picture/", post(routes::user::upload_picture))
        .route("/user/me/classes/", get(routes::user::my_classes))
        // classrooms
        .route(
            "/classroom/",
            get(routes::classroom::list_classrooms).post(routes::classroom::create_classroom),
        )
        .route(
            "/classroom/{class_id}/",
            get(routes::classroom::get_classroom)
                .put(routes::classroom::replace_classroom)
                .patch(routes::classroom::update_classroom)
                .delete(routes::classroom::delete_classroom),
        )
        .route("/classroom/{class_id}/join/", post(routes::classroom::join_classroom))
        .route("/classroom/{class_id}/leave/", post(routes::classroom::leave_classroom))
        .route("/classroom/{class_id}/members/", get(routes::classroom::list_members))
        .route("/classroom/{class_id}/stats/", get(routes::classroom::my_stats))
        .route(
            "/classroom/{class_id}/questions/",
            get(routes::question::classroom_questions),
        )
        // questions
        .route(
            "/question/",
            get(routes::question::list_questions).post(routes::question::create_question),
        )
        .route(
            "/question/{id}/",
            get(routes::question::get_question)
                .patch(routes::question::update_question)
                .delete(routes::question::delete_question),
        )
        .route("/question/{id}/counter/", get(routes::question::counter_questions))
        .route(
            "/question/{id}/answers/",
            get(routes::answer::question_answers).post(routes::answer::create_answer),
        )
        .route(
            "/question/{id}/vote/",
            post(routes::vote::vote_question).delete(routes::vote::unvote_question),
        )
        // answers
        .route("/answer/", get(routes::answer::list_answers))
        .route(
            "/answer/{id}/",
            get(routes::answer::get_answer)
                .patch(routes::answer::update_answer)
                .delete(routes::answer::delete_answer),
        )
        .route(
            "/answer/{id}/vote/",
            post(routes::vote::vote_answer).delete(routes::vote::unvote_answer),
        )
        // reports
        .route(
            "/report/",
            get(routes::report::list_reports).post(routes::report::create_report),
        )
        .route("/report/{id}/", get(routes::report::get_report))
        // shop
        .route("/shop/items/", get(routes::shop::list_items))
        .route("/shop/purchase/", post(routes::shop::purchase))
        .route("/shop/transactions/", get(routes::shop::my_transactions));

    let admin_routes = Router::new()
        .route("/admin/users/", get(routes::admin::search_users))
        .route("/admin/users/{id}/", patch(routes::admin::update_user))
        .route("/admin/classrooms/", get(routes::admin::search_classrooms))
        .route("/admin/questions/", get(routes::admin::search_questions))
        .route("/admin/reports/", get(routes::admin::list_reports))
        .route("/admin/reports/{id}/", patch(routes::admin::review_report))
        .route("/admin/shop/items/", post(routes::admin::create_shop_item))
        .route(
            "/admin/shop/items/{id}/",
            patch(routes::admin::update_shop_item).delete(routes::admin::delete_shop_item),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            staff_middleware,
        ));

    // auth runs before the staff check, so it is the outer layer
    let authenticated = Router::new()
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(authenticated);

    // nesting at "/" panics in axum
    let base = state.config.api_base_uri.trim_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&format!("/{}", base), api)
    };

    router
        .layer(axum::middleware::from_fn(log_errors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
