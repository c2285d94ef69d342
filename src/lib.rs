use crate::cli::Args;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use axum_keycloak_auth::PassthroughMode;
use axum_keycloak_auth::instance::{KeycloakAuthInstance, KeycloakConfig};
use axum_keycloak_auth::layer::KeycloakAuthLayer;
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use tracing::log::info;

pub mod cli;
pub mod grading;
pub mod model;
pub mod payloads;
pub mod response;
pub mod schema;

mod api;
mod errors;

pub fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Initializing Keycloak authentication layer...");
    let keycloak_layer =
        init_protection_layer(args).context("Failed to initialize Keycloak layer")?;

    info!("Initializing router...");
    Ok(init_router_internal(pool, keycloak_layer))
}

pub fn init_test_router(pool: Pool) -> Router {
    let instructor_api = instructor_routes();
    let student_api = student_routes();

    Router::new()
        .nest("/instructor", instructor_api)
        .nest("/student", student_api)
        .with_state(pool)
}

fn init_router_internal(pool: Pool, keycloak_layer: KeycloakAuthLayer<String>) -> Router {
    let instructor_api = instructor_routes().layer(keycloak_layer.clone());
    let student_api = student_routes().layer(keycloak_layer.clone());

    Router::new()
        .nest("/instructor", instructor_api)
        .nest("/student", student_api)
        .with_state(pool)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_protection_layer(args: &Args) -> anyhow::Result<KeycloakAuthLayer<String>> {
    let config = KeycloakConfig::builder()
        .server(args.keycloak_server_url.clone())
        .realm(args.keycloak_realm.clone())
        .build();

    let instance = KeycloakAuthInstance::new(config);

    let layer = KeycloakAuthLayer::builder()
        .instance(instance)
        .passthrough_mode(PassthroughMode::Block)
        .persist_raw_claims(false)
        .expected_audiences(vec![args.keycloak_audiences.clone()])
        .build();

    Ok(layer)
}

fn instructor_routes() -> Router<Pool> {
    Router::new()
        // protected routes go here
        .route("/create_course", post(api::instructor::create_course))
        .route(
            "/provision_catalog",
            post(api::instructor::provision_catalog),
        )
        .route(
            "/set_item_due_date",
            post(api::instructor::set_item_due_date),
        )
        .route("/create_student", post(api::instructor::create_student))
        .route(
            "/record_attendance",
            post(api::instructor::record_attendance),
        )
        .route("/grade_submission", post(api::instructor::grade_submission))
        .route(
            "/recalculate_final_grade",
            post(api::instructor::recalculate_final_grade),
        )
        .route(
            "/get_student_grade_report",
            get(api::instructor::get_student_grade_report),
        )
        .route(
            "/get_course_gradebook",
            get(api::instructor::get_course_gradebook),
        )
    // public routes go here
}

fn student_routes() -> Router<Pool> {
    Router::new()
        // protected routes go here
        .route("/enroll", post(api::student::enroll))
        .route("/drop_course", post(api::student::drop_course))
        .route("/submit", post(api::student::submit))
        .route("/get_submission", get(api::student::get_submission))
        .route("/get_grade_items", get(api::student::get_grade_items))
        .route("/get_grade_report", get(api::student::get_grade_report))
    // public routes go here
}
