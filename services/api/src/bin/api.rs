//! services/api/src/bin/api.rs

use academy_core::ports::SheetStore;
use api_lib::{
    adapters::{
        AcademyFile, DbAdapter, DisabledSheet, FacebookAdapter, GoogleSheetsAdapter, GroqTextAdapter, ImgbbAdapter,
        RssHeadlines, ServiceAccountAuth, ServiceAccountKey,
    },
    config::Config,
    error::ApiError,
    web::{
        build_router,
        middleware::{ADMIN_TOKEN_HEADER, CRON_SECRET_HEADER},
        rest::ApiDoc,
        state::{AppState, Ports},
    },
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let sheet: Arc<dyn SheetStore> = match (&config.google_sheet_id, &config.google_service_account_json) {
        (Some(sheet_id), Some(key_json)) => {
            let key = ServiceAccountKey::from_json(key_json)
                .map_err(|e| ApiError::Internal(format!("Invalid Google service account JSON: {}", e)))?;
            let auth = Arc::new(ServiceAccountAuth::new(key, http.clone()));
            info!(account = auth.client_email(), worksheet = %config.google_sheet_worksheet, "Google Sheet queue enabled");
            Arc::new(GoogleSheetsAdapter::new(
                http.clone(),
                auth,
                sheet_id.clone(),
                config.google_sheet_worksheet.clone(),
            ))
        }
        _ => {
            warn!("GOOGLE_SHEET_ID or the service account is missing; the queue is disabled");
            Arc::new(DisabledSheet)
        }
    };

    let llm = Arc::new(GroqTextAdapter::new(
        config.groq_api_key.clone(),
        &config.groq_api_base,
        config.text_model.clone(),
    ));
    if !llm.is_configured() {
        warn!("GROQ_API_KEY_4 is missing; replies fall back to the contact details");
    }

    let facebook = Arc::new(FacebookAdapter::new(
        http.clone(),
        &config.graph_api_version,
        config.page_access_token.clone(),
        config.whatsapp_token.clone(),
    ));
    if !facebook.is_configured() {
        warn!("PAGE_ACCESS_TOKEN is missing; publishing and replies will fail");
    }

    let images = Arc::new(ImgbbAdapter::new(http.clone(), config.imgbb_api_key.clone()));
    let headlines = Arc::new(RssHeadlines::new(http.clone()));

    let academy_file = AcademyFile::new(config.academy_data_path.clone());
    let academy = academy_file.load().await;

    let telegram = config.telegram_bot_token.clone().map(Bot::new);

    // --- 4. Build the Shared AppState ---
    let ports = Ports {
        sheet,
        llm,
        page: facebook.clone(),
        replies: facebook,
        headlines,
        subscriptions: db_adapter,
        images,
    };
    let app_state = Arc::new(AppState::new(config.clone(), ports, academy, academy_file, telegram));
    info!(integrations = ?app_state.integrations, "Service adapters initialized.");

    // --- 5. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
            HeaderName::from_static(CRON_SECRET_HEADER),
        ]);

    let app = build_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received.");
            }
        })
        .await?;

    Ok(())
}
