use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use log::info;

use crate::core::{AppConfig, AppError, Storage, TtlCache};
use crate::ledger::{
    AccountService, AttendanceBook, Mailer, PasswordRecovery, PayrollEngine, SupervisorAdmin,
    WorkerRoster,
};
use crate::web::handlers;

/// Shared application state for web handlers
pub struct AppState {
    pub config: AppConfig,
    pub accounts: AccountService,
    pub recovery: PasswordRecovery,
    pub supervisors: SupervisorAdmin,
    pub workers: WorkerRoster,
    pub attendance: AttendanceBook,
    pub payroll: PayrollEngine,
}

impl AppState {
    /// Wire every ledger service onto one database and cache
    pub fn new(
        config: AppConfig,
        storage: Arc<Storage>,
        cache: Arc<TtlCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let offset = config.workday_offset();

        Self {
            accounts: AccountService::new(storage.clone(), cache.clone(), config.session_ttl_days),
            recovery: PasswordRecovery::new(storage.clone(), cache.clone(), mailer),
            supervisors: SupervisorAdmin::new(storage.clone()),
            workers: WorkerRoster::new(storage.clone(), cache.clone(), offset),
            attendance: AttendanceBook::new(storage.clone(), cache.clone(), offset),
            payroll: PayrollEngine::new(
                storage,
                cache,
                config.pay_policy(),
                Duration::from_secs(config.payroll_cache_ttl_secs),
                offset,
            ),
            config,
        }
    }
}

/// Liveness banner
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().body("LaborLedger server is running ...")
}

/// JSON 404 for unknown routes
pub async fn not_found() -> Result<HttpResponse, AppError> {
    Err(AppError::not_found("route not found"))
}

/// Register the API routes and extractor settings
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::bad_request(err.to_string()).into()),
    )
    .route("/", web::get().to(index))
    .service(
        web::scope("/api/auth")
            .route("/user", web::get().to(handlers::auth::get_user))
            .route("/login", web::post().to(handlers::auth::login))
            .route("/logout", web::get().to(handlers::auth::logout))
            .route("/forgetPass", web::post().to(handlers::auth::forget_pass))
            .route("/verifyPass", web::post().to(handlers::auth::verify_pass))
            .route("/resetPass", web::patch().to(handlers::auth::reset_pass))
            .route("/resendOtp", web::post().to(handlers::auth::resend_otp)),
    )
    .service(
        web::scope("/api/admin")
            .route("/supervisors", web::get().to(handlers::admin::get_supervisors))
            .route("/add-supervisor", web::post().to(handlers::admin::add_supervisor))
            .route("/edit-supervisor", web::patch().to(handlers::admin::edit_supervisor))
            .route(
                "/delete-supervisor/{supervisorId}",
                web::delete().to(handlers::admin::delete_supervisor),
            ),
    )
    .service(
        web::scope("/api/supervisor")
            // Roster
            .route("/add-worker", web::post().to(handlers::supervisor::add_worker))
            .route("/edit-worker/{workerId}", web::patch().to(handlers::supervisor::edit_worker))
            .route("/delete-worker", web::delete().to(handlers::supervisor::delete_worker))
            .route("/all-workers", web::get().to(handlers::supervisor::all_workers))
            // Attendance
            .route("/checkIn-worker", web::post().to(handlers::supervisor::check_in_worker))
            .route("/checkOut-worker", web::patch().to(handlers::supervisor::check_out_worker))
            .route("/leaveStart-worker", web::patch().to(handlers::supervisor::leave_start_worker))
            .route("/leaveEnd-worker", web::patch().to(handlers::supervisor::leave_end_worker))
            .route("/attendance/{workerId}", web::get().to(handlers::supervisor::attendance))
            // Payroll
            .route("/worker-detail", web::post().to(handlers::supervisor::worker_detail))
            .route("/pay-worker", web::post().to(handlers::supervisor::pay_worker))
            .route("/payments/{workerId}", web::get().to(handlers::supervisor::payments)),
    );
}

/// Start the HTTP server and run until it is stopped
pub async fn start_web_server(state: web::Data<AppState>) -> std::io::Result<()> {
    let address = (state.config.host.clone(), state.config.port);
    info!("Starting web server on http://{}:{}", address.0, address.1);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure_routes)
            .default_service(web::to(not_found))
    })
    .bind(address)?
    .run()
    .await
}
