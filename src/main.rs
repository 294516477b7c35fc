use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Data;
use chrono::Utc;

mod core;
mod ledger;
mod web;

use crate::core::{AppConfig, Storage, TtlCache};
use crate::ledger::LogMailer;
use crate::web::server::{start_web_server, AppState};

/// How often expired cache entries are swept
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting LaborLedger...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let storage = match Storage::open(&config.database_path) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Failed to open database {}: {}", config.database_path, e);
            std::process::exit(1);
        }
    };
    let cache = Arc::new(TtlCache::new());

    // Sweep expired rate-limit counters, reset codes and payroll summaries
    let sweeper = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.purge_expired();
        }
    });

    let state = AppState::new(config, storage, cache, Arc::new(LogMailer));

    if let Some(seed) = &state.config.admin {
        match state.accounts.ensure_admin(seed, Utc::now()) {
            Ok(true) => info!("Bootstrap admin {} created", seed.email),
            Ok(false) => {}
            Err(e) => {
                error!("Failed to create bootstrap admin: {}", e);
                std::process::exit(1);
            }
        }
    }

    info!("LaborLedger is now running. Press Ctrl+C to stop.");

    // The actix server future is !Send, so it runs on this task
    tokio::select! {
        result = start_web_server(Data::new(state)) => {
            if let Err(e) = result {
                error!("Web server error: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutting down LaborLedger...");
        }
    }

    info!("LaborLedger shutdown complete");
}
