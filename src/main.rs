use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sessionrook::cli::{
    Args, build_config, handle_issue_session, init_logging, load_secret_key, open_database,
    validate_base_url,
};
use sessionrook::clock::SystemClock;
use sessionrook::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(secret_key) = load_secret_key(args.secret_key_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(base_url) = validate_base_url(&args.base_url) else {
        std::process::exit(1);
    };

    let Some(session) = args.session_config() else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(
        db,
        base_url,
        secret_key,
        session,
        Duration::from_secs(args.cookie_max_age),
        args.ip_header,
    );
    let engine = config.session_engine(Arc::new(SystemClock));

    if let Some(user_id) = args.issue_session {
        handle_issue_session(&engine, user_id).await;
    }

    init_cleanup(&engine).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(_) => info!(address = %addr, "Listening"),
    }

    if let Err(e) = run_server(engine, config.cookie_settings(), config.ip_header, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
