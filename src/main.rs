use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use leasewatch::audit::{AuditRecorder, DbAuditRecorder, TracingAuditRecorder};
use leasewatch::db::{SeaOrmLeaseStore, schema::ensure_schema};
use leasewatch::expiry::{
    DispatchSettings, ExpiryCheckService, ExpiryCheckSettings, RenewalRequest, RenewalTarget,
};
use leasewatch::notifications::senders::{MailSender, http_mail::HttpMailSender, log::LogMailSender};
use leasewatch::server::config::{AuditSink, ServerConfig};
use leasewatch::version::VERSION;
use leasewatch::web::create_axum_router;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP entry point (default)
    Serve,
    /// Run one expiry check and print the summary
    RunOnce,
    /// Classify active leases without sending anything
    Scan,
    /// Renew a lease by a number of months or to an explicit date
    Renew {
        #[arg(long)]
        lease_id: i32,
        #[arg(long, conflicts_with = "date", required_unless_present = "date")]
        months: Option<u32>,
        /// RFC 3339 timestamp, e.g. 2026-01-31T00:00:00Z
        #[arg(long)]
        date: Option<DateTime<Utc>>,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "leasewatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn connect(config: &ServerConfig) -> Result<DatabaseConnection, BoxError> {
    let mut opt = ConnectOptions::new(config.database_url.to_owned());
    opt.max_connections(10).sqlx_logging(false);
    let db = Database::connect(opt).await?;
    ensure_schema(&db).await?;
    Ok(db)
}

fn build_mailer(config: &ServerConfig) -> Result<Arc<dyn MailSender>, BoxError> {
    match config.mail_provider_url.as_deref() {
        Some(url) => {
            let api_key = config.mail_api_key.as_deref().unwrap_or_default();
            Ok(Arc::new(HttpMailSender::new(url, api_key, &config.mail_from)?))
        }
        None => {
            warn!("No mail provider configured; notifications will only be logged.");
            Ok(Arc::new(LogMailSender))
        }
    }
}

fn build_service(config: &ServerConfig, db: DatabaseConnection) -> Result<ExpiryCheckService, BoxError> {
    let audit: Arc<dyn AuditRecorder> = match config.audit_sink {
        AuditSink::Database => Arc::new(DbAuditRecorder::new(db.clone())),
        AuditSink::Log => Arc::new(TracingAuditRecorder),
    };
    let settings = ExpiryCheckSettings {
        dispatch: DispatchSettings {
            thresholds: config.thresholds(),
            default_renewal_months: config.default_renewal_months,
            app_url: config.app_url.clone(),
            admin_emails: config.admin_emails.clone(),
            concurrency: config.dispatch_concurrency,
            max_attempts: config.max_attempts,
        },
        pending_timeout: Duration::minutes(config.pending_timeout_minutes),
    };
    let service = ExpiryCheckService::new(
        Arc::new(SeaOrmLeaseStore::new(db)),
        build_mailer(config)?,
        audit,
        settings,
    )?;
    Ok(service)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = Arc::new(ServerConfig::load(args.config.as_deref())?);
    init_logging(&config.log_dir);
    info!("Starting leasewatch, version: {}", VERSION);

    let db = connect(&config).await.inspect_err(|e| {
        error!(error = %e, "Failed to connect to the lease database.");
    })?;
    let service = Arc::new(build_service(&config, db)?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let app = create_axum_router(service, config.clone());
            let listener = TcpListener::bind(&config.listen_addr).await?;
            info!(addr = %config.listen_addr, "HTTP server listening.");
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(Box::new)?;
        }
        Command::RunOnce => {
            let summary = service.run(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Scan => {
            let scanned = service.preview(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&scanned)?);
        }
        Command::Renew {
            lease_id,
            months,
            date,
            actor,
        } => {
            let target = match (months, date) {
                (Some(months), _) => RenewalTarget::Period(months),
                (None, Some(date)) => RenewalTarget::Date(date),
                (None, None) => return Err("either --months or --date is required".into()),
            };
            let event = service
                .renew(
                    RenewalRequest {
                        lease_id,
                        target,
                        actor,
                    },
                    Utc::now(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
    }

    Ok(())
}
