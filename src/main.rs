use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use razorpay_reconcile::application::notifier::LifecycleNotifier;
use razorpay_reconcile::application::reconciler::Reconciler;
use razorpay_reconcile::application::scheduler::SweepScheduler;
use razorpay_reconcile::config::{self, AppConfig, EnvSettings};
use razorpay_reconcile::domain::payment::PAYMENT_DOCTYPE;
use razorpay_reconcile::domain::ports::{PaymentRecordStoreBox, SettingsProvider};
use razorpay_reconcile::error::ReconcileError;
use razorpay_reconcile::infrastructure::handlers::LoggingAuthorizedHandler;
use razorpay_reconcile::infrastructure::in_memory::InMemoryPaymentStore;
use razorpay_reconcile::infrastructure::incident_log::TracingIncidentLog;
use razorpay_reconcile::infrastructure::razorpay::RazorpayClient;
use razorpay_reconcile::interfaces::csv::payment_reader::PaymentReader;
use razorpay_reconcile::interfaces::csv::record_writer::RecordWriter;
use razorpay_reconcile::telemetry;
use serde_json::Value;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Use stored sandbox responses instead of calling the gateway where available.
    #[arg(long, global = true)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored payment records
    Records,
    #[command(flatten)]
    Gateway(GatewayCommand),
}

/// Commands that talk to the gateway and need credentials.
#[derive(Subcommand)]
enum GatewayCommand {
    /// Register payment requests from a CSV file and confirm each with the gateway
    Import { input: PathBuf },
    /// Confirm one stored payment with the gateway
    Confirm { payment_id: String },
    /// Confirm every payment still in Created
    Authorize,
    /// Capture authorized payments
    Capture {
        /// Only capture this payment
        #[arg(long)]
        payment_id: Option<String>,
        /// JSON file standing in for the gateway's capture response (with --sandbox)
        #[arg(long)]
        sandbox_response: Option<PathBuf>,
    },
    /// Insert payments authorized at the gateway but missing locally
    Recover,
    /// Run recover, authorize and capture periodically until interrupted
    Run {
        /// Seconds between cycles (defaults to RECONCILE_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<u64>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let (store, view) = open_store(cli.db_path.as_deref())?;

    let command = match cli.command {
        Command::Records => return print_records(&view).await,
        Command::Gateway(command) => command,
    };

    let app_config = config::load().into_diagnostic()?;
    let settings = EnvSettings.gateway_settings().into_diagnostic()?;
    let sandbox = cli.sandbox || settings.sandbox;
    let credentials = &settings.credentials;
    let reconciler = build_reconciler(&app_config, store)?;

    match command {
        GatewayCommand::Import { input } => {
            let file = File::open(input).into_diagnostic()?;
            for row in PaymentReader::new(file).payments() {
                let record = match row.and_then(|row| row.into_record(sandbox)) {
                    Ok(record) => record,
                    Err(e) => {
                        eprintln!("Error reading payment: {}", e);
                        continue;
                    }
                };
                if let Err(e) = reconciler.create_payment(record, credentials).await {
                    eprintln!("Error importing payment: {}", e);
                }
            }
        }
        GatewayCommand::Confirm { payment_id } => {
            let mut record = view
                .get(&payment_id)
                .await
                .into_diagnostic()?
                .ok_or(ReconcileError::RecordNotFound(payment_id))
                .into_diagnostic()?;
            record.flags.is_sandbox = sandbox;
            reconciler
                .on_record_saved(&mut record, &settings)
                .await
                .into_diagnostic()?;
        }
        GatewayCommand::Authorize => {
            reconciler
                .authorize_batch(credentials)
                .await
                .into_diagnostic()?;
        }
        GatewayCommand::Capture {
            payment_id,
            sandbox_response,
        } => {
            let canned = sandbox_response
                .map(|path| read_json(&path))
                .transpose()?;
            reconciler
                .capture(payment_id.as_deref(), credentials, sandbox, canned.as_ref())
                .await
                .into_diagnostic()?;
        }
        GatewayCommand::Recover => {
            reconciler
                .recover_missing(credentials)
                .await
                .into_diagnostic()?;
        }
        GatewayCommand::Run { interval, once } => {
            let period = interval
                .map(Duration::from_secs)
                .unwrap_or(app_config.sweep_interval);
            let scheduler = SweepScheduler::new(Arc::new(reconciler), Arc::new(EnvSettings), period);
            if once {
                scheduler.run_cycle().await.into_diagnostic()?;
            } else {
                scheduler
                    .run_until(async {
                        let _ = tokio::signal::ctrl_c().await;
                    })
                    .await;
            }
            return Ok(());
        }
    }

    print_records(&view).await
}

/// Opens the record store twice over shared state: one handle for the engine,
/// one for reading back the final table.
fn open_store(db_path: Option<&Path>) -> Result<(PaymentRecordStoreBox, PaymentRecordStoreBox)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        use razorpay_reconcile::infrastructure::rocksdb::RocksDBStore;

        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok((Box::new(store.clone()), Box::new(store)));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    let store = InMemoryPaymentStore::new();
    Ok((Box::new(store.clone()), Box::new(store)))
}

fn build_reconciler(app_config: &AppConfig, store: PaymentRecordStoreBox) -> Result<Reconciler> {
    let gateway = RazorpayClient::new(&app_config.gateway.api_base, app_config.gateway.timeout)
        .into_diagnostic()?;
    let notifier = LifecycleNotifier::new()
        .with_handler(PAYMENT_DOCTYPE, Arc::new(LoggingAuthorizedHandler))
        .with_fallback(Arc::new(LoggingAuthorizedHandler));

    Ok(Reconciler::new(
        store,
        Box::new(gateway),
        notifier,
        Box::new(TracingIncidentLog),
    ))
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).into_diagnostic()?;
    serde_json::from_reader(file).into_diagnostic()
}

async fn print_records(view: &PaymentRecordStoreBox) -> Result<()> {
    let records = view.get_all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_records(records).into_diagnostic()?;
    Ok(())
}
