use billing_reconciler::application::engine::{CycleOutcome, EngineConfig, ReconcileEngine};
use billing_reconciler::application::retrier::RetryPolicy;
use billing_reconciler::domain::purchase::ProductClass;
use billing_reconciler::error::{GatewayError, ResponseCode};
use billing_reconciler::infrastructure::in_memory::InMemoryGateway;
use billing_reconciler::interfaces::csv::purchase_reader::PurchaseReader;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario CSV seeding the simulated billing backend
    /// (columns: order_id, token, state, acknowledged, product)
    input: PathBuf,

    /// Script this many acknowledgement failures per unacknowledged purchase
    #[arg(long, default_value_t = 0)]
    fail_acks: u32,

    /// Make the backend reject the connection attempt
    #[arg(long)]
    fail_connect: bool,

    /// Base retry interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    base_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let gateway = Arc::new(InMemoryGateway::new());

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = PurchaseReader::new(file);
    for row in reader.purchases() {
        match row {
            Ok(purchase) => {
                if cli.fail_acks > 0 && purchase.needs_acknowledgement() {
                    gateway
                        .fail_acknowledgements(purchase.token.as_str(), cli.fail_acks)
                        .await;
                }
                gateway.seed_purchase(purchase).await;
            }
            Err(e) => error!(error = %e, "failed to read purchase row"),
        }
    }
    if cli.fail_connect {
        gateway
            .fail_connect(GatewayError::new(
                ResponseCode::BillingUnavailable,
                "scripted connect failure",
            ))
            .await;
    }

    let config = EngineConfig {
        product: ProductClass::Subscription,
        retry: RetryPolicy {
            base_interval: Duration::from_millis(cli.base_delay_ms),
            ..RetryPolicy::default()
        },
    };
    let engine = ReconcileEngine::new(gateway, config);

    let outcome = engine.check_payment_status().await;
    engine.cleanup().await;

    // Scenario failures are cycle outcomes, not process errors.
    match outcome {
        CycleOutcome::ConnectFailed(err) => println!("cycle failed: connect: {err}"),
        CycleOutcome::QueryFailed(err) => println!("cycle failed: query: {err}"),
        CycleOutcome::Completed(report) => {
            let abandoned: Vec<&str> = report.abandoned.iter().map(|(id, _)| id.as_str()).collect();
            println!("confirmed: {:?}", report.confirmed);
            println!("abandoned: {abandoned:?}");
            println!("already acknowledged: {:?}", report.already_acknowledged);
            println!("pending: {:?}", report.pending);
        }
    }

    Ok(())
}
