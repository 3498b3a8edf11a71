use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payroute::application::engine::PaymentEngine;
use payroute::application::scheduler::SweepOutcome;
use payroute::config::AppConfig;
use payroute::error::PaymentError;
use payroute::interfaces::csv::charge_reader::ChargeReader;
use payroute::interfaces::csv::receipt_writer::ReceiptWriter;
use payroute::interfaces::csv::subscription_reader::SubscriptionReader;
use secrecy::SecretString;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input charges CSV file (amount,currency,source,email)
    input: PathBuf,

    /// Subscriptions CSV file (donor_id,amount,currency,interval,description)
    #[arg(long)]
    subscriptions: Option<PathBuf>,

    /// Run one recurrence sweep after loading subscriptions
    #[arg(long)]
    sweep: bool,

    /// Keep the recurrence timer running until Ctrl-C
    #[arg(long)]
    watch: bool,

    /// JSON configuration file. Flags below override its values.
    #[arg(long, env = "PAYROUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Generate explanations with the live API
    #[arg(long, env = "PAYROUTE_EXPLANATIONS")]
    explanations: bool,

    #[arg(long, env = "PAYROUTE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "PAYROUTE_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "PAYROUTE_MODEL")]
    model: Option<String>,

    #[arg(long, env = "PAYROUTE_CACHE_TTL_SECS")]
    cache_ttl_secs: Option<u64>,

    #[arg(long, env = "PAYROUTE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, env = "PAYROUTE_BLOCKING_THRESHOLD")]
    blocking_threshold: Option<f64>,

    #[arg(long, env = "PAYROUTE_STRIPE_THRESHOLD")]
    stripe_threshold: Option<f64>,

    #[arg(long, env = "PAYROUTE_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    #[arg(long, env = "PAYROUTE_SUCCESS_PROBABILITY")]
    success_probability: Option<f64>,
}

impl Cli {
    fn app_config(&self) -> payroute::error::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_json_file(path)?,
            None => AppConfig::default(),
        };

        if self.explanations {
            config.explanation.enabled = true;
        }
        if let Some(key) = &self.api_key {
            config.explanation.api_key = Some(SecretString::from(key.clone()));
        }
        if let Some(url) = &self.api_url {
            config.explanation.api_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.explanation.model = model.clone();
        }
        if let Some(ttl) = self.cache_ttl_secs {
            config.explanation.cache_ttl_secs = ttl;
        }
        if let Some(timeout) = self.timeout_secs {
            config.explanation.timeout_secs = timeout;
        }
        if let Some(threshold) = self.blocking_threshold {
            config.rules.blocking_threshold = threshold;
        }
        if let Some(threshold) = self.stripe_threshold {
            config.rules.stripe_threshold = threshold;
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.scheduler.sweep_interval_secs = secs;
        }
        if let Some(p) = self.success_probability {
            config.scheduler.success_probability = p;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let config = cli.app_config().into_diagnostic()?;
    let sweep_interval = config.scheduler.sweep_interval();
    let engine = PaymentEngine::from_config(config).into_diagnostic()?;

    // Process charges
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = ChargeReader::new(file);
    let stdout = io::stdout();
    let mut writer = ReceiptWriter::new(stdout.lock());
    for charge in reader.charges() {
        match charge {
            Ok(request) => match engine.process_charge(request).await {
                Ok(receipt) => writer.write_receipt(&receipt).into_diagnostic()?,
                Err(e) => eprintln!("Error processing charge: {}", e),
            },
            Err(e) => eprintln!("Error reading charge: {}", e),
        }
    }
    writer.flush().into_diagnostic()?;
    drop(writer);

    if let Some(path) = &cli.subscriptions {
        let file = File::open(path).into_diagnostic()?;
        for request in SubscriptionReader::new(file).subscriptions() {
            match request {
                Ok(request) => match engine.create_subscription(request).await {
                    Ok(_) => {}
                    Err(PaymentError::SubscriptionConflict { donor_id }) => {
                        eprintln!("Skipping subscription: donor {donor_id} already has an active subscription");
                    }
                    Err(e) => eprintln!("Error creating subscription: {}", e),
                },
                Err(e) => eprintln!("Error reading subscription: {}", e),
            }
        }
    }

    if cli.sweep {
        match engine.trigger_recurrence_sweep().await.into_diagnostic()? {
            SweepOutcome::Completed(report) => info!(?report, "Manual sweep finished"),
            SweepOutcome::Skipped => warn!("Manual sweep skipped, another sweep is running"),
        }
    }

    if cli.watch {
        let handle = engine.start_scheduler(sweep_interval).into_diagnostic()?;
        info!(period_secs = sweep_interval.as_secs(), "Recurrence timer running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await.into_diagnostic()?;
        handle.shutdown().await;
        info!("Recurrence timer stopped");
    }

    let ledger = engine.transaction_stats().await.into_diagnostic()?;
    info!(
        total = ledger.total_transactions,
        successful = ledger.successful,
        blocked = ledger.blocked,
        average_risk_score = ledger.average_risk_score,
        "Ledger summary"
    );
    let subscriptions = engine.subscription_stats().await.into_diagnostic()?;
    info!(
        active = subscriptions.active,
        cancelled = subscriptions.cancelled,
        mrr = %subscriptions.monthly_recurring_revenue,
        "Subscription summary"
    );

    Ok(())
}
