use chrono::{DateTime, TimeZone, Utc};
use payroute::application::engine::{EngineParts, PaymentEngine};
use payroute::application::explanation::ExplanationService;
use payroute::domain::risk::FraudRules;
use payroute::infrastructure::clock::ManualClock;
use payroute::infrastructure::offline::OfflineGenerator;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[allow(dead_code)]
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

/// Engine with offline explanations and a manual clock.
#[allow(dead_code)]
pub fn engine_with_clock(success_probability: f64) -> (PaymentEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let explanations = ExplanationService::new(
        Box::new(OfflineGenerator),
        Duration::from_secs(3600),
        Duration::from_secs(1),
    );
    let parts = EngineParts {
        clock: clock.clone(),
        ..EngineParts::default()
    };
    let engine =
        PaymentEngine::new(FraudRules::default(), explanations, success_probability, parts).unwrap();
    (engine, clock)
}

#[allow(dead_code)]
pub fn write_charges(path: &Path, rows: &[[&str; 4]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["amount", "currency", "source", "email"])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[allow(dead_code)]
pub fn write_subscriptions(path: &Path, rows: &[[&str; 5]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["donor_id", "amount", "currency", "interval", "description"])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
