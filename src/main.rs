use clap::Parser;
use miette::{IntoDiagnostic, Result};
use resvpay::application::orchestrator::{PaymentOrchestrator, ReversalPolicy};
use resvpay::domain::money::Amount;
use resvpay::domain::payment::GatewayTxnId;
use resvpay::domain::ports::PaymentStore;
use resvpay::domain::reservation::{Reservation, ReservationId, ReservationStatus, UserId};
use resvpay::infrastructure::gateway::{GatewayConfig, SimulatedGateway};
use resvpay::infrastructure::in_memory::InMemoryLedger;
use resvpay::interfaces::csv::command_reader::{Command, CommandReader, CommandType};
use resvpay::interfaces::csv::summary_writer::{ReservationSummary, SummaryWriter};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Replays a payment command file against the orchestrator and prints the
/// final reservation/payment state.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Emit the summary as JSON instead of CSV
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let ledger = InMemoryLedger::new();
    let orchestrator = PaymentOrchestrator::new(
        Box::new(ledger.clone()),
        Box::new(ledger.clone()),
        Box::new(SimulatedGateway::new(GatewayConfig::default())),
        ReversalPolicy::default(),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for result in reader.commands() {
        match result {
            Ok(command) => {
                if let Err(e) = run_command(&orchestrator, &ledger, &command).await {
                    warn!(reservation = command.reservation, "command failed: {e}");
                }
            }
            Err(e) => warn!("skipping malformed command: {e}"),
        }
    }

    let summaries = collect_summaries(&ledger).await?;
    let stdout = io::stdout();
    if cli.json {
        let rendered = serde_json::to_string_pretty(&summaries).into_diagnostic()?;
        println!("{rendered}");
    } else {
        let mut writer = SummaryWriter::new(stdout.lock());
        writer.write_summaries(summaries).into_diagnostic()?;
    }

    Ok(())
}

async fn run_command(
    orchestrator: &PaymentOrchestrator,
    ledger: &InMemoryLedger,
    command: &Command,
) -> resvpay::error::Result<()> {
    let reservation = ReservationId(command.reservation);
    let user = UserId(command.user);
    match command.r#type {
        CommandType::Book => {
            ledger
                .insert_reservation(Reservation {
                    id: reservation,
                    owner: user,
                    status: ReservationStatus::PendingPayment,
                    scheduled_at: chrono::Utc::now()
                        + chrono::Duration::hours(command.hours.unwrap_or(48)),
                })
                .await;
        }
        CommandType::Initiate => {
            let amount = required_amount(command)?;
            orchestrator.initiate(user, reservation, amount).await?;
        }
        CommandType::Confirm => {
            let txn = dispatched_txn(ledger, reservation).await?;
            orchestrator.confirm(user, &txn, "sim-token").await?;
        }
        CommandType::Reverse => {
            let txn = dispatched_txn(ledger, reservation).await?;
            let amount = match command.amount {
                Some(value) => Amount::new(value)?,
                None => {
                    // Default to a full refund of the latest attempt.
                    ledger
                        .latest_for_reservation(reservation)
                        .await?
                        .map(|r| r.amount)
                        .ok_or_else(|| {
                            resvpay::error::PaymentError::Storage(format!(
                                "no payment to reverse for reservation {reservation}"
                            ))
                        })?
                }
            };
            orchestrator.reverse(user, &txn, amount).await?;
        }
        CommandType::Abandon => {
            let txn = dispatched_txn(ledger, reservation).await?;
            orchestrator.abandon(user, &txn).await?;
        }
    }
    Ok(())
}

fn required_amount(command: &Command) -> resvpay::error::Result<Amount> {
    let value = command.amount.ok_or_else(|| {
        resvpay::error::PaymentError::from(resvpay::error::PreconditionError::InvalidAmount(
            format!("missing amount for reservation {}", command.reservation),
        ))
    })?;
    Amount::new(value)
}

async fn dispatched_txn(
    ledger: &InMemoryLedger,
    reservation: ReservationId,
) -> resvpay::error::Result<GatewayTxnId> {
    ledger
        .latest_for_reservation(reservation)
        .await?
        .and_then(|record| record.gateway_txn)
        .ok_or_else(|| {
            resvpay::error::PaymentError::Storage(format!(
                "no gateway transaction for reservation {reservation}"
            ))
        })
}

async fn collect_summaries(ledger: &InMemoryLedger) -> Result<Vec<ReservationSummary>> {
    let mut summaries = Vec::new();
    for reservation in ledger.reservations().await {
        let latest = ledger
            .latest_for_reservation(reservation.id)
            .await
            .into_diagnostic()?;
        summaries.push(ReservationSummary {
            reservation: reservation.id.0,
            reservation_status: reservation.status,
            payment_status: latest.as_ref().map(|r| r.status),
            amount: latest.as_ref().map(|r| r.amount.value()),
            gateway_txn: latest
                .as_ref()
                .and_then(|r| r.gateway_txn.as_ref())
                .map(|t| t.as_str().to_string()),
        });
    }
    Ok(summaries)
}
