use crate::domain::payment::PaymentStatus;
use crate::domain::reservation::ReservationStatus;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Final per-reservation state emitted by the driver: the reservation's
/// status alongside its latest payment attempt, if any.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ReservationSummary {
    pub reservation: u64,
    pub reservation_status: ReservationStatus,
    pub payment_status: Option<PaymentStatus>,
    pub amount: Option<Decimal>,
    pub gateway_txn: Option<String>,
}

pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_summaries(&mut self, summaries: Vec<ReservationSummary>) -> Result<()> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
