use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Seed a reservation awaiting payment.
    Book,
    Initiate,
    Confirm,
    Reverse,
    Abandon,
}

/// One row of the driver's command file.
///
/// `amount` applies to `initiate`/`reverse`; `hours` is how far ahead a
/// `book`ed reservation is scheduled (default 48).
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub r#type: CommandType,
    pub reservation: u64,
    pub user: u64,
    pub amount: Option<Decimal>,
    pub hours: Option<i64>,
}

/// Reads driver commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding `Result<Command>` lazily so large files stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
