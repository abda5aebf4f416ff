use crate::application::calculator::ChargeQuote;
use crate::domain::attempt::{PaymentAttempt, PaymentMode, Resolution};
use crate::domain::money::MinorUnits;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct QuoteRecord<'a> {
    order_id: &'a str,
    amount: String,
    is_deposit: bool,
    exceeds_balance: bool,
    device_ids: String,
}

#[derive(Debug, Serialize)]
struct OutcomeRecord<'a> {
    attempt_id: String,
    order_id: &'a str,
    mode: &'static str,
    amount: String,
    outcome: &'static str,
    reference: String,
    message: String,
}

fn outcome_name(resolution: &Resolution) -> &'static str {
    match resolution {
        Resolution::Succeeded(_) => "succeeded",
        Resolution::Failed { .. } => "failed",
        Resolution::Cancelled => "cancelled",
        Resolution::TimedOut => "timed_out",
        Resolution::LinkIssued(_) => "link_issued",
    }
}

fn reference(resolution: &Resolution) -> String {
    match resolution {
        Resolution::Succeeded(receipt) => receipt.transaction_id.clone(),
        Resolution::LinkIssued(link) => link.checkout_url.clone(),
        _ => String::new(),
    }
}

fn major(amount: MinorUnits) -> String {
    amount.to_string()
}

/// Writes quotes and attempt outcomes as CSV rows, amounts in major units.
pub struct QuoteWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> QuoteWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_quote(&mut self, order_id: &str, quote: &ChargeQuote) -> Result<()> {
        self.writer.serialize(QuoteRecord {
            order_id,
            amount: major(quote.amount),
            is_deposit: quote.is_deposit,
            exceeds_balance: quote.exceeds_balance,
            device_ids: quote
                .device_ids
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        })?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_outcome(
        &mut self,
        attempt: &PaymentAttempt,
        resolution: &Resolution,
    ) -> Result<()> {
        self.writer.serialize(OutcomeRecord {
            attempt_id: attempt.id.to_string(),
            order_id: &attempt.order_id,
            mode: match attempt.mode {
                PaymentMode::Terminal => "terminal",
                PaymentMode::Link => "link",
            },
            amount: major(attempt.amount),
            outcome: outcome_name(resolution),
            reference: reference(resolution),
            message: resolution.user_message(),
        })?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes arbitrary records (terminals, payment links) with a header from the first one.
    pub fn write_rows<T: Serialize>(&mut self, rows: impl IntoIterator<Item = T>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
