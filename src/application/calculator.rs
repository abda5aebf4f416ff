use crate::domain::money::MinorUnits;
use crate::domain::order::{Eligibility, OrderSnapshot};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::str::FromStr;

/// What the operator picked on the payment screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeSelection {
    /// Empty means "charge the whole order balance".
    pub device_ids: BTreeSet<String>,
    pub manual_amount: Option<MinorUnits>,
}

impl ChargeSelection {
    pub fn whole_order() -> Self {
        Self::default()
    }

    pub fn devices<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            device_ids: ids.into_iter().map(Into::into).collect(),
            manual_amount: None,
        }
    }

    pub fn with_manual_amount(mut self, amount: Option<MinorUnits>) -> Self {
        self.manual_amount = amount;
        self
    }
}

/// The amount to charge and how the backend should book it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeQuote {
    pub amount: MinorUnits,
    pub is_deposit: bool,
    /// Advisory only: a manual amount above the outstanding balance is allowed.
    pub exceeds_balance: bool,
    pub device_ids: BTreeSet<String>,
}

/// Computes the payable amount for a device selection (or the whole order).
///
/// Every selected device must exist on the order and accept payment at its
/// current stage; otherwise a `ValidationError` is returned.
pub fn compute_charge(
    order: &OrderSnapshot,
    selection: &ChargeSelection,
    deposits_enabled: bool,
) -> Result<ChargeQuote> {
    let mut is_deposit = false;
    let mut devices_total = MinorUnits::ZERO;

    for device_id in &selection.device_ids {
        let device = order.device(device_id).ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "Device {device_id} does not belong to order {}",
                order.id
            ))
        })?;

        match device.eligibility(deposits_enabled) {
            Eligibility::Final => {}
            Eligibility::DepositOnly => is_deposit = true,
            Eligibility::NotReady => {
                return Err(PaymentError::ValidationError(format!(
                    "Device {device_id} is not ready for payment"
                )));
            }
        }
        devices_total = devices_total
            .checked_add(device.chargeable())
            .ok_or_else(|| {
                PaymentError::ValidationError("Selected devices total is out of range".to_string())
            })?;
    }

    let manual = selection.manual_amount.filter(MinorUnits::is_positive);
    let amount = match manual {
        Some(amount) => amount,
        None if !selection.device_ids.is_empty() && devices_total.is_positive() => devices_total,
        None => order.balance_due,
    };

    let exceeds_balance =
        manual.is_some() && order.balance_due.is_positive() && amount > order.balance_due;

    Ok(ChargeQuote {
        amount,
        is_deposit,
        exceeds_balance,
        device_ids: selection.device_ids.clone(),
    })
}

/// Parses an operator-typed amount in major units (`"12.50"`).
///
/// Blank, unparseable or non-positive input means no manual amount.
pub fn parse_manual_amount(text: &str) -> Option<MinorUnits> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .ok()
        .and_then(|major| MinorUnits::from_major(major).ok())
        .filter(MinorUnits::is_positive)
}
