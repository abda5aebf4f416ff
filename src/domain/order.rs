use super::money::MinorUnits;
use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Device statuses at which a repair is complete and a final payment may be taken.
pub const REPAIR_COMPLETE_STATUSES: [&str; 4] =
    ["repaired_ready", "rejection_ready", "collected", "despatched"];

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    Repair,
    Buyback,
}

impl FromStr for Workflow {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repair" => Ok(Self::Repair),
            "buyback" | "purchase" => Ok(Self::Buyback),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown workflow: {other}"
            ))),
        }
    }
}

/// Workflow status of a device as reported by the backend (e.g. `repairing`).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(transparent)]
pub struct DeviceStatus(pub String);

impl DeviceStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn is_repair_complete(&self) -> bool {
        REPAIR_COMPLETE_STATUSES.contains(&self.0.as_str())
    }
}

/// Whether, and how, a device may be charged at its current stage.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Eligibility {
    /// Buy-back device or completed repair.
    Final,
    /// Repair still in progress; only a deposit may be taken.
    DepositOnly,
    NotReady,
}

impl Eligibility {
    pub fn accepts_payment(&self) -> bool {
        !matches!(self, Eligibility::NotReady)
    }
}

/// A priced line on an order, in major units including tax.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LineItem {
    pub device_id: Option<String>,
    pub line_total_inc_vat: Decimal,
}

/// Per-device charge inputs for the amount calculator. Not persisted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct DeviceChargeSnapshot {
    pub id: String,
    pub display_name: Option<String>,
    pub workflow: Workflow,
    pub status: DeviceStatus,
    pub gross_total: MinorUnits,
    pub already_paid: MinorUnits,
}

impl DeviceChargeSnapshot {
    /// Builds a snapshot from the order's line items, counting deposits and final
    /// payments already taken against the device.
    pub fn from_line_items(
        id: impl Into<String>,
        workflow: Workflow,
        status: DeviceStatus,
        items: &[LineItem],
        deposits: Decimal,
        final_paid: Decimal,
    ) -> Result<Self, PaymentError> {
        let id = id.into();
        let out_of_range =
            || PaymentError::ValidationError(format!("Totals of device {id} are out of range"));
        let gross = items
            .iter()
            .filter(|item| item.device_id.as_deref() == Some(id.as_str()))
            .try_fold(Decimal::ZERO, |total, item| {
                total.checked_add(item.line_total_inc_vat)
            })
            .ok_or_else(out_of_range)?;
        let already_paid = MinorUnits::from_non_negative_major(deposits)?
            .checked_add(MinorUnits::from_non_negative_major(final_paid)?)
            .ok_or_else(out_of_range)?;

        let gross_total = MinorUnits::from_non_negative_major(gross)?;

        Ok(Self {
            id,
            display_name: None,
            workflow,
            status,
            gross_total,
            already_paid,
        })
    }

    /// `max(0, gross_total - already_paid)`
    pub fn chargeable(&self) -> MinorUnits {
        self.gross_total.saturating_balance(self.already_paid)
    }

    pub fn eligibility(&self, deposits_enabled: bool) -> Eligibility {
        if self.workflow == Workflow::Buyback || self.status.is_repair_complete() {
            Eligibility::Final
        } else if deposits_enabled {
            Eligibility::DepositOnly
        } else {
            Eligibility::NotReady
        }
    }
}

/// The slice of an order the payment flow needs.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct OrderSnapshot {
    pub id: String,
    pub order_number: Option<u32>,
    /// Aggregate outstanding balance across the whole order.
    pub balance_due: MinorUnits,
    pub devices: Vec<DeviceChargeSnapshot>,
    pub customer_email: Option<String>,
}

impl OrderSnapshot {
    pub fn new(id: impl Into<String>, balance_due: MinorUnits) -> Self {
        Self {
            id: id.into(),
            order_number: None,
            balance_due,
            devices: Vec::new(),
            customer_email: None,
        }
    }

    pub fn with_devices(mut self, devices: Vec<DeviceChargeSnapshot>) -> Self {
        self.devices = devices;
        self
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceChargeSnapshot> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    pub fn description(&self) -> String {
        match self.order_number {
            Some(number) => format!("Order #{number}"),
            None => format!("Order {}", self.id),
        }
    }
}
