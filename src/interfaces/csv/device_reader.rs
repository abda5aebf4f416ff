use crate::domain::money::MinorUnits;
use crate::domain::order::{DeviceChargeSnapshot, DeviceStatus, Workflow};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a device CSV. Money columns are in major units.
#[derive(Debug, Deserialize)]
struct DeviceRecord {
    device_id: String,
    #[serde(default)]
    name: Option<String>,
    workflow: String,
    status: String,
    gross_total: Decimal,
    #[serde(default)]
    already_paid: Option<Decimal>,
}

impl TryFrom<DeviceRecord> for DeviceChargeSnapshot {
    type Error = PaymentError;

    fn try_from(record: DeviceRecord) -> Result<Self> {
        Ok(Self {
            id: record.device_id,
            display_name: record.name.filter(|name| !name.is_empty()),
            workflow: record.workflow.parse::<Workflow>()?,
            status: DeviceStatus::new(record.status),
            gross_total: MinorUnits::from_non_negative_major(record.gross_total)?,
            already_paid: MinorUnits::from_non_negative_major(
                record.already_paid.unwrap_or_default(),
            )?,
        })
    }
}

/// Reads device charge snapshots from a CSV source.
///
/// Expected columns: `device_id, name, workflow, status, gross_total, already_paid`.
pub struct DeviceReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> DeviceReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts each row; a bad row yields an `Err` item.
    pub fn devices(self) -> impl Iterator<Item = Result<DeviceChargeSnapshot>> {
        self.reader
            .into_deserialize::<DeviceRecord>()
            .map(|result| {
                result
                    .map_err(PaymentError::from)
                    .and_then(DeviceChargeSnapshot::try_from)
            })
    }
}
