#![allow(dead_code)]

use posflow::application::orchestrator::{OrchestratorConfig, PaymentOrchestrator};
use posflow::domain::money::MinorUnits;
use posflow::domain::order::{DeviceChargeSnapshot, DeviceStatus, OrderSnapshot, Workflow};
use posflow::infrastructure::in_memory::InMemoryOrderStore;
use posflow::infrastructure::simulated::SimulatedTransport;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;

pub fn device(
    id: &str,
    workflow: Workflow,
    status: &str,
    gross: i64,
    paid: i64,
) -> DeviceChargeSnapshot {
    DeviceChargeSnapshot {
        id: id.to_string(),
        display_name: None,
        workflow,
        status: DeviceStatus::new(status),
        gross_total: MinorUnits(gross),
        already_paid: MinorUnits(paid),
    }
}

/// An order owing `balance` pence with a single completed repair.
pub fn order(id: &str, balance: i64) -> OrderSnapshot {
    let mut order = OrderSnapshot::new(id, MinorUnits(balance)).with_devices(vec![device(
        "d1",
        Workflow::Repair,
        "repaired_ready",
        balance,
        0,
    )]);
    order.order_number = Some(1042);
    order.customer_email = Some("customer@example.test".to_string());
    order
}

pub struct Harness {
    pub transport: SimulatedTransport,
    pub store: InMemoryOrderStore,
    pub orchestrator: PaymentOrchestrator,
}

pub fn harness(transport: SimulatedTransport) -> Harness {
    harness_with(transport, OrchestratorConfig::default())
}

pub fn harness_with(transport: SimulatedTransport, config: OrchestratorConfig) -> Harness {
    let store = InMemoryOrderStore::new();
    let orchestrator =
        PaymentOrchestrator::new(Arc::new(transport.clone()), Arc::new(store.clone()), config)
            .with_link_admin(Arc::new(transport.clone()));
    Harness {
        transport,
        store,
        orchestrator,
    }
}

pub fn write_devices_csv(path: &Path, rows: &[[&str; 6]]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    writeln!(file, "device_id,name,workflow,status,gross_total,already_paid")?;
    for row in rows {
        writeln!(file, "{}", row.join(","))?;
    }
    Ok(())
}
