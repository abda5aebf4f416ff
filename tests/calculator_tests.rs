mod common;

use common::device;
use posflow::application::calculator::{ChargeSelection, compute_charge, parse_manual_amount};
use posflow::domain::money::MinorUnits;
use posflow::domain::order::{DeviceChargeSnapshot, DeviceStatus, LineItem, OrderSnapshot, Workflow};
use posflow::error::PaymentError;
use rand::Rng;
use rust_decimal_macros::dec;

#[test]
fn test_whole_order_without_manual_amount_charges_balance() {
    let order = OrderSnapshot::new("ord_a", MinorUnits(5000));
    let selection = ChargeSelection::whole_order().with_manual_amount(parse_manual_amount(""));

    let quote = compute_charge(&order, &selection, false).unwrap();

    assert_eq!(quote.amount, MinorUnits(5000));
    assert!(!quote.is_deposit);
}

#[test]
fn test_in_progress_repair_with_deposits_is_a_deposit() {
    let order = OrderSnapshot::new("ord_b", MinorUnits(6000)).with_devices(vec![device(
        "D1",
        Workflow::Repair,
        "repairing",
        8000,
        2000,
    )]);

    let quote = compute_charge(&order, &ChargeSelection::devices(["D1"]), true).unwrap();

    assert_eq!(quote.amount, MinorUnits(6000));
    assert!(quote.is_deposit);
}

#[test]
fn test_in_progress_repair_without_deposits_is_rejected() {
    let order = OrderSnapshot::new("ord_b", MinorUnits(6000)).with_devices(vec![device(
        "D1",
        Workflow::Repair,
        "repairing",
        8000,
        2000,
    )]);

    let result = compute_charge(&order, &ChargeSelection::devices(["D1"]), false);
    assert!(matches!(result, Err(PaymentError::ValidationError(_))));
}

#[test]
fn test_line_items_feed_device_snapshot() {
    let items = vec![
        LineItem {
            device_id: Some("D1".to_string()),
            line_total_inc_vat: dec!(49.995),
        },
        LineItem {
            device_id: Some("D1".to_string()),
            line_total_inc_vat: dec!(30.00),
        },
        LineItem {
            device_id: Some("D2".to_string()),
            line_total_inc_vat: dec!(100.00),
        },
        LineItem {
            device_id: None,
            line_total_inc_vat: dec!(5.00),
        },
    ];
    let device = DeviceChargeSnapshot::from_line_items(
        "D1",
        Workflow::Repair,
        DeviceStatus::new("collected"),
        &items,
        dec!(10.00),
        dec!(10.00),
    )
    .unwrap();

    // 79.995 rounds half away from zero
    assert_eq!(device.gross_total, MinorUnits(8000));
    assert_eq!(device.already_paid, MinorUnits(2000));

    let order = OrderSnapshot::new("ord_c", MinorUnits(20000)).with_devices(vec![device]);
    let quote = compute_charge(&order, &ChargeSelection::devices(["D1"]), false).unwrap();
    assert_eq!(quote.amount, MinorUnits(6000));
}

#[test]
fn test_manual_amount_over_balance_is_advisory() {
    let order = OrderSnapshot::new("ord_d", MinorUnits(5000));
    let selection = ChargeSelection::whole_order().with_manual_amount(parse_manual_amount("75.50"));

    let quote = compute_charge(&order, &selection, false).unwrap();

    assert_eq!(quote.amount, MinorUnits(7550));
    assert!(quote.exceeds_balance);
}

#[test]
fn test_random_selections_charge_sum_of_chargeable() {
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let count = rng.gen_range(1..6);
        let devices: Vec<DeviceChargeSnapshot> = (0..count)
            .map(|i| {
                let gross = rng.gen_range(0..50_000);
                let paid = rng.gen_range(0..60_000);
                let workflow = if rng.gen_bool(0.5) {
                    Workflow::Buyback
                } else {
                    Workflow::Repair
                };
                device(&format!("d{i}"), workflow, "collected", gross, paid)
            })
            .collect();

        let expected: MinorUnits = devices.iter().map(DeviceChargeSnapshot::chargeable).sum();
        let balance = MinorUnits(rng.gen_range(1..100_000));
        let ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        let order = OrderSnapshot::new("ord_r", balance).with_devices(devices);

        let quote = compute_charge(&order, &ChargeSelection::devices(ids), false).unwrap();

        assert!(quote.amount.value() >= 0);
        assert!(!quote.is_deposit);
        if expected.is_positive() {
            assert_eq!(quote.amount, expected);
        } else {
            assert_eq!(quote.amount, balance);
        }
        assert!(!quote.exceeds_balance);
    }
}
