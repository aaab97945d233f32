//! Reusable workloads for router tests.
//!
//! Workloads mirror how clients feed the router: single rows, round-robin
//! record batches across storage groups submitted in chunks, and tablets
//! filled with random values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_core::{DataType, DeviceId, MeasurementSchema, Record, Row, Tablet, Value};

/// Standard workload sizes.
pub mod sizes {
    /// Rows in a round-robin workload.
    pub const ROUND_ROBIN_ROWS: usize = 500;

    /// Records per submitted chunk.
    pub const CHUNK_SIZE: usize = 100;

    /// Row capacity of generated tablets.
    pub const TABLET_CAPACITY: usize = 100;
}

/// Seeds for reproducible random payloads.
pub mod seeds {
    /// Seeds used by tests that generate random tablets.
    pub const REGRESSION_SEEDS: &[u64] = &[42, 12345, 0xDEAD_BEEF, 7777, 0];
}

/// Returns `root.sgN.d1` for each `N` in `groups`.
#[must_use]
pub fn storage_group_devices(groups: impl IntoIterator<Item = u16>) -> Vec<DeviceId> {
    groups
        .into_iter()
        .map(|group| DeviceId::new(format!("root.sg{group}.d1")))
        .collect()
}

/// Measurement names `s1..=sN`.
#[must_use]
pub fn measurements(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("s{i}")).collect()
}

/// Schemas for three `Int64` measurements, as most workloads use.
#[must_use]
pub fn int64_schemas() -> Vec<MeasurementSchema> {
    measurements(3)
        .into_iter()
        .map(|name| MeasurementSchema::new(name, DataType::Int64))
        .collect()
}

/// One typed row with three `Int64` values derived from `timestamp`.
///
/// # Panics
///
/// Never; the measurement and value counts always match.
#[must_use]
pub fn int64_row(timestamp: i64) -> Row {
    let values = vec![
        Value::Int64(timestamp),
        Value::Int64(timestamp * 2),
        Value::Int64(timestamp * 3),
    ];
    Row::typed(timestamp, measurements(3), values).expect("counts match")
}

/// One string row; the server parses the values.
///
/// # Panics
///
/// Never; the measurement and value counts always match.
#[must_use]
pub fn string_row(timestamp: i64) -> Row {
    let values = vec![timestamp.to_string(), "on".to_string()];
    Row::untyped(timestamp, measurements(2), values).expect("counts match")
}

/// Records cycling over `devices`, one row each, timestamps `0..rows`.
#[must_use]
pub fn round_robin_records(devices: &[DeviceId], rows: usize) -> Vec<Record> {
    (0..rows)
        .map(|i| {
            let device = devices[i % devices.len()].clone();
            let timestamp = i64::try_from(i).unwrap_or(i64::MAX);
            Record::new(device, int64_row(timestamp))
        })
        .collect()
}

/// Splits `records` into owned chunks of at most `size`.
///
/// # Panics
///
/// Panics if `size` is zero.
#[must_use]
pub fn chunked(records: Vec<Record>, size: usize) -> Vec<Vec<Record>> {
    assert!(size > 0, "chunk size must be positive");
    let mut chunks = Vec::new();
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// A tablet of `rows` rows with random `Int64` values, timestamps shuffled
/// so that the router has to sort it.
///
/// # Panics
///
/// Panics if `rows` exceeds [`sizes::TABLET_CAPACITY`].
#[must_use]
pub fn random_tablet(device: DeviceId, rows: usize, seed: u64) -> Tablet {
    let mut rng = StdRng::seed_from_u64(seed);
    let schemas = int64_schemas();
    let columns = schemas.len();
    let mut tablet = Tablet::new(device, schemas, sizes::TABLET_CAPACITY);

    let mut timestamps: Vec<i64> = (0..rows).map(|t| t as i64).collect();
    for i in (1..timestamps.len()).rev() {
        timestamps.swap(i, rng.gen_range(0..=i));
    }

    for timestamp in timestamps {
        let values = (0..columns)
            .map(|_| Value::Int64(rng.gen_range(-1_000..1_000)))
            .collect();
        tablet
            .add_row(timestamp, values)
            .expect("tablet rows within capacity");
    }
    tablet
}

/// One random tablet per device.
#[must_use]
pub fn random_tablets(devices: &[DeviceId], rows: usize, seed: u64) -> Vec<Tablet> {
    devices
        .iter()
        .zip(seed..)
        .map(|(device, seed)| random_tablet(device.clone(), rows, seed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_cycles_devices() {
        let devices = storage_group_devices(1..=4);
        let records = round_robin_records(&devices, 10);

        assert_eq!(records.len(), 10);
        assert_eq!(records[0].device_id, devices[0]);
        assert_eq!(records[5].device_id, devices[1]);
        assert_eq!(records[9].row.timestamp(), 9);
    }

    #[test]
    fn test_chunked_keeps_every_record() {
        let devices = storage_group_devices(1..=2);
        let chunks = chunked(round_robin_records(&devices, 250), sizes::CHUNK_SIZE);

        let lens: Vec<_> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![100, 100, 50]);
    }

    #[test]
    #[should_panic(expected = "chunk size must be positive")]
    fn test_chunked_rejects_zero_size() {
        let devices = storage_group_devices(1..=1);
        let _ = chunked(round_robin_records(&devices, 3), 0);
    }

    #[test]
    fn test_random_tablet_is_unsorted_and_full_width() {
        let tablet = random_tablet(DeviceId::from("root.sg2.d1"), 50, 42);

        assert_eq!(tablet.row_count(), 50);
        assert!(!tablet.is_sorted());
        assert_eq!(tablet.column(2).map(<[Value]>::len), Some(50));
    }

    #[test]
    fn test_random_tablet_is_reproducible() {
        let device = DeviceId::from("root.sg3.d1");
        for &seed in seeds::REGRESSION_SEEDS {
            let a = random_tablet(device.clone(), 20, seed);
            let b = random_tablet(device.clone(), 20, seed);
            assert_eq!(a.timestamps(), b.timestamps());
        }
    }
}
