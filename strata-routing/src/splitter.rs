//! Batch splitter - partitions a flat record batch by device.
//!
//! After a flat multi-device batch is redirected, the router resubmits it as
//! one sub-batch per device so that each redirect names exactly one device's
//! leader.

use std::collections::HashMap;

use strata_core::{DeviceId, Record};

/// Rows of one device taken from a larger batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBatch {
    /// The device every record targets.
    pub device_id: DeviceId,
    /// Records in their original relative order.
    pub records: Vec<Record>,
}

/// Groups records by device.
///
/// Sub-batches are ordered by the first appearance of their device, and rows
/// keep their original order within a device.
#[must_use]
pub fn split_by_device(records: &[Record]) -> Vec<SubBatch> {
    let mut index: HashMap<&DeviceId, usize> = HashMap::new();
    let mut batches: Vec<SubBatch> = Vec::new();

    for record in records {
        let slot = *index.entry(&record.device_id).or_insert_with(|| {
            batches.push(SubBatch {
                device_id: record.device_id.clone(),
                records: Vec::new(),
            });
            batches.len() - 1
        });
        batches[slot].records.push(record.clone());
    }

    batches
}

/// Returns true if every record targets the same device.
#[must_use]
pub fn is_single_device(records: &[Record]) -> bool {
    records
        .split_first()
        .map_or(true, |(first, rest)| {
            rest.iter().all(|record| record.device_id == first.device_id)
        })
}

#[cfg(test)]
mod tests {
    use strata_core::{Row, Value};

    use super::*;

    fn record(device: &str, timestamp: i64) -> Record {
        let row = Row::typed(timestamp, vec!["s1".to_string()], vec![Value::Int64(timestamp)])
            .unwrap();
        Record::new(device, row)
    }

    fn timestamps(batch: &SubBatch) -> Vec<i64> {
        batch.records.iter().map(|r| r.row.timestamp()).collect()
    }

    #[test]
    fn test_split_round_robin() {
        let devices = ["root.sg1.d1", "root.sg2.d1", "root.sg3.d1", "root.sg4.d1"];
        let records: Vec<_> = (0..10)
            .map(|t| record(devices[t as usize % devices.len()], t))
            .collect();

        let batches = split_by_device(&records);

        assert_eq!(batches.len(), 4);
        let order: Vec<_> = batches.iter().map(|b| b.device_id.as_str()).collect();
        assert_eq!(order, devices);
        assert_eq!(timestamps(&batches[0]), vec![0, 4, 8]);
        assert_eq!(timestamps(&batches[1]), vec![1, 5, 9]);
        assert_eq!(timestamps(&batches[3]), vec![3, 7]);
    }

    #[test]
    fn test_split_preserves_intra_device_order() {
        let records = vec![
            record("root.sg2.d1", 9),
            record("root.sg1.d1", 5),
            record("root.sg2.d1", 1),
            record("root.sg2.d1", 4),
        ];

        let batches = split_by_device(&records);

        assert_eq!(batches[0].device_id.as_str(), "root.sg2.d1");
        assert_eq!(timestamps(&batches[0]), vec![9, 1, 4]);
        assert_eq!(timestamps(&batches[1]), vec![5]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_by_device(&[]).is_empty());
    }

    #[test]
    fn test_is_single_device() {
        assert!(is_single_device(&[]));
        assert!(is_single_device(&[record("root.sg1.d1", 1), record("root.sg1.d1", 2)]));
        assert!(!is_single_device(&[record("root.sg1.d1", 1), record("root.sg2.d1", 2)]));
    }
}
