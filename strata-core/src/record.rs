//! Request data model: rows, records, tablets and timeseries schemas.
//!
//! These are the payloads the router moves around. Construction validates
//! shape (measurement and value counts, declared types) so that the router
//! and the connection layer can assume well-formed input.

use bytes::Bytes;

use crate::error::RecordError;
use crate::types::DeviceId;

/// Data type of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean.
    Boolean,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Binary text.
    Text,
}

/// A typed measurement value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer value.
    Int32(i32),
    /// 64-bit integer value.
    Int64(i64),
    /// 32-bit float value.
    Float(f32),
    /// 64-bit float value.
    Double(f64),
    /// Text value.
    Text(Bytes),
}

impl Value {
    /// Returns the data type of this value.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Text(_) => DataType::Text,
        }
    }
}

/// Values of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Values with client-declared types.
    Typed(Vec<Value>),
    /// Values sent as strings; the server infers their types.
    Untyped(Vec<String>),
}

impl RowValues {
    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Typed(values) => values.len(),
            Self::Untyped(values) => values.len(),
        }
    }

    /// Returns true if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One timestamped row of measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    timestamp: i64,
    measurements: Vec<String>,
    values: RowValues,
}

impl Row {
    /// Creates a row with typed values.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::MeasurementCountMismatch` if the counts differ.
    pub fn typed(
        timestamp: i64,
        measurements: Vec<String>,
        values: Vec<Value>,
    ) -> Result<Self, RecordError> {
        Self::new(timestamp, measurements, RowValues::Typed(values))
    }

    /// Creates a row whose values are sent as strings.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::MeasurementCountMismatch` if the counts differ.
    pub fn untyped(
        timestamp: i64,
        measurements: Vec<String>,
        values: Vec<String>,
    ) -> Result<Self, RecordError> {
        Self::new(timestamp, measurements, RowValues::Untyped(values))
    }

    fn new(
        timestamp: i64,
        measurements: Vec<String>,
        values: RowValues,
    ) -> Result<Self, RecordError> {
        if measurements.len() != values.len() {
            return Err(RecordError::MeasurementCountMismatch {
                timestamp,
                measurements: measurements.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            timestamp,
            measurements,
            values,
        })
    }

    /// Returns the row timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the measurement names.
    #[must_use]
    pub fn measurements(&self) -> &[String] {
        &self.measurements
    }

    /// Returns the row values.
    #[must_use]
    pub const fn values(&self) -> &RowValues {
        &self.values
    }
}

/// A row addressed to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Target device.
    pub device_id: DeviceId,
    /// The row.
    pub row: Row,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>, row: Row) -> Self {
        Self {
            device_id: device_id.into(),
            row,
        }
    }
}

/// Several rows for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecords {
    device_id: DeviceId,
    rows: Vec<Row>,
}

impl DeviceRecords {
    /// Creates an empty batch for a device.
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            rows: Vec::new(),
        }
    }

    /// Creates a batch from existing rows.
    #[must_use]
    pub fn with_rows(device_id: impl Into<DeviceId>, rows: Vec<Row>) -> Self {
        Self {
            device_id: device_id.into(),
            rows,
        }
    }

    /// Builds a batch from records that must all target the same device.
    ///
    /// Returns `Ok(None)` for an empty input.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::ForeignDevice` if the records span devices.
    pub fn from_records(records: Vec<Record>) -> Result<Option<Self>, RecordError> {
        let mut iter = records.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut batch = Self::with_rows(first.device_id, vec![first.row]);
        for record in iter {
            if record.device_id != batch.device_id {
                return Err(RecordError::ForeignDevice {
                    expected: batch.device_id,
                    actual: record.device_id,
                });
            }
            batch.rows.push(record.row);
        }
        Ok(Some(batch))
    }

    /// Appends a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Returns the device.
    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns the rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true if timestamps are non-decreasing.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.rows
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Sorts rows by timestamp. Rows with equal timestamps keep their order.
    pub fn sort_by_time(&mut self) {
        self.rows.sort_by_key(Row::timestamp);
    }
}

/// Name and type of one tablet column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasurementSchema {
    /// Measurement name, e.g. `s1`.
    pub measurement: String,
    /// Declared type.
    pub data_type: DataType,
}

impl MeasurementSchema {
    /// Creates a measurement schema.
    #[must_use]
    pub fn new(measurement: impl Into<String>, data_type: DataType) -> Self {
        Self {
            measurement: measurement.into(),
            data_type,
        }
    }
}

/// On-disk encoding requested for a timeseries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// No encoding.
    #[default]
    Plain,
    /// Run-length encoding.
    Rle,
    /// Delta-of-delta encoding.
    Ts2Diff,
    /// Gorilla XOR encoding.
    Gorilla,
}

/// Compression requested for a timeseries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// No compression.
    Uncompressed,
    /// Snappy.
    #[default]
    Snappy,
    /// Gzip.
    Gzip,
    /// LZ4.
    Lz4,
}

/// Definition of a timeseries to create.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeseriesSchema {
    /// Full path, e.g. `root.sg1.d1.s1`.
    pub path: String,
    /// Data type.
    pub data_type: DataType,
    /// Encoding.
    pub encoding: Encoding,
    /// Compression.
    pub compression: Compression,
}

impl TimeseriesSchema {
    /// Creates a schema with default encoding and compression.
    #[must_use]
    pub fn new(path: impl Into<String>, data_type: DataType) -> Self {
        Self {
            path: path.into(),
            data_type,
            encoding: Encoding::default(),
            compression: Compression::default(),
        }
    }

    /// Sets the encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the compression.
    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Column-oriented rows for one device.
///
/// A tablet has a fixed row capacity. Callers fill it with `add_row`, submit
/// it once `is_full`, then `reset` it for reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct Tablet {
    device_id: DeviceId,
    schemas: Vec<MeasurementSchema>,
    timestamps: Vec<i64>,
    /// One vector per schema column.
    columns: Vec<Vec<Value>>,
    max_rows: usize,
}

impl Tablet {
    /// Creates an empty tablet.
    #[must_use]
    pub fn new(
        device_id: impl Into<DeviceId>,
        schemas: Vec<MeasurementSchema>,
        max_rows: usize,
    ) -> Self {
        let columns = schemas.iter().map(|_| Vec::with_capacity(max_rows)).collect();
        Self {
            device_id: device_id.into(),
            schemas,
            timestamps: Vec::with_capacity(max_rows),
            columns,
            max_rows,
        }
    }

    /// Appends a row with one value per schema column.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::TabletFull` if the tablet is at capacity,
    /// `RecordError::ColumnCountMismatch` if the value count is wrong and
    /// `RecordError::TypeMismatch` if a value does not match its column.
    pub fn add_row(&mut self, timestamp: i64, values: Vec<Value>) -> Result<(), RecordError> {
        if self.is_full() {
            return Err(RecordError::TabletFull {
                device: self.device_id.clone(),
                capacity: self.max_rows,
            });
        }
        if values.len() != self.schemas.len() {
            return Err(RecordError::ColumnCountMismatch {
                device: self.device_id.clone(),
                expected: self.schemas.len(),
                actual: values.len(),
            });
        }
        if let Some((schema, value)) = self
            .schemas
            .iter()
            .zip(&values)
            .find(|(schema, value)| schema.data_type != value.data_type())
        {
            return Err(RecordError::TypeMismatch {
                measurement: schema.measurement.clone(),
                expected: schema.data_type,
                actual: value.data_type(),
            });
        }

        self.timestamps.push(timestamp);
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
        Ok(())
    }

    /// Returns the device.
    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns the column schemas.
    #[must_use]
    pub fn schemas(&self) -> &[MeasurementSchema] {
        &self.schemas
    }

    /// Returns the row timestamps.
    #[must_use]
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Returns the values of column `index`, if it exists.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&[Value]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    /// Returns the number of filled rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns the row capacity.
    #[must_use]
    pub const fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Returns true if no rows are filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Returns true if the tablet is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.timestamps.len() >= self.max_rows
    }

    /// Drops all rows, keeping schema and capacity.
    pub fn reset(&mut self) {
        self.timestamps.clear();
        for column in &mut self.columns {
            column.clear();
        }
    }

    /// Returns true if timestamps are non-decreasing.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.timestamps.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Sorts rows by timestamp, permuting every column alongside.
    ///
    /// Rows with equal timestamps keep their relative order.
    pub fn sort_by_time(&mut self) {
        if self.is_sorted() {
            return;
        }

        let mut order: Vec<usize> = (0..self.timestamps.len()).collect();
        order.sort_by_key(|&row| self.timestamps[row]);

        self.timestamps = order.iter().map(|&row| self.timestamps[row]).collect();
        for column in &mut self.columns {
            *column = order.iter().map(|&row| column[row].clone()).collect();
        }
    }
}
