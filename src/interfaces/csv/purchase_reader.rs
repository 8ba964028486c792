use crate::domain::purchase::Purchase;
use crate::error::{BillingError, Result};
use std::io::Read;

/// Reads a purchase scenario from a CSV source.
///
/// Wraps `csv::Reader` and yields `Result<Purchase>` per row, trimming
/// whitespace and tolerating flexible record lengths. Used by the demo
/// binary to seed the in-memory backend.
pub struct PurchaseReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PurchaseReader<R> {
    /// Creates a new `PurchaseReader` from any `Read` source.
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes purchases.
    pub fn purchases(self) -> impl Iterator<Item = Result<Purchase>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}
