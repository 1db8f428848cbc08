use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::domain::ports::{PaymentRecordStore, RecordFilter};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing payment records.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent payment record store using RocksDB.
///
/// Records are stored as JSON under their gateway payment identifier. Writes that
/// read before writing (`insert`, `transition`) are serialized so the duplicate check
/// and the status compare-and-set are atomic with respect to each other.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "payments" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(CF_PAYMENTS).ok_or_else(|| {
            ReconcileError::InternalError(Box::new(std::io::Error::other(
                "Payments column family not found",
            )))
        })
    }

    fn put(&self, record: &PaymentRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.db
            .put_cf(self.cf()?, record.razorpay_payment_id.as_bytes(), value)?;
        Ok(())
    }

    fn load(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        match self.db.get_cf(self.cf()?, payment_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentRecordStore for RocksDBStore {
    async fn list_by_filter(&self, filter: &RecordFilter) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        self.load(payment_id)
    }

    async fn exists(&self, payment_id: &str) -> Result<bool> {
        // Just check if the key exists without deserializing the value
        let result = self.db.get_pinned_cf(self.cf()?, payment_id.as_bytes())?;
        Ok(result.is_some())
    }

    async fn transition(
        &self,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<PaymentRecord> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .load(payment_id)?
            .ok_or_else(|| ReconcileError::RecordNotFound(payment_id.to_owned()))?;
        if record.status != from {
            return Err(ReconcileError::InvalidTransition {
                payment_id: payment_id.to_owned(),
                from: record.status,
                to,
            });
        }
        record.check_transition(to)?;
        record.status = to;
        self.put(&record)?;
        Ok(record)
    }

    async fn insert(&self, mut record: PaymentRecord) -> Result<PaymentRecord> {
        let _guard = self.write_lock.lock().await;
        if self.exists(&record.razorpay_payment_id).await? {
            return Err(ReconcileError::DuplicatePayment(record.razorpay_payment_id));
        }
        record.flags = Default::default();
        self.put(&record)?;
        Ok(record)
    }

    async fn get_all(&self) -> Result<Vec<PaymentRecord>> {
        let mut records = Vec::new();
        let iter = self.db.iterator_cf(self.cf()?, rocksdb::IteratorMode::Start);

        for item in iter {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }

        Ok(records)
    }
}
