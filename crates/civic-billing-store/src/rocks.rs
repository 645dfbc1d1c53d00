//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use civic_billing_core::{
    apply_confirmed_payment, apply_failed_payment, ConfirmedPayment, FinalizeOutcome,
    Subscription, SubscriptionId, Transaction, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
///
/// Single-key reads and writes go straight to the database. Operations that
/// read, check and then write (intent uniqueness, finalize) hold `write_lock`.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("store write lock poisoned".to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collect the trailing IDs of every index key under `prefix`, in key order.
    fn scan_index(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<[u8; 16]>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            match keys::trailing_id(&key) {
                Some(id) => ids.push(id),
                None => tracing::warn!(cf = cf_name, "skipping malformed index key"),
            }
        }
        Ok(ids)
    }

    fn intent_exists(&self, payment_intent_id: &str) -> Result<bool> {
        let cf = self.cf(cf::TRANSACTIONS_BY_INTENT)?;
        Ok(self
            .db
            .get_cf(&cf, keys::payment_intent_key(payment_intent_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    /// Add the puts for a subscription and its user index to a batch.
    fn batch_subscription(&self, batch: &mut WriteBatch, subscription: &Subscription) -> Result<()> {
        let cf_subs = self.cf(cf::SUBSCRIPTIONS)?;
        let cf_by_user = self.cf(cf::SUBSCRIPTIONS_BY_USER)?;

        batch.put_cf(
            &cf_subs,
            keys::subscription_key(&subscription.id),
            Self::serialize(subscription)?,
        );
        batch.put_cf(
            &cf_by_user,
            keys::user_subscription_key(&subscription.user_id, &subscription.id),
            [],
        );
        Ok(())
    }

    /// Add the puts for a transaction and its indexes to a batch.
    fn batch_transaction(&self, batch: &mut WriteBatch, transaction: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_sub = self.cf(cf::TRANSACTIONS_BY_SUBSCRIPTION)?;

        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_by_sub,
            keys::subscription_transaction_key(&transaction.subscription_id, &transaction.id),
            [],
        );
        if let Some(intent) = &transaction.payment_intent_id {
            let cf_by_intent = self.cf(cf::TRANSACTIONS_BY_INTENT)?;
            batch.put_cf(
                &cf_by_intent,
                keys::payment_intent_key(intent),
                transaction.id.to_bytes(),
            );
        }
        Ok(())
    }

    fn ensure_intent_unused(&self, transaction: &Transaction) -> Result<()> {
        if let Some(intent) = &transaction.payment_intent_id {
            if self.intent_exists(intent)? {
                return Err(StoreError::DuplicatePaymentIntent {
                    payment_intent_id: intent.clone(),
                });
            }
        }
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_subscription(&mut batch, subscription)?;
        self.write(batch)
    }

    fn get_subscription(&self, subscription_id: &SubscriptionId) -> Result<Option<Subscription>> {
        let cf = self.cf(cf::SUBSCRIPTIONS)?;
        let key = keys::subscription_key(subscription_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_subscriptions_by_user(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Subscription>> {
        let mut ids = self.scan_index(
            cf::SUBSCRIPTIONS_BY_USER,
            &keys::user_subscriptions_prefix(user_id),
        )?;

        // Reverse to get newest first
        ids.reverse();

        let mut subscriptions = Vec::new();
        for id in ids.into_iter().take(limit.unwrap_or(usize::MAX)) {
            if let Some(sub) = self.get_subscription(&SubscriptionId::from_bytes(id))? {
                subscriptions.push(sub);
            }
        }
        Ok(subscriptions)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<Transaction>> {
        let ids = self.scan_index(
            cf::TRANSACTIONS_BY_SUBSCRIPTION,
            &keys::subscription_transactions_prefix(subscription_id),
        )?;

        let mut transactions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tx) = self.get_transaction(&TransactionId::from_bytes(id))? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    fn find_transaction_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_INTENT)?;
        let Some(value) = self
            .db
            .get_cf(&cf, keys::payment_intent_key(payment_intent_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let id = keys::id_value(&value).ok_or_else(|| {
            StoreError::Serialization(format!("corrupt intent index entry: {payment_intent_id}"))
        })?;
        self.get_transaction(&TransactionId::from_bytes(id))
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn create_subscription(
        &self,
        subscription: &Subscription,
        transaction: &Transaction,
    ) -> Result<()> {
        let _guard = self.lock()?;
        self.ensure_intent_unused(transaction)?;

        let mut batch = WriteBatch::default();
        self.batch_subscription(&mut batch, subscription)?;
        self.batch_transaction(&mut batch, transaction)?;

        // Write atomically
        self.write(batch)
    }

    fn append_transaction(
        &self,
        transaction: &Transaction,
        processor_customer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let _guard = self.lock()?;
        let mut subscription = self
            .get_subscription(&transaction.subscription_id)?
            .ok_or(StoreError::NotFound)?;
        self.ensure_intent_unused(transaction)?;

        if let Some(customer_id) = processor_customer_id {
            subscription.processor_customer_id = Some(customer_id.to_string());
        }
        subscription.updated_at = now;

        let mut batch = WriteBatch::default();
        self.batch_subscription(&mut batch, &subscription)?;
        self.batch_transaction(&mut batch, transaction)?;

        // Write atomically
        self.write(batch)?;
        Ok(subscription)
    }

    fn update_subscription<F>(&self, subscription_id: &SubscriptionId, update: F) -> Result<Subscription>
    where
        F: FnOnce(&mut Subscription) -> Result<()>,
    {
        let _guard = self.lock()?;
        let mut subscription = self
            .get_subscription(subscription_id)?
            .ok_or(StoreError::NotFound)?;

        update(&mut subscription)?;

        let mut batch = WriteBatch::default();
        self.batch_subscription(&mut batch, &subscription)?;
        self.write(batch)?;
        Ok(subscription)
    }

    fn complete_payment(
        &self,
        payment: &ConfirmedPayment,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome> {
        let _guard = self.lock()?;

        let Some(transaction) = self.find_transaction_by_payment_intent(&payment.payment_intent_id)?
        else {
            return Ok(FinalizeOutcome::NotMatched);
        };
        let Some(subscription) = self.get_subscription(&transaction.subscription_id)? else {
            tracing::warn!(
                payment_intent_id = %payment.payment_intent_id,
                subscription_id = %transaction.subscription_id,
                "transaction references a missing subscription"
            );
            return Ok(FinalizeOutcome::NotMatched);
        };

        let outcome = apply_confirmed_payment(subscription, transaction, payment, now)?;
        if let FinalizeOutcome::Updated {
            subscription,
            transaction,
        } = &outcome
        {
            let mut batch = WriteBatch::default();
            self.batch_subscription(&mut batch, subscription)?;
            self.batch_transaction(&mut batch, transaction)?;
            self.write(batch)?;
        }

        Ok(outcome)
    }

    fn fail_payment(&self, payment_intent_id: &str, reason: &str) -> Result<Option<Transaction>> {
        let _guard = self.lock()?;

        let Some(mut transaction) = self.find_transaction_by_payment_intent(payment_intent_id)?
        else {
            return Ok(None);
        };

        if apply_failed_payment(&mut transaction, reason) {
            let mut batch = WriteBatch::default();
            self.batch_transaction(&mut batch, &transaction)?;
            self.write(batch)?;
        }

        Ok(Some(transaction))
    }
}
