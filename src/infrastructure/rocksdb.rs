use crate::domain::ports::{KeyValueStore, WriteOp};
use crate::error::{DealflowError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Column Family for plain values.
pub const CF_VALUES: &str = "values";
/// Column Family for set membership, one row per `(set, member)` pair.
pub const CF_SETS: &str = "sets";

const SET_SEPARATOR: u8 = 0;

/// A persistent store implementation using RocksDB.
///
/// Plain values and set members live in separate Column Families so that
/// prefix scans over values never see set rows. Batches map onto a
/// `WriteBatch` and are atomic.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    /// Serializes read-modify-write sequences (`incr`, `delete`).
    rmw: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_values = ColumnFamilyDescriptor::new(CF_VALUES, Options::default());
        let cf_sets = ColumnFamilyDescriptor::new(CF_SETS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_values, cf_sets])?;

        Ok(Self {
            db: Arc::new(db),
            rmw: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| DealflowError::Store(format!("{name} column family not found")))
    }

    fn member_key(set: &str, member: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(set.len() + member.len() + 1);
        key.extend_from_slice(set.as_bytes());
        key.push(SET_SEPARATOR);
        key.extend_from_slice(member.as_bytes());
        key
    }

    fn scan(&self, cf: &ColumnFamily, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }
}

#[async_trait]
impl KeyValueStore for RocksDBStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let cf = self.cf(CF_VALUES)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes).map_err(|e| {
                DealflowError::Store(format!("`{key}` holds non UTF-8 data: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let cf = self.cf(CF_VALUES)?;
        self.db.put_cf(cf, key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.rmw.lock().unwrap_or_else(PoisonError::into_inner);
        let cf = self.cf(CF_VALUES)?;
        let existed = self.db.get_pinned_cf(cf, key.as_bytes())?.is_some();
        if existed {
            self.db.delete_cf(cf, key.as_bytes())?;
        }
        Ok(existed)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let cf = self.cf(CF_VALUES)?;
        Ok(self
            .scan(cf, prefix.as_bytes())?
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let _guard = self.rmw.lock().unwrap_or_else(PoisonError::into_inner);
        let cf = self.cf(CF_VALUES)?;
        let current = match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => String::from_utf8_lossy(&bytes)
                .parse::<i64>()
                .map_err(|e| DealflowError::Store(format!("`{key}` is not a counter: {e}")))?,
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(cf, key.as_bytes(), next.to_string().as_bytes())?;
        Ok(next)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let cf = self.cf(CF_SETS)?;
        let mut prefix = key.as_bytes().to_vec();
        prefix.push(SET_SEPARATOR);
        Ok(self
            .scan(cf, &prefix)?
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k[prefix.len()..]).into_owned())
            .collect())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let cf = self.cf(CF_SETS)?;
        self.db.put_cf(cf, Self::member_key(key, member), b"")?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let cf = self.cf(CF_SETS)?;
        self.db.delete_cf(cf, Self::member_key(key, member))?;
        Ok(())
    }

    async fn exec(&self, ops: Vec<WriteOp>) -> Result<()> {
        let values = self.cf(CF_VALUES)?;
        let sets = self.cf(CF_SETS)?;
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Set { key, value } => batch.put_cf(values, key.as_bytes(), value.as_bytes()),
                WriteOp::Delete { key } => batch.delete_cf(values, key.as_bytes()),
                WriteOp::SAdd { key, member } => {
                    batch.put_cf(sets, Self::member_key(&key, &member), b"")
                }
                WriteOp::SRem { key, member } => {
                    batch.delete_cf(sets, Self::member_key(&key, &member))
                }
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}
