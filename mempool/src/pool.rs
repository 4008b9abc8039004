//! The pool itself.

use {
    crate::{AdmissionError, MempoolConfig, Result},
    log::{debug, info},
    parking_lot::RwLock,
    std::{
        collections::HashMap,
        sync::Arc,
        time::{Duration, Instant},
    },
    tripcoin_crypto::Address,
    tripcoin_ledger::Transaction,
};

/// Read-only balance source consulted during admission.
///
/// Implementations must not suspend; admission holds the pool lock.
pub trait BalanceView: Send + Sync {
    fn balance(&self, address: &Address) -> u64;
}

#[derive(Default)]
struct Inner {
    txs: HashMap<String, Transaction>,
    admitted_at: HashMap<String, Instant>,
}

/// Bounded fee-prioritized pending-transaction pool.
pub struct Mempool {
    config: MempoolConfig,
    balances: Arc<dyn BalanceView>,
    inner: RwLock<Inner>,
}

impl Mempool {
    pub fn new(config: MempoolConfig, balances: Arc<dyn BalanceView>) -> Self {
        Self {
            config,
            balances,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.inner.read().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().txs.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.inner.read().txs.contains_key(hash)
    }

    /// Admit a submitted transaction.
    ///
    /// Rejection checks run in a fixed order — shape, then duplicate,
    /// then balance — so an already-pending hash always reports
    /// `Duplicate`, whatever the signer's balance has since become. The
    /// fee is derived locally (`gas_limit × gas_price`); the wire value
    /// is discarded. When the pool is at capacity the cheapest tenth (by
    /// fee density) is shed before the admission is retried.
    pub fn add(&self, mut tx: Transaction) -> Result<()> {
        if let Some(problem) = tx.shape_problem() {
            return Err(AdmissionError::Malformed(problem.to_string()));
        }

        let mut inner = self.inner.write();
        if inner.txs.contains_key(&tx.hash) {
            return Err(AdmissionError::Duplicate(tx.hash));
        }

        tx.fee = tx.gas_limit.saturating_mul(self.config.gas_price);
        let required = tx.amount.saturating_add(tx.fee);
        let available = self.balances.balance(&tx.from);
        if available < required {
            return Err(AdmissionError::InsufficientBalance {
                signer: tx.from.clone(),
                required,
                available,
            });
        }

        if inner.txs.len() >= self.config.max_size {
            let shed = shed_lowest_density(&mut inner);
            info!("mempool full: shed {shed} lowest fee-density entries");
            if inner.txs.len() >= self.config.max_size {
                return Err(AdmissionError::Saturated);
            }
        }

        debug!("admitted tx {} (fee {})", tx.hash, tx.fee);
        inner.admitted_at.insert(tx.hash.clone(), Instant::now());
        inner.txs.insert(tx.hash.clone(), tx);
        Ok(())
    }

    /// The `max_n` highest fee-density entries, ties broken by hash
    /// ascending. Identical output on every node for identical pools.
    pub fn pick(&self, max_n: usize) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut candidates: Vec<&Transaction> = inner.txs.values().collect();
        candidates.sort_by(|a, b| {
            let lhs = (b.fee as u128) * (a.size as u128);
            let rhs = (a.fee as u128) * (b.size as u128);
            // Density descending, then hash ascending.
            lhs.cmp(&rhs).then_with(|| a.hash.cmp(&b.hash))
        });
        candidates.into_iter().take(max_n).cloned().collect()
    }

    /// Drop entries by hash. Called by the replica when a block finalizes.
    pub fn remove<I, S>(&self, hashes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.write();
        for hash in hashes {
            let hash = hash.as_ref();
            inner.txs.remove(hash);
            inner.admitted_at.remove(hash);
        }
    }

    /// Remove entries that have reached the age cap. Idempotent; runs on
    /// the scheduled sweep. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.write();
        let cutoff = self.config.max_tx_age;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .admitted_at
            .iter()
            .filter(|(_, admitted)| now.duration_since(**admitted) >= cutoff)
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in &expired {
            inner.txs.remove(hash);
            inner.admitted_at.remove(hash);
        }
        if !expired.is_empty() {
            info!("mempool sweep evicted {} aged entries", expired.len());
        }
        expired.len()
    }

    /// Backdate an entry's admission time. Test hook for sweep coverage.
    #[doc(hidden)]
    pub fn backdate(&self, hash: &str, age: Duration) {
        if let Some(admitted) = self.inner.write().admitted_at.get_mut(hash) {
            *admitted -= age;
        }
    }
}

/// Drop the lowest ⌈10%⌉ of entries by fee density. Returns the count shed.
fn shed_lowest_density(inner: &mut Inner) -> usize {
    let count = inner.txs.len().div_ceil(10);
    let mut ordered: Vec<&Transaction> = inner.txs.values().collect();
    ordered.sort_by(|a, b| a.cmp_fee_density(b));
    let victims: Vec<String> = ordered
        .into_iter()
        .take(count)
        .map(|tx| tx.hash.clone())
        .collect();
    for hash in &victims {
        inner.txs.remove(hash);
        inner.admitted_at.remove(hash);
    }
    victims.len()
}
