//! Token usage accounting.
//!
//! The [`UsageLedger`] keeps the running token count for the signed-in user,
//! mirrors it to a [`UsageStore`] under `users/{user_id}/token_usage`, and
//! turns it into a cost estimate with a configurable [`CostRate`].
//!
//! Increments are applied in memory first so a display can update
//! immediately.  Persistence goes through a per-ledger writer task: writes are
//! fire-and-forget for the caller but land in the store in the order they
//! were issued, so a slow write can never overwrite a newer total.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::observability::{LEDGER_LOAD_ERRORS, LEDGER_TOKENS, LEDGER_WRITE_ERRORS, LEDGER_WRITES};

/// Key under which a user's counter lives.
pub fn usage_path(user_id: &str) -> String {
    format!("users/{user_id}/token_usage")
}

//////////////////////////////////////////// Store ////////////////////////////////////////////

/// A key/value store holding one non-negative counter per path.
#[async_trait::async_trait]
pub trait UsageStore: Send + Sync {
    /// Read the counter at `path`, `None` if it was never written.
    async fn get(&self, path: &str) -> Result<Option<u64>>;

    /// Overwrite the counter at `path`.
    async fn set(&self, path: &str, value: u64) -> Result<()>;
}

/// In-process store, used for local-only sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    values: Mutex<HashMap<String, u64>>,
}

impl MemoryUsageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value without going through the async interface.
    pub fn value(&self, path: &str) -> Option<u64> {
        self.values().get(path).copied()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get(&self, path: &str) -> Result<Option<u64>> {
        Ok(self.value(path))
    }

    async fn set(&self, path: &str, value: u64) -> Result<()> {
        self.values().insert(path.to_string(), value);
        Ok(())
    }
}

/// Store backed by a JSON object on disk, keyed by path.
///
/// Every `set` rewrites the file through a temporary sibling and a rename, so
/// readers see either the old or the new map.
#[derive(Debug)]
pub struct FileUsageStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileUsageStore {
    /// Use the file at `path`, which need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, u64>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                Error::ledger_unavailable(
                    format!("corrupt usage store {}: {err}", self.path.display()),
                    Some(Box::new(err)),
                )
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(Error::ledger_unavailable(
                format!("cannot read usage store {}: {err}", self.path.display()),
                Some(Box::new(err)),
            )),
        }
    }
}

#[async_trait::async_trait]
impl UsageStore for FileUsageStore {
    async fn get(&self, path: &str) -> Result<Option<u64>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.get(path).copied())
    }

    async fn set(&self, path: &str, value: u64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(path.to_string(), value);
        let bytes = serde_json::to_vec_pretty(&map)?;

        let write_failed = |err: std::io::Error| {
            Error::ledger_unavailable(
                format!("cannot write usage store {}: {err}", self.path.display()),
                Some(Box::new(err)),
            )
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(write_failed)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_failed)?;
        Ok(())
    }
}

///////////////////////////////////////////// Cost /////////////////////////////////////////////

/// Price of one token in dollars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRate {
    dollars_per_token: f64,
}

impl CostRate {
    /// A rate expressed per token.
    pub const fn per_token(dollars: f64) -> Self {
        Self {
            dollars_per_token: dollars,
        }
    }

    /// A rate expressed per thousand tokens.
    pub fn per_thousand(dollars: f64) -> Self {
        Self::per_token(dollars / 1000.0)
    }

    /// Dollars charged for one token.
    pub fn dollars_per_token(&self) -> f64 {
        self.dollars_per_token
    }

    /// Cost of `tokens` tokens.
    pub fn cost(&self, tokens: u64) -> f64 {
        tokens as f64 * self.dollars_per_token
    }
}

impl Default for CostRate {
    fn default() -> Self {
        Self::per_token(0.000002)
    }
}

//////////////////////////////////////////// Ledger ////////////////////////////////////////////

/// Serialized form of a ledger, for suspend/resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// The user the count belongs to, if one was signed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Tokens used so far.
    pub token_usage: u64,
}

enum WriteOp {
    Persist { path: String, total: u64 },
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct LedgerState {
    token_usage: u64,
    user_id: Option<String>,
    // Increments are written under `user_id` only while attached.
    attached: bool,
    writer: Option<mpsc::UnboundedSender<WriteOp>>,
}

impl LedgerState {
    fn persist(&self) {
        if !self.attached {
            return;
        }
        if let (Some(user_id), Some(writer)) = (&self.user_id, &self.writer) {
            let op = WriteOp::Persist {
                path: usage_path(user_id),
                total: self.token_usage,
            };
            if writer.send(op).is_err() {
                tracing::warn!(total = self.token_usage, "usage writer stopped; total not persisted");
            }
        }
    }
}

/// Running token counter for one user.
///
/// ```
/// use std::sync::Arc;
/// use converso::{CostRate, MemoryUsageStore, UsageLedger};
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(MemoryUsageStore::new());
/// let ledger = UsageLedger::new(store.clone(), CostRate::default());
/// ledger.load("alice").await?;
/// ledger.add(1500);
/// ledger.flush().await;
/// assert_eq!(store.value("users/alice/token_usage"), Some(1500));
/// assert_eq!(ledger.cost_display(), "$0.00");
/// # Ok::<(), converso::Error>(())
/// # }).unwrap();
/// ```
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    rate: CostRate,
    state: Mutex<LedgerState>,
    write_error: Arc<Mutex<Option<Error>>>,
}

impl UsageLedger {
    /// Create a ledger that persists to `store` and prices tokens at `rate`.
    ///
    /// Until [`UsageLedger::load`] succeeds the ledger counts locally only.
    pub fn new(store: Arc<dyn UsageStore>, rate: CostRate) -> Self {
        Self {
            store,
            rate,
            state: Mutex::new(LedgerState::default()),
            write_error: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the user's counter from the store and start persisting to it.
    ///
    /// An absent counter is initialised to zero.  Loading the same user again
    /// reconciles: the larger of the stored and in-memory totals wins, and
    /// tokens counted while the store was unreachable are added on top of the
    /// stored value.
    ///
    /// # Errors
    ///
    /// [`Error::LedgerUnavailable`] if the store cannot be read or
    /// initialised.  The ledger then keeps counting locally for this user,
    /// without persisting, until a later `load` succeeds.
    pub async fn load(&self, user_id: &str) -> Result<u64> {
        // Writes queued so far must be visible to the read below.
        self.flush().await;
        let path = usage_path(user_id);
        let remote = match self.read_or_init(&path).await {
            Ok(remote) => remote,
            Err(err) => {
                LEDGER_LOAD_ERRORS.click();
                tracing::warn!(user_id, error = %err, "usage store unavailable; counting locally");
                let mut state = self.lock();
                if state.user_id.as_deref() != Some(user_id) {
                    state.token_usage = 0;
                    state.user_id = Some(user_id.to_string());
                }
                state.attached = false;
                return Err(err);
            }
        };

        let mut state = self.lock();
        let total = if state.user_id.as_deref() != Some(user_id) {
            remote
        } else if state.attached {
            remote.max(state.token_usage)
        } else {
            remote.saturating_add(state.token_usage)
        };
        state.token_usage = total;
        state.user_id = Some(user_id.to_string());
        if self.attach(&mut state) && total > remote {
            state.persist();
        }
        tracing::debug!(user_id, total, "usage ledger loaded");
        Ok(total)
    }

    async fn read_or_init(&self, path: &str) -> Result<u64> {
        match self.store.get(path).await.map_err(unavailable)? {
            Some(remote) => Ok(remote),
            None => {
                self.store.set(path, 0).await.map_err(unavailable)?;
                Ok(0)
            }
        }
    }

    /// Start writing increments for the current user, spawning the writer
    /// task on first use.  Every write of this ledger goes through that one
    /// task, so they land in the order they were queued.
    fn attach(&self, state: &mut LedgerState) -> bool {
        if state.writer.as_ref().is_none_or(|writer| writer.is_closed()) {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                tracing::warn!("no async runtime; usage will not be persisted");
                state.attached = false;
                return false;
            };
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(write_loop(
                Arc::clone(&self.store),
                rx,
                Arc::clone(&self.write_error),
            ));
            state.writer = Some(tx);
        }
        state.attached = true;
        true
    }

    /// Add a completion's tokens and return the new total.
    ///
    /// The in-memory total changes before this returns.  Persisting it is
    /// queued; a failed write is logged and kept for
    /// [`UsageLedger::take_write_error`] but never rolls the total back.
    pub fn add(&self, tokens: u64) -> u64 {
        let mut state = self.lock();
        state.token_usage = state.token_usage.saturating_add(tokens);
        LEDGER_TOKENS.count(tokens);
        state.persist();
        state.token_usage
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let writer = self.lock().writer.clone();
        if let Some(writer) = writer {
            let (tx, rx) = oneshot::channel();
            if writer.send(WriteOp::Flush(tx)).is_ok() {
                let _ = rx.await;
            }
        }
    }

    /// Tokens used so far.
    pub fn token_usage(&self) -> u64 {
        self.lock().token_usage
    }

    /// The user the ledger was last loaded for.
    pub fn user_id(&self) -> Option<String> {
        self.lock().user_id.clone()
    }

    /// Returns true if increments are being written to the store.
    pub fn is_persisting(&self) -> bool {
        let state = self.lock();
        state.attached && state.writer.is_some()
    }

    /// The price used for cost estimates.
    pub fn rate(&self) -> CostRate {
        self.rate
    }

    /// Estimated dollars spent so far.
    pub fn estimated_cost(&self) -> f64 {
        self.rate.cost(self.token_usage())
    }

    /// Estimated cost rounded to cents, e.g. `$0.01`.
    pub fn cost_display(&self) -> String {
        format!("${:.2}", self.estimated_cost())
    }

    /// Two-line usage summary for display.
    pub fn usage_display(&self) -> String {
        let tokens = self.token_usage();
        format!(
            "Usage: {tokens} tokens\nCost: ${:.2}",
            self.rate.cost(tokens)
        )
    }

    /// The most recent persistence failure, if any, clearing it.
    pub fn take_write_error(&self) -> Option<Error> {
        self.write_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Capture the counter for suspend/resume.
    pub fn serialize(&self) -> LedgerSnapshot {
        let state = self.lock();
        LedgerSnapshot {
            user_id: state.user_id.clone(),
            token_usage: state.token_usage,
        }
    }

    /// Restore a counter captured by [`UsageLedger::serialize`] without
    /// consulting the store.
    ///
    /// Restoring into the snapshot's own user never lowers the total.  A
    /// ledger that holds another user, or none, takes the snapshot over and
    /// resumes persisting for the snapshot's user; the next increment writes
    /// the restored total plus the increment.
    pub fn restore(&self, snapshot: LedgerSnapshot) {
        let mut state = self.lock();
        if state.user_id == snapshot.user_id {
            if snapshot.token_usage > state.token_usage {
                state.token_usage = snapshot.token_usage;
                state.persist();
            }
            return;
        }
        state.token_usage = snapshot.token_usage;
        state.user_id = snapshot.user_id;
        if state.user_id.is_some() {
            self.attach(&mut state);
        } else {
            state.attached = false;
        }
        tracing::debug!(user_id = ?state.user_id, total = state.token_usage, "usage ledger restored");
    }

    /// Forget the current user, e.g. on sign-out.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.token_usage = 0;
        state.user_id = None;
        state.attached = false;
    }
}

fn unavailable(err: Error) -> Error {
    if err.is_ledger_unavailable() {
        err
    } else {
        Error::ledger_unavailable(err.to_string(), Some(Box::new(err)))
    }
}

async fn write_loop(
    store: Arc<dyn UsageStore>,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    write_error: Arc<Mutex<Option<Error>>>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Persist { path, total } => match store.set(&path, total).await {
                Ok(()) => LEDGER_WRITES.click(),
                Err(err) => {
                    LEDGER_WRITE_ERRORS.click();
                    tracing::warn!(path = %path, total, error = %err, "failed to persist token usage");
                    *write_error
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err);
                }
            },
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryUsageStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        writes: Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl UsageStore for FlakyStore {
        async fn get(&self, path: &str) -> Result<Option<u64>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(Error::connection("store offline", None));
            }
            self.inner.get(path).await
        }

        async fn set(&self, path: &str, value: u64) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::connection("store offline", None));
            }
            self.writes.lock().unwrap().push(value);
            self.inner.set(path, value).await
        }
    }

    #[tokio::test]
    async fn empty_store_initialised_to_zero() {
        let store = Arc::new(MemoryUsageStore::new());
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        assert_eq!(ledger.load("alice").await.unwrap(), 0);
        assert_eq!(store.value("users/alice/token_usage"), Some(0));
        assert!(ledger.is_persisting());
    }

    #[tokio::test]
    async fn add_persists_in_order() {
        let store = Arc::new(FlakyStore::default());
        store.inner.set("users/alice/token_usage", 100).await.unwrap();
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        assert_eq!(ledger.load("alice").await.unwrap(), 100);

        assert_eq!(ledger.add(5), 105);
        assert_eq!(ledger.add(7), 112);
        assert_eq!(ledger.add(1), 113);
        ledger.flush().await;

        assert_eq!(*store.writes.lock().unwrap(), vec![105, 112, 113]);
        assert_eq!(store.inner.value("users/alice/token_usage"), Some(113));
    }

    #[tokio::test]
    async fn failed_writes_do_not_roll_back() {
        let store = Arc::new(FlakyStore::default());
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.load("alice").await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        ledger.add(5);
        ledger.flush().await;
        assert!(ledger.take_write_error().is_some());
        assert!(ledger.take_write_error().is_none());

        store.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(ledger.add(7), 12);
        ledger.flush().await;
        assert_eq!(ledger.token_usage(), 12);
        assert_eq!(store.inner.value("users/alice/token_usage"), Some(12));
    }

    #[tokio::test]
    async fn unavailable_store_counts_locally_then_reconciles() {
        let store = Arc::new(FlakyStore::default());
        store.inner.set("users/alice/token_usage", 10).await.unwrap();
        store.fail_reads.store(true, Ordering::SeqCst);

        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        let err = ledger.load("alice").await.unwrap_err();
        assert!(err.is_ledger_unavailable());
        assert!(!ledger.is_persisting());

        assert_eq!(ledger.add(5), 5);
        ledger.flush().await;
        assert!(store.writes.lock().unwrap().is_empty());

        store.fail_reads.store(false, Ordering::SeqCst);
        assert_eq!(ledger.load("alice").await.unwrap(), 15);
        ledger.flush().await;
        assert_eq!(store.inner.value("users/alice/token_usage"), Some(15));
    }

    #[tokio::test]
    async fn reload_keeps_larger_total() {
        let store = Arc::new(FlakyStore::default());
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.load("alice").await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        ledger.add(9);
        ledger.flush().await;
        store.fail_writes.store(false, Ordering::SeqCst);

        assert_eq!(ledger.load("alice").await.unwrap(), 9);
        ledger.flush().await;
        assert_eq!(store.inner.value("users/alice/token_usage"), Some(9));
    }

    #[tokio::test]
    async fn switching_users_does_not_leak_usage() {
        let store = Arc::new(MemoryUsageStore::new());
        store.set("users/bob/token_usage", 3).await.unwrap();
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.load("alice").await.unwrap();
        ledger.add(50);

        assert_eq!(ledger.load("bob").await.unwrap(), 3);
        ledger.reset();
        assert_eq!(ledger.token_usage(), 0);
        assert_eq!(ledger.user_id(), None);
    }

    /// Smaller totals take longer to write, so two writers racing on one
    /// path would leave the older total behind.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryUsageStore,
        writes: Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl UsageStore for SlowStore {
        async fn get(&self, path: &str) -> Result<Option<u64>> {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            self.inner.get(path).await
        }

        async fn set(&self, path: &str, value: u64) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(1000 / (value + 1))).await;
            self.writes.lock().unwrap().push(value);
            self.inner.set(path, value).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn add_during_reload_keeps_write_order() {
        let store = Arc::new(SlowStore::default());
        let ledger = Arc::new(UsageLedger::new(store.clone(), CostRate::default()));
        ledger.load("alice").await.unwrap();

        let reload = tokio::spawn({
            let ledger = Arc::clone(&ledger);
            async move { ledger.load("alice").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(ledger.add(3), 3);
        assert_eq!(reload.await.unwrap().unwrap(), 3);
        assert_eq!(ledger.add(4), 7);
        ledger.flush().await;

        let writes = store.writes.lock().unwrap().clone();
        assert!(writes.windows(2).all(|pair| pair[0] <= pair[1]), "{writes:?}");
        assert_eq!(store.inner.value("users/alice/token_usage"), Some(7));
    }

    #[tokio::test]
    async fn restoring_older_snapshot_never_lowers_usage() {
        let store = Arc::new(MemoryUsageStore::new());
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.load("alice").await.unwrap();
        ledger.add(10);
        let snapshot = ledger.serialize();
        ledger.add(90);
        ledger.flush().await;
        assert_eq!(store.value("users/alice/token_usage"), Some(100));

        ledger.restore(snapshot);
        assert_eq!(ledger.token_usage(), 100);
        assert_eq!(ledger.add(5), 105);
        ledger.flush().await;
        assert_eq!(store.value("users/alice/token_usage"), Some(105));
    }

    #[tokio::test]
    async fn resumed_ledger_keeps_persisting() {
        let store = Arc::new(MemoryUsageStore::new());
        store.set("users/alice/token_usage", 100).await.unwrap();

        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.restore(LedgerSnapshot {
            user_id: Some("alice".to_string()),
            token_usage: 100,
        });
        assert!(ledger.is_persisting());
        assert_eq!(ledger.user_id().as_deref(), Some("alice"));
        assert_eq!(ledger.add(5), 105);
        ledger.flush().await;
        assert_eq!(store.value("users/alice/token_usage"), Some(105));

        assert_eq!(ledger.load("alice").await.unwrap(), 105);
    }

    #[tokio::test]
    async fn reset_then_load_reuses_writer() {
        let store = Arc::new(FlakyStore::default());
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.load("alice").await.unwrap();
        ledger.add(4);
        ledger.reset();
        assert!(!ledger.is_persisting());
        assert_eq!(ledger.add(1), 1);

        assert_eq!(ledger.load("alice").await.unwrap(), 4);
        ledger.flush().await;
        assert_eq!(*store.writes.lock().unwrap(), vec![0, 4]);
    }

    #[test]
    fn cost_formats_to_cents() {
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), CostRate::default());
        ledger.add(3141);
        assert_eq!(ledger.cost_display(), "$0.01");
        assert_eq!(ledger.usage_display(), "Usage: 3141 tokens\nCost: $0.01");

        ledger.add(2_000_000);
        assert_eq!(ledger.cost_display(), "$4.01");
    }

    #[test]
    fn both_rate_variants_agree() {
        let per_token = CostRate::per_token(0.000002);
        let per_thousand = CostRate::per_thousand(0.002);
        assert!((per_token.cost(1_000_000) - per_thousand.cost(1_000_000)).abs() < 1e-9);
    }

    #[test]
    fn snapshot_round_trip() {
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), CostRate::default());
        ledger.add(42);
        let snapshot = ledger.serialize();

        let resumed = UsageLedger::new(Arc::new(MemoryUsageStore::new()), CostRate::default());
        resumed.restore(snapshot.clone());
        assert_eq!(resumed.token_usage(), 42);
        assert_eq!(resumed.serialize(), snapshot);
        assert!(!resumed.is_persisting());
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("converso-ledger-{}", std::process::id()));
        let path = dir.join("nested").join("usage.json");
        let store = FileUsageStore::new(&path);
        assert_eq!(store.get("users/alice/token_usage").await.unwrap(), None);

        store.set("users/alice/token_usage", 7).await.unwrap();
        store.set("users/bob/token_usage", 9).await.unwrap();

        let reopened = FileUsageStore::new(&path);
        assert_eq!(reopened.get("users/alice/token_usage").await.unwrap(), Some(7));
        assert_eq!(reopened.get("users/bob/token_usage").await.unwrap(), Some(9));

        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(reopened.get("users/alice/token_usage").await.unwrap_err().is_ledger_unavailable());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
