use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    domain::{Habit, Plan, UserId, UserRecord},
    errors::Error,
    storage::StoragePort,
    Result,
};

/// Read-only plan/limit snapshot for one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanStatus {
    pub plan: Plan,
    pub count: usize,
    pub limit: usize,
}

/// Per-user lock registry: operations for the same user serialize, operations
/// for different users proceed independently.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id.0)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Owns the user/habit aggregate and enforces plan-limited mutations.
///
/// Every mutation runs under the per-user lock, persists through the storage
/// port, and only then publishes the new record to the in-memory map. A
/// persistence failure therefore leaves the in-memory view untouched and the
/// durable and in-memory states never diverge.
pub struct HabitStore {
    storage: Arc<dyn StoragePort>,
    users: Mutex<HashMap<UserId, UserRecord>>,
    locks: UserLocks,
}

impl HabitStore {
    /// Build a store over an already-loaded state snapshot.
    pub fn new(storage: Arc<dyn StoragePort>, users: HashMap<UserId, UserRecord>) -> Self {
        Self {
            storage,
            users: Mutex::new(users),
            locks: UserLocks::default(),
        }
    }

    /// Read the full state from the backend and build a store over it.
    pub async fn open(storage: Arc<dyn StoragePort>) -> Result<Self> {
        let users = storage.load_all().await?;
        Ok(Self::new(storage, users))
    }

    /// Return the user's record, creating (and persisting) a fresh `free`
    /// record on first interaction. Idempotent.
    pub async fn ensure_user(&self, user_id: UserId) -> Result<UserRecord> {
        let _guard = self.locks.lock_user(user_id).await;

        if let Some(existing) = self.get(user_id).await {
            return Ok(existing);
        }

        let record = UserRecord::default();
        self.storage.save(user_id, &record).await?;
        self.users.lock().await.insert(user_id, record.clone());
        tracing::debug!(user_id = user_id.0, "created user");
        Ok(record)
    }

    /// Current plan, habit count, and plan limit. Read-only.
    pub async fn plan_status(&self, user_id: UserId) -> PlanStatus {
        let record = self.get(user_id).await.unwrap_or_default();
        PlanStatus {
            plan: record.plan,
            count: record.habits.len(),
            limit: record.plan.habit_limit(),
        }
    }

    /// Habits in insertion order. Empty if the user is unknown. Read-only.
    pub async fn list_habits(&self, user_id: UserId) -> Vec<Habit> {
        self.get(user_id)
            .await
            .map(|r| r.habits)
            .unwrap_or_default()
    }

    /// Register a new habit.
    ///
    /// Failure order is fixed: empty name, then duplicate, then plan limit.
    /// The habit starts out not completed.
    pub async fn add_habit(&self, user_id: UserId, name: &str) -> Result<Habit> {
        let _guard = self.locks.lock_user(user_id).await;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        let mut record = self.get(user_id).await.unwrap_or_default();

        if let Some(idx) = find_by_name(&record.habits, name) {
            return Err(Error::DuplicateName {
                name: record.habits[idx].name.clone(),
            });
        }

        let limit = record.plan.habit_limit();
        if record.habits.len() >= limit {
            return Err(Error::LimitReached { limit });
        }

        let habit = Habit::new(name);
        record.habits.push(habit.clone());

        self.commit(user_id, record).await?;
        Ok(habit)
    }

    /// Toggle a habit's completion flag and return the updated habit.
    ///
    /// A selector that parses as an integer is a 1-based index into the
    /// insertion order and is never reinterpreted as a name; anything else is
    /// a case-insensitive exact name match.
    pub async fn check_habit(&self, user_id: UserId, selector: &str) -> Result<Habit> {
        let _guard = self.locks.lock_user(user_id).await;

        let selector = selector.trim();
        let mut record = self.get(user_id).await.unwrap_or_default();

        let idx = match selector.parse::<i64>() {
            Ok(n) => {
                if n < 1 || n as usize > record.habits.len() {
                    return Err(Error::NotFound {
                        selector: selector.to_string(),
                    });
                }
                (n - 1) as usize
            }
            Err(_) => find_by_name(&record.habits, selector).ok_or_else(|| Error::NotFound {
                selector: selector.to_string(),
            })?,
        };

        record.habits[idx].completed_today = !record.habits[idx].completed_today;
        let habit = record.habits[idx].clone();

        self.commit(user_id, record).await?;
        Ok(habit)
    }

    async fn get(&self, user_id: UserId) -> Option<UserRecord> {
        self.users.lock().await.get(&user_id).cloned()
    }

    /// Persist first; publish to the in-memory map only on success.
    async fn commit(&self, user_id: UserId, record: UserRecord) -> Result<()> {
        self.storage.save(user_id, &record).await?;
        self.users.lock().await.insert(user_id, record);
        Ok(())
    }
}

fn find_by_name(habits: &[Habit], name: &str) -> Option<usize> {
    let needle = name.to_lowercase();
    habits.iter().position(|h| h.name.to_lowercase() == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        state: std::sync::Mutex<HashMap<UserId, UserRecord>>,
        fail_saves: AtomicBool,
        saves: AtomicUsize,
    }

    impl MemoryStore {
        fn with_user(user_id: UserId, record: UserRecord) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().insert(user_id, record);
            store
        }

        fn save_calls(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        fn set_failing(&self, failing: bool) {
            self.fail_saves.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StoragePort for MemoryStore {
        async fn load_all(&self) -> Result<HashMap<UserId, UserRecord>> {
            Ok(self.state.lock().unwrap().clone())
        }

        async fn save(&self, user_id: UserId, record: &UserRecord) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk unavailable".to_string()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.state.lock().unwrap().insert(user_id, record.clone());
            Ok(())
        }
    }

    fn store() -> (Arc<MemoryStore>, HabitStore) {
        let backend = Arc::new(MemoryStore::default());
        let store = HabitStore::new(backend.clone(), HashMap::new());
        (backend, store)
    }

    const U: UserId = UserId(42);

    #[tokio::test]
    async fn ensure_user_is_idempotent_and_persists_once() {
        let (backend, store) = store();

        let first = store.ensure_user(U).await.unwrap();
        assert_eq!(first.plan, Plan::Free);
        assert!(first.habits.is_empty());

        let second = store.ensure_user(U).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.save_calls(), 1);
    }

    #[tokio::test]
    async fn plan_status_counts_match_list() {
        let (_, store) = store();

        store.add_habit(U, "Beber agua").await.unwrap();
        store.add_habit(U, "Meditar").await.unwrap();
        store.check_habit(U, "1").await.unwrap();

        let status = store.plan_status(U).await;
        assert_eq!(status.plan, Plan::Free);
        assert_eq!(status.limit, 3);
        assert_eq!(status.count, store.list_habits(U).await.len());
        assert_eq!(status.count, 2);
    }

    #[tokio::test]
    async fn unknown_user_reads_as_empty_free() {
        let (backend, store) = store();

        let status = store.plan_status(U).await;
        assert_eq!(status, PlanStatus { plan: Plan::Free, count: 0, limit: 3 });
        assert!(store.list_habits(U).await.is_empty());
        // Reads never persist anything.
        assert_eq!(backend.save_calls(), 0);
    }

    #[tokio::test]
    async fn add_rejects_empty_and_whitespace_names() {
        let (backend, store) = store();

        assert!(matches!(store.add_habit(U, "").await, Err(Error::EmptyName)));
        assert!(matches!(store.add_habit(U, "   ").await, Err(Error::EmptyName)));
        assert_eq!(backend.save_calls(), 0);
    }

    #[tokio::test]
    async fn add_trims_and_preserves_original_case() {
        let (_, store) = store();

        let habit = store.add_habit(U, "  Beber Agua  ").await.unwrap();
        assert_eq!(habit.name, "Beber Agua");
        assert!(!habit.completed_today);
        assert_eq!(store.list_habits(U).await[0].name, "Beber Agua");
    }

    #[tokio::test]
    async fn duplicate_names_rejected_case_insensitively() {
        let (backend, store) = store();

        store.add_habit(U, "Leer").await.unwrap();
        let saves_before = backend.save_calls();

        for dup in ["Leer", "leer", "LEER", " leer "] {
            match store.add_habit(U, dup).await {
                Err(Error::DuplicateName { name }) => assert_eq!(name, "Leer"),
                other => panic!("expected DuplicateName, got {other:?}"),
            }
        }

        assert_eq!(store.plan_status(U).await.count, 1);
        assert_eq!(backend.save_calls(), saves_before);
    }

    #[tokio::test]
    async fn free_plan_caps_at_three_habits() {
        let (_, store) = store();

        store.add_habit(U, "Beber agua").await.unwrap();
        store.add_habit(U, "Meditar").await.unwrap();
        store.add_habit(U, "Leer").await.unwrap();

        match store.add_habit(U, "Ejercicio").await {
            Err(Error::LimitReached { limit }) => assert_eq!(limit, 3),
            other => panic!("expected LimitReached, got {other:?}"),
        }

        let names: Vec<_> = store
            .list_habits(U)
            .await
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, ["Beber agua", "Meditar", "Leer"]);
    }

    #[tokio::test]
    async fn duplicate_takes_precedence_over_limit() {
        let (_, store) = store();

        for name in ["A", "B", "C"] {
            store.add_habit(U, name).await.unwrap();
        }

        // At the limit, re-adding an existing name must report the duplicate,
        // not the full plan.
        assert!(matches!(
            store.add_habit(U, "b").await,
            Err(Error::DuplicateName { .. })
        ));
    }

    #[tokio::test]
    async fn pro_plan_limit_honored_from_loaded_state() {
        let mut record = UserRecord {
            plan: Plan::Pro,
            habits: Vec::new(),
        };
        for i in 0..15 {
            record.habits.push(Habit::new(format!("habit-{i}")));
        }
        let backend = Arc::new(MemoryStore::with_user(U, record));
        let store = HabitStore::open(backend).await.unwrap();

        let status = store.plan_status(U).await;
        assert_eq!(status.plan, Plan::Pro);
        assert_eq!(status.limit, 15);

        assert!(matches!(
            store.add_habit(U, "one more").await,
            Err(Error::LimitReached { limit: 15 })
        ));
    }

    #[tokio::test]
    async fn check_toggles_and_is_its_own_inverse() {
        let (_, store) = store();

        store.add_habit(U, "Leer").await.unwrap();

        let toggled = store.check_habit(U, "Leer").await.unwrap();
        assert!(toggled.completed_today);

        let back = store.check_habit(U, "1").await.unwrap();
        assert_eq!(back.name, "Leer");
        assert!(!back.completed_today);
    }

    #[tokio::test]
    async fn check_matches_names_case_insensitively() {
        let (_, store) = store();

        store.add_habit(U, "Beber Agua").await.unwrap();
        let habit = store.check_habit(U, "beber agua").await.unwrap();
        assert!(habit.completed_today);
    }

    #[tokio::test]
    async fn numeric_selector_is_an_index_even_when_a_habit_has_that_name() {
        let (_, store) = store();

        store.add_habit(U, "Leer").await.unwrap();
        store.add_habit(U, "1").await.unwrap();

        // "1" resolves as position 1, i.e. "Leer", never the habit named "1".
        let habit = store.check_habit(U, "1").await.unwrap();
        assert_eq!(habit.name, "Leer");

        // An out-of-range number stays an index: habit "1" is unreachable
        // through selector "5" even though names would not match either.
        store.add_habit(U, "5").await.unwrap();
        assert!(matches!(
            store.check_habit(U, "5").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn check_rejects_out_of_range_and_unknown_selectors() {
        let (backend, store) = store();

        store.add_habit(U, "Leer").await.unwrap();
        let saves_before = backend.save_calls();

        for selector in ["0", "2", "-1", "Nonexistent", ""] {
            assert!(
                matches!(
                    store.check_habit(U, selector).await,
                    Err(Error::NotFound { .. })
                ),
                "selector {selector:?} should be NotFound"
            );
        }

        // State unchanged: nothing was persisted and the flag is untouched.
        assert_eq!(backend.save_calls(), saves_before);
        assert!(!store.list_habits(U).await[0].completed_today);
    }

    #[tokio::test]
    async fn storage_failure_leaves_memory_untouched() {
        let (backend, store) = store();

        store.add_habit(U, "Leer").await.unwrap();
        backend.set_failing(true);

        assert!(matches!(
            store.add_habit(U, "Meditar").await,
            Err(Error::Storage(_))
        ));
        assert!(matches!(
            store.check_habit(U, "Leer").await,
            Err(Error::Storage(_))
        ));

        // The failed operations left no trace.
        let habits = store.list_habits(U).await;
        assert_eq!(habits.len(), 1);
        assert!(!habits[0].completed_today);

        // And the store recovers once the backend does.
        backend.set_failing(false);
        store.add_habit(U, "Meditar").await.unwrap();
        assert_eq!(store.plan_status(U).await.count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_adds_at_limit_boundary_admit_exactly_one() {
        let (_, store) = store();
        let store = Arc::new(store);

        store.add_habit(U, "A").await.unwrap();
        store.add_habit(U, "B").await.unwrap();

        // One slot left. Two simultaneous adds must not both pass the limit
        // check.
        let s1 = store.clone();
        let s2 = store.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.add_habit(U, "C").await }),
            tokio::spawn(async move { s2.add_habit(U, "D").await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        let oks = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::LimitReached { limit: 3 }))));
        assert_eq!(store.plan_status(U).await.count, 3);
    }

    #[tokio::test]
    async fn operations_on_different_users_do_not_interfere() {
        let (_, store) = store();
        let other = UserId(7);

        store.add_habit(U, "Leer").await.unwrap();
        store.add_habit(other, "Leer").await.unwrap();
        store.check_habit(other, "Leer").await.unwrap();

        assert!(!store.list_habits(U).await[0].completed_today);
        assert!(store.list_habits(other).await[0].completed_today);
    }
}
