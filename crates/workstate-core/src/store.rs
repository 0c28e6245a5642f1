//! In-memory registry of reporting sessions and their threads.
//!
//! All state sits behind a single store-wide lock. Sessions and their thread
//! maps are always mutated and read together, so a snapshot sees either the
//! whole effect of an upsert or none of it.

use crate::{
    ReportFields, Staleness, StalenessPolicy, Status, DEFAULT_DEPARTED_RETENTION,
    DEFAULT_THREAD_EXPIRY, MAX_DEPARTED, MAX_TASK_HISTORY, NO_RISK,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    mem,
    time::Duration,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub staleness: StalenessPolicy,
    pub thread_expiry: Duration,
    pub history_limit: usize,
    pub departed_limit: usize,
    pub departed_retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            staleness: StalenessPolicy::default(),
            thread_expiry: DEFAULT_THREAD_EXPIRY,
            history_limit: MAX_TASK_HISTORY,
            departed_limit: MAX_DEPARTED,
            departed_retention: DEFAULT_DEPARTED_RETENTION,
        }
    }
}

/// What an upsert did. Only used for logging; upserts never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The record reported `Done` and was removed.
    Finished,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepartReason {
    Done,
    Deleted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_threads: usize,
    pub purged_departed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadView {
    pub thread_id: String,
    pub session_id: String,
    pub name: String,
    pub task: String,
    pub status: Status,
    pub risk: String,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub staleness: Staleness,
    pub idle_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub name: String,
    pub task: String,
    pub status: Status,
    pub risk: String,
    pub placeholder: bool,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub staleness: Staleness,
    pub idle_seconds: u64,
    pub history: Vec<String>,
    pub threads: Vec<ThreadView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartedView {
    pub session_id: String,
    pub name: String,
    pub last_task: String,
    pub reason: DepartReason,
    pub departed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub sessions: usize,
    pub threads: usize,
}

/// Point-in-time view of the whole store, with staleness resolved against
/// `taken_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub sessions: Vec<SessionView>,
    /// Recently removed sessions, newest first.
    pub departed: Vec<DepartedView>,
    pub counts: Counts,
    pub taken_at: DateTime<Utc>,
}

struct ThreadRecord {
    seq: u64,
    session_id: String,
    thread_id: String,
    name: String,
    task: String,
    status: Status,
    risk: String,
    started_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
}

impl ThreadRecord {
    fn new(
        seq: u64,
        session_id: &str,
        thread_id: &str,
        fields: ReportFields,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            seq,
            session_id: session_id.to_string(),
            thread_id: thread_id.to_string(),
            name: fields.name.unwrap_or_else(|| thread_id.to_string()),
            task: fields.task.unwrap_or_default(),
            status: fields.status.unwrap_or_default(),
            risk: fields.risk.unwrap_or_else(|| NO_RISK.to_string()),
            started_at: now,
            last_update: now,
        }
    }

    fn apply(&mut self, fields: ReportFields, now: DateTime<Utc>) {
        if let Some(name) = fields.name {
            self.name = name;
        }
        if let Some(task) = fields.task {
            self.task = task;
        }
        if let Some(status) = fields.status {
            self.status = status;
        }
        if let Some(risk) = fields.risk {
            self.risk = risk;
        }
        self.last_update = advance(self.last_update, now);
    }

    fn view(&self, policy: &StalenessPolicy, now: DateTime<Utc>) -> ThreadView {
        let idle = elapsed(now, self.last_update);
        ThreadView {
            thread_id: self.thread_id.clone(),
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            task: self.task.clone(),
            status: self.status.clone(),
            risk: self.risk.clone(),
            started_at: self.started_at,
            last_update: self.last_update,
            staleness: policy.classify(idle),
            idle_seconds: idle.as_secs(),
        }
    }
}

struct SessionRecord {
    seq: u64,
    session_id: String,
    name: String,
    task: String,
    status: Status,
    risk: String,
    placeholder: bool,
    started_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
    history: VecDeque<String>,
    next_thread_seq: u64,
    threads: HashMap<String, ThreadRecord>,
}

impl SessionRecord {
    fn new(seq: u64, session_id: &str, fields: ReportFields, now: DateTime<Utc>) -> Self {
        Self {
            seq,
            session_id: session_id.to_string(),
            name: fields.name.unwrap_or_else(|| session_id.to_string()),
            task: fields.task.unwrap_or_default(),
            status: fields.status.unwrap_or_default(),
            risk: fields.risk.unwrap_or_else(|| NO_RISK.to_string()),
            placeholder: false,
            started_at: now,
            last_update: now,
            history: VecDeque::new(),
            next_thread_seq: 0,
            threads: HashMap::new(),
        }
    }

    fn placeholder(seq: u64, session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            placeholder: true,
            ..Self::new(seq, session_id, ReportFields::default(), now)
        }
    }

    fn apply(&mut self, fields: ReportFields, now: DateTime<Utc>, history_limit: usize) {
        if let Some(name) = fields.name {
            self.name = name;
        }
        if let Some(task) = fields.task {
            if task != self.task {
                let previous = mem::replace(&mut self.task, task);
                if history_limit > 0 {
                    self.history.push_back(previous);
                    while self.history.len() > history_limit {
                        self.history.pop_front();
                    }
                }
            }
        }
        if let Some(status) = fields.status {
            self.status = status;
        }
        if let Some(risk) = fields.risk {
            self.risk = risk;
        }
        self.placeholder = false;
        self.last_update = advance(self.last_update, now);
    }

    fn view(&self, policy: &StalenessPolicy, now: DateTime<Utc>) -> SessionView {
        let idle = elapsed(now, self.last_update);
        let mut threads: Vec<&ThreadRecord> = self.threads.values().collect();
        threads.sort_by_key(|thread| thread.seq);
        SessionView {
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            task: self.task.clone(),
            status: self.status.clone(),
            risk: self.risk.clone(),
            placeholder: self.placeholder,
            started_at: self.started_at,
            last_update: self.last_update,
            staleness: policy.classify(idle),
            idle_seconds: idle.as_secs(),
            history: self.history.iter().cloned().collect(),
            threads: threads
                .into_iter()
                .map(|thread| thread.view(policy, now))
                .collect(),
        }
    }
}

struct DepartedRecord {
    session_id: String,
    name: String,
    last_task: String,
    reason: DepartReason,
    departed_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    next_seq: u64,
    sessions: HashMap<String, SessionRecord>,
    departed: VecDeque<DepartedRecord>,
}

impl StoreInner {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn depart(
        &mut self,
        record: SessionRecord,
        reason: DepartReason,
        now: DateTime<Utc>,
        limit: usize,
    ) {
        if limit == 0 {
            return;
        }
        self.departed.push_back(DepartedRecord {
            session_id: record.session_id,
            name: record.name,
            last_task: record.task,
            reason,
            departed_at: now,
        });
        while self.departed.len() > limit {
            self.departed.pop_front();
        }
    }
}

/// Authoritative state of all sessions and threads.
///
/// Every operation comes in a wall-clock form and an `_at` form taking the
/// current time explicitly.
pub struct SessionStore {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    pub async fn upsert_session(&self, session_id: &str, fields: ReportFields) -> UpsertOutcome {
        self.upsert_session_at(session_id, fields, Utc::now()).await
    }

    pub async fn upsert_session_at(
        &self,
        session_id: &str,
        fields: ReportFields,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let outcome = if let Some(record) = inner.sessions.get_mut(session_id) {
            record.apply(fields, now, self.config.history_limit);
            UpsertOutcome::Updated
        } else {
            let seq = inner.bump_seq();
            inner.sessions.insert(
                session_id.to_string(),
                SessionRecord::new(seq, session_id, fields, now),
            );
            UpsertOutcome::Created
        };

        let finished = inner
            .sessions
            .get(session_id)
            .is_some_and(|record| record.status.is_done());
        if finished {
            if let Some(record) = inner.sessions.remove(session_id) {
                inner.depart(record, DepartReason::Done, now, self.config.departed_limit);
            }
            return UpsertOutcome::Finished;
        }
        outcome
    }

    pub async fn upsert_thread(
        &self,
        session_id: &str,
        thread_id: &str,
        fields: ReportFields,
    ) -> UpsertOutcome {
        self.upsert_thread_at(session_id, thread_id, fields, Utc::now())
            .await
    }

    /// Creates or updates a thread. An unknown `session_id` gets a placeholder
    /// session rather than a rejection.
    pub async fn upsert_thread_at(
        &self,
        session_id: &str,
        thread_id: &str,
        fields: ReportFields,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let next_seq = &mut inner.next_seq;
        let session = inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                *next_seq += 1;
                SessionRecord::placeholder(*next_seq, session_id, now)
            });

        let outcome = if let Some(thread) = session.threads.get_mut(thread_id) {
            thread.apply(fields, now);
            UpsertOutcome::Updated
        } else {
            session.next_thread_seq += 1;
            let thread = ThreadRecord::new(session.next_thread_seq, session_id, thread_id, fields, now);
            session.threads.insert(thread_id.to_string(), thread);
            UpsertOutcome::Created
        };

        let finished = session
            .threads
            .get(thread_id)
            .is_some_and(|thread| thread.status.is_done());
        if finished {
            session.threads.remove(thread_id);
            return UpsertOutcome::Finished;
        }
        outcome
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.delete_session_at(session_id, Utc::now()).await
    }

    /// Removes a session and its threads. Returns false when the id was not
    /// registered, which is not an error.
    pub async fn delete_session_at(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().await;
        match inner.sessions.remove(session_id) {
            Some(record) => {
                inner.depart(record, DepartReason::Deleted, now, self.config.departed_limit);
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot_at(Utc::now()).await
    }

    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        let inner = self.inner.read().await;
        let policy = &self.config.staleness;

        let mut records: Vec<&SessionRecord> = inner.sessions.values().collect();
        records.sort_by_key(|record| record.seq);
        let sessions: Vec<SessionView> = records
            .into_iter()
            .map(|record| record.view(policy, now))
            .collect();

        let counts = Counts {
            sessions: sessions.len(),
            threads: sessions.iter().map(|session| session.threads.len()).sum(),
        };

        let departed = inner
            .departed
            .iter()
            .rev()
            .map(|entry| DepartedView {
                session_id: entry.session_id.clone(),
                name: entry.name.clone(),
                last_task: entry.last_task.clone(),
                reason: entry.reason,
                departed_at: entry.departed_at,
            })
            .collect();

        DashboardSnapshot {
            sessions,
            departed,
            counts,
            taken_at: now,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Drops threads idle past the expiry window and departed entries past
    /// their retention. Sessions are never removed here.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut inner = self.inner.write().await;
        let expiry = self.config.thread_expiry;
        let retention = self.config.departed_retention;

        let mut report = SweepReport::default();
        for session in inner.sessions.values_mut() {
            let before = session.threads.len();
            session
                .threads
                .retain(|_, thread| elapsed(now, thread.last_update) <= expiry);
            report.expired_threads += before - session.threads.len();
        }

        let before = inner.departed.len();
        inner
            .departed
            .retain(|entry| elapsed(now, entry.departed_at) < retention);
        report.purged_departed = before - inner.departed.len();
        report
    }
}

/// Next last-update value: `now`, or just past `previous` when the clock has
/// not moved forward.
fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + chrono::Duration::nanoseconds(1)
    }
}

fn elapsed(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}
