//! One debugging connection and the identity rules for mirrors created on it.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::connect::launch::TargetProcess;
use crate::connect::transport::Connection;
use crate::error::{JdiError, Result};
use crate::request::{Reply, Request, RequestExecutor, ReferenceTypeData};
use crate::thread::ThreadReference;
use crate::types::ReferenceType;
use crate::value::Value;
use crate::{ObjectId, ReferenceTypeId};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-owning handle from a mirror back to its session.
#[derive(Clone)]
pub struct SessionRef {
    id: SessionId,
    inner: Weak<SessionInner>,
}

impl SessionRef {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn upgrade(&self) -> Result<Session> {
        self.inner
            .upgrade()
            .map(|inner| Session { inner })
            .ok_or(JdiError::Disconnected)
    }
}

impl fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionRef").field(&self.id).finish()
    }
}

impl PartialEq for SessionRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionRef {}

impl Hash for SessionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A local handle standing in for an entity of the target.
pub trait Mirror {
    fn session_ref(&self) -> &SessionRef;

    fn session_id(&self) -> SessionId {
        self.session_ref().id()
    }

    fn session(&self) -> Result<Session> {
        self.session_ref().upgrade()
    }
}

/// `(session, remote id)` pair. Equal only within the same session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MirrorId {
    session: SessionRef,
    id: u64,
}

impl MirrorId {
    pub fn new(session: SessionRef, id: u64) -> Self {
        Self { session, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session_ref(&self) -> &SessionRef {
        &self.session
    }
}

impl Mirror for MirrorId {
    fn session_ref(&self) -> &SessionRef {
        &self.session
    }
}

/// State guarded by the session's suspend-state lock.
///
/// `version` moves forward every time the target (or one of its threads) is
/// resumed, so a holder can tell whether anything resumed since it last looked.
#[derive(Debug, Default)]
pub struct SuspendState {
    version: u64,
}

impl SuspendState {
    pub fn version(&self) -> u64 {
        self.version
    }

    fn advance(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

pub type SuspendGuard<'a> = MutexGuard<'a, SuspendState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    Keep,
    Deregister,
}

/// Receives the "about to resume" notification for a thread.
///
/// Called with the session's suspend-state lock held; implementations must not
/// try to take it again.
pub trait ThreadResumeListener: Send + Sync {
    fn thread_resuming(&self, state: &SuspendState, thread: &ThreadReference)
        -> Result<ListenerAction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registration of a [`ThreadResumeListener`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    session: SessionRef,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(session) = self.session.upgrade() {
            session.unsubscribe(self.id);
        }
    }
}

struct ListenerEntry {
    id: SubscriptionId,
    thread: ThreadReference,
    listener: Weak<dyn ThreadResumeListener>,
}

struct SessionInner {
    id: SessionId,
    executor: Arc<dyn RequestExecutor>,
    connection: Mutex<Option<Box<dyn Connection>>>,
    process: Mutex<Option<Box<dyn TargetProcess>>>,
    suspend: Mutex<SuspendState>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_subscription: AtomicU64,
    types: Mutex<HashMap<ReferenceTypeId, ReferenceType>>,
    disposed: AtomicBool,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.get_mut().take() {
            if let Err(err) = connection.close() {
                tracing::warn!(
                    target: "nova.jdi",
                    session = %self.id,
                    error = %err,
                    "failed to close connection"
                );
            }
        }
        if let Some(mut process) = self.process.get_mut().take() {
            if let Err(err) = process.kill() {
                tracing::warn!(
                    target: "nova.jdi",
                    session = %self.id,
                    error = %err,
                    "failed to kill launched target"
                );
            }
        }
    }
}

/// An established debugging connection.
///
/// The session exclusively owns the transport connection; mirrors only keep a
/// [`SessionRef`] back to it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Session {}

impl Session {
    pub fn new(connection: Box<dyn Connection>, executor: Arc<dyn RequestExecutor>) -> Self {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(target: "nova.jdi", session = %id, "session established");
        Self {
            inner: Arc::new(SessionInner {
                id,
                executor,
                connection: Mutex::new(Some(connection)),
                process: Mutex::new(None),
                suspend: Mutex::new(SuspendState::default()),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                types: Mutex::new(HashMap::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn downgrade(&self) -> SessionRef {
        SessionRef {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn mirror_id(&self, id: u64) -> MirrorId {
        MirrorId::new(self.downgrade(), id)
    }

    pub(crate) fn attach_process(&self, process: Box<dyn TargetProcess>) {
        *self.inner.process.lock() = Some(process);
    }

    /// OS process id of a target this session launched, if any.
    pub fn process_id(&self) -> Option<u32> {
        self.inner.process.lock().as_ref().map(|process| process.id())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Issues one request and waits for its reply.
    pub fn execute(&self, request: Request) -> Result<Reply> {
        let mut connection = self.inner.connection.lock();
        let connection = connection.as_deref_mut().ok_or(JdiError::Disconnected)?;
        tracing::debug!(
            target: "nova.jdi",
            session = %self.inner.id,
            command = request.name(),
            "sending request"
        );
        let reply = self.inner.executor.execute(connection, &request);
        if let Err(err) = &reply {
            tracing::debug!(
                target: "nova.jdi",
                session = %self.inner.id,
                command = request.name(),
                error = %err,
                "request failed"
            );
        }
        reply
    }

    /// Locks the suspend-state register.
    ///
    /// Hold the guard across any check-and-act sequence that depends on the
    /// target staying suspended.
    pub fn lock_suspend_state(&self) -> SuspendGuard<'_> {
        self.inner.suspend.lock()
    }

    pub fn subscribe_resume(
        &self,
        thread: &ThreadReference,
        listener: Weak<dyn ThreadResumeListener>,
    ) -> Subscription {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push(ListenerEntry {
            id,
            thread: thread.clone(),
            listener,
        });
        Subscription {
            id,
            session: self.downgrade(),
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.listeners.lock().retain(|entry| entry.id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Fires the resume notification for `thread` (or for every thread when
    /// `None`) and advances the suspend-state version.
    ///
    /// The caller proves it holds the suspend-state lock by passing the guard.
    /// Listeners that ask to be deregistered, or whose mirror is gone, are
    /// removed; each listener therefore fires at most once.
    pub(crate) fn notify_resuming(
        &self,
        state: &mut SuspendGuard<'_>,
        thread: Option<ObjectId>,
    ) -> Result<()> {
        let targets: Vec<_> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|entry| thread.map_or(true, |id| entry.thread.id() == id))
            .map(|entry| (entry.id, entry.thread.clone(), entry.listener.clone()))
            .collect();

        let mut finished = Vec::new();
        let mut result = Ok(());
        for (id, thread, listener) in targets {
            let Some(listener) = listener.upgrade() else {
                finished.push(id);
                continue;
            };
            match listener.thread_resuming(&**state, &thread) {
                Ok(ListenerAction::Keep) => {}
                Ok(ListenerAction::Deregister) => finished.push(id),
                Err(err) => {
                    finished.push(id);
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }

        if !finished.is_empty() {
            tracing::debug!(
                target: "nova.jdi",
                session = %self.inner.id,
                count = finished.len(),
                "deregistering resume listeners"
            );
            self.inner
                .listeners
                .lock()
                .retain(|entry| !finished.contains(&entry.id));
        }
        state.advance();
        result
    }

    /// Resumes every thread of the target.
    pub fn resume_all(&self) -> Result<()> {
        let mut state = self.lock_suspend_state();
        self.notify_resuming(&mut state, None)?;
        self.execute(Request::ResumeAll)?.into_ack()
    }

    /// Interns reference types so every mirror of one type shares its caches.
    pub fn reference_type(&self, data: ReferenceTypeData) -> ReferenceType {
        let mut types = self.inner.types.lock();
        types
            .entry(data.id)
            .or_insert_with(|| ReferenceType::new(self.downgrade(), data))
            .clone()
    }

    pub fn validate_mirror<M: Mirror + ?Sized>(&self, mirror: &M) -> Result<()> {
        let mirror = mirror.session_id();
        if mirror != self.inner.id {
            return Err(JdiError::SessionMismatch {
                mirror,
                current: self.inner.id,
            });
        }
        Ok(())
    }

    /// Fails with [`JdiError::NullReference`] when `mirror` is absent.
    pub fn validate_required<M: Mirror + ?Sized>(
        &self,
        mirror: Option<&M>,
        expected: &'static str,
    ) -> Result<()> {
        match mirror {
            Some(mirror) => self.validate_mirror(mirror),
            None => Err(JdiError::NullReference { expected }),
        }
    }

    /// Like [`Session::validate_required`] but an absent mirror is accepted.
    pub fn validate_optional<M: Mirror + ?Sized>(&self, mirror: Option<&M>) -> Result<()> {
        match mirror {
            Some(mirror) => self.validate_mirror(mirror),
            None => Ok(()),
        }
    }

    /// Validates every element in order, failing on the first mismatch.
    pub fn validate_mirrors<'a, M, I>(&self, mirrors: I) -> Result<()>
    where
        M: Mirror + ?Sized + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        mirrors
            .into_iter()
            .try_for_each(|mirror| self.validate_mirror(mirror))
    }

    pub fn validate_required_mirrors<'a, M, I>(&self, mirrors: I, expected: &'static str) -> Result<()>
    where
        M: Mirror + ?Sized + 'a,
        I: IntoIterator<Item = Option<&'a M>>,
    {
        mirrors
            .into_iter()
            .try_for_each(|mirror| self.validate_required(mirror, expected))
    }

    pub fn validate_optional_mirrors<'a, M, I>(&self, mirrors: I) -> Result<()>
    where
        M: Mirror + ?Sized + 'a,
        I: IntoIterator<Item = Option<&'a M>>,
    {
        mirrors
            .into_iter()
            .try_for_each(|mirror| self.validate_optional(mirror))
    }

    /// Primitive values are session-free; only object references are checked.
    pub fn validate_value(&self, value: Option<&Value>) -> Result<()> {
        match value {
            Some(Value::Object(object)) => self.validate_mirror(object),
            _ => Ok(()),
        }
    }

    /// Closes the connection and kills a launched target.
    ///
    /// Safe to call more than once; later requests fail with
    /// [`JdiError::Disconnected`].
    pub fn dispose(&self) -> Result<()> {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(target: "nova.jdi", session = %self.inner.id, "disposing session");

        // Best effort: the target may already be gone, and `execute` logs failures.
        self.execute(Request::Dispose).ok();
        let connection = self.inner.connection.lock().take();
        let mut result = Ok(());
        if let Some(mut connection) = connection {
            if let Err(err) = connection.close() {
                tracing::warn!(
                    target: "nova.jdi",
                    session = %self.inner.id,
                    error = %err,
                    "failed to close connection"
                );
                result = Err(err);
            }
        }
        if let Some(mut process) = self.inner.process.lock().take() {
            if let Err(err) = process.kill() {
                tracing::warn!(
                    target: "nova.jdi",
                    session = %self.inner.id,
                    error = %err,
                    "failed to kill launched target"
                );
            }
        }
        self.inner.listeners.lock().clear();
        result
    }
}

/// Builds sessions out of freshly negotiated connections.
#[derive(Clone)]
pub struct SessionBuilder {
    executor: Arc<dyn RequestExecutor>,
}

impl SessionBuilder {
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self { executor }
    }

    pub fn build(&self, connection: Box<dyn Connection>) -> Session {
        Session::new(connection, self.executor.clone())
    }

    pub fn build_with_process(
        &self,
        connection: Box<dyn Connection>,
        process: Box<dyn TargetProcess>,
    ) -> Session {
        let session = self.build(connection);
        session.attach_process(process);
        session
    }
}
