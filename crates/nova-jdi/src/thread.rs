//! Threads and the mirrors whose validity ends when their thread resumes.
//!
//! [`StackFrame`] and [`MonitorInfo`] describe a suspended thread. Each one
//! subscribes to its thread's resume notification when it is created; the
//! notification (delivered under the session's suspend-state lock) flips it to
//! invalid for good, and every accessor fails with
//! [`JdiError::InvalidatedMirror`] from then on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{JdiError, Result};
use crate::method::Location;
use crate::request::{MonitorData, Request};
use crate::session::{
    ListenerAction, Mirror, MirrorId, Session, SessionRef, Subscription, SuspendState,
    ThreadResumeListener,
};
use crate::value::{object_mirror, ObjectMirror, ObjectReference};
use crate::{FrameId, ObjectId};

#[derive(Clone)]
pub struct ThreadReference {
    object: ObjectMirror,
}

object_mirror!(ThreadReference, |this| this.object);

impl ThreadReference {
    pub fn new(id: MirrorId) -> Self {
        Self {
            object: ObjectMirror::new(id),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn object(&self) -> &ObjectMirror {
        &self.object
    }

    pub fn name(&self) -> Result<String> {
        self.session()?
            .execute(Request::ThreadName { thread: self.id() })?
            .into_string()
    }

    pub fn suspend(&self) -> Result<()> {
        let session = self.session()?;
        let _state = session.lock_suspend_state();
        session
            .execute(Request::ThreadSuspend { thread: self.id() })?
            .into_ack()
    }

    /// Resumes the thread.
    ///
    /// Every frame and monitor mirror of this thread is invalidated first,
    /// under the suspend-state lock, so none of them can issue a request with
    /// a frame id that is about to go stale.
    pub fn resume(&self) -> Result<()> {
        let session = self.session()?;
        let mut state = session.lock_suspend_state();
        session.notify_resuming(&mut state, Some(self.id()))?;
        session
            .execute(Request::ThreadResume { thread: self.id() })?
            .into_ack()
    }

    pub fn frame_count(&self) -> Result<i32> {
        self.session()?
            .execute(Request::FrameCount { thread: self.id() })?
            .into_int()
    }

    /// The current call stack, innermost frame first.
    pub fn frames(&self) -> Result<Vec<StackFrame>> {
        let session = self.session()?;
        let _state = session.lock_suspend_state();
        let frames = session
            .execute(Request::Frames {
                thread: self.id(),
                start: 0,
                length: -1,
            })?
            .into_frames()?;
        Ok(frames
            .into_iter()
            .map(|frame| {
                StackFrame::new(
                    &session,
                    self.clone(),
                    frame.frame_id,
                    Location::from_data(&session, frame.location),
                )
            })
            .collect())
    }

    pub fn frame(&self, index: usize) -> Result<StackFrame> {
        self.frames()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| JdiError::Protocol(format!("thread has no frame {index}")))
    }

    /// Monitors held by this thread and the stack depth each was entered at.
    pub fn owned_monitors_and_frames(&self) -> Result<Vec<MonitorInfo>> {
        let session = self.session()?;
        let _state = session.lock_suspend_state();
        let monitors = session
            .execute(Request::OwnedMonitorsStackDepth { thread: self.id() })?
            .into_monitors()?;
        Ok(monitors
            .into_iter()
            .map(|MonitorData { monitor, stack_depth }| {
                MonitorInfo::new(
                    &session,
                    self.clone(),
                    ObjectReference::from_tagged(&session, monitor),
                    stack_depth,
                )
            })
            .collect())
    }
}

/// One-way valid → invalid flag shared by thread-scoped mirrors.
struct Validity {
    thread: ThreadReference,
    valid: AtomicBool,
}

impl Validity {
    fn new(thread: ThreadReference) -> Self {
        Self {
            thread,
            valid: AtomicBool::new(true),
        }
    }

    fn check(&self) -> Result<()> {
        if self.valid.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(JdiError::InvalidatedMirror {
                thread: self.thread.id(),
            })
        }
    }

    /// Runs `f` with the suspend-state lock held, after confirming the mirror
    /// is still valid.
    fn guarded<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        self.check()?;
        let session = self.thread.session()?;
        let _state = session.lock_suspend_state();
        self.check()?;
        f(&session)
    }

    fn invalidate(&self, what: &str) -> Result<ListenerAction> {
        if self.valid.swap(false, Ordering::AcqRel) {
            tracing::debug!(
                target: "nova.jdi",
                thread = self.thread.id(),
                "{what} invalidated by resume"
            );
            Ok(ListenerAction::Deregister)
        } else {
            Err(JdiError::internal(format!(
                "{what} of thread {:#x} received a second resume notification",
                self.thread.id()
            )))
        }
    }
}

struct StackFrameInner {
    validity: Validity,
    frame_id: FrameId,
    location: Location,
    _subscription: Subscription,
}

impl ThreadResumeListener for StackFrameInner {
    fn thread_resuming(
        &self,
        _state: &SuspendState,
        _thread: &ThreadReference,
    ) -> Result<ListenerAction> {
        self.validity.invalidate("stack frame")
    }
}

/// A frame of a suspended thread's stack.
#[derive(Clone)]
pub struct StackFrame {
    inner: Arc<StackFrameInner>,
}

impl fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("thread", &self.inner.validity.thread.id())
            .field("frame_id", &self.inner.frame_id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl PartialEq for StackFrame {
    fn eq(&self, other: &Self) -> bool {
        self.inner.frame_id == other.inner.frame_id
            && self.inner.validity.thread == other.inner.validity.thread
    }
}

impl Eq for StackFrame {}

impl Mirror for StackFrame {
    fn session_ref(&self) -> &SessionRef {
        self.inner.validity.thread.session_ref()
    }
}

impl StackFrame {
    /// Must be called with the suspend-state lock held so the thread cannot
    /// resume between fetching the frame and subscribing.
    fn new(session: &Session, thread: ThreadReference, frame_id: FrameId, location: Location) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StackFrameInner>| {
            let listener: Weak<dyn ThreadResumeListener> = weak.clone();
            StackFrameInner {
                _subscription: session.subscribe_resume(&thread, listener),
                validity: Validity::new(thread),
                frame_id,
                location,
            }
        });
        Self { inner }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.validity.check().is_ok()
    }

    pub fn frame_id(&self) -> Result<FrameId> {
        self.inner.validity.guarded(|_| Ok(self.inner.frame_id))
    }

    pub fn thread(&self) -> Result<ThreadReference> {
        self.inner
            .validity
            .guarded(|_| Ok(self.inner.validity.thread.clone()))
    }

    pub fn location(&self) -> Result<Location> {
        self.inner
            .validity
            .guarded(|_| Ok(self.inner.location.clone()))
    }

    /// `this` of the frame; `None` in static and native methods.
    pub fn this_object(&self) -> Result<Option<ObjectReference>> {
        self.inner.validity.guarded(|session| {
            Ok(session
                .execute(Request::ThisObject {
                    thread: self.inner.validity.thread.id(),
                    frame: self.inner.frame_id,
                })?
                .into_object()?
                .map(|tagged| ObjectReference::from_tagged(session, tagged)))
        })
    }
}

struct MonitorInfoInner {
    validity: Validity,
    monitor: ObjectReference,
    stack_depth: i32,
    _subscription: Subscription,
}

impl ThreadResumeListener for MonitorInfoInner {
    fn thread_resuming(
        &self,
        _state: &SuspendState,
        _thread: &ThreadReference,
    ) -> Result<ListenerAction> {
        self.validity.invalidate("monitor info")
    }
}

/// A monitor owned by a suspended thread.
#[derive(Clone)]
pub struct MonitorInfo {
    inner: Arc<MonitorInfoInner>,
}

impl fmt::Debug for MonitorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorInfo")
            .field("thread", &self.inner.validity.thread.id())
            .field("monitor", &self.inner.monitor)
            .field("stack_depth", &self.inner.stack_depth)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Mirror for MonitorInfo {
    fn session_ref(&self) -> &SessionRef {
        self.inner.validity.thread.session_ref()
    }
}

impl MonitorInfo {
    /// Must be called with the suspend-state lock held.
    fn new(
        session: &Session,
        thread: ThreadReference,
        monitor: ObjectReference,
        stack_depth: i32,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<MonitorInfoInner>| {
            let listener: Weak<dyn ThreadResumeListener> = weak.clone();
            MonitorInfoInner {
                _subscription: session.subscribe_resume(&thread, listener),
                validity: Validity::new(thread),
                monitor,
                stack_depth,
            }
        });
        Self { inner }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.validity.check().is_ok()
    }

    pub fn monitor(&self) -> Result<ObjectReference> {
        self.inner.validity.guarded(|_| Ok(self.inner.monitor.clone()))
    }

    pub fn thread(&self) -> Result<ThreadReference> {
        self.inner
            .validity
            .guarded(|_| Ok(self.inner.validity.thread.clone()))
    }

    /// Depth of the frame that entered the monitor; `-1` when the VM cannot
    /// tell (e.g. entered via JNI).
    pub fn stack_depth(&self) -> Result<i32> {
        self.inner.validity.guarded(|_| Ok(self.inner.stack_depth))
    }

    /// Delivers a resume notification straight to this mirror, bypassing the
    /// session's registry.
    ///
    /// The registry never does this twice; a second delivery is reported as
    /// [`JdiError::Internal`].
    pub fn deliver_resume(&self, state: &SuspendState) -> Result<ListenerAction> {
        self.inner
            .thread_resuming(state, &self.inner.validity.thread)
    }
}

impl StackFrame {
    /// See [`MonitorInfo::deliver_resume`].
    pub fn deliver_resume(&self, state: &SuspendState) -> Result<ListenerAction> {
        self.inner
            .thread_resuming(state, &self.inner.validity.thread)
    }
}
