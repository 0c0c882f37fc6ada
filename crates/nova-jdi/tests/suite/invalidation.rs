use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use nova_jdi::mock::MockTarget;
use nova_jdi::request::{FrameData, LocationData, MonitorData, ObjectTag, Reply, Request, TaggedObjectId};
use nova_jdi::{
    JdiError, ListenerAction, Result, Session, SuspendState, ThreadReference,
    ThreadResumeListener,
};

use super::support::{class_data, session_with};

const MAIN: u64 = 0x100;
const WORKER: u64 = 0x200;

fn frames_reply(thread: u64) -> Reply {
    Reply::Frames(vec![
        FrameData {
            frame_id: thread + 1,
            location: LocationData {
                declaring_type: class_data(0x10, "Lcom/example/App;"),
                method_id: 7,
                index: 3,
            },
        },
        FrameData {
            frame_id: thread + 2,
            location: LocationData {
                declaring_type: class_data(0x10, "Lcom/example/App;"),
                method_id: 8,
                index: 0,
            },
        },
    ])
}

fn setup() -> (Arc<MockTarget>, Session) {
    let target = Arc::new(MockTarget::new());
    for thread in [MAIN, WORKER] {
        target.reply(
            Request::Frames {
                thread,
                start: 0,
                length: -1,
            },
            frames_reply(thread),
        );
        target.reply(Request::ThreadResume { thread }, Reply::Ack);
        target.reply(
            Request::OwnedMonitorsStackDepth { thread },
            Reply::Monitors(vec![MonitorData {
                monitor: TaggedObjectId {
                    tag: ObjectTag::Object,
                    id: thread + 0x50,
                },
                stack_depth: 1,
            }]),
        );
    }
    target.reply(Request::ResumeAll, Reply::Ack);
    let session = session_with(&target);
    (target, session)
}

fn thread(session: &Session, id: u64) -> ThreadReference {
    ThreadReference::new(session.mirror_id(id))
}

#[test]
fn frames_are_usable_until_their_thread_resumes() {
    let (target, session) = setup();
    let main = thread(&session, MAIN);
    target.reply(
        Request::ThisObject {
            thread: MAIN,
            frame: MAIN + 1,
        },
        Reply::Object(None),
    );

    let frames = main.frames().unwrap();
    assert_eq!(frames.len(), 2);
    let top = &frames[0];
    assert_eq!(top.frame_id().unwrap(), MAIN + 1);
    assert_eq!(top.location().unwrap().code_index(), 3);
    assert_eq!(top.thread().unwrap(), main);
    assert!(top.this_object().unwrap().is_none());

    main.resume().unwrap();

    for frame in &frames {
        assert!(!frame.is_valid());
        match frame.frame_id() {
            Err(err @ JdiError::InvalidatedMirror { .. }) => assert!(err.is_invalidated()),
            other => panic!("expected InvalidatedMirror, got {other:?}"),
        }
        assert!(frame.location().unwrap_err().is_invalidated());
        assert!(frame.this_object().unwrap_err().is_invalidated());
    }
    assert_eq!(
        target.call_count(&Request::ThisObject {
            thread: MAIN,
            frame: MAIN + 1
        }),
        1
    );
}

#[test]
fn resuming_one_thread_leaves_other_threads_alone() {
    let (_target, session) = setup();
    let main = thread(&session, MAIN);
    let worker = thread(&session, WORKER);

    let main_frames = main.frames().unwrap();
    let worker_frames = worker.frames().unwrap();
    let worker_monitors = worker.owned_monitors_and_frames().unwrap();

    main.resume().unwrap();
    assert!(main_frames.iter().all(|frame| !frame.is_valid()));
    assert!(worker_frames.iter().all(|frame| frame.is_valid()));
    assert_eq!(worker_monitors[0].stack_depth().unwrap(), 1);
    assert_eq!(worker_monitors[0].monitor().unwrap().id(), WORKER + 0x50);
}

#[test]
fn resume_all_invalidates_every_thread() {
    let (_target, session) = setup();
    let main = thread(&session, MAIN);
    let worker = thread(&session, WORKER);

    let frames: Vec<_> = main
        .frames()
        .unwrap()
        .into_iter()
        .chain(worker.frames().unwrap())
        .collect();
    let monitors = worker.owned_monitors_and_frames().unwrap();
    assert_eq!(session.listener_count(), 5);

    session.resume_all().unwrap();
    assert!(frames.iter().all(|frame| !frame.is_valid()));
    assert!(monitors[0].thread().unwrap_err().is_invalidated());
    assert_eq!(session.listener_count(), 0);
}

#[test]
fn fresh_frames_after_resume_are_valid() {
    let (_target, session) = setup();
    let main = thread(&session, MAIN);

    let stale = main.frames().unwrap();
    main.resume().unwrap();
    let fresh = main.frames().unwrap();

    assert!(!stale[0].is_valid());
    assert!(fresh[0].is_valid());
    assert_eq!(fresh[0].frame_id().unwrap(), MAIN + 1);
}

#[test]
fn resumes_advance_the_suspend_state_version() {
    let (_target, session) = setup();
    let main = thread(&session, MAIN);

    let before = session.lock_suspend_state().version();
    main.resume().unwrap();
    session.resume_all().unwrap();
    assert_eq!(session.lock_suspend_state().version(), before + 2);
}

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl ThreadResumeListener for CountingListener {
    fn thread_resuming(
        &self,
        _state: &SuspendState,
        _thread: &ThreadReference,
    ) -> Result<ListenerAction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ListenerAction::Keep)
    }
}

#[test]
fn custom_listeners_stay_until_unsubscribed() {
    let (_target, session) = setup();
    let main = thread(&session, MAIN);
    let listener = Arc::new(CountingListener::default());
    let weak: Weak<dyn ThreadResumeListener> = Arc::downgrade(&listener) as _;

    let subscription = session.subscribe_resume(&main, weak);
    main.resume().unwrap();
    main.resume().unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);

    subscription.cancel();
    main.resume().unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.listener_count(), 0);
}

#[test]
fn listeners_whose_owner_is_gone_are_pruned() {
    let (_target, session) = setup();
    let main = thread(&session, MAIN);
    let listener = Arc::new(CountingListener::default());
    let weak: Weak<dyn ThreadResumeListener> = Arc::downgrade(&listener) as _;

    let subscription = session.subscribe_resume(&main, weak);
    drop(listener);
    main.resume().unwrap();
    assert_eq!(session.listener_count(), 0);
    drop(subscription);
}
