mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use searchsync::engine::{DeleteQuery, IndexDirectory, IndexSnapshot};
use searchsync::work::ErrorContextBuilder;
use searchsync::writer::{SessionState, WriterPolicy, WriterSession};

use common::{FaultyDirectory, RecordingErrorHandler, init_logger};

fn session(
    policy: WriterPolicy,
) -> (FaultyDirectory, Arc<RecordingErrorHandler>, WriterSession) {
    init_logger();
    let directory = FaultyDirectory::new("books");
    let handler = Arc::new(RecordingErrorHandler::default());
    let session = WriterSession::new(
        "books",
        Arc::new(directory.clone()),
        policy,
        handler.clone(),
    );
    (directory, handler, session)
}

#[test]
fn open_failure_without_context_goes_to_the_handler() {
    let (directory, handler, session) = session(WriterPolicy::Exclusive);
    directory.faults.fail_open.store(true, Ordering::Release);

    assert!(session.get_writer(None).is_none());
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(handler.exceptions().len(), 1);
    assert!(handler.exceptions()[0].contains("injected open failure"));

    directory.faults.fail_open.store(false, Ordering::Release);
    assert!(session.get_writer(None).is_some());
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(directory.faults.open_attempts.load(Ordering::Acquire), 2);
}

#[test]
fn open_failure_with_context_is_recorded_there() {
    let (directory, handler, session) = session(WriterPolicy::Shared);
    directory.faults.fail_open.store(true, Ordering::Release);

    let context = ErrorContextBuilder::new("books");
    assert!(session.get_writer(Some(&context)).is_none());
    assert_eq!(session.users(), 0);
    assert!(handler.exceptions().is_empty());
    assert!(context.build().has_errors());
}

#[test]
fn commit_failure_is_routed_to_the_handler() {
    let (directory, handler, session) = session(WriterPolicy::Exclusive);
    session.get_writer(None).unwrap();
    directory.faults.fail_commit.store(true, Ordering::Release);

    session.commit();
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(handler.exceptions().len(), 1);
    assert!(handler.exceptions()[0].starts_with("Unable to commit partition 'books'"));
}

#[test]
fn failed_commit_after_a_batch_unlocks_the_partition() {
    let (directory, _handler, session) = session(WriterPolicy::Exclusive);
    session.get_writer(None).unwrap();
    directory.faults.fail_commit.store(true, Ordering::Release);

    session.after_batch_applied(false, false);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!directory.is_locked());

    directory.faults.fail_commit.store(false, Ordering::Release);
    assert!(session.get_writer(None).is_some());
}

#[test]
fn close_failure_force_unlocks() {
    let (directory, handler, session) = session(WriterPolicy::Exclusive);
    session.get_writer(None).unwrap();
    assert!(directory.is_locked());
    directory.faults.fail_close.store(true, Ordering::Release);

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!directory.is_locked());
    assert_eq!(directory.faults.count("force_unlock"), 1);
    assert_eq!(handler.exceptions().len(), 1);
    assert_eq!(session.stats().read().force_unlocks, 1);
}

#[test]
fn force_unlock_swallows_close_errors() {
    let (directory, handler, session) = session(WriterPolicy::Exclusive);
    session.get_writer(None).unwrap();
    directory.faults.fail_close.store(true, Ordering::Release);

    session.force_unlock();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!directory.is_locked());
    assert!(handler.exceptions().is_empty());
}

#[test]
fn shared_session_commits_for_non_last_users_and_closes_on_last_exit() {
    let (directory, _handler, session) = session(WriterPolicy::Shared);
    session.get_writer(None).unwrap();
    session.get_writer(None).unwrap();
    session.get_writer(None).unwrap();
    assert_eq!(session.users(), 3);

    session.after_batch_applied(false, false);
    session.after_batch_applied(false, true);
    assert_eq!(directory.faults.count("commit"), 1);
    assert_eq!(session.state(), SessionState::Open);

    session.after_batch_applied(false, false);
    assert_eq!(session.users(), 0);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(directory.faults.count("close"), 1);
}

#[test]
fn shared_session_concurrent_users() {
    let (directory, handler, session) = session(WriterPolicy::Shared);
    let session = Arc::new(session);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let session = Arc::clone(&session);
            scope.spawn(move || {
                for _ in 0..50 {
                    let writer = session.get_writer(None).expect("writer");
                    writer.delete_documents(&DeleteQuery::All).expect("delete");
                    drop(writer);
                    session.after_batch_applied(false, false);
                }
            });
        }
    });

    assert_eq!(session.users(), 0);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!directory.is_locked());
    assert!(handler.exceptions().is_empty());
}

#[test]
fn near_real_time_reader_tracks_batches_without_commits() {
    let (directory, _handler, session) = session(WriterPolicy::NearRealTime);
    let writer = session.get_writer(None).unwrap();
    writer.delete_documents(&DeleteQuery::All).unwrap();
    session.after_batch_applied(false, false);

    assert_eq!(directory.faults.count("commit"), 0);
    let reader = session.open_reader().unwrap();
    assert_eq!(reader.generation(), 0);

    session.after_batch_applied(true, false);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!directory.is_locked());
    assert_eq!(session.open_reader().unwrap().generation(), 1);
}
