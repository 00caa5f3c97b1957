// tests/state_machine.rs

mod common;
use crate::common::builders::AllocationBuilder;
use crate::common::{core_with_nodes, init_tracing, node_state};

use std::error::Error;

use clustersched::engine::{CoreOptions, SchedulerCore};
use clustersched::errors::{PolicyError, SchedulerError};
use clustersched::model::Session;
use clustersched::policy::FirstFitPolicy;
use clustersched::types::{NodeState, SessionState};
use clustersched_test_utils::recording_policy::{Behaviour, RecordingPolicy, offer_log};

type TestResult = Result<(), Box<dyn Error>>;

fn bare_core() -> SchedulerCore {
    SchedulerCore::new(CoreOptions::default())
}

fn fresh_session(id: u64) -> Session {
    Session::new(id, AllocationBuilder::new().build(), None, None)
}

#[test]
fn illegal_transitions_are_rejected_without_change() -> TestResult {
    init_tracing();
    let mut core = bare_core();
    let mut session = fresh_session(1);

    match core.activate_session_state(&mut session, SessionState::Allocd) {
        Err(SchedulerError::IllegalTransition { from, to, .. }) => {
            assert_eq!(from, SessionState::Undef);
            assert_eq!(to, SessionState::Allocd);
        }
        other => panic!("Expected IllegalTransition, got: {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Undef);

    assert!(core.activate_session_state(&mut session, SessionState::Init)?);
    assert!(core
        .activate_session_state(&mut session, SessionState::Init)
        .is_err());
    assert_eq!(session.state(), SessionState::Init);
    Ok(())
}

#[test]
fn schedule_needs_a_claim_but_init_and_terminated_do_not() -> TestResult {
    let mut core = bare_core();
    let mut session = fresh_session(1);

    // Empty chain: mandatory transitions still happen.
    assert!(core.activate_session_state(&mut session, SessionState::Init)?);
    assert!(!core.activate_session_state(&mut session, SessionState::Schedule)?);
    assert_eq!(session.state(), SessionState::Init);

    assert!(core.activate_session_state(&mut session, SessionState::Terminated)?);
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(core
        .activate_session_state(&mut session, SessionState::Terminated)
        .is_err());

    assert_eq!(
        session.history(),
        &[
            SessionState::Undef,
            SessionState::Init,
            SessionState::Terminated
        ]
    );
    Ok(())
}

#[test]
fn chain_is_asked_in_priority_order_and_first_claim_wins() -> TestResult {
    init_tracing();
    let mut core = bare_core();
    let log = offer_log();

    core.register_policy(Box::new(RecordingPolicy::new("b", Behaviour::Decline, log.clone())), 5)?;
    core.register_policy(Box::new(RecordingPolicy::new("a", Behaviour::Decline, log.clone())), 1)?;
    core.register_policy(Box::new(RecordingPolicy::new("c", Behaviour::ClaimAll, log.clone())), 5)?;
    core.register_policy(Box::new(RecordingPolicy::new("d", Behaviour::ClaimAll, log.clone())), 7)?;
    assert_eq!(core.chain().module_names(), vec!["a", "b", "c", "d"]);

    let mut session = fresh_session(9);
    core.activate_session_state(&mut session, SessionState::Init)?;
    log.lock().unwrap().clear();

    assert!(core.activate_session_state(&mut session, SessionState::Schedule)?);
    let asked: Vec<String> = log.lock().unwrap().iter().map(|o| o.module.clone()).collect();
    assert_eq!(asked, vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn mandatory_transitions_are_still_offered_to_modules() -> TestResult {
    let mut core = bare_core();
    let log = offer_log();
    core.register_policy(
        Box::new(RecordingPolicy::new("observer", Behaviour::Decline, log.clone())),
        1,
    )?;

    let mut session = fresh_session(3);
    core.activate_session_state(&mut session, SessionState::Init)?;
    core.activate_session_state(&mut session, SessionState::Terminated)?;

    let targets: Vec<SessionState> = log.lock().unwrap().iter().map(|o| o.target).collect();
    assert_eq!(targets, vec![SessionState::Init, SessionState::Terminated]);
    Ok(())
}

#[test]
fn failing_module_is_skipped_for_that_attempt() -> TestResult {
    init_tracing();
    let mut core = bare_core();
    let log = offer_log();
    core.register_policy(Box::new(RecordingPolicy::new("bad", Behaviour::Fail, log.clone())), 1)?;
    core.register_policy(
        Box::new(RecordingPolicy::new("good", Behaviour::ClaimAll, log.clone())),
        2,
    )?;

    let mut session = fresh_session(4);
    core.activate_session_state(&mut session, SessionState::Init)?;
    assert!(core.activate_session_state(&mut session, SessionState::Schedule)?);

    // Still registered: errors only skip.
    assert_eq!(core.chain().len(), 2);
    Ok(())
}

#[test]
fn module_init_failure_keeps_it_out_of_the_chain() {
    let mut core = bare_core();
    let module = RecordingPolicy::new("broken", Behaviour::FailInit, offer_log());

    match core.register_policy(Box::new(module), 1) {
        Err(SchedulerError::PolicyError(PolicyError::Init { module, .. })) => {
            assert_eq!(module, "broken");
        }
        other => panic!("Expected PolicyError::Init, got: {other:?}"),
    }
    assert!(core.chain().is_empty());
}

#[test]
fn panicking_module_is_unregistered_and_its_nodes_released() -> TestResult {
    init_tracing();
    let mut core = core_with_nodes(2);
    core.register_policy(
        Box::new(RecordingPolicy::new("boom", Behaviour::PanicAfterCommit, offer_log())),
        1,
    )?;
    assert_eq!(core.chain().module_names(), vec!["boom", FirstFitPolicy::NAME]);

    let (id, _events) = core.submit(AllocationBuilder::new().build(), None)?;
    let report = core.run_pass();

    assert_eq!(report.allocated, vec![id]);
    assert_eq!(core.chain().module_names(), vec![FirstFitPolicy::NAME]);

    let session = core.session(id).expect("allocated session");
    assert_eq!(session.state(), SessionState::Allocd);
    assert_eq!(session.held_node_count(), 1);
    assert_eq!(node_state(core.registry(), "n0"), NodeState::Exclusive);
    assert_eq!(node_state(core.registry(), "n1"), NodeState::Unalloc);
    Ok(())
}

#[test]
fn terminated_releases_every_node() -> TestResult {
    let mut core = core_with_nodes(3);
    let (id, _events) = core.submit(AllocationBuilder::new().nodes(3, 3).build(), None)?;
    core.run_pass();
    assert_eq!(core.registry().count_in(NodeState::Exclusive), 3);

    core.step(clustersched::engine::EngineEvent::Complete { session: id });

    assert!(core.session(id).is_none());
    assert_eq!(core.registry().count_in(NodeState::Unalloc), 3);
    assert!(core.registry().nodes().all(|n| n.owner().is_none()));
    Ok(())
}
