//! Tests for the resumable transfer driver
//! Uses scripted in-memory transports instead of HTTP

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::mock::StepRng;
use serde_json::json;
use vidup::upload::{
    ChunkResult, ChunkTransport, DriverError, ExponentialJitter, FaultKind, Outcome,
    RemoteObject, RetryPolicy, Sleeper, TransportError, UploadDriver,
};

struct ScriptedTransport {
    script: VecDeque<Result<ChunkResult, TransportError>>,
    calls: usize,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<ChunkResult, TransportError>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }
}

impl ChunkTransport for ScriptedTransport {
    fn next_chunk(&mut self) -> Result<ChunkResult, TransportError> {
        self.calls += 1;
        self.script
            .pop_front()
            .expect("driver called the transport after the script ended")
    }
}

#[derive(Default)]
struct RecordingSleeper {
    sleeps: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

type TestDriver = UploadDriver<ExponentialJitter<StepRng>, RecordingSleeper>;

/// Driver whose jitter always draws the largest possible sample
fn test_driver() -> TestDriver {
    UploadDriver::with_parts(
        RetryPolicy::default(),
        ExponentialJitter::with_rng(StepRng::new(u64::MAX, 0)),
        RecordingSleeper::default(),
    )
}

fn uploaded(id: &str) -> Result<ChunkResult, TransportError> {
    Ok(ChunkResult::Complete(RemoteObject::new(json!({
        "kind": "youtube#video",
        "id": id,
        "status": {"uploadStatus": "uploaded", "privacyStatus": "public"}
    }))))
}

fn http(code: u16) -> Result<ChunkResult, TransportError> {
    Err(TransportError::status(code, format!("status {}", code)))
}

fn fault(kind: FaultKind) -> Result<ChunkResult, TransportError> {
    Err(TransportError::fault(kind, "simulated"))
}

fn progress(bytes_sent: u64) -> Result<ChunkResult, TransportError> {
    Ok(ChunkResult::Progress {
        bytes_sent,
        total: 100,
    })
}

#[test]
fn test_three_503_then_success() {
    let mut driver = test_driver();
    let mut transport =
        ScriptedTransport::new(vec![http(503), http(503), http(503), uploaded("abc123")]);

    let outcome = driver.run(&mut transport).unwrap();

    assert_eq!(
        outcome,
        Outcome::Success {
            remote_id: "abc123".to_string(),
            status: "uploaded".to_string(),
        }
    );
    assert_eq!(driver.state().attempt_count, 3);
    assert_eq!(driver.sleeper().sleeps.len(), 3);
    assert!(driver
        .state()
        .last_error
        .as_deref()
        .unwrap()
        .contains("retriable HTTP error 503"));
}

#[test]
fn test_single_403_propagates_immediately() {
    let mut driver = test_driver();
    let mut transport = ScriptedTransport::new(vec![http(403)]);

    let err = driver.run(&mut transport).unwrap_err();

    match err {
        DriverError::Rejected(TransportError::Status { code, .. }) => assert_eq!(code, 403),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(transport.calls, 1);
    assert_eq!(driver.state().attempt_count, 0);
    assert!(driver.sleeper().sleeps.is_empty());
}

#[test]
fn test_404_after_retries_keeps_counter() {
    let mut driver = test_driver();
    let mut transport = ScriptedTransport::new(vec![http(500), http(404)]);

    let err = driver.run(&mut transport).unwrap_err();

    assert!(matches!(
        err,
        DriverError::Rejected(TransportError::Status { code: 404, .. })
    ));
    assert_eq!(driver.state().attempt_count, 1);
    assert_eq!(driver.sleeper().sleeps.len(), 1);
}

#[test]
fn test_eleven_500s_exhaust_budget() {
    let mut driver = test_driver();
    let mut transport = ScriptedTransport::new((0..11).map(|_| http(500)).collect());

    let err = driver.run(&mut transport).unwrap_err();

    match err {
        DriverError::RetriesExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 11);
            assert!(last_error.contains("500"));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(transport.calls, 11);
    // No sleep after the final failure
    assert_eq!(driver.sleeper().sleeps.len(), 10);
}

#[test]
fn test_up_to_ten_retriable_errors_then_success() {
    let errors = [
        fault(FaultKind::ConnectionReset),
        http(502),
        fault(FaultKind::IncompleteRead),
        http(504),
        fault(FaultKind::NotConnected),
        fault(FaultKind::CannotSendRequest),
        fault(FaultKind::CannotSendHeader),
        fault(FaultKind::ResponseNotReady),
        fault(FaultKind::BadStatusLine),
        fault(FaultKind::Io),
    ];

    for n in 0..=errors.len() {
        let mut script: Vec<_> = errors[..n].to_vec();
        script.push(uploaded("vid"));

        let mut driver = test_driver();
        let mut transport = ScriptedTransport::new(script);
        let outcome = driver.run(&mut transport).unwrap();

        assert!(matches!(outcome, Outcome::Success { .. }), "n = {}", n);
        assert_eq!(driver.state().attempt_count, n as u32);
    }
}

#[test]
fn test_only_retriable_errors_always_abort() {
    for n in [11usize, 12, 20] {
        let mut driver = test_driver();
        let mut transport = ScriptedTransport::new(
            (0..n)
                .map(|i| {
                    if i % 2 == 0 {
                        http(503)
                    } else {
                        fault(FaultKind::ConnectionReset)
                    }
                })
                .collect(),
        );

        let err = driver.run(&mut transport).unwrap_err();
        assert!(matches!(err, DriverError::RetriesExhausted { attempts: 11, .. }));
        // Stops at the first failure beyond the budget
        assert_eq!(transport.calls, 11);
    }
}

#[test]
fn test_missing_id_is_terminal_failure() {
    let mut driver = test_driver();
    let mut transport = ScriptedTransport::new(vec![
        fault(FaultKind::ConnectionReset),
        http(503),
        Ok(ChunkResult::Complete(RemoteObject::new(json!({
            "error": {"message": "odd"}
        })))),
    ]);

    let outcome = driver.run(&mut transport).unwrap();

    match outcome {
        Outcome::Failure { reason } => {
            assert!(reason.starts_with("unexpected response shape: "));
            assert!(reason.contains("odd"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(driver.state().attempt_count, 2);
    assert_eq!(transport.calls, 3);
}

#[test]
fn test_missing_status_reports_unknown() {
    let mut driver = test_driver();
    let mut transport = ScriptedTransport::new(vec![Ok(ChunkResult::Complete(
        RemoteObject::new(json!({"id": "xyz"})),
    ))]);

    let outcome = driver.run(&mut transport).unwrap();
    assert_eq!(
        outcome,
        Outcome::Success {
            remote_id: "xyz".to_string(),
            status: "unknown".to_string(),
        }
    );
}

#[test]
fn test_progress_has_no_delay_or_count() {
    let mut driver = test_driver();
    let mut transport =
        ScriptedTransport::new(vec![progress(25), progress(50), progress(75), uploaded("p")]);

    driver.run(&mut transport).unwrap();

    assert_eq!(driver.state().attempt_count, 0);
    assert!(driver.sleeper().sleeps.is_empty());
    assert_eq!(transport.calls, 4);
}

#[test]
fn test_progress_does_not_reset_counter() {
    let mut driver = test_driver();
    let mut transport = ScriptedTransport::new(vec![
        http(500),
        progress(50),
        fault(FaultKind::Io),
        progress(90),
        uploaded("q"),
    ]);

    driver.run(&mut transport).unwrap();

    assert_eq!(driver.state().attempt_count, 2);
}

#[test]
fn test_budget_spans_whole_transfer() {
    let mut driver = UploadDriver::with_parts(
        RetryPolicy::default().with_max_retries(2),
        ExponentialJitter::with_rng(StepRng::new(0, 0)),
        RecordingSleeper::default(),
    );
    // Two failures in different chunks, then a third: over budget
    let mut transport = ScriptedTransport::new(vec![
        http(500),
        progress(30),
        http(500),
        progress(60),
        http(500),
    ]);

    let err = driver.run(&mut transport).unwrap_err();
    match err {
        DriverError::RetriesExhausted { attempts, .. } => {
            assert_eq!(attempts, driver.policy().max_retries + 1);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(driver.policy().max_retries, 2);
}

#[test]
fn test_backoff_bounded_by_power_of_two() {
    let mut driver = test_driver();
    let mut script: Vec<_> = (0..10).map(|_| http(502)).collect();
    script.push(uploaded("b"));
    let mut transport = ScriptedTransport::new(script);

    driver.run(&mut transport).unwrap();

    let sleeps = &driver.sleeper().sleeps;
    assert_eq!(sleeps.len(), 10);
    for (i, sleep) in sleeps.iter().enumerate() {
        let k = i as u32 + 1;
        let bound = Duration::from_secs(1u64 << k);
        assert!(*sleep < bound, "retry {}: {:?} >= {:?}", k, sleep, bound);
        // Max draw sits just under the bound, above the previous one
        assert!(*sleep > Duration::from_secs(1u64 << (k - 1)), "retry {}", k);
    }
}

#[test]
fn test_zero_draw_sleeps_zero() {
    let mut driver = UploadDriver::with_parts(
        RetryPolicy::default(),
        ExponentialJitter::with_rng(StepRng::new(0, 0)),
        RecordingSleeper::default(),
    );
    let mut transport = ScriptedTransport::new(vec![http(503), uploaded("z")]);

    driver.run(&mut transport).unwrap();

    assert_eq!(driver.sleeper().sleeps, vec![Duration::ZERO]);
}

#[test]
fn test_invalid_request_not_retried() {
    let mut driver = test_driver();
    let mut transport =
        ScriptedTransport::new(vec![Err(TransportError::Invalid("bad url".to_string()))]);

    let err = driver.run(&mut transport).unwrap_err();
    assert!(matches!(err, DriverError::Rejected(TransportError::Invalid(_))));
    assert_eq!(driver.state().attempt_count, 0);
}

#[test]
fn test_driver_state_resets_between_runs() {
    let mut driver = test_driver();
    driver
        .run(&mut ScriptedTransport::new(vec![http(500), uploaded("a")]))
        .unwrap();
    assert_eq!(driver.state().attempt_count, 1);

    driver
        .run(&mut ScriptedTransport::new(vec![uploaded("b")]))
        .unwrap();
    assert_eq!(driver.state().attempt_count, 0);
    assert_eq!(driver.state().last_error, None);
}
