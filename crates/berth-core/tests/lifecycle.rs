use berth_core::{
    decorated, run_wrapped, Call, ContainerWrapping, CoreError, InvocationError, Wrapping,
};
use berth_runtime::{
    Connector, ContainerHandle, ContainerStatus, MockProvider, ReadinessError, RuntimeError,
};
use berth_schema::{RawOptions, Value};
use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

fn options(image: &str) -> RawOptions {
    RawOptions::new().with("image", image)
}

fn wrap(raw: &RawOptions, provider: &Arc<MockProvider>) -> ContainerWrapping {
    ContainerWrapping::new(raw, provider.clone())
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
        .with_cancellation(|| false)
}

fn no_kwargs() -> BTreeMap<String, Value> {
    BTreeMap::new()
}

/// Refuses `failures` connections, then accepts; records every address tried.
struct ScriptedConnector {
    failures: u32,
    attempts: AtomicU32,
    seen: Mutex<Vec<SocketAddr>>,
}

impl ScriptedConnector {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        self.seen.lock().unwrap().push(addr);
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        } else {
            Ok(())
        }
    }
}

#[test]
fn successful_run_starts_and_stops_once() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx"), &provider);

    let result: Result<i64, InvocationError<String>> =
        run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok(42));

    assert_eq!(result.unwrap(), 42);
    let calls = provider.calls();
    assert_eq!(calls.created, 1);
    assert_eq!(calls.stopped, 1);
    assert_eq!(calls.last_grace, Some(Duration::from_secs(10)));
    assert!(calls.killed.is_empty());
    assert_eq!(calls.removed, 0);
}

#[test]
fn injected_handle_precedes_caller_arguments() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx").with("inject_arg", true), &provider);

    let seen = run_wrapped(
        &wrapping,
        "job",
        vec![Value::from("a"), Value::from(2)],
        no_kwargs(),
        |call: Call<ContainerHandle>| -> Result<_, String> {
            let handle = call.resource().cloned().ok_or("no handle")?;
            Ok((handle, call.values().cloned().collect::<Vec<_>>(), call.args.len()))
        },
    )
    .unwrap();

    let (handle, values, total) = seen;
    assert_eq!(handle.image, "nginx");
    assert_eq!(handle.id.len(), 64);
    assert_eq!(values, vec![Value::from("a"), Value::from(2)]);
    assert_eq!(total, 3);
}

#[test]
fn without_injection_arguments_pass_through_unchanged() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx"), &provider);
    let mut kwargs = no_kwargs();
    kwargs.insert("verbose".to_owned(), Value::from(true));

    let call = run_wrapped(
        &wrapping,
        "job",
        vec![Value::from(1)],
        kwargs.clone(),
        |call: Call<ContainerHandle>| -> Result<_, String> { Ok(call) },
    )
    .unwrap();

    assert!(call.resource().is_none());
    assert_eq!(call.args.len(), 1);
    assert_eq!(call.kwargs, kwargs);
}

#[test]
fn operation_error_wins_over_release_error() {
    let provider = Arc::new(MockProvider::new().failing_release());
    let wrapping = wrap(&options("nginx"), &provider);

    let err = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| {
        Err::<(), _>("boom".to_owned())
    })
    .unwrap_err();

    assert_eq!(err.operation_error().map(String::as_str), Some("boom"));
    assert!(matches!(err.release_error(), Some(CoreError::Release { .. })));
    assert_eq!(err.into_operation_error().unwrap(), "boom");
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn release_error_surfaces_when_operation_succeeds() {
    let provider = Arc::new(MockProvider::new().failing_release());
    let wrapping = wrap(&options("nginx"), &provider);

    let err = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(()))
        .unwrap_err();

    assert!(matches!(err, InvocationError::Release(CoreError::Release { .. })));
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn failed_start_never_runs_operation() {
    let provider = Arc::new(MockProvider::new().failing_create());
    let wrapping = wrap(&options("missing/image"), &provider);
    let mut ran = false;

    let err = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| {
        ran = true;
        Ok::<_, String>(())
    })
    .unwrap_err();

    assert!(!ran);
    assert!(matches!(err, InvocationError::Start(CoreError::Acquisition { .. })));
    assert!(err.to_string().contains("missing/image"));
    let calls = provider.calls();
    assert_eq!(calls.stopped, 0);
    assert!(calls.killed.is_empty());
}

#[test]
fn invalid_options_fail_before_any_container_exists() {
    let provider = Arc::new(MockProvider::new());
    let raw = options("nginx").with("imagee", "typo");

    let err = ContainerWrapping::new(&raw, provider.clone())
        .err()
        .expect("unknown option must be rejected");

    assert!(matches!(err, CoreError::Schema(_)));
    assert!(err.to_string().contains("option 'imagee' does not exist"));
    assert_eq!(provider.calls().created, 0);
}

#[test]
fn strict_log_wait_fails_readiness_and_still_releases() {
    let provider = Arc::new(MockProvider::new().with_logs(["booting", "crashed"]));
    let raw = options("mysql")
        .with("wait_for_log", "ready for connections")
        .with("strict_log_wait", true);
    let wrapping = wrap(&raw, &provider);
    let mut ran = false;

    let err = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| {
        ran = true;
        Ok::<_, String>(())
    })
    .unwrap_err();

    assert!(!ran);
    assert!(matches!(
        err,
        InvocationError::Readiness {
            source: CoreError::Readiness { .. },
            release: None
        }
    ));
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn cancelled_log_wait_releases_the_container() {
    let provider = Arc::new(MockProvider::new().with_silent_logs());
    let raw = options("mysql").with("wait_for_log", "ready");
    let wrapping = ContainerWrapping::new(&raw, provider.clone())
        .unwrap()
        .with_cancellation(|| true);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(()));
        let _ = tx.send(result);
    });

    let err = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("log wait ignored cancellation")
        .unwrap_err();
    assert!(matches!(
        err,
        InvocationError::Readiness {
            source: CoreError::Readiness {
                source: RuntimeError::Readiness(ReadinessError::Cancelled(_)),
                ..
            },
            release: None
        }
    ));
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn exhausted_log_without_strict_mode_continues() {
    let provider = Arc::new(MockProvider::new().with_logs(["booting"]));
    let wrapping = wrap(&options("mysql").with("wait_for_log", "ready"), &provider);

    let result = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(7));

    assert_eq!(result.unwrap(), 7);
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn matched_log_line_lets_operation_run() {
    let provider = Arc::new(MockProvider::new().with_logs([
        "InnoDB: initializing",
        "mysqld: ready for connections.",
    ]));
    let raw = options("mysql")
        .with("wait_for_log", "ready for connections")
        .with("strict_log_wait", true);
    let wrapping = wrap(&raw, &provider);

    let result = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(()));
    assert!(result.is_ok());
}

#[test]
fn port_wait_falls_back_to_published_loopback_port() {
    let provider = Arc::new(MockProvider::new());
    let connector = Arc::new(ScriptedConnector::new(2));
    let raw = options("nginx")
        .with("wait_for_port", 80)
        .with("ports", vec![(80_i64, 18080_i64)]);
    let wrapping = wrap(&raw, &provider).with_connector(connector.clone());

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(())).unwrap();

    let seen = connector.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen
        .iter()
        .all(|a| *a == SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 18080)));
}

#[test]
fn port_wait_uses_container_address_when_reported() {
    let ip = IpAddr::V4(Ipv4Addr::new(172, 17, 0, 2));
    let provider = Arc::new(MockProvider::new().with_address(ip));
    let connector = Arc::new(ScriptedConnector::new(0));
    let wrapping =
        wrap(&options("redis").with("wait_for_port", 6379), &provider).with_connector(connector.clone());

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(())).unwrap();

    assert_eq!(
        connector.seen.lock().unwrap().as_slice(),
        &[SocketAddr::new(ip, 6379)]
    );
}

#[test]
fn port_wait_timeout_is_a_readiness_failure() {
    let provider = Arc::new(MockProvider::new());
    let connector = Arc::new(ScriptedConnector::new(u32::MAX));
    let raw = options("nginx")
        .with("wait_for_port", 80)
        .with("wait_timeout", 0);
    let wrapping = wrap(&raw, &provider).with_connector(connector);

    let err = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(()))
        .unwrap_err();

    assert!(matches!(err, InvocationError::Readiness { .. }));
    assert!(err.to_string().contains("timed out"));
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn kill_signal_replaces_graceful_stop() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx").with("kill_signal", "KILL"), &provider);

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(())).unwrap();

    let calls = provider.calls();
    assert_eq!(calls.killed, vec![9]);
    assert_eq!(calls.stopped, 0);
}

#[test]
fn zero_kill_signal_stops_gracefully() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx").with("kill_signal", 0), &provider);

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(())).unwrap();

    let calls = provider.calls();
    assert!(calls.killed.is_empty());
    assert_eq!(calls.stopped, 1);
}

#[test]
fn stop_timeout_is_passed_as_grace() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx").with("stop_timeout", 3), &provider);

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(())).unwrap();

    assert_eq!(provider.calls().last_grace, Some(Duration::from_secs(3)));
}

#[test]
fn exited_container_is_not_stopped() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("alpine").with("inject_arg", true), &provider);
    let inner = provider.clone();

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |call: Call<ContainerHandle>| {
        let handle = call.resource().ok_or("no handle")?;
        inner.set_status(handle, ContainerStatus::Exited);
        Ok::<_, &str>(())
    })
    .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.stopped, 0);
    assert!(calls.killed.is_empty());
}

#[test]
fn remove_runs_after_stop() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx").with("remove", true), &provider);

    run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| Ok::<_, String>(())).unwrap();

    let calls = provider.calls();
    assert_eq!(calls.stopped, 1);
    assert_eq!(calls.removed, 1);
}

#[test]
fn panic_in_operation_still_releases_once() {
    let provider = Arc::new(MockProvider::new());
    let wrapping = wrap(&options("nginx"), &provider);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = run_wrapped(&wrapping, "job", vec![], no_kwargs(), |_call| -> Result<(), String> {
            panic!("operation blew up")
        });
    }));

    assert!(outcome.is_err());
    assert_eq!(provider.calls().stopped, 1);
}

#[test]
fn each_call_gets_a_fresh_container() {
    let provider = Arc::new(MockProvider::new());
    let job = decorated(wrap(&options("nginx").with("inject_arg", true), &provider), |call: Call<ContainerHandle>| {
        call.resource().map(|h| h.id.clone()).ok_or("no handle")
    })
    .named("fetch_id");

    let first = job.call(vec![], no_kwargs()).unwrap();
    let second = job.call(vec![], no_kwargs()).unwrap();

    assert_ne!(first, second);
    assert_eq!(job.wrapping().name(), "docker");
    let calls = provider.calls();
    assert_eq!(calls.created, 2);
    assert_eq!(calls.stopped, 2);
}

#[test]
fn concurrent_calls_own_independent_containers() {
    let provider = Arc::new(MockProvider::new());
    let job = Arc::new(decorated(
        wrap(&options("nginx").with("inject_arg", true), &provider),
        |call: Call<ContainerHandle>| call.resource().map(|h| h.id.to_string()).ok_or("no handle"),
    ));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let job = Arc::clone(&job);
            thread::spawn(move || job.call(vec![], no_kwargs()).unwrap())
        })
        .collect();
    let mut ids: Vec<String> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 4);
    let calls = provider.calls();
    assert_eq!(calls.created, 4);
    assert_eq!(calls.stopped, 4);
}
