//! Scripted in-memory container runtime shared by the integration tests.
//!
//! Records every primitive call in order and tracks which containers and
//! images currently exist, so tests can assert on cleanup and ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::Stream;
use runonce::{
    ContainerRuntime, ContainerSpec, ContainerWait, LogStream, PullProgress, PullStream,
    RuntimeError, RuntimeResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

/// One primitive call, with the name or id it was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull(String),
    Create(String),
    Start(String),
    Wait(String),
    Logs(String),
    Remove(String),
}

/// How the wait channels behave.
#[derive(Debug, Clone)]
pub enum WaitScript {
    /// Status channel fires with this exit code.
    Exit(i64),
    /// Error channel fires.
    Fail(String),
    /// Both fire, error first.
    ErrorThenStatus(String, i64),
    /// Status fires now, error only after a delay.
    StatusThenError(i64, String),
    /// Nothing ever fires.
    Hang,
    /// Both senders are dropped without a value.
    Close,
}

/// Behaviour of the mock, set up per test.
#[derive(Debug, Clone)]
pub struct Script {
    pub pull_events: usize,
    pub pull_error_at: Option<usize>,
    pub pull_hangs: bool,
    pub create_error: Option<RuntimeError>,
    pub start_error: Option<RuntimeError>,
    pub wait: WaitScript,
    pub log_chunks: Vec<Vec<u8>>,
    pub log_error: Option<String>,
    pub remove_error: Option<RuntimeError>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            pull_events: 3,
            pull_error_at: None,
            pull_hangs: false,
            create_error: None,
            start_error: None,
            wait: WaitScript::Exit(0),
            log_chunks: vec![b"hello-amt-info\n".to_vec()],
            log_error: None,
            remove_error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct State {
    pub calls: Vec<Call>,
    /// Container id -> name, for containers that currently exist.
    pub containers: BTreeMap<String, String>,
    pub images: BTreeSet<String>,
    pub completed_pulls: usize,
}

pub struct MockRuntime {
    script: Script,
    state: Arc<Mutex<State>>,
    pull_polls: Arc<AtomicUsize>,
}

impl MockRuntime {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            state: Arc::new(Mutex::new(State::default())),
            pull_polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wraps the mock for APIs taking `Arc<dyn ContainerRuntime>`, keeping a
    /// typed handle for assertions.
    pub fn shared(script: Script) -> (Arc<Self>, Arc<dyn ContainerRuntime>) {
        let mock = Arc::new(Self::new(script));
        let runtime: Arc<dyn ContainerRuntime> = mock.clone();
        (mock, runtime)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn live_containers(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.containers.values().cloned().collect()
    }

    pub fn images(&self) -> Vec<String> {
        self.state.lock().unwrap().images.iter().cloned().collect()
    }

    pub fn completed_pulls(&self) -> usize {
        self.state.lock().unwrap().completed_pulls
    }

    pub fn pull_polls(&self) -> usize {
        self.pull_polls.load(Ordering::SeqCst)
    }

    pub fn called(&self, pred: impl Fn(&Call) -> bool) -> bool {
        self.calls().iter().any(pred)
    }

    /// Seeds an existing container, as left behind by someone else.
    pub fn seed_container(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(id.to_string(), name.to_string());
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Pull stream that counts every poll and registers the image at the end.
struct ScriptedPull {
    reference: String,
    events: usize,
    error_at: Option<usize>,
    hangs: bool,
    emitted: usize,
    polls: Arc<AtomicUsize>,
    state: Arc<Mutex<State>>,
}

impl Stream for ScriptedPull {
    type Item = RuntimeResult<PullProgress>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if self.error_at == Some(self.emitted) {
            self.emitted += 1;
            return Poll::Ready(Some(Err(RuntimeError::new("unexpected EOF"))));
        }

        if self.emitted < self.events {
            self.emitted += 1;
            let status = format!("Downloading layer {}", self.emitted);
            return Poll::Ready(Some(Ok(PullProgress::status(status))));
        }

        if self.hangs {
            return Poll::Pending;
        }

        let mut state = self.state.lock().unwrap();
        state.images.insert(self.reference.clone());
        state.completed_pulls += 1;
        Poll::Ready(None)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    fn pull_image(&self, reference: &str) -> PullStream {
        self.record(Call::Pull(reference.to_string()));
        Box::pin(ScriptedPull {
            reference: reference.to_string(),
            events: self.script.pull_events,
            error_at: self.script.pull_error_at,
            hangs: self.script.pull_hangs,
            emitted: 0,
            polls: Arc::clone(&self.pull_polls),
            state: Arc::clone(&self.state),
        })
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> RuntimeResult<String> {
        self.record(Call::Create(name.to_string()));
        if let Some(err) = &self.script.create_error {
            return Err(err.clone());
        }

        assert!(spec.privileged, "task containers run privileged");
        let mut state = self.state.lock().unwrap();
        if state.containers.values().any(|existing| existing == name) {
            return Err(RuntimeError::with_status(
                409,
                format!("container name \"/{}\" is already in use", name),
            ));
        }
        let id = format!("id-{}", name);
        state.containers.insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.record(Call::Start(id.to_string()));
        match &self.script.start_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn wait_container(&self, id: &str) -> ContainerWait {
        self.record(Call::Wait(id.to_string()));
        let (senders, wait) = ContainerWait::channel();

        match self.script.wait.clone() {
            WaitScript::Exit(code) => senders.exited(code),
            WaitScript::Fail(message) => senders.failed(RuntimeError::new(message)),
            WaitScript::ErrorThenStatus(message, code) => {
                let _ = senders.error.send(RuntimeError::new(message));
                let _ = senders.status.send(runonce::WaitStatus { exit_code: code });
            }
            WaitScript::StatusThenError(code, message) => {
                let _ = senders.status.send(runonce::WaitStatus { exit_code: code });
                let error = senders.error;
                let driver = tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let _ = error.send(RuntimeError::new(message));
                });
                return wait.with_driver(driver);
            }
            WaitScript::Hang => {
                let driver = tokio::spawn(async move {
                    let _held = senders;
                    std::future::pending::<()>().await;
                });
                return wait.with_driver(driver);
            }
            WaitScript::Close => drop(senders),
        }

        wait
    }

    fn container_logs(&self, id: &str) -> LogStream {
        self.record(Call::Logs(id.to_string()));
        let mut items: Vec<RuntimeResult<Vec<u8>>> =
            self.script.log_chunks.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.script.log_error {
            items.push(Err(RuntimeError::new(message.clone())));
        }
        Box::pin(futures::stream::iter(items))
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        self.record(Call::Remove(id.to_string()));
        if let Some(err) = &self.script.remove_error {
            return Err(err.clone());
        }
        self.state.lock().unwrap().containers.remove(id);
        Ok(())
    }
}
