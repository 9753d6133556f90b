//! Drives compilation attempts as the source changes.
//!
//! ```text
//! Idle ──set_source──▶ Compiling ──▶ Ready ──render failure──▶ RuntimeFailed
//!                          │
//!                          └──────▶ CompileFailed
//! ```
//!
//! Every attempt carries an [`AttemptToken`]. An attempt's result is applied
//! only while its token is still the newest one, so attempts may be polled in
//! any order and the phase always reflects the latest source.

use crate::config::PreviewConfig;
use crate::error::{PreviewError, RuntimeError};
use crate::parser::SourceText;
use crate::registry::CapabilityRegistry;
use crate::sandbox::CompiledArtifact;
use futures::future::{self, LocalBoxFuture};
use futures::task::{LocalSpawnExt, SpawnError};
use futures::{FutureExt, Stream, StreamExt};
use futures_channel::mpsc;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::task::Poll;

/// Version stamp of one compilation attempt. Later attempts compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptToken(u64);

impl fmt::Display for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    Compiling {
        token: AttemptToken,
    },
    Ready {
        token: AttemptToken,
        artifact: Rc<CompiledArtifact>,
    },
    CompileFailed {
        token: AttemptToken,
        error: PreviewError,
    },
    /// The artifact compiled but failed while rendering.
    RuntimeFailed {
        token: AttemptToken,
        artifact: Rc<CompiledArtifact>,
        error: RuntimeError,
    },
}

impl Phase {
    pub fn token(&self) -> Option<AttemptToken> {
        match self {
            Self::Idle => None,
            Self::Compiling { token }
            | Self::Ready { token, .. }
            | Self::CompileFailed { token, .. }
            | Self::RuntimeFailed { token, .. } => Some(*token),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Compiling { .. } => "compiling",
            Self::Ready { .. } => "ready",
            Self::CompileFailed { .. } => "compile-failed",
            Self::RuntimeFailed { .. } => "runtime-failed",
        }
    }
}

/// What happened to an attempt once it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Applied,
    /// A newer attempt started, or the controller was disposed.
    Discarded,
}

struct State {
    registry: Rc<CapabilityRegistry>,
    config: Rc<PreviewConfig>,
    source: SourceText,
    last_token: u64,
    phase: Phase,
    disposed: bool,
    subscribers: Vec<mpsc::UnboundedSender<Phase>>,
}

impl State {
    fn is_current(&self, token: AttemptToken) -> bool {
        !self.disposed && AttemptToken(self.last_token) == token
    }

    fn set_phase(&mut self, phase: Phase) {
        log::debug!("Preview phase: {}", phase.name());
        self.phase = phase;
        let phase = &self.phase;
        self.subscribers
            .retain(|subscriber| subscriber.unbounded_send(phase.clone()).is_ok());
    }
}

/// Owns the current source and the latest attempt outcome.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct LifecycleController {
    state: Rc<RefCell<State>>,
}

impl LifecycleController {
    pub fn new(registry: Rc<CapabilityRegistry>, config: PreviewConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                registry,
                config: Rc::new(config),
                source: SourceText::default(),
                last_token: 0,
                phase: Phase::Idle,
                disposed: false,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase.clone()
    }

    pub fn source(&self) -> SourceText {
        self.state.borrow().source.clone()
    }

    pub fn config(&self) -> Rc<PreviewConfig> {
        Rc::clone(&self.state.borrow().config)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    /// Replace the source and start a new attempt.
    ///
    /// The phase becomes `Compiling` immediately. The returned future yields
    /// once, then compiles and applies its result unless it has gone stale.
    pub fn set_source(&self, source: impl Into<SourceText>) -> LocalBoxFuture<'static, AttemptOutcome> {
        let source = source.into();
        let (token, registry, config) = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                log::debug!("Ignoring source change on disposed controller");
                return future::ready(AttemptOutcome::Discarded).boxed_local();
            }
            state.last_token += 1;
            let token = AttemptToken(state.last_token);
            state.source = source.clone();
            state.set_phase(Phase::Compiling { token });
            (token, Rc::clone(&state.registry), Rc::clone(&state.config))
        };
        log::debug!("Attempt {token} started ({} bytes)", source.len());

        let state = Rc::clone(&self.state);
        async move {
            yield_once().await;

            if !state.borrow().is_current(token) {
                log::debug!("Attempt {token} discarded before compiling");
                return AttemptOutcome::Discarded;
            }
            let result = crate::compile(&source, &registry, &config);

            let mut state = state.borrow_mut();
            if !state.is_current(token) {
                log::debug!("Attempt {token} discarded");
                return AttemptOutcome::Discarded;
            }
            let phase = match result {
                Ok(artifact) => Phase::Ready {
                    token,
                    artifact: Rc::new(artifact),
                },
                Err(error) => {
                    log::warn!("Attempt {token} failed: {error}");
                    Phase::CompileFailed { token, error }
                }
            };
            state.set_phase(phase);
            log::debug!("Attempt {token} applied");
            AttemptOutcome::Applied
        }
        .boxed_local()
    }

    /// Record a failure captured while rendering the artifact of `token`.
    ///
    /// Ignored unless that artifact is the one currently `Ready`.
    pub fn report_render_failure(&self, token: AttemptToken, error: RuntimeError) {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return;
        }
        let Phase::Ready {
            token: ready,
            artifact,
        } = &state.phase
        else {
            return;
        };
        if *ready != token {
            return;
        }
        log::warn!("Attempt {token} failed while rendering: {error}");
        let artifact = Rc::clone(artifact);
        state.set_phase(Phase::RuntimeFailed {
            token,
            artifact,
            error,
        });
    }

    /// Stop applying results. Attempts still in flight are discarded.
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        state.disposed = true;
        state.subscribers.clear();
        log::debug!("Preview controller disposed");
    }

    /// Phase snapshots, starting with the current one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Phase> {
        let (sender, receiver) = mpsc::unbounded();
        let mut state = self.state.borrow_mut();
        if !state.disposed && sender.unbounded_send(state.phase.clone()).is_ok() {
            state.subscribers.push(sender);
        }
        receiver
    }

    /// Start an attempt for every edit and run it on `spawner`.
    pub fn drive<S>(&self, edits: S, spawner: &impl LocalSpawnExt) -> Result<(), SpawnError>
    where
        S: Stream<Item = SourceText> + 'static,
    {
        let controller = self.clone();
        let (attempts, mut pending) = mpsc::unbounded::<LocalBoxFuture<'static, AttemptOutcome>>();
        spawner.spawn_local(
            edits
                .map(move |edit| controller.set_source(edit))
                .for_each(move |attempt| {
                    if attempts.unbounded_send(attempt).is_err() {
                        log::debug!("Attempt runner stopped");
                    }
                    future::ready(())
                }),
        )?;
        spawner.spawn_local(async move {
            while let Some(attempt) = pending.next().await {
                attempt.await;
            }
        })?;
        Ok(())
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LifecycleController")
            .field("phase", &state.phase.name())
            .field("last_token", &state.last_token)
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Pending exactly once, waking itself.
async fn yield_once() {
    let mut yielded = false;
    future::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::default_registry;
    use crate::registry::CollisionPolicy;
    use futures::executor::{LocalPool, block_on};

    fn controller() -> LifecycleController {
        let registry = Rc::new(default_registry(CollisionPolicy::Reject).unwrap());
        LifecycleController::new(registry, PreviewConfig::default())
    }

    #[test]
    fn test_starts_idle() {
        assert!(matches!(controller().phase(), Phase::Idle));
    }

    #[test]
    fn test_set_source_enters_compiling_immediately() {
        let controller = controller();
        let attempt = controller.set_source("export default () => null;");
        assert!(matches!(controller.phase(), Phase::Compiling { .. }));
        assert_eq!(block_on(attempt), AttemptOutcome::Applied);
        assert!(matches!(controller.phase(), Phase::Ready { .. }));
    }

    #[test]
    fn test_newer_attempt_wins_regardless_of_completion_order() {
        let controller = controller();
        let first = controller.set_source("export default 1;");
        let second = controller.set_source("export default () => null;");

        assert_eq!(block_on(second), AttemptOutcome::Applied);
        assert_eq!(block_on(first), AttemptOutcome::Discarded);
        let Phase::Ready { token, .. } = controller.phase() else {
            panic!("Expected ready phase");
        };
        assert_eq!(token, AttemptToken(2));
    }

    #[test]
    fn test_dispose_discards_in_flight_attempts() {
        let controller = controller();
        let attempt = controller.set_source("export default () => null;");
        controller.dispose();
        assert_eq!(block_on(attempt), AttemptOutcome::Discarded);
        assert!(matches!(controller.phase(), Phase::Compiling { .. }));
        assert_eq!(
            block_on(controller.set_source("export default 2;")),
            AttemptOutcome::Discarded
        );
    }

    #[test]
    fn test_render_failure_only_applies_to_ready_token() {
        let controller = controller();
        block_on(controller.set_source("export default () => null;"));
        controller.report_render_failure(AttemptToken(7), RuntimeError::type_error("stale"));
        assert!(matches!(controller.phase(), Phase::Ready { .. }));

        controller.report_render_failure(AttemptToken(1), RuntimeError::type_error("boom"));
        let Phase::RuntimeFailed { error, .. } = controller.phase() else {
            panic!("Expected runtime failure");
        };
        assert_eq!(error.message, "boom");
    }

    #[test]
    fn test_subscribe_and_drive() {
        let controller = controller();
        let mut phases = controller.subscribe();
        let mut pool = LocalPool::new();
        let edits = futures::stream::iter(vec![
            SourceText::from("export default <div>"),
            SourceText::from("export default () => <div />;"),
        ]);
        controller.drive(edits, &pool.spawner()).unwrap();
        pool.run_until_stalled();

        let mut names = Vec::new();
        while let Ok(Some(phase)) = phases.try_next() {
            names.push(phase.name());
        }
        assert_eq!(names.first(), Some(&"idle"));
        assert_eq!(names.last(), Some(&"ready"));
        assert!(!names.contains(&"compile-failed"));
    }
}
