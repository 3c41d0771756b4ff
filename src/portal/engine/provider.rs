//! Ordered, self-modifying task sequence of one backend.

use std::fmt;

use super::context::{RunEnv, TaskContext};
use super::session::{AuthResult, Session, Vars};
use super::task::Task;
use crate::portal::core::PortalClient;
use crate::portal::providers::ProviderKind;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub result: Option<AuthResult>,
    pub error: Option<String>,
    /// Number of tasks executed, spliced ones included.
    pub completed: usize,
    /// Providers handed off to, in order.
    pub switched: Vec<ProviderKind>,
    pub vars: Vars,
}

pub struct Provider {
    kind: ProviderKind,
    tasks: Vec<Task>,
}

impl Provider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            tasks: Vec::new(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn add(&mut self, task: Task) -> &mut Self {
        self.tasks.push(task);
        self
    }

    /// Insert `tasks` right after `index`, keeping their order.
    pub fn insert_after(&mut self, index: usize, tasks: Vec<Task>) {
        let at = (index + 1).min(self.tasks.len());
        self.tasks.splice(at..at, tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn labels(&self) -> Vec<Option<&str>> {
        self.tasks.iter().map(Task::label).collect()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    /// Run the sequence from the start with a fresh session.
    ///
    /// The task list length is re-read on every step so tasks spliced in by a
    /// hand-off run before the remaining tasks.
    pub async fn run(&mut self, env: &RunEnv, client: &mut PortalClient) -> RunReport {
        let mut session = Session::new();
        let mut switched = Vec::new();
        let mut completed = 0;
        let mut cursor = 0;

        while cursor < self.tasks.len() {
            if client.cancellation().is_cancelled() {
                log::debug!("{} run cancelled at task {}", self.kind, cursor);
                break;
            }

            let task = &self.tasks[cursor];
            if let Some(label) = task.label() {
                env.diagnostics.progress(label);
            }

            let mut ctx = TaskContext::new(&mut session, client, env, cursor);
            let proceed = task.run(&mut ctx).await;
            let (splice, kinds, stopped) = ctx.finish();
            completed += 1;

            if !splice.is_empty() {
                log::debug!("splicing {} task(s) after position {}", splice.len(), cursor);
                self.insert_after(cursor, splice);
            }
            switched.extend(kinds);

            if !proceed || stopped || session.vars.result().is_some() {
                break;
            }
            cursor += 1;
        }

        RunReport {
            result: session.vars.result(),
            error: session.error,
            completed,
            switched,
            vars: session.vars,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind)
            .field("tasks", &self.tasks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::modules::events::DiagnosticDispatcher;
    use crate::portal::core::{HttpTransport, PortalRequest, PortalResponse, TransportError};
    use crate::portal::engine::task::Step;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use url::Url;

    struct NoNetwork;

    #[async_trait]
    impl HttpTransport for NoNetwork {
        async fn execute(&self, _: &PortalRequest) -> Result<PortalResponse, TransportError> {
            Err(TransportError::Transport("offline".into()))
        }

        fn set_cookie(&self, _: &Url, _: &str, _: &str) {}

        fn cookies(&self, _: &Url) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    struct Record {
        name: &'static str,
        journal: Journal,
        outcome: bool,
    }

    #[async_trait]
    impl Step for Record {
        async fn run(&self, _ctx: &mut TaskContext<'_>) -> bool {
            self.journal.lock().unwrap().push(self.name);
            self.outcome
        }
    }

    struct HandOff {
        journal: Journal,
    }

    #[async_trait]
    impl Step for HandOff {
        async fn run(&self, ctx: &mut TaskContext<'_>) -> bool {
            self.journal.lock().unwrap().push("handoff");
            let mut other = Provider::new(ProviderKind::AuthWifi);
            other.add(record("x", &self.journal, true));
            other.add(record("y", &self.journal, true));
            ctx.splice(other);
            true
        }
    }

    fn record(name: &'static str, journal: &Journal, outcome: bool) -> Task {
        Task::plain(Record {
            name,
            journal: journal.clone(),
            outcome,
        })
    }

    fn env() -> RunEnv {
        RunEnv::new(AuthConfig::default(), Arc::new(DiagnosticDispatcher::new()))
    }

    #[tokio::test]
    async fn spliced_tasks_run_right_after_the_splicing_task() {
        let journal = Journal::default();
        let mut provider = Provider::new(ProviderKind::Unknown);
        provider.add(record("a", &journal, true));
        provider.add(Task::plain(HandOff {
            journal: journal.clone(),
        }));
        provider.add(record("b", &journal, true));

        let mut client = PortalClient::new(Arc::new(NoNetwork));
        let report = provider.run(&env(), &mut client).await;

        assert_eq!(*journal.lock().unwrap(), ["a", "handoff", "x", "y", "b"]);
        assert_eq!(report.completed, 5);
        assert_eq!(report.switched, vec![ProviderKind::AuthWifi]);
        assert_eq!(provider.len(), 5);
    }

    #[tokio::test]
    async fn failing_task_stops_the_run() {
        let journal = Journal::default();
        let mut provider = Provider::new(ProviderKind::Unknown);
        provider.add(record("a", &journal, false));
        provider.add(record("b", &journal, true));

        let mut client = PortalClient::new(Arc::new(NoNetwork));
        let report = provider.run(&env(), &mut client).await;

        assert_eq!(*journal.lock().unwrap(), ["a"]);
        assert_eq!(report.completed, 1);
        assert_eq!(report.result, None);
    }

    #[test]
    fn insert_after_keeps_order() {
        let journal = Journal::default();
        let mut provider = Provider::new(ProviderKind::Unknown);
        provider.add(Task::named("first", Record { name: "a", journal: journal.clone(), outcome: true }));
        provider.add(Task::named("last", Record { name: "b", journal: journal.clone(), outcome: true }));
        provider.insert_after(
            0,
            vec![
                Task::named("inserted-1", Record { name: "c", journal: journal.clone(), outcome: true }),
                Task::named("inserted-2", Record { name: "d", journal, outcome: true }),
            ],
        );

        assert_eq!(
            provider.labels(),
            vec![Some("first"), Some("inserted-1"), Some("inserted-2"), Some("last")]
        );
    }
}
