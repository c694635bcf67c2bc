use std::future::Future;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{SuiteComponent, TestInfo, TestOutcome};
use crate::DynError;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("setup of component `{component}` in suite `{suite}` failed: {source}")]
    Setup {
        suite: String,
        component: String,
        #[source]
        source: DynError,
    },
}

/// Ordered set of suite components plus the hooks driving them.
pub struct SuiteLifecycle {
    name: String,
    components: Vec<Box<dyn SuiteComponent>>,
}

impl SuiteLifecycle {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_component(mut self, component: impl SuiteComponent + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs every present setup hook in registration order, stopping at the
    /// first failure.
    pub async fn setup_suite(&mut self) -> Result<(), SuiteError> {
        info!(suite = %self.name, components = self.components.len(), "setting up suite");
        for component in &mut self.components {
            let component_name = component.name().to_owned();
            let Some(hook) = component.setup_hook() else {
                continue;
            };
            debug!(suite = %self.name, component = %component_name, "running setup hook");
            hook.setup_suite(&self.name)
                .await
                .map_err(|source| SuiteError::Setup {
                    suite: self.name.clone(),
                    component: component_name,
                    source,
                })?;
        }
        Ok(())
    }

    pub async fn before_test(&mut self, test: &str) {
        let info = TestInfo {
            suite: &self.name,
            test,
        };
        for component in &mut self.components {
            if let Some(hook) = component.before_test_hook() {
                hook.before_test(info).await;
            }
        }
    }

    pub async fn after_test(&mut self, test: &str, outcome: TestOutcome) {
        let info = TestInfo {
            suite: &self.name,
            test,
        };
        if outcome.failed() {
            warn!(suite = %self.name, test, "test failed");
        }
        for component in &mut self.components {
            if let Some(hook) = component.after_test_hook() {
                hook.after_test(info, outcome).await;
            }
        }
    }

    /// Runs teardown hooks in reverse registration order.
    pub async fn tear_down_suite(&mut self) {
        info!(suite = %self.name, "tearing down suite");
        for component in self.components.iter_mut().rev() {
            if let Some(hook) = component.tear_down_hook() {
                hook.tear_down_suite(&self.name).await;
            }
        }
    }

    /// Wraps one test body with the before/after hooks and returns its outcome.
    pub async fn run_test<F, Fut>(&mut self, test: &str, body: F) -> TestOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DynError>>,
    {
        self.before_test(test).await;
        let outcome = match body().await {
            Ok(()) => TestOutcome::Passed,
            Err(err) => {
                warn!(suite = %self.name, test, error = %err, "test body returned an error");
                TestOutcome::Failed
            }
        };
        self.after_test(test, outcome).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::suite::{AfterTestHook, SetupHook, TearDownHook};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        journal: Journal,
        fail_setup: bool,
    }

    #[async_trait]
    impl SetupHook for Recording {
        async fn setup_suite(&mut self, suite: &str) -> Result<(), DynError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("setup:{}:{suite}", self.name));
            if self.fail_setup {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AfterTestHook for Recording {
        async fn after_test(&mut self, test: TestInfo<'_>, outcome: TestOutcome) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("after:{}:{}:{outcome:?}", self.name, test.label()));
        }
    }

    #[async_trait]
    impl TearDownHook for Recording {
        async fn tear_down_suite(&mut self, _suite: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("teardown:{}", self.name));
        }
    }

    impl SuiteComponent for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn setup_hook(&mut self) -> Option<&mut dyn SetupHook> {
            Some(self)
        }

        fn after_test_hook(&mut self) -> Option<&mut dyn AfterTestHook> {
            Some(self)
        }

        fn tear_down_hook(&mut self) -> Option<&mut dyn TearDownHook> {
            Some(self)
        }
    }

    /// A component with no hooks at all.
    struct Passive;

    impl SuiteComponent for Passive {
        fn name(&self) -> &str {
            "passive"
        }
    }

    fn recording(name: &'static str, journal: &Journal, fail_setup: bool) -> Recording {
        Recording {
            name,
            journal: Arc::clone(journal),
            fail_setup,
        }
    }

    #[tokio::test]
    async fn hooks_run_in_order_and_teardown_in_reverse() {
        let journal = Journal::default();
        let mut suite = SuiteLifecycle::new("basic")
            .with_component(recording("a", &journal, false))
            .with_component(Passive)
            .with_component(recording("b", &journal, false));

        suite.setup_suite().await.unwrap();
        let outcome = suite
            .run_test("TestKernel2Kernel", || async { Err::<(), DynError>("failed".into()) })
            .await;
        suite.tear_down_suite().await;

        assert_eq!(outcome, TestOutcome::Failed);
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "setup:a:basic",
                "setup:b:basic",
                "after:a:basic/TestKernel2Kernel:Failed",
                "after:b:basic/TestKernel2Kernel:Failed",
                "teardown:b",
                "teardown:a",
            ]
        );
    }

    #[tokio::test]
    async fn setup_stops_at_first_failure() {
        let journal = Journal::default();
        let mut suite = SuiteLifecycle::new("basic")
            .with_component(recording("a", &journal, true))
            .with_component(recording("b", &journal, false));

        let err = suite.setup_suite().await.unwrap_err();

        assert!(matches!(err, SuiteError::Setup { ref component, .. } if component == "a"));
        assert_eq!(*journal.lock().unwrap(), vec!["setup:a:basic"]);
    }
}
