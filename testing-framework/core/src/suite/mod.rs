//! Suite lifecycle driven through explicit capabilities.
//!
//! A suite is an ordered list of [`SuiteComponent`]s. Each component exposes
//! only the hooks it actually implements; [`SuiteLifecycle`] invokes whatever
//! is present, in registration order for setup and per-test hooks and in
//! reverse order for teardown.

mod hooks;
mod lifecycle;

pub use hooks::{AfterTestHook, BeforeTestHook, SetupHook, SuiteComponent, TearDownHook};
pub use lifecycle::{SuiteError, SuiteLifecycle};

/// Result of a single test as reported to after-test hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
}

impl TestOutcome {
    #[must_use]
    pub const fn failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Identifies the test a per-test hook is invoked for.
#[derive(Clone, Copy, Debug)]
pub struct TestInfo<'a> {
    pub suite: &'a str,
    pub test: &'a str,
}

impl TestInfo<'_> {
    /// Artifact label used for per-test output: `<suite>/<test>`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.suite, self.test)
    }
}
