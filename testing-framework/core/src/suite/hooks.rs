use async_trait::async_trait;

use super::{TestInfo, TestOutcome};
use crate::DynError;

#[async_trait]
pub trait SetupHook: Send {
    async fn setup_suite(&mut self, suite: &str) -> Result<(), DynError>;
}

#[async_trait]
pub trait BeforeTestHook: Send {
    async fn before_test(&mut self, test: TestInfo<'_>);
}

#[async_trait]
pub trait AfterTestHook: Send {
    async fn after_test(&mut self, test: TestInfo<'_>, outcome: TestOutcome);
}

#[async_trait]
pub trait TearDownHook: Send {
    async fn tear_down_suite(&mut self, suite: &str);
}

/// A participant in a suite's lifecycle. Every hook defaults to absent.
pub trait SuiteComponent: Send {
    fn name(&self) -> &str;

    fn setup_hook(&mut self) -> Option<&mut dyn SetupHook> {
        None
    }

    fn before_test_hook(&mut self) -> Option<&mut dyn BeforeTestHook> {
        None
    }

    fn after_test_hook(&mut self) -> Option<&mut dyn AfterTestHook> {
        None
    }

    fn tear_down_hook(&mut self) -> Option<&mut dyn TearDownHook> {
        None
    }
}
