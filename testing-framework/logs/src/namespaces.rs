use regex::Regex;
use testing_framework_config::CollectionConfig;
use thiserror::Error;

/// Logical namespace groups that log collection cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NamespaceClass {
    /// Ephemeral namespaces created by individual tests.
    Test,
    /// Persistent infrastructure namespaces.
    System,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("invalid {class:?} namespace pattern `{pattern}`: {source}")]
    Pattern {
        class: NamespaceClass,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled namespace patterns. Matching uses unanchored regex search.
#[derive(Clone, Debug)]
pub struct NamespaceClassifier {
    test: Regex,
    system: Option<Regex>,
}

impl NamespaceClassifier {
    pub fn new(test: &str, system: Option<&str>) -> Result<Self, ClassifierError> {
        Ok(Self {
            test: compile(NamespaceClass::Test, test)?,
            system: system
                .map(|pattern| compile(NamespaceClass::System, pattern))
                .transpose()?,
        })
    }

    pub fn from_config(config: &CollectionConfig) -> Result<Self, ClassifierError> {
        Self::new(&config.test_namespaces, config.system_namespaces.as_deref())
    }

    #[must_use]
    pub fn matches(&self, namespace: &str, class: NamespaceClass) -> bool {
        match class {
            NamespaceClass::Test => self.test.is_match(namespace),
            NamespaceClass::System => self
                .system
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(namespace)),
        }
    }

    #[must_use]
    pub fn matches_any(&self, namespace: &str) -> bool {
        self.classify(namespace).is_some()
    }

    /// Test membership takes precedence when a namespace matches both classes.
    #[must_use]
    pub fn classify(&self, namespace: &str) -> Option<NamespaceClass> {
        [NamespaceClass::Test, NamespaceClass::System]
            .into_iter()
            .find(|class| self.matches(namespace, *class))
    }
}

fn compile(class: NamespaceClass, pattern: &str) -> Result<Regex, ClassifierError> {
    Regex::new(pattern).map_err(|source| ClassifierError::Pattern {
        class,
        pattern: pattern.to_owned(),
        source,
    })
}
