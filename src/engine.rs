use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::compile::Scope;
use crate::error::RulegraphError;
use crate::types::compilation::CompilationResult;
use crate::types::definition::{EngineDefinition, RuleTestDefinition};
use crate::types::schema::FieldType;
use crate::{EvaluationError, RootContext, RuleSet, SchemaRegistry, Value};

/// The test cases declared on one ruleset.
#[derive(Debug, Clone)]
pub(crate) struct TestSuite {
    pub(crate) ruleset: String,
    pub(crate) data_type: FieldType,
    pub(crate) tests: Vec<RuleTestDefinition>,
}

#[derive(Debug)]
struct CompiledRuleSet {
    ruleset: Arc<RuleSet<Value>>,
    data_type: FieldType,
}

/// A compiled rule graph: every ruleset of a configuration, linked and ready
/// to evaluate, plus the schema its data is typed against.
///
/// Cloning is cheap; rulesets and the registry are shared.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<SchemaRegistry>,
    rulesets: Arc<HashMap<String, CompiledRuleSet>>,
    tests: Arc<[TestSuite]>,
}

/// Result of evaluating one ruleset against one instance.
#[derive(Debug)]
pub struct Evaluation {
    pub passed: bool,
    pub context: RootContext,
}

impl Engine {
    pub(crate) fn new(
        registry: Arc<SchemaRegistry>,
        rulesets: HashMap<String, (Arc<RuleSet<Value>>, FieldType)>,
        tests: Vec<TestSuite>,
    ) -> Self {
        let rulesets = rulesets
            .into_iter()
            .map(|(name, (ruleset, data_type))| (name, CompiledRuleSet { ruleset, data_type }))
            .collect();
        Self {
            registry,
            rulesets: Arc::new(rulesets),
            tests: tests.into(),
        }
    }

    /// Compile a configuration. Inspect the result for per-unit outcomes, or
    /// call [`CompilationResult::into_engine`].
    #[must_use]
    pub fn compile(def: &EngineDefinition) -> CompilationResult {
        crate::compile::compile(def)
    }

    /// Parse and compile a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`RulegraphError::Json`] if the document is malformed, or
    /// [`RulegraphError::CompilationFailed`] if any unit fails to compile.
    pub fn from_json(input: &str) -> Result<Self, RulegraphError> {
        Self::compile(&EngineDefinition::from_json(input)?).into_engine()
    }

    /// Read, parse, and compile a JSON configuration file.
    ///
    /// # Errors
    ///
    /// As [`from_json`](Self::from_json), plus [`RulegraphError::Io`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RulegraphError> {
        Self::compile(&EngineDefinition::from_file(path)?).into_engine()
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    #[must_use]
    pub fn ruleset(&self, name: &str) -> Option<&Arc<RuleSet<Value>>> {
        self.rulesets.get(name).map(|c| &c.ruleset)
    }

    /// The type a ruleset evaluates.
    #[must_use]
    pub fn data_type(&self, name: &str) -> Option<&FieldType> {
        self.rulesets.get(name).map(|c| &c.data_type)
    }

    /// Names of all compiled rulesets, sorted.
    #[must_use]
    pub fn ruleset_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rulesets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate a ruleset against `data` in place, with a fresh context.
    ///
    /// # Errors
    ///
    /// Returns [`RulegraphError::UnknownRuleSet`] for an unknown name, and an
    /// evaluation error if `data` is not of the ruleset's type or a rule
    /// fails at runtime.
    pub fn evaluate(&self, name: &str, data: &mut Value) -> Result<Evaluation, RulegraphError> {
        let compiled = self
            .rulesets
            .get(name)
            .ok_or_else(|| RulegraphError::UnknownRuleSet {
                name: name.to_owned(),
            })?;
        if !self.registry.conforms(&compiled.data_type, data) {
            return Err(EvaluationError::TypeMismatch {
                expected: compiled.data_type.to_string(),
                found: data.type_name(),
            }
            .into());
        }
        let (passed, context) = compiled.ruleset.run(data)?;
        debug!(ruleset = name, passed, "ruleset evaluated");
        Ok(Evaluation { passed, context })
    }

    /// Build an instance of the ruleset's type from JSON and evaluate it.
    /// Returns the mutated instance alongside the evaluation.
    ///
    /// # Errors
    ///
    /// As [`evaluate`](Self::evaluate), plus [`RulegraphError::Instance`] if
    /// the JSON does not fit the type.
    pub fn evaluate_json(
        &self,
        name: &str,
        json: &serde_json::Value,
    ) -> Result<(Value, Evaluation), RulegraphError> {
        let data_type = self
            .data_type(name)
            .ok_or_else(|| RulegraphError::UnknownRuleSet {
                name: name.to_owned(),
            })?;
        let mut data = self.registry.value_from_json(data_type, json)?;
        let evaluation = self.evaluate(name, &mut data)?;
        Ok((data, evaluation))
    }

    /// A default-valued instance of a data model.
    ///
    /// # Errors
    ///
    /// Returns [`RulegraphError::UnknownModel`] if no such model is declared.
    pub fn default_instance(&self, model: &str) -> Result<Value, RulegraphError> {
        self.registry
            .default_instance(model)
            .ok_or_else(|| RulegraphError::UnknownModel {
                name: model.to_owned(),
            })
    }

    /// An instance of a data model built from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RulegraphError::Instance`] if the model is unknown or the
    /// JSON does not fit it.
    pub fn instance_from_json(
        &self,
        model: &str,
        json: &serde_json::Value,
    ) -> Result<Value, RulegraphError> {
        Ok(self.registry.instance_from_json(model, json)?)
    }

    /// Run every test case declared in the configuration.
    ///
    /// Each case builds its `data`, evaluates the ruleset, then checks
    /// `expect` against the mutated data. The ruleset's own result does not
    /// decide the outcome. A case that errors counts as failed.
    #[must_use]
    pub fn run_tests(&self) -> TestReport {
        let mut outcomes = Vec::new();
        for suite in self.tests.iter() {
            for (index, test) in suite.tests.iter().enumerate() {
                let outcome = match self.run_test(suite, index, test) {
                    Ok((passed, ruleset_passed)) => TestOutcome {
                        ruleset: suite.ruleset.clone(),
                        index,
                        passed,
                        ruleset_passed: Some(ruleset_passed),
                        message: (!passed)
                            .then(|| format!("expectation '{}' did not hold", test.expect)),
                    },
                    Err(err) => TestOutcome {
                        ruleset: suite.ruleset.clone(),
                        index,
                        passed: false,
                        ruleset_passed: None,
                        message: Some(err.to_string()),
                    },
                };
                if !outcome.passed {
                    warn!(
                        ruleset = %outcome.ruleset,
                        index,
                        reason = outcome.message.as_deref().unwrap_or_default(),
                        "test case failed"
                    );
                }
                outcomes.push(outcome);
            }
        }
        let report = TestReport { outcomes };
        info!(passed = report.passed(), failed = report.failed(), "test run finished");
        report
    }

    fn run_test(
        &self,
        suite: &TestSuite,
        index: usize,
        test: &RuleTestDefinition,
    ) -> Result<(bool, bool), RulegraphError> {
        let unit = format!("{}.tests[{index}]", suite.ruleset);
        let expectation = Scope::test(&self.registry, unit, suite.data_type.clone())
            .condition(&test.expect)?;
        let mut data = self.registry.value_from_json(&suite.data_type, &test.data)?;
        let evaluation = self.evaluate(&suite.ruleset, &mut data)?;
        let passed = expectation.test(&[&data][..])?;
        Ok((passed, evaluation.passed))
    }
}

/// Outcome of one declared test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub ruleset: String,
    pub index: usize,
    pub passed: bool,
    /// The ruleset's own result, if evaluation got that far.
    pub ruleset_passed: Option<bool>,
    /// Why the case failed.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
}

impl TestReport {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} passed, {} failed", self.passed(), self.failed())?;
        for outcome in &self.outcomes {
            let status = if outcome.passed { "pass" } else { "FAIL" };
            write!(f, "  [{status}] {}[{}]", outcome.ruleset, outcome.index)?;
            if let Some(message) = &outcome.message {
                write!(f, ": {message}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
