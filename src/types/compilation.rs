use std::fmt;

use super::error::CompileError;
use crate::engine::Engine;
use crate::error::RulegraphError;

/// What kind of configuration unit a [`UnitResult`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    DataModel,
    Rule,
    RuleSet,
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitType::DataModel => write!(f, "DataModel"),
            UnitType::Rule => write!(f, "Rule"),
            UnitType::RuleSet => write!(f, "RuleSet"),
        }
    }
}

/// Outcome of compiling a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitResult {
    pub unit_type: UnitType,
    pub name: String,
    pub success: bool,
    /// Human-readable outcome: `"compiled"` or the error message.
    pub message: String,
    /// The source the unit was compiled from, for diagnostics.
    pub meta: String,
    pub error: Option<CompileError>,
}

impl UnitResult {
    pub(crate) fn new(
        unit_type: UnitType,
        name: impl Into<String>,
        meta: impl Into<String>,
        outcome: Result<(), CompileError>,
    ) -> Self {
        let (success, message, error) = match outcome {
            Ok(()) => (true, "compiled".to_owned(), None),
            Err(err) => (false, err.to_string(), Some(err)),
        };
        Self {
            unit_type,
            name: name.into(),
            success,
            message,
            meta: meta.into(),
            error,
        }
    }
}

/// Every unit outcome of one compilation, plus the engine if all succeeded.
///
/// Compilation runs in three passes (data models, rules, rulesets). A pass
/// only starts if every unit of the previous one compiled, so a failed
/// result lists the units of the passes that ran.
#[derive(Debug)]
pub struct CompilationResult {
    units: Vec<UnitResult>,
    engine: Option<Engine>,
}

impl CompilationResult {
    pub(crate) fn new(units: Vec<UnitResult>, engine: Option<Engine>) -> Self {
        Self { units, engine }
    }

    /// `true` iff every unit compiled.
    #[must_use]
    pub fn success(&self) -> bool {
        self.engine.is_some() && self.units.iter().all(|u| u.success)
    }

    #[must_use]
    pub fn units(&self) -> &[UnitResult] {
        &self.units
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitResult> {
        self.units.iter().filter(|u| !u.success)
    }

    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitResult> {
        self.units.iter().find(|u| u.name == name)
    }

    #[must_use]
    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    /// # Errors
    ///
    /// Returns [`RulegraphError::CompilationFailed`] listing every failed unit.
    pub fn into_engine(self) -> Result<Engine, RulegraphError> {
        match self.engine {
            Some(engine) => Ok(engine),
            None => Err(RulegraphError::CompilationFailed {
                failed: self
                    .units
                    .iter()
                    .filter(|u| !u.success)
                    .map(|u| u.message.clone())
                    .collect(),
            }),
        }
    }
}

impl fmt::Display for CompilationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        if self.success() {
            writeln!(f, "compilation succeeded ({} units)", self.units.len())?;
        } else {
            writeln!(
                f,
                "compilation failed ({failed} of {} units)",
                self.units.len()
            )?;
        }
        for unit in &self.units {
            let status = if unit.success { "ok" } else { "FAILED" };
            writeln!(
                f,
                "  [{status}] {} {}: {}",
                unit.unit_type, unit.name, unit.message
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_has_no_engine() {
        let result = CompilationResult::new(
            vec![
                UnitResult::new(UnitType::DataModel, "Customer", "", Ok(())),
                UnitResult::new(
                    UnitType::DataModel,
                    "Customer",
                    "",
                    Err(CompileError::DuplicateModel {
                        name: "Customer".into(),
                    }),
                ),
            ],
            None,
        );
        assert!(!result.success());
        assert_eq!(result.failures().count(), 1);
        assert!(result.engine().is_none());
        let text = result.to_string();
        assert!(text.starts_with("compilation failed (1 of 2 units)"));
        assert!(text.contains("[FAILED] DataModel Customer: duplicate data model 'Customer'"));

        let err = result.into_engine().unwrap_err();
        assert_eq!(
            err.to_string(),
            "compilation failed: duplicate data model 'Customer'"
        );
    }
}
