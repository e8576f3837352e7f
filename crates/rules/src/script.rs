//! Sandboxed script evaluator for rule bodies.
//!
//! Each rule owns one [`RuleScript`], compiled once and kept for the rule's
//! lifetime. The script must define a function named `main`; evaluation calls
//! it with the gathered metric values and maps the return value back to an
//! outcome key.
//!
//! Symbols available to rule authors:
//! - the integer outcome constants `OK`, `LOW_WARNING`, `LOW_CRITICAL`,
//!   `HIGH_WARNING`, `HIGH_CRITICAL`, `UNKNOWN`
//! - every entry of the rule's `values` map, as a numeric constant
//!
//! The interpreter exposes arithmetic, comparison and string operations only;
//! there is no file, network or process access, and execution is bounded by
//! an operation limit.

use indexmap::IndexMap;
use rhai::{Dynamic, Engine, Module, Scope, AST};
use thiserror::Error;

/// Outcome constants injected into every script environment.
pub const LOW_CRITICAL: i64 = -2;
pub const LOW_WARNING: i64 = -1;
pub const OK: i64 = 0;
pub const HIGH_WARNING: i64 = 1;
pub const HIGH_CRITICAL: i64 = 2;
pub const UNKNOWN: i64 = 3;

/// Upper bound on interpreter operations per evaluation.
const MAX_OPERATIONS: u64 = 100_000;

/// Errors raised by script compilation and evaluation.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Compilation failed, top-level execution failed, or `main` is missing.
    #[error("invalid script: {0}")]
    BadCode(String),

    /// An evaluation argument was NaN (a missing metric, signalled upstream).
    #[error("NaN evaluation argument")]
    BadArg,

    /// Script raised a runtime error.
    #[error("script evaluation failed: {0}")]
    EvalFail(String),

    /// Script returned a value that is neither an outcome key nor a constant.
    #[error("unexpected script return value: {0}")]
    BadReturn(String),
}

/// Value returned by a script's `main` function.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeToken {
    /// A string outcome key, e.g. `"high_critical"`.
    Key(String),
    /// One of the integer outcome constants.
    Code(i64),
}

impl OutcomeToken {
    /// Resolve to the outcome key the rule's results map is indexed by.
    pub fn into_key(self) -> Option<String> {
        match self {
            OutcomeToken::Key(key) => Some(key),
            OutcomeToken::Code(code) => code_to_key(code).map(str::to_string),
        }
    }
}

/// Map an integer outcome constant back to its key.
pub fn code_to_key(code: i64) -> Option<&'static str> {
    match code {
        LOW_CRITICAL => Some("low_critical"),
        LOW_WARNING => Some("low_warning"),
        OK => Some("ok"),
        HIGH_WARNING => Some("high_warning"),
        HIGH_CRITICAL => Some("high_critical"),
        UNKNOWN => Some("unknown"),
        _ => None,
    }
}

/// A compiled rule script with its bound constants.
#[derive(Debug)]
pub struct RuleScript {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
}

impl RuleScript {
    /// Compile `code` with the rule's variables bound as numeric constants.
    ///
    /// Fails with [`ScriptError::BadCode`] if compilation fails, if running
    /// the top-level definitions fails, or if no `main` function is defined.
    pub fn compile(code: &str, variables: &IndexMap<String, f64>) -> Result<Self, ScriptError> {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);

        let mut scope = Scope::new();
        let mut globals = Module::new();
        for (name, value) in [
            ("OK", OK),
            ("LOW_WARNING", LOW_WARNING),
            ("LOW_CRITICAL", LOW_CRITICAL),
            ("HIGH_WARNING", HIGH_WARNING),
            ("HIGH_CRITICAL", HIGH_CRITICAL),
            ("UNKNOWN", UNKNOWN),
        ] {
            scope.push_constant(name, value);
            globals.set_var(name, value);
        }
        for (name, value) in variables {
            scope.push_constant(name.clone(), *value);
            globals.set_var(name.clone(), *value);
        }
        // Constants live both in the compile scope (the optimizer inlines
        // them into function bodies) and in a global module (runtime
        // fallback for anything the optimizer leaves symbolic).
        engine.register_global_module(globals.into());

        let ast = engine
            .compile_with_scope(&scope, code)
            .map_err(|e| ScriptError::BadCode(e.to_string()))?;

        if !ast.iter_functions().any(|f| f.name == "main") {
            return Err(ScriptError::BadCode("function main not found".into()));
        }

        // Run top-level statements once so broken initialization surfaces
        // at compile time rather than on the first metric.
        let mut probe = scope.clone();
        engine
            .run_ast_with_scope(&mut probe, &ast)
            .map_err(|e| ScriptError::BadCode(e.to_string()))?;

        Ok(Self { engine, ast, scope })
    }

    /// Call `main(args...)` and decode the outcome.
    pub fn evaluate(&self, args: &[f64]) -> Result<OutcomeToken, ScriptError> {
        if args.iter().any(|a| a.is_nan()) {
            return Err(ScriptError::BadArg);
        }

        let call_args: Vec<Dynamic> = args.iter().map(|a| Dynamic::from_float(*a)).collect();
        let mut scope = self.scope.clone();
        let result: Dynamic = self
            .engine
            .call_fn(&mut scope, &self.ast, "main", call_args)
            .map_err(|e| ScriptError::EvalFail(e.to_string()))?;

        if result.is::<String>() {
            result
                .into_string()
                .map(OutcomeToken::Key)
                .map_err(|t| ScriptError::BadReturn(t.to_string()))
        } else if result.is::<i64>() {
            result
                .as_int()
                .map(OutcomeToken::Code)
                .map_err(|t| ScriptError::BadReturn(t.to_string()))
        } else {
            Err(ScriptError::BadReturn(result.type_name().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(entries: &[(&str, f64)]) -> IndexMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn compile_requires_main() {
        let err = RuleScript::compile("fn helper(x) { x }", &IndexMap::new()).unwrap_err();
        assert!(matches!(err, ScriptError::BadCode(_)));

        let err = RuleScript::compile("fn main(", &IndexMap::new()).unwrap_err();
        assert!(matches!(err, ScriptError::BadCode(_)));
    }

    #[test]
    fn string_outcome_keys_pass_through() {
        let script = RuleScript::compile(
            r#"fn main(v) { if v > 10.0 { return "high_critical"; } "ok" }"#,
            &IndexMap::new(),
        )
        .unwrap();
        assert_eq!(
            script.evaluate(&[20.0]).unwrap().into_key().unwrap(),
            "high_critical"
        );
        assert_eq!(script.evaluate(&[5.0]).unwrap().into_key().unwrap(), "ok");
    }

    #[test]
    fn integer_constants_map_to_keys() {
        let script = RuleScript::compile(
            "fn main(v) { if v <= low_critical { return LOW_CRITICAL; } if v <= low_warning { return LOW_WARNING; } OK }",
            &vars(&[("low_critical", 10.0), ("low_warning", 60.0)]),
        )
        .unwrap();
        assert_eq!(
            script.evaluate(&[5.0]).unwrap().into_key().unwrap(),
            "low_critical"
        );
        assert_eq!(
            script.evaluate(&[30.0]).unwrap().into_key().unwrap(),
            "low_warning"
        );
        assert_eq!(script.evaluate(&[90.0]).unwrap().into_key().unwrap(), "ok");
    }

    #[test]
    fn nan_arguments_are_rejected() {
        let script = RuleScript::compile("fn main(v) { OK }", &IndexMap::new()).unwrap();
        assert!(matches!(
            script.evaluate(&[f64::NAN]).unwrap_err(),
            ScriptError::BadArg
        ));
    }

    #[test]
    fn runtime_errors_are_eval_fail() {
        let script =
            RuleScript::compile("fn main(v) { v.missing_method() }", &IndexMap::new()).unwrap();
        assert!(matches!(
            script.evaluate(&[1.0]).unwrap_err(),
            ScriptError::EvalFail(_)
        ));
    }

    #[test]
    fn non_key_returns_are_bad_return() {
        let script = RuleScript::compile("fn main(v) { 1.5 }", &IndexMap::new()).unwrap();
        assert!(matches!(
            script.evaluate(&[1.0]).unwrap_err(),
            ScriptError::BadReturn(_)
        ));
    }

    #[test]
    fn multiple_arguments_arrive_in_order() {
        let script = RuleScript::compile(
            r#"fn main(a, b) { if a < b { return "ok"; } "high_warning" }"#,
            &IndexMap::new(),
        )
        .unwrap();
        assert_eq!(script.evaluate(&[1.0, 2.0]).unwrap().into_key().unwrap(), "ok");
        assert_eq!(
            script.evaluate(&[2.0, 1.0]).unwrap().into_key().unwrap(),
            "high_warning"
        );
    }

    #[test]
    fn unknown_code_has_no_key() {
        assert_eq!(OutcomeToken::Code(42).into_key(), None);
        assert_eq!(OutcomeToken::Code(UNKNOWN).into_key().unwrap(), "unknown");
    }
}
