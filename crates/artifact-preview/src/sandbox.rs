//! Turns generated text into a component, bound only to the capability registry.
//!
//! The generated text is wrapped as the body of a unit with the single
//! parameter `scope`:
//!
//! ```text
//! const exports = {};
//! <generated>
//! return exports.default;
//! ```
//!
//! The body is parsed again, run once against a fresh root environment that
//! binds nothing but `scope`, and the returned value is checked to be callable.

use crate::config::SandboxConfig;
use crate::error::{CompileError, PreviewError, RuntimeError, ValidationError};
use crate::parser::{self, Expression, MemberProperty, Statement, parse_unit_with_limit};
use crate::registry::CapabilityRegistry;
use crate::transform::GeneratedText;
use std::rc::Rc;

mod interpreter;
pub use interpreter::{Environment, Exception, Interpreter, get_member, set_member};

mod intrinsics;
pub use intrinsics::own_entries;

mod value;
pub use value::{Closure, Element, NativeFunction, Value, number_to_string};

/// Name of the unit's only parameter.
pub const SCOPE_PARAMETER: &str = "scope";

const UNIT_SOURCE_NAME: &str = "generated.js";

/// Generated text wrapped and parsed into an executable unit, not yet run.
#[derive(Debug)]
pub struct ExecutableUnit {
    generated: GeneratedText,
    body: String,
    statements: Vec<Statement>,
}

impl ExecutableUnit {
    pub fn generated(&self) -> &GeneratedText {
        &self.generated
    }

    /// The full unit body, including the `exports` wrapper.
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Generated text together with the component it produced.
#[derive(Debug)]
pub struct CompiledArtifact {
    generated: GeneratedText,
    component: Value,
    registry: Rc<CapabilityRegistry>,
    max_call_depth: usize,
}

impl CompiledArtifact {
    pub fn generated(&self) -> &GeneratedText {
        &self.generated
    }

    /// The invocable component factory.
    pub fn component(&self) -> &Value {
        &self.component
    }

    pub fn registry(&self) -> &Rc<CapabilityRegistry> {
        &self.registry
    }

    /// Interpreter with the same limits the component was constructed under.
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.max_call_depth)
    }
}

#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    max_call_depth: usize,
    max_nesting: usize,
}

impl SandboxExecutor {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            max_call_depth: config.max_call_depth,
            max_nesting: config.max_nesting,
        }
    }

    /// Wrap and parse the generated text. Nothing is evaluated.
    pub fn construct(&self, generated: GeneratedText) -> Result<ExecutableUnit, CompileError> {
        let body = format!(
            "const exports = {{}};\n{}\nreturn exports.default;\n",
            generated.as_str()
        );
        let statements =
            parse_unit_with_limit(&body, self.max_nesting).map_err(|diagnostics| {
                CompileError::Construct {
                    report: parser::report(&diagnostics, UNIT_SOURCE_NAME, &body),
                    diagnostics,
                }
            })?;

        let count = statements.iter().filter(|statement| is_default_export(statement)).count();
        if count > 1 {
            return Err(CompileError::DuplicateExport { count });
        }

        Ok(ExecutableUnit {
            generated,
            body,
            statements,
        })
    }

    /// Invoke the unit with `registry` as `scope` and validate the result.
    pub fn execute(
        &self,
        unit: ExecutableUnit,
        registry: Rc<CapabilityRegistry>,
    ) -> Result<CompiledArtifact, PreviewError> {
        let environment = Environment::root();
        environment
            .declare(
                SCOPE_PARAMETER,
                Value::Scope(Rc::clone(&registry)),
                parser::DeclarationKind::Const,
            )
            .map_err(RuntimeError::from)?;

        let mut interpreter = Interpreter::new(self.max_call_depth);
        let component = interpreter
            .run_body(&unit.statements, &environment)
            .map_err(|exception| {
                let error = exception.to_runtime_error();
                log::warn!("Component construction failed: {error}");
                error
            })?;

        if !component.is_callable() {
            return Err(ValidationError::not_a_component(&component.describe()).into());
        }

        Ok(CompiledArtifact {
            generated: unit.generated,
            component,
            registry,
            max_call_depth: self.max_call_depth,
        })
    }

    pub fn run(
        &self,
        generated: GeneratedText,
        registry: Rc<CapabilityRegistry>,
    ) -> Result<CompiledArtifact, PreviewError> {
        let unit = self.construct(generated)?;
        self.execute(unit, registry)
    }
}

/// `exports.default = ...;` at the top level of the unit.
fn is_default_export(statement: &Statement) -> bool {
    let Statement::Expression(Expression::Assign { target, .. }) = statement else {
        return false;
    };
    matches!(
        target.as_ref(),
        Expression::Member {
            object,
            property: MemberProperty::Named(property),
            ..
        } if property == "default"
            && matches!(object.as_ref(), Expression::Identifier(name) if name == "exports")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BindingSet, RegistryBuilder};

    fn executor() -> SandboxExecutor {
        SandboxExecutor::new(&SandboxConfig {
            max_call_depth: 16,
            ..SandboxConfig::default()
        })
    }

    fn registry() -> Rc<CapabilityRegistry> {
        Rc::new(
            RegistryBuilder::new()
                .merge(BindingSet::new("test").with("answer", Value::Number(42.0)))
                .build()
                .unwrap(),
        )
    }

    fn run(text: &str) -> Result<CompiledArtifact, PreviewError> {
        executor().run(GeneratedText::new(text), registry())
    }

    #[test]
    fn test_callable_default_export() {
        let artifact = run("const answer = scope.answer;\nexports.default = () => answer;").unwrap();
        let mut interpreter = artifact.interpreter();
        let result = interpreter.call(artifact.component(), Vec::new()).unwrap();
        assert_eq!(result.to_number(), 42.0);
    }

    #[test]
    fn test_missing_default_export_is_validation_error() {
        assert!(matches!(
            run("const a = 1;"),
            Err(PreviewError::Validation(_))
        ));
    }

    #[test]
    fn test_non_callable_export_is_validation_error() {
        let Err(PreviewError::Validation(error)) = run("exports.default = { render: 1 };") else {
            panic!("Expected validation error");
        };
        assert!(error.message.contains("did not produce a valid component"));
    }

    #[test]
    fn test_duplicate_default_export() {
        assert!(matches!(
            run("exports.default = () => 1;\nexports.default = () => 2;"),
            Err(PreviewError::Compile(CompileError::DuplicateExport { count: 2 }))
        ));
    }

    #[test]
    fn test_construct_rejects_markup() {
        assert!(matches!(
            executor().construct(GeneratedText::new("exports.default = () => <div />;")),
            Err(CompileError::Construct { .. })
        ));
    }

    #[test]
    fn test_absent_capability_is_reference_error() {
        let Err(PreviewError::Runtime(error)) = run("const Missing = scope.Missing;") else {
            panic!("Expected runtime error");
        };
        assert_eq!(error.to_string(), "ReferenceError: Missing is not defined");
    }

    #[test]
    fn test_only_scope_is_reachable() {
        let Err(PreviewError::Runtime(error)) = run("exports.default = console.log;") else {
            panic!("Expected runtime error");
        };
        assert_eq!(error.message, "console is not defined");
    }

    #[test]
    fn test_scope_is_read_only() {
        assert!(matches!(
            run("scope.answer = 1;"),
            Err(PreviewError::Runtime(_))
        ));
    }
}
