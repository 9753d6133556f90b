//! Rewrites component source into text the sandbox can run.
//!
//! - `import X, { A as B } from 'm'` becomes `const X = scope.X, B = scope.A;`
//! - markup becomes nested calls of the configured pragma
//! - `export default` becomes an assignment to `exports.default`
//! - named exports lose their `export` keyword

use crate::config::TransformConfig;
use crate::error::CompileError;
use crate::parser::{
    DeclarationKind, Declarator, Diagnostic, ExportDefault, ExportNamed, Expression,
    ImportDeclaration, ImportSpecifier, ListItem, Literal, Markup, MarkupAttribute, MarkupChild,
    MarkupName, Module, ModuleItem, Pattern, Property, PropertyKey, Statement, parse_module_with_limit,
    report,
};
use crate::sandbox::SCOPE_PARAMETER;
use std::collections::HashSet;
use std::fmt;

mod codegen;
use codegen::Printer;
pub use codegen::quote;

/// Executable text produced from component source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText(String);

impl GeneratedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GeneratedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxTransformer {
    pragma: Expression,
    fragment: Expression,
    pragma_root: String,
    fragment_root: String,
    max_nesting: usize,
}

impl SyntaxTransformer {
    pub fn new(config: &TransformConfig) -> Self {
        let path = |path: &str| path.split('.').map(ToString::to_string).collect::<Vec<_>>();
        let pragma = path(&config.pragma);
        let fragment = path(&config.pragma_frag);
        Self {
            pragma_root: pragma.first().cloned().unwrap_or_default(),
            fragment_root: fragment.first().cloned().unwrap_or_default(),
            pragma: member_path(&pragma),
            fragment: member_path(&fragment),
            max_nesting: config.max_nesting,
        }
    }

    /// Parse and rewrite `source`. `source_name` is used in reports.
    pub fn transform(&self, source: &str, source_name: &str) -> Result<GeneratedText, CompileError> {
        let module = parse_module_with_limit(source, self.max_nesting).map_err(|diagnostics| CompileError::Parse {
            report: report(&diagnostics, source_name, source),
            diagnostics,
        })?;

        let statements = rewrite(&module).map_err(|diagnostics| CompileError::Transform {
            report: report(&diagnostics, source_name, source),
            diagnostics,
        })?;

        let printed = Printer::new(&self.pragma, &self.fragment).program(&statements);

        let declared = top_level_names(&statements);
        let mut roots = Vec::new();
        if printed.uses_pragma {
            roots.push(self.pragma_root.as_str());
        }
        if printed.uses_fragment {
            roots.push(self.fragment_root.as_str());
        }
        roots.dedup();

        let mut text = String::new();
        for root in roots.into_iter().filter(|root| !declared.contains(*root)) {
            log::debug!("Binding markup pragma root '{root}' from scope");
            text.push_str(&format!("const {root} = {SCOPE_PARAMETER}.{root};\n"));
        }
        text.push_str(&printed.text);
        Ok(GeneratedText(text))
    }
}

fn rewrite(module: &Module) -> Result<Vec<Statement>, Vec<Diagnostic>> {
    let mut statements = Vec::new();
    let mut diagnostics = Vec::new();
    let mut has_default_export = false;

    for item in &module.items {
        match &item.node {
            ModuleItem::Import(import) => match rewrite_import(import) {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => log::debug!("Dropped side-effect import of '{}'", import.source),
                Err(message) => diagnostics.push(Diagnostic::new(item.span, message)),
            },
            ModuleItem::ExportDefault(export) => {
                if has_default_export {
                    diagnostics.push(Diagnostic::new(
                        item.span,
                        "Only one default export is allowed per module",
                    ));
                    continue;
                }
                has_default_export = true;
                statements.extend(rewrite_default_export(export));
            }
            ModuleItem::ExportNamed(ExportNamed::Declaration(statement)) => {
                log::debug!("Dropped 'export' from named declaration");
                statements.push(statement.clone());
            }
            ModuleItem::ExportNamed(ExportNamed::List(names)) => {
                log::debug!("Dropped named exports: {}", names.join(", "));
            }
            ModuleItem::Statement(Statement::Return(_)) => {
                diagnostics.push(Diagnostic::new(item.span, "'return' outside of function"));
            }
            ModuleItem::Statement(statement) => statements.push(statement.clone()),
        }
    }

    if diagnostics.is_empty() {
        Ok(statements)
    } else {
        Err(diagnostics)
    }
}

fn rewrite_import(import: &ImportDeclaration) -> Result<Option<Statement>, String> {
    if import.specifiers.is_empty() {
        return Ok(None);
    }
    let mut declarators = Vec::with_capacity(import.specifiers.len());
    for specifier in &import.specifiers {
        let (imported, local) = match specifier {
            ImportSpecifier::Default { local } => (local, local),
            ImportSpecifier::Named { imported, local } => (imported, local),
            ImportSpecifier::Namespace { local } => {
                return Err(format!(
                    "Namespace import '* as {local}' is not supported, import names individually"
                ));
            }
        };
        declarators.push(Declarator {
            target: Pattern::Identifier(local.clone()),
            init: Some(Expression::member(
                Expression::identifier(SCOPE_PARAMETER),
                imported.clone(),
            )),
        });
    }
    Ok(Some(Statement::Declaration {
        kind: DeclarationKind::Const,
        declarators,
    }))
}

fn default_slot() -> Expression {
    Expression::member(Expression::identifier("exports"), "default".to_string())
}

fn rewrite_default_export(export: &ExportDefault) -> Vec<Statement> {
    match export {
        ExportDefault::Function(function) => match &function.name {
            Some(name) => vec![
                Statement::Function(function.clone()),
                Statement::Expression(Expression::assign(
                    default_slot(),
                    Expression::identifier(name.as_str()),
                )),
            ],
            None => vec![Statement::Expression(Expression::assign(
                default_slot(),
                Expression::Function {
                    function: function.clone(),
                    arrow: false,
                },
            ))],
        },
        ExportDefault::Expression(expression) => vec![Statement::Expression(
            Expression::assign(default_slot(), expression.clone()),
        )],
    }
}

fn top_level_names(statements: &[Statement]) -> HashSet<String> {
    fn collect(pattern: &Pattern, names: &mut HashSet<String>) {
        match pattern {
            Pattern::Identifier(name) => {
                names.insert(name.clone());
            }
            Pattern::Array { elements, rest } => {
                for element in elements {
                    collect(&element.target, names);
                }
                if let Some(rest) = rest {
                    collect(rest, names);
                }
            }
            Pattern::Object { properties, rest } => {
                for property in properties {
                    collect(&property.target, names);
                }
                if let Some(rest) = rest {
                    names.insert(rest.clone());
                }
            }
        }
    }

    let mut names = HashSet::new();
    for statement in statements {
        match statement {
            Statement::Declaration { declarators, .. } => {
                for declarator in declarators {
                    collect(&declarator.target, &mut names);
                }
            }
            Statement::Function(function) => {
                if let Some(name) = &function.name {
                    names.insert(name.clone());
                }
            }
            _ => {}
        }
    }
    names
}

/// `a.b.c` as nested member expressions.
pub fn member_path(path: &[String]) -> Expression {
    let mut segments = path.iter();
    let root = segments.next().cloned().unwrap_or_default();
    segments.fold(Expression::Identifier(root), |object, name| {
        Expression::member(object, name.clone())
    })
}

/// One markup node as a pragma call. Nested markup children stay markup
/// and are lowered when they are printed.
pub fn lower_markup(markup: &Markup, pragma: &Expression, fragment: &Expression) -> Expression {
    let element_type = match &markup.name {
        MarkupName::Intrinsic(tag) => Expression::string(tag.as_str()),
        MarkupName::Component(path) => member_path(path),
        MarkupName::Fragment => fragment.clone(),
    };

    let props = if markup.attributes.is_empty() {
        Expression::Literal(Literal::Null)
    } else {
        Expression::Object(
            markup
                .attributes
                .iter()
                .map(|attribute| match attribute {
                    MarkupAttribute::Named { name, value } => Property::KeyValue {
                        key: PropertyKey::Named(name.clone()),
                        value: value
                            .clone()
                            .unwrap_or(Expression::Literal(Literal::Boolean(true))),
                    },
                    MarkupAttribute::Spread(expression) => Property::Spread(expression.clone()),
                })
                .collect(),
        )
    };

    let mut arguments = vec![ListItem::Single(element_type), ListItem::Single(props)];
    arguments.extend(markup.children.iter().map(|child| {
        ListItem::Single(match child {
            MarkupChild::Text(text) => Expression::string(text.as_str()),
            MarkupChild::Expression(expression) => expression.clone(),
            MarkupChild::Markup(markup) => Expression::Markup(Box::new(markup.clone())),
        })
    }));

    Expression::call(pragma.clone(), arguments)
}
