use chumsky::{
    pratt::{infix, left, postfix, prefix},
    prelude::*,
    recursive::Indirect,
};
use std::rc::Rc;

mod diagnostics;
pub use diagnostics::{Diagnostic, report};

mod jsx;

mod lexer;
pub use lexer::{is_identifier_name, is_reserved};
use lexer::{
    identifier, keyword, number, operator, property_name, string_literal, symbol, template_text,
    whitespace,
};

mod nesting;
pub use nesting::{DEFAULT_MAX_NESTING, Nesting};
use nesting::{counted, nested};

mod source;
pub use source::SourceText;

pub type Span = SimpleSpan;
pub type ParseError<'src> = Rich<'src, char, Span>;
pub(crate) type Extra<'src> = extra::Full<ParseError<'src>, Nesting, ()>;

type ExpressionParser<'src> = Recursive<Indirect<'src, 'src, &'src str, Expression, Extra<'src>>>;
type StatementParser<'src> = Recursive<Indirect<'src, 'src, &'src str, Statement, Extra<'src>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// Which constructs the grammar accepts.
///
/// Component source is a `Module`: imports, exports and markup are allowed.
/// Generated text is parsed again as the body of an executable `Unit`, where
/// all three must already have been rewritten away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Module,
    Unit,
}

/// Parse component source into a module.
pub fn parse_module(source: &str) -> Result<Module, Vec<Diagnostic>> {
    parse_module_with_limit(source, DEFAULT_MAX_NESTING)
}

/// Parse component source, rejecting anything nested deeper than `max_nesting`.
pub fn parse_module_with_limit(source: &str, max_nesting: usize) -> Result<Module, Vec<Diagnostic>> {
    let mut nesting = Nesting::new(max_nesting);
    let (module, errors) = module_parser()
        .parse_with_state(source, &mut nesting)
        .into_output_errors();
    match module {
        Some(module) if errors.is_empty() => Ok(module),
        _ => Err(errors.iter().map(Diagnostic::from_parse_error).collect()),
    }
}

/// Parse a sequence of plain statements (the body of an executable unit).
pub fn parse_unit(text: &str) -> Result<Vec<Statement>, Vec<Diagnostic>> {
    parse_unit_with_limit(text, DEFAULT_MAX_NESTING)
}

pub fn parse_unit_with_limit(text: &str, max_nesting: usize) -> Result<Vec<Statement>, Vec<Diagnostic>> {
    let mut nesting = Nesting::new(max_nesting);
    let (statements, errors) = unit_parser()
        .parse_with_state(text, &mut nesting)
        .into_output_errors();
    match statements {
        Some(statements) if errors.is_empty() => Ok(statements),
        _ => Err(errors.iter().map(Diagnostic::from_parse_error).collect()),
    }
}

pub fn module_parser<'src>() -> impl Parser<'src, &'src str, Module, Extra<'src>> {
    let Grammar {
        expression,
        statement,
        function,
    } = grammar(Dialect::Module);

    let semicolon = symbol(";").or_not().ignored();

    let named_specifier = property_name()
        .then(keyword("as").ignore_then(identifier()).or_not())
        .try_map(|(imported, local), span| match local {
            Some(local) => Ok(ImportSpecifier::Named { imported, local }),
            None if is_reserved(&imported) => Err(ParseError::custom(
                span,
                format!("Unexpected keyword '{imported}'"),
            )),
            None => Ok(ImportSpecifier::Named {
                local: imported.clone(),
                imported,
            }),
        });

    let named_specifiers = named_specifier
        .separated_by(symbol(","))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol("{"), symbol("}"));

    let namespace_specifier = symbol("*")
        .ignore_then(keyword("as"))
        .ignore_then(identifier())
        .map(|local| vec![ImportSpecifier::Namespace { local }]);

    let specifiers = choice((
        identifier()
            .map(|local| ImportSpecifier::Default { local })
            .then(
                symbol(",")
                    .ignore_then(choice((named_specifiers.clone(), namespace_specifier.clone())))
                    .or_not(),
            )
            .map(|(default, rest)| {
                let mut specifiers = vec![default];
                specifiers.extend(rest.unwrap_or_default());
                specifiers
            }),
        named_specifiers,
        namespace_specifier,
    ));

    let import = keyword("import")
        .ignore_then(choice((
            specifiers
                .then_ignore(keyword("from"))
                .then(string_literal()),
            string_literal().map(|source| (Vec::new(), source)),
        )))
        .then_ignore(semicolon.clone())
        .map(|(specifiers, source)| {
            ModuleItem::Import(ImportDeclaration { specifiers, source })
        });

    let export_default = keyword("export")
        .ignore_then(keyword("default"))
        .ignore_then(choice((
            function
                .then_ignore(semicolon.clone())
                .map(ExportDefault::Function),
            expression
                .then_ignore(semicolon.clone())
                .map(ExportDefault::Expression),
        )))
        .map(ModuleItem::ExportDefault);

    let export_list = property_name()
        .then(keyword("as").ignore_then(property_name()).or_not())
        .map(|(local, exported)| exported.unwrap_or(local))
        .separated_by(symbol(","))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol("{"), symbol("}"))
        .then_ignore(keyword("from").then(string_literal()).or_not())
        .then_ignore(semicolon.clone())
        .map(ExportNamed::List);

    let export_declaration = statement
        .clone()
        .try_map(|statement, span| match statement {
            Statement::Declaration { .. } | Statement::Function(_) => {
                Ok(ExportNamed::Declaration(statement))
            }
            _ => Err(ParseError::custom(
                span,
                "Only declarations can be exported",
            )),
        });

    let export_named = keyword("export")
        .ignore_then(choice((export_list, export_declaration)))
        .map(ModuleItem::ExportNamed);

    let item = choice((
        import,
        export_default,
        export_named,
        statement.map(ModuleItem::Statement),
    ))
    .map_with(|node, extra| Spanned {
        node,
        span: extra.span(),
    });

    whitespace()
        .ignore_then(item.repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|items| Module { items })
}

pub fn unit_parser<'src>() -> impl Parser<'src, &'src str, Vec<Statement>, Extra<'src>> {
    let Grammar { statement, .. } = grammar(Dialect::Unit);

    whitespace()
        .ignore_then(statement.repeated().collect::<Vec<_>>())
        .then_ignore(end())
}

struct Grammar<'src> {
    expression: ExpressionParser<'src>,
    statement: StatementParser<'src>,
    /// `function name?(...) {...}`, used by `export default`.
    function: Boxed<'src, 'src, &'src str, Rc<Function>, Extra<'src>>,
}

#[derive(Clone)]
enum Prefix {
    Unary(UnaryOperator),
    Update(UpdateOperator),
}

enum Postfix {
    Member { name: String, optional: bool },
    Computed(Expression),
    Call(Vec<ListItem>),
}

fn grammar<'src>(dialect: Dialect) -> Grammar<'src> {
    let mut expression: ExpressionParser<'src> = Recursive::declare();
    let mut statement: StatementParser<'src> = Recursive::declare();

    let semicolon = symbol(";").or_not().ignored();

    let block = statement
        .clone()
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(symbol("{"), symbol("}"));

    let default_value = operator("=", "=>")
        .ignore_then(expression.clone())
        .or_not();

    let pattern = recursive(|pattern| {
        let element = pattern
            .clone()
            .then(default_value.clone())
            .map(|(target, default)| PatternElement { target, default });

        let array = element
            .separated_by(symbol(","))
            .allow_trailing()
            .collect::<Vec<_>>()
            .then(symbol("...").ignore_then(pattern.clone()).or_not())
            .delimited_by(symbol("["), symbol("]"))
            .map(|(elements, rest)| Pattern::Array {
                elements,
                rest: rest.map(Box::new),
            });

        let property = choice((
            choice((property_name(), string_literal()))
                .then_ignore(symbol(":"))
                .then(pattern.clone()),
            identifier().map(|name| (name.clone(), Pattern::Identifier(name))),
        ))
        .then(default_value.clone())
        .map(|((key, target), default)| PatternProperty {
            key,
            target,
            default,
        });

        let object = property
            .separated_by(symbol(","))
            .allow_trailing()
            .collect::<Vec<_>>()
            .then(symbol("...").ignore_then(identifier()).or_not())
            .delimited_by(symbol("{"), symbol("}"))
            .map(|(properties, rest)| Pattern::Object { properties, rest });

        nested(choice((identifier().map(Pattern::Identifier), array, object)))
    });

    let parameter = pattern
        .clone()
        .then(default_value)
        .map(|(target, default)| PatternElement { target, default });

    let parameters = parameter
        .clone()
        .separated_by(symbol(","))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol("("), symbol(")"));

    let function = keyword("function")
        .ignore_then(identifier().or_not())
        .then(parameters.clone())
        .then(block.clone())
        .map(|((name, parameters), body)| {
            Rc::new(Function {
                name,
                parameters,
                body: FunctionBody::Block(body),
            })
        })
        .boxed();

    let arrow = choice((
        identifier().map(|name| {
            vec![PatternElement {
                target: Pattern::Identifier(name),
                default: None,
            }]
        }),
        parameters,
    ))
    .then_ignore(symbol("=>"))
    .then(choice((
        block.clone().map(FunctionBody::Block),
        expression
            .clone()
            .map(|body| FunctionBody::Expression(Box::new(body))),
    )))
    .map(|(parameters, body)| Expression::Function {
        function: Rc::new(Function {
            name: None,
            parameters,
            body,
        }),
        arrow: true,
    });

    let list_item = choice((
        symbol("...")
            .ignore_then(expression.clone())
            .map(ListItem::Spread),
        expression.clone().map(ListItem::Single),
    ));

    let arguments = list_item
        .clone()
        .separated_by(symbol(","))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol("("), symbol(")"));

    let literal = choice((
        number().map(Literal::Number),
        string_literal().map(Literal::String),
        keyword("true").to(Literal::Boolean(true)),
        keyword("false").to(Literal::Boolean(false)),
        keyword("null").to(Literal::Null),
        keyword("undefined").to(Literal::Undefined),
    ))
    .map(Expression::Literal);

    let template = just('`')
        .ignore_then(
            choice((
                template_text().map(TemplatePart::Text),
                just("${")
                    .ignore_then(whitespace())
                    .ignore_then(expression.clone())
                    .then_ignore(just('}'))
                    .map(TemplatePart::Expression),
            ))
            .repeated()
            .collect::<Vec<_>>(),
        )
        .then_ignore(just('`'))
        .then_ignore(whitespace())
        .map(Expression::Template);

    let array = list_item
        .separated_by(symbol(","))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(symbol("["), symbol("]"))
        .map(Expression::Array);

    let property_key = choice((
        property_name().map(PropertyKey::Named),
        string_literal().map(PropertyKey::Named),
        expression
            .clone()
            .delimited_by(symbol("["), symbol("]"))
            .map(PropertyKey::Computed),
    ));

    let object = choice((
        symbol("...")
            .ignore_then(expression.clone())
            .map(Property::Spread),
        property_key
            .then_ignore(symbol(":"))
            .then(expression.clone())
            .map(|(key, value)| Property::KeyValue { key, value }),
        identifier().map(Property::Shorthand),
    ))
    .separated_by(symbol(","))
    .allow_trailing()
    .collect::<Vec<_>>()
    .delimited_by(symbol("{"), symbol("}"))
    .map(Expression::Object);

    let new = keyword("new")
        .ignore_then(identifier().map(Expression::Identifier).foldl(
            symbol(".").ignore_then(property_name()).repeated(),
            Expression::member,
        ))
        .then(arguments.clone().or_not())
        .map(|(callee, arguments)| Expression::New {
            callee: Box::new(callee),
            arguments: arguments.unwrap_or_default(),
        });

    let function_expression = function.clone().map(|function| Expression::Function {
        function,
        arrow: false,
    });

    let parenthesized = expression
        .clone()
        .delimited_by(symbol("("), symbol(")"));

    let primary = choice((
        literal,
        template,
        function_expression,
        new,
        identifier().map(Expression::Identifier),
        array,
        object,
        parenthesized,
    ))
    .boxed();

    let primary = match dialect {
        Dialect::Module => jsx::markup(expression.clone())
            .then_ignore(whitespace())
            .map(|markup| Expression::Markup(Box::new(markup)))
            .or(primary)
            .boxed(),
        Dialect::Unit => primary,
    };

    let suffix = choice((
        symbol("?.")
            .ignore_then(property_name())
            .map(|name| Postfix::Member {
                name,
                optional: true,
            }),
        operator(".", ".")
            .ignore_then(property_name())
            .map(|name| Postfix::Member {
                name,
                optional: false,
            }),
        expression
            .clone()
            .delimited_by(symbol("["), symbol("]"))
            .map(Postfix::Computed),
        arguments.map(Postfix::Call),
    ));

    let call_member = primary.foldl(counted(suffix).repeated(), |object, suffix| match suffix {
        Postfix::Member { name, optional } => Expression::Member {
            object: Box::new(object),
            property: MemberProperty::Named(name),
            optional,
        },
        Postfix::Computed(property) => Expression::Member {
            object: Box::new(object),
            property: MemberProperty::Computed(Box::new(property)),
            optional: false,
        },
        Postfix::Call(arguments) => Expression::Call {
            callee: Box::new(object),
            arguments,
        },
    });

    let binary = call_member.pratt((
        postfix(
            9,
            counted(choice((
                symbol("++").to(UpdateOperator::Increment),
                symbol("--").to(UpdateOperator::Decrement),
            ))),
            |operand, operator, _| Expression::Update {
                operator,
                prefix: false,
                target: Box::new(operand),
            },
        ),
        prefix(
            8,
            counted(choice((
                operator("!", "=").to(Prefix::Unary(UnaryOperator::Not)),
                operator("-", "-=").to(Prefix::Unary(UnaryOperator::Negate)),
                operator("+", "+=").to(Prefix::Unary(UnaryOperator::Plus)),
                keyword("typeof").to(Prefix::Unary(UnaryOperator::TypeOf)),
                symbol("++").to(Prefix::Update(UpdateOperator::Increment)),
                symbol("--").to(Prefix::Update(UpdateOperator::Decrement)),
            ))),
            |operator, operand, _| match operator {
                Prefix::Unary(operator) => Expression::Unary {
                    operator,
                    operand: Box::new(operand),
                },
                Prefix::Update(operator) => Expression::Update {
                    operator,
                    prefix: true,
                    target: Box::new(operand),
                },
            },
        ),
        infix(
            left(7),
            counted(choice((
                operator("*", "*=").to(BinaryOperator::Multiply),
                operator("/", "/*=").to(BinaryOperator::Divide),
                operator("%", "=").to(BinaryOperator::Remainder),
            ))),
            |left, operator, right, _| Expression::binary(operator, left, right),
        ),
        infix(
            left(6),
            counted(choice((
                operator("+", "+=").to(BinaryOperator::Add),
                operator("-", "-=").to(BinaryOperator::Subtract),
            ))),
            |left, operator, right, _| Expression::binary(operator, left, right),
        ),
        infix(
            left(5),
            counted(choice((
                symbol("<=").to(BinaryOperator::LessOrEqual),
                symbol(">=").to(BinaryOperator::GreaterOrEqual),
                operator("<", "=").to(BinaryOperator::Less),
                operator(">", "=").to(BinaryOperator::Greater),
            ))),
            |left, operator, right, _| Expression::binary(operator, left, right),
        ),
        infix(
            left(4),
            counted(choice((
                symbol("===").to(BinaryOperator::StrictEqual),
                symbol("!==").to(BinaryOperator::StrictNotEqual),
                operator("==", "=").to(BinaryOperator::Equal),
                operator("!=", "=").to(BinaryOperator::NotEqual),
            ))),
            |left, operator, right, _| Expression::binary(operator, left, right),
        ),
        infix(
            left(3),
            counted(symbol("&&").to(BinaryOperator::And)),
            |left, operator, right, _| Expression::binary(operator, left, right),
        ),
        infix(
            left(2),
            counted(choice((
                symbol("||").to(BinaryOperator::Or),
                symbol("??").to(BinaryOperator::Coalesce),
            ))),
            |left, operator, right, _| Expression::binary(operator, left, right),
        ),
    ));

    let conditional = binary
        .then(
            operator("?", "?.")
                .ignore_then(expression.clone())
                .then_ignore(symbol(":"))
                .then(expression.clone())
                .or_not(),
        )
        .map(|(test, branches)| match branches {
            Some((consequent, alternate)) => Expression::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            None => test,
        });

    let assignment = conditional
        .then(
            choice((
                operator("=", "=>").to(AssignOperator::Assign),
                symbol("+=").to(AssignOperator::AddAssign),
                symbol("-=").to(AssignOperator::SubtractAssign),
                symbol("*=").to(AssignOperator::MultiplyAssign),
                symbol("/=").to(AssignOperator::DivideAssign),
                symbol("%=").to(AssignOperator::RemainderAssign),
            ))
            .then(expression.clone())
            .or_not(),
        )
        .try_map(|(target, assignment), span| match assignment {
            None => Ok(target),
            Some((operator, value)) if target.is_assignable() => Ok(Expression::Assign {
                operator,
                target: Box::new(target),
                value: Box::new(value),
            }),
            Some(_) => Err(ParseError::custom(span, "Invalid assignment target")),
        });

    expression.define(nested(choice((arrow, assignment))).boxed());

    let declaration_kind = choice((
        keyword("const").to(DeclarationKind::Const),
        keyword("let").to(DeclarationKind::Let),
        keyword("var").to(DeclarationKind::Var),
    ));

    let declarator = pattern
        .clone()
        .then(operator("=", "=>").ignore_then(expression.clone()).or_not())
        .map(|(target, init)| Declarator { target, init });

    let declaration = declaration_kind
        .clone()
        .then(
            declarator
                .separated_by(symbol(","))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then_ignore(semicolon.clone())
        .map(|(kind, declarators)| Statement::Declaration { kind, declarators });

    let function_declaration = keyword("function")
        .ignore_then(identifier())
        .then(parameter
            .separated_by(symbol(","))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(symbol("("), symbol(")")))
        .then(block.clone())
        .map(|((name, parameters), body)| {
            Statement::Function(Rc::new(Function {
                name: Some(name),
                parameters,
                body: FunctionBody::Block(body),
            }))
        });

    let return_statement = keyword("return")
        .ignore_then(expression.clone().or_not())
        .then_ignore(semicolon.clone())
        .map(Statement::Return);

    let if_statement = keyword("if")
        .ignore_then(
            expression
                .clone()
                .delimited_by(symbol("("), symbol(")")),
        )
        .then(statement.clone())
        .then(keyword("else").ignore_then(statement.clone()).or_not())
        .map(|((condition, consequent), alternate)| Statement::If {
            condition,
            consequent: Box::new(consequent),
            alternate: alternate.map(Box::new),
        });

    let for_of = keyword("for")
        .ignore_then(symbol("("))
        .ignore_then(declaration_kind)
        .then(pattern)
        .then_ignore(keyword("of"))
        .then(expression.clone())
        .then_ignore(symbol(")"))
        .then(statement.clone())
        .map(|(((kind, target), iterable), body)| Statement::ForOf {
            kind,
            target,
            iterable,
            body: Box::new(body),
        });

    let throw = keyword("throw")
        .ignore_then(expression.clone())
        .then_ignore(semicolon.clone())
        .map(Statement::Throw);

    statement.define(
        nested(choice((
            declaration,
            function_declaration,
            return_statement,
            if_statement,
            for_of,
            throw,
            block.map(Statement::Block),
            symbol(";").to(Statement::Empty),
            expression
                .clone()
                .then_ignore(semicolon)
                .map(Statement::Expression),
        )))
        .boxed(),
    );

    Grammar {
        expression,
        statement,
        function,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub items: Vec<Spanned<ModuleItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleItem {
    Import(ImportDeclaration),
    ExportDefault(ExportDefault),
    ExportNamed(ExportNamed),
    Statement(Statement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDeclaration {
    pub specifiers: Vec<ImportSpecifier>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportSpecifier {
    /// `import local from '...'`
    Default { local: String },
    /// `import { imported as local } from '...'`
    Named { imported: String, local: String },
    /// `import * as local from '...'`
    Namespace { local: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDefault {
    Function(Rc<Function>),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportNamed {
    Declaration(Statement),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Declaration {
        kind: DeclarationKind,
        declarators: Vec<Declarator>,
    },
    Function(Rc<Function>),
    Return(Option<Expression>),
    If {
        condition: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    ForOf {
        kind: DeclarationKind,
        target: Pattern,
        iterable: Expression,
        body: Box<Statement>,
    },
    Throw(Expression),
    Block(Vec<Statement>),
    Expression(Expression),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Const,
    Let,
    Var,
}

impl DeclarationKind {
    pub fn is_mutable(self) -> bool {
        !matches!(self, Self::Const)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Let => "let",
            Self::Var => "var",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub parameters: Vec<PatternElement>,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Statement>),
    /// Concise arrow body: `(a) => a + 1`
    Expression(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Identifier(String),
    Array {
        elements: Vec<PatternElement>,
        rest: Option<Box<Pattern>>,
    },
    Object {
        properties: Vec<PatternProperty>,
        rest: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternElement {
    pub target: Pattern,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternProperty {
    pub key: String,
    pub target: Pattern,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    Template(Vec<TemplatePart>),
    Array(Vec<ListItem>),
    Object(Vec<Property>),
    Function {
        function: Rc<Function>,
        arrow: bool,
    },
    Member {
        object: Box<Expression>,
        property: MemberProperty,
        optional: bool,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<ListItem>,
    },
    New {
        callee: Box<Expression>,
        arguments: Vec<ListItem>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Assign {
        operator: AssignOperator,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    /// `++a`, `a--`
    Update {
        operator: UpdateOperator,
        prefix: bool,
        target: Box<Expression>,
    },
    Markup(Box<Markup>),
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    pub fn member(object: Expression, name: String) -> Self {
        Self::Member {
            object: Box::new(object),
            property: MemberProperty::Named(name),
            optional: false,
        }
    }

    pub fn call(callee: Expression, arguments: Vec<ListItem>) -> Self {
        Self::Call {
            callee: Box::new(callee),
            arguments,
        }
    }

    pub fn assign(target: Expression, value: Expression) -> Self {
        Self::Assign {
            operator: AssignOperator::Assign,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Self::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Self::Identifier(_)
                | Self::Member {
                    optional: false,
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expression(Expression),
}

/// Array element or call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Single(Expression),
    Spread(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    KeyValue { key: PropertyKey, value: Expression },
    Shorthand(String),
    Spread(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Named(String),
    Computed(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    Named(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Multiply,
    Divide,
    Remainder,
    Add,
    Subtract,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    RemainderAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

/// Declarative markup: `<Tag attr={value}>children</Tag>` or `<>children</>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Markup {
    pub name: MarkupName,
    pub attributes: Vec<MarkupAttribute>,
    pub children: Vec<MarkupChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupName {
    /// `div`, `my-widget`: passed to the element primitive as a string.
    Intrinsic(String),
    /// `Button`, `Card.Header`: resolved as an identifier or member path.
    Component(Vec<String>),
    Fragment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupAttribute {
    Named {
        name: String,
        /// `None` for a bare attribute (`<input disabled />`).
        value: Option<Expression>,
    },
    Spread(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupChild {
    Text(String),
    Expression(Expression),
    Markup(Markup),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_statement(code: &str) -> Statement {
        let module = parse_module(code).unwrap();
        match module.items.into_iter().next().unwrap().node {
            ModuleItem::Statement(statement) => statement,
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    fn expression(code: &str) -> Expression {
        match first_statement(code) {
            Statement::Expression(expression) => expression,
            other => panic!("Expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_imports() {
        let module = parse_module(
            "import React, { useState, Card as Panel } from 'react';\nimport './styles.css'",
        )
        .unwrap();
        assert_eq!(module.items.len(), 2);
        let ModuleItem::Import(import) = &module.items[0].node else {
            panic!("Expected import");
        };
        assert_eq!(import.source, "react");
        assert_eq!(
            import.specifiers,
            vec![
                ImportSpecifier::Default {
                    local: "React".into()
                },
                ImportSpecifier::Named {
                    imported: "useState".into(),
                    local: "useState".into()
                },
                ImportSpecifier::Named {
                    imported: "Card".into(),
                    local: "Panel".into()
                },
            ]
        );
        let ModuleItem::Import(side_effect) = &module.items[1].node else {
            panic!("Expected import");
        };
        assert!(side_effect.specifiers.is_empty());
    }

    #[test]
    fn test_export_default_function() {
        let module = parse_module("export default function App() { return 1 }").unwrap();
        let ModuleItem::ExportDefault(ExportDefault::Function(function)) = &module.items[0].node
        else {
            panic!("Expected default function export");
        };
        assert_eq!(function.name.as_deref(), Some("App"));
    }

    #[test]
    fn test_export_default_arrow() {
        let module = parse_module("export default () => <div />;").unwrap();
        assert!(matches!(
            &module.items[0].node,
            ModuleItem::ExportDefault(ExportDefault::Expression(Expression::Function {
                arrow: true,
                ..
            }))
        ));
    }

    #[test]
    fn test_named_exports() {
        let module = parse_module("export const a = 1;\nexport { a as b };").unwrap();
        assert!(matches!(
            &module.items[0].node,
            ModuleItem::ExportNamed(ExportNamed::Declaration(Statement::Declaration { .. }))
        ));
        assert_eq!(
            module.items[1].node,
            ModuleItem::ExportNamed(ExportNamed::List(vec!["b".into()]))
        );
    }

    #[test]
    fn test_destructuring_declaration() {
        let Statement::Declaration { kind, declarators } =
            first_statement("const [count, setCount] = useState(0);")
        else {
            panic!("Expected declaration");
        };
        assert_eq!(kind, DeclarationKind::Const);
        assert!(matches!(
            &declarators[0].target,
            Pattern::Array { elements, rest: None } if elements.len() == 2
        ));
    }

    #[test]
    fn test_object_pattern_parameters() {
        let Statement::Function(function) =
            first_statement("function Card({ title, subtitle: sub = 'x', ...rest }) {}")
        else {
            panic!("Expected function");
        };
        let Pattern::Object { properties, rest } = &function.parameters[0].target else {
            panic!("Expected object pattern");
        };
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[1].key, "subtitle");
        assert_eq!(properties[1].target, Pattern::Identifier("sub".into()));
        assert!(properties[1].default.is_some());
        assert_eq!(rest.as_deref(), Some("rest"));
    }

    #[test]
    fn test_precedence() {
        let Expression::Binary {
            operator, right, ..
        } = expression("a + b * c;")
        else {
            panic!("Expected binary");
        };
        assert_eq!(operator, BinaryOperator::Add);
        assert!(matches!(
            *right,
            Expression::Binary {
                operator: BinaryOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_logical_and_conditional() {
        assert!(matches!(
            expression("ready && !failed ? 'ok' : 'no';"),
            Expression::Conditional { .. }
        ));
    }

    #[test]
    fn test_member_call_chain() {
        let Expression::Call { callee, arguments } = expression("items.map((item) => item.name);")
        else {
            panic!("Expected call");
        };
        assert_eq!(arguments.len(), 1);
        assert!(matches!(
            *callee,
            Expression::Member {
                property: MemberProperty::Named(ref name),
                ..
            } if name == "map"
        ));
    }

    #[test]
    fn test_update_expressions() {
        assert!(matches!(
            expression("count++;"),
            Expression::Update {
                operator: UpdateOperator::Increment,
                prefix: false,
                ..
            }
        ));
        let Expression::Binary { left, right, .. } = expression("a - --b;") else {
            panic!("Expected binary");
        };
        assert!(matches!(*left, Expression::Identifier(_)));
        assert!(matches!(
            *right,
            Expression::Update {
                operator: UpdateOperator::Decrement,
                prefix: true,
                ..
            }
        ));
        assert!(matches!(
            expression("n %= 2;"),
            Expression::Assign {
                operator: AssignOperator::RemainderAssign,
                ..
            }
        ));
        assert!(matches!(
            expression("n /= 2;"),
            Expression::Assign {
                operator: AssignOperator::DivideAssign,
                ..
            }
        ));
    }

    #[test]
    fn test_optional_member() {
        assert!(matches!(
            expression("user?.name;"),
            Expression::Member { optional: true, .. }
        ));
    }

    #[test]
    fn test_assignment() {
        assert!(matches!(
            expression("total += 1;"),
            Expression::Assign {
                operator: AssignOperator::AddAssign,
                ..
            }
        ));
        assert!(parse_module("a + b = 1;").is_err());
    }

    #[test]
    fn test_template_literal() {
        let Expression::Template(parts) = expression("`Hello ${name}!`;") else {
            panic!("Expected template");
        };
        assert_eq!(
            parts,
            vec![
                TemplatePart::Text("Hello ".into()),
                TemplatePart::Expression(Expression::identifier("name")),
                TemplatePart::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_object_literal() {
        let Expression::Assign { value, .. } =
            expression("style = { ...base, color: 'red', 'font-size': 12, [key]: 1, done };")
        else {
            panic!("Expected assignment");
        };
        let Expression::Object(properties) = *value else {
            panic!("Expected object");
        };
        assert_eq!(properties.len(), 5);
        assert!(matches!(properties[0], Property::Spread(_)));
        assert!(matches!(properties[4], Property::Shorthand(ref name) if name == "done"));
    }

    #[test]
    fn test_statements() {
        let module = parse_module(
            "if (a) { b() } else c()\nfor (const item of items) total += item\nthrow new Error('x')",
        )
        .unwrap();
        assert_eq!(module.items.len(), 3);
    }

    #[test]
    fn test_comments_and_optional_semicolons() {
        let module = parse_module("// leading\nconst a = 1 /* trailing */\nconst b = 2").unwrap();
        assert_eq!(module.items.len(), 2);
    }

    #[test]
    fn test_markup_in_module_only() {
        assert!(parse_module("const view = <div className=\"x\">hi</div>;").is_ok());
        assert!(parse_unit("const view = <div>hi</div>;").is_err());
    }

    #[test]
    fn test_unit_rejects_imports() {
        assert!(parse_unit("import React from 'react';").is_err());
        assert!(parse_unit("const exports = {};\nreturn exports.default;").is_ok());
    }

    #[test]
    fn test_unsupported_syntax_is_an_error() {
        let errors = parse_module("class App {}").unwrap_err();
        assert!(!errors.is_empty());
        assert!(parse_module("while (true) {}").is_err());
    }

    #[test]
    fn test_item_spans() {
        let code = "const a = 1;\nexport default a;";
        let module = parse_module(code).unwrap();
        let span = module.items[1].span;
        assert!(code[span.into_range()].starts_with("export default"));
    }
}
