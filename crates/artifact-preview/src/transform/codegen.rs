use super::lower_markup;
use crate::parser::{
    AssignOperator, BinaryOperator, Expression, Function, FunctionBody, ListItem, Literal, Markup,
    MarkupName, MemberProperty, Pattern, PatternElement, Property, PropertyKey, Statement,
    TemplatePart, UnaryOperator, UpdateOperator, is_identifier_name,
};
use crate::sandbox::number_to_string;

const INDENT: &str = "  ";

pub(super) struct Printed {
    pub text: String,
    pub uses_pragma: bool,
    pub uses_fragment: bool,
}

/// Prints statements back to source text, lowering markup on the way.
pub(super) struct Printer<'a> {
    pragma: &'a Expression,
    fragment: &'a Expression,
    output: String,
    indent: usize,
    uses_pragma: bool,
    uses_fragment: bool,
}

impl<'a> Printer<'a> {
    pub fn new(pragma: &'a Expression, fragment: &'a Expression) -> Self {
        Self {
            pragma,
            fragment,
            output: String::new(),
            indent: 0,
            uses_pragma: false,
            uses_fragment: false,
        }
    }

    pub fn program(mut self, statements: &[Statement]) -> Printed {
        for (index, statement) in statements.iter().enumerate() {
            if index > 0 {
                self.newline();
            }
            self.statement(statement);
        }
        Printed {
            text: self.output,
            uses_pragma: self.uses_pragma,
            uses_fragment: self.uses_fragment,
        }
    }

    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn newline(&mut self) {
        self.output.push('\n');
        for _ in 0..self.indent {
            self.output.push_str(INDENT);
        }
    }

    fn block(&mut self, statements: &[Statement]) {
        if statements.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{");
        self.indent += 1;
        for statement in statements {
            self.newline();
            self.statement(statement);
        }
        self.indent -= 1;
        self.newline();
        self.write("}");
    }

    /// Body of `if`/`for`, always braced.
    fn branch(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(statements) => self.block(statements),
            other => self.block(std::slice::from_ref(other)),
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Declaration { kind, declarators } => {
                self.write(kind.as_str());
                self.write(" ");
                for (index, declarator) in declarators.iter().enumerate() {
                    if index > 0 {
                        self.write(", ");
                    }
                    self.pattern(&declarator.target);
                    if let Some(init) = &declarator.init {
                        self.write(" = ");
                        self.expression(init, Precedence::Assign);
                    }
                }
                self.write(";");
            }
            Statement::Function(function) => self.function(function),
            Statement::Return(expression) => {
                self.write("return");
                if let Some(expression) = expression {
                    self.write(" ");
                    self.expression(expression, Precedence::Lowest);
                }
                self.write(";");
            }
            Statement::If {
                condition,
                consequent,
                alternate,
            } => {
                self.write("if (");
                self.expression(condition, Precedence::Lowest);
                self.write(") ");
                self.branch(consequent);
                if let Some(alternate) = alternate {
                    self.write(" else ");
                    match alternate.as_ref() {
                        Statement::If { .. } => self.statement(alternate),
                        other => self.branch(other),
                    }
                }
            }
            Statement::ForOf {
                kind,
                target,
                iterable,
                body,
            } => {
                self.write("for (");
                self.write(kind.as_str());
                self.write(" ");
                self.pattern(target);
                self.write(" of ");
                self.expression(iterable, Precedence::Assign);
                self.write(") ");
                self.branch(body);
            }
            Statement::Throw(expression) => {
                self.write("throw ");
                self.expression(expression, Precedence::Lowest);
                self.write(";");
            }
            Statement::Block(statements) => self.block(statements),
            Statement::Expression(expression) => {
                if starts_statement_ambiguously(expression) {
                    self.write("(");
                    self.expression(expression, Precedence::Lowest);
                    self.write(")");
                } else {
                    self.expression(expression, Precedence::Lowest);
                }
                self.write(";");
            }
            Statement::Empty => self.write(";"),
        }
    }

    fn function(&mut self, function: &Function) {
        self.write("function");
        match &function.name {
            Some(name) => {
                self.write(" ");
                self.write(name);
            }
            None => self.write(" "),
        }
        self.parameters(&function.parameters);
        self.write(" ");
        match &function.body {
            FunctionBody::Block(statements) => self.block(statements),
            FunctionBody::Expression(expression) => {
                self.block(&[Statement::Return(Some(expression.as_ref().clone()))]);
            }
        }
    }

    fn parameters(&mut self, parameters: &[PatternElement]) {
        self.write("(");
        for (index, parameter) in parameters.iter().enumerate() {
            if index > 0 {
                self.write(", ");
            }
            self.pattern_element(parameter);
        }
        self.write(")");
    }

    fn pattern_element(&mut self, element: &PatternElement) {
        self.pattern(&element.target);
        if let Some(default) = &element.default {
            self.write(" = ");
            self.expression(default, Precedence::Assign);
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Identifier(name) => self.write(name),
            Pattern::Array { elements, rest } => {
                self.write("[");
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        self.write(", ");
                    }
                    self.pattern_element(element);
                }
                if let Some(rest) = rest {
                    if !elements.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.pattern(rest);
                }
                self.write("]");
            }
            Pattern::Object { properties, rest } => {
                if properties.is_empty() && rest.is_none() {
                    self.write("{}");
                    return;
                }
                self.write("{ ");
                for (index, property) in properties.iter().enumerate() {
                    if index > 0 {
                        self.write(", ");
                    }
                    match &property.target {
                        Pattern::Identifier(name) if *name == property.key => self.write(name),
                        target => {
                            self.property_name(&property.key);
                            self.write(": ");
                            self.pattern(target);
                        }
                    }
                    if let Some(default) = &property.default {
                        self.write(" = ");
                        self.expression(default, Precedence::Assign);
                    }
                }
                if let Some(rest) = rest {
                    if !properties.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.write(rest);
                }
                self.write(" }");
            }
        }
    }

    fn property_name(&mut self, name: &str) {
        if is_identifier_name(name) {
            self.write(name);
        } else {
            self.write(&quote(name));
        }
    }

    fn lower(&mut self, markup: &Markup) -> Expression {
        self.uses_pragma = true;
        if markup.name == MarkupName::Fragment {
            self.uses_fragment = true;
        }
        lower_markup(markup, self.pragma, self.fragment)
    }

    fn expression(&mut self, expression: &Expression, minimum: Precedence) {
        if let Expression::Markup(markup) = expression {
            let lowered = self.lower(markup);
            self.expression(&lowered, minimum);
            return;
        }

        let parenthesize = precedence(expression) < minimum;
        if parenthesize {
            self.write("(");
        }

        match expression {
            Expression::Literal(literal) => self.literal(literal),
            Expression::Identifier(name) => self.write(name),
            Expression::Template(parts) => self.template(parts),
            Expression::Array(items) => {
                self.write("[");
                self.list(items);
                self.write("]");
            }
            Expression::Object(properties) => self.object(properties),
            Expression::Function {
                function,
                arrow: true,
            } => {
                self.parameters(&function.parameters);
                self.write(" => ");
                match &function.body {
                    FunctionBody::Block(statements) => self.block(statements),
                    FunctionBody::Expression(body) => {
                        if matches!(leftmost(body), Expression::Object(_)) {
                            self.write("(");
                            self.expression(body, Precedence::Lowest);
                            self.write(")");
                        } else {
                            self.expression(body, Precedence::Assign);
                        }
                    }
                }
            }
            Expression::Function { function, .. } => self.function(function),
            Expression::Member {
                object,
                property,
                optional,
            } => {
                if matches!(object.as_ref(), Expression::Literal(Literal::Number(_))) {
                    self.write("(");
                    self.expression(object, Precedence::Lowest);
                    self.write(")");
                } else {
                    self.expression(object, Precedence::Postfix);
                }
                match property {
                    MemberProperty::Named(name) => {
                        self.write(if *optional { "?." } else { "." });
                        self.write(name);
                    }
                    MemberProperty::Computed(key) => {
                        if *optional {
                            self.write("?.");
                        }
                        self.write("[");
                        self.expression(key, Precedence::Lowest);
                        self.write("]");
                    }
                }
            }
            Expression::Call { callee, arguments } => {
                self.expression(callee, Precedence::Postfix);
                self.write("(");
                self.list(arguments);
                self.write(")");
            }
            Expression::New { callee, arguments } => {
                self.write("new ");
                let minimum = if matches!(callee.as_ref(), Expression::Call { .. }) {
                    Precedence::Primary
                } else {
                    Precedence::Postfix
                };
                self.expression(callee, minimum);
                self.write("(");
                self.list(arguments);
                self.write(")");
            }
            Expression::Unary { operator, operand } => {
                self.write(match operator {
                    UnaryOperator::Not => "!",
                    UnaryOperator::Negate => "-",
                    UnaryOperator::Plus => "+",
                    UnaryOperator::TypeOf => "typeof ",
                });
                let signed = |operator: &UnaryOperator| {
                    matches!(operator, UnaryOperator::Negate | UnaryOperator::Plus)
                };
                // `- -a` and `- --a` must not print as `--a` and `---a`
                let merges = signed(operator)
                    && match operand.as_ref() {
                        Expression::Unary { operator: inner, .. } => signed(inner),
                        Expression::Update { prefix, .. } => *prefix,
                        _ => false,
                    };
                if merges {
                    self.write("(");
                    self.expression(operand, Precedence::Lowest);
                    self.write(")");
                } else {
                    self.expression(operand, Precedence::Unary);
                }
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let own = binary_precedence(*operator);
                self.expression(left, operand_minimum(*operator, left, own));
                self.write(" ");
                self.write(binary_symbol(*operator));
                self.write(" ");
                self.expression(right, operand_minimum(*operator, right, own.next()));
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test, Precedence::Logical);
                self.write(" ? ");
                self.expression(consequent, Precedence::Assign);
                self.write(" : ");
                self.expression(alternate, Precedence::Assign);
            }
            Expression::Assign {
                operator,
                target,
                value,
            } => {
                self.expression(target, Precedence::Postfix);
                self.write(match operator {
                    AssignOperator::Assign => " = ",
                    AssignOperator::AddAssign => " += ",
                    AssignOperator::SubtractAssign => " -= ",
                    AssignOperator::MultiplyAssign => " *= ",
                    AssignOperator::DivideAssign => " /= ",
                    AssignOperator::RemainderAssign => " %= ",
                });
                self.expression(value, Precedence::Assign);
            }
            Expression::Update {
                operator,
                prefix,
                target,
            } => {
                let symbol = match operator {
                    UpdateOperator::Increment => "++",
                    UpdateOperator::Decrement => "--",
                };
                if *prefix {
                    self.write(symbol);
                    self.expression(target, Precedence::Unary);
                } else {
                    self.expression(target, Precedence::Postfix);
                    self.write(symbol);
                }
            }
            Expression::Markup(_) => {}
        }

        if parenthesize {
            self.write(")");
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Number(number) => self.write(&number_to_string(*number)),
            Literal::String(text) => self.write(&quote(text)),
            Literal::Boolean(value) => self.write(if *value { "true" } else { "false" }),
            Literal::Null => self.write("null"),
            Literal::Undefined => self.write("undefined"),
        }
    }

    fn template(&mut self, parts: &[TemplatePart]) {
        self.write("`");
        for part in parts {
            match part {
                TemplatePart::Text(text) => {
                    let mut escaped = String::with_capacity(text.len());
                    let mut characters = text.chars().peekable();
                    while let Some(character) = characters.next() {
                        match character {
                            '`' => escaped.push_str("\\`"),
                            '\\' => escaped.push_str("\\\\"),
                            '$' if characters.peek() == Some(&'{') => escaped.push_str("\\$"),
                            other => escaped.push(other),
                        }
                    }
                    self.write(&escaped);
                }
                TemplatePart::Expression(expression) => {
                    self.write("${");
                    self.expression(expression, Precedence::Lowest);
                    self.write("}");
                }
            }
        }
        self.write("`");
    }

    fn list(&mut self, items: &[ListItem]) {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.write(", ");
            }
            match item {
                ListItem::Single(expression) => self.expression(expression, Precedence::Assign),
                ListItem::Spread(expression) => {
                    self.write("...");
                    self.expression(expression, Precedence::Assign);
                }
            }
        }
    }

    fn object(&mut self, properties: &[Property]) {
        if properties.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{ ");
        for (index, property) in properties.iter().enumerate() {
            if index > 0 {
                self.write(", ");
            }
            match property {
                Property::KeyValue { key, value } => {
                    match key {
                        PropertyKey::Named(name) => self.property_name(name),
                        PropertyKey::Computed(key) => {
                            self.write("[");
                            self.expression(key, Precedence::Assign);
                            self.write("]");
                        }
                    }
                    self.write(": ");
                    self.expression(value, Precedence::Assign);
                }
                Property::Shorthand(name) => self.write(name),
                Property::Spread(expression) => {
                    self.write("...");
                    self.expression(expression, Precedence::Assign);
                }
            }
        }
        self.write(" }");
    }
}

/// Binding strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Assign,
    Conditional,
    Logical,
    And,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
    Postfix,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Self::Lowest => Self::Assign,
            Self::Assign => Self::Conditional,
            Self::Conditional => Self::Logical,
            Self::Logical => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Relational,
            Self::Relational => Self::Additive,
            Self::Additive => Self::Multiplicative,
            Self::Multiplicative => Self::Unary,
            Self::Unary => Self::Postfix,
            Self::Postfix | Self::Primary => Self::Primary,
        }
    }
}

fn precedence(expression: &Expression) -> Precedence {
    match expression {
        Expression::Assign { .. } | Expression::Function { arrow: true, .. } => Precedence::Assign,
        Expression::Conditional { .. } => Precedence::Conditional,
        Expression::Binary { operator, .. } => binary_precedence(*operator),
        Expression::Unary { .. } | Expression::Update { prefix: true, .. } => Precedence::Unary,
        Expression::Update { prefix: false, .. }
        | Expression::Member { .. }
        | Expression::Call { .. }
        | Expression::New { .. }
        | Expression::Markup(_) => Precedence::Postfix,
        _ => Precedence::Primary,
    }
}

fn binary_precedence(operator: BinaryOperator) -> Precedence {
    match operator {
        BinaryOperator::Or | BinaryOperator::Coalesce => Precedence::Logical,
        BinaryOperator::And => Precedence::And,
        BinaryOperator::Equal
        | BinaryOperator::NotEqual
        | BinaryOperator::StrictEqual
        | BinaryOperator::StrictNotEqual => Precedence::Equality,
        BinaryOperator::Less
        | BinaryOperator::LessOrEqual
        | BinaryOperator::Greater
        | BinaryOperator::GreaterOrEqual => Precedence::Relational,
        BinaryOperator::Add | BinaryOperator::Subtract => Precedence::Additive,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Remainder => {
            Precedence::Multiplicative
        }
    }
}

/// `??` cannot be mixed with `&&`/`||` without parentheses.
fn operand_minimum(parent: BinaryOperator, operand: &Expression, minimum: Precedence) -> Precedence {
    let Expression::Binary { operator: child, .. } = operand else {
        return minimum;
    };
    let logical = |operator: BinaryOperator| {
        matches!(operator, BinaryOperator::And | BinaryOperator::Or)
    };
    let mixes = (parent == BinaryOperator::Coalesce && logical(*child))
        || (logical(parent) && *child == BinaryOperator::Coalesce);
    if mixes { Precedence::Primary } else { minimum }
}

fn binary_symbol(operator: BinaryOperator) -> &'static str {
    match operator {
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Remainder => "%",
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Less => "<",
        BinaryOperator::LessOrEqual => "<=",
        BinaryOperator::Greater => ">",
        BinaryOperator::GreaterOrEqual => ">=",
        BinaryOperator::Equal => "==",
        BinaryOperator::NotEqual => "!=",
        BinaryOperator::StrictEqual => "===",
        BinaryOperator::StrictNotEqual => "!==",
        BinaryOperator::And => "&&",
        BinaryOperator::Or => "||",
        BinaryOperator::Coalesce => "??",
    }
}

/// The sub-expression printed first.
fn leftmost(expression: &Expression) -> &Expression {
    match expression {
        Expression::Member { object, .. } => leftmost(object),
        Expression::Call { callee, .. } => leftmost(callee),
        Expression::Binary { left, .. } => leftmost(left),
        Expression::Conditional { test, .. } => leftmost(test),
        Expression::Assign { target, .. } => leftmost(target),
        Expression::Update {
            prefix: false,
            target,
            ..
        } => leftmost(target),
        other => other,
    }
}

/// A statement must not begin with `{` or `function`.
fn starts_statement_ambiguously(expression: &Expression) -> bool {
    matches!(
        leftmost(expression),
        Expression::Object(_) | Expression::Function { arrow: false, .. }
    )
}

/// Double-quoted string literal.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for character in text.chars() {
        match character {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            control if control.is_control() => {
                quoted.push_str(&format!("\\u{:04x}", u32::from(control)));
            }
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ModuleItem, parse_module};
    use pretty_assertions::assert_eq;

    fn reprint(source: &str) -> String {
        let statements: Vec<Statement> = parse_module(source)
            .unwrap()
            .items
            .into_iter()
            .map(|item| match item.node {
                ModuleItem::Statement(statement) => statement,
                other => panic!("Expected statement, got {other:?}"),
            })
            .collect();
        let pragma = Expression::identifier("h");
        let fragment = Expression::identifier("Fragment");
        Printer::new(&pragma, &fragment).program(&statements).text
    }

    #[test]
    fn test_precedence_parentheses() {
        assert_eq!(reprint("x = (a + b) * c;"), "x = (a + b) * c;");
        assert_eq!(reprint("x = a - (b - c);"), "x = a - (b - c);");
        assert_eq!(reprint("x = a - b - c;"), "x = a - b - c;");
        assert_eq!(reprint("x = (a ?? b) || c;"), "x = (a ?? b) || c;");
        assert_eq!(reprint("x = -(-a);"), "x = -(-a);");
        assert_eq!(reprint("x = (1).toFixed(2);"), "x = (1).toFixed(2);");
    }

    #[test]
    fn test_update_and_compound_operators() {
        assert_eq!(reprint("i++;"), "i++;");
        assert_eq!(reprint("x = -(--a);"), "x = -(--a);");
        assert_eq!(reprint("x = - -a;"), "x = -(-a);");
        assert_eq!(reprint("x = a - --b;"), "x = a - --b;");
        assert_eq!(reprint("x = list[i++] * 2;"), "x = list[i++] * 2;");
        assert_eq!(reprint("n *= 2; n /= 4; n %= 3;"), "n *= 2;\nn /= 4;\nn %= 3;");
        assert_eq!(reprint("x = 0xff + .5 + 1e3;"), "x = 255 + 0.5 + 1000;");
    }

    #[test]
    fn test_statement_start_is_unambiguous() {
        assert_eq!(reprint("({ a: 1 }).a;"), "({ a: 1 }.a);");
        assert_eq!(reprint("f = () => ({ a: 1 });"), "f = () => ({ a: 1 });");
    }

    #[test]
    fn test_blocks_and_control_flow() {
        assert_eq!(
            reprint("if (a) b(); else if (c) { d() } else e()\nfor (const [k, v] of list) total += v"),
            "if (a) {\n  b();\n} else if (c) {\n  d();\n} else {\n  e();\n}\n\
             for (const [k, v] of list) {\n  total += v;\n}"
        );
    }

    #[test]
    fn test_patterns() {
        assert_eq!(
            reprint("function f({ a, b: c = 1, ...rest }, [x, ...y] = []) { return a; }"),
            "function f({ a, b: c = 1, ...rest }, [x, ...y] = []) {\n  return a;\n}"
        );
    }

    #[test]
    fn test_strings_and_templates() {
        assert_eq!(reprint("s = 'it\\'s \"q\"\\n';"), "s = \"it's \\\"q\\\"\\n\";");
        assert_eq!(reprint("t = `a ${b} \\` c`;"), "t = `a ${b} \\` c`;");
    }

    #[test]
    fn test_markup_children_lowered_recursively() {
        assert_eq!(
            reprint("v = <ul>{items.map((i) => <li key={i}>{i}</li>)}</ul>;"),
            "v = h(\"ul\", null, items.map((i) => h(\"li\", { key: i }, i)));"
        );
    }
}
