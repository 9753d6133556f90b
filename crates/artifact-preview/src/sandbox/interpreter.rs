//! Tree-walking evaluator for executable units.
//!
//! Values live in `Rc` cells and environments form a parent-linked chain.
//! Sandboxed code can only name what is bound in its environment chain, and
//! the root of every unit binds nothing but `scope`.

use super::intrinsics::{self, check_array_length, check_string_length};
use super::value::{Closure, Value};
use crate::error::RuntimeError;
use crate::parser::{
    AssignOperator, BinaryOperator, DeclarationKind, Expression, Function, FunctionBody, ListItem,
    Literal, MemberProperty, Pattern, Property, PropertyKey, Statement, TemplatePart,
    UnaryOperator, UpdateOperator,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

/// A thrown value travelling up the Rust stack.
#[derive(Debug, Clone)]
pub struct Exception {
    pub value: Value,
}

impl Exception {
    /// Error object `{ name, message }`, the shape `new Error(...)` produces.
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            value: Value::object([
                ("name", Value::from(name)),
                ("message", Value::from(message.into())),
            ]),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    pub fn reference_error(identifier: &str) -> Self {
        Self::error("ReferenceError", format!("{identifier} is not defined"))
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::error("RangeError", message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::error("SyntaxError", message)
    }

    pub fn to_runtime_error(&self) -> RuntimeError {
        if let Value::Object(entries) = &self.value {
            let entries = entries.borrow();
            if let Some(message) = entries.get("message") {
                let name = entries
                    .get("name")
                    .filter(|name| !name.is_nullish())
                    .map_or_else(|| "Error".to_string(), Value::to_display_string);
                return RuntimeError::new(name, message.to_display_string());
            }
        }
        RuntimeError::new("Error", self.value.to_display_string())
    }
}

impl From<Exception> for RuntimeError {
    fn from(exception: Exception) -> Self {
        exception.to_runtime_error()
    }
}

struct Binding {
    value: Value,
    mutable: bool,
}

struct Frame {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Environment>,
}

/// Lexical environment: one frame plus its parents.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    pub fn root() -> Self {
        Self(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn child(&self) -> Self {
        Self(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn declare(
        &self,
        name: &str,
        value: Value,
        kind: DeclarationKind,
    ) -> Result<(), Exception> {
        let mut bindings = self.0.bindings.borrow_mut();
        if kind != DeclarationKind::Var && bindings.contains_key(name) {
            return Err(Exception::syntax_error(format!(
                "Identifier '{name}' has already been declared"
            )));
        }
        bindings.insert(
            name.to_string(),
            Binding {
                value,
                mutable: kind.is_mutable(),
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut environment = Some(self);
        while let Some(Environment(frame)) = environment {
            if let Some(binding) = frame.bindings.borrow().get(name) {
                return Some(binding.value.clone());
            }
            environment = frame.parent.as_ref();
        }
        None
    }

    fn assign(&self, name: &str, value: Value) -> Result<(), Exception> {
        let mut environment = Some(self);
        while let Some(Environment(frame)) = environment {
            if let Some(binding) = frame.bindings.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Err(Exception::type_error("Assignment to constant variable."));
                }
                binding.value = value;
                return Ok(());
            }
            environment = frame.parent.as_ref();
        }
        Err(Exception::reference_error(name))
    }
}

enum Completion {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    max_call_depth: usize,
    depth: usize,
}

impl Interpreter {
    pub fn new(max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            depth: 0,
        }
    }

    /// Run `statements` as a function body and return what it returns.
    pub fn run_body(
        &mut self,
        statements: &[Statement],
        environment: &Environment,
    ) -> Result<Value, Exception> {
        match self.execute_block(statements, environment)? {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(Value::Undefined),
        }
    }

    pub fn call(&mut self, callee: &Value, arguments: Vec<Value>) -> Result<Value, Exception> {
        if self.depth >= self.max_call_depth {
            return Err(Exception::range_error("Maximum call stack size exceeded"));
        }
        self.depth += 1;
        let result = match callee {
            Value::Function(closure) => self.call_closure(closure, arguments),
            Value::Native(native) => native.call(self, arguments),
            other => Err(Exception::type_error(format!(
                "{} is not a function",
                other.describe()
            ))),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        arguments: Vec<Value>,
    ) -> Result<Value, Exception> {
        let function = &closure.function;
        let environment = closure.environment.child();
        if let (false, Some(name)) = (closure.arrow, &function.name) {
            environment.declare(name, Value::Function(Rc::clone(closure)), DeclarationKind::Var)?;
        }

        let mut arguments = arguments.into_iter();
        for parameter in &function.parameters {
            let value = arguments.next().unwrap_or_default();
            let value = self.apply_default(value, parameter.default.as_ref(), &environment)?;
            self.bind_pattern(&parameter.target, value, &environment, DeclarationKind::Var)?;
        }

        match &function.body {
            FunctionBody::Block(statements) => self.run_body(statements, &environment),
            FunctionBody::Expression(expression) => self.evaluate(expression, &environment),
        }
    }

    fn construct(
        &mut self,
        callee: &Value,
        arguments: Vec<Value>,
        label: &str,
    ) -> Result<Value, Exception> {
        match callee {
            Value::Native(_) => self.call(callee, arguments),
            _ => Err(Exception::type_error(format!("{label} is not a constructor"))),
        }
    }

    fn closure(function: &Rc<Function>, environment: &Environment, arrow: bool) -> Value {
        Value::Function(Rc::new(Closure {
            function: Rc::clone(function),
            environment: environment.clone(),
            arrow,
        }))
    }

    fn execute_block(
        &mut self,
        statements: &[Statement],
        environment: &Environment,
    ) -> Result<Completion, Exception> {
        for statement in statements {
            if let Statement::Function(function) = statement {
                if let Some(name) = &function.name {
                    let closure = Self::closure(function, environment, false);
                    environment.declare(name, closure, DeclarationKind::Var)?;
                }
            }
        }
        for statement in statements {
            if let Completion::Return(value) = self.execute(statement, environment)? {
                return Ok(Completion::Return(value));
            }
        }
        Ok(Completion::Normal)
    }

    fn execute(
        &mut self,
        statement: &Statement,
        environment: &Environment,
    ) -> Result<Completion, Exception> {
        match statement {
            Statement::Declaration { kind, declarators } => {
                for declarator in declarators {
                    let value = match &declarator.init {
                        Some(init) => self.evaluate(init, environment)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(&declarator.target, value, environment, *kind)?;
                }
                Ok(Completion::Normal)
            }
            // hoisted by `execute_block`
            Statement::Function(_) | Statement::Empty => Ok(Completion::Normal),
            Statement::Return(expression) => {
                let value = match expression {
                    Some(expression) => self.evaluate(expression, environment)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::If {
                condition,
                consequent,
                alternate,
            } => {
                if self.evaluate(condition, environment)?.is_truthy() {
                    self.execute(consequent, environment)
                } else if let Some(alternate) = alternate {
                    self.execute(alternate, environment)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Statement::ForOf {
                kind,
                target,
                iterable,
                body,
            } => {
                let iterable = self.evaluate(iterable, environment)?;
                let items = iterable.iterate().ok_or_else(|| {
                    Exception::type_error(format!("{} is not iterable", iterable.describe()))
                })?;
                for item in items {
                    let iteration = environment.child();
                    self.bind_pattern(target, item, &iteration, *kind)?;
                    if let Completion::Return(value) = self.execute(body, &iteration)? {
                        return Ok(Completion::Return(value));
                    }
                }
                Ok(Completion::Normal)
            }
            Statement::Throw(expression) => Err(Exception {
                value: self.evaluate(expression, environment)?,
            }),
            Statement::Block(statements) => self.execute_block(statements, &environment.child()),
            Statement::Expression(expression) => {
                self.evaluate(expression, environment)?;
                Ok(Completion::Normal)
            }
        }
    }

    pub fn evaluate(
        &mut self,
        expression: &Expression,
        environment: &Environment,
    ) -> Result<Value, Exception> {
        match expression {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(number) => Value::Number(*number),
                Literal::String(text) => Value::string(text.as_str()),
                Literal::Boolean(value) => Value::Boolean(*value),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expression::Identifier(name) => environment
                .lookup(name)
                .ok_or_else(|| Exception::reference_error(name)),
            Expression::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(literal) => text.push_str(literal),
                        TemplatePart::Expression(expression) => {
                            text.push_str(&self.evaluate(expression, environment)?.to_display_string());
                        }
                    }
                    check_string_length(text.len())?;
                }
                Ok(Value::string(text))
            }
            Expression::Array(items) => Ok(Value::array(self.evaluate_list(items, environment)?)),
            Expression::Object(properties) => self.evaluate_object(properties, environment),
            Expression::Function { function, arrow } => {
                Ok(Self::closure(function, environment, *arrow))
            }
            Expression::Member {
                object,
                property,
                optional,
            } => {
                let object = self.evaluate(object, environment)?;
                if *optional && object.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = self.property_key(property, environment)?;
                get_member(&object, &key)
            }
            Expression::Call { callee, arguments } => {
                let function = self.evaluate(callee, environment)?;
                let arguments = self.evaluate_list(arguments, environment)?;
                if !function.is_callable() {
                    return Err(Exception::type_error(format!(
                        "{} is not a function",
                        callee_label(callee)
                    )));
                }
                self.call(&function, arguments)
            }
            Expression::New { callee, arguments } => {
                let constructor = self.evaluate(callee, environment)?;
                let arguments = self.evaluate_list(arguments, environment)?;
                self.construct(&constructor, arguments, &callee_label(callee))
            }
            Expression::Unary { operator, operand } => {
                self.evaluate_unary(*operator, operand, environment)
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left, environment)?;
                let short_circuit = match operator {
                    BinaryOperator::And => !left.is_truthy(),
                    BinaryOperator::Or => left.is_truthy(),
                    BinaryOperator::Coalesce => !left.is_nullish(),
                    _ => false,
                };
                if short_circuit {
                    return Ok(left);
                }
                let right = self.evaluate(right, environment)?;
                binary_operation(*operator, &left, &right)
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test, environment)?.is_truthy() {
                    self.evaluate(consequent, environment)
                } else {
                    self.evaluate(alternate, environment)
                }
            }
            Expression::Assign {
                operator,
                target,
                value,
            } => self.evaluate_assign(*operator, target, value, environment),
            Expression::Update {
                operator,
                prefix,
                target,
            } => self.evaluate_update(*operator, *prefix, target, environment),
            Expression::Markup(_) => Err(Exception::syntax_error(
                "Markup must be compiled before it can run",
            )),
        }
    }

    fn evaluate_list(
        &mut self,
        items: &[ListItem],
        environment: &Environment,
    ) -> Result<Vec<Value>, Exception> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Single(expression) => values.push(self.evaluate(expression, environment)?),
                ListItem::Spread(expression) => {
                    let spread = self.evaluate(expression, environment)?;
                    let elements = spread.iterate().ok_or_else(|| {
                        Exception::type_error(format!("{} is not iterable", spread.describe()))
                    })?;
                    check_array_length(values.len() + elements.len())?;
                    values.extend(elements);
                }
            }
        }
        Ok(values)
    }

    fn evaluate_object(
        &mut self,
        properties: &[Property],
        environment: &Environment,
    ) -> Result<Value, Exception> {
        let mut entries = Vec::with_capacity(properties.len());
        for property in properties {
            match property {
                Property::KeyValue { key, value } => {
                    let key = match key {
                        PropertyKey::Named(name) => name.clone(),
                        PropertyKey::Computed(expression) => {
                            self.evaluate(expression, environment)?.to_display_string()
                        }
                    };
                    entries.push((key, self.evaluate(value, environment)?));
                }
                Property::Shorthand(name) => {
                    let value = environment
                        .lookup(name)
                        .ok_or_else(|| Exception::reference_error(name))?;
                    entries.push((name.clone(), value));
                }
                Property::Spread(expression) => {
                    let source = self.evaluate(expression, environment)?;
                    entries.extend(intrinsics::own_entries(&source));
                }
            }
        }
        Ok(Value::object(entries))
    }

    fn property_key(
        &mut self,
        property: &MemberProperty,
        environment: &Environment,
    ) -> Result<String, Exception> {
        match property {
            MemberProperty::Named(name) => Ok(name.clone()),
            MemberProperty::Computed(expression) => {
                Ok(self.evaluate(expression, environment)?.to_display_string())
            }
        }
    }

    fn evaluate_unary(
        &mut self,
        operator: UnaryOperator,
        operand: &Expression,
        environment: &Environment,
    ) -> Result<Value, Exception> {
        if let (UnaryOperator::TypeOf, Expression::Identifier(name)) = (operator, operand) {
            let type_name = environment
                .lookup(name)
                .map_or("undefined", |value| value.type_of());
            return Ok(Value::from(type_name));
        }
        let value = self.evaluate(operand, environment)?;
        Ok(match operator {
            UnaryOperator::Not => Value::Boolean(!value.is_truthy()),
            UnaryOperator::Negate => Value::Number(-value.to_number()),
            UnaryOperator::Plus => Value::Number(value.to_number()),
            UnaryOperator::TypeOf => Value::from(value.type_of()),
        })
    }

    fn evaluate_assign(
        &mut self,
        operator: AssignOperator,
        target: &Expression,
        value: &Expression,
        environment: &Environment,
    ) -> Result<Value, Exception> {
        match target {
            Expression::Identifier(name) => {
                let value = match operator {
                    AssignOperator::Assign => self.evaluate(value, environment)?,
                    _ => {
                        let current = environment
                            .lookup(name)
                            .ok_or_else(|| Exception::reference_error(name))?;
                        let operand = self.evaluate(value, environment)?;
                        compound_assignment(operator, &current, &operand)?
                    }
                };
                environment.assign(name, value.clone())?;
                Ok(value)
            }
            Expression::Member {
                object, property, ..
            } => {
                let object = self.evaluate(object, environment)?;
                let key = self.property_key(property, environment)?;
                let value = match operator {
                    AssignOperator::Assign => self.evaluate(value, environment)?,
                    _ => {
                        let current = get_member(&object, &key)?;
                        let operand = self.evaluate(value, environment)?;
                        compound_assignment(operator, &current, &operand)?
                    }
                };
                set_member(&object, &key, value.clone())?;
                Ok(value)
            }
            _ => Err(Exception::syntax_error("Invalid assignment target")),
        }
    }

    fn evaluate_update(
        &mut self,
        operator: UpdateOperator,
        prefix: bool,
        target: &Expression,
        environment: &Environment,
    ) -> Result<Value, Exception> {
        let step = match operator {
            UpdateOperator::Increment => 1.0,
            UpdateOperator::Decrement => -1.0,
        };
        let old = match target {
            Expression::Identifier(name) => {
                let old = environment
                    .lookup(name)
                    .ok_or_else(|| Exception::reference_error(name))?
                    .to_number();
                environment.assign(name, Value::Number(old + step))?;
                old
            }
            Expression::Member {
                object,
                property,
                optional: false,
            } => {
                let object = self.evaluate(object, environment)?;
                let key = self.property_key(property, environment)?;
                let old = get_member(&object, &key)?.to_number();
                set_member(&object, &key, Value::Number(old + step))?;
                old
            }
            _ => {
                let position = if prefix { "prefix" } else { "postfix" };
                return Err(Exception::syntax_error(format!(
                    "Invalid left-hand side expression in {position} operation"
                )));
            }
        };
        Ok(Value::Number(if prefix { old + step } else { old }))
    }

    fn apply_default(
        &mut self,
        value: Value,
        default: Option<&Expression>,
        environment: &Environment,
    ) -> Result<Value, Exception> {
        match (value, default) {
            (Value::Undefined, Some(default)) => self.evaluate(default, environment),
            (value, _) => Ok(value),
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        environment: &Environment,
        kind: DeclarationKind,
    ) -> Result<(), Exception> {
        match pattern {
            Pattern::Identifier(name) => environment.declare(name, value, kind),
            Pattern::Array { elements, rest } => {
                let items = value.iterate().ok_or_else(|| {
                    Exception::type_error(format!("{} is not iterable", value.describe()))
                })?;
                let mut items = items.into_iter();
                for element in elements {
                    let item = items.next().unwrap_or_default();
                    let item = self.apply_default(item, element.default.as_ref(), environment)?;
                    self.bind_pattern(&element.target, item, environment, kind)?;
                }
                if let Some(rest) = rest {
                    self.bind_pattern(rest, Value::array(items.collect()), environment, kind)?;
                }
                Ok(())
            }
            Pattern::Object { properties, rest } => {
                if value.is_nullish() {
                    return Err(Exception::type_error(format!(
                        "Cannot destructure '{0}' as it is {0}.",
                        value.describe()
                    )));
                }
                for property in properties {
                    let item = get_member(&value, &property.key)?;
                    let item = self.apply_default(item, property.default.as_ref(), environment)?;
                    self.bind_pattern(&property.target, item, environment, kind)?;
                }
                if let Some(rest) = rest {
                    let remaining = intrinsics::own_entries(&value)
                        .into_iter()
                        .filter(|(key, _)| properties.iter().all(|property| &property.key != key));
                    environment.declare(rest, Value::object(remaining), kind)?;
                }
                Ok(())
            }
        }
    }
}

/// Property read with the host's lookup rules.
///
/// Reading an absent name from `scope` throws instead of yielding `undefined`.
pub fn get_member(object: &Value, key: &str) -> Result<Value, Exception> {
    match object {
        Value::Undefined | Value::Null => Err(Exception::type_error(format!(
            "Cannot read properties of {} (reading '{key}')",
            object.describe()
        ))),
        Value::Scope(registry) => registry
            .get(key)
            .map(Value::detached)
            .ok_or_else(|| Exception::reference_error(key)),
        Value::Object(entries) => Ok(entries.borrow().get(key).cloned().unwrap_or_default()),
        Value::Namespace(entries) => Ok(entries.get(key).map(Value::detached).unwrap_or_default()),
        Value::Array(items) => Ok(intrinsics::array_member(items, key)),
        Value::String(text) => Ok(intrinsics::string_member(text, key)),
        Value::Number(number) => Ok(intrinsics::number_member(*number, key)),
        Value::Function(closure) => Ok(match key {
            "name" => Value::from(closure.name()),
            _ => Value::Undefined,
        }),
        Value::Native(native) => Ok(match key {
            "name" => Value::from(native.name.as_str()),
            _ => Value::Undefined,
        }),
        Value::Element(element) => Ok(match key {
            "type" => element.element_type.clone(),
            "props" => element.props.clone(),
            "key" => element
                .key
                .as_deref()
                .map_or(Value::Null, Value::from),
            _ => Value::Undefined,
        }),
        Value::Boolean(_) | Value::Symbol(_) => Ok(Value::Undefined),
    }
}

pub fn set_member(object: &Value, key: &str, value: Value) -> Result<(), Exception> {
    match object {
        Value::Undefined | Value::Null => Err(Exception::type_error(format!(
            "Cannot set properties of {} (setting '{key}')",
            object.describe()
        ))),
        Value::Scope(_) => Err(Exception::type_error(format!(
            "Cannot assign to read only capability '{key}'"
        ))),
        Value::Namespace(_) => Err(Exception::type_error(format!(
            "Cannot assign to read only property '{key}' of object"
        ))),
        Value::Object(entries) => {
            entries.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let length = value.to_number();
                if length.fract() != 0.0 || length < 0.0 {
                    return Err(Exception::range_error("Invalid array length"));
                }
                check_array_length(length as usize)?;
                items.resize(length as usize, Value::Undefined);
            } else if let Ok(index) = key.parse::<usize>() {
                if index >= items.len() {
                    check_array_length(index.saturating_add(1))?;
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn binary_operation(
    operator: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<Value, Exception> {
    Ok(match operator {
        BinaryOperator::Add => add(left, right)?,
        BinaryOperator::Subtract => Value::Number(left.to_number() - right.to_number()),
        BinaryOperator::Multiply => Value::Number(left.to_number() * right.to_number()),
        BinaryOperator::Divide => Value::Number(left.to_number() / right.to_number()),
        BinaryOperator::Remainder => Value::Number(left.to_number() % right.to_number()),
        BinaryOperator::Less => Value::Boolean(compare(left, right) == Some(Ordering::Less)),
        BinaryOperator::LessOrEqual => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::Greater => Value::Boolean(compare(left, right) == Some(Ordering::Greater)),
        BinaryOperator::GreaterOrEqual => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOperator::Equal => Value::Boolean(left.loose_equals(right)),
        BinaryOperator::NotEqual => Value::Boolean(!left.loose_equals(right)),
        BinaryOperator::StrictEqual => Value::Boolean(left.strict_equals(right)),
        BinaryOperator::StrictNotEqual => Value::Boolean(!left.strict_equals(right)),
        BinaryOperator::And => (if left.is_truthy() { right } else { left }).clone(),
        BinaryOperator::Or => (if left.is_truthy() { left } else { right }).clone(),
        BinaryOperator::Coalesce => (if left.is_nullish() { right } else { left }).clone(),
    })
}

fn compound_assignment(
    operator: AssignOperator,
    current: &Value,
    operand: &Value,
) -> Result<Value, Exception> {
    Ok(match operator {
        AssignOperator::Assign => operand.clone(),
        AssignOperator::AddAssign => add(current, operand)?,
        AssignOperator::SubtractAssign => Value::Number(current.to_number() - operand.to_number()),
        AssignOperator::MultiplyAssign => Value::Number(current.to_number() * operand.to_number()),
        AssignOperator::DivideAssign => Value::Number(current.to_number() / operand.to_number()),
        AssignOperator::RemainderAssign => Value::Number(current.to_number() % operand.to_number()),
    })
}

fn add(left: &Value, right: &Value) -> Result<Value, Exception> {
    let numeric = |value: &Value| {
        matches!(
            value,
            Value::Number(_) | Value::Boolean(_) | Value::Null | Value::Undefined
        )
    };
    if numeric(left) && numeric(right) {
        return Ok(Value::Number(left.to_number() + right.to_number()));
    }
    let (left, right) = (left.to_display_string(), right.to_display_string());
    check_string_length(left.len() + right.len())?;
    Ok(Value::string(left + &right))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

/// Source-like name of a callee for error messages (`items.map`).
fn callee_label(expression: &Expression) -> String {
    match expression {
        Expression::Identifier(name) => name.clone(),
        Expression::Member {
            object,
            property: MemberProperty::Named(name),
            ..
        } => format!("{}.{name}", callee_label(object)),
        Expression::Member { object, .. } => format!("{}[...]", callee_label(object)),
        Expression::Call { callee, .. } => format!("{}(...)", callee_label(callee)),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unit;

    fn run(code: &str) -> Result<Value, Exception> {
        let statements = parse_unit(code).unwrap();
        Interpreter::new(32).run_body(&statements, &Environment::root())
    }

    fn run_ok(code: &str) -> Value {
        run(code).unwrap()
    }

    fn error_of(code: &str) -> RuntimeError {
        run(code).unwrap_err().to_runtime_error()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(run_ok("return 1 + 2 * 3;").to_number(), 7.0);
        assert_eq!(run_ok("return 'a' + 1;").to_display_string(), "a1");
        assert_eq!(run_ok("return `x=${1 + 1}`;").to_display_string(), "x=2");
        assert_eq!(run_ok("return 7 % 4;").to_number(), 3.0);
    }

    #[test]
    fn test_update_operators() {
        assert_eq!(run_ok("let i = 1; const old = i++; return [old, i];").to_display_string(), "1,2");
        assert_eq!(run_ok("let i = 1; return [--i, i];").to_display_string(), "0,0");
        assert_eq!(
            run_ok("const o = { n: '4' }; o.n++; o['n'] *= 3; return o.n;").to_number(),
            15.0
        );
        assert_eq!(run_ok("let n = 10; n /= 4; n %= 2; return n;").to_number(), 0.5);
        assert_eq!(error_of("const c = 1; c++;").message, "Assignment to constant variable.");
        assert_eq!(error_of("missing++;").name, "ReferenceError");
    }

    #[test]
    fn test_closures_capture_environment() {
        let value = run_ok(
            "const makeCounter = (start) => { let count = start; return () => { count += 1; return count; }; };
             const next = makeCounter(10);
             next();
             return next();",
        );
        assert_eq!(value.to_number(), 12.0);
    }

    #[test]
    fn test_function_hoisting_and_recursion() {
        let value = run_ok(
            "return factorial(5);
             function factorial(n) { if (n <= 1) return 1; return n * factorial(n - 1); }",
        );
        assert_eq!(value.to_number(), 120.0);
    }

    #[test]
    fn test_destructuring() {
        let value = run_ok(
            "const { a, b: [first, ...others], c = 3, ...rest } = { a: 1, b: [2, 4, 5], d: 6 };
             return a + first + others.length + c + rest.d;",
        );
        assert_eq!(value.to_number(), 1.0 + 2.0 + 2.0 + 3.0 + 6.0);
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_eq!(run_ok("return null ?? 'fallback';").to_display_string(), "fallback");
        assert_eq!(run_ok("return 0 || 'x';").to_display_string(), "x");
        assert!(run_ok("return false && missing();").strict_equals(&Value::Boolean(false)));
    }

    #[test]
    fn test_for_of_and_if() {
        let value = run_ok(
            "let total = 0;
             for (const n of [1, 2, 3, 4]) { if (n % 2 === 0) total += n; else total -= 1; }
             return total;",
        );
        assert_eq!(value.to_number(), 4.0);
    }

    #[test]
    fn test_optional_member() {
        assert!(matches!(run_ok("const user = null; return user?.name;"), Value::Undefined));
    }

    #[test]
    fn test_reference_error() {
        let error = error_of("return missing + 1;");
        assert_eq!(error.name, "ReferenceError");
        assert_eq!(error.message, "missing is not defined");
    }

    #[test]
    fn test_const_assignment_is_type_error() {
        assert_eq!(error_of("const a = 1; a = 2;").name, "TypeError");
    }

    #[test]
    fn test_redeclaration() {
        assert_eq!(error_of("let a = 1; let a = 2;").name, "SyntaxError");
    }

    #[test]
    fn test_calling_non_function() {
        let error = error_of("const item = {}; item.render();");
        assert_eq!(error.message, "item.render is not a function");
    }

    #[test]
    fn test_read_property_of_undefined() {
        let error = error_of("const item = {}; return item.child.name;");
        assert_eq!(error.message, "Cannot read properties of undefined (reading 'name')");
    }

    #[test]
    fn test_throw_object() {
        let error = error_of("throw { name: 'Custom', message: 'boom' };");
        assert_eq!(error, RuntimeError::new("Custom", "boom"));
        assert_eq!(error_of("throw 'plain';"), RuntimeError::new("Error", "plain"));
    }

    #[test]
    fn test_call_depth_limit() {
        let error = error_of("const loop = () => loop(); loop();");
        assert_eq!(error.name, "RangeError");
    }

    #[test]
    fn test_typeof_undeclared() {
        assert_eq!(run_ok("return typeof nothing;").to_display_string(), "undefined");
        assert_eq!(run_ok("return typeof (() => 1);").to_display_string(), "function");
    }

    #[test]
    fn test_member_assignment() {
        let value = run_ok("const state = { list: [] }; state.list[2] = 'x'; state.count = 1; return state;");
        let Value::Object(entries) = value else {
            panic!("Expected object");
        };
        let entries = entries.borrow();
        assert_eq!(entries["count"].to_number(), 1.0);
        assert_eq!(entries["list"].to_display_string(), ",,x");
    }
}
