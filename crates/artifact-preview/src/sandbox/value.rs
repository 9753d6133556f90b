//! Runtime values of sandboxed code.

use super::interpreter::{Environment, Exception, Interpreter};
use crate::parser::Function;
use crate::registry::CapabilityRegistry;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type NativeCall = dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Exception>;

pub type Object = Rc<RefCell<IndexMap<String, Value>>>;
pub type Array = Rc<RefCell<Vec<Value>>>;

/// Longest string (in bytes) or array sandboxed code may build.
pub const MAX_LENGTH: usize = 1 << 24;

/// How deep conversions walk into nested arrays and objects.
const MAX_DEPTH: usize = 128;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Array(Array),
    Object(Object),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Element(Rc<Element>),
    /// Unique marker value, compared by identity (`React.Fragment`).
    Symbol(Rc<str>),
    /// The capability registry as seen from sandboxed code.
    Scope(Rc<CapabilityRegistry>),
    /// Read-only object owned by the host, such as `React` or `Math`.
    Namespace(Rc<IndexMap<String, Value>>),
}

/// Function defined by sandboxed code, with the environment it closes over.
pub struct Closure {
    pub function: Rc<Function>,
    pub environment: Environment,
    pub arrow: bool,
}

impl Closure {
    pub fn name(&self) -> &str {
        self.function.name.as_deref().unwrap_or("anonymous")
    }
}

/// Function implemented by the host.
pub struct NativeFunction {
    pub name: String,
    call: Box<NativeCall>,
}

impl NativeFunction {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, Exception> {
        (self.call)(interpreter, arguments)
    }
}

/// Result of the element-construction primitive.
#[derive(Debug)]
pub struct Element {
    /// Tag name string, component function or fragment symbol.
    pub element_type: Value,
    /// Always an object; `children` lives here.
    pub props: Value,
    pub key: Option<String>,
}

impl Value {
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Self::String(value.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(Rc::new(RefCell::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )))
    }

    pub fn native(
        name: impl Into<String>,
        call: impl Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Exception> + 'static,
    ) -> Self {
        Self::Native(Rc::new(NativeFunction {
            name: name.into(),
            call: Box::new(call),
        }))
    }

    pub fn symbol(description: &str) -> Self {
        Self::Symbol(Rc::from(description))
    }

    /// Copy that sandboxed code cannot change: objects become namespaces,
    /// nested all the way down. Functions and symbols keep their identity.
    pub fn freeze(&self) -> Self {
        self.freeze_at(0)
    }

    fn freeze_at(&self, depth: usize) -> Self {
        if depth > MAX_DEPTH {
            return Self::Undefined;
        }
        match self {
            Self::Object(entries) => Self::Namespace(Rc::new(
                entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.freeze_at(depth + 1)))
                    .collect(),
            )),
            Self::Namespace(entries) => Self::Namespace(Rc::new(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.freeze_at(depth + 1)))
                    .collect(),
            )),
            Self::Array(items) => Self::array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.freeze_at(depth + 1))
                    .collect(),
            ),
            Self::Element(element) => Self::Element(Rc::new(Element {
                element_type: element.element_type.freeze_at(depth + 1),
                props: element.props.freeze_at(depth + 1),
                key: element.key.clone(),
            })),
            other => other.clone(),
        }
    }

    /// Value handed out when reading from a namespace: arrays are copied so
    /// the shared one is never mutated.
    pub fn detached(&self) -> Self {
        self.detached_at(0)
    }

    fn detached_at(&self, depth: usize) -> Self {
        match self {
            Self::Array(items) if depth <= MAX_DEPTH => Self::array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.detached_at(depth + 1))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) | Self::Native(_) => "function",
            Self::Symbol(_) => "symbol",
            Self::Array(_)
            | Self::Object(_)
            | Self::Element(_)
            | Self::Scope(_)
            | Self::Namespace(_) => "object",
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Array(_) => "array".to_string(),
            Self::Element(_) => "element".to_string(),
            Self::Function(closure) => format!("function {}", closure.name()),
            Self::Native(native) => format!("function {}", native.name),
            other => other.type_of().to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(value) => *value,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::String(text) => !text.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Boolean(value) => f64::from(u8::from(*value)),
            Self::Number(number) => *number,
            Self::String(text) => string_to_number(text),
            // through the string form, like `+[5]` and `+[[]]`
            Self::Array(items) if items.borrow().len() > 1 => f64::NAN,
            Self::Array(_) => string_to_number(&self.to_display_string()),
            _ => f64::NAN,
        }
    }

    pub fn to_display_string(&self) -> String {
        self.display_on(&mut Vec::new())
    }

    /// `path` holds the arrays being joined; one that contains itself shows as empty.
    fn display_on(&self, path: &mut Vec<*const RefCell<Vec<Value>>>) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::Number(number) => number_to_string(*number),
            Self::String(text) => text.to_string(),
            Self::Array(items) => {
                let address = Rc::as_ptr(items);
                if path.len() >= MAX_DEPTH || path.contains(&address) {
                    return String::new();
                }
                path.push(address);
                let joined = items
                    .borrow()
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.display_on(path)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                path.pop();
                joined
            }
            Self::Function(closure) => format!("function {}() {{ ... }}", closure.name()),
            Self::Native(native) => format!("function {}() {{ [native code] }}", native.name),
            Self::Symbol(description) => format!("Symbol({description})"),
            Self::Object(_) | Self::Element(_) | Self::Scope(_) | Self::Namespace(_) => {
                "[object Object]".to_string()
            }
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(left), Self::Boolean(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::String(left), Self::String(right)) => left == right,
            _ => self.same_reference(other),
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (left, right) if left.is_nullish() && right.is_nullish() => true,
            (left, right) if left.is_nullish() || right.is_nullish() => false,
            (Self::Number(_), Self::String(_))
            | (Self::String(_), Self::Number(_))
            | (Self::Boolean(_), _)
            | (_, Self::Boolean(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    /// Identity of reference values. Primitives are never the same reference.
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(left), Self::Array(right)) => Rc::ptr_eq(left, right),
            (Self::Object(left), Self::Object(right)) => Rc::ptr_eq(left, right),
            (Self::Function(left), Self::Function(right)) => Rc::ptr_eq(left, right),
            (Self::Native(left), Self::Native(right)) => Rc::ptr_eq(left, right),
            (Self::Element(left), Self::Element(right)) => Rc::ptr_eq(left, right),
            (Self::Symbol(left), Self::Symbol(right)) => Rc::ptr_eq(left, right),
            (Self::Scope(left), Self::Scope(right)) => Rc::ptr_eq(left, right),
            (Self::Namespace(left), Self::Namespace(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }

    /// Elements of an iterable value (arrays and strings).
    pub fn iterate(&self) -> Option<Vec<Value>> {
        match self {
            Self::Array(items) => Some(items.borrow().clone()),
            Self::String(text) => Some(
                text.chars()
                    .map(|character| Value::string(character.to_string()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Convert to JSON. Functions and `undefined` become `None`, like
    /// `JSON.stringify` drops them.
    pub fn to_json(&self) -> Result<Option<serde_json::Value>, String> {
        self.to_json_on(&mut Vec::new())
    }

    /// `path` holds the addresses of the containers being converted.
    fn to_json_on(&self, path: &mut Vec<usize>) -> Result<Option<serde_json::Value>, String> {
        let Some(address) = self.container_address() else {
            return self.to_json_at(path);
        };
        if path.contains(&address) {
            return Err("Converting circular structure to JSON".to_string());
        }
        if path.len() >= MAX_DEPTH {
            return Err("Maximum nesting depth exceeded in JSON conversion".to_string());
        }
        path.push(address);
        let json = self.to_json_at(path);
        path.pop();
        json
    }

    fn container_address(&self) -> Option<usize> {
        match self {
            Self::Array(items) => Some(Rc::as_ptr(items) as usize),
            Self::Object(entries) => Some(Rc::as_ptr(entries) as usize),
            Self::Namespace(entries) => Some(Rc::as_ptr(entries) as usize),
            Self::Element(element) => Some(Rc::as_ptr(element) as usize),
            _ => None,
        }
    }

    fn to_json_at(&self, path: &mut Vec<usize>) -> Result<Option<serde_json::Value>, String> {
        Ok(Some(match self {
            Self::Undefined | Self::Function(_) | Self::Native(_) | Self::Symbol(_) => {
                return Ok(None);
            }
            Self::Null => serde_json::Value::Null,
            Self::Boolean(value) => serde_json::Value::Bool(*value),
            Self::Number(number) => json_number(*number),
            Self::String(text) => serde_json::Value::String(text.to_string()),
            Self::Array(items) => serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| {
                        item.to_json_on(path)
                            .map(|json| json.unwrap_or(serde_json::Value::Null))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Self::Object(entries) => json_object(entries.borrow().iter(), path)?,
            Self::Namespace(entries) => json_object(entries.iter(), path)?,
            Self::Element(element) => {
                let mut map = serde_json::Map::new();
                let element_type = match &element.element_type {
                    Self::String(tag) => tag.to_string(),
                    Self::Function(closure) => closure.name().to_string(),
                    Self::Native(native) => native.name.clone(),
                    other => other.to_display_string(),
                };
                map.insert("type".to_string(), serde_json::Value::String(element_type));
                if let Some(props) = element.props.to_json_on(path)? {
                    map.insert("props".to_string(), props);
                }
                serde_json::Value::Object(map)
            }
            Self::Scope(_) => serde_json::Value::Object(serde_json::Map::new()),
        }))
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Boolean(*value),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Self::string(text.as_str()),
            serde_json::Value::Array(items) => Self::array(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(entries) => Self::object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value))),
            ),
        }
    }
}

fn json_object<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
    path: &mut Vec<usize>,
) -> Result<serde_json::Value, String> {
    let mut map = serde_json::Map::new();
    for (key, value) in entries {
        if let Some(json) = value.to_json_on(path)? {
            map.insert(key.clone(), json);
        }
    }
    Ok(serde_json::Value::Object(map))
}

fn json_number(number: f64) -> serde_json::Value {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

pub fn number_to_string(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        let sign = if number > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if number == 0.0 {
        "0".to_string()
    } else {
        number.to_string()
    }
}

pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.starts_with("0x") || trimmed.starts_with("0X") => {
            let digits = &trimmed[2..];
            if digits.is_empty() {
                return f64::NAN;
            }
            digits
                .chars()
                .try_fold(0.0, |total, digit| {
                    digit.to_digit(16).map(|digit| total * 16.0 + f64::from(digit))
                })
                .unwrap_or(f64::NAN)
        }
        _ if trimmed.chars().any(|character| character.is_ascii_alphabetic() && character != 'e' && character != 'E') => {
            f64::NAN
        }
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = RefCell::new(Vec::new());
        fmt::Debug::fmt(&Shown { value: self, path: &path }, f)
    }
}

/// Debug view that prints a container already on `path` as `[Circular]`.
struct Shown<'a> {
    value: &'a Value,
    path: &'a RefCell<Vec<usize>>,
}

impl Shown<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Shown<'b> {
        Shown {
            value,
            path: self.path,
        }
    }

    fn entries(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Array(items) => match items.try_borrow() {
                Ok(items) => f
                    .debug_list()
                    .entries(items.iter().map(|item| self.child(item)))
                    .finish(),
                Err(_) => f.write_str("[Array]"),
            },
            Value::Object(entries) => match entries.try_borrow() {
                Ok(entries) => f
                    .debug_map()
                    .entries(entries.iter().map(|(key, value)| (key, self.child(value))))
                    .finish(),
                Err(_) => f.write_str("[Object]"),
            },
            Value::Namespace(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(key, value)| (key, self.child(value))))
                .finish(),
            Value::Element(element) => f
                .debug_struct("Element")
                .field("type", &self.child(&element.element_type))
                .field("props", &self.child(&element.props))
                .finish(),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Shown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(address) = self.value.container_address() {
            let seen = {
                let path = self.path.borrow();
                path.len() >= MAX_DEPTH || path.contains(&address)
            };
            if seen {
                return f.write_str("[Circular]");
            }
            self.path.borrow_mut().push(address);
            let result = self.entries(f);
            self.path.borrow_mut().pop();
            return result;
        }
        match self.value {
            Value::String(text) => write!(f, "{text:?}"),
            Value::Function(closure) => write!(f, "[Function: {}]", closure.name()),
            Value::Native(native) => write!(f, "[Function: {}]", native.name),
            Value::Scope(registry) => write!(f, "[Scope: {} names]", registry.len()),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::array(Vec::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(Value::Number(3.0).to_display_string(), "3");
        assert_eq!(Value::Number(0.5).to_display_string(), "0.5");
        assert_eq!(Value::Number(-0.0).to_display_string(), "0");
        assert_eq!(
            Value::array(vec![Value::Number(1.0), Value::Null, Value::from("a")]).to_display_string(),
            "1,,a"
        );
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        let object = Value::object([("a", Value::Number(1.0))]);
        assert!(object.strict_equals(&object.clone()));
        assert!(!object.strict_equals(&Value::object([("a", Value::Number(1.0))])));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert!(Value::from("inf").to_number().is_nan());
        assert_eq!(Value::from("0x1f").to_number(), 31.0);
        assert!(Value::from("0x").to_number().is_nan());
        assert_eq!(Value::array(vec![Value::array(vec![Value::from("7")])]).to_number(), 7.0);
    }

    #[test]
    fn test_cyclic_array_conversions() {
        let Value::Array(items) = Value::array(vec![Value::Number(1.0)]) else {
            unreachable!()
        };
        let cyclic = Value::Array(Rc::clone(&items));
        items.borrow_mut().push(cyclic.clone());
        items.borrow_mut().push(cyclic.clone());

        assert_eq!(cyclic.to_display_string(), "1,,");
        assert!(cyclic.to_number().is_nan());
        assert_eq!(format!("{cyclic:?}"), "[1, [Circular], [Circular]]");
        assert_eq!(
            cyclic.to_json().unwrap_err(),
            "Converting circular structure to JSON"
        );

        let single = Value::array(Vec::new());
        let Value::Array(inner) = &single else {
            unreachable!()
        };
        inner.borrow_mut().push(single.clone());
        assert_eq!(single.to_number(), 0.0);
    }

    #[test]
    fn test_shared_values_are_not_circular() {
        let shared = Value::array(vec![Value::Number(2.0)]);
        let value = Value::object([("a", shared.clone()), ("b", shared)]);
        assert_eq!(
            value.to_json().unwrap(),
            Some(serde_json::json!({ "a": [2], "b": [2] }))
        );
    }

    #[test]
    fn test_freeze() {
        let function = Value::native("f", |_, _| Ok(Value::Undefined));
        let object = Value::object([
            ("f", function.clone()),
            ("nested", Value::object([("x", Value::Number(1.0))])),
            ("list", Value::array(vec![Value::object([("y", Value::Null)])])),
        ]);
        let frozen = object.freeze();
        let Value::Namespace(entries) = &frozen else {
            panic!("Expected a namespace");
        };
        assert!(entries["f"].same_reference(&function));
        assert!(matches!(entries["nested"], Value::Namespace(_)));
        let Value::Array(list) = &entries["list"] else {
            panic!("Expected an array");
        };
        assert!(matches!(list.borrow()[0], Value::Namespace(_)));
        assert_eq!(frozen.type_of(), "object");
        assert_eq!(frozen.to_display_string(), "[object Object]");

        let detached = entries["list"].detached();
        assert!(!detached.same_reference(&entries["list"]));
    }

    #[test]
    fn test_json() {
        let value = Value::object([
            ("a", Value::Number(1.0)),
            ("skip", Value::Undefined),
            ("list", Value::array(vec![Value::Boolean(true), Value::Undefined])),
        ]);
        assert_eq!(
            value.to_json().unwrap(),
            Some(serde_json::json!({ "a": 1, "list": [true, null] }))
        );
    }
}
