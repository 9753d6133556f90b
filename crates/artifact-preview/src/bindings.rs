//! Host bindings offered to sandboxed components.
//!
//! Nothing here is ambient: every value reaches a component only through a
//! [`BindingSet`] merged into the [`CapabilityRegistry`].

use crate::error::RegistryError;
use crate::registry::{BindingSet, CapabilityRegistry, CollisionPolicy, RegistryBuilder};
use crate::sandbox::{Element, Exception, Interpreter, Value, own_entries, set_member};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Description of the fragment marker symbol.
pub const FRAGMENT: &str = "react.fragment";

/// `React`, plus its members as top-level names.
pub fn react() -> BindingSet {
    let fragment = Value::symbol(FRAGMENT);
    let members = [
        ("createElement", Value::native("createElement", function_create_element)),
        ("Fragment", fragment),
        ("useState", Value::native("useState", function_use_state)),
        ("useEffect", Value::native("useEffect", function_use_effect)),
        ("useRef", Value::native("useRef", function_use_ref)),
        ("useMemo", Value::native("useMemo", function_use_memo)),
        ("useCallback", Value::native("useCallback", function_use_callback)),
    ];

    let mut set = BindingSet::new("react");
    set.insert("React", Value::object(members.iter().cloned()));
    for (name, value) in members {
        set.insert(name, value);
    }
    set
}

/// Standard library subset: `Math`, `JSON`, `Object`, `Array`, conversions and `console`.
pub fn language() -> BindingSet {
    BindingSet::new("language")
        .with("Math", math())
        .with(
            "JSON",
            Value::object([
                ("stringify", Value::native("stringify", function_json_stringify)),
                ("parse", Value::native("parse", function_json_parse)),
            ]),
        )
        .with(
            "Object",
            Value::object([
                ("keys", Value::native("keys", function_object_keys)),
                ("values", Value::native("values", function_object_values)),
                ("entries", Value::native("entries", function_object_entries)),
                ("assign", Value::native("assign", function_object_assign)),
            ]),
        )
        .with(
            "Array",
            Value::object([
                ("isArray", Value::native("isArray", |_, arguments| {
                    Ok(Value::Boolean(matches!(first(&arguments), Value::Array(_))))
                })),
                ("from", Value::native("from", function_array_from)),
            ]),
        )
        .with("Error", Value::native("Error", |_, arguments| {
            let message = match first(&arguments) {
                Value::Undefined => String::new(),
                message => message.to_display_string(),
            };
            Ok(Exception::error("Error", message).value)
        }))
        .with("String", Value::native("String", |_, arguments| {
            Ok(match arguments.first() {
                Some(value) => Value::from(value.to_display_string()),
                None => Value::from(""),
            })
        }))
        .with("Number", Value::native("Number", |_, arguments| {
            Ok(Value::Number(arguments.first().map_or(0.0, Value::to_number)))
        }))
        .with("Boolean", Value::native("Boolean", |_, arguments| {
            Ok(Value::Boolean(first(&arguments).is_truthy()))
        }))
        .with("parseInt", Value::native("parseInt", function_parse_int))
        .with("parseFloat", Value::native("parseFloat", function_parse_float))
        .with("NaN", Value::Number(f64::NAN))
        .with("Infinity", Value::Number(f64::INFINITY))
        .with("console", console())
}

/// Registry with [`language`] and [`react`], `React` pinned.
pub fn default_registry(collisions: CollisionPolicy) -> Result<CapabilityRegistry, RegistryError> {
    let react = react();
    let pinned = react.get("React").cloned().unwrap_or_default();
    RegistryBuilder::new()
        .collisions(collisions)
        .merge(language())
        .merge(react)
        .pin("React", pinned)
        .build()
}

fn first(arguments: &[Value]) -> &Value {
    arguments.first().unwrap_or(&Value::Undefined)
}

fn argument(arguments: &[Value], index: usize) -> Value {
    arguments.get(index).cloned().unwrap_or_default()
}

/// createElement(type, props, ...children) -> Element
///
/// `key` is lifted out of the props; one child is stored as-is, several as an array.
pub fn function_create_element(
    _: &mut Interpreter,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let mut arguments = arguments.into_iter();
    let element_type = arguments.next().unwrap_or_default();
    let config = arguments.next().unwrap_or_default();
    let mut children: Vec<Value> = arguments.collect();

    let mut props = IndexMap::new();
    let mut key = None;
    for (name, value) in own_entries(&config) {
        if name == "key" {
            key = (!value.is_nullish()).then(|| value.to_display_string());
        } else {
            props.insert(name, value);
        }
    }
    match children.len() {
        0 => {}
        1 => {
            props.insert("children".to_string(), children.remove(0));
        }
        _ => {
            props.insert("children".to_string(), Value::array(children));
        }
    }

    Ok(Value::Element(Rc::new(Element {
        element_type,
        props: Value::Object(Rc::new(RefCell::new(props))),
        key,
    })))
}

/// useState(initial) -> [value, setValue]
///
/// Rendering is a single pass, so the setter only logs.
fn function_use_state(
    interpreter: &mut Interpreter,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let initial = first(&arguments);
    let value = if initial.is_callable() {
        interpreter.call(initial, Vec::new())?
    } else {
        initial.clone()
    };
    let setter = Value::native("setState", |_, _| {
        log::debug!("State update ignored during static render");
        Ok(Value::Undefined)
    });
    Ok(Value::array(vec![value, setter]))
}

/// useEffect(effect, dependencies) -> undefined
///
/// Effects never run in a static render.
fn function_use_effect(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    if !first(&arguments).is_callable() {
        return Err(Exception::type_error("useEffect expects a function"));
    }
    Ok(Value::Undefined)
}

/// useRef(initial) -> { current }
fn function_use_ref(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    Ok(Value::object([("current", argument(&arguments, 0))]))
}

/// useMemo(factory, dependencies) -> factory()
fn function_use_memo(
    interpreter: &mut Interpreter,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    interpreter.call(first(&arguments), Vec::new())
}

/// useCallback(callback, dependencies) -> callback
fn function_use_callback(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    Ok(argument(&arguments, 0))
}

fn math() -> Value {
    fn unary(name: &'static str, operation: fn(f64) -> f64) -> (&'static str, Value) {
        (
            name,
            Value::native(name, move |_, arguments| {
                Ok(Value::Number(operation(first(&arguments).to_number())))
            }),
        )
    }

    fn fold(name: &'static str, start: f64, operation: fn(f64, f64) -> f64) -> (&'static str, Value) {
        (
            name,
            Value::native(name, move |_, arguments| {
                Ok(Value::Number(arguments.iter().fold(start, |result, value| {
                    let number = value.to_number();
                    if result.is_nan() || number.is_nan() {
                        f64::NAN
                    } else {
                        operation(result, number)
                    }
                })))
            }),
        )
    }

    Value::object([
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        unary("abs", f64::abs),
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("round", |number| (number + 0.5).floor()),
        unary("trunc", f64::trunc),
        unary("sqrt", f64::sqrt),
        unary("sign", |number| {
            if number.is_nan() || number == 0.0 {
                number
            } else {
                number.signum()
            }
        }),
        fold("min", f64::INFINITY, f64::min),
        fold("max", f64::NEG_INFINITY, f64::max),
        (
            "pow",
            Value::native("pow", |_, arguments| {
                let base = first(&arguments).to_number();
                let exponent = argument(&arguments, 1).to_number();
                Ok(Value::Number(base.powf(exponent)))
            }),
        ),
    ])
}

/// JSON.stringify(value, replacer, indent) -> String | undefined
fn function_json_stringify(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let Some(json) = first(&arguments).to_json().map_err(Exception::type_error)? else {
        return Ok(Value::Undefined);
    };
    let indent = argument(&arguments, 2).to_number();
    let text = if indent >= 1.0 {
        let indent = " ".repeat(indent.min(10.0) as usize);
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        serde::Serialize::serialize(&json, &mut serializer)
            .map_err(|error| Exception::type_error(error.to_string()))?;
        String::from_utf8_lossy(&buffer).into_owned()
    } else {
        json.to_string()
    };
    Ok(Value::from(text))
}

/// JSON.parse(text) -> Value
fn function_json_parse(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let text = first(&arguments).to_display_string();
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|json| Value::from_json(&json))
        .map_err(|error| Exception::syntax_error(format!("JSON.parse: {error}")))
}

fn object_argument(arguments: &[Value]) -> Result<&Value, Exception> {
    let value = first(arguments);
    if value.is_nullish() {
        return Err(Exception::type_error(format!(
            "Cannot convert {} to object",
            value.describe()
        )));
    }
    Ok(value)
}

/// Object.keys(object) -> Array<String>
fn function_object_keys(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let entries = own_entries(object_argument(&arguments)?);
    Ok(Value::array(
        entries.into_iter().map(|(key, _)| Value::from(key)).collect(),
    ))
}

/// Object.values(object) -> Array
fn function_object_values(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let entries = own_entries(object_argument(&arguments)?);
    Ok(Value::array(entries.into_iter().map(|(_, value)| value).collect()))
}

/// Object.entries(object) -> Array<[String, value]>
fn function_object_entries(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let entries = own_entries(object_argument(&arguments)?);
    Ok(Value::array(
        entries
            .into_iter()
            .map(|(key, value)| Value::array(vec![Value::from(key), value]))
            .collect(),
    ))
}

/// Object.assign(target, ...sources) -> target
fn function_object_assign(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let target = object_argument(&arguments)?.clone();
    for source in arguments.iter().skip(1) {
        for (key, value) in own_entries(source) {
            set_member(&target, &key, value)?;
        }
    }
    Ok(target)
}

/// Array.from(iterable, mapper) -> Array
fn function_array_from(
    interpreter: &mut Interpreter,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let Some(items) = array_like(first(&arguments)) else {
        return Ok(Value::array(Vec::new()));
    };
    let mapper = argument(&arguments, 1);
    if mapper.is_nullish() {
        return Ok(Value::array(items));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        mapped.push(interpreter.call(&mapper, vec![item, Value::Number(index as f64)])?);
    }
    Ok(Value::array(mapped))
}

/// Iterable elements, or `length` undefined slots for `{ length: n }`.
fn array_like(value: &Value) -> Option<Vec<Value>> {
    if let Some(items) = value.iterate() {
        return Some(items);
    }
    let Value::Object(entries) = value else {
        return None;
    };
    let length = entries.borrow().get("length")?.to_number();
    if !(0.0..=1_000_000.0).contains(&length) {
        return None;
    }
    Some(vec![Value::Undefined; length as usize])
}

/// parseInt(text, radix) -> Number
fn function_parse_int(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let text = first(&arguments).to_display_string();
    let mut text = text.trim_start();
    let negative = text.starts_with('-');
    text = text.strip_prefix(['-', '+']).unwrap_or(text);

    let radix_argument = argument(&arguments, 1);
    let mut radix = if radix_argument.is_nullish() {
        0
    } else {
        radix_argument.to_number() as u32
    };
    let hex = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"));
    if let Some(hex) = hex.filter(|_| radix == 0 || radix == 16) {
        text = hex;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }

    let digits: Vec<u32> = text.chars().map_while(|digit| digit.to_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let number = digits
        .into_iter()
        .fold(0.0, |total, digit| total * f64::from(radix) + f64::from(digit));
    Ok(Value::Number(if negative { -number } else { number }))
}

/// parseFloat(text) -> Number, reading the longest numeric prefix.
fn function_parse_float(_: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, Exception> {
    let text = first(&arguments).to_display_string();
    let text = text.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if text.starts_with(prefix) {
            return Ok(Value::Number(f64::INFINITY));
        }
    }
    if text.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }
    let number = (1..=text.len())
        .rev()
        .filter(|end| text.is_char_boundary(*end))
        .find_map(|end| {
            let candidate = &text[..end];
            let plain = candidate
                .chars()
                .all(|character| character.is_ascii_digit() || "+-.eE".contains(character));
            plain.then(|| candidate.parse::<f64>().ok()).flatten()
        })
        .unwrap_or(f64::NAN);
    Ok(Value::Number(number))
}

fn console() -> Value {
    fn line(arguments: &[Value]) -> String {
        arguments
            .iter()
            .map(Value::to_display_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    Value::object([
        ("log", Value::native("log", |_, arguments| {
            log::info!("[console] {}", line(&arguments));
            Ok(Value::Undefined)
        })),
        ("info", Value::native("info", |_, arguments| {
            log::info!("[console] {}", line(&arguments));
            Ok(Value::Undefined)
        })),
        ("warn", Value::native("warn", |_, arguments| {
            log::warn!("[console] {}", line(&arguments));
            Ok(Value::Undefined)
        })),
        ("error", Value::native("error", |_, arguments| {
            log::error!("[console] {}", line(&arguments));
            Ok(Value::Undefined)
        })),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unit;
    use crate::sandbox::{Environment, get_member};

    fn evaluate(code: &str) -> Result<Value, Exception> {
        let registry = Rc::new(default_registry(CollisionPolicy::Reject).unwrap());
        let environment = Environment::root();
        for name in registry.names() {
            environment
                .declare(
                    name,
                    registry.get(name).cloned().unwrap_or_default(),
                    crate::parser::DeclarationKind::Const,
                )
                .unwrap();
        }
        let statements = parse_unit(code).unwrap();
        Interpreter::new(32).run_body(&statements, &environment)
    }

    fn run(code: &str) -> Value {
        evaluate(code).unwrap()
    }

    #[test]
    fn test_default_registry_has_no_collisions() {
        let registry = default_registry(CollisionPolicy::Reject).unwrap();
        assert!(registry.contains("React"));
        assert!(registry.contains("useState"));
        assert!(registry.contains("Math"));
        assert_eq!(registry.origin("React"), Some("pinned"));
        assert_eq!(registry.origin("JSON"), Some("language"));
    }

    #[test]
    fn test_create_element_props_and_children() {
        let Value::Element(element) =
            run("return createElement('li', { key: 7, id: 'a' }, 'one', 'two');")
        else {
            panic!("Expected element");
        };
        assert_eq!(element.key.as_deref(), Some("7"));
        assert_eq!(get_member(&element.props, "id").unwrap().to_display_string(), "a");
        assert!(get_member(&element.props, "key").unwrap().is_nullish());
        let children = get_member(&element.props, "children").unwrap();
        assert_eq!(children.iterate().map(|items| items.len()), Some(2));
    }

    #[test]
    fn test_single_child_is_not_wrapped() {
        let value = run("return React.createElement('p', null, 'only').props.children;");
        assert_eq!(value.to_display_string(), "only");
    }

    #[test]
    fn test_fragment_identity_is_shared() {
        assert!(run("return React.Fragment === Fragment;").is_truthy());
    }

    #[test]
    fn test_hooks() {
        let value = run(
            "const [count, setCount] = useState(() => 3);
             setCount(4);
             const ref = useRef(null);
             const doubled = useMemo(() => count * 2, [count]);
             useEffect(() => {}, []);
             return [count, ref.current, doubled];",
        );
        assert_eq!(value.to_display_string(), "3,,6");
    }

    #[test]
    fn test_language_prelude() {
        assert_eq!(run("return Math.max(1, 5, 3);").to_number(), 5.0);
        assert_eq!(run("return Math.round(2.5);").to_number(), 3.0);
        assert_eq!(run("return parseInt('42px');").to_number(), 42.0);
        assert_eq!(run("return parseInt('ff', 16);").to_number(), 255.0);
        assert_eq!(run("return parseFloat('3.5em');").to_number(), 3.5);
        assert_eq!(
            run("return Object.keys({ a: 1, b: 2 }).join('-');").to_display_string(),
            "a-b"
        );
        assert_eq!(
            run("return JSON.stringify({ a: [1, 'x'], f: () => 1 });").to_display_string(),
            "{\"a\":[1,\"x\"]}"
        );
        assert_eq!(run("return JSON.parse('{\"n\": 2}').n;").to_number(), 2.0);
        assert_eq!(
            run("return Array.from({ length: 3 }, (_, i) => i * i).join();").to_display_string(),
            "0,1,4"
        );
    }

    #[test]
    fn test_namespaces_are_read_only() {
        assert_eq!(run("return Object.keys(JSON).join();").to_display_string(), "stringify,parse");
        assert_eq!(run("return typeof Math;").to_display_string(), "object");
        assert_eq!(
            run("const copy = { ...Math }; copy.PI = 3; return [copy.PI, Math.PI > 3];")
                .to_display_string(),
            "3,true"
        );
        for code in [
            "Math.PI = 3;",
            "React.useState = null;",
            "Object.assign(JSON, { parse: () => 1 });",
        ] {
            let error = evaluate(code).unwrap_err().to_runtime_error();
            assert_eq!(error.name, "TypeError", "{code}");
            assert!(error.message.starts_with("Cannot assign to read only property"));
        }
        assert_eq!(run("return JSON.parse('2');").to_number(), 2.0);
    }

    #[test]
    fn test_error_values() {
        let value = run("return new Error('boom');");
        assert_eq!(get_member(&value, "message").unwrap().to_display_string(), "boom");
        assert_eq!(get_member(&value, "name").unwrap().to_display_string(), "Error");
    }
}
