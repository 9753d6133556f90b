//! Methods of arrays, strings and numbers.
//!
//! A method read (`items.map`) yields a native function bound to its
//! receiver, so it can be called directly or passed around.

use super::interpreter::{Exception, Interpreter};
use super::value::{Array, MAX_LENGTH, Value, number_to_string};
use std::cmp::Ordering;
use std::rc::Rc;

type ArrayMethod = fn(&mut Interpreter, &Array, Vec<Value>) -> Result<Value, Exception>;
type StringMethod = fn(&mut Interpreter, &str, Vec<Value>) -> Result<Value, Exception>;

/// `RangeError` for a string longer than [`MAX_LENGTH`] bytes.
pub fn check_string_length(length: usize) -> Result<(), Exception> {
    if length > MAX_LENGTH {
        return Err(Exception::range_error("Invalid string length"));
    }
    Ok(())
}

/// `RangeError` for an array longer than [`MAX_LENGTH`] elements.
pub fn check_array_length(length: usize) -> Result<(), Exception> {
    if length > MAX_LENGTH {
        return Err(Exception::range_error("Invalid array length"));
    }
    Ok(())
}

/// Enumerable own properties, in insertion order.
pub fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(entries) => entries
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Value::Namespace(entries) => entries
            .iter()
            .map(|(key, value)| (key.clone(), value.detached()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item.clone()))
            .collect(),
        Value::String(text) => text
            .chars()
            .enumerate()
            .map(|(index, character)| (index.to_string(), Value::string(character.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn array_member(items: &Array, key: &str) -> Value {
    if key == "length" {
        return Value::Number(items.borrow().len() as f64);
    }
    if let Ok(index) = key.parse::<usize>() {
        return items.borrow().get(index).cloned().unwrap_or_default();
    }
    let method: ArrayMethod = match key {
        "map" => array_map,
        "filter" => array_filter,
        "forEach" => array_for_each,
        "find" => array_find,
        "findIndex" => array_find_index,
        "some" => array_some,
        "every" => array_every,
        "reduce" => array_reduce,
        "join" => array_join,
        "slice" => array_slice,
        "concat" => array_concat,
        "includes" => array_includes,
        "indexOf" => array_index_of,
        "push" => array_push,
        "pop" => array_pop,
        "reverse" => array_reverse,
        "sort" => array_sort,
        "flat" => array_flat,
        _ => return Value::Undefined,
    };
    let receiver = Rc::clone(items);
    Value::native(key, move |interpreter, arguments| {
        method(interpreter, &receiver, arguments)
    })
}

pub fn string_member(text: &Rc<str>, key: &str) -> Value {
    if key == "length" {
        return Value::Number(text.chars().count() as f64);
    }
    if let Ok(index) = key.parse::<usize>() {
        return text
            .chars()
            .nth(index)
            .map_or(Value::Undefined, |character| Value::string(character.to_string()));
    }
    let method: StringMethod = match key {
        "toUpperCase" => |_, text, _| Ok(Value::string(text.to_uppercase())),
        "toLowerCase" => |_, text, _| Ok(Value::string(text.to_lowercase())),
        "trim" => |_, text, _| Ok(Value::from(text.trim())),
        "trimStart" => |_, text, _| Ok(Value::from(text.trim_start())),
        "trimEnd" => |_, text, _| Ok(Value::from(text.trim_end())),
        "toString" => |_, text, _| Ok(Value::from(text)),
        "split" => string_split,
        "includes" => |_, text, arguments| {
            Ok(Value::Boolean(text.contains(string_argument(&arguments, 0).as_str())))
        },
        "startsWith" => |_, text, arguments| {
            Ok(Value::Boolean(text.starts_with(string_argument(&arguments, 0).as_str())))
        },
        "endsWith" => |_, text, arguments| {
            Ok(Value::Boolean(text.ends_with(string_argument(&arguments, 0).as_str())))
        },
        "indexOf" => |_, text, arguments| {
            let needle = string_argument(&arguments, 0);
            Ok(Value::Number(text.find(needle.as_str()).map_or(-1.0, |byte| {
                text[..byte].chars().count() as f64
            })))
        },
        "slice" => string_slice,
        "substring" => string_slice,
        "charAt" => |_, text, arguments| {
            let index = arguments.first().map_or(0.0, Value::to_number);
            Ok(Value::string(
                text.chars()
                    .nth(index.max(0.0) as usize)
                    .map(String::from)
                    .unwrap_or_default(),
            ))
        },
        "repeat" => |_, text, arguments| {
            let count = arguments.first().map_or(0.0, Value::to_number);
            if count < 0.0 || count.is_infinite() {
                return Err(Exception::range_error(format!(
                    "Invalid count value: {}",
                    number_to_string(count)
                )));
            }
            if text.len() as f64 * count.trunc() > MAX_LENGTH as f64 {
                return Err(Exception::range_error("Invalid string length"));
            }
            Ok(Value::string(text.repeat(count as usize)))
        },
        "padStart" => |_, text, arguments| pad(text, &arguments, true).map(Value::string),
        "padEnd" => |_, text, arguments| pad(text, &arguments, false).map(Value::string),
        "replace" => |interpreter, text, arguments| string_replace(interpreter, text, arguments, false),
        "replaceAll" => |interpreter, text, arguments| string_replace(interpreter, text, arguments, true),
        "concat" => |_, text, arguments| {
            let mut joined = text.to_string();
            for argument in &arguments {
                joined.push_str(&argument.to_display_string());
                check_string_length(joined.len())?;
            }
            Ok(Value::string(joined))
        },
        _ => return Value::Undefined,
    };
    let receiver = Rc::clone(text);
    Value::native(key, move |interpreter, arguments| {
        method(interpreter, &receiver, arguments)
    })
}

pub fn number_member(number: f64, key: &str) -> Value {
    match key {
        "toFixed" => Value::native(key, move |_, arguments| {
            let digits = arguments.first().map_or(0.0, Value::to_number);
            if !(0.0..=100.0).contains(&digits) {
                return Err(Exception::range_error("toFixed() digits argument must be between 0 and 100"));
            }
            Ok(Value::string(format!("{:.*}", digits as usize, number)))
        }),
        "toString" | "toLocaleString" => {
            Value::native(key, move |_, _| Ok(Value::string(number_to_string(number))))
        }
        _ => Value::Undefined,
    }
}

fn string_argument(arguments: &[Value], index: usize) -> String {
    arguments
        .get(index)
        .map_or_else(|| "undefined".to_string(), Value::to_display_string)
}

fn callback(arguments: &[Value]) -> Result<Value, Exception> {
    match arguments.first() {
        Some(function) if function.is_callable() => Ok(function.clone()),
        other => Err(Exception::type_error(format!(
            "{} is not a function",
            other.map_or_else(|| "undefined".to_string(), Value::describe)
        ))),
    }
}

/// Clamp a relative index argument into `0..=length`.
fn relative_index(argument: Option<&Value>, length: usize, default: usize) -> usize {
    let Some(argument) = argument.filter(|argument| !matches!(argument, Value::Undefined)) else {
        return default;
    };
    let index = argument.to_number();
    if index.is_nan() {
        0
    } else if index < 0.0 {
        (length as f64 + index.trunc()).max(0.0) as usize
    } else {
        (index.trunc() as usize).min(length)
    }
}

fn snapshot(items: &Array) -> Vec<Value> {
    items.borrow().clone()
}

/// Call `function(item, index, array)` for each element until `visit` says stop.
fn each_with(
    interpreter: &mut Interpreter,
    items: &Array,
    function: &Value,
    mut visit: impl FnMut(usize, Value, Value) -> bool,
) -> Result<(), Exception> {
    let array = Value::Array(Rc::clone(items));
    for (index, item) in snapshot(items).into_iter().enumerate() {
        let result = interpreter.call(
            function,
            vec![item.clone(), Value::Number(index as f64), array.clone()],
        )?;
        if !visit(index, item, result) {
            break;
        }
    }
    Ok(())
}

fn array_map(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let mut mapped = Vec::new();
    each_with(interpreter, items, &function, |_, _, result| {
        mapped.push(result);
        true
    })?;
    Ok(Value::array(mapped))
}

fn array_filter(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let mut kept = Vec::new();
    each_with(interpreter, items, &function, |_, item, result| {
        if result.is_truthy() {
            kept.push(item);
        }
        true
    })?;
    Ok(Value::array(kept))
}

fn array_for_each(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    each_with(interpreter, items, &function, |_, _, _| true)?;
    Ok(Value::Undefined)
}

fn array_find(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let mut found = Value::Undefined;
    each_with(interpreter, items, &function, |_, item, result| {
        if result.is_truthy() {
            found = item;
            return false;
        }
        true
    })?;
    Ok(found)
}

fn array_find_index(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let mut found = -1.0;
    each_with(interpreter, items, &function, |index, _, result| {
        if result.is_truthy() {
            found = index as f64;
            return false;
        }
        true
    })?;
    Ok(Value::Number(found))
}

fn array_some(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let mut any = false;
    each_with(interpreter, items, &function, |_, _, result| {
        any = result.is_truthy();
        !any
    })?;
    Ok(Value::Boolean(any))
}

fn array_every(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let mut all = true;
    each_with(interpreter, items, &function, |_, _, result| {
        all = result.is_truthy();
        all
    })?;
    Ok(Value::Boolean(all))
}

fn array_reduce(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let function = callback(&arguments)?;
    let array = Value::Array(Rc::clone(items));
    let mut elements = snapshot(items).into_iter().enumerate();
    let mut accumulator = match arguments.get(1) {
        Some(initial) => initial.clone(),
        None => match elements.next() {
            Some((_, first)) => first,
            None => {
                return Err(Exception::type_error(
                    "Reduce of empty array with no initial value",
                ));
            }
        },
    };
    for (index, item) in elements {
        accumulator = interpreter.call(
            &function,
            vec![accumulator, item, Value::Number(index as f64), array.clone()],
        )?;
    }
    Ok(accumulator)
}

fn array_join(
    _: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let separator = match arguments.first() {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(separator) => separator.to_display_string(),
    };
    let mut joined = String::new();
    for (index, item) in items.borrow().iter().enumerate() {
        if index > 0 {
            joined.push_str(&separator);
        }
        if !item.is_nullish() {
            joined.push_str(&item.to_display_string());
        }
        check_string_length(joined.len())?;
    }
    Ok(Value::string(joined))
}

fn array_slice(
    _: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let items = items.borrow();
    let start = relative_index(arguments.first(), items.len(), 0);
    let end = relative_index(arguments.get(1), items.len(), items.len());
    Ok(Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec()))
}

fn array_concat(
    _: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let mut joined = snapshot(items);
    for argument in arguments {
        match argument {
            Value::Array(other) => {
                check_array_length(joined.len() + other.borrow().len())?;
                joined.extend(snapshot(&other));
            }
            other => joined.push(other),
        }
    }
    Ok(Value::array(joined))
}

fn array_includes(
    _: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let needle = arguments.into_iter().next().unwrap_or_default();
    let found = items.borrow().iter().any(|item| {
        item.strict_equals(&needle)
            || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
    });
    Ok(Value::Boolean(found))
}

fn array_index_of(
    _: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let needle = arguments.into_iter().next().unwrap_or_default();
    let position = items.borrow().iter().position(|item| item.strict_equals(&needle));
    Ok(Value::Number(position.map_or(-1.0, |index| index as f64)))
}

fn array_push(
    _: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let mut items = items.borrow_mut();
    check_array_length(items.len() + arguments.len())?;
    items.extend(arguments);
    Ok(Value::Number(items.len() as f64))
}

fn array_pop(
    _: &mut Interpreter,
    items: &Array,
    _: Vec<Value>,
) -> Result<Value, Exception> {
    Ok(items.borrow_mut().pop().unwrap_or_default())
}

fn array_reverse(
    _: &mut Interpreter,
    items: &Array,
    _: Vec<Value>,
) -> Result<Value, Exception> {
    items.borrow_mut().reverse();
    Ok(Value::Array(Rc::clone(items)))
}

fn array_sort(
    interpreter: &mut Interpreter,
    items: &Array,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let mut sorted = snapshot(items);
    match arguments.first().filter(|comparator| comparator.is_callable()) {
        Some(comparator) => {
            let mut failure = None;
            sorted.sort_by(|left, right| {
                if failure.is_some() {
                    return Ordering::Equal;
                }
                match interpreter.call(comparator, vec![left.clone(), right.clone()]) {
                    Ok(order) => order
                        .to_number()
                        .partial_cmp(&0.0)
                        .unwrap_or(Ordering::Equal),
                    Err(exception) => {
                        failure = Some(exception);
                        Ordering::Equal
                    }
                }
            });
            if let Some(exception) = failure {
                return Err(exception);
            }
        }
        // undefined sorts last, everything else by string
        None => sorted.sort_by(|left, right| match (left, right) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Undefined, _) => Ordering::Greater,
            (_, Value::Undefined) => Ordering::Less,
            _ => left.to_display_string().cmp(&right.to_display_string()),
        }),
    }
    *items.borrow_mut() = sorted;
    Ok(Value::Array(Rc::clone(items)))
}

fn array_flat(
    _: &mut Interpreter,
    items: &Array,
    _: Vec<Value>,
) -> Result<Value, Exception> {
    let mut flattened = Vec::new();
    for item in snapshot(items) {
        match item {
            Value::Array(inner) => {
                check_array_length(flattened.len() + inner.borrow().len())?;
                flattened.extend(snapshot(&inner));
            }
            other => flattened.push(other),
        }
    }
    Ok(Value::array(flattened))
}

fn string_split(
    _: &mut Interpreter,
    text: &str,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let parts = match arguments.first() {
        None | Some(Value::Undefined) => vec![Value::from(text)],
        Some(separator) => {
            let separator = separator.to_display_string();
            if separator.is_empty() {
                text.chars()
                    .map(|character| Value::string(character.to_string()))
                    .collect()
            } else {
                text.split(separator.as_str()).map(Value::from).collect()
            }
        }
    };
    Ok(Value::array(parts))
}

fn string_slice(
    _: &mut Interpreter,
    text: &str,
    arguments: Vec<Value>,
) -> Result<Value, Exception> {
    let characters: Vec<char> = text.chars().collect();
    let start = relative_index(arguments.first(), characters.len(), 0);
    let end = relative_index(arguments.get(1), characters.len(), characters.len());
    Ok(Value::string(
        characters
            .get(start..end.max(start))
            .unwrap_or_default()
            .iter()
            .collect::<String>(),
    ))
}

fn string_replace(
    interpreter: &mut Interpreter,
    text: &str,
    arguments: Vec<Value>,
    all: bool,
) -> Result<Value, Exception> {
    let pattern = string_argument(&arguments, 0);
    let replacement = arguments.get(1).cloned().unwrap_or_default();
    let mut result = String::new();
    let mut rest = text;
    while let Some(position) = rest.find(pattern.as_str()) {
        result.push_str(&rest[..position]);
        let substitute = if replacement.is_callable() {
            interpreter
                .call(&replacement, vec![Value::from(pattern.as_str())])?
                .to_display_string()
        } else {
            replacement.to_display_string()
        };
        result.push_str(&substitute);
        check_string_length(result.len())?;
        rest = &rest[position + pattern.len()..];
        if !all || pattern.is_empty() {
            break;
        }
    }
    result.push_str(rest);
    Ok(Value::string(result))
}

fn pad(text: &str, arguments: &[Value], start: bool) -> Result<String, Exception> {
    let target = arguments.first().map_or(0.0, Value::to_number).max(0.0);
    let filler = match arguments.get(1) {
        None | Some(Value::Undefined) => " ".to_string(),
        Some(filler) => filler.to_display_string(),
    };
    let length = text.chars().count();
    if target <= length as f64 || filler.is_empty() {
        return Ok(text.to_string());
    }
    if target > MAX_LENGTH as f64 {
        return Err(Exception::range_error("Invalid string length"));
    }
    let padding: String = filler.chars().cycle().take(target as usize - length).collect();
    check_string_length(text.len() + padding.len())?;
    Ok(if start {
        padding + text
    } else {
        text.to_string() + &padding
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::interpreter::Environment;
    use crate::parser::parse_unit;

    fn run(code: &str) -> Value {
        let statements = parse_unit(code).unwrap();
        Interpreter::new(32)
            .run_body(&statements, &Environment::root())
            .unwrap()
    }

    fn text(code: &str) -> String {
        run(code).to_display_string()
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(text("return [1, 2, 3].map((n) => n * 2).join('-');"), "2-4-6");
        assert_eq!(text("return [1, 2, 3, 4].filter((n) => n % 2 === 0);"), "2,4");
        assert_eq!(text("return [1, 2, 3].reduce((sum, n) => sum + n, 0);"), "6");
        assert_eq!(text("return [5, 1, 10].sort((a, b) => a - b);"), "1,5,10");
        assert_eq!(text("return [5, 1, 10].sort();"), "1,10,5");
        assert_eq!(text("return [1, 2, 3, 4].slice(1, -1);"), "2,3");
        assert_eq!(text("return [[1, 2], 3].flat().length;"), "3");
        assert_eq!(text("return ['a', 'b'].indexOf('b');"), "1");
        assert_eq!(text("return [1, 2].find((n) => n > 5);"), "undefined");
    }

    #[test]
    fn test_push_mutates_receiver() {
        assert_eq!(text("const list = [1]; list.push(2, 3); return list;"), "1,2,3");
    }

    #[test]
    fn test_detached_method_keeps_receiver() {
        assert_eq!(text("const list = [1, 2]; const join = list.join; return join('+');"), "1+2");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(text("return ' Hi '.trim().toUpperCase();"), "HI");
        assert_eq!(text("return 'a,b,c'.split(',').length;"), "3");
        assert_eq!(text("return 'hello'.slice(1, 3);"), "el");
        assert_eq!(text("return '7'.padStart(3, '0');"), "007");
        assert_eq!(text("return 'a-b-c'.replaceAll('-', '+');"), "a+b+c");
        assert_eq!(text("return 'a-b-c'.replace('-', '+');"), "a+b-c");
        assert_eq!(text("return 'héllo'.length;"), "5");
    }

    #[test]
    fn test_oversized_strings_throw_range_error() {
        for code in [
            "'x'.repeat(1e19);",
            "'ab'.repeat(16777216);",
            "'x'.padStart(1e12);",
            "'x'.padEnd(2e7, 'yz');",
            "let s = 'xxxxxxxxxxxxxxxx'; for (const i of 'abcdefghijklmnopqrstuvwxyz') { s = s + s; }",
        ] {
            let statements = parse_unit(code).unwrap();
            let exception = Interpreter::new(8)
                .run_body(&statements, &Environment::root())
                .unwrap_err();
            assert_eq!(
                exception.to_runtime_error().to_string(),
                "RangeError: Invalid string length",
                "{code}"
            );
        }
        assert_eq!(text("return 'ab'.repeat(3);"), "ababab");
    }

    #[test]
    fn test_oversized_arrays_throw_range_error() {
        for code in [
            "const a = []; a[1e15] = 1;",
            "const a = []; a.length = 1073741824;",
            "let a = [1]; for (const i of 'abcdefghijklmnopqrstuvwxyz') { a = a.concat(a); }",
            "let a = [1]; for (const i of 'abcdefghijklmnopqrstuvwxyz') { a = [...a, ...a]; }",
        ] {
            let statements = parse_unit(code).unwrap();
            let exception = Interpreter::new(8)
                .run_body(&statements, &Environment::root())
                .unwrap_err();
            assert_eq!(
                exception.to_runtime_error().to_string(),
                "RangeError: Invalid array length",
                "{code}"
            );
        }
        assert_eq!(text("const a = [1]; a[3] = 4; return a.length;"), "4");
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(text("return (3.14159).toFixed(2);"), "3.14");
        assert_eq!(text("const n = 42; return n.toString();"), "42");
    }

    #[test]
    fn test_callback_must_be_function() {
        let statements = parse_unit("[1].map(3);").unwrap();
        let exception = Interpreter::new(8)
            .run_body(&statements, &Environment::root())
            .unwrap_err();
        assert_eq!(exception.to_runtime_error().message, "number is not a function");
    }
}
