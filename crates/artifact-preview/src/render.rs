//! Presents the controller's phase: placeholder, diagnostic panel or live view.
//!
//! A compiled component is mounted under a [`CrashBoundary`]. The first
//! failure while rendering a mount replaces its output for the rest of that
//! mount's lifetime and is reported back to the [`LifecycleController`].

use crate::bindings::FRAGMENT;
use crate::config::RenderConfig;
use crate::error::{PreviewError, RuntimeError};
use crate::lifecycle::{AttemptToken, LifecycleController, Phase};
use crate::sandbox::{CompiledArtifact, Element, Interpreter, Value, own_entries};
use serde::Serialize;
use std::rc::Rc;

const VOID_ELEMENTS: [&str; 8] = ["area", "br", "col", "hr", "img", "input", "meta", "wbr"];

/// Style properties whose numbers are written without a `px` unit.
const UNITLESS_STYLES: [&str; 9] = [
    "flex",
    "flexGrow",
    "flexShrink",
    "fontWeight",
    "lineHeight",
    "opacity",
    "order",
    "zIndex",
    "zoom",
];

/// Host view tree: intrinsic elements and text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<View>,
    },
    Text(String),
}

impl View {
    pub fn element(
        tag: impl Into<String>,
        attributes: Vec<(String, String)>,
        children: Vec<View>,
    ) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes,
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        self.write_html(&mut html);
        html
    }

    fn write_html(&self, html: &mut String) {
        match self {
            Self::Text(text) => html.push_str(&escape_html(text, false)),
            Self::Element {
                tag,
                attributes,
                children,
            } if is_markup_name(tag) => {
                html.push('<');
                html.push_str(tag);
                for (name, value) in attributes {
                    if !is_markup_name(name) {
                        continue;
                    }
                    html.push(' ');
                    html.push_str(name);
                    html.push_str("=\"");
                    html.push_str(&escape_html(value, true));
                    html.push('"');
                }
                html.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(html);
                }
                html.push_str("</");
                html.push_str(tag);
                html.push('>');
            }
            Self::Element { children, .. } => {
                for child in children {
                    child.write_html(html);
                }
            }
        }
    }
}

fn escape_html(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// The reconciliation engine seam: turns an artifact into a view.
pub trait Renderer {
    fn render(&mut self, artifact: &CompiledArtifact) -> Result<View, RuntimeError>;
}

/// Static renderer: invokes the component once and expands the element tree.
#[derive(Debug, Clone)]
pub struct TreeRenderer {
    max_depth: usize,
}

impl TreeRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_depth: config.max_depth,
        }
    }

    /// `arrays` holds the child arrays being expanded, outermost first.
    fn expand(
        &self,
        interpreter: &mut Interpreter,
        value: &Value,
        depth: usize,
        arrays: &mut Vec<usize>,
        output: &mut Vec<View>,
    ) -> Result<(), RuntimeError> {
        if depth > self.max_depth {
            return Err(RuntimeError::range_error("Maximum render depth exceeded"));
        }
        match value {
            Value::Undefined | Value::Null | Value::Boolean(_) => {}
            Value::Number(_) | Value::String(_) => output.push(View::text(value.to_display_string())),
            Value::Array(items) => {
                let address = Rc::as_ptr(items) as usize;
                if arrays.contains(&address) {
                    return Err(RuntimeError::type_error(
                        "Children contain an array that includes itself",
                    ));
                }
                arrays.push(address);
                let items = items.borrow().clone();
                for item in &items {
                    self.expand(interpreter, item, depth + 1, arrays, output)?;
                }
                arrays.pop();
            }
            Value::Element(element) => {
                self.expand_element(interpreter, element, depth, arrays, output)?
            }
            Value::Function(_) | Value::Native(_) => {
                log::warn!("Functions are not valid as a child; skipping");
            }
            Value::Object(_) | Value::Namespace(_) => {
                let keys = own_entries(value)
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(RuntimeError::type_error(format!(
                    "Objects are not valid as a child (found: object with keys {{{keys}}})"
                )));
            }
            Value::Symbol(_) | Value::Scope(_) => {
                return Err(RuntimeError::type_error(format!(
                    "{} is not valid as a child",
                    value.describe()
                )));
            }
        }
        Ok(())
    }

    fn expand_element(
        &self,
        interpreter: &mut Interpreter,
        element: &Element,
        depth: usize,
        arrays: &mut Vec<usize>,
        output: &mut Vec<View>,
    ) -> Result<(), RuntimeError> {
        match &element.element_type {
            Value::String(tag) => {
                if !is_markup_name(tag) {
                    return Err(RuntimeError::type_error(format!(
                        "Invalid tag name: {tag:?}"
                    )));
                }
                let mut children = Vec::new();
                let mut attributes = Vec::new();
                for (name, value) in own_entries(&element.props) {
                    if name == "children" {
                        self.expand(interpreter, &value, depth + 1, arrays, &mut children)?;
                    } else if let Some(attribute) = attribute(&name, &value) {
                        attributes.push(attribute);
                    }
                }
                output.push(View::element(tag.to_string(), attributes, children));
            }
            Value::Symbol(description) if &**description == FRAGMENT => {
                let children = crate::sandbox::get_member(&element.props, "children")?;
                self.expand(interpreter, &children, depth + 1, arrays, output)?;
            }
            component @ (Value::Function(_) | Value::Native(_)) => {
                let rendered = interpreter.call(component, vec![element.props.clone()])?;
                self.expand(interpreter, &rendered, depth + 1, arrays, output)?;
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "Element type is invalid: expected a string or a component but got: {}",
                    other.describe()
                )));
            }
        }
        Ok(())
    }
}

impl Renderer for TreeRenderer {
    fn render(&mut self, artifact: &CompiledArtifact) -> Result<View, RuntimeError> {
        let mut interpreter = artifact.interpreter();
        let props = Value::object(std::iter::empty::<(String, Value)>());
        let rendered = interpreter.call(artifact.component(), vec![props])?;

        let mut views = Vec::new();
        self.expand(&mut interpreter, &rendered, 0, &mut Vec::new(), &mut views)?;
        Ok(match views.len() {
            1 => views.remove(0),
            _ => View::element("div", Vec::new(), views),
        })
    }
}

/// HTML attribute for a prop, or `None` when the prop is not rendered.
fn attribute(name: &str, value: &Value) -> Option<(String, String)> {
    let name = match name {
        "key" | "ref" | "dangerouslySetInnerHTML" => return None,
        "className" => "class".to_string(),
        "htmlFor" => "for".to_string(),
        other if is_markup_name(other) => other.to_string(),
        other => {
            log::warn!("Skipping prop with invalid attribute name {other:?}");
            return None;
        }
    };
    let value = match value {
        Value::Undefined | Value::Null | Value::Boolean(false) => return None,
        Value::Function(_) | Value::Native(_) | Value::Symbol(_) => return None,
        Value::Boolean(true) => String::new(),
        Value::Object(_) | Value::Namespace(_) if name == "style" => style(value),
        other => other.to_display_string(),
    };
    Some((name, value))
}

/// Tag or attribute name that can be written into HTML unquoted.
fn is_markup_name(name: &str) -> bool {
    let mut characters = name.chars();
    characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic())
        && characters.all(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.' | ':')
        })
}

/// `{ marginTop: 4, color: 'red' }` as `margin-top: 4px; color: red`.
fn style(value: &Value) -> String {
    own_entries(value)
        .into_iter()
        .filter(|(_, value)| !value.is_nullish() && !matches!(value, Value::Boolean(_)))
        .map(|(property, value)| {
            let text = match value {
                Value::Number(number)
                    if number != 0.0 && !UNITLESS_STYLES.contains(&property.as_str()) =>
                {
                    format!("{}px", value.to_display_string())
                }
                other => other.to_display_string(),
            };
            format!("{}: {text}", kebab_case(&property))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn kebab_case(property: &str) -> String {
    let mut kebab = String::with_capacity(property.len() + 4);
    for character in property.chars() {
        if character.is_ascii_uppercase() {
            kebab.push('-');
            kebab.push(character.to_ascii_lowercase());
        } else {
            kebab.push(character);
        }
    }
    kebab
}

/// Captures the first render failure and keeps returning it.
#[derive(Debug, Default)]
pub struct CrashBoundary {
    failure: Option<RuntimeError>,
}

impl CrashBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure(&self) -> Option<&RuntimeError> {
        self.failure.as_ref()
    }

    pub fn render(
        &mut self,
        render: impl FnOnce() -> Result<View, RuntimeError>,
    ) -> Result<View, RuntimeError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        render().inspect_err(|error| {
            log::warn!("Render failed: {error}");
            self.failure = Some(error.clone());
        })
    }
}

/// One artifact mounted under its own boundary.
#[derive(Debug)]
struct Mount {
    token: AttemptToken,
    boundary: CrashBoundary,
    output: Option<View>,
}

/// Red bordered panel with a heading and preformatted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticPanel {
    pub title: String,
    pub message: String,
}

impl DiagnosticPanel {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Panel for an error that stopped the pipeline.
    pub fn for_error(error: &PreviewError) -> Self {
        match error {
            PreviewError::Runtime(error) => Self::for_runtime_error(error),
            other => Self::new(other.title(), other.to_string()),
        }
    }

    pub fn for_runtime_error(error: &RuntimeError) -> Self {
        Self::new("Runtime Error", error.message.clone())
    }

    pub fn to_view(&self) -> View {
        let style = "color: red; padding: 10px; border: 1px solid red; border-radius: 4px";
        View::element(
            "div",
            vec![("style".to_string(), style.to_string())],
            vec![
                View::element("h3", Vec::new(), vec![View::text(format!("{}:", self.title))]),
                View::element("pre", Vec::new(), vec![View::text(self.message.clone())]),
            ],
        )
    }
}

/// What the host currently shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Presentation {
    Placeholder(String),
    CompileDiagnostic(DiagnosticPanel),
    Live(View),
    RuntimeDiagnostic(DiagnosticPanel),
}

impl Presentation {
    /// Diagnostic for an attempt that never produced an artifact. Errors
    /// thrown while running the generated code still count as runtime errors.
    pub fn for_error(error: &PreviewError) -> Self {
        match error {
            PreviewError::Runtime(error) => {
                Self::RuntimeDiagnostic(DiagnosticPanel::for_runtime_error(error))
            }
            other => Self::CompileDiagnostic(DiagnosticPanel::for_error(other)),
        }
    }

    pub fn to_view(&self) -> View {
        match self {
            Self::Placeholder(text) => View::element("div", Vec::new(), vec![View::text(text.clone())]),
            Self::CompileDiagnostic(panel) | Self::RuntimeDiagnostic(panel) => panel.to_view(),
            Self::Live(view) => view.clone(),
        }
    }

    pub fn to_html(&self) -> String {
        self.to_view().to_html()
    }
}

/// Mounts ready artifacts and picks the presentation for the current phase.
#[derive(Debug)]
pub struct RenderHost<R> {
    renderer: R,
    placeholder: String,
    mount: Option<Mount>,
}

impl<R: Renderer> RenderHost<R> {
    pub fn new(renderer: R, config: &RenderConfig) -> Self {
        Self {
            renderer,
            placeholder: config.placeholder.clone(),
            mount: None,
        }
    }

    /// Token of the mounted artifact, if any.
    pub fn mounted(&self) -> Option<AttemptToken> {
        self.mount.as_ref().map(|mount| mount.token)
    }

    pub fn display(&mut self, controller: &LifecycleController) -> Presentation {
        match controller.phase() {
            Phase::Idle | Phase::Compiling { .. } => Presentation::Placeholder(self.placeholder.clone()),
            Phase::CompileFailed { error, .. } => {
                self.mount = None;
                Presentation::for_error(&error)
            }
            Phase::Ready { token, artifact } => {
                if self.mounted().is_some_and(|mounted| mounted != token) {
                    self.mount = None;
                }
                let mount = self.mount.get_or_insert_with(|| {
                    log::debug!("Mounting attempt {token}");
                    Mount {
                        token,
                        boundary: CrashBoundary::new(),
                        output: None,
                    }
                });
                let renderer = &mut self.renderer;
                if let Some(view) = &mount.output {
                    return Presentation::Live(view.clone());
                }
                match mount.boundary.render(|| renderer.render(&artifact)) {
                    Ok(view) => {
                        mount.output = Some(view.clone());
                        Presentation::Live(view)
                    }
                    Err(error) => {
                        controller.report_render_failure(token, error.clone());
                        Presentation::RuntimeDiagnostic(DiagnosticPanel::for_runtime_error(&error))
                    }
                }
            }
            Phase::RuntimeFailed { error, .. } => {
                Presentation::RuntimeDiagnostic(DiagnosticPanel::for_runtime_error(&error))
            }
        }
    }

    /// Drop the cached output so the next `display` renders the mount again.
    ///
    /// A mount whose boundary has captured a failure stays failed.
    pub fn refresh(&mut self) {
        if let Some(mount) = &mut self.mount {
            mount.output = None;
        }
    }
}
