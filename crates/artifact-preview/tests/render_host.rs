use artifact_preview::bindings::default_registry;
use artifact_preview::config::{PreviewConfig, RenderConfig};
use artifact_preview::lifecycle::{LifecycleController, Phase};
use artifact_preview::registry::CollisionPolicy;
use artifact_preview::render::{DiagnosticPanel, Presentation, RenderHost, TreeRenderer, View};
use futures::executor::block_on;
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn preview(config: PreviewConfig) -> (LifecycleController, RenderHost<TreeRenderer>) {
    let registry = Rc::new(default_registry(CollisionPolicy::Reject).unwrap());
    let host = RenderHost::new(TreeRenderer::new(&config.render), &config.render);
    (LifecycleController::new(registry, config), host)
}

fn show(source: &str) -> Presentation {
    let (controller, mut host) = preview(PreviewConfig::default());
    block_on(controller.set_source(source));
    host.display(&controller)
}

#[test]
fn test_placeholder_until_an_attempt_finishes() {
    let (controller, mut host) = preview(PreviewConfig::default());
    assert_eq!(host.display(&controller), Presentation::Placeholder("Loading...".to_string()));

    let attempt = controller.set_source("export default () => <p />;");
    assert_eq!(host.display(&controller).to_html(), "<div>Loading...</div>");
    block_on(attempt);
    assert_eq!(host.display(&controller).to_html(), "<p></p>");
}

#[test]
fn test_live_view_expands_components() {
    let source = r#"
import React, { useState } from 'react';

function Item({ label, done = false }) {
  return <li className={done ? 'item done' : 'item'}>{label}</li>;
}

export default function App() {
  const [items] = useState(['a', 'b']);
  return (
    <ul style={{ marginTop: 4 }}>
      {items.map((label, index) => <Item key={label} label={label} done={index === 1} />)}
    </ul>
  );
}
"#;
    assert_eq!(
        show(source).to_html(),
        "<ul style=\"margin-top: 4px\"><li class=\"item\">a</li><li class=\"item done\">b</li></ul>"
    );
}

#[test]
fn test_fragments_and_text_normalisation() {
    let source = "export default () => (\n  <>\n    <h1>Title &amp; more</h1>\n    plain   text\n  </>\n);";
    assert_eq!(
        show(source),
        Presentation::Live(View::element(
            "div",
            Vec::new(),
            vec![
                View::element("h1", Vec::new(), vec![View::text("Title & more")]),
                View::text("plain   text"),
            ],
        ))
    );
}

#[test]
fn test_compile_failure_shows_panel_without_mount() {
    let (controller, mut host) = preview(PreviewConfig::default());
    block_on(controller.set_source("export default () => <div>"));
    let Presentation::CompileDiagnostic(panel) = host.display(&controller) else {
        panic!("Expected a compile diagnostic");
    };
    assert_eq!(panel.title, "Compilation Error");
    assert!(host.mounted().is_none());
}

#[test]
fn test_validation_failure_uses_compile_panel() {
    let Presentation::CompileDiagnostic(panel) = show("export default 'not a component';") else {
        panic!("Expected a compile diagnostic");
    };
    assert!(panel.message.contains("did not produce a valid component"));
}

#[test]
fn test_throwing_component_is_contained() {
    let (controller, mut host) = preview(PreviewConfig::default());
    block_on(controller.set_source(
        "export default () => { throw new Error('Render exploded'); };",
    ));

    let presentation = host.display(&controller);
    assert_eq!(
        presentation,
        Presentation::RuntimeDiagnostic(DiagnosticPanel::new("Runtime Error", "Render exploded"))
    );
    assert!(matches!(controller.phase(), Phase::RuntimeFailed { .. }));
    assert_eq!(host.display(&controller), presentation);

    // A sibling preview is unaffected.
    assert_eq!(show("export default () => <i>fine</i>;").to_html(), "<i>fine</i>");

    // A new source gets a fresh mount.
    block_on(controller.set_source("export default () => <i>fixed</i>;"));
    assert_eq!(host.display(&controller).to_html(), "<i>fixed</i>");
}

#[test]
fn test_new_mount_only_for_new_ready_token() {
    let (controller, mut host) = preview(PreviewConfig::default());
    block_on(controller.set_source("export default () => <p>one</p>;"));
    host.display(&controller);
    let first = host.mounted();
    host.display(&controller);
    assert_eq!(host.mounted(), first);

    block_on(controller.set_source("export default () => <p>two</p>;"));
    host.display(&controller);
    assert_ne!(host.mounted(), first);
}

#[test]
fn test_runaway_recursion_becomes_runtime_error() {
    let config = PreviewConfig {
        render: RenderConfig {
            max_depth: 8,
            ..RenderConfig::default()
        },
        ..PreviewConfig::default()
    };
    let (controller, mut host) = preview(config);
    block_on(controller.set_source("function Loop() { return <Loop />; }\nexport default Loop;"));
    let Presentation::RuntimeDiagnostic(panel) = host.display(&controller) else {
        panic!("Expected a runtime diagnostic");
    };
    assert_eq!(panel.message, "Maximum render depth exceeded");

    let config = PreviewConfig::from_toml_str("[sandbox]\nmax_call_depth = 16\n").unwrap();
    let (controller, mut host) = preview(config);
    block_on(controller.set_source("const f = (n) => f(n + 1);\nexport default () => f(0);"));
    let Presentation::RuntimeDiagnostic(panel) = host.display(&controller) else {
        panic!("Expected a runtime diagnostic");
    };
    assert_eq!(panel.message, "Maximum call stack size exceeded");
}

#[test]
fn test_object_child_is_runtime_error() {
    let Presentation::RuntimeDiagnostic(panel) = show("export default () => <p>{{ a: 1 }}</p>;")
    else {
        panic!("Expected a runtime diagnostic");
    };
    assert!(panel.message.starts_with("Objects are not valid as a child"));
}

#[test]
fn test_cyclic_children_are_runtime_errors() {
    let source = "export default () => {\n\
                    const items = [<i>a</i>];\n\
                    items.push(items);\n\
                    return <p>{items}</p>;\n\
                  };";
    assert_eq!(
        show(source),
        Presentation::RuntimeDiagnostic(DiagnosticPanel::new(
            "Runtime Error",
            "Children contain an array that includes itself"
        ))
    );

    let source = "export default () => {\n\
                    const items = [1, 2];\n\
                    items.push(items);\n\
                    return <p title={`${items}`}>{`${items}`}</p>;\n\
                  };";
    assert_eq!(show(source).to_html(), "<p title=\"1,2,\">1,2,</p>");
}

#[test]
fn test_shared_child_arrays_are_not_cycles() {
    let source = "export default () => {\n\
                    const pair = ['a', 'b'];\n\
                    return <p>{[pair, pair]}</p>;\n\
                  };";
    assert_eq!(show(source).to_html(), "<p>abab</p>");
}

#[test]
fn test_namespace_child_is_runtime_error() {
    let Presentation::RuntimeDiagnostic(panel) =
        show("import Math from 'language';\nexport default () => <p>{Math}</p>;")
    else {
        panic!("Expected a runtime diagnostic");
    };
    assert!(panel.message.starts_with("Objects are not valid as a child (found: object with keys {PI, E"));
}

#[test]
fn test_markup_names_cannot_inject_html() {
    let source = "export default () => {\n\
                    const props = { ['x onload=alert(1)']: 'y', title: 'ok' };\n\
                    return <p {...props}>text</p>;\n\
                  };";
    assert_eq!(show(source).to_html(), "<p title=\"ok\">text</p>");

    let source = "import React from 'react';\n\
                  export default () => React.createElement('img src=x onerror=alert(1)', null);";
    assert_eq!(
        show(source),
        Presentation::RuntimeDiagnostic(DiagnosticPanel::new(
            "Runtime Error",
            "Invalid tag name: \"img src=x onerror=alert(1)\""
        ))
    );
}

#[test]
fn test_construction_error_uses_runtime_panel() {
    let (controller, mut host) = preview(PreviewConfig::default());
    block_on(controller.set_source("import Missing from 'lib';\nexport default () => <Missing />;"));
    assert_eq!(
        host.display(&controller),
        Presentation::RuntimeDiagnostic(DiagnosticPanel::new(
            "Runtime Error",
            "Missing is not defined"
        ))
    );
    assert!(host.mounted().is_none());
}

#[test]
fn test_mutating_react_does_not_leak_into_next_attempt() {
    let (controller, mut host) = preview(PreviewConfig::default());
    block_on(controller.set_source(
        "import React from 'react';\n\
         export default () => { React.createElement = () => 'hijacked'; return <p />; };",
    ));
    let Presentation::RuntimeDiagnostic(panel) = host.display(&controller) else {
        panic!("Expected a runtime diagnostic");
    };
    assert_eq!(
        panel.message,
        "Cannot assign to read only property 'createElement' of object"
    );

    block_on(controller.set_source("export default () => <p>clean</p>;"));
    assert_eq!(host.display(&controller).to_html(), "<p>clean</p>");
}
