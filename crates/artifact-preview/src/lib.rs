//! Live preview of untrusted UI component source.
//!
//! Source text is rewritten by the [`transform::SyntaxTransformer`], turned
//! into a component by the [`sandbox::SandboxExecutor`] against a closed
//! [`registry::CapabilityRegistry`], driven by the
//! [`lifecycle::LifecycleController`] and shown by the [`render::RenderHost`].

pub mod bindings;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod parser;
pub mod registry;
pub mod render;
pub mod sandbox;
pub mod transform;

use config::PreviewConfig;
use error::PreviewError;
use registry::CapabilityRegistry;
use sandbox::{CompiledArtifact, SandboxExecutor};
use std::rc::Rc;
use transform::SyntaxTransformer;

/// Transform `source` and construct its component. Pure given its inputs.
pub fn compile(
    source: &str,
    registry: &Rc<CapabilityRegistry>,
    config: &PreviewConfig,
) -> Result<CompiledArtifact, PreviewError> {
    let generated =
        SyntaxTransformer::new(&config.transform).transform(source, &config.source_name)?;
    SandboxExecutor::new(&config.sandbox).run(generated, Rc::clone(registry))
}
