use anyhow::Context;
use artifact_preview::bindings::default_registry;
use artifact_preview::config::PreviewConfig;
use artifact_preview::lifecycle::{LifecycleController, Phase};
use artifact_preview::parser::SourceText;
use artifact_preview::registry::CapabilityRegistry;
use artifact_preview::render::{Presentation, RenderHost, TreeRenderer};
use artifact_preview::transform::SyntaxTransformer;
use clap::{Parser as ClapParser, Subcommand};
use futures::StreamExt;
use futures::executor::{LocalPool, block_on};
use futures::task::LocalSpawnExt;
use futures_channel::mpsc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

#[derive(ClapParser)]
#[command(name = "artifact-preview")]
#[command(about = "Compile and preview UI component source")]
struct Cli {
    /// Config file (default: search upward for artifact-preview.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the generated code
    Transform {
        /// Component source file
        file: PathBuf,
    },
    /// Compile the component and report any error
    Check {
        /// Component source file
        file: PathBuf,
    },
    /// Compile and render once
    Render {
        /// Component source file
        file: PathBuf,
        /// Print the presentation as JSON instead of HTML
        #[arg(long)]
        json: bool,
    },
    /// Re-render whenever the file changes
    Watch {
        /// Component source file
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Transform { file } => {
            let config = load_config(cli.config.as_deref(), &file)?;
            let code = read_source(&file)?;
            let transformer = SyntaxTransformer::new(&config.transform);
            match transformer.transform(&code, &source_name(&file)) {
                Ok(generated) => {
                    println!("{generated}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    eprintln!("{error}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Check { file } => {
            let config = load_config(cli.config.as_deref(), &file)?;
            let registry = registry(&config)?;
            let code = read_source(&file)?;
            let config = PreviewConfig {
                source_name: source_name(&file),
                ..config
            };
            match artifact_preview::compile(&code, &registry, &config) {
                Ok(_) => {
                    eprintln!("OK: {}", file.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    eprintln!("{}:\n{error}", error.title());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Render { file, json } => {
            let config = load_config(cli.config.as_deref(), &file)?;
            let registry = registry(&config)?;
            let code = read_source(&file)?;
            let (controller, mut host) = preview(registry, config, &file);
            block_on(controller.set_source(code));
            let presentation = host.display(&controller);
            print_presentation(&presentation, json)?;
            Ok(match presentation {
                Presentation::Live(_) => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Commands::Watch { file } => {
            let config = load_config(cli.config.as_deref(), &file)?;
            let registry = registry(&config)?;
            watch(registry, config, &file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(explicit: Option<&Path>, file: &Path) -> anyhow::Result<PreviewConfig> {
    if let Some(path) = explicit {
        return PreviewConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    let start = file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let (config, path) = PreviewConfig::discover(start)?;
    if let Some(path) = path {
        log::info!("Loaded config {}", path.display());
    }
    Ok(config)
}

fn registry(config: &PreviewConfig) -> anyhow::Result<Rc<CapabilityRegistry>> {
    let registry = default_registry(config.registry.collisions)
        .context("Failed to build the capability registry")?;
    Ok(Rc::new(registry))
}

fn read_source(file: &Path) -> anyhow::Result<SourceText> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(SourceText::from(code))
}

fn source_name(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

fn preview(
    registry: Rc<CapabilityRegistry>,
    config: PreviewConfig,
    file: &Path,
) -> (LifecycleController, RenderHost<TreeRenderer>) {
    let host = RenderHost::new(TreeRenderer::new(&config.render), &config.render);
    let config = PreviewConfig {
        source_name: source_name(file),
        ..config
    };
    (LifecycleController::new(registry, config), host)
}

fn print_presentation(presentation: &Presentation, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(presentation)?);
    } else {
        println!("{}", presentation.to_html());
    }
    Ok(())
}

fn watch(registry: Rc<CapabilityRegistry>, config: PreviewConfig, file: &Path) -> anyhow::Result<()> {
    let (edits, edit_stream) = mpsc::unbounded::<SourceText>();
    edits.unbounded_send(read_source(file)?)?;

    let watched = file.to_path_buf();
    let watched_name = watched.file_name().map(ToOwned::to_owned);
    let sender = edits.clone();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                    && event.paths.iter().any(|path| path.file_name() == watched_name.as_deref());
                if !relevant {
                    return;
                }
                match fs::read_to_string(&watched) {
                    Ok(code) => {
                        if sender.unbounded_send(SourceText::from(code)).is_err() {
                            log::debug!("Preview stopped; ignoring file change");
                        }
                    }
                    Err(error) => log::warn!("Failed to read {}: {error}", watched.display()),
                }
            }
            Err(error) => log::warn!("Watch error: {error}"),
        },
        notify::Config::default(),
    )
    .context("Failed to start the file watcher")?;
    let directory = file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    watcher
        .watch(directory, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", directory.display()))?;
    eprintln!("Watching {}", file.display());

    let (controller, mut host) = preview(registry, config, file);
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let mut phases = controller.subscribe();
    controller.drive(edit_stream, &spawner)?;

    let presenter = controller.clone();
    spawner.spawn_local(async move {
        let mut last_shown = None;
        while let Some(phase) = phases.next().await {
            if matches!(phase, Phase::Idle | Phase::Compiling { .. }) {
                continue;
            }
            let shown = (phase.token(), phase.name());
            if last_shown == Some(shown) {
                continue;
            }
            let presentation = host.display(&presenter);
            last_shown = Some((presenter.phase().token(), presenter.phase().name()));
            if let Err(error) = print_presentation(&presentation, false) {
                log::error!("Failed to print presentation: {error}");
            }
        }
    })?;

    pool.run();
    Ok(())
}
