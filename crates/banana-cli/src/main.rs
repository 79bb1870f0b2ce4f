use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use banana_contracts::presets::PresetStore;
use banana_contracts::settings::SettingsStore;
use banana_contracts::{
    default_config_dir, default_output_dir, ConnectionProfile, GenerationRequest,
    ProviderDialect, ProviderRegistry, Resolution,
};
use banana_engine::connection::spawn_test;
use banana_engine::ingest::{BitmapNodeSink, ColorMode, DeliveryOutcome};
use banana_engine::{deliver, sniff, GenerationPipeline, PipelineConfig, TaskSet};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sd-banana", version, about = "Seamless texture generation from AI image providers")]
struct Cli {
    /// Directory holding providers.json, settings.json and presets.json.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    TestConnection(TestConnectionArgs),
    Sniff(SniffArgs),
    #[command(subcommand)]
    Providers(ProvidersCommand),
    #[command(subcommand)]
    Presets(PresetsCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Repeat to run several generations concurrently.
    #[arg(long)]
    prompt: Vec<String>,
    #[arg(long)]
    preset: Option<String>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long, default_value = "1K")]
    resolution: Resolution,
    #[arg(long)]
    search_web: bool,
    #[arg(long)]
    debug: bool,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Node graph directory; defaults to `<out>/graph`.
    #[arg(long)]
    graph: Option<PathBuf>,
    /// Keep generated files even when settings say otherwise.
    #[arg(long)]
    keep: bool,
}

#[derive(Debug, Parser)]
struct TestConnectionArgs {
    #[arg(long)]
    provider: Vec<String>,
}

#[derive(Debug, Parser)]
struct SniffArgs {
    paths: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ProvidersCommand {
    List,
    Add(ProviderArgs),
    Update(ProviderArgs),
    Remove {
        #[arg(long)]
        name: String,
    },
    Select {
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Parser)]
struct ProviderArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    api_key: String,
    #[arg(long)]
    base_url: String,
    #[arg(long)]
    model: String,
}

#[derive(Debug, Subcommand)]
enum PresetsCommand {
    List,
    Show { name: String },
    Add { name: String, prompt: String },
    Update { name: String, prompt: String },
    Rename { old_name: String, new_name: String },
    Remove { name: String },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        debug_mode: Option<bool>,
        #[arg(long)]
        save_generated_images: Option<bool>,
        #[arg(long)]
        system_instruction: Option<String>,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("sd-banana error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_dir = cli.config_dir.unwrap_or_else(default_config_dir);
    match cli.command {
        Command::Generate(args) => run_generate(&config_dir, args),
        Command::TestConnection(args) => run_test_connection(&config_dir, args),
        Command::Sniff(args) => run_sniff(args),
        Command::Providers(command) => run_providers(&config_dir, command),
        Command::Presets(command) => run_presets(&config_dir, command),
        Command::Settings(command) => run_settings(&config_dir, command),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn run_generate(config_dir: &Path, args: GenerateArgs) -> Result<i32> {
    let registry = ProviderRegistry::load_from_dir(config_dir)?;
    let settings = SettingsStore::load_from_dir(config_dir)?.settings().clone();
    let presets = PresetStore::load_from_dir(config_dir)?;

    let provider = args
        .provider
        .or_else(|| settings.selected_provider.clone())
        .or_else(|| registry.names().into_iter().next())
        .context("no provider configured")?;

    let mut prompts = args.prompt;
    if let Some(name) = &args.preset {
        let prompt = presets.prompt(name);
        if prompt.is_empty() {
            bail!("Preset not found.");
        }
        prompts.push(prompt.to_string());
    }
    if prompts.is_empty() {
        bail!("at least one --prompt or --preset is required");
    }

    let output_dir = args.out.unwrap_or_else(default_output_dir);
    let mut config = PipelineConfig::new(&output_dir)
        .with_system_instruction(settings.system_instruction().map(str::to_string));
    if let Some(events) = args.events {
        config = config.with_events_path(events);
    }
    let debug_mode = args.debug || settings.debug_mode;
    let keep_file = args.keep || settings.save_generated_images;
    let pipeline = GenerationPipeline::new(config, registry)?;

    let mut tasks = TaskSet::new();
    for prompt in prompts {
        let mut request = GenerationRequest::new(prompt, provider.as_str())
            .with_resolution(args.resolution)
            .with_search_web(args.search_web)
            .with_debug_mode(debug_mode);
        if let Some(input) = &args.input {
            request = request.with_input_image(input);
        }
        let task_id = tasks.submit(&pipeline, request)?;
        println!("{task_id} submitted to {provider} ({})", args.resolution);
    }

    let mut sink = GraphDirSink::new(args.graph.unwrap_or_else(|| output_dir.join("graph")));
    let mut failures = 0;
    while let Some(completion) = tasks.next_completion() {
        let task_id = completion.task_id;
        match deliver(&mut sink, completion.outcome, keep_file) {
            DeliveryOutcome::Imported(report) => {
                let mode = report.color_mode.map(ColorMode::as_str).unwrap_or("unchanged");
                println!(
                    "{task_id} imported {} as {} (color mode: {mode})",
                    report.path.display(),
                    report.node_id
                );
                for warning in &report.warnings {
                    eprintln!("{task_id} warning: {warning}");
                }
            }
            DeliveryOutcome::GeneratedWithWarning { path, warning } => {
                println!("{task_id} generated {}", path.display());
                eprintln!("{task_id} warning: {warning}");
            }
            DeliveryOutcome::Failed(message) => {
                eprintln!("{task_id} failed: {message}");
                failures += 1;
            }
        }
    }
    Ok(if failures == 0 { 0 } else { 1 })
}

fn run_test_connection(config_dir: &Path, args: TestConnectionArgs) -> Result<i32> {
    let registry = ProviderRegistry::load_from_dir(config_dir)?;
    let names = if args.provider.is_empty() {
        registry.names()
    } else {
        args.provider
    };

    let (sender, receiver) = std::sync::mpsc::channel();
    let mut handles = Vec::new();
    let mut failures = 0;
    for name in &names {
        let Some(profile) = registry.resolve(name) else {
            eprintln!("{name}: Provider not found.");
            failures += 1;
            continue;
        };
        handles.push(spawn_test(Uuid::new_v4(), profile.clone(), sender.clone())?);
    }
    drop(sender);

    // Reports arrive in completion order.
    for completion in receiver {
        let status = if completion.report.ok { "ok" } else { "failed" };
        println!("{}: {status} - {}", completion.provider_name, completion.report.message);
        if !completion.report.ok {
            failures += 1;
        }
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(if failures == 0 { 0 } else { 1 })
}

fn run_sniff(args: SniffArgs) -> Result<i32> {
    if args.paths.is_empty() {
        bail!("no image paths given");
    }
    for path in &args.paths {
        let result = sniff::classify(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let grayscale = match result.is_grayscale {
            Some(true) => "grayscale",
            Some(false) => "color",
            None => "unknown",
        };
        println!("{}: {} {grayscale}", path.display(), result.format);
    }
    Ok(0)
}

fn run_providers(config_dir: &Path, command: ProvidersCommand) -> Result<i32> {
    let mut registry = ProviderRegistry::load_from_dir(config_dir)?;
    match command {
        ProvidersCommand::List => {
            let selected = SettingsStore::load_from_dir(config_dir)?
                .settings()
                .selected_provider
                .clone();
            for profile in registry.profiles() {
                let marker = if selected.as_deref() == Some(profile.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                let dialect = ProviderDialect::classify(&profile.name, &profile.base_url);
                println!(
                    "{marker} {} [{dialect}] {} ({})",
                    profile.name, profile.base_url, profile.model
                );
            }
        }
        ProvidersCommand::Add(args) => {
            registry.add(ConnectionProfile::new(
                args.name.as_str(),
                args.api_key,
                args.base_url,
                args.model,
            ))?;
            println!("Provider added: {}", args.name);
        }
        ProvidersCommand::Update(args) => {
            registry.update(&args.name, &args.api_key, &args.base_url, &args.model)?;
            println!("Provider updated: {}", args.name);
        }
        ProvidersCommand::Remove { name } => {
            registry.delete(&name)?;
            println!("Provider deleted: {name}");
        }
        ProvidersCommand::Select { name } => {
            if registry.resolve(&name).is_none() {
                bail!("Provider not found.");
            }
            let mut store = SettingsStore::load_from_dir(config_dir)?;
            store.update(|settings| settings.selected_provider = Some(name.clone()))?;
            println!("Selected provider: {name}");
        }
    }
    Ok(0)
}

fn run_presets(config_dir: &Path, command: PresetsCommand) -> Result<i32> {
    let mut presets = PresetStore::load_from_dir(config_dir)?;
    match command {
        PresetsCommand::List => {
            for name in presets.names() {
                println!("{name}");
            }
        }
        PresetsCommand::Show { name } => {
            let prompt = presets.prompt(&name);
            if prompt.is_empty() {
                bail!("Preset not found.");
            }
            println!("{prompt}");
        }
        PresetsCommand::Add { name, prompt } => presets.add(&name, &prompt)?,
        PresetsCommand::Update { name, prompt } => presets.update(&name, &prompt)?,
        PresetsCommand::Rename { old_name, new_name } => presets.rename(&old_name, &new_name)?,
        PresetsCommand::Remove { name } => presets.delete(&name)?,
    }
    Ok(0)
}

fn run_settings(config_dir: &Path, command: SettingsCommand) -> Result<i32> {
    let mut store = SettingsStore::load_from_dir(config_dir)?;
    match command {
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(store.settings())?);
        }
        SettingsCommand::Set {
            debug_mode,
            save_generated_images,
            system_instruction,
        } => {
            store.update(|settings| {
                if let Some(value) = debug_mode {
                    settings.debug_mode = value;
                }
                if let Some(value) = save_generated_images {
                    settings.save_generated_images = value;
                }
                if let Some(value) = system_instruction {
                    settings.system_instruction = value;
                }
            })?;
        }
    }
    Ok(0)
}

/// Stand-in node graph: each node is `<id>.json` next to a copy of its bitmap
/// under `resources/`.
#[derive(Debug)]
struct GraphDirSink {
    dir: PathBuf,
}

impl GraphDirSink {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn manifest_path(&self, node_id: &str) -> PathBuf {
        self.dir.join(format!("{node_id}.json"))
    }
}

impl BitmapNodeSink for GraphDirSink {
    fn create_bitmap_node(&mut self, image_path: &Path) -> Result<String> {
        let resources = self.dir.join("resources");
        fs::create_dir_all(&resources)
            .with_context(|| format!("failed creating {}", resources.display()))?;
        let node_id = format!("bitmap-{}", Uuid::new_v4().simple());
        let file_name = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .context("generated image has no file name")?;
        let resource = resources.join(format!("{node_id}-{file_name}"));
        fs::copy(image_path, &resource)
            .with_context(|| format!("failed importing {}", image_path.display()))?;

        let manifest = json!({
            "id": node_id,
            "kind": "bitmap",
            "source": image_path.display().to_string(),
            "resource": resource.display().to_string(),
        });
        fs::write(
            self.manifest_path(&node_id),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        tracing::debug!(node_id = %node_id, resource = %resource.display(), "bitmap node created");
        Ok(node_id)
    }

    fn set_color_mode(&mut self, node_id: &str, mode: ColorMode) -> Result<()> {
        let path = self.manifest_path(node_id);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let mut manifest: Value = serde_json::from_str(&raw)?;
        let Some(fields) = manifest.as_object_mut() else {
            bail!("node manifest {} is not an object", path.display());
        };
        fields.insert("color_mode".to_string(), json!(mode.as_str()));
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }
}
