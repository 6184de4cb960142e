//! PF-013: CLI subcommands — translate, inputs, resources, validate, fingerprint.

use crate::backends::translator_for;
use crate::core::config::{ContainerOverride, TranslationConfig};
use crate::core::error::{Result, TranslateError};
use crate::core::fingerprint;
use crate::core::parser::{self, Entry, IrDocument};
use crate::core::translator::{stringify_translated_inputs, Node, Translator, WorkflowTranslation};
use crate::core::types::Backend;
use clap::{Args, Subcommand};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate an IR document without translating it
    Validate {
        /// Path to the IR document
        file: PathBuf,
    },

    /// Translate a tool or workflow and write its documents
    Translate {
        /// Path to the IR document
        file: PathBuf,

        /// Target language: nextflow, cwl or wdl
        #[arg(short, long)]
        backend: Backend,

        /// Output directory
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Tool or workflow id to translate (default: the document's entry)
        #[arg(short, long)]
        entry: Option<String>,

        /// Rewrite even when the fingerprint is unchanged
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the inputs file for a tool or workflow
    Inputs {
        /// Path to the IR document
        file: PathBuf,

        /// Target language (selects nothing but the file name)
        #[arg(short, long, default_value = "nextflow")]
        backend: Backend,

        #[arg(short, long)]
        entry: Option<String>,

        /// Keep JSON value types instead of rendering every value as a string
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print per-step resource values
    Resources {
        /// Path to the IR document
        file: PathBuf,

        #[arg(short, long)]
        entry: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the translation cache key
    Fingerprint {
        /// Path to the IR document
        file: PathBuf,

        #[arg(short, long)]
        backend: Backend,

        #[arg(short, long)]
        entry: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Config file plus flag overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Translation config (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Expose cpu/memory/disk/duration as overridable inputs
    #[arg(long)]
    pub with_resource_overrides: bool,

    /// Export tools that have no container
    #[arg(long)]
    pub allow_empty_container: bool,

    /// Emit no container directives
    #[arg(long)]
    pub no_container: bool,

    /// Use this image for every tool
    #[arg(long)]
    pub container: Option<String>,
}

impl ConfigArgs {
    /// Load the config file (if any) and apply flags on top.
    pub fn load(&self) -> Result<TranslationConfig> {
        let mut config = match &self.config {
            Some(path) => TranslationConfig::load(path)?,
            None => TranslationConfig::default(),
        };
        if self.with_resource_overrides {
            config.with_resource_overrides = true;
        }
        if self.allow_empty_container {
            config.allow_empty_container = true;
        }
        if self.no_container {
            config.with_container = false;
        }
        if let Some(image) = &self.container {
            config.container_override = Some(ContainerOverride::All(image.clone()));
        }
        Ok(config)
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Translate {
            file,
            backend,
            out_dir,
            entry,
            force,
            config,
        } => {
            let config = config.load()?;
            cmd_translate(&file, backend, &out_dir, entry.as_deref(), &config, force).map(|_| ())
        }
        Commands::Inputs {
            file,
            backend,
            entry,
            raw,
            config,
        } => {
            let config = config.load()?;
            let text = cmd_inputs(&file, backend, entry.as_deref(), &config, raw)?;
            println!("{}", text);
            Ok(())
        }
        Commands::Resources { file, entry, config } => {
            let config = config.load()?;
            println!("{}", cmd_resources(&file, entry.as_deref(), &config)?);
            Ok(())
        }
        Commands::Fingerprint {
            file,
            backend,
            entry,
            config,
        } => {
            let config = config.load()?;
            println!("{}", cmd_fingerprint(&file, backend, entry.as_deref(), &config)?);
            Ok(())
        }
    }
}

/// Parse and validate an IR document, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<IrDocument> {
    let doc = parser::parse_ir_file(file)?;
    let errors = parser::validate_ir(&doc);
    if errors.is_empty() {
        return Ok(doc);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(TranslateError::InvalidIr(format!("{} validation error(s)", errors.len())))
}

fn cmd_validate(file: &Path) -> Result<()> {
    let doc = parse_and_validate(file)?;
    let workflow = doc
        .workflow
        .as_ref()
        .map(|w| format!(", workflow '{}' ({} steps)", w.id, w.steps.len()))
        .unwrap_or_default();
    println!(
        "OK: {} ({} tools{}{})",
        file.display(),
        doc.tools.len(),
        if doc.code_tool.is_some() { ", 1 code tool" } else { "" },
        workflow
    );
    Ok(())
}

/// Key file for one backend inside an output directory.
fn key_path(out_dir: &Path, backend: Backend) -> PathBuf {
    out_dir.join(format!(".polyflow-{}.key", backend))
}

/// Translate the entry and everything it needs.
fn translate_entry(translator: &dyn Translator, entry: &Entry, config: &TranslationConfig) -> Result<(String, WorkflowTranslation)> {
    let opts = config.options();
    match entry {
        Entry::Tool(tool) => {
            let t = translator.translate_tool(tool, &opts)?;
            Ok((
                translator.tool_filename(tool),
                WorkflowTranslation {
                    text: t.text,
                    auxiliary: IndexMap::new(),
                    diagnostics: t.diagnostics,
                },
            ))
        }
        Entry::CodeTool(code_tool) => {
            let t = translator.translate_code_tool(code_tool, &opts)?;
            Ok((
                translator.tool_filename(&code_tool.to_command_tool()),
                WorkflowTranslation {
                    text: t.text,
                    auxiliary: IndexMap::new(),
                    diagnostics: t.diagnostics,
                },
            ))
        }
        Entry::Workflow(wf) => Ok((translator.workflow_filename(wf), translator.translate_workflow(wf, &opts)?)),
    }
}

/// Inputs file values for the entry node.
fn entry_inputs(translator: &dyn Translator, entry: &Entry, config: &TranslationConfig) -> Result<(String, IndexMap<String, Option<Value>>)> {
    let request = config.inputs_request();
    let lowered;
    let node = match entry {
        Entry::Tool(t) => Node::Tool(t),
        Entry::CodeTool(c) => {
            lowered = c.to_command_tool();
            Node::Tool(&lowered)
        }
        Entry::Workflow(w) => Node::Workflow(w),
    };
    Ok((translator.inputs_filename(node), translator.build_inputs_file(node, &request)?))
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text)?;
    info!(path = %path.display(), bytes = text.len(), "wrote");
    Ok(())
}

/// Translate `file` into `out_dir`. Returns false when the existing output
/// already matches the fingerprint and nothing was written.
pub fn cmd_translate(
    file: &Path,
    backend: Backend,
    out_dir: &Path,
    entry: Option<&str>,
    config: &TranslationConfig,
    force: bool,
) -> Result<bool> {
    let doc = parse_and_validate(file)?;
    let entry = doc.entry(entry)?;
    let key = fingerprint::translation_key(&doc, entry.id(), backend, config)?;
    let key_file = key_path(out_dir, backend);
    debug!(%key, entry = entry.id(), "translation key");

    if !force && std::fs::read_to_string(&key_file).is_ok_and(|k| k.trim() == key) {
        println!("Up to date: {} ({})", out_dir.display(), backend);
        return Ok(false);
    }

    let translator = translator_for(backend);
    let (filename, translation) = translate_entry(translator, &entry, config)?;
    for d in &translation.diagnostics {
        warn!(entry = entry.id(), "{}", d);
    }

    std::fs::create_dir_all(out_dir)?;
    write_file(&out_dir.join(&filename), &translation.text)?;
    if !translation.auxiliary.is_empty() {
        let tools_dir = out_dir.join("tools");
        std::fs::create_dir_all(&tools_dir)?;
        for (name, text) in &translation.auxiliary {
            write_file(&tools_dir.join(name), text)?;
        }
    }

    let (inputs_name, inputs) = entry_inputs(translator, &entry, config)?;
    write_file(&out_dir.join(inputs_name), &stringify_translated_inputs(&inputs)?)?;

    if config.with_resource_overrides {
        let node = match &entry {
            Entry::Workflow(w) => Some(Node::Workflow(w)),
            Entry::Tool(t) => Some(Node::Tool(t)),
            Entry::CodeTool(_) => None,
        };
        if let Some(node) = node {
            let resources = translator.build_resources_input(node, &config.hints, config.max_cores, config.max_mem, config.max_duration)?;
            write_file(
                &out_dir.join(translator.resources_filename(node)),
                &serde_json::to_string_pretty(&resources)?,
            )?;
        }
    }

    std::fs::write(&key_file, &key)?;
    debug!(digest = %fingerprint::output_digest(&translation), "output digest");
    println!(
        "Translated {} -> {} ({} files, {} warnings)",
        entry.id(),
        out_dir.join(&filename).display(),
        1 + translation.auxiliary.len(),
        translation.diagnostics.len()
    );
    Ok(true)
}

/// Inputs file JSON for the entry, every value a string unless `raw`.
pub fn cmd_inputs(file: &Path, backend: Backend, entry: Option<&str>, config: &TranslationConfig, raw: bool) -> Result<String> {
    let doc = parse_and_validate(file)?;
    let entry = doc.entry(entry)?;
    let (_, inputs) = entry_inputs(translator_for(backend), &entry, config)?;
    if raw {
        Ok(serde_json::to_string_pretty(&inputs)?)
    } else {
        stringify_translated_inputs(&inputs)
    }
}

/// Resources JSON for the entry (per step for workflows).
pub fn cmd_resources(file: &Path, entry: Option<&str>, config: &TranslationConfig) -> Result<String> {
    let doc = parse_and_validate(file)?;
    let entry = doc.entry(entry)?;
    let lowered;
    let node = match &entry {
        Entry::Tool(t) => Node::Tool(t),
        Entry::CodeTool(c) => {
            lowered = c.to_command_tool();
            Node::Tool(&lowered)
        }
        Entry::Workflow(w) => Node::Workflow(w),
    };
    let resources = crate::core::translator::build_resources_input(
        node,
        &config.hints,
        config.max_cores,
        config.max_mem,
        config.max_duration,
    )?;
    Ok(serde_json::to_string_pretty(&resources)?)
}

pub fn cmd_fingerprint(file: &Path, backend: Backend, entry: Option<&str>, config: &TranslationConfig) -> Result<String> {
    let doc = parse_and_validate(file)?;
    let entry = doc.entry(entry)?;
    fingerprint::translation_key(&doc, entry.id(), backend, config)
}
