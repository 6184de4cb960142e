//! PF-003: IR document parsing and validation.
//!
//! An IR document holds a tool table plus at most one entry point:
//! - `tool`: id of the tool to translate on its own
//! - `code_tool`: an inline code tool
//! - `workflow`: a step graph whose steps name tools by id (and version)
//!
//! Structural checks collect every problem before reporting, the way a
//! config linter would.

use super::error::{Result, TranslateError};
use super::expr::{Expression, Selector, RUNTIME_PREFIX};
use super::types::{versioned_id, CodeTool, InputNode, OutputNode, Tool, Workflow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Top-level IR document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IrDocument {
    #[serde(default)]
    pub tools: Vec<Tool>,

    /// Id of the tool translated when no workflow is given
    #[serde(default)]
    pub tool: Option<String>,

    #[serde(default)]
    pub code_tool: Option<CodeTool>,

    #[serde(default)]
    pub workflow: Option<WorkflowDoc>,
}

/// Workflow as written in YAML: steps name tools instead of holding handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDoc {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputNode>,
    #[serde(default)]
    pub steps: Vec<StepDoc>,
    #[serde(default)]
    pub outputs: Vec<OutputNode>,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDoc {
    pub id: String,
    /// Tool id in the document's tool table
    pub tool: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "in")]
    pub sources: IndexMap<String, Expression>,
    #[serde(default)]
    pub doc: Option<String>,
}

/// The node a document asks to translate.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Tool(Tool),
    CodeTool(CodeTool),
    Workflow(Workflow),
}

impl Entry {
    pub fn id(&self) -> &str {
        match self {
            Self::Tool(t) => &t.id,
            Self::CodeTool(c) => &c.id,
            Self::Workflow(w) => &w.id,
        }
    }
}

/// Parse an IR document from disk.
pub fn parse_ir_file(path: &Path) -> Result<IrDocument> {
    let content = std::fs::read_to_string(path)?;
    parse_ir(&content)
}

/// Parse an IR document from a string.
pub fn parse_ir(yaml: &str) -> Result<IrDocument> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

impl IrDocument {
    /// A tool by id, and by version when one is given.
    pub fn find_tool(&self, id: &str, version: Option<&str>) -> Option<&Tool> {
        self.tools
            .iter()
            .find(|t| t.id == id && (version.is_none() || t.version.as_deref() == version))
    }

    /// Tool table entry or the inline code tool lowered to a command tool.
    fn step_tool(&self, id: &str, version: Option<&str>) -> Option<Tool> {
        if let Some(t) = self.find_tool(id, version) {
            return Some(t.clone());
        }
        self.code_tool
            .as_ref()
            .filter(|c| c.id == id && (version.is_none() || c.version.as_deref() == version))
            .map(CodeTool::to_command_tool)
    }

    /// Build the workflow arena, resolving step tool names to handles.
    pub fn build_workflow(&self) -> Result<Option<Workflow>> {
        let Some(doc) = &self.workflow else {
            return Ok(None);
        };
        let mut wf = Workflow::new(doc.id.clone());
        wf.version = doc.version.clone();
        wf.doc = doc.doc.clone();
        wf.inputs = doc.inputs.clone();
        wf.outputs = doc.outputs.clone();
        for step in &doc.steps {
            let tool = self
                .step_tool(&step.tool, step.version.as_deref())
                .ok_or_else(|| TranslateError::UnknownNode {
                    kind: "tool",
                    id: versioned_id(&step.tool, step.version.as_deref()),
                })?;
            let sources = step.sources.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
            wf.add_step(&step.id, tool, sources);
            if let Some(last) = wf.steps.last_mut() {
                last.doc = step.doc.clone();
            }
        }
        Ok(Some(wf))
    }

    /// The node to translate: `name` if given, else the workflow, the named
    /// `tool`, the code tool, or the only tool in the table.
    pub fn entry(&self, name: Option<&str>) -> Result<Entry> {
        if let Some(name) = name {
            if let Some(wf) = self.build_workflow()?.filter(|w| w.id == name) {
                return Ok(Entry::Workflow(wf));
            }
            if let Some(c) = self.code_tool.as_ref().filter(|c| c.id == name) {
                return Ok(Entry::CodeTool(c.clone()));
            }
            return self
                .find_tool(name, None)
                .map(|t| Entry::Tool(t.clone()))
                .ok_or_else(|| TranslateError::UnknownNode {
                    kind: "entry",
                    id: name.to_string(),
                });
        }
        if let Some(wf) = self.build_workflow()? {
            return Ok(Entry::Workflow(wf));
        }
        if let Some(id) = &self.tool {
            return self.entry(Some(id));
        }
        if let Some(c) = &self.code_tool {
            return Ok(Entry::CodeTool(c.clone()));
        }
        match self.tools.as_slice() {
            [only] => Ok(Entry::Tool(only.clone())),
            [] => Err(TranslateError::InvalidIr("document defines nothing to translate".to_string())),
            many => Err(TranslateError::InvalidIr(format!(
                "document defines {} tools; name one with `tool:` or --entry",
                many.len()
            ))),
        }
    }
}

/// Validate a parsed document. Returns a list of errors (empty = valid).
pub fn validate_ir(doc: &IrDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    let mut seen_tools = HashSet::new();
    let code_tool = doc.code_tool.as_ref().map(|c| (c.id.as_str(), c.version.as_deref(), &c.inputs, &c.outputs));
    let tables = doc
        .tools
        .iter()
        .map(|t| (t.id.as_str(), t.version.as_deref(), &t.inputs, &t.outputs))
        .chain(code_tool);
    for (id, version, inputs, outputs) in tables {
        if id.is_empty() {
            push("tool id must not be empty".to_string());
            continue;
        }
        if !seen_tools.insert(versioned_id(id, version)) {
            push(format!("tool '{}' is defined more than once", versioned_id(id, version)));
        }
        let mut seen = HashSet::new();
        for i in inputs {
            if !seen.insert(i.id.as_str()) {
                push(format!("tool '{}' declares input '{}' twice", id, i.id));
            }
            if i.id.starts_with(RUNTIME_PREFIX) {
                push(format!("tool '{}' input '{}' uses the reserved prefix '{}'", id, i.id, RUNTIME_PREFIX));
            }
        }
        let mut seen = HashSet::new();
        for o in outputs {
            if !seen.insert(o.id.as_str()) {
                push(format!("tool '{}' declares output '{}' twice", id, o.id));
            }
        }
    }

    if let Some(name) = &doc.tool {
        if doc.find_tool(name, None).is_none() {
            push(format!("entry tool '{}' is not in the tool table", name));
        }
    }

    if let Some(wf) = &doc.workflow {
        validate_workflow(doc, wf, &mut push);
    }

    errors
}

fn validate_workflow(doc: &IrDocument, wf: &WorkflowDoc, push: &mut impl FnMut(String)) {
    let mut nodes = HashSet::new();
    for i in &wf.inputs {
        if !nodes.insert(i.id.as_str()) {
            push(format!("workflow node '{}' is defined more than once", i.id));
        }
    }
    for s in &wf.steps {
        if !nodes.insert(s.id.as_str()) {
            push(format!("workflow node '{}' is defined more than once", s.id));
        }
    }

    let check = |owner: &str, expr: &Expression, push: &mut dyn FnMut(String)| {
        for sel in expr.selectors() {
            match sel {
                Selector::WorkflowInput(id) if !wf.inputs.iter().any(|i| &i.id == id) => {
                    push(format!("{} references unknown workflow input '{}'", owner, id));
                }
                Selector::StepOutput { step, output } => {
                    if step == owner {
                        push(format!("step '{}' references its own output '{}'", step, output));
                        continue;
                    }
                    let Some(target) = wf.steps.iter().find(|s| &s.id == step) else {
                        push(format!("{} references unknown step '{}'", owner, step));
                        continue;
                    };
                    // unknown tools are reported on the step itself
                    let Some(tool) = doc.step_tool(&target.tool, target.version.as_deref()) else {
                        continue;
                    };
                    if !tool.outputs.iter().any(|o| &o.id == output) {
                        push(format!("{} references unknown output '{}/{}'", owner, step, output));
                    }
                }
                _ => {}
            }
        }
    };

    for i in &wf.inputs {
        if let Some(default) = &i.default {
            check(&format!("input '{}'", i.id), default, push);
        }
    }
    for s in &wf.steps {
        let Some(tool) = doc.step_tool(&s.tool, s.version.as_deref()) else {
            push(format!(
                "step '{}' references unknown tool '{}'",
                s.id,
                versioned_id(&s.tool, s.version.as_deref())
            ));
            continue;
        };
        for (key, source) in &s.sources {
            if tool.input(key).is_none() {
                push(format!("step '{}' binds unknown input '{}' of tool '{}'", s.id, key, tool.id));
            }
            check(&s.id, source, push);
        }
    }
    for o in &wf.outputs {
        check(&format!("output '{}'", o.id), &o.source, push);
    }
}
