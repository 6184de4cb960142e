//! PF-001: IR types — data types, tools, code tools and workflows.
//!
//! Everything derives Serialize/Deserialize so an IR document can be loaded
//! from YAML and hashed as canonical JSON. The IR is read-only during
//! translation.

use super::error::{Result, TranslateError};
use super::expr::{Expression, Literal};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Backends
// ============================================================================

/// Target workflow language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Nextflow,
    Cwl,
    Wdl,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Self::Nextflow, Self::Cwl, Self::Wdl];

    /// File extension of the primary artifact.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Nextflow => "nf",
            Self::Cwl => "cwl",
            Self::Wdl => "wdl",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nextflow => write!(f, "nextflow"),
            Self::Cwl => write!(f, "cwl"),
            Self::Wdl => write!(f, "wdl"),
        }
    }
}

impl FromStr for Backend {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nextflow" | "nf" => Ok(Self::Nextflow),
            "cwl" => Ok(Self::Cwl),
            "wdl" => Ok(Self::Wdl),
            _ => Err(TranslateError::UnknownBackend(s.to_string())),
        }
    }
}

// ============================================================================
// Data types
// ============================================================================

/// A parameter type with its optionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    #[serde(flatten)]
    pub kind: TypeKind,

    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeKind {
    Boolean,
    String,
    Int,
    Float,
    Double,
    File {
        /// Known suffixes of the primary file, stripped by `remove_file_extension`
        #[serde(default)]
        extensions: Vec<String>,
        /// Secondary-file suffixes staged next to the primary
        #[serde(default)]
        secondaries: Vec<String>,
    },
    Directory,
    Array {
        of: Box<DataType>,
    },
    /// Generated output name: `<stem or "generated"><extension>` when unset
    Filename {
        #[serde(default)]
        stem: Option<Box<Expression>>,
        #[serde(default)]
        extension: Option<String>,
    },
    Stdout,
    Stderr,
}

impl DataType {
    fn of(kind: TypeKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }

    pub fn boolean() -> Self {
        Self::of(TypeKind::Boolean)
    }

    pub fn string() -> Self {
        Self::of(TypeKind::String)
    }

    pub fn int() -> Self {
        Self::of(TypeKind::Int)
    }

    pub fn float() -> Self {
        Self::of(TypeKind::Float)
    }

    pub fn double() -> Self {
        Self::of(TypeKind::Double)
    }

    pub fn file() -> Self {
        Self::file_with(&[], &[])
    }

    pub fn file_with(extensions: &[&str], secondaries: &[&str]) -> Self {
        Self::of(TypeKind::File {
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            secondaries: secondaries.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn directory() -> Self {
        Self::of(TypeKind::Directory)
    }

    pub fn array(of: DataType) -> Self {
        Self::of(TypeKind::Array { of: Box::new(of) })
    }

    pub fn filename(stem: Option<Expression>, extension: Option<&str>) -> Self {
        Self::of(TypeKind::Filename {
            stem: stem.map(Box::new),
            extension: extension.map(str::to_string),
        })
    }

    pub fn stdout() -> Self {
        Self::of(TypeKind::Stdout)
    }

    pub fn stderr() -> Self {
        Self::of(TypeKind::Stderr)
    }

    /// Same type, marked optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    /// Innermost non-array type.
    pub fn fundamental(&self) -> &DataType {
        let mut current = self;
        while let TypeKind::Array { of } = &current.kind {
            current = of;
        }
        current
    }

    /// True for File and Directory (not arrays of them).
    pub fn is_path(&self) -> bool {
        matches!(self.kind, TypeKind::File { .. } | TypeKind::Directory)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TypeKind::Boolean)
    }

    /// Known extensions of a File (or of an array's File items).
    pub fn extensions(&self) -> &[String] {
        match &self.fundamental().kind {
            TypeKind::File { extensions, .. } => extensions,
            _ => &[],
        }
    }

    /// Secondary-file suffixes; arrays report their items' secondaries.
    pub fn secondaries(&self) -> &[String] {
        match &self.fundamental().kind {
            TypeKind::File { secondaries, .. } => secondaries,
            _ => &[],
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Boolean => write!(f, "Boolean")?,
            TypeKind::String => write!(f, "String")?,
            TypeKind::Int => write!(f, "Int")?,
            TypeKind::Float => write!(f, "Float")?,
            TypeKind::Double => write!(f, "Double")?,
            TypeKind::File { .. } => write!(f, "File")?,
            TypeKind::Directory => write!(f, "Directory")?,
            TypeKind::Array { of } => write!(f, "Array<{}>", of)?,
            TypeKind::Filename { .. } => write!(f, "Filename")?,
            TypeKind::Stdout => write!(f, "Stdout")?,
            TypeKind::Stderr => write!(f, "Stderr")?,
        }
        if self.optional {
            write!(f, "?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Tools
// ============================================================================

/// A declared tool input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    pub id: String,

    #[serde(flatten)]
    pub data_type: DataType,

    #[serde(default)]
    pub prefix: Option<String>,

    /// Command-line position; inputs with neither prefix nor position stay off the command line
    #[serde(default)]
    pub position: Option<i32>,

    /// Join array values with this separator instead of repeating
    #[serde(default)]
    pub separator: Option<String>,

    #[serde(default)]
    pub prefix_applies_to_all_elements: bool,

    #[serde(default = "default_true")]
    pub separate_value_from_prefix: bool,

    #[serde(default)]
    pub default: Option<Literal>,

    #[serde(default)]
    pub doc: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ToolInput {
    pub fn new(id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            data_type,
            prefix: None,
            position: None,
            separator: None,
            prefix_applies_to_all_elements: false,
            separate_value_from_prefix: true,
            default: None,
            doc: None,
        }
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = Some(separator.to_string());
        self
    }

    pub fn prefix_all(mut self) -> Self {
        self.prefix_applies_to_all_elements = true;
        self
    }

    pub fn no_space(mut self) -> Self {
        self.separate_value_from_prefix = false;
        self
    }

    pub fn default(mut self, value: Literal) -> Self {
        self.default = Some(value);
        self
    }

    /// Whether the input is rendered on the command line.
    pub fn is_bound(&self) -> bool {
        self.prefix.is_some() || self.position.is_some()
    }

    /// Prefix followed by its separating space (if any).
    pub fn prefix_text(&self) -> String {
        match &self.prefix {
            Some(p) if self.separate_value_from_prefix && !self.data_type.is_boolean() => {
                format!("{} ", p)
            }
            Some(p) => p.clone(),
            None => String::new(),
        }
    }
}

/// A declared tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub id: String,

    #[serde(flatten)]
    pub data_type: DataType,

    #[serde(default)]
    pub selector: Option<Expression>,

    #[serde(default)]
    pub glob: Option<Expression>,

    #[serde(default)]
    pub doc: Option<String>,
}

impl ToolOutput {
    pub fn new(id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            data_type,
            selector: None,
            glob: None,
            doc: None,
        }
    }

    pub fn glob(mut self, glob: Expression) -> Self {
        self.glob = Some(glob);
        self
    }

    pub fn selector(mut self, selector: Expression) -> Self {
        self.selector = Some(selector);
        self
    }

    /// The expression locating the artifact: selector first, then glob.
    pub fn locator(&self) -> Option<&Expression> {
        self.selector.as_ref().or(self.glob.as_ref())
    }
}

/// Fixed command-line argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolArgument {
    pub value: Expression,

    #[serde(default)]
    pub position: Option<i32>,

    #[serde(default)]
    pub prefix: Option<String>,

    /// Single-quote the value on the command line
    #[serde(default)]
    pub shell_quote: bool,
}

impl ToolArgument {
    pub fn new(value: impl Into<Expression>, position: i32) -> Self {
        Self {
            value: value.into(),
            position: Some(position),
            prefix: None,
            shell_quote: false,
        }
    }
}

/// Resource requests for one hint value (e.g. `captureType: targeted`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintedResources {
    pub hint: String,
    pub value: String,
    #[serde(default)]
    pub cpu: Option<i64>,
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub disk: Option<f64>,
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Resource hints of a tool. Memory and disk are in GB, duration in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceHints {
    #[serde(default)]
    pub cpu: Option<Expression>,
    #[serde(default)]
    pub memory: Option<Expression>,
    #[serde(default)]
    pub disk: Option<Expression>,
    #[serde(default)]
    pub duration: Option<Expression>,
    #[serde(default)]
    pub hinted: Vec<HintedResources>,
}

impl ResourceHints {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.disk.is_none() && self.duration.is_none()
    }
}

/// A command-line tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub base_command: Vec<String>,

    #[serde(default)]
    pub inputs: Vec<ToolInput>,

    #[serde(default)]
    pub outputs: Vec<ToolOutput>,

    #[serde(default)]
    pub arguments: Vec<ToolArgument>,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default)]
    pub resources: ResourceHints,

    /// Files written into the working directory before the command runs
    #[serde(default)]
    pub files_to_create: IndexMap<String, String>,

    #[serde(default)]
    pub doc: Option<String>,
}

impl Tool {
    /// Identifier including the version, safe for file and symbol names.
    pub fn versioned_id(&self) -> String {
        versioned_id(&self.id, self.version.as_deref())
    }

    /// Input table keyed by id, in declaration order.
    pub fn inputs_map(&self) -> IndexMap<String, ToolInput> {
        self.inputs
            .iter()
            .map(|i| (i.id.clone(), i.clone()))
            .collect()
    }

    pub fn input(&self, id: &str) -> Option<&ToolInput> {
        self.inputs.iter().find(|i| i.id == id)
    }
}

/// `id` or `id_<version>` with every non-alphanumeric character replaced by `_`.
pub fn versioned_id(id: &str, version: Option<&str>) -> String {
    match version {
        Some(v) if !v.is_empty() => {
            let clean: String = v
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("{}_{}", id, clean)
        }
        _ => id.to_string(),
    }
}

/// A tool whose body is a script in an interpreted language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeTool {
    pub id: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    pub source: String,

    #[serde(default)]
    pub inputs: Vec<ToolInput>,

    #[serde(default)]
    pub outputs: Vec<ToolOutput>,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default)]
    pub resources: ResourceHints,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

impl CodeTool {
    pub fn script_name(&self) -> String {
        format!("{}-script", self.id)
    }

    /// Lower into a command tool that writes the script and runs it.
    ///
    /// Every input becomes a `--<id>` option; positions follow declaration order.
    pub fn to_command_tool(&self) -> Tool {
        let script = self.script_name();
        let inputs = self
            .inputs
            .iter()
            .enumerate()
            .map(|(idx, inp)| {
                let mut inp = inp.clone();
                if inp.prefix.is_none() {
                    inp.prefix = Some(format!("--{}", inp.id));
                }
                if inp.position.is_none() {
                    inp.position = Some(idx as i32 + 1);
                }
                inp
            })
            .collect();
        Tool {
            id: self.id.clone(),
            version: self.version.clone(),
            base_command: vec![self.interpreter.clone(), script.clone()],
            inputs,
            outputs: self.outputs.clone(),
            arguments: vec![],
            container: self.container.clone(),
            resources: self.resources.clone(),
            files_to_create: IndexMap::from([(script, self.source.clone())]),
            doc: None,
        }
    }
}

// ============================================================================
// Workflows
// ============================================================================

/// Index of a tool in a workflow's tool arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolHandle(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputNode {
    pub id: String,
    #[serde(flatten)]
    pub data_type: DataType,
    #[serde(default)]
    pub default: Option<Expression>,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: String,
    pub tool: ToolHandle,
    /// Tool input id -> expression over workflow inputs and step outputs
    #[serde(default)]
    pub sources: IndexMap<String, Expression>,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputNode {
    pub id: String,
    pub source: Expression,
}

/// A step graph. Steps reference tools by handle and each other by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub inputs: Vec<InputNode>,
    #[serde(default)]
    pub steps: Vec<StepNode>,
    #[serde(default)]
    pub outputs: Vec<OutputNode>,
    #[serde(default)]
    pub doc: Option<String>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn versioned_id(&self) -> String {
        versioned_id(&self.id, self.version.as_deref())
    }

    /// Add a tool to the arena, reusing an identical one already present.
    pub fn add_tool(&mut self, tool: Tool) -> ToolHandle {
        if let Some(idx) = self.tools.iter().position(|t| *t == tool) {
            return ToolHandle(idx);
        }
        self.tools.push(tool);
        ToolHandle(self.tools.len() - 1)
    }

    pub fn add_input(&mut self, id: &str, data_type: DataType, default: Option<Expression>) {
        self.inputs.push(InputNode {
            id: id.to_string(),
            data_type,
            default,
            doc: None,
        });
    }

    pub fn add_step(&mut self, id: &str, tool: Tool, sources: Vec<(&str, Expression)>) {
        let handle = self.add_tool(tool);
        self.steps.push(StepNode {
            id: id.to_string(),
            tool: handle,
            sources: sources
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            doc: None,
        });
    }

    pub fn add_output(&mut self, id: &str, source: Expression) {
        self.outputs.push(OutputNode {
            id: id.to_string(),
            source,
        });
    }

    pub fn tool(&self, handle: ToolHandle) -> Result<&Tool> {
        self.tools.get(handle.0).ok_or_else(|| TranslateError::UnknownNode {
            kind: "tool handle",
            id: handle.0.to_string(),
        })
    }

    pub fn input(&self, id: &str) -> Option<&InputNode> {
        self.inputs.iter().find(|i| i.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&StepNode> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Type of a step output, resolving the step's tool through the arena.
    pub fn step_output_type(&self, step: &str, output: &str) -> Result<&DataType> {
        let node = self.step(step).ok_or_else(|| TranslateError::UnknownNode {
            kind: "step",
            id: step.to_string(),
        })?;
        let tool = self.tool(node.tool)?;
        tool.outputs
            .iter()
            .find(|o| o.id == output)
            .map(|o| &o.data_type)
            .ok_or_else(|| TranslateError::UnknownNode {
                kind: "step output",
                id: format!("{}/{}", step, output),
            })
    }

    /// Distinct bound tools in first-use order.
    pub fn distinct_tools(&self) -> Result<Vec<&Tool>> {
        let mut seen: Vec<String> = Vec::new();
        let mut tools = Vec::new();
        for step in &self.steps {
            let tool = self.tool(step.tool)?;
            let key = tool.versioned_id();
            if !seen.contains(&key) {
                seen.push(key);
                tools.push(tool);
            }
        }
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pf001_fundamental_nested_array() {
        let t = DataType::array(DataType::array(DataType::file()));
        assert!(t.is_array());
        assert_eq!(t.fundamental(), &DataType::file());
    }

    #[test]
    fn test_pf001_secondaries_through_arrays() {
        let bam = DataType::file_with(&[".bam"], &[".bai"]);
        let arr = DataType::array(bam.clone());
        assert_eq!(arr.secondaries(), &[".bai".to_string()]);
        assert_eq!(arr.extensions(), &[".bam".to_string()]);
        assert!(DataType::string().secondaries().is_empty());
    }

    #[test]
    fn test_pf001_display() {
        let t = DataType::array(DataType::int()).optional();
        assert_eq!(t.to_string(), "Array<Int>?");
    }

    #[test]
    fn test_pf001_yaml_types() {
        let t: DataType = serde_yaml_ng::from_str("{type: string, optional: true}").unwrap();
        assert_eq!(t, DataType::string().optional());

        let yaml = r#"
type: array
of:
  type: file
  secondaries: [".bai"]
"#;
        let t: DataType = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(t, DataType::array(DataType::file_with(&[], &[".bai"])));
    }

    #[test]
    fn test_pf001_tool_input_defaults() {
        let yaml = r#"
id: reads
type: file
prefix: "-I"
"#;
        let inp: ToolInput = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(inp.separate_value_from_prefix);
        assert!(!inp.prefix_applies_to_all_elements);
        assert!(inp.is_bound());
        assert_eq!(inp.prefix_text(), "-I ");
    }

    #[test]
    fn test_pf001_prefix_text_variants() {
        let inp = ToolInput::new("x", DataType::string()).prefix("--x=").no_space();
        assert_eq!(inp.prefix_text(), "--x=");
        let flag = ToolInput::new("f", DataType::boolean()).prefix("-f");
        assert_eq!(flag.prefix_text(), "-f");
        let bare = ToolInput::new("b", DataType::string()).position(1);
        assert_eq!(bare.prefix_text(), "");
    }

    #[test]
    fn test_pf001_versioned_id() {
        assert_eq!(versioned_id("bwa", None), "bwa");
        assert_eq!(versioned_id("bwa", Some("")), "bwa");
        assert_eq!(versioned_id("bwa", Some("v0.7.17")), "bwa_v0_7_17");
    }

    #[test]
    fn test_pf001_backend_parse() {
        assert_eq!("CWL".parse::<Backend>().unwrap(), Backend::Cwl);
        assert_eq!("nf".parse::<Backend>().unwrap(), Backend::Nextflow);
        assert!("snakemake".parse::<Backend>().is_err());
        assert_eq!(Backend::Wdl.extension(), "wdl");
    }

    #[test]
    fn test_pf001_code_tool_lowering() {
        let ct = CodeTool {
            id: "sum".to_string(),
            version: None,
            interpreter: "python3".to_string(),
            source: "print(1)".to_string(),
            inputs: vec![ToolInput::new("a", DataType::int())],
            outputs: vec![ToolOutput::new("out", DataType::stdout())],
            container: Some("python:3.11".to_string()),
            resources: ResourceHints::default(),
        };
        let tool = ct.to_command_tool();
        assert_eq!(tool.base_command, vec!["python3", "sum-script"]);
        assert_eq!(tool.inputs[0].prefix.as_deref(), Some("--a"));
        assert_eq!(tool.inputs[0].position, Some(1));
        assert_eq!(tool.files_to_create["sum-script"], "print(1)");
    }

    #[test]
    fn test_pf001_workflow_arena_dedup() {
        let tool = Tool {
            id: "echo".to_string(),
            ..Default::default()
        };
        let mut wf = Workflow::new("wf");
        wf.add_step("a", tool.clone(), vec![]);
        wf.add_step("b", tool, vec![]);
        assert_eq!(wf.tools.len(), 1);
        assert_eq!(wf.steps[0].tool, wf.steps[1].tool);
        assert_eq!(wf.distinct_tools().unwrap().len(), 1);
    }

    #[test]
    fn test_pf001_step_output_type() {
        let tool = Tool {
            id: "echo".to_string(),
            outputs: vec![ToolOutput::new("out", DataType::stdout())],
            ..Default::default()
        };
        let mut wf = Workflow::new("wf");
        wf.add_step("a", tool, vec![]);
        assert_eq!(wf.step_output_type("a", "out").unwrap(), &DataType::stdout());
        assert!(wf.step_output_type("a", "nope").is_err());
        assert!(wf.step_output_type("zz", "out").is_err());
    }
}
