//! PF-006: Translator contract and the operations every backend shares.
//!
//! A backend implements [`Translator`] for tool and workflow rendering; the
//! provided methods (inputs file, resources file, file naming) are the same
//! for every backend and live here as free functions.

use super::config::ContainerOverride;
use super::error::{Result, TranslateError};
use super::expr::{Expression, Literal, RuntimeResource, Selector, StringFormatter};
use super::resolver::Diagnostic;
use super::types::{Backend, CodeTool, DataType, ResourceHints, Tool, ToolArgument, ToolInput, TypeKind, Workflow};
use indexmap::IndexMap;
use serde_json::Value;
use std::borrow::Cow;

/// Default CPU count when a tool declares none.
pub const DEFAULT_CPU: i64 = 1;
/// Default memory in GB.
pub const DEFAULT_MEMORY_GB: f64 = 4.0;
/// Default disk in GB.
pub const DEFAULT_DISK_GB: f64 = 20.0;
/// Default walltime in seconds.
pub const DEFAULT_DURATION_S: i64 = 86400;

/// Placeholder prefix for File/Directory inputs with no value.
pub const NO_FILE_PREFIX: &str = "NO_FILE";

/// Stdout capture file name used by script-style backends.
pub const STDOUT_FILENAME: &str = "tool.stdout";
pub const STDERR_FILENAME: &str = "tool.stderr";

#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    pub with_container: bool,
    pub with_resource_overrides: bool,
    pub allow_empty_container: bool,
    pub container_override: Option<ContainerOverride>,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            with_container: true,
            with_resource_overrides: false,
            allow_empty_container: false,
            container_override: None,
        }
    }
}

/// Inputs for [`build_inputs_file`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputsRequest {
    pub additional_inputs: IndexMap<String, Value>,
    pub hints: IndexMap<String, String>,
    pub merge_resources: bool,
    pub max_cores: Option<i64>,
    pub max_mem: Option<f64>,
    pub max_duration: Option<i64>,
}

/// A translated tool document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// A translated workflow plus one auxiliary document per distinct tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowTranslation {
    pub text: String,
    /// `tools/`-relative file name -> document text
    pub auxiliary: IndexMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Either kind of translatable node.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Tool(&'a Tool),
    Workflow(&'a Workflow),
}

impl Node<'_> {
    pub fn id(&self) -> &str {
        match self {
            Self::Tool(t) => &t.id,
            Self::Workflow(w) => &w.id,
        }
    }

    pub fn versioned_id(&self) -> String {
        match self {
            Self::Tool(t) => t.versioned_id(),
            Self::Workflow(w) => w.versioned_id(),
        }
    }
}

impl<'a> From<&'a Tool> for Node<'a> {
    fn from(t: &'a Tool) -> Self {
        Self::Tool(t)
    }
}

impl<'a> From<&'a Workflow> for Node<'a> {
    fn from(w: &'a Workflow) -> Self {
        Self::Workflow(w)
    }
}

/// One backend. Implementations are stateless.
pub trait Translator: Send + Sync {
    fn backend(&self) -> Backend;

    fn translate_tool(&self, tool: &Tool, opts: &TranslateOptions) -> Result<Translation>;

    fn translate_code_tool(&self, _code_tool: &CodeTool, _opts: &TranslateOptions) -> Result<Translation> {
        Err(TranslateError::UnsupportedCodeTool {
            backend: self.backend().to_string(),
        })
    }

    fn translate_workflow(&self, workflow: &Workflow, opts: &TranslateOptions) -> Result<WorkflowTranslation>;

    fn build_inputs_file(&self, node: Node<'_>, request: &InputsRequest) -> Result<IndexMap<String, Option<Value>>> {
        build_inputs_file(node, request)
    }

    fn build_resources_input(
        &self,
        node: Node<'_>,
        hints: &IndexMap<String, String>,
        max_cores: Option<i64>,
        max_mem: Option<f64>,
        max_duration: Option<i64>,
    ) -> Result<IndexMap<String, Value>> {
        build_resources_input(node, hints, max_cores, max_mem, max_duration)
    }

    fn tool_filename(&self, tool: &Tool) -> String {
        format!("{}.{}", tool.versioned_id(), self.backend().extension())
    }

    fn workflow_filename(&self, workflow: &Workflow) -> String {
        format!("{}.{}", workflow.versioned_id(), self.backend().extension())
    }

    fn inputs_filename(&self, node: Node<'_>) -> String {
        format!("{}.input.json", node.versioned_id())
    }

    fn resources_filename(&self, node: Node<'_>) -> String {
        format!("{}-resources.json", node.id())
    }
}

// ============================================================================
// Inputs and resources files
// ============================================================================

/// Initial values for every input of a tool or workflow.
///
/// Lookup order: additional inputs, literal default, `NO_FILE<n>` for
/// File/Directory inputs (numbered from 1 in input order), `""`.
pub fn build_inputs_file(node: Node<'_>, request: &InputsRequest) -> Result<IndexMap<String, Option<Value>>> {
    let declared: Vec<(&str, &DataType, Option<&Literal>)> = match node {
        Node::Tool(t) => t
            .inputs
            .iter()
            .map(|i| (i.id.as_str(), &i.data_type, i.default.as_ref()))
            .collect(),
        Node::Workflow(w) => w
            .inputs
            .iter()
            .map(|i| {
                let default = i.default.as_ref().and_then(Expression::as_literal);
                (i.id.as_str(), &i.data_type, default)
            })
            .collect(),
    };

    let mut count = 0;
    let mut values = IndexMap::new();
    for (id, data_type, default) in declared {
        let value = if let Some(v) = request.additional_inputs.get(id) {
            Some(v.clone())
        } else if let Some(lit) = default {
            match lit {
                Literal::Null => None,
                other => Some(other.to_json()),
            }
        } else if data_type.is_path() {
            count += 1;
            Some(Value::String(format!("{}{}", NO_FILE_PREFIX, count)))
        } else {
            Some(Value::String(String::new()))
        };
        values.insert(id.to_string(), value);
    }

    if request.merge_resources {
        let resources = build_resources_input(
            node,
            &request.hints,
            request.max_cores,
            request.max_mem,
            request.max_duration,
        )?;
        for (k, v) in resources {
            let value = request.additional_inputs.get(&k).cloned().unwrap_or(v);
            values.insert(k, Some(value));
        }
    }

    Ok(values)
}

/// Resource values per tool (or per workflow step), capped by the ceilings.
pub fn build_resources_input(
    node: Node<'_>,
    hints: &IndexMap<String, String>,
    max_cores: Option<i64>,
    max_mem: Option<f64>,
    max_duration: Option<i64>,
) -> Result<IndexMap<String, Value>> {
    let mut out = IndexMap::new();
    let mut add = |prefix: &str, resources: &ResourceHints| {
        let requested = requested_resources(resources, hints);
        let cpu = cap_i64(requested.cpu.unwrap_or(DEFAULT_CPU), max_cores);
        let mem = cap_f64(requested.memory.unwrap_or(DEFAULT_MEMORY_GB), max_mem);
        let disk = requested.disk.unwrap_or(DEFAULT_DISK_GB);
        let duration = cap_i64(requested.duration.unwrap_or(DEFAULT_DURATION_S), max_duration);
        for (resource, value) in [
            (RuntimeResource::Cpu, Value::from(cpu)),
            (RuntimeResource::Memory, Value::from(mem)),
            (RuntimeResource::Disk, Value::from(disk)),
            (RuntimeResource::Duration, Value::from(duration)),
        ] {
            out.insert(step_runtime_input_id(prefix, resource), value);
        }
    };

    match node {
        Node::Tool(t) => add(&t.id, &t.resources),
        Node::Workflow(w) => {
            for step in &w.steps {
                let tool = w.tool(step.tool)?;
                add(&step.id, &tool.resources);
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct Requested {
    cpu: Option<i64>,
    memory: Option<f64>,
    disk: Option<f64>,
    duration: Option<i64>,
}

fn requested_resources(resources: &ResourceHints, hints: &IndexMap<String, String>) -> Requested {
    let literal = |e: &Option<Expression>| {
        e.as_ref()
            .and_then(Expression::as_literal)
            .and_then(Literal::as_f64)
    };
    let mut r = Requested {
        cpu: literal(&resources.cpu).map(|v| v.ceil() as i64),
        memory: literal(&resources.memory),
        disk: literal(&resources.disk),
        duration: literal(&resources.duration).map(|v| v.ceil() as i64),
    };
    for h in &resources.hinted {
        if hints.get(&h.hint) != Some(&h.value) {
            continue;
        }
        r.cpu = h.cpu.or(r.cpu);
        r.memory = h.memory.or(r.memory);
        r.disk = h.disk.or(r.disk);
        r.duration = h.duration.or(r.duration);
    }
    r
}

fn cap_i64(value: i64, ceiling: Option<i64>) -> i64 {
    ceiling.map_or(value, |c| value.min(c))
}

fn cap_f64(value: f64, ceiling: Option<f64>) -> f64 {
    ceiling.map_or(value, |c| value.min(c))
}

/// One JSON object, every value a string, absent values as `""`.
pub fn stringify_translated_inputs(inputs: &IndexMap<String, Option<Value>>) -> Result<String> {
    let flat: IndexMap<&str, String> = inputs
        .iter()
        .map(|(k, v)| {
            let s = match v {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            (k.as_str(), s)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&flat)?)
}

// ============================================================================
// Containers and resource overrides
// ============================================================================

/// Container image for a tool, or None when no directive should be emitted.
pub fn resolve_container(tool_id: &str, own: Option<&str>, opts: &TranslateOptions) -> Result<Option<String>> {
    if !opts.with_container {
        return Ok(None);
    }
    let chosen = opts
        .container_override
        .as_ref()
        .and_then(|o| o.lookup(tool_id))
        .or(own);
    match chosen {
        Some(image) => Ok(Some(image.to_string())),
        None if opts.allow_empty_container => Ok(None),
        None => Err(TranslateError::MissingContainer {
            tool: tool_id.to_string(),
        }),
    }
}

/// Optional inputs backing runtime overrides.
pub fn runtime_inputs() -> Vec<ToolInput> {
    RuntimeResource::ALL
        .iter()
        .map(|r| ToolInput::new(r.input_name(), runtime_type(*r).optional()))
        .collect()
}

pub fn runtime_type(resource: RuntimeResource) -> DataType {
    match resource {
        RuntimeResource::Cpu | RuntimeResource::Duration => DataType::int(),
        RuntimeResource::Memory | RuntimeResource::Disk => DataType::float(),
    }
}

/// `<owner>_runtime_cpu` etc: resources-file key and workflow input id.
pub fn step_runtime_input_id(owner: &str, resource: RuntimeResource) -> String {
    format!("{}_{}", owner, resource.input_name())
}

/// The tool as rendered: with runtime inputs appended when overrides are on.
pub fn prepare_tool<'a>(tool: &'a Tool, opts: &TranslateOptions) -> Cow<'a, Tool> {
    if !opts.with_resource_overrides {
        return Cow::Borrowed(tool);
    }
    let mut owned = tool.clone();
    for inp in runtime_inputs() {
        if owned.input(&inp.id).is_none() {
            owned.inputs.push(inp);
        }
    }
    Cow::Owned(owned)
}

fn default_resource(resource: RuntimeResource) -> Expression {
    match resource {
        RuntimeResource::Cpu => Expression::int(DEFAULT_CPU),
        RuntimeResource::Memory => Expression::Literal(Literal::Float(DEFAULT_MEMORY_GB)),
        RuntimeResource::Disk => Expression::Literal(Literal::Float(DEFAULT_DISK_GB)),
        RuntimeResource::Duration => Expression::int(DEFAULT_DURATION_S),
    }
}

/// Expression for a resource directive, if any should be emitted.
pub fn resource_expression(
    resources: &ResourceHints,
    resource: RuntimeResource,
    opts: &TranslateOptions,
) -> Option<Expression> {
    let declared = match resource {
        RuntimeResource::Cpu => &resources.cpu,
        RuntimeResource::Memory => &resources.memory,
        RuntimeResource::Disk => &resources.disk,
        RuntimeResource::Duration => &resources.duration,
    };
    if !opts.with_resource_overrides {
        return declared.clone();
    }
    let mut options = vec![Expression::runtime(resource)];
    options.extend(declared.clone());
    options.push(default_resource(resource));
    Some(Expression::first(options))
}

// ============================================================================
// Command line
// ============================================================================

/// One element of the command line after the base command.
#[derive(Debug, Clone, Copy)]
pub enum CommandPart<'a> {
    Argument(&'a ToolArgument),
    Input(&'a ToolInput),
}

/// Arguments and bound inputs in ascending position; arguments first on ties.
pub fn command_line_order(tool: &Tool) -> Vec<CommandPart<'_>> {
    let mut parts: Vec<(i32, u8, CommandPart<'_>)> = tool
        .arguments
        .iter()
        .map(|a| (a.position.unwrap_or(0), 0, CommandPart::Argument(a)))
        .chain(
            tool.inputs
                .iter()
                .filter(|i| i.is_bound())
                .map(|i| (i.position.unwrap_or(0), 1, CommandPart::Input(i))),
        )
        .collect();
    parts.sort_by_key(|(pos, rank, _)| (*pos, *rank));
    parts.into_iter().map(|(_, _, p)| p).collect()
}

/// Value of a Filename input when the caller leaves it unset.
pub fn generated_filename(data_type: &DataType) -> Option<Expression> {
    let TypeKind::Filename { stem, extension } = &data_type.fundamental().kind else {
        return None;
    };
    let ext = extension.as_deref().unwrap_or("");
    Some(match stem {
        Some(stem) => StringFormatter::new(format!("{{stem}}{}", ext))
            .slot("stem", (**stem).clone())
            .into(),
        None => Expression::string(format!("generated{}", ext)),
    })
}

// ============================================================================
// Workflow checks
// ============================================================================

/// Every step source names a tool input and every node reference exists.
pub fn check_references(workflow: &Workflow) -> Result<()> {
    let check = |expr: &Expression| -> Result<()> {
        for sel in expr.selectors() {
            match sel {
                Selector::WorkflowInput(id) if workflow.input(id).is_none() => {
                    return Err(TranslateError::UnknownNode {
                        kind: "workflow input",
                        id: id.clone(),
                    });
                }
                Selector::StepOutput { step, output } => {
                    workflow.step_output_type(step, output)?;
                }
                _ => {}
            }
        }
        Ok(())
    };

    for input in &workflow.inputs {
        if let Some(default) = &input.default {
            check(default)?;
        }
    }
    for step in &workflow.steps {
        let tool = workflow.tool(step.tool)?;
        for (key, source) in &step.sources {
            if tool.input(key).is_none() {
                return Err(TranslateError::UnknownInput {
                    selector: key.clone(),
                    tool: tool.id.clone(),
                });
            }
            check(source)?;
        }
    }
    for output in &workflow.outputs {
        check(&output.source)?;
    }
    Ok(())
}

/// The single node a plain reference points at, if the expression is one.
pub fn plain_reference(expr: &Expression) -> Option<&Selector> {
    match expr {
        Expression::Selector(s @ (Selector::WorkflowInput(_) | Selector::StepOutput { .. })) => Some(s),
        _ => None,
    }
}

/// Type of the node a plain reference points at.
pub fn reference_type<'a>(workflow: &'a Workflow, sel: &Selector) -> Result<Option<&'a DataType>> {
    match sel {
        Selector::WorkflowInput(id) => workflow
            .input(id)
            .map(|i| Some(&i.data_type))
            .ok_or_else(|| TranslateError::UnknownNode {
                kind: "workflow input",
                id: id.clone(),
            }),
        Selector::StepOutput { step, output } => workflow.step_output_type(step, output).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HintedResources, ToolOutput};
    use proptest::prelude::*;

    fn tool() -> Tool {
        Tool {
            id: "TestTranslationtool".to_string(),
            version: Some("v0.0.2".to_string()),
            base_command: vec!["echo".to_string()],
            inputs: vec![
                ToolInput::new("testtool", DataType::string()).position(1),
                ToolInput::new("reads", DataType::file()).prefix("-r"),
                ToolInput::new("ref", DataType::directory()),
                ToolInput::new("bams", DataType::array(DataType::file())),
                ToolInput::new("k", DataType::int()).default(Literal::Int(19)),
            ],
            outputs: vec![ToolOutput::new("std", DataType::stdout())],
            container: Some("ubuntu:latest".to_string()),
            resources: ResourceHints {
                cpu: Some(Expression::int(2)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_pf006_inputs_file_lookup_order() {
        let t = tool();
        let req = InputsRequest {
            additional_inputs: IndexMap::from([("testtool".to_string(), Value::from("hi"))]),
            ..Default::default()
        };
        let inputs = build_inputs_file(Node::Tool(&t), &req).unwrap();
        assert_eq!(inputs["testtool"], Some(Value::from("hi")));
        assert_eq!(inputs["reads"], Some(Value::from("NO_FILE1")));
        assert_eq!(inputs["ref"], Some(Value::from("NO_FILE2")));
        assert_eq!(inputs["bams"], Some(Value::from("")));
        assert_eq!(inputs["k"], Some(Value::from(19)));
    }

    #[test]
    fn test_pf006_inputs_file_merges_resources() {
        let t = tool();
        let req = InputsRequest {
            merge_resources: true,
            additional_inputs: IndexMap::from([(
                "TestTranslationtool_runtime_memory".to_string(),
                Value::from(9),
            )]),
            ..Default::default()
        };
        let inputs = build_inputs_file(Node::Tool(&t), &req).unwrap();
        assert_eq!(inputs["TestTranslationtool_runtime_cpu"], Some(Value::from(2)));
        assert_eq!(inputs["TestTranslationtool_runtime_memory"], Some(Value::from(9)));
    }

    #[test]
    fn test_pf006_resources_clamped() {
        let t = tool();
        let r = build_resources_input(Node::Tool(&t), &IndexMap::new(), Some(1), None, None).unwrap();
        assert_eq!(r["TestTranslationtool_runtime_cpu"], Value::from(1));
        assert_eq!(r["TestTranslationtool_runtime_memory"], Value::from(4.0));
        assert_eq!(r["TestTranslationtool_runtime_disk"], Value::from(20.0));
        assert_eq!(r["TestTranslationtool_runtime_seconds"], Value::from(86400));

        let r = build_resources_input(Node::Tool(&t), &IndexMap::new(), None, Some(2.0), Some(60)).unwrap();
        assert_eq!(r["TestTranslationtool_runtime_cpu"], Value::from(2));
        assert_eq!(r["TestTranslationtool_runtime_memory"], Value::from(2.0));
        assert_eq!(r["TestTranslationtool_runtime_seconds"], Value::from(60));
    }

    #[test]
    fn test_pf006_resources_hinted() {
        let mut t = tool();
        t.resources.hinted.push(HintedResources {
            hint: "captureType".to_string(),
            value: "wgs".to_string(),
            cpu: Some(16),
            memory: Some(64.0),
            disk: None,
            duration: None,
        });
        let hints = IndexMap::from([("captureType".to_string(), "wgs".to_string())]);
        let r = build_resources_input(Node::Tool(&t), &hints, None, None, None).unwrap();
        assert_eq!(r["TestTranslationtool_runtime_cpu"], Value::from(16));
        assert_eq!(r["TestTranslationtool_runtime_memory"], Value::from(64.0));

        let other = IndexMap::from([("captureType".to_string(), "exome".to_string())]);
        let r = build_resources_input(Node::Tool(&t), &other, None, None, None).unwrap();
        assert_eq!(r["TestTranslationtool_runtime_cpu"], Value::from(2));
    }

    #[test]
    fn test_pf006_resources_per_step() {
        let mut wf = Workflow::new("wf");
        wf.add_step("align", tool(), vec![]);
        wf.add_step("sort", tool(), vec![]);
        let r = build_resources_input(Node::Workflow(&wf), &IndexMap::new(), None, None, None).unwrap();
        assert!(r.contains_key("align_runtime_cpu"));
        assert!(r.contains_key("sort_runtime_seconds"));
        assert_eq!(r.len(), 8);
    }

    #[test]
    fn test_pf006_stringify() {
        let inputs = IndexMap::from([
            ("a".to_string(), Some(Value::from("x"))),
            ("b".to_string(), None),
            ("c".to_string(), Some(Value::from(3))),
        ]);
        let text = stringify_translated_inputs(&inputs).unwrap();
        let back: IndexMap<String, String> = serde_json::from_str(&text).unwrap();
        assert_eq!(back["a"], "x");
        assert_eq!(back["b"], "");
        assert_eq!(back["c"], "3");
    }

    #[test]
    fn test_pf006_container_precedence() {
        let opts = TranslateOptions {
            container_override: Some(ContainerOverride::PerTool(IndexMap::from([(
                "TESTTRANSLATIONTOOL".to_string(),
                "override:1".to_string(),
            )]))),
            ..Default::default()
        };
        let c = resolve_container("TestTranslationtool", Some("own:1"), &opts).unwrap();
        assert_eq!(c.as_deref(), Some("override:1"));

        let c = resolve_container("other", Some("own:1"), &opts).unwrap();
        assert_eq!(c.as_deref(), Some("own:1"));

        let err = resolve_container("other", None, &opts).unwrap_err();
        assert!(matches!(err, TranslateError::MissingContainer { ref tool } if tool == "other"));

        let lax = TranslateOptions {
            allow_empty_container: true,
            ..Default::default()
        };
        assert_eq!(resolve_container("other", None, &lax).unwrap(), None);

        let off = TranslateOptions {
            with_container: false,
            ..Default::default()
        };
        assert_eq!(resolve_container("other", None, &off).unwrap(), None);
    }

    #[test]
    fn test_pf006_resource_expression_with_overrides() {
        let t = tool();
        let opts = TranslateOptions {
            with_resource_overrides: true,
            ..Default::default()
        };
        let e = resource_expression(&t.resources, RuntimeResource::Cpu, &opts).unwrap();
        assert_eq!(
            e,
            Expression::first(vec![
                Expression::runtime(RuntimeResource::Cpu),
                Expression::int(2),
                Expression::int(1),
            ])
        );
        assert!(resource_expression(&t.resources, RuntimeResource::Memory, &TranslateOptions::default()).is_none());

        let prepared = prepare_tool(&t, &opts);
        assert_eq!(prepared.inputs.len(), t.inputs.len() + 4);
        assert!(prepared.input("runtime_seconds").unwrap().data_type.optional);
    }

    #[test]
    fn test_pf006_command_line_order() {
        let mut t = tool();
        t.arguments.push(ToolArgument::new("--flag", 1));
        t.arguments.push(ToolArgument::new("first", 0));
        let order: Vec<String> = command_line_order(&t)
            .into_iter()
            .map(|p| match p {
                CommandPart::Argument(a) => format!("arg:{}", a.value.as_literal().map(|l| l.to_string()).unwrap_or_default()),
                CommandPart::Input(i) => format!("in:{}", i.id),
            })
            .collect();
        assert_eq!(order, vec!["arg:first", "in:reads", "arg:--flag", "in:testtool"]);
    }

    #[test]
    fn test_pf006_generated_filename() {
        let t = DataType::filename(None, Some(".txt"));
        assert_eq!(generated_filename(&t), Some(Expression::string("generated.txt")));
        let t = DataType::filename(Some(Expression::input("sample")), Some(".bam"));
        let expected: Expression = StringFormatter::new("{stem}.bam")
            .slot("stem", Expression::input("sample"))
            .into();
        assert_eq!(generated_filename(&t), Some(expected));
        assert_eq!(generated_filename(&DataType::string()), None);
    }

    #[test]
    fn test_pf006_check_references() {
        let mut wf = Workflow::new("wf");
        wf.add_input("name", DataType::string(), None);
        wf.add_step("s", tool(), vec![("testtool", Expression::workflow_input("name"))]);
        wf.add_output("out", Expression::step_output("s", "std"));
        assert!(check_references(&wf).is_ok());

        let mut bad = wf.clone();
        bad.add_output("x", Expression::step_output("s", "missing"));
        assert!(matches!(check_references(&bad), Err(TranslateError::UnknownNode { .. })));

        let mut bad = wf.clone();
        bad.steps[0].sources.insert("nope".to_string(), Expression::workflow_input("name"));
        assert!(matches!(check_references(&bad), Err(TranslateError::UnknownInput { .. })));

        let mut bad = wf;
        bad.steps[0].sources.insert("k".to_string(), Expression::workflow_input("ghost"));
        assert!(matches!(check_references(&bad), Err(TranslateError::UnknownNode { .. })));
    }

    proptest! {
        #[test]
        fn test_pf006_inputs_file_idempotent(extra in proptest::collection::vec(("[a-z]{1,6}", 0i64..100), 0..5)) {
            let t = tool();
            let req = InputsRequest {
                additional_inputs: extra.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
                merge_resources: true,
                ..Default::default()
            };
            let a = build_inputs_file(Node::Tool(&t), &req).unwrap();
            let b = build_inputs_file(Node::Tool(&t), &req).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
