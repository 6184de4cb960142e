//! PF-010: CWL backend — CommandLineTool and Workflow documents (v1.2).
//!
//! Documents are plain serde structs serialized with `serde_yaml_ng`; field
//! order in the structs is the key order in the output.

use crate::core::error::{Result, TranslateError};
use crate::core::expr::{Expression, Literal, Operator, RuntimeResource, Selector};
use crate::core::qualifier::{IoCategory, QualifierMapper, Role, Stream};
use crate::core::resolver::{resolve, Diagnostic, ExpressionDialect, FormatPart, ResolveContext};
use crate::core::translator::{
    check_references, generated_filename, plain_reference, prepare_tool, reference_type, resolve_container,
    resource_expression, runtime_type, step_runtime_input_id, TranslateOptions, Translation, Translator,
    WorkflowTranslation, STDERR_FILENAME, STDOUT_FILENAME,
};
use crate::core::types::{Backend, CodeTool, DataType, Tool, ToolInput, ToolOutput, TypeKind, Workflow};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

pub const CWL_VERSION: &str = "v1.2";
const SHEBANG: &str = "#!/usr/bin/env cwl-runner\n";
/// Bytes per GB over bytes per MiB.
const GB_TO_MIB: f64 = 953.674;

/// The CWL backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cwl;

// ============================================================================
// Document model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CwlType {
    Name(&'static str),
    Array(ArraySchema),
    Union(Vec<CwlType>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArraySchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub items: Box<CwlType>,
    #[serde(rename = "inputBinding", skip_serializing_if = "Option::is_none")]
    pub input_binding: Option<Binding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_separator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_quote: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class")]
pub enum Requirement {
    DockerRequirement {
        #[serde(rename = "dockerPull")]
        docker_pull: String,
    },
    InlineJavascriptRequirement,
    ShellCommandRequirement,
    ResourceRequirement {
        #[serde(rename = "coresMin", skip_serializing_if = "Option::is_none")]
        cores_min: Option<Value>,
        #[serde(rename = "ramMin", skip_serializing_if = "Option::is_none")]
        ram_min: Option<Value>,
        #[serde(rename = "outdirMin", skip_serializing_if = "Option::is_none")]
        outdir_min: Option<Value>,
    },
    ToolTimeLimit {
        timelimit: Value,
    },
    InitialWorkDirRequirement {
        listing: Vec<Dirent>,
    },
    StepInputExpressionRequirement,
    MultipleInputFeatureRequirement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dirent {
    pub entryname: String,
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(rename = "type")]
    pub cwl_type: CwlType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_binding: Option<Binding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Glob {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glob: Option<Glob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_contents: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_eval: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(rename = "type")]
    pub cwl_type: CwlType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_binding: Option<OutputBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandArgument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub value_from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_quote: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLineTool {
    pub class: &'static str,
    pub cwl_version: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    pub inputs: Vec<CommandInput>,
    pub outputs: Vec<CommandOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub base_command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<CommandArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Source {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(rename = "type")]
    pub cwl_type: CwlType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub id: String,
    #[serde(rename = "type")]
    pub cwl_type: CwlType,
    pub output_source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick_value: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_merge: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(rename = "in")]
    pub inputs: Vec<StepInput>,
    pub run: String,
    pub out: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CwlWorkflow {
    pub class: &'static str,
    pub cwl_version: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    pub inputs: Vec<WorkflowInput>,
    pub outputs: Vec<WorkflowOutput>,
    pub steps: Vec<WorkflowStep>,
}

// ============================================================================
// Types and expressions
// ============================================================================

fn type_token(data_type: &DataType, item_binding: Option<Binding>) -> CwlType {
    let inner = match &data_type.kind {
        TypeKind::Boolean => CwlType::Name("boolean"),
        TypeKind::String | TypeKind::Filename { .. } => CwlType::Name("string"),
        TypeKind::Int => CwlType::Name("int"),
        TypeKind::Float => CwlType::Name("float"),
        TypeKind::Double => CwlType::Name("double"),
        TypeKind::File { .. } | TypeKind::Stdout | TypeKind::Stderr => CwlType::Name("File"),
        TypeKind::Directory => CwlType::Name("Directory"),
        TypeKind::Array { of } => CwlType::Array(ArraySchema {
            kind: "array",
            items: Box::new(type_token(of, None)),
            input_binding: item_binding,
        }),
    };
    if data_type.optional {
        CwlType::Union(vec![inner, CwlType::Name("null")])
    } else {
        inner
    }
}

impl QualifierMapper for Cwl {
    type Qualifier = CwlType;

    fn qualifier_for_category(&self, category: IoCategory, data_type: &DataType, _role: Role) -> CwlType {
        match category {
            IoCategory::Capture(Stream::Stdout) => CwlType::Name("stdout"),
            IoCategory::Capture(Stream::Stderr) => CwlType::Name("stderr"),
            IoCategory::Path | IoCategory::Value => type_token(data_type, None),
        }
    }
}

impl ExpressionDialect for Cwl {
    fn backend(&self) -> Backend {
        Backend::Cwl
    }

    fn quote_string(&self, s: &str) -> String {
        Value::String(s.to_string()).to_string()
    }

    fn wrap(&self, code: &str) -> String {
        format!("$({})", code)
    }

    fn input_reference(&self, name: &str, _input: Option<&ToolInput>) -> String {
        format!("inputs.{}", name)
    }

    fn strip_extensions(&self, reference: &str, extensions: &[String]) -> String {
        format!("{}.basename{}", reference, replace_chain(extensions))
    }

    fn strip_extensions_each(&self, reference: &str, extensions: &[String]) -> Option<String> {
        Some(format!(
            "{}.map(function(el) {{ return el.basename{}; }})",
            reference,
            replace_chain(extensions)
        ))
    }

    fn filename_fallback(&self, reference: &str, generated: &str) -> String {
        format!("({} ? {} : {})", reference, reference, generated)
    }

    fn workflow_input(&self, _id: &str) -> Option<String> {
        None
    }

    fn step_output(&self, _step: &str, _output: &str) -> Option<String> {
        None
    }

    fn wildcard(&self, _pattern: &str) -> Option<String> {
        None
    }

    fn join(&self, value: &str, separator: &str) -> String {
        format!("{}.join({})", value, self.quote_string(separator))
    }

    fn read_contents(&self, _value: &str) -> String {
        "self[0].contents".to_string()
    }

    fn first(&self, items: &[String]) -> String {
        format!(
            "[{}].filter(function (inner) {{ return inner != null }})[0]",
            items.join(", ")
        )
    }

    fn length(&self, value: &str) -> String {
        format!("{}.length", value)
    }

    fn format(&self, parts: &[FormatPart], code_environment: bool) -> String {
        let template: String = parts
            .iter()
            .map(|p| match p {
                FormatPart::Text(t) => t.clone(),
                FormatPart::Value { name, .. } => format!("{{{}}}", name),
            })
            .collect();
        let mut code = self.quote_string(&template);
        let mut seen: Vec<&str> = Vec::new();
        for p in parts {
            if let FormatPart::Value { name, code: value } = p {
                if seen.contains(&name.as_str()) {
                    continue;
                }
                seen.push(name);
                code.push_str(&format!(".replace(/\\{{{}\\}}/g, {})", name, value));
            }
        }
        if code_environment {
            code
        } else {
            self.wrap(&code)
        }
    }
}

fn replace_chain(extensions: &[String]) -> String {
    extensions
        .iter()
        .map(|e| format!(".replace(/{}$/, \"\")", e))
        .collect()
}

/// A glob as written in `outputBinding.glob`.
fn glob_pattern(e: &Expression, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<String> {
    if let Expression::Selector(Selector::Wildcard(w)) = e {
        return Ok(w.pattern.clone());
    }
    let r = resolve(e, ctx)?;
    diags.extend(r.diagnostics);
    Ok(r.value)
}

fn literal_json(lit: &Literal) -> Option<Value> {
    match lit {
        Literal::Null => None,
        other => Some(other.to_json()),
    }
}

/// Resource request as a number, or an expression wrapped for evaluation.
fn resource_value(expr: &Expression, ctx: &ResolveContext<'_>, scale: Option<f64>, diags: &mut Vec<Diagnostic>) -> Result<Value> {
    if let Some(n) = expr.as_literal().and_then(Literal::as_f64) {
        return Ok(match scale {
            Some(s) => Value::from((s * n).round() as i64),
            None => Value::from(n.ceil() as i64),
        });
    }
    let r = resolve(expr, &ctx.code(true))?;
    diags.extend(r.diagnostics);
    let code = match scale {
        Some(s) => format!("Math.round(({} * {}))", s, r.value),
        None => r.value,
    };
    Ok(Value::String(Cwl.wrap(&code)))
}

impl Cwl {
    fn command_input(&self, input: &ToolInput, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<CommandInput> {
        let mut data_type = input.data_type.clone();
        let mut binding = input.is_bound().then(|| Binding {
            position: input.position,
            ..Default::default()
        });
        let separate = (!input.separate_value_from_prefix).then_some(false);

        let mut item_binding = None;
        if let Some(b) = binding.as_mut() {
            if data_type.is_array() && input.prefix_applies_to_all_elements {
                item_binding = Some(Binding {
                    prefix: input.prefix.clone(),
                    separate,
                    ..Default::default()
                });
            } else {
                b.prefix = input.prefix.clone();
                b.separate = separate;
                b.item_separator = input.separator.clone();
            }
            if let Some(derived) = generated_filename(&data_type) {
                let r = resolve(&derived, &ctx.code(true))?;
                diags.extend(r.diagnostics);
                b.value_from = Some(self.wrap(&format!("self ? self : {}", r.value)));
                data_type.optional = true;
            }
        }

        Ok(CommandInput {
            id: input.id.clone(),
            doc: input.doc.clone(),
            cwl_type: type_token(&data_type, item_binding),
            default: input.default.as_ref().and_then(literal_json),
            secondary_files: input.data_type.secondaries().to_vec(),
            input_binding: binding,
        })
    }

    fn command_output(&self, output: &ToolOutput, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<CommandOutput> {
        let cwl_type = self.qualifier_for(&output.data_type, Role::Output);
        let captured = matches!(output.data_type.kind, TypeKind::Stdout | TypeKind::Stderr);
        let binding = match output.locator() {
            _ if captured => None,
            None => None,
            Some(locator) => Some(self.output_binding(locator, &output.data_type, ctx, diags)?),
        };
        Ok(CommandOutput {
            id: output.id.clone(),
            doc: output.doc.clone(),
            cwl_type,
            secondary_files: output.data_type.secondaries().to_vec(),
            output_binding: binding,
        })
    }

    fn output_binding(&self, locator: &Expression, data_type: &DataType, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<OutputBinding> {
        let non_code = ctx.code(false).with_filename_fallback();
        match locator {
            Expression::Operator(Operator::ReadContents(inner)) => Ok(OutputBinding {
                glob: Some(Glob::One(glob_pattern(inner, &non_code, diags)?)),
                load_contents: Some(true),
                output_eval: Some(self.wrap(&self.read_contents(""))),
            }),
            Expression::List(items) => {
                let globs = items
                    .iter()
                    .map(|e| glob_pattern(e, &non_code, diags))
                    .collect::<Result<Vec<_>>>()?;
                Ok(OutputBinding {
                    glob: Some(Glob::Many(globs)),
                    ..Default::default()
                })
            }
            Expression::Selector(Selector::Wildcard(_)) => Ok(OutputBinding {
                glob: Some(Glob::One(glob_pattern(locator, &non_code, diags)?)),
                ..Default::default()
            }),
            other if !data_type.fundamental().is_path() => {
                let r = resolve(other, &non_code)?;
                diags.extend(r.diagnostics);
                Ok(OutputBinding {
                    load_contents: r.load_contents.then_some(true),
                    output_eval: Some(r.value),
                    ..Default::default()
                })
            }
            other => Ok(OutputBinding {
                glob: Some(Glob::One(glob_pattern(other, &non_code, diags)?)),
                ..Default::default()
            }),
        }
    }

    fn requirements(&self, tool: &Tool, opts: &TranslateOptions, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<Vec<Requirement>> {
        let mut reqs = vec![Requirement::InlineJavascriptRequirement];
        if let Some(image) = resolve_container(&tool.id, tool.container.as_deref(), opts)? {
            reqs.push(Requirement::DockerRequirement { docker_pull: image });
        }

        let value = |r: RuntimeResource, scale, diags: &mut Vec<Diagnostic>| -> Result<Option<Value>> {
            resource_expression(&tool.resources, r, opts)
                .map(|e| resource_value(&e, ctx, scale, diags))
                .transpose()
        };
        let cores_min = value(RuntimeResource::Cpu, None, diags)?;
        let ram_min = value(RuntimeResource::Memory, Some(GB_TO_MIB), diags)?;
        let outdir_min = value(RuntimeResource::Disk, Some(GB_TO_MIB), diags)?;
        if cores_min.is_some() || ram_min.is_some() || outdir_min.is_some() {
            reqs.push(Requirement::ResourceRequirement {
                cores_min,
                ram_min,
                outdir_min,
            });
        }
        if let Some(timelimit) = value(RuntimeResource::Duration, None, diags)? {
            reqs.push(Requirement::ToolTimeLimit { timelimit });
        }

        if !tool.files_to_create.is_empty() {
            reqs.push(Requirement::InitialWorkDirRequirement {
                listing: tool
                    .files_to_create
                    .iter()
                    .map(|(name, content)| Dirent {
                        entryname: name.clone(),
                        entry: content.replace("$(", "\\$("),
                    })
                    .collect(),
            });
        }
        Ok(reqs)
    }

    /// Build the tool document without serializing it.
    pub fn tool_document(&self, tool: &Tool, opts: &TranslateOptions) -> Result<(CommandLineTool, Vec<Diagnostic>)> {
        let tool = prepare_tool(tool, opts);
        let inputs = tool.inputs_map();
        let ctx = ResolveContext::new(Backend::Cwl).with_inputs(&tool.id, &inputs);
        let mut diags = Vec::new();

        let mut requirements = self.requirements(&tool, opts, &ctx, &mut diags)?;

        let cwl_inputs = tool
            .inputs
            .iter()
            .map(|i| self.command_input(i, &ctx, &mut diags))
            .collect::<Result<Vec<_>>>()?;
        let cwl_outputs = tool
            .outputs
            .iter()
            .map(|o| self.command_output(o, &ctx, &mut diags))
            .collect::<Result<Vec<_>>>()?;

        let mut needs_shell = false;
        let mut arguments = Vec::new();
        for a in &tool.arguments {
            let r = resolve(&a.value, &ctx.code(false))?;
            diags.extend(r.diagnostics);
            let shell_quote = if !a.shell_quote && r.value.contains(['|', '>', '<', ';', '&', '*']) {
                needs_shell = true;
                Some(false)
            } else {
                None
            };
            arguments.push(CommandArgument {
                position: a.position,
                prefix: a.prefix.clone(),
                value_from: r.value,
                shell_quote,
            });
        }
        if needs_shell {
            requirements.push(Requirement::ShellCommandRequirement);
        }

        let has = |kind: fn(&TypeKind) -> bool| tool.outputs.iter().any(|o| kind(&o.data_type.kind));
        let doc = CommandLineTool {
            class: "CommandLineTool",
            cwl_version: CWL_VERSION,
            id: tool.id.clone(),
            doc: tool.doc.clone(),
            requirements,
            inputs: cwl_inputs,
            outputs: cwl_outputs,
            stdout: has(|k| matches!(k, TypeKind::Stdout)).then(|| STDOUT_FILENAME.to_string()),
            stderr: has(|k| matches!(k, TypeKind::Stderr)).then(|| STDERR_FILENAME.to_string()),
            base_command: tool.base_command.clone(),
            arguments,
        };
        Ok((doc, diags))
    }

    /// Build the workflow document without serializing it.
    pub fn workflow_document(&self, workflow: &Workflow, opts: &TranslateOptions) -> Result<(CwlWorkflow, Vec<Diagnostic>)> {
        check_references(workflow)?;
        let mut diags = Vec::new();
        let mut requirements = Vec::new();
        let mut require = |r: Requirement| {
            if !requirements.contains(&r) {
                requirements.push(r);
            }
        };

        let mut inputs = Vec::new();
        for i in &workflow.inputs {
            let default = match &i.default {
                Some(e) => match e.as_literal() {
                    Some(lit) => literal_json(lit),
                    None => {
                        diags.push(Diagnostic {
                            message: format!("default expression of workflow input '{}' is not representable in CWL and was dropped", i.id),
                        });
                        None
                    }
                },
                None => None,
            };
            inputs.push(WorkflowInput {
                id: i.id.clone(),
                doc: i.doc.clone(),
                cwl_type: type_token(&i.data_type, None),
                default,
                secondary_files: i.data_type.secondaries().to_vec(),
            });
        }
        if opts.with_resource_overrides {
            for step in &workflow.steps {
                for r in RuntimeResource::ALL {
                    inputs.push(WorkflowInput {
                        id: step_runtime_input_id(&step.id, r),
                        doc: None,
                        cwl_type: type_token(&runtime_type(r).optional(), None),
                        default: None,
                        secondary_files: vec![],
                    });
                }
            }
        }

        let mut steps = Vec::new();
        for step in &workflow.steps {
            let tool = workflow.tool(step.tool)?;
            let mut step_inputs = Vec::new();
            for (input_id, source) in &step.sources {
                step_inputs.extend(self.step_input(&step.id, tool, input_id, source, &mut require, &mut diags)?);
            }
            if opts.with_resource_overrides {
                for r in RuntimeResource::ALL {
                    step_inputs.push(StepInput {
                        id: r.input_name().to_string(),
                        source: Some(Source::One(step_runtime_input_id(&step.id, r))),
                        link_merge: None,
                        default: None,
                        value_from: None,
                    });
                }
            }
            steps.push(WorkflowStep {
                id: step.id.clone(),
                inputs: step_inputs,
                run: format!("tools/{}", self.tool_filename(tool)),
                out: tool.outputs.iter().map(|o| o.id.clone()).collect(),
            });
        }

        let mut outputs = Vec::new();
        for o in &workflow.outputs {
            let (sources, pick_value) = match &o.source {
                Expression::Operator(Operator::First(items)) => (items.iter().collect::<Vec<_>>(), Some("first_non_null")),
                other => (vec![other], None),
            };
            let mut names = Vec::new();
            let mut data_type = None;
            for s in sources {
                let sel = plain_reference(s).ok_or_else(|| TranslateError::UnsupportedExpression {
                    backend: Backend::Cwl.to_string(),
                    kind: s.kind_name(),
                })?;
                names.push(source_name(sel));
                if data_type.is_none() {
                    data_type = reference_type(workflow, sel)?.cloned();
                }
            }
            let mut data_type = data_type.unwrap_or_else(DataType::string);
            if pick_value.is_some() {
                data_type.optional = true;
            }
            outputs.push(WorkflowOutput {
                id: o.id.clone(),
                cwl_type: type_token(&data_type, None),
                output_source: if names.len() == 1 {
                    Source::One(names.remove(0))
                } else {
                    Source::Many(names)
                },
                pick_value,
                secondary_files: data_type.secondaries().to_vec(),
            });
        }

        let doc = CwlWorkflow {
            class: "Workflow",
            cwl_version: CWL_VERSION,
            id: workflow.id.clone(),
            doc: workflow.doc.clone(),
            requirements,
            inputs,
            outputs,
            steps,
        };
        Ok((doc, diags))
    }

    /// One `in` entry, plus aliased sources when the value is an expression.
    fn step_input(
        &self,
        step_id: &str,
        tool: &Tool,
        input_id: &str,
        source: &Expression,
        require: &mut impl FnMut(Requirement),
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<StepInput>> {
        let entry = |source, link_merge, default, value_from| StepInput {
            id: input_id.to_string(),
            source,
            link_merge,
            default,
            value_from,
        };

        if let Some(sel) = plain_reference(source) {
            return Ok(vec![entry(Some(Source::One(source_name(sel))), None, None, None)]);
        }
        if let Some(lit) = source.as_literal() {
            return Ok(vec![entry(None, None, literal_json(lit), None)]);
        }
        if let Expression::List(items) = source {
            let refs: Option<Vec<&Selector>> = items.iter().map(plain_reference).collect();
            if let Some(refs) = refs {
                require(Requirement::MultipleInputFeatureRequirement);
                let names = refs.into_iter().map(source_name).collect();
                return Ok(vec![entry(Some(Source::Many(names)), Some("merge_flattened"), None, None)]);
            }
        }

        let mut overrides = IndexMap::new();
        let mut aliases = Vec::new();
        for sel in source.selectors() {
            let (key, reference) = match sel {
                Selector::WorkflowInput(id) => (id.clone(), id.clone()),
                Selector::StepOutput { step, output } => (format!("{}/{}", step, output), format!("{}_{}", step, output)),
                _ => continue,
            };
            if overrides.contains_key(&key) {
                continue;
            }
            let alias = format!("_{}_{}_{}", step_id, input_id, reference);
            aliases.push(StepInput {
                id: alias.clone(),
                source: Some(Source::One(source_name(sel))),
                link_merge: None,
                default: None,
                value_from: None,
            });
            overrides.insert(key, alias);
        }
        let inputs = tool.inputs_map();
        let ctx = ResolveContext::new(Backend::Cwl)
            .with_inputs(&tool.id, &inputs)
            .with_overrides(&overrides)
            .code(false);
        let r = resolve(source, &ctx)?;
        diags.extend(r.diagnostics);
        require(Requirement::InlineJavascriptRequirement);
        require(Requirement::StepInputExpressionRequirement);
        aliases.push(entry(None, None, None, Some(r.value)));
        Ok(aliases)
    }
}

fn source_name(sel: &Selector) -> String {
    match sel {
        Selector::StepOutput { step, output } => format!("{}/{}", step, output),
        Selector::WorkflowInput(id) => id.clone(),
        _ => String::new(),
    }
}

fn serialize<T: Serialize>(doc: &T) -> Result<String> {
    Ok(format!("{}{}", SHEBANG, serde_yaml_ng::to_string(doc)?))
}

impl Translator for Cwl {
    fn backend(&self) -> Backend {
        Backend::Cwl
    }

    fn translate_tool(&self, tool: &Tool, opts: &TranslateOptions) -> Result<Translation> {
        let (doc, diagnostics) = self.tool_document(tool, opts)?;
        Ok(Translation {
            text: serialize(&doc)?,
            diagnostics,
        })
    }

    fn translate_code_tool(&self, code_tool: &CodeTool, opts: &TranslateOptions) -> Result<Translation> {
        self.translate_tool(&code_tool.to_command_tool(), opts)
    }

    fn translate_workflow(&self, workflow: &Workflow, opts: &TranslateOptions) -> Result<WorkflowTranslation> {
        let (doc, mut diagnostics) = self.workflow_document(workflow, opts)?;
        let mut auxiliary = IndexMap::new();
        for tool in workflow.distinct_tools()? {
            let t = self.translate_tool(tool, opts)?;
            diagnostics.extend(t.diagnostics);
            auxiliary.insert(self.tool_filename(tool), t.text);
        }
        Ok(WorkflowTranslation {
            text: serialize(&doc)?,
            auxiliary,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::StringFormatter;
    use crate::core::types::{ResourceHints, ToolArgument};

    fn tool() -> Tool {
        Tool {
            id: "TestTranslationtool".to_string(),
            version: Some("v0.0.2".to_string()),
            base_command: vec!["echo".to_string()],
            inputs: vec![
                ToolInput::new("testtool", DataType::string()).position(0),
                ToolInput::new("arrayInp", DataType::array(DataType::string()).optional()),
            ],
            outputs: vec![ToolOutput::new("std", DataType::stdout())],
            container: Some("ubuntu:latest".to_string()),
            ..Default::default()
        }
    }

    fn translate(t: &Tool) -> String {
        Cwl.translate_tool(t, &TranslateOptions::default()).unwrap().text
    }

    #[test]
    fn test_pf010_tool_document_shape() {
        let text = translate(&tool());
        assert!(text.starts_with("#!/usr/bin/env cwl-runner\n"));
        assert!(text.contains("class: CommandLineTool"));
        assert!(text.contains("cwlVersion: v1.2"));
        assert!(text.contains("class: DockerRequirement"));
        assert!(text.contains("dockerPull: ubuntu:latest"));
        assert!(text.contains("stdout: tool.stdout"));
        assert!(text.contains("type: stdout"));
        assert!(text.contains("baseCommand:\n- echo"));
    }

    #[test]
    fn test_pf010_optional_array_type() {
        let t = tool();
        let input = Cwl
            .command_input(&t.inputs[1], &ResolveContext::new(Backend::Cwl), &mut vec![])
            .unwrap();
        assert_eq!(
            input.cwl_type,
            CwlType::Union(vec![
                CwlType::Array(ArraySchema {
                    kind: "array",
                    items: Box::new(CwlType::Name("string")),
                    input_binding: None,
                }),
                CwlType::Name("null"),
            ])
        );
        assert!(input.input_binding.is_none());
    }

    #[test]
    fn test_pf010_prefix_applies_to_all_elements() {
        let inp = ToolInput::new("xs", DataType::array(DataType::string()))
            .prefix("-x")
            .position(2)
            .prefix_all();
        let ci = Cwl
            .command_input(&inp, &ResolveContext::new(Backend::Cwl), &mut vec![])
            .unwrap();
        let binding = ci.input_binding.unwrap();
        assert_eq!(binding.position, Some(2));
        assert_eq!(binding.prefix, None);
        let CwlType::Array(schema) = ci.cwl_type else {
            panic!("expected array schema");
        };
        assert_eq!(schema.input_binding.unwrap().prefix.as_deref(), Some("-x"));
    }

    #[test]
    fn test_pf010_secondaries_on_arrays() {
        let inp = ToolInput::new("bams", DataType::array(DataType::file_with(&[".bam"], &[".bai"]))).position(1);
        let ci = Cwl
            .command_input(&inp, &ResolveContext::new(Backend::Cwl), &mut vec![])
            .unwrap();
        assert_eq!(ci.secondary_files, vec![".bai".to_string()]);
    }

    #[test]
    fn test_pf010_filename_value_from() {
        let inp = ToolInput::new("out", DataType::filename(None, Some(".txt"))).prefix("-o");
        let ci = Cwl
            .command_input(&inp, &ResolveContext::new(Backend::Cwl), &mut vec![])
            .unwrap();
        assert_eq!(
            ci.input_binding.unwrap().value_from.as_deref(),
            Some("$(self ? self : \"generated.txt\")")
        );
        assert_eq!(ci.cwl_type, CwlType::Union(vec![CwlType::Name("string"), CwlType::Name("null")]));
    }

    #[test]
    fn test_pf010_read_contents_output() {
        let mut t = tool();
        t.outputs = vec![ToolOutput::new("value", DataType::string())
            .selector(Expression::read_contents(Expression::wildcard("out.txt")))];
        let (doc, _) = Cwl.tool_document(&t, &TranslateOptions::default()).unwrap();
        let binding = doc.outputs[0].output_binding.clone().unwrap();
        assert_eq!(binding.glob, Some(Glob::One("out.txt".to_string())));
        assert_eq!(binding.load_contents, Some(true));
        assert_eq!(binding.output_eval.as_deref(), Some("$(self[0].contents)"));
    }

    #[test]
    fn test_pf010_glob_from_input() {
        let mut t = tool();
        t.outputs = vec![ToolOutput::new("out", DataType::file()).glob(Expression::input("testtool"))];
        let (doc, _) = Cwl.tool_document(&t, &TranslateOptions::default()).unwrap();
        let binding = doc.outputs[0].output_binding.clone().unwrap();
        assert_eq!(binding.glob, Some(Glob::One("$(inputs.testtool)".to_string())));
    }

    #[test]
    fn test_pf010_filename_glob_falls_back() {
        let mut t = tool();
        t.inputs.push(ToolInput::new("outname", DataType::filename(None, Some(".txt"))).prefix("-o"));
        t.outputs = vec![ToolOutput::new("out", DataType::file()).selector(Expression::input("outname"))];
        let (doc, _) = Cwl.tool_document(&t, &TranslateOptions::default()).unwrap();
        let binding = doc.outputs[0].output_binding.clone().unwrap();
        assert_eq!(
            binding.glob,
            Some(Glob::One("$((inputs.outname ? inputs.outname : \"generated.txt\"))".to_string()))
        );
    }

    #[test]
    fn test_pf010_step_value_from_uses_tool_inputs() {
        let mut wf = Workflow::new("w");
        wf.add_input("a", DataType::string(), None);
        wf.add_step(
            "s",
            tool(),
            vec![
                ("testtool", Expression::workflow_input("a")),
                ("arrayInp", Expression::List(vec![Expression::input("testtool")])),
            ],
        );
        let t = Cwl.translate_workflow(&wf, &TranslateOptions::default()).unwrap();
        assert!(t.text.contains("$([inputs.testtool])"));

        let mut wf = Workflow::new("w");
        wf.add_step("s", tool(), vec![("testtool", Expression::input("ghost"))]);
        let err = Cwl.translate_workflow(&wf, &TranslateOptions::default()).unwrap_err();
        assert!(matches!(err, TranslateError::UnknownInput { ref tool, .. } if tool == "TestTranslationtool"));
    }

    #[test]
    fn test_pf010_memory_in_mib() {
        let mut t = tool();
        t.resources = ResourceHints {
            cpu: Some(Expression::int(2)),
            memory: Some(Expression::int(4)),
            ..Default::default()
        };
        let (doc, _) = Cwl.tool_document(&t, &TranslateOptions::default()).unwrap();
        let req = doc
            .requirements
            .iter()
            .find(|r| matches!(r, Requirement::ResourceRequirement { .. }))
            .unwrap();
        let Requirement::ResourceRequirement { cores_min, ram_min, .. } = req else {
            unreachable!()
        };
        assert_eq!(cores_min, &Some(Value::from(2)));
        assert_eq!(ram_min, &Some(Value::from(3815)));

        let opts = TranslateOptions {
            with_resource_overrides: true,
            ..Default::default()
        };
        let text = Cwl.translate_tool(&t, &opts).unwrap().text;
        assert!(text.contains(
            "$(Math.round((953.674 * [inputs.runtime_memory, 4, 4].filter(function (inner) { return inner != null })[0])))"
        ));
        assert!(text.contains("id: runtime_cpu"));
    }

    #[test]
    fn test_pf010_argument_value_from() {
        let mut t = tool();
        t.arguments.push(ToolArgument::new(
            StringFormatter::new("there's {one} arg").slot("one", "a string"),
            1,
        ));
        let (doc, _) = Cwl.tool_document(&t, &TranslateOptions::default()).unwrap();
        assert_eq!(
            doc.arguments[0].value_from,
            "$(\"there's {one} arg\".replace(/\\{one\\}/g, \"a string\"))"
        );
    }

    #[test]
    fn test_pf010_shell_argument() {
        let mut t = tool();
        t.arguments.push(ToolArgument::new("| gzip", 9));
        let (doc, _) = Cwl.tool_document(&t, &TranslateOptions::default()).unwrap();
        assert_eq!(doc.arguments[0].shell_quote, Some(false));
        assert!(doc.requirements.contains(&Requirement::ShellCommandRequirement));
    }

    #[test]
    fn test_pf010_code_tool_lowered() {
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
        let text = Cwl.translate_code_tool(&ct, &TranslateOptions::default()).unwrap().text;
        assert!(text.contains("class: InitialWorkDirRequirement"));
        assert!(text.contains("entryname: sum-script"));
        assert!(text.contains("prefix: --a"));
    }

    fn workflow() -> Workflow {
        let mut wf = Workflow::new("wf");
        wf.add_input("sampleName", DataType::string(), None);
        wf.add_input("inp", DataType::string(), Some(Expression::string("x")));
        wf.add_step(
            "print",
            tool(),
            vec![(
                "testtool",
                StringFormatter::new("{name}.txt")
                    .slot("name", Expression::workflow_input("sampleName"))
                    .into(),
            )],
        );
        wf.add_step("stp2", tool(), vec![("testtool", Expression::workflow_input("inp"))]);
        wf.add_output("out", Expression::step_output("print", "std"));
        wf
    }

    #[test]
    fn test_pf010_step_aliases() {
        let (doc, _) = Cwl.workflow_document(&workflow(), &TranslateOptions::default()).unwrap();
        let step = &doc.steps[0];
        assert_eq!(step.run, "tools/TestTranslationtool_v0_0_2.cwl");
        assert_eq!(step.inputs[0].id, "_print_testtool_sampleName");
        assert_eq!(step.inputs[0].source, Some(Source::One("sampleName".to_string())));
        assert_eq!(step.inputs[1].id, "testtool");
        assert_eq!(
            step.inputs[1].value_from.as_deref(),
            Some("$(\"{name}.txt\".replace(/\\{name\\}/g, inputs._print_testtool_sampleName))")
        );
        assert!(doc.requirements.contains(&Requirement::StepInputExpressionRequirement));
    }

    #[test]
    fn test_pf010_plain_sources_and_outputs() {
        let (doc, _) = Cwl.workflow_document(&workflow(), &TranslateOptions::default()).unwrap();
        assert_eq!(doc.steps[1].inputs[0].source, Some(Source::One("inp".to_string())));
        assert_eq!(doc.inputs[1].default, Some(Value::from("x")));
        assert_eq!(doc.outputs[0].output_source, Source::One("print/std".to_string()));
        assert_eq!(doc.outputs[0].cwl_type, CwlType::Name("File"));
    }

    #[test]
    fn test_pf010_first_output_picks_value() {
        let mut wf = workflow();
        wf.add_output(
            "either",
            Expression::first(vec![Expression::step_output("print", "std"), Expression::step_output("stp2", "std")]),
        );
        let (doc, _) = Cwl.workflow_document(&wf, &TranslateOptions::default()).unwrap();
        assert_eq!(doc.outputs[1].pick_value, Some("first_non_null"));
        assert_eq!(
            doc.outputs[1].output_source,
            Source::Many(vec!["print/std".to_string(), "stp2/std".to_string()])
        );
    }

    #[test]
    fn test_pf010_workflow_auxiliary_and_overrides() {
        let opts = TranslateOptions {
            with_resource_overrides: true,
            ..Default::default()
        };
        let t = Cwl.translate_workflow(&workflow(), &opts).unwrap();
        assert!(t.auxiliary.contains_key("TestTranslationtool_v0_0_2.cwl"));
        assert!(t.text.contains("id: print_runtime_cpu"));
        assert!(t.text.contains("source: stp2_runtime_seconds"));
    }
}
