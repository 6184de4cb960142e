//! PF-008: Nextflow backend — DSL2 processes and workflows.
//!
//! A tool becomes one `process`. Every command-line input gets a
//! `def <id>WithPrefix` line in the script preamble so absent values drop
//! their prefix; the command then interpolates `${<id>WithPrefix}`.

use crate::core::error::Result;
use crate::core::expr::{Expression, Operator, RuntimeResource, Selector};
use crate::core::qualifier::{categorize, IoCategory, QualifierMapper, Role, Stream};
use crate::core::resolver::{resolve, Diagnostic, ExpressionDialect, FormatPart, ResolveContext, Resolved};
use crate::core::translator::{
    check_references, command_line_order, generated_filename, plain_reference, prepare_tool, reference_type,
    resolve_container, resource_expression, step_runtime_input_id, CommandPart, TranslateOptions, Translation,
    Translator, WorkflowTranslation, STDERR_FILENAME, STDOUT_FILENAME,
};
use crate::core::types::{Backend, DataType, Tool, ToolInput, TypeKind, Workflow};
use indexmap::IndexMap;
use std::fmt;

/// The Nextflow backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nextflow;

/// Process input/output qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfQualifier {
    Path,
    Val,
    Stdout,
    Stderr,
}

impl fmt::Display for NfQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path | Self::Stderr => write!(f, "path"),
            Self::Val => write!(f, "val"),
            Self::Stdout => write!(f, "stdout"),
        }
    }
}

impl QualifierMapper for Nextflow {
    type Qualifier = NfQualifier;

    fn qualifier_for_category(&self, category: IoCategory, _data_type: &DataType, _role: Role) -> NfQualifier {
        match category {
            IoCategory::Path => NfQualifier::Path,
            IoCategory::Value => NfQualifier::Val,
            IoCategory::Capture(Stream::Stdout) => NfQualifier::Stdout,
            IoCategory::Capture(Stream::Stderr) => NfQualifier::Stderr,
        }
    }
}

/// Where a process output is found after the task ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    Single(String),
    Many(Vec<String>),
    Stdout,
    Stderr,
    Value(String),
}

impl ExpressionDialect for Nextflow {
    fn backend(&self) -> Backend {
        Backend::Nextflow
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn wrap(&self, code: &str) -> String {
        format!("${{{}}}", code)
    }

    fn input_reference(&self, name: &str, input: Option<&ToolInput>) -> String {
        match input {
            Some(i) if !i.data_type.secondaries().is_empty() => {
                if i.data_type.is_array() {
                    format!("{}.collect {{ it[0] }}", name)
                } else {
                    format!("{}[0]", name)
                }
            }
            _ => name.to_string(),
        }
    }

    fn strip_extensions(&self, reference: &str, extensions: &[String]) -> String {
        format!("{}{}", reference, strip_chain(extensions))
    }

    fn strip_extensions_each(&self, reference: &str, extensions: &[String]) -> Option<String> {
        Some(format!("{}.collect {{ it{} }}", reference, strip_chain(extensions)))
    }

    fn filename_fallback(&self, reference: &str, generated: &str) -> String {
        format!("({} ?: {})", reference, generated)
    }

    fn template_code(&self, rendered: String) -> String {
        format!("\"{}\"", rendered)
    }

    fn workflow_input(&self, id: &str) -> Option<String> {
        Some(format!("params.{}", id))
    }

    fn step_output(&self, step: &str, output: &str) -> Option<String> {
        Some(format!("{}.out.{}", step, output))
    }

    fn join(&self, value: &str, separator: &str) -> String {
        format!("{}.join({})", value, self.quote_string(separator))
    }

    fn read_contents(&self, value: &str) -> String {
        format!("{}.text", value)
    }

    fn first(&self, items: &[String]) -> String {
        format!("[{}].find {{ it != null }}", items.join(", "))
    }

    fn length(&self, value: &str) -> String {
        format!("{}.size()", value)
    }

    fn format(&self, parts: &[FormatPart], _code_environment: bool) -> String {
        parts
            .iter()
            .map(|p| match p {
                FormatPart::Text(t) => t.clone(),
                FormatPart::Value { code, .. } => self.wrap(code),
            })
            .collect()
    }
}

fn strip_chain(extensions: &[String]) -> String {
    let mut out = ".name".to_string();
    for ext in extensions {
        out.push_str(&format!(".replaceAll(/{}$/, '')", regex::escape(ext)));
    }
    out
}

/// Text safe inside a Groovy double-quoted string.
fn gstring_text(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('$', "\\$")
}

/// Resolve to a Groovy expression; templates become double-quoted GStrings.
fn groovy(expr: &Expression, ctx: &ResolveContext<'_>) -> Result<Resolved> {
    if let Expression::Operator(Operator::Format(_)) = expr {
        let mut r = resolve(expr, &ctx.code(false))?;
        r.value = format!("\"{}\"", r.value);
        return Ok(r);
    }
    resolve(expr, &ctx.code(true))
}

impl Nextflow {
    /// Output id -> location, in declaration order.
    pub fn output_metadata(&self, tool: &Tool) -> Result<(IndexMap<String, OutputLocation>, Vec<Diagnostic>)> {
        let inputs = tool.inputs_map();
        let ctx = ResolveContext::new(Backend::Nextflow)
            .with_inputs(&tool.id, &inputs)
            .with_filename_fallback()
            .code(false);
        let mut diagnostics = Vec::new();
        let mut locate = |e: &Expression| -> Result<String> {
            let r = match e {
                Expression::Selector(Selector::Wildcard(w)) => return Ok(w.pattern.clone()),
                Expression::Operator(Operator::ReadContents(inner)) => resolve(inner, &ctx)?,
                other => resolve(other, &ctx)?,
            };
            diagnostics.extend(r.diagnostics);
            Ok(r.value)
        };

        let mut out = IndexMap::new();
        for o in &tool.outputs {
            let location = match categorize(&o.data_type, Role::Output) {
                IoCategory::Capture(Stream::Stdout) => OutputLocation::Stdout,
                IoCategory::Capture(Stream::Stderr) => OutputLocation::Stderr,
                category => {
                    let locator = match o.locator() {
                        Some(Expression::List(items)) => {
                            let many = items.iter().map(&mut locate).collect::<Result<Vec<_>>>()?;
                            Some(OutputLocation::Many(many))
                        }
                        Some(e) => Some(OutputLocation::Single(locate(e)?)),
                        None => None,
                    };
                    match (category, locator) {
                        (IoCategory::Value, Some(OutputLocation::Single(v))) => OutputLocation::Value(v),
                        (_, Some(loc)) => loc,
                        (_, None) => OutputLocation::Single(o.id.clone()),
                    }
                }
            };
            out.insert(o.id.clone(), location);
        }
        Ok((out, diagnostics))
    }

    fn directives(&self, tool: &Tool, opts: &TranslateOptions, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        if let Some(image) = resolve_container(&tool.id, tool.container.as_deref(), opts)? {
            lines.push(format!("container \"{}\"", gstring_text(&image)));
        }
        for resource in RuntimeResource::ALL {
            let Some(expr) = resource_expression(&tool.resources, resource, opts) else {
                continue;
            };
            let (name, unit) = match resource {
                RuntimeResource::Cpu => ("cpus", ""),
                RuntimeResource::Memory => ("memory", " GB"),
                RuntimeResource::Disk => ("disk", " GB"),
                RuntimeResource::Duration => ("time", "s"),
            };
            let line = match (expr.as_literal(), unit) {
                (Some(lit), "") => format!("{} {}", name, lit),
                (Some(lit), unit) => format!("{} '{}{}'", name, lit, unit),
                (None, "") => {
                    let r = groovy(&expr, ctx)?;
                    diags.extend(r.diagnostics);
                    format!("{} {{ {} }}", name, r.value)
                }
                (None, unit) => {
                    let r = groovy(&expr, ctx)?;
                    diags.extend(r.diagnostics);
                    format!("{} {{ \"${{{}}}{}\" }}", name, r.value, unit)
                }
            };
            lines.push(line);
        }
        Ok(lines)
    }

    /// `def <id>WithPrefix = ...` for one bound input.
    fn with_prefix(&self, input: &ToolInput, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<String> {
        let mut value = self.input_reference(&input.id, Some(input));
        if let Some(derived) = generated_filename(&input.data_type) {
            let r = groovy(&derived, ctx)?;
            diags.extend(r.diagnostics);
            value = format!("({} ?: {})", value, r.value);
        }
        let prefix = gstring_text(&input.prefix_text());
        let name = format!("{}WithPrefix", input.id);

        let body = if input.data_type.is_boolean() {
            let flag = input.prefix.as_deref().unwrap_or("");
            format!("{} ? {} : ''", value, self.quote_string(flag))
        } else if input.data_type.is_array() {
            let sep = self.quote_string(input.separator.as_deref().unwrap_or(" "));
            let joined = if input.prefix_applies_to_all_elements && input.prefix.is_some() {
                format!("{}.collect {{ \"{}${{it}}\" }}.join({})", value, prefix, sep)
            } else {
                format!("\"{}${{{}.join({})}}\"", prefix, value, sep)
            };
            format!("({} != null && {}.size() > 0) ? {} : ''", value, value, joined)
        } else if input.data_type.is_path() {
            format!("{} ? \"{}${{{}}}\" : ''", value, prefix, value)
        } else {
            format!("({} != null && {} != '') ? \"{}${{{}}}\" : ''", value, value, prefix, value)
        };
        Ok(format!("def {} = {}", name, body))
    }

    fn script(&self, tool: &Tool, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<(Vec<String>, String)> {
        let mut pre = Vec::new();
        let mut parts = Vec::new();
        if !tool.base_command.is_empty() {
            parts.push(tool.base_command.join(" "));
        }
        let shell = ctx.code(false).shell_script(true);
        for part in command_line_order(tool) {
            match part {
                CommandPart::Argument(a) => {
                    let r = resolve(&a.value, &shell)?;
                    diags.extend(r.diagnostics);
                    let value = if a.shell_quote { format!("'{}'", r.value) } else { r.value };
                    parts.push(match &a.prefix {
                        Some(p) => format!("{} {}", p, value),
                        None => value,
                    });
                }
                CommandPart::Input(i) => {
                    pre.push(self.with_prefix(i, ctx, diags)?);
                    parts.push(format!("${{{}WithPrefix}}", i.id));
                }
            }
        }

        let mut body = String::new();
        for (name, content) in &tool.files_to_create {
            body.push_str(&format!(
                "cat <<'POLYFLOW_EOF' > '{}'\n{}\nPOLYFLOW_EOF\n",
                name,
                gstring_text(content)
            ));
        }
        body.push_str(&parts.join(" \\\n"));
        body.push_str(&format!(" > {}", STDOUT_FILENAME));
        if tool.outputs.iter().any(|o| matches!(o.data_type.kind, TypeKind::Stderr)) {
            body.push_str(&format!(" 2> {}", STDERR_FILENAME));
        }
        Ok((pre, body))
    }

    fn output_lines(&self, tool: &Tool, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        let (metadata, found) = self.output_metadata(tool)?;
        diags.extend(found);
        let mut lines = Vec::new();
        for o in &tool.outputs {
            let Some(location) = metadata.get(&o.id) else {
                continue;
            };
            let decl = match location {
                OutputLocation::Stdout => format!("path \"{}\"", STDOUT_FILENAME),
                OutputLocation::Stderr => format!("path \"{}\"", STDERR_FILENAME),
                OutputLocation::Single(p) => format!("{} \"{}\"", self.qualifier_for(&o.data_type, Role::Output), p),
                OutputLocation::Many(ps) => format!("path \"{{{}}}\"", ps.join(",")),
                OutputLocation::Value(v) => format!("val \"{}\"", v),
            };
            let optional = if o.data_type.optional { ", optional: true" } else { "" };
            lines.push(format!("{}, emit: {}{}", decl, o.id, optional));
        }
        Ok(lines)
    }
}

impl Translator for Nextflow {
    fn backend(&self) -> Backend {
        Backend::Nextflow
    }

    fn translate_tool(&self, tool: &Tool, opts: &TranslateOptions) -> Result<Translation> {
        let tool = prepare_tool(tool, opts);
        let inputs = tool.inputs_map();
        let ctx = ResolveContext::new(Backend::Nextflow).with_inputs(&tool.id, &inputs);
        let mut diagnostics = Vec::new();

        let directives = self.directives(&tool, opts, &ctx, &mut diagnostics)?;
        let (pre, script) = self.script(&tool, &ctx, &mut diagnostics)?;
        let outputs = self.output_lines(&tool, &mut diagnostics)?;

        let mut text = format!("nextflow.enable.dsl=2\n\nprocess {} {{\n", tool.id);
        for d in &directives {
            text.push_str(&format!("  {}\n", d));
        }
        if !directives.is_empty() {
            text.push('\n');
        }
        if !tool.inputs.is_empty() {
            text.push_str("  input:\n");
            for i in &tool.inputs {
                text.push_str(&format!("    {} {}\n", self.qualifier_for(&i.data_type, Role::Input), i.id));
            }
            text.push('\n');
        }
        if !outputs.is_empty() {
            text.push_str("  output:\n");
            for o in &outputs {
                text.push_str(&format!("    {}\n", o));
            }
            text.push('\n');
        }
        text.push_str("  script:\n");
        for p in &pre {
            text.push_str(&format!("  {}\n", p));
        }
        text.push_str("  \"\"\"\n");
        text.push_str(&super::indent(&script, 2));
        text.push_str("\n  \"\"\"\n}\n");

        Ok(Translation { text, diagnostics })
    }

    fn translate_workflow(&self, workflow: &Workflow, opts: &TranslateOptions) -> Result<WorkflowTranslation> {
        check_references(workflow)?;
        let mut out = WorkflowTranslation::default();
        let ctx = ResolveContext::new(Backend::Nextflow);

        for tool in workflow.distinct_tools()? {
            let t = self.translate_tool(tool, opts)?;
            out.diagnostics.extend(t.diagnostics);
            out.auxiliary.insert(self.tool_filename(tool), t.text);
        }

        let mut text = String::from("nextflow.enable.dsl=2\n\n");
        for step in &workflow.steps {
            let tool = workflow.tool(step.tool)?;
            text.push_str(&format!(
                "include {{ {} as {} }} from './tools/{}'\n",
                tool.id,
                step.id,
                self.tool_filename(tool)
            ));
        }
        text.push('\n');

        for input in &workflow.inputs {
            let default = match &input.default {
                None => "null".to_string(),
                Some(Expression::Literal(lit)) => self.literal_code(lit),
                Some(e) => match groovy(e, &ctx) {
                    Ok(r) => {
                        out.diagnostics.extend(r.diagnostics);
                        r.value
                    }
                    Err(err) => {
                        out.diagnostics.push(Diagnostic {
                            message: format!("default of workflow input '{}' left null: {}", input.id, err),
                        });
                        "null".to_string()
                    }
                },
            };
            text.push_str(&format!("params.{} = {}\n", input.id, default));
        }
        if opts.with_resource_overrides {
            for step in &workflow.steps {
                for r in RuntimeResource::ALL {
                    text.push_str(&format!("params.{} = null\n", step_runtime_input_id(&step.id, r)));
                }
            }
        }
        text.push('\n');

        text.push_str(&format!("workflow {} {{\n  main:\n", workflow.id));
        for step in &workflow.steps {
            let tool = prepare_tool(workflow.tool(step.tool)?, opts);
            let inputs = tool.inputs_map();
            let step_ctx = ctx.with_inputs(&tool.id, &inputs);
            let mut args = Vec::new();
            for input in &tool.inputs {
                let arg = match step.sources.get(&input.id) {
                    Some(source) => self.step_argument(workflow, source, input, &step_ctx, &mut out.diagnostics)?,
                    None => self.unmapped_argument(&step.id, input),
                };
                args.push(arg);
            }
            if args.is_empty() {
                text.push_str(&format!("    {}()\n", step.id));
            } else {
                text.push_str(&format!("    {}(\n", step.id));
                text.push_str(&args.iter().map(|a| format!("      {}", a)).collect::<Vec<_>>().join(",\n"));
                text.push_str("\n    )\n");
            }
        }
        if !workflow.outputs.is_empty() {
            text.push_str("\n  emit:\n");
            for o in &workflow.outputs {
                let r = groovy(&o.source, &ctx)?;
                out.diagnostics.extend(r.diagnostics);
                text.push_str(&format!("    {} = {}\n", o.id, r.value));
            }
        }
        text.push_str("}\n\n");
        text.push_str(&format!("workflow {{\n  {}()\n}}\n", workflow.id));

        out.text = text;
        Ok(out)
    }
}

impl Nextflow {
    fn literal_code(&self, lit: &crate::core::expr::Literal) -> String {
        use crate::core::expr::Literal;
        match lit {
            Literal::Null => "null".to_string(),
            Literal::String(s) => self.quote_string(s),
            other => other.to_string(),
        }
    }

    fn step_argument(
        &self,
        workflow: &Workflow,
        source: &Expression,
        input: &ToolInput,
        ctx: &ResolveContext<'_>,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<String> {
        match source {
            Expression::List(items) if input.data_type.fundamental().is_path() => {
                let items = items
                    .iter()
                    .map(|item| self.staged(workflow, item, ctx, diags))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.list(&items))
            }
            other => self.staged(workflow, other, ctx, diags),
        }
    }

    /// A step source, with workflow-input paths wrapped in `file()`.
    fn staged(&self, workflow: &Workflow, source: &Expression, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<String> {
        let r = groovy(source, ctx)?;
        diags.extend(r.diagnostics);
        let Some(sel @ Selector::WorkflowInput(_)) = plain_reference(source) else {
            return Ok(r.value);
        };
        let Some(data_type) = reference_type(workflow, sel)? else {
            return Ok(r.value);
        };
        if !data_type.fundamental().is_path() {
            return Ok(r.value);
        }
        let secondaries = data_type.secondaries();
        let stage = |v: &str| {
            if secondaries.is_empty() {
                format!("file({})", v)
            } else {
                let mut files = vec![format!("file({})", v)];
                files.extend(secondaries.iter().map(|s| secondary_file(v, s)));
                format!("[{}]", files.join(", "))
            }
        };
        let staged = if data_type.is_array() {
            format!("{}.collect {{ {} }}", r.value, stage("it"))
        } else {
            stage(&r.value)
        };
        if data_type.optional {
            Ok(format!("({} ? {} : [])", r.value, staged))
        } else {
            Ok(staged)
        }
    }

    fn unmapped_argument(&self, step_id: &str, input: &ToolInput) -> String {
        if let Some(resource) = RuntimeResource::ALL.iter().find(|r| r.input_name() == input.id) {
            return format!("params.{}", step_runtime_input_id(step_id, *resource));
        }
        if input.data_type.fundamental().is_path() {
            return "[]".to_string();
        }
        match &input.default {
            Some(lit) => self.literal_code(lit),
            None => "''".to_string(),
        }
    }
}

/// Path of a secondary file; `^` replaces the primary's last extension.
fn secondary_file(primary: &str, suffix: &str) -> String {
    match suffix.strip_prefix('^') {
        Some(rest) => format!("file({}.replaceAll(/\\.[^.]+$/, '{}'))", primary, rest),
        None => format!("file(\"${{{}}}{}\")", primary, suffix),
    }
}
