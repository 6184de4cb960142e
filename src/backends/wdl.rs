//! PF-011: WDL backend — version 1.0 tasks and workflows.

use crate::core::error::Result;
use crate::core::expr::{Expression, Literal, Operator, RuntimeResource, Selector};
use crate::core::qualifier::{IoCategory, QualifierMapper, Role, Stream};
use crate::core::resolver::{resolve, Diagnostic, ExpressionDialect, FormatPart, ResolveContext};
use crate::core::translator::{
    check_references, command_line_order, generated_filename, plain_reference, prepare_tool, reference_type,
    resolve_container, resource_expression, runtime_type, step_runtime_input_id, CommandPart, TranslateOptions,
    Translation, Translator, WorkflowTranslation,
};
use crate::core::types::{Backend, CodeTool, DataType, Tool, ToolInput, ToolOutput, TypeKind, Workflow};
use serde_json::Value;

pub const WDL_VERSION: &str = "1.0";

/// The WDL backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wdl;

/// WDL type token, e.g. `Array[File]?`.
pub fn type_token(data_type: &DataType) -> String {
    let base = match &data_type.kind {
        TypeKind::Boolean => "Boolean".to_string(),
        TypeKind::String | TypeKind::Filename { .. } => "String".to_string(),
        TypeKind::Int => "Int".to_string(),
        TypeKind::Float | TypeKind::Double => "Float".to_string(),
        TypeKind::File { .. } | TypeKind::Stdout | TypeKind::Stderr => "File".to_string(),
        TypeKind::Directory => "Directory".to_string(),
        TypeKind::Array { of } => format!("Array[{}]", type_token(of)),
    };
    if data_type.optional {
        format!("{}?", base)
    } else {
        base
    }
}

/// Identifier of the sibling parameter carrying one secondary file.
pub fn secondary_id(id: &str, suffix: &str) -> String {
    let clean: String = suffix
        .trim_start_matches('^')
        .trim_start_matches('.')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", id, clean)
}

/// Same type with the File leaf kept and secondaries dropped.
fn sibling_type(data_type: &DataType) -> DataType {
    let leaf = DataType {
        kind: TypeKind::File {
            extensions: vec![],
            secondaries: vec![],
        },
        optional: data_type.fundamental().optional,
    };
    let mut wrapped = leaf;
    let mut depth = 0;
    let mut cur = data_type;
    while let TypeKind::Array { of } = &cur.kind {
        depth += 1;
        cur = of;
    }
    for _ in 0..depth {
        wrapped = DataType::array(wrapped);
    }
    wrapped.optional = data_type.optional;
    wrapped
}

impl QualifierMapper for Wdl {
    type Qualifier = String;

    fn qualifier_for_category(&self, category: IoCategory, data_type: &DataType, _role: Role) -> String {
        match category {
            IoCategory::Capture(Stream::Stdout | Stream::Stderr) => {
                let mut token = "File".to_string();
                if data_type.optional {
                    token.push('?');
                }
                token
            }
            IoCategory::Path | IoCategory::Value => type_token(data_type),
        }
    }
}

impl ExpressionDialect for Wdl {
    fn backend(&self) -> Backend {
        Backend::Wdl
    }

    fn quote_string(&self, s: &str) -> String {
        Value::String(s.to_string()).to_string()
    }

    fn null(&self) -> &'static str {
        "None"
    }

    fn wrap(&self, code: &str) -> String {
        format!("~{{{}}}", code)
    }

    fn input_reference(&self, name: &str, _input: Option<&ToolInput>) -> String {
        name.to_string()
    }

    fn strip_extensions(&self, reference: &str, extensions: &[String]) -> String {
        match extensions {
            [] => format!("basename({})", reference),
            [ext] => format!("basename({}, {})", reference, self.quote_string(ext)),
            many => many.iter().fold(format!("basename({})", reference), |acc, ext| {
                let anchored = format!("{}$", regex::escape(ext));
                format!("sub({}, {}, \"\")", acc, self.quote_string(&anchored))
            }),
        }
    }

    // WDL 1.0 has no inline map; callers scatter over the array instead.
    fn strip_extensions_each(&self, _reference: &str, _extensions: &[String]) -> Option<String> {
        None
    }

    fn workflow_input(&self, id: &str) -> Option<String> {
        Some(id.to_string())
    }

    fn step_output(&self, step: &str, output: &str) -> Option<String> {
        Some(format!("{}.{}", step, output))
    }

    fn join(&self, value: &str, separator: &str) -> String {
        format!("sep({}, {})", self.quote_string(separator), value)
    }

    fn if_else(&self, condition: &str, then: &str, otherwise: &str) -> String {
        format!("if ({}) then {} else {}", condition, then, otherwise)
    }

    fn is_defined(&self, value: &str) -> String {
        format!("defined({})", value)
    }

    fn read_contents(&self, value: &str) -> String {
        format!("read_string({})", value)
    }

    fn first(&self, items: &[String]) -> String {
        format!("select_first([{}])", items.join(", "))
    }

    fn length(&self, value: &str) -> String {
        format!("length({})", value)
    }

    fn format(&self, parts: &[FormatPart], code_environment: bool) -> String {
        let body: String = parts
            .iter()
            .map(|p| match p {
                FormatPart::Text(t) if code_environment => t.replace('"', "\\\""),
                FormatPart::Text(t) => t.clone(),
                FormatPart::Value { code, .. } => self.wrap(code),
            })
            .collect();
        if code_environment {
            format!("\"{}\"", body)
        } else {
            body
        }
    }
}

impl Wdl {
    fn input_declarations(&self, tool: &Tool) -> Vec<String> {
        let mut lines = Vec::new();
        for i in &tool.inputs {
            let mut data_type = i.data_type.clone();
            if generated_filename(&data_type).is_some() {
                data_type.optional = true;
            }
            let default = i
                .default
                .as_ref()
                .filter(|l| !matches!(l, Literal::Null))
                .map(|l| format!(" = {}", self.literal_code(l)))
                .unwrap_or_default();
            lines.push(format!("{} {}{}", type_token(&data_type), i.id, default));
            for s in i.data_type.secondaries() {
                lines.push(format!("{} {}", type_token(&sibling_type(&i.data_type)), secondary_id(&i.id, s)));
            }
        }
        lines
    }

    fn literal_code(&self, lit: &Literal) -> String {
        match lit {
            Literal::Null => self.null().to_string(),
            Literal::String(s) => self.quote_string(s),
            other => other.to_string(),
        }
    }

    /// Command-line text for one bound input.
    fn input_binding(&self, input: &ToolInput, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<String> {
        let mut value = input.id.clone();
        if let Some(derived) = generated_filename(&input.data_type) {
            let r = resolve(&derived, ctx)?;
            diags.extend(r.diagnostics);
            value = format!("select_first([{}, {}])", value, r.value);
        }
        let dt = &input.data_type;
        let prefix = input.prefix_text();
        let quoted_prefix = self.quote_string(&prefix);

        if dt.is_boolean() {
            let Some(flag) = &input.prefix else {
                return Ok(self.wrap(&value));
            };
            let cond = if dt.optional {
                format!("select_first([{}, false])", value)
            } else {
                value
            };
            return Ok(self.wrap(&format!("if ({}) then {} else \"\"", cond, self.quote_string(flag))));
        }

        if dt.is_array() {
            let sep = self.quote_string(input.separator.as_deref().unwrap_or(" "));
            if input.prefix_applies_to_all_elements && input.prefix.is_some() {
                return Ok(format!("~{{sep={} prefix({}, {})}}", sep, quoted_prefix, value));
            }
            let joined = format!("~{{sep={} {}}}", sep, value);
            return Ok(match (&input.prefix, dt.optional) {
                (None, _) => joined,
                (Some(_), false) => format!("{}{}", prefix, joined),
                (Some(_), true) => format!("~{{if defined({}) then {} else \"\"}}{}", value, quoted_prefix, joined),
            });
        }

        let optional = dt.optional && generated_filename(dt).is_none();
        Ok(match (&input.prefix, optional) {
            (Some(_), true) => self.wrap(&format!("{} + {}", quoted_prefix, value)),
            _ => format!("{}{}", prefix, self.wrap(&value)),
        })
    }

    fn command(&self, tool: &Tool, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<String> {
        let mut lines = Vec::new();
        for (name, content) in &tool.files_to_create {
            lines.push(format!("cat <<'POLYFLOW_EOF' > '{}'\n{}\nPOLYFLOW_EOF", name, content.replace("~{", "\\~{")));
        }

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
                CommandPart::Input(i) => parts.push(self.input_binding(i, ctx, diags)?),
            }
        }
        lines.push(parts.join(" \\\n  "));
        Ok(lines.join("\n"))
    }

    fn runtime(&self, tool: &Tool, opts: &TranslateOptions, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        if let Some(image) = resolve_container(&tool.id, tool.container.as_deref(), opts)? {
            lines.push(format!("docker: {}", self.quote_string(&image)));
        }
        for resource in RuntimeResource::ALL {
            let Some(expr) = resource_expression(&tool.resources, resource, opts) else {
                continue;
            };
            let literal = expr.as_literal().map(Literal::to_string);
            let code = match &literal {
                Some(l) => l.clone(),
                None => {
                    let r = resolve(&expr, ctx)?;
                    diags.extend(r.diagnostics);
                    r.value
                }
            };
            lines.push(match (resource, literal) {
                (RuntimeResource::Cpu, _) => format!("cpu: {}", code),
                (RuntimeResource::Memory, Some(l)) => format!("memory: \"{}G\"", l),
                (RuntimeResource::Memory, None) => format!("memory: \"~{{{}}}G\"", code),
                (RuntimeResource::Disk, Some(l)) => format!("disks: \"local-disk {} SSD\"", l),
                (RuntimeResource::Disk, None) => format!("disks: \"local-disk ~{{ceil({})}} SSD\"", code),
                (RuntimeResource::Duration, _) => format!("duration: {}", code),
            });
        }
        Ok(lines)
    }

    fn output_declarations(&self, tool: &Tool, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for o in &tool.outputs {
            let token = self.qualifier_for(&o.data_type, Role::Output);
            let (value, pattern) = self.output_value(o, ctx, diags)?;
            lines.push(format!("{} {} = {}", token, o.id, value));
            for s in o.data_type.secondaries() {
                let sibling = type_token(&sibling_type(&o.data_type));
                let value = match &pattern {
                    Some(p) => self.glob_value(&o.data_type, &secondary_pattern(p, s)),
                    None if o.data_type.is_array() => {
                        diags.push(Diagnostic {
                            message: format!(
                                "secondary '{}' of array output '{}' needs a glob; left unset",
                                s, o.id
                            ),
                        });
                        continue;
                    }
                    None => secondary_expression(&o.id, s),
                };
                lines.push(format!("{} {} = {}", sibling, secondary_id(&o.id, s), value));
            }
        }
        Ok(lines)
    }

    fn glob_value(&self, data_type: &DataType, pattern: &str) -> String {
        let glob = format!("glob({})", self.quote_string(pattern));
        if data_type.is_array() {
            glob
        } else {
            format!("{}[0]", glob)
        }
    }

    /// Output expression, plus the glob pattern when the output is globbed.
    fn output_value(&self, output: &ToolOutput, ctx: &ResolveContext<'_>, diags: &mut Vec<Diagnostic>) -> Result<(String, Option<String>)> {
        let ctx = &ctx.with_filename_fallback();
        match (&output.data_type.kind, output.locator()) {
            (TypeKind::Stdout, _) => Ok(("stdout()".to_string(), None)),
            (TypeKind::Stderr, _) => Ok(("stderr()".to_string(), None)),
            (_, Some(Expression::Selector(Selector::Wildcard(w)))) => {
                Ok((self.glob_value(&output.data_type, &w.pattern), Some(w.pattern.clone())))
            }
            (_, Some(Expression::Operator(Operator::ReadContents(inner)))) => {
                let path = match inner.as_ref() {
                    Expression::Selector(Selector::Wildcard(w)) => self.glob_value(&DataType::file(), &w.pattern),
                    other => {
                        let r = resolve(other, ctx)?;
                        diags.extend(r.diagnostics);
                        r.value
                    }
                };
                Ok((self.read_contents(&path), None))
            }
            (_, Some(e)) => {
                let r = resolve(e, ctx)?;
                diags.extend(r.diagnostics);
                Ok((r.value, None))
            }
            (_, None) => {
                diags.push(Diagnostic {
                    message: format!("output '{}' of tool '{}' has no selector or glob", output.id, ctx.tool_id),
                });
                Ok((self.quote_string(&output.id), None))
            }
        }
    }
}

fn secondary_pattern(pattern: &str, suffix: &str) -> String {
    match suffix.strip_prefix('^') {
        Some(rest) => match pattern.rfind('.') {
            Some(idx) => format!("{}{}", &pattern[..idx], rest),
            None => format!("{}{}", pattern, rest),
        },
        None => format!("{}{}", pattern, suffix),
    }
}

fn secondary_expression(primary: &str, suffix: &str) -> String {
    match suffix.strip_prefix('^') {
        Some(rest) => format!("sub({}, \"\\\\.[^.]+$\", \"{}\")", primary, rest),
        None => format!("\"~{{{}}}{}\"", primary, suffix),
    }
}

impl Translator for Wdl {
    fn backend(&self) -> Backend {
        Backend::Wdl
    }

    fn translate_tool(&self, tool: &Tool, opts: &TranslateOptions) -> Result<Translation> {
        let tool = prepare_tool(tool, opts);
        let inputs = tool.inputs_map();
        let ctx = ResolveContext::new(Backend::Wdl).with_inputs(&tool.id, &inputs);
        let mut diagnostics = Vec::new();

        let runtime = self.runtime(&tool, opts, &ctx, &mut diagnostics)?;
        let command = self.command(&tool, &ctx, &mut diagnostics)?;
        let outputs = self.output_declarations(&tool, &ctx, &mut diagnostics)?;

        let mut text = format!("version {}\n\ntask {} {{\n", WDL_VERSION, tool.id);
        let decls = self.input_declarations(&tool);
        if !decls.is_empty() {
            text.push_str("  input {\n");
            for d in decls {
                text.push_str(&format!("    {}\n", d));
            }
            text.push_str("  }\n\n");
        }
        text.push_str("  command <<<\n");
        text.push_str(&super::indent(&command, 4));
        text.push_str("\n  >>>\n");
        if !runtime.is_empty() {
            text.push_str("\n  runtime {\n");
            for r in runtime {
                text.push_str(&format!("    {}\n", r));
            }
            text.push_str("  }\n");
        }
        if !outputs.is_empty() {
            text.push_str("\n  output {\n");
            for o in outputs {
                text.push_str(&format!("    {}\n", o));
            }
            text.push_str("  }\n");
        }
        text.push_str("}\n");
        Ok(Translation { text, diagnostics })
    }

    fn translate_code_tool(&self, code_tool: &CodeTool, opts: &TranslateOptions) -> Result<Translation> {
        self.translate_tool(&code_tool.to_command_tool(), opts)
    }

    fn translate_workflow(&self, workflow: &Workflow, opts: &TranslateOptions) -> Result<WorkflowTranslation> {
        check_references(workflow)?;
        let mut out = WorkflowTranslation::default();
        let ctx = ResolveContext::new(Backend::Wdl);

        let mut text = format!("version {}\n\n", WDL_VERSION);
        for tool in workflow.distinct_tools()? {
            let t = self.translate_tool(tool, opts)?;
            out.diagnostics.extend(t.diagnostics);
            let file = self.tool_filename(tool);
            text.push_str(&format!("import \"tools/{}\" as {}\n", file, tool.versioned_id()));
            out.auxiliary.insert(file, t.text);
        }

        text.push_str(&format!("\nworkflow {} {{\n  input {{\n", workflow.id));
        for i in &workflow.inputs {
            let default = match &i.default {
                Some(e) => {
                    let r = resolve(e, &ctx)?;
                    out.diagnostics.extend(r.diagnostics);
                    format!(" = {}", r.value)
                }
                None => String::new(),
            };
            text.push_str(&format!("    {} {}{}\n", type_token(&i.data_type), i.id, default));
            for s in i.data_type.secondaries() {
                text.push_str(&format!("    {} {}\n", type_token(&sibling_type(&i.data_type)), secondary_id(&i.id, s)));
            }
        }
        if opts.with_resource_overrides {
            for step in &workflow.steps {
                for r in RuntimeResource::ALL {
                    text.push_str(&format!(
                        "    {} {}\n",
                        type_token(&runtime_type(r).optional()),
                        step_runtime_input_id(&step.id, r)
                    ));
                }
            }
        }
        text.push_str("  }\n");

        for step in &workflow.steps {
            let tool = workflow.tool(step.tool)?;
            let inputs = tool.inputs_map();
            let step_ctx = ctx.with_inputs(&tool.id, &inputs);
            let mut bindings = Vec::new();
            for (input_id, source) in &step.sources {
                let r = resolve(source, &step_ctx)?;
                out.diagnostics.extend(r.diagnostics);
                bindings.push(format!("{}={}", input_id, r.value));

                let Some(sel) = plain_reference(source) else {
                    continue;
                };
                let wants = tool.input(input_id).map(|i| i.data_type.secondaries()).unwrap_or(&[]);
                let has = reference_type(workflow, sel)?.map(DataType::secondaries).unwrap_or(&[]);
                for s in wants.iter().filter(|s| has.contains(*s)) {
                    bindings.push(format!("{}={}", secondary_id(input_id, s), secondary_id(&r.value, s)));
                }
            }
            if opts.with_resource_overrides {
                for r in RuntimeResource::ALL {
                    bindings.push(format!("{}={}", r.input_name(), step_runtime_input_id(&step.id, r)));
                }
            }
            text.push_str(&format!("\n  call {}.{} as {}", tool.versioned_id(), tool.id, step.id));
            if bindings.is_empty() {
                text.push('\n');
            } else {
                text.push_str(" {\n    input:\n");
                text.push_str(&bindings.iter().map(|b| format!("      {}", b)).collect::<Vec<_>>().join(",\n"));
                text.push_str("\n  }\n");
            }
        }

        if !workflow.outputs.is_empty() {
            text.push_str("\n  output {\n");
            for o in &workflow.outputs {
                let r = resolve(&o.source, &ctx)?;
                out.diagnostics.extend(r.diagnostics);
                let data_type = output_type(workflow, &o.source)?;
                text.push_str(&format!("    {} {} = {}\n", type_token(&data_type), o.id, r.value));
                if let Some(sel) = plain_reference(&o.source) {
                    for s in data_type.secondaries() {
                        let sibling = type_token(&sibling_type(&data_type));
                        let source = match sel {
                            Selector::StepOutput { step, output } => format!("{}.{}", step, secondary_id(output, s)),
                            _ => secondary_id(&r.value, s),
                        };
                        text.push_str(&format!("    {} {} = {}\n", sibling, secondary_id(&o.id, s), source));
                    }
                }
            }
            text.push_str("  }\n");
        }
        text.push_str("}\n");

        out.text = text;
        Ok(out)
    }
}

/// Declared type of a workflow output: the referenced node's type.
fn output_type(workflow: &Workflow, source: &Expression) -> Result<DataType> {
    let first = match source {
        Expression::Operator(Operator::First(items)) => items.first(),
        other => Some(other),
    };
    if let Some(sel) = first.and_then(plain_reference) {
        if let Some(t) = reference_type(workflow, sel)? {
            let mut t = t.clone();
            if matches!(t.kind, TypeKind::Stdout | TypeKind::Stderr) {
                t.kind = TypeKind::File {
                    extensions: vec![],
                    secondaries: vec![],
                };
            }
            return Ok(t);
        }
    }
    Ok(DataType::string())
}
