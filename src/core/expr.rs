//! PF-002: Expression model — selectors and operators.
//!
//! Expressions are immutable trees. Selectors read a value (a tool input, a
//! glob, a runtime resource, a workflow node); operators combine child
//! expressions. Backends never see this tree directly: the resolver turns it
//! into backend syntax.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix reserved for implicit runtime values (`runtime_cpu`, ...).
pub const RUNTIME_PREFIX: &str = "runtime_";

/// An expression node.
///
/// YAML form: scalars are literals, sequences are lists, single-key maps are
/// selectors (`{input: bam}`) or operators (`{join: {value: ..., separator: ","}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expression {
    Literal(Literal),
    List(Vec<Expression>),
    Selector(Selector),
    Operator(Operator),
}

/// Scalar literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Reference to an input of the enclosing tool.
    Input(InputSelector),
    /// A glob pattern locating output files.
    Wildcard(WildcardSelector),
    /// Implicit runtime value of the executing task.
    Runtime(RuntimeResource),
    /// Reference to a workflow input node.
    WorkflowInput(String),
    /// Reference to an output of another step.
    StepOutput { step: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSelector {
    pub name: String,
    #[serde(default)]
    pub remove_file_extension: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardSelector {
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeResource {
    Cpu,
    Memory,
    Disk,
    Duration,
}

impl RuntimeResource {
    pub const ALL: [RuntimeResource; 4] = [Self::Cpu, Self::Memory, Self::Disk, Self::Duration];

    /// Name of the implicit input backing this resource.
    pub fn input_name(self) -> &'static str {
        match self {
            Self::Cpu => "runtime_cpu",
            Self::Memory => "runtime_memory",
            Self::Disk => "runtime_disk",
            Self::Duration => "runtime_seconds",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    If {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    IsDefined(Box<Expression>),
    Join {
        value: Box<Expression>,
        separator: String,
    },
    ReadContents(Box<Expression>),
    Format(StringFormatter),
    /// First non-null value.
    First(Vec<Expression>),
    Length(Box<Expression>),
    Not(Box<Expression>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Infix symbol shared by all three expression languages.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Template with `{name}` placeholders bound to child expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringFormatter {
    pub template: String,
    #[serde(default)]
    pub slots: IndexMap<String, Expression>,
}

impl StringFormatter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            slots: IndexMap::new(),
        }
    }

    pub fn slot(mut self, name: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.slots.insert(name.into(), value.into());
        self
    }
}

impl Expression {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Literal(Literal::String(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Self::Literal(Literal::Int(i))
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::Selector(Selector::Input(InputSelector {
            name: name.into(),
            remove_file_extension: false,
        }))
    }

    /// Input selector whose value is the basename without known extensions.
    pub fn input_basename(name: impl Into<String>) -> Self {
        Self::Selector(Selector::Input(InputSelector {
            name: name.into(),
            remove_file_extension: true,
        }))
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self::Selector(Selector::Wildcard(WildcardSelector {
            pattern: pattern.into(),
        }))
    }

    pub fn runtime(resource: RuntimeResource) -> Self {
        Self::Selector(Selector::Runtime(resource))
    }

    pub fn workflow_input(id: impl Into<String>) -> Self {
        Self::Selector(Selector::WorkflowInput(id.into()))
    }

    pub fn step_output(step: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Selector(Selector::StepOutput {
            step: step.into(),
            output: output.into(),
        })
    }

    pub fn if_else(condition: Expression, then: Expression, otherwise: Expression) -> Self {
        Self::Operator(Operator::If {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn is_defined(value: Expression) -> Self {
        Self::Operator(Operator::IsDefined(Box::new(value)))
    }

    pub fn join(value: Expression, separator: impl Into<String>) -> Self {
        Self::Operator(Operator::Join {
            value: Box::new(value),
            separator: separator.into(),
        })
    }

    pub fn read_contents(value: Expression) -> Self {
        Self::Operator(Operator::ReadContents(Box::new(value)))
    }

    pub fn first(values: Vec<Expression>) -> Self {
        Self::Operator(Operator::First(values))
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Self::Operator(Operator::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Variant name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "Literal",
            Self::List(_) => "List",
            Self::Selector(s) => match s {
                Selector::Input(_) => "InputSelector",
                Selector::Wildcard(_) => "WildcardSelector",
                Selector::Runtime(RuntimeResource::Cpu) => "CpuSelector",
                Selector::Runtime(RuntimeResource::Memory) => "MemorySelector",
                Selector::Runtime(RuntimeResource::Disk) => "DiskSelector",
                Selector::Runtime(RuntimeResource::Duration) => "DurationSelector",
                Selector::WorkflowInput(_) => "InputNodeSelector",
                Selector::StepOutput { .. } => "StepOutputSelector",
            },
            Self::Operator(o) => match o {
                Operator::If { .. } => "If",
                Operator::IsDefined(_) => "IsDefined",
                Operator::Join { .. } => "JoinOperator",
                Operator::ReadContents(_) => "ReadContents",
                Operator::Format(_) => "StringFormatter",
                Operator::First(_) => "FirstOperator",
                Operator::Length(_) => "LengthOperator",
                Operator::Not(_) => "NotOperator",
                Operator::Binary { .. } => "BinaryOperator",
            },
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::Literal(_) | Self::Selector(_) => vec![],
            Self::List(items) => items.iter().collect(),
            Self::Operator(o) => match o {
                Operator::If {
                    condition,
                    then,
                    otherwise,
                } => vec![condition, then, otherwise],
                Operator::IsDefined(v)
                | Operator::ReadContents(v)
                | Operator::Length(v)
                | Operator::Not(v) => vec![v],
                Operator::Join { value, .. } => vec![value],
                Operator::Format(f) => f.slots.values().collect(),
                Operator::First(items) => items.iter().collect(),
                Operator::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            },
        }
    }

    /// Every selector in the tree, depth first.
    pub fn selectors(&self) -> Vec<&Selector> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Self::Selector(s) = node {
                found.push(s);
            }
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// The literal value, if this node is one.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(l) => Some(l),
            _ => None,
        }
    }
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<i64> for Expression {
    fn from(i: i64) -> Self {
        Self::int(i)
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Self::Literal(Literal::Bool(b))
    }
}

impl From<StringFormatter> for Expression {
    fn from(f: StringFormatter) -> Self {
        Self::Operator(Operator::Format(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pf002_yaml_literals() {
        let e: Expression = serde_yaml_ng::from_str("hello").unwrap();
        assert_eq!(e, Expression::string("hello"));
        let e: Expression = serde_yaml_ng::from_str("42").unwrap();
        assert_eq!(e, Expression::int(42));
        let e: Expression = serde_yaml_ng::from_str("true").unwrap();
        assert_eq!(e, Expression::from(true));
    }

    #[test]
    fn test_pf002_yaml_selectors() {
        let e: Expression = serde_yaml_ng::from_str("input: {name: bam}").unwrap();
        assert_eq!(e, Expression::input("bam"));
        let e: Expression = serde_yaml_ng::from_str("runtime: cpu").unwrap();
        assert_eq!(e, Expression::runtime(RuntimeResource::Cpu));
        let e: Expression =
            serde_yaml_ng::from_str("step_output: {step: align, output: out}").unwrap();
        assert_eq!(e, Expression::step_output("align", "out"));
    }

    #[test]
    fn test_pf002_yaml_operators() {
        let yaml = r#"
format:
  template: "{name}.bam"
  slots:
    name:
      input: {name: sample}
"#;
        let e: Expression = serde_yaml_ng::from_str(yaml).unwrap();
        let expected: Expression = StringFormatter::new("{name}.bam")
            .slot("name", Expression::input("sample"))
            .into();
        assert_eq!(e, expected);

        let e: Expression =
            serde_yaml_ng::from_str("join: {value: {input: {name: xs}}, separator: \",\"}")
                .unwrap();
        assert_eq!(e, Expression::join(Expression::input("xs"), ","));
    }

    #[test]
    fn test_pf002_yaml_list() {
        let e: Expression = serde_yaml_ng::from_str("[a, {input: {name: b}}]").unwrap();
        assert_eq!(
            e,
            Expression::List(vec![Expression::string("a"), Expression::input("b")])
        );
    }

    #[test]
    fn test_pf002_kind_names() {
        assert_eq!(Expression::input("x").kind_name(), "InputSelector");
        assert_eq!(Expression::wildcard("*").kind_name(), "WildcardSelector");
        assert_eq!(
            Expression::runtime(RuntimeResource::Memory).kind_name(),
            "MemorySelector"
        );
        assert_eq!(
            Expression::join(Expression::input("x"), ",").kind_name(),
            "JoinOperator"
        );
    }

    #[test]
    fn test_pf002_selectors_depth_first() {
        let e = Expression::if_else(
            Expression::is_defined(Expression::workflow_input("a")),
            Expression::workflow_input("a"),
            Expression::step_output("s", "o"),
        );
        let sels = e.selectors();
        assert_eq!(sels.len(), 3);
        assert_eq!(sels[0], &Selector::WorkflowInput("a".to_string()));
        assert_eq!(
            sels[2],
            &Selector::StepOutput {
                step: "s".to_string(),
                output: "o".to_string()
            }
        );
    }

    #[test]
    fn test_pf002_runtime_input_names() {
        for r in RuntimeResource::ALL {
            assert!(r.input_name().starts_with(RUNTIME_PREFIX));
        }
    }

    #[test]
    fn test_pf002_literal_display_and_json() {
        assert_eq!(Literal::Null.to_string(), "");
        assert_eq!(Literal::Int(3).to_json(), serde_json::json!(3));
        assert_eq!(Literal::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Literal::String("x".into()).as_f64(), None);
    }
}
