//! Benchmarks for polyflow core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polyflow::backends::translator_for;
use polyflow::core::config::TranslationConfig;
use polyflow::core::expr::{Expression, StringFormatter};
use polyflow::core::fingerprint::translation_key;
use polyflow::core::parser::parse_ir;
use polyflow::core::resolver::{resolve, ResolveContext};
use polyflow::core::translator::TranslateOptions;
use polyflow::core::types::{Backend, DataType, Tool, ToolInput, ToolOutput, Workflow};

fn tool() -> Tool {
    Tool {
        id: "align".to_string(),
        version: Some("1.0".to_string()),
        base_command: vec!["bwa".to_string(), "mem".to_string()],
        inputs: vec![
            ToolInput::new("reference", DataType::file_with(&[".fasta"], &[".fai"])).position(1),
            ToolInput::new("reads", DataType::array(DataType::file())).position(2),
            ToolInput::new("threads", DataType::int().optional()).prefix("-t"),
        ],
        outputs: vec![ToolOutput::new("sam", DataType::stdout())],
        container: Some("biocontainers/bwa:0.7.17".to_string()),
        ..Default::default()
    }
}

fn chain(steps: usize) -> Workflow {
    let mut wf = Workflow::new("chain");
    wf.add_input("ref", DataType::file_with(&[".fasta"], &[".fai"]), None);
    wf.add_input("reads", DataType::array(DataType::file()), None);
    for i in 0..steps {
        wf.add_step(
            &format!("s{}", i),
            tool(),
            vec![
                ("reference", Expression::workflow_input("ref")),
                ("reads", Expression::workflow_input("reads")),
            ],
        );
    }
    wf.add_output("sam", Expression::step_output(format!("s{}", steps - 1), "sam"));
    wf
}

fn bench_resolve_format(c: &mut Criterion) {
    let t = tool();
    let inputs = t.inputs_map();
    let expr: Expression = StringFormatter::new("{ref}:{threads}:{reads}")
        .slot("ref", Expression::input_basename("reference"))
        .slot("threads", Expression::input("threads"))
        .slot("reads", Expression::join(Expression::input("reads"), ","))
        .into();

    let mut group = c.benchmark_group("resolve_format");
    for backend in Backend::ALL {
        let ctx = ResolveContext::new(backend).code(false).with_inputs("align", &inputs);
        group.bench_with_input(BenchmarkId::from_parameter(backend), &ctx, |b, ctx| {
            b.iter(|| black_box(resolve(black_box(&expr), ctx)));
        });
    }
    group.finish();
}

fn bench_translate_workflow(c: &mut Criterion) {
    let opts = TranslateOptions::default();
    let mut group = c.benchmark_group("translate_workflow");
    for backend in Backend::ALL {
        for steps in [1, 10, 50] {
            let wf = chain(steps);
            let id = format!("{}/{}", backend, steps);
            group.bench_with_input(BenchmarkId::from_parameter(id), &wf, |b, wf| {
                b.iter(|| black_box(translator_for(backend).translate_workflow(black_box(wf), &opts)));
            });
        }
    }
    group.finish();
}

fn bench_ir_parse_and_key(c: &mut Criterion) {
    let yaml = r#"
tools:
  - id: echo
    base_command: [echo]
    container: ubuntu:latest
    inputs:
      - {id: msg, type: string, position: 1}
    outputs:
      - {id: out, type: stdout}
workflow:
  id: hello
  inputs:
    - {id: inp, type: string, default: hi}
  steps:
    - id: print
      tool: echo
      in: {msg: {workflow_input: inp}}
  outputs:
    - id: out
      source: {step_output: {step: print, output: out}}
"#;
    c.bench_function("ir_parse", |b| b.iter(|| black_box(parse_ir(black_box(yaml)))));

    let Ok(doc) = parse_ir(yaml) else {
        return;
    };
    let config = TranslationConfig::default();
    c.bench_function("translation_key", |b| {
        b.iter(|| black_box(translation_key(black_box(&doc), "hello", Backend::Wdl, &config)))
    });
}

criterion_group!(
    benches,
    bench_resolve_format,
    bench_translate_workflow,
    bench_ir_parse_and_key
);
criterion_main!(benches);
