//! Polyflow — one tool/workflow IR, three workflow languages.
//!
//! Translates command-line tools, code tools and step graphs into Nextflow
//! DSL2, CWL v1.2 and WDL 1.0, together with inputs and resources files.

pub mod backends;
pub mod cli;
pub mod core;
