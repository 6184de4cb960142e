//! PF-007: Backend translators — dispatch by target language.
//!
//! Each backend is a unit struct implementing three seams:
//! 1. [`ExpressionDialect`] for expression syntax
//! 2. [`QualifierMapper`](crate::core::qualifier::QualifierMapper) for parameter passing
//! 3. [`Translator`] for tool and workflow documents

pub mod cwl;
pub mod nextflow;
pub mod wdl;

use crate::core::resolver::ExpressionDialect;
use crate::core::translator::Translator;
use crate::core::types::Backend;

pub use cwl::Cwl;
pub use nextflow::Nextflow;
pub use wdl::Wdl;

/// Translator for a backend.
pub fn translator_for(backend: Backend) -> &'static dyn Translator {
    match backend {
        Backend::Nextflow => &Nextflow,
        Backend::Cwl => &Cwl,
        Backend::Wdl => &Wdl,
    }
}

/// Expression syntax for a backend.
pub fn dialect_for(backend: Backend) -> &'static dyn ExpressionDialect {
    match backend {
        Backend::Nextflow => &Nextflow,
        Backend::Cwl => &Cwl,
        Backend::Wdl => &Wdl,
    }
}

/// Indent every non-empty line by `n` spaces.
pub(crate) fn indent(text: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    text.lines()
        .map(|l| if l.is_empty() { String::new() } else { format!("{}{}", pad, l) })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pf007_registry_matches_backend() {
        for b in Backend::ALL {
            assert_eq!(translator_for(b).backend(), b);
            assert_eq!(dialect_for(b).backend(), b);
        }
    }

    #[test]
    fn test_pf007_indent() {
        assert_eq!(indent("a\n\nb", 2), "  a\n\n  b");
    }
}
