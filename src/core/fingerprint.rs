//! PF-012: BLAKE3 fingerprints for translation inputs and outputs.
//!
//! A translation key covers everything that determines the output bytes:
//! crate version, backend, the selected entry, the IR document and the config.
//! Identical keys mean the previously written documents can be reused.

use super::config::TranslationConfig;
use super::error::Result;
use super::parser::IrDocument;
use super::translator::WorkflowTranslation;
use super::types::Backend;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Compute a composite hash from multiple components, order-sensitive.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Cache key for translating the `entry` node of `ir` to `backend` under `config`.
pub fn translation_key(ir: &IrDocument, entry: &str, backend: Backend, config: &TranslationConfig) -> Result<String> {
    let ir_json = serde_json::to_string(ir)?;
    let config_json = serde_json::to_string(config)?;
    let backend = backend.to_string();
    Ok(composite_hash(&[
        env!("CARGO_PKG_VERSION"),
        &backend,
        entry,
        &hash_string(&ir_json),
        &hash_string(&config_json),
    ]))
}

/// Digest of a written translation: the main document then each auxiliary
/// file by name.
pub fn output_digest(translation: &WorkflowTranslation) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(translation.text.as_bytes());
    for (name, text) in &translation.auxiliary {
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_ir;

    const IR: &str = r#"
tools:
  - id: echo
    base_command: [echo]
    container: ubuntu:latest
    inputs:
      - {id: msg, type: string, position: 1}
"#;

    #[test]
    fn test_pf012_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_pf012_composite_order_sensitive() {
        let h = composite_hash(&["a", "b"]);
        assert_ne!(h, composite_hash(&["b", "a"]));
        assert_ne!(composite_hash(&["ab", ""]), composite_hash(&["a", "b"]));
    }

    #[test]
    fn test_pf012_translation_key_stable() {
        let ir = parse_ir(IR).unwrap();
        let config = TranslationConfig::default();
        let k1 = translation_key(&ir, "echo", Backend::Wdl, &config).unwrap();
        let k2 = translation_key(&parse_ir(IR).unwrap(), "echo", Backend::Wdl, &config).unwrap();
        assert_eq!(k1, k2);
        assert!(k1.starts_with("blake3:"));
    }

    #[test]
    fn test_pf012_translation_key_varies() {
        let ir = parse_ir(IR).unwrap();
        let config = TranslationConfig::default();
        let base = translation_key(&ir, "echo", Backend::Wdl, &config).unwrap();
        assert_ne!(base, translation_key(&ir, "echo", Backend::Cwl, &config).unwrap());
        assert_ne!(base, translation_key(&ir, "other", Backend::Wdl, &config).unwrap());

        let overrides = TranslationConfig {
            with_resource_overrides: true,
            ..Default::default()
        };
        assert_ne!(base, translation_key(&ir, "echo", Backend::Wdl, &overrides).unwrap());

        let changed = parse_ir(&IR.replace("ubuntu:latest", "ubuntu:24.04")).unwrap();
        assert_ne!(base, translation_key(&changed, "echo", Backend::Wdl, &config).unwrap());
    }

    #[test]
    fn test_pf012_output_digest_covers_auxiliary() {
        let mut t = WorkflowTranslation {
            text: "workflow".to_string(),
            ..Default::default()
        };
        let bare = output_digest(&t);
        t.auxiliary.insert("echo.wdl".to_string(), "task".to_string());
        let with_tool = output_digest(&t);
        assert_ne!(bare, with_tool);
        t.auxiliary.insert("echo.wdl".to_string(), "task2".to_string());
        assert_ne!(with_tool, output_digest(&t));
    }
}
