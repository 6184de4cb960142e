//! PF-004: Qualifier mapping — how a typed parameter is passed.
//!
//! The dispatch is shared by every backend: arrays recurse to their
//! fundamental type, File/Directory pass by path, Stdout/Stderr outputs are
//! captured, everything else passes by value. Backends only choose the
//! concrete token for each category.

use super::types::{DataType, TypeKind};

/// Direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Output,
}

/// Stream captured from the running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Backend-neutral I/O category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCategory {
    /// Materialized file or directory, passed by path
    Path,
    /// Plain value
    Value,
    /// Captured standard stream (output role only)
    Capture(Stream),
}

/// Classify a type for a role. Total: every type/role pair has a category.
pub fn categorize(data_type: &DataType, role: Role) -> IoCategory {
    match (&data_type.kind, role) {
        (TypeKind::Array { of }, _) => categorize(of, role),
        (TypeKind::File { .. } | TypeKind::Directory, _) => IoCategory::Path,
        (TypeKind::Stdout, Role::Output) => IoCategory::Capture(Stream::Stdout),
        (TypeKind::Stderr, Role::Output) => IoCategory::Capture(Stream::Stderr),
        (TypeKind::Stdout | TypeKind::Stderr, Role::Input) => IoCategory::Path,
        (
            TypeKind::Boolean
            | TypeKind::String
            | TypeKind::Int
            | TypeKind::Float
            | TypeKind::Double
            | TypeKind::Filename { .. },
            _,
        ) => IoCategory::Value,
    }
}

/// Per-backend qualifier vocabulary.
pub trait QualifierMapper {
    type Qualifier;

    /// Concrete qualifier for an already-categorized type.
    fn qualifier_for_category(
        &self,
        category: IoCategory,
        data_type: &DataType,
        role: Role,
    ) -> Self::Qualifier;

    fn qualifier_for(&self, data_type: &DataType, role: Role) -> Self::Qualifier {
        self.qualifier_for_category(categorize(data_type, role), data_type, role)
    }
}
