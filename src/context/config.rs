use std::rc::Rc;

use crate::collection::{ChangeDetectionStrategy, SequenceSensitiveStrategy, SetEqualityStrategy};

/// Which change-detection strategy a context hands to its data keepers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeDetectionKind {
    /// Contents differ if membership or ordering differs
    #[default]
    SequenceSensitive,

    /// Contents differ only if membership differs
    SetEquality,
}

/// Configuration of one unit-of-work mapping context
#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    /// Change-detection policy applied to every collection end point
    pub change_detection: ChangeDetectionKind,
}

impl MappingConfig {
    /// Create a configuration with the default policies
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the change-detection policy
    pub fn change_detection(mut self, kind: ChangeDetectionKind) -> Self {
        self.change_detection = kind;
        self
    }

    /// Instantiate the configured change-detection strategy
    pub fn strategy(&self) -> Rc<dyn ChangeDetectionStrategy> {
        match self.change_detection {
            ChangeDetectionKind::SequenceSensitive => Rc::new(SequenceSensitiveStrategy),
            ChangeDetectionKind::SetEquality => Rc::new(SetEqualityStrategy),
        }
    }

    /// Resolve a strategy from its flattened handle
    pub fn strategy_by_name(name: &str) -> Option<Rc<dyn ChangeDetectionStrategy>> {
        match name {
            "sequence-sensitive" => Some(Rc::new(SequenceSensitiveStrategy)),
            "set-equality" => Some(Rc::new(SetEqualityStrategy)),
            _ => None,
        }
    }
}
