//=========================================================================
// Input Contexts
//=========================================================================
//
// Named scopes of action definitions and the stack that activates them.
//
// Resolution: current (top-of-stack) context first, then "global".
// The global context always exists; clearing the stack never removes it.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::BTreeMap;

//=== Internal Dependencies ===============================================

use super::action::{ActionDefinition, Binding};

/// Reserved name of the context that is always present.
pub const GLOBAL_CONTEXT: &str = "global";

//=== ActionRegistry ======================================================

/// Action definitions grouped by context name.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRegistry {
    contexts: BTreeMap<String, BTreeMap<String, ActionDefinition>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        let mut contexts = BTreeMap::new();
        contexts.insert(GLOBAL_CONTEXT.to_string(), BTreeMap::new());
        Self { contexts }
    }

    /// Registers or overwrites `name` in the global context.
    pub fn define(&mut self, name: &str, bindings: Vec<Binding>) {
        self.define_in(GLOBAL_CONTEXT, name, bindings);
    }

    /// Registers or overwrites `name` in `context`, creating it if absent.
    pub fn define_in(&mut self, context: &str, name: &str, bindings: Vec<Binding>) {
        self.ensure_context(context)
            .insert(name.to_string(), ActionDefinition::new(name, bindings));
    }

    /// Creates an empty context if it does not exist yet.
    pub fn ensure_context(&mut self, context: &str) -> &mut BTreeMap<String, ActionDefinition> {
        self.contexts.entry(context.to_string()).or_default()
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.contexts.contains_key(context)
    }

    /// Looks `name` up in `current` (if any), falling back to global.
    pub fn resolve(&self, current: Option<&str>, name: &str) -> Option<&ActionDefinition> {
        current
            .and_then(|ctx| self.contexts.get(ctx))
            .and_then(|actions| actions.get(name))
            .or_else(|| self.contexts.get(GLOBAL_CONTEXT)?.get(name))
    }

    /// Every action name visible from `current`, sorted and deduplicated.
    pub fn visible_actions(&self, current: Option<&str>) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let scopes = [current, Some(GLOBAL_CONTEXT)];
        for actions in scopes.iter().flatten().filter_map(|ctx| self.contexts.get(*ctx)) {
            names.extend(actions.keys().map(String::as_str));
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Number of actions defined across all contexts.
    pub fn action_count(&self) -> usize {
        self.contexts.values().map(BTreeMap::len).sum()
    }

    /// Drops every definition and non-global context.
    pub fn reset(&mut self) {
        self.contexts.retain(|name, _| name == GLOBAL_CONTEXT);
        if let Some(global) = self.contexts.get_mut(GLOBAL_CONTEXT) {
            global.clear();
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//=== ContextStack ========================================================

/// Ordered list of active context names. Last pushed is current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStack {
    stack: Vec<String>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str) {
        self.stack.push(name.to_string());
    }

    /// Pops the current context. No-op on an empty stack.
    pub fn pop(&mut self) -> Option<String> {
        self.stack.pop()
    }

    /// Replaces the whole stack with a single context.
    pub fn set(&mut self, name: &str) {
        self.stack.clear();
        self.stack.push(name.to_string());
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Membership across the whole stack, not just the top.
    pub fn is_active(&self, name: &str) -> bool {
        self.stack.iter().any(|ctx| ctx == name)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
