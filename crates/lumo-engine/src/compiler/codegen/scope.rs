// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scope management for variable resolution during compilation.

use rustc_hash::FxHashMap;

/// A local variable in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    /// The variable name
    pub name: String,
    /// The scope depth where this was declared
    pub depth: usize,
    /// Whether a closure captures this variable
    pub captured: bool,
}

/// The locals of one compiler frame.
#[derive(Debug, Default)]
pub struct Scope {
    /// Local variables, slot order
    pub locals: Vec<Local>,
    /// Current scope depth (0 = global)
    pub depth: usize,
}

impl Scope {
    /// Creates a scope starting at `depth`.
    pub fn new(depth: usize) -> Self {
        Self {
            locals: Vec::new(),
            depth,
        }
    }

    /// Begin a new scope.
    pub fn begin_scope(&mut self) {
        self.depth += 1;
    }

    /// End the current scope, returning the removed locals topmost first.
    pub fn end_scope(&mut self) -> Vec<Local> {
        let mut popped = Vec::new();
        while self.locals.last().is_some_and(|local| local.depth >= self.depth) {
            if let Some(local) = self.locals.pop() {
                popped.push(local);
            }
        }
        self.depth = self.depth.saturating_sub(1);
        popped
    }

    /// Returns true if `name` is already declared at the current depth.
    pub fn declared_in_current(&self, name: &str) -> bool {
        self.locals
            .iter()
            .rev()
            .take_while(|local| local.depth >= self.depth)
            .any(|local| local.name == name)
    }

    /// Declare a local variable and return its slot.
    ///
    /// Callers check [`Scope::declared_in_current`] first; an outer local with
    /// the same name is shadowed.
    pub fn declare(&mut self, name: impl Into<String>) -> u32 {
        let slot = self.locals.len() as u32;
        self.locals.push(Local {
            name: name.into(),
            depth: self.depth,
            captured: false,
        });
        slot
    }

    /// Resolve a local variable by name, innermost first.
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|slot| slot as u32)
    }

    /// Marks a local as captured by a closure.
    pub fn mark_captured(&mut self, slot: u32) {
        if let Some(local) = self.locals.get_mut(slot as usize) {
            local.captured = true;
        }
    }

    /// Locals declared deeper than `depth`, topmost first.
    pub fn locals_above(&self, depth: usize) -> impl Iterator<Item = &Local> {
        self.locals
            .iter()
            .rev()
            .take_while(move |local| local.depth > depth)
    }
}

/// A global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// The variable name
    pub name: String,
    /// Whether the defining statement has been compiled
    pub initialized: bool,
}

/// The single global table shared by every frame of a compilation.
///
/// Append-only: slots are handed out during hoisting and never reused.
#[derive(Debug, Default)]
pub struct GlobalTable {
    entries: Vec<Global>,
    index: FxHashMap<String, u32>,
}

impl GlobalTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global and returns its slot, or `None` if the name exists.
    pub fn declare(&mut self, name: &str, initialized: bool) -> Option<u32> {
        if self.index.contains_key(name) {
            return None;
        }
        let slot = self.entries.len() as u32;
        self.entries.push(Global {
            name: name.to_string(),
            initialized,
        });
        self.index.insert(name.to_string(), slot);
        Some(slot)
    }

    /// Looks up a global's slot.
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Returns the global in `slot`.
    pub fn get(&self, slot: u32) -> Option<&Global> {
        self.entries.get(slot as usize)
    }

    /// Marks a global initialized.
    pub fn mark_initialized(&mut self, slot: u32) {
        if let Some(global) = self.entries.get_mut(slot as usize) {
            global.initialized = true;
        }
    }

    /// Number of globals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no global is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One entry in a function's upvalue list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueRef {
    /// Captures a local of the enclosing frame, not one of its upvalues
    pub is_local: bool,
    /// Slot in the enclosing frame's locals or upvalues
    pub index: u32,
}
