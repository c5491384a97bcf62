//! Variable Store
//!
//! A layered mapping from name to [`Variable`] — string, indexed array,
//! associative array, or name-reference — backed by the flat `env`
//! map and its parallel attribute sets on [`InterpreterState`]. This module
//! is a thin facade: the attribute bookkeeping (readonly, exported, nameref,
//! ...) and the actual storage already live on `InterpreterState` and in
//! `expansion::variable`/`helpers::nameref`; `get`/`set`/`each`/
//! `resolve_nameref` here give that substrate the names the rest of the
//! executor expects to call.

use std::collections::HashMap;

use crate::interpreter::expansion::variable::{get_array_elements, get_variable, is_variable_set, ArrayIndex};
use crate::interpreter::helpers::nameref::{is_nameref, resolve_nameref as resolve_nameref_chain};
use crate::interpreter::types::InterpreterState;

/// The kind-tagged value held by a [`Variable`]. Arrays are materialized
/// eagerly from the `name_0`, `name_1`, ... / `name_KEY` storage scheme
/// used by the rest of the interpreter, since callers of `get` want a
/// snapshot rather than a live cursor into `env`.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Unset,
    String(String),
    Indexed(Vec<String>),
    Associative(Vec<(String, String)>),
    NameRef(String),
}

/// A variable's value plus its attribute flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub set: bool,
    pub exported: bool,
    pub read_only: bool,
    pub local: bool,
    pub name_ref: bool,
    pub value: VariableValue,
}

impl Variable {
    pub fn unset() -> Self {
        Self {
            set: false,
            exported: false,
            read_only: false,
            local: false,
            name_ref: false,
            value: VariableValue::Unset,
        }
    }
}

/// Error raised when a store operation violates a Variable invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableStoreError {
    pub message: String,
}

impl std::fmt::Display for VariableStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VariableStoreError {}

/// Read a variable's current value and attributes.
///
/// Scalars resolve through the same path as ordinary parameter expansion
/// (`get_variable`), so special names (`?`, `$`, `PPID`, ...) and
/// nameref indirection behave identically. Arrays are detected via
/// [`get_array_elements`], which already understands the `name_0`/
/// `name_KEY` storage convention for both indexed and associative arrays.
pub fn get(state: &InterpreterState, name: &str) -> Variable {
    if is_nameref(state, name) {
        let target = resolve_nameref_chain(state, &state.env, name, None).unwrap_or_else(|| name.to_string());
        return Variable {
            set: is_variable_set(state, name),
            exported: is_exported(state, name),
            read_only: is_readonly(state, name),
            local: is_local(state, name),
            name_ref: true,
            value: VariableValue::NameRef(target),
        };
    }

    let is_assoc = state.associative_arrays.as_ref().map_or(false, |a| a.contains(name));
    let elements = get_array_elements(state, name);

    let value = if !elements.is_empty() {
        if is_assoc {
            VariableValue::Associative(
                elements
                    .into_iter()
                    .map(|(idx, v)| {
                        let key = match idx {
                            ArrayIndex::Numeric(n) => n.to_string(),
                            ArrayIndex::String(s) => s,
                        };
                        (key, v)
                    })
                    .collect(),
            )
        } else {
            VariableValue::Indexed(elements.into_iter().map(|(_, v)| v).collect())
        }
    } else if is_variable_set(state, name) {
        VariableValue::String(get_variable(state, name))
    } else {
        VariableValue::Unset
    };

    Variable {
        set: !matches!(value, VariableValue::Unset),
        exported: is_exported(state, name),
        read_only: is_readonly(state, name),
        local: is_local(state, name),
        name_ref: false,
        value,
    }
}

/// Write a scalar variable, honoring the read-only invariant.
///
/// Array and nameref writes go through the existing, more specialized
/// assignment helpers (`simple_command_assignments`, `declare_cmd`) that
/// already know how to allocate `name_KEY` slots; this entry point only
/// covers the plain `name=value` case the spec calls out at §4.2.
pub fn set(state: &mut InterpreterState, name: &str, value: &str) -> Result<(), VariableStoreError> {
    if is_readonly(state, name) {
        return Err(VariableStoreError {
            message: format!("{}: readonly variable", name),
        });
    }
    state.env.insert(name.to_string(), value.to_string());
    Ok(())
}

/// Visit every declared scalar variable, outermost local scope first, then
/// globals — matching the Environment Overlay's "outermost first" iteration
/// order from §3, so that a visitor recording into a map sees later
/// (innermost) writes shadow earlier ones.
pub fn each<F: FnMut(&str, &Variable)>(state: &InterpreterState, mut visitor: F) {
    let mut seen = std::collections::HashSet::new();
    for (name, _) in state.env.iter() {
        if name.contains('_') && is_array_element_key(state, name) {
            continue;
        }
        if seen.insert(name.clone()) {
            visitor(name, &get(state, name));
        }
    }
}

/// Follow a nameref chain to its final target name, bounded to 100 hops.
/// Returns `None` on a detected cycle, matching §4.2's "depth-bounded"
/// requirement.
pub fn resolve_nameref(state: &InterpreterState, name: &str) -> Option<String> {
    resolve_nameref_chain(state, &state.env, name, Some(100))
}

fn is_array_element_key(state: &InterpreterState, key: &str) -> bool {
    if let Some((base, _)) = key.rsplit_once('_') {
        let prefix = format!("{}_", base);
        return state.env.keys().filter(|k| k.starts_with(&prefix)).count() > 0
            && (state.associative_arrays.as_ref().map_or(false, |a| a.contains(base))
                || key[base.len() + 1..].parse::<usize>().is_ok());
    }
    false
}

fn is_exported(state: &InterpreterState, name: &str) -> bool {
    state.exported_vars.as_ref().map_or(false, |s| s.contains(name))
        || state.temp_exported_vars.as_ref().map_or(false, |s| s.contains(name))
}

fn is_readonly(state: &InterpreterState, name: &str) -> bool {
    state.readonly_vars.as_ref().map_or(false, |s| s.contains(name))
}

fn is_local(state: &InterpreterState, name: &str) -> bool {
    state.local_scopes.iter().any(|scope| scope.contains_key(name))
}

/// Build the exported subset of `env` as a flat map, for handing to an
/// external command's environment (see `interpreter::build_exported_env`,
/// which this mirrors at the Variable Store's level of abstraction).
pub fn exported_snapshot(state: &InterpreterState) -> HashMap<String, String> {
    let mut out = HashMap::new();
    each(state, |name, var| {
        if var.exported {
            if let VariableValue::String(ref s) = var.value {
                out.insert(name.to_string(), s.clone());
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_scalar_value() {
        let mut state = InterpreterState::default();
        state.env.insert("FOO".to_string(), "bar".to_string());

        let var = get(&state, "FOO");
        assert!(var.set);
        assert_eq!(var.value, VariableValue::String("bar".to_string()));
    }

    #[test]
    fn set_rejects_readonly() {
        let mut state = InterpreterState::default();
        state.env.insert("FOO".to_string(), "bar".to_string());
        state.readonly_vars = Some(std::collections::HashSet::from(["FOO".to_string()]));

        let err = set(&mut state, "FOO", "baz").unwrap_err();
        assert!(err.message.contains("readonly"));
        assert_eq!(state.env.get("FOO"), Some(&"bar".to_string()));
    }

    #[test]
    fn resolve_nameref_follows_chain() {
        let mut state = InterpreterState::default();
        state.env.insert("a".to_string(), "b".to_string());
        state.env.insert("b".to_string(), "value".to_string());
        crate::interpreter::helpers::nameref::mark_nameref(&mut state, "a");

        assert_eq!(resolve_nameref(&state, "a"), Some("b".to_string()));
        assert_eq!(resolve_nameref(&state, "b"), Some("b".to_string()));
    }
}
