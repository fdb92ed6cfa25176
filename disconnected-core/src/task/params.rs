//! Declarative input/output contracts for task executors.
//!
//! Each executor describes its inputs and callbacks with a [`ParameterSet`]
//! built once from plain data; the runner resolves the provided
//! [`Arguments`] against it before the executor starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TaskError;

/// A single argument value passed into or out of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ArgValue>),
}

impl ArgValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            ArgValue::Bool(_) => ArgKind::Bool,
            ArgValue::Int(_) => ArgKind::Int,
            ArgValue::Float(_) => ArgKind::Float,
            ArgValue::Text(_) => ArgKind::Text,
            ArgValue::List(_) => ArgKind::List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(v) => Some(*v),
            ArgValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(v as i64)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::Int(v as i64)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Text(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Text(v)
    }
}

/// The type an input parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    Bool,
    Int,
    Float,
    Text,
    List,
    Any,
}

impl ArgKind {
    fn accepts(self, value: &ArgValue) -> bool {
        match self {
            ArgKind::Any => true,
            // Integers widen to floats.
            ArgKind::Float => matches!(value, ArgValue::Float(_) | ArgValue::Int(_)),
            kind => value.kind() == kind,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ArgKind::Bool => "a bool",
            ArgKind::Int => "an integer",
            ArgKind::Float => "a number",
            ArgKind::Text => "text",
            ArgKind::List => "a list",
            ArgKind::Any => "any value",
        }
    }
}

/// Named argument map, ordered by name so it serializes deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, ArgValue>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.0.iter()
    }

    /// Required integer argument.
    pub fn int(&self, name: &str) -> Result<i64, TaskError> {
        let value = self.get(name).ok_or_else(|| TaskError::MissingArgument(name.to_string()))?;
        value.as_int().ok_or_else(|| TaskError::WrongArgumentType {
            name: name.to_string(),
            expected: ArgKind::Int.label(),
        })
    }

    /// Required text argument.
    pub fn text(&self, name: &str) -> Result<&str, TaskError> {
        let value = self.get(name).ok_or_else(|| TaskError::MissingArgument(name.to_string()))?;
        value.as_text().ok_or_else(|| TaskError::WrongArgumentType {
            name: name.to_string(),
            expected: ArgKind::Text.label(),
        })
    }

    /// Required boolean argument.
    pub fn flag(&self, name: &str) -> Result<bool, TaskError> {
        let value = self.get(name).ok_or_else(|| TaskError::MissingArgument(name.to_string()))?;
        value.as_bool().ok_or_else(|| TaskError::WrongArgumentType {
            name: name.to_string(),
            expected: ArgKind::Bool.label(),
        })
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputParameter {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub default: Option<ArgValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDescriptor {
    pub name: String,
    pub outputs: Vec<String>,
}

/// Input parameters and callbacks an executor declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    inputs: Vec<InputParameter>,
    callbacks: Vec<CallbackDescriptor>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: ArgKind) -> Self {
        self.inputs.push(InputParameter { name: name.into(), kind, required: true, default: None });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: ArgKind, default: impl Into<ArgValue>) -> Self {
        self.inputs.push(InputParameter {
            name: name.into(),
            kind,
            required: false,
            default: Some(default.into()),
        });
        self
    }

    pub fn callback(mut self, name: impl Into<String>, outputs: &[&str]) -> Self {
        self.callbacks.push(CallbackDescriptor {
            name: name.into(),
            outputs: outputs.iter().map(|o| o.to_string()).collect(),
        });
        self
    }

    pub fn inputs(&self) -> &[InputParameter] {
        &self.inputs
    }

    pub fn callbacks(&self) -> &[CallbackDescriptor] {
        &self.callbacks
    }

    /// Builds the effective inputs: provided values are type-checked,
    /// absent optional ones take their default. Undeclared arguments are dropped.
    pub fn resolve(&self, provided: &Arguments) -> Result<Arguments, TaskError> {
        let mut resolved = Arguments::new();
        for input in &self.inputs {
            match provided.get(&input.name) {
                Some(value) if input.kind.accepts(value) => {
                    resolved.insert(input.name.clone(), value.clone());
                }
                Some(_) => {
                    return Err(TaskError::WrongArgumentType {
                        name: input.name.clone(),
                        expected: input.kind.label(),
                    });
                }
                None => match &input.default {
                    Some(default) => resolved.insert(input.name.clone(), default.clone()),
                    None if input.required => {
                        return Err(TaskError::MissingArgument(input.name.clone()));
                    }
                    None => {}
                },
            }
        }
        Ok(resolved)
    }

    /// Checks a reported callback against the declared ones.
    pub fn check_callback(&self, name: &str, outputs: &Arguments) -> Result<(), TaskError> {
        let descriptor = self
            .callbacks
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| TaskError::UnknownCallback(name.to_string()))?;
        match descriptor.outputs.iter().find(|o| !outputs.contains(o)) {
            Some(missing) => Err(TaskError::MissingArgument(missing.clone())),
            None => Ok(()),
        }
    }
}
