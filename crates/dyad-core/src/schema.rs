//! Declared parameter schemas for actions and argument validation.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::Value;

/// Concrete argument values for one invocation, keyed by parameter name.
pub type Args = IndexMap<String, Value>;

/// The type a parameter accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Any value, including `null`.
    Any,
    /// `true` or `false`.
    Bool,
    /// A JSON number without a fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// A string.
    String,
    /// An array of any values.
    Array,
    /// An object of any values.
    Object,
    /// Any one of the listed types.
    OneOf(Vec<ParamType>),
}

impl ParamType {
    /// Whether `value` is acceptable for this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::OneOf(types) => types.iter().any(|t| t.accepts(value)),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Integer => f.write_str("int"),
            Self::Number => f.write_str("number"),
            Self::String => f.write_str("str"),
            Self::Array => f.write_str("array"),
            Self::Object => f.write_str("object"),
            Self::OneOf(types) => {
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
        }
    }
}

/// One declared parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Argument name.
    pub name: String,
    /// Accepted type.
    pub ty: ParamType,
    /// Whether the argument must be supplied.
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    /// An optional parameter.
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// Ordered parameter list of one operation.
///
/// Most operations take a handful of arguments, so the list is stored
/// inline up to four entries.
///
/// # Examples
///
/// ```
/// use dyad_core::{Args, ParamSchema, ParamSpec, ParamType, Value};
///
/// let schema = ParamSchema::new([ParamSpec::required("by", ParamType::Integer)]);
/// let mut args = Args::new();
/// args.insert("by".into(), Value::from(1));
/// assert!(schema.validate(&args).is_ok());
///
/// args.insert("by".into(), Value::from("one"));
/// assert!(schema.validate(&args).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSchema {
    params: SmallVec<[ParamSpec; 4]>,
}

impl ParamSchema {
    /// Build a schema from parameter specs, in declaration order.
    pub fn new(params: impl IntoIterator<Item = ParamSpec>) -> Self {
        Self {
            params: params.into_iter().collect(),
        }
    }

    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declared parameters in order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names with duplicates, if any. A well-formed schema returns none.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut dups = Vec::new();
        for (i, p) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|q| q.name == p.name) && !dups.contains(&p.name.as_str())
            {
                dups.push(p.name.as_str());
            }
        }
        dups
    }

    /// Check `args` against the schema.
    ///
    /// Fails on a missing required argument, an argument whose value the
    /// declared type does not accept, or an argument name the schema does
    /// not declare. Returns the first problem found as a message.
    pub fn validate(&self, args: &Args) -> Result<(), String> {
        for p in &self.params {
            match args.get(&p.name) {
                None if p.required => {
                    return Err(format!("missing required argument '{}'", p.name));
                }
                None => {}
                Some(v) if !p.ty.accepts(v) => {
                    return Err(format!(
                        "argument '{}' expects {}, got {}",
                        p.name,
                        p.ty,
                        type_name(v)
                    ));
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = args.keys().find(|k| self.get(k).is_none()) {
            return Err(format!("unexpected argument '{extra}'"));
        }
        Ok(())
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
