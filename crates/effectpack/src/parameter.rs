//! Typed shader parameter records stored in the package parameter block.
//!
//! Types:
//!
//! - `ScalarKind` and `ParamType` describe the declared HLSL type of a
//!   parameter, or the candidate list of an enum parameter.
//! - `ParamValue` is the value carried in `DefaultValue`, `MinValue` and
//!   `MaxValue`. JSON stores these untyped, so decoding reads the declared
//!   type first and interprets the three values through it.
//! - `EffectParameter` is one record, serialized with the PascalCase field
//!   names the render process expects.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
}

impl ScalarKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Uint => "uint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// `float`, `int2`, `uint4`, ... with 1 to 4 components.
    Numeric { kind: ScalarKind, components: usize },
    /// Enum parameter; the stored type is the candidate list itself.
    Enum(Vec<String>),
}

impl ParamType {
    pub const fn scalar(kind: ScalarKind) -> Self {
        Self::Numeric {
            kind,
            components: 1,
        }
    }

    /// Resolves a numeric type keyword. `bool` and `color` are surface sugar
    /// handled by the parameter language and are not accepted here.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let lower = keyword.to_ascii_lowercase();
        let (kind, rest) = if let Some(rest) = lower.strip_prefix("float") {
            (ScalarKind::Float, rest)
        } else if let Some(rest) = lower.strip_prefix("uint") {
            (ScalarKind::Uint, rest)
        } else if let Some(rest) = lower.strip_prefix("int") {
            (ScalarKind::Int, rest)
        } else {
            return None;
        };
        let components = match rest {
            "" => 1,
            "2" => 2,
            "3" => 3,
            "4" => 4,
            _ => return None,
        };
        Some(Self::Numeric { kind, components })
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Self::Enum(_))
    }

    pub fn components(&self) -> usize {
        match self {
            Self::Numeric { components, .. } => *components,
            Self::Enum(_) => 1,
        }
    }

    /// Range lower bound used when a declaration has no `[min, max]` suffix.
    pub fn default_min(&self) -> ParamValue {
        match self {
            Self::Numeric { kind, components } => ParamValue::splat(*kind, *components, 0.0),
            Self::Enum(values) => ParamValue::TextList(values.clone()),
        }
    }

    /// Range upper bound used when a declaration has no `[min, max]` suffix.
    pub fn default_max(&self) -> ParamValue {
        match self {
            Self::Numeric { kind, components } => ParamValue::splat(*kind, *components, 1.0),
            Self::Enum(values) => ParamValue::TextList(values.clone()),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric { kind, components } if *components == 1 => f.write_str(kind.keyword()),
            Self::Numeric { kind, components } => write!(f, "{}{}", kind.keyword(), components),
            Self::Enum(values) => write!(f, "{{{}}}", values.join(", ")),
        }
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(inner) = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            let values = split_enum_values(inner);
            if values.is_empty() {
                return Err("enum type has no candidate values".to_string());
            }
            return Ok(Self::Enum(values));
        }
        Self::from_keyword(trimmed).ok_or_else(|| format!("unknown parameter type '{trimmed}'"))
    }
}

impl Serialize for ParamType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

pub(crate) fn split_enum_values(list: &str) -> Vec<String> {
    list.split([',', ' ', '\t'])
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    FloatVec(Vec<f32>),
    IntVec(Vec<i32>),
    UintVec(Vec<u32>),
    Text(String),
    TextList(Vec<String>),
}

impl ParamValue {
    /// Builds a scalar or a vector with every component set to `value`.
    pub fn splat(kind: ScalarKind, components: usize, value: f64) -> Self {
        match (kind, components) {
            (ScalarKind::Float, 1) => Self::Float(value as f32),
            (ScalarKind::Int, 1) => Self::Int(value as i32),
            (ScalarKind::Uint, 1) => Self::Uint(value as u32),
            (ScalarKind::Float, n) => Self::FloatVec(vec![value as f32; n]),
            (ScalarKind::Int, n) => Self::IntVec(vec![value as i32; n]),
            (ScalarKind::Uint, n) => Self::UintVec(vec![value as u32; n]),
        }
    }

    /// Interprets an untyped JSON value through the declared parameter type.
    /// `is_range` selects the enum representation: ranges hold the candidate
    /// list, defaults hold a single candidate name.
    pub fn from_json(ty: &ParamType, value: &Value, is_range: bool) -> Result<Self, String> {
        match ty {
            ParamType::Enum(_) if is_range => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected an array of enum values, found {value}"))?;
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| format!("enum value {item} is not a string"))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::TextList)
            }
            ParamType::Enum(_) => value
                .as_str()
                .map(|text| Self::Text(text.to_string()))
                .ok_or_else(|| format!("expected an enum value name, found {value}")),
            ParamType::Numeric {
                kind,
                components: 1,
            } => scalar_from_json(*kind, value),
            ParamType::Numeric { kind, components } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected {components} components, found {value}"))?;
                if items.len() != *components {
                    return Err(format!(
                        "expected {components} components, found {}",
                        items.len()
                    ));
                }
                match kind {
                    ScalarKind::Float => items
                        .iter()
                        .map(json_f32)
                        .collect::<Result<Vec<_>, _>>()
                        .map(Self::FloatVec),
                    ScalarKind::Int => items
                        .iter()
                        .map(json_i32)
                        .collect::<Result<Vec<_>, _>>()
                        .map(Self::IntVec),
                    ScalarKind::Uint => items
                        .iter()
                        .map(json_u32)
                        .collect::<Result<Vec<_>, _>>()
                        .map(Self::UintVec),
                }
            }
        }
    }
}

fn scalar_from_json(kind: ScalarKind, value: &Value) -> Result<ParamValue, String> {
    match kind {
        ScalarKind::Float => json_f32(value).map(ParamValue::Float),
        ScalarKind::Int => json_i32(value).map(ParamValue::Int),
        ScalarKind::Uint => json_u32(value).map(ParamValue::Uint),
    }
}

fn json_f32(value: &Value) -> Result<f32, String> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| format!("expected a float, found {value}"))
}

fn json_i32(value: &Value) -> Result<i32, String> {
    // Older writers stored bool parameters as JSON booleans.
    if let Some(flag) = value.as_bool() {
        return Ok(i32::from(flag));
    }
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| format!("expected a 32-bit int, found {value}"))
}

fn json_u32(value: &Value) -> Result<u32, String> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("expected a 32-bit uint, found {value}"))
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Float(v) => serializer.serialize_f32(*v),
            Self::Int(v) => serializer.serialize_i32(*v),
            Self::Uint(v) => serializer.serialize_u32(*v),
            Self::FloatVec(v) => v.serialize(serializer),
            Self::IntVec(v) => v.serialize(serializer),
            Self::UintVec(v) => v.serialize(serializer),
            Self::Text(v) => serializer.serialize_str(v),
            Self::TextList(v) => v.serialize(serializer),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn tuple<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            let joined = items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "({joined})")
        }
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::FloatVec(v) => tuple(f, v),
            Self::IntVec(v) => tuple(f, v),
            Self::UintVec(v) => tuple(f, v),
            Self::Text(v) => f.write_str(v),
            Self::TextList(v) => write!(f, "{{{}}}", v.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RawEffectParameter")]
pub struct EffectParameter {
    pub pass_id: i32,
    pub name: String,
    #[serde(rename = "Type")]
    pub ty: ParamType,
    pub default_value: ParamValue,
    pub min_value: ParamValue,
    pub max_value: ParamValue,
    pub description: String,
}

impl EffectParameter {
    pub fn is_enum(&self) -> bool {
        self.ty.is_enum()
    }

    /// Checks that the record reads back unchanged through the parameter
    /// block decoder: values fit the declared type and enum candidates
    /// survive the `{A, B}` type string.
    pub fn validate(&self) -> Result<(), String> {
        match &self.ty {
            ParamType::Enum(values) => {
                if values.is_empty() {
                    return Err("enum type has no candidate values".to_string());
                }
                if let Some(bad) = values.iter().find(|value| !is_enum_candidate(value)) {
                    return Err(format!(
                        "enum value '{bad}' must be non-empty without spaces, tabs or commas"
                    ));
                }
                if !matches!(self.default_value, ParamValue::Text(_)) {
                    return Err("DefaultValue must be an enum value name".to_string());
                }
                for (label, value) in [("MinValue", &self.min_value), ("MaxValue", &self.max_value)]
                {
                    if !matches!(value, ParamValue::TextList(_)) {
                        return Err(format!("{label} must hold the enum value list"));
                    }
                }
                Ok(())
            }
            ParamType::Numeric { kind, components } => {
                if !(1..=4).contains(components) {
                    return Err(format!("{components} components is not a valid vector width"));
                }
                for (label, value) in [
                    ("DefaultValue", &self.default_value),
                    ("MinValue", &self.min_value),
                    ("MaxValue", &self.max_value),
                ] {
                    check_numeric(*kind, *components, value)
                        .map_err(|reason| format!("{label}: {reason}"))?;
                }
                Ok(())
            }
        }
    }
}

/// A candidate must come back as itself from `split_enum_values`.
fn is_enum_candidate(value: &str) -> bool {
    !value.is_empty() && !value.contains([',', ' ', '\t'])
}

fn check_numeric(kind: ScalarKind, components: usize, value: &ParamValue) -> Result<(), String> {
    let expected = ParamType::Numeric { kind, components };
    let (found_kind, found_len, finite) = match value {
        ParamValue::Float(v) => (ScalarKind::Float, None, v.is_finite()),
        ParamValue::Int(_) => (ScalarKind::Int, None, true),
        ParamValue::Uint(_) => (ScalarKind::Uint, None, true),
        ParamValue::FloatVec(v) => (
            ScalarKind::Float,
            Some(v.len()),
            v.iter().all(|c| c.is_finite()),
        ),
        ParamValue::IntVec(v) => (ScalarKind::Int, Some(v.len()), true),
        ParamValue::UintVec(v) => (ScalarKind::Uint, Some(v.len()), true),
        ParamValue::Text(_) | ParamValue::TextList(_) => {
            return Err(format!("expected a {expected} value, found text"));
        }
    };
    if found_kind != kind {
        return Err(format!(
            "expected a {expected} value, found a {} value",
            found_kind.keyword()
        ));
    }
    match (components, found_len) {
        (1, None) => {}
        (n, Some(len)) if n > 1 && len == n => {}
        (_, len) => {
            return Err(format!(
                "expected {components} components, found {}",
                len.unwrap_or(1)
            ));
        }
    }
    if !finite {
        return Err("float values must be finite".to_string());
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEffectParameter {
    pass_id: i32,
    name: String,
    #[serde(rename = "Type")]
    ty: String,
    default_value: Value,
    min_value: Value,
    max_value: Value,
    #[serde(default)]
    description: Option<String>,
}

impl TryFrom<RawEffectParameter> for EffectParameter {
    type Error = String;

    fn try_from(raw: RawEffectParameter) -> Result<Self, Self::Error> {
        let ty: ParamType = raw.ty.parse()?;
        let field = |label: &str, value: &Value, is_range: bool| {
            ParamValue::from_json(&ty, value, is_range)
                .map_err(|err| format!("parameter '{}' {label}: {err}", raw.name))
        };
        let default_value = field("DefaultValue", &raw.default_value, false)?;
        let min_value = field("MinValue", &raw.min_value, true)?;
        let max_value = field("MaxValue", &raw.max_value, true)?;
        Ok(Self {
            pass_id: raw.pass_id,
            name: raw.name,
            ty,
            default_value,
            min_value,
            max_value,
            description: raw.description.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_resolve_to_numeric_types() {
        assert_eq!(
            ParamType::from_keyword("float3"),
            Some(ParamType::Numeric {
                kind: ScalarKind::Float,
                components: 3
            })
        );
        assert_eq!(
            ParamType::from_keyword("UINT"),
            Some(ParamType::scalar(ScalarKind::Uint))
        );
        assert_eq!(
            ParamType::from_keyword("int4").map(|ty| ty.to_string()),
            Some("int4".to_string())
        );
        assert_eq!(ParamType::from_keyword("int5"), None);
        assert_eq!(ParamType::from_keyword("bool"), None);
        assert_eq!(ParamType::from_keyword("color"), None);
    }

    #[test]
    fn enum_type_parses_from_brace_list() {
        let ty: ParamType = "{MAT_LAMBERT, MAT_PHONG, MAT_PBR}".parse().unwrap();
        assert_eq!(
            ty,
            ParamType::Enum(vec![
                "MAT_LAMBERT".into(),
                "MAT_PHONG".into(),
                "MAT_PBR".into()
            ])
        );
        assert_eq!(ty.to_string(), "{MAT_LAMBERT, MAT_PHONG, MAT_PBR}");
        assert!("{}".parse::<ParamType>().is_err());
    }

    #[test]
    fn default_ranges_match_vector_width() {
        let ty = ParamType::from_keyword("float2").unwrap();
        assert_eq!(ty.default_min(), ParamValue::FloatVec(vec![0.0, 0.0]));
        assert_eq!(ty.default_max(), ParamValue::FloatVec(vec![1.0, 1.0]));
        let ty = ParamType::scalar(ScalarKind::Int);
        assert_eq!(ty.default_max(), ParamValue::Int(1));
    }

    #[test]
    fn serializes_with_pascal_case_fields() {
        let param = EffectParameter {
            pass_id: 1,
            name: "exposure".into(),
            ty: ParamType::scalar(ScalarKind::Float),
            default_value: ParamValue::Float(1.5),
            min_value: ParamValue::Float(0.1),
            max_value: ParamValue::Float(5.0),
            description: "exposure strength".into(),
        };
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["PassId"], 1);
        assert_eq!(json["Type"], "float");
        assert_eq!(json["DefaultValue"], 1.5);
        assert_eq!(json["Description"], "exposure strength");

        let back: EffectParameter = serde_json::from_value(json).unwrap();
        assert_eq!(back, param);
    }

    #[test]
    fn deserializes_enum_parameter() {
        let json = r#"{
            "PassId": 2,
            "Name": "material",
            "Type": "{A, B}",
            "DefaultValue": "B",
            "MinValue": ["A", "B"],
            "MaxValue": ["A", "B"],
            "Description": null
        }"#;
        let param: EffectParameter = serde_json::from_str(json).unwrap();
        assert!(param.is_enum());
        assert_eq!(param.default_value, ParamValue::Text("B".into()));
        assert_eq!(
            param.min_value,
            ParamValue::TextList(vec!["A".into(), "B".into()])
        );
        assert_eq!(param.description, "");
    }

    #[test]
    fn rejects_values_that_do_not_fit_the_type() {
        let json = r#"{
            "PassId": 1,
            "Name": "pos",
            "Type": "float3",
            "DefaultValue": [1.0, 2.0],
            "MinValue": [0.0, 0.0, 0.0],
            "MaxValue": [1.0, 1.0, 1.0],
            "Description": ""
        }"#;
        let err = serde_json::from_str::<EffectParameter>(json).unwrap_err();
        assert!(err.to_string().contains("expected 3 components"));

        let json = r#"{
            "PassId": 1,
            "Name": "count",
            "Type": "uint",
            "DefaultValue": -1,
            "MinValue": 0,
            "MaxValue": 1,
            "Description": ""
        }"#;
        assert!(serde_json::from_str::<EffectParameter>(json).is_err());
    }

    #[test]
    fn legacy_boolean_values_decode_as_int() {
        let ty = ParamType::scalar(ScalarKind::Int);
        assert_eq!(
            ParamValue::from_json(&ty, &Value::Bool(true), false).unwrap(),
            ParamValue::Int(1)
        );
    }

    fn float3(default: ParamValue) -> EffectParameter {
        EffectParameter {
            pass_id: 1,
            name: "lightPos".into(),
            ty: ParamType::Numeric {
                kind: ScalarKind::Float,
                components: 3,
            },
            default_value: default,
            min_value: ParamValue::FloatVec(vec![0.0; 3]),
            max_value: ParamValue::FloatVec(vec![1.0; 3]),
            description: String::new(),
        }
    }

    #[test]
    fn validate_accepts_parsed_shapes() {
        assert!(float3(ParamValue::FloatVec(vec![1.0, 2.0, 3.0]))
            .validate()
            .is_ok());
        let material = EffectParameter {
            pass_id: 1,
            name: "material".into(),
            ty: ParamType::Enum(vec!["A".into(), "B".into()]),
            default_value: ParamValue::Text("C".into()),
            min_value: ParamValue::TextList(vec!["A".into(), "B".into()]),
            max_value: ParamValue::TextList(vec!["A".into(), "B".into()]),
            description: String::new(),
        };
        assert!(material.validate().is_ok());
    }

    #[test]
    fn validate_rejects_values_the_decoder_refuses() {
        let short = float3(ParamValue::FloatVec(vec![1.0]));
        assert!(short.validate().unwrap_err().contains("expected 3 components"));

        let scalar = float3(ParamValue::Float(1.0));
        assert!(scalar.validate().is_err());

        let mut wide = float3(ParamValue::FloatVec(vec![0.0; 5]));
        wide.ty = ParamType::Numeric {
            kind: ScalarKind::Float,
            components: 5,
        };
        assert!(wide.validate().unwrap_err().contains("vector width"));

        let nan = float3(ParamValue::FloatVec(vec![f32::NAN, 0.0, 0.0]));
        assert!(nan.validate().unwrap_err().contains("finite"));

        let mut wrong_kind = float3(ParamValue::IntVec(vec![1, 2, 3]));
        assert!(wrong_kind.validate().unwrap_err().contains("int"));
        wrong_kind.ty = ParamType::scalar(ScalarKind::Int);
        wrong_kind.default_value = ParamValue::Float(0.5);
        wrong_kind.min_value = ParamValue::Int(0);
        wrong_kind.max_value = ParamValue::Int(1);
        assert!(wrong_kind.validate().unwrap_err().starts_with("DefaultValue"));
    }

    #[test]
    fn validate_rejects_enum_candidates_that_would_split() {
        let mut param = EffectParameter {
            pass_id: 1,
            name: "mode".into(),
            ty: ParamType::Enum(vec!["A B".into()]),
            default_value: ParamValue::Text("A B".into()),
            min_value: ParamValue::TextList(vec!["A B".into()]),
            max_value: ParamValue::TextList(vec!["A B".into()]),
            description: String::new(),
        };
        assert!(param.validate().unwrap_err().contains("'A B'"));
        param.ty = ParamType::Enum(vec!["A,B".into()]);
        assert!(param.validate().is_err());
        param.ty = ParamType::Enum(Vec::new());
        assert!(param.validate().unwrap_err().contains("no candidate values"));
    }
}
