//! Parser for the line-oriented parameter language authors write next to each
//! shader pass:
//!
//! ```text
//! float exposure = 1.0 [0.1, 5.0] # exposure strength
//! float3 lightPos = (10.0, 5.0, 8.0) [-100, 100]
//! bool enableShadow = true
//! color mainColor = (0.7, 0.2, 0.1, 1.0)
//! enum MaterialType { MAT_LAMBERT, MAT_PHONG, MAT_PBR } materialType = MAT_PBR
//! ```
//!
//! Parsing is best effort: every line yields its own `Result`, and a batch
//! keeps the parameters that parsed (in order) next to a diagnostic for each
//! line that did not. `bool` declarations become `int` parameters holding 0
//! or 1 and `color` declarations become `float4`.
use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostics::{Diagnostic, Severity};
use crate::parameter::{split_enum_values, EffectParameter, ParamType, ParamValue, ScalarKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("missing '=' between declaration and value")]
    MissingAssignment,
    #[error("expected '<type> <name>' before '=', found {0} token(s)")]
    BadDeclaration(usize),
    #[error("unknown parameter type '{0}'")]
    UnknownType(String),
    #[error("'{0}' is not a valid identifier")]
    InvalidName(String),
    #[error("enum declaration must list its values inside '{{ }}'")]
    UnterminatedEnum,
    #[error("enum declaration is missing a type name before '{{'")]
    MissingEnumName,
    #[error("enum '{0}' declares no values")]
    EmptyEnum(String),
    #[error("missing default value after '='")]
    MissingValue,
    #[error("malformed range in '{0}', expected [min, max]")]
    MalformedRange(String),
    #[error("invalid {ty} value '{value}'")]
    InvalidNumber { ty: &'static str, value: String },
    #[error("invalid bool value '{0}', expected true or false")]
    InvalidBool(String),
    #[error("parameter '{0}' is already declared in this pass")]
    DuplicateName(String),
    #[error("'{0}' is not one of the enum values")]
    NotInEnum(String),
}

/// A successfully parsed line plus any non-fatal findings about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub parameter: EffectParameter,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub parameters: Vec<EffectParameter>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    /// Number of lines that were dropped from the result.
    pub fn skipped(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn merge(&mut self, other: ParseOutcome) {
        self.parameters.extend(other.parameters);
        self.diagnostics.extend(other.diagnostics);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParamParser;

impl ParamParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses every declaration in `text` as belonging to `pass_id`. Blank
    /// lines and lines starting with `#` are ignored.
    pub fn parse_block(&self, pass_id: i32, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut seen = HashSet::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line_number = index + 1;

            let parsed = self
                .parse_line(pass_id, line)
                .and_then(|parsed| {
                    if seen.insert(parsed.parameter.name.clone()) {
                        Ok(parsed)
                    } else {
                        Err(LineError::DuplicateName(parsed.parameter.name))
                    }
                });

            match parsed {
                Ok(parsed) => {
                    for warning in parsed.warnings {
                        warn!(pass = pass_id, line = line_number, text = line, "{warning}");
                        outcome
                            .diagnostics
                            .push(Diagnostic::warning(line, warning).at_line(pass_id, line_number));
                    }
                    outcome.parameters.push(parsed.parameter);
                }
                Err(err) => {
                    warn!(
                        pass = pass_id,
                        line = line_number,
                        text = line,
                        error = %err,
                        "skipping parameter line"
                    );
                    outcome
                        .diagnostics
                        .push(Diagnostic::error(line, err.to_string()).at_line(pass_id, line_number));
                }
            }
        }

        debug!(
            pass = pass_id,
            parsed = outcome.parameters.len(),
            skipped = outcome.skipped(),
            "parsed parameter block"
        );
        outcome
    }

    /// Parses the parameter text of several passes, keeping pass order.
    pub fn parse_passes<'a, I>(&self, passes: I) -> ParseOutcome
    where
        I: IntoIterator<Item = (i32, &'a str)>,
    {
        let mut outcome = ParseOutcome::default();
        for (pass_id, text) in passes {
            outcome.merge(self.parse_block(pass_id, text));
        }
        outcome
    }

    /// Parses a single declaration line. The caller is expected to have
    /// dropped blank and comment-only lines.
    pub fn parse_line(&self, pass_id: i32, line: &str) -> Result<ParsedLine, LineError> {
        let (declaration, rest) = line
            .trim()
            .split_once('=')
            .ok_or(LineError::MissingAssignment)?;
        let (value_part, description) = match rest.split_once('#') {
            Some((value, description)) => (value.trim(), description.trim()),
            None => (rest.trim(), ""),
        };
        let declaration = declaration.trim();

        let (value_text, range) = split_range(value_part)?;
        if value_text.is_empty() {
            return Err(LineError::MissingValue);
        }

        let mut warnings = Vec::new();
        let parameter = if let Some(enum_decl) = strip_enum_keyword(declaration) {
            let (type_name, values, name) = parse_enum_declaration(enum_decl)?;
            if !values.iter().any(|value| value == value_text) {
                warnings.push(format!(
                    "default value '{value_text}' is not one of the values of enum '{type_name}'"
                ));
            }
            if range.is_some() {
                warnings.push(format!(
                    "range ignored for enum parameter '{name}'; its values define the legal set"
                ));
            }
            EffectParameter {
                pass_id,
                name,
                ty: ParamType::Enum(values.clone()),
                default_value: ParamValue::Text(value_text.to_string()),
                min_value: ParamValue::TextList(values.clone()),
                max_value: ParamValue::TextList(values),
                description: description.to_string(),
            }
        } else {
            let tokens: Vec<&str> = declaration.split_whitespace().collect();
            let [keyword, name] = tokens.as_slice() else {
                return Err(LineError::BadDeclaration(tokens.len()));
            };
            let name = validate_identifier(name)?;
            let (ty, default_value, min_value, max_value) =
                parse_typed_values(keyword, value_text, range)?;
            EffectParameter {
                pass_id,
                name,
                ty,
                default_value,
                min_value,
                max_value,
                description: description.to_string(),
            }
        };

        Ok(ParsedLine {
            parameter,
            warnings,
        })
    }

    /// Parses a replacement value for a parameter of type `ty`, using the
    /// literal syntax of declarations. Enum values must name a candidate and
    /// scalar `int` parameters also accept `true`/`false`.
    pub fn parse_value(&self, ty: &ParamType, text: &str) -> Result<ParamValue, LineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LineError::MissingValue);
        }
        match ty {
            ParamType::Enum(values) => values
                .iter()
                .find(|value| *value == text)
                .map(|value| ParamValue::Text(value.clone()))
                .ok_or_else(|| LineError::NotInEnum(text.to_string())),
            ParamType::Numeric {
                kind: ScalarKind::Int,
                components: 1,
            } if parse_bool(text).is_ok() => Ok(ParamValue::Int(i32::from(parse_bool(text)?))),
            ParamType::Numeric { kind, components } => {
                parse_numeric(*kind, *components, text, false)
            }
        }
    }
}

type TypedValues = (ParamType, ParamValue, ParamValue, ParamValue);

fn parse_typed_values(
    keyword: &str,
    value_text: &str,
    range: Option<(&str, &str)>,
) -> Result<TypedValues, LineError> {
    if keyword.eq_ignore_ascii_case("bool") {
        let default = parse_bool(value_text)?;
        if let Some((min, max)) = range {
            parse_bool(min)?;
            parse_bool(max)?;
        }
        return Ok((
            ParamType::scalar(ScalarKind::Int),
            ParamValue::Int(i32::from(default)),
            ParamValue::Int(0),
            ParamValue::Int(1),
        ));
    }

    let ty = if keyword.eq_ignore_ascii_case("color") {
        ParamType::Numeric {
            kind: ScalarKind::Float,
            components: 4,
        }
    } else {
        ParamType::from_keyword(keyword)
            .ok_or_else(|| LineError::UnknownType(keyword.to_string()))?
    };
    let ParamType::Numeric { kind, components } = &ty else {
        return Err(LineError::UnknownType(keyword.to_string()));
    };
    let (kind, components) = (*kind, *components);

    let default = parse_numeric(kind, components, value_text, false)?;
    let (min, max) = match range {
        Some((min, max)) => (
            parse_numeric(kind, components, min, true)?,
            parse_numeric(kind, components, max, true)?,
        ),
        None => (ty.default_min(), ty.default_max()),
    };
    Ok((ty, default, min, max))
}

fn strip_enum_keyword(declaration: &str) -> Option<&str> {
    let (head, tail) = declaration.split_once(char::is_whitespace)?;
    head.eq_ignore_ascii_case("enum").then_some(tail)
}

/// Splits `Name { A, B, C } param` into the type name, candidates and
/// parameter name.
fn parse_enum_declaration(declaration: &str) -> Result<(String, Vec<String>, String), LineError> {
    let open = declaration.find('{').ok_or(LineError::UnterminatedEnum)?;
    let close = declaration
        .find('}')
        .filter(|close| *close > open)
        .ok_or(LineError::UnterminatedEnum)?;

    let type_name = declaration[..open].trim();
    if type_name.is_empty() {
        return Err(LineError::MissingEnumName);
    }
    let type_name = validate_identifier(type_name)?;

    let values = split_enum_values(&declaration[open + 1..close]);
    if values.is_empty() {
        return Err(LineError::EmptyEnum(type_name));
    }

    let name = validate_identifier(declaration[close + 1..].trim())?;
    Ok((type_name, values, name))
}

/// Separates an optional trailing `[min, max]` from the default value text.
fn split_range(value_part: &str) -> Result<(&str, Option<(&str, &str)>), LineError> {
    let malformed = || LineError::MalformedRange(value_part.to_string());
    match (value_part.find('['), value_part.find(']')) {
        (None, None) => Ok((value_part, None)),
        (Some(open), Some(close)) if close > open => {
            if !value_part[close + 1..].trim().is_empty() {
                return Err(malformed());
            }
            let (min, max) =
                split_top_level_comma(&value_part[open + 1..close]).ok_or_else(malformed)?;
            let (min, max) = (min.trim(), max.trim());
            if min.is_empty() || max.is_empty() {
                return Err(malformed());
            }
            Ok((value_part[..open].trim(), Some((min, max))))
        }
        _ => Err(malformed()),
    }
}

/// Splits on the first comma that is not inside parentheses so vector
/// bounds such as `[(0, 0), (1, 1)]` stay intact.
fn split_top_level_comma(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (index, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&text[..index], &text[index + 1..])),
            _ => {}
        }
    }
    None
}

fn validate_identifier(name: &str) -> Result<String, LineError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
    if valid {
        Ok(name.to_string())
    } else {
        Err(LineError::InvalidName(name.to_string()))
    }
}

fn parse_bool(text: &str) -> Result<bool, LineError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(LineError::InvalidBool(trimmed.to_string()))
    }
}

/// Parses a scalar or a parenthesised tuple. Tuples keep at most
/// `components` entries and zero-fill the rest. With `broadcast`, a bare
/// scalar given for a vector type fills every component.
fn parse_numeric(
    kind: ScalarKind,
    components: usize,
    text: &str,
    broadcast: bool,
) -> Result<ParamValue, LineError> {
    let trimmed = text.trim();
    let inner = trimmed.trim_matches(|c| c == '(' || c == ')').trim();

    if components == 1 {
        return Ok(match kind {
            ScalarKind::Float => ParamValue::Float(parse_f32(inner)?),
            ScalarKind::Int => ParamValue::Int(parse_i32(inner)?),
            ScalarKind::Uint => ParamValue::Uint(parse_u32(inner)?),
        });
    }

    let parts: Vec<&str> = inner
        .split([',', ' ', '\t'])
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(LineError::InvalidNumber {
            ty: type_label(kind),
            value: trimmed.to_string(),
        });
    }
    let splat = broadcast && parts.len() == 1 && !trimmed.starts_with('(');

    Ok(match kind {
        ScalarKind::Float => ParamValue::FloatVec(fill(&parts, components, splat, parse_f32)?),
        ScalarKind::Int => ParamValue::IntVec(fill(&parts, components, splat, parse_i32)?),
        ScalarKind::Uint => ParamValue::UintVec(fill(&parts, components, splat, parse_u32)?),
    })
}

fn fill<T, F>(parts: &[&str], components: usize, splat: bool, parse: F) -> Result<Vec<T>, LineError>
where
    T: Copy + Default,
    F: Fn(&str) -> Result<T, LineError>,
{
    if splat {
        return Ok(vec![parse(parts[0])?; components]);
    }
    let mut values = vec![T::default(); components];
    for (slot, part) in values.iter_mut().zip(parts) {
        *slot = parse(part)?;
    }
    Ok(values)
}

fn type_label(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Float => "float",
        ScalarKind::Int => "int",
        ScalarKind::Uint => "uint",
    }
}

fn parse_f32(text: &str) -> Result<f32, LineError> {
    text.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| LineError::InvalidNumber {
            ty: "float",
            value: text.to_string(),
        })
}

fn parse_i32(text: &str) -> Result<i32, LineError> {
    text.parse::<i32>().map_err(|_| LineError::InvalidNumber {
        ty: "int",
        value: text.to_string(),
    })
}

fn parse_u32(text: &str) -> Result<u32, LineError> {
    text.parse::<u32>().map_err(|_| LineError::InvalidNumber {
        ty: "uint",
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> EffectParameter {
        ParamParser::new()
            .parse_line(1, line)
            .unwrap_or_else(|err| panic!("'{line}' failed: {err}"))
            .parameter
    }

    fn parse_err(line: &str) -> LineError {
        ParamParser::new().parse_line(1, line).unwrap_err()
    }

    #[test]
    fn parses_float_with_range_and_description() {
        let param = parse("float exposure = 1.0 [0.1, 5.0] # exposure strength");
        assert_eq!(param.pass_id, 1);
        assert_eq!(param.name, "exposure");
        assert_eq!(param.ty.to_string(), "float");
        assert_eq!(param.default_value, ParamValue::Float(1.0));
        assert_eq!(param.min_value, ParamValue::Float(0.1));
        assert_eq!(param.max_value, ParamValue::Float(5.0));
        assert_eq!(param.description, "exposure strength");
    }

    #[test]
    fn bool_normalizes_to_int() {
        let param = parse("bool enableShadow = true [false, true]");
        assert_eq!(param.ty.to_string(), "int");
        assert_eq!(param.default_value, ParamValue::Int(1));
        assert_eq!(param.min_value, ParamValue::Int(0));
        assert_eq!(param.max_value, ParamValue::Int(1));

        let param = parse("bool flag = False");
        assert_eq!(param.default_value, ParamValue::Int(0));
    }

    #[test]
    fn color_normalizes_to_float4() {
        let param = parse("color mainColor = (0.7,0.2,0.1,1.0) [0.0,1.0]");
        assert_eq!(param.ty.to_string(), "float4");
        assert_eq!(
            param.default_value,
            ParamValue::FloatVec(vec![0.7, 0.2, 0.1, 1.0])
        );
        assert_eq!(param.min_value, ParamValue::FloatVec(vec![0.0; 4]));
        assert_eq!(param.max_value, ParamValue::FloatVec(vec![1.0; 4]));
    }

    #[test]
    fn enum_declaration_stores_candidate_list() {
        let param = parse("enum MaterialType { MAT_LAMBERT, MAT_PHONG, MAT_PBR } materialType = MAT_PBR");
        let values: Vec<String> = ["MAT_LAMBERT", "MAT_PHONG", "MAT_PBR"]
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(param.name, "materialType");
        assert_eq!(param.ty.to_string(), "{MAT_LAMBERT, MAT_PHONG, MAT_PBR}");
        assert_eq!(param.default_value, ParamValue::Text("MAT_PBR".into()));
        assert_eq!(param.min_value, ParamValue::TextList(values.clone()));
        assert_eq!(param.max_value, ParamValue::TextList(values));
    }

    #[test]
    fn enum_default_outside_candidates_is_a_warning() {
        let parsed = ParamParser::new()
            .parse_line(1, "enum Mode { A, B } mode = C")
            .unwrap();
        assert_eq!(parsed.parameter.default_value, ParamValue::Text("C".into()));
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("'C'"));
    }

    #[test]
    fn vector_tuples_zero_fill_and_truncate() {
        let param = parse("float3 lightPos = (10.0, 5.0)");
        assert_eq!(
            param.default_value,
            ParamValue::FloatVec(vec![10.0, 5.0, 0.0])
        );
        assert_eq!(param.min_value, ParamValue::FloatVec(vec![0.0; 3]));

        let param = parse("int2 cells = (4 8 16)");
        assert_eq!(param.default_value, ParamValue::IntVec(vec![4, 8]));
        assert_eq!(param.max_value, ParamValue::IntVec(vec![1, 1]));
    }

    #[test]
    fn scalar_range_bounds_broadcast_to_vectors() {
        let param = parse("float3 lightPos = (10.0, 5.0, 8.0) [-100, 100]");
        assert_eq!(param.min_value, ParamValue::FloatVec(vec![-100.0; 3]));
        assert_eq!(param.max_value, ParamValue::FloatVec(vec![100.0; 3]));

        let param = parse("uint2 size = (1, 2) [(0, 1), (8, 9)]");
        assert_eq!(param.min_value, ParamValue::UintVec(vec![0, 1]));
        assert_eq!(param.max_value, ParamValue::UintVec(vec![8, 9]));
    }

    #[test]
    fn uint_and_int_are_distinct() {
        let param = parse("uint samples = 4 [1, 64]");
        assert_eq!(param.ty.to_string(), "uint");
        assert_eq!(param.default_value, ParamValue::Uint(4));
        assert!(matches!(
            parse_err("uint samples = -4"),
            LineError::InvalidNumber { ty: "uint", .. }
        ));
        let param = parse("int offset = -4");
        assert_eq!(param.default_value, ParamValue::Int(-4));
        assert_eq!(param.min_value, ParamValue::Int(0));
    }

    #[test]
    fn description_keeps_later_hash_marks() {
        let param = parse("int qualityLevel = 2 [1, 5] # level # 1-5");
        assert_eq!(param.description, "level # 1-5");
        assert_eq!(param.default_value, ParamValue::Int(2));
    }

    #[test]
    fn reports_malformed_lines() {
        assert_eq!(parse_err("float exposure 1.0"), LineError::MissingAssignment);
        assert_eq!(parse_err("float = 1.0"), LineError::BadDeclaration(1));
        assert_eq!(
            parse_err("float a b = 1.0"),
            LineError::BadDeclaration(3)
        );
        assert_eq!(
            parse_err("double a = 1.0"),
            LineError::UnknownType("double".into())
        );
        assert!(matches!(
            parse_err("float a = 1.0 [0.0, 1.0"),
            LineError::MalformedRange(_)
        ));
        assert!(matches!(
            parse_err("float a = 1.0 [0.5]"),
            LineError::MalformedRange(_)
        ));
        assert!(matches!(
            parse_err("float a = abc"),
            LineError::InvalidNumber { ty: "float", .. }
        ));
        assert!(matches!(
            parse_err("float a = NaN"),
            LineError::InvalidNumber { .. }
        ));
        assert_eq!(parse_err("float a ="), LineError::MissingValue);
        assert_eq!(parse_err("bool a = yes"), LineError::InvalidBool("yes".into()));
        assert_eq!(parse_err("float 2x = 1"), LineError::InvalidName("2x".into()));
        assert_eq!(parse_err("enum Mode A, B mode = A"), LineError::UnterminatedEnum);
        assert_eq!(parse_err("enum { A, B } mode = A"), LineError::MissingEnumName);
        assert_eq!(
            parse_err("enum Mode { } mode = A"),
            LineError::EmptyEnum("Mode".into())
        );
    }

    #[test]
    fn block_keeps_valid_lines_in_order_and_reports_the_rest() {
        let text = "\
# lighting controls
float exposure = 1.0 [0.1, 5.0]
float broken = [0, 1
int qualityLevel = 2 [1, 5]

nonsense line without assignment
color tint = (1, 1, 1, 1)
float exposure = 2.0
";
        let outcome = ParamParser::new().parse_block(3, text);
        let names: Vec<&str> = outcome.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["exposure", "qualityLevel", "tint"]);
        assert!(outcome.parameters.iter().all(|p| p.pass_id == 3));
        assert_eq!(outcome.skipped(), 3);

        let lines: Vec<usize> = outcome
            .errors()
            .filter_map(|d| d.line_number)
            .collect();
        assert_eq!(lines, [3, 6, 8]);
        assert!(outcome.errors().last().unwrap().message.contains("already declared"));
    }

    #[test]
    fn passes_are_parsed_independently() {
        let outcome = ParamParser::new().parse_passes([
            (1, "float speed = 1.0\r\nbool on = true\r\n"),
            (2, "float speed = 0.5"),
        ]);
        assert_eq!(outcome.parameters.len(), 3);
        assert_eq!(outcome.skipped(), 0);
        assert_eq!(outcome.parameters[2].pass_id, 2);
        assert_eq!(outcome.warnings().count(), 0);
    }

    #[test]
    fn replacement_values_follow_the_declared_type() {
        let parser = ParamParser::new();
        let float3 = ParamType::Numeric {
            kind: ScalarKind::Float,
            components: 3,
        };
        assert_eq!(
            parser.parse_value(&float3, "(1, 2)").unwrap(),
            ParamValue::FloatVec(vec![1.0, 2.0, 0.0])
        );
        let int = ParamType::scalar(ScalarKind::Int);
        assert_eq!(parser.parse_value(&int, "true").unwrap(), ParamValue::Int(1));
        assert_eq!(parser.parse_value(&int, "-4").unwrap(), ParamValue::Int(-4));

        let material = ParamType::Enum(vec!["MAT_A".into(), "MAT_B".into()]);
        assert_eq!(
            parser.parse_value(&material, "MAT_B").unwrap(),
            ParamValue::Text("MAT_B".into())
        );
        assert_eq!(
            parser.parse_value(&material, "MAT_C"),
            Err(LineError::NotInEnum("MAT_C".into()))
        );
        assert_eq!(
            parser.parse_value(&ParamType::scalar(ScalarKind::Uint), "-1"),
            Err(LineError::InvalidNumber {
                ty: "uint",
                value: "-1".into()
            })
        );
    }
}
