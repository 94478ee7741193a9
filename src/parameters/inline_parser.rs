//! Tokenizer for inline parameters embedded in SQL text.
//!
//! `#` toggles parameter mode and `##` is a literal `#`. A token is either
//! `name[,field=value]*` or the short form `name:dbType[:nullValue]`. Each
//! token is replaced by a ` ? ` placeholder.

use super::errors::InlineParameterError;
use super::ParameterPropertyDef;

pub const PLACEHOLDER: &str = " ? ";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InlineParsed {
    pub sql: String,
    pub parameters: Vec<ParameterPropertyDef>,
}

pub fn parse_inline_parameters(text: &str) -> Result<InlineParsed, InlineParameterError> {
    let mut parsed = InlineParsed {
        sql: String::with_capacity(text.len()),
        parameters: Vec::new(),
    };
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '#' {
            parsed.sql.push(ch);
            continue;
        }
        if chars.peek() == Some(&'#') {
            chars.next();
            parsed.sql.push('#');
            continue;
        }
        let mut token = String::new();
        let mut terminated = false;
        for next_ch in chars.by_ref() {
            if next_ch == '#' {
                terminated = true;
                break;
            }
            token.push(next_ch);
        }
        if !terminated {
            return Err(InlineParameterError::Unterminated(text.trim().to_string()));
        }
        parsed.parameters.push(parse_token(&token)?);
        parsed.sql.push_str(PLACEHOLDER);
    }
    Ok(parsed)
}

/// Parses the content between two `#`.
pub fn parse_token(token: &str) -> Result<ParameterPropertyDef, InlineParameterError> {
    if token.contains(':') && !token.contains('=') {
        parse_short_form(token)
    } else {
        parse_fields(token)
    }
}

fn parse_short_form(token: &str) -> Result<ParameterPropertyDef, InlineParameterError> {
    let parts: Vec<&str> = token.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return Err(InlineParameterError::TooManySections(token.to_string()));
    }
    let property = parts[0];
    if property.is_empty() {
        return Err(InlineParameterError::EmptyName(token.to_string()));
    }
    Ok(ParameterPropertyDef {
        property: property.to_string(),
        db_type: parts.get(1).map(|s| s.to_string()),
        null_value: parts.get(2).map(|s| s.to_string()),
        ..Default::default()
    })
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
    token: &str,
) -> Result<T, InlineParameterError> {
    value.parse().map_err(|_| InlineParameterError::InvalidNumber {
        field,
        value: value.to_string(),
        token: token.to_string(),
    })
}

fn parse_fields(token: &str) -> Result<ParameterPropertyDef, InlineParameterError> {
    let mut parts = token.split(',');
    let property = parts.next().unwrap_or_default().trim();
    if property.is_empty() {
        return Err(InlineParameterError::EmptyName(token.to_string()));
    }
    let mut def = ParameterPropertyDef::new(property);

    for part in parts {
        let (field, value) = match part.split_once('=') {
            Some((field, value)) => (field.trim(), value.trim()),
            None => {
                return Err(InlineParameterError::MissingValue {
                    field: part.trim().to_string(),
                    token: token.to_string(),
                })
            }
        };
        match field {
            "type" => def.type_name = Some(value.to_string()),
            "dbType" => def.db_type = Some(value.to_string()),
            "direction" => def.direction = Some(value.to_string()),
            "nullValue" => def.null_value = Some(value.to_string()),
            "handler" => def.handler = Some(value.to_string()),
            "column" => def.column = Some(value.to_string()),
            "size" => def.size = Some(parse_number("size", value, token)?),
            "precision" => def.precision = Some(parse_number("precision", value, token)?),
            "scale" => def.scale = Some(parse_number("scale", value, token)?),
            other => {
                return Err(InlineParameterError::UnknownField {
                    field: other.to_string(),
                    token: token.to_string(),
                })
            }
        }
    }
    Ok(def)
}
