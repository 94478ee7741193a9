//! `$name$` substitution.
//!
//! Replaces `$path$` with the string form of the property value before the
//! SQL is handed to the driver. `$$` is a literal `$`. Values are inserted
//! verbatim, without quoting or escaping.

use super::errors::SubstitutionError;
use crate::value::{PropertyPath, Value};

/// True when `text` needs a substitution pass.
pub fn has_substitutions(text: &str) -> bool {
    text.contains('$')
}

enum Piece<'a> {
    Literal(&'a str),
    Dollar,
    Name(&'a str),
}

fn scan(text: &str) -> Result<Vec<Piece<'_>>, SubstitutionError> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('$') {
        if start > 0 {
            pieces.push(Piece::Literal(&rest[..start]));
        }
        let after = &rest[start + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            pieces.push(Piece::Dollar);
            rest = tail;
            continue;
        }
        let end = after
            .find('$')
            .ok_or_else(|| SubstitutionError::Unterminated(text.trim().to_string()))?;
        let name = after[..end].trim();
        if name.is_empty() {
            return Err(SubstitutionError::InvalidName(after[..end].to_string()));
        }
        pieces.push(Piece::Name(name));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

/// Syntax check, run when templates are built.
pub fn check_substitutions(text: &str) -> Result<(), SubstitutionError> {
    for piece in scan(text)? {
        if let Piece::Name(name) = piece {
            PropertyPath::parse(name)
                .map_err(|_| SubstitutionError::InvalidName(name.to_string()))?;
        }
    }
    Ok(())
}

/// Substitutes every `$name$` in `text`. A scalar parameter object is
/// substituted as a whole; null values become empty text.
pub fn substitute(text: &str, parameter: &Value) -> Result<String, SubstitutionError> {
    let mut result = String::with_capacity(text.len());
    for piece in scan(text)? {
        match piece {
            Piece::Literal(s) => result.push_str(s),
            Piece::Dollar => result.push('$'),
            Piece::Name(name) => {
                let value = if parameter.is_scalar() {
                    parameter.clone()
                } else {
                    let path = PropertyPath::parse(name)
                        .map_err(|_| SubstitutionError::InvalidName(name.to_string()))?;
                    path.get(parameter)
                        .map_err(|source| SubstitutionError::Property {
                            name: name.to_string(),
                            source,
                        })?
                };
                result.push_str(&value.to_string());
            }
        }
    }
    Ok(result)
}
