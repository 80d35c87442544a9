//! The compact descriptor encoding of [`Type`].
//!
//! Every base type is a single character. Containers prefix their
//! components: `a` list, `q` optional, `m` dictionary (key then value).
//! Tuples are `t` followed by the element count in decimal and then each
//! element. Objects are `o`, the field count, then `name$type` for every
//! field in sorted order. Algebraic values are `u1`, the tag, `$`, then a
//! tuple or object shape.

use std::collections::BTreeMap;

use crate::{AlgebraicShape, Type};

/// Deepest nesting of containers a descriptor may use.
pub const MAX_DESCRIPTOR_DEPTH: usize = 128;

/// Failure to parse a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor ended unexpectedly")]
    UnexpectedEnd,
    #[error("unknown type code `{code}` at position {position}")]
    UnknownCode { code: char, position: usize },
    #[error("expected a count at position {position}")]
    MissingCount { position: usize },
    #[error("unterminated name starting at position {position}")]
    UnterminatedName { position: usize },
    #[error("field `{name}` appears more than once")]
    DuplicateField { name: String },
    #[error("unsupported algebraic variant count {count}")]
    AlgebraicCount { count: usize },
    #[error("unexpected data after descriptor at position {position}")]
    TrailingInput { position: usize },
    #[error("descriptor nests deeper than {MAX_DESCRIPTOR_DEPTH} at position {position}")]
    TooDeep { position: usize },
}

pub(crate) fn write(ty: &Type, out: &mut String) {
    match ty {
        Type::Bad => out.push('$'),
        Type::Empty => out.push('A'),
        Type::Boolean => out.push('b'),
        Type::Integer => out.push('i'),
        Type::Float => out.push('f'),
        Type::String => out.push('s'),
        Type::Date => out.push('d'),
        Type::Path => out.push('p'),
        Type::Json => out.push('j'),
        Type::List(inner) => {
            out.push('a');
            write(inner, out);
        }
        Type::Optional(inner) => {
            out.push('q');
            write(inner, out);
        }
        Type::Dictionary(key, value) => {
            out.push('m');
            write(key, out);
            write(value, out);
        }
        Type::Tuple(elements) => write_tuple(elements, out),
        Type::Object(fields) => write_object(fields, out),
        Type::Algebraic { tag, shape } => {
            out.push_str("u1");
            out.push_str(tag);
            out.push('$');
            match shape {
                AlgebraicShape::Tuple(elements) => write_tuple(elements, out),
                AlgebraicShape::Object(fields) => write_object(fields, out),
            }
        }
    }
}

fn write_tuple(elements: &[Type], out: &mut String) {
    out.push('t');
    out.push_str(&elements.len().to_string());
    for element in elements {
        write(element, out);
    }
}

fn write_object(fields: &BTreeMap<String, Type>, out: &mut String) {
    out.push('o');
    out.push_str(&fields.len().to_string());
    for (name, ty) in fields {
        out.push_str(name);
        out.push('$');
        write(ty, out);
    }
}

pub(crate) fn parse(input: &str) -> Result<Type, DescriptorError> {
    let mut reader = Reader {
        chars: input.chars().collect(),
        position: 0,
        depth: 0,
    };
    let ty = reader.parse_type()?;
    if reader.position < reader.chars.len() {
        return Err(DescriptorError::TrailingInput {
            position: reader.position,
        });
    }
    Ok(ty)
}

struct Reader {
    chars: Vec<char>,
    position: usize,
    depth: usize,
}

impl Reader {
    fn next(&mut self) -> Result<char, DescriptorError> {
        let c = self
            .chars
            .get(self.position)
            .copied()
            .ok_or(DescriptorError::UnexpectedEnd)?;
        self.position += 1;
        Ok(c)
    }

    fn parse_type(&mut self) -> Result<Type, DescriptorError> {
        if self.depth == MAX_DESCRIPTOR_DEPTH {
            return Err(DescriptorError::TooDeep {
                position: self.position,
            });
        }
        self.depth += 1;
        let ty = self.parse_node();
        self.depth -= 1;
        ty
    }

    fn parse_node(&mut self) -> Result<Type, DescriptorError> {
        let position = self.position;
        Ok(match self.next()? {
            '$' => Type::Bad,
            'A' => Type::Empty,
            'b' => Type::Boolean,
            'i' => Type::Integer,
            'f' => Type::Float,
            's' => Type::String,
            'd' => Type::Date,
            'p' => Type::Path,
            'j' => Type::Json,
            'a' => Type::list(self.parse_type()?),
            'q' => Type::optional(self.parse_type()?),
            'm' => {
                let key = self.parse_type()?;
                let value = self.parse_type()?;
                Type::dictionary(key, value)
            }
            't' => Type::Tuple(self.parse_elements()?),
            'o' => Type::Object(self.parse_fields()?),
            'u' => {
                let count = self.parse_count()?;
                if count != 1 {
                    return Err(DescriptorError::AlgebraicCount { count });
                }
                let tag = self.parse_name()?;
                let shape_position = self.position;
                let shape = match self.next()? {
                    't' => AlgebraicShape::Tuple(self.parse_elements()?),
                    'o' => AlgebraicShape::Object(self.parse_fields()?),
                    code => {
                        return Err(DescriptorError::UnknownCode {
                            code,
                            position: shape_position,
                        });
                    }
                };
                Type::Algebraic { tag, shape }
            }
            code => return Err(DescriptorError::UnknownCode { code, position }),
        })
    }

    fn parse_count(&mut self) -> Result<usize, DescriptorError> {
        let start = self.position;
        while self
            .chars
            .get(self.position)
            .is_some_and(|c| c.is_ascii_digit())
        {
            self.position += 1;
        }
        if start == self.position {
            return Err(DescriptorError::MissingCount { position: start });
        }
        self.chars[start..self.position]
            .iter()
            .collect::<String>()
            .parse()
            .map_err(|_| DescriptorError::MissingCount { position: start })
    }

    fn parse_name(&mut self) -> Result<String, DescriptorError> {
        let start = self.position;
        let mut name = String::new();
        loop {
            match self.chars.get(self.position) {
                Some('$') => {
                    self.position += 1;
                    break;
                }
                Some(c) => {
                    name.push(*c);
                    self.position += 1;
                }
                None => return Err(DescriptorError::UnterminatedName { position: start }),
            }
        }
        if name.is_empty() {
            return Err(DescriptorError::UnterminatedName { position: start });
        }
        Ok(name)
    }

    fn parse_elements(&mut self) -> Result<Vec<Type>, DescriptorError> {
        let count = self.parse_count()?;
        // The count is untrusted, so grow as elements actually parse.
        let mut elements = Vec::new();
        for _ in 0..count {
            elements.push(self.parse_type()?);
        }
        Ok(elements)
    }

    fn parse_fields(&mut self) -> Result<BTreeMap<String, Type>, DescriptorError> {
        let count = self.parse_count()?;
        let mut fields = BTreeMap::new();
        for _ in 0..count {
            let name = self.parse_name()?;
            let ty = self.parse_type()?;
            if fields.insert(name.clone(), ty).is_some() {
                return Err(DescriptorError::DuplicateField { name });
            }
        }
        Ok(fields)
    }
}
