//! Three-part SONAR names: `type[/object[/attribute]]`.

use std::fmt;
use std::str::FromStr;

use crate::errors::NameError;

const SEPARATOR: char = '/';

/// Depth a wire reference is expected to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// `type/object` when absolute, `object` when relative.
    Object,
    /// `type/object/attribute` when absolute, `attribute` when relative.
    Attribute,
}

/// A wire reference classified against the expected depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Fully qualified; carries its own type (and object).
    Absolute(Name),
    /// A single part resolved against the namespace cursor.
    Relative(&'a str),
}

/// An immutable address in the SONAR namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    type_part: String,
    object: Option<String>,
    attribute: Option<String>,
}

impl Name {
    /// Names a whole type.
    #[must_use]
    pub fn of_type(type_part: impl Into<String>) -> Self {
        Self {
            type_part: type_part.into(),
            object: None,
            attribute: None,
        }
    }

    /// Names one object of a type.
    #[must_use]
    pub fn of_object(type_part: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            type_part: type_part.into(),
            object: Some(object.into()),
            attribute: None,
        }
    }

    /// Names one attribute of an object. An empty object addresses every
    /// object of the type.
    #[must_use]
    pub fn of_attribute(
        type_part: impl Into<String>,
        object: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            type_part: type_part.into(),
            object: Some(object.into()),
            attribute: Some(attribute.into()),
        }
    }

    /// Type part.
    #[must_use]
    pub fn type_part(&self) -> &str {
        &self.type_part
    }

    /// Object part, if any.
    #[must_use]
    pub fn object_part(&self) -> Option<&str> {
        self.object.as_deref()
    }

    /// Attribute part, if any.
    #[must_use]
    pub fn attribute_part(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// `true` for a bare type name.
    #[must_use]
    pub const fn is_type(&self) -> bool {
        self.object.is_none()
    }

    /// `true` for `type/object`.
    #[must_use]
    pub const fn is_object(&self) -> bool {
        self.object.is_some() && self.attribute.is_none()
    }

    /// `true` for `type/object/attribute`.
    #[must_use]
    pub const fn is_attribute(&self) -> bool {
        self.attribute.is_some()
    }

    /// Drops the attribute part.
    #[must_use]
    pub fn object_name(&self) -> Self {
        Self {
            type_part: self.type_part.clone(),
            object: self.object.clone(),
            attribute: None,
        }
    }

    /// Checks that every part can travel on the wire.
    pub fn validate(&self) -> Result<(), NameError> {
        let parts = [
            Some(self.type_part.as_str()),
            self.object.as_deref(),
            self.attribute.as_deref(),
        ];
        if parts.into_iter().flatten().any(has_reserved) {
            return Err(NameError::ReservedCharacter(self.to_string()));
        }
        Ok(())
    }
}

/// Whether `wire` is fully qualified for the expected depth.
#[must_use]
pub fn is_absolute(wire: &str, depth: Depth) -> bool {
    wire.split(SEPARATOR).count() == expected_parts(depth)
}

/// Classifies a wire reference as absolute or relative.
pub fn classify(wire: &str, depth: Depth) -> Result<Reference<'_>, NameError> {
    if has_reserved(wire) {
        return Err(NameError::ReservedCharacter(wire.to_owned()));
    }
    let parts: Vec<&str> = wire.split(SEPARATOR).collect();
    match (depth, parts.as_slice()) {
        (_, [single]) => Ok(Reference::Relative(single)),
        (Depth::Object, [type_part, object]) if !type_part.is_empty() => {
            Ok(Reference::Absolute(Name::of_object(*type_part, *object)))
        }
        (Depth::Attribute, [type_part, object, attribute]) if !type_part.is_empty() => Ok(
            Reference::Absolute(Name::of_attribute(*type_part, *object, *attribute)),
        ),
        _ => Err(NameError::Invalid(wire.to_owned())),
    }
}

const fn expected_parts(depth: Depth) -> usize {
    match depth {
        Depth::Object => 2,
        Depth::Attribute => 3,
    }
}

fn has_reserved(part: &str) -> bool {
    part.chars()
        .any(|c| matches!(c, '\0' | '\u{1e}' | '\u{1f}'))
}

impl fmt::Display for Name {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.type_part)?;
        if let Some(object) = &self.object {
            write!(formatter, "{SEPARATOR}{object}")?;
        }
        if let Some(attribute) = &self.attribute {
            write!(formatter, "{SEPARATOR}{attribute}")?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split(SEPARATOR);
        let type_part = parts.next().unwrap_or_default();
        if type_part.is_empty() {
            return Err(NameError::Invalid(input.to_owned()));
        }
        let name = match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => Self::of_type(type_part),
            (Some(object), None, _) => Self::of_object(type_part, object),
            (Some(object), Some(attribute), None) => {
                Self::of_attribute(type_part, object, attribute)
            }
            _ => return Err(NameError::Invalid(input.to_owned())),
        };
        name.validate()?;
        Ok(name)
    }
}
