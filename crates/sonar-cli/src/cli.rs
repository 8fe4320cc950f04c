//! Command-line argument definitions.

use std::str::FromStr;

use clap::{Parser, Subcommand};
use sonar_client::{Access, AttributeSpec, ValueKind};

/// Command-line interface for the SONAR client tool.
#[derive(Parser, Debug)]
#[command(name = "sonar", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Operations against a SONAR server.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Logs in and prints the connection name.
    Login,
    /// Lists every object of a type as JSON lines.
    List {
        /// Type to enumerate.
        #[arg(value_name = "TYPE")]
        type_name: String,
        /// Declares an attribute kind, as `NAME[:KIND]`; undeclared
        /// attributes are reported as text arrays.
        #[arg(long = "attribute", value_name = "NAME[:KIND]", value_parser = parse_attribute)]
        attributes: Vec<AttributeArg>,
    },
    /// Creates an object.
    Create {
        /// Object name, as `type/object`.
        #[arg(value_name = "TYPE/OBJECT")]
        name: String,
    },
    /// Removes an object.
    Remove {
        /// Object name, as `type/object`.
        #[arg(value_name = "TYPE/OBJECT")]
        name: String,
    },
    /// Writes an attribute.
    Set {
        /// Attribute name, as `type/object/attribute`.
        #[arg(value_name = "TYPE/OBJECT/ATTRIBUTE")]
        name: String,
        /// Marshalled values; none writes an empty array.
        #[arg(value_name = "VALUE", num_args = 0.., allow_hyphen_values = true)]
        values: Vec<String>,
    },
    /// Changes the login password to `SONAR_NEW_PASSWORD`.
    Password,
}

/// An attribute declared on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttributeArg {
    name: String,
    kind: ValueKind,
}

impl AttributeArg {
    pub(crate) fn spec(&self) -> AttributeSpec {
        AttributeSpec::dynamic(self.name.clone(), self.kind, Access::ReadOnly)
    }
}

fn parse_attribute(text: &str) -> Result<AttributeArg, String> {
    let (name, kind) = match text.split_once(':') {
        Some((name, kind)) => (
            name,
            ValueKind::from_str(kind).map_err(|error| error.to_string())?,
        ),
        None => (text, ValueKind::Text),
    };
    if name.is_empty() {
        return Err(format!("missing attribute name in '{text}'"));
    }
    Ok(AttributeArg {
        name: name.to_owned(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("size", "size", ValueKind::Text)]
    #[case("size:int", "size", ValueKind::Int)]
    #[case("tags:text[]", "tags", ValueKind::Array(&ValueKind::Text))]
    fn parses_attribute_declarations(
        #[case] text: &str,
        #[case] name: &str,
        #[case] kind: ValueKind,
    ) {
        let parsed = parse_attribute(text).expect("attribute parses");
        assert_eq!(parsed.name, name);
        assert_eq!(parsed.kind, kind);
    }

    #[rstest]
    #[case(":int")]
    #[case("size:widget")]
    fn rejects_malformed_declarations(#[case] text: &str) {
        assert!(parse_attribute(text).is_err());
    }

    #[rstest]
    fn set_accepts_hyphenated_values() {
        let cli = Cli::try_parse_from(["sonar", "set", "dms/V1/count", "-3"]).expect("parse");
        assert_eq!(
            cli.command,
            Command::Set {
                name: "dms/V1/count".to_owned(),
                values: vec!["-3".to_owned()],
            }
        );
    }
}
