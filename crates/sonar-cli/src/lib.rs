//! Command-line runtime for the `sonar` tool.
//!
//! The runtime splits configuration flags from the subcommand, loads layered
//! configuration, logs in to the server, runs one command and quits. Config
//! loading, session establishment and secret lookup are injected so tests
//! can drive the runner without a server.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use sonar_client::{Name, TypeSchema, telemetry};
use sonar_config::Config;
use tracing::info;

mod cli;
mod config;
mod errors;
mod output;
mod secrets;
mod session;

use cli::{Cli, Command};
use config::{ConfigLoader, OrthoConfigLoader, prepare_cli_arguments, split_config_arguments};
pub(crate) use errors::AppError;
use secrets::{EnvSecrets, Secrets};
use session::{ClientConnector, Connector, Session};

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

struct CliRunner<'a, W: Write, E: Write> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    loader: &'a dyn ConfigLoader,
    connector: &'a dyn Connector,
    secrets: &'a dyn Secrets,
    telemetry: bool,
}

impl<W: Write, E: Write> CliRunner<'_, W, E> {
    fn run(&mut self, args: Vec<OsString>) -> ExitCode {
        match self.execute(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(AppError::CliUsage(error))
                if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
            {
                let _ = write!(self.stdout, "{error}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                let _ = writeln!(self.stderr, "{error}");
                ExitCode::FAILURE
            }
        }
    }

    fn execute(&mut self, args: &[OsString]) -> Result<(), AppError> {
        let split = split_config_arguments(args);
        let cli = Cli::try_parse_from(prepare_cli_arguments(args, &split))
            .map_err(AppError::CliUsage)?;
        let config = self.loader.load(&split.config_arguments)?;
        if self.telemetry {
            telemetry::initialise(&config)?;
        }

        let user = config.user().ok_or(AppError::MissingUser)?.to_owned();
        let password = self.secrets.require(secrets::PASSWORD_VARIABLE)?;
        let action = Action::resolve(cli.command, self.secrets)?;

        info!(target: CLI_TARGET, server = %config.server(), user = %user, "opening session");
        let session = self.connector.open(&config, &user, &password)?;
        let outcome = self.perform(session.as_ref(), action, &password);
        // Quit even when the command failed; its error wins.
        let finished = session.finish();
        outcome?;
        Ok(finished?)
    }

    fn perform(
        &mut self,
        session: &dyn Session,
        action: Action,
        password: &str,
    ) -> Result<(), AppError> {
        match action {
            Action::Login => {
                let name = session.connection_name().unwrap_or_default();
                writeln!(self.stdout, "{name}").map_err(AppError::Output)
            }
            Action::List(schema) => {
                let records = session.list(&schema)?;
                output::write_records(&mut *self.stdout, &records)
            }
            Action::Create(name) => Ok(session.create(name)?),
            Action::Remove(name) => Ok(session.remove(name)?),
            Action::Set(name, values) => Ok(session.set(name, values)?),
            Action::Password { new } => Ok(session.change_password(password, &new)?),
        }
    }
}

/// A command with its arguments validated, ready to run against a session.
#[derive(Debug, PartialEq)]
enum Action {
    Login,
    List(TypeSchema),
    Create(Name),
    Remove(Name),
    Set(Name, Vec<String>),
    Password { new: String },
}

impl Action {
    fn resolve(command: Command, secrets: &dyn Secrets) -> Result<Self, AppError> {
        let action = match command {
            Command::Login => Self::Login,
            Command::List {
                type_name,
                attributes,
            } => {
                let name: Name = type_name.parse()?;
                if name.object_part().is_some() {
                    return Err(AppError::WrongDepth {
                        name: type_name,
                        expected: "a type",
                    });
                }
                let specs = attributes.iter().map(cli::AttributeArg::spec);
                Self::List(TypeSchema::new(type_name, specs).open())
            }
            Command::Create { name } => Self::Create(object_name(&name)?),
            Command::Remove { name } => Self::Remove(object_name(&name)?),
            Command::Set { name, values } => Self::Set(attribute_name(&name)?, values),
            Command::Password => Self::Password {
                new: secrets.require(secrets::NEW_PASSWORD_VARIABLE)?,
            },
        };
        Ok(action)
    }
}

fn object_name(text: &str) -> Result<Name, AppError> {
    let name: Name = text.parse()?;
    match (name.object_part(), name.attribute_part()) {
        (Some(_), None) => Ok(name),
        _ => Err(AppError::WrongDepth {
            name: text.to_owned(),
            expected: "an object",
        }),
    }
}

fn attribute_name(text: &str) -> Result<Name, AppError> {
    let name: Name = text.parse()?;
    if name.attribute_part().is_some() {
        Ok(name)
    } else {
        Err(AppError::WrongDepth {
            name: text.to_owned(),
            expected: "an attribute",
        })
    }
}

/// Runs the CLI with the process environment and a TLS session.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    CliRunner {
        stdout,
        stderr,
        loader: &OrthoConfigLoader,
        connector: &ClientConnector,
        secrets: &EnvSecrets,
        telemetry: true,
    }
    .run(args.into_iter().collect())
}
