//! SONAR wire messages.
//!
//! A frame is a list of text parameters separated by US (0x1F) and
//! terminated by RS (0x1E). The first parameter is a one-character message
//! code; the rest depend on the message kind.

mod codec;

pub use codec::{FrameDecoder, RECORD_SEPARATOR, UNIT_SEPARATOR, encode_frame};

use crate::errors::ProtocolError;

/// The closed set of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Client login: user, password.
    Login,
    /// Password change: current, new.
    Password,
    /// Session teardown.
    Quit,
    /// Object creation or confirmation.
    Object,
    /// Object removal.
    Remove,
    /// Attribute value: name, values.
    Attribute,
    /// Type cursor or end of enumeration.
    Type,
    /// Server diagnostic text.
    Show,
    /// Subscribe to a name.
    Enumerate,
    /// Unsubscribe from a name.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
}

impl Arity {
    const fn admits(self, count: usize) -> bool {
        match self {
            Self::Exactly(expected) => count == expected,
            Self::AtLeast(minimum) => count >= minimum,
            Self::AtMost(maximum) => count <= maximum,
        }
    }
}

impl MessageKind {
    /// Single-character wire code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Login => 'l',
            Self::Password => 'p',
            Self::Quit => 'q',
            Self::Object => 'o',
            Self::Remove => 'r',
            Self::Attribute => 'a',
            Self::Type => 't',
            Self::Show => 's',
            Self::Enumerate => 'e',
            Self::Ignore => 'i',
        }
    }

    /// Resolves a code sent by the server.
    ///
    /// Only the kinds a server may send are accepted.
    pub fn from_server_code(code: &str) -> Result<Self, ProtocolError> {
        let mut chars = code.chars();
        let kind = match (chars.next(), chars.next()) {
            (Some('q'), None) => Self::Quit,
            (Some('o'), None) => Self::Object,
            (Some('r'), None) => Self::Remove,
            (Some('a'), None) => Self::Attribute,
            (Some('t'), None) => Self::Type,
            (Some('s'), None) => Self::Show,
            _ => return Err(ProtocolError::InvalidMessageCode(code.to_owned())),
        };
        Ok(kind)
    }

    /// Parameter count a frame of this kind must carry, code included.
    const fn arity(self) -> Arity {
        match self {
            Self::Quit => Arity::Exactly(1),
            Self::Object | Self::Remove | Self::Show | Self::Ignore => Arity::Exactly(2),
            Self::Login | Self::Password => Arity::Exactly(3),
            Self::Attribute => Arity::AtLeast(2),
            Self::Type | Self::Enumerate => Arity::AtMost(2),
        }
    }
}

/// A validated message received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Server-initiated disconnect.
    Quit,
    /// An object exists (possibly relative name).
    Object(String),
    /// An object was removed (possibly relative name).
    Remove(String),
    /// An attribute value (possibly relative name).
    Attribute {
        /// Wire name of the attribute.
        name: String,
        /// Marshalled value parameters.
        values: Vec<String>,
    },
    /// A type name selects the cursor type; an empty name closes the
    /// current type and no parameter at all also confirms login.
    Type(Option<String>),
    /// Diagnostic text.
    Show(String),
}

impl Inbound {
    /// Validates a decoded frame.
    pub fn parse(params: Vec<String>) -> Result<Self, ProtocolError> {
        let mut params = params.into_iter();
        let code = params.next().unwrap_or_default();
        let kind = MessageKind::from_server_code(&code)?;
        let mut rest: Vec<String> = params.collect();
        if !kind.arity().admits(rest.len() + 1) {
            return Err(ProtocolError::WrongParameterCount);
        }
        let first = if rest.is_empty() {
            None
        } else {
            Some(rest.remove(0))
        };
        let message = match kind {
            MessageKind::Quit => Self::Quit,
            MessageKind::Object => Self::Object(first.unwrap_or_default()),
            MessageKind::Remove => Self::Remove(first.unwrap_or_default()),
            MessageKind::Attribute => Self::Attribute {
                name: first.unwrap_or_default(),
                values: rest,
            },
            MessageKind::Type => Self::Type(first),
            MessageKind::Show => Self::Show(first.unwrap_or_default()),
            MessageKind::Login
            | MessageKind::Password
            | MessageKind::Enumerate
            | MessageKind::Ignore => return Err(ProtocolError::InvalidMessageCode(code)),
        };
        Ok(message)
    }
}

/// Checks an outbound frame against its kind's arity.
pub(crate) fn check_outbound(kind: MessageKind, params: &[&str]) -> Result<(), ProtocolError> {
    if kind.arity().admits(params.len() + 1) {
        Ok(())
    } else {
        Err(ProtocolError::WrongParameterCount)
    }
}
