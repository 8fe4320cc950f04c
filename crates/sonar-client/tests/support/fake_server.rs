//! In-process SONAR server speaking cleartext frames.
//!
//! The server accepts one connection, records every frame it receives and
//! answers from a small in-memory object store.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sonar_client::protocol::{FrameDecoder, RECORD_SEPARATOR, UNIT_SEPARATOR};

const READ_TICK: Duration = Duration::from_millis(20);

/// How the server answers LOGIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPolicy {
    Accept,
    Reject,
    Silent,
}

/// An object held by the server.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub type_name: String,
    pub name: String,
    pub attributes: Vec<(String, Vec<String>)>,
}

/// Server behaviour fixed at spawn time.
#[derive(Debug, Clone)]
pub struct Script {
    pub login: LoginPolicy,
    pub connection_name: String,
    pub objects: Vec<StoredObject>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            login: LoginPolicy::Accept,
            connection_name: "tms@fake".to_owned(),
            objects: Vec::new(),
        }
    }
}

enum Command {
    Push(Vec<u8>),
    Hangup,
}

/// Handle to the server thread.
pub struct FakeServer {
    port: u16,
    received: Arc<Mutex<Vec<Vec<String>>>>,
    commands: Sender<Command>,
}

impl FakeServer {
    /// Binds an ephemeral port and serves one connection in the background.
    pub fn spawn(script: Script) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (commands, inbox) = mpsc::channel();
        let log = Arc::clone(&received);
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let _ = serve(stream, script, &log, &inbox);
            }
        });
        Ok(Self {
            port,
            received,
            commands,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Frames received so far, code first.
    pub fn received(&self) -> Vec<Vec<String>> {
        self.received
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }

    /// Sends an unsolicited frame to the client.
    pub fn push(&self, params: &[&str]) {
        let _ = self.commands.send(Command::Push(frame(params)));
    }

    /// Closes the connection from the server side.
    pub fn hang_up(&self) {
        let _ = self.commands.send(Command::Hangup);
    }
}

/// Encodes one frame.
pub fn frame(params: &[&str]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (index, param) in params.iter().enumerate() {
        if index > 0 {
            bytes.push(UNIT_SEPARATOR);
        }
        bytes.extend_from_slice(param.as_bytes());
    }
    bytes.push(RECORD_SEPARATOR);
    bytes
}

fn serve(
    mut stream: TcpStream,
    mut script: Script,
    log: &Mutex<Vec<Vec<String>>>,
    inbox: &Receiver<Command>,
) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_TICK))?;
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0_u8; 4096];
    loop {
        match inbox.try_recv() {
            Ok(Command::Push(bytes)) => stream.write_all(&bytes)?,
            Ok(Command::Hangup) | Err(TryRecvError::Disconnected) => {
                return stream.shutdown(Shutdown::Both);
            }
            Err(TryRecvError::Empty) => {}
        }
        let count = match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(count) => count,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(error) => return Err(error),
        };
        decoder.extend(chunk.get(..count).unwrap_or_default());
        while let Ok(Some(params)) = decoder.next_frame() {
            if let Ok(mut frames) = log.lock() {
                frames.push(params.clone());
            }
            let reply = respond(&mut script, &params);
            if reply.hang_up {
                return stream.shutdown(Shutdown::Both);
            }
            stream.write_all(&reply.bytes)?;
        }
    }
}

#[derive(Default)]
struct Reply {
    bytes: Vec<u8>,
    hang_up: bool,
}

impl Reply {
    fn send(&mut self, params: &[&str]) {
        self.bytes.extend(frame(params));
    }
}

fn respond(script: &mut Script, params: &[String]) -> Reply {
    let mut reply = Reply::default();
    let args: Vec<&str> = params.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["l", _user, _password] => match script.login {
            LoginPolicy::Accept => {
                reply.send(&["t"]);
                reply.send(&["s", script.connection_name.as_str()]);
            }
            LoginPolicy::Reject => reply.send(&["s", "Authentication failed"]),
            LoginPolicy::Silent => {}
        },
        ["e", type_name] => enumerate(script, type_name, &mut reply),
        ["a", name, values @ ..] => {
            store_attribute(script, name, values);
            reply.send(&args);
        }
        ["o", name] => {
            if let Some((type_name, object)) = name.split_once('/') {
                script.objects.push(StoredObject {
                    type_name: type_name.to_owned(),
                    name: object.to_owned(),
                    attributes: Vec::new(),
                });
            }
            reply.send(&args);
        }
        ["r", name] => {
            script
                .objects
                .retain(|object| format!("{}/{}", object.type_name, object.name) != *name);
            reply.send(&args);
        }
        ["p", _current, _new] => reply.send(&["s", "Password changed"]),
        ["q"] => reply.hang_up = true,
        _ => reply.send(&["s", "Unsupported request"]),
    }
    reply
}

fn enumerate(script: &Script, type_name: &str, reply: &mut Reply) {
    reply.send(&["t", type_name]);
    for object in script
        .objects
        .iter()
        .filter(|object| object.type_name == type_name)
    {
        reply.send(&["o", object.name.as_str()]);
        for (attribute, values) in &object.attributes {
            let mut params = vec!["a", attribute.as_str()];
            params.extend(values.iter().map(String::as_str));
            reply.send(&params);
        }
    }
    reply.send(&["t", ""]);
}

fn store_attribute(script: &mut Script, name: &str, values: &[&str]) {
    let mut parts = name.splitn(3, '/');
    let (Some(type_name), Some(object), Some(attribute)) = (parts.next(), parts.next(), parts.next())
    else {
        return;
    };
    if let Some(stored) = script
        .objects
        .iter_mut()
        .find(|stored| stored.type_name == type_name && stored.name == object)
    {
        let values: Vec<String> = values.iter().map(|value| (*value).to_owned()).collect();
        match stored.attributes.iter_mut().find(|(name, _)| name == attribute) {
            Some(entry) => entry.1 = values,
            None => stored.attributes.push((attribute.to_owned(), values)),
        }
    }
}
