//! A minimal interactive client shell. Argument parsing polish, coloring,
//! and tabular output are explicitly out of scope (specification §1
//! Non-goals) — this is a thin, functional adapter over the wire protocol,
//! not a user-experience layer.

use std::io::{self, BufRead, Write as _};

use tokio::net::TcpStream;

use crate::error::{Result, ScriptoriumError};
use crate::wire::{read_frame, write_frame, Frame, Header, OpCode};

pub struct Client {
    nm_stream: TcpStream,
    username: String,
}

async fn request(stream: &mut TcpStream, header: Header, payload: Vec<u8>) -> Result<Frame> {
    write_frame(stream, &Frame::new(header, payload)).await?;
    read_frame(stream).await?.ok_or(ScriptoriumError::NetworkError)
}

impl Client {
    pub async fn connect(nm_addr: &str, username: &str) -> Result<Self> {
        let mut nm_stream = TcpStream::connect(nm_addr).await.map_err(|_| ScriptoriumError::NetworkError)?;
        let header = Header::request(OpCode::ConnectClient, username);
        let reply = request(&mut nm_stream, header, Vec::new()).await?;
        if reply.header.msg_type as u8 == crate::wire::MsgType::Error as u8 {
            return Err(ScriptoriumError::from_code(reply.header.error_code).unwrap_or(ScriptoriumError::NetworkError));
        }
        Ok(Self { nm_stream, username: username.to_string() })
    }

    async fn nm_request(&mut self, op_code: OpCode, filename: &str, foldername: &str, payload: Vec<u8>) -> Result<Frame> {
        let header = Header::request(op_code, &self.username).with_filename(filename).with_foldername(foldername);
        request(&mut self.nm_stream, header, payload).await
    }

    async fn create(&mut self, filename: &str) -> Result<String> {
        let reply = self.nm_request(OpCode::Create, filename, "", Vec::new()).await?;
        self.as_endpoint_or_err(reply)
    }

    async fn resolve_read(&mut self, filename: &str) -> Result<String> {
        let reply = self.nm_request(OpCode::Read, filename, "", Vec::new()).await?;
        self.as_endpoint_or_err(reply)
    }

    async fn resolve_write(&mut self, filename: &str) -> Result<String> {
        let reply = self.nm_request(OpCode::Write, filename, "", Vec::new()).await?;
        self.as_endpoint_or_err(reply)
    }

    fn as_endpoint_or_err(&self, reply: Frame) -> Result<String> {
        if reply.header.msg_type as u8 == crate::wire::MsgType::Error as u8 {
            return Err(ScriptoriumError::from_code(reply.header.error_code).unwrap_or(ScriptoriumError::NetworkError));
        }
        Ok(reply.payload_str())
    }

    async fn ss_request(&mut self, ss_endpoint: &str, op_code: OpCode, filename: &str, payload: Vec<u8>) -> Result<Frame> {
        let mut stream = TcpStream::connect(ss_endpoint).await.map_err(|_| ScriptoriumError::SSUnavailable)?;
        let header = Header::request(op_code, &self.username).with_filename(filename);
        request(&mut stream, header, payload).await
    }

    async fn list(&mut self) -> Result<String> {
        let reply = self.nm_request(OpCode::List, "", "", Vec::new()).await?;
        self.as_endpoint_or_err(reply)
    }

    async fn run_line(&mut self, line: &str) -> Result<String> {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("create") => {
                let name = parts.next().unwrap_or_default();
                let endpoint = self.create(name).await?;
                Ok(format!("created {name} on {endpoint}"))
            }
            Some("read") => {
                let name = parts.next().unwrap_or_default();
                let endpoint = self.resolve_read(name).await?;
                let reply = self.ss_request(&endpoint, OpCode::SsRead, name, Vec::new()).await?;
                self.as_endpoint_or_err(reply)
            }
            Some("write") => {
                let name = parts.next().unwrap_or_default();
                let sentence_idx: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let word_idx: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let word = parts.next().unwrap_or_default();
                let endpoint = self.resolve_write(name).await?;
                let header = Header::request(OpCode::SsEtirw, &self.username)
                    .with_filename(name)
                    .with_sentence_index(sentence_idx)
                    .with_word_index(word_idx);
                let mut stream = TcpStream::connect(&endpoint).await.map_err(|_| ScriptoriumError::SSUnavailable)?;
                let reply = request(&mut stream, header, word.as_bytes().to_vec()).await?;
                self.as_endpoint_or_err(reply)?;
                Ok("ok".to_string())
            }
            Some("list") => self.list().await,
            _ => Err(ScriptoriumError::InvalidCommand),
        }
    }
}

/// Reads commands from stdin one line at a time until `quit` or EOF.
pub async fn run_shell(nm_addr: &str, username: &str) -> Result<()> {
    let mut client = Client::connect(nm_addr, username).await?;
    println!("connected as {username}; commands: create <name> | read <name> | write <name> <sentence> <word> <text> | list | quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        match client.run_line(line).await {
            Ok(output) => println!("{output}"),
            Err(e) => println!("error: {e}"),
        }
        io::stdout().flush().ok();
    }
    Ok(())
}
