//! The fixed-size frame header every role speaks: NM, SS, and client.
//!
//! A wire message is this header, written in one `write_all`, followed by an
//! optional payload of `data_length` bytes written in a second `write_all`.
//! Decoding an unrecognized `msg_type`/`op_code` never panics: it falls back
//! to `None` and the caller is expected to reply `InvalidCommand` or tear
//! down the connection, per the specification's framing contract.

use byteorder::{BigEndian, ByteOrder};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::wire::codes::{MsgType, OpCode};

pub const USERNAME_LEN: usize = 32;
pub const FILENAME_LEN: usize = 256;
pub const FOLDERNAME_LEN: usize = 256;
pub const CHECKPOINT_TAG_LEN: usize = 64;

/// Total on-wire size of [`Header`]. Kept in one place so
/// [`crate::wire::framing`] never has to recompute it by hand.
pub const HEADER_SIZE: usize = 1 // msg_type
    + 2 // op_code
    + USERNAME_LEN
    + FILENAME_LEN
    + FOLDERNAME_LEN
    + CHECKPOINT_TAG_LEN
    + 4 // data_length
    + 2 // error_code
    + 4 // sentence_index
    + 4 // word_index
    + 4; // flags

#[derive(Debug, Clone)]
pub struct Header {
    pub msg_type: MsgType,
    pub op_code: OpCode,
    pub username: String,
    pub filename: String,
    pub foldername: String,
    pub checkpoint_tag: String,
    pub data_length: u32,
    pub error_code: u16,
    pub sentence_index: i32,
    pub word_index: i32,
    pub flags: u32,
}

impl Header {
    /// Build a bare request header with every optional field at its zero
    /// value, for callers that only need a handful of fields set.
    pub fn request(op_code: OpCode, username: &str) -> Self {
        Self {
            msg_type: MsgType::Request,
            op_code,
            username: username.to_string(),
            filename: String::new(),
            foldername: String::new(),
            checkpoint_tag: String::new(),
            data_length: 0,
            error_code: 0,
            sentence_index: -1,
            word_index: -1,
            flags: 0,
        }
    }

    pub fn response(op_code: OpCode) -> Self {
        Self {
            msg_type: MsgType::Response,
            op_code,
            username: String::new(),
            filename: String::new(),
            foldername: String::new(),
            checkpoint_tag: String::new(),
            data_length: 0,
            error_code: 0,
            sentence_index: -1,
            word_index: -1,
            flags: 0,
        }
    }

    pub fn error(op_code: OpCode, code: u16) -> Self {
        let mut h = Self::response(op_code);
        h.msg_type = MsgType::Error;
        h.error_code = code;
        h
    }

    pub fn with_data_length(mut self, len: u32) -> Self {
        self.data_length = len;
        self
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = filename.to_string();
        self
    }

    pub fn with_foldername(mut self, foldername: &str) -> Self {
        self.foldername = foldername.to_string();
        self
    }

    pub fn with_checkpoint_tag(mut self, tag: &str) -> Self {
        self.checkpoint_tag = tag.to_string();
        self
    }

    pub fn with_sentence_index(mut self, idx: i32) -> Self {
        self.sentence_index = idx;
        self
    }

    pub fn with_word_index(mut self, idx: i32) -> Self {
        self.word_index = idx;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut off = 0;

        buf[off] = self.msg_type.to_u8().unwrap_or(MsgType::Error as u8);
        off += 1;

        BigEndian::write_u16(&mut buf[off..off + 2], self.op_code.to_u16().unwrap_or(0));
        off += 2;

        off += write_fixed_str(&mut buf[off..off + USERNAME_LEN], &self.username);
        off += write_fixed_str(&mut buf[off..off + FILENAME_LEN], &self.filename);
        off += write_fixed_str(&mut buf[off..off + FOLDERNAME_LEN], &self.foldername);
        off += write_fixed_str(&mut buf[off..off + CHECKPOINT_TAG_LEN], &self.checkpoint_tag);

        BigEndian::write_u32(&mut buf[off..off + 4], self.data_length);
        off += 4;
        BigEndian::write_u16(&mut buf[off..off + 2], self.error_code);
        off += 2;
        BigEndian::write_i32(&mut buf[off..off + 4], self.sentence_index);
        off += 4;
        BigEndian::write_i32(&mut buf[off..off + 4], self.word_index);
        off += 4;
        BigEndian::write_u32(&mut buf[off..off + 4], self.flags);
        off += 4;

        debug_assert_eq!(off, HEADER_SIZE);
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Option<Header> {
        let mut off = 0;

        let msg_type = MsgType::from_u8(buf[off])?;
        off += 1;

        let op_code = OpCode::from_u16(BigEndian::read_u16(&buf[off..off + 2]))?;
        off += 2;

        let username = read_fixed_str(&buf[off..off + USERNAME_LEN]);
        off += USERNAME_LEN;
        let filename = read_fixed_str(&buf[off..off + FILENAME_LEN]);
        off += FILENAME_LEN;
        let foldername = read_fixed_str(&buf[off..off + FOLDERNAME_LEN]);
        off += FOLDERNAME_LEN;
        let checkpoint_tag = read_fixed_str(&buf[off..off + CHECKPOINT_TAG_LEN]);
        off += CHECKPOINT_TAG_LEN;

        let data_length = BigEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let error_code = BigEndian::read_u16(&buf[off..off + 2]);
        off += 2;
        let sentence_index = BigEndian::read_i32(&buf[off..off + 4]);
        off += 4;
        let word_index = BigEndian::read_i32(&buf[off..off + 4]);
        off += 4;
        let flags = BigEndian::read_u32(&buf[off..off + 4]);
        off += 4;

        debug_assert_eq!(off, HEADER_SIZE);

        Some(Header {
            msg_type,
            op_code,
            username,
            filename,
            foldername,
            checkpoint_tag,
            data_length,
            error_code,
            sentence_index,
            word_index,
            flags,
        })
    }
}

/// Writes `s` into `dst`, truncating to fit and zero-padding the remainder.
/// Returns the number of bytes occupied by `dst` (always `dst.len()`).
fn write_fixed_str(dst: &mut [u8], s: &str) -> usize {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
    for b in &mut dst[n..] {
        *b = 0;
    }
    dst.len()
}

fn read_fixed_str(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}
