//! Loading certificate chains and private keys from PEM files.

use std::path::Path;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rustls::{Certificate, PrivateKey};
use crate::error::{Error, Result};

const BEGIN_MARKER: &[u8] = b"-----BEGIN ";

/// Key encodings rustls can load.
const PRIVATE_KEY_LABELS: &[&str] = &["PRIVATE KEY", "RSA PRIVATE KEY", "EC PRIVATE KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    pub label: String,
    pub data: Vec<u8>,
}

struct Parser<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Parser {
            data,
            offset: 0,
        }
    }

    fn current(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    fn advance(&mut self) {
        self.offset += 1
    }

    /// Moves to the next `-----BEGIN `, skipping any text between blocks. False at EOF.
    fn seek_begin(&mut self) -> bool {
        while self.offset < self.data.len() {
            if self.data[self.offset..].starts_with(BEGIN_MARKER) {
                return true;
            }
            self.advance();
        }
        false
    }

    fn expect_dashes(&mut self) -> Result<usize> {
        let mut dash_count = 0;
        while let Some(b'-') = self.current() {
            self.advance();
            dash_count += 1;
        }
        if dash_count == 0 {
            Err(pem_error("expected '-----'"))
        }
        else {
            Ok(dash_count)
        }
    }

    fn expect_space(&mut self) -> Result<()> {
        if let Some(b' ') = self.current() {
            self.advance();
            Ok(())
        }
        else {
            Err(pem_error("expected ' '"))
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        if let Some(b'\r') = self.current() {
            self.advance();
        }
        match self.current() {
            Some(b'\n') => {
                self.advance();
                Ok(())
            }
            // The final line of a file need not be terminated.
            None => Ok(()),
            Some(_) => Err(pem_error("expected newline")),
        }
    }

    fn expect_string(&mut self, s: &str) -> Result<()> {
        for b in s.bytes() {
            if self.current() != Some(b) {
                return Err(Error::Pem(format!("expected {:?}", s)));
            }
            self.advance();
        }
        Ok(())
    }

    fn read_label(&mut self) -> Result<String> {
        let start_offset = self.offset;
        while let Some(b) = self.current() {
            match b {
                b'A'..=b'Z' | b'0'..=b'9' | b' ' => self.advance(),
                _ => break,
            }
        }
        String::from_utf8(Vec::from(&self.data[start_offset..self.offset]))
            .map_err(|_| pem_error("invalid UTF-8 label"))
    }

    fn read_base64(&mut self) -> Result<Vec<u8>> {
        let mut base64_data: Vec<u8> = Vec::new();
        while let Some(b) = self.current() {
            match b {
                b'A'..=b'Z' |
                b'a'..=b'z' |
                b'0'..=b'9' |
                b'+' | b'/' | b'=' => {
                    base64_data.push(b);
                    self.advance();
                }
                b'\r' | b'\n' => {
                    self.advance();
                }
                b'-' => {
                    break;
                }
                _ => {
                    return Err(Error::Pem(format!("expected base64-encoded data, got byte {:#04x}", b)))
                }
            }
        }
        Ok(base64_data)
    }

    fn read_block(&mut self) -> Result<PemBlock> {
        // Header
        self.expect_dashes()?;
        self.expect_string("BEGIN")?;
        self.expect_space()?;
        let begin_label = self.read_label()?;
        self.expect_dashes()?;
        self.expect_newline()?;

        // Body
        let base64_data = self.read_base64()?;

        // Footer
        self.expect_dashes()?;
        self.expect_string("END")?;
        self.expect_space()?;
        let end_label = self.read_label()?;
        self.expect_dashes()?;
        self.expect_newline()?;

        if begin_label != end_label {
            return Err(Error::Pem(format!("label mismatch: BEGIN {} and END {}", begin_label, end_label)));
        }
        let data = STANDARD.decode(&base64_data)
            .map_err(|e| Error::Pem(format!("invalid base64 in {} block: {}", begin_label, e)))?;
        Ok(PemBlock { label: begin_label, data })
    }
}

fn pem_error(msg: &str) -> Error {
    Error::Pem(String::from(msg))
}

/// Decodes every PEM block in `input`, ignoring any text between them.
pub fn decode_pem_blocks(input: &[u8]) -> Result<Vec<PemBlock>> {
    let mut parser = Parser::new(input);
    let mut blocks = Vec::new();
    while parser.seek_begin() {
        blocks.push(parser.read_block()?);
    }
    Ok(blocks)
}

pub fn parse_certificates(input: &[u8]) -> Result<Vec<Certificate>> {
    let certs: Vec<Certificate> = decode_pem_blocks(input)?
        .into_iter()
        .filter(|block| block.label == "CERTIFICATE")
        .map(|block| Certificate(block.data))
        .collect();
    if certs.is_empty() {
        return Err(pem_error("no CERTIFICATE block found"));
    }
    Ok(certs)
}

pub fn parse_private_key(input: &[u8]) -> Result<PrivateKey> {
    decode_pem_blocks(input)?
        .into_iter()
        .find(|block| PRIVATE_KEY_LABELS.contains(&block.label.as_str()))
        .map(|block| PrivateKey(block.data))
        .ok_or_else(|| pem_error("no private key block found"))
}

pub fn load_certificates<P: AsRef<Path>>(path: P) -> Result<Vec<Certificate>> {
    let data = std::fs::read(path.as_ref())?;
    parse_certificates(&data)
        .map_err(|e| Error::Pem(format!("{}: {}", path.as_ref().display(), e)))
}

pub fn load_private_key<P: AsRef<Path>>(path: P) -> Result<PrivateKey> {
    let data = std::fs::read(path.as_ref())?;
    parse_private_key(&data)
        .map_err(|e| Error::Pem(format!("{}: {}", path.as_ref().display(), e)))
}
