//! `ftp:` checking
//!
//! Connects to the server and reads its greeting; a ready server answers
//! `220`. The connection is closed with `QUIT`.

use crate::checker::{connect_tcp, CheckContext, CheckError, Checker, ErrorKind, UrlRecord};
use crate::url::host_and_port;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use url::Url;

const FTP_PORT: u16 = 21;

/// Checks `ftp:` URLs
#[derive(Debug, Default)]
pub struct FtpChecker {
    stream: Option<TcpStream>,
}

impl FtpChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checker for FtpChecker {
    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let (host, port) = record
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .and_then(|url| host_and_port(&url, FTP_PORT))
            .ok_or_else(|| CheckError::new(ErrorKind::Syntax, "FTP URL has no host"))?;

        let stream = connect_tcp(&host, port, ctx.config.checking.timeout_duration())?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let (code, text) = read_reply(&mut reader)?;
        self.stream = Some(stream);

        if code != 220 {
            return Err(CheckError::new(
                ErrorKind::Protocol,
                format!("FTP server not ready: {} {}", code, text),
            ));
        }
        record.add_info(format!("FTP greeting: {}", text));
        record.set_result("FTP server ready", true);
        Ok(())
    }

    fn close_connection(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.write_all(b"QUIT\r\n");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Reads one possibly multi-line reply (`220-...` continued until `220 ...`)
pub(crate) fn read_reply<R: BufRead>(reader: &mut R) -> Result<(u16, String), CheckError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(CheckError::new(
            ErrorKind::ConnectionReset,
            "connection closed before greeting",
        ));
    }
    let (code, multiline, text) = parse_reply_line(&line)?;

    if multiline {
        let terminator = format!("{} ", code);
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(CheckError::new(
                    ErrorKind::ConnectionReset,
                    "connection closed inside reply",
                ));
            }
            if line.starts_with(&terminator) {
                break;
            }
        }
    }
    Ok((code, text))
}

fn parse_reply_line(line: &str) -> Result<(u16, bool, String), CheckError> {
    let line = line.trim_end();
    let code = line
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| CheckError::new(ErrorKind::Protocol, format!("bad reply `{}`", line)))?;
    let multiline = line.as_bytes().get(3) == Some(&b'-');
    let text = line.get(4..).unwrap_or_default().trim().to_string();
    Ok((code, multiline, text))
}
